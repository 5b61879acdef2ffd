use std::net::SocketAddr;

use anyhow::Context;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::protocol::command::CommandInfo;

/// Writes a single command frame. Commands are fire-and-forget, nothing is read back.
pub async fn write_command(writer: &mut (impl AsyncWrite + Unpin), command: &CommandInfo) -> anyhow::Result<()> {
    let frame = command.to_frame();
    writer.write_all(&frame).await?;
    writer.flush().await?;
    debug!("sent command {:#04x} for image {} ({} bytes)", command.command_type, command.image_number, frame.len());
    Ok(())
}

/// Connects to a command receiver, sends a command and closes the connection
pub async fn send_command(addr: SocketAddr, command: &CommandInfo) -> anyhow::Result<()> {
    let mut stream = TcpStream::connect(addr).await
        .with_context(|| format!("connecting to command receiver at {}", addr))?;
    write_command(&mut stream, command).await?;
    stream.shutdown().await?;
    Ok(())
}
