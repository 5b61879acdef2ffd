use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::bail;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, instrument, warn, Instrument, Span};

use crate::command_channel::command_handler::CommandHandler;
use crate::command_channel::reassembly::{ResyncPolicy, StreamReassembler};
use crate::protocol::command::{CommandFrameHeader, CommandInfo};

#[derive(Debug, Clone)]
pub struct CommandServerConfig {
    pub listen_addr: SocketAddr,
    pub resync_policy: ResyncPolicy,
    /// A frame header declaring a longer frame is taken as a sign of a corrupted stream
    pub max_frame_len: usize,
    pub read_buffer_size: usize,
}

impl CommandServerConfig {
    pub fn new(listen_addr: SocketAddr) -> CommandServerConfig {
        CommandServerConfig {
            listen_addr,
            resync_policy: ResyncPolicy::DiscardBuffer,
            max_frame_len: 4096,
            read_buffer_size: 4096,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let min_frame_len = CommandFrameHeader::SERIALIZED_LEN + CommandInfo::SERIALIZED_LEN;
        if self.max_frame_len < min_frame_len {
            bail!("max frame length must be at least {} to fit a command", min_frame_len);
        }
        if self.read_buffer_size == 0 {
            bail!("read buffer size must be positive");
        }
        Ok(())
    }
}

/// Accepts command channel connections and feeds each one through its own reassembler
pub struct CommandServer<H: CommandHandler> {
    listener: TcpListener,
    config: Arc<CommandServerConfig>,
    handler: Arc<H>,
}

impl <H: CommandHandler> CommandServer<H> {
    pub async fn bind(config: Arc<CommandServerConfig>, handler: Arc<H>) -> anyhow::Result<CommandServer<H>> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen_addr).await?;
        info!("listening for commands on {}", listener.local_addr()?);
        Ok(CommandServer {
            listener,
            config,
            handler,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn accept_loop(&self) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;

            let config = self.config.clone();
            let handler = self.handler.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(peer, stream, config, handler).await {
                    warn!("command connection from {} broke with an error: {}", peer, e);
                }
            });
        }
    }
}

#[instrument(name="command_connection", skip_all, fields(peer = %peer))]
async fn handle_connection<H: CommandHandler>(
    peer: SocketAddr,
    stream: TcpStream,
    config: Arc<CommandServerConfig>,
    handler: Arc<H>,
) -> anyhow::Result<()> {
    debug!("accepted connection");
    receive_commands(peer, stream, &config, handler.as_ref())
        .instrument(Span::current())
        .await
}

/// Reads from a single connection until the peer closes it, dispatching every command as soon
///  as its frame is complete
pub async fn receive_commands<R, H>(peer: SocketAddr, mut reader: R, config: &CommandServerConfig, handler: &H) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    H: CommandHandler + ?Sized,
{
    let mut reassembler = StreamReassembler::new(config.resync_policy, config.max_frame_len);
    let mut buf = vec![0u8; config.read_buffer_size];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            if reassembler.buffered_len() > 0 {
                debug!("peer closed the connection with {} bytes of an incomplete frame buffered", reassembler.buffered_len());
            }
            debug!("connection closed: {:?}", reassembler.stats());
            return Ok(());
        }

        for command in reassembler.push(&buf[..n]) {
            handler.on_command(peer, command).await;
        }
    }
}
