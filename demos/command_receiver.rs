use async_trait::async_trait;
use clap::Parser;
use clap_derive::Parser;
use sarlink::command_channel::command_handler::CommandHandler;
use sarlink::command_channel::command_server::{CommandServer, CommandServerConfig};
use sarlink::command_channel::reassembly::ResyncPolicy;
use sarlink::protocol::command::Command;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser)]
struct Args {
    listen_address: String,

    /// skip to the next frame magic instead of discarding the buffer when the stream is out of sync
    #[clap(long, default_value_t = false)]
    scan_for_magic: bool,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

struct LoggingHandler;

#[async_trait]
impl CommandHandler for LoggingHandler {
    async fn on_command(&self, peer: SocketAddr, command: Command) {
        match command {
            Command::ImageRequest(request) => info!("{}: image request for image {}, offset ({}, {})", peer, request.image_number, request.pixel_offset_x, request.pixel_offset_y),
            Command::Unrecognized { command_type, .. } => warn!("{}: unrecognized command type {:#04x}", peer, command_type),
        }
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let mut config = CommandServerConfig::new(args.listen_address.parse()?);
    if args.scan_for_magic {
        config.resync_policy = ResyncPolicy::ScanForMagic;
    }

    let server = CommandServer::bind(Arc::new(config), Arc::new(LoggingHandler)).await?;
    server.accept_loop().await
}
