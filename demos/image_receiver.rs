use clap::Parser;
use clap_derive::Parser;
use sarlink::transfer::image_receiver::{ImageReceiver, ImageReceiverConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tracing::{info, Level};

/// Receives image transfers and optionally stores the received bodies
#[derive(Parser)]
struct Args {
    listen_address: String,

    #[clap(long)]
    output_dir: Option<PathBuf>,

    #[clap(long, default_value_t = false)]
    no_ack: bool,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
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

    let listen_addr: SocketAddr = args.listen_address.parse()?;
    let mut config = ImageReceiverConfig::new(listen_addr);
    config.send_ack = !args.no_ack;

    let (send, mut recv) = mpsc::channel(16);
    let receiver = ImageReceiver::bind(Arc::new(config), send).await?;

    let store = async {
        while let Some(received) = recv.recv().await {
            let info = &received.message.info;
            info!("image {} from {}: {}x{}, type {:#06x}, {} body bytes",
                info.message_count, received.peer, info.image_rows, info.image_cols, info.message_type, received.message.body.len());

            if let Some(dir) = &args.output_dir {
                let path = dir.join(format!("image_{:05}.bin", info.message_count));
                tokio::fs::write(&path, &received.message.body).await?;
                info!("stored body in {:?}", path);
            }
        }
        anyhow::Ok(())
    };

    select! {
        result = receiver.accept_loop() => { result }
        result = store => { result }
    }
}
