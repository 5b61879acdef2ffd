use clap::Parser;
use clap_derive::Parser;
use sarlink::pipeline::collaborators::{FileContentEncoder, NoTelemetry};
use sarlink::pipeline::companion::CompanionPollConfig;
use sarlink::pipeline::image_pipeline::{ImageKind, ImagePipeline};
use sarlink::transfer::ledger::TransferLedger;
use sarlink::transfer::transfer_config::{AckMode, TransferConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use anyhow::bail;
use tokio::sync::mpsc;
use tracing::{info, Level};

/// Packages image files and sends them to an image receiver. ISAR images are sent as they are,
///  GMTI images need their `.txt` and `.bin` companions next to them.
#[derive(Parser)]
struct Args {
    target: String,
    files: Vec<PathBuf>,

    #[clap(long, default_value_t = false)]
    gmti: bool,

    #[clap(long, default_value_t = false)]
    no_ack: bool,

    #[clap(long, default_value_t = 4096)]
    chunk_size: usize,

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

    if args.files.is_empty() {
        bail!("no files to send");
    }

    let target: SocketAddr = args.target.parse()?;
    let mut transfer_config = TransferConfig::new(target);
    transfer_config.chunk_size = args.chunk_size;
    if args.no_ack {
        transfer_config.ack_mode = AckMode::NoAck;
    }

    let ledger = Arc::new(TransferLedger::default());
    let pipeline = Arc::new(ImagePipeline::new(
        Arc::new(transfer_config),
        CompanionPollConfig::default(),
        Arc::new(FileContentEncoder),
        Arc::new(NoTelemetry),
        ledger.clone(),
    )?);

    let kind = if args.gmti { ImageKind::Gmti } else { ImageKind::Isar };

    // stands in for the directory watcher
    let (send, recv) = mpsc::channel(args.files.len());
    for file in args.files {
        send.send(file).await?;
    }
    drop(send);

    pipeline.run(kind, recv).await;

    let statistics = ledger.statistics().await;
    info!("{} of {} files transferred successfully", statistics.success, statistics.total);
    if statistics.failure > 0 {
        bail!("{} transfers failed", statistics.failure);
    }
    Ok(())
}
