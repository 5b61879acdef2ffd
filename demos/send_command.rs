use clap::Parser;
use clap_derive::Parser;
use sarlink::command_channel::command_sender::send_command;
use sarlink::protocol::command::CommandInfo;
use std::net::SocketAddr;
use tracing::{info, Level};

/// Sends an image request to a command receiver
#[derive(Parser)]
struct Args {
    target: String,
    image_number: u16,

    #[clap(long, default_value_t = 0, allow_negative_numbers = true)]
    pixel_offset_x: i16,

    #[clap(long, default_value_t = 0, allow_negative_numbers = true)]
    pixel_offset_y: i16,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .try_init()
        .ok();

    let target: SocketAddr = args.target.parse()?;
    let command = CommandInfo::image_request(1, args.image_number, args.pixel_offset_x, args.pixel_offset_y);
    send_command(target, &command).await?;

    info!("sent image request for image {} to {}", args.image_number, target);
    Ok(())
}
