use clap::Parser;
use clap_derive::Parser;
use sarlink::packaging::depacketizer::depacketize_file;
use sarlink::protocol::gmti::GmtiInfo;
use sarlink::protocol::image_info::{ImagePoint, MessageType};
use std::path::PathBuf;
use tracing::{info, warn, Level};

/// Validates a package file and extracts the image it contains
#[derive(Parser)]
struct Args {
    package_file: PathBuf,

    /// where to write the message body, i.e. the image
    #[clap(long)]
    output: Option<PathBuf>,

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

    let message = depacketize_file(&args.package_file).await?;
    let info = &message.info;

    info!("{} frames, image number {}, message type {:#06x}", message.num_frames, info.message_count, info.message_type);
    info!("{} rows x {} columns, {} body bytes (declared: {})", info.image_rows, info.image_cols, message.body.len(), info.declared_body_len());
    for point in [ImagePoint::TopLeft, ImagePoint::TopRight, ImagePoint::BottomRight, ImagePoint::BottomLeft, ImagePoint::Center] {
        let position = info.point(point).to_degrees();
        info!("{:?}: lat {:.6}, lng {:.6}", point, position.lat, position.lng);
    }

    let mut image = message.body.clone();
    if info.message_type == MessageType::Gmti as u16 {
        match GmtiInfo::deser(&mut image) {
            Ok(gmti) => {
                info!("GMTI: {} targets, IMU time {}, image number {}", gmti.targets.len(), gmti.imu_time, gmti.image_number);
                for target in &gmti.targets {
                    let position = target.position.to_degrees();
                    info!("  target {}: lat {:.6}, lng {:.6}, radial velocity {}", target.id, position.lat, position.lng, target.radial_velocity);
                }
            }
            Err(e) => warn!("body does not start with a GMTI block: {}", e),
        }
    }

    if let Some(output) = &args.output {
        tokio::fs::write(output, &image).await?;
        info!("wrote image to {:?}", output);
    }
    Ok(())
}
