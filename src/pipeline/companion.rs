//! Finding the files that accompany an image: the auxiliary telemetry of SAR images, the
//!  corner coordinates and raw data of GMTI images.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::bail;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct CompanionPollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for CompanionPollConfig {
    fn default() -> Self {
        CompanionPollConfig {
            max_attempts: 10,
            interval: Duration::from_millis(500),
        }
    }
}

/// `IMG<rest>.tif` has its auxiliary data in `AUX<rest>.dat` in the same directory. The `IMG`
///  prefix is matched case-insensitively.
pub fn aux_path_for_image(image_path: &Path) -> anyhow::Result<PathBuf> {
    let Some(stem) = image_path.file_stem().and_then(|s| s.to_str()) else {
        bail!("{:?} has no usable file name", image_path);
    };
    if stem.len() < 3 || !stem.is_char_boundary(3) {
        bail!("image name {:?} is too short to derive an AUX name from", stem);
    }
    let (prefix, rest) = stem.split_at(3);
    if !prefix.eq_ignore_ascii_case("IMG") {
        bail!("image name {:?} does not start with 'IMG', can not derive an AUX name", stem);
    }

    Ok(image_path.with_file_name(format!("AUX{}.dat", rest)))
}

/// GMTI images come with `<name>.txt` (corner coordinates) and `<name>.bin` (raw GMTI data)
pub fn gmti_companion_paths(image_path: &Path) -> (PathBuf, PathBuf) {
    (image_path.with_extension("txt"), image_path.with_extension("bin"))
}

/// Waits for a file that is still being written by some other process to appear. Polls at a
///  fixed interval and gives up after the configured number of attempts.
pub async fn wait_for_file(path: &Path, config: &CompanionPollConfig) -> anyhow::Result<()> {
    for attempt in 0..=config.max_attempts {
        if tokio::fs::try_exists(path).await? {
            debug!("found {:?} after {} retries", path, attempt);
            return Ok(());
        }
        if attempt < config.max_attempts {
            trace!("{:?} does not exist yet - retry {} of {}", path, attempt + 1, config.max_attempts);
            tokio::time::sleep(config.interval).await;
        }
    }
    bail!("{:?} did not appear after {} retries", path, config.max_attempts)
}
