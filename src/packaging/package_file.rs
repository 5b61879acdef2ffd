//! Package files: the frames of one message written back to back with no additional framing,
//!  i.e. exactly the bytes that go over the wire.

use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::protocol::frame::Frame;

pub async fn write_package_file(path: impl AsRef<Path>, frames: &[Frame]) -> anyhow::Result<()> {
    let path = path.as_ref();

    let mut buf = BytesMut::with_capacity(frames.iter().map(|f| f.serialized_len()).sum());
    for frame in frames {
        frame.ser(&mut buf);
    }

    let mut file = tokio::fs::File::create(path).await
        .with_context(|| format!("creating package file {:?}", path))?;
    file.write_all(&buf).await
        .with_context(|| format!("writing package file {:?}", path))?;
    file.flush().await?;

    debug!("wrote {} frames ({} bytes) to {:?}", frames.len(), buf.len(), path);
    Ok(())
}

/// The package file for an image lives next to it, with the image's `.tif` extension replaced
///  by `.bin`
pub fn package_path_for_image(image_path: &Path) -> PathBuf {
    let is_tif = image_path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("tif"))
        .unwrap_or(false);

    if is_tif {
        image_path.with_extension("bin")
    }
    else {
        let mut name = image_path.as_os_str().to_os_string();
        name.push(".bin");
        PathBuf::from(name)
    }
}

pub fn gmti_package_path_for_image(image_path: &Path) -> PathBuf {
    let stem = image_path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    image_path.with_file_name(format!("{}_gmti_packaged.bin", stem))
}
