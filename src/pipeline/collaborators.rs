//! The seams towards the parts of the imaging system that know nothing about the wire protocol

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;

use crate::protocol::image_info::ImageTelemetry;

/// Turns a source image file into the blob that is transmitted (e.g. TIFF re-encoded as JPEG)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageEncoder: Send + Sync + 'static {
    async fn encode(&self, image_path: &Path) -> anyhow::Result<Bytes>;
}

/// Extracts the telemetry for an image from its auxiliary file
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TelemetryProvider: Send + Sync + 'static {
    async fn telemetry(&self, aux_path: &Path) -> anyhow::Result<ImageTelemetry>;
}

/// Sends image files exactly as they are on disk
pub struct FileContentEncoder;

#[async_trait]
impl ImageEncoder for FileContentEncoder {
    async fn encode(&self, image_path: &Path) -> anyhow::Result<Bytes> {
        let content = tokio::fs::read(image_path).await
            .with_context(|| format!("reading image {:?}", image_path))?;
        Ok(content.into())
    }
}

/// For images that have no auxiliary data
pub struct NoTelemetry;

#[async_trait]
impl TelemetryProvider for NoTelemetry {
    async fn telemetry(&self, aux_path: &Path) -> anyhow::Result<ImageTelemetry> {
        anyhow::bail!("no telemetry available for {:?}", aux_path)
    }
}
