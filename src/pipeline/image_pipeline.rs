use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn, Instrument, Span};

use crate::packaging::message::{GmtiCorners, ImageMessage};
use crate::packaging::package_file::{gmti_package_path_for_image, package_path_for_image, write_package_file};
use crate::packaging::packetizer::Packetizer;
use crate::pipeline::collaborators::{ImageEncoder, TelemetryProvider};
use crate::pipeline::companion::{aux_path_for_image, gmti_companion_paths, wait_for_file, CompanionPollConfig};
use crate::protocol::image_info::{ImageInfo, MessageType};
use crate::transfer::frame_source::PackageFileSource;
use crate::transfer::ledger::TransferLedger;
use crate::transfer::transfer_config::TransferConfig;
use crate::transfer::transfer_manager::{transfer, TransferOutcome};

/// How an image file is turned into a message
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ImageKind {
    /// `IMG*.tif` with telemetry in a companion `AUX*.dat`
    Sar,
    /// an image without telemetry
    Isar,
    /// a rendered GMTI image with `.txt` corner coordinates and `.bin` raw data next to it
    Gmti,
}

/// Packages image files and transfers them, keeping track of what was sent in a ledger.
///
/// Each image goes through a package file on disk, which is then streamed to the receiver.
///  GMTI package files are temporary, SAR / ISAR package files are kept.
pub struct ImagePipeline<E: ImageEncoder, T: TelemetryProvider> {
    transfer_config: Arc<TransferConfig>,
    poll_config: CompanionPollConfig,
    packetizer: Packetizer,
    encoder: Arc<E>,
    telemetry: Arc<T>,
    ledger: Arc<TransferLedger>,
}

impl <E: ImageEncoder, T: TelemetryProvider> ImagePipeline<E, T> {
    pub fn new(
        transfer_config: Arc<TransferConfig>,
        poll_config: CompanionPollConfig,
        encoder: Arc<E>,
        telemetry: Arc<T>,
        ledger: Arc<TransferLedger>,
    ) -> anyhow::Result<ImagePipeline<E, T>> {
        transfer_config.validate()?;
        Ok(ImagePipeline {
            packetizer: Packetizer::new(transfer_config.chunk_size)?,
            transfer_config,
            poll_config,
            encoder,
            telemetry,
            ledger,
        })
    }

    pub fn ledger(&self) -> &Arc<TransferLedger> {
        &self.ledger
    }

    /// Processes newly discovered image files as they come in, each on its own task, until the
    ///  discovering side closes the channel
    pub async fn run(self: Arc<Self>, kind: ImageKind, mut new_files: mpsc::Receiver<PathBuf>) {
        let mut tasks = tokio::task::JoinSet::new();

        while let Some(path) = new_files.recv().await {
            let pipeline = self.clone();
            tasks.spawn(async move {
                if let Err(e) = pipeline.process(&path, kind).await {
                    warn!("could not transfer {:?}: {}", path, e);
                }
            });
        }

        while tasks.join_next().await.is_some() {}
        info!("file discovery ended - transfer statistics: {:?}", self.ledger.statistics().await);
    }

    /// Packages and transfers a single image. An `Err` means the image was not transferred,
    ///  either because it could not be packaged or because the transfer failed.
    #[instrument(skip(self), fields(image_number = tracing::field::Empty))]
    pub async fn process(&self, image_path: &Path, kind: ImageKind) -> anyhow::Result<TransferOutcome> {
        let Some(image_number) = self.ledger.begin(image_path).await else {
            anyhow::bail!("{:?} is already being transferred", image_path);
        };
        Span::current().record("image_number", image_number);

        let result = self.package_and_transfer(image_path, kind, image_number)
            .instrument(Span::current())
            .await;

        let success = matches!(&result, Ok(outcome) if outcome.is_success());
        self.ledger.finish(image_path, success).await;

        let outcome = result?;
        if let Err(e) = &outcome.result {
            return Err(anyhow!("transfer of image {} failed: {}", image_number, e));
        }
        Ok(outcome)
    }

    async fn package_and_transfer(&self, image_path: &Path, kind: ImageKind, image_number: u16) -> anyhow::Result<TransferOutcome> {
        let message = self.build_message(image_path, kind, image_number).await?;

        let frames = message.packetize(&self.packetizer)?;
        let package_path = match kind {
            ImageKind::Gmti => gmti_package_path_for_image(image_path),
            ImageKind::Sar | ImageKind::Isar => package_path_for_image(image_path),
        };
        write_package_file(&package_path, &frames).await?;
        debug!("packaged image {} into {} frames in {:?}", image_number, frames.len(), package_path);

        let source = PackageFileSource::open(&package_path).await?;
        let outcome = transfer(self.transfer_config.clone(), source).await;

        if kind == ImageKind::Gmti {
            if let Err(e) = tokio::fs::remove_file(&package_path).await {
                debug!("could not remove temporary package file {:?}: {}", package_path, e);
            }
        }
        Ok(outcome)
    }

    async fn build_message(&self, image_path: &Path, kind: ImageKind, image_number: u16) -> anyhow::Result<ImageMessage> {
        match kind {
            ImageKind::Sar => {
                let aux_path = aux_path_for_image(image_path)?;
                wait_for_file(&aux_path, &self.poll_config).await?;

                let image = self.encoder.encode(image_path).await?;
                let telemetry = self.telemetry.telemetry(&aux_path).await
                    .with_context(|| format!("reading telemetry from {:?}", aux_path))?;
                Ok(ImageMessage::new(ImageInfo::from_telemetry(&telemetry, image_number, image.len()), image))
            }
            ImageKind::Isar => {
                let image = self.encoder.encode(image_path).await?;
                Ok(ImageMessage::new(ImageInfo::new(MessageType::Image, image_number, image.len()), image))
            }
            ImageKind::Gmti => {
                let (txt_path, bin_path) = gmti_companion_paths(image_path);
                wait_for_file(&txt_path, &self.poll_config).await?;
                wait_for_file(&bin_path, &self.poll_config).await?;

                let corners = GmtiCorners::parse(&tokio::fs::read_to_string(&txt_path).await?)
                    .with_context(|| format!("parsing corner coordinates in {:?}", txt_path))?;
                let gmti_data = tokio::fs::read(&bin_path).await?;
                let image = tokio::fs::read(image_path).await?;
                Ok(ImageMessage::gmti(image_number, &corners, &gmti_data, &image))
            }
        }
    }
}
