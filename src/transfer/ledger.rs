use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FileStatus {
    Pending,
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct TransferStatistics {
    pub total: usize,
    pub pending: usize,
    pub success: usize,
    pub failure: usize,
}

/// Process-wide bookkeeping of transferred files, shared between concurrent transfers.
///
/// Every access is a short critical section - callers must not hold anything across the actual
///  transfer, they call [TransferLedger::begin] before and [TransferLedger::finish] after it.
pub struct TransferLedger {
    data: Mutex<LedgerData>,
}

struct LedgerData {
    files: FxHashMap<PathBuf, FileStatus>,
    next_image_number: u16,
}

impl Default for TransferLedger {
    fn default() -> Self {
        TransferLedger::new(1)
    }
}

impl TransferLedger {
    pub fn new(first_image_number: u16) -> TransferLedger {
        TransferLedger {
            data: Mutex::new(LedgerData {
                files: Default::default(),
                next_image_number: first_image_number,
            }),
        }
    }

    /// Registers a file as pending and assigns the next image number to it. Returns `None` if
    ///  the file is already being transferred. Files that finished earlier may be transferred
    ///  again.
    pub async fn begin(&self, path: &Path) -> Option<u16> {
        let mut data = self.data.lock().await;

        if data.files.get(path) == Some(&FileStatus::Pending) {
            debug!("{:?} is already being transferred - skipping", path);
            return None;
        }
        data.files.insert(path.to_path_buf(), FileStatus::Pending);

        let image_number = data.next_image_number;
        data.next_image_number = data.next_image_number.wrapping_add(1);
        Some(image_number)
    }

    pub async fn finish(&self, path: &Path, success: bool) {
        let status = if success { FileStatus::Success } else { FileStatus::Failure };
        self.data.lock().await
            .files
            .insert(path.to_path_buf(), status);
    }

    pub async fn status(&self, path: &Path) -> Option<FileStatus> {
        self.data.lock().await
            .files
            .get(path)
            .copied()
    }

    pub async fn statistics(&self) -> TransferStatistics {
        let data = self.data.lock().await;

        let mut result = TransferStatistics {
            total: data.files.len(),
            ..Default::default()
        };
        for status in data.files.values() {
            match status {
                FileStatus::Pending => result.pending += 1,
                FileStatus::Success => result.success += 1,
                FileStatus::Failure => result.failure += 1,
            }
        }
        result
    }
}
