use crate::error::IngestError;
use crate::extractor::detect_kind;
use crate::llm::LanguageModel;
use crate::ocr::OcrEngine;
use crate::service::QaService;
use crate::traits::VectorIndex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::sleep;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: SystemTime,
    pub len: u64,
}

pub type FolderSnapshot = BTreeMap<PathBuf, FileStamp>;

/// Stamps of every supported document in `folder`, non-recursively. Two equal
/// snapshots mean nothing the pipeline cares about has changed.
pub fn snapshot_folder(folder: &Path) -> Result<FolderSnapshot, IngestError> {
    let mut snapshot = BTreeMap::new();

    for entry in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|error| IngestError::FolderScan(error.to_string()))?;
        if !entry.file_type().is_file() || detect_kind(entry.path()).is_none() {
            continue;
        }

        let metadata = entry
            .metadata()
            .map_err(|error| IngestError::FolderScan(error.to_string()))?;
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        snapshot.insert(
            entry.path().to_path_buf(),
            FileStamp {
                modified,
                len: metadata.len(),
            },
        );
    }

    Ok(snapshot)
}

/// Polling change watcher. On any difference between scans it waits for the
/// folder to settle, then triggers a full corpus rebuild through the service.
/// Partial uploads are covered by the settle wait: a file still being written
/// keeps changing its stamp, so the rebuild starts only after a quiet period.
pub struct FolderWatcher {
    folder: PathBuf,
    poll_interval: Duration,
    debounce: Duration,
}

impl FolderWatcher {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            poll_interval: Duration::from_secs(2),
            debounce: Duration::from_secs(1),
        }
    }

    pub fn with_intervals(mut self, poll_interval: Duration, debounce: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.debounce = debounce;
        self
    }

    /// Watches forever. Only an unreadable folder on the very first scan is
    /// fatal; later scan failures are logged and retried on the next poll.
    pub async fn run<S, O, L>(&self, service: &QaService<S, O, L>) -> Result<(), IngestError>
    where
        S: VectorIndex + Send + Sync,
        O: OcrEngine,
        L: LanguageModel,
    {
        let mut last = snapshot_folder(&self.folder)?;
        info!(folder = %self.folder.display(), files = last.len(), "watching folder");

        loop {
            sleep(self.poll_interval).await;

            let current = match snapshot_folder(&self.folder) {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    warn!(%error, "folder scan failed, retrying on next poll");
                    continue;
                }
            };

            if current == last {
                continue;
            }

            info!(folder = %self.folder.display(), "change detected, waiting for the folder to settle");
            last = self.wait_until_settled(current).await;

            match service.rebuild(&self.folder).await {
                Ok(report) => {
                    info!(
                        documents = report.documents,
                        chunks = report.chunks,
                        images = report.images,
                        skipped = report.skipped.len(),
                        "corpus rebuilt"
                    );
                }
                Err(error) => warn!(%error, "rebuild failed"),
            }
        }
    }

    /// Debounce: re-scan until two consecutive snapshots agree.
    async fn wait_until_settled(&self, mut current: FolderSnapshot) -> FolderSnapshot {
        loop {
            sleep(self.debounce).await;
            match snapshot_folder(&self.folder) {
                Ok(next) if next == current => return current,
                Ok(next) => current = next,
                Err(error) => {
                    warn!(%error, "folder unreadable while settling");
                    return current;
                }
            }
        }
    }
}
