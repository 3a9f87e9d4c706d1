use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{info, warn};

/// Subdirectory holding uploads that are not committed yet.
const STAGING_DIR: &str = ".staging";

/// On-disk storage for uploaded files.
///
/// Each resource is a flat file at `{storage_dir}/{name}`. Names are
/// validated by the parser to contain no path separators. Uploads are
/// staged under `{storage_dir}/.staging` and renamed into place once their
/// record is saved, so a rejected or failed upload never touches the live
/// file.
pub struct FileStore {
    dir: PathBuf,
    staging: PathBuf,
    next_stage: AtomicU64,
}

/// An upload written to the staging area.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl FileStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        let staging = dir.join(STAGING_DIR);
        fs::create_dir_all(&staging).await?;
        info!("File storage directory: {}", dir.display());
        Ok(Self {
            dir,
            staging,
            next_stage: AtomicU64::new(0),
        })
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write `data` to a fresh staging file.
    pub async fn stage(&self, data: &[u8]) -> Result<StagedFile> {
        let seq = self.next_stage.fetch_add(1, Ordering::Relaxed);
        let path = self
            .staging
            .join(format!("{}-{}.part", std::process::id(), seq));
        fs::write(&path, data).await?;
        Ok(StagedFile { path })
    }

    /// Move a staged upload into place as `name`, replacing any previous
    /// content.
    pub async fn commit(&self, staged: StagedFile, name: &str) -> Result<()> {
        fs::rename(&staged.path, self.file_path(name)).await?;
        Ok(())
    }

    /// Drop a staged upload.
    pub async fn discard(&self, staged: StagedFile) {
        if let Err(e) = fs::remove_file(&staged.path).await {
            warn!("Failed to remove staged file {}: {}", staged.path.display(), e);
        }
    }

    /// Read a whole file. `None` when it is not on disk.
    pub async fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.file_path(name)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("File {} not on disk", name);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
