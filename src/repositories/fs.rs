use super::{is_partial, is_pdf, PaperStore, WriteOutcome};
use crate::{Error, Result};
use async_trait::async_trait;
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Paper store backed by the watched directory
#[derive(Debug, Clone)]
pub struct FsPaperStore {
    root: PathBuf,
}

impl FsPaperStore {
    /// Open the directory, creating it if missing and checking it is writable
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(&root).await.map_err(|e| {
            Error::invalid_config(
                "downloads.directory",
                format!("cannot create {}: {e}", root.display()),
            )
        })?;

        let metadata = fs::metadata(&root).await?;
        if !metadata.is_dir() {
            return Err(Error::invalid_config(
                "downloads.directory",
                format!("{} is not a directory", root.display()),
            ));
        }

        let store = Self { root };
        store.check_writable().await?;
        debug!("Opened paper directory");
        Ok(store)
    }

    /// Directory this store writes into
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn check_writable(&self) -> Result<()> {
        let marker = self.temp_path(".write-check");
        let result = fs::write(&marker, b"").await;
        let _ = fs::remove_file(&marker).await;
        result.map_err(|e| {
            Error::invalid_config(
                "downloads.directory",
                format!("{} is not writable: {e}", self.root.display()),
            )
        })
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        let suffix: u32 = rand::thread_rng().gen();
        self.root.join(format!(".{name}.{suffix:08x}.part"))
    }

    fn final_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(|c: char| c == '/' || c == '\\')
            || Path::new(name).file_name().map_or(true, |f| f != name)
        {
            return Err(Error::InvalidInput {
                field: "file_name".to_string(),
                reason: format!("'{name}' is not a plain file name"),
            });
        }
        Ok(self.root.join(name))
    }

    /// Write and flush `bytes` into a fresh temporary file
    async fn write_temp(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Move the completed temp file to `target` without clobbering
    async fn link_into_place(temp: &Path, target: &Path) -> std::io::Result<WriteOutcome> {
        match fs::hard_link(temp, target).await {
            Ok(()) => Ok(WriteOutcome::Written),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(WriteOutcome::AlreadyExists),
            Err(e) => {
                // Filesystems without hard links fall back to check-then-rename
                debug!("hard link unavailable ({}), renaming instead", e);
                if fs::try_exists(target).await? {
                    Ok(WriteOutcome::AlreadyExists)
                } else {
                    fs::rename(temp, target).await?;
                    Ok(WriteOutcome::Written)
                }
            }
        }
    }
}

#[async_trait]
impl PaperStore for FsPaperStore {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.final_path(name)?;
        Ok(fs::try_exists(&path).await?)
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn write_new(&self, name: &str, bytes: &[u8]) -> Result<WriteOutcome> {
        let target = self.final_path(name)?;
        let temp = self.temp_path(name);

        let result = match Self::write_temp(&temp, bytes).await {
            Ok(()) => Self::link_into_place(&temp, &target).await,
            Err(e) => Err(e),
        };

        // The temp file is either linked (and now redundant), renamed away, or garbage
        if let Err(e) = fs::remove_file(&temp).await {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove temp file {}: {}", temp.display(), e);
            }
        }

        let outcome = result?;
        if outcome == WriteOutcome::AlreadyExists {
            debug!("{} appeared during download, keeping existing file", name);
        }
        Ok(outcome)
    }

    async fn replace(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let target = self.final_path(name)?;
        let temp = self.temp_path(name);

        let result = match Self::write_temp(&temp, bytes).await {
            Ok(()) => fs::rename(&temp, &target).await,
            Err(e) => Err(e),
        };

        if result.is_err() {
            let _ = fs::remove_file(&temp).await;
        }
        Ok(result?)
    }

    async fn list_pdfs(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if is_pdf(name) && entry.file_type().await?.is_file() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn sweep_partials(&self) -> Result<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if is_partial(name) {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to remove stale temp file {}: {}", name, e),
                }
            }
        }
        if removed > 0 {
            info!("Removed {} stale partial downloads", removed);
        }
        Ok(removed)
    }
}
