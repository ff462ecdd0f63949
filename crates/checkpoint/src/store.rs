//! Blob storage rooted at the run directory
//!
//! Each individual blob write goes to a temporary file, is fsynced, and is
//! renamed into place, so a crash can leave the *record* mixed between old
//! and new blobs, but never a torn blob.

use async_trait::async_trait;
use bytes::Bytes;
use runtime_core::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Async blob store interface for the checkpoint record.
///
/// Paths are relative to the run directory. Remote backends (shared object
/// stores) implement the same surface.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create the store's root location if it does not yet exist
    async fn ensure_root(&self) -> Result<()>;

    /// Read a blob; `StoragePathNotFound` if absent
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Write a blob atomically, creating parent directories as needed
    async fn write(&self, path: &str, data: Bytes) -> Result<u64>;

    /// Whether a blob exists at the path
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Names of the entries directly under a directory; empty if the
    /// directory does not exist
    async fn list_dir(&self, path: &str) -> Result<Vec<String>>;

    /// Delete a blob; `StoragePathNotFound` if absent
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Blob store over a local (or network-mounted, shared) filesystem directory
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::Storage {
                message: format!("failed to create run directory {:?}: {}", self.root, e),
            })
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let full = self.resolve(path);
        match fs::read(&full).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::StoragePathNotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(Error::Storage {
                message: format!("failed to read {}: {}", path, e),
            }),
        }
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<u64> {
        let full = self.resolve(path);
        let size = data.len() as u64;

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Error::Storage {
                message: format!("failed to create directory {:?}: {}", parent, e),
            })?;
        }

        // Temp name carries the final name so a crashed run's leftovers are
        // attributable; rename publishes the blob.
        let tmp = full.with_extension("tmp");
        let mut file = fs::File::create(&tmp).await.map_err(|e| Error::Storage {
            message: format!("failed to create {:?}: {}", tmp, e),
        })?;
        file.write_all(&data).await.map_err(|e| Error::Storage {
            message: format!("failed to write {}: {}", path, e),
        })?;
        file.sync_all().await.map_err(|e| Error::Storage {
            message: format!("failed to sync {}: {}", path, e),
        })?;
        fs::rename(&tmp, &full).await.map_err(|e| Error::Storage {
            message: format!("failed to publish {}: {}", path, e),
        })?;

        debug!(path, size, "Blob written");
        Ok(size)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(fs::metadata(self.resolve(path)).await.is_ok())
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let full = self.resolve(path);
        let mut entries = match fs::read_dir(&full).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::Storage {
                    message: format!("failed to list {}: {}", path, e),
                })
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(Error::Io)? {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        match fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::StoragePathNotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(Error::Storage {
                message: format!("failed to delete {}: {}", path, e),
            }),
        }
    }
}
