//! Local object store for uploaded videos.
//!
//! Objects live as plain files under a root directory, addressed by the
//! relative path the uploader chose.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::backend::{ObjectStore, StoredObject};
use crate::error::{Error, Result};

/// Files-on-disk [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a store rooted at `root`. Relative roots resolve against the
    /// current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be read.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self { root })
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let clean = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(Error::validation(format!("invalid object path '{path}'")));
        }
        Ok(self.root.join(relative))
    }

    fn file_url(full: &Path) -> Result<String> {
        Url::from_file_path(full)
            .map(String::from)
            .map_err(|()| Error::internal(format!("cannot build URL for {}", full.display())))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, path: &str, data: Vec<u8>, content_type: &str) -> Result<StoredObject> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let content_hash = blake3::hash(&data).to_hex().to_string();
        let size = data.len() as u64;
        tokio::fs::write(&full, data).await?;

        debug!("Stored {} ({} bytes) at {}", path, size, full.display());
        Ok(StoredObject {
            path: path.to_string(),
            url: Self::file_url(&full)?,
            size,
            content_type: content_type.to_string(),
            content_hash,
        })
    }

    async fn url(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        if !tokio::fs::try_exists(&full).await? {
            return Err(Error::ObjectNotFound {
                path: path.to_string(),
            });
        }
        Self::file_url(&full)
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => {
                debug!("Removed {}", full.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
