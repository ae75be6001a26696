//! Artifact storage collaborator
//!
//! Stages hand generated bytes to an [`ObjectStore`] and get back a
//! serveable URI; they never touch disk paths directly. The shipped
//! implementation writes under a local media directory, mirroring how the
//! serving layer exposes `/media/*`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by artifact storage.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// Underlying I/O failure.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The object name would escape the store root.
    #[error("object name `{0}` is invalid")]
    InvalidName(String),
}

/// Durable storage for uploaded and generated media, addressed by URI.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `name` (relative, may contain subdirectories)
    /// and return the URI clients can fetch it from.
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<String, ObjectStoreError>;
}

/// Local-directory store serving artifacts under a public base path.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base: String,
}

impl LocalObjectStore {
    /// Open (creating if needed) a store rooted at `root`, with URIs
    /// prefixed by `public_base` (e.g. `/media`).
    pub fn open(
        root: impl Into<PathBuf>,
        public_base: impl Into<String>,
    ) -> Result<Self, ObjectStoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base: public_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, ObjectStoreError> {
        let relative = Path::new(name);
        let escapes = relative.components().any(|c| {
            !matches!(c, Component::Normal(_))
        });
        if name.is_empty() || escapes {
            return Err(ObjectStoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<String, ObjectStoreError> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(object = name, bytes = bytes.len(), "artifact stored");
        Ok(format!("{}/{}", self.public_base, name))
    }
}
