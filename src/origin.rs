//! Existence checks and retrieval of untransformed source files.

use crate::storage::{CloudStorage, StorageMode};
use crate::MediaError;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;

/// A source known to exist in the active store.
#[derive(Debug, Clone)]
pub enum Origin {
    /// File under the local origin root.
    Local(PathBuf),
    /// Object in the cloud bucket, not yet downloaded.
    Cloud(String),
}

/// Origin content handed to the transform dispatcher.
#[derive(Debug, Clone)]
pub enum OriginSource {
    /// Engines can read this path directly.
    File(PathBuf),
    /// Downloaded bytes that must be staged to disk first.
    Bytes(Bytes),
}

pub struct OriginResolver {
    mode: StorageMode,
    max_input_size: u64,
}

impl OriginResolver {
    pub fn new(mode: StorageMode, max_input_size: u64) -> Self {
        Self { mode, max_input_size }
    }

    fn too_large(&self, path: &str, size: u64) -> MediaError {
        tracing::warn!(path, size, max = self.max_input_size, "Origin exceeds input size limit");
        MediaError::TooLarge {
            path: path.to_string(),
            size,
            max: self.max_input_size,
        }
    }

    /// Single existence check against the active store. Absence is terminal.
    pub async fn locate(&self, path: &str) -> crate::Result<Origin> {
        match &self.mode {
            StorageMode::CloudBacked(cloud) => {
                let exists = cloud.exists_original(path).await.unwrap_or_else(|e| {
                    tracing::warn!(path, error = %e, "Error checking cloud storage for original file");
                    false
                });
                if !exists {
                    tracing::error!(path, "File not found in cloud storage");
                    return Err(MediaError::NotFound {
                        path: path.to_string(),
                        store: "your cloud storage bucket",
                    });
                }
                Ok(Origin::Cloud(path.to_string()))
            }
            StorageMode::LocalOnly { origin_root } => {
                let full = origin_root.join(path);
                let meta = tokio::fs::metadata(&full).await.ok().filter(|m| m.is_file());
                let Some(meta) = meta else {
                    tracing::error!(path, root = %origin_root.display(), "File not found locally");
                    return Err(MediaError::NotFound {
                        path: path.to_string(),
                        store: "the origin folder",
                    });
                };
                if meta.len() > self.max_input_size {
                    return Err(self.too_large(path, meta.len()));
                }
                Ok(Origin::Local(full))
            }
        }
    }

    /// Makes a located origin available to the engines.
    pub async fn open(&self, origin: Origin) -> crate::Result<OriginSource> {
        match origin {
            Origin::Local(path) => {
                tracing::debug!(path = %path.display(), "Processing from local file");
                Ok(OriginSource::File(path))
            }
            Origin::Cloud(path) => {
                tracing::debug!(path = %path, "Processing from cloud file");
                let cloud: &Arc<dyn CloudStorage> = self
                    .mode
                    .cloud()
                    .ok_or_else(|| MediaError::Config("cloud origin without a cloud store".into()))?;
                let data = cloud.download_original(&path, self.max_input_size).await?;
                if data.len() as u64 > self.max_input_size {
                    return Err(self.too_large(&path, data.len() as u64));
                }
                Ok(OriginSource::Bytes(data))
            }
        }
    }
}
