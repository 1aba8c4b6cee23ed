use crate::cache::{Cache, CacheKey};
use crate::MediaError;
use bytes::Bytes;
use std::io::Write;
use std::path::PathBuf;
use tokio::fs;

/// Disk-based cache: one file per key under `dir`.
///
/// Writes land in a temp file in the same directory and are renamed into
/// place, so concurrent readers see either no entry or a complete one.
/// There is no eviction.
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }
}

#[async_trait::async_trait]
impl Cache for DiskCache {
    async fn get(&self, key: &CacheKey) -> crate::Result<Option<Bytes>> {
        let p = self.path_for(key);
        match fs::metadata(&p).await {
            Ok(meta) => {
                if meta.is_file() {
                    let data = fs::read(&p).await.map_err(|e| MediaError::Cache(e.to_string()))?;
                    Ok(Some(Bytes::from(data)))
                } else {
                    Ok(None)
                }
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Ok(None)
                } else {
                    Err(MediaError::Cache(e.to_string()))
                }
            }
        }
    }

    async fn put(&self, key: &CacheKey, data: &[u8]) -> crate::Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| MediaError::Cache(e.to_string()))?;

        let dir = self.dir.clone();
        let target = self.path_for(key);
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&data)?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| MediaError::Cache(e.to_string()))?
        .map_err(|e| MediaError::Cache(e.to_string()))
    }

    async fn remove(&self, key: &CacheKey) -> crate::Result<bool> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MediaError::Cache(e.to_string())),
        }
    }
}
