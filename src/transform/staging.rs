use crate::cache::CacheKey;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Local copy of cloud-resident origin bytes, for engines that need a path.
///
/// The file name is `{cache key}-{random}.{ext}`, so concurrent requests never
/// share a staging file even for origins with the same base name. The file is
/// deleted when the value is dropped, on success and on every error path.
#[derive(Debug)]
pub struct StagingFile {
    file: NamedTempFile,
}

impl StagingFile {
    pub async fn create(
        dir: &Path,
        key: &CacheKey,
        extension: &str,
        data: bytes::Bytes,
    ) -> crate::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let dir: PathBuf = dir.to_path_buf();
        let prefix = format!("{}-", key);
        let suffix = if extension.is_empty() {
            String::new()
        } else {
            format!(".{}", extension)
        };

        let file = tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
            let mut file = tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(&suffix)
                .tempfile_in(&dir)?;
            file.write_all(&data)?;
            file.flush()?;
            Ok(file)
        })
        .await
        .map_err(|e| crate::MediaError::Io(e.to_string()))??;

        tracing::debug!(path = %file.path().display(), "Staged origin for processing");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
