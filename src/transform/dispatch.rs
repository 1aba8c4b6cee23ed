use crate::cache::{CacheEntry, CacheKey};
use crate::media::{self, MediaKind};
use crate::origin::OriginSource;
use crate::request::TransformRequest;
use crate::transform::{StagingFile, TransformEngine};
use crate::MediaError;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;

/// Routes a request to the image or video engine.
pub struct Dispatcher {
    engine: Arc<dyn TransformEngine>,
    staging_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(engine: Arc<dyn TransformEngine>, staging_dir: PathBuf) -> Self {
        Self { engine, staging_dir }
    }

    /// Engine family for the request's source extension.
    pub fn classify(req: &TransformRequest) -> crate::Result<MediaKind> {
        media::classify(&req.extension)
            .ok_or_else(|| MediaError::UnsupportedType(req.extension.clone()))
    }

    /// Transforms one origin. Downloaded origins are staged first; the staging
    /// file lives only for the duration of this call.
    pub async fn transform(
        &self,
        req: &TransformRequest,
        key: &CacheKey,
        source: OriginSource,
    ) -> crate::Result<CacheEntry> {
        let kind = Self::classify(req)?;

        let staged;
        let path = match source {
            OriginSource::File(path) => path,
            OriginSource::Bytes(data) => {
                staged = StagingFile::create(&self.staging_dir, key, &req.extension, data).await?;
                staged.path().to_path_buf()
            }
        };

        let start = std::time::Instant::now();
        let output = match kind {
            MediaKind::Image => self.engine.transform_image(&path, &req.params).await,
            MediaKind::Video => self.engine.transform_video(&path, &req.params).await,
        };

        match &output {
            Ok(bytes) => tracing::info!(
                path = %req.path,
                kind = ?kind,
                size_bytes = bytes.len(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Transform complete"
            ),
            Err(e) => tracing::error!(path = %req.path, kind = ?kind, error = %e, "Transform failed"),
        }

        Ok(CacheEntry {
            bytes: Bytes::from(output?),
            content_type: req.content_type(),
        })
    }
}
