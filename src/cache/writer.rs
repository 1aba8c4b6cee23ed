use crate::cache::{Cache, CacheEntry, CacheKey};
use crate::request::TransformRequest;
use crate::storage::CloudStorage;
use std::sync::Arc;

/// Persists freshly produced variants.
///
/// The local cache is always written. With a cloud store the variant is also
/// uploaded, and the local copy is removed once the upload succeeds; if the
/// upload fails the local copy stays behind as the fallback entry.
pub struct CacheWriter {
    local: Arc<dyn Cache>,
    cloud: Option<Arc<dyn CloudStorage>>,
}

impl CacheWriter {
    pub fn new(local: Arc<dyn Cache>, cloud: Option<Arc<dyn CloudStorage>>) -> Self {
        Self { local, cloud }
    }

    /// Never fails: every error here is logged and the caller still serves `entry`.
    pub async fn commit(&self, req: &TransformRequest, key: &CacheKey, entry: &CacheEntry) {
        if let Err(e) = self.local.put(key, &entry.bytes).await {
            tracing::warn!(path = %req.path, key = %key, error = %e, "Failed to write local cache");
        }

        let Some(cloud) = &self.cloud else {
            return;
        };

        match cloud
            .upload(&req.path, &req.params, entry.bytes.clone(), entry.content_type)
            .await
        {
            Ok(location) => {
                tracing::debug!(path = %req.path, location = %location, "Uploaded variant to cloud cache");
                if let Err(e) = self.local.remove(key).await {
                    tracing::warn!(key = %key, error = %e, "Failed to clean up local cache after upload");
                }
            }
            Err(e) => {
                tracing::warn!(path = %req.path, key = %key, error = %e, "Failed to upload to cloud cache, keeping local copy");
            }
        }
    }
}
