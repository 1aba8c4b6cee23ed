//! Ordered lookup across the cache tiers: cloud (when configured) then local disk.

use crate::cache::{Cache, CacheEntry, CacheKey};
use crate::request::TransformRequest;
use crate::storage::CloudStorage;
use std::sync::Arc;

/// Tier that satisfied a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Cloud,
    Local,
}

impl CacheTier {
    pub fn header_value(&self) -> &'static str {
        match self {
            CacheTier::Cloud => "HIT-CLOUD",
            CacheTier::Local => "HIT-LOCAL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheHit {
    pub entry: CacheEntry,
    pub tier: CacheTier,
}

/// Tiered cache resolver.
///
/// Tiers are queried strictly in order and the first hit is returned as is.
/// An error at any tier counts as a miss for that tier.
pub struct TieredCache {
    cloud: Option<Arc<dyn CloudStorage>>,
    local: Arc<dyn Cache>,
}

impl TieredCache {
    pub fn new(cloud: Option<Arc<dyn CloudStorage>>, local: Arc<dyn Cache>) -> Self {
        Self { cloud, local }
    }

    pub async fn resolve(&self, req: &TransformRequest, key: &CacheKey) -> Option<CacheHit> {
        let content_type = req.content_type();

        if let Some(cloud) = &self.cloud {
            match Self::lookup_cloud(cloud.as_ref(), req).await {
                Ok(Some(bytes)) => {
                    tracing::info!(path = %req.path, key = %key, "Serving from cloud cache");
                    return Some(CacheHit {
                        entry: CacheEntry { bytes, content_type },
                        tier: CacheTier::Cloud,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %req.path, error = %e, "Cloud cache error, falling back to local cache");
                }
            }
        }

        match self.local.get(key).await {
            Ok(Some(bytes)) => {
                tracing::info!(path = %req.path, key = %key, "Serving from local cache");
                Some(CacheHit {
                    entry: CacheEntry { bytes, content_type },
                    tier: CacheTier::Local,
                })
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(path = %req.path, key = %key, error = %e, "Local cache error, treating as miss");
                None
            }
        }
    }

    async fn lookup_cloud(
        cloud: &dyn CloudStorage,
        req: &TransformRequest,
    ) -> crate::Result<Option<bytes::Bytes>> {
        if !cloud.exists(&req.path, &req.params).await? {
            return Ok(None);
        }
        cloud.download(&req.path, &req.params).await.map(Some)
    }
}
