pub mod disk;
pub mod tiered;
pub mod writer;

pub use disk::DiskCache;
pub use tiered::{CacheHit, CacheTier, TieredCache};
pub use writer::CacheWriter;

use crate::request::TransformRequest;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::fmt;

/// Deterministic identifier of one variant: SHA-256 over `path?canonical-params`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(req: &TransformRequest) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(req.path.as_bytes());
        hasher.update(b"?");
        hasher.update(req.params.canonical().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quoted form used as the HTTP ETag.
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A produced variant, as stored in any tier and as served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub bytes: Bytes,
    pub content_type: Option<&'static str>,
}

/// Local cache backend addressed by [`CacheKey`].
#[async_trait::async_trait]
pub trait Cache: Send + Sync {
    /// Cached bytes, or `None` when the key has no entry.
    async fn get(&self, key: &CacheKey) -> crate::Result<Option<Bytes>>;

    /// Stores the whole buffer, replacing any previous entry.
    async fn put(&self, key: &CacheKey, data: &[u8]) -> crate::Result<()>;

    /// Removes an entry; returns whether one existed.
    async fn remove(&self, key: &CacheKey) -> crate::Result<bool>;
}
