//! Cloud object storage used for both originals and cached variants.

pub mod object;

pub use object::ObjectStorage;

use crate::transform::params::TransformParams;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;

/// Cloud bucket holding originals and previously produced variants.
///
/// Variants are addressed by `(path, params)`, originals by path alone.
#[async_trait]
pub trait CloudStorage: Send + Sync {
    async fn exists(&self, path: &str, params: &TransformParams) -> crate::Result<bool>;

    async fn download(&self, path: &str, params: &TransformParams) -> crate::Result<Bytes>;

    async fn exists_original(&self, path: &str) -> crate::Result<bool>;

    /// Fetches an original, failing with `TooLarge` when it exceeds `max_bytes`.
    async fn download_original(&self, path: &str, max_bytes: u64) -> crate::Result<Bytes>;

    /// Stores a variant and returns its location.
    async fn upload(
        &self,
        path: &str,
        params: &TransformParams,
        data: Bytes,
        content_type: Option<&str>,
    ) -> crate::Result<String>;
}

/// Where originals live, decided once at startup.
///
/// A cloud-backed deployment never reads the local origin folder and a local
/// deployment never talks to the cloud.
#[derive(Clone)]
pub enum StorageMode {
    CloudBacked(Arc<dyn CloudStorage>),
    LocalOnly { origin_root: PathBuf },
}

impl StorageMode {
    pub fn cloud(&self) -> Option<&Arc<dyn CloudStorage>> {
        match self {
            StorageMode::CloudBacked(cloud) => Some(cloud),
            StorageMode::LocalOnly { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StorageMode::CloudBacked(_) => "cloud",
            StorageMode::LocalOnly { .. } => "local",
        }
    }
}

impl std::fmt::Debug for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::CloudBacked(_) => f.write_str("CloudBacked"),
            StorageMode::LocalOnly { origin_root } => f
                .debug_struct("LocalOnly")
                .field("origin_root", origin_root)
                .finish(),
        }
    }
}
