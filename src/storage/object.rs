use crate::storage::CloudStorage;
use crate::transform::params::TransformParams;
use crate::MediaError;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{
    Attribute, AttributeValue, Attributes, Error as ObjectStoreError, ObjectStore, PutOptions,
    PutPayload,
};
use std::sync::Arc;

pub const DEFAULT_ORIGINALS_PREFIX: &str = "originals";
pub const DEFAULT_CACHE_PREFIX: &str = "cache";

/// [`CloudStorage`] over any `object_store` backend.
///
/// Layout inside the bucket:
/// - originals: `{originals_prefix}/{path}`
/// - variants: `{cache_prefix}/{params}/{path}`, where `{params}` is the
///   canonical parameter set (`original` when empty)
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    originals_prefix: String,
    cache_prefix: String,
}

impl ObjectStorage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        originals_prefix: impl Into<String>,
        cache_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            originals_prefix: originals_prefix.into(),
            cache_prefix: cache_prefix.into(),
        }
    }

    /// S3 or an S3-compatible provider. Credentials come from the standard AWS
    /// environment variables.
    ///
    /// # Arguments
    /// * `endpoint_url` - Custom endpoint (e.g. `http://localhost:9000` for MinIO)
    pub fn s3(
        bucket: &str,
        region: &str,
        endpoint_url: Option<&str>,
        originals_prefix: &str,
        cache_prefix: &str,
    ) -> crate::Result<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket);

        if let Some(endpoint) = endpoint_url {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| MediaError::Config(e.to_string()))?;

        Ok(Self::new(Arc::new(store), originals_prefix, cache_prefix))
    }

    fn original_location(&self, path: &str) -> Path {
        Path::from(format!("{}/{}", self.originals_prefix, path))
    }

    fn variant_location(&self, path: &str, params: &TransformParams) -> Path {
        let variant = if params.is_empty() {
            "original".to_string()
        } else {
            params
                .to_map()
                .iter()
                .map(|(k, v)| format!("{}_{}", k, v))
                .collect::<Vec<_>>()
                .join("-")
        };
        Path::from(format!("{}/{}/{}", self.cache_prefix, variant, path))
    }

    async fn head(&self, location: &Path) -> crate::Result<bool> {
        match self.store.head(location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(MediaError::Storage(e.to_string())),
        }
    }

    async fn get(&self, location: &Path) -> crate::Result<Bytes> {
        let start = std::time::Instant::now();
        let result = self.store.get(location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => MediaError::Storage(format!("{} not found", location)),
            other => MediaError::Storage(other.to_string()),
        })?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| MediaError::Storage(e.to_string()))?;

        tracing::debug!(
            key = %location,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object download complete"
        );
        Ok(bytes)
    }
}

#[async_trait]
impl CloudStorage for ObjectStorage {
    async fn exists(&self, path: &str, params: &TransformParams) -> crate::Result<bool> {
        self.head(&self.variant_location(path, params)).await
    }

    async fn download(&self, path: &str, params: &TransformParams) -> crate::Result<Bytes> {
        self.get(&self.variant_location(path, params)).await
    }

    async fn exists_original(&self, path: &str) -> crate::Result<bool> {
        self.head(&self.original_location(path)).await
    }

    async fn download_original(&self, path: &str, max_bytes: u64) -> crate::Result<Bytes> {
        let location = self.original_location(path);
        let meta = self
            .store
            .head(&location)
            .await
            .map_err(|e| MediaError::Storage(e.to_string()))?;
        let size = meta.size as u64;
        if size > max_bytes {
            return Err(MediaError::TooLarge {
                path: path.to_string(),
                size,
                max: max_bytes,
            });
        }
        self.get(&location).await
    }

    async fn upload(
        &self,
        path: &str,
        params: &TransformParams,
        data: Bytes,
        content_type: Option<&str>,
    ) -> crate::Result<String> {
        let location = self.variant_location(path, params);
        let size = data.len();
        let start = std::time::Instant::now();

        let mut attributes = Attributes::new();
        if let Some(ct) = content_type {
            attributes.insert(Attribute::ContentType, AttributeValue::from(ct.to_string()));
        }
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&location, PutPayload::from(data), opts)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    key = %location,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Variant upload failed"
                );
                MediaError::Storage(e.to_string())
            })?;

        tracing::info!(
            key = %location,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Variant upload successful"
        );
        Ok(location.to_string())
    }
}
