//! Request resolution: cache tiers, origin, transform, cache write-back.

use crate::cache::{Cache, CacheEntry, CacheKey, CacheTier, CacheWriter, DiskCache, TieredCache};
use crate::coalesce::InFlight;
use crate::config::{Limits, MediaConfig};
use crate::origin::OriginResolver;
use crate::request::TransformRequest;
use crate::storage::{CloudStorage, ObjectStorage, StorageMode};
use crate::transform::{Dispatcher, MediaEngine, TransformEngine};
use crate::METRICS;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// How a response body was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache(CacheTier),
    Transformed,
}

impl Source {
    pub fn header_value(&self) -> &'static str {
        match self {
            Source::Cache(tier) => tier.header_value(),
            Source::Transformed => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Served {
    pub key: CacheKey,
    pub entry: CacheEntry,
    pub source: Source,
}

/// Everything a request needs, built once at startup and shared by all requests.
#[derive(Clone)]
pub struct MediaService {
    inner: Arc<Inner>,
    inflight: InFlight,
}

struct Inner {
    mode: StorageMode,
    limits: Limits,
    tiers: TieredCache,
    origin: OriginResolver,
    dispatcher: Dispatcher,
    writer: CacheWriter,
}

impl MediaService {
    /// Service with the default [`Limits`].
    pub fn new(
        mode: StorageMode,
        local: Arc<dyn Cache>,
        engine: Arc<dyn TransformEngine>,
        staging_dir: PathBuf,
    ) -> Self {
        Self::with_limits(mode, local, engine, staging_dir, Limits::default())
    }

    pub fn with_limits(
        mode: StorageMode,
        local: Arc<dyn Cache>,
        engine: Arc<dyn TransformEngine>,
        staging_dir: PathBuf,
        limits: Limits,
    ) -> Self {
        let cloud: Option<Arc<dyn CloudStorage>> = mode.cloud().cloned();
        let inner = Inner {
            tiers: TieredCache::new(cloud.clone(), local.clone()),
            origin: OriginResolver::new(mode.clone(), limits.max_input_size),
            dispatcher: Dispatcher::new(engine, staging_dir),
            writer: CacheWriter::new(local, cloud),
            mode,
            limits,
        };
        Self {
            inner: Arc::new(inner),
            inflight: InFlight::new(),
        }
    }

    /// Resolves the storage mode from configuration: a configured bucket means
    /// cloud-backed, otherwise originals come from the local origin folder.
    pub fn from_config(config: &MediaConfig) -> crate::Result<Self> {
        let mode = match &config.storage {
            Some(s3) => {
                let storage = ObjectStorage::s3(
                    &s3.bucket,
                    &s3.region,
                    s3.endpoint.as_deref(),
                    &s3.originals_prefix,
                    &s3.cache_prefix,
                )?;
                StorageMode::CloudBacked(Arc::new(storage))
            }
            None => StorageMode::LocalOnly {
                origin_root: config.origin_dir.clone(),
            },
        };
        let engine = MediaEngine::new(config.ffmpeg_path.clone(), config.staging_dir.clone())?;

        Ok(Self::with_limits(
            mode,
            Arc::new(DiskCache::new(config.cache_dir.clone())),
            Arc::new(engine),
            config.staging_dir.clone(),
            config.limits,
        ))
    }

    pub fn mode(&self) -> &StorageMode {
        &self.inner.mode
    }

    /// Serves one request path (the part after the route prefix).
    ///
    /// Cache hits return without touching the origin or an engine. On a miss
    /// the extension is classified, the origin located, and the transform run
    /// at most once per key across concurrent requests.
    pub async fn serve(&self, route_path: &str) -> crate::Result<Served> {
        let req = TransformRequest::parse_within(route_path, self.inner.limits.max_dimension);
        let key = CacheKey::derive(&req);

        if let Some(hit) = self.inner.tiers.resolve(&req, &key).await {
            let counter = match hit.tier {
                CacheTier::Cloud => &METRICS.cloud_hits,
                CacheTier::Local => &METRICS.local_hits,
            };
            counter.fetch_add(1, Ordering::Relaxed);
            return Ok(Served {
                key,
                entry: hit.entry,
                source: Source::Cache(hit.tier),
            });
        }

        METRICS.cache_misses.fetch_add(1, Ordering::Relaxed);
        Dispatcher::classify(&req)?;

        let inner = self.inner.clone();
        let entry = self
            .inflight
            .run(&key, || {
                let key = key.clone();
                async move { inner.produce(req, key).await }
            })
            .await?;

        Ok(Served {
            key,
            entry,
            source: Source::Transformed,
        })
    }
}

impl Inner {
    async fn produce(&self, req: TransformRequest, key: CacheKey) -> crate::Result<CacheEntry> {
        let origin = self.origin.locate(&req.path).await?;
        let source = self.origin.open(origin).await?;

        METRICS.transforms.fetch_add(1, Ordering::Relaxed);
        let entry = self.dispatcher.transform(&req, &key, source).await?;

        self.writer.commit(&req, &key, &entry).await;
        Ok(entry)
    }
}
