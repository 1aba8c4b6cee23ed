use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use mediakit::cache::{Cache, CacheKey, DiskCache};
use mediakit::config::{Limits, MediaConfig};
use mediakit::request::TransformRequest;
use mediakit::storage::object::{DEFAULT_CACHE_PREFIX, DEFAULT_ORIGINALS_PREFIX};
use mediakit::storage::{CloudStorage, ObjectStorage, StorageMode};
use mediakit::transform::params::TransformParams;
use mediakit::transform::TransformEngine;
use mediakit::{router, MediaError, MediaService};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

/// Engine stub: echoes the source file followed by `|<canonical params>`.
#[derive(Default)]
struct StubEngine {
    calls: AtomicUsize,
    delay: Duration,
    fail: Option<String>,
    seen_paths: parking_lot::Mutex<Vec<PathBuf>>,
}

impl StubEngine {
    fn slow(delay: Duration) -> Self {
        Self { delay, ..Default::default() }
    }

    fn failing(msg: &str) -> Self {
        Self { fail: Some(msg.to_string()), ..Default::default() }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn run(&self, path: &Path, params: &TransformParams) -> mediakit::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_paths.lock().push(path.to_path_buf());
        tokio::time::sleep(self.delay).await;
        if let Some(msg) = &self.fail {
            return Err(MediaError::Processing(msg.clone()));
        }
        let mut out = tokio::fs::read(path).await?;
        out.extend_from_slice(format!("|{}", params.canonical()).as_bytes());
        Ok(out)
    }
}

#[async_trait]
impl TransformEngine for StubEngine {
    async fn transform_image(&self, path: &Path, params: &TransformParams) -> mediakit::Result<Vec<u8>> {
        self.run(path, params).await
    }

    async fn transform_video(&self, path: &Path, params: &TransformParams) -> mediakit::Result<Vec<u8>> {
        self.run(path, params).await
    }
}

/// Fails the test on any use.
struct UntouchableCache;

#[async_trait]
impl Cache for UntouchableCache {
    async fn get(&self, _key: &CacheKey) -> mediakit::Result<Option<Bytes>> {
        panic!("local cache must not be read");
    }

    async fn put(&self, _key: &CacheKey, _data: &[u8]) -> mediakit::Result<()> {
        panic!("local cache must not be written");
    }

    async fn remove(&self, _key: &CacheKey) -> mediakit::Result<bool> {
        panic!("local cache must not be touched");
    }
}

/// Cloud store wrapper with switchable failures.
struct FlakyCloud {
    inner: ObjectStorage,
    fail_lookup: AtomicBool,
    fail_upload: AtomicBool,
    original_checks: AtomicUsize,
}

impl FlakyCloud {
    fn new(inner: ObjectStorage) -> Self {
        Self {
            inner,
            fail_lookup: AtomicBool::new(false),
            fail_upload: AtomicBool::new(false),
            original_checks: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CloudStorage for FlakyCloud {
    async fn exists(&self, path: &str, params: &TransformParams) -> mediakit::Result<bool> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(MediaError::Storage("connection reset".into()));
        }
        self.inner.exists(path, params).await
    }

    async fn download(&self, path: &str, params: &TransformParams) -> mediakit::Result<Bytes> {
        self.inner.download(path, params).await
    }

    async fn exists_original(&self, path: &str) -> mediakit::Result<bool> {
        self.original_checks.fetch_add(1, Ordering::SeqCst);
        self.inner.exists_original(path).await
    }

    async fn download_original(&self, path: &str, max_bytes: u64) -> mediakit::Result<Bytes> {
        self.inner.download_original(path, max_bytes).await
    }

    async fn upload(
        &self,
        path: &str,
        params: &TransformParams,
        data: Bytes,
        content_type: Option<&str>,
    ) -> mediakit::Result<String> {
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(MediaError::Storage("upload rejected".into()));
        }
        self.inner.upload(path, params, data, content_type).await
    }
}

struct Harness {
    dir: TempDir,
    engine: Arc<StubEngine>,
    app: Router,
}

impl Harness {
    fn local(engine: StubEngine) -> Self {
        Self::local_with_limits(engine, Limits::default())
    }

    fn local_with_limits(engine: StubEngine, limits: Limits) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(engine);
        let mode = StorageMode::LocalOnly {
            origin_root: dir.path().join("public"),
        };
        let service = MediaService::with_limits(
            mode,
            Arc::new(DiskCache::new(dir.path().join("cache"))),
            engine.clone(),
            dir.path().join("temp"),
            limits,
        );
        let app = router(service, &MediaConfig::default());
        Self { dir, engine, app }
    }

    fn cloud(engine: StubEngine, cloud: Arc<dyn CloudStorage>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(engine);
        let service = MediaService::new(
            StorageMode::CloudBacked(cloud),
            Arc::new(DiskCache::new(dir.path().join("cache"))),
            engine.clone(),
            dir.path().join("temp"),
        );
        let app = router(service, &MediaConfig::default());
        Self { dir, engine, app }
    }

    async fn add_origin(&self, path: &str, data: &[u8]) {
        let full = self.dir.path().join("public").join(path);
        tokio::fs::create_dir_all(full.parent().unwrap()).await.unwrap();
        tokio::fs::write(full, data).await.unwrap();
    }

    fn local_cache(&self) -> DiskCache {
        DiskCache::new(self.dir.path().join("cache"))
    }

    async fn cache_file_count(&self) -> usize {
        count_files(&self.dir.path().join("cache")).await
    }

    async fn staging_file_count(&self) -> usize {
        count_files(&self.dir.path().join("temp")).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
        get(&self.app, uri).await
    }
}

async fn count_files(dir: &Path) -> usize {
    let mut count = 0;
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Some(_entry) = entries.next_entry().await.unwrap() {
            count += 1;
        }
    }
    count
}

async fn get(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}

fn key_for(route_path: &str) -> CacheKey {
    CacheKey::derive(&TransformRequest::parse(route_path))
}

fn params(segment: &str) -> TransformParams {
    let mut p = TransformParams::default();
    p.apply_segment(segment);
    p
}

fn memory_storage() -> (Arc<InMemory>, ObjectStorage) {
    let mem = Arc::new(InMemory::new());
    let storage = ObjectStorage::new(mem.clone(), DEFAULT_ORIGINALS_PREFIX, DEFAULT_CACHE_PREFIX);
    (mem, storage)
}

async fn put_object(mem: &InMemory, location: &str, data: &'static [u8]) {
    mem.put(&ObjectPath::from(location), PutPayload::from(Bytes::from_static(data)))
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Local-only mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_origin_returns_404_naming_path() {
    let h = Harness::local(StubEngine::default());

    let (status, _, body) = h.get("/cdn/photo.png").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(String::from_utf8_lossy(&body).contains("photo.png"));
    assert_eq!(h.engine.calls(), 0);
}

#[tokio::test]
async fn test_unsupported_extension_returns_400_without_side_effects() {
    let h = Harness::local(StubEngine::default());
    h.add_origin("clip.mkv", b"matroska").await;

    let (status, _, body) = h.get("/cdn/w:100/clip.mkv").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(&body[..], b"Unsupported file type");
    assert_eq!(h.engine.calls(), 0);
    assert_eq!(h.cache_file_count().await, 0);
    assert_eq!(h.staging_file_count().await, 0);
}

#[tokio::test]
async fn test_unsupported_extension_without_origin_is_still_400() {
    let h = Harness::local(StubEngine::default());

    let (status, _, body) = h.get("/cdn/clip.mkv").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(&body[..], b"Unsupported file type");
}

#[tokio::test]
async fn test_path_without_extension_is_unsupported() {
    let h = Harness::local(StubEngine::default());
    h.add_origin("README", b"text").await;

    let (status, _, _) = h.get("/cdn/README").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_first_request_transforms_once_then_hits_local_cache() {
    let h = Harness::local(StubEngine::default());
    h.add_origin("img/cat.png", b"cat").await;

    let (status, headers, first) = h.get("/cdn/w:300,h:200/img/cat.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&first[..], b"cat|height=200&width=300");
    assert_eq!(headers["content-type"], "image/png");
    assert_eq!(headers["x-cache"], "MISS");
    assert_eq!(h.engine.calls(), 1);

    let key = key_for("w:300,h:200/img/cat.png");
    assert_eq!(h.local_cache().get(&key).await.unwrap(), Some(first.clone()));

    // Same variant, parameters in another order.
    let (status, headers, second) = h.get("/cdn/h:200/img/w:300/cat.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, first);
    assert_eq!(headers["x-cache"], "HIT-LOCAL");
    assert_eq!(headers["etag"], key.etag());
    assert_eq!(h.engine.calls(), 1);
}

#[tokio::test]
async fn test_prepopulated_local_cache_never_invokes_engine() {
    let h = Harness::local(StubEngine::failing("engine must not run"));
    let key = key_for("q:60/banner.jpg");
    h.local_cache().put(&key, b"cached-bytes").await.unwrap();

    let (status, headers, body) = h.get("/cdn/q:60/banner.jpg").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"cached-bytes");
    assert_eq!(headers["content-type"], "image/jpeg");
    assert_eq!(h.engine.calls(), 0);
}

#[tokio::test]
async fn test_format_param_sets_output_content_type() {
    let h = Harness::local(StubEngine::default());
    h.add_origin("cat.png", b"cat").await;

    let (status, headers, _) = h.get("/cdn/f:webp/cat.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "image/webp");

    let (_, headers, _) = h.get("/cdn/f:webp/cat.png").await;
    assert_eq!(headers["x-cache"], "HIT-LOCAL");
    assert_eq!(headers["content-type"], "image/webp");
}

#[tokio::test]
async fn test_video_is_routed_to_video_engine() {
    let h = Harness::local(StubEngine::default());
    h.add_origin("clips/intro.mov", b"moov").await;

    let (status, headers, body) = h.get("/cdn/clips/intro.mov").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "video/quicktime");
    assert_eq!(&body[..], b"moov|");
}

#[tokio::test]
async fn test_engine_failure_returns_500_with_message() {
    let h = Harness::local(StubEngine::failing("corrupt header"));
    h.add_origin("broken.gif", b"GIF8").await;

    let (status, _, body) = h.get("/cdn/broken.gif").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(&body[..], b"Processing failed: corrupt header");
    assert_eq!(h.cache_file_count().await, 0);
}

#[tokio::test]
async fn test_concurrent_identical_requests_share_one_transform() {
    let h = Harness::local(StubEngine::slow(Duration::from_millis(200)));
    h.add_origin("hero.jpg", b"hero").await;

    let (a, b) = tokio::join!(h.get("/cdn/w:640/hero.jpg"), h.get("/cdn/w:640/hero.jpg"));

    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);
    assert_eq!(a.2, b.2);
    assert_eq!(h.engine.calls(), 1);
}

#[tokio::test]
async fn test_local_cache_io_error_falls_through_to_origin() {
    let h = Harness::local(StubEngine::default());
    h.add_origin("cat.png", b"cat").await;
    // A plain file where the cache directory should be makes every lookup fail
    // with an I/O error other than NotFound.
    tokio::fs::write(h.dir.path().join("cache"), b"not a directory").await.unwrap();
    assert!(h.local_cache().get(&key_for("w:10/cat.png")).await.is_err());

    let (status, headers, body) = h.get("/cdn/w:10/cat.png").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"cat|width=10");
    assert_eq!(headers["x-cache"], "MISS");
    assert_eq!(h.engine.calls(), 1);
}

#[tokio::test]
async fn test_directory_at_cache_key_is_a_miss() {
    let h = Harness::local(StubEngine::default());
    h.add_origin("cat.png", b"cat").await;
    let key = key_for("h:20/cat.png");
    tokio::fs::create_dir_all(h.local_cache().path_for(&key)).await.unwrap();

    let (status, headers, body) = h.get("/cdn/h:20/cat.png").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"cat|height=20");
    assert_eq!(headers["x-cache"], "MISS");
    assert_eq!(h.engine.calls(), 1);
}

#[tokio::test]
async fn test_oversized_dimensions_are_ignored() {
    let h = Harness::local(StubEngine::default());
    h.add_origin("x.png", b"x").await;

    let (status, _, body) = h.get("/cdn/w:60000,h:60000,fit:fill/x.png").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"x|fit=fill");

    let (_, headers, _) = h.get("/cdn/fit:fill/x.png").await;
    assert_eq!(headers["x-cache"], "HIT-LOCAL");
    assert_eq!(h.engine.calls(), 1);
}

#[tokio::test]
async fn test_configured_limits_bound_dimensions_and_origin_size() {
    let limits = Limits {
        max_dimension: 100,
        max_input_size: 8,
    };
    let h = Harness::local_with_limits(StubEngine::default(), limits);
    h.add_origin("small.png", b"small").await;
    h.add_origin("large.png", b"far too large").await;

    let (status, _, body) = h.get("/cdn/w:200,h:50/small.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"small|height=50");

    let (status, _, body) = h.get("/cdn/w:50/large.png").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body).contains("large.png"));
    assert_eq!(h.engine.calls(), 1);
    assert_eq!(h.cache_file_count().await, 1);
}

// ---------------------------------------------------------------------------
// Cloud-backed mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cloud_hit_never_reads_local_cache_or_origin() {
    let (mem, storage) = memory_storage();
    put_object(&mem, "cache/width_100/a/cat.png", b"from-cloud").await;

    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(StubEngine::failing("engine must not run"));
    let cloud = Arc::new(FlakyCloud::new(storage));
    let service = MediaService::new(
        StorageMode::CloudBacked(cloud.clone()),
        Arc::new(UntouchableCache),
        engine.clone(),
        dir.path().join("temp"),
    );
    let app = router(service, &MediaConfig::default());

    let (status, headers, body) = get(&app, "/cdn/w:100/a/cat.png").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"from-cloud");
    assert_eq!(headers["x-cache"], "HIT-CLOUD");
    assert_eq!(cloud.original_checks.load(Ordering::SeqCst), 0);
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn test_cloud_missing_origin_returns_404() {
    let (_mem, storage) = memory_storage();
    let h = Harness::cloud(StubEngine::default(), Arc::new(storage));
    // A local origin must not count in cloud mode.
    h.add_origin("photo.png", b"local").await;

    let (status, _, body) = h.get("/cdn/photo.png").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("photo.png"));
    assert!(body.contains("cloud"));
    assert_eq!(h.engine.calls(), 0);
}

#[tokio::test]
async fn test_cloud_transform_uploads_and_drops_local_copy() {
    let (mem, storage) = memory_storage();
    put_object(&mem, "originals/a/cat.png", b"cat").await;
    let h = Harness::cloud(StubEngine::default(), Arc::new(storage.clone()));

    let (status, headers, body) = h.get("/cdn/w:100/a/cat.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"cat|width=100");
    assert_eq!(headers["x-cache"], "MISS");

    let key = key_for("w:100/a/cat.png");
    assert_eq!(h.local_cache().get(&key).await.unwrap(), None);
    assert!(storage.exists("a/cat.png", &params("w:100")).await.unwrap());
    assert_eq!(h.staging_file_count().await, 0);

    let (_, headers, again) = h.get("/cdn/w:100/a/cat.png").await;
    assert_eq!(headers["x-cache"], "HIT-CLOUD");
    assert_eq!(again, body);
    assert_eq!(h.engine.calls(), 1);
}

#[tokio::test]
async fn test_upload_failure_keeps_local_copy_as_fallback() {
    let (mem, storage) = memory_storage();
    put_object(&mem, "originals/dog.jpg", b"dog").await;
    let cloud = Arc::new(FlakyCloud::new(storage.clone()));
    cloud.fail_upload.store(true, Ordering::SeqCst);
    let h = Harness::cloud(StubEngine::default(), cloud);

    let (status, _, body) = h.get("/cdn/q:50/dog.jpg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"dog|quality=50");

    let key = key_for("q:50/dog.jpg");
    assert_eq!(h.local_cache().get(&key).await.unwrap(), Some(body.clone()));
    assert!(!storage.exists("dog.jpg", &params("q:50")).await.unwrap());
    assert_eq!(h.staging_file_count().await, 0);
    assert!(h.engine.seen_paths.lock()[0].starts_with(h.dir.path().join("temp")));

    let (_, headers, again) = h.get("/cdn/q:50/dog.jpg").await;
    assert_eq!(headers["x-cache"], "HIT-LOCAL");
    assert_eq!(again, body);
    assert_eq!(h.engine.calls(), 1);
}

#[tokio::test]
async fn test_cloud_tier_error_falls_through_to_local_cache() {
    let (_mem, storage) = memory_storage();
    let cloud = Arc::new(FlakyCloud::new(storage));
    cloud.fail_lookup.store(true, Ordering::SeqCst);
    let h = Harness::cloud(StubEngine::failing("engine must not run"), cloud);

    let key = key_for("w:50/logo.png");
    h.local_cache().put(&key, b"relay-copy").await.unwrap();

    let (status, headers, body) = h.get("/cdn/w:50/logo.png").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"relay-copy");
    assert_eq!(headers["x-cache"], "HIT-LOCAL");
}

#[tokio::test]
async fn test_cloud_engine_failure_cleans_staging_file() {
    let (mem, storage) = memory_storage();
    put_object(&mem, "originals/bad.webp", b"RIFF").await;
    let h = Harness::cloud(StubEngine::failing("truncated"), Arc::new(storage.clone()));

    let (status, _, body) = h.get("/cdn/bad.webp").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(String::from_utf8_lossy(&body).contains("truncated"));
    assert_eq!(h.staging_file_count().await, 0);
    assert!(!storage.exists("bad.webp", &TransformParams::default()).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_cloud_requests_with_same_base_name_stay_isolated() {
    let (mem, storage) = memory_storage();
    put_object(&mem, "originals/a/photo.png", b"alpha").await;
    put_object(&mem, "originals/b/photo.png", b"bravo").await;
    let h = Harness::cloud(
        StubEngine::slow(Duration::from_millis(150)),
        Arc::new(storage),
    );

    let (a, b) = tokio::join!(
        h.get("/cdn/w:100/a/photo.png"),
        h.get("/cdn/w:100/b/photo.png")
    );

    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);
    assert_eq!(&a.2[..], b"alpha|width=100");
    assert_eq!(&b.2[..], b"bravo|width=100");

    let seen = h.engine.seen_paths.lock().clone();
    assert_eq!(seen.len(), 2);
    assert_ne!(seen[0], seen[1]);
    assert_eq!(h.staging_file_count().await, 0);
}

// ---------------------------------------------------------------------------
// Observability
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_endpoint_reports_mode() {
    let h = Harness::local(StubEngine::default());

    let (status, _, body) = h.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["storage_mode"], "local");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_counters() {
    let h = Harness::local(StubEngine::default());
    h.get("/cdn/missing.png").await;

    let (status, headers, body) = h.get("/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers["content-type"].to_str().unwrap().starts_with("text/plain"));
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("mediakit_cache_hits_total{tier=\"local\"}"));
    assert!(text.contains("mediakit_cache_misses_total"));
    assert!(text.contains("mediakit_errors_total"));
}
