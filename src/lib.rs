use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::trace::TraceLayer;

pub mod cache;
pub mod coalesce;
pub mod config;
pub mod media;
pub mod origin;
pub mod request;
pub mod service;
pub mod storage;
pub mod transform;

use crate::config::{MediaConfig, DEFAULT_CACHE_CONTROL};
pub use crate::service::MediaService;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("File not found: {path}. Make sure the file exists in {store}.")]
    NotFound { path: String, store: &'static str },
    #[error("Unsupported file type")]
    UnsupportedType(String),
    #[error("File too large: {path} is {size} bytes, the limit is {max} bytes")]
    TooLarge { path: String, size: u64, max: u64 },
    #[error("{0}")]
    Processing(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for MediaError {
    fn from(e: std::io::Error) -> Self {
        MediaError::Io(e.to_string())
    }
}

impl IntoResponse for MediaError {
    fn into_response(self) -> Response {
        match self {
            MediaError::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string()).into_response(),
            MediaError::UnsupportedType(_) | MediaError::TooLarge { .. } => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Processing failed: {}", other),
            )
                .into_response(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;

/// Process-wide request counters
pub struct Metrics {
    pub cloud_hits: AtomicU64,
    pub local_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub transforms: AtomicU64,
    pub coalesced: AtomicU64,
    pub errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cloud_hits: AtomicU64::new(0),
            local_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            transforms: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    pub static ref METRICS: Metrics = Metrics::new();
}

async fn media_handler(
    State(service): State<MediaService>,
    Path(path): Path<String>,
) -> Response {
    tracing::debug!(path = %path, "Processing media request");

    match service.serve(&path).await {
        Ok(served) => {
            let mut headers = HeaderMap::new();
            if let Some(ct) = served.entry.content_type {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(ct));
            }
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(DEFAULT_CACHE_CONTROL));
            if let Ok(etag) = HeaderValue::from_str(&served.key.etag()) {
                headers.insert(header::ETAG, etag);
            }
            headers.insert(
                HeaderName::from_static("x-cache"),
                HeaderValue::from_static(served.source.header_value()),
            );
            (headers, Body::from(served.entry.bytes)).into_response()
        }
        Err(e) => {
            METRICS.errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(path = %path, error = %e, "Media request failed");
            e.into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    pub storage_mode: &'static str,
}

/// Health check endpoint
async fn health_handler(State(service): State<MediaService>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: "mediakit",
        storage_mode: service.mode().name(),
    })
}

/// Metrics endpoint (Prometheus-compatible plain text)
async fn metrics_handler() -> impl IntoResponse {
    let counters = [
        ("mediakit_cache_hits_total{tier=\"cloud\"}", "cache_hits_total", &METRICS.cloud_hits),
        ("mediakit_cache_hits_total{tier=\"local\"}", "", &METRICS.local_hits),
        ("mediakit_cache_misses_total", "cache_misses_total", &METRICS.cache_misses),
        ("mediakit_transforms_total", "transforms_total", &METRICS.transforms),
        ("mediakit_coalesced_requests_total", "coalesced_requests_total", &METRICS.coalesced),
        ("mediakit_errors_total", "errors_total", &METRICS.errors),
    ];

    let mut body = String::new();
    for (series, family, counter) in counters {
        if !family.is_empty() {
            body.push_str(&format!("# TYPE mediakit_{} counter\n", family));
        }
        body.push_str(&format!("{} {}\n", series, counter.load(Ordering::Relaxed)));
    }

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        body,
    )
}

/// Builds the application router: the media route under the configured
/// prefix plus `/health` and `/metrics`.
///
/// Rate limiting keys on the peer address, so a rate-limited router must be
/// served with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(service: MediaService, config: &MediaConfig) -> Router {
    let route = if config.route_prefix == "/" {
        "/*path".to_string()
    } else {
        format!("{}/*path", config.route_prefix)
    };

    // Observability endpoints - NO rate limiting
    let observability_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(service.clone());

    let mut media_routes = Router::new()
        .route(&route, get(media_handler))
        .with_state(service);

    match config.rate_limit {
        Some(limit) => {
            let governor_conf = GovernorConfigBuilder::default()
                .per_second(limit.per_second)
                .burst_size(limit.burst_size)
                .finish();
            match governor_conf {
                Some(conf) => {
                    tracing::info!(
                        per_second = limit.per_second,
                        burst = limit.burst_size,
                        "Media route configured with rate limiting"
                    );
                    media_routes = media_routes.layer(GovernorLayer {
                        config: Box::leak(Box::new(conf)),
                    });
                }
                None => tracing::warn!("Invalid rate limit settings, rate limiting disabled"),
            }
        }
        None => tracing::info!("Rate limiting disabled"),
    }

    Router::new()
        .merge(observability_routes)
        .merge(media_routes)
        .layer(TraceLayer::new_for_http())
}
