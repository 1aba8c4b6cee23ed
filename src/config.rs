use crate::storage::object::{DEFAULT_CACHE_PREFIX, DEFAULT_ORIGINALS_PREFIX};
use crate::transform::params::DEFAULT_MAX_DIMENSION;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_ROUTE_PREFIX: &str = "/cdn";
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Cloud bucket settings. Their presence selects the cloud-backed mode.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible providers
    pub endpoint: Option<String>,
    pub originals_prefix: String,
    pub cache_prefix: String,
}

/// Upper bounds on what a single request may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest accepted `width` / `height`; larger values are skipped as malformed
    pub max_dimension: u32,
    /// Largest origin file, in bytes, that is read for a transform
    pub max_input_size: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            max_input_size: 64 * 1024 * 1024,
        }
    }
}

/// Per-IP limit on the media route.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub per_second: u64,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { per_second: 10, burst_size: 30 }
    }
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub port: u16,
    /// Route prefix of the media endpoint, e.g. `/cdn`
    pub route_prefix: String,
    pub cache_dir: PathBuf,
    /// Originals in local-only mode
    pub origin_dir: PathBuf,
    /// Staging and ffmpeg scratch files
    pub staging_dir: PathBuf,
    pub ffmpeg_path: String,
    pub limits: Limits,
    pub storage: Option<S3Config>,
    /// `None` disables rate limiting
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            route_prefix: DEFAULT_ROUTE_PREFIX.into(),
            cache_dir: PathBuf::from("./cache"),
            origin_dir: PathBuf::from("./public"),
            staging_dir: PathBuf::from("./temp"),
            ffmpeg_path: "ffmpeg".into(),
            limits: Limits::default(),
            storage: None,
            rate_limit: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Route prefix must start with '/' and not end with '/': {0}")] InvalidPrefix(String),
    #[error("Storage bucket cannot be empty")] EmptyBucket,
    #[error("Rate limit values must be > 0")] InvalidRateLimit,
    #[error("Max dimension and max input size must be > 0")] InvalidLimits,
    #[error("Invalid value for {0}: {1}")] InvalidValue(&'static str, String),
}

impl MediaConfig {
    /// Reads the environment on top of the defaults.
    ///
    /// # Environment
    /// - `PORT`
    /// - `MEDIAKIT_ROUTE_PREFIX`, `MEDIAKIT_CACHE_DIR`, `MEDIAKIT_ORIGIN_DIR`,
    ///   `MEDIAKIT_STAGING_DIR`, `MEDIAKIT_FFMPEG_PATH`
    /// - `MEDIAKIT_MAX_DIMENSION`, `MEDIAKIT_MAX_INPUT_SIZE` (bytes)
    /// - `STORAGE_BUCKET` (enables cloud mode), `STORAGE_REGION`,
    ///   `STORAGE_ENDPOINT`, `STORAGE_ORIGINALS_PREFIX`, `STORAGE_CACHE_PREFIX`
    /// - `DISABLE_RATE_LIMIT`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(port) = std::env::var("PORT") {
            cfg.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PORT", port.clone()))?;
        }
        if let Ok(v) = std::env::var("MEDIAKIT_ROUTE_PREFIX") { cfg.route_prefix = v; }
        if let Ok(v) = std::env::var("MEDIAKIT_CACHE_DIR") { cfg.cache_dir = v.into(); }
        if let Ok(v) = std::env::var("MEDIAKIT_ORIGIN_DIR") { cfg.origin_dir = v.into(); }
        if let Ok(v) = std::env::var("MEDIAKIT_STAGING_DIR") { cfg.staging_dir = v.into(); }
        if let Ok(v) = std::env::var("MEDIAKIT_FFMPEG_PATH") { cfg.ffmpeg_path = v; }
        if let Ok(v) = std::env::var("MEDIAKIT_MAX_DIMENSION") {
            cfg.limits.max_dimension = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MEDIAKIT_MAX_DIMENSION", v.clone()))?;
        }
        if let Ok(v) = std::env::var("MEDIAKIT_MAX_INPUT_SIZE") {
            cfg.limits.max_input_size = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MEDIAKIT_MAX_INPUT_SIZE", v.clone()))?;
        }

        if let Ok(bucket) = std::env::var("STORAGE_BUCKET") {
            cfg.storage = Some(S3Config {
                bucket,
                region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".into()),
                endpoint: std::env::var("STORAGE_ENDPOINT").ok(),
                originals_prefix: std::env::var("STORAGE_ORIGINALS_PREFIX")
                    .unwrap_or_else(|_| DEFAULT_ORIGINALS_PREFIX.into()),
                cache_prefix: std::env::var("STORAGE_CACHE_PREFIX")
                    .unwrap_or_else(|_| DEFAULT_CACHE_PREFIX.into()),
            });
        }

        if std::env::var("DISABLE_RATE_LIMIT").is_err() {
            cfg.rate_limit = Some(RateLimitConfig::default());
        }

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.route_prefix;
        if !p.starts_with('/') || (p.len() > 1 && p.ends_with('/')) {
            return Err(ConfigError::InvalidPrefix(p.clone()));
        }
        if let Some(s3) = &self.storage {
            if s3.bucket.trim().is_empty() { return Err(ConfigError::EmptyBucket); }
        }
        if self.limits.max_dimension == 0 || self.limits.max_input_size == 0 {
            return Err(ConfigError::InvalidLimits);
        }
        if let Some(limit) = self.rate_limit {
            if limit.per_second == 0 || limit.burst_size == 0 { return Err(ConfigError::InvalidRateLimit); }
        }
        Ok(())
    }
}
