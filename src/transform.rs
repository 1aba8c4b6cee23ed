pub mod dispatch;
pub mod params;
pub mod staging;
pub mod video;

pub use dispatch::Dispatcher;
pub use staging::StagingFile;
pub use video::VideoEngine;

use crate::transform::params::{FitMode, Format, TransformParams};
use crate::MediaError;
use async_trait::async_trait;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;
use image::ImageEncoder;
use image::{DynamicImage, ExtendedColorType};
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub const DEFAULT_QUALITY: u8 = 80;

/// Pixel/frame transformation backends.
///
/// Both operate on a file path and treat `params` as the full description of
/// the wanted variant. The output encoding is `params.format`, falling back to
/// the extension of `path`.
#[async_trait]
pub trait TransformEngine: Send + Sync {
    async fn transform_image(&self, path: &Path, params: &TransformParams) -> crate::Result<Vec<u8>>;

    async fn transform_video(&self, path: &Path, params: &TransformParams) -> crate::Result<Vec<u8>>;
}

/// Output format for a source path: the requested one, else the source's own.
pub fn output_format(path: &Path, params: &TransformParams) -> crate::Result<Format> {
    if let Some(format) = params.format {
        return Ok(format);
    }
    path.extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| MediaError::Processing(format!("No extension on {}", path.display())))?
        .parse::<Format>()
        .map_err(MediaError::Processing)
}

/// `image`-crate pipeline for stills plus `ffmpeg` for video.
pub struct MediaEngine {
    video: VideoEngine,
}

impl MediaEngine {
    pub fn new(ffmpeg_path: String, scratch_dir: PathBuf) -> crate::Result<Self> {
        Ok(Self {
            video: VideoEngine::new(ffmpeg_path, scratch_dir)?,
        })
    }
}

#[async_trait]
impl TransformEngine for MediaEngine {
    async fn transform_image(&self, path: &Path, params: &TransformParams) -> crate::Result<Vec<u8>> {
        let format = output_format(path, params)?;
        let mut bytes = tokio::fs::read(path).await?;
        if is_avif(path, &bytes) {
            tracing::debug!(path = %path.display(), "Decoding AVIF source through ffmpeg");
            bytes = self.video.decode_still(path).await?;
        }
        let params = params.clone();

        tokio::task::spawn_blocking(move || {
            let img = decode_image(&bytes)?;
            let resized = resize_image(img, &params);
            encode_image(&resized, format, params.quality.unwrap_or(DEFAULT_QUALITY))
        })
        .await
        .map_err(|e| MediaError::Processing(e.to_string()))?
    }

    async fn transform_video(&self, path: &Path, params: &TransformParams) -> crate::Result<Vec<u8>> {
        self.video.transform(path, params).await
    }
}

/// AVIF sources are recognised by their `ftyp` brand or, failing that, by extension.
fn is_avif(path: &Path, bytes: &[u8]) -> bool {
    bytes
        .get(4..12)
        .is_some_and(|brand| brand == b"ftypavif" || brand == b"ftypavis")
        || path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("avif"))
}

/// Decodes raw image bytes, detecting the format from magic bytes.
///
/// # Errors
/// Returns `MediaError::Processing` if the format cannot be detected or the
/// data is corrupted.
pub fn decode_image(bytes: &[u8]) -> crate::Result<DynamicImage> {
    let guessed = image::guess_format(bytes)
        .map_err(|e| MediaError::Processing(e.to_string()))?;

    image::load_from_memory_with_format(bytes, guessed)
        .map_err(|e| MediaError::Processing(e.to_string()))
}

/// Resizes according to width, height and fit.
///
/// # Behavior
/// - Neither dimension: original returned unchanged
/// - One dimension: the other scales proportionally
/// - Both: `fit` decides (default `cover`)
///   - `cover`: fill the box, cropping overflow
///   - `contain` / `inside`: fit within the box, aspect preserved
///   - `fill`: stretch to exactly the box
///   - `outside`: cover the box without cropping
///
/// Every dimension is clamped to at least 1 pixel.
pub fn resize_image(img: DynamicImage, params: &TransformParams) -> DynamicImage {
    let filter = image::imageops::FilterType::Lanczos3;
    let (orig_w, orig_h) = img.dimensions();

    match (params.width, params.height) {
        (None, None) => img,
        (Some(w), None) => {
            let ratio = w as f32 / orig_w as f32;
            let h = (orig_h as f32 * ratio).round() as u32;
            img.resize_exact(w.max(1), h.max(1), filter)
        }
        (None, Some(h)) => {
            let ratio = h as f32 / orig_h as f32;
            let w = (orig_w as f32 * ratio).round() as u32;
            img.resize_exact(w.max(1), h.max(1), filter)
        }
        (Some(w), Some(h)) => match params.fit.unwrap_or(FitMode::Cover) {
            FitMode::Cover => img.resize_to_fill(w, h, filter),
            FitMode::Contain | FitMode::Inside => img.resize(w, h, filter),
            FitMode::Fill => img.resize_exact(w, h, filter),
            FitMode::Outside => {
                let ratio = (w as f32 / orig_w as f32).max(h as f32 / orig_h as f32);
                let target_w = (orig_w as f32 * ratio).round() as u32;
                let target_h = (orig_h as f32 * ratio).round() as u32;
                img.resize_exact(target_w.max(1), target_h.max(1), filter)
            }
        },
    }
}

/// Encodes an image with quality control.
///
/// - **JPEG**: RGB, quality honored
/// - **WebP**: lossy via libwebp, RGBA when the source has alpha
/// - **AVIF**: RGBA, encoder speed 4
/// - **PNG / GIF**: lossless, quality ignored
///
/// Quality is clamped to [1, 100]. Video formats are rejected.
pub fn encode_image(img: &DynamicImage, fmt: Format, quality: u8) -> crate::Result<Vec<u8>> {
    let q = quality.clamp(1, 100);
    let mut out = Vec::new();

    match fmt {
        Format::Jpeg => {
            let rgb = img.to_rgb8();
            let (w, h) = rgb.dimensions();
            JpegEncoder::new_with_quality(&mut out, q)
                .write_image(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
                .map_err(|e| MediaError::Processing(e.to_string()))?;
        }
        Format::Webp => {
            let encoded = if img.color().has_alpha() {
                let rgba = img.to_rgba8();
                let (w, h) = rgba.dimensions();
                webp::Encoder::from_rgba(rgba.as_raw(), w, h).encode(q as f32)
            } else {
                let rgb = img.to_rgb8();
                let (w, h) = rgb.dimensions();
                webp::Encoder::from_rgb(rgb.as_raw(), w, h).encode(q as f32)
            };
            out.extend_from_slice(&encoded);
        }
        Format::Avif => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            AvifEncoder::new_with_speed_quality(&mut out, 4, q)
                .write_image(rgba.as_raw(), w, h, ExtendedColorType::Rgba8)
                .map_err(|e| MediaError::Processing(e.to_string()))?;
        }
        Format::Png => {
            img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
                .map_err(|e| MediaError::Processing(e.to_string()))?;
        }
        Format::Gif => {
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Gif)
                .map_err(|e| MediaError::Processing(e.to_string()))?;
        }
        Format::Mp4 | Format::Webm | Format::Mov => {
            return Err(MediaError::Processing(format!("Cannot encode an image as {}", fmt)));
        }
    }

    Ok(out)
}
