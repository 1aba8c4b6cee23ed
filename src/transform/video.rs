//! Video transformation through an external `ffmpeg` binary.

use crate::transform::output_format;
use crate::transform::params::{Format, TransformParams};
use crate::MediaError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

pub struct VideoEngine {
    ffmpeg_path: String,
    scratch_dir: PathBuf,
}

impl VideoEngine {
    pub fn new(ffmpeg_path: String, scratch_dir: PathBuf) -> crate::Result<Self> {
        let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
        if ffmpeg_path.chars().any(|c| dangerous_chars.contains(&c)) {
            return Err(MediaError::Config(
                "Invalid ffmpeg path: contains dangerous characters".into(),
            ));
        }
        Ok(Self { ffmpeg_path, scratch_dir })
    }

    /// Runs ffmpeg from `input` into a scratch file and returns its contents.
    ///
    /// The scratch file is removed when this returns, whatever the outcome.
    pub async fn transform(&self, input: &Path, params: &TransformParams) -> crate::Result<Vec<u8>> {
        let format = output_format(input, params)?;

        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let output = tempfile::Builder::new()
            .prefix("ffmpeg-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile_in(&self.scratch_dir)?
            .into_temp_path();

        let args = ffmpeg_args(input, &output, format, params);
        tracing::debug!(ffmpeg = %self.ffmpeg_path, ?args, "Running ffmpeg");

        let result = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| MediaError::Processing(format!("Failed to execute ffmpeg: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(MediaError::Processing(format!(
                "ffmpeg failed: {}",
                stderr.trim()
            )));
        }

        Ok(tokio::fs::read(&output).await?)
    }
}

impl VideoEngine {
    /// Decodes the first frame of `input` to PNG. Used for still formats the
    /// `image` crate can encode but not read, such as AVIF.
    pub async fn decode_still(&self, input: &Path) -> crate::Result<Vec<u8>> {
        let params = TransformParams {
            format: Some(Format::Png),
            ..Default::default()
        };
        self.transform(input, &params).await
    }
}

/// Builds the ffmpeg argument list for one variant.
pub fn ffmpeg_args(
    input: &Path,
    output: &Path,
    format: Format,
    params: &TransformParams,
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
    ];

    let scale = match (params.width, params.height) {
        (Some(w), Some(h)) => Some(format!("scale={}:{}", w, h)),
        (Some(w), None) => Some(format!("scale={}:-2", w)),
        (None, Some(h)) => Some(format!("scale=-2:{}", h)),
        (None, None) => None,
    };
    if let Some(filter) = scale {
        args.extend(["-vf".to_string(), filter]);
    }

    match format {
        Format::Mp4 | Format::Mov => {
            args.extend(["-c:v".to_string(), "libx264".to_string()]);
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }
        Format::Webm => {
            args.extend(["-c:v".to_string(), "libvpx-vp9".to_string()]);
            args.extend(["-b:v".to_string(), "0".to_string()]);
        }
        Format::Gif => {}
        // Still formats take the first frame.
        Format::Jpeg | Format::Png | Format::Webp | Format::Avif => {
            args.extend(["-frames:v".to_string(), "1".to_string()]);
        }
    }

    if let (Some(q), Format::Mp4 | Format::Mov | Format::Webm) = (params.quality, format) {
        args.extend(["-crf".to_string(), crf_for_quality(q).to_string()]);
    }

    args.push(output.to_string_lossy().to_string());
    args
}

/// Maps quality 1-100 onto CRF 51-0 (lower CRF is better).
fn crf_for_quality(quality: u8) -> u8 {
    let q = quality.clamp(1, 100) as u32;
    (51 - (q * 51 / 100)) as u8
}
