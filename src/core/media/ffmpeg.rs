//! ffmpeg/ffprobe backed video source.
//!
//! Metadata comes from `ffprobe`; each seek decodes exactly one RGBA frame at
//! the requested time through `ffmpeg`, which is what the extractor draws.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use tokio::process::Command;

use crate::core::error::{CaptureError, PipelineError};
use crate::core::media::frame::Surface;
use crate::core::media::source::{SourceOpener, VideoMetadata, VideoSource};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
    tags: Option<ProbeTags>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

impl ProbeStream {
    /// Display rotation in degrees, normalized to 0..360. The display matrix
    /// wins over the legacy `rotate` tag.
    fn rotation(&self) -> i64 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| {
                self.tags
                    .as_ref()
                    .and_then(|t| t.rotate.as_deref())
                    .and_then(|r| r.trim().parse::<f64>().ok())
            })
            .unwrap_or(0.0);
        (degrees.round() as i64).rem_euclid(360)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_probe(stdout: &[u8]) -> Result<VideoMetadata, PipelineError> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| PipelineError::MediaLoad(format!("unreadable ffprobe output: {e}")))?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| PipelineError::MediaLoad("no video stream found".into()))?;

    // Format-level duration first, then the stream's own.
    let duration_seconds = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(stream.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    // ffmpeg autorotates decoded frames, so report display dimensions.
    let (coded_w, coded_h) = (stream.width.unwrap_or(0), stream.height.unwrap_or(0));
    let (width, height) = match stream.rotation() {
        90 | 270 => (coded_h, coded_w),
        _ => (coded_w, coded_h),
    };

    Ok(VideoMetadata {
        duration_seconds,
        width,
        height,
    })
}

pub struct FfmpegVideoSource {
    path: PathBuf,
    ffmpeg: String,
    ffprobe: String,
    metadata: Option<VideoMetadata>,
    current: Option<Vec<u8>>,
}

impl FfmpegVideoSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_binaries(path, "ffmpeg", "ffprobe")
    }

    pub fn with_binaries(
        path: impl Into<PathBuf>,
        ffmpeg: impl Into<String>,
        ffprobe: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            metadata: None,
            current: None,
        }
    }
}

#[async_trait]
impl VideoSource for FfmpegVideoSource {
    async fn load_metadata(&mut self) -> Result<VideoMetadata, PipelineError> {
        if !self.path.exists() {
            return Err(PipelineError::MediaLoad(format!(
                "video file not found: {}",
                self.path.display()
            )));
        }

        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(&self.path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PipelineError::MediaLoad(format!("ffprobe not runnable: {e}")))?;

        if !output.status.success() {
            return Err(PipelineError::MediaLoad(format!(
                "ffprobe exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let metadata = parse_probe(&output.stdout)?;
        debug!("probed {}: {:?}", self.path.display(), metadata);
        self.metadata = Some(metadata);
        Ok(metadata)
    }

    async fn seek(&mut self, timestamp_seconds: f64) -> Result<(), CaptureError> {
        self.current = None;
        let seek_err = |reason: String| CaptureError::Seek {
            timestamp: timestamp_seconds,
            reason,
        };

        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss", &format!("{timestamp_seconds:.3}"), "-i"])
            .arg(&self.path)
            .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| seek_err(e.to_string()))?;

        if !output.status.success() {
            return Err(seek_err(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        if output.stdout.is_empty() {
            return Err(seek_err("decoder produced no frame".into()));
        }

        self.current = Some(output.stdout);
        Ok(())
    }

    fn draw_current(&mut self, surface: &mut Surface) -> Result<(), CaptureError> {
        let metadata = self
            .metadata
            .ok_or_else(|| CaptureError::Draw("metadata not loaded".into()))?;
        let data = self
            .current
            .as_deref()
            .ok_or_else(|| CaptureError::Draw("no decoded frame at current position".into()))?;
        surface.draw_raw_rgba(metadata.width, metadata.height, data)
    }
}

/// Opens staged files with [`FfmpegVideoSource`].
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Default for FfmpegOpener {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl SourceOpener for FfmpegOpener {
    type Source = FfmpegVideoSource;

    fn open(&self, path: &Path) -> Self::Source {
        FfmpegVideoSource::with_binaries(path, self.ffmpeg.clone(), self.ffprobe.clone())
    }
}
