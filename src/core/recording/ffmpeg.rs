//! WebM recorder backed by the ffmpeg CLI.
//!
//! Captured surfaces are written as PNG stills into a scratch directory next
//! to an ffconcat list carrying each frame's measured display time; `stop`
//! hands the list to ffmpeg and reads back a single WebM file.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tempfile::TempDir;
use tokio::process::Command;

use crate::core::config::FrameFormat;
use crate::core::error::PipelineError;
use crate::core::media::Surface;
use crate::core::recording::sink::{frame_durations, Recorder, RecordingSink, SinkOutput};

const ENCODER_VP9: &str = "libvpx-vp9";
const ENCODER_VP8: &str = "libvpx";
const LIST_NAME: &str = "frames.ffconcat";
const OUTPUT_NAME: &str = "output.webm";

/// Which VP encoders the local ffmpeg build has, from `ffmpeg -encoders`.
pub fn parse_encoders(listing: &str) -> (bool, bool) {
    let mut vp9 = false;
    let mut vp8 = false;
    for line in listing.lines() {
        let mut fields = line.split_whitespace();
        let (Some(flags), Some(name)) = (fields.next(), fields.next()) else {
            continue;
        };
        if !flags.starts_with('V') {
            continue;
        }
        match name {
            ENCODER_VP9 => vp9 = true,
            ENCODER_VP8 => vp8 = true,
            _ => {}
        }
    }
    (vp9, vp8)
}

#[derive(Debug, Clone)]
pub struct FfmpegRecorder {
    ffmpeg: String,
    vp9: bool,
    vp8: bool,
}

impl FfmpegRecorder {
    pub fn new(ffmpeg: impl Into<String>, vp9: bool, vp8: bool) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            vp9,
            vp8,
        }
    }

    /// `None` when ffmpeg is missing or has no VP8/VP9 encoder.
    pub async fn probe(ffmpeg: &str) -> Option<Self> {
        let output = match Command::new(ffmpeg)
            .args(["-hide_banner", "-encoders"])
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                warn!("{ffmpeg} -encoders exited with {:?}", output.status.code());
                return None;
            }
            Err(e) => {
                info!("ffmpeg not available ({e}), WebM output disabled");
                return None;
            }
        };

        let (vp9, vp8) = parse_encoders(&String::from_utf8_lossy(&output.stdout));
        debug!("ffmpeg encoders: vp9={vp9} vp8={vp8}");
        (vp9 || vp8).then(|| Self::new(ffmpeg, vp9, vp8))
    }

    /// Encoder for a WebM content type, if this build can produce it.
    fn encoder_for(&self, content_type: &str) -> Option<&'static str> {
        let normalized: String = content_type
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '"')
            .collect::<String>()
            .to_ascii_lowercase();
        let (essence, params) = match normalized.split_once(';') {
            Some((essence, params)) => (essence, Some(params)),
            None => (normalized.as_str(), None),
        };
        if essence != "video/webm" {
            return None;
        }
        match params {
            None => {
                if self.vp9 {
                    Some(ENCODER_VP9)
                } else if self.vp8 {
                    Some(ENCODER_VP8)
                } else {
                    None
                }
            }
            Some("codecs=vp9") if self.vp9 => Some(ENCODER_VP9),
            Some("codecs=vp8") if self.vp8 => Some(ENCODER_VP8),
            Some(_) => None,
        }
    }
}

#[async_trait]
impl Recorder for FfmpegRecorder {
    fn supports(&self, content_type: &str) -> bool {
        self.encoder_for(content_type).is_some()
    }

    fn basic_type(&self) -> Option<String> {
        (self.vp9 || self.vp8).then(|| "video/webm".to_string())
    }

    async fn open(
        &self,
        content_type: &str,
        width: u32,
        height: u32,
        frame_interval: Duration,
    ) -> Result<Box<dyn RecordingSink>, PipelineError> {
        let encoder = self.encoder_for(content_type).ok_or_else(|| {
            PipelineError::UnsupportedEnvironment(format!("ffmpeg cannot produce {content_type}"))
        })?;
        let scratch = tempfile::Builder::new().prefix("mad-video-rec").tempdir()?;
        debug!("recording {width}x{height} {content_type} into {}", scratch.path().display());

        Ok(Box::new(FfmpegSink {
            ffmpeg: self.ffmpeg.clone(),
            encoder,
            content_type: content_type.to_string(),
            width,
            height,
            frame_interval,
            scratch: Some(scratch),
            captures: Vec::new(),
        }))
    }
}

struct FfmpegSink {
    ffmpeg: String,
    encoder: &'static str,
    content_type: String,
    width: u32,
    height: u32,
    frame_interval: Duration,
    scratch: Option<TempDir>,
    captures: Vec<(String, Duration)>,
}

impl FfmpegSink {
    fn concat_list(&self, durations: &[Duration]) -> String {
        let mut list = String::from("ffconcat version 1.0\n");
        for ((file, _), duration) in self.captures.iter().zip(durations) {
            let _ = writeln!(list, "file '{file}'");
            let _ = writeln!(list, "duration {:.6}", duration.as_secs_f64());
        }
        // The concat demuxer ignores the last entry's duration unless the file repeats.
        if let Some((file, _)) = self.captures.last() {
            let _ = writeln!(list, "file '{file}'");
        }
        list
    }

    fn encoder_args(&self) -> [&'static str; 4] {
        if self.encoder == ENCODER_VP9 {
            ["-b:v", "0", "-crf", "32"]
        } else {
            ["-b:v", "2M", "-crf", "10"]
        }
    }
}

#[async_trait]
impl RecordingSink for FfmpegSink {
    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn capture(&mut self, surface: &Surface, at: Duration) -> Result<(), PipelineError> {
        let dir = self
            .scratch
            .as_ref()
            .ok_or_else(|| PipelineError::Encoding("capture after stop".into()))?;
        if (surface.width(), surface.height()) != (self.width, self.height) {
            return Err(PipelineError::Encoding(format!(
                "surface changed size to {}x{} mid-recording",
                surface.width(),
                surface.height()
            )));
        }

        let still = surface
            .encode(FrameFormat::Png, 100)
            .map_err(|e| PipelineError::Encoding(e.to_string()))?;
        let file = format!("frame_{:06}.png", self.captures.len());
        std::fs::write(dir.path().join(&file), still.bytes())?;
        self.captures.push((file, at));
        Ok(())
    }

    async fn stop(&mut self, at: Duration) -> Result<SinkOutput, PipelineError> {
        let scratch = self
            .scratch
            .take()
            .ok_or_else(|| PipelineError::Encoding("recording already stopped".into()))?;
        if self.captures.is_empty() {
            return Err(PipelineError::Encoding("no frames were captured".into()));
        }

        let times: Vec<Duration> = self.captures.iter().map(|(_, t)| *t).collect();
        let durations = frame_durations(&times, self.frame_interval, at);
        let total: Duration = durations.iter().sum();
        tokio::fs::write(scratch.path().join(LIST_NAME), self.concat_list(&durations)).await?;

        info!(
            "🎞️ encoding {} frames with {} ({:.2}s)",
            self.captures.len(),
            self.encoder,
            total.as_secs_f64()
        );
        let output = Command::new(&self.ffmpeg)
            .current_dir(scratch.path())
            .args(["-v", "error", "-y", "-f", "concat", "-safe", "0", "-i", LIST_NAME])
            .args(["-c:v", self.encoder, "-pix_fmt", "yuv420p"])
            .args(self.encoder_args())
            .args(["-deadline", "realtime", "-cpu-used", "8", OUTPUT_NAME])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PipelineError::Encoding(format!("ffmpeg not runnable: {e}")))?;

        if !output.status.success() {
            return Err(PipelineError::Encoding(format!(
                "ffmpeg exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let bytes = tokio::fs::read(scratch.path().join(OUTPUT_NAME)).await?;
        Ok(SinkOutput {
            chunks: vec![bytes],
            frames: self.captures.len(),
            duration: total,
        })
    }
}
