use std::time::Duration;

use log::{debug, info, warn};

use crate::core::config::{FrameFormat, PipelineConfig};
use crate::core::error::{CaptureError, PipelineError};
use crate::core::media::frame::{EncodedImage, Frame, Surface};
use crate::core::media::source::{VideoMetadata, VideoSource};

/// Seeks are kept this far before the end of the stream.
pub const CLAMP_EPSILON_SECS: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub sampling_rate_hz: u32,
    pub metadata_timeout: Duration,
    pub frame_format: FrameFormat,
    pub jpeg_quality: u8,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: 6,
            metadata_timeout: Duration::from_secs(10),
            frame_format: FrameFormat::Jpeg,
            jpeg_quality: 85,
        }
    }
}

impl From<&PipelineConfig> for ExtractionConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            sampling_rate_hz: config.sampling_rate_hz,
            metadata_timeout: config.metadata_timeout(),
            frame_format: config.frame_format,
            jpeg_quality: config.jpeg_quality,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub planned: usize,
    pub extracted: usize,
    pub skipped: usize,
}

/// `ceil(duration * fps)` target times, clamped to stay before end-of-stream.
pub fn plan_timestamps(duration_seconds: f64, sampling_rate_hz: u32) -> Vec<f64> {
    if !(duration_seconds > 0.0) || sampling_rate_hz == 0 {
        return Vec::new();
    }
    let fps = sampling_rate_hz as f64;
    // Absorb float noise such as 1.1 * 10 = 11.000000000000002.
    let count = (duration_seconds * fps - 1e-9).ceil().max(0.0) as usize;
    let last_safe = (duration_seconds - CLAMP_EPSILON_SECS).max(0.0);

    (0..count)
        .map(|i| i as f64 / fps)
        .take_while(|t| *t <= duration_seconds)
        .map(|t| t.min(last_safe))
        .collect()
}

pub struct FrameExtractor {
    config: ExtractionConfig,
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self::with_config(ExtractionConfig::default())
    }

    pub fn with_config(config: ExtractionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Load metadata and allocate the surface. Fails hard on timeout, zero
    /// dimensions or a non-positive duration.
    pub async fn open<S: VideoSource>(&self, mut source: S) -> Result<FrameSequence<S>, PipelineError> {
        let timeout = self.config.metadata_timeout;
        let metadata = tokio::time::timeout(timeout, source.load_metadata())
            .await
            .map_err(|_| {
                PipelineError::MediaLoad(format!("metadata did not arrive within {timeout:?}"))
            })??;

        validate_metadata(&metadata)?;
        let surface = Surface::new(metadata.width, metadata.height)?;
        let timestamps = plan_timestamps(metadata.duration_seconds, self.config.sampling_rate_hz);

        info!(
            "🎬 extraction planned: {} frames at {} Hz from {:.3}s {}x{}",
            timestamps.len(),
            self.config.sampling_rate_hz,
            metadata.duration_seconds,
            metadata.width,
            metadata.height
        );

        Ok(FrameSequence {
            source,
            surface,
            metadata,
            stats: ExtractionStats {
                planned: timestamps.len(),
                ..Default::default()
            },
            timestamps,
            cursor: 0,
            frame_format: self.config.frame_format,
            jpeg_quality: self.config.jpeg_quality,
        })
    }

    /// Open and drain the whole sequence.
    pub async fn extract_all<S, F>(
        &self,
        source: S,
        mut on_progress: F,
    ) -> Result<(Vec<Frame>, ExtractionStats), PipelineError>
    where
        S: VideoSource,
        F: FnMut(usize, usize),
    {
        let mut sequence = self.open(source).await?;
        let mut frames = Vec::with_capacity(sequence.remaining());
        while let Some(frame) = sequence.next_frame().await {
            frames.push(frame);
            on_progress(sequence.attempted(), sequence.planned());
        }
        // Trailing skips still count toward completion.
        on_progress(sequence.planned(), sequence.planned());
        Ok((frames, sequence.stats()))
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_metadata(metadata: &VideoMetadata) -> Result<(), PipelineError> {
    if metadata.width == 0 || metadata.height == 0 {
        return Err(PipelineError::MediaLoad(format!(
            "video reports {}x{} dimensions",
            metadata.width, metadata.height
        )));
    }
    if !metadata.duration_seconds.is_finite() || metadata.duration_seconds <= 0.0 {
        return Err(PipelineError::MediaLoad(format!(
            "video reports a duration of {}",
            metadata.duration_seconds
        )));
    }
    Ok(())
}

/// Lazy, finite and forward-only sequence of sampled frames. Consumes its
/// source; once drained it cannot be restarted.
pub struct FrameSequence<S> {
    source: S,
    surface: Surface,
    metadata: VideoMetadata,
    timestamps: Vec<f64>,
    cursor: usize,
    stats: ExtractionStats,
    frame_format: FrameFormat,
    jpeg_quality: u8,
}

impl<S: VideoSource> FrameSequence<S> {
    pub fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    pub fn planned(&self) -> usize {
        self.timestamps.len()
    }

    pub fn attempted(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.timestamps.len() - self.cursor
    }

    pub fn stats(&self) -> ExtractionStats {
        self.stats
    }

    /// Next successfully captured frame. A timestamp whose capture fails is
    /// logged and skipped, never retried or duplicated.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        while self.cursor < self.timestamps.len() {
            let timestamp = self.timestamps[self.cursor];
            self.cursor += 1;

            match self.capture(timestamp).await {
                Ok(image) => {
                    let frame = Frame::new(self.stats.extracted, timestamp, image);
                    self.stats.extracted += 1;
                    debug!("captured frame {} at {:.3}s", frame.index, timestamp);
                    return Some(frame);
                }
                Err(e) => {
                    self.stats.skipped += 1;
                    warn!("dropping sample at {timestamp:.3}s: {e}");
                }
            }
        }
        None
    }

    async fn capture(&mut self, timestamp: f64) -> Result<EncodedImage, CaptureError> {
        self.source.seek(timestamp).await?;
        self.surface.clear();
        self.source.draw_current(&mut self.surface)?;
        self.surface.encode(self.frame_format, self.jpeg_quality)
    }
}
