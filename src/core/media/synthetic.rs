//! Generated video source for tests and dry runs. Each sample is a flat
//! colour derived from its timestamp, so frames are distinguishable.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::{CaptureError, PipelineError};
use crate::core::media::frame::Surface;
use crate::core::media::source::{SourceOpener, VideoMetadata, VideoSource};

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    duration_seconds: f64,
    width: u32,
    height: u32,
    metadata_delay: Duration,
    corrupt: bool,
    failing_draws: HashSet<usize>,
    seeks: usize,
    position: Option<f64>,
}

impl SyntheticSource {
    pub fn new(duration_seconds: f64, width: u32, height: u32) -> Self {
        Self {
            duration_seconds,
            width,
            height,
            metadata_delay: Duration::ZERO,
            corrupt: false,
            failing_draws: HashSet::new(),
            seeks: 0,
            position: None,
        }
    }

    /// Metadata never decodes.
    pub fn corrupt() -> Self {
        Self {
            corrupt: true,
            ..Self::new(0.0, 0, 0)
        }
    }

    pub fn with_metadata_delay(mut self, delay: Duration) -> Self {
        self.metadata_delay = delay;
        self
    }

    /// Draws fail for these 0-based seek attempts.
    pub fn failing_draws_at(mut self, attempts: Vec<usize>) -> Self {
        self.failing_draws = attempts.into_iter().collect();
        self
    }

    /// Colour of the sample shown at `timestamp_seconds`.
    pub fn shade_at(timestamp_seconds: f64) -> u8 {
        ((timestamp_seconds * 40.0) as u64 % 256) as u8
    }
}

#[async_trait]
impl VideoSource for SyntheticSource {
    async fn load_metadata(&mut self) -> Result<VideoMetadata, PipelineError> {
        if !self.metadata_delay.is_zero() {
            tokio::time::sleep(self.metadata_delay).await;
        }
        if self.corrupt {
            return Err(PipelineError::MediaLoad("synthetic source is corrupt".into()));
        }
        Ok(VideoMetadata {
            duration_seconds: self.duration_seconds,
            width: self.width,
            height: self.height,
        })
    }

    async fn seek(&mut self, timestamp_seconds: f64) -> Result<(), CaptureError> {
        let attempt = self.seeks;
        self.seeks += 1;
        tokio::task::yield_now().await;
        self.position = if self.failing_draws.contains(&attempt) {
            None
        } else {
            Some(timestamp_seconds)
        };
        Ok(())
    }

    fn draw_current(&mut self, surface: &mut Surface) -> Result<(), CaptureError> {
        let position = self
            .position
            .ok_or_else(|| CaptureError::Draw("synthetic decoder glitch".into()))?;
        let shade = Self::shade_at(position);
        let data: Vec<u8> = std::iter::repeat([shade, shade, shade, 255])
            .take((self.width * self.height) as usize)
            .flatten()
            .collect();
        surface.draw_raw_rgba(self.width, self.height, &data)
    }
}

/// Hands out a fresh copy of a template source regardless of path.
#[derive(Debug, Clone)]
pub struct SyntheticOpener {
    template: SyntheticSource,
}

impl SyntheticOpener {
    pub fn new(template: SyntheticSource) -> Self {
        Self { template }
    }
}

impl SourceOpener for SyntheticOpener {
    type Source = SyntheticSource;

    fn open(&self, _path: &Path) -> Self::Source {
        self.template.clone()
    }
}
