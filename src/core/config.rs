use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::PipelineError;

pub const DEFAULT_DETECTOR_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_MODEL_ID: &str = "mine_safety_helmet";

/// Still-image encoding used for extracted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    Jpeg,
    Png,
}

impl FrameFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "image/jpeg",
            FrameFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "jpg",
            FrameFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detector_url: String,
    pub model_id: String,
    pub sampling_rate_hz: u32,
    pub metadata_timeout_secs: u64,
    pub detect_timeout_secs: u64,
    pub single_image_timeout_secs: u64,
    pub dispatch_concurrency: usize,
    pub frame_format: FrameFormat,
    pub jpeg_quality: u8,
    pub output_preferences: Vec<String>,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector_url: DEFAULT_DETECTOR_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            sampling_rate_hz: 6,
            metadata_timeout_secs: 10,
            detect_timeout_secs: 15,
            single_image_timeout_secs: 30,
            dispatch_concurrency: 1,
            frame_format: FrameFormat::Jpeg,
            jpeg_quality: 85,
            output_preferences: vec![
                "video/webm;codecs=vp9".to_string(),
                "video/webm;codecs=vp8".to_string(),
                "video/webm".to_string(),
            ],
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn for_preview() -> Self {
        Self {
            sampling_rate_hz: 3,
            detect_timeout_secs: 8,
            ..Default::default()
        }
    }

    pub fn for_high_fidelity() -> Self {
        Self {
            sampling_rate_hz: 10,
            frame_format: FrameFormat::Png,
            ..Default::default()
        }
    }

    pub fn from_json5_str(text: &str) -> Result<Self, PipelineError> {
        let config: PipelineConfig =
            json5::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json5_str(&text)
    }

    /// Apply `MAD_*` environment variables on top of the current values.
    pub fn with_env_overrides(self) -> Result<Self, PipelineError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MAD_DETECTOR_URL") {
            self.detector_url = url;
        }
        if let Some(model) = lookup("MAD_MODEL") {
            self.model_id = model;
        }
        if let Some(rate) = lookup("MAD_SAMPLING_RATE") {
            self.sampling_rate_hz = rate
                .parse()
                .map_err(|_| PipelineError::Config(format!("MAD_SAMPLING_RATE={rate}")))?;
        }
        if let Some(n) = lookup("MAD_DISPATCH_CONCURRENCY") {
            self.dispatch_concurrency = n
                .parse()
                .map_err(|_| PipelineError::Config(format!("MAD_DISPATCH_CONCURRENCY={n}")))?;
        }
        if let Some(bin) = lookup("MAD_FFMPEG") {
            self.ffmpeg_path = bin;
        }
        if let Some(bin) = lookup("MAD_FFPROBE") {
            self.ffprobe_path = bin;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.sampling_rate_hz == 0 {
            return Err(PipelineError::Config("sampling_rate_hz must be > 0".into()));
        }
        if self.dispatch_concurrency == 0 {
            return Err(PipelineError::Config(
                "dispatch_concurrency must be > 0".into(),
            ));
        }
        if self.model_id.trim().is_empty() {
            return Err(PipelineError::Config("model_id is empty".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(PipelineError::Config(format!(
                "jpeg_quality {} outside 1..=100",
                self.jpeg_quality
            )));
        }
        Ok(())
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_secs(self.detect_timeout_secs)
    }

    pub fn single_image_timeout(&self) -> Duration {
        Duration::from_secs(self.single_image_timeout_secs)
    }
}
