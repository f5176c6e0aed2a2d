pub mod config;
pub mod detection;
pub mod error;
pub mod media;
pub mod recording;

pub use config::{FrameFormat, PipelineConfig};
pub use error::{CaptureError, DetectionError, PipelineError};
