use std::path::Path;

use async_trait::async_trait;

use crate::core::error::{CaptureError, PipelineError};
use crate::core::media::frame::Surface;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
}

/// A decodable video resource that can be seeked and drawn.
///
/// Every method is a suspension point: implementations may do I/O or run a
/// decoder out of process.
#[async_trait]
pub trait VideoSource: Send {
    async fn load_metadata(&mut self) -> Result<VideoMetadata, PipelineError>;

    /// Resolves once the decoder has the frame at `timestamp_seconds` ready.
    async fn seek(&mut self, timestamp_seconds: f64) -> Result<(), CaptureError>;

    /// Draw the frame at the current position onto `surface`.
    fn draw_current(&mut self, surface: &mut Surface) -> Result<(), CaptureError>;
}

/// Builds a [`VideoSource`] for a staged input file.
pub trait SourceOpener {
    type Source: VideoSource;

    fn open(&self, path: &Path) -> Self::Source;
}
