use std::time::Duration;

use thiserror::Error;

/// Fatal errors. Any of these moves the session to `Errored`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("video could not be loaded: {0}")]
    MediaLoad(String),
    #[error("no frames survived extraction")]
    NoFramesExtracted,
    #[error("recording is not supported in this environment: {0}")]
    UnsupportedEnvironment(String),
    #[error("encoding failed: {0}")]
    Encoding(String),
    #[error("a processing run is already in flight")]
    SessionBusy,
    #[error("no video loaded")]
    NoSource,
    #[error("invalid state transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },
    #[error("processing was cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Short message for the UI collaborator.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::MediaLoad(_) => {
                "The video could not be read. Check the file and try again.".to_string()
            }
            PipelineError::NoFramesExtracted => {
                "No frames could be extracted from the video.".to_string()
            }
            PipelineError::UnsupportedEnvironment(_) => {
                "Video recording is not available on this system.".to_string()
            }
            PipelineError::Encoding(_) => "The output video could not be encoded.".to_string(),
            PipelineError::SessionBusy => "A video is already being processed.".to_string(),
            PipelineError::NoSource => "Load a video before processing.".to_string(),
            PipelineError::Cancelled => "Processing was cancelled.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Per-frame detection failure. Absorbed by the dispatcher.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("detection timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid detection response: {0}")]
    InvalidResponse(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Per-timestamp capture loss. Absorbed by the extractor.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("seek to {timestamp:.3}s failed: {reason}")]
    Seek { timestamp: f64, reason: String },
    #[error("draw failed: {0}")]
    Draw(String),
    #[error("encode failed: {0}")]
    Encode(#[from] image::ImageError),
}
