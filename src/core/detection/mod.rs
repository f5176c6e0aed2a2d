//! Detection client contract, backend HTTP client and the frame dispatcher.

pub mod client;
pub mod data_uri;
pub mod dispatcher;
pub mod http;
pub mod mock;
pub mod models;
pub mod overlay;

pub use client::DetectionClient;
pub use dispatcher::{DispatchStats, FrameDispatcher};
pub use http::{spawn_health_probe, HttpDetectionClient};
pub use mock::MockDetectionClient;
pub use models::{
    BoundingBox, Detection, DetectionOutcome, DetectionReply, HealthStatus, ModelInfo,
    KNOWN_MODELS,
};
