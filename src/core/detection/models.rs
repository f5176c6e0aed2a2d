use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::core::media::EncodedImage;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One detected object, in source-frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    #[serde(rename = "class")]
    pub class_label: String,
}

/// `POST /detect` success body.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectResponse {
    /// `data:image/jpeg;base64,...`
    pub image: String,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(rename = "processTime", default)]
    pub process_time_ms: f64,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Decoded detector reply for one image.
#[derive(Debug, Clone)]
pub struct DetectionReply {
    pub annotated_image: EncodedImage,
    pub detections: Vec<Detection>,
    pub process_time_ms: f64,
}

/// Result of dispatching one frame: annotated on success, the original
/// frame with no detections on failure.
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub frame_index: usize,
    pub annotated_image: EncodedImage,
    pub detections: Vec<Detection>,
    pub succeeded: bool,
    pub process_time_ms: Option<f64>,
}

impl DetectionOutcome {
    pub fn annotated(frame_index: usize, reply: DetectionReply) -> Self {
        Self {
            frame_index,
            annotated_image: reply.annotated_image,
            detections: reply.detections,
            succeeded: true,
            process_time_ms: Some(reply.process_time_ms),
        }
    }

    pub fn fallback(frame_index: usize, original: EncodedImage) -> Self {
        Self {
            frame_index,
            annotated_image: original,
            detections: Vec::new(),
            succeeded: false,
            process_time_ms: None,
        }
    }
}

/// `GET /health` body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub models_loaded: Option<u32>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

/// `GET /models` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

/// Model ids served by the anomaly backend.
pub const KNOWN_MODEL_IDS: [&str; 7] = [
    "coal_miner",
    "hydraulic_support",
    "large_coal",
    "mine_safety_helmet",
    "miner_behavior",
    "towline",
    "general",
];

pub static KNOWN_MODELS: Lazy<Vec<ModelInfo>> = Lazy::new(|| {
    KNOWN_MODEL_IDS
        .iter()
        .map(|id| ModelInfo {
            id: id.to_string(),
            name: display_name(id),
            available: true,
        })
        .collect()
});

/// `mine_safety_helmet` -> `Mine Safety Helmet`
pub fn display_name(model_id: &str) -> String {
    model_id
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_known_model(model_id: &str) -> bool {
    KNOWN_MODEL_IDS.contains(&model_id)
}
