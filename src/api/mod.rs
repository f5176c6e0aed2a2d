pub mod video;

pub use video::{ProductionOrchestrator, VideoAnomalyPipeline};
