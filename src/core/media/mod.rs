//! Frame extraction: decode a video and sample stills at a fixed rate.

pub mod extractor;
pub mod ffmpeg;
pub mod frame;
pub mod source;
pub mod synthetic;

pub use extractor::{plan_timestamps, ExtractionConfig, ExtractionStats, FrameExtractor, FrameSequence};
pub use ffmpeg::{FfmpegOpener, FfmpegVideoSource};
pub use frame::{EncodedImage, Frame, Surface};
pub use source::{SourceOpener, VideoMetadata, VideoSource};
pub use synthetic::{SyntheticOpener, SyntheticSource};
