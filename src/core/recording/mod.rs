pub mod artifact;
pub mod auto;
pub mod ffmpeg;
pub mod gif;
pub mod reassembler;
pub mod sink;

pub use artifact::OutputArtifact;
pub use auto::AutoRecorder;
pub use ffmpeg::FfmpegRecorder;
pub use gif::{GifRecorder, GIF_CONTENT_TYPE};
pub use reassembler::Reassembler;
pub use sink::{negotiate, Recorder, RecordingSink, SinkOutput};
