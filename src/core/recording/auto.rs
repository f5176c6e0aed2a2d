use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::PipelineError;
use crate::core::recording::ffmpeg::FfmpegRecorder;
use crate::core::recording::gif::GifRecorder;
use crate::core::recording::sink::{Recorder, RecordingSink};

/// WebM through ffmpeg when the local build has a VP encoder, GIF otherwise.
#[derive(Debug, Clone, Default)]
pub struct AutoRecorder {
    ffmpeg: Option<FfmpegRecorder>,
    gif: GifRecorder,
}

impl AutoRecorder {
    pub fn new(ffmpeg: Option<FfmpegRecorder>) -> Self {
        Self {
            ffmpeg,
            gif: GifRecorder::new(),
        }
    }

    pub async fn detect(ffmpeg_path: &str) -> Self {
        Self::new(FfmpegRecorder::probe(ffmpeg_path).await)
    }

    pub fn has_video_encoder(&self) -> bool {
        self.ffmpeg.is_some()
    }
}

#[async_trait]
impl Recorder for AutoRecorder {
    fn supports(&self, content_type: &str) -> bool {
        self.ffmpeg.as_ref().is_some_and(|f| f.supports(content_type))
            || self.gif.supports(content_type)
    }

    fn basic_type(&self) -> Option<String> {
        self.gif.basic_type()
    }

    async fn open(
        &self,
        content_type: &str,
        width: u32,
        height: u32,
        frame_interval: Duration,
    ) -> Result<Box<dyn RecordingSink>, PipelineError> {
        match &self.ffmpeg {
            Some(ffmpeg) if ffmpeg.supports(content_type) => {
                ffmpeg.open(content_type, width, height, frame_interval).await
            }
            _ => self.gif.open(content_type, width, height, frame_interval).await,
        }
    }
}
