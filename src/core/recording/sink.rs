use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};

use crate::core::error::PipelineError;
use crate::core::media::Surface;

/// What a sink hands back once stopped.
#[derive(Debug, Clone, Default)]
pub struct SinkOutput {
    pub chunks: Vec<Vec<u8>>,
    pub frames: usize,
    pub duration: Duration,
}

/// Encodes presented surfaces into a video container.
#[async_trait]
pub trait RecordingSink: Send {
    fn content_type(&self) -> &str;

    /// Present the current surface. `at` is measured from recording start.
    fn capture(&mut self, surface: &Surface, at: Duration) -> Result<(), PipelineError>;

    /// Stop recording and release everything captured.
    async fn stop(&mut self, at: Duration) -> Result<SinkOutput, PipelineError>;
}

/// Capability query plus sink factory.
#[async_trait]
pub trait Recorder: Send + Sync {
    fn supports(&self, content_type: &str) -> bool;

    /// Most basic encoding this recorder can always produce, if any.
    fn basic_type(&self) -> Option<String>;

    async fn open(
        &self,
        content_type: &str,
        width: u32,
        height: u32,
        frame_interval: Duration,
    ) -> Result<Box<dyn RecordingSink>, PipelineError>;
}

/// First supported entry of `preferences`, else the recorder's basic type.
pub fn negotiate<R: Recorder + ?Sized>(
    recorder: &R,
    preferences: &[String],
) -> Result<String, PipelineError> {
    for candidate in preferences {
        if recorder.supports(candidate) {
            debug!("negotiated output type {candidate}");
            return Ok(candidate.clone());
        }
        debug!("output type {candidate} not supported");
    }
    match recorder.basic_type() {
        Some(basic) => {
            info!("no preferred output type supported, falling back to {basic}");
            Ok(basic)
        }
        None => Err(PipelineError::UnsupportedEnvironment(format!(
            "none of {preferences:?} can be recorded and no fallback exists"
        ))),
    }
}

/// Display time of each captured frame: the gap to the next capture, and
/// one nominal interval for the last one.
pub fn frame_durations(capture_times: &[Duration], frame_interval: Duration, stop_at: Duration) -> Vec<Duration> {
    let mut durations: Vec<Duration> = capture_times
        .windows(2)
        .map(|w| w[1].saturating_sub(w[0]))
        .collect();
    if let Some(last) = capture_times.last() {
        durations.push(frame_interval.min(stop_at.saturating_sub(*last)));
    }
    durations
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRecorder {
        types: Vec<&'static str>,
        basic: Option<&'static str>,
    }

    #[async_trait]
    impl Recorder for FixedRecorder {
        fn supports(&self, content_type: &str) -> bool {
            self.types.contains(&content_type)
        }

        fn basic_type(&self) -> Option<String> {
            self.basic.map(str::to_string)
        }

        async fn open(
            &self,
            _content_type: &str,
            _width: u32,
            _height: u32,
            _frame_interval: Duration,
        ) -> Result<Box<dyn RecordingSink>, PipelineError> {
            Err(PipelineError::UnsupportedEnvironment("test recorder".into()))
        }
    }

    fn create_preferences() -> Vec<String> {
        ["video/webm;codecs=vp9", "video/webm;codecs=vp8", "video/webm"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_negotiate_takes_first_supported() {
        let recorder = FixedRecorder {
            types: vec!["video/webm", "video/webm;codecs=vp8"],
            basic: Some("image/gif"),
        };
        assert_eq!(
            negotiate(&recorder, &create_preferences()).expect("negotiate"),
            "video/webm;codecs=vp8"
        );
    }

    #[test]
    fn test_negotiate_falls_back_to_basic() {
        let recorder = FixedRecorder {
            types: vec!["image/gif"],
            basic: Some("image/gif"),
        };
        assert_eq!(
            negotiate(&recorder, &create_preferences()).expect("negotiate"),
            "image/gif"
        );
    }

    #[test]
    fn test_negotiate_nothing_supported() {
        let recorder = FixedRecorder { types: vec![], basic: None };
        assert!(matches!(
            negotiate(&recorder, &create_preferences()),
            Err(PipelineError::UnsupportedEnvironment(_))
        ));
    }

    #[test]
    fn test_frame_durations_last_frame_is_one_interval() {
        let interval = Duration::from_millis(100);
        let times = [Duration::ZERO, Duration::from_millis(100), Duration::from_millis(200)];
        let durations = frame_durations(&times, interval, Duration::from_millis(800));
        assert_eq!(durations, vec![interval, interval, interval]);
    }

    #[test]
    fn test_frame_durations_early_stop_truncates_last() {
        let durations = frame_durations(
            &[Duration::ZERO],
            Duration::from_millis(100),
            Duration::from_millis(40),
        );
        assert_eq!(durations, vec![Duration::from_millis(40)]);
    }
}
