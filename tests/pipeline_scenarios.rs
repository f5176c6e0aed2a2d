use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use mad_video::core::detection::{DetectionClient, DetectionReply, MockDetectionClient};
use mad_video::core::media::{EncodedImage, Surface, SyntheticOpener, SyntheticSource};
use mad_video::core::recording::gif::{gif_frames, gif_timeline};
use mad_video::core::recording::{GifRecorder, Recorder, RecordingSink, SinkOutput};
use mad_video::core::{DetectionError, FrameFormat, PipelineConfig, PipelineError};
use mad_video::pipeline::{Orchestrator, SessionState};

type ScenarioOrchestrator = Orchestrator<MockDetectionClient, GifRecorder, SyntheticOpener>;

fn create_orchestrator(client: MockDetectionClient, source: SyntheticSource) -> ScenarioOrchestrator {
    create_orchestrator_with(client, source, PipelineConfig::default())
}

fn create_orchestrator_with(
    client: MockDetectionClient,
    source: SyntheticSource,
    config: PipelineConfig,
) -> ScenarioOrchestrator {
    Orchestrator::new(client, GifRecorder::new(), SyntheticOpener::new(source), config)
        .expect("orchestrator")
}

fn assert_close(actual: Duration, expected: Duration, tolerance: Duration) {
    let drift = if actual > expected { actual - expected } else { expected - actual };
    assert!(
        drift <= tolerance,
        "{actual:?} is not within {tolerance:?} of {expected:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_all_detections_failing_still_produces_full_video() {
    let orchestrator = create_orchestrator(
        MockDetectionClient::always_failing(),
        SyntheticSource::new(2.0, 32, 24),
    );
    orchestrator.load_video_file("two-seconds.mp4").expect("load");

    let artifact = orchestrator.process().await.expect("process");

    assert_eq!(orchestrator.frame_count(), 12);
    let outcomes = orchestrator.outcomes();
    assert_eq!(outcomes.len(), 12);
    assert!(outcomes.iter().all(|o| !o.succeeded && o.detections.is_empty()));

    let interval = Duration::from_secs_f64(1.0 / 6.0);
    assert_eq!(artifact.frame_count, 12);
    assert_close(artifact.duration, Duration::from_secs(2), interval);
    let timeline = gif_timeline(&artifact.bytes).expect("timeline");
    assert_eq!(timeline.len(), 12);
    assert_close(timeline.iter().sum(), Duration::from_secs(2), interval);

    let report = orchestrator.report().expect("report");
    assert_eq!(report.fallbacks, 12);
    assert_eq!(report.annotated, 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_duration_source_is_media_load_error() {
    let orchestrator = create_orchestrator(MockDetectionClient::new(), SyntheticSource::new(0.0, 32, 24));
    orchestrator.load_video_file("empty.mp4").expect("load");

    let result = orchestrator.process().await;

    assert!(matches!(result, Err(PipelineError::MediaLoad(_))));
    assert_eq!(orchestrator.state(), SessionState::Errored);
    assert!(orchestrator.output().is_none());
    assert!(orchestrator.output_handle().is_none());
    assert!(orchestrator.error_message().is_some());
    // Only the staged input is still referenced.
    assert_eq!(orchestrator.live_handles(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_source_is_media_load_error() {
    let client = MockDetectionClient::new();
    let orchestrator = create_orchestrator(client, SyntheticSource::corrupt());
    orchestrator.load_video_file("corrupt.mp4").expect("load");

    assert!(matches!(
        orchestrator.process().await,
        Err(PipelineError::MediaLoad(_))
    ));
    assert_eq!(orchestrator.state(), SessionState::Errored);
    assert!(orchestrator.output().is_none());
    assert_eq!(orchestrator.client().call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_metadata_times_out() {
    let source = SyntheticSource::new(2.0, 32, 24).with_metadata_delay(Duration::from_secs(11));
    let orchestrator = create_orchestrator(MockDetectionClient::new(), source);
    orchestrator.load_video_file("slow.mp4").expect("load");

    assert!(matches!(
        orchestrator.process().await,
        Err(PipelineError::MediaLoad(_))
    ));
    assert_eq!(orchestrator.state(), SessionState::Errored);
}

#[tokio::test(start_paused = true)]
async fn test_half_failing_detector_keeps_alignment() {
    let orchestrator = create_orchestrator(
        MockDetectionClient::with_pattern(|n| n < 6),
        SyntheticSource::new(2.0, 32, 24),
    );
    orchestrator.load_video_file("two-seconds.mp4").expect("load");

    let artifact = orchestrator.process().await.expect("process");

    let outcomes = orchestrator.outcomes();
    assert_eq!(outcomes.len(), 12);
    for (i, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.frame_index, i);
        assert_eq!(outcome.succeeded, i < 6, "frame {i}");
    }
    for (i, outcome) in outcomes.iter().enumerate().skip(6) {
        assert!(outcome.detections.is_empty());
        let raster = outcome.annotated_image.decode().expect("decode");
        let expected = SyntheticSource::shade_at(i as f64 / 6.0) as i16;
        let actual = raster.get_pixel(1, 1).0[0] as i16;
        assert!((actual - expected).abs() <= 3, "frame {i}: {actual} vs {expected}");
    }

    assert_eq!(artifact.frame_count, 12);
    let frames = gif_frames(&artifact.bytes).expect("frames");
    assert_eq!(frames.len(), 12);
    let reds: Vec<u8> = frames.iter().map(|f| f.get_pixel(1, 1).0[0]).collect();
    assert!(reds.windows(2).all(|w| w[0] < w[1]), "frames out of order: {reds:?}");
}

#[tokio::test(start_paused = true)]
async fn test_reprocessing_after_reset_is_idempotent() {
    let orchestrator = create_orchestrator(MockDetectionClient::new(), SyntheticSource::new(1.5, 16, 16));

    orchestrator.load_video_file("clip.mp4").expect("load");
    let first = orchestrator.process().await.expect("first run");
    let first_frames = orchestrator.frame_count();

    orchestrator.reset().expect("reset");
    assert_eq!(orchestrator.state(), SessionState::Idle);
    assert_eq!(orchestrator.frame_count(), 0);
    assert_eq!(orchestrator.live_handles(), 0);

    orchestrator.load_video_file("clip.mp4").expect("reload");
    let second = orchestrator.process().await.expect("second run");

    assert_eq!(orchestrator.frame_count(), first_frames);
    assert_eq!(first.frame_count, second.frame_count);
    assert_eq!(first_frames, 9);
}

#[tokio::test(start_paused = true)]
async fn test_reset_releases_uploaded_input_and_output() {
    let orchestrator = create_orchestrator(MockDetectionClient::new(), SyntheticSource::new(0.5, 16, 16));
    orchestrator.load_video(b"fake video bytes", "upload.mp4").expect("load");
    orchestrator.process().await.expect("process");
    assert_eq!(orchestrator.live_handles(), 2);

    orchestrator.reset().expect("reset");
    assert_eq!(orchestrator.live_handles(), 0);
    assert!(orchestrator.output().is_none());
    assert!(orchestrator.source().is_none());
    assert!(matches!(orchestrator.process().await, Err(PipelineError::NoSource)));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_process_is_rejected() {
    let orchestrator = create_orchestrator(MockDetectionClient::new(), SyntheticSource::new(1.0, 16, 16));
    orchestrator.load_video_file("clip.mp4").expect("load");

    let (first, second) = tokio::join!(orchestrator.process(), orchestrator.process());

    assert!(first.is_ok());
    assert!(matches!(second, Err(PipelineError::SessionBusy)));
}

#[tokio::test(start_paused = true)]
async fn test_bounded_concurrent_dispatch_keeps_order() {
    let config = PipelineConfig {
        dispatch_concurrency: 4,
        ..PipelineConfig::default()
    };
    let orchestrator = create_orchestrator_with(
        MockDetectionClient::with_pattern(|n| n % 2 == 1).with_latency(Duration::from_millis(200)),
        SyntheticSource::new(2.0, 16, 16),
        config,
    );
    orchestrator.load_video_file("clip.mp4").expect("load");

    let artifact = orchestrator.process().await.expect("process");

    let indices: Vec<usize> = orchestrator.outcomes().iter().map(|o| o.frame_index).collect();
    assert_eq!(indices, (0..12).collect::<Vec<_>>());
    assert_eq!(artifact.frame_count, 12);
}

#[tokio::test(start_paused = true)]
async fn test_lost_captures_shrink_sequence_without_gaps() {
    let source = SyntheticSource::new(2.0, 16, 16).failing_draws_at(vec![3, 7]);
    let orchestrator = create_orchestrator(MockDetectionClient::new(), source);
    orchestrator.load_video_file("glitchy.mp4").expect("load");

    let artifact = orchestrator.process().await.expect("process");

    assert_eq!(orchestrator.frame_count(), 10);
    let indices: Vec<usize> = orchestrator.outcomes().iter().map(|o| o.frame_index).collect();
    assert_eq!(indices, (0..10).collect::<Vec<_>>());
    assert_eq!(artifact.frame_count, 10);
}

/// Answers with a PNG whose header parses but whose body is cut short.
struct TruncatingClient;

#[async_trait]
impl DetectionClient for TruncatingClient {
    async fn detect(
        &self,
        image: &EncodedImage,
        _model_id: &str,
    ) -> Result<DetectionReply, DetectionError> {
        let (w, h) = image.decode()?.dimensions();
        let mut surface = Surface::new(w, h).expect("surface");
        surface.draw_image(&RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 7 + y * 13) as u8, (x * y) as u8, (y * 31) as u8, 255])
        }));
        let png = surface.encode(FrameFormat::Png, 90).expect("encode");
        let bytes = png.bytes();
        Ok(DetectionReply {
            annotated_image: EncodedImage::new(bytes[..bytes.len() / 2].to_vec(), "image/png"),
            detections: Vec::new(),
            process_time_ms: 3.0,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_truncated_detector_replies_fall_back_per_frame() {
    let orchestrator = Orchestrator::new(
        TruncatingClient,
        GifRecorder::new(),
        SyntheticOpener::new(SyntheticSource::new(2.0, 32, 24)),
        PipelineConfig::default(),
    )
    .expect("orchestrator");
    orchestrator.load_video_file("two-seconds.mp4").expect("load");

    let artifact = orchestrator.process().await.expect("process");

    assert_eq!(orchestrator.state(), SessionState::Done);
    let outcomes = orchestrator.outcomes();
    assert_eq!(outcomes.len(), 12);
    assert!(outcomes.iter().all(|o| !o.succeeded));
    assert_eq!(artifact.frame_count, 12);
}

/// Sink that breaks at a chosen capture, or when finalizing.
struct BrokenRecorder {
    fail_capture_at: Option<usize>,
}

struct BrokenSink {
    fail_capture_at: Option<usize>,
    captured: usize,
}

#[async_trait]
impl RecordingSink for BrokenSink {
    fn content_type(&self) -> &str {
        "video/webm"
    }

    fn capture(&mut self, _surface: &Surface, _at: Duration) -> Result<(), PipelineError> {
        if Some(self.captured) == self.fail_capture_at {
            return Err(PipelineError::Encoding("encoder lost its device".into()));
        }
        self.captured += 1;
        Ok(())
    }

    async fn stop(&mut self, _at: Duration) -> Result<SinkOutput, PipelineError> {
        Err(PipelineError::Encoding("muxer could not finalize".into()))
    }
}

#[async_trait]
impl Recorder for BrokenRecorder {
    fn supports(&self, content_type: &str) -> bool {
        content_type.starts_with("video/webm")
    }

    fn basic_type(&self) -> Option<String> {
        None
    }

    async fn open(
        &self,
        _content_type: &str,
        _width: u32,
        _height: u32,
        _frame_interval: Duration,
    ) -> Result<Box<dyn RecordingSink>, PipelineError> {
        Ok(Box::new(BrokenSink {
            fail_capture_at: self.fail_capture_at,
            captured: 0,
        }))
    }
}

async fn assert_sink_failure_discards_output(fail_capture_at: Option<usize>) {
    let orchestrator = Orchestrator::new(
        MockDetectionClient::new(),
        BrokenRecorder { fail_capture_at },
        SyntheticOpener::new(SyntheticSource::new(1.0, 16, 16)),
        PipelineConfig::default(),
    )
    .expect("orchestrator");
    orchestrator.load_video_file("clip.mp4").expect("load");

    let result = orchestrator.process().await;

    assert!(matches!(result, Err(PipelineError::Encoding(_))), "{result:?}");
    assert_eq!(orchestrator.state(), SessionState::Errored);
    assert!(orchestrator.output().is_none());
    assert!(orchestrator.output_handle().is_none());
    assert!(orchestrator.report().is_none());
    // Only the staged input is still referenced.
    assert_eq!(orchestrator.live_handles(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sink_error_mid_capture_errors_session() {
    assert_sink_failure_discards_output(Some(3)).await;
}

#[tokio::test(start_paused = true)]
async fn test_sink_error_on_stop_errors_session() {
    assert_sink_failure_discards_output(None).await;
}
