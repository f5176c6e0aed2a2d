//! Pure-Rust animated GIF recorder. Always available, so it is the basic
//! fallback when no video encoder can be found.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::{AnimationDecoder, Delay, RgbaImage};
use log::debug;

use crate::core::error::PipelineError;
use crate::core::media::Surface;
use crate::core::recording::sink::{frame_durations, Recorder, RecordingSink, SinkOutput};

pub const GIF_CONTENT_TYPE: &str = "image/gif";

/// NeuQuant speed: 1 is best quality, 30 fastest.
const QUANT_SPEED: i32 = 10;

#[derive(Debug, Clone, Default)]
pub struct GifRecorder;

impl GifRecorder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Recorder for GifRecorder {
    fn supports(&self, content_type: &str) -> bool {
        content_type == GIF_CONTENT_TYPE
    }

    fn basic_type(&self) -> Option<String> {
        Some(GIF_CONTENT_TYPE.to_string())
    }

    async fn open(
        &self,
        content_type: &str,
        width: u32,
        height: u32,
        frame_interval: Duration,
    ) -> Result<Box<dyn RecordingSink>, PipelineError> {
        if !self.supports(content_type) {
            return Err(PipelineError::UnsupportedEnvironment(format!(
                "GIF recorder cannot produce {content_type}"
            )));
        }
        Ok(Box::new(GifSink {
            width,
            height,
            frame_interval,
            frames: Vec::new(),
            stopped: false,
        }))
    }
}

struct GifSink {
    width: u32,
    height: u32,
    frame_interval: Duration,
    frames: Vec<(RgbaImage, Duration)>,
    stopped: bool,
}

#[async_trait]
impl RecordingSink for GifSink {
    fn content_type(&self) -> &str {
        GIF_CONTENT_TYPE
    }

    fn capture(&mut self, surface: &Surface, at: Duration) -> Result<(), PipelineError> {
        if self.stopped {
            return Err(PipelineError::Encoding("capture after stop".into()));
        }
        if (surface.width(), surface.height()) != (self.width, self.height) {
            return Err(PipelineError::Encoding(format!(
                "surface changed size to {}x{} mid-recording",
                surface.width(),
                surface.height()
            )));
        }
        self.frames.push((surface.snapshot(), at));
        Ok(())
    }

    async fn stop(&mut self, at: Duration) -> Result<SinkOutput, PipelineError> {
        self.stopped = true;
        let frames = std::mem::take(&mut self.frames);
        if frames.is_empty() {
            return Err(PipelineError::Encoding("no frames were captured".into()));
        }
        let interval = self.frame_interval;

        // Quantisation is CPU bound; keep it off the session thread.
        tokio::task::spawn_blocking(move || encode_gif(frames, interval, at))
            .await
            .map_err(|e| PipelineError::Encoding(format!("GIF encoder task failed: {e}")))?
    }
}

fn encode_gif(
    frames: Vec<(RgbaImage, Duration)>,
    frame_interval: Duration,
    stop_at: Duration,
) -> Result<SinkOutput, PipelineError> {
    let times: Vec<Duration> = frames.iter().map(|(_, at)| *at).collect();
    let durations = frame_durations(&times, frame_interval, stop_at);
    let delays_cs = centisecond_delays(&times, &durations);
    let frame_count = frames.len();

    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut bytes, QUANT_SPEED);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| PipelineError::Encoding(e.to_string()))?;
        for ((raster, _), cs) in frames.into_iter().zip(delays_cs.iter()) {
            let delay = Delay::from_numer_denom_ms(cs * 10, 1);
            encoder
                .encode_frame(image::Frame::from_parts(raster, 0, 0, delay))
                .map_err(|e| PipelineError::Encoding(e.to_string()))?;
        }
    }

    let total_cs: u32 = delays_cs.iter().sum();
    debug!("GIF encoded: {frame_count} frames, {} bytes, {total_cs}cs", bytes.len());
    Ok(SinkOutput {
        chunks: vec![bytes],
        frames: frame_count,
        duration: Duration::from_millis(total_cs as u64 * 10),
    })
}

/// GIF delays are whole centiseconds. Rounding frame boundaries rather than
/// each delay keeps the total from drifting.
fn centisecond_delays(times: &[Duration], durations: &[Duration]) -> Vec<u32> {
    let Some(first) = times.first() else {
        return Vec::new();
    };
    let to_cs = |d: Duration| (d.saturating_sub(*first).as_secs_f64() * 100.0).round() as u32;
    times
        .iter()
        .zip(durations.iter())
        .map(|(start, len)| {
            let begin = to_cs(*start);
            let end = to_cs(*start + *len);
            end.saturating_sub(begin).max(1)
        })
        .collect()
}

/// Per-frame display times of an encoded GIF.
pub fn gif_timeline(bytes: &[u8]) -> Result<Vec<Duration>, image::ImageError> {
    let decoder = GifDecoder::new(Cursor::new(bytes))?;
    let frames = decoder.into_frames().collect_frames()?;
    Ok(frames
        .iter()
        .map(|f| {
            let (numer, denom) = f.delay().numer_denom_ms();
            Duration::from_secs_f64(numer as f64 / denom.max(1) as f64 / 1000.0)
        })
        .collect())
}

/// Decoded frames of an encoded GIF.
pub fn gif_frames(bytes: &[u8]) -> Result<Vec<RgbaImage>, image::ImageError> {
    let decoder = GifDecoder::new(Cursor::new(bytes))?;
    let frames = decoder.into_frames().collect_frames()?;
    Ok(frames.into_iter().map(|f| f.into_buffer()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_surface(shade: u8) -> Surface {
        let mut surface = Surface::new(16, 16).expect("surface");
        surface.draw_image(&RgbaImage::from_pixel(16, 16, image::Rgba([shade, shade, shade, 255])));
        surface
    }

    #[test]
    fn test_centisecond_delays_do_not_drift() {
        let interval = Duration::from_secs_f64(1.0 / 6.0);
        let times: Vec<Duration> = (0..12).map(|i| interval * i).collect();
        let durations = frame_durations(&times, interval, interval * 15);
        let delays = centisecond_delays(&times, &durations);
        assert_eq!(delays.len(), 12);
        assert_eq!(delays.iter().sum::<u32>(), 200);
    }

    #[tokio::test]
    async fn test_gif_sink_roundtrip_timeline() {
        let recorder = GifRecorder::new();
        let interval = Duration::from_millis(100);
        let mut sink = recorder.open(GIF_CONTENT_TYPE, 16, 16, interval).await.expect("open");

        for i in 0..5u32 {
            sink.capture(&create_surface((i * 50) as u8), interval * i).expect("capture");
        }
        let output = sink.stop(Duration::from_millis(1000)).await.expect("stop");

        assert_eq!(output.frames, 5);
        assert_eq!(output.duration, Duration::from_millis(500));
        let timeline = gif_timeline(&output.chunks[0]).expect("decode");
        assert_eq!(timeline.len(), 5);
        assert!(timeline.iter().all(|d| *d == interval));
    }

    #[tokio::test]
    async fn test_gif_frames_keep_order() {
        let recorder = GifRecorder::new();
        let interval = Duration::from_millis(100);
        let mut sink = recorder.open(GIF_CONTENT_TYPE, 16, 16, interval).await.expect("open");
        let shades = [0u8, 60, 120, 180, 240];
        for (i, shade) in shades.iter().enumerate() {
            sink.capture(&create_surface(*shade), interval * i as u32).expect("capture");
        }
        let output = sink.stop(interval * 8).await.expect("stop");

        let decoded = gif_frames(&output.chunks[0]).expect("decode");
        let reds: Vec<u8> = decoded.iter().map(|f| f.get_pixel(8, 8).0[0]).collect();
        assert_eq!(reds.len(), shades.len());
        assert!(reds.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_stop_without_frames_is_encoding_error() {
        let mut sink = GifRecorder::new()
            .open(GIF_CONTENT_TYPE, 16, 16, Duration::from_millis(100))
            .await
            .expect("open");
        assert!(matches!(
            sink.stop(Duration::from_secs(1)).await,
            Err(PipelineError::Encoding(_))
        ));
    }

    #[tokio::test]
    async fn test_size_change_is_encoding_error() {
        let mut sink = GifRecorder::new()
            .open(GIF_CONTENT_TYPE, 8, 8, Duration::from_millis(100))
            .await
            .expect("open");
        assert!(matches!(
            sink.capture(&create_surface(10), Duration::ZERO),
            Err(PipelineError::Encoding(_))
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_webm() {
        let result = GifRecorder::new()
            .open("video/webm", 8, 8, Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(PipelineError::UnsupportedEnvironment(_))));
    }
}
