use std::time::Duration;

use image::RgbaImage;
use log::{debug, info};
use rayon::prelude::*;
use tokio::time::{sleep, sleep_until, Instant};

use crate::core::error::PipelineError;
use crate::core::media::{EncodedImage, Surface};
use crate::core::recording::artifact::OutputArtifact;
use crate::core::recording::sink::{negotiate, Recorder};

/// Lower bound of the hold after the last frame, so the sink flushes it.
pub const MIN_GRACE: Duration = Duration::from_millis(500);

pub fn frame_interval(sampling_rate_hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / sampling_rate_hz.max(1) as f64)
}

/// `max(3 intervals, 500ms)`.
pub fn grace_period(sampling_rate_hz: u32) -> Duration {
    (frame_interval(sampling_rate_hz) * 3).max(MIN_GRACE)
}

/// Plays annotated images back onto a surface at the sampling rate while a
/// sink records it, so the output lasts as long as the sampled source.
pub struct Reassembler<'a, R: ?Sized> {
    recorder: &'a R,
    preferences: Vec<String>,
}

impl<'a, R: Recorder + ?Sized> Reassembler<'a, R> {
    pub fn new(recorder: &'a R, preferences: Vec<String>) -> Self {
        Self {
            recorder,
            preferences,
        }
    }

    pub async fn reassemble<F>(
        &self,
        images: &[EncodedImage],
        sampling_rate_hz: u32,
        mut on_progress: F,
    ) -> Result<OutputArtifact, PipelineError>
    where
        F: FnMut(usize, usize),
    {
        if images.is_empty() {
            return Err(PipelineError::NoFramesExtracted);
        }
        if sampling_rate_hz == 0 {
            return Err(PipelineError::Config("sampling rate must be > 0".into()));
        }

        let rasters = decode_all(images.to_vec()).await?;
        let (width, height) = rasters[0].dimensions();
        let mut surface = Surface::new(width, height)?;

        let content_type = negotiate(self.recorder, &self.preferences)?;
        let interval = frame_interval(sampling_rate_hz);
        let mut sink = self
            .recorder
            .open(&content_type, width, height, interval)
            .await?;

        let total = rasters.len();
        info!(
            "🎬 reassembling {total} frames at {sampling_rate_hz} fps as {content_type} ({width}x{height})"
        );

        let started = Instant::now();
        for (i, raster) in rasters.iter().enumerate() {
            surface.clear();
            surface.draw_image(raster);
            sink.capture(&surface, started.elapsed())?;
            on_progress(i + 1, total);
            // Absolute deadlines, so per-frame scheduling jitter never accumulates.
            sleep_until(started + interval * (i as u32 + 1)).await;
        }

        let grace = grace_period(sampling_rate_hz);
        debug!("holding last frame for {grace:?} before stopping");
        sleep(grace).await;

        let output = sink.stop(started.elapsed()).await?;
        let bytes: Vec<u8> = output.chunks.concat();
        if bytes.is_empty() {
            return Err(PipelineError::Encoding("recorder produced no data".into()));
        }

        info!(
            "✅ output ready: {} bytes, {} frames, {:.2}s",
            bytes.len(),
            output.frames,
            output.duration.as_secs_f64()
        );
        Ok(OutputArtifact {
            bytes,
            content_type,
            frame_count: output.frames,
            duration: output.duration,
        })
    }
}

async fn decode_all(images: Vec<EncodedImage>) -> Result<Vec<RgbaImage>, PipelineError> {
    tokio::task::spawn_blocking(move || {
        images
            .par_iter()
            .enumerate()
            .map(|(i, img)| {
                img.decode()
                    .map_err(|e| PipelineError::Encoding(format!("frame {i} is not decodable: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()
    })
    .await
    .map_err(|e| PipelineError::Encoding(format!("decode task failed: {e}")))?
}
