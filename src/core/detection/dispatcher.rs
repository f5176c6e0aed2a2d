use std::time::Duration;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};

use crate::core::detection::client::DetectionClient;
use crate::core::detection::http::PIPELINE_DETECT_TIMEOUT;
use crate::core::detection::models::{DetectionOutcome, DetectionReply};
use crate::core::error::DetectionError;
use crate::core::media::Frame;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub succeeded: usize,
    pub failed: usize,
}

/// Feeds frames to a detector and returns one outcome per frame, in frame
/// order. Failures fall back to the original frame.
pub struct FrameDispatcher<'a, C: ?Sized> {
    client: &'a C,
    model_id: String,
    timeout: Duration,
    concurrency: usize,
}

impl<'a, C: DetectionClient + ?Sized> FrameDispatcher<'a, C> {
    pub fn new(client: &'a C, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
            timeout: PIPELINE_DETECT_TIMEOUT,
            concurrency: 1,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Requests in flight at once. 1 means strictly sequential.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn dispatch<F>(
        &self,
        frames: &[Frame],
        mut on_progress: F,
    ) -> (Vec<DetectionOutcome>, DispatchStats)
    where
        F: FnMut(usize, usize),
    {
        let total = frames.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut stats = DispatchStats::default();

        info!(
            "🔍 dispatching {total} frames to model {} ({} in flight)",
            self.model_id, self.concurrency
        );

        // `buffered` yields in issuance order even when requests finish out of order.
        let mut results = stream::iter(frames.iter().enumerate())
            .map(|(i, frame)| self.dispatch_one(i, frame))
            .buffered(self.concurrency);

        while let Some(outcome) = results.next().await {
            if outcome.succeeded {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
            outcomes.push(outcome);
            on_progress(outcomes.len(), total);
        }

        info!(
            "dispatch finished: {} annotated, {} fallback",
            stats.succeeded, stats.failed
        );
        (outcomes, stats)
    }

    async fn dispatch_one(&self, position: usize, frame: &Frame) -> DetectionOutcome {
        let call = tokio::time::timeout(self.timeout, self.client.detect(&frame.image, &self.model_id));
        let result = match call.await {
            Ok(Ok(reply)) => verify_decodable(reply).await,
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DetectionError::Timeout(self.timeout)),
        };

        match result {
            Ok(reply) => {
                debug!(
                    "frame {position}: {} detections in {:.1}ms",
                    reply.detections.len(),
                    reply.process_time_ms
                );
                DetectionOutcome::annotated(position, reply)
            }
            Err(e) => {
                warn!("frame {position} falls back to original: {e}");
                DetectionOutcome::fallback(position, frame.image.clone())
            }
        }
    }
}

/// Full decode of the reply image. A truncated body passes a header check but
/// would still fail the reassembler, so only a complete decode counts.
async fn verify_decodable(reply: DetectionReply) -> Result<DetectionReply, DetectionError> {
    let image = reply.annotated_image.clone();
    tokio::task::spawn_blocking(move || image.decode().map(|_| ()))
        .await
        .map_err(|e| DetectionError::InvalidResponse(format!("decode task failed: {e}")))??;
    Ok(reply)
}
