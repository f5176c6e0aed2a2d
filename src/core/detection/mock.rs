use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat};

use crate::core::detection::client::DetectionClient;
use crate::core::detection::models::{BoundingBox, Detection, DetectionReply};
use crate::core::detection::overlay::draw_detections;
use crate::core::error::DetectionError;
use crate::core::media::EncodedImage;

pub const MOCK_LABEL: &str = "anomaly";
/// Class list the mock model reports, in class-id order.
pub const MOCK_CLASSES: [&str; 1] = [MOCK_LABEL];

/// In-process detector. Whether call `n` (0-based, in issuance order)
/// succeeds is decided by a pattern.
pub struct MockDetectionClient {
    // 按调用序号决定成功与否
    success_pattern: Box<dyn Fn(u64) -> bool + Send + Sync>,
    latency: Duration,
    hang: bool,
    calls: AtomicU64,
}

impl MockDetectionClient {
    pub fn new() -> Self {
        Self::with_pattern(|_| true)
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(u64) -> bool + Send + Sync + 'static,
    {
        Self {
            success_pattern: Box::new(pattern),
            latency: Duration::ZERO,
            hang: false,
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_fixed_calls(calls: Vec<u64>) -> Self {
        Self::with_pattern(move |n| calls.contains(&n))
    }

    pub fn always_failing() -> Self {
        Self::with_pattern(|_| false)
    }

    /// Never answers; only a timeout gets the caller out.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn annotate(image: &EncodedImage) -> Result<DetectionReply, DetectionError> {
        let mut raster = image.decode()?;
        let (w, h) = raster.dimensions();
        let detections = vec![Detection {
            bounding_box: BoundingBox {
                x: w as f32 / 4.0,
                y: h as f32 / 4.0,
                width: w as f32 / 2.0,
                height: h as f32 / 2.0,
            },
            confidence: 0.9,
            class_label: MOCK_LABEL.to_string(),
        }];
        draw_detections(&mut raster, &detections, &MOCK_CLASSES);

        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(raster)
            .to_rgb8()
            .write_to(&mut buffer, ImageOutputFormat::Jpeg(90))?;

        Ok(DetectionReply {
            annotated_image: EncodedImage::new(buffer.into_inner(), "image/jpeg"),
            detections,
            process_time_ms: 1.0,
        })
    }
}

impl Default for MockDetectionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DetectionClient for MockDetectionClient {
    async fn detect(
        &self,
        image: &EncodedImage,
        _model_id: &str,
    ) -> Result<DetectionReply, DetectionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if (self.success_pattern)(call) {
            Self::annotate(image)
        } else {
            Err(DetectionError::InvalidResponse(format!(
                "mock detector rejected call {call}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::FrameFormat;
    use crate::core::media::Surface;

    fn create_test_image() -> EncodedImage {
        Surface::new(32, 32)
            .expect("surface")
            .encode(FrameFormat::Png, 90)
            .expect("encode")
    }

    #[tokio::test]
    async fn test_mock_pattern_by_call_number() {
        let client = MockDetectionClient::with_fixed_calls(vec![1]);
        let image = create_test_image();
        assert!(client.detect(&image, "general").await.is_err());
        assert!(client.detect(&image, "general").await.is_ok());
        assert!(client.detect(&image, "general").await.is_err());
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_annotates_image() {
        let client = MockDetectionClient::new();
        let reply = client.detect(&create_test_image(), "general").await.expect("detect");
        assert_eq!(reply.detections.len(), 1);
        assert_eq!(reply.detections[0].class_label, MOCK_LABEL);
        assert_eq!(reply.annotated_image.mime_type(), "image/jpeg");
        assert_eq!(reply.annotated_image.decode().expect("decode").dimensions(), (32, 32));
    }

    #[tokio::test]
    async fn test_mock_rejects_undecodable_image() {
        let client = MockDetectionClient::new();
        let garbage = EncodedImage::new(vec![1, 2, 3], "image/jpeg");
        assert!(matches!(
            client.detect(&garbage, "general").await,
            Err(DetectionError::Image(_))
        ));
    }
}
