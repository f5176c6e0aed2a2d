use async_trait::async_trait;

use crate::core::detection::models::DetectionReply;
use crate::core::error::DetectionError;
use crate::core::media::EncodedImage;

/// Remote detector: one still image in, annotated image plus detections out.
#[async_trait]
pub trait DetectionClient: Send + Sync {
    async fn detect(
        &self,
        image: &EncodedImage,
        model_id: &str,
    ) -> Result<DetectionReply, DetectionError>;
}

#[async_trait]
impl<T: DetectionClient + ?Sized> DetectionClient for std::sync::Arc<T> {
    async fn detect(
        &self,
        image: &EncodedImage,
        model_id: &str,
    ) -> Result<DetectionReply, DetectionError> {
        (**self).detect(image, model_id).await
    }
}
