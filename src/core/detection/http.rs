use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use reqwest::multipart;
use reqwest::{Client, Response};

use crate::core::config::PipelineConfig;
use crate::core::detection::client::DetectionClient;
use crate::core::detection::data_uri::decode_data_uri;
use crate::core::detection::models::{
    DetectResponse, DetectionReply, HealthStatus, ModelInfo, ModelsResponse,
};
use crate::core::error::DetectionError;
use crate::core::media::EncodedImage;

/// Pipeline frames give up sooner than single-image requests.
pub const PIPELINE_DETECT_TIMEOUT: Duration = Duration::from_secs(15);
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the anomaly detection backend.
#[derive(Debug, Clone)]
pub struct HttpDetectionClient {
    base_url: String,
    http: Client,
    timeout: Duration,
}

impl HttpDetectionClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DetectionError> {
        Self::with_timeout(base_url, PIPELINE_DETECT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DetectionError> {
        let http = Client::builder().build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            timeout,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, DetectionError> {
        Self::with_timeout(&config.detector_url, config.detect_timeout())
    }

    /// Same backend and connection pool, with the single-image timeout.
    pub fn for_single_image(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn health(&self) -> Result<HealthStatus, DetectionError> {
        let url = format!("{}/health", self.base_url);
        let response = self.http.get(url).timeout(CONTROL_TIMEOUT).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, DetectionError> {
        let url = format!("{}/models", self.base_url);
        let response = self.http.get(url).timeout(CONTROL_TIMEOUT).send().await?;
        let response = Self::check_status(response).await?;
        let body: ModelsResponse = response.json().await?;
        Ok(body.models)
    }

    async fn check_status(response: Response) -> Result<Response, DetectionError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(DetectionError::UnexpectedStatus { status, body })
    }
}

#[async_trait]
impl DetectionClient for HttpDetectionClient {
    async fn detect(
        &self,
        image: &EncodedImage,
        model_id: &str,
    ) -> Result<DetectionReply, DetectionError> {
        let url = format!("{}/detect", self.base_url);

        let part = multipart::Part::bytes(image.bytes().to_vec())
            .file_name(image.file_name("frame"))
            .mime_str(image.mime_type())?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("model", model_id.to_string());

        let response = self
            .http
            .post(url)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DetectionError::Timeout(self.timeout)
                } else {
                    DetectionError::Http(e)
                }
            })?;
        let response = Self::check_status(response).await?;

        let text = response.text().await?;
        parse_detect_body(&text)
    }
}

pub fn parse_detect_body(text: &str) -> Result<DetectionReply, DetectionError> {
    let body: DetectResponse = serde_json::from_str(text)
        .map_err(|e| DetectionError::InvalidResponse(format!("{e}")))?;
    let annotated_image = decode_data_uri(&body.image)?;
    Ok(DetectionReply {
        annotated_image,
        detections: body.detections,
        process_time_ms: body.process_time_ms,
    })
}

/// Best-effort, detached health check. The outcome is only logged.
pub fn spawn_health_probe(client: &HttpDetectionClient) -> tokio::task::JoinHandle<()> {
    let client = client.clone();
    tokio::spawn(async move {
        match client.health().await {
            Ok(status) if status.is_healthy() => info!(
                "detector at {} healthy (device={:?}, models={:?})",
                client.base_url(),
                status.device,
                status.models_loaded
            ),
            Ok(status) => warn!(
                "detector at {} reports status {:?}",
                client.base_url(),
                status.status
            ),
            Err(e) => warn!("detector health probe failed: {e}"),
        }
    })
}
