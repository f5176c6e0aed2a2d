//! 视频异常检测管线

use std::path::PathBuf;

use log::info;
use tokio::sync::watch;

use crate::core::config::PipelineConfig;
use crate::core::detection::{
    spawn_health_probe, DetectionClient, DetectionReply, HealthStatus, HttpDetectionClient, ModelInfo,
};
use crate::core::error::{DetectionError, PipelineError};
use crate::core::media::{EncodedImage, FfmpegOpener};
use crate::core::recording::{AutoRecorder, OutputArtifact};
use crate::pipeline::{ObjectHandle, Orchestrator, ProgressSnapshot, SessionReport, SessionState};

pub type ProductionOrchestrator = Orchestrator<HttpDetectionClient, AutoRecorder, FfmpegOpener>;

/// Production pipeline: HTTP detector, ffmpeg decoding, WebM or GIF output.
///
/// ```no_run
/// # async fn demo() -> Result<(), mad_video::core::PipelineError> {
/// use mad_video::api::video::VideoAnomalyPipeline;
/// use mad_video::core::PipelineConfig;
///
/// let pipeline = VideoAnomalyPipeline::create(PipelineConfig::default()).await?;
/// let (artifact, report) = pipeline.process_file("shift.mp4").await?;
/// artifact.save(std::path::Path::new("shift-annotated.webm"))?;
/// println!("{} detections", report.total_detections);
/// # Ok(())
/// # }
/// ```
pub struct VideoAnomalyPipeline {
    orchestrator: ProductionOrchestrator,
}

impl VideoAnomalyPipeline {
    /// 创建管线，探测本机 ffmpeg 编码能力
    pub async fn create(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let client = HttpDetectionClient::from_config(&config)
            .map_err(|e| PipelineError::Config(format!("detector client: {e}")))?;
        let recorder = AutoRecorder::detect(&config.ffmpeg_path).await;
        let opener = FfmpegOpener {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
        };

        info!(
            "🎬 VideoAnomalyPipeline: created (detector {}, webm encoder: {})",
            client.base_url(),
            recorder.has_video_encoder()
        );
        spawn_health_probe(&client);

        Ok(Self {
            orchestrator: Orchestrator::new(client, recorder, opener, config)?,
        })
    }

    pub fn orchestrator(&self) -> &ProductionOrchestrator {
        &self.orchestrator
    }

    pub fn load_video_file(&self, path: impl Into<PathBuf>) -> Result<ObjectHandle, PipelineError> {
        self.orchestrator.load_video_file(path)
    }

    pub fn load_video(&self, bytes: &[u8], file_name: &str) -> Result<ObjectHandle, PipelineError> {
        self.orchestrator.load_video(bytes, file_name)
    }

    pub async fn process(&self) -> Result<OutputArtifact, PipelineError> {
        self.orchestrator.process().await
    }

    /// Load, process and summarise one file, resetting any finished session first.
    pub async fn process_file(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<(OutputArtifact, SessionReport), PipelineError> {
        if self.orchestrator.state().is_terminal() {
            self.orchestrator.reset()?;
        }
        self.orchestrator.load_video_file(path)?;
        let artifact = self.orchestrator.process().await?;
        let report = self
            .orchestrator
            .report()
            .ok_or_else(|| PipelineError::Encoding("finished session has no output".into()))?;
        Ok((artifact, report))
    }

    pub fn reset(&self) -> Result<(), PipelineError> {
        self.orchestrator.reset()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.orchestrator.progress()
    }

    pub fn state(&self) -> SessionState {
        self.orchestrator.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.orchestrator.subscribe()
    }

    pub fn report(&self) -> Option<SessionReport> {
        self.orchestrator.report()
    }

    /// 单张图片检测（超时取 `single_image_timeout_secs`，默认 30 秒）
    pub async fn detect_image(
        &self,
        image: &EncodedImage,
        model_id: Option<&str>,
    ) -> Result<DetectionReply, DetectionError> {
        let model = model_id.unwrap_or(self.orchestrator.config().model_id.as_str());
        self.single_image_client().detect(image, model).await
    }

    fn single_image_client(&self) -> HttpDetectionClient {
        self.orchestrator
            .client()
            .for_single_image(self.orchestrator.config().single_image_timeout())
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, DetectionError> {
        self.orchestrator.client().list_models().await
    }

    pub async fn health(&self) -> Result<HealthStatus, DetectionError> {
        self.orchestrator.client().health().await
    }
}

impl Drop for VideoAnomalyPipeline {
    fn drop(&mut self) {
        info!("🗑️ VideoAnomalyPipeline: released");
    }
}
