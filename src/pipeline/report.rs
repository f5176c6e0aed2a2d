use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::detection::DetectionOutcome;
use crate::core::recording::OutputArtifact;

/// Summary of a finished run, written next to the output by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub frames: usize,
    pub annotated: usize,
    pub fallbacks: usize,
    pub detections_by_class: BTreeMap<String, usize>,
    pub total_detections: usize,
    pub mean_process_time_ms: Option<f64>,
    pub output_content_type: String,
    pub output_duration_secs: f64,
    pub output_bytes: usize,
}

impl SessionReport {
    pub fn build(outcomes: &[DetectionOutcome], artifact: &OutputArtifact) -> Self {
        let mut detections_by_class = BTreeMap::new();
        for detection in outcomes.iter().flat_map(|o| o.detections.iter()) {
            *detections_by_class
                .entry(detection.class_label.clone())
                .or_insert(0usize) += 1;
        }

        let times: Vec<f64> = outcomes.iter().filter_map(|o| o.process_time_ms).collect();
        let mean_process_time_ms =
            (!times.is_empty()).then(|| times.iter().sum::<f64>() / times.len() as f64);
        let annotated = outcomes.iter().filter(|o| o.succeeded).count();

        Self {
            frames: outcomes.len(),
            annotated,
            fallbacks: outcomes.len() - annotated,
            total_detections: detections_by_class.values().sum(),
            detections_by_class,
            mean_process_time_ms,
            output_content_type: artifact.content_type.clone(),
            output_duration_secs: artifact.duration.as_secs_f64(),
            output_bytes: artifact.len(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
