use std::path::Path;
use std::time::Duration;

use crate::core::error::PipelineError;

/// Final encoded video. Only ever built from a complete recording.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputArtifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub frame_count: usize,
    pub duration: Duration,
}

impl OutputArtifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn extension(&self) -> &'static str {
        extension_for(&self.content_type)
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}

pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence {
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        _ => "webm",
    }
}
