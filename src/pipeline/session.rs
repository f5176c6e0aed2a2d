use std::sync::Arc;

use log::debug;

use crate::core::detection::{DetectionOutcome, DispatchStats};
use crate::core::error::PipelineError;
use crate::core::media::{ExtractionStats, Frame};
use crate::pipeline::resources::ObjectHandle;
use crate::pipeline::state_machine::{ProgressTracker, SessionEvent, SessionState};

/// One processing run. Only the orchestrator mutates it; everything else
/// sees it through the read accessors.
#[derive(Debug)]
pub struct Session {
    source: Option<ObjectHandle>,
    sampling_rate_hz: u32,
    state: SessionState,
    progress: ProgressTracker,
    frames: Arc<[Frame]>,
    outcomes: Vec<DetectionOutcome>,
    output: Option<ObjectHandle>,
    error: Option<String>,
    extraction_stats: ExtractionStats,
    dispatch_stats: DispatchStats,
}

impl Session {
    pub fn new(sampling_rate_hz: u32) -> Self {
        Self {
            source: None,
            sampling_rate_hz,
            state: SessionState::Idle,
            progress: ProgressTracker::new(),
            frames: Arc::from(Vec::new()),
            outcomes: Vec::new(),
            output: None,
            error: None,
            extraction_stats: ExtractionStats::default(),
            dispatch_stats: DispatchStats::default(),
        }
    }

    pub fn source(&self) -> Option<ObjectHandle> {
        self.source
    }

    pub fn sampling_rate_hz(&self) -> u32 {
        self.sampling_rate_hz
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress.percent()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn outcomes(&self) -> &[DetectionOutcome] {
        &self.outcomes
    }

    /// Present only once the session is `Done`.
    pub fn output(&self) -> Option<ObjectHandle> {
        self.output
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn extraction_stats(&self) -> ExtractionStats {
        self.extraction_stats
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatch_stats
    }

    pub(crate) fn set_source(&mut self, source: Option<ObjectHandle>) {
        self.source = source;
    }

    pub(crate) fn apply(&mut self, event: SessionEvent) -> Result<SessionState, PipelineError> {
        let next = self.state.transition(event)?;
        debug!("session {} -> {} on {event:?}", self.state.label(), next.label());
        self.state = next;
        Ok(next)
    }

    pub(crate) fn advance_progress(&mut self, percent: u8) -> bool {
        self.progress.advance(percent)
    }

    pub(crate) fn store_frames(&mut self, frames: Vec<Frame>, stats: ExtractionStats) -> Arc<[Frame]> {
        self.frames = Arc::from(frames);
        self.extraction_stats = stats;
        Arc::clone(&self.frames)
    }

    pub(crate) fn store_outcomes(&mut self, outcomes: Vec<DetectionOutcome>, stats: DispatchStats) {
        self.outcomes = outcomes;
        self.dispatch_stats = stats;
    }

    pub(crate) fn set_output(&mut self, output: ObjectHandle) {
        self.output = Some(output);
    }

    pub(crate) fn set_error(&mut self, message: String) {
        self.error = Some(message);
    }

    /// Drop everything a run produced. Returns the output handle to revoke.
    pub(crate) fn clear_run(&mut self) -> Option<ObjectHandle> {
        self.frames = Arc::from(Vec::new());
        self.outcomes.clear();
        self.extraction_stats = ExtractionStats::default();
        self.dispatch_stats = DispatchStats::default();
        self.output.take()
    }

    pub(crate) fn reset_progress(&mut self) {
        self.progress.reset();
        self.error = None;
    }
}
