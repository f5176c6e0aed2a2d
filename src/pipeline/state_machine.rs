use serde::Serialize;

use crate::core::error::PipelineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Extracting,
    Detecting,
    Reassembling,
    Done,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    FramesExtracted(usize),
    OutcomesReady,
    ArtifactReady,
    Failed,
    Reset,
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Start => "start",
            SessionEvent::FramesExtracted(_) => "frames_extracted",
            SessionEvent::OutcomesReady => "outcomes_ready",
            SessionEvent::ArtifactReady => "artifact_ready",
            SessionEvent::Failed => "failed",
            SessionEvent::Reset => "reset",
        }
    }
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Extracting => "extracting",
            SessionState::Detecting => "detecting",
            SessionState::Reassembling => "reassembling",
            SessionState::Done => "done",
            SessionState::Errored => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Errored)
    }

    pub fn transition(&self, event: SessionEvent) -> Result<SessionState, PipelineError> {
        let next = match (self, event) {
            (SessionState::Idle, SessionEvent::Start) => SessionState::Extracting,

            // 一帧都没有就直接失败
            (SessionState::Extracting, SessionEvent::FramesExtracted(0)) => SessionState::Errored,
            (SessionState::Extracting, SessionEvent::FramesExtracted(_)) => SessionState::Detecting,

            (SessionState::Detecting, SessionEvent::OutcomesReady) => SessionState::Reassembling,
            (SessionState::Reassembling, SessionEvent::ArtifactReady) => SessionState::Done,

            (state, SessionEvent::Failed) if *state != SessionState::Idle => SessionState::Errored,

            (SessionState::Idle | SessionState::Done | SessionState::Errored, SessionEvent::Reset) => {
                SessionState::Idle
            }

            (state, event) => {
                return Err(PipelineError::InvalidTransition {
                    from: state.label().to_string(),
                    event: event.name().to_string(),
                })
            }
        };
        Ok(next)
    }
}

/// Share of overall progress owned by each running stage, as `(start, end)`.
pub const EXTRACTION_WEIGHT: (u8, u8) = (0, 20);
pub const DETECTION_WEIGHT: (u8, u8) = (20, 90);
pub const REASSEMBLY_WEIGHT: (u8, u8) = (90, 100);

/// Overall percentage for `done` of `total` units finished in `state`.
pub fn stage_percent(state: SessionState, done: usize, total: usize) -> u8 {
    let (start, end) = match state {
        SessionState::Idle => return 0,
        SessionState::Extracting => EXTRACTION_WEIGHT,
        SessionState::Detecting => DETECTION_WEIGHT,
        SessionState::Reassembling => REASSEMBLY_WEIGHT,
        SessionState::Done => return 100,
        SessionState::Errored => return 0,
    };
    if total == 0 {
        return start;
    }
    let fraction = done.min(total) as f64 / total as f64;
    start + ((end - start) as f64 * fraction).floor() as u8
}

/// Never moves backwards until reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    percent: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Returns true when the value moved.
    pub fn advance(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        if percent > self.percent {
            self.percent = percent;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.percent = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_events(events: &[SessionEvent]) -> Result<SessionState, PipelineError> {
        events
            .iter()
            .try_fold(SessionState::Idle, |state, event| state.transition(*event))
    }

    #[test]
    fn test_happy_path() {
        let state = run_events(&[
            SessionEvent::Start,
            SessionEvent::FramesExtracted(12),
            SessionEvent::OutcomesReady,
            SessionEvent::ArtifactReady,
        ])
        .expect("valid path");
        assert_eq!(state, SessionState::Done);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_zero_frames_errors() {
        let state = run_events(&[SessionEvent::Start, SessionEvent::FramesExtracted(0)])
            .expect("valid path");
        assert_eq!(state, SessionState::Errored);
    }

    #[test]
    fn test_failed_from_every_running_state() {
        for state in [
            SessionState::Extracting,
            SessionState::Detecting,
            SessionState::Reassembling,
        ] {
            assert_eq!(state.transition(SessionEvent::Failed).expect("fail"), SessionState::Errored);
        }
        assert!(SessionState::Idle.transition(SessionEvent::Failed).is_err());
    }

    #[test]
    fn test_reset_only_when_settled() {
        assert_eq!(
            SessionState::Done.transition(SessionEvent::Reset).expect("reset"),
            SessionState::Idle
        );
        assert_eq!(
            SessionState::Errored.transition(SessionEvent::Reset).expect("reset"),
            SessionState::Idle
        );
        assert!(matches!(
            SessionState::Detecting.transition(SessionEvent::Reset),
            Err(PipelineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_cannot_skip_stages() {
        let err = SessionState::Idle
            .transition(SessionEvent::ArtifactReady)
            .expect_err("must reject");
        assert_eq!(
            err.to_string(),
            "invalid state transition from idle on artifact_ready"
        );
        assert!(SessionState::Done.transition(SessionEvent::Start).is_err());
    }

    #[test]
    fn test_weights_cover_whole_range() {
        assert_eq!(EXTRACTION_WEIGHT.0, 0);
        assert_eq!(EXTRACTION_WEIGHT.1, DETECTION_WEIGHT.0);
        assert_eq!(DETECTION_WEIGHT.1, REASSEMBLY_WEIGHT.0);
        assert_eq!(REASSEMBLY_WEIGHT.1, 100);
    }

    #[test]
    fn test_stage_percent() {
        assert_eq!(stage_percent(SessionState::Extracting, 6, 12), 10);
        assert_eq!(stage_percent(SessionState::Detecting, 0, 12), 20);
        assert_eq!(stage_percent(SessionState::Detecting, 12, 12), 90);
        assert_eq!(stage_percent(SessionState::Reassembling, 1, 2), 95);
        assert_eq!(stage_percent(SessionState::Reassembling, 5, 0), 90);
        assert_eq!(stage_percent(SessionState::Done, 0, 0), 100);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut tracker = ProgressTracker::new();
        assert!(tracker.advance(30));
        assert!(!tracker.advance(10));
        assert_eq!(tracker.percent(), 30);
        assert!(tracker.advance(250));
        assert_eq!(tracker.percent(), 100);
        tracker.reset();
        assert_eq!(tracker.percent(), 0);
    }
}
