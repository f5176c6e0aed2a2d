//! Drives one session through extraction, detection and reassembly.
//!
//! The orchestrator is built for a single-threaded runtime: session state
//! lives in `RefCell`s that are never borrowed across an `.await`, and a
//! second `process()` while one is in flight is rejected with
//! [`PipelineError::SessionBusy`]. Dropping an in-flight `process()` future
//! cancels the run and leaves the session `Errored`.

use std::cell::{Cell, RefCell};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::watch;

use crate::core::config::PipelineConfig;
use crate::core::detection::{DetectionClient, DetectionOutcome, FrameDispatcher};
use crate::core::error::PipelineError;
use crate::core::media::{EncodedImage, ExtractionConfig, FrameExtractor, SourceOpener};
use crate::core::recording::{OutputArtifact, Reassembler, Recorder};
use crate::pipeline::report::SessionReport;
use crate::pipeline::resources::{ObjectHandle, ObjectRegistry, ObjectResource};
use crate::pipeline::session::Session;
use crate::pipeline::state_machine::{stage_percent, SessionEvent, SessionState};

/// What the UI collaborator sees: a coarse state and a monotonic percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub state: SessionState,
    pub percent: u8,
}

pub struct Orchestrator<C, R, O> {
    client: C,
    recorder: R,
    opener: O,
    config: PipelineConfig,
    session: RefCell<Session>,
    registry: RefCell<ObjectRegistry>,
    in_flight: Cell<bool>,
    progress_tx: watch::Sender<ProgressSnapshot>,
}

/// Holds the single in-flight slot for the duration of `process()`.
struct InFlightGuard<'a, C, R, O> {
    owner: &'a Orchestrator<C, R, O>,
    settled: bool,
}

impl<'a, C, R, O> InFlightGuard<'a, C, R, O> {
    fn acquire(owner: &'a Orchestrator<C, R, O>) -> Result<Self, PipelineError> {
        if owner.in_flight.replace(true) {
            return Err(PipelineError::SessionBusy);
        }
        Ok(Self {
            owner,
            settled: false,
        })
    }

    fn settle(&mut self) {
        self.settled = true;
    }
}

impl<C, R, O> Drop for InFlightGuard<'_, C, R, O> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("⚠️ processing future dropped mid-run");
            self.owner.fail(&PipelineError::Cancelled);
        }
        self.owner.in_flight.set(false);
    }
}

// Bookkeeping that needs none of the collaborator bounds, so the guard can
// reach it from `Drop`.
impl<C, R, O> Orchestrator<C, R, O> {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress_tx.subscribe()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        let session = self.session.borrow();
        ProgressSnapshot {
            state: session.state(),
            percent: session.progress_percent(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.borrow().state()
    }

    pub fn is_processing(&self) -> bool {
        self.in_flight.get()
    }

    /// User-facing message of the last fatal error, while `Errored`.
    pub fn error_message(&self) -> Option<String> {
        self.session.borrow().error_message().map(str::to_string)
    }

    pub fn source(&self) -> Option<ObjectHandle> {
        self.session.borrow().source()
    }

    pub fn frame_count(&self) -> usize {
        self.session.borrow().frames().len()
    }

    pub fn outcomes(&self) -> Vec<DetectionOutcome> {
        self.session.borrow().outcomes().to_vec()
    }

    pub fn output_handle(&self) -> Option<ObjectHandle> {
        self.session.borrow().output()
    }

    pub fn output(&self) -> Option<OutputArtifact> {
        let handle = self.session.borrow().output()?;
        self.registry.borrow().artifact(handle).cloned()
    }

    /// Number of staged inputs and outputs not yet released.
    pub fn live_handles(&self) -> usize {
        self.registry.borrow().live_count()
    }

    pub fn report(&self) -> Option<SessionReport> {
        let session = self.session.borrow();
        if session.state() != SessionState::Done {
            return None;
        }
        let registry = self.registry.borrow();
        let artifact = registry.artifact(session.output()?)?;
        Some(SessionReport::build(session.outcomes(), artifact))
    }

    /// Stage a caller-owned file as the next input.
    pub fn load_video_file(&self, path: impl Into<PathBuf>) -> Result<ObjectHandle, PipelineError> {
        self.replace_source(ObjectResource::Borrowed(path.into()))
    }

    /// Stage uploaded bytes in a temp file as the next input.
    pub fn load_video(&self, bytes: &[u8], file_name: &str) -> Result<ObjectHandle, PipelineError> {
        if self.in_flight.get() {
            return Err(PipelineError::SessionBusy);
        }
        let suffix = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let mut staged = tempfile::Builder::new()
            .prefix("mad-video-src")
            .suffix(&suffix)
            .tempfile()?;
        staged.write_all(bytes)?;
        staged.flush()?;
        info!("📥 staged {file_name} ({} bytes) at {}", bytes.len(), staged.path().display());
        self.replace_source(ObjectResource::TempFile(staged))
    }

    /// Back to `Idle`, releasing the input, the output and every frame.
    pub fn reset(&self) -> Result<(), PipelineError> {
        if self.in_flight.get() {
            return Err(PipelineError::SessionBusy);
        }
        self.session.borrow_mut().apply(SessionEvent::Reset)?;
        self.release_session();
        info!("🔄 session reset");
        self.publish();
        Ok(())
    }

    fn replace_source(&self, resource: ObjectResource) -> Result<ObjectHandle, PipelineError> {
        if self.in_flight.get() {
            return Err(PipelineError::SessionBusy);
        }
        // A new upload ends whatever session came before it.
        self.release_session();
        let handle = self.registry.borrow_mut().register(resource);
        self.session.borrow_mut().set_source(Some(handle));
        self.publish();
        Ok(handle)
    }

    fn release_session(&self) {
        let fresh = Session::new(self.config.sampling_rate_hz);
        let mut old = self.session.replace(fresh);
        let output = old.clear_run();
        let mut registry = self.registry.borrow_mut();
        for handle in output.into_iter().chain(old.source()) {
            registry.revoke(handle);
        }
    }

    fn publish(&self) {
        let snapshot = self.progress();
        self.progress_tx.send_replace(snapshot);
    }

    fn advance(&self, state: SessionState, done: usize, total: usize) {
        let moved = self
            .session
            .borrow_mut()
            .advance_progress(stage_percent(state, done, total));
        if moved {
            self.publish();
        }
    }

    fn fail(&self, err: &PipelineError) {
        error!("❌ processing failed: {err}");
        let output = match self.session.try_borrow_mut() {
            Ok(mut session) => {
                if session.state() != SessionState::Idle {
                    let _ = session.apply(SessionEvent::Failed);
                }
                session.set_error(err.user_message());
                session.clear_run()
            }
            Err(_) => return,
        };
        if let (Some(handle), Ok(mut registry)) = (output, self.registry.try_borrow_mut()) {
            registry.revoke(handle);
        }
        self.publish();
    }
}

impl<C, R, O> Orchestrator<C, R, O>
where
    C: DetectionClient,
    R: Recorder,
    O: SourceOpener,
{
    pub fn new(client: C, recorder: R, opener: O, config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let (progress_tx, _) = watch::channel(ProgressSnapshot::default());
        info!(
            "🎬 Orchestrator: created (model {}, {} Hz)",
            config.model_id, config.sampling_rate_hz
        );
        Ok(Self {
            client,
            recorder,
            opener,
            session: RefCell::new(Session::new(config.sampling_rate_hz)),
            registry: RefCell::new(ObjectRegistry::new()),
            in_flight: Cell::new(false),
            progress_tx,
            config,
        })
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run the loaded video through the whole pipeline.
    ///
    /// Returns the artifact only when every stage completed; on any fatal
    /// error the session is `Errored` and keeps no partial output.
    pub async fn process(&self) -> Result<OutputArtifact, PipelineError> {
        let mut guard = InFlightGuard::acquire(self)?;
        let source_path = match self.begin() {
            Ok(path) => path,
            Err(e) => {
                guard.settle();
                return Err(e);
            }
        };

        let result = self.run(&source_path).await;
        guard.settle();
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    fn begin(&self) -> Result<PathBuf, PipelineError> {
        let handle = self.session.borrow().source().ok_or(PipelineError::NoSource)?;
        let path = self
            .registry
            .borrow()
            .path(handle)
            .map(Path::to_path_buf)
            .ok_or(PipelineError::NoSource)?;

        let mut session = self.session.borrow_mut();
        session.apply(SessionEvent::Start)?;
        session.reset_progress();
        drop(session);
        self.publish();
        Ok(path)
    }

    async fn run(&self, source_path: &Path) -> Result<OutputArtifact, PipelineError> {
        let sampling_rate_hz = self.session.borrow().sampling_rate_hz();

        // Extraction
        let extractor = FrameExtractor::with_config(ExtractionConfig::from(&self.config));
        let source = self.opener.open(source_path);
        let (frames, extraction_stats) = extractor
            .extract_all(source, |done, planned| {
                self.advance(SessionState::Extracting, done, planned)
            })
            .await?;
        info!(
            "🎞️ extracted {} of {} planned frames ({} skipped)",
            extraction_stats.extracted, extraction_stats.planned, extraction_stats.skipped
        );

        let next = self
            .session
            .borrow_mut()
            .apply(SessionEvent::FramesExtracted(frames.len()))?;
        if next == SessionState::Errored {
            return Err(PipelineError::NoFramesExtracted);
        }
        let frames = self.session.borrow_mut().store_frames(frames, extraction_stats);
        self.advance(SessionState::Detecting, 0, frames.len());
        self.publish();

        // Detection
        let dispatcher = FrameDispatcher::new(&self.client, self.config.model_id.clone())
            .with_timeout(self.config.detect_timeout())
            .with_concurrency(self.config.dispatch_concurrency);
        let (outcomes, dispatch_stats) = dispatcher
            .dispatch(&frames, |done, total| {
                self.advance(SessionState::Detecting, done, total)
            })
            .await;
        let images: Vec<EncodedImage> = outcomes.iter().map(|o| o.annotated_image.clone()).collect();
        {
            let mut session = self.session.borrow_mut();
            session.store_outcomes(outcomes, dispatch_stats);
            session.apply(SessionEvent::OutcomesReady)?;
        }
        self.publish();

        // Reassembly
        let reassembler = Reassembler::new(&self.recorder, self.config.output_preferences.clone());
        let artifact = reassembler
            .reassemble(&images, sampling_rate_hz, |done, total| {
                self.advance(SessionState::Reassembling, done, total)
            })
            .await?;

        let handle = self
            .registry
            .borrow_mut()
            .register(ObjectResource::Artifact(artifact.clone()));
        {
            let mut session = self.session.borrow_mut();
            session.set_output(handle);
            session.apply(SessionEvent::ArtifactReady)?;
            session.advance_progress(100);
        }
        self.publish();
        info!(
            "✅ session done: {} frames, {} annotated",
            artifact.frame_count, dispatch_stats.succeeded
        );
        Ok(artifact)
    }
}

impl<C, R, O> Drop for Orchestrator<C, R, O> {
    fn drop(&mut self) {
        info!("🗑️ Orchestrator: released");
    }
}
