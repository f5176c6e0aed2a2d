//! Session orchestration: state machine, handle registry and the orchestrator.

pub mod orchestrator;
pub mod report;
pub mod resources;
pub mod session;
pub mod state_machine;

pub use orchestrator::{Orchestrator, ProgressSnapshot};
pub use report::SessionReport;
pub use resources::{ObjectHandle, ObjectRegistry, ObjectResource};
pub use session::Session;
pub use state_machine::{ProgressTracker, SessionEvent, SessionState};
