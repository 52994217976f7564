//! Session orchestration
//!
//! - `SessionController` is the synchronous state machine
//! - `SessionRunner` owns it on one task and feeds it events
//! - `ProgressTracker` derives per-section completion from the cursor

pub mod controller;
pub mod progress;
pub mod runner;
pub mod state;

pub use controller::{SessionController, SessionOutcome};
pub use progress::{ProgressTracker, SectionProgress};
pub use runner::{
    submit_outcome, SessionEvent, SessionHandle, SessionRunner, SubmissionDetails, SubmissionReport, UserAction,
};
pub use state::{Cursor, SessionNotification, SessionState, TerminationReason};
