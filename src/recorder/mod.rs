//! Recording system module
//!
//! - `RecordingLifecycle` owns the capture device and the chunk buffer
//! - `RecordingArtifact` is the finalized, immutable recording

pub mod lifecycle;
pub mod state;

pub use lifecycle::{RecordingEvent, RecordingLifecycle};
pub use state::{RecordingArtifact, RecordingState, RecordingWindow};
