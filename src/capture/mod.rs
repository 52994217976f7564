//! Capture capabilities and the document capture sub-flow
//!
//! The device and display traits are implemented once per target; the
//! console implementations used by the binary live in [`crate::console`].

pub mod subflow;
pub mod traits;

pub use subflow::{CaptureError, CaptureState, CaptureSubflow, CapturedImage};
pub use traits::{ChunkSink, DeviceError, DeviceInfo, DisplayMode, Frame, MediaDevice, WindowedDisplay};
