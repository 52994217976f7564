//! Capture trait definitions
//!
//! Platform-agnostic capability traits. Each target platform provides one
//! implementation; the session never branches on platform quirks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capture device errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("no frame available: {0}")]
    NoFrame(String),

    #[error("device failure: {0}")]
    Failure(String),
}

/// A still video frame in RGBA8 layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA pixels, `width * height * 4` bytes
    pub rgba: Vec<u8>,
}

impl Frame {
    /// Create a frame, checking the buffer size
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, DeviceError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(DeviceError::NoFrame(format!(
                "frame size mismatch: got {} bytes, expected {} ({}x{}x4)",
                rgba.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self { width, height, rgba })
    }
}

/// Information about a capture device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Container format of the recorded chunks (e.g. `webm`)
    pub container: String,
}

/// Receives encoded media chunks as the device produces them
pub type ChunkSink = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// Audio/video capture device
pub trait MediaDevice: Send {
    fn info(&self) -> DeviceInfo;

    /// Begin capturing; chunks are delivered to `sink` until `stop`
    fn start(&mut self, sink: ChunkSink) -> Result<(), DeviceError>;

    /// Stop capturing. No chunks are delivered after this returns.
    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Snapshot the current video frame
    fn snapshot(&self) -> Result<Frame, DeviceError>;
}

/// Display-mode capability (fullscreen while a session is live)
pub trait DisplayMode: Send {
    fn enter_fullscreen(&mut self) -> Result<(), DeviceError>;

    fn exit_fullscreen(&mut self) -> Result<(), DeviceError>;
}

/// Display mode for targets without a fullscreen concept
#[derive(Debug, Default)]
pub struct WindowedDisplay {
    fullscreen: bool,
}

impl WindowedDisplay {
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }
}

impl DisplayMode for WindowedDisplay {
    fn enter_fullscreen(&mut self) -> Result<(), DeviceError> {
        self.fullscreen = true;
        Ok(())
    }

    fn exit_fullscreen(&mut self) -> Result<(), DeviceError> {
        self.fullscreen = false;
        Ok(())
    }
}
