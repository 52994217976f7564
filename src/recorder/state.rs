//! Recording state management
//!
//! Defines the recording state machine and the finalized artifact.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current state of the recording lifecycle. Transitions are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// Device not started
    Idle,
    /// Currently recording
    Recording,
    /// Recording finalized; cannot be restarted
    Stopped,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Wall-clock span covered by a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingWindow {
    /// When recording started
    pub started_at: DateTime<Utc>,

    /// When recording stopped (equal to `started_at` until ended)
    pub ended_at: DateTime<Utc>,

    /// Duration in milliseconds, measured on a monotonic clock
    pub duration_ms: f64,
}

impl RecordingWindow {
    /// Create a window starting now
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            ended_at: now,
            duration_ms: 0.0,
        }
    }

    /// End the window
    pub fn end(&mut self, duration_ms: f64) {
        self.ended_at = Utc::now();
        self.duration_ms = duration_ms;
    }
}

impl Default for RecordingWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// The finalized recording: all chunks concatenated in arrival order
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingArtifact {
    data: Arc<Vec<u8>>,

    /// Number of chunks that made up the recording
    pub chunk_count: usize,

    /// Container format reported by the device (e.g. `webm`)
    pub container: String,

    pub window: RecordingWindow,
}

impl RecordingArtifact {
    pub(crate) fn new(
        chunks: Vec<Vec<u8>>,
        container: String,
        window: RecordingWindow,
    ) -> Self {
        let chunk_count = chunks.len();
        Self {
            data: Arc::new(chunks.concat()),
            chunk_count,
            container,
            window,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.window.duration_ms / 1000.0
    }
}
