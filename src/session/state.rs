//! Session state management
//!
//! Defines the session state machine, the script cursor and the
//! notifications emitted to observers.

use serde::{Deserialize, Serialize};

use super::progress::SectionProgress;
use crate::script::Script;

/// Current state of a narrated session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    /// Session created, recording not started
    Idle,
    /// A narration unit is being spoken
    Narrating,
    /// Waiting for the operator to continue
    AwaitingAdvance,
    /// Waiting for a document capture to be confirmed
    AwaitingCapture,
    /// Session finished; irreversible
    Terminated,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Why a session terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    /// Every line of the script was narrated
    ScriptComplete,
    /// An auto-terminate line or section was reached
    AutoTerminate,
    /// The operator stopped the session early
    UserStopped,
}

/// Position of the next line to speak.
///
/// Field order matters: the derived ordering is lexicographic on
/// `(section, line)`, which is the order in which a session visits lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub section: usize,
    pub line: usize,
}

impl Cursor {
    pub fn new(section: usize, line: usize) -> Self {
        Self { section, line }
    }

    /// Roll an exhausted section over to the start of the next non-empty one.
    ///
    /// Returns the cursor unchanged if it already points at a line. When no
    /// lines remain the result points one past the last section.
    pub fn normalize(self, script: &Script) -> Self {
        let mut cursor = self;
        while let Some(section) = script.section(cursor.section) {
            if cursor.line < section.len() {
                break;
            }
            cursor = Cursor::new(cursor.section + 1, 0);
        }
        cursor
    }

    /// Whether no lines remain at or after this position
    pub fn is_exhausted(&self, script: &Script) -> bool {
        self.normalize(script).section >= script.sections.len()
    }
}

/// Notifications emitted by a session to its observers
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    /// The session moved to a new state
    StateChanged(SessionState),
    /// Progress after a cursor change
    Progress(Vec<SectionProgress>),
    /// A narration unit started speaking
    Narrating { cursor: Cursor, text: String },
    /// The customer must show a document
    CaptureRequested { image_type: String, action: Option<String> },
    /// A document image was captured and awaits confirmation
    CaptureTaken { image_type: String },
    /// The pending capture was discarded
    CaptureDiscarded { image_type: String },
    /// The capture was confirmed
    CaptureConfirmed { image_type: String },
    /// A non-fatal failure was absorbed; the session continues
    Warning { code: String, message: String },
    /// The session terminated
    Terminated(TerminationReason),
}
