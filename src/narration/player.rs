//! Narration playback
//!
//! Speech is delegated to a [`SpeechSynthesizer`]. Every request carries a
//! unique [`SpeechTicket`]; the player only accepts a completion whose ticket
//! matches the pending request, so cancelling (which clears the pending
//! ticket) turns any late completion into a no-op.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::unit::{compose_text, NarrationUnit, Placeholders};

/// Speech synthesis errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpeechError {
    #[error("speech service unavailable: {0}")]
    Unavailable(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("speech interrupted")]
    Interrupted,
}

/// Result reported by the speech service for one request
pub type SpeechOutcome = Result<(), SpeechError>;

/// Identifies one speech request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpeechTicket(Uuid);

impl SpeechTicket {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SpeechTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single utterance handed to the speech service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub ticket: SpeechTicket,
    pub text: String,
}

/// Invoked exactly once by the speech service when a request ends
pub type CompletionCallback = Box<dyn FnOnce(SpeechTicket, SpeechOutcome) + Send>;

/// Routes completions back into the session's event loop
pub type CompletionRouter = Arc<dyn Fn(SpeechTicket, SpeechOutcome) + Send + Sync>;

/// External text-to-speech capability
pub trait SpeechSynthesizer: Send {
    /// Start speaking. `on_complete` must be called once the utterance ends,
    /// unless the request fails synchronously with an error.
    fn speak(&mut self, request: SpeechRequest, on_complete: CompletionCallback) -> SpeechOutcome;

    /// Cancel whatever is currently being spoken
    fn cancel(&mut self);
}

/// How a completion was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The pending request finished normally
    Finished,
    /// The pending request failed; treated as finished
    Failed(SpeechError),
    /// The ticket is not pending (cancelled or superseded)
    Stale,
}

/// Plays narration units one at a time
pub struct NarrationPlayer {
    synthesizer: Box<dyn SpeechSynthesizer>,
    router: CompletionRouter,
    separator: String,
    placeholders: Placeholders,
    pending: Option<SpeechTicket>,
}

impl NarrationPlayer {
    pub fn new(
        synthesizer: Box<dyn SpeechSynthesizer>,
        router: CompletionRouter,
        separator: impl Into<String>,
        placeholders: Placeholders,
    ) -> Self {
        Self {
            synthesizer,
            router,
            separator: separator.into(),
            placeholders,
            pending: None,
        }
    }

    /// Speak `unit`, superseding any pending request
    pub fn speak(&mut self, unit: &NarrationUnit) -> SpeechRequest {
        if self.pending.is_some() {
            self.stop();
        }

        let request = SpeechRequest {
            ticket: SpeechTicket::new(),
            text: compose_text(unit, &self.separator, &self.placeholders),
        };
        self.pending = Some(request.ticket);

        tracing::debug!(
            "Speaking unit at {:?} ({} lines), ticket {}",
            unit.start,
            unit.len(),
            request.ticket
        );

        let router = Arc::clone(&self.router);
        let callback: CompletionCallback = Box::new(move |ticket, outcome| router(ticket, outcome));
        if let Err(e) = self.synthesizer.speak(request.clone(), callback) {
            // Report synchronous failures through the router so the session
            // observes them on its next event, like any other completion.
            tracing::warn!("Speech request {} failed to start: {}", request.ticket, e);
            (self.router)(request.ticket, Err(e));
        }

        request
    }

    /// Resolve a completion reported by the speech service
    pub fn complete(&mut self, ticket: SpeechTicket, outcome: SpeechOutcome) -> Completion {
        if self.pending != Some(ticket) {
            tracing::debug!("Ignoring stale speech completion {}", ticket);
            return Completion::Stale;
        }
        self.pending = None;

        match outcome {
            Ok(()) => Completion::Finished,
            Err(e) => {
                tracing::warn!("Narration failed, continuing: {}", e);
                Completion::Failed(e)
            }
        }
    }

    /// Cancel the pending request. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(ticket) = self.pending.take() {
            tracing::debug!("Cancelling speech request {}", ticket);
            self.synthesizer.cancel();
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<SpeechTicket> {
        self.pending
    }
}
