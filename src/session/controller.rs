//! Session controller
//!
//! Owns the script cursor and the session state, drives narration and the
//! capture sub-flow, and stops the recording exactly once.
//!
//! The controller is synchronous: every method handles one discrete event
//! and returns. Speech completions and operator input arrive through
//! [`super::runner::SessionRunner`].

use std::sync::Arc;

use tokio::sync::broadcast;

use super::progress::{ProgressTracker, SectionProgress};
use super::state::{Cursor, SessionNotification, SessionState, TerminationReason};
use crate::capture::subflow::{CaptureError, CaptureSubflow, CapturedImage};
use crate::capture::traits::DisplayMode;
use crate::narration::player::{Completion, NarrationPlayer, SpeechOutcome, SpeechTicket};
use crate::narration::unit::{collect_group, NarrationUnit};
use crate::recorder::lifecycle::RecordingLifecycle;
use crate::recorder::state::RecordingArtifact;
use crate::script::Script;
use crate::utils::error::{AppError, AppResult};

/// Everything a terminated session hands over
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub reason: TerminationReason,
    pub cursor: Cursor,
    pub artifact: Option<RecordingArtifact>,
    pub images: Vec<CapturedImage>,
}

pub struct SessionController {
    script: Arc<Script>,
    cursor: Cursor,
    state: SessionState,
    /// Unit being spoken or awaiting follow-up
    current: Option<NarrationUnit>,
    player: NarrationPlayer,
    capture: CaptureSubflow,
    recorder: RecordingLifecycle,
    display: Box<dyn DisplayMode>,
    termination: Option<TerminationReason>,
    notify_tx: broadcast::Sender<SessionNotification>,
}

impl SessionController {
    pub fn new(
        script: Arc<Script>,
        player: NarrationPlayer,
        recorder: RecordingLifecycle,
        display: Box<dyn DisplayMode>,
    ) -> Self {
        let (notify_tx, _) = broadcast::channel(256);
        Self {
            script,
            cursor: Cursor::default(),
            state: SessionState::Idle,
            current: None,
            player,
            capture: CaptureSubflow::new(),
            recorder,
            display,
            termination: None,
            notify_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.notify_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn capture(&self) -> &CaptureSubflow {
        &self.capture
    }

    pub fn recorder(&self) -> &RecordingLifecycle {
        &self.recorder
    }

    pub fn current_unit(&self) -> Option<&NarrationUnit> {
        self.current.as_ref()
    }

    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    pub fn progress(&self) -> Vec<SectionProgress> {
        ProgressTracker::snapshot(&self.script, self.cursor)
    }

    /// Start recording and speak the first unit.
    ///
    /// Fails without side effects if the capture device cannot start.
    pub fn begin(&mut self) -> AppResult<()> {
        if self.state != SessionState::Idle {
            return Err(AppError::InvalidState(format!(
                "cannot begin a session that is {:?}",
                self.state
            )));
        }

        self.recorder.start()?;

        if let Err(e) = self.display.enter_fullscreen() {
            tracing::warn!("Could not enter fullscreen: {}", e);
        }

        tracing::info!(
            "Session started: {} sections, {} lines",
            self.script.sections.len(),
            self.script.total_lines()
        );
        self.move_cursor(self.cursor.normalize(&self.script));
        self.speak_next();
        Ok(())
    }

    /// Handle a completion reported by the speech service
    pub fn on_speech_complete(&mut self, ticket: SpeechTicket, outcome: SpeechOutcome) {
        if self.state != SessionState::Narrating {
            tracing::debug!("Ignoring speech completion {} while {:?}", ticket, self.state);
            return;
        }

        match self.player.complete(ticket, outcome) {
            Completion::Stale => return,
            Completion::Failed(e) => {
                self.report(&AppError::NarrationFailure(e.to_string()));
            }
            Completion::Finished => {}
        }

        let Some(unit) = self.current.as_ref() else {
            tracing::warn!("Speech completed with no current unit");
            return;
        };

        let anchor = unit.anchor().clone();
        let section_terminates = unit.ends_section
            && self
                .script
                .section(unit.start.section)
                .is_some_and(|s| s.auto_terminate);
        let next = unit.next_cursor();

        self.move_cursor(next);

        if anchor.auto_terminate || section_terminates {
            tracing::info!("Auto-terminate reached before {:?}", next);
            self.terminate(TerminationReason::AutoTerminate);
        } else if anchor.capture_mode {
            let image_type = self.capture.begin(anchor.action_required.as_deref());
            self.set_state(SessionState::AwaitingCapture);
            self.notify(SessionNotification::CaptureRequested {
                image_type,
                action: anchor.action_required,
            });
        } else {
            self.set_state(SessionState::AwaitingAdvance);
        }
    }

    /// Continue to the next unit after an advance or a confirmed capture
    pub fn user_next(&mut self) -> AppResult<()> {
        match self.state {
            SessionState::AwaitingAdvance => {}
            SessionState::AwaitingCapture => self.capture.close(),
            SessionState::Terminated => {
                tracing::debug!("Ignoring next: session terminated");
                return Ok(());
            }
            state => {
                return Err(AppError::InvalidState(format!(
                    "cannot advance while {:?}",
                    state
                )))
            }
        }

        self.move_cursor(self.cursor.normalize(&self.script));
        self.speak_next();
        Ok(())
    }

    /// Snapshot the current device frame for the requested document
    pub fn capture_document(&mut self) -> AppResult<()> {
        self.require_capture("capture")?;

        let frame = self
            .recorder
            .device()
            .snapshot()
            .map_err(|e| CaptureError::Snapshot(e.to_string()))?;
        let image_type = self.capture.capture(&frame)?.image_type.clone();

        self.notify(SessionNotification::CaptureTaken { image_type });
        Ok(())
    }

    /// Discard the pending capture
    pub fn retake_document(&mut self) -> AppResult<()> {
        self.require_capture("retake")?;
        self.capture.retake()?;

        let image_type = self.capture.active_type().unwrap_or_default().to_string();
        self.notify(SessionNotification::CaptureDiscarded { image_type });
        Ok(())
    }

    /// Accept the pending capture and resume narration
    pub fn confirm_document(&mut self) -> AppResult<()> {
        self.require_capture("confirm")?;
        self.capture.confirm()?;

        let image_type = self.capture.active_type().unwrap_or_default().to_string();
        self.notify(SessionNotification::CaptureConfirmed { image_type });
        self.user_next()
    }

    /// Stop the session early. Idempotent.
    pub fn stop(&mut self) {
        self.terminate(TerminationReason::UserStopped);
    }

    /// Surface a non-fatal error to observers
    pub fn report(&self, error: &AppError) {
        tracing::warn!("{}", error);
        self.notify(SessionNotification::Warning {
            code: error.code().to_string(),
            message: error.to_string(),
        });
    }

    /// What the session hands over once terminated
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.termination.map(|reason| SessionOutcome {
            reason,
            cursor: self.cursor,
            artifact: self.recorder.artifact().cloned(),
            images: self.capture.images().to_vec(),
        })
    }

    fn require_capture(&self, action: &'static str) -> AppResult<()> {
        if self.state == SessionState::AwaitingCapture {
            Ok(())
        } else {
            Err(AppError::InvalidState(format!(
                "cannot {} while {:?}",
                action, self.state
            )))
        }
    }

    fn speak_next(&mut self) {
        let Some(unit) = collect_group(&self.script, self.cursor) else {
            self.terminate(TerminationReason::ScriptComplete);
            return;
        };

        let request = self.player.speak(&unit);
        self.current = Some(unit);
        self.set_state(SessionState::Narrating);
        self.notify(SessionNotification::Narrating {
            cursor: self.cursor,
            text: request.text,
        });
    }

    fn terminate(&mut self, reason: TerminationReason) {
        if self.state == SessionState::Terminated {
            return;
        }

        self.player.stop();
        self.capture.close();
        self.recorder.stop();
        if let Err(e) = self.display.exit_fullscreen() {
            tracing::warn!("Could not exit fullscreen: {}", e);
        }

        tracing::info!("Session terminated: {:?} at {:?}", reason, self.cursor);
        self.termination = Some(reason);
        self.set_state(SessionState::Terminated);
        self.notify(SessionNotification::Terminated(reason));
    }

    fn move_cursor(&mut self, next: Cursor) {
        if next < self.cursor {
            tracing::warn!("Refusing to move cursor back from {:?} to {:?}", self.cursor, next);
            return;
        }
        if next == self.cursor {
            return;
        }

        tracing::debug!("Cursor {:?} -> {:?}", self.cursor, next);
        self.cursor = next;
        self.notify(SessionNotification::Progress(self.progress()));
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!("Session state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.notify(SessionNotification::StateChanged(state));
        }
    }

    fn notify(&self, notification: SessionNotification) {
        let _ = self.notify_tx.send(notification);
    }
}
