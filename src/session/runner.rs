//! Session event loop
//!
//! A single task owns the [`SessionController`] and feeds it events from one
//! unbounded channel: speech completions and operator input. Device chunks
//! bypass the loop and land directly in the recording buffer.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use super::controller::{SessionController, SessionOutcome};
use super::state::{SessionNotification, SessionState, TerminationReason};
use crate::capture::traits::{DisplayMode, MediaDevice};
use crate::config::{AppConfig, NarrationConfig};
use crate::narration::player::{CompletionRouter, NarrationPlayer, SpeechOutcome, SpeechSynthesizer, SpeechTicket};
use crate::persistence::client::{ArtifactPersistence, ArtifactSink, Delivery};
use crate::persistence::types::{video_filename, CustomerDetails, SessionMetadata};
use crate::recorder::lifecycle::RecordingLifecycle;
use crate::script::{Script, ScriptStore};
use crate::utils::error::{AppError, AppResult, ErrorResponse};

/// Operator input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Next,
    Capture,
    Retake,
    Confirm,
    Stop,
}

/// Everything the session reacts to
#[derive(Debug)]
pub enum SessionEvent {
    SpeechFinished {
        ticket: SpeechTicket,
        outcome: SpeechOutcome,
    },
    User(UserAction),
}

/// Cloneable handle for sending operator input to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    /// Send `action`; returns false once the session loop has gone away
    pub fn send(&self, action: UserAction) -> bool {
        self.tx.send(SessionEvent::User(action)).is_ok()
    }

    pub fn next(&self) -> bool {
        self.send(UserAction::Next)
    }

    pub fn stop(&self) -> bool {
        self.send(UserAction::Stop)
    }
}

pub struct SessionRunner {
    controller: SessionController,
    tx: mpsc::UnboundedSender<SessionEvent>,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionRunner {
    pub fn new(
        script: Script,
        synthesizer: Box<dyn SpeechSynthesizer>,
        device: Box<dyn MediaDevice>,
        display: Box<dyn DisplayMode>,
        narration: &NarrationConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let speech_tx = tx.clone();
        let router: CompletionRouter = Arc::new(move |ticket, outcome| {
            let _ = speech_tx.send(SessionEvent::SpeechFinished { ticket, outcome });
        });

        let player = NarrationPlayer::new(
            synthesizer,
            router,
            narration.separator.clone(),
            narration.placeholders.clone(),
        );
        let controller = SessionController::new(
            Arc::new(script),
            player,
            RecordingLifecycle::new(device),
            display,
        );

        Self { controller, tx, rx }
    }

    /// Load the script, then build the session.
    ///
    /// A script failure is fatal and happens before any device is touched.
    pub async fn load(
        store: &dyn ScriptStore,
        synthesizer: Box<dyn SpeechSynthesizer>,
        device: Box<dyn MediaDevice>,
        display: Box<dyn DisplayMode>,
        narration: &NarrationConfig,
    ) -> AppResult<Self> {
        let script = store.load().await.map_err(|e| {
            tracing::error!("Cannot start session: {}", e);
            AppError::from(e)
        })?;
        Ok(Self::new(script, synthesizer, device, display, narration))
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle { tx: self.tx.clone() }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.controller.subscribe()
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Start recording and narration
    pub fn begin(&mut self) -> AppResult<()> {
        self.controller.begin()
    }

    /// Apply one event to the controller. Non-fatal errors become warnings.
    pub fn dispatch(&mut self, event: SessionEvent) {
        let result = match event {
            SessionEvent::SpeechFinished { ticket, outcome } => {
                self.controller.on_speech_complete(ticket, outcome);
                Ok(())
            }
            SessionEvent::User(action) => self.apply(action),
        };

        if let Err(e) = result {
            self.controller.report(&e);
        }
    }

    fn apply(&mut self, action: UserAction) -> AppResult<()> {
        tracing::debug!("Operator action {:?} while {:?}", action, self.controller.state());
        match action {
            UserAction::Next if self.controller.state() == SessionState::AwaitingCapture => {
                Err(AppError::InvalidState(
                    "confirm the document capture before continuing".to_string(),
                ))
            }
            UserAction::Next => self.controller.user_next(),
            UserAction::Capture => self.controller.capture_document(),
            UserAction::Retake => self.controller.retake_document(),
            UserAction::Confirm => self.controller.confirm_document(),
            UserAction::Stop => {
                self.controller.stop();
                Ok(())
            }
        }
    }

    /// Process events until the session terminates.
    ///
    /// User-awaited states have no timeout; the loop waits for the operator.
    pub async fn run(mut self) -> SessionOutcome {
        while self.controller.state() != SessionState::Terminated {
            match self.rx.recv().await {
                Some(event) => self.dispatch(event),
                None => self.controller.stop(),
            }
        }

        self.controller.outcome().unwrap_or_else(|| SessionOutcome {
            reason: TerminationReason::UserStopped,
            cursor: self.controller.cursor(),
            artifact: None,
            images: Vec::new(),
        })
    }
}

/// Operator-supplied details attached to the session metadata
#[derive(Debug, Clone, Default)]
pub struct SubmissionDetails {
    pub file_prefix: String,
    /// Used when there is no recording to take the container from
    pub extension: String,
    pub customer: CustomerDetails,
    pub consent_given: bool,
    pub notes: String,
}

impl From<&AppConfig> for SubmissionDetails {
    fn from(config: &AppConfig) -> Self {
        Self {
            file_prefix: config.recording.file_prefix.clone(),
            extension: config.recording.extension.clone(),
            customer: config.customer.clone(),
            consent_given: config.session.consent_given,
            notes: config.session.notes.clone(),
        }
    }
}

/// Result of handing a finished session to its sinks
#[derive(Debug, Clone, Default)]
pub struct SubmissionReport {
    /// Name the metadata refers to: the last name a sink stored the recording under
    pub video_filename: String,
    pub deliveries: Vec<Delivery>,
    pub capture_files: Vec<String>,
    pub metadata_file: Option<String>,
    /// Non-fatal failures; the outcome stays available for re-submission
    pub errors: Vec<ErrorResponse>,
}

impl SubmissionReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Deliver the recording to each sink in order, then submit captures and metadata.
///
/// The recording is named after its start time and container. A sink may
/// rename it (the conversion endpoint stores mp4); the metadata references
/// the name from the last successful delivery. Each step is attempted once; a
/// failure is recorded and the next step still runs.
pub async fn submit_outcome(
    outcome: &SessionOutcome,
    details: &SubmissionDetails,
    sinks: &[&dyn ArtifactSink],
    persistence: Option<&dyn ArtifactPersistence>,
) -> SubmissionReport {
    let artifact = outcome.artifact.as_ref();
    let started_at = artifact
        .map(|a| a.window.started_at)
        .unwrap_or_else(chrono::Utc::now);
    let extension = artifact
        .map(|a| a.container.as_str())
        .unwrap_or(details.extension.as_str());
    let recorded_name = video_filename(&details.file_prefix, extension, started_at);

    let mut report = SubmissionReport {
        video_filename: recorded_name.clone(),
        ..SubmissionReport::default()
    };

    if let Some(artifact) = artifact {
        for sink in sinks {
            match sink.deliver(artifact, &recorded_name).await {
                Ok(delivery) => {
                    report.video_filename = delivery.filename.clone();
                    report.deliveries.push(delivery);
                }
                Err(e) => record_failure(&mut report, e.into()),
            }
        }
    }

    let Some(persistence) = persistence else {
        return report;
    };

    if !outcome.images.is_empty() {
        match persistence.submit_captures(&outcome.images).await {
            Ok(response) => report.capture_files = response.files,
            Err(e) => record_failure(&mut report, e.into()),
        }
    }

    let metadata = SessionMetadata::new(
        report.video_filename.clone(),
        artifact,
        &outcome.images,
        details.customer.clone(),
        details.consent_given,
        details.notes.clone(),
    );
    match persistence.submit_metadata(&metadata).await {
        Ok(response) => report.metadata_file = response.file,
        Err(e) => record_failure(&mut report, e.into()),
    }

    report
}

fn record_failure(report: &mut SubmissionReport, error: AppError) {
    tracing::warn!("Submission step failed, keeping local copy: {}", error);
    report.errors.push(ErrorResponse::from(error));
}
