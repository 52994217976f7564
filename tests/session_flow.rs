//! End-to-end session tests driven through the public runner API.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tempfile::tempdir;
use tokio::sync::broadcast;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vkyc_assistant_lib::capture::{ChunkSink, DeviceError, DeviceInfo, Frame, MediaDevice, WindowedDisplay};
use vkyc_assistant_lib::config::NarrationConfig;
use vkyc_assistant_lib::narration::{CompletionCallback, SpeechOutcome, SpeechRequest, SpeechSynthesizer};
use vkyc_assistant_lib::persistence::{
    ArtifactPersistence, ArtifactSink, FileArtifactSink, HttpArtifactPersistence, HttpConversionSink,
};
use vkyc_assistant_lib::script::{FileScriptStore, Line, Script, Section};
use vkyc_assistant_lib::session::{
    submit_outcome, SessionNotification, SessionRunner, SessionState, SubmissionDetails, TerminationReason,
};
use vkyc_assistant_lib::utils::AppError;

/// Completes every utterance as soon as it is requested
#[derive(Clone, Default)]
struct InstantSynth {
    spoken: Arc<Mutex<Vec<String>>>,
}

impl SpeechSynthesizer for InstantSynth {
    fn speak(&mut self, request: SpeechRequest, on_complete: CompletionCallback) -> SpeechOutcome {
        self.spoken.lock().push(request.text);
        on_complete(request.ticket, Ok(()));
        Ok(())
    }

    fn cancel(&mut self) {}
}

/// Device whose chunks are pushed by the test
#[derive(Clone, Default)]
struct ManualDevice {
    sink: Arc<Mutex<Option<ChunkSink>>>,
    missing: bool,
    container: Option<&'static str>,
}

impl ManualDevice {
    fn push(&self, chunk: &[u8]) {
        if let Some(sink) = self.sink.lock().as_ref() {
            sink(chunk.to_vec());
        }
    }
}

impl MediaDevice for ManualDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: "manual".to_string(),
            name: "Manual camera".to_string(),
            container: self.container.unwrap_or("webm").to_string(),
        }
    }

    fn start(&mut self, sink: ChunkSink) -> Result<(), DeviceError> {
        if self.missing {
            return Err(DeviceError::PermissionDenied("camera blocked".to_string()));
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        *self.sink.lock() = None;
        Ok(())
    }

    fn snapshot(&self) -> Result<Frame, DeviceError> {
        Frame::new(1, 1, vec![10, 20, 30, 255])
    }
}

fn kyc_script() -> Script {
    Script::new(vec![
        Section {
            title: "Introduction".to_string(),
            auto_terminate: false,
            lines: vec![
                Line {
                    group_with_next: true,
                    ..Line::new("Hello [Customer Name].")
                },
                Line::new("Welcome to [Bank Name]."),
                Line::new("Let's begin."),
            ],
        },
        Section {
            title: "Documents".to_string(),
            auto_terminate: false,
            lines: vec![
                Line {
                    capture_mode: true,
                    action_required: Some("show-pan".to_string()),
                    ..Line::new("Please show your PAN card.")
                },
                Line::new("Thank you."),
            ],
        },
        Section {
            title: "Closing".to_string(),
            auto_terminate: false,
            lines: vec![
                Line {
                    auto_terminate: true,
                    ..Line::new("Goodbye.")
                },
                Line::new("Never spoken."),
            ],
        },
    ])
}

async fn wait_for(
    notifications: &mut broadcast::Receiver<SessionNotification>,
    matches: impl Fn(&SessionNotification) -> bool,
) -> SessionNotification {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match notifications.recv().await {
                Ok(notification) if matches(&notification) => return notification,
                Ok(_) => continue,
                Err(e) => panic!("notification stream ended: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

fn awaiting_advance(n: &SessionNotification) -> bool {
    matches!(n, SessionNotification::StateChanged(SessionState::AwaitingAdvance))
}

#[tokio::test]
async fn test_full_session_with_capture() {
    let synth = InstantSynth::default();
    let device = ManualDevice::default();
    let mut runner = SessionRunner::new(
        kyc_script(),
        Box::new(synth.clone()),
        Box::new(device.clone()),
        Box::new(WindowedDisplay::default()),
        &NarrationConfig::default(),
    );
    let mut notifications = runner.subscribe();
    let handle = runner.handle();

    runner.begin().unwrap();
    device.push(b"chunk-1;");
    let session = tokio::spawn(runner.run());

    wait_for(&mut notifications, awaiting_advance).await;
    handle.next();
    wait_for(&mut notifications, awaiting_advance).await;
    device.push(b"chunk-2;");
    handle.next();

    let requested = wait_for(&mut notifications, |n| {
        matches!(n, SessionNotification::CaptureRequested { .. })
    })
    .await;
    assert_eq!(
        requested,
        SessionNotification::CaptureRequested {
            image_type: "pan".to_string(),
            action: Some("show-pan".to_string()),
        }
    );

    // Advancing is refused until the document is confirmed.
    handle.next();
    let warning = wait_for(&mut notifications, |n| matches!(n, SessionNotification::Warning { .. })).await;
    assert!(matches!(warning, SessionNotification::Warning { ref code, .. } if code == "INVALID_STATE"));

    handle.send(vkyc_assistant_lib::session::UserAction::Capture);
    wait_for(&mut notifications, |n| matches!(n, SessionNotification::CaptureTaken { .. })).await;
    handle.send(vkyc_assistant_lib::session::UserAction::Retake);
    wait_for(&mut notifications, |n| matches!(n, SessionNotification::CaptureDiscarded { .. })).await;
    handle.send(vkyc_assistant_lib::session::UserAction::Capture);
    wait_for(&mut notifications, |n| matches!(n, SessionNotification::CaptureTaken { .. })).await;
    handle.send(vkyc_assistant_lib::session::UserAction::Confirm);

    wait_for(&mut notifications, awaiting_advance).await;
    handle.next();

    let outcome = tokio::time::timeout(Duration::from_secs(5), session)
        .await
        .expect("session did not finish")
        .unwrap();

    assert_eq!(outcome.reason, TerminationReason::AutoTerminate);
    assert_eq!(outcome.images.len(), 1);
    assert_eq!(outcome.images[0].image_type, "pan");
    assert!(outcome.images[0].image_data.starts_with("data:image/png;base64,"));

    let artifact = outcome.artifact.expect("recording artifact");
    assert_eq!(artifact.bytes(), b"chunk-1;chunk-2;");

    assert_eq!(
        synth.spoken.lock().as_slice(),
        &[
            "Hello Customer. Welcome to the bank.",
            "Let's begin.",
            "Please show your PAN card.",
            "Thank you.",
            "Goodbye.",
        ]
    );
}

#[tokio::test]
async fn test_stop_mid_session() {
    let device = ManualDevice::default();
    let mut runner = SessionRunner::new(
        kyc_script(),
        Box::new(InstantSynth::default()),
        Box::new(device.clone()),
        Box::new(WindowedDisplay::default()),
        &NarrationConfig::default(),
    );
    let mut notifications = runner.subscribe();
    let handle = runner.handle();

    runner.begin().unwrap();
    device.push(b"partial");
    let session = tokio::spawn(runner.run());

    wait_for(&mut notifications, awaiting_advance).await;
    handle.stop();
    handle.stop();

    let outcome = session.await.unwrap();
    assert_eq!(outcome.reason, TerminationReason::UserStopped);
    assert_eq!(outcome.artifact.unwrap().bytes(), b"partial");
    assert!(outcome.images.is_empty());
}

#[tokio::test]
async fn test_unavailable_device_blocks_session() {
    let device = ManualDevice {
        missing: true,
        ..ManualDevice::default()
    };
    let synth = InstantSynth::default();
    let mut runner = SessionRunner::new(
        kyc_script(),
        Box::new(synth.clone()),
        Box::new(device),
        Box::new(WindowedDisplay::default()),
        &NarrationConfig::default(),
    );

    let err = runner.begin().unwrap_err();
    assert!(matches!(err, AppError::DeviceUnavailable(_)));
    assert!(err.is_fatal());
    assert!(synth.spoken.lock().is_empty());
    assert_eq!(runner.controller().state(), SessionState::Idle);
}

#[tokio::test]
async fn test_load_rejects_missing_script() {
    let dir = tempdir().unwrap();
    let store = FileScriptStore::new(dir.path().join("script.json"));

    let result = SessionRunner::load(
        &store,
        Box::new(InstantSynth::default()),
        Box::new(ManualDevice::default()),
        Box::new(WindowedDisplay::default()),
        &NarrationConfig::default(),
    )
    .await;

    match result {
        Err(e) => assert!(matches!(e, AppError::ScriptUnavailable(_))),
        Ok(_) => panic!("expected the session to fail loading"),
    }
}

#[tokio::test]
async fn test_loaded_script_runs_to_completion_and_submits() {
    let dir = tempdir().unwrap();
    let script_path = dir.path().join("script.json");
    std::fs::write(
        &script_path,
        json!({
            "sections": [
                {
                    "title": "Consent",
                    "script_lines": [
                        { "text": "Do you consent to this recording?" }
                    ]
                }
            ]
        })
        .to_string(),
    )
    .unwrap();

    let device = ManualDevice::default();
    let mut runner = SessionRunner::load(
        &FileScriptStore::new(&script_path),
        Box::new(InstantSynth::default()),
        Box::new(device.clone()),
        Box::new(WindowedDisplay::default()),
        &NarrationConfig::default(),
    )
    .await
    .unwrap();
    let mut notifications = runner.subscribe();
    let handle = runner.handle();

    runner.begin().unwrap();
    device.push(b"video");
    let session = tokio::spawn(runner.run());
    wait_for(&mut notifications, awaiting_advance).await;
    handle.next();
    let outcome = session.await.unwrap();
    assert_eq!(outcome.reason, TerminationReason::ScriptComplete);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/convert-to-mp4"))
        .and(body_string_contains("video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "filename": "kyc_recording_converted.mp4"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/save-metadata"))
        .and(body_partial_json(json!({
            "video_filename": "kyc_recording_converted.mp4",
            "consent_given": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "file": "kyc_recording_metadata.json"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let videos = dir.path().join("videos");
    let sink = FileArtifactSink::new(&videos);
    let conversion = HttpConversionSink::new(server.uri(), Duration::from_secs(5)).unwrap();
    let persistence = HttpArtifactPersistence::new(server.uri(), Duration::from_secs(5)).unwrap();
    let details = SubmissionDetails {
        file_prefix: "kyc_recording".to_string(),
        extension: "webm".to_string(),
        consent_given: true,
        ..SubmissionDetails::default()
    };

    let report = submit_outcome(
        &outcome,
        &details,
        &[&sink as &dyn ArtifactSink, &conversion],
        Some(&persistence as &dyn ArtifactPersistence),
    )
    .await;

    assert!(report.is_complete(), "{:?}", report.errors);
    assert!(report.capture_files.is_empty());
    assert_eq!(report.metadata_file.as_deref(), Some("kyc_recording_metadata.json"));
    assert_eq!(report.video_filename, "kyc_recording_converted.mp4");
    assert_eq!(report.deliveries.len(), 2);

    let local = &report.deliveries[0];
    assert!(local.filename.starts_with("kyc_recording_"));
    assert!(local.filename.ends_with(".webm"));
    assert_eq!(std::fs::read(videos.join(&local.filename)).unwrap(), b"video");
}

#[tokio::test]
async fn test_submission_failure_keeps_local_copy() {
    let device = ManualDevice::default();
    let mut runner = SessionRunner::new(
        kyc_script(),
        Box::new(InstantSynth::default()),
        Box::new(device.clone()),
        Box::new(WindowedDisplay::default()),
        &NarrationConfig::default(),
    );
    runner.begin().unwrap();
    device.push(b"kept");
    runner.handle().stop();
    let outcome = runner.run().await;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/convert-to-mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "filename": "kyc.mp4"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/save-metadata"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "disk full" })))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let sink = FileArtifactSink::new(dir.path());
    let conversion = HttpConversionSink::new(server.uri(), Duration::from_secs(5)).unwrap();
    let persistence = HttpArtifactPersistence::new(server.uri(), Duration::from_secs(5)).unwrap();
    let details = SubmissionDetails {
        file_prefix: "kyc".to_string(),
        extension: "webm".to_string(),
        ..SubmissionDetails::default()
    };

    let report = submit_outcome(
        &outcome,
        &details,
        &[&sink as &dyn ArtifactSink, &conversion],
        Some(&persistence as &dyn ArtifactPersistence),
    )
    .await;

    assert!(!report.is_complete());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].code, "PERSISTENCE_FAILURE");
    assert!(!report.errors[0].fatal);
    assert_eq!(report.deliveries.len(), 2);
    assert_eq!(std::fs::read(dir.path().join(&report.deliveries[0].filename)).unwrap(), b"kept");
}

#[tokio::test]
async fn test_failed_conversion_never_overwrites_recording_with_metadata() {
    let device = ManualDevice::default();
    let mut runner = SessionRunner::new(
        kyc_script(),
        Box::new(InstantSynth::default()),
        Box::new(device.clone()),
        Box::new(WindowedDisplay::default()),
        &NarrationConfig::default(),
    );
    runner.begin().unwrap();
    device.push(b"original");
    runner.handle().stop();
    let outcome = runner.run().await;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/convert-to-mp4"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "ffmpeg missing" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/save-metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let sink = FileArtifactSink::new(dir.path());
    let conversion = HttpConversionSink::new(server.uri(), Duration::from_secs(5)).unwrap();
    let persistence = HttpArtifactPersistence::new(server.uri(), Duration::from_secs(5)).unwrap();
    let details = SubmissionDetails {
        file_prefix: "kyc".to_string(),
        ..SubmissionDetails::default()
    };

    let report = submit_outcome(
        &outcome,
        &details,
        &[&sink as &dyn ArtifactSink, &conversion],
        Some(&persistence as &dyn ArtifactPersistence),
    )
    .await;

    // Conversion and metadata both fail; the webm name is never sent as metadata.
    assert_eq!(report.errors.len(), 2);
    assert!(report.video_filename.ends_with(".webm"));
    assert!(report.metadata_file.is_none());
    assert_eq!(report.deliveries.len(), 1);
    assert_eq!(std::fs::read(dir.path().join(&report.video_filename)).unwrap(), b"original");
}

#[tokio::test]
async fn test_recording_named_after_device_container() {
    let device = ManualDevice {
        container: Some("raw"),
        ..ManualDevice::default()
    };
    let mut runner = SessionRunner::new(
        kyc_script(),
        Box::new(InstantSynth::default()),
        Box::new(device.clone()),
        Box::new(WindowedDisplay::default()),
        &NarrationConfig::default(),
    );
    runner.begin().unwrap();
    device.push(b"frames");
    runner.handle().stop();
    let outcome = runner.run().await;

    let dir = tempdir().unwrap();
    let sink = FileArtifactSink::new(dir.path());
    let details = SubmissionDetails {
        file_prefix: "kyc".to_string(),
        extension: "webm".to_string(),
        ..SubmissionDetails::default()
    };

    let report = submit_outcome(&outcome, &details, &[&sink as &dyn ArtifactSink], None).await;

    assert!(report.is_complete(), "{:?}", report.errors);
    assert!(report.video_filename.starts_with("kyc_"));
    assert!(report.video_filename.ends_with(".raw"));
    assert_eq!(std::fs::read(dir.path().join(&report.video_filename)).unwrap(), b"frames");
}
