//! Console capabilities for the command-line assistant
//!
//! The terminal stands in for the browser surface: narration is printed and
//! paced by word count, the capture device is a synthetic test pattern, and
//! operator input is read line by line from stdin.

use std::io::BufRead;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::capture::traits::{ChunkSink, DeviceError, DeviceInfo, Frame, MediaDevice};
use crate::narration::player::{CompletionCallback, SpeechError, SpeechOutcome, SpeechRequest, SpeechSynthesizer};
use crate::session::runner::{SessionHandle, UserAction};
use crate::session::state::{SessionNotification, SessionState, TerminationReason};

/// Shortest time an utterance is shown before it completes
const MIN_UTTERANCE: Duration = Duration::from_millis(800);

const PATTERN_WIDTH: u32 = 64;
const PATTERN_HEIGHT: u32 = 48;

// ============================================================================
// Narration
// ============================================================================

/// Prints each utterance and completes it after an estimated speaking time
pub struct ConsoleSynthesizer {
    words_per_minute: u32,
    current: Option<tokio::task::JoinHandle<()>>,
}

impl ConsoleSynthesizer {
    pub fn new(words_per_minute: u32) -> Self {
        Self {
            words_per_minute: words_per_minute.max(1),
            current: None,
        }
    }

    /// Estimated time to speak `text`
    pub fn speaking_time(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count().max(1) as u64;
        let ms = words * 60_000 / u64::from(self.words_per_minute);
        Duration::from_millis(ms).max(MIN_UTTERANCE)
    }
}

impl SpeechSynthesizer for ConsoleSynthesizer {
    fn speak(&mut self, request: SpeechRequest, on_complete: CompletionCallback) -> SpeechOutcome {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SpeechError::Unavailable(e.to_string()))?;

        println!("\n  >> {}\n", request.text);

        let delay = self.speaking_time(&request.text);
        let ticket = request.ticket;
        self.current = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_complete(ticket, Ok(()));
        }));
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.current.take() {
            task.abort();
        }
    }
}

impl Drop for ConsoleSynthesizer {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// Capture device
// ============================================================================

/// Synthetic camera that emits a numbered chunk every `interval`
pub struct TestPatternDevice {
    interval: Duration,
    frames: Arc<AtomicU64>,
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl TestPatternDevice {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            frames: Arc::new(AtomicU64::new(0)),
            stop_tx: None,
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

fn pattern_chunk(sequence: u64) -> Vec<u8> {
    let mut chunk = Vec::with_capacity(256);
    chunk.extend_from_slice(b"VKYC");
    chunk.extend_from_slice(&sequence.to_be_bytes());
    chunk.extend((0..244u64).map(|i| i.wrapping_add(sequence) as u8));
    chunk
}

impl MediaDevice for TestPatternDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: "test-pattern".to_string(),
            name: "Test pattern camera".to_string(),
            container: "raw".to_string(),
        }
    }

    fn start(&mut self, sink: ChunkSink) -> Result<(), DeviceError> {
        if self.worker.is_some() {
            return Err(DeviceError::Failure("already capturing".to_string()));
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let interval = self.interval;
        let frames = Arc::clone(&self.frames);

        let worker = std::thread::Builder::new()
            .name("test-pattern".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        let sequence = frames.fetch_add(1, Ordering::SeqCst);
                        sink(pattern_chunk(sequence));
                    }
                    _ => break,
                }
            })
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

        self.stop_tx = Some(stop_tx);
        self.worker = Some(worker);
        tracing::debug!("Test pattern started, one chunk every {:?}", interval);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        // Dropping the sender wakes the worker.
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| DeviceError::Failure("capture thread panicked".to_string()))?;
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<Frame, DeviceError> {
        if self.worker.is_none() {
            return Err(DeviceError::NoFrame("camera is not running".to_string()));
        }

        let shift = self.frames.load(Ordering::SeqCst) as u32;
        let mut rgba = Vec::with_capacity((PATTERN_WIDTH * PATTERN_HEIGHT * 4) as usize);
        for y in 0..PATTERN_HEIGHT {
            for x in 0..PATTERN_WIDTH {
                rgba.extend_from_slice(&[
                    (x * 4).wrapping_add(shift) as u8,
                    (y * 5) as u8,
                    ((x + y) * 2) as u8,
                    255,
                ]);
            }
        }
        Frame::new(PATTERN_WIDTH, PATTERN_HEIGHT, rgba)
    }
}

impl Drop for TestPatternDevice {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

// ============================================================================
// Operator input and feedback
// ============================================================================

/// Map a console line to an operator action
pub fn parse_command(input: &str) -> Option<UserAction> {
    match input.trim().to_ascii_lowercase().as_str() {
        "" | "n" | "next" => Some(UserAction::Next),
        "c" | "capture" => Some(UserAction::Capture),
        "r" | "retake" => Some(UserAction::Retake),
        "y" | "confirm" => Some(UserAction::Confirm),
        "q" | "quit" | "stop" => Some(UserAction::Stop),
        _ => None,
    }
}

/// Read operator commands from stdin until the session goes away
pub fn spawn_command_reader(handle: SessionHandle) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("operator-input".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                match parse_command(&line) {
                    Some(action) => {
                        if !handle.send(action) {
                            break;
                        }
                    }
                    None => println!("  Unknown command '{}'. Use n, c, r, y or q.", line.trim()),
                }
            }
        })
}

/// Print session notifications until the session is dropped
pub async fn print_notifications(mut notifications: broadcast::Receiver<SessionNotification>) {
    loop {
        match notifications.recv().await {
            Ok(notification) => {
                if let Some(text) = describe(&notification) {
                    println!("{}", text);
                }
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!("Console fell behind, skipped {} notifications", missed);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn describe(notification: &SessionNotification) -> Option<String> {
    match notification {
        SessionNotification::StateChanged(SessionState::AwaitingAdvance) => {
            Some("  [Enter] continue   [q] stop".to_string())
        }
        SessionNotification::StateChanged(_) | SessionNotification::Narrating { .. } => None,
        SessionNotification::Progress(sections) => {
            let summary = sections
                .iter()
                .map(|s| format!("{} {}/{}", s.title, s.lines_done, s.total_lines))
                .collect::<Vec<_>>()
                .join(" | ");
            Some(format!("  [{}]", summary))
        }
        SessionNotification::CaptureRequested { image_type, .. } => Some(format!(
            "  Show the {} to the camera, then [c] capture",
            image_type
        )),
        SessionNotification::CaptureTaken { image_type } => Some(format!(
            "  Captured {}. [y] confirm   [r] retake",
            image_type
        )),
        SessionNotification::CaptureDiscarded { image_type } => {
            Some(format!("  Discarded {}. [c] capture again", image_type))
        }
        SessionNotification::CaptureConfirmed { image_type } => Some(format!("  {} confirmed", image_type)),
        SessionNotification::Warning { code, message } => Some(format!("  ! {}: {}", code, message)),
        SessionNotification::Terminated(reason) => Some(match reason {
            TerminationReason::ScriptComplete => "  Script complete, recording stopped.".to_string(),
            TerminationReason::AutoTerminate => "  Session ended by the script, recording stopped.".to_string(),
            TerminationReason::UserStopped => "  Session stopped, recording stopped.".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narration::player::SpeechTicket;
    use parking_lot::Mutex;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command(""), Some(UserAction::Next));
        assert_eq!(parse_command(" N "), Some(UserAction::Next));
        assert_eq!(parse_command("c"), Some(UserAction::Capture));
        assert_eq!(parse_command("retake"), Some(UserAction::Retake));
        assert_eq!(parse_command("y"), Some(UserAction::Confirm));
        assert_eq!(parse_command("q"), Some(UserAction::Stop));
        assert_eq!(parse_command("what"), None);
    }

    #[test]
    fn test_speaking_time_scales_with_words() {
        let synth = ConsoleSynthesizer::new(120);
        assert_eq!(synth.speaking_time("one"), MIN_UTTERANCE);
        let long = vec!["word"; 10].join(" ");
        assert_eq!(synth.speaking_time(&long), Duration::from_secs(5));
    }

    #[test]
    fn test_speak_requires_runtime() {
        let mut synth = ConsoleSynthesizer::new(160);
        let request = SpeechRequest {
            ticket: test_ticket(),
            text: "Hello".to_string(),
        };
        let result = synth.speak(request, Box::new(|_: SpeechTicket, _: SpeechOutcome| {}));
        assert!(matches!(result, Err(SpeechError::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_speak_completes_and_cancel_suppresses() {
        let completed = Arc::new(Mutex::new(Vec::new()));
        let mut synth = ConsoleSynthesizer::new(600);

        let sink = Arc::clone(&completed);
        let first = test_ticket();
        synth
            .speak(
                SpeechRequest {
                    ticket: first,
                    text: "Hello there".to_string(),
                },
                Box::new(move |ticket: SpeechTicket, outcome: SpeechOutcome| sink.lock().push((ticket, outcome))),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(completed.lock().as_slice(), &[(first, Ok(()))]);

        let sink = Arc::clone(&completed);
        synth
            .speak(
                SpeechRequest {
                    ticket: test_ticket(),
                    text: "Cancelled".to_string(),
                },
                Box::new(move |ticket: SpeechTicket, outcome: SpeechOutcome| sink.lock().push((ticket, outcome))),
            )
            .unwrap();
        synth.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(completed.lock().len(), 1);
    }

    #[test]
    fn test_pattern_device_streams_until_stopped() {
        let received = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
        let sink_store = Arc::clone(&received);
        let sink: ChunkSink = Arc::new(move |chunk: Vec<u8>| sink_store.lock().push(chunk));

        let mut device = TestPatternDevice::new(Duration::from_millis(5));
        assert!(device.snapshot().is_err());

        device.start(sink.clone()).unwrap();
        assert!(device.start(sink).is_err());
        std::thread::sleep(Duration::from_millis(60));

        let frame = device.snapshot().unwrap();
        assert_eq!((frame.width, frame.height), (PATTERN_WIDTH, PATTERN_HEIGHT));

        device.stop().unwrap();
        let count = received.lock().len();
        assert!(count > 0);
        assert!(received.lock().iter().all(|c| c.starts_with(b"VKYC")));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(received.lock().len(), count);
        assert!(!device.is_running());
    }

    fn test_ticket() -> SpeechTicket {
        serde_json::from_value(serde_json::json!(uuid::Uuid::new_v4())).unwrap()
    }
}
