//! Recording lifecycle
//!
//! Starts and stops the capture device exactly once and collects the chunks
//! it produces into a single artifact.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::state::{RecordingArtifact, RecordingState, RecordingWindow};
use crate::capture::traits::{ChunkSink, DeviceError, MediaDevice};

/// Events emitted during recording
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    /// Recording started
    Started,
    /// A chunk was appended (total bytes buffered so far)
    ChunkAppended(usize),
    /// Recording stopped and the artifact was finalized (artifact size in bytes)
    Stopped(usize),
    /// Error occurred
    Error(String),
}

/// Append-only chunk buffer shared with the device's delivery thread
#[derive(Debug, Default)]
struct ChunkBuffer {
    chunks: Vec<Vec<u8>>,
    bytes: usize,
    open: bool,
}

impl ChunkBuffer {
    /// Append a chunk, returning the new byte total if it was accepted
    fn push(&mut self, chunk: Vec<u8>) -> Option<usize> {
        if !self.open {
            tracing::debug!("Dropping {}-byte chunk: recording not active", chunk.len());
            return None;
        }
        if chunk.is_empty() {
            return None;
        }
        self.bytes += chunk.len();
        self.chunks.push(chunk);
        Some(self.bytes)
    }
}

/// Owns the capture device and the recording buffer
pub struct RecordingLifecycle {
    /// Current recording state
    state: RecordingState,

    /// Underlying capture device
    device: Box<dyn MediaDevice>,

    /// Chunks in arrival order
    buffer: Arc<Mutex<ChunkBuffer>>,

    /// Wall-clock span of the recording
    window: Option<RecordingWindow>,

    /// Time when recording started (for duration calculation)
    start_time: Option<Instant>,

    /// Finalized artifact, once stopped
    artifact: Option<RecordingArtifact>,

    /// Event broadcaster
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingLifecycle {
    /// Create a new lifecycle around `device`
    pub fn new(device: Box<dyn MediaDevice>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            state: RecordingState::Idle,
            device,
            buffer: Arc::new(Mutex::new(ChunkBuffer::default())),
            window: None,
            start_time: None,
            artifact: None,
            event_tx,
        }
    }

    /// Get the current recording state
    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    pub fn device(&self) -> &dyn MediaDevice {
        self.device.as_ref()
    }

    /// Start recording. A no-op unless `Idle`.
    pub fn start(&mut self) -> Result<(), DeviceError> {
        match self.state {
            RecordingState::Idle => {}
            RecordingState::Recording => {
                tracing::debug!("Recording already started");
                return Ok(());
            }
            RecordingState::Stopped => {
                tracing::warn!("Ignoring start: recording already finalized");
                return Ok(());
            }
        }

        let info = self.device.info();
        tracing::info!("Starting recording on device '{}' ({})", info.name, info.id);

        self.buffer.lock().open = true;
        if let Err(e) = self.device.start(self.chunk_sink()) {
            self.buffer.lock().open = false;
            tracing::error!("Failed to start capture device: {}", e);
            let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
            return Err(e);
        }

        self.window = Some(RecordingWindow::new());
        self.start_time = Some(Instant::now());
        self.state = RecordingState::Recording;
        let _ = self.event_tx.send(RecordingEvent::Started);

        tracing::info!("Recording started");
        Ok(())
    }

    /// Sink handed to the device; appends independently of the session loop
    fn chunk_sink(&self) -> ChunkSink {
        let buffer = Arc::clone(&self.buffer);
        let event_tx = self.event_tx.clone();
        Arc::new(move |chunk: Vec<u8>| {
            let total = buffer.lock().push(chunk);
            if let Some(total) = total {
                let _ = event_tx.send(RecordingEvent::ChunkAppended(total));
            }
        })
    }

    /// Append a chunk. Chunks outside `Recording` are dropped.
    pub fn append_chunk(&self, chunk: Vec<u8>) -> bool {
        let total = self.buffer.lock().push(chunk);
        match total {
            Some(total) => {
                let _ = self.event_tx.send(RecordingEvent::ChunkAppended(total));
                true
            }
            None => false,
        }
    }

    /// Stop recording and finalize the artifact.
    ///
    /// Only the first call while `Recording` stops the device; later calls
    /// return the same artifact.
    pub fn stop(&mut self) -> Option<&RecordingArtifact> {
        if self.state == RecordingState::Recording {
            tracing::info!("Stopping recording");

            if let Err(e) = self.device.stop() {
                tracing::warn!("Capture device reported an error on stop: {}", e);
                let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
            }

            let chunks = {
                let mut buffer = self.buffer.lock();
                buffer.open = false;
                std::mem::take(&mut buffer.chunks)
            };

            let duration_ms = self.duration_ms();
            let mut window = self.window.take().unwrap_or_default();
            window.end(duration_ms);

            let artifact = RecordingArtifact::new(chunks, self.device.info().container, window);
            tracing::info!(
                "Recording stopped. Duration: {}ms, {} chunks, {} bytes",
                duration_ms,
                artifact.chunk_count,
                artifact.len()
            );

            let _ = self.event_tx.send(RecordingEvent::Stopped(artifact.len()));
            self.artifact = Some(artifact);
            self.start_time = None;
            self.state = RecordingState::Stopped;
        }

        self.artifact.as_ref()
    }

    /// The finalized artifact, once stopped
    pub fn artifact(&self) -> Option<&RecordingArtifact> {
        self.artifact.as_ref()
    }

    /// Get recording duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        match (&self.artifact, self.start_time) {
            (Some(artifact), _) => artifact.window.duration_ms,
            (None, Some(start)) => start.elapsed().as_secs_f64() * 1000.0,
            (None, None) => 0.0,
        }
    }

    /// Bytes buffered since recording started
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.lock().bytes
    }
}
