//! Artifact persistence
//!
//! Best-effort, single-attempt submission of captured images, session
//! metadata and the recording. Failures are reported to the caller and never
//! retried; the session keeps its artifact and images for manual re-submission.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;

use super::types::{CaptureResponse, CaptureSubmission, ConversionResponse, MetadataResponse, SessionMetadata};
use crate::capture::subflow::CapturedImage;
use crate::recorder::state::RecordingArtifact;

/// Extension the metadata endpoint keys its files on
pub const CONVERTED_EXTENSION: &str = ".mp4";

/// Persistence errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote storage for captured images and session metadata
#[async_trait]
pub trait ArtifactPersistence: Send + Sync {
    async fn submit_captures(&self, images: &[CapturedImage]) -> Result<CaptureResponse, PersistenceError>;

    async fn submit_metadata(&self, metadata: &SessionMetadata) -> Result<MetadataResponse, PersistenceError>;
}

/// Where a delivered recording ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Name the recording is stored under; a sink may rename it
    pub filename: String,
    /// Path or URL of the stored recording
    pub location: String,
}

/// Destination for the finalized recording
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Hand off `artifact` under `filename`
    async fn deliver(&self, artifact: &RecordingArtifact, filename: &str) -> Result<Delivery, PersistenceError>;
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, PersistenceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PersistenceError::Http(e.to_string()))
}

/// Map a non-success status to its `error` message, otherwise decode the body
async fn decode_response<R: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<R, PersistenceError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| PersistenceError::Http(e.to_string()))?;

    if !status.is_success() {
        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(text);
        tracing::error!("{} returned {}: {}", url, status, message);
        return Err(PersistenceError::Status {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&text).map_err(|e| PersistenceError::InvalidResponse(e.to_string()))
}

/// Client for the capture and metadata endpoints
#[derive(Debug, Clone)]
pub struct HttpArtifactPersistence {
    base_url: String,
    client: reqwest::Client,
}

impl HttpArtifactPersistence {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PersistenceError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }

    async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R, PersistenceError>
    where
        B: serde::Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        tracing::debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            tracing::error!("Request to {} failed: {}", url, e);
            PersistenceError::Http(e.to_string())
        })?;

        decode_response(&url, response).await
    }
}

#[async_trait]
impl ArtifactPersistence for HttpArtifactPersistence {
    #[instrument(skip(self, images), fields(count = images.len()))]
    async fn submit_captures(&self, images: &[CapturedImage]) -> Result<CaptureResponse, PersistenceError> {
        let submission = CaptureSubmission {
            images: images
                .iter()
                .filter(|image| !image.image_data.is_empty())
                .cloned()
                .collect(),
            timestamp: Utc::now().timestamp_millis(),
        };

        let response: CaptureResponse = self.post("/api/save-captures", &submission).await?;
        if !response.success {
            return Err(PersistenceError::Rejected(
                response.error.unwrap_or_else(|| "captures not saved".to_string()),
            ));
        }

        tracing::info!("Saved {} captured images", response.files.len());
        Ok(response)
    }

    /// The server derives the metadata file name by swapping `.mp4` for
    /// `.json`, so only converted recordings can be described.
    #[instrument(skip(self, metadata), fields(video = %metadata.video_filename))]
    async fn submit_metadata(&self, metadata: &SessionMetadata) -> Result<MetadataResponse, PersistenceError> {
        if !metadata.video_filename.ends_with(CONVERTED_EXTENSION) {
            tracing::warn!(
                "Not submitting metadata for unconverted recording {}",
                metadata.video_filename
            );
            return Err(PersistenceError::InvalidRequest(format!(
                "metadata must reference a converted {} recording, got {}",
                CONVERTED_EXTENSION, metadata.video_filename
            )));
        }

        let response: MetadataResponse = self.post("/api/save-metadata", metadata).await?;
        if !response.success {
            return Err(PersistenceError::Rejected(
                response.error.unwrap_or_else(|| "metadata not saved".to_string()),
            ));
        }

        tracing::info!("Saved session metadata as {:?}", response.file);
        Ok(response)
    }
}

/// Uploads the recording to the conversion endpoint, which stores it as mp4
#[derive(Debug, Clone)]
pub struct HttpConversionSink {
    base_url: String,
    client: reqwest::Client,
}

impl HttpConversionSink {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PersistenceError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl ArtifactSink for HttpConversionSink {
    #[instrument(skip(self, artifact), fields(bytes = artifact.len()))]
    async fn deliver(&self, artifact: &RecordingArtifact, filename: &str) -> Result<Delivery, PersistenceError> {
        if artifact.container != "webm" || !filename.ends_with(".webm") {
            return Err(PersistenceError::InvalidRequest(format!(
                "only webm recordings can be converted, got {} ({})",
                filename, artifact.container
            )));
        }

        let url = format!("{}/api/convert-to-mp4", self.base_url);
        let part = reqwest::multipart::Part::bytes(artifact.bytes().to_vec())
            .file_name(filename.to_string())
            .mime_str("video/webm")
            .map_err(|e| PersistenceError::Http(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("video", part);

        tracing::debug!("Uploading {} bytes to {}", artifact.len(), url);
        let response = self.client.post(&url).multipart(form).send().await.map_err(|e| {
            tracing::error!("Upload to {} failed: {}", url, e);
            PersistenceError::Http(e.to_string())
        })?;

        let response: ConversionResponse = decode_response(&url, response).await?;
        if !response.success {
            return Err(PersistenceError::Rejected(
                response.error.unwrap_or_else(|| "conversion failed".to_string()),
            ));
        }
        let converted = response
            .filename
            .ok_or_else(|| PersistenceError::InvalidResponse("missing filename".to_string()))?;

        tracing::info!("Recording converted to {}", converted);
        Ok(Delivery {
            location: format!("{}/{}", self.base_url, converted),
            filename: converted,
        })
    }
}

/// Writes the recording into a local directory
#[derive(Debug, Clone)]
pub struct FileArtifactSink {
    dir: PathBuf,
}

impl FileArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for FileArtifactSink {
    async fn deliver(&self, artifact: &RecordingArtifact, filename: &str) -> Result<Delivery, PersistenceError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(filename);
        tokio::fs::write(&path, artifact.bytes()).await?;

        tracing::info!("Wrote {} bytes to {:?}", artifact.len(), path);
        Ok(Delivery {
            filename: filename.to_string(),
            location: path.to_string_lossy().to_string(),
        })
    }
}
