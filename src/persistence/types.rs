//! Persistence payloads
//!
//! These types match the capture and metadata submission endpoints.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::subflow::CapturedImage;
use crate::recorder::state::RecordingArtifact;

// =============================================================================
// Capture Submission
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSubmission {
    pub images: Vec<CapturedImage>,

    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub files: Vec<String>,

    #[serde(default)]
    pub error: Option<String>,
}

// =============================================================================
// Session Metadata
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub pan_number: String,

    #[serde(default)]
    pub aadhaar_last_4: String,
}

/// Captured image reference without its pixel data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedImageSummary {
    #[serde(rename = "type")]
    pub image_type: String,
    pub timestamp: i64,
}

impl From<&CapturedImage> for CapturedImageSummary {
    fn from(image: &CapturedImage) -> Self {
        Self {
            image_type: image.image_type.clone(),
            timestamp: image.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub video_filename: String,
    pub recording_date: DateTime<Utc>,
    pub duration_seconds: f64,
    pub customer_details: CustomerDetails,
    /// Document type -> shown during the session
    pub documents_shown: BTreeMap<String, bool>,
    pub captured_images: Vec<CapturedImageSummary>,
    pub consent_given: bool,
    pub notes: String,
}

impl SessionMetadata {
    /// Describe a finished session.
    ///
    /// `images` holds confirmed captures; each of their types counts as a
    /// shown document.
    pub fn new(
        video_filename: String,
        artifact: Option<&RecordingArtifact>,
        images: &[CapturedImage],
        customer_details: CustomerDetails,
        consent_given: bool,
        notes: String,
    ) -> Self {
        let documents_shown = images
            .iter()
            .map(|image| (image.image_type.clone(), true))
            .collect();

        Self {
            video_filename,
            recording_date: artifact
                .map(|a| a.window.started_at)
                .unwrap_or_else(Utc::now),
            duration_seconds: artifact.map(RecordingArtifact::duration_seconds).unwrap_or(0.0),
            customer_details,
            documents_shown,
            captured_images: images.iter().map(CapturedImageSummary::from).collect(),
            consent_given,
            notes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default)]
    pub error: Option<String>,
}

// =============================================================================
// Recording Conversion
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResponse {
    #[serde(default)]
    pub success: bool,

    /// Name of the converted recording
    #[serde(default)]
    pub filename: Option<String>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub error: Option<String>,
}

/// File name for a recording started at `at`: `{prefix}_{YYYYmmdd_HHMMSS}.{extension}`
pub fn video_filename(prefix: &str, extension: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}.{}",
        prefix,
        at.format("%Y%m%d_%H%M%S"),
        extension.trim_start_matches('.')
    )
}
