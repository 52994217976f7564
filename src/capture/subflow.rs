//! Document capture sub-flow
//!
//! `Idle -> Capturing -> Captured -> (retake -> Capturing | confirm -> Confirmed)`.
//! At most one unconfirmed image exists at a time. A retake only ever removes
//! the most recent image of the active type, and leaving the interaction
//! before confirming discards the pending image, so `images()` holds
//! confirmed captures only.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::traits::Frame;

/// Image type used when a capture line names no document
pub const DEFAULT_IMAGE_TYPE: &str = "document";

/// Capture sub-flow errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: &'static str },

    #[error("image encoding failed: {0}")]
    Encode(String),

    #[error("frame snapshot failed: {0}")]
    Snapshot(String),
}

/// A captured document image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedImage {
    #[serde(rename = "type")]
    pub image_type: String,

    /// Milliseconds since the Unix epoch
    pub timestamp: i64,

    /// `data:image/png;base64,...` URL
    #[serde(rename = "data")]
    pub image_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing { image_type: String },
    Captured { image_type: String },
    Confirmed { image_type: String },
}

impl CaptureState {
    fn name(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Capturing { .. } => "capturing",
            CaptureState::Captured { .. } => "captured",
            CaptureState::Confirmed { .. } => "confirmed",
        }
    }
}

/// Derive the image type from a line's `action_required` tag.
///
/// `show-document-A` becomes `document-A`, `show_pan` becomes `pan`.
pub fn image_type_for(action: Option<&str>) -> String {
    let Some(action) = action.map(str::trim).filter(|a| !a.is_empty()) else {
        return DEFAULT_IMAGE_TYPE.to_string();
    };

    let stripped = action
        .strip_prefix("show-")
        .or_else(|| action.strip_prefix("show_"))
        .unwrap_or(action);

    if stripped.is_empty() {
        DEFAULT_IMAGE_TYPE.to_string()
    } else {
        stripped.to_string()
    }
}

/// Encode an RGBA frame as a PNG data URL
pub fn encode_frame(frame: &Frame) -> Result<String, CaptureError> {
    let mut png_bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_bytes, frame.width, frame.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder
            .write_header()
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
        writer
            .write_image_data(&frame.rgba)
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
    }

    Ok(format!("data:image/png;base64,{}", STANDARD.encode(&png_bytes)))
}

/// Owns the session's captured images and the capture interaction state
#[derive(Debug)]
pub struct CaptureSubflow {
    state: CaptureState,
    images: Vec<CapturedImage>,
}

impl CaptureSubflow {
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            images: Vec::new(),
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    /// Image type of the active capture, if any
    pub fn active_type(&self) -> Option<&str> {
        match &self.state {
            CaptureState::Idle => None,
            CaptureState::Capturing { image_type }
            | CaptureState::Captured { image_type }
            | CaptureState::Confirmed { image_type } => Some(image_type),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, CaptureState::Confirmed { .. })
    }

    /// Start capturing for the document named by `action`.
    ///
    /// Images captured for earlier documents are left untouched.
    pub fn begin(&mut self, action: Option<&str>) -> String {
        self.discard_pending();

        let image_type = image_type_for(action);
        tracing::info!("Capture requested for '{}'", image_type);
        self.state = CaptureState::Capturing {
            image_type: image_type.clone(),
        };
        image_type
    }

    /// Snapshot `frame` into a new pending image
    pub fn capture(&mut self, frame: &Frame) -> Result<&CapturedImage, CaptureError> {
        let CaptureState::Capturing { image_type } = &self.state else {
            return Err(CaptureError::InvalidTransition {
                action: "capture",
                state: self.state.name(),
            });
        };
        let image_type = image_type.clone();

        let image = CapturedImage {
            image_type: image_type.clone(),
            timestamp: Utc::now().timestamp_millis(),
            image_data: encode_frame(frame)?,
        };
        tracing::debug!("Captured '{}' ({}x{})", image_type, frame.width, frame.height);

        self.images.push(image);
        self.state = CaptureState::Captured { image_type };
        Ok(&self.images[self.images.len() - 1])
    }

    /// Discard the pending image and capture again
    pub fn retake(&mut self) -> Result<(), CaptureError> {
        let CaptureState::Captured { image_type } = &self.state else {
            return Err(CaptureError::InvalidTransition {
                action: "retake",
                state: self.state.name(),
            });
        };
        let image_type = image_type.clone();

        self.remove_latest(&image_type);
        tracing::debug!("Retaking '{}'", image_type);

        self.state = CaptureState::Capturing { image_type };
        Ok(())
    }

    /// Accept the pending image
    pub fn confirm(&mut self) -> Result<(), CaptureError> {
        let CaptureState::Captured { image_type } = &self.state else {
            return Err(CaptureError::InvalidTransition {
                action: "confirm",
                state: self.state.name(),
            });
        };
        tracing::info!("Capture '{}' confirmed", image_type);

        self.state = CaptureState::Confirmed {
            image_type: image_type.clone(),
        };
        Ok(())
    }

    /// Leave the capture interaction.
    ///
    /// Confirmed images are kept; an unconfirmed one is dropped.
    pub fn close(&mut self) {
        self.discard_pending();
        self.state = CaptureState::Idle;
    }

    fn discard_pending(&mut self) {
        if let CaptureState::Captured { image_type } = &self.state {
            let image_type = image_type.clone();
            tracing::warn!("Discarding unconfirmed capture '{}'", image_type);
            self.remove_latest(&image_type);
        }
    }

    fn remove_latest(&mut self, image_type: &str) {
        if let Some(index) = self.images.iter().rposition(|i| i.image_type == image_type) {
            self.images.remove(index);
        }
    }

    pub fn images(&self) -> &[CapturedImage] {
        &self.images
    }
}

impl Default for CaptureSubflow {
    fn default() -> Self {
        Self::new()
    }
}
