//! Script schema definitions
//!
//! These types match the document served by the script endpoint:
//! `{ sections: [ { title, auto_terminate, script_lines: [...] } ] }`.

use serde::{Deserialize, Serialize};

// =============================================================================
// Script Types
// =============================================================================

/// A single narration line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub text: String,

    /// Spoken together with the following line of the same section
    #[serde(default)]
    pub group_with_next: bool,

    /// Pause for a document capture once this line has been spoken
    #[serde(default)]
    pub capture_mode: bool,

    /// Document the customer is asked to show (e.g. `show-document-A`)
    #[serde(default)]
    pub action_required: Option<String>,

    /// End the session once this line has been spoken
    #[serde(default)]
    pub auto_terminate: bool,
}

impl Line {
    /// Create a plain narration line
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,

    #[serde(default)]
    pub auto_terminate: bool,

    #[serde(rename = "script_lines")]
    pub lines: Vec<Line>,
}

impl Section {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// An ordered compliance script. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub sections: Vec<Section>,
}

impl Script {
    pub fn new(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    /// Total number of lines across all sections
    pub fn total_lines(&self) -> usize {
        self.sections.iter().map(Section::len).sum()
    }

    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn line(&self, section: usize, line: usize) -> Option<&Line> {
        self.sections.get(section).and_then(|s| s.lines.get(line))
    }
}
