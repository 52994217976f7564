//! Section progress derived from the script cursor

use serde::{Deserialize, Serialize};

use super::state::Cursor;
use crate::script::Script;

/// Display progress for one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionProgress {
    pub title: String,
    pub lines_done: usize,
    pub total_lines: usize,
    /// Completion in `[0, 1]`
    pub fraction: f64,
}

/// Stateless progress computation over `(Script, Cursor)`
pub struct ProgressTracker;

impl ProgressTracker {
    /// Fraction of `section` completed at `cursor`.
    ///
    /// Sections before the cursor are complete, sections after it untouched,
    /// and the current section is `line / total`.
    pub fn fraction_complete(script: &Script, section: usize, cursor: Cursor) -> f64 {
        let Some(current) = script.section(section) else {
            return 0.0;
        };

        if section < cursor.section {
            1.0
        } else if section == cursor.section {
            if current.is_empty() {
                return 0.0;
            }
            (cursor.line.min(current.len()) as f64 / current.len() as f64).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Progress for every section of the script
    pub fn snapshot(script: &Script, cursor: Cursor) -> Vec<SectionProgress> {
        script
            .sections
            .iter()
            .enumerate()
            .map(|(index, section)| {
                let fraction = Self::fraction_complete(script, index, cursor);
                let lines_done = if index < cursor.section {
                    section.len()
                } else if index == cursor.section {
                    cursor.line.min(section.len())
                } else {
                    0
                };
                SectionProgress {
                    title: section.title.clone(),
                    lines_done,
                    total_lines: section.len(),
                    fraction,
                }
            })
            .collect()
    }

    /// Fraction of all script lines completed at `cursor`
    pub fn overall(script: &Script, cursor: Cursor) -> f64 {
        let total = script.total_lines();
        if total == 0 {
            return 0.0;
        }
        let done: usize = Self::snapshot(script, cursor)
            .iter()
            .map(|p| p.lines_done)
            .sum();
        done as f64 / total as f64
    }
}
