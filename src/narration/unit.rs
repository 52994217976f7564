//! Narration units
//!
//! A unit is a maximal run of lines within one section, joined by
//! `group_with_next`, that is spoken as a single utterance. The last line of
//! the run is the anchor: its flags decide what happens after narration.

use serde::{Deserialize, Serialize};

use crate::script::{Line, Script};
use crate::session::state::Cursor;

/// One spoken utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrationUnit {
    /// Position of the first line in the unit
    pub start: Cursor,
    /// Lines in speaking order; never empty
    pub lines: Vec<Line>,
    /// Whether the unit ends at the last line of its section
    pub ends_section: bool,
}

impl NarrationUnit {
    /// The line whose flags govern post-narration branching
    pub fn anchor(&self) -> &Line {
        // Units are only built by `collect_group`, which always yields a line.
        &self.lines[self.lines.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Position just past the anchor line
    pub fn next_cursor(&self) -> Cursor {
        Cursor::new(self.start.section, self.start.line + self.lines.len())
    }
}

/// Collect the narration unit starting at `cursor`.
///
/// Lines are included while the current line has `group_with_next` set,
/// stopping after the first line without it or at the end of the section.
/// Returns `None` if `cursor` does not point at a line.
pub fn collect_group(script: &Script, cursor: Cursor) -> Option<NarrationUnit> {
    let section = script.section(cursor.section)?;
    if cursor.line >= section.len() {
        return None;
    }

    let mut lines = Vec::new();
    for line in &section.lines[cursor.line..] {
        lines.push(line.clone());
        if !line.group_with_next {
            break;
        }
    }

    let ends_section = cursor.line + lines.len() == section.len();
    Some(NarrationUnit {
        start: cursor,
        lines,
        ends_section,
    })
}

/// Ordered placeholder substitutions applied to narration text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Placeholders(Vec<(String, String)>);

impl Placeholders {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    pub fn apply(&self, text: &str) -> String {
        self.0
            .iter()
            .fold(text.to_string(), |acc, (token, value)| acc.replace(token, value))
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

impl Default for Placeholders {
    fn default() -> Self {
        let pairs = [
            ("[Customer Name]", "Customer"),
            ("[Bank Name]", "the bank"),
            ("[Organization Name]", "our organization"),
            ("[Address]", "your registered address"),
            ("[Agent Name]", "your verification officer"),
        ];
        Self(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Build the spoken text of a unit: lines joined by `separator`, placeholders substituted
pub fn compose_text(unit: &NarrationUnit, separator: &str, placeholders: &Placeholders) -> String {
    let joined = unit
        .lines
        .iter()
        .map(|line| line.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(separator);
    placeholders.apply(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Section;

    fn grouped(text: &str) -> Line {
        Line {
            group_with_next: true,
            ..Line::new(text)
        }
    }

    fn script(lines: Vec<Line>) -> Script {
        Script::new(vec![Section {
            title: "Main".into(),
            auto_terminate: false,
            lines,
        }])
    }

    #[test]
    fn test_group_spans_flagged_lines() {
        let script = script(vec![grouped("one"), Line::new("two"), Line::new("three")]);

        let unit = collect_group(&script, Cursor::new(0, 0)).unwrap();
        assert_eq!(unit.len(), 2);
        assert_eq!(unit.anchor().text, "two");
        assert_eq!(unit.next_cursor(), Cursor::new(0, 2));
        assert!(!unit.ends_section);

        let next = collect_group(&script, unit.next_cursor()).unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next.anchor().text, "three");
        assert!(next.ends_section);
    }

    #[test]
    fn test_group_never_crosses_section() {
        let script = Script::new(vec![
            Section {
                title: "A".into(),
                auto_terminate: false,
                lines: vec![grouped("a1"), grouped("a2")],
            },
            Section {
                title: "B".into(),
                auto_terminate: false,
                lines: vec![Line::new("b1")],
            },
        ]);

        let unit = collect_group(&script, Cursor::new(0, 0)).unwrap();
        assert_eq!(unit.len(), 2);
        assert!(unit.ends_section);
        assert_eq!(unit.next_cursor(), Cursor::new(0, 2));
    }

    #[test]
    fn test_group_out_of_range() {
        let script = script(vec![Line::new("only")]);
        assert!(collect_group(&script, Cursor::new(0, 1)).is_none());
        assert!(collect_group(&script, Cursor::new(1, 0)).is_none());
    }

    #[test]
    fn test_groups_cover_every_line_once() {
        let lines = vec![
            grouped("1"),
            grouped("2"),
            Line::new("3"),
            Line::new("4"),
            grouped("5"),
            Line::new("6"),
            grouped("7"),
        ];
        let script = script(lines);

        let mut cursor = Cursor::new(0, 0);
        let mut visited = Vec::new();
        while let Some(unit) = collect_group(&script, cursor) {
            visited.extend(unit.lines.iter().map(|l| l.text.clone()));
            cursor = unit.next_cursor();
        }
        assert_eq!(visited, vec!["1", "2", "3", "4", "5", "6", "7"]);
    }

    #[test]
    fn test_compose_text_substitutes_placeholders() {
        let script = script(vec![
            grouped("Hello [Customer Name],"),
            Line::new("I am calling from [Bank Name]."),
        ]);
        let unit = collect_group(&script, Cursor::new(0, 0)).unwrap();

        let text = compose_text(&unit, " ", &Placeholders::default());
        assert_eq!(text, "Hello Customer, I am calling from the bank.");
    }

    #[test]
    fn test_placeholders_apply_in_order() {
        let placeholders = Placeholders::new(vec![
            ("{a}".into(), "{b}".into()),
            ("{b}".into(), "done".into()),
        ]);
        assert_eq!(placeholders.apply("{a} {b}"), "done done");
    }
}
