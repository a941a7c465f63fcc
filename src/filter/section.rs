//! Section markers in the moris log.
//!
//! moris draws its call tree with box characters, one marker line per entered
//! section:
//!
//! ```text
//! |__Model - Initialize - Mesh
//! |  |__NonLinearSolver - Newton - Solve
//! |  |  |__LinearSolver - Amesos - Solve
//! ```

use regex::Regex;
use std::sync::LazyLock;

const NESTING: &str = "|  ";

static SECTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^((?:\|  )*)\|__(.*)\s-\s(.*)\s-\s(.*)").unwrap());

/// One marker line: how deep it is nested and its three labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionEvent {
    pub depth: usize,
    pub category: String,
    pub subcategory: String,
    pub detail: String,
}

impl std::fmt::Display for SectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} - {} - {}",
            self.depth, self.category, self.subcategory, self.detail
        )
    }
}

/// Recognizes marker lines and keeps every event seen, in order.
#[derive(Debug, Default)]
pub struct SectionTracker {
    history: Vec<SectionEvent>,
}

impl SectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `line`; marker lines are appended to the history and returned.
    pub fn observe(&mut self, line: &str) -> Option<SectionEvent> {
        let event = parse_section(line)?;
        self.history.push(event.clone());
        Some(event)
    }

    pub fn history(&self) -> &[SectionEvent] {
        &self.history
    }

    pub fn latest(&self) -> Option<&SectionEvent> {
        self.history.last()
    }
}

/// Parse a single marker line without tracking it.
pub fn parse_section(line: &str) -> Option<SectionEvent> {
    let caps = SECTION_REGEX.captures(line)?;
    let prefix = caps.get(1).map_or("", |m| m.as_str());
    Some(SectionEvent {
        // The marker's own `|` counts as a level.
        depth: prefix.len() / NESTING.len() + 1,
        category: caps[2].to_string(),
        subcategory: caps[3].to_string(),
        detail: caps[4].to_string(),
    })
}
