//! Spell core: turns position-less checker issues into positioned diagnostics.
//!
//! An external spelling/grammar checker reports only the offending token and
//! an optional fragment of preceding context. This crate finds where each
//! report lives in the document, keeps repeated reports of the same text on
//! distinct occurrences, and packages the result as severity-tagged
//! diagnostics with suggestions. It also carries the persisted settings
//! (ignore list, severity policy, checker language) and the fix/ignore
//! workflow that maps a cursor back to a resolved issue.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

pub mod checker;
pub mod fix;
pub mod locate;
pub mod resolve;
pub mod scan;
pub mod settings;
pub mod text;

pub use checker::{parse_checker_output, CheckError};
pub use fix::{replacement_edit, resolve_at_cursor, suggest_fix, FixChoice, FixProposal, TextEdit};
pub use locate::{locate, OccurrencePattern};
pub use resolve::{synthesize, DedupCounter, IssueSignature, ResolvedIssue};
pub use scan::{PublishedScan, ScanCoordinator, ScanOutcome, ScanState, ScanTicket};
pub use settings::{
    language_choices, language_description, Settings, SettingsError, SUPPORTED_LANGUAGES,
};
pub use text::{from_line_column, normalize_for_checker, to_line_column, word_at};

/// Diagnostic severity, ordered from most to least severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl Severity {
    /// Parse a severity name as written in the settings file.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Error" => Some(Severity::Error),
            "Warning" => Some(Severity::Warning),
            "Information" => Some(Severity::Information),
            "Hint" => Some(Severity::Hint),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Information => "info",
            Severity::Hint => "hint",
        };
        f.write_str(name)
    }
}

/// One issue as reported by the external checker. Carries no position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIssue {
    #[serde(alias = "string")]
    pub token: String,
    #[serde(default, alias = "precontext")]
    pub preceding_context: Option<String>,
    #[serde(alias = "description")]
    pub category: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub suggestions: Vec<String>,
}

impl RawIssue {
    pub fn new(token: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            preceding_context: None,
            category: category.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.preceding_context = Some(context.into());
        self
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = suggestions.into_iter().map(Into::into).collect();
        self
    }

    /// Preceding context, or the empty string when the checker gave none.
    pub fn context(&self) -> &str {
        self.preceding_context.as_deref().unwrap_or("")
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(single)) => vec![single],
        Some(OneOrMany::Many(all)) => all,
    })
}

/// Zero-based line/column pair. Columns count UTF-16 code units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Single-line span of a located issue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRange {
    pub start_line: u32,
    pub start_char: u32,
    pub end_line: u32,
    pub end_char: u32,
}

impl ResolvedRange {
    pub fn start(&self) -> Position {
        Position::new(self.start_line, self.start_char)
    }

    pub fn end(&self) -> Position {
        Position::new(self.end_line, self.end_char)
    }

    /// True when `pos` lies inside the span, both ends inclusive so a cursor
    /// parked right after the word still counts.
    pub fn contains(&self, pos: Position) -> bool {
        pos.line == self.start_line
            && pos.character >= self.start_char
            && pos.character <= self.end_char
    }
}

/// Positioned diagnostic ready to publish.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub range: ResolvedRange,
    pub message: String,
    pub severity: Severity,
    pub code: String,
    pub suggestions: Vec<String>,
}
