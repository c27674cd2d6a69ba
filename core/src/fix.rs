//! Fix/ignore workflow: map a cursor back to a resolved issue and build the
//! pick-list and edits offered to the user.

use crate::resolve::ResolvedIssue;
use crate::scan::PublishedScan;
use crate::text::{from_line_column, to_line_column, word_at};
use crate::{Position, ResolvedRange};

/// Text replacement over a single-line range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: ResolvedRange,
    pub new_text: String,
}

/// One entry of the fix pick-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixChoice {
    Replace { word: String, suggestion: String },
    /// Inert placeholder shown when the checker had nothing to offer.
    NoSuggestion,
    AddToIgnore { word: String },
}

impl FixChoice {
    pub const ADD_TO_IGNORE_LABEL: &'static str = "ADD TO IGNORE LIST";

    pub fn label(&self) -> &str {
        match self {
            FixChoice::Replace { suggestion, .. } => suggestion.as_str(),
            FixChoice::NoSuggestion => "",
            FixChoice::AddToIgnore { .. } => Self::ADD_TO_IGNORE_LABEL,
        }
    }

    pub fn description(&self) -> String {
        match self {
            FixChoice::Replace { word, suggestion } => {
                format!("Replace [{word}] with [{suggestion}]")
            }
            FixChoice::NoSuggestion => "No suggestions available sorry...".to_string(),
            FixChoice::AddToIgnore { word } => format!("Add [{word}] to ignore list."),
        }
    }
}

/// Word at the cursor plus the choices offered for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixProposal {
    pub word: String,
    pub choices: Vec<FixChoice>,
}

/// Find the issue under `cursor`.
///
/// Range containment against the published scan wins; when nothing covers
/// the cursor, fall back to the first issue (in scan order) whose token
/// equals the word at the cursor.
pub fn resolve_at_cursor<'a>(
    published: &'a PublishedScan,
    text: &str,
    cursor: Position,
) -> Option<&'a ResolvedIssue> {
    if let Some(hit) = published
        .issues
        .iter()
        .find(|resolved| resolved.diagnostic.range.contains(cursor))
    {
        return Some(hit);
    }
    let offset = from_line_column(text, cursor)?;
    let (_, word) = word_at(text, offset)?;
    published
        .issues
        .iter()
        .find(|resolved| resolved.issue.token == word)
}

/// Build the pick-list for the cursor. `None` when there is neither an issue
/// nor a word under the cursor.
pub fn suggest_fix(
    published: Option<&PublishedScan>,
    text: &str,
    cursor: Position,
) -> Option<FixProposal> {
    let issue = published.and_then(|scan| resolve_at_cursor(scan, text, cursor));
    let word = match issue {
        Some(resolved) => resolved.issue.token.clone(),
        None => {
            let offset = from_line_column(text, cursor)?;
            word_at(text, offset)?.1.to_string()
        }
    };

    let mut choices: Vec<FixChoice> = issue
        .map(|resolved| resolved.issue.suggestions.as_slice())
        .unwrap_or_default()
        .iter()
        .map(|suggestion| FixChoice::Replace {
            word: word.clone(),
            suggestion: suggestion.clone(),
        })
        .collect();
    if choices.is_empty() {
        choices.push(FixChoice::NoSuggestion);
    }
    choices.push(FixChoice::AddToIgnore { word: word.clone() });

    Some(FixProposal { word, choices })
}

/// Edit replacing the occurrence of `word` under `cursor` in the current
/// text. The range is looked up again rather than reused from the scan;
/// `None` when the text at the cursor no longer reads `word`.
pub fn replacement_edit(
    text: &str,
    cursor: Position,
    word: &str,
    replacement: &str,
) -> Option<TextEdit> {
    if word.is_empty() {
        return None;
    }
    let offset = from_line_column(text, cursor)?;
    let (start, _) = text
        .match_indices(word)
        .take_while(|(start, _)| *start <= offset)
        .find(|(start, _)| offset <= start + word.len())?;

    let from = to_line_column(text, start);
    let to = to_line_column(text, start + word.len());
    if from.line != to.line {
        return None;
    }
    Some(TextEdit {
        range: ResolvedRange {
            start_line: from.line,
            start_char: from.character,
            end_line: to.line,
            end_char: to.character,
        },
        new_text: replacement.to_string(),
    })
}
