//! Dedup counting and diagnostic synthesis for one scan pass.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::locate::OccurrencePattern;
use crate::settings::Settings;
use crate::text::{normalize_for_checker, to_line_column};
use crate::{Diagnostic, RawIssue, ResolvedRange};

/// Dedup key for an issue: its preceding context and flagged token.
///
/// Kept as a pair rather than the concatenated string so that
/// `("ab", "c")` and `("a", "bc")` stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueSignature {
    context: String,
    token: String,
}

impl IssueSignature {
    pub fn new(context: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            token: token.into(),
        }
    }

    /// Signature of a raw issue, normalized the same way as checked text.
    pub fn of(issue: &RawIssue) -> Self {
        Self::new(
            normalize_for_checker(issue.context().trim()),
            normalize_for_checker(&issue.token),
        )
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Display for IssueSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.context, self.token)
    }
}

/// Per-scan occurrence counter. Create one per scan and drop it afterwards.
#[derive(Debug, Default)]
pub struct DedupCounter {
    counts: HashMap<IssueSignature, usize>,
}

impl DedupCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1 on first sight of `signature`, then 2, 3, ... within this pass.
    pub fn next_occurrence_index(&mut self, signature: &IssueSignature) -> usize {
        let count = self.counts.entry(signature.clone()).or_default();
        *count += 1;
        *count
    }
}

/// A located issue: the checker report, its byte offset in the document and
/// the diagnostic built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIssue {
    pub issue: RawIssue,
    pub offset: usize,
    pub diagnostic: Diagnostic,
}

/// Resolve checker issues into diagnostics, in the order the checker
/// returned them.
///
/// `checked` is the normalized text that was sent to the checker and is
/// used for locating; `original` is the document text that positions are
/// reported against. Ignored tokens are skipped before any lookup. Issues
/// that cannot be located, or whose span would cross a line break, are
/// dropped.
pub fn synthesize(
    original: &str,
    checked: &str,
    issues: &[RawIssue],
    settings: &Settings,
    counter: &mut DedupCounter,
) -> Vec<ResolvedIssue> {
    let mut patterns: HashMap<IssueSignature, Option<OccurrencePattern>> = HashMap::new();
    let mut claimed: HashSet<usize> = HashSet::new();
    let mut resolved = Vec::new();

    for issue in issues {
        if settings.is_ignored(&issue.token) {
            continue;
        }
        let signature = IssueSignature::of(issue);
        let occurrence = counter.next_occurrence_index(&signature);

        let pattern = patterns.entry(signature.clone()).or_insert_with(|| {
            OccurrencePattern::new(signature.token(), signature.context())
                .map_err(|err| debug!(%signature, "occurrence pattern rejected: {err}"))
                .ok()
        });
        let Some(pattern) = pattern.as_ref() else {
            continue;
        };
        // An occurrence already taken by an issue with another signature
        // (e.g. the same token without context) moves on to the next one.
        let mut nth = occurrence;
        let offset = loop {
            match pattern.nth(checked, nth) {
                Some(offset) if claimed.contains(&offset) => nth += 1,
                found => break found,
            }
        };
        let Some(offset) = offset else {
            debug!(%signature, occurrence, "issue not found in document; dropped");
            continue;
        };

        let start = to_line_column(original, offset);
        let end = to_line_column(original, offset + signature.token().len());
        if start.line != end.line {
            debug!(%signature, occurrence, "issue spans a line break; dropped");
            continue;
        }

        let diagnostic = Diagnostic {
            range: ResolvedRange {
                start_line: start.line,
                start_char: start.character,
                end_line: end.line,
                end_char: end.character,
            },
            message: format!(
                "{} [{}] - suggest [{}]",
                issue.category,
                issue.token,
                issue.suggestions.join(", ")
            ),
            severity: settings.severity_for(&issue.category),
            code: issue.category.clone(),
            suggestions: issue.suggestions.clone(),
        };
        claimed.insert(offset);
        resolved.push(ResolvedIssue {
            issue: issue.clone(),
            offset,
            diagnostic,
        });
    }

    resolved
}
