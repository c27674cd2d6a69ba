//! Scan coordination: one checker pass per document version, with stale
//! results discarded.
//!
//! A scan is split around the asynchronous checker call. [`ScanCoordinator::begin`]
//! snapshots the text and hands out a [`ScanTicket`]; the caller runs the
//! checker on [`ScanTicket::checked_text`] and passes the result to
//! [`ScanCoordinator::complete`]. Only the most recently begun scan of a
//! document may publish, and never for a version older than one already
//! seen, so a slow checker call for an old version can never overwrite
//! fresher diagnostics.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::checker::CheckError;
use crate::resolve::{synthesize, DedupCounter, ResolvedIssue};
use crate::settings::Settings;
use crate::text::normalize_for_checker;
use crate::{Diagnostic, RawIssue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Publishing,
}

/// Diagnostic set published for one document version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedScan {
    pub version: i32,
    pub issues: Vec<ResolvedIssue>,
}

impl PublishedScan {
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.issues.iter().map(|resolved| &resolved.diagnostic)
    }
}

/// Handle for one in-flight scan.
#[derive(Debug, Clone)]
pub struct ScanTicket<K> {
    key: K,
    version: i32,
    generation: u64,
    original: String,
    checked: String,
}

impl<K> ScanTicket<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Normalized text to hand to the checker.
    pub fn checked_text(&self) -> &str {
        &self.checked
    }

    pub fn original_text(&self) -> &str {
        &self.original
    }
}

#[derive(Debug)]
pub enum ScanOutcome {
    /// The diagnostic set for the document was replaced.
    Published(Arc<PublishedScan>),
    /// A newer scan was begun (or the document forgotten) meanwhile.
    Stale,
    /// The checker does not handle this document; nothing changed.
    Unsupported,
    /// The checker failed; the previous diagnostic set stays in place.
    Failed(CheckError),
}

#[derive(Debug)]
struct DocumentScans {
    latest_generation: u64,
    latest_version: i32,
    state: ScanState,
    published: Option<Arc<PublishedScan>>,
}

#[derive(Debug)]
pub struct ScanCoordinator<K> {
    next_generation: u64,
    documents: HashMap<K, DocumentScans>,
}

impl<K> Default for ScanCoordinator<K> {
    fn default() -> Self {
        Self {
            next_generation: 0,
            documents: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> ScanCoordinator<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start scanning `text` as `version` of `key`, superseding any scan of
    /// the same document still in flight.
    ///
    /// A version older than one already begun gets a ticket that completes
    /// as [`ScanOutcome::Stale`] and leaves in-flight scans untouched.
    pub fn begin(&mut self, key: K, version: i32, text: &str) -> ScanTicket<K> {
        self.next_generation += 1;
        let generation = self.next_generation;
        let doc = self
            .documents
            .entry(key.clone())
            .or_insert_with(|| DocumentScans {
                latest_generation: generation,
                latest_version: version,
                state: ScanState::Idle,
                published: None,
            });
        if version < doc.latest_version {
            debug!(version, latest = doc.latest_version, "scan begun for an outdated version");
        } else {
            doc.latest_generation = generation;
            doc.latest_version = version;
            doc.state = ScanState::Scanning;
        }

        ScanTicket {
            key,
            version,
            generation,
            original: text.to_string(),
            checked: normalize_for_checker(text),
        }
    }

    /// Finish a scan with the checker's result.
    pub fn complete(
        &mut self,
        ticket: ScanTicket<K>,
        result: Result<Vec<RawIssue>, CheckError>,
        settings: &Settings,
    ) -> ScanOutcome {
        let Some(doc) = self.documents.get_mut(&ticket.key) else {
            debug!(version = ticket.version, "scan finished for a forgotten document");
            return ScanOutcome::Stale;
        };
        if doc.latest_generation != ticket.generation || ticket.version < doc.latest_version {
            debug!(version = ticket.version, "discarding superseded scan result");
            return ScanOutcome::Stale;
        }

        let issues = match result {
            Ok(issues) => issues,
            Err(err) if err.is_unsupported() => {
                debug!(version = ticket.version, "{err}");
                doc.state = ScanState::Idle;
                return ScanOutcome::Unsupported;
            }
            Err(err) => {
                warn!(version = ticket.version, "scan failed: {err}");
                doc.state = ScanState::Idle;
                return ScanOutcome::Failed(err);
            }
        };

        doc.state = ScanState::Publishing;
        let mut counter = DedupCounter::new();
        let resolved = synthesize(
            &ticket.original,
            &ticket.checked,
            &issues,
            settings,
            &mut counter,
        );
        info!(
            version = ticket.version,
            reported = issues.len(),
            published = resolved.len(),
            "publishing diagnostics"
        );
        let published = Arc::new(PublishedScan {
            version: ticket.version,
            issues: resolved,
        });
        doc.published = Some(Arc::clone(&published));
        doc.state = ScanState::Idle;
        ScanOutcome::Published(published)
    }

    pub fn state(&self, key: &K) -> ScanState {
        self.documents
            .get(key)
            .map_or(ScanState::Idle, |doc| doc.state)
    }

    pub fn published(&self, key: &K) -> Option<Arc<PublishedScan>> {
        self.documents.get(key).and_then(|doc| doc.published.clone())
    }

    /// Drop all state for a document. Returns whether it had a published
    /// diagnostic set the host should clear.
    pub fn forget(&mut self, key: &K) -> bool {
        self.documents
            .remove(key)
            .is_some_and(|doc| doc.published.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teh() -> RawIssue {
        RawIssue::new("Teh", "Spelling").with_suggestions(["The"])
    }

    #[test]
    fn walks_idle_scanning_idle() {
        let mut scans = ScanCoordinator::new();
        assert_eq!(scans.state(&"a"), ScanState::Idle);
        let ticket = scans.begin("a", 1, "Teh cat");
        assert_eq!(scans.state(&"a"), ScanState::Scanning);
        let outcome = scans.complete(ticket, Ok(vec![teh()]), &Settings::default());
        assert!(matches!(outcome, ScanOutcome::Published(ref p) if p.issues.len() == 1));
        assert_eq!(scans.state(&"a"), ScanState::Idle);
    }

    #[test]
    fn ticket_carries_normalized_text() {
        let mut scans = ScanCoordinator::new();
        let ticket = scans.begin("a", 3, "Hi, (you).");
        assert_eq!(ticket.checked_text(), "Hi   you  ");
        assert_eq!(ticket.original_text(), "Hi, (you).");
        assert_eq!(ticket.version(), 3);
        assert_eq!(*ticket.key(), "a");
    }

    #[test]
    fn rescan_of_same_version_supersedes_older_one() {
        let mut scans = ScanCoordinator::new();
        let first = scans.begin("a", 1, "Teh cat");
        let second = scans.begin("a", 1, "Teh cat");
        let mut settings = Settings::default();
        settings.ignore_word("Teh");

        assert!(matches!(
            scans.complete(second, Ok(vec![teh()]), &settings),
            ScanOutcome::Published(ref p) if p.issues.is_empty()
        ));
        assert!(matches!(
            scans.complete(first, Ok(vec![teh()]), &Settings::default()),
            ScanOutcome::Stale
        ));
        assert!(scans.published(&"a").unwrap().issues.is_empty());
    }

    #[test]
    fn documents_do_not_supersede_each_other() {
        let mut scans = ScanCoordinator::new();
        let a = scans.begin("a", 1, "Teh");
        let b = scans.begin("b", 1, "Teh");
        let settings = Settings::default();
        assert!(matches!(scans.complete(a, Ok(vec![teh()]), &settings), ScanOutcome::Published(_)));
        assert!(matches!(scans.complete(b, Ok(vec![teh()]), &settings), ScanOutcome::Published(_)));
    }

    #[test]
    fn forgotten_document_results_are_stale() {
        let mut scans = ScanCoordinator::new();
        let ticket = scans.begin("a", 1, "Teh");
        assert!(!scans.forget(&"a"));
        assert!(matches!(
            scans.complete(ticket, Ok(vec![teh()]), &Settings::default()),
            ScanOutcome::Stale
        ));
        assert!(scans.published(&"a").is_none());
    }

    #[test]
    fn forget_reports_published_diagnostics() {
        let mut scans = ScanCoordinator::new();
        let ticket = scans.begin("a", 1, "Teh");
        scans.complete(ticket, Ok(vec![teh()]), &Settings::default());
        assert!(scans.forget(&"a"));
        assert!(!scans.forget(&"a"));
        assert!(scans.published(&"a").is_none());
    }

    #[test]
    fn outdated_version_does_not_disturb_in_flight_scan() {
        let mut scans = ScanCoordinator::new();
        let current = scans.begin("a", 4, "Teh cat");
        let outdated = scans.begin("a", 3, "Teh");
        assert_eq!(scans.state(&"a"), ScanState::Scanning);
        assert!(matches!(
            scans.complete(outdated, Ok(vec![teh()]), &Settings::default()),
            ScanOutcome::Stale
        ));
        assert!(matches!(
            scans.complete(current, Ok(vec![teh()]), &Settings::default()),
            ScanOutcome::Published(ref p) if p.version == 4
        ));
    }
}
