use spell_core::{
    locate, CheckError, DedupCounter, IssueSignature, Position, RawIssue, ResolvedRange,
    ScanCoordinator, ScanOutcome, Settings,
};

const FOXES: &str = "Teh quick fox. Teh lazy dog.";

fn teh() -> RawIssue {
    RawIssue::new("Teh", "Spelling").with_suggestions(["The"])
}

fn range(line: u32, start: u32, end: u32) -> ResolvedRange {
    ResolvedRange {
        start_line: line,
        start_char: start,
        end_line: line,
        end_char: end,
    }
}

fn scan_once(text: &str, issues: Vec<RawIssue>, settings: &Settings) -> Vec<ResolvedRange> {
    let mut scans = ScanCoordinator::new();
    let ticket = scans.begin("doc", 1, text);
    match scans.complete(ticket, Ok(issues), settings) {
        ScanOutcome::Published(published) => published.diagnostics().map(|d| d.range).collect(),
        other => panic!("expected a published scan, got {other:?}"),
    }
}

#[test]
fn repeated_issue_lands_on_each_occurrence() {
    let ranges = scan_once(FOXES, vec![teh(), teh()], &Settings::default());
    assert_eq!(ranges, vec![range(0, 0, 3), range(0, 15, 18)]);
}

#[test]
fn ignored_word_produces_no_diagnostics() {
    let mut settings = Settings::default();
    settings.ignore_word("Teh");
    settings.ignore_word("Teh");
    assert_eq!(settings.ignore_words_list, vec!["Teh"]);
    assert!(scan_once(FOXES, vec![teh(), teh()], &settings).is_empty());
}

#[test]
fn unknown_token_is_dropped_quietly() {
    let issues = vec![teh(), RawIssue::new("Zebra", "Spelling"), teh()];
    let ranges = scan_once(FOXES, issues, &Settings::default());
    assert_eq!(ranges.len(), 2);
}

#[test]
fn extra_reports_beyond_real_occurrences_are_dropped() {
    let ranges = scan_once(FOXES, vec![teh(), teh(), teh()], &Settings::default());
    assert_eq!(ranges, vec![range(0, 0, 3), range(0, 15, 18)]);
}

#[test]
fn stale_result_does_not_replace_newer_one() {
    let mut scans = ScanCoordinator::new();
    let settings = Settings::default();
    let v1 = scans.begin("doc", 1, FOXES);
    let v2 = scans.begin("doc", 2, "All good here.");

    let outcome = scans.complete(v2, Ok(Vec::new()), &settings);
    assert!(matches!(outcome, ScanOutcome::Published(ref p) if p.version == 2));

    let late = scans.complete(v1, Ok(vec![teh(), teh()]), &settings);
    assert!(matches!(late, ScanOutcome::Stale));

    let published = scans.published(&"doc").expect("published scan");
    assert_eq!(published.version, 2);
    assert!(published.issues.is_empty());
}

#[test]
fn older_version_begun_late_never_publishes() {
    let mut scans = ScanCoordinator::new();
    let settings = Settings::default();
    let v2 = scans.begin("doc", 2, "All good here.");
    let v1 = scans.begin("doc", 1, FOXES);

    let outcome = scans.complete(v2, Ok(Vec::new()), &settings);
    assert!(matches!(outcome, ScanOutcome::Published(ref p) if p.version == 2));
    let late = scans.complete(v1, Ok(vec![teh(), teh()]), &settings);
    assert!(matches!(late, ScanOutcome::Stale));

    assert_eq!(scans.published(&"doc").map(|p| p.version), Some(2));
}

#[test]
fn checker_failure_keeps_previous_diagnostics() {
    let mut scans = ScanCoordinator::new();
    let settings = Settings::default();
    let first = scans.begin("doc", 1, FOXES);
    scans.complete(first, Ok(vec![teh()]), &settings);

    let second = scans.begin("doc", 2, FOXES);
    let failure = CheckError::Failed {
        status: "exit status: 1".into(),
        stderr: "boom".into(),
    };
    assert!(matches!(
        scans.complete(second, Err(failure), &settings),
        ScanOutcome::Failed(_)
    ));
    assert_eq!(scans.published(&"doc").unwrap().version, 1);

    let third = scans.begin("doc", 3, FOXES);
    assert!(matches!(
        scans.complete(third, Err(CheckError::UnsupportedLanguage("it".into())), &settings),
        ScanOutcome::Unsupported
    ));
    assert_eq!(scans.published(&"doc").unwrap().issues.len(), 1);
}

#[test]
fn counter_driven_lookups_are_strictly_increasing() {
    let text = "ok ok\nok, ok ok";
    let signature = IssueSignature::new("", "ok");
    let mut counter = DedupCounter::new();
    let offsets: Vec<usize> = (0..5)
        .map(|_| {
            let n = counter.next_occurrence_index(&signature);
            locate(text, "ok", "", n).expect("occurrence")
        })
        .collect();
    assert_eq!(offsets, vec![0, 3, 6, 10, 13]);
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn fresh_counter_per_scan() {
    let mut scans = ScanCoordinator::new();
    let settings = Settings::default();
    for version in 1..=3 {
        let ticket = scans.begin("doc", version, FOXES);
        let ScanOutcome::Published(published) = scans.complete(ticket, Ok(vec![teh()]), &settings)
        else {
            panic!("scan {version} did not publish");
        };
        assert_eq!(published.issues[0].diagnostic.range, range(0, 0, 3));
    }
}

#[test]
fn multi_line_documents_report_line_and_column() {
    let text = "# Title\n\nSome txet here.\nMore txet.";
    let issue = RawIssue::new("txet", "Spelling").with_suggestions(["text"]);
    let ranges = scan_once(text, vec![issue.clone(), issue], &Settings::default());
    assert_eq!(ranges, vec![range(2, 5, 9), range(3, 5, 9)]);
    assert_eq!(ranges[0].start(), Position::new(2, 5));
}
