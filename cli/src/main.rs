use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use console::style;
use serde::Serialize;
use spell_core::{
    language_choices, language_description, parse_checker_output, Diagnostic, ScanCoordinator,
    ScanOutcome, Settings, Severity,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Spell CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "spell",
    about = "Resolve spelling and grammar checker output into positioned diagnostics."
)]
struct Args {
    /// Settings file (JSON). Defaults to .vscode/spell.json.
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Place checker issues on a document and print the diagnostics.
    Resolve {
        /// Document the checker ran on.
        #[arg(value_name = "TEXT")]
        text: PathBuf,

        /// Checker output: a JSON array of issues.
        #[arg(long, value_name = "JSON")]
        issues: PathBuf,

        /// Emit JSON output for automation.
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Add a word to the ignore list.
    Ignore {
        #[arg(value_name = "WORD")]
        word: String,
    },
    /// Show the checker language, or switch to CODE.
    Language {
        #[arg(value_name = "CODE")]
        code: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct FileResult<'a> {
    path: String,
    diagnostics: Vec<&'a Diagnostic>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let settings_path = match args.settings {
        Some(path) => path,
        None => Settings::default_path(
            &std::env::current_dir().context("Failed to resolve current directory")?,
        ),
    };

    match args.command {
        Command::Resolve { text, issues, json } => {
            run_resolve(&settings_path, &text, &issues, json)
        }
        Command::Ignore { word } => run_ignore(&settings_path, &word),
        Command::Language { code } => run_language(&settings_path, code.as_deref()),
    }
}

fn run_resolve(
    settings_path: &Path,
    text_path: &Path,
    issues_path: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let settings = Settings::load(settings_path);
    let text = fs::read_to_string(text_path)
        .with_context(|| format!("Failed to read {}", text_path.display()))?;
    let raw = fs::read_to_string(issues_path)
        .with_context(|| format!("Failed to read {}", issues_path.display()))?;
    let issues = parse_checker_output(&raw)
        .with_context(|| format!("Failed to parse issues from {}", issues_path.display()))?;
    debug!(path = %issues_path.display(), issues = issues.len(), "parsed checker output");

    let diagnostics = resolve_document(&text, issues, &settings)?;
    let path = text_path.to_string_lossy().into_owned();

    if json {
        let output = FileResult {
            path,
            diagnostics: diagnostics.iter().collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if diagnostics.is_empty() {
        println!("{} {}", style(&path).bold(), style("clean").green());
        return Ok(());
    }
    for diag in &diagnostics {
        println!("{}", render_line(&path, diag));
        if !diag.suggestions.is_empty() {
            println!("      suggestion: {}", diag.suggestions.join(", "));
        }
    }
    Ok(())
}

fn resolve_document(
    text: &str,
    issues: Vec<spell_core::RawIssue>,
    settings: &Settings,
) -> anyhow::Result<Vec<Diagnostic>> {
    let mut scans = ScanCoordinator::new();
    let ticket = scans.begin((), 0, text);
    match scans.complete(ticket, Ok(issues), settings) {
        ScanOutcome::Published(published) => Ok(published.diagnostics().cloned().collect()),
        ScanOutcome::Failed(err) => Err(err.into()),
        ScanOutcome::Stale | ScanOutcome::Unsupported => Ok(Vec::new()),
    }
}

/// `path:line:col severity message`, with 1-based line and column.
fn render_line(path: &str, diag: &Diagnostic) -> String {
    let severity = match diag.severity {
        Severity::Error => style(diag.severity).red(),
        Severity::Warning => style(diag.severity).yellow(),
        Severity::Information | Severity::Hint => style(diag.severity).cyan(),
    };
    format!(
        "{}:{}:{} {} {}",
        path,
        diag.range.start_line + 1,
        diag.range.start_char + 1,
        severity,
        diag.message
    )
}

fn run_ignore(settings_path: &Path, word: &str) -> anyhow::Result<()> {
    let word = word.trim();
    if word.is_empty() {
        bail!("Refusing to ignore an empty word");
    }
    let mut settings = Settings::load(settings_path);
    if !settings.ignore_word(word) {
        println!("[{word}] is already ignored");
        return Ok(());
    }
    settings.save(settings_path)?;
    println!(
        "Added [{}] to ignore list in {}",
        style(word).bold(),
        settings_path.display()
    );
    Ok(())
}

fn run_language(settings_path: &Path, code: Option<&str>) -> anyhow::Result<()> {
    let mut settings = Settings::load(settings_path);
    let Some(code) = code else {
        println!(
            "Current checker language: {} ({})",
            style(language_description(&settings.language)).bold(),
            settings.language
        );
        for (code, description) in language_choices(&settings.language) {
            println!("  {code}  {description}");
        }
        return Ok(());
    };

    if !Settings::is_supported_language(code) {
        let known: Vec<&str> = spell_core::SUPPORTED_LANGUAGES
            .iter()
            .map(|(code, _)| *code)
            .collect();
        bail!(
            "Unsupported checker language `{code}` (expected one of {})",
            known.join(", ")
        );
    }
    if settings.language == code {
        println!("Checker language is already {}", language_description(code));
        return Ok(());
    }
    settings.language = code.to_string();
    settings.save(settings_path)?;
    println!("Checker language set to {}", style(language_description(code)).bold());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spell_core::RawIssue;

    #[test]
    fn resolve_places_each_repeat() {
        let issues = vec![
            RawIssue::new("Teh", "Spelling").with_suggestions(["The"]),
            RawIssue::new("Teh", "Spelling").with_suggestions(["The"]),
        ];
        let diagnostics =
            resolve_document("Teh quick fox. Teh lazy dog.", issues, &Settings::default()).unwrap();
        let starts: Vec<u32> = diagnostics.iter().map(|d| d.range.start_char).collect();
        assert_eq!(starts, vec![0, 15]);
        assert_eq!(diagnostics[0].severity, Severity::Error);
    }

    #[test]
    fn rendered_positions_are_one_based() {
        console::set_colors_enabled(false);
        let issues = vec![RawIssue::new("txet", "Passive Voice")];
        let diagnostics = resolve_document("ok\n  txet", issues, &Settings::default()).unwrap();
        assert_eq!(
            render_line("doc.md", &diagnostics[0]),
            "doc.md:2:3 warning Passive Voice [txet] - suggest []"
        );
    }

    #[test]
    fn ignore_and_language_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".vscode").join("spell.json");

        run_ignore(&path, "Teh").unwrap();
        run_ignore(&path, "Teh").unwrap();
        run_language(&path, Some("fr")).unwrap();
        assert!(run_language(&path, Some("it")).is_err());

        let settings = Settings::load(&path);
        assert_eq!(settings.ignore_words_list, vec!["Teh"]);
        assert_eq!(settings.language, "fr");
    }
}
