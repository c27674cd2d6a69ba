//! External checker adapter: runs a configured command over the document.

use std::process::Stdio;

use serde_json::Value;
use spell_core::{parse_checker_output, CheckError, RawIssue, Settings};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Placeholder in checker arguments replaced by the language code.
const LANGUAGE_PLACEHOLDER: &str = "{language}";

/// Checker run as a child process. Normalized text goes to stdin; a JSON
/// array of issues is expected on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandChecker {
    program: String,
    args: Vec<String>,
}

impl Default for CommandChecker {
    fn default() -> Self {
        Self::new("spell-check", ["--language", LANGUAGE_PLACEHOLDER])
    }
}

impl CommandChecker {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from a `checkerCommand` option: an array of program and args.
    pub fn from_option(value: &Value) -> Option<Self> {
        let parts: Vec<String> = value
            .as_array()?
            .iter()
            .filter_map(|part| part.as_str().map(str::to_string))
            .collect();
        let (program, args) = parts.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub async fn check(&self, text: &str, language: &str) -> Result<Vec<RawIssue>, CheckError> {
        if !Settings::is_supported_language(language) {
            return Err(CheckError::UnsupportedLanguage(language.to_string()));
        }
        let unavailable = |source| CheckError::Unavailable {
            program: self.program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(
                self.args
                    .iter()
                    .map(|arg| arg.replace(LANGUAGE_PLACEHOLDER, language)),
            )
            .env("SPELL_LANGUAGE", language)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(unavailable)?;

        // Feed stdin concurrently so a chatty checker cannot deadlock on a
        // full stdout pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = text.as_bytes().to_vec();
            tokio::spawn(async move { stdin.write_all(&input).await })
        });
        let output = child.wait_with_output().await.map_err(unavailable)?;
        if let Some(writer) = writer {
            if let Ok(Err(err)) = writer.await {
                debug!(program = %self.program, "checker closed stdin early: {err}");
            }
        }

        if !output.status.success() {
            return Err(CheckError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_checker_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_option_array() {
        let value = serde_json::json!(["languagetool", "--lang", "{language}"]);
        let checker = CommandChecker::from_option(&value).unwrap();
        assert_eq!(checker, CommandChecker::new("languagetool", ["--lang", "{language}"]));
        assert!(CommandChecker::from_option(&serde_json::json!([])).is_none());
        assert!(CommandChecker::from_option(&serde_json::json!("languagetool")).is_none());
    }

    #[tokio::test]
    async fn unsupported_language_skips_the_process() {
        let checker = CommandChecker::new("definitely-not-a-real-checker", Vec::<String>::new());
        let err = checker.check("text", "it").await.unwrap_err();
        assert!(err.is_unsupported());
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let checker = CommandChecker::new("definitely-not-a-real-checker", Vec::<String>::new());
        let err = checker.check("text", "en").await.unwrap_err();
        assert!(matches!(err, CheckError::Unavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reads_issues_from_stdout_with_language_argument() {
        let script = r#"cat >/dev/null; printf '[{"token":"Teh","category":"%s","suggestions":"The"}]' "$0""#;
        let checker = CommandChecker::new("sh", ["-c", script, "{language}"]);
        let issues = checker.check("Teh cat", "fr").await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, "fr");
        assert_eq!(issues[0].suggestions, vec!["The"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let checker = CommandChecker::new("sh", ["-c", "echo broken >&2; exit 3"]);
        let err = checker.check("Teh cat", "en").await.unwrap_err();
        match err {
            CheckError::Failed { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
