//! Failure taxonomy and output parsing for the external checker.

use thiserror::Error;

use crate::RawIssue;

#[derive(Debug, Error)]
pub enum CheckError {
    /// The checker does not handle this language; scanning is a no-op.
    #[error("checker does not support language `{0}`")]
    UnsupportedLanguage(String),
    #[error("failed to start checker `{program}`: {source}")]
    Unavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("checker exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("checker produced malformed output: {0}")]
    MalformedOutput(#[from] serde_json::Error),
}

impl CheckError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CheckError::UnsupportedLanguage(_))
    }
}

/// Parse checker stdout: a JSON array of issues. Blank output means no
/// issues.
pub fn parse_checker_output(stdout: &str) -> Result<Vec<RawIssue>, CheckError> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(stdout)?)
}
