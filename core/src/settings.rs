//! Persisted checker settings: language, ignore list, severity policy and
//! the editor language ids that get scanned.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::Severity;

/// Checker languages offered to the user, as `(code, description)`.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("fr", "French"),
    ("de", "German"),
    ("pt", "Portuguese"),
    ("es", "Spanish"),
];

/// Human name for a language code. Unknown codes read as English.
pub fn language_description(code: &str) -> &'static str {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(known, _)| *known == code)
        .map_or("English", |(_, description)| *description)
}

/// Languages the user can switch to from `current`.
pub fn language_choices(current: &str) -> Vec<(&'static str, &'static str)> {
    SUPPORTED_LANGUAGES
        .iter()
        .copied()
        .filter(|(code, _)| *code != current)
        .collect()
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to write settings to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to replace settings file {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Settings as stored in `.vscode/spell.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: String,
    pub language: String,
    #[serde(rename = "ignoreWordsList")]
    pub ignore_words_list: Vec<String>,
    #[serde(rename = "mistakeTypeToStatus")]
    pub mistake_type_to_status: BTreeMap<String, String>,
    #[serde(rename = "languageIDs")]
    pub language_ids: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: "0.1.0".into(),
            language: "en".into(),
            ignore_words_list: Vec::new(),
            mistake_type_to_status: BTreeMap::from([
                ("Spelling".to_string(), "Error".to_string()),
                ("Passive Voice".to_string(), "Warning".to_string()),
                ("Complex Expression".to_string(), "Warning".to_string()),
                ("Hyphen Required".to_string(), "Error".to_string()),
            ]),
            language_ids: vec!["markdown".into(), "text".into()],
        }
    }
}

impl Settings {
    /// Conventional settings location under a workspace root.
    pub fn default_path(workspace_root: &Path) -> PathBuf {
        workspace_root.join(".vscode").join("spell.json")
    }

    /// Read settings from `path`. A missing or malformed file yields the
    /// defaults; this never fails.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                debug!(path = %path.display(), "no settings file, using defaults: {err}");
                return Self::default();
            }
        };
        Self::from_json(&text).unwrap_or_else(|err| {
            warn!(path = %path.display(), "malformed settings, using defaults: {err}");
            Self::default()
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Overwrite `path` with these settings via a temp file and rename, so a
    /// crash never leaves a half-written file behind.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self)?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };

        fs::create_dir_all(parent).map_err(io_err)?;
        let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|err| SettingsError::Persist {
            path: path.to_path_buf(),
            source: err.error,
        })?;
        Ok(())
    }

    pub fn is_ignored(&self, token: &str) -> bool {
        self.ignore_words_list.iter().any(|w| w == token)
    }

    /// Add `word` to the ignore list. Returns `false` if it was already there.
    pub fn ignore_word(&mut self, word: &str) -> bool {
        if self.is_ignored(word) {
            return false;
        }
        self.ignore_words_list.push(word.to_string());
        true
    }

    /// Severity for an issue category; unmapped or unknown names are
    /// Information.
    pub fn severity_for(&self, category: &str) -> Severity {
        self.mistake_type_to_status
            .get(category)
            .and_then(|name| Severity::from_name(name))
            .unwrap_or(Severity::Information)
    }

    /// Whether documents with this editor language id get scanned.
    pub fn checks_language_id(&self, language_id: &str) -> bool {
        self.language_ids.iter().any(|id| id == language_id)
    }

    pub fn is_supported_language(code: &str) -> bool {
        SUPPORTED_LANGUAGES.iter().any(|(known, _)| *known == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.language, "en");
        assert_eq!(settings.language_ids, vec!["markdown", "text"]);
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spell.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn partial_file_fills_missing_fields() {
        let settings =
            Settings::from_json(r#"{"language": "de", "ignoreWordsList": ["Teh"]}"#).unwrap();
        assert_eq!(settings.language, "de");
        assert!(settings.is_ignored("Teh"));
        assert_eq!(settings.language_ids, vec!["markdown", "text"]);
        assert_eq!(settings.severity_for("Spelling"), Severity::Error);
    }

    #[test]
    fn save_round_trips_and_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = Settings::default_path(dir.path());
        let mut settings = Settings::default();
        settings.language = "fr".into();
        settings.ignore_word("colour");
        settings.save(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"ignoreWordsList\""));
        assert!(raw.contains("\"mistakeTypeToStatus\""));
        assert!(raw.contains("\"languageIDs\""));
        assert_eq!(Settings::load(&path), settings);
    }

    #[test]
    fn ignore_word_is_idempotent() {
        let mut settings = Settings::default();
        assert!(settings.ignore_word("Teh"));
        assert!(!settings.ignore_word("Teh"));
        assert_eq!(settings.ignore_words_list, vec!["Teh"]);
    }

    #[test]
    fn severity_names_map_with_information_fallback() {
        let mut settings = Settings::default();
        settings
            .mistake_type_to_status
            .insert("Style".into(), "Hint".into());
        settings
            .mistake_type_to_status
            .insert("Odd".into(), "Fatal".into());
        assert_eq!(settings.severity_for("Passive Voice"), Severity::Warning);
        assert_eq!(settings.severity_for("Style"), Severity::Hint);
        assert_eq!(settings.severity_for("Odd"), Severity::Information);
        assert_eq!(settings.severity_for("Unknown"), Severity::Information);
    }

    #[test]
    fn language_choices_skip_current() {
        let choices = language_choices("fr");
        assert_eq!(choices.len(), 4);
        assert!(choices.iter().all(|(code, _)| *code != "fr"));
        assert_eq!(language_description("pt"), "Portuguese");
        assert_eq!(language_description("xx"), "English");
        assert!(Settings::is_supported_language("es"));
        assert!(!Settings::is_supported_language("it"));
    }
}
