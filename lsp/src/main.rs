//! Spell Language Server Protocol implementation.
//!
//! Runs the external checker over open documents, resolves its
//! position-less issues into diagnostics and offers fix/ignore actions.

mod checker;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use spell_core::{
    language_choices, language_description, replacement_edit, resolve_at_cursor, suggest_fix,
    FixChoice, ResolvedRange, ScanCoordinator, ScanOutcome, Settings, Severity,
};
use tokio::sync::{Mutex, RwLock};
use tower_lsp::jsonrpc::{Error as RpcError, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::checker::CommandChecker;

const SOURCE: &str = "spell";
const CMD_SUGGEST_FIX: &str = "spell.suggestFix";
const CMD_ADD_TO_IGNORE: &str = "spell.addToIgnore";
const CMD_CHANGE_LANGUAGE: &str = "spell.changeLanguage";
const SETTINGS_WATCHER_ID: &str = "spell-settings-watcher";

/// Document state cached by the server.
struct DocumentState {
    content: String,
    version: i32,
    language_id: String,
}

/// Spell Language Server backend.
struct Backend {
    client: Client,
    documents: DashMap<Url, DocumentState>,
    scans: Mutex<ScanCoordinator<Url>>,
    settings: RwLock<Arc<Settings>>,
    settings_path: RwLock<Option<PathBuf>>,
    workspace_root: RwLock<Option<PathBuf>>,
    checker: RwLock<CommandChecker>,
    last_failure: Mutex<Option<String>>,
    watch_settings: RwLock<bool>,
}

impl Backend {
    fn new(client: Client) -> Self {
        Self {
            client,
            documents: DashMap::new(),
            scans: Mutex::new(ScanCoordinator::new()),
            settings: RwLock::new(Arc::new(Settings::default())),
            settings_path: RwLock::new(None),
            workspace_root: RwLock::new(None),
            checker: RwLock::new(CommandChecker::default()),
            last_failure: Mutex::new(None),
            watch_settings: RwLock::new(false),
        }
    }

    async fn apply_options(&self, map: &serde_json::Map<String, Value>) {
        if let Some(Value::String(settings_path)) = map.get("settingsPath") {
            if settings_path.trim().is_empty() {
                *self.settings_path.write().await = None;
            } else {
                let configured = PathBuf::from(settings_path);
                if configured.is_absolute() {
                    *self.settings_path.write().await = Some(configured);
                } else if let Some(root) = self.workspace_root.read().await.clone() {
                    *self.settings_path.write().await = Some(root.join(configured));
                }
            }
        }
        if let Some(command) = map.get("checkerCommand") {
            match CommandChecker::from_option(command) {
                Some(checker) => *self.checker.write().await = checker,
                None => {
                    self.client
                        .log_message(
                            MessageType::WARNING,
                            "Ignoring checkerCommand: expected a non-empty array of strings",
                        )
                        .await;
                }
            }
        }
    }

    async fn resolved_settings_path(&self) -> Option<PathBuf> {
        if let Some(configured) = self.settings_path.read().await.clone() {
            return Some(configured);
        }
        let root = self.workspace_root.read().await.clone()?;
        Some(Settings::default_path(&root))
    }

    async fn reload_settings(&self) {
        let Some(path) = self.resolved_settings_path().await else {
            return;
        };
        let settings = Settings::load(&path);
        *self.settings.write().await = Arc::new(settings);
        *self.settings_path.write().await = Some(path.clone());
        self.client
            .log_message(
                MessageType::INFO,
                format!("Spell settings loaded: {}", path.display()),
            )
            .await;
    }

    /// Write settings to disk. Failures are shown to the user; the in-memory
    /// settings stay in effect either way.
    async fn persist_settings(&self, settings: &Settings) {
        let Some(path) = self.resolved_settings_path().await else {
            return;
        };
        let saved = settings
            .save(&path)
            .with_context(|| format!("Failed to save spell settings to {}", path.display()));
        if let Err(err) = saved {
            self.client
                .show_message(MessageType::ERROR, format!("{err:#}"))
                .await;
        }
    }

    /// Run one scan pass for `uri` and publish its diagnostics unless a newer
    /// scan has started in the meantime.
    async fn scan(&self, uri: Url) {
        let settings = self.settings.read().await.clone();
        let ticket = {
            // Snapshot the text under the coordinator lock so `begin` always
            // sees the newest version.
            let mut scans = self.scans.lock().await;
            let Some((text, version, language_id)) = self
                .documents
                .get(&uri)
                .map(|doc| (doc.content.clone(), doc.version, doc.language_id.clone()))
            else {
                return;
            };
            if !settings.checks_language_id(&language_id) {
                debug!(%uri, language_id, "language id not checked");
                if scans.forget(&uri) {
                    self.client.publish_diagnostics(uri, vec![], None).await;
                }
                return;
            }
            scans.begin(uri.clone(), version, &text)
        };
        let checker = self.checker.read().await.clone();
        let result = checker.check(ticket.checked_text(), &settings.language).await;

        // Settings edits made while the checker ran apply to this pass.
        let settings = self.settings.read().await.clone();
        let mut scans = self.scans.lock().await;
        match scans.complete(ticket, result, &settings) {
            ScanOutcome::Published(published) => {
                let diagnostics = published.diagnostics().map(to_lsp_diagnostic).collect();
                self.client
                    .publish_diagnostics(uri, diagnostics, Some(published.version))
                    .await;
                drop(scans);
                *self.last_failure.lock().await = None;
            }
            ScanOutcome::Stale | ScanOutcome::Unsupported => {}
            ScanOutcome::Failed(err) => {
                drop(scans);
                self.report_failure(format!("Spell checker failed: {err}"))
                    .await;
            }
        }
    }

    async fn scan_all(&self) {
        let uris: Vec<Url> = self.documents.iter().map(|e| e.key().clone()).collect();
        for uri in uris {
            self.scan(uri).await;
        }
    }

    /// Show a checker failure once; repeats are only logged until a scan
    /// succeeds again.
    async fn report_failure(&self, message: String) {
        let mut last = self.last_failure.lock().await;
        if last.as_deref() == Some(message.as_str()) {
            debug!("{message}");
            return;
        }
        self.client
            .show_message(MessageType::ERROR, message.clone())
            .await;
        *last = Some(message);
    }

    async fn update_settings(&self, edit: impl FnOnce(&mut Settings) -> bool) {
        let updated = {
            let mut guard = self.settings.write().await;
            if !edit(Arc::make_mut(&mut guard)) {
                return;
            }
            guard.clone()
        };
        self.persist_settings(&updated).await;
        self.scan_all().await;
    }

    async fn register_settings_watcher(&self, settings_path: Option<&Path>) -> Result<()> {
        let options = DidChangeWatchedFilesRegistrationOptions {
            watchers: vec![FileSystemWatcher {
                glob_pattern: GlobPattern::String(settings_watch_pattern(settings_path)),
                kind: None,
            }],
        };
        let register_options = serde_json::to_value(options)
            .map_err(|err| RpcError::invalid_params(err.to_string()))?;
        self.client
            .register_capability(vec![Registration {
                id: SETTINGS_WATCHER_ID.to_string(),
                method: "workspace/didChangeWatchedFiles".to_string(),
                register_options: Some(register_options),
            }])
            .await
    }

    async fn add_to_ignore(&self, word: String) {
        info!(word, "adding to ignore list");
        self.update_settings(|settings| settings.ignore_word(&word))
            .await;
    }

    async fn change_language(&self, code: Option<String>) {
        let current = self.settings.read().await.language.clone();
        let code = match code {
            Some(code) => code,
            None => {
                let choices = language_choices(&current);
                let items = choices
                    .iter()
                    .map(|(code, description)| action_item(format!("{description} ({code})")))
                    .collect();
                let message = format!(
                    "Current checker language: {}",
                    language_description(&current)
                );
                let picked = self
                    .client
                    .show_message_request(MessageType::INFO, message, Some(items))
                    .await;
                let Ok(Some(item)) = picked else {
                    return;
                };
                let Some((code, _)) = choices
                    .into_iter()
                    .find(|(code, description)| item.title == format!("{description} ({code})"))
                else {
                    return;
                };
                code.to_string()
            }
        };

        if !Settings::is_supported_language(&code) {
            self.client
                .show_message(
                    MessageType::WARNING,
                    format!("Unsupported checker language `{code}`"),
                )
                .await;
            return;
        }
        self.update_settings(|settings| {
            if settings.language == code {
                return false;
            }
            settings.language = code;
            true
        })
        .await;
    }

    async fn suggest_fix_interactive(&self, uri: Url, position: Position) {
        let Some((text, language_id)) = self
            .documents
            .get(&uri)
            .map(|doc| (doc.content.clone(), doc.language_id.clone()))
        else {
            return;
        };
        let settings = self.settings.read().await.clone();
        if !settings.checks_language_id(&language_id) {
            self.client
                .show_message(
                    MessageType::INFO,
                    format!("LanguageID: {language_id} not supported for spell checking."),
                )
                .await;
            return;
        }

        let published = self.scans.lock().await.published(&uri);
        let Some(proposal) = suggest_fix(published.as_deref(), &text, core_position(position))
        else {
            return;
        };
        let has_suggestions = proposal
            .choices
            .iter()
            .any(|choice| matches!(choice, FixChoice::Replace { .. }));
        let message = if has_suggestions {
            format!("Here's a suggestion or two for [{}]", proposal.word)
        } else {
            format!("No suggestions available sorry... [{}]", proposal.word)
        };
        let items = proposal
            .choices
            .iter()
            .filter(|choice| !matches!(choice, FixChoice::NoSuggestion))
            .map(|choice| action_item(choice.description()))
            .collect();

        let picked = self
            .client
            .show_message_request(MessageType::INFO, message, Some(items))
            .await;
        let Ok(Some(item)) = picked else {
            return;
        };
        let Some(choice) = proposal
            .choices
            .into_iter()
            .find(|choice| choice.description() == item.title)
        else {
            return;
        };

        match choice {
            FixChoice::Replace { word, suggestion } => {
                let Some(current) = self.documents.get(&uri).map(|doc| doc.content.clone()) else {
                    return;
                };
                let Some(edit) =
                    replacement_edit(&current, core_position(position), &word, &suggestion)
                else {
                    self.client
                        .show_message(
                            MessageType::WARNING,
                            format!("[{word}] is no longer at the cursor"),
                        )
                        .await;
                    return;
                };
                let edit = TextEdit {
                    range: lsp_range(&edit.range),
                    new_text: edit.new_text,
                };
                let workspace_edit = WorkspaceEdit {
                    changes: Some(HashMap::from([(uri, vec![edit])])),
                    ..Default::default()
                };
                if let Err(err) = self.client.apply_edit(workspace_edit).await {
                    self.client
                        .log_message(MessageType::ERROR, format!("Failed to apply fix: {err}"))
                        .await;
                }
            }
            FixChoice::AddToIgnore { word } => self.add_to_ignore(word).await,
            FixChoice::NoSuggestion => {}
        }
    }
}

/// Glob for the settings file watcher: the resolved path when known.
fn settings_watch_pattern(settings_path: Option<&Path>) -> String {
    match settings_path {
        Some(path) => path.to_string_lossy().replace('\\', "/"),
        None => "**/.vscode/spell.json".to_string(),
    }
}

fn core_position(position: Position) -> spell_core::Position {
    spell_core::Position::new(position.line, position.character)
}

fn lsp_range(range: &ResolvedRange) -> Range {
    Range {
        start: Position {
            line: range.start_line,
            character: range.start_char,
        },
        end: Position {
            line: range.end_line,
            character: range.end_char,
        },
    }
}

fn action_item(title: String) -> MessageActionItem {
    MessageActionItem {
        title,
        properties: HashMap::new(),
    }
}

/// Convert a core diagnostic to an LSP diagnostic.
fn to_lsp_diagnostic(diag: &spell_core::Diagnostic) -> Diagnostic {
    let severity = match diag.severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Information => DiagnosticSeverity::INFORMATION,
        Severity::Hint => DiagnosticSeverity::HINT,
    };
    Diagnostic {
        range: lsp_range(&diag.range),
        severity: Some(severity),
        code: Some(NumberOrString::String(diag.code.clone())),
        code_description: None,
        source: Some(SOURCE.to_string()),
        message: diag.message.clone(),
        related_information: None,
        tags: None,
        data: None,
    }
}

fn command_arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T> {
    let value = args
        .get(index)
        .cloned()
        .ok_or_else(|| RpcError::invalid_params(format!("missing argument {index}")))?;
    serde_json::from_value(value)
        .map_err(|err| RpcError::invalid_params(format!("argument {index}: {err}")))
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(root_uri) = params.root_uri.or_else(|| {
            params
                .workspace_folders
                .as_ref()
                .and_then(|folders| folders.first().map(|f| f.uri.clone()))
        }) {
            if let Ok(path) = root_uri.to_file_path() {
                *self.workspace_root.write().await = Some(path);
            }
        }

        let dynamic_watch = params
            .capabilities
            .workspace
            .as_ref()
            .and_then(|workspace| workspace.did_change_watched_files.as_ref())
            .and_then(|watched| watched.dynamic_registration)
            .unwrap_or(false);
        *self.watch_settings.write().await = dynamic_watch;

        if let Some(Value::Object(map)) = params.initialization_options {
            self.apply_options(&map).await;
        }
        self.reload_settings().await;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                code_action_provider: Some(CodeActionProviderCapability::Options(
                    CodeActionOptions {
                        code_action_kinds: Some(vec![CodeActionKind::QUICKFIX]),
                        work_done_progress_options: WorkDoneProgressOptions {
                            work_done_progress: None,
                        },
                        resolve_provider: Some(false),
                    },
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![
                        CMD_SUGGEST_FIX.to_string(),
                        CMD_ADD_TO_IGNORE.to_string(),
                        CMD_CHANGE_LANGUAGE.to_string(),
                    ],
                    work_done_progress_options: WorkDoneProgressOptions {
                        work_done_progress: None,
                    },
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "Spell Language Server".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        if *self.watch_settings.read().await {
            let settings_path = self.resolved_settings_path().await;
            if let Err(err) = self.register_settings_watcher(settings_path.as_deref()).await {
                self.client
                    .log_message(
                        MessageType::WARNING,
                        format!("Failed to watch spell settings: {err}"),
                    )
                    .await;
            }
        }
        self.client
            .log_message(MessageType::INFO, "Spell and grammar checker active")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        self.documents.insert(
            doc.uri.clone(),
            DocumentState {
                content: doc.text,
                version: doc.version,
                language_id: doc.language_id,
            },
        );
        self.scan(doc.uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;

        // With FULL sync, the last change carries the complete new content
        if let Some(change) = params.content_changes.into_iter().last() {
            if let Some(mut doc) = self.documents.get_mut(&uri) {
                doc.content = change.text;
                doc.version = version;
            }
        }

        self.scan(uri).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let saved_path = params.text_document.uri.to_file_path().ok();
        let settings_path = self.settings_path.read().await.clone();
        let is_settings = saved_path
            .as_ref()
            .zip(settings_path.as_ref())
            .is_some_and(|(a, b)| a == b);
        if is_settings {
            self.reload_settings().await;
            self.scan_all().await;
        }
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        if let Value::Object(map) = params.settings {
            self.apply_options(&map).await;
        }
        self.reload_settings().await;
        self.scan_all().await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let settings_path = self.settings_path.read().await.clone();
        let should_reload = params.changes.iter().any(|change| match &settings_path {
            Some(settings_path) => change
                .uri
                .to_file_path()
                .is_ok_and(|path| &path == settings_path),
            None => change.uri.path().ends_with("spell.json"),
        });
        if !should_reload {
            return;
        }
        self.reload_settings().await;
        self.scan_all().await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.remove(&uri);
        let _ = self.scans.lock().await.forget(&uri);
        // Clear diagnostics
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let uri = &params.text_document.uri;
        let Some(text) = self.documents.get(uri).map(|doc| doc.content.clone()) else {
            return Ok(None);
        };
        let Some(published) = self.scans.lock().await.published(uri) else {
            return Ok(None);
        };
        let cursor = core_position(params.range.start);
        let Some(resolved) = resolve_at_cursor(&published, &text, cursor) else {
            return Ok(None);
        };
        let diagnostic = to_lsp_diagnostic(&resolved.diagnostic);
        let Some(proposal) = suggest_fix(Some(&published), &text, cursor) else {
            return Ok(None);
        };

        let mut actions = Vec::new();
        for choice in &proposal.choices {
            match choice {
                FixChoice::Replace { word, suggestion } => {
                    let Some(edit) = replacement_edit(&text, cursor, word, suggestion) else {
                        continue;
                    };
                    let edit = TextEdit {
                        range: lsp_range(&edit.range),
                        new_text: edit.new_text,
                    };
                    actions.push(CodeActionOrCommand::CodeAction(CodeAction {
                        title: choice.description(),
                        kind: Some(CodeActionKind::QUICKFIX),
                        diagnostics: Some(vec![diagnostic.clone()]),
                        edit: Some(WorkspaceEdit {
                            changes: Some(HashMap::from([(uri.clone(), vec![edit])])),
                            ..Default::default()
                        }),
                        command: None,
                        is_preferred: Some(actions.is_empty()),
                        disabled: None,
                        data: None,
                    }));
                }
                FixChoice::AddToIgnore { word } => {
                    actions.push(CodeActionOrCommand::CodeAction(CodeAction {
                        title: choice.description(),
                        kind: Some(CodeActionKind::QUICKFIX),
                        diagnostics: Some(vec![diagnostic.clone()]),
                        edit: None,
                        command: Some(Command {
                            title: choice.description(),
                            command: CMD_ADD_TO_IGNORE.to_string(),
                            arguments: Some(vec![Value::String(word.clone())]),
                        }),
                        is_preferred: Some(false),
                        disabled: None,
                        data: None,
                    }));
                }
                FixChoice::NoSuggestion => {}
            }
        }

        if actions.is_empty() {
            Ok(None)
        } else {
            Ok(Some(actions))
        }
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        let args = params.arguments;
        match params.command.as_str() {
            CMD_ADD_TO_IGNORE => {
                let word: String = command_arg(&args, 0)?;
                self.add_to_ignore(word).await;
            }
            CMD_CHANGE_LANGUAGE => {
                let code = if args.is_empty() {
                    None
                } else {
                    Some(command_arg::<String>(&args, 0)?)
                };
                self.change_language(code).await;
            }
            CMD_SUGGEST_FIX => {
                let uri: Url = command_arg(&args, 0)?;
                let position: Position = command_arg(&args, 1)?;
                self.suggest_fix_interactive(uri, position).await;
            }
            other => {
                return Err(RpcError::invalid_params(format!("unknown command `{other}`")));
            }
        }
        Ok(None)
    }
}

#[tokio::main]
async fn main() {
    // stdout carries JSON-RPC; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
