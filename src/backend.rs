use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::cache::VariableCache;
use crate::config::Config;
use crate::document::DocumentState;
use crate::engine::{DecorationEngine, DecorationHost, RebuildContext, ViewEvent};
use crate::files::LocalFiles;
use crate::notify::ClientNotifier;
use crate::project::{FsProjectResolver, ProjectPaths, ProjectResolver};
use crate::providers::completion::key_completions;
use crate::providers::decorations::{Decoration, DecorationKind};
use crate::providers::diagnostics::{duplicate_key_diagnostics, unresolved_diagnostics};
use crate::scanner;
use crate::structure::{VarValue, parse};
use crate::utils::{ellipsize, offset_to_position, position_to_offset};

/// Command identifiers exposed through `workspace/executeCommand`.
pub const COMMAND_UPDATE_VARIABLE: &str = "varlens/updateVariable";
pub const COMMAND_ADD_VARIABLE: &str = "varlens/addVariable";
pub const COMMAND_CREATE_VARIABLES_FILE: &str = "varlens/createVariablesFile";

/// Custom method carrying viewport bounds and cursor into the engine.
pub const METHOD_VIEWPORT: &str = "varlens/viewport";

/// Parameters of the `varlens/viewport` custom method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportParams {
    pub uri: Url,
    /// Currently visible range of the document.
    pub range: Range,
    /// Cursor position, when the host tracks one.
    #[serde(default)]
    pub cursor: Option<Position>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportAck {
    pub scheduled: bool,
}

#[derive(Debug, Deserialize)]
struct UpdateVariableArgs {
    uri: Url,
    key: String,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AddVariableArgs {
    uri: Url,
    key: String,
    value: serde_json::Value,
    #[serde(default)]
    section: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateVariablesFileArgs {
    uri: Url,
}

/// Asks the editor to re-pull inlay hints after a rebuild replaced a
/// view's decorations.
struct RefreshHost {
    client: Client,
}

impl DecorationHost for RefreshHost {
    fn decorations_updated(&self, _view: &Url) {
        let client = self.client.clone();
        tokio::spawn(async move {
            client
                .send_request::<request::InlayHintRefreshRequest>(())
                .await
                .ok();
        });
    }
}

pub struct VarlensBackend {
    client: Client,
    /// Configuration
    config: RwLock<Config>,
    /// Open documents and their parsed state
    documents: DashMap<Url, DocumentState>,
    /// Per-project variable cache
    cache: Arc<VariableCache>,
    /// Document-to-project lookup, rebuilt from configuration
    resolver: RwLock<Arc<dyn ProjectResolver>>,
    /// Rebuild scheduling
    engine: Arc<DecorationEngine>,
}

impl VarlensBackend {
    pub fn new(client: Client) -> Self {
        let cache = Arc::new(VariableCache::new(
            Arc::new(LocalFiles),
            Arc::new(ClientNotifier::new(client.clone())),
        ));
        let engine = Arc::new(DecorationEngine::new(
            Arc::clone(&cache),
            Arc::new(RefreshHost {
                client: client.clone(),
            }),
        ));

        Self {
            client,
            config: RwLock::new(Config::default()),
            documents: DashMap::new(),
            cache,
            resolver: RwLock::new(Arc::new(FsProjectResolver::default())),
            engine,
        }
    }

    /// Shared cache handle, used by the CLI paths.
    pub fn cache(&self) -> Arc<VariableCache> {
        Arc::clone(&self.cache)
    }

    fn config_snapshot(&self) -> Config {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn resolve_project(&self, uri: &Url) -> Option<ProjectPaths> {
        let path = uri.to_file_path().ok()?;
        let resolver = self.resolver.read().map(|r| Arc::clone(&*r)).ok()?;
        resolver.resolve(&path)
    }

    /// Whether a URI points at a project's variables file.
    fn is_variables_file(&self, uri: &Url) -> bool {
        let name = self.config_snapshot().files.variables_file;
        uri.path().rsplit('/').next().is_some_and(|f| f == name)
    }

    fn rebuild_context(&self, uri: &Url) -> Option<RebuildContext> {
        let doc = self.documents.get(uri)?;
        let (slice, offset) = doc.viewport_slice();
        Some(RebuildContext {
            view: uri.clone(),
            viewport_text: slice.to_string(),
            viewport_offset: offset,
            cursor: doc.cursor,
            project: doc.project.clone(),
            highlight_unresolved: self.config_snapshot().hints.highlight_unresolved,
        })
    }

    /// Store a document's new text and schedule a decoration pass.
    async fn process_document(&self, uri: &Url, text: String) {
        let project = self.resolve_project(uri);

        match self.documents.get_mut(uri) {
            Some(mut doc) => {
                doc.text = text;
                doc.project = project;
            }
            None => {
                self.documents
                    .insert(uri.clone(), DocumentState::new(text, project));
            }
        }

        if let Some(ctx) = self.rebuild_context(uri) {
            Arc::clone(&self.engine).schedule(ctx, ViewEvent::Edited);
        }
        self.publish_diagnostics_for(uri).await;
    }

    async fn publish_diagnostics_for(&self, uri: &Url) {
        if !self.config_snapshot().diagnostics.enabled {
            return;
        }

        // Clone what the diagnostics need before any await.
        let Some((text, project)) = self
            .documents
            .get(uri)
            .map(|doc| (doc.text.clone(), doc.project.clone()))
        else {
            return;
        };

        let diagnostics = if self.is_variables_file(uri) {
            duplicate_key_diagnostics(&parse(&text))
        } else if let Some(project) = &project {
            if self.cache.get_structure(project).is_none() {
                self.cache.load_variables(project).await;
            }
            unresolved_diagnostics(&text, project, &self.cache)
        } else {
            Vec::new()
        };

        self.client
            .publish_diagnostics(uri.clone(), diagnostics, None)
            .await;
    }

    /// Re-run decorations and diagnostics for every open document of a
    /// project after its cache entry changed.
    async fn refresh_project_views(&self, project: &ProjectPaths) {
        let affected: Vec<Url> = self
            .documents
            .iter()
            .filter(|entry| entry.value().project.as_ref() == Some(project))
            .map(|entry| entry.key().clone())
            .collect();

        for uri in affected {
            if let Some(ctx) = self.rebuild_context(&uri) {
                Arc::clone(&self.engine).schedule(ctx, ViewEvent::CacheChanged);
            }
            self.publish_diagnostics_for(&uri).await;
        }
    }

    fn create_inlay_hint(decoration: &Decoration, text: &str) -> InlayHint {
        let (label, tooltip) = match &decoration.kind {
            DecorationKind::Resolved { text: value } => (
                format!("= {}", ellipsize(value, 60)),
                format!("{} = {}", decoration.key, value),
            ),
            DecorationKind::Unresolved { .. } => (
                "⚠ unresolved".to_string(),
                format!("'{}' was not found in the variables file", decoration.key),
            ),
        };

        InlayHint {
            position: offset_to_position(text, decoration.to),
            label: InlayHintLabel::String(label),
            kind: Some(InlayHintKind::PARAMETER),
            text_edits: None,
            tooltip: Some(InlayHintTooltip::String(tooltip)),
            padding_left: Some(true),
            padding_right: None,
            data: None,
        }
    }

    fn project_for_command(&self, uri: &Url) -> Option<ProjectPaths> {
        self.documents
            .get(uri)
            .and_then(|doc| doc.project.clone())
            .or_else(|| self.resolve_project(uri))
    }

    async fn run_update_variable(&self, args: UpdateVariableArgs) -> serde_json::Value {
        let Some(project) = self.project_for_command(&args.uri) else {
            return command_failure("no project found for document");
        };
        let value = VarValue::from(args.value);
        match self.cache.update_variable(&project, &args.key, &value).await {
            Ok(()) => {
                self.refresh_project_views(&project).await;
                serde_json::json!({ "success": true })
            }
            Err(err) => command_failure(&err.to_string()),
        }
    }

    async fn run_add_variable(&self, args: AddVariableArgs) -> serde_json::Value {
        let Some(project) = self.project_for_command(&args.uri) else {
            return command_failure("no project found for document");
        };
        let value = VarValue::from(args.value);
        match self
            .cache
            .add_variable(&project, args.section.as_deref(), &args.key, &value)
            .await
        {
            Ok(()) => {
                self.refresh_project_views(&project).await;
                serde_json::json!({ "success": true })
            }
            Err(err) => command_failure(&err.to_string()),
        }
    }

    async fn run_create_variables_file(&self, args: CreateVariablesFileArgs) -> serde_json::Value {
        let Some(project) = self.project_for_command(&args.uri) else {
            return command_failure("no project found for document");
        };
        match self.cache.create_variables_file(&project).await {
            Ok(()) => {
                self.refresh_project_views(&project).await;
                serde_json::json!({ "success": true, "path": project.data_file })
            }
            Err(err) => command_failure(&err.to_string()),
        }
    }

    /// Custom method: the host reports the visible range and cursor.
    pub async fn viewport(&self, params: ViewportParams) -> Result<ViewportAck> {
        let Some(mut doc) = self.documents.get_mut(&params.uri) else {
            return Ok(ViewportAck { scheduled: false });
        };

        let start = position_to_offset(&doc.text, params.range.start);
        let end = position_to_offset(&doc.text, params.range.end);
        let viewport = Some((start, end));
        let viewport_changed = doc.viewport != viewport;
        doc.viewport = viewport;
        doc.cursor = params
            .cursor
            .map(|pos| position_to_offset(&doc.text, pos));
        drop(doc);

        let event = if viewport_changed {
            ViewEvent::Scrolled
        } else {
            ViewEvent::SelectionMoved
        };
        if let Some(ctx) = self.rebuild_context(&params.uri) {
            Arc::clone(&self.engine).schedule(ctx, event);
        }
        Ok(ViewportAck { scheduled: true })
    }
}

fn command_failure(message: &str) -> serde_json::Value {
    serde_json::json!({ "success": false, "error": message })
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: &[serde_json::Value]) -> Option<T> {
    arguments
        .first()
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
}

#[tower_lsp::async_trait]
impl LanguageServer for VarlensBackend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let config = Config::from_init_options(params.initialization_options);
        tracing::info!("Configuration: {:?}", config);

        self.engine
            .set_scroll_debounce(Duration::from_millis(config.scan.scroll_debounce_ms));
        if let Ok(mut resolver) = self.resolver.write() {
            *resolver = Arc::new(FsProjectResolver::new(
                config.files.variables_file.clone(),
                config.files.config_file.clone(),
            ));
        }
        if let Ok(mut cfg) = self.config.write() {
            *cfg = config;
        }

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "varlens-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                inlay_hint_provider: Some(OneOf::Left(true)),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![".".to_string()]),
                    ..Default::default()
                }),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![
                        COMMAND_UPDATE_VARIABLE.to_string(),
                        COMMAND_ADD_VARIABLE.to_string(),
                        COMMAND_CREATE_VARIABLES_FILE.to_string(),
                    ],
                    ..Default::default()
                }),
                ..Default::default()
            },
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "varlens LSP initialized")
            .await;

        // Watch variables files so external edits invalidate the cache
        // without waiting for the next read.
        let variables_file = self.config_snapshot().files.variables_file;
        let options = DidChangeWatchedFilesRegistrationOptions {
            watchers: vec![FileSystemWatcher {
                glob_pattern: GlobPattern::String(format!("**/{variables_file}")),
                kind: None,
            }],
        };
        let registration = Registration {
            id: "varlens-watched-files".to_string(),
            method: "workspace/didChangeWatchedFiles".to_string(),
            register_options: serde_json::to_value(options).ok(),
        };
        self.client.register_capability(vec![registration]).await.ok();

        tracing::info!("varlens LSP initialized");
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!("varlens LSP shutting down");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        tracing::debug!("Document opened: {}", uri);
        self.process_document(&uri, params.text_document.text).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;

        // With FULL sync, the change carries the entire document content.
        if let Some(change) = params.content_changes.into_iter().next() {
            tracing::debug!("Document changed: {}", uri);
            self.process_document(&uri, change.text).await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(text) = params.text {
            tracing::debug!("Document saved: {}", uri);
            self.process_document(&uri, text).await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        tracing::debug!("Document closed: {}", uri);
        self.documents.remove(&uri);
        self.engine.drop_view(&uri);
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        for event in params.changes {
            let Ok(path) = event.uri.to_file_path() else {
                continue;
            };

            // Projects whose data file this event touches.
            let projects: Vec<ProjectPaths> = {
                let mut seen = Vec::new();
                for entry in self.documents.iter() {
                    if let Some(project) = &entry.value().project
                        && project.data_file == path
                        && !seen.contains(project)
                    {
                        seen.push(project.clone());
                    }
                }
                seen
            };

            for project in projects {
                tracing::info!(
                    "variables file changed on disk for {}",
                    project.root.display()
                );
                self.cache.invalidate(&project).await;
                self.refresh_project_views(&project).await;
            }
        }
    }

    async fn inlay_hint(&self, params: InlayHintParams) -> Result<Option<Vec<InlayHint>>> {
        let config = self.config_snapshot();
        if !config.hints.enabled {
            return Ok(Some(vec![]));
        }

        let uri = &params.text_document.uri;
        let Some(doc) = self.documents.get(uri) else {
            return Ok(Some(vec![]));
        };

        let range_start = position_to_offset(&doc.text, params.range.start);
        let range_end = position_to_offset(&doc.text, params.range.end);

        let hints: Vec<InlayHint> = self
            .engine
            .decorations(uri)
            .iter()
            .filter(|d| d.from >= range_start && d.to <= range_end)
            .filter(|d| !config.ignore.iter().any(|prefix| d.key.starts_with(prefix)))
            .map(|d| Self::create_inlay_hint(d, &doc.text))
            .collect();

        tracing::debug!("Returning {} inlay hints for {}", hints.len(), uri);
        Ok(Some(hints))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some(doc) = self.documents.get(uri) else {
            return Ok(None);
        };

        let offset = position_to_offset(&doc.text, position);
        let Some(token) = scanner::match_at(&doc.text, offset) else {
            return Ok(None);
        };

        let content = match &doc.project {
            Some(project) => match self.cache.get(project, &token.key) {
                Some(value) => format!("**{}**\n\n{}", token.key, value),
                None => format!(
                    "**{}**\n\nNot found in `{}`.",
                    token.key,
                    project.data_file.display()
                ),
            },
            None => format!("**{}**\n\nNo project found for this document.", token.key),
        };

        let range = Range {
            start: offset_to_position(&doc.text, token.from),
            end: offset_to_position(&doc.text, token.to),
        };

        Ok(Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: content,
            }),
            range: Some(range),
        }))
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let Some(doc) = self.documents.get(uri) else {
            return Ok(Some(CompletionResponse::Array(vec![])));
        };
        let Some(project) = doc.project.clone() else {
            return Ok(Some(CompletionResponse::Array(vec![])));
        };
        let Some(structure) = self.cache.get_structure(&project) else {
            return Ok(Some(CompletionResponse::Array(vec![])));
        };

        let offset = position_to_offset(&doc.text, position);
        let items = key_completions(&doc.text, offset, &structure).unwrap_or_default();
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn execute_command(
        &self,
        params: ExecuteCommandParams,
    ) -> Result<Option<serde_json::Value>> {
        match params.command.as_str() {
            COMMAND_UPDATE_VARIABLE => match parse_args(&params.arguments) {
                Some(args) => Ok(Some(self.run_update_variable(args).await)),
                None => Ok(Some(command_failure("invalid arguments"))),
            },
            COMMAND_ADD_VARIABLE => match parse_args(&params.arguments) {
                Some(args) => Ok(Some(self.run_add_variable(args).await)),
                None => Ok(Some(command_failure("invalid arguments"))),
            },
            COMMAND_CREATE_VARIABLES_FILE => match parse_args(&params.arguments) {
                Some(args) => Ok(Some(self.run_create_variables_file(args).await)),
                None => Ok(Some(command_failure("invalid arguments"))),
            },
            _ => {
                tracing::warn!("Unknown command: {}", params.command);
                Ok(None)
            }
        }
    }
}
