use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_lsp::jsonrpc::{self, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, ClientSocket, LanguageServer, LspService};
use tracing::{debug, error, info, warn};

use crate::actions::ActionRegistry;
use crate::analysis::Analysis;
use crate::analysis::rename::empty_edit;
use crate::config::InitializationOptions;
use crate::engine::EngineError;
use crate::lsp::convert::{
    to_completion_item, to_document_symbol, to_hover, to_lsp_diagnostics, to_symbol_information,
};
use crate::lsp::inflight::{InFlight, RequestKind};
use crate::lsp::metadata::{METADATA_METHOD, MetadataParams, MetadataResponse};
use crate::workspace::{LineSpan, Snapshot};

pub struct Backend {
    client: Client,
    analysis: Arc<Analysis>,
    actions: Arc<ActionRegistry>,
    inflight: InFlight,
}

impl Backend {
    pub fn new(client: Client, analysis: Arc<Analysis>, actions: Arc<ActionRegistry>) -> Self {
        Self {
            client,
            analysis,
            actions,
            inflight: InFlight::new(),
        }
    }

    /// Builds the protocol service, including the `o#/metadata` extension.
    pub fn service(
        analysis: Arc<Analysis>,
        actions: Arc<ActionRegistry>,
    ) -> (LspService<Backend>, ClientSocket) {
        LspService::build(|client| Backend::new(client, analysis, actions))
            .custom_method(METADATA_METHOD, Backend::metadata)
            .finish()
    }

    pub fn server_capabilities() -> ServerCapabilities {
        ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Options(
                TextDocumentSyncOptions {
                    open_close: Some(true),
                    change: Some(TextDocumentSyncKind::FULL),
                    ..Default::default()
                },
            )),
            hover_provider: Some(HoverProviderCapability::Simple(true)),
            definition_provider: Some(OneOf::Left(true)),
            references_provider: Some(OneOf::Left(true)),
            document_highlight_provider: Some(OneOf::Left(true)),
            rename_provider: Some(OneOf::Left(true)),
            completion_provider: Some(CompletionOptions {
                trigger_characters: Some(vec![".".to_string()]),
                ..Default::default()
            }),
            code_action_provider: Some(CodeActionProviderCapability::Options(CodeActionOptions {
                code_action_kinds: Some(vec![
                    CodeActionKind::QUICKFIX,
                    CodeActionKind::REFACTOR,
                    CodeActionKind::SOURCE_ORGANIZE_IMPORTS,
                ]),
                ..Default::default()
            })),
            document_symbol_provider: Some(OneOf::Left(true)),
            workspace_symbol_provider: Some(OneOf::Left(true)),
            ..Default::default()
        }
    }

    /// Runs `work` on a blocking worker against the current snapshot. A
    /// panicking worker yields `T::default()`.
    async fn blocking<T, F>(&self, work: F) -> T
    where
        F: FnOnce(&Analysis, &Snapshot) -> T + Send + 'static,
        T: Default + Send + 'static,
    {
        let analysis = Arc::clone(&self.analysis);
        let snapshot = analysis.state().current_snapshot();
        tokio::task::spawn_blocking(move || work(&analysis, &snapshot))
            .await
            .unwrap_or_else(|e| {
                error!("Analysis worker failed: {}", e);
                T::default()
            })
    }

    /// Like [`Backend::blocking`], but answers `RequestCancelled` once a newer
    /// request of the same kind arrives for `uri`. The worker sees the same
    /// token and may stop early.
    async fn run<T, F>(&self, uri: &Url, kind: RequestKind, work: F) -> Result<T>
    where
        F: FnOnce(&Analysis, &Snapshot, &CancellationToken) -> T + Send + 'static,
        T: Default + Send + 'static,
    {
        let registration = self.inflight.register(uri, kind);
        let token = registration.ticket().token().clone();
        let worker_token = token.clone();
        let work =
            move |analysis: &Analysis, snapshot: &Snapshot| work(analysis, snapshot, &worker_token);
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("{:?} request for {} superseded", kind, uri);
                Err(jsonrpc::Error::request_cancelled())
            }
            value = self.blocking(work) => Ok(value),
        }
    }

    async fn publish_diagnostics(&self, uri: Url) {
        let target = uri.clone();
        let diagnostics = self
            .blocking(move |analysis, snapshot| {
                analysis
                    .state()
                    .document_for_uri(snapshot, &target)
                    .map(|document| analysis.engine().diagnostics_of(snapshot, &document))
                    .map(|diagnostics| to_lsp_diagnostics(&diagnostics))
                    .unwrap_or_default()
            })
            .await;
        let version = self.analysis.state().open_version(&uri);

        debug!("Publishing {} diagnostics for {}", diagnostics.len(), uri);
        self.client
            .publish_diagnostics(uri, diagnostics, version)
            .await;
    }

    /// Replaces the text of `uri`, adding it to the miscellaneous project
    /// when no project knows it. Metadata documents keep their decompiled text.
    fn apply_text(&self, uri: &Url, text: String) {
        if self.analysis.state().is_metadata_uri(uri) {
            debug!("Ignoring text for read-only metadata document {}", uri);
            return;
        }
        self.analysis.state().update(|snapshot| {
            if snapshot.document(uri).is_some() {
                snapshot
                    .with_document_text(uri, text)
                    .inspect_err(|e| warn!("Failed to update {}: {}", uri, e))
                    .ok()
            } else {
                debug!("Adding {} to the miscellaneous project", uri);
                Some(snapshot.with_added_document(uri, text))
            }
        });
    }

    /// `o#/metadata`: decompiled source of a type referenced by a project.
    pub async fn metadata(&self, params: MetadataParams) -> Result<Option<MetadataResponse>> {
        debug!(
            "Metadata requested for {} in {} ({})",
            params.type_name, params.assembly_name, params.project_name
        );
        Ok(self
            .blocking(move |analysis, snapshot| {
                analysis
                    .metadata_source(
                        snapshot,
                        &params.project_name,
                        &params.assembly_name,
                        &params.type_name,
                    )
                    .map(|(source_name, document)| MetadataResponse {
                        source_name,
                        source: document.text().to_string(),
                    })
            })
            .await)
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let options = InitializationOptions::from_value(params.initialization_options);
        self.analysis
            .set_decompilation_enabled(options.enable_decompilation);
        info!("Initializing with {:?}", options);

        Ok(InitializeResult {
            capabilities: Self::server_capabilities(),
            server_info: Some(ServerInfo {
                name: "sharp-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        let snapshot = self.analysis.state().current_snapshot();
        self.client
            .log_message(
                MessageType::INFO,
                format!(
                    "sharp-lsp ready: {} projects, {} documents",
                    snapshot.projects().count(),
                    snapshot.documents().count()
                ),
            )
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        info!(
            "Shutting down ({} metadata documents cached)",
            self.analysis.state().metadata().len()
        );
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        debug!("Document opened: {} (version {})", document.uri, document.version);

        self.analysis
            .state()
            .track_open(&document.uri, document.version);
        self.apply_text(&document.uri, document.text);
        self.publish_diagnostics(document.uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        // Full sync: the last change carries the whole text.
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };

        self.analysis
            .state()
            .track_change(&uri, params.text_document.version);
        self.apply_text(&uri, change.text);
        self.publish_diagnostics(uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        debug!("Document closed: {}", uri);

        self.analysis.state().track_close(&uri);
        self.analysis
            .state()
            .update(|snapshot| snapshot.without_miscellaneous_document(&uri));
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let TextDocumentPositionParams {
            text_document,
            position,
        } = params.text_document_position_params;
        let uri = text_document.uri;

        let target = uri.clone();
        self.run(&uri, RequestKind::Hover, move |analysis, snapshot, _| {
            analysis
                .find_symbol_at(snapshot, &target, position)
                .map(|at| to_hover(&at.symbol))
        })
        .await
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let TextDocumentPositionParams {
            text_document,
            position,
        } = params.text_document_position_params;
        let uri = text_document.uri;

        let target = uri.clone();
        self.run(&uri, RequestKind::Definition, move |analysis, snapshot, _| {
            let at = analysis.find_symbol_at(snapshot, &target, position)?;
            let symbol = analysis
                .engine()
                .declaration_of(snapshot, &at.symbol)
                .unwrap_or(at.symbol);
            let locations = analysis.resolve_locations(snapshot, &symbol, &at.document);
            (!locations.is_empty()).then_some(GotoDefinitionResponse::Array(locations))
        })
        .await
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let include_declaration = params.context.include_declaration;

        let target = uri.clone();
        self.run(&uri, RequestKind::References, move |analysis, snapshot, cancel| {
            let at = analysis.find_symbol_at(snapshot, &target, position)?;
            Some(analysis.find_all_references(snapshot, &at.symbol, include_declaration, cancel))
        })
        .await
    }

    async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> Result<Option<Vec<DocumentHighlight>>> {
        let TextDocumentPositionParams {
            text_document,
            position,
        } = params.text_document_position_params;
        let uri = text_document.uri;

        let target = uri.clone();
        self.run(&uri, RequestKind::Highlight, move |analysis, snapshot, cancel| {
            let at = analysis.find_symbol_at(snapshot, &target, position)?;
            Some(analysis.highlights(snapshot, &at.symbol, &at.document, cancel))
        })
        .await
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let new_name = params.new_name;

        let target = uri.clone();
        let outcome = self
            .run(&uri, RequestKind::Rename, move |analysis, snapshot, cancel| {
                Some(analysis.rename(snapshot, &target, position, &new_name, cancel))
            })
            .await?;

        match outcome {
            None => Ok(None),
            Some(Ok(edit)) => Ok(Some(edit)),
            Some(Err(e @ EngineError::InvalidName(_))) => {
                Err(jsonrpc::Error::invalid_params(e.to_string()))
            }
            Some(Err(EngineError::Cancelled)) => Err(jsonrpc::Error::request_cancelled()),
            Some(Err(e)) => {
                warn!("Rename at {}:{:?} failed: {}", uri, position, e);
                Ok(Some(empty_edit()))
            }
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let target = uri.clone();
        self.run(&uri, RequestKind::Completion, move |analysis, snapshot, _| {
            let document = analysis.state().document_for_uri(snapshot, &target)?;
            let offset = document.offset(position.into())?;
            let candidates = analysis
                .engine()
                .completions_at(snapshot, &document, offset)?;
            Some(CompletionResponse::Array(
                candidates.into_iter().map(to_completion_item).collect(),
            ))
        })
        .await
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let uri = params.text_document.uri;
        let span: LineSpan = params.range.into();

        let target = uri.clone();
        let actions = Arc::clone(&self.actions);
        self.run(&uri, RequestKind::CodeAction, move |analysis, snapshot, _| {
            let document = analysis.state().document_for_uri(snapshot, &target)?;
            Some(actions.code_actions(
                analysis.engine(),
                analysis.state(),
                snapshot,
                &document,
                span,
            ))
        })
        .await
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let uri = params.text_document.uri;
        Ok(self
            .blocking(move |analysis, snapshot| {
                let document = analysis.state().document_for_uri(snapshot, &uri)?;
                let nodes = analysis.engine().declarations_in(&document);
                Some(DocumentSymbolResponse::Nested(
                    nodes.into_iter().map(to_document_symbol).collect(),
                ))
            })
            .await)
    }

    async fn symbol(
        &self,
        params: WorkspaceSymbolParams,
    ) -> Result<Option<Vec<SymbolInformation>>> {
        let query = params.query;
        Ok(self
            .blocking(move |analysis, snapshot| {
                Some(
                    analysis
                        .engine()
                        .workspace_symbols(snapshot, &query)
                        .iter()
                        .filter_map(to_symbol_information)
                        .collect(),
                )
            })
            .await)
    }
}
