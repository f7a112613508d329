//! Shared fixtures for the end-to-end tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::Service;
use tower_lsp::jsonrpc::{self, Request};
use tower_lsp::lsp_types::{Position, PublishDiagnosticsParams, TextEdit, Url};
use tower_lsp::{ClientSocket, LspService};

use sharp_lsp::actions::ActionRegistry;
use sharp_lsp::analysis::Analysis;
use sharp_lsp::engine::{
    AssemblyCatalog, CatalogAssembly, CatalogDecompiler, CatalogMember, CatalogType,
    LexicalEngine, SemanticEngine, SymbolKind,
};
use sharp_lsp::lsp::backend::Backend;
use sharp_lsp::workspace::{Snapshot, WorkspaceState};

pub fn url(path: &str) -> Url {
    Url::parse(&format!("file://{}", path)).unwrap()
}

/// `Lib.dll` exposing `Ns.Bar` with methods `Baz` and `Qux`.
pub fn test_catalog() -> AssemblyCatalog {
    AssemblyCatalog::new().with_assembly(
        CatalogAssembly::new("Lib").with_type(
            CatalogType::new("Ns.Bar", SymbolKind::Class)
                .with_member(CatalogMember::new("Baz", SymbolKind::Method, "public void Baz()"))
                .with_member(CatalogMember::new("Qux", SymbolKind::Method, "public void Qux()")),
        ),
    )
}

pub fn create_test_service(snapshot: Snapshot) -> (LspService<Backend>, ClientSocket) {
    create_service_with_engine(Arc::new(LexicalEngine::with_catalog(test_catalog())), snapshot)
}

pub fn create_service_with_engine(
    engine: Arc<dyn SemanticEngine>,
    snapshot: Snapshot,
) -> (LspService<Backend>, ClientSocket) {
    let analysis = Arc::new(Analysis::new(
        engine,
        Arc::new(CatalogDecompiler::new(test_catalog())),
        Arc::new(WorkspaceState::new(snapshot)),
    ));
    Backend::service(analysis, Arc::new(ActionRegistry::default()))
}

pub fn create_request(id: i64, method: &'static str, params: Value) -> Request {
    Request::build(method).id(id).params(params).finish()
}

pub fn create_notification(method: &'static str, params: Value) -> Request {
    Request::build(method).params(params).finish()
}

pub fn create_initialize_request(id: i64) -> Request {
    create_request(id, "initialize", json!({ "capabilities": {} }))
}

pub fn create_initialize_request_with_options(id: i64, options: Value) -> Request {
    create_request(
        id,
        "initialize",
        json!({ "capabilities": {}, "initializationOptions": options }),
    )
}

pub fn create_initialized_notification() -> Request {
    create_notification("initialized", json!({}))
}

pub fn create_did_open_notification(uri: &str, text: &str) -> Request {
    create_did_open_notification_with_version(uri, text, 1)
}

pub fn create_did_open_notification_with_version(uri: &str, text: &str, version: i32) -> Request {
    create_notification(
        "textDocument/didOpen",
        json!({
            "textDocument": {
                "uri": uri,
                "languageId": "csharp",
                "version": version,
                "text": text,
            }
        }),
    )
}

pub fn create_did_change_notification(uri: &str, text: &str, version: i32) -> Request {
    create_notification(
        "textDocument/didChange",
        json!({
            "textDocument": { "uri": uri, "version": version },
            "contentChanges": [{ "text": text }],
        }),
    )
}

pub fn create_did_close_notification(uri: &str) -> Request {
    create_notification(
        "textDocument/didClose",
        json!({ "textDocument": { "uri": uri } }),
    )
}

pub fn create_position_request(
    id: i64,
    method: &'static str,
    uri: &str,
    line: u32,
    character: u32,
) -> Request {
    create_request(
        id,
        method,
        json!({
            "textDocument": { "uri": uri },
            "position": { "line": line, "character": character },
        }),
    )
}

/// Forwards everything the server sends to the client into a channel.
pub fn spawn_notification_collector(mut socket: ClientSocket) -> mpsc::UnboundedReceiver<Request> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(message) = socket.next().await {
            if tx.send(message).is_err() {
                break;
            }
        }
    });
    rx
}

pub async fn wait_for_notification(
    rx: &mut mpsc::UnboundedReceiver<Request>,
    method: &str,
) -> Option<Request> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(message) = rx.recv().await {
            if message.method() == method {
                return Some(message);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

/// Next `publishDiagnostics` for `uri`, skipping other documents.
pub async fn wait_for_diagnostics(
    rx: &mut mpsc::UnboundedReceiver<Request>,
    uri: &str,
) -> PublishDiagnosticsParams {
    loop {
        let notification = wait_for_notification(rx, "textDocument/publishDiagnostics")
            .await
            .expect("Expected publishDiagnostics notification");
        let params: PublishDiagnosticsParams =
            serde_json::from_value(notification.params().unwrap().clone()).unwrap();
        if params.uri.as_str() == uri {
            return params;
        }
    }
}

/// Sends `request` and decodes its successful result.
pub async fn call<T: DeserializeOwned>(service: &mut LspService<Backend>, request: Request) -> T {
    let (_, result) = service
        .call(request)
        .await
        .unwrap()
        .expect("Expected a response")
        .into_parts();
    serde_json::from_value(result.expect("Expected a successful response")).unwrap()
}

/// Sends `request` and returns its error.
pub async fn call_error(service: &mut LspService<Backend>, request: Request) -> jsonrpc::Error {
    let (_, result) = service
        .call(request)
        .await
        .unwrap()
        .expect("Expected a response")
        .into_parts();
    result.expect_err("Expected an error response")
}

pub async fn initialize(service: &mut LspService<Backend>) {
    service.call(create_initialize_request(1)).await.unwrap();
    service
        .call(create_initialized_notification())
        .await
        .unwrap();
}

fn offset(text: &str, position: Position) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(position.line as usize)
        .map(str::len)
        .sum();
    line_start + position.character as usize
}

/// Applies non-overlapping edits to ASCII `text`.
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> String {
    let mut sorted: Vec<&TextEdit> = edits.iter().collect();
    sorted.sort_by_key(|e| (e.range.start.line, e.range.start.character));

    let mut out = text.to_string();
    for edit in sorted.into_iter().rev() {
        let start = offset(text, edit.range.start);
        let end = offset(text, edit.range.end);
        out.replace_range(start..end, &edit.new_text);
    }
    out
}
