//! Go-to-definition and metadata document E2E tests

mod helper;

use serde_json::json;
use tower::Service;
use tower_lsp::lsp_types::*;

use helper::{
    call, create_did_open_notification, create_initialize_request_with_options,
    create_initialized_notification, create_position_request, create_request, create_test_service,
    initialize, spawn_notification_collector, url,
};
use sharp_lsp::lsp::metadata::MetadataResponse;
use sharp_lsp::workspace::{AssemblyReference, Project, Snapshot};

const SOURCE: &str = "class Foo { void M(Bar bar) { bar.Baz(); } }";

fn snapshot() -> Snapshot {
    Snapshot::new().with_project(
        Project::new("App")
            .with_reference(AssemblyReference::new("Lib", "/refs/Lib.dll"))
            .with_document(url("/app/Foo.cs"), SOURCE),
    )
}

fn column_of(needle: &str) -> u32 {
    SOURCE.find(needle).unwrap() as u32
}

fn metadata_uri() -> Url {
    Url::parse("metadata:///Project/App/Assembly/Lib/Symbol/Ns/Bar.cs").unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn definition_of_binary_member_points_into_decompiled_source() {
    // 1. Create LspService; Lib.dll is only known through the catalog
    let (mut service, socket) = create_test_service(snapshot());
    let _notification_rx = spawn_notification_collector(socket);

    // 2. Initialize
    initialize(&mut service).await;

    // 3. Go to definition of `Baz`
    let response: Option<GotoDefinitionResponse> = call(
        &mut service,
        create_position_request(
            2,
            "textDocument/definition",
            "file:///app/Foo.cs",
            0,
            column_of("Baz"),
        ),
    )
    .await;

    // 4. `        public void Baz();` is line 5 of the decompiled type
    assert_eq!(
        response,
        Some(GotoDefinitionResponse::Array(vec![Location::new(
            metadata_uri(),
            Range::new(Position::new(5, 20), Position::new(5, 23)),
        )]))
    );

    // 5. The metadata document now answers hover like any other document
    let hover: Option<Hover> = call(
        &mut service,
        create_position_request(3, "textDocument/hover", metadata_uri().as_str(), 5, 21),
    )
    .await;
    assert!(hover.is_some());
}

fn touched_documents(edit: WorkspaceEdit) -> usize {
    match edit.document_changes {
        Some(DocumentChanges::Edits(edits)) => edits.len(),
        Some(DocumentChanges::Operations(operations)) => operations.len(),
        None => edit.changes.map_or(0, |changes| changes.len()),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn opened_metadata_document_stays_read_only() {
    // 1. Create LspService and initialize
    let (mut service, socket) = create_test_service(snapshot());
    let _notification_rx = spawn_notification_collector(socket);
    initialize(&mut service).await;

    // 2. Navigate into the decompiled type, then open it like an editor would
    let _: Option<GotoDefinitionResponse> = call(
        &mut service,
        create_position_request(
            2,
            "textDocument/definition",
            "file:///app/Foo.cs",
            0,
            column_of("Baz"),
        ),
    )
    .await;
    service
        .call(create_did_open_notification(
            metadata_uri().as_str(),
            "namespace Ns { public class Bar { public void Baz() {} } }",
        ))
        .await
        .unwrap();

    // 3. Renaming the binary member touches nothing, from either side
    for (id, uri, line, character) in [
        (3, "file:///app/Foo.cs".to_string(), 0, column_of("Baz")),
        (4, metadata_uri().to_string(), 5, 21),
    ] {
        let edit: Option<WorkspaceEdit> = call(
            &mut service,
            create_request(
                id,
                "textDocument/rename",
                json!({
                    "textDocument": { "uri": uri },
                    "position": { "line": line, "character": character },
                    "newName": "Renamed",
                }),
            ),
        )
        .await;
        assert_eq!(edit.map_or(0, touched_documents), 0, "rename from {}", uri);
    }

    // 4. The metadata document never joins the workspace
    let symbols: Option<Vec<SymbolInformation>> = call(
        &mut service,
        create_request(5, "workspace/symbol", json!({ "query": "Baz" })),
    )
    .await;
    assert!(
        symbols
            .unwrap_or_default()
            .iter()
            .all(|s| s.location.uri != metadata_uri())
    );

    // 5. Its decompiled text still answers hover
    let hover: Option<Hover> = call(
        &mut service,
        create_position_request(6, "textDocument/hover", metadata_uri().as_str(), 5, 21),
    )
    .await;
    assert!(hover.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn definition_of_source_symbol_points_at_declaration() {
    let (mut service, socket) = create_test_service(snapshot());
    let _notification_rx = spawn_notification_collector(socket);
    initialize(&mut service).await;

    let response: Option<GotoDefinitionResponse> = call(
        &mut service,
        create_position_request(2, "textDocument/definition", "file:///app/Foo.cs", 0, 7),
    )
    .await;

    assert_eq!(
        response,
        Some(GotoDefinitionResponse::Array(vec![Location::new(
            url("/app/Foo.cs"),
            Range::new(Position::new(0, 6), Position::new(0, 9)),
        )]))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn disabled_decompilation_leaves_binary_symbols_unresolved() {
    let (mut service, socket) = create_test_service(snapshot());
    let _notification_rx = spawn_notification_collector(socket);

    service
        .call(create_initialize_request_with_options(
            1,
            json!({ "enableDecompilation": false }),
        ))
        .await
        .unwrap();
    service
        .call(create_initialized_notification())
        .await
        .unwrap();

    let response: Option<GotoDefinitionResponse> = call(
        &mut service,
        create_position_request(
            2,
            "textDocument/definition",
            "file:///app/Foo.cs",
            0,
            column_of("Baz"),
        ),
    )
    .await;
    assert_eq!(response, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn metadata_request_returns_decompiled_source() {
    let (mut service, socket) = create_test_service(snapshot());
    let _notification_rx = spawn_notification_collector(socket);
    initialize(&mut service).await;

    let response: Option<MetadataResponse> = call(
        &mut service,
        create_request(
            2,
            "o#/metadata",
            json!({ "projectName": "App", "assemblyName": "Lib", "typeName": "Ns.Bar" }),
        ),
    )
    .await;

    let response = response.expect("Expected metadata source");
    assert_eq!(
        response.source_name,
        "$metadata$/Project/App/Assembly/Lib/Symbol/Ns/Bar.cs"
    );
    assert!(response.source.starts_with("// Decompiled from Lib.dll\n"));
    assert!(response.source.contains("        public void Baz();"));

    // Unknown types yield null rather than an error
    let missing: Option<MetadataResponse> = call(
        &mut service,
        create_request(
            3,
            "o#/metadata",
            json!({ "projectName": "App", "assemblyName": "Lib", "typeName": "Ns.Nope" }),
        ),
    )
    .await;
    assert!(missing.is_none());
}
