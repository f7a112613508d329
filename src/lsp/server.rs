use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tower_lsp::Server;
use tracing::info;

use crate::actions::ActionRegistry;
use crate::analysis::Analysis;
use crate::config::{self, Cli};
use crate::engine::{AssemblyCatalog, CatalogDecompiler, LexicalEngine, SemanticEngine};
use crate::log::init;
use crate::lsp::backend::Backend;
use crate::workspace::WorkspaceState;

fn load_catalog(path: Option<&Path>) -> anyhow::Result<AssemblyCatalog> {
    let Some(path) = path else {
        return Ok(AssemblyCatalog::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read assembly catalog {:?}", path))?;
    AssemblyCatalog::from_json(&text)
        .with_context(|| format!("Invalid assembly catalog {:?}", path))
}

pub async fn run_server(cli: Cli) -> anyhow::Result<()> {
    let _guard = init(cli.log_level.as_deref())?;

    info!("Starting sharp-lsp server, logging to {:?}", config::log_path());

    let catalog = load_catalog(cli.catalog.as_deref())?;
    info!("Catalog holds {} assemblies", catalog.assemblies().len());

    let engine = LexicalEngine::with_catalog(catalog.clone());
    let snapshot = engine
        .load_workspace(&cli.source)
        .with_context(|| format!("Failed to load workspace {:?}", cli.source))?;
    info!(
        "Loaded {} projects from {:?}",
        snapshot.projects().count(),
        cli.source
    );

    let state = Arc::new(WorkspaceState::new(snapshot));
    let analysis = Arc::new(Analysis::new(
        Arc::new(engine),
        Arc::new(CatalogDecompiler::new(catalog)),
        state,
    ));

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = Backend::service(analysis, Arc::new(ActionRegistry::default()));
    Server::new(stdin, stdout, socket).serve(service).await;

    info!("sharp-lsp server stopped");
    Ok(())
}
