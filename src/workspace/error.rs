use thiserror::Error;
use tower_lsp::lsp_types::Url;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Document not found in workspace: {0}")]
    DocumentNotFound(Url),

    #[error("Project not found in workspace: {0}")]
    ProjectNotFound(String),

    #[error("Failed to build metadata URI: {0}")]
    InvalidMetadataUri(String),
}
