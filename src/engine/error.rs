use std::path::PathBuf;

use thiserror::Error;

use crate::workspace::WorkspaceError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to read workspace at {path:?}: {source}")]
    WorkspaceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workspace root {0:?} is not a directory")]
    NotADirectory(PathBuf),

    #[error("'{0}' is not a valid identifier")]
    InvalidName(String),

    #[error("Symbol '{0}' cannot be renamed: it has no source declaration")]
    NotRenamable(String),

    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

#[derive(Debug, Error)]
pub enum DecompileError {
    #[error("No assembly found for binary {0:?}")]
    AssemblyNotFound(PathBuf),

    #[error("Type {type_name} not found in {assembly}")]
    TypeNotFound { assembly: String, type_name: String },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}
