use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{DocumentChanges, Position, Url, WorkspaceEdit};
use tracing::{debug, info};

use crate::analysis::Analysis;
use crate::analysis::diff::workspace_edit;
use crate::engine::EngineError;
use crate::workspace::Snapshot;

/// A workspace edit touching no document.
pub fn empty_edit() -> WorkspaceEdit {
    WorkspaceEdit {
        document_changes: Some(DocumentChanges::Edits(Vec::new())),
        ..Default::default()
    }
}

impl Analysis {
    /// Proposes renaming the symbol at `position` to `new_name`.
    ///
    /// The edit is computed against `snapshot`; the workspace itself is left
    /// untouched until the client applies the edit and reports the changes.
    pub fn rename(
        &self,
        snapshot: &Snapshot,
        uri: &Url,
        position: Position,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<WorkspaceEdit, EngineError> {
        let Some(at) = self.find_symbol_at(snapshot, uri, position) else {
            debug!("Nothing to rename at {}:{:?}", uri, position);
            return Ok(empty_edit());
        };

        let renamed = self
            .engine()
            .rename_symbol(snapshot, &at.symbol, new_name, cancel)?;
        let edit = workspace_edit(self.state(), snapshot, &renamed);
        if let Some(DocumentChanges::Edits(edits)) = &edit.document_changes {
            info!(
                "Rename {} -> {} touches {} documents",
                at.symbol.name,
                new_name,
                edits.len()
            );
        }
        Ok(edit)
    }
}
