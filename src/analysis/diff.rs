//! Snapshot diffing into protocol edits

use std::sync::Arc;

use similar::{Algorithm, DiffOp, TextDiff};
use tower_lsp::lsp_types::{
    DocumentChanges, OneOf, OptionalVersionedTextDocumentIdentifier, TextDocumentEdit, TextEdit,
    WorkspaceEdit,
};

use crate::workspace::{Document, Snapshot, WorkspaceState};

/// Byte offset of every char boundary in `text`, including its end.
fn boundaries(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect()
}

/// Minimal edits turning `old`'s text into `new_text`.
///
/// Runs of deletions and insertions with no unchanged text between them
/// collapse into a single replacement.
pub fn text_edits(old: &Document, new_text: &str) -> Vec<TextEdit> {
    let old_text = old.text();
    if old_text == new_text {
        return Vec::new();
    }

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_chars(old_text, new_text);
    let old_bounds = boundaries(old_text);
    let new_bounds = boundaries(new_text);

    let mut edits = Vec::new();
    // (old start, old end, new start, new end) in chars
    let mut pending: Option<(usize, usize, usize, usize)> = None;
    let mut flush = |pending: &mut Option<(usize, usize, usize, usize)>| {
        if let Some((os, oe, ns, ne)) = pending.take() {
            edits.push(TextEdit::new(
                old.span(old_bounds[os], old_bounds[oe]).into(),
                new_text[new_bounds[ns]..new_bounds[ne]].to_string(),
            ));
        }
    };

    for op in diff.ops() {
        let (old_range, new_range) = match *op {
            DiffOp::Equal { .. } => {
                flush(&mut pending);
                continue;
            }
            DiffOp::Delete {
                old_index,
                old_len,
                new_index,
            } => (old_index..old_index + old_len, new_index..new_index),
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => (old_index..old_index, new_index..new_index + new_len),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => (old_index..old_index + old_len, new_index..new_index + new_len),
        };
        pending = Some(match pending {
            Some((os, _, ns, _)) => (os, old_range.end, ns, new_range.end),
            None => (old_range.start, old_range.end, new_range.start, new_range.end),
        });
    }
    flush(&mut pending);
    edits
}

/// Per-document edits between two snapshots, in `old` document order, each
/// tagged with the client's open version when there is one.
pub fn workspace_edit(state: &WorkspaceState, old: &Snapshot, new: &Snapshot) -> WorkspaceEdit {
    let changes = old
        .documents()
        .filter_map(|before| {
            let after = new.document(before.uri())?;
            if Arc::ptr_eq(before, after) {
                return None;
            }
            let edits = text_edits(before, after.text());
            if edits.is_empty() {
                return None;
            }
            Some(TextDocumentEdit {
                text_document: OptionalVersionedTextDocumentIdentifier {
                    uri: before.uri().clone(),
                    version: state.open_version(before.uri()),
                },
                edits: edits.into_iter().map(OneOf::Left).collect(),
            })
        })
        .collect();

    WorkspaceEdit {
        document_changes: Some(DocumentChanges::Edits(changes)),
        ..Default::default()
    }
}
