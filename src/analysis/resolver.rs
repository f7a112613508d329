//! Symbol and location resolution
//!
//! Source-declared symbols resolve to their declaration sites as reported by
//! the engine. Symbols that only exist in a compiled assembly resolve into a
//! virtual document holding the decompiled containing type, at the first
//! declaration named like the symbol or, failing that, at the top of the
//! document.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tower_lsp::lsp_types::{Location, Position, Url};
use tracing::{debug, info, warn};

use crate::analysis::Analysis;
use crate::engine::{DecompileError, Symbol, flatten};
use crate::workspace::{Document, LineSpan, MetadataKey, Snapshot, WorkspaceError};

/// A symbol together with the document it was resolved from.
#[derive(Debug, Clone)]
pub struct SymbolAt {
    pub symbol: Symbol,
    pub document: Arc<Document>,
}

/// No declaration in the decompiled text matched; carries the top-of-file
/// location used instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedFallback(pub Location);

impl UsedFallback {
    pub fn into_location(self) -> Location {
        self.0
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Decompilation is disabled")]
    Disabled,

    #[error("Symbol {0} has no containing type to decompile")]
    NoContainingType(String),

    #[error("No compiled binary found for assembly {0}")]
    NoBinary(String),

    #[error(transparent)]
    Decompile(#[from] DecompileError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

impl Analysis {
    /// Symbol under `position` in the document at `uri`, looked up among real
    /// documents and then metadata documents.
    pub fn find_symbol_at(
        &self,
        snapshot: &Snapshot,
        uri: &Url,
        position: Position,
    ) -> Option<SymbolAt> {
        let document = self.state().document_for_uri(snapshot, uri)?;
        let offset = document.offset(position.into())?;
        let symbol = self.engine().symbol_at(snapshot, &document, offset)?;
        debug!("Resolved {} at {}:{:?}", symbol.qualified_name, uri, position);
        Some(SymbolAt { symbol, document })
    }

    /// Navigable locations of `symbol`. `origin` is the document the symbol
    /// was resolved from; its project scopes the metadata document.
    pub fn resolve_locations(
        &self,
        snapshot: &Snapshot,
        symbol: &Symbol,
        origin: &Document,
    ) -> Vec<Location> {
        if symbol.binary_assembly().is_none() {
            return symbol
                .source_sites()
                .map(|site| Location::new(site.uri.clone(), site.span.into()))
                .collect();
        }

        match self.locate_in_metadata(snapshot, symbol, origin) {
            Ok(Ok(location)) => vec![location],
            Ok(Err(fallback)) => {
                debug!(
                    "No declaration named {} in decompiled source, using top of file",
                    symbol.name
                );
                vec![fallback.into_location()]
            }
            Err(MetadataError::Disabled) => {
                debug!("Decompilation disabled, {} has no location", symbol.qualified_name);
                Vec::new()
            }
            Err(e) => {
                warn!("Failed to resolve metadata for {}: {}", symbol.qualified_name, e);
                Vec::new()
            }
        }
    }

    /// Locates `symbol` inside the decompiled source of its top-level type,
    /// decompiling on first use.
    pub fn locate_in_metadata(
        &self,
        snapshot: &Snapshot,
        symbol: &Symbol,
        origin: &Document,
    ) -> Result<Result<Location, UsedFallback>, MetadataError> {
        let type_name = symbol
            .top_level_type()
            .ok_or_else(|| MetadataError::NoContainingType(symbol.qualified_name.clone()))?;
        let assembly = symbol
            .binary_assembly()
            .ok_or_else(|| MetadataError::NoBinary(symbol.qualified_name.clone()))?;
        let key = MetadataKey::new(origin.project(), assembly, type_name);

        let document = self.metadata_document(&key, || {
            self.engine().compile_reference_for(snapshot, symbol)
        })?;

        let declarations = self.engine().declarations_in(&document);
        let found = flatten(&declarations)
            .into_iter()
            .find(|node| node.name == symbol.name)
            .map(|node| node.name_span);

        Ok(match found {
            Some(span) => Ok(Location::new(document.uri().clone(), span.into())),
            None => Err(UsedFallback(Location::new(
                document.uri().clone(),
                LineSpan::document_start().into(),
            ))),
        })
    }

    /// Cached metadata document for `key`, decompiling the binary found by
    /// `binary_path` on a miss.
    pub fn metadata_document(
        &self,
        key: &MetadataKey,
        binary_path: impl FnOnce() -> Option<PathBuf>,
    ) -> Result<Arc<Document>, MetadataError> {
        let cache = self.state().metadata();
        if let Some(document) = cache.get(&key.uri()?) {
            return Ok(document);
        }
        if !self.decompilation_enabled() {
            return Err(MetadataError::Disabled);
        }

        cache.get_or_insert_with(key, || {
            let path = binary_path().ok_or_else(|| MetadataError::NoBinary(key.assembly.clone()))?;
            info!("Decompiling {} from {:?}", key.type_name, path);
            Ok(self.decompiler.decompile_type(&path, &key.type_name)?)
        })
    }

    /// Decompiled source of a type as seen from a project, for clients
    /// opening metadata documents directly. Returns the display name and
    /// text.
    pub fn metadata_source(
        &self,
        snapshot: &Snapshot,
        project: &str,
        assembly: &str,
        type_name: &str,
    ) -> Option<(String, Arc<Document>)> {
        let key = MetadataKey::new(project, assembly, type_name);
        let binary_path = || {
            snapshot
                .project(project)
                .and_then(|p| p.reference(assembly))
                .map(|r| r.path.clone())
        };
        match self.metadata_document(&key, binary_path) {
            Ok(document) => Some((key.source_name(), document)),
            Err(e) => {
                debug!("No metadata source for {}/{}/{}: {}", project, assembly, type_name, e);
                None
            }
        }
    }
}
