//! Virtual documents holding decompiled source for binary-only types
//!
//! URIs are derived from (project, assembly, type) alone, so resolving the
//! same type twice always lands on the same cache entry.

use std::sync::Arc;

use dashmap::DashMap;
use tower_lsp::lsp_types::Url;
use tracing::debug;

use crate::config::METADATA_SCHEME;
use crate::workspace::error::WorkspaceError;
use crate::workspace::snapshot::Document;

/// Identifies one decompiled type as seen from one project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataKey {
    pub project: String,
    pub assembly: String,
    pub type_name: String,
}

impl MetadataKey {
    pub fn new(
        project: impl Into<String>,
        assembly: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            assembly: assembly.into(),
            type_name: type_name.into(),
        }
    }

    /// `metadata:///Project/{p}/Assembly/{a}/Symbol/{Ns}/{Type}.cs`
    pub fn uri(&self) -> Result<Url, WorkspaceError> {
        let mut url = Url::parse(&format!("{}:///", METADATA_SCHEME))
            .map_err(|e| WorkspaceError::InvalidMetadataUri(e.to_string()))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                WorkspaceError::InvalidMetadataUri(format!("{} cannot be a base", METADATA_SCHEME))
            })?;
            segments.clear();
            segments.extend([
                "Project",
                self.project.as_str(),
                "Assembly",
                self.assembly.as_str(),
                "Symbol",
            ]);
            let mut parts = self.type_name.split('.').peekable();
            while let Some(part) = parts.next() {
                if parts.peek().is_some() {
                    segments.push(part);
                } else {
                    segments.push(&format!("{}.cs", part));
                }
            }
        }
        Ok(url)
    }

    /// Human-readable name reported to clients alongside the source text.
    pub fn source_name(&self) -> String {
        format!(
            "$metadata$/Project/{}/Assembly/{}/Symbol/{}.cs",
            self.project,
            self.assembly,
            self.type_name.replace('.', "/")
        )
    }
}

/// Process-lifetime, append-only cache of virtual metadata documents.
///
/// Entries are never evicted.
#[derive(Debug, Default)]
pub struct MetadataCache {
    documents: DashMap<Url, Arc<Document>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &Url) -> Option<Arc<Document>> {
        self.documents.get(uri).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Returns the cached document for `key`, producing its text with
    /// `decompile` on a miss.
    ///
    /// `decompile` runs without holding any lock. When two callers race on the
    /// same key both may decompile, but the first stored document is the one
    /// every caller gets back.
    pub fn get_or_insert_with<E>(
        &self,
        key: &MetadataKey,
        decompile: impl FnOnce() -> Result<String, E>,
    ) -> Result<Arc<Document>, E>
    where
        E: From<WorkspaceError>,
    {
        let uri = key.uri()?;
        if let Some(document) = self.get(&uri) {
            debug!("Metadata cache hit for {}", uri);
            return Ok(document);
        }

        let text = decompile()?;
        let document = Arc::new(Document::metadata(
            uri.clone(),
            key.project.clone(),
            key.assembly.clone(),
            text,
        ));
        let stored = Arc::clone(self.documents.entry(uri.clone()).or_insert(document).value());
        debug!(
            "Metadata document registered at {} ({} cached)",
            uri,
            self.documents.len()
        );
        Ok(stored)
    }
}
