//! Immutable workspace snapshots
//!
//! A [`Snapshot`] is never modified after construction. Every edit derives a
//! new snapshot that shares the untouched documents with its parent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use tower_lsp::lsp_types::Url;

use crate::workspace::error::WorkspaceError;
use crate::workspace::text::{LineIndex, LinePosition, LineSpan};

/// Name of the project that hosts documents opened outside any known project.
pub const MISCELLANEOUS_PROJECT: &str = "MiscellaneousFiles";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOrigin {
    /// Backed by a file (or buffer) that belongs to a project.
    Source,
    /// Decompiled text for a type that only exists in a compiled binary.
    Metadata,
}

#[derive(Debug, Clone)]
pub struct Document {
    uri: Url,
    path: Option<PathBuf>,
    project: String,
    text: Arc<str>,
    line_index: Arc<LineIndex>,
    origin: DocumentOrigin,
    assembly: Option<String>,
}

impl Document {
    pub fn new(uri: Url, project: impl Into<String>, text: impl Into<Arc<str>>) -> Self {
        Self::with_origin(uri, project.into(), text.into(), DocumentOrigin::Source)
    }

    /// A read-only document holding decompiled source from `assembly`.
    pub fn metadata(
        uri: Url,
        project: impl Into<String>,
        assembly: impl Into<String>,
        text: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            assembly: Some(assembly.into()),
            ..Self::with_origin(uri, project.into(), text.into(), DocumentOrigin::Metadata)
        }
    }

    fn with_origin(uri: Url, project: String, text: Arc<str>, origin: DocumentOrigin) -> Self {
        let path = match origin {
            DocumentOrigin::Source => uri.to_file_path().ok(),
            DocumentOrigin::Metadata => None,
        };
        let line_index = Arc::new(LineIndex::new(&text));
        Self {
            uri,
            path,
            project,
            text,
            line_index,
            origin,
            assembly: None,
        }
    }

    /// Returns a copy of this document holding `text`.
    pub fn with_text(&self, text: impl Into<Arc<str>>) -> Self {
        Self::with_origin(self.uri.clone(), self.project.clone(), text.into(), self.origin)
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> DocumentOrigin {
        self.origin
    }

    /// Assembly a metadata document was decompiled from.
    pub fn assembly(&self) -> Option<&str> {
        self.assembly.as_deref()
    }

    pub fn is_metadata(&self) -> bool {
        self.origin == DocumentOrigin::Metadata
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }

    pub fn offset(&self, pos: LinePosition) -> Option<usize> {
        self.line_index.offset(&self.text, pos)
    }

    pub fn position(&self, offset: usize) -> LinePosition {
        self.line_index.position(&self.text, offset)
    }

    pub fn span(&self, start: usize, end: usize) -> LineSpan {
        self.line_index.span(&self.text, start, end)
    }

    /// Byte range covered by `span`, or `None` if it lies outside the text.
    pub fn byte_range(&self, span: LineSpan) -> Option<std::ops::Range<usize>> {
        let start = self.offset(span.start)?;
        let end = self.offset(span.end)?;
        Some(start.min(end)..start.max(end))
    }

    /// Whether this document lives at `uri`, comparing filesystem paths when
    /// both sides have one.
    pub fn matches(&self, uri: &Url) -> bool {
        match (&self.path, uri.to_file_path().ok()) {
            (Some(path), Some(other)) => *path == other,
            _ => self.uri == *uri,
        }
    }
}

/// A compiled assembly a project references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyReference {
    pub name: String,
    pub path: PathBuf,
}

impl AssemblyReference {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Project {
    name: String,
    assembly_name: String,
    root: Option<PathBuf>,
    documents: IndexMap<Url, Arc<Document>>,
    references: Vec<AssemblyReference>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            assembly_name: name.clone(),
            name,
            root: None,
            documents: IndexMap::new(),
            references: Vec::new(),
        }
    }

    pub fn with_assembly_name(mut self, assembly_name: impl Into<String>) -> Self {
        self.assembly_name = assembly_name.into();
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_reference(mut self, reference: AssemblyReference) -> Self {
        self.references.push(reference);
        self
    }

    /// Adds a source document owned by this project.
    pub fn with_document(mut self, uri: Url, text: impl Into<Arc<str>>) -> Self {
        let document = Document::new(uri.clone(), self.name.clone(), text);
        self.documents.insert(uri, Arc::new(document));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assembly_name(&self) -> &str {
        &self.assembly_name
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn documents(&self) -> impl Iterator<Item = &Arc<Document>> {
        self.documents.values()
    }

    pub fn references(&self) -> &[AssemblyReference] {
        &self.references
    }

    pub fn reference(&self, assembly_name: &str) -> Option<&AssemblyReference> {
        self.references.iter().find(|r| r.name == assembly_name)
    }

    /// Whether a file at `path` falls under this project's root directory.
    pub fn contains_path(&self, path: &Path) -> bool {
        self.root.as_deref().is_some_and(|root| path.starts_with(root))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    version: u64,
    projects: IndexMap<String, Project>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: Project) -> Self {
        self.projects.insert(project.name.clone(), project);
        self
    }

    /// Internal version, bumped for every derived snapshot. Unrelated to the
    /// client's document versions.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.get(name)
    }

    /// All real documents, in project then insertion order.
    pub fn documents(&self) -> impl Iterator<Item = &Arc<Document>> {
        self.projects.values().flat_map(|p| p.documents.values())
    }

    /// Finds a real document by URI or filesystem path.
    pub fn document(&self, uri: &Url) -> Option<&Arc<Document>> {
        self.projects
            .values()
            .find_map(|p| p.documents.get(uri))
            .or_else(|| self.documents().find(|doc| doc.matches(uri)))
    }

    /// Derives a snapshot where the document at `uri` holds `text`.
    pub fn with_document_text(
        &self,
        uri: &Url,
        text: impl Into<Arc<str>>,
    ) -> Result<Snapshot, WorkspaceError> {
        let existing = self
            .document(uri)
            .ok_or_else(|| WorkspaceError::DocumentNotFound(uri.clone()))?;
        let project_name = existing.project().to_string();
        let key = existing.uri().clone();
        let updated = Arc::new(existing.with_text(text));

        let mut next = self.derive();
        let project = next
            .projects
            .get_mut(&project_name)
            .ok_or_else(|| WorkspaceError::ProjectNotFound(project_name.clone()))?;
        project.documents.insert(key, updated);
        Ok(next)
    }

    /// Derives a snapshot with a new document, placed in the project whose
    /// root contains the file or in the miscellaneous project otherwise.
    pub fn with_added_document(&self, uri: &Url, text: impl Into<Arc<str>>) -> Snapshot {
        let path = uri.to_file_path().ok();
        let project_name = path
            .as_deref()
            .and_then(|path| {
                self.projects
                    .values()
                    .filter(|p| p.contains_path(path))
                    .max_by_key(|p| p.root().map_or(0, |r| r.components().count()))
            })
            .map_or_else(|| MISCELLANEOUS_PROJECT.to_string(), |p| p.name.clone());

        let mut next = self.derive();
        let project = next
            .projects
            .entry(project_name.clone())
            .or_insert_with(|| Project::new(project_name));
        let document = Document::new(uri.clone(), project.name.clone(), text);
        project.documents.insert(uri.clone(), Arc::new(document));
        next
    }

    /// Derives a snapshot without the miscellaneous document at `uri`.
    /// Project documents are left in place.
    pub fn without_miscellaneous_document(&self, uri: &Url) -> Option<Snapshot> {
        let misc = self.projects.get(MISCELLANEOUS_PROJECT)?;
        if !misc.documents.contains_key(uri) {
            return None;
        }

        let mut next = self.derive();
        if let Some(project) = next.projects.get_mut(MISCELLANEOUS_PROJECT) {
            project.documents.shift_remove(uri);
            if project.documents.is_empty() {
                next.projects.shift_remove(MISCELLANEOUS_PROJECT);
            }
        }
        Some(next)
    }

    fn derive(&self) -> Snapshot {
        Snapshot {
            version: self.version + 1,
            projects: self.projects.clone(),
        }
    }
}
