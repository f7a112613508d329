//! Semantic engine adapter layer
//! - SemanticEngine: the analysis capabilities the server coordinates
//! - Decompiler: turns a binary-only type into source text
//! - lexical.rs: a scanner-based reference engine
//! - catalog.rs: in-memory assembly catalog and its decompiler

pub mod catalog;
pub mod error;
pub mod lexical;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{self as lsp, DiagnosticSeverity, NumberOrString, Url};

use crate::workspace::{Document, LineSpan, Snapshot};

pub use catalog::{AssemblyCatalog, CatalogAssembly, CatalogDecompiler, CatalogMember, CatalogType};
pub use error::{DecompileError, EngineError};
pub use lexical::LexicalEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Namespace,
    Class,
    Struct,
    Interface,
    Enum,
    Record,
    Method,
    Property,
    Field,
    Local,
}

impl SymbolKind {
    pub fn is_type(self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Struct
                | SymbolKind::Interface
                | SymbolKind::Enum
                | SymbolKind::Record
        )
    }

    /// Keyword introducing a declaration of this kind, when there is one.
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            SymbolKind::Namespace => Some("namespace"),
            SymbolKind::Class => Some("class"),
            SymbolKind::Struct => Some("struct"),
            SymbolKind::Interface => Some("interface"),
            SymbolKind::Enum => Some("enum"),
            SymbolKind::Record => Some("record"),
            _ => None,
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "namespace" => Some(SymbolKind::Namespace),
            "class" => Some(SymbolKind::Class),
            "struct" => Some(SymbolKind::Struct),
            "interface" => Some(SymbolKind::Interface),
            "enum" => Some(SymbolKind::Enum),
            "record" => Some(SymbolKind::Record),
            _ => None,
        }
    }
}

/// A span inside a real or virtual document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub uri: Url,
    pub span: LineSpan,
}

impl SourceLocation {
    pub fn new(uri: Url, span: LineSpan) -> Self {
        Self { uri, span }
    }
}

/// Where a symbol is declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationSite {
    Source(SourceLocation),
    /// Declared in a compiled assembly with no source available.
    Binary { assembly: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Fully qualified name, e.g. `Ns.Bar.Baz`.
    pub qualified_name: String,
    /// Fully qualified name of the outermost type enclosing this symbol.
    pub containing_type: Option<String>,
    /// One-line signature shown on hover.
    pub display: String,
    pub documentation: String,
    pub sites: Vec<DeclarationSite>,
}

impl Symbol {
    /// The top-level type to decompile when this symbol only exists in
    /// metadata: the enclosing type, or the symbol itself if it is a type.
    pub fn top_level_type(&self) -> Option<&str> {
        self.containing_type.as_deref().or_else(|| {
            self.kind
                .is_type()
                .then_some(self.qualified_name.as_str())
        })
    }

    pub fn source_sites(&self) -> impl Iterator<Item = &SourceLocation> {
        self.sites.iter().filter_map(|site| match site {
            DeclarationSite::Source(location) => Some(location),
            DeclarationSite::Binary { .. } => None,
        })
    }

    /// Name of the first assembly this symbol is declared in, if any site is
    /// binary-backed.
    pub fn binary_assembly(&self) -> Option<&str> {
        self.sites.iter().find_map(|site| match site {
            DeclarationSite::Binary { assembly } => Some(assembly.as_str()),
            DeclarationSite::Source(_) => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Hidden,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// `None` for hidden diagnostics, which clients never see.
    pub fn to_lsp(self) -> Option<DiagnosticSeverity> {
        match self {
            Severity::Hidden => None,
            Severity::Info => Some(DiagnosticSeverity::INFORMATION),
            Severity::Warning => Some(DiagnosticSeverity::WARNING),
            Severity::Error => Some(DiagnosticSeverity::ERROR),
        }
    }
}

/// `source` of every diagnostic sent to clients.
pub const DIAGNOSTIC_SOURCE: &str = "sharp-lsp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Engine identifier such as `CS8019`.
    pub id: String,
    pub severity: Severity,
    pub span: LineSpan,
    pub message: String,
}

impl Diagnostic {
    pub fn to_lsp(&self) -> Option<lsp::Diagnostic> {
        let severity = self.severity.to_lsp()?;
        Some(lsp::Diagnostic {
            range: self.span.into(),
            severity: Some(severity),
            code: Some(NumberOrString::String(self.id.clone())),
            source: Some(DIAGNOSTIC_SOURCE.to_string()),
            message: self.message.clone(),
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCandidate {
    pub label: String,
    pub kind: SymbolKind,
    pub detail: Option<String>,
}

/// A named syntax node, as used for outlines and for locating members in
/// decompiled text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredNode {
    pub name: String,
    pub kind: SymbolKind,
    pub span: LineSpan,
    pub name_span: LineSpan,
    pub children: Vec<DeclaredNode>,
}

impl DeclaredNode {
    /// Visits this node and its descendants in document order.
    pub fn walk<'a>(&'a self, out: &mut Vec<&'a DeclaredNode>) {
        out.push(self);
        for child in &self.children {
            child.walk(out);
        }
    }
}

/// Flattens a forest of nodes into document order.
pub fn flatten(nodes: &[DeclaredNode]) -> Vec<&DeclaredNode> {
    let mut out = Vec::new();
    for node in nodes {
        node.walk(&mut out);
    }
    out
}

/// Analysis capabilities the server coordinates.
///
/// Implementations are synchronous and may be slow; callers run them on
/// blocking workers against a captured snapshot.
pub trait SemanticEngine: Send + Sync {
    /// Builds the initial snapshot for a project root.
    fn load_workspace(&self, root: &Path) -> Result<Snapshot, EngineError>;

    /// Symbol covering the byte `offset` of `document`.
    fn symbol_at(&self, snapshot: &Snapshot, document: &Document, offset: usize) -> Option<Symbol>;

    /// All reference sites of `symbol`, optionally limited to some documents.
    /// Stops early once `cancel` fires; the partial result is then meaningless.
    fn references_of(
        &self,
        snapshot: &Snapshot,
        symbol: &Symbol,
        restrict_to: Option<&HashSet<Url>>,
        cancel: &CancellationToken,
    ) -> Vec<SourceLocation>;

    /// Source definition of `symbol`, which may differ from the symbol itself.
    fn declaration_of(&self, snapshot: &Snapshot, symbol: &Symbol) -> Option<Symbol>;

    fn diagnostics_of(&self, snapshot: &Snapshot, document: &Document) -> Vec<Diagnostic>;

    /// `None` when no completion service exists for this kind of document.
    fn completions_at(
        &self,
        snapshot: &Snapshot,
        document: &Document,
        offset: usize,
    ) -> Option<Vec<CompletionCandidate>>;

    /// Produces a new snapshot with `symbol` renamed everywhere.
    fn rename_symbol(
        &self,
        snapshot: &Snapshot,
        symbol: &Symbol,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, EngineError>;

    /// Path of the compiled binary declaring `symbol`.
    fn compile_reference_for(&self, snapshot: &Snapshot, symbol: &Symbol) -> Option<PathBuf>;

    /// Named declarations of a document, nested by containment.
    fn declarations_in(&self, document: &Document) -> Vec<DeclaredNode>;

    fn workspace_symbols(&self, snapshot: &Snapshot, query: &str) -> Vec<Symbol>;
}

/// Reconstructs readable source for a type found only in a compiled binary.
/// Must be deterministic in its inputs.
#[cfg_attr(test, mockall::automock)]
pub trait Decompiler: Send + Sync {
    fn decompile_type(&self, binary_path: &Path, type_name: &str) -> Result<String, DecompileError>;
}
