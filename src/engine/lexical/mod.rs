//! Scanner-based reference engine
//!
//! Resolves names textually: a symbol is identified by its qualified name,
//! and every identifier spelled like it is a reference. Types exposed by
//! referenced assemblies come from an [`AssemblyCatalog`].

pub mod scan;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Url;
use tracing::{debug, info, warn};

use crate::engine::catalog::{AssemblyCatalog, CatalogType};
use crate::engine::error::EngineError;
use crate::engine::{
    CompletionCandidate, DeclarationSite, DeclaredNode, Diagnostic, SemanticEngine, Severity,
    SourceLocation, Symbol, SymbolKind,
};
use crate::workspace::{AssemblyReference, Document, Project, Snapshot};

use scan::{Declaration, Scan, is_identifier, scan};

/// Engine id for a `using` directive no code depends on.
pub const UNNECESSARY_USING: &str = "CS8019";
/// Engine id for a type declared twice in the same namespace.
pub const DUPLICATE_TYPE: &str = "CS0101";

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<Reference\s+Include="([^"]+)"\s*(?:/>|>(.*?)</Reference>)"#).unwrap()
});
static HINT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<HintPath>\s*([^<]+?)\s*</HintPath>").unwrap());
static ASSEMBLY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<AssemblyName>\s*([^<]+?)\s*</AssemblyName>").unwrap());

const SKIPPED_DIRS: &[&str] = &["bin", "obj", "node_modules"];

#[derive(Debug, Clone, Default)]
pub struct LexicalEngine {
    catalog: Arc<AssemblyCatalog>,
}

impl LexicalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: AssemblyCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }

    fn source_symbol(&self, snapshot: &Snapshot, document: &Document, decl: &Declaration) -> Symbol {
        let qualified_name = decl.qualified_name();
        let sites = if decl.kind == SymbolKind::Local {
            vec![self.site(document, decl)]
        } else {
            let mut sites = Vec::new();
            for doc in snapshot.documents() {
                let scan = scan(doc.text());
                sites.extend(
                    scan.declarations
                        .iter()
                        .filter(|d| d.kind != SymbolKind::Local && d.qualified_name() == qualified_name)
                        .map(|d| self.site(doc, d)),
                );
            }
            // Declarations found only in decompiled text live in the binary.
            if sites.is_empty() {
                sites.push(match document.assembly() {
                    Some(assembly) => DeclarationSite::Binary {
                        assembly: assembly.to_string(),
                    },
                    None => self.site(document, decl),
                });
            }
            sites
        };

        Symbol {
            name: decl.name.clone(),
            kind: decl.kind,
            containing_type: decl.containing_type(),
            qualified_name,
            display: decl.signature.clone(),
            documentation: decl.documentation.clone(),
            sites,
        }
    }

    fn site(&self, document: &Document, decl: &Declaration) -> DeclarationSite {
        DeclarationSite::Source(SourceLocation::new(
            document.uri().clone(),
            document.span(decl.name_start, decl.name_end),
        ))
    }

    /// Finds a binary-only symbol named `name` in the assemblies `project`
    /// references.
    fn catalog_symbol(&self, project: Option<&Project>, name: &str) -> Option<Symbol> {
        let project = project?;
        let assemblies = self
            .catalog
            .assemblies()
            .iter()
            .filter(|a| project.reference(&a.name).is_some());

        for assembly in assemblies {
            if let Some(ty) = assembly.types.iter().find(|t| t.name() == name) {
                return Some(type_symbol(&assembly.name, ty));
            }
            for ty in &assembly.types {
                if let Some(member) = ty.members.iter().find(|m| m.name == name) {
                    return Some(Symbol {
                        name: member.name.clone(),
                        kind: member.kind,
                        qualified_name: format!("{}.{}", ty.qualified_name, member.name),
                        containing_type: Some(ty.qualified_name.clone()),
                        display: member.signature.clone(),
                        documentation: String::new(),
                        sites: vec![DeclarationSite::Binary {
                            assembly: assembly.name.clone(),
                        }],
                    });
                }
            }
        }
        None
    }

    fn known_namespaces(&self, snapshot: &Snapshot) -> HashSet<String> {
        let mut namespaces = HashSet::new();
        for doc in snapshot.documents() {
            for decl in scan(doc.text()).declarations {
                let qualified = match decl.kind {
                    SymbolKind::Namespace => decl.qualified_name(),
                    _ => continue,
                };
                // `A.B` also makes `A` importable.
                let mut prefix = String::new();
                for part in qualified.split('.') {
                    if !prefix.is_empty() {
                        prefix.push('.');
                    }
                    prefix.push_str(part);
                    namespaces.insert(prefix.clone());
                }
            }
        }
        namespaces
    }

    fn load_project(&self, csproj: &Path, sources: &[PathBuf]) -> Project {
        let dir = csproj.parent().unwrap_or(Path::new(".")).to_path_buf();
        let name = csproj
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Project".to_string());
        let content = fs::read_to_string(csproj).unwrap_or_else(|e| {
            warn!("Failed to read project file {:?}: {}", csproj, e);
            String::new()
        });

        let assembly_name = ASSEMBLY_NAME
            .captures(&content)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| name.clone());
        let mut project = Project::new(name)
            .with_assembly_name(assembly_name)
            .with_root(&dir);

        for reference in parse_references(&content, &dir) {
            debug!("Project {} references {}", project.name(), reference.name);
            project = project.with_reference(reference);
        }
        add_sources(project, &dir, sources)
    }
}

fn type_symbol(assembly: &str, ty: &CatalogType) -> Symbol {
    let keyword = ty.kind.keyword().unwrap_or("class");
    Symbol {
        name: ty.name().to_string(),
        kind: ty.kind,
        qualified_name: ty.qualified_name.clone(),
        containing_type: None,
        display: format!("{} {}", keyword, ty.qualified_name),
        documentation: String::new(),
        sites: vec![DeclarationSite::Binary {
            assembly: assembly.to_string(),
        }],
    }
}

fn parse_references(content: &str, dir: &Path) -> Vec<AssemblyReference> {
    REFERENCE
        .captures_iter(content)
        .map(|c| {
            let name = c[1].split(',').next().unwrap_or_default().trim().to_string();
            let path = c
                .get(2)
                .and_then(|body| HINT_PATH.captures(body.as_str()))
                .map(|hint| dir.join(hint[1].replace('\\', "/")))
                .unwrap_or_else(|| dir.join(format!("{}.dll", name)));
            AssemblyReference::new(name, path)
        })
        .collect()
}

fn add_sources(mut project: Project, dir: &Path, sources: &[PathBuf]) -> Project {
    for path in sources.iter().filter(|p| p.starts_with(dir)) {
        let Ok(uri) = Url::from_file_path(path) else {
            warn!("Skipping source file with unrepresentable path {:?}", path);
            continue;
        };
        match fs::read_to_string(path) {
            Ok(text) => project = project.with_document(uri, text),
            Err(e) => warn!("Failed to read source file {:?}: {}", path, e),
        }
    }
    project
}

/// Collects `.csproj` and `.cs` files below `dir`.
fn walk(dir: &Path, projects: &mut Vec<PathBuf>, sources: &mut Vec<PathBuf>) -> Result<(), EngineError> {
    let entries = fs::read_dir(dir).map_err(|source| EngineError::WorkspaceIo {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_str()) {
                continue;
            }
            walk(&path, projects, sources)?;
        } else if name.ends_with(".csproj") {
            projects.push(path);
        } else if name.ends_with(".cs") {
            sources.push(path);
        }
    }
    Ok(())
}

/// Replaces every identifier spelled `old` in `text`.
fn replace_identifier(scan: &Scan<'_>, text: &str, old: &str, new: &str) -> Option<String> {
    let hits: Vec<_> = scan.names().filter(|t| t.text == old).collect();
    if hits.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for token in hits {
        out.push_str(&text[last..token.start]);
        out.push_str(new);
        last = token.end;
    }
    out.push_str(&text[last..]);
    Some(out)
}

fn to_nodes(document: &Document, scan: &Scan<'_>, parent: Option<usize>) -> Vec<DeclaredNode> {
    scan.declarations
        .iter()
        .enumerate()
        .filter(|(_, d)| d.parent == parent && d.kind != SymbolKind::Local)
        .map(|(idx, d)| DeclaredNode {
            name: d.name.clone(),
            kind: d.kind,
            span: document.span(d.start, d.end),
            name_span: document.span(d.name_start, d.name_end),
            children: to_nodes(document, scan, Some(idx)),
        })
        .collect()
}

impl SemanticEngine for LexicalEngine {
    fn load_workspace(&self, root: &Path) -> Result<Snapshot, EngineError> {
        if !root.is_dir() {
            return Err(EngineError::NotADirectory(root.to_path_buf()));
        }

        let mut csprojs = Vec::new();
        let mut sources = Vec::new();
        walk(root, &mut csprojs, &mut sources)?;
        csprojs.sort();
        sources.sort();

        let mut snapshot = Snapshot::new();
        if csprojs.is_empty() {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Workspace".to_string());
            let project = add_sources(Project::new(name).with_root(root), root, &sources);
            snapshot = snapshot.with_project(project);
        } else {
            // Each source file belongs to the deepest project directory above it.
            let mut owned: BTreeMap<usize, Vec<PathBuf>> = BTreeMap::new();
            for source in &sources {
                let owner = csprojs
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.parent().is_some_and(|dir| source.starts_with(dir)))
                    .max_by_key(|(_, p)| p.components().count())
                    .map(|(idx, _)| idx);
                match owner {
                    Some(idx) => owned.entry(idx).or_default().push(source.clone()),
                    None => debug!("Source file {:?} belongs to no project", source),
                }
            }
            for (idx, csproj) in csprojs.iter().enumerate() {
                let files = owned.remove(&idx).unwrap_or_default();
                snapshot = snapshot.with_project(self.load_project(csproj, &files));
            }
        }

        info!(
            "Loaded workspace {:?}: {} projects, {} documents",
            root,
            snapshot.projects().count(),
            snapshot.documents().count()
        );
        Ok(snapshot)
    }

    fn symbol_at(&self, snapshot: &Snapshot, document: &Document, offset: usize) -> Option<Symbol> {
        let scan = scan(document.text());
        let token = scan.name_at(offset)?;

        if let Some(decl) = scan.declaration_at(token.start) {
            return Some(self.source_symbol(snapshot, document, decl));
        }

        // Same document first, then the rest of the workspace.
        if let Some(decl) = scan
            .declarations
            .iter()
            .find(|d| d.name == token.text && d.name_start < token.start)
            .or_else(|| scan.declarations.iter().find(|d| d.name == token.text))
        {
            return Some(self.source_symbol(snapshot, document, decl));
        }
        for doc in snapshot.documents().filter(|d| d.uri() != document.uri()) {
            let other = scan::scan(doc.text());
            if let Some(decl) = other
                .declarations
                .iter()
                .find(|d| d.name == token.text && d.kind != SymbolKind::Local)
            {
                return Some(self.source_symbol(snapshot, doc, decl));
            }
        }

        self.catalog_symbol(snapshot.project(document.project()), token.text)
    }

    fn references_of(
        &self,
        snapshot: &Snapshot,
        symbol: &Symbol,
        restrict_to: Option<&HashSet<Url>>,
        cancel: &CancellationToken,
    ) -> Vec<SourceLocation> {
        let local_documents: Option<HashSet<&Url>> = (symbol.kind == SymbolKind::Local)
            .then(|| symbol.source_sites().map(|s| &s.uri).collect());

        snapshot
            .documents()
            .take_while(|_| !cancel.is_cancelled())
            .filter(|doc| restrict_to.is_none_or(|set| set.contains(doc.uri())))
            .filter(|doc| local_documents.as_ref().is_none_or(|set| set.contains(doc.uri())))
            .flat_map(|doc| {
                let scan = scan(doc.text());
                scan.names()
                    .filter(|t| t.text == symbol.name)
                    .map(|t| SourceLocation::new(doc.uri().clone(), doc.span(t.start, t.end)))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn declaration_of(&self, snapshot: &Snapshot, symbol: &Symbol) -> Option<Symbol> {
        if symbol.source_sites().next().is_some() {
            return Some(symbol.clone());
        }
        // A binary symbol may still have source in another project.
        for doc in snapshot.documents() {
            let scan = scan(doc.text());
            if let Some(decl) = scan
                .declarations
                .iter()
                .find(|d| d.kind != SymbolKind::Local && d.qualified_name() == symbol.qualified_name)
            {
                return Some(self.source_symbol(snapshot, doc, decl));
            }
        }
        Some(symbol.clone())
    }

    fn diagnostics_of(&self, snapshot: &Snapshot, document: &Document) -> Vec<Diagnostic> {
        if document.is_metadata() {
            return Vec::new();
        }
        let scan = scan(document.text());
        let mut diagnostics = Vec::new();

        let namespaces = self.known_namespaces(snapshot);
        for using in &scan.usings {
            let known = namespaces.contains(&using.namespace)
                || self.catalog.has_namespace(&using.namespace)
                || using.namespace == "System"
                || using.namespace.starts_with("System.");
            if !known {
                diagnostics.push(Diagnostic {
                    id: UNNECESSARY_USING.to_string(),
                    severity: Severity::Info,
                    span: document.span(using.start, using.end),
                    message: "Unnecessary using directive.".to_string(),
                });
            }
        }

        // First declaration in workspace order wins; later ones are duplicates.
        let mut seen: HashSet<String> = HashSet::new();
        for doc in snapshot.documents() {
            let is_current = doc.uri() == document.uri();
            let doc_scan;
            let decls = if is_current {
                &scan.declarations
            } else {
                doc_scan = scan::scan(doc.text());
                &doc_scan.declarations
            };
            for decl in decls.iter().filter(|d| d.kind.is_type() && !d.is_partial) {
                let qualified = decl.qualified_name();
                if !seen.insert(qualified) && is_current {
                    diagnostics.push(Diagnostic {
                        id: DUPLICATE_TYPE.to_string(),
                        severity: Severity::Error,
                        span: document.span(decl.name_start, decl.name_end),
                        message: format!(
                            "The namespace '{}' already contains a definition for '{}'",
                            decl.namespace.as_deref().unwrap_or("<global namespace>"),
                            decl.name
                        ),
                    });
                }
            }
        }

        diagnostics
    }

    fn completions_at(
        &self,
        snapshot: &Snapshot,
        document: &Document,
        offset: usize,
    ) -> Option<Vec<CompletionCandidate>> {
        if document.is_metadata() {
            return None;
        }
        let text = document.text();
        let offset = offset.min(text.len());
        if !text.is_char_boundary(offset) {
            return None;
        }
        let prefix_start = text[..offset]
            .char_indices()
            .rev()
            .find(|&(_, c)| !(c.is_ascii_alphanumeric() || c == '_'))
            .map_or(0, |(i, c)| i + c.len_utf8());
        let prefix = text[prefix_start..offset].to_ascii_lowercase();

        let mut candidates: BTreeMap<String, CompletionCandidate> = BTreeMap::new();
        let mut offer = |label: &str, kind: SymbolKind, detail: Option<String>| {
            if label.to_ascii_lowercase().starts_with(&prefix) {
                candidates
                    .entry(label.to_string())
                    .or_insert_with(|| CompletionCandidate {
                        label: label.to_string(),
                        kind,
                        detail,
                    });
            }
        };

        for doc in snapshot.documents() {
            let is_current = doc.uri() == document.uri();
            for decl in scan(doc.text()).declarations {
                if decl.kind == SymbolKind::Local && !is_current {
                    continue;
                }
                // Skip the partial word being typed.
                if is_current && decl.name_start == prefix_start {
                    continue;
                }
                offer(&decl.name, decl.kind, Some(decl.signature.clone()));
            }
        }

        if let Some(project) = snapshot.project(document.project()) {
            for assembly in self
                .catalog
                .assemblies()
                .iter()
                .filter(|a| project.reference(&a.name).is_some())
            {
                for ty in &assembly.types {
                    let keyword = ty.kind.keyword().unwrap_or("class");
                    offer(ty.name(), ty.kind, Some(format!("{} {}", keyword, ty.qualified_name)));
                    for member in &ty.members {
                        offer(&member.name, member.kind, Some(member.signature.clone()));
                    }
                }
            }
        }

        Some(candidates.into_values().collect())
    }

    fn rename_symbol(
        &self,
        snapshot: &Snapshot,
        symbol: &Symbol,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, EngineError> {
        if !is_identifier(new_name) {
            return Err(EngineError::InvalidName(new_name.to_string()));
        }
        if symbol.source_sites().next().is_none() {
            return Err(EngineError::NotRenamable(symbol.name.clone()));
        }

        let local_documents: Option<HashSet<&Url>> = (symbol.kind == SymbolKind::Local)
            .then(|| symbol.source_sites().map(|s| &s.uri).collect());

        let mut renamed = snapshot.clone();
        for doc in snapshot.documents() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if local_documents.as_ref().is_some_and(|set| !set.contains(doc.uri())) {
                continue;
            }
            let scan = scan(doc.text());
            if let Some(text) = replace_identifier(&scan, doc.text(), &symbol.name, new_name) {
                renamed = renamed.with_document_text(doc.uri(), text)?;
            }
        }
        Ok(renamed)
    }

    fn compile_reference_for(&self, snapshot: &Snapshot, symbol: &Symbol) -> Option<PathBuf> {
        let assembly = symbol.binary_assembly()?;
        snapshot
            .projects()
            .find_map(|p| p.reference(assembly))
            .map(|r| r.path.clone())
    }

    fn declarations_in(&self, document: &Document) -> Vec<DeclaredNode> {
        let scan = scan(document.text());
        to_nodes(document, &scan, None)
    }

    fn workspace_symbols(&self, snapshot: &Snapshot, query: &str) -> Vec<Symbol> {
        let query = query.to_ascii_lowercase();
        let mut symbols = Vec::new();
        for doc in snapshot.documents() {
            for decl in scan(doc.text()).declarations {
                if decl.kind == SymbolKind::Local
                    || !decl.name.to_ascii_lowercase().contains(&query)
                {
                    continue;
                }
                symbols.push(Symbol {
                    name: decl.name.clone(),
                    kind: decl.kind,
                    qualified_name: decl.qualified_name(),
                    containing_type: decl.containing_type(),
                    display: decl.signature.clone(),
                    documentation: decl.documentation.clone(),
                    sites: vec![self.site(doc, &decl)],
                });
            }
        }
        symbols
    }
}
