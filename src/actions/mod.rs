//! Code action aggregation
//! - ActionProvider: one trait for refactoring and fix providers
//! - aliases.rs: diagnostic id translation table
//! - providers.rs: built-in providers
//!
//! Refactorings run against the requested span. Fix providers run once per
//! visible diagnostic intersecting the span that they can fix. A failing
//! provider only loses its own actions.

pub mod aliases;
pub mod providers;

use std::sync::Arc;

use thiserror::Error;
use tower_lsp::lsp_types::{CodeAction, CodeActionKind, CodeActionOrCommand, Url};
use tracing::{debug, warn};

use crate::analysis::diff::workspace_edit;
use crate::engine::{Diagnostic, SemanticEngine, Severity};
use crate::workspace::{Document, LineSpan, Snapshot, WorkspaceError, WorkspaceState};

pub use aliases::FixIdAliases;
pub use providers::{RemoveUnnecessaryImports, SortImports};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Span {0:?} does not map into the document")]
    InvalidSpan(LineSpan),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

/// What a provider sees for one invocation.
#[derive(Clone, Copy)]
pub struct ActionContext<'a> {
    pub engine: &'a dyn SemanticEngine,
    pub snapshot: &'a Snapshot,
    pub document: &'a Document,
    pub span: LineSpan,
    /// The diagnostic being fixed; `None` for refactorings.
    pub diagnostic: Option<&'a Diagnostic>,
}

/// Full replacement text for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub uri: Url,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCandidate {
    pub title: String,
    pub kind: CodeActionKind,
    pub changes: Vec<DocumentChange>,
}

/// A candidate with the provider and diagnostic it came from.
#[derive(Debug, Clone)]
pub struct CollectedAction {
    pub provider: &'static str,
    pub diagnostic: Option<Diagnostic>,
    pub candidate: ActionCandidate,
}

pub trait ActionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Diagnostic ids this provider fixes. Empty for refactorings.
    fn fixable_diagnostic_ids(&self) -> &[&'static str] {
        &[]
    }

    fn compute(&self, context: &ActionContext<'_>) -> Result<Vec<ActionCandidate>, ProviderError>;
}

/// Spans intersect when they overlap or touch.
pub fn intersects(a: LineSpan, b: LineSpan) -> bool {
    a.start <= b.end && b.start <= a.end
}

#[derive(Clone)]
pub struct ActionRegistry {
    refactorings: Vec<Arc<dyn ActionProvider>>,
    fixes: Vec<Arc<dyn ActionProvider>>,
    aliases: FixIdAliases,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
            .with_refactoring(Arc::new(SortImports))
            .with_fix(Arc::new(RemoveUnnecessaryImports))
    }
}

impl ActionRegistry {
    /// A registry without providers, using the default alias table.
    pub fn new() -> Self {
        Self {
            refactorings: Vec::new(),
            fixes: Vec::new(),
            aliases: FixIdAliases::default(),
        }
    }

    pub fn with_refactoring(mut self, provider: Arc<dyn ActionProvider>) -> Self {
        self.refactorings.push(provider);
        self
    }

    pub fn with_fix(mut self, provider: Arc<dyn ActionProvider>) -> Self {
        self.fixes.push(provider);
        self
    }

    pub fn with_aliases(mut self, aliases: FixIdAliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// Runs every provider for `span` and collects their candidates in
    /// registration order.
    pub fn collect(
        &self,
        engine: &dyn SemanticEngine,
        snapshot: &Snapshot,
        document: &Document,
        span: LineSpan,
    ) -> Vec<CollectedAction> {
        let base = ActionContext {
            engine,
            snapshot,
            document,
            span,
            diagnostic: None,
        };
        let mut collected = Vec::new();

        for provider in &self.refactorings {
            match provider.compute(&base) {
                Ok(candidates) => collected.extend(candidates.into_iter().map(|candidate| {
                    CollectedAction {
                        provider: provider.name(),
                        diagnostic: None,
                        candidate,
                    }
                })),
                Err(e) => warn!("Refactoring provider {} failed: {}", provider.name(), e),
            }
        }

        let diagnostics: Vec<Diagnostic> = engine
            .diagnostics_of(snapshot, document)
            .into_iter()
            .filter(|d| d.severity != Severity::Hidden && intersects(d.span, span))
            .collect();
        if diagnostics.is_empty() {
            return collected;
        }

        for provider in &self.fixes {
            for diagnostic in &diagnostics {
                if !self
                    .aliases
                    .is_eligible(provider.fixable_diagnostic_ids(), &diagnostic.id)
                {
                    continue;
                }
                let context = ActionContext {
                    diagnostic: Some(diagnostic),
                    ..base
                };
                match provider.compute(&context) {
                    Ok(candidates) => collected.extend(candidates.into_iter().map(|candidate| {
                        CollectedAction {
                            provider: provider.name(),
                            diagnostic: Some(diagnostic.clone()),
                            candidate,
                        }
                    })),
                    Err(e) => warn!(
                        "Fix provider {} failed for {}: {}",
                        provider.name(),
                        diagnostic.id,
                        e
                    ),
                }
            }
        }
        collected
    }

    /// Collects and translates actions into protocol code actions. Actions
    /// whose changes cannot be applied to `snapshot` are dropped.
    pub fn code_actions(
        &self,
        engine: &dyn SemanticEngine,
        state: &WorkspaceState,
        snapshot: &Snapshot,
        document: &Document,
        span: LineSpan,
    ) -> Vec<CodeActionOrCommand> {
        let collected = self.collect(engine, snapshot, document, span);
        debug!("{} code action candidates for {}", collected.len(), document.uri());

        collected
            .into_iter()
            .filter_map(|action| {
                let provider = action.provider;
                translate(state, snapshot, action)
                    .inspect_err(|e| warn!("Dropping action from {}: {}", provider, e))
                    .ok()
            })
            .map(CodeActionOrCommand::CodeAction)
            .collect()
    }
}

fn translate(
    state: &WorkspaceState,
    snapshot: &Snapshot,
    action: CollectedAction,
) -> Result<CodeAction, WorkspaceError> {
    let mut changed = snapshot.clone();
    for change in &action.candidate.changes {
        changed = changed.with_document_text(&change.uri, change.text.as_str())?;
    }

    Ok(CodeAction {
        title: action.candidate.title,
        kind: Some(action.candidate.kind),
        diagnostics: action
            .diagnostic
            .as_ref()
            .and_then(Diagnostic::to_lsp)
            .map(|d| vec![d]),
        edit: Some(workspace_edit(state, snapshot, &changed)),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;
    use tower_lsp::lsp_types::{DocumentChanges, Position};

    use super::*;
    use crate::engine::LexicalEngine;
    use crate::workspace::{LinePosition, Project};

    fn url(path: &str) -> Url {
        Url::parse(&format!("file://{}", path)).unwrap()
    }

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> LineSpan {
        LineSpan::new(LinePosition::new(sl, sc), LinePosition::new(el, ec))
    }

    /// Engine double reporting a fixed set of diagnostics.
    struct Diagnostics(Vec<Diagnostic>);

    impl Diagnostics {
        fn one(id: &str, severity: Severity, at: LineSpan) -> Self {
            Self(vec![Diagnostic {
                id: id.to_string(),
                severity,
                span: at,
                message: format!("{} here", id),
            }])
        }
    }

    impl SemanticEngine for Diagnostics {
        fn load_workspace(&self, root: &std::path::Path) -> Result<Snapshot, crate::engine::EngineError> {
            LexicalEngine::new().load_workspace(root)
        }
        fn symbol_at(&self, _: &Snapshot, _: &Document, _: usize) -> Option<crate::engine::Symbol> {
            None
        }
        fn references_of(
            &self,
            _: &Snapshot,
            _: &crate::engine::Symbol,
            _: Option<&std::collections::HashSet<Url>>,
            _: &CancellationToken,
        ) -> Vec<crate::engine::SourceLocation> {
            Vec::new()
        }
        fn declaration_of(&self, _: &Snapshot, _: &crate::engine::Symbol) -> Option<crate::engine::Symbol> {
            None
        }
        fn diagnostics_of(&self, _: &Snapshot, _: &Document) -> Vec<Diagnostic> {
            self.0.clone()
        }
        fn completions_at(
            &self,
            _: &Snapshot,
            _: &Document,
            _: usize,
        ) -> Option<Vec<crate::engine::CompletionCandidate>> {
            None
        }
        fn rename_symbol(
            &self,
            snapshot: &Snapshot,
            _: &crate::engine::Symbol,
            _: &str,
            _: &CancellationToken,
        ) -> Result<Snapshot, crate::engine::EngineError> {
            Ok(snapshot.clone())
        }
        fn compile_reference_for(&self, _: &Snapshot, _: &crate::engine::Symbol) -> Option<std::path::PathBuf> {
            None
        }
        fn declarations_in(&self, _: &Document) -> Vec<crate::engine::DeclaredNode> {
            Vec::new()
        }
        fn workspace_symbols(&self, _: &Snapshot, _: &str) -> Vec<crate::engine::Symbol> {
            Vec::new()
        }
    }

    /// Records which diagnostics it was invoked for.
    struct Recording {
        name: &'static str,
        fixes: &'static [&'static str],
        seen: Mutex<Vec<Option<String>>>,
        result: fn(&ActionContext<'_>) -> Result<Vec<ActionCandidate>, ProviderError>,
    }

    impl Recording {
        fn new(name: &'static str, fixes: &'static [&'static str]) -> Self {
            Self {
                name,
                fixes,
                seen: Mutex::new(Vec::new()),
                result: |context| {
                    Ok(vec![ActionCandidate {
                        title: format!(
                            "fix {}",
                            context.diagnostic.map_or("span", |d| d.id.as_str())
                        ),
                        kind: CodeActionKind::QUICKFIX,
                        changes: Vec::new(),
                    }])
                },
            }
        }

        fn failing(name: &'static str, fixes: &'static [&'static str]) -> Self {
            Self {
                result: |_| Err(ProviderError::Failed("boom".to_string())),
                ..Self::new(name, fixes)
            }
        }

        fn seen(&self) -> Vec<Option<String>> {
            self.seen.lock().clone()
        }
    }

    impl ActionProvider for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn fixable_diagnostic_ids(&self) -> &[&'static str] {
            self.fixes
        }

        fn compute(&self, context: &ActionContext<'_>) -> Result<Vec<ActionCandidate>, ProviderError> {
            self.seen
                .lock()
                .push(context.diagnostic.map(|d| d.id.clone()));
            (self.result)(context)
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot::new().with_project(
            Project::new("App").with_document(url("/app/A.cs"), "using Gone;\nclass Foo {}\n"),
        )
    }

    #[test]
    fn hidden_diagnostics_never_reach_fix_providers() {
        let engine = Diagnostics::one("IDE0005", Severity::Hidden, span(0, 0, 0, 11));
        let refactoring = Arc::new(Recording::new("refactor", &[]));
        let fix = Arc::new(Recording::new("fix", &["IDE0005"]));
        let registry = ActionRegistry::new()
            .with_refactoring(refactoring.clone())
            .with_fix(fix.clone());
        let snapshot = snapshot();
        let document = snapshot.document(&url("/app/A.cs")).unwrap();

        let collected = registry.collect(&engine, &snapshot, document, span(0, 0, 0, 5));

        assert_eq!(refactoring.seen(), vec![None]);
        assert!(fix.seen().is_empty());
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].provider, "refactor");
    }

    #[test]
    fn aliased_diagnostic_reaches_providers_of_either_id() {
        let engine = Diagnostics::one("CS8019", Severity::Info, span(0, 0, 0, 11));
        let by_alias = Arc::new(Recording::new("by-alias", &["IDE0005"]));
        let by_id = Arc::new(Recording::new("by-id", &["CS8019"]));
        let neither = Arc::new(Recording::new("neither", &["CS0101"]));
        let registry = ActionRegistry::new()
            .with_fix(by_alias.clone())
            .with_fix(by_id.clone())
            .with_fix(neither.clone());
        let snapshot = snapshot();
        let document = snapshot.document(&url("/app/A.cs")).unwrap();

        let collected = registry.collect(&engine, &snapshot, document, span(0, 3, 0, 3));

        assert_eq!(by_alias.seen(), vec![Some("CS8019".to_string())]);
        assert_eq!(by_id.seen(), vec![Some("CS8019".to_string())]);
        assert!(neither.seen().is_empty());
        let providers: Vec<_> = collected.iter().map(|c| c.provider).collect();
        assert_eq!(providers, vec!["by-alias", "by-id"]);
        assert_eq!(collected[0].diagnostic.as_ref().unwrap().id, "CS8019");
    }

    #[test]
    fn touching_spans_intersect() {
        assert!(intersects(span(0, 0, 0, 11), span(0, 11, 0, 11)));
        assert!(intersects(span(1, 0, 1, 4), span(0, 2, 1, 0)));
        assert!(!intersects(span(0, 0, 0, 11), span(1, 0, 1, 1)));
    }

    #[test]
    fn diagnostics_outside_span_are_not_offered() {
        let engine = Diagnostics::one("IDE0005", Severity::Warning, span(0, 0, 0, 11));
        let fix = Arc::new(Recording::new("fix", &["IDE0005"]));
        let registry = ActionRegistry::new().with_fix(fix.clone());
        let snapshot = snapshot();
        let document = snapshot.document(&url("/app/A.cs")).unwrap();

        registry.collect(&engine, &snapshot, document, span(1, 0, 1, 3));
        assert!(fix.seen().is_empty());
    }

    #[test]
    fn failing_provider_does_not_block_others() {
        let engine = Diagnostics(vec![
            Diagnostic {
                id: "IDE0005".to_string(),
                severity: Severity::Warning,
                span: span(0, 0, 0, 11),
                message: "first".to_string(),
            },
            Diagnostic {
                id: "IDE0005".to_string(),
                severity: Severity::Error,
                span: span(0, 6, 0, 10),
                message: "second".to_string(),
            },
        ]);
        let broken_refactoring = Arc::new(Recording::failing("broken-refactor", &[]));
        let broken = Arc::new(Recording::failing("broken", &["IDE0005"]));
        let working = Arc::new(Recording::new("working", &["IDE0005"]));
        let registry = ActionRegistry::new()
            .with_refactoring(broken_refactoring)
            .with_fix(broken.clone())
            .with_fix(working.clone());
        let snapshot = snapshot();
        let document = snapshot.document(&url("/app/A.cs")).unwrap();

        let collected = registry.collect(&engine, &snapshot, document, span(0, 0, 0, 11));

        assert_eq!(broken.seen().len(), 2);
        assert_eq!(working.seen().len(), 2);
        let messages: Vec<_> = collected
            .iter()
            .map(|c| c.diagnostic.as_ref().unwrap().message.as_str())
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    struct Rewrite(&'static str);

    impl ActionProvider for Rewrite {
        fn name(&self) -> &'static str {
            "rewrite"
        }

        fn compute(&self, context: &ActionContext<'_>) -> Result<Vec<ActionCandidate>, ProviderError> {
            Ok(vec![ActionCandidate {
                title: "Rewrite".to_string(),
                kind: CodeActionKind::REFACTOR,
                changes: vec![DocumentChange {
                    uri: Url::parse(self.0).unwrap(),
                    text: context.document.text().replace("Foo", "Bar"),
                }],
            }])
        }
    }

    #[test]
    fn code_actions_carry_diffed_edits_and_drop_untranslatable_ones() {
        let engine = Diagnostics(Vec::new());
        let registry = ActionRegistry::new()
            .with_refactoring(Arc::new(Rewrite("file:///app/A.cs")))
            .with_refactoring(Arc::new(Rewrite("file:///app/Missing.cs")));
        let snapshot = snapshot();
        let state = WorkspaceState::new(snapshot.clone());
        state.track_open(&url("/app/A.cs"), 7);
        let document = snapshot.document(&url("/app/A.cs")).unwrap();

        let actions = registry.code_actions(&engine, &state, &snapshot, document, span(0, 0, 0, 0));

        assert_eq!(actions.len(), 1);
        let CodeActionOrCommand::CodeAction(action) = &actions[0] else {
            panic!("expected a code action");
        };
        let Some(DocumentChanges::Edits(edits)) = action.edit.as_ref().and_then(|e| e.document_changes.clone()) else {
            panic!("expected document edits");
        };
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].text_document.version, Some(7));
        let tower_lsp::lsp_types::OneOf::Left(edit) = &edits[0].edits[0] else {
            panic!("expected a plain text edit");
        };
        assert_eq!(edit.range.start, Position::new(1, 6));
        assert_eq!(edit.new_text, "Bar");
    }
}
