use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::CodeActionKind;

use crate::actions::{ActionCandidate, ActionContext, ActionProvider, DocumentChange, ProviderError, intersects};
use crate::workspace::{LinePosition, LineSpan};

static USING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)using\s+((?:static\s+)?[A-Za-z_][\w.]*)\s*;\s*$").unwrap()
});

/// Expands a byte range to the whole lines it covers, terminators included.
fn full_lines(text: &str, range: Range<usize>) -> Range<usize> {
    let start = text[..range.start].rfind('\n').map_or(0, |i| i + 1);
    let end = text[range.end..]
        .find('\n')
        .map_or(text.len(), |i| range.end + i + 1);
    start..end
}

/// Removes every using directive reported unnecessary under the same id as
/// the diagnostic being fixed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveUnnecessaryImports;

impl RemoveUnnecessaryImports {
    pub const DIAGNOSTIC_ID: &'static str = "IDE0005";
}

impl ActionProvider for RemoveUnnecessaryImports {
    fn name(&self) -> &'static str {
        "RemoveUnnecessaryImports"
    }

    fn fixable_diagnostic_ids(&self) -> &[&'static str] {
        &[Self::DIAGNOSTIC_ID]
    }

    fn compute(&self, context: &ActionContext<'_>) -> Result<Vec<ActionCandidate>, ProviderError> {
        let Some(diagnostic) = context.diagnostic else {
            return Ok(Vec::new());
        };
        let document = context.document;
        let text = document.text();

        let mut ranges = context
            .engine
            .diagnostics_of(context.snapshot, document)
            .into_iter()
            .filter(|d| d.id == diagnostic.id)
            .map(|d| {
                document
                    .byte_range(d.span)
                    .map(|range| full_lines(text, range))
                    .ok_or(ProviderError::InvalidSpan(d.span))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if ranges.is_empty() {
            return Ok(Vec::new());
        }
        ranges.sort_by_key(|r| r.start);

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for range in ranges {
            if range.start >= last {
                out.push_str(&text[last..range.start]);
            }
            last = last.max(range.end);
        }
        out.push_str(&text[last..]);

        Ok(vec![ActionCandidate {
            title: "Remove unnecessary usings".to_string(),
            kind: CodeActionKind::QUICKFIX,
            changes: vec![DocumentChange {
                uri: document.uri().clone(),
                text: out,
            }],
        }])
    }
}

/// Sorts the leading block of using directives, `System` namespaces first.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortImports;

impl ActionProvider for SortImports {
    fn name(&self) -> &'static str {
        "SortImports"
    }

    fn compute(&self, context: &ActionContext<'_>) -> Result<Vec<ActionCandidate>, ProviderError> {
        let text = context.document.text();
        let lines: Vec<&str> = text.split_inclusive('\n').collect();

        let Some(first) = lines.iter().position(|l| USING_LINE.is_match(l)) else {
            return Ok(Vec::new());
        };
        let len = lines[first..]
            .iter()
            .take_while(|l| USING_LINE.is_match(l))
            .count();
        if len < 2 {
            return Ok(Vec::new());
        }
        let last = first + len - 1;

        let block = LineSpan::new(
            LinePosition::new(first as u32, 0),
            LinePosition::new(last as u32, u32::MAX),
        );
        if !intersects(block, context.span) {
            return Ok(Vec::new());
        }

        let block_lines = &lines[first..=last];
        let mut directives: Vec<(String, String)> = block_lines
            .iter()
            .filter_map(|line| {
                let caps = USING_LINE.captures(line)?;
                Some((caps[1].to_string(), caps[2].to_string()))
            })
            .collect();
        let is_system = |ns: &str| ns == "System" || ns.starts_with("System.");
        let original = directives.clone();
        directives.sort_by(|(_, a), (_, b)| {
            is_system(b.as_str())
                .cmp(&is_system(a.as_str()))
                .then_with(|| a.cmp(b))
        });
        if directives == original {
            return Ok(Vec::new());
        }

        let mut out = String::with_capacity(text.len());
        for line in &lines[..first] {
            out.push_str(line);
        }
        for (line, (indent, namespace)) in block_lines.iter().zip(&directives) {
            let content = line.trim_end_matches(['\r', '\n']);
            out.push_str(&format!("{}using {};", indent, namespace));
            out.push_str(&line[content.len()..]);
        }
        for line in &lines[last + 1..] {
            out.push_str(line);
        }

        Ok(vec![ActionCandidate {
            title: "Sort usings".to_string(),
            kind: CodeActionKind::SOURCE_ORGANIZE_IMPORTS,
            changes: vec![DocumentChange {
                uri: context.document.uri().clone(),
                text: out,
            }],
        }])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tower_lsp::lsp_types::{CodeActionOrCommand, Url};

    use super::*;
    use crate::actions::ActionRegistry;
    use crate::engine::{LexicalEngine, SemanticEngine};
    use crate::workspace::{Document, Project, Snapshot, WorkspaceState};

    fn url(path: &str) -> Url {
        Url::parse(&format!("file://{}", path)).unwrap()
    }

    fn snapshot(text: &str) -> Snapshot {
        Snapshot::new().with_project(Project::new("App").with_document(url("/app/A.cs"), text))
    }

    fn line(n: u32) -> LineSpan {
        LineSpan::new(LinePosition::new(n, 0), LinePosition::new(n, 0))
    }

    fn compute(
        provider: &dyn ActionProvider,
        engine: &dyn SemanticEngine,
        snapshot: &Snapshot,
        span: LineSpan,
        diagnostic: Option<&crate::engine::Diagnostic>,
    ) -> Vec<ActionCandidate> {
        let document: &Document = snapshot.document(&url("/app/A.cs")).unwrap();
        provider
            .compute(&ActionContext {
                engine,
                snapshot,
                document,
                span,
                diagnostic,
            })
            .unwrap()
    }

    #[test]
    fn remove_unnecessary_imports_drops_flagged_lines() {
        let snapshot = snapshot("using Gone;\nusing System;\nusing Missing.Too;\nclass Foo {}\n");
        let engine = LexicalEngine::new();
        let document = snapshot.document(&url("/app/A.cs")).unwrap();
        let diagnostics = engine.diagnostics_of(&snapshot, document);
        assert_eq!(diagnostics.len(), 2);

        let candidates = compute(
            &RemoveUnnecessaryImports,
            &engine,
            &snapshot,
            line(0),
            Some(&diagnostics[0]),
        );

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].changes[0].text, "using System;\nclass Foo {}\n");
    }

    #[test]
    fn remove_unnecessary_imports_needs_a_diagnostic() {
        let snapshot = snapshot("using Gone;\nclass Foo {}\n");
        let candidates = compute(&RemoveUnnecessaryImports, &LexicalEngine::new(), &snapshot, line(0), None);
        assert!(candidates.is_empty());
    }

    #[test]
    fn sort_imports_orders_system_first() {
        let snapshot = snapshot("using Zeta;\r\nusing System.Text;\r\nusing Alpha;\r\n\r\nclass Foo {}");
        let candidates = compute(&SortImports, &LexicalEngine::new(), &snapshot, line(1), None);

        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].changes[0].text,
            "using System.Text;\r\nusing Alpha;\r\nusing Zeta;\r\n\r\nclass Foo {}"
        );
    }

    #[test]
    fn sort_imports_skips_sorted_or_distant_blocks() {
        let sorted = snapshot("using System;\nusing Alpha;\nclass Foo {}\n");
        assert!(compute(&SortImports, &LexicalEngine::new(), &sorted, line(0), None).is_empty());

        let unsorted = snapshot("using B;\nusing A;\n\nclass Foo {}\n");
        assert!(compute(&SortImports, &LexicalEngine::new(), &unsorted, line(3), None).is_empty());
    }

    #[test]
    fn default_registry_offers_fix_through_alias() {
        let snapshot = snapshot("using Zeta;\nusing Alpha;\nclass Foo {}\n");
        let state = WorkspaceState::new(snapshot.clone());
        let document = Arc::clone(snapshot.document(&url("/app/A.cs")).unwrap());

        let actions = ActionRegistry::default().code_actions(
            &LexicalEngine::new(),
            &state,
            &snapshot,
            &document,
            line(0),
        );

        let titles: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                CodeActionOrCommand::CodeAction(action) => Some(action.title.as_str()),
                CodeActionOrCommand::Command(_) => None,
            })
            .collect();
        assert_eq!(titles, vec!["Sort usings", "Remove unnecessary usings"]);
    }
}
