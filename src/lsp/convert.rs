//! Engine types to protocol types

use tower_lsp::lsp_types::{
    self as lsp, CompletionItem, CompletionItemKind, DocumentSymbol, Hover, HoverContents,
    LanguageString, Location, MarkedString, SymbolInformation,
};

use crate::engine::{CompletionCandidate, DeclaredNode, Diagnostic, Symbol, SymbolKind};

pub fn to_lsp_diagnostics(diagnostics: &[Diagnostic]) -> Vec<lsp::Diagnostic> {
    diagnostics.iter().filter_map(Diagnostic::to_lsp).collect()
}

/// Signature as a C# code block followed by the documentation, which is
/// present even when empty.
pub fn to_hover(symbol: &Symbol) -> Hover {
    Hover {
        contents: HoverContents::Array(vec![
            MarkedString::LanguageString(LanguageString {
                language: "csharp".to_string(),
                value: symbol.display.clone(),
            }),
            MarkedString::String(symbol.documentation.clone()),
        ]),
        range: None,
    }
}

pub fn to_symbol_kind(kind: SymbolKind) -> lsp::SymbolKind {
    match kind {
        SymbolKind::Namespace => lsp::SymbolKind::NAMESPACE,
        SymbolKind::Class | SymbolKind::Record => lsp::SymbolKind::CLASS,
        SymbolKind::Struct => lsp::SymbolKind::STRUCT,
        SymbolKind::Interface => lsp::SymbolKind::INTERFACE,
        SymbolKind::Enum => lsp::SymbolKind::ENUM,
        SymbolKind::Method => lsp::SymbolKind::METHOD,
        SymbolKind::Property => lsp::SymbolKind::PROPERTY,
        SymbolKind::Field => lsp::SymbolKind::FIELD,
        SymbolKind::Local => lsp::SymbolKind::VARIABLE,
    }
}

fn to_completion_kind(kind: SymbolKind) -> CompletionItemKind {
    match kind {
        SymbolKind::Namespace => CompletionItemKind::MODULE,
        SymbolKind::Class | SymbolKind::Record => CompletionItemKind::CLASS,
        SymbolKind::Struct => CompletionItemKind::STRUCT,
        SymbolKind::Interface => CompletionItemKind::INTERFACE,
        SymbolKind::Enum => CompletionItemKind::ENUM,
        SymbolKind::Method => CompletionItemKind::METHOD,
        SymbolKind::Property => CompletionItemKind::PROPERTY,
        SymbolKind::Field => CompletionItemKind::FIELD,
        SymbolKind::Local => CompletionItemKind::VARIABLE,
    }
}

pub fn to_completion_item(candidate: CompletionCandidate) -> CompletionItem {
    CompletionItem {
        label: candidate.label,
        kind: Some(to_completion_kind(candidate.kind)),
        detail: candidate.detail,
        ..Default::default()
    }
}

#[allow(deprecated)]
pub fn to_document_symbol(node: DeclaredNode) -> DocumentSymbol {
    DocumentSymbol {
        name: node.name,
        detail: None,
        kind: to_symbol_kind(node.kind),
        tags: None,
        deprecated: None,
        range: node.span.into(),
        selection_range: node.name_span.into(),
        children: (!node.children.is_empty())
            .then(|| node.children.into_iter().map(to_document_symbol).collect()),
    }
}

/// `None` for symbols without a source declaration.
#[allow(deprecated)]
pub fn to_symbol_information(symbol: &Symbol) -> Option<SymbolInformation> {
    let site = symbol.source_sites().next()?;
    Some(SymbolInformation {
        name: symbol.name.clone(),
        kind: to_symbol_kind(symbol.kind),
        tags: None,
        deprecated: None,
        location: Location::new(site.uri.clone(), site.span.into()),
        container_name: symbol
            .qualified_name
            .rsplit_once('.')
            .map(|(container, _)| container.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Severity;
    use crate::workspace::{LinePosition, LineSpan};
    use tower_lsp::lsp_types::NumberOrString;

    fn span() -> LineSpan {
        LineSpan::new(LinePosition::new(2, 4), LinePosition::new(2, 9))
    }

    #[test]
    fn hidden_diagnostics_are_suppressed() {
        let visible = Diagnostic {
            id: "CS0101".to_string(),
            severity: Severity::Error,
            span: span(),
            message: "duplicate".to_string(),
        };
        let hidden = Diagnostic {
            severity: Severity::Hidden,
            ..visible.clone()
        };

        let converted = to_lsp_diagnostics(&[hidden, visible]);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].code, Some(NumberOrString::String("CS0101".to_string())));
        assert_eq!(converted[0].range, lsp::Range::from(span()));
    }

    #[test]
    fn hover_keeps_empty_documentation() {
        let symbol = Symbol {
            name: "Foo".to_string(),
            kind: SymbolKind::Class,
            qualified_name: "Foo".to_string(),
            containing_type: None,
            display: "class Foo".to_string(),
            documentation: String::new(),
            sites: Vec::new(),
        };

        let HoverContents::Array(parts) = to_hover(&symbol).contents else {
            panic!("expected marked strings");
        };
        assert_eq!(
            parts,
            vec![
                MarkedString::LanguageString(LanguageString {
                    language: "csharp".to_string(),
                    value: "class Foo".to_string(),
                }),
                MarkedString::String(String::new()),
            ]
        );
        assert!(to_symbol_information(&symbol).is_none());
    }
}
