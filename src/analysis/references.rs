use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{DocumentHighlight, DocumentHighlightKind, Location};

use crate::analysis::Analysis;
use crate::engine::{SourceLocation, Symbol};
use crate::workspace::{Document, Snapshot};

fn to_location(site: &SourceLocation) -> Location {
    Location::new(site.uri.clone(), site.span.into())
}

impl Analysis {
    /// References of `symbol` across the snapshot. Declaration sites are
    /// appended when `include_declaration` is set and left out otherwise.
    pub fn find_all_references(
        &self,
        snapshot: &Snapshot,
        symbol: &Symbol,
        include_declaration: bool,
        cancel: &CancellationToken,
    ) -> Vec<Location> {
        let declarations: Vec<&SourceLocation> = symbol.source_sites().collect();
        let mut locations: Vec<Location> = self
            .engine()
            .references_of(snapshot, symbol, None, cancel)
            .iter()
            .filter(|site| !declarations.contains(site))
            .map(to_location)
            .collect();

        if include_declaration {
            locations.extend(declarations.into_iter().map(to_location));
        }
        locations
    }

    /// Occurrences of `symbol` inside `document`: its references there, then
    /// its declaration sites there. The same span may be reported twice.
    pub fn highlights(
        &self,
        snapshot: &Snapshot,
        symbol: &Symbol,
        document: &Document,
        cancel: &CancellationToken,
    ) -> Vec<DocumentHighlight> {
        let only = HashSet::from([document.uri().clone()]);
        let references = self
            .engine()
            .references_of(snapshot, symbol, Some(&only), cancel);
        let declarations = symbol
            .source_sites()
            .filter(|site| &site.uri == document.uri())
            .cloned();

        references
            .into_iter()
            .map(|site| (site, DocumentHighlightKind::READ))
            .chain(declarations.map(|site| (site, DocumentHighlightKind::WRITE)))
            .map(|(site, kind)| DocumentHighlight {
                range: site.span.into(),
                kind: Some(kind),
            })
            .collect()
    }
}
