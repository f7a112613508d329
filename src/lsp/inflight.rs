//! Per-document request supersession
//!
//! A request of some kind for a document cancels the still-running request
//! of the same kind for that document. The superseded worker sees its token
//! fire and stops at the next document boundary; its answer is discarded.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Url;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Hover,
    Definition,
    References,
    Highlight,
    Rename,
    Completion,
    CodeAction,
}

/// Handle of one registered request.
#[derive(Debug, Clone)]
pub struct Ticket {
    id: u64,
    token: CancellationToken,
}

impl Ticket {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug, Default)]
pub struct InFlight {
    requests: DashMap<(Url, RequestKind), Ticket>,
    next_id: AtomicU64,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request, cancelling the one it supersedes.
    pub fn begin(&self, uri: &Url, kind: RequestKind) -> Ticket {
        let ticket = Ticket {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        if let Some(previous) = self.requests.insert((uri.clone(), kind), ticket.clone()) {
            debug!("Superseding {:?} request {} for {}", kind, previous.id, uri);
            previous.token.cancel();
        }
        ticket
    }

    /// Like [`InFlight::begin`], unregistering the request when the returned
    /// guard drops. Dropping the guard also cancels its token, so a handler
    /// future dropped by `$/cancelRequest` stops its worker too.
    pub fn register(&self, uri: &Url, kind: RequestKind) -> Registration<'_> {
        Registration {
            inflight: self,
            uri: uri.clone(),
            kind,
            ticket: self.begin(uri, kind),
        }
    }

    /// Unregisters `ticket` unless a newer request already replaced it.
    pub fn finish(&self, uri: &Url, kind: RequestKind, ticket: &Ticket) {
        self.requests
            .remove_if(&(uri.clone(), kind), |_, current| current.id == ticket.id);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

pub struct Registration<'a> {
    inflight: &'a InFlight,
    uri: Url,
    kind: RequestKind,
    ticket: Ticket,
}

impl Registration<'_> {
    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.ticket.token.cancel();
        self.inflight.finish(&self.uri, self.kind, &self.ticket);
    }
}
