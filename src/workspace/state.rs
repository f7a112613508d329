//! Workspace state manager
//!
//! Holds the single authoritative snapshot reference, the client's open
//! document versions and the metadata document cache.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tower_lsp::lsp_types::Url;
use tracing::debug;

use crate::config::METADATA_SCHEME;
use crate::workspace::metadata::MetadataCache;
use crate::workspace::snapshot::{Document, Snapshot};

pub struct WorkspaceState {
    current: RwLock<Arc<Snapshot>>,
    open_versions: DashMap<Url, i32>,
    metadata: MetadataCache,
}

impl WorkspaceState {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            open_versions: DashMap::new(),
            metadata: MetadataCache::new(),
        }
    }

    /// Captures the current snapshot. Callers keep working against the
    /// returned reference even if it is replaced meanwhile.
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn replace_snapshot(&self, snapshot: Snapshot) {
        let version = snapshot.version();
        *self.current.write() = Arc::new(snapshot);
        debug!("Workspace snapshot replaced (version {})", version);
    }

    /// Derives and installs a new snapshot from the current one while holding
    /// the write lock, so concurrent notifications cannot drop each other's
    /// changes. Returns `false` when `derive` declines to produce one.
    pub fn update(&self, derive: impl FnOnce(&Snapshot) -> Option<Snapshot>) -> bool {
        let mut current = self.current.write();
        match derive(&current) {
            Some(next) => {
                debug!("Workspace snapshot updated (version {})", next.version());
                *current = Arc::new(next);
                true
            }
            None => false,
        }
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// Looks `uri` up among the real documents of `snapshot`, then among the
    /// virtual metadata documents.
    pub fn document_for_uri(&self, snapshot: &Snapshot, uri: &Url) -> Option<Arc<Document>> {
        snapshot
            .document(uri)
            .cloned()
            .or_else(|| self.metadata.get(uri))
    }

    /// Whether `uri` names a virtual metadata document. Such documents are
    /// read-only and never enter a snapshot, even when the client opens them.
    pub fn is_metadata_uri(&self, uri: &Url) -> bool {
        uri.scheme() == METADATA_SCHEME || self.metadata.get(uri).is_some()
    }

    pub fn track_open(&self, uri: &Url, version: i32) {
        self.open_versions.insert(uri.clone(), version);
    }

    pub fn track_change(&self, uri: &Url, version: i32) {
        self.open_versions.insert(uri.clone(), version);
    }

    pub fn track_close(&self, uri: &Url) {
        self.open_versions.remove(uri);
    }

    /// The version the client last reported for `uri`, if it is open.
    pub fn open_version(&self, uri: &Url) -> Option<i32> {
        self.open_versions.get(uri).map(|v| *v)
    }
}
