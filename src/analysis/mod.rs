//! Request-level analysis over a captured snapshot
//! - resolver.rs: position to symbol, symbol to locations, metadata fallback
//! - references.rs: references and document highlights
//! - rename.rs: rename proposals as workspace edits
//! - diff.rs: snapshot diffing into protocol edits
//!
//! Every operation takes the snapshot it runs against explicitly. Handlers
//! capture one snapshot per request and never look at the live one again.

pub mod diff;
pub mod references;
pub mod rename;
pub mod resolver;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::{Decompiler, SemanticEngine};
use crate::workspace::WorkspaceState;

pub use resolver::{MetadataError, SymbolAt, UsedFallback};

pub struct Analysis {
    engine: Arc<dyn SemanticEngine>,
    decompiler: Arc<dyn Decompiler>,
    state: Arc<WorkspaceState>,
    decompilation: AtomicBool,
}

impl Analysis {
    pub fn new(
        engine: Arc<dyn SemanticEngine>,
        decompiler: Arc<dyn Decompiler>,
        state: Arc<WorkspaceState>,
    ) -> Self {
        Self {
            engine,
            decompiler,
            state,
            decompilation: AtomicBool::new(true),
        }
    }

    pub fn engine(&self) -> &dyn SemanticEngine {
        self.engine.as_ref()
    }

    pub fn state(&self) -> &WorkspaceState {
        &self.state
    }

    /// When disabled, binary-only symbols resolve to no location and no
    /// metadata document is produced.
    pub fn set_decompilation_enabled(&self, enabled: bool) {
        self.decompilation.store(enabled, Ordering::Relaxed);
    }

    pub fn decompilation_enabled(&self) -> bool {
        self.decompilation.load(Ordering::Relaxed)
    }
}
