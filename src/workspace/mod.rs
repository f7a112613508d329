//! Workspace layer
//! - snapshot.rs: immutable projects/documents graph
//! - state.rs: snapshot register, open document versions
//! - metadata.rs: virtual documents for decompiled types
//! - text.rs: line index and position conversion

pub mod error;
pub mod metadata;
pub mod snapshot;
pub mod state;
pub mod text;

pub use error::WorkspaceError;
pub use metadata::{MetadataCache, MetadataKey};
pub use snapshot::{AssemblyReference, Document, DocumentOrigin, MISCELLANEOUS_PROJECT, Project, Snapshot};
pub use state::WorkspaceState;
pub use text::{LineIndex, LinePosition, LineSpan};
