// LSP protocol layer
// - server.rs: stdio server wiring
// - backend.rs: LanguageServer trait implementation
// - convert.rs: engine types to protocol types
// - inflight.rs: per-document request supersession
// - metadata.rs: o#/metadata request types
pub mod backend;
pub mod convert;
pub mod inflight;
pub mod metadata;
pub mod server;
