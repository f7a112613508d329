pub mod actions;
pub mod analysis;
pub mod config;
pub mod engine;
pub mod log;
pub mod lsp;
pub mod workspace;
