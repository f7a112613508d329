use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

/// URI scheme of virtual documents holding decompiled source.
pub const METADATA_SCHEME: &str = "metadata";

/// Default log filter when neither RUST_LOG nor `--log-level` is given.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Command line of the `sharp-lsp` binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "sharp-lsp", version, about)]
pub struct Cli {
    /// Workspace root to load before serving requests.
    #[arg(short, long, default_value = ".")]
    pub source: PathBuf,

    /// JSON description of the compiled assemblies projects may reference.
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `sharp_lsp=trace`.
    /// RUST_LOG takes precedence when set.
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Options sent by the client in `initialize.initializationOptions`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializationOptions {
    pub enable_decompilation: bool,
}

impl Default for InitializationOptions {
    fn default() -> Self {
        Self {
            enable_decompilation: true,
        }
    }
}

impl InitializationOptions {
    /// Reads options from the raw initialize payload, falling back to the
    /// defaults when absent or malformed.
    pub fn from_value(value: Option<serde_json::Value>) -> Self {
        value
            .and_then(|v| {
                serde_json::from_value(v)
                    .inspect_err(|e| tracing::warn!("Ignoring invalid initialization options: {}", e))
                    .ok()
            })
            .unwrap_or_default()
    }
}

/// Returns the path to the data directory for sharp-lsp.
/// Uses $XDG_DATA_HOME/sharp-lsp if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/sharp-lsp,
/// or ./sharp-lsp if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

pub const LOG_FILE_NAME: &str = "sharp-lsp.log";

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join(LOG_FILE_NAME)
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("sharp-lsp")
}
