//! `o#/metadata`: read path for decompiled sources

use serde::{Deserialize, Serialize};

pub const METADATA_METHOD: &str = "o#/metadata";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataParams {
    pub project_name: String,
    pub assembly_name: String,
    /// Fully qualified, e.g. `Ns.Bar`.
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResponse {
    pub source_name: String,
    pub source: String,
}
