//! Preloaded query templates
//!
//! Operators ship read-only query templates in a YAML file. The file is read on
//! every request, and any problem with it disables the feature instead of
//! failing the request.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::logger;

/// Top-level layout of the YAML file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PreloadedQueriesFile {
    pub version: String,
    pub queries: Vec<PreloadedQuery>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PreloadedQuery {
    pub name: String,
    pub description: String,
    pub category: String,
    /// "query" or "mutate"
    pub action: String,
    pub query: String,
    pub variables: Vec<PreloadedVariable>,
}

/// Placeholder the UI prompts for before running a template
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PreloadedVariable {
    pub name: String,
    /// "string", "int", "float" or "bool"
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub description: String,
    pub required: bool,
    pub default: String,
    pub placeholder: String,
}

/// `GET /api/preloaded-queries` body
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreloadedQueriesResponse {
    pub enabled: bool,
    pub queries: Vec<PreloadedQuery>,
}

impl PreloadedQueriesResponse {
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            queries: Vec::new(),
        }
    }
}

/// Parse the YAML document
pub fn parse(yaml: &str) -> Result<PreloadedQueriesFile, serde_yaml::Error> {
    serde_yaml::from_str(yaml)
}

/// Load templates from `path`; never fails
pub async fn load(path: Option<&Path>) -> PreloadedQueriesResponse {
    let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) else {
        return PreloadedQueriesResponse::disabled();
    };

    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            logger::log_warning(&format!(
                "Failed to read preloaded queries file '{}': {e}",
                path.display()
            ));
            return PreloadedQueriesResponse::disabled();
        }
    };

    match parse(&raw) {
        Ok(file) => PreloadedQueriesResponse {
            enabled: true,
            queries: file.queries,
        },
        Err(e) => {
            logger::log_warning(&format!(
                "Failed to parse preloaded queries file '{}': {e}",
                path.display()
            ));
            PreloadedQueriesResponse::disabled()
        }
    }
}
