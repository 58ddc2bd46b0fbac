// Configuration types module
// Deserialized from the layered sources in `Config::load_from`; every field has a default there

use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub assets: AssetsConfig,
    pub saved_queries: SavedQueriesConfig,
    pub preloaded_queries: PreloadedQueriesConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    pub health: HealthConfig,
}

/// Listening socket configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// How the server treats `/api/*`
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Bundled assets plus the saved/preloaded query APIs
    #[default]
    Static,
    /// Bundled assets, with `/api/*` forwarded to the backend
    Proxy,
}

/// The Dgraph endpoint the UI talks to
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Raw address; validated at startup, empty means "not configured"
    pub addr: String,
    pub mode: DeploymentMode,
    /// Path prefix removed before forwarding in proxy mode
    pub proxy_prefix: String,
    /// Seconds to wait for a forwarded exchange before answering 504; 0 waits forever
    pub timeout: u64,
}

/// Where the built SPA lives
#[derive(Debug, Deserialize, Clone)]
pub struct AssetsConfig {
    pub dir: PathBuf,
    pub index: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SavedQueriesConfig {
    /// SQLite file; empty disables the feature
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PreloadedQueriesConfig {
    /// YAML file; empty disables the feature
    pub path: String,
}

impl SavedQueriesConfig {
    pub fn path(&self) -> Option<PathBuf> {
        non_empty_path(&self.db_path)
    }
}

impl PreloadedQueriesConfig {
    pub fn path(&self) -> Option<PathBuf> {
        non_empty_path(&self.path)
    }
}

fn non_empty_path(raw: &str) -> Option<PathBuf> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| PathBuf::from(raw))
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// debug, info, warn or error
    pub level: String,
    pub access_log: bool,
    /// combined, common, json, or a `$variable` pattern
    pub access_log_format: String,
    /// stdout when unset
    pub access_log_file: Option<String>,
    /// stderr when unset
    pub error_log_file: Option<String>,
}

/// Connection timeouts (seconds) and limits
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    /// Idle seconds before a keep-alive connection is closed; 0 disables keep-alive
    pub keep_alive_timeout: u64,
    /// Seconds allowed for a request's headers to arrive
    pub read_timeout: u64,
    /// Grace period for in-flight connections at shutdown
    pub write_timeout: u64,
    /// Seconds one request may take end to end before a 504; 0 disables the bound
    pub request_timeout: u64,
    pub max_connections: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Sent in the `Server` header
    pub server_name: String,
    pub enable_cors: bool,
    /// Upper bound for request bodies, in bytes
    pub max_body_size: u64,
}

/// Liveness/readiness probes answered before any other routing
#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    pub enabled: bool,
    pub liveness_path: String,
    pub readiness_path: String,
}
