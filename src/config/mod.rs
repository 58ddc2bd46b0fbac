// Configuration module entry point
// Layers defaults, an optional TOML file, RATEL_* environment variables and
// command-line overrides into one Config

mod state;
mod types;

use std::net::SocketAddr;

pub use state::AppState;
pub use types::{
    AssetsConfig, BackendConfig, Config, DeploymentMode, HealthConfig, HttpConfig, LoggingConfig,
    PerformanceConfig, PreloadedQueriesConfig, SavedQueriesConfig, ServerConfig,
};

/// Values given on the command line; `None` leaves the lower layers alone
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub port: Option<u16>,
    pub listen_addr: Option<String>,
    pub addr: Option<String>,
    pub mode: Option<String>,
    pub assets_dir: Option<String>,
    pub queries_db: Option<String>,
    pub preloaded_queries: Option<String>,
}

/// Flat variables naming a single setting; everything else under `RATEL_` must
/// use `__` nesting (e.g. `RATEL_SERVER__PORT`)
pub const QUERIES_DB_ENV: &str = "RATEL_QUERIES_DB";
pub const PRELOADED_QUERIES_ENV: &str = "RATEL_PRELOADED_QUERIES";

const ENV_PREFIX: &str = "RATEL";

impl Config {
    /// Load configuration from the given file path (extension optional, file not required)
    /// layered with the process environment and `overrides`
    pub fn load_from(config_path: &str, overrides: &Overrides) -> Result<Self, config::ConfigError> {
        Self::load_with_env(config_path, overrides, std::env::vars())
    }

    /// Same as `load_from`, reading environment variables from `env`
    ///
    /// # Arguments
    ///
    /// * `config_path` - TOML file, looked up with or without its extension
    /// * `overrides` - command-line values, applied last
    /// * `env` - `(name, value)` pairs standing in for the process environment
    pub fn load_with_env<I>(
        config_path: &str,
        overrides: &Overrides,
        env: I,
    ) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut nested = config::Map::new();
        let mut queries_db = None;
        let mut preloaded_queries = None;
        for (key, value) in env {
            if key == QUERIES_DB_ENV {
                queries_db = Some(value);
            } else if key == PRELOADED_QUERIES_ENV {
                preloaded_queries = Some(value);
            } else if is_nested_env_key(&key) {
                nested.insert(key, value);
            }
        }

        let settings = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("backend.addr", "")?
            .set_default("backend.mode", "static")?
            .set_default("backend.proxy_prefix", "/api")?
            .set_default("backend.timeout", 30)?
            .set_default("assets.dir", "build")?
            .set_default("assets.index", "index.html")?
            .set_default("saved_queries.db_path", "")?
            .set_default("preloaded_queries.path", "")?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("performance.request_timeout", 60)?
            .set_default("http.server_name", "Ratel")?
            .set_default("http.enable_cors", false)?
            .set_default("http.max_body_size", 1_048_576)? // 1MB
            .set_default("health.enabled", true)?
            .set_default("health.liveness_path", "/healthz")?
            .set_default("health.readiness_path", "/readyz")?
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(nested)),
            )
            // Flat variables sit above the nested ones, command-line flags above both
            .set_override_option("saved_queries.db_path", overrides.queries_db.clone().or(queries_db))?
            .set_override_option(
                "preloaded_queries.path",
                overrides.preloaded_queries.clone().or(preloaded_queries),
            )?
            .set_override_option("server.port", overrides.port.map(i64::from))?
            .set_override_option("server.host", overrides.listen_addr.clone())?
            .set_override_option("backend.addr", overrides.addr.clone())?
            .set_override_option("backend.mode", overrides.mode.clone())?
            .set_override_option("assets.dir", overrides.assets_dir.clone())?
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        let host = if self.server.host.is_empty() {
            "0.0.0.0"
        } else {
            self.server.host.as_str()
        };
        // Bare IPv6 literals need brackets
        let addr = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{}", self.server.port)
        } else {
            format!("{host}:{}", self.server.port)
        };
        addr.parse().map_err(|e| format!("Invalid listen address '{addr}': {e}"))
    }
}

/// `RATEL_<SECTION>__<KEY>`; flat `RATEL_*` names would collide with section tables
fn is_nested_env_key(key: &str) -> bool {
    key.strip_prefix(ENV_PREFIX)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|rest| rest.contains("__"))
}
