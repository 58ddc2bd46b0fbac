// Application state module
// Everything a request handler needs, built once at startup and shared via Arc

use std::time::Duration;

use super::types::{Config, DeploymentMode};
use crate::addr::{validate_addr, AddrError};
use crate::handler::assets;
use crate::http::Content;
use crate::logger;
use crate::proxy::ForwardClient;
use crate::store::QueryStore;

/// Application state
pub struct AppState {
    pub config: Config,
    /// Normalized backend address; empty when none is configured
    pub backend_addr: String,
    /// Saved-query store; `None` disables the saved-query API
    pub store: Option<QueryStore>,
    /// Present only in proxy mode
    pub forwarder: Option<ForwardClient>,
    /// `index.html` with the backend address filled in
    pub index: Content,
}

impl AppState {
    pub fn new(
        config: Config,
        backend_addr: String,
        store: Option<QueryStore>,
        forwarder: Option<ForwardClient>,
        index: Content,
    ) -> Self {
        Self {
            config,
            backend_addr,
            store,
            forwarder,
            index,
        }
    }

    /// Validate the backend address, open the store, prepare the index page
    pub fn initialize(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let backend_addr = match validate_addr(&config.backend.addr) {
            Ok(addr) => addr,
            Err(AddrError::Empty) => {
                logger::log_info("No Dgraph address configured; the UI will ask for one");
                String::new()
            }
            Err(e) => return Err(format!("Error parsing Dgraph server address: {e}").into()),
        };

        let (store, forwarder) = match config.backend.mode {
            DeploymentMode::Static => {
                let store = match config.saved_queries.path() {
                    Some(path) => Some(
                        QueryStore::open(&path)
                            .map_err(|e| format!("Failed to initialize database: {e}"))?,
                    ),
                    None => {
                        logger::log_info("Saved queries disabled (no database path configured)");
                        None
                    }
                };
                (store, None)
            }
            DeploymentMode::Proxy => {
                if backend_addr.is_empty() {
                    return Err("proxy mode requires backend.addr".into());
                }
                if config.saved_queries.path().is_some() {
                    logger::log_warning("Saved queries are not served in proxy mode; ignoring db_path");
                }
                let backend_timeout = Duration::from_secs(config.backend.timeout);
                let request_timeout = config.performance.request_timeout;
                if request_timeout > 0 && (config.backend.timeout == 0 || config.backend.timeout >= request_timeout) {
                    logger::log_warning(&format!(
                        "backend.timeout ({}s) is not below performance.request_timeout ({request_timeout}s); \
                         slow backends will be cut off with a generic 504",
                        config.backend.timeout
                    ));
                }
                let forwarder =
                    ForwardClient::new(&backend_addr, &config.backend.proxy_prefix, backend_timeout)?;
                (None, Some(forwarder))
            }
        };

        let index = assets::prepare_index(&config.assets, &backend_addr);
        Ok(Self::new(config, backend_addr, store, forwarder, index))
    }

    pub const fn access_log_enabled(&self) -> bool {
        self.config.logging.access_log
    }
}
