//! Ratel: backend for the Dgraph UI.
//!
//! Serves the single-page app with conditional GET and range support, keeps
//! user-saved queries in SQLite, exposes operator-provided query templates from
//! YAML and can forward `/api` traffic to a Dgraph alpha.

pub mod addr;
pub mod api;
pub mod config;
pub mod handler;
pub mod http;
pub mod logger;
pub mod preloaded;
pub mod proxy;
pub mod server;
pub mod store;
