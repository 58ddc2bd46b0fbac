//! Request handler module
//!
//! The router decides between health probes, the `/api` surface (served locally
//! or forwarded to Dgraph) and the UI assets.

pub mod assets;
pub mod router;

pub use router::handle_request;
