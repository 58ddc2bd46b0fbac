//! HTTP protocol layer module
//!
//! Protocol-level building blocks shared by the asset handler, the JSON API and the
//! forwarding client. Nothing here knows about saved queries.

pub mod buffer;
pub mod cache;
pub mod content;
pub mod mime;
pub mod range;
pub mod response;

pub use content::{ConditionalRequest, Content};
pub use response::{
    build_404_response, build_405_response, build_413_response, build_health_response,
    build_options_response,
};
