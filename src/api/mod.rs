// API module entry
// JSON endpoints mounted under /api in static mode

mod response;
mod saved;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Response, StatusCode};

use crate::config::AppState;
use crate::logger;
use crate::preloaded;

pub use response::{error_response, json_response, not_found};

pub const PRELOADED_PATH: &str = "/api/preloaded-queries";

/// API route handler
///
/// Dispatches to handler functions based on request path and method.
/// `body` has already been collected and size-checked by the router.
pub async fn handle_api(
    method: &Method,
    path: &str,
    body: &[u8],
    state: &AppState,
) -> Response<Full<Bytes>> {
    let store = state.store.as_ref();
    let path = path.trim_end_matches('/');

    let resp = if path == saved::COLLECTION_PATH {
        saved::handle_collection(method, body, store)
    } else if let Some(raw_id) = path
        .strip_prefix(saved::COLLECTION_PATH)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        saved::handle_item(method, raw_id, body, store)
    } else if path == PRELOADED_PATH {
        match *method {
            Method::GET | Method::HEAD => {
                let loaded = preloaded::load(state.config.preloaded_queries.path().as_deref()).await;
                json_response(StatusCode::OK, &loaded)
            }
            _ => response::method_not_allowed("GET, HEAD, OPTIONS"),
        }
    } else {
        not_found()
    };

    logger::log_api_request(method.as_str(), path, resp.status().as_u16());
    resp
}
