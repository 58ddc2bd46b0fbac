// Saved-query handlers
// /api/saved-queries and /api/saved-queries/{id}

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Response, StatusCode};

use super::response::{error_response, json_response, method_not_allowed, no_content};
use crate::logger;
use crate::store::{QueryStore, SavedQueriesResponse, SavedQueryInput, StoreError};

pub const COLLECTION_PATH: &str = "/api/saved-queries";

const COLLECTION_METHODS: &str = "GET, POST, OPTIONS";
const ITEM_METHODS: &str = "GET, PUT, DELETE, OPTIONS";

/// GET (list) and POST (create)
pub fn handle_collection(
    method: &Method,
    body: &[u8],
    store: Option<&QueryStore>,
) -> Response<Full<Bytes>> {
    let Some(store) = store else {
        return json_response(StatusCode::OK, &disabled());
    };

    match *method {
        Method::GET | Method::HEAD => match store.list() {
            Ok(queries) => json_response(
                StatusCode::OK,
                &SavedQueriesResponse {
                    enabled: true,
                    queries,
                },
            ),
            Err(e) => storage_failure("fetch", &e),
        },
        Method::POST => {
            let input = match parse_input(body) {
                Ok(input) => input,
                Err(resp) => return resp,
            };
            match store.create(input) {
                Ok(query) => json_response(StatusCode::CREATED, &query),
                Err(StoreError::Validation(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
                Err(e) => storage_failure("create", &e),
            }
        }
        _ => method_not_allowed(COLLECTION_METHODS),
    }
}

/// GET, PUT and DELETE of a single query; `raw_id` is the path segment after the collection
pub fn handle_item(
    method: &Method,
    raw_id: &str,
    body: &[u8],
    store: Option<&QueryStore>,
) -> Response<Full<Bytes>> {
    let Some(store) = store else {
        return error_response(StatusCode::NOT_FOUND, "Saved queries not enabled");
    };
    let Ok(id) = raw_id.parse::<i64>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid query ID");
    };

    match *method {
        Method::GET | Method::HEAD => match store.get(id) {
            Ok(Some(query)) => json_response(StatusCode::OK, &query),
            Ok(None) => query_not_found(),
            Err(e) => storage_failure("fetch", &e),
        },
        Method::PUT => {
            let input = match parse_input(body) {
                Ok(input) => input,
                Err(resp) => return resp,
            };
            match store.update(id, input) {
                Ok(Some(query)) => json_response(StatusCode::OK, &query),
                Ok(None) => query_not_found(),
                Err(StoreError::Validation(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
                Err(e) => storage_failure("update", &e),
            }
        }
        Method::DELETE => match store.delete(id) {
            Ok(true) => no_content(),
            Ok(false) => query_not_found(),
            Err(e) => storage_failure("delete", &e),
        },
        _ => method_not_allowed(ITEM_METHODS),
    }
}

fn disabled() -> SavedQueriesResponse {
    SavedQueriesResponse {
        enabled: false,
        queries: Vec::new(),
    }
}

fn parse_input(body: &[u8]) -> Result<SavedQueryInput, Response<Full<Bytes>>> {
    serde_json::from_slice(body).map_err(|e| {
        logger::log_warning(&format!("Rejected saved query body: {e}"));
        error_response(StatusCode::BAD_REQUEST, "Invalid JSON")
    })
}

fn query_not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Query not found")
}

fn storage_failure(op: &str, err: &StoreError) -> Response<Full<Bytes>> {
    logger::log_error(&format!("Error trying to {op} saved query: {err}"));
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &format!("Failed to {op} query"),
    )
}
