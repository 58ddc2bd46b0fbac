//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: health probes, preflight, body limits,
//! then either the `/api` surface or the SPA assets.

use crate::api;
use crate::config::{AppState, DeploymentMode};
use crate::handler::assets;
use crate::http::{self, ConditionalRequest};
use crate::logger;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response};
use std::net::IpAddr;

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: &AppState,
    peer: Option<IpAddr>,
) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let is_head = method == Method::HEAD;

    // 1. Health probes
    if let Some(resp) = check_health(&method, &path, state) {
        return resp;
    }

    // 2. Preflight
    if method == Method::OPTIONS {
        return http::build_options_response(state.config.http.enable_cors);
    }

    // 3. Declared body size
    let max_body_size = state.config.http.max_body_size;
    if let Some(resp) = check_body_size(&req, max_body_size) {
        return resp;
    }

    // 4. API surface
    let api_prefix = match state.config.backend.mode {
        DeploymentMode::Static => "/api",
        DeploymentMode::Proxy => state.config.backend.proxy_prefix.trim_end_matches('/'),
    };
    if is_under(&path, api_prefix) {
        let (parts, body) = req.into_parts();
        let body = match collect_body(body, max_body_size).await {
            Ok(b) => b,
            Err(resp) => return resp,
        };
        let mut resp = match &state.forwarder {
            Some(forwarder) => forwarder.forward(&parts, body, peer).await,
            None => api::handle_api(&method, &path, &body, state).await,
        };
        if state.config.http.enable_cors {
            resp.headers_mut().insert(
                "Access-Control-Allow-Origin",
                hyper::header::HeaderValue::from_static("*"),
            );
        }
        return resp;
    }

    // 5. Assets (GET/HEAD only)
    if !matches!(method, Method::GET | Method::HEAD) {
        logger::log_warning(&format!("Method not allowed: {method} {path}"));
        return http::build_405_response();
    }
    let ctx = ConditionalRequest::from_headers(req.headers(), is_head);
    assets::serve_asset(&path, &ctx, state).await
}

fn is_under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn check_health(method: &Method, path: &str, state: &AppState) -> Option<Response<Full<Bytes>>> {
    let health = &state.config.health;
    if !health.enabled || !matches!(*method, Method::GET | Method::HEAD) {
        return None;
    }
    (path == health.liveness_path || path == health.readiness_path)
        .then(|| http::build_health_response(*method == Method::HEAD))
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size<B>(req: &Request<B>, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let content_length = req.headers().get("content-length")?;
    let Ok(size_str) = content_length.to_str() else {
        logger::log_warning("Content-Length header contains non-ASCII characters");
        return None;
    };
    match size_str.parse::<u64>() {
        Ok(size) if size > max_body_size => {
            logger::log_error(&format!(
                "Request body too large: {size} bytes (max: {max_body_size})"
            ));
            Some(http::build_413_response())
        }
        Err(_) => {
            logger::log_warning(&format!(
                "Invalid Content-Length value: '{size_str}', skipping size check"
            ));
            None
        }
        _ => None,
    }
}

/// Read the whole body, enforcing the size limit for chunked uploads too
async fn collect_body<B>(body: B, max_body_size: u64) -> Result<Bytes, Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            logger::log_error(&format!("Request body exceeded {max_body_size} bytes"));
            Err(http::build_413_response())
        }
        Err(e) => {
            logger::log_warning(&format!("Failed to read request body: {e}"));
            Err(api::error_response(
                hyper::StatusCode::BAD_REQUEST,
                "Failed to read request body",
            ))
        }
    }
}
