//! Asset content responder
//!
//! Pairs a logical file name, a modification time and a byte payload, and turns
//! them into a response honouring conditional GET, Range and HEAD.

use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::HeaderMap;
use hyper::{Response, StatusCode};

use super::buffer::SeekableBuffer;
use super::cache::{self, CachePolicy};
use super::mime;
use super::range::{self, RangeOutcome};
use super::response;

/// Request headers relevant to serving content
#[derive(Debug, Default, Clone)]
pub struct ConditionalRequest {
    pub is_head: bool,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
    pub range: Option<String>,
}

impl ConditionalRequest {
    pub fn from_headers(headers: &HeaderMap, is_head: bool) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string)
        };
        Self {
            is_head,
            if_none_match: get("if-none-match"),
            if_modified_since: get("if-modified-since"),
            range: get("range"),
        }
    }
}

/// In-memory asset ready to be served
#[derive(Debug, Clone)]
pub struct Content {
    name: String,
    mod_time: DateTime<Utc>,
    bytes: Bytes,
    etag: String,
    cache_policy: CachePolicy,
}

impl Content {
    pub fn new(name: impl Into<String>, mod_time: DateTime<Utc>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            mod_time,
            etag: cache::generate_etag(&bytes),
            bytes,
            cache_policy: CachePolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn mod_time(&self) -> &DateTime<Utc> {
        &self.mod_time
    }

    pub const fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// Build the response for this content
    pub fn serve(&self, req: &ConditionalRequest) -> Response<Full<Bytes>> {
        let last_modified = cache::format_http_date(&self.mod_time);
        let cache_control = self.cache_policy.to_header_value();

        // If-Modified-Since is only consulted without If-None-Match (RFC 7232 3.3)
        let not_modified = if req.if_none_match.is_some() {
            cache::check_etag_match(req.if_none_match.as_deref(), &self.etag)
        } else {
            cache::check_not_modified_since(req.if_modified_since.as_deref(), &self.mod_time)
        };
        if not_modified {
            return response::build_304_response(&self.etag, &last_modified, &cache_control);
        }

        let total = self.bytes.len();
        let mut buffer = SeekableBuffer::new(self.bytes.clone());

        let (status, body, content_range) = match range::evaluate_range(req.range.as_deref(), total) {
            RangeOutcome::Unsatisfiable => return response::build_416_response(total),
            RangeOutcome::Partial(r) => match buffer.read_range(r.start, r.len()) {
                Ok(slice) => (StatusCode::PARTIAL_CONTENT, slice, Some(r.content_range(total))),
                Err(e) => {
                    crate::logger::log_error(&format!("Failed to read range of '{}': {e}", self.name));
                    return response::build_416_response(total);
                }
            },
            RangeOutcome::Full => (StatusCode::OK, self.bytes.clone(), None),
        };

        let content_length = body.len();
        let body = if req.is_head { Bytes::new() } else { body };

        let mut builder = Response::builder()
            .status(status)
            .header("Content-Type", mime::content_type_for(&self.name))
            .header("Content-Length", content_length)
            .header("Accept-Ranges", "bytes")
            .header("ETag", &self.etag)
            .header("Last-Modified", last_modified)
            .header("Cache-Control", cache_control);
        if let Some(content_range) = content_range {
            builder = builder.header("Content-Range", content_range);
        }

        builder.body(Full::new(body)).unwrap_or_else(|e| {
            crate::logger::log_error(&format!("Failed to build response for '{}': {e}", self.name));
            Response::new(Full::new(Bytes::new()))
        })
    }
}
