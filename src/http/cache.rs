//! Validators and freshness
//!
//! Entity tags, HTTP dates and the `Cache-Control` policies used for UI assets.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Strong validator for a payload: the quoted hex of its hash
pub fn generate_etag(content: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("\"{:016x}\"", hasher.finish())
}

/// `If-None-Match` uses weak comparison: `W/"x"` matches `"x"`, and `*` matches anything
pub fn check_etag_match(if_none_match: Option<&str>, etag: &str) -> bool {
    if_none_match.is_some_and(|client_etag| {
        client_etag.split(',').any(|e| {
            let e = e.trim();
            e == "*" || e.strip_prefix("W/").unwrap_or(e) == etag
        })
    })
}

/// Format a timestamp as an HTTP date
pub fn format_http_date(time: &DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}

/// Parse an HTTP date (IMF-fixdate, falling back to RFC 2822 variants)
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, HTTP_DATE_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Whether the resource is unmodified since the client's `If-Modified-Since`
///
/// HTTP dates carry whole seconds, so sub-second precision of `mod_time` is ignored.
pub fn check_not_modified_since(if_modified_since: Option<&str>, mod_time: &DateTime<Utc>) -> bool {
    let Some(since) = if_modified_since.and_then(parse_http_date) else {
        return false;
    };
    mod_time.timestamp() <= since.timestamp()
}

/// `Cache-Control` for a served asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Shared caches may keep it for `max-age` seconds
    MaxAge(u32),
    /// Content-hashed bundle output; never changes under the same name
    Immutable,
    /// Always revalidate (the templated index page)
    Revalidate,
}

impl CachePolicy {
    pub fn to_header_value(self) -> String {
        match self {
            Self::MaxAge(max_age) => format!("public, max-age={max_age}"),
            Self::Immutable => "public, max-age=31536000, immutable".to_string(),
            Self::Revalidate => "no-cache".to_string(),
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::MaxAge(3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_generate_etag() {
        let etag = generate_etag(b"hello world");
        assert!(etag.starts_with('"'));
        assert!(etag.ends_with('"'));
        assert!(etag.len() > 2);
    }

    #[test]
    fn test_etag_consistency() {
        assert_eq!(generate_etag(b"same content"), generate_etag(b"same content"));
        assert_ne!(generate_etag(b"content a"), generate_etag(b"content b"));
    }

    #[test]
    fn test_check_etag_match() {
        let etag = "\"abc123\"";
        assert!(check_etag_match(Some("\"abc123\""), etag));
        assert!(check_etag_match(Some("\"xyz\", \"abc123\""), etag));
        assert!(check_etag_match(Some("W/\"abc123\""), etag));
        assert!(check_etag_match(Some("*"), etag));
        assert!(!check_etag_match(Some("\"different\""), etag));
        assert!(!check_etag_match(None, etag));
    }

    #[test]
    fn test_http_date_roundtrip() {
        let t = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        let s = format_http_date(&t);
        assert_eq!(s, "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(parse_http_date(&s), Some(t));
        assert_eq!(parse_http_date("garbage"), None);
    }

    #[test]
    fn test_not_modified_since() {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert!(check_not_modified_since(Some("Tue, 02 Jan 2024 03:04:05 GMT"), &t));
        assert!(check_not_modified_since(Some("Wed, 03 Jan 2024 00:00:00 GMT"), &t));
        assert!(!check_not_modified_since(Some("Mon, 01 Jan 2024 00:00:00 GMT"), &t));
        assert!(!check_not_modified_since(Some("not a date"), &t));
        assert!(!check_not_modified_since(None, &t));
    }

    #[test]
    fn test_cache_policy() {
        assert_eq!(CachePolicy::default().to_header_value(), "public, max-age=3600");
        assert_eq!(
            CachePolicy::Immutable.to_header_value(),
            "public, max-age=31536000, immutable"
        );
        assert_eq!(CachePolicy::Revalidate.to_header_value(), "no-cache");
    }
}
