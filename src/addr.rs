//! Backend address validation
//!
//! Normalizes the operator-supplied Dgraph address into `scheme://authority[path]`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddrError {
    /// No backend configured; callers treat this as non-fatal
    #[error("addr is empty")]
    Empty,
    #[error("host is empty")]
    HostEmpty,
    #[error("addr should be of the form \"[scheme:]//[userinfo@]host[path]\"")]
    Malformed,
}

/// Validate and normalize a backend address
///
/// # Examples
/// ```
/// use ratel::addr::{validate_addr, AddrError};
///
/// assert_eq!(validate_addr("localhost:8080").unwrap(), "http://localhost:8080");
/// assert_eq!(validate_addr(""), Err(AddrError::Empty));
/// ```
pub fn validate_addr(raw: &str) -> Result<String, AddrError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AddrError::Empty);
    }

    // "host:port" parses as scheme "host" with an opaque part; treat it as
    // a missing scheme, same as a bare host.
    let (scheme, rest) = match split_scheme(raw) {
        Some((scheme, rest)) if rest.starts_with('/') => (scheme.to_ascii_lowercase(), rest),
        _ => ("http".to_string(), raw),
    };
    let rest = rest.strip_prefix("//").unwrap_or(rest);

    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let (authority, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };

    if authority.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AddrError::Malformed);
    }
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    // A bare port (`http://:8080`) still names a host: the local one
    if host.is_empty() {
        return Err(AddrError::HostEmpty);
    }

    Ok(format!("{scheme}://{authority}{path}"))
}

/// Split a leading URL scheme (`[A-Za-z][A-Za-z0-9+.-]*:`)
fn split_scheme(raw: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = raw.split_once(':')?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(validate_addr(""), Err(AddrError::Empty));
        assert_eq!(validate_addr("   "), Err(AddrError::Empty));
        assert_eq!(AddrError::Empty.to_string(), "addr is empty");
    }

    #[test]
    fn test_opaque_gets_http_prefix() {
        assert_eq!(validate_addr("localhost:8080").unwrap(), "http://localhost:8080");
        assert_eq!(validate_addr("127.0.0.1:8080").unwrap(), "http://127.0.0.1:8080");
        assert_eq!(validate_addr("dgraph").unwrap(), "http://dgraph");
    }

    #[test]
    fn test_full_url_kept() {
        assert_eq!(
            validate_addr("HTTPS://dg.example.com:443/graphql").unwrap(),
            "https://dg.example.com:443/graphql"
        );
        assert_eq!(
            validate_addr("http://user:pw@alpha:8080").unwrap(),
            "http://user:pw@alpha:8080"
        );
    }

    #[test]
    fn test_query_and_fragment_dropped() {
        assert_eq!(
            validate_addr("http://alpha:8080/x?debug=true#frag").unwrap(),
            "http://alpha:8080/x"
        );
        assert_eq!(validate_addr("http://alpha?").unwrap(), "http://alpha");
    }

    #[test]
    fn test_host_empty() {
        assert_eq!(validate_addr("ftp://"), Err(AddrError::HostEmpty));
        assert_eq!(validate_addr("ftp:///x"), Err(AddrError::HostEmpty));
        assert_eq!(validate_addr("http://user@"), Err(AddrError::HostEmpty));
        assert_eq!(AddrError::HostEmpty.to_string(), "host is empty");
    }

    #[test]
    fn test_port_only_authority() {
        assert_eq!(validate_addr("http://:8080"), Ok("http://:8080".to_string()));
        assert_eq!(validate_addr("HTTP://:8080/ui"), Ok("http://:8080/ui".to_string()));
    }

    #[test]
    fn test_malformed() {
        assert_eq!(validate_addr("http://bad host"), Err(AddrError::Malformed));
    }
}
