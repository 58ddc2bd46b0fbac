//! Forwarding client for the proxy deployment mode
//!
//! Builds a fresh outbound request from each inbound one and relays the
//! backend's answer. The inbound request is never rewritten in place.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST};
use hyper::http::request::Parts;
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

use crate::api::error_response;
use crate::logger;

/// Headers that describe a single hop and must not be relayed
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid backend url '{0}'")]
    InvalidBackend(String),
    #[error("only http:// backends can be proxied, got '{0}'")]
    UnsupportedScheme(String),
    #[error("failed to build outbound request: {0}")]
    Build(#[from] hyper::http::Error),
    #[error("backend request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
    #[error("failed to read backend response: {0}")]
    Body(#[from] hyper::Error),
    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),
}

pub struct ForwardClient {
    scheme_authority: String,
    base_path: String,
    authority: HeaderValue,
    strip_prefix: String,
    /// Bound on one exchange, response body included; zero means unbounded
    timeout: Duration,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl ForwardClient {
    /// Create a forwarder for one backend
    ///
    /// # Arguments
    ///
    /// * `backend` - validated address such as `http://alpha:8080`
    /// * `strip_prefix` - inbound path prefix removed before forwarding
    /// * `timeout` - how long to wait for the backend before answering 504; zero waits forever
    pub fn new(backend: &str, strip_prefix: &str, timeout: Duration) -> Result<Self, ProxyError> {
        let uri: Uri = backend
            .parse()
            .map_err(|_| ProxyError::InvalidBackend(backend.to_string()))?;
        if uri.scheme_str() != Some("http") {
            return Err(ProxyError::UnsupportedScheme(backend.to_string()));
        }
        let authority = uri
            .authority()
            .ok_or_else(|| ProxyError::InvalidBackend(backend.to_string()))?;
        let host = authority.as_str().rsplit_once('@').map_or(authority.as_str(), |(_, h)| h);
        let authority_header = HeaderValue::from_str(host)
            .map_err(|_| ProxyError::InvalidBackend(backend.to_string()))?;

        Ok(Self {
            scheme_authority: format!("http://{authority}"),
            base_path: uri.path().trim_end_matches('/').to_string(),
            authority: authority_header,
            strip_prefix: strip_prefix.trim_end_matches('/').to_string(),
            timeout,
            client: Client::builder(TokioExecutor::new()).build_http(),
        })
    }

    /// Outbound path + query for an inbound URI
    fn target_uri(&self, inbound: &Uri) -> Result<Uri, ProxyError> {
        let path = inbound.path();
        let rest = path.strip_prefix(self.strip_prefix.as_str()).unwrap_or(path);
        let rest = if rest.starts_with('/') || rest.is_empty() {
            rest.to_string()
        } else {
            format!("/{rest}")
        };
        let query = inbound.query().map(|q| format!("?{q}")).unwrap_or_default();

        let target = format!("{}{}{rest}{query}", self.scheme_authority, self.base_path);
        target
            .parse()
            .map_err(|_| ProxyError::InvalidBackend(target))
    }

    /// Build the outbound request
    pub fn build_outbound(
        &self,
        parts: &Parts,
        body: Bytes,
        peer: Option<IpAddr>,
    ) -> Result<Request<Full<Bytes>>, ProxyError> {
        let mut builder = Request::builder()
            .method(parts.method.clone())
            .uri(self.target_uri(&parts.uri)?);

        if let Some(headers) = builder.headers_mut() {
            copy_end_to_end(&parts.headers, headers);
            headers.insert(HOST, self.authority.clone());
            if let Some(ip) = peer {
                append_forwarded_for(headers, ip);
            }
        }

        Ok(builder.body(Full::new(body))?)
    }

    /// Send the request to the backend and relay the answer
    ///
    /// Failures never reach the caller as errors: a backend that is slower
    /// than the configured timeout yields 504, any other failure 502.
    pub async fn forward(
        &self,
        parts: &Parts,
        body: Bytes,
        peer: Option<IpAddr>,
    ) -> Response<Full<Bytes>> {
        let exchange = self.try_forward(parts, body, peer);
        let result = if self.timeout.is_zero() {
            exchange.await
        } else {
            tokio::time::timeout(self.timeout, exchange)
                .await
                .unwrap_or(Err(ProxyError::Timeout(self.timeout)))
        };
        match result {
            Ok(resp) => resp,
            Err(e @ ProxyError::Timeout(_)) => {
                logger::log_error(&format!("Proxy {} {}: {e}", parts.method, parts.uri));
                error_response(StatusCode::GATEWAY_TIMEOUT, "Backend timed out")
            }
            Err(e) => {
                logger::log_error(&format!("Proxy {} {}: {e}", parts.method, parts.uri));
                error_response(StatusCode::BAD_GATEWAY, "Backend unavailable")
            }
        }
    }

    async fn try_forward(
        &self,
        parts: &Parts,
        body: Bytes,
        peer: Option<IpAddr>,
    ) -> Result<Response<Full<Bytes>>, ProxyError> {
        let outbound = self.build_outbound(parts, body, peer)?;
        let upstream = self.client.request(outbound).await?;
        let (up_parts, up_body) = upstream.into_parts();
        let bytes = up_body.collect().await?.to_bytes();

        let mut resp = Response::new(Full::new(bytes));
        *resp.status_mut() = up_parts.status;
        copy_end_to_end(&up_parts.headers, resp.headers_mut());
        Ok(resp)
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Extra hop-by-hop names announced in `Connection` (RFC 7230 section 6.1)
fn connection_listed(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn copy_end_to_end(from: &HeaderMap, to: &mut HeaderMap) {
    let listed = connection_listed(from);
    for (name, value) in from {
        if is_hop_by_hop(name) || listed.iter().any(|l| l == name.as_str()) {
            continue;
        }
        to.append(name.clone(), value.clone());
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let value = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {ip}"),
        None => ip.to_string(),
    };
    if let Ok(v) = HeaderValue::from_str(&value) {
        headers.insert("x-forwarded-for", v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn parts_for(uri: &str) -> Parts {
        let (parts, ()) = Request::builder()
            .method("POST")
            .uri(uri)
            .header("host", "ratel.local:8000")
            .header("content-type", "application/json")
            .header("connection", "keep-alive")
            .header("x-dgraph-accesstoken", "tok")
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[tokio::test]
    async fn test_outbound_request() {
        let client = ForwardClient::new("http://alpha:8080", "/api", WAIT).unwrap();
        let parts = parts_for("/api/query?timeout=20s");
        let out = client
            .build_outbound(&parts, Bytes::from_static(b"{}"), Some("10.0.0.1".parse().unwrap()))
            .unwrap();

        assert_eq!(out.method(), "POST");
        assert_eq!(out.uri().to_string(), "http://alpha:8080/query?timeout=20s");
        assert_eq!(out.headers()["host"], "alpha:8080");
        assert_eq!(out.headers()["content-type"], "application/json");
        assert_eq!(out.headers()["x-dgraph-accesstoken"], "tok");
        assert_eq!(out.headers()["x-forwarded-for"], "10.0.0.1");
        assert!(out.headers().get("connection").is_none());
    }

    #[tokio::test]
    async fn test_backend_base_path_is_kept() {
        let client = ForwardClient::new("http://alpha:8080/dgraph/", "/api", WAIT).unwrap();
        let parts = parts_for("/api/mutate");
        let out = client.build_outbound(&parts, Bytes::new(), None).unwrap();
        assert_eq!(out.uri().to_string(), "http://alpha:8080/dgraph/mutate");
    }

    #[tokio::test]
    async fn test_inbound_untouched() {
        let client = ForwardClient::new("http://alpha:8080", "/api", WAIT).unwrap();
        let parts = parts_for("/api/health");
        let _ = client.build_outbound(&parts, Bytes::new(), None).unwrap();
        assert_eq!(parts.uri, "/api/health");
        assert_eq!(parts.headers["host"], "ratel.local:8000");
    }

    #[test]
    fn test_rejects_https_backend() {
        assert!(matches!(
            ForwardClient::new("https://alpha", "/api", WAIT),
            Err(ProxyError::UnsupportedScheme(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_listed_headers_dropped() {
        let client = ForwardClient::new("http://alpha:8080", "/api", WAIT).unwrap();
        let (parts, ()) = Request::builder()
            .uri("/api/query")
            .header("connection", "keep-alive, X-Session-Hint")
            .header("connection", "x-trace")
            .header("x-session-hint", "abc")
            .header("x-trace", "1")
            .header("x-dgraph-accesstoken", "tok")
            .body(())
            .unwrap()
            .into_parts();
        let out = client.build_outbound(&parts, Bytes::new(), None).unwrap();

        assert!(out.headers().get("x-session-hint").is_none());
        assert!(out.headers().get("x-trace").is_none());
        assert!(out.headers().get("connection").is_none());
        assert_eq!(out.headers()["x-dgraph-accesstoken"], "tok");
    }

    #[tokio::test]
    async fn test_relays_backend_answer() {
        let backend = test_backend::spawn(Duration::ZERO).await;
        let client = ForwardClient::new(&format!("http://{backend}"), "/api", WAIT).unwrap();
        let parts = parts_for("/api/teapot?debug=true");
        let resp = client.forward(&parts, Bytes::new(), None).await;

        assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(resp.headers()["x-seen-host"], backend.to_string());
        assert!(resp.headers().get("x-backend-private").is_none());
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"POST /teapot?debug=true");
    }

    #[tokio::test]
    async fn test_slow_backend_is_504() {
        let backend = test_backend::spawn(Duration::from_secs(2)).await;
        let client =
            ForwardClient::new(&format!("http://{backend}"), "/api", Duration::from_millis(200)).unwrap();
        let resp = client.forward(&parts_for("/api/query"), Bytes::new(), None).await;
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"error":"Backend timed out"}"#);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_502() {
        let backend = test_backend::unused_addr();
        let client = ForwardClient::new(&format!("http://{backend}"), "/api", WAIT).unwrap();
        let resp = client.forward(&parts_for("/api/query"), Bytes::new(), None).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}

/// Minimal HTTP backend for forwarding tests
#[cfg(test)]
pub(crate) mod test_backend {
    use http_body_util::Full;
    use hyper::body::{Bytes, Incoming};
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::time::Duration;

    /// Serve on an ephemeral port. Every answer echoes `"{method} {path?query}"`
    /// after `delay`, reports the Host it saw in `x-seen-host`, and tries to
    /// smuggle `x-backend-private` through a `Connection` listing. Paths ending
    /// in `/teapot` answer 418.
    pub async fn spawn(delay: Duration) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let service = service_fn(move |req: Request<Incoming>| async move {
                    tokio::time::sleep(delay).await;
                    let seen_host = req
                        .headers()
                        .get("host")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    let target = req.uri().path_and_query().map_or("/", |pq| pq.as_str());
                    let status = if req.uri().path().ends_with("/teapot") {
                        StatusCode::IM_A_TEAPOT
                    } else {
                        StatusCode::OK
                    };
                    let resp = Response::builder()
                        .status(status)
                        .header("x-seen-host", seen_host)
                        .header("connection", "x-backend-private")
                        .header("x-backend-private", "1")
                        .body(Full::new(Bytes::from(format!("{} {target}", req.method()))))
                        .unwrap();
                    Ok::<_, Infallible>(resp)
                });
                tokio::spawn(http1::Builder::new().serve_connection(TokioIo::new(stream), service));
            }
        });
        addr
    }

    /// An address nothing is listening on
    pub fn unused_addr() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }
}
