// Connection handling module
// One spawned task per accepted TCP connection

use http_body_util::Full;
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::{HeaderValue, SERVER};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::error_response;
use crate::config::AppState;
use crate::handler;
use crate::logger::{self, AccessLogEntry};

/// Bounds on how often an open connection is checked for idleness
const MIN_IDLE_TICK: Duration = Duration::from_millis(50);
const MAX_IDLE_TICK: Duration = Duration::from_secs(1);

/// Admit a connection if under `max_connections`, then serve it on its own task
///
/// # Arguments
///
/// * `stream` - the accepted socket
/// * `peer_addr` - remote address of `stream`
/// * `state` - shared application state
/// * `conn_counter` - open connections; decremented when the task finishes
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    conn_counter: &Arc<AtomicUsize>,
) {
    // Increment first so concurrent accepts cannot both slip under the limit
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);
    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Rejected {peer_addr}"
            ));
            return;
        }
    }

    let state = Arc::clone(state);
    let conn_counter = Arc::clone(conn_counter);
    tokio::spawn(async move {
        serve_connection(stream, peer_addr, &state).await;
        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}

/// Requests in flight and the time of the last request activity on one connection
struct ConnActivity {
    opened: Instant,
    in_flight: AtomicUsize,
    /// Milliseconds since `opened`
    last_active_ms: AtomicU64,
}

impl ConnActivity {
    fn new() -> Self {
        Self {
            opened: Instant::now(),
            in_flight: AtomicUsize::new(0),
            last_active_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = u64::try_from(self.opened.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_active_ms.store(now, Ordering::SeqCst);
    }

    /// Mark a request as started; it counts as in flight until the guard drops
    fn enter(&self) -> InFlight<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        InFlight(self)
    }

    /// How long the connection has had nothing to do; `None` while a request is running
    fn idle_for(&self) -> Option<Duration> {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return None;
        }
        let last = Duration::from_millis(self.last_active_ms.load(Ordering::SeqCst));
        Some(self.opened.elapsed().saturating_sub(last))
    }
}

struct InFlight<'a>(&'a ConnActivity);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.touch();
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serve HTTP/1.1 on one connection until the client leaves or it sits idle
///
/// `read_timeout` bounds only the arrival of request headers. A request that is
/// being handled is never cut off at the connection level; its duration is bounded
/// by `request_timeout` in `respond`. Between requests the connection is closed
/// gracefully once it has been idle for `keep_alive_timeout`.
async fn serve_connection(stream: tokio::net::TcpStream, peer_addr: SocketAddr, state: &Arc<AppState>) {
    let perf = &state.config.performance;

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .keep_alive(perf.keep_alive_timeout > 0);
    if perf.read_timeout > 0 {
        builder.header_read_timeout(Duration::from_secs(perf.read_timeout));
    }

    let activity = Arc::new(ConnActivity::new());
    let service_state = Arc::clone(state);
    let service_activity = Arc::clone(&activity);
    let service = service_fn(move |req: Request<Incoming>| {
        let state = Arc::clone(&service_state);
        let activity = Arc::clone(&service_activity);
        async move {
            let _in_flight = activity.enter();
            Ok::<_, Infallible>(respond(req, &state, peer_addr).await)
        }
    });

    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = if perf.keep_alive_timeout == 0 {
        conn.await
    } else {
        let idle_limit = Duration::from_secs(perf.keep_alive_timeout);
        let tick = (idle_limit / 4).clamp(MIN_IDLE_TICK, MAX_IDLE_TICK);
        let mut closing = false;
        loop {
            tokio::select! {
                res = conn.as_mut() => break res,
                () = tokio::time::sleep(tick), if !closing => {
                    if activity.idle_for().is_some_and(|idle| idle >= idle_limit) {
                        logger::log_debug(&format!(
                            "Closing idle connection from {peer_addr} after {}s",
                            idle_limit.as_secs()
                        ));
                        conn.as_mut().graceful_shutdown();
                        closing = true;
                    }
                }
            }
        }
    };
    if let Err(err) = result {
        logger::log_connection_error(&err);
    }
}

/// Route one request, stamp the `Server` header and write the access line
///
/// # Arguments
///
/// * `req` - the request as read from the connection
/// * `state` - shared application state
/// * `peer_addr` - client address, used for the access log and `X-Forwarded-For`
async fn respond<B>(req: Request<B>, state: &AppState, peer_addr: SocketAddr) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    let entry = state.access_log_enabled().then(|| {
        AccessLogEntry::from_request(
            peer_addr.ip().to_string(),
            req.method(),
            req.uri(),
            req.version(),
            req.headers(),
        )
    });
    let target = format!("{} {}", req.method(), req.uri().path());

    let handled = handler::handle_request(req, state, Some(peer_addr.ip()));
    let request_timeout = state.config.performance.request_timeout;
    let mut resp = if request_timeout == 0 {
        handled.await
    } else {
        match tokio::time::timeout(Duration::from_secs(request_timeout), handled).await {
            Ok(resp) => resp,
            Err(_) => {
                logger::log_error(&format!("{target} from {peer_addr} exceeded {request_timeout}s"));
                error_response(StatusCode::GATEWAY_TIMEOUT, "Request timed out")
            }
        }
    };

    if let Ok(name) = HeaderValue::from_str(&state.config.http.server_name) {
        resp.headers_mut().insert(SERVER, name);
    }

    if let Some(mut entry) = entry {
        entry.status = resp.status().as_u16();
        entry.body_bytes = resp.body().size_hint().exact().unwrap_or(0);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Overrides};
    use crate::http::Content;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use hyper::body::Frame;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// A request body whose bytes never arrive
    struct StalledBody;

    impl Body for StalledBody {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
            Poll::Pending
        }
    }

    fn state_with(configure: impl FnOnce(&mut Config)) -> AppState {
        let mut config = Config::load_from("ratel-test-nonexistent", &Overrides::default()).unwrap();
        config.logging.access_log = false;
        configure(&mut config);
        let index = Content::new("index.html", Utc::now(), "<html>ratel</html>");
        AppState::new(config, String::new(), None, None, index)
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_stalled_request_is_504() {
        let state = state_with(|c| c.performance.request_timeout = 1);
        let req = Request::builder()
            .method("POST")
            .uri("/api/saved-queries")
            .body(StalledBody)
            .unwrap();

        let resp = tokio::time::timeout(Duration::from_secs(5), respond(req, &state, peer()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(resp.headers()["server"], "Ratel");
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"error":"Request timed out"}"#);
    }

    #[tokio::test]
    async fn test_server_header() {
        let state = state_with(|c| c.http.server_name = "ratel-test".to_string());
        let req = Request::builder()
            .uri("/healthz")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = respond(req, &state, peer()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["server"], "ratel-test");
    }

    #[test]
    fn test_activity_tracks_in_flight() {
        let activity = ConnActivity::new();
        assert!(activity.idle_for().is_some());
        {
            let _guard = activity.enter();
            assert!(activity.idle_for().is_none());
        }
        let idle = activity.idle_for().unwrap();
        assert!(idle < Duration::from_secs(1));
    }
}
