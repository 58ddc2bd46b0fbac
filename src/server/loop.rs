// Server loop module
// Accepts connections until the shutdown notification fires

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Run the accept loop; returns once `shutdown` is notified and in-flight
/// connections have finished or `drain_timeout` has elapsed
pub async fn run(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: Arc<Notify>,
    drain_timeout: Duration,
) {
    let active_connections = Arc::new(AtomicUsize::new(0));

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    accept_connection(stream, peer_addr, &state, &active_connections);
                }
                Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
            },
            () = shutdown.notified() => break,
        }
    }

    drop(listener);
    let open = active_connections.load(Ordering::SeqCst);
    if open > 0 {
        logger::log_info(&format!("Waiting for {open} open connection(s) to finish"));
    }
    let drained = tokio::time::timeout(drain_timeout, async {
        while active_connections.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(DRAIN_POLL).await;
        }
    })
    .await;
    if drained.is_err() {
        logger::log_warning(&format!(
            "Shutting down with {} connection(s) still open",
            active_connections.load(Ordering::SeqCst)
        ));
    }
    logger::log_info("Server stopped");
}
