//! Logger module
//!
//! Server lifecycle messages, access lines and errors. Informational output and
//! access lines share one destination; warnings and errors go to the other.

mod format;
pub mod writer;

pub use format::AccessLogEntry;

use crate::config::{Config, DeploymentMode};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Severity threshold, ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    /// Unknown names fall back to `info`
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Debug,
            2 => Self::Warn,
            3 => Self::Error,
            _ => Self::Info,
        }
    }
}

static LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

fn enabled(level: Level) -> bool {
    level >= Level::from_u8(LEVEL.load(Ordering::Relaxed))
}

/// Set the level and open log files; call once at startup
pub fn init(config: &Config) -> std::io::Result<()> {
    LEVEL.store(Level::parse(&config.logging.level) as u8, Ordering::Relaxed);
    writer::init(
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
    )
}

fn write_info(message: &str) {
    match writer::get() {
        Some(w) => w.write_access(message),
        None => println!("{message}"),
    }
}

fn write_error(message: &str) {
    match writer::get() {
        Some(w) => w.write_error(message),
        None => eprintln!("{message}"),
    }
}

fn stamp() -> String {
    chrono::Local::now().format("%Y/%m/%d %H:%M:%S").to_string()
}

pub fn log_debug(message: &str) {
    if enabled(Level::Debug) {
        write_info(&format!("{} [DEBUG] {message}", stamp()));
    }
}

pub fn log_info(message: &str) {
    if enabled(Level::Info) {
        write_info(&format!("{} [INFO] {message}", stamp()));
    }
}

pub fn log_warning(message: &str) {
    if enabled(Level::Warn) {
        write_error(&format!("{} [WARN] {message}", stamp()));
    }
}

pub fn log_error(message: &str) {
    write_error(&format!("{} [ERROR] {message}", stamp()));
}

pub fn log_server_start(addr: &SocketAddr, config: &Config, backend_addr: &str) {
    log_info("======================================");
    log_info(&format!("Ratel listening on http://{addr}"));
    match config.backend.mode {
        DeploymentMode::Static => log_info(&format!(
            "Serving UI from '{}'",
            config.assets.dir.display()
        )),
        DeploymentMode::Proxy => log_info(&format!(
            "Proxying {} to {backend_addr}",
            config.backend.proxy_prefix
        )),
    }
    if !backend_addr.is_empty() {
        log_info(&format!("Dgraph address: {backend_addr}"));
    }
    if let Some(workers) = config.server.workers {
        log_info(&format!("Worker threads: {workers}"));
    }
    if let Some(ref path) = config.logging.access_log_file {
        log_info(&format!("Access log: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        log_info(&format!("Error log: {path}"));
    }
    log_info("======================================");
}

pub fn log_connection_error(err: &impl std::fmt::Display) {
    log_debug(&format!("Connection closed with error: {err}"));
}

pub fn log_access(entry: &AccessLogEntry, format: &str) {
    write_info(&entry.format(format));
}

pub fn log_api_request(method: &str, path: &str, status: u16) {
    log_debug(&format!("[API] {method} {path} - {status}"));
}
