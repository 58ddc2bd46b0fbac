use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use ratel::config::{AppState, Config, Overrides};
use ratel::{logger, server};

/// Backend server for the Ratel Dgraph UI
#[derive(Debug, Parser)]
#[command(name = "ratel", version, about)]
struct Args {
    /// Configuration file (TOML); missing file is not an error
    #[arg(long, default_value = "ratel.toml")]
    config: String,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Dgraph alpha address shown to the UI (and forwarded to in proxy mode)
    #[arg(long)]
    addr: Option<String>,

    /// Interface to bind
    #[arg(long)]
    listen_addr: Option<String>,

    /// Deployment mode: static or proxy
    #[arg(long, value_parser = ["static", "proxy"])]
    mode: Option<String>,

    /// Directory holding the built UI
    #[arg(long)]
    assets: Option<String>,

    /// SQLite database for saved queries; unset disables the feature
    #[arg(long, env = "RATEL_QUERIES_DB")]
    queries_db: Option<String>,

    /// YAML file with preloaded queries; unset disables the feature
    #[arg(long, env = "RATEL_PRELOADED_QUERIES")]
    preloaded_queries: Option<String>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            listen_addr: self.listen_addr.clone(),
            addr: self.addr.clone(),
            mode: self.mode.clone(),
            assets_dir: self.assets.clone(),
            queries_db: self.queries_db.clone(),
            preloaded_queries: self.preloaded_queries.clone(),
        }
    }
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("ratel: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::load_from(&args.config, &args.overrides())?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    logger::init(&cfg)?;

    let addr = cfg.get_socket_addr()?;
    let state = Arc::new(AppState::initialize(cfg)?);
    let listener = server::create_reusable_listener(addr)
        .map_err(|e| format!("Failed to bind {addr}: {e}"))?;

    logger::log_server_start(&addr, &state.config, &state.backend_addr);

    let shutdown = Arc::new(Notify::new());
    server::start_signal_handler(Arc::clone(&shutdown))?;

    let drain_timeout = Duration::from_secs(state.config.performance.write_timeout);
    server::run(listener, state, shutdown, drain_timeout).await;
    Ok(())
}
