use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use levelbot::config::{Overrides, ServiceConfig};
use levelbot::consts::default_config_path;
use levelbot::engine::uci::UciEngineFactory;
use levelbot::server;
use levelbot::service::MoveService;

#[derive(Parser)]
#[command(name = "levelbot", version, about = "Chess moves at a chosen strength, over HTTP.")]
struct Cli {
    /// TOML config file (default: ~/.levelbot/config.toml if it exists)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    bind: Option<String>,

    /// UCI engine executable
    #[arg(short, long)]
    engine: Option<PathBuf>,

    /// Extra argument passed to the engine (repeatable)
    #[arg(long = "engine-arg")]
    engine_args: Vec<String>,

    /// Directory containing the network weight files
    #[arg(short, long)]
    weights_dir: Option<PathBuf>,

    /// Neural-net cache entries per engine instance
    #[arg(long)]
    cache_size: Option<u32>,

    /// Abort the process if a search result reaches the wrong request
    #[arg(long, default_value_t = false)]
    abort_on_violation: bool,

    /// Create engines on first use instead of at startup
    #[arg(long, default_value_t = false)]
    no_preload: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let fallback = default_config_path();
    let mut config = ServiceConfig::discover(cli.config.as_deref(), fallback.as_deref())?;
    config.apply(Overrides {
        bind: cli.bind,
        engine_program: cli.engine,
        engine_args: cli.engine_args,
        weights_dir: cli.weights_dir,
        cache_size: cli.cache_size,
        abort_on_violation: cli.abort_on_violation,
        no_preload: cli.no_preload,
    });

    info!(
        version = env!("CARGO_PKG_VERSION"),
        engine = %config.engine.program.display(),
        buckets = config.buckets.buckets().len(),
        policy = ?config.failure_policy,
        "starting"
    );

    let factory = Arc::new(UciEngineFactory::new(&config.engine));
    let service = Arc::new(MoveService::new(factory, &config));

    if config.preload {
        service.preload().await.context("failed to preload engines")?;
    }

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    server::serve(listener, service).await
}
