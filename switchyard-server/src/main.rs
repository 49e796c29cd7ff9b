#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use switchyard_core::{DispatchTable, SwitchyardConfig};
use switchyard_middleware::Resources;
use switchyard_observability::logging;
use switchyard_pipeline::{CompiledRouter, MiddlewareRegistry};
use switchyard_server::{AppState, build_app, routes, serve};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "switchyard", version, about = "Switchyard request dispatcher")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "switchyard.yaml")]
    config: PathBuf,

    /// Log level, overriding `logging.level`
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Config ──
    let config_found = cli.config.exists();
    let config = SwitchyardConfig::load(&cli.config)?;

    // ── Tracing ──
    logging::init(&config.logging, cli.log_level.as_deref())
        .map_err(|e| anyhow::anyhow!("logging init failed: {e}"))?;

    info!(version = env!("CARGO_PKG_VERSION"), app = %config.app.name, "Switchyard starting");
    if config_found {
        info!(path = %cli.config.display(), "Loaded config file");
    } else {
        info!(path = %cli.config.display(), "No config file found, using defaults");
    }

    // ── Store ──
    let store = switchyard_store::open(&config.store)
        .await
        .context("opening access store")?;

    // ── Middleware ──
    let mut registry = MiddlewareRegistry::new();
    let resources = Resources::new(&config, store)?;
    switchyard_middleware::register_all(&mut registry, &config, resources)?;
    info!(middlewares = registry.len(), "Middleware registered");

    // ── Routes ──
    let table = DispatchTable::build(
        &routes::tree(&config.app.name),
        &config.routing.default_middlewares,
        config.routing.duplicate_policy,
    )?;
    let router = CompiledRouter::build(&table, &registry, &config)?;

    // ── Serve ──
    let addr: SocketAddr = config.server.addr.parse().context("server.addr")?;
    let app = build_app(AppState {
        router: Arc::new(router),
        body_limit: config.server.body_limit_bytes,
    });
    serve(addr, app).await?;

    info!("Switchyard stopped");
    Ok(())
}
