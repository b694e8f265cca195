//! barq - containerized function invocation engine
//!
//! Runs functions in Docker containers, reusing warm containers across
//! calls where possible to cut cold-start latency.

mod config;
mod router;

use clap::Parser;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::PoolConfig;

#[derive(Parser, Debug)]
#[command(name = "barq")]
#[command(about = "Containerized function invocation engine", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "BARQ_PORT")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "BARQ_HOST")]
    host: String,

    /// Maximum concurrent warm containers
    #[arg(long, default_value = "10", env = "BARQ_MAX_CONTAINERS")]
    max_containers: usize,

    /// Warm container idle TTL in seconds
    #[arg(long, default_value = "300", env = "BARQ_CONTAINER_TTL")]
    container_ttl_secs: u64,

    /// Docker network mode (bridge or host)
    #[arg(long, default_value = "bridge", env = "BARQ_NETWORK")]
    network_mode: String,

    /// Comma-separated list of allowed CORS origins, or "*"
    #[arg(long, default_value = "http://localhost:3000", env = "BARQ_ALLOWED_ORIGINS")]
    allowed_origins: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "BARQ_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("barq={},tower_http=debug", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting barq...");
    info!(max_containers = args.max_containers, network = %args.network_mode, "warm pool configured");

    let pool_config = PoolConfig {
        max_containers: args.max_containers,
        container_ttl_secs: args.container_ttl_secs,
        network_mode: args.network_mode.clone(),
    };

    let state = router::build_state(&pool_config)?;
    let pool = state.pool.clone();
    let app = router::create_router(state, &args.allowed_origins);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received, draining warm pool");
            pool.shutdown().await;
        })
        .await?;

    Ok(())
}
