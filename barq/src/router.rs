//! HTTP router assembly
//!
//! Mounts the function lifecycle, invocation and stats endpoints, plus
//! CORS (origins from config, since this is meant to be called from a
//! browser-based console) and request tracing.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use barq_runtime::driver::ContainerDriver;
use barq_runtime::function::RuntimeFamily;
use barq_runtime::handlers::{self, EngineState};
use barq_runtime::registry::{FanOutTelemetrySink, InMemoryRegistry};
use barq_runtime::runtimes::go::GoRuntime;
use barq_runtime::runtimes::node::NodeRuntime;
use barq_runtime::runtimes::python::PythonRuntime;
use barq_runtime::runtimes::RuntimeAdapter;
use barq_runtime::{Invoker, WarmPool, WorkspaceStore};
use std::collections::HashMap;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::PoolConfig;

pub fn build_state(pool_config: &PoolConfig) -> anyhow::Result<Arc<EngineState>> {
    let driver = Arc::new(ContainerDriver::new(pool_config.network_mode.clone()));
    let pool = Arc::new(WarmPool::new(
        (*driver).clone(),
        pool_config.max_containers,
        Duration::from_secs(pool_config.container_ttl_secs),
    ));
    pool.start_reaper();

    let registry = Arc::new(InMemoryRegistry::new());
    let telemetry = Arc::new(FanOutTelemetrySink::new());
    let workspace = Arc::new(WorkspaceStore::new()?);

    let mut adapters: HashMap<RuntimeFamily, Arc<dyn RuntimeAdapter>> = HashMap::new();
    adapters.insert(RuntimeFamily::Python, Arc::new(PythonRuntime::new(driver.clone())));
    adapters.insert(RuntimeFamily::Node, Arc::new(NodeRuntime::new(driver.clone())));
    adapters.insert(RuntimeFamily::Go, Arc::new(GoRuntime::new(driver.clone())));

    let invoker = Arc::new(Invoker::new(
        registry.clone(),
        pool.clone(),
        telemetry.clone(),
        workspace.clone(),
        adapters,
    ));

    Ok(Arc::new(EngineState {
        registry,
        pool,
        telemetry,
        workspace,
        invoker,
    }))
}

pub fn create_router(state: Arc<EngineState>, allowed_origins: &str) -> Router {
    let cors = if allowed_origins.trim() == "*" {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = allowed_origins
            .split(',')
            .filter_map(|o| o.trim().parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/functions/runtimes", get(handlers::list_runtimes))
        .route(
            "/functions",
            post(handlers::create_function).get(handlers::list_functions),
        )
        .route(
            "/functions/:func_id",
            get(handlers::get_function).delete(handlers::delete_function),
        )
        .route("/functions/:func_id/invoke", post(handlers::invoke_function))
        .route("/functions/:func_id/stats", get(handlers::function_stats))
        .route("/pool/stats", get(handlers::pool_stats))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
