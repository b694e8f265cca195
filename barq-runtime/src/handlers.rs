//! HTTP handlers for the invocation engine's surface (C2 external interface)
//!
//! Every handler takes a shared [`EngineState`] and returns `axum::Response`
//! directly, building the error body itself, rather than implementing
//! `IntoResponse` for `BarqError` — that keeps the success/error shapes for
//! each endpoint visibly side by side in one function.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use barq_core::BarqError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::function::{FunctionRecord, Runtime};
use crate::invoker::Invoker;
use crate::pool::{PoolStats, WarmPool};
use crate::registry::{FanOutTelemetrySink, FunctionRegistry};
use crate::workspace::WorkspaceStore;

/// Shared state threaded through every handler.
pub struct EngineState {
    pub registry: Arc<dyn FunctionRegistry>,
    pub pool: Arc<WarmPool>,
    pub telemetry: Arc<FanOutTelemetrySink>,
    pub workspace: Arc<WorkspaceStore>,
    pub invoker: Arc<Invoker>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFunctionRequest {
    pub func_id: String,
    pub runtime: String,
    pub entrypoint: String,
    /// Function source, plain text (one file; see [`crate::runtimes::go`] for
    /// the module-naming convention each runtime expects).
    pub code: String,
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u32,
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

fn default_memory_mb() -> u32 {
    128
}

fn default_timeout_secs() -> u32 {
    10
}

#[derive(Debug, Serialize)]
pub struct FunctionResponse {
    pub func_id: String,
    pub runtime: String,
    pub entrypoint: String,
    pub code_hash: String,
    pub memory_mb: u32,
    pub timeout_secs: u32,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<&FunctionRecord> for FunctionResponse {
    fn from(record: &FunctionRecord) -> Self {
        Self {
            func_id: record.func_id.clone(),
            runtime: record.runtime.as_str().to_string(),
            entrypoint: record.entrypoint.clone(),
            code_hash: record.code_hash.clone(),
            memory_mb: record.memory_mb,
            timeout_secs: record.timeout_secs,
            created_at: record.created_at,
        }
    }
}

/// GET /functions/runtimes
pub async fn list_runtimes() -> Json<Vec<&'static str>> {
    Json(Runtime::all().iter().map(Runtime::as_str).collect())
}

/// POST /functions
pub async fn create_function(
    State(state): State<Arc<EngineState>>,
    Json(req): Json<CreateFunctionRequest>,
) -> Response {
    info!(func_id = %req.func_id, runtime = %req.runtime, "CreateFunction");

    let runtime = match Runtime::parse(&req.runtime) {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };
    if let Err(e) = crate::function::Entrypoint::parse(&req.entrypoint) {
        return error_response(&e);
    }

    let filename = entrypoint_filename(&req.entrypoint, runtime);
    let (dir, code_hash) = match state
        .workspace
        .write_code(&req.func_id, &filename, req.code.as_bytes())
        .await
    {
        Ok(v) => v,
        Err(e) => return error_response(&e),
    };

    let record = FunctionRecord {
        func_id: req.func_id.clone(),
        runtime,
        entrypoint: req.entrypoint,
        code_dir: dir.display().to_string(),
        code_hash,
        memory_mb: req.memory_mb,
        timeout_secs: req.timeout_secs,
        environment: req.environment,
        created_at: Utc::now(),
    };

    match state.registry.create(record).await {
        Ok(record) => json_response(StatusCode::CREATED, &FunctionResponse::from(&record)),
        Err(e) => {
            state.workspace.remove(&req.func_id).await;
            error_response(&e)
        }
    }
}

/// GET /functions
pub async fn list_functions(State(state): State<Arc<EngineState>>) -> Json<Vec<FunctionResponse>> {
    let records = state.registry.list().await;
    Json(records.iter().map(FunctionResponse::from).collect())
}

/// GET /functions/:func_id
pub async fn get_function(
    State(state): State<Arc<EngineState>>,
    Path(func_id): Path<String>,
) -> Response {
    match state.registry.get(&func_id).await {
        Ok(record) => json_response(StatusCode::OK, &FunctionResponse::from(&record)),
        Err(e) => error_response(&e),
    }
}

/// DELETE /functions/:func_id
pub async fn delete_function(
    State(state): State<Arc<EngineState>>,
    Path(func_id): Path<String>,
) -> Response {
    match state.registry.delete(&func_id).await {
        Ok(()) => {
            state.workspace.remove(&func_id).await;
            Response::builder().status(StatusCode::NO_CONTENT).body(Body::empty()).unwrap()
        }
        Err(e) => error_response(&e),
    }
}

/// POST /functions/:func_id/invoke
pub async fn invoke_function(
    State(state): State<Arc<EngineState>>,
    Path(func_id): Path<String>,
    Json(event): Json<serde_json::Value>,
) -> Response {
    match state.invoker.invoke(&func_id, event).await {
        Ok((result, telemetry)) => {
            let body = serde_json::json!({
                "success": result.success,
                "output": result.output,
                "error": result.error,
                "execution_type": telemetry.execution_type.as_str(),
                "request_id": telemetry.request_id,
                "total_ms": telemetry.total_ms,
            });
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        }
        Err(e) => {
            error!(func_id = %func_id, error = %e, "invocation failed");
            error_response(&e)
        }
    }
}

/// GET /functions/:func_id/stats
pub async fn function_stats(
    State(state): State<Arc<EngineState>>,
    Path(func_id): Path<String>,
) -> Response {
    if state.registry.get(&func_id).await.is_err() {
        return error_response(&BarqError::FunctionNotFound(func_id));
    }
    json_response(StatusCode::OK, &state.telemetry.stats_for(&func_id))
}

/// GET /pool/stats
pub async fn pool_stats(State(state): State<Arc<EngineState>>) -> Json<PoolStats> {
    Json(state.pool.stats())
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

fn entrypoint_filename(entrypoint: &str, runtime: Runtime) -> String {
    use crate::function::{Entrypoint, RuntimeFamily};
    let module = Entrypoint::parse(entrypoint).map(|e| e.module).unwrap_or_else(|_| "handler".to_string());
    match runtime.family() {
        RuntimeFamily::Python => format!("{module}.py"),
        RuntimeFamily::Node => format!("{module}.js"),
        RuntimeFamily::Go => format!("{module}.go"),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap_or_default()))
        .unwrap()
}

fn error_response(err: &BarqError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(err.to_json()))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entrypoint_filename_matches_family_extension() {
        assert_eq!(entrypoint_filename("handler.main", Runtime::Python311), "handler.py");
        assert_eq!(entrypoint_filename("index.handler", Runtime::Nodejs20), "index.js");
        assert_eq!(entrypoint_filename("handler.Handle", Runtime::Go1), "handler.go");
    }
}
