//! The invocation algorithm (C2 orchestration)
//!
//! `Invoker::invoke` is the two-tier dispatch: try a warm container first,
//! fall back to a cold run if the pool has nothing to offer or the warm
//! dispatch itself fails, and after a cold run succeeds, opportunistically
//! warm a container in the background so the next call can reuse it. The
//! opportunistic warm-up never blocks the response and its failure is
//! swallowed — the caller already has their answer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use barq_core::BarqError;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::function::RuntimeFamily;
use crate::invocation::{ExecutionResult, ExecutionTelemetry, ExecutionType};
use crate::pool::WarmPool;
use crate::registry::{FanOutTelemetrySink, FunctionRegistry};
use crate::runtimes::RuntimeAdapter;
use crate::workspace::WorkspaceStore;

pub struct Invoker {
    registry: Arc<dyn FunctionRegistry>,
    pool: Arc<WarmPool>,
    telemetry: Arc<FanOutTelemetrySink>,
    workspace: Arc<WorkspaceStore>,
    adapters: HashMap<RuntimeFamily, Arc<dyn RuntimeAdapter>>,
}

impl Invoker {
    pub fn new(
        registry: Arc<dyn FunctionRegistry>,
        pool: Arc<WarmPool>,
        telemetry: Arc<FanOutTelemetrySink>,
        workspace: Arc<WorkspaceStore>,
        adapters: HashMap<RuntimeFamily, Arc<dyn RuntimeAdapter>>,
    ) -> Self {
        Self {
            registry,
            pool,
            telemetry,
            workspace,
            adapters,
        }
    }

    pub async fn invoke(
        &self,
        func_id: &str,
        event: Value,
    ) -> Result<(ExecutionResult, ExecutionTelemetry), BarqError> {
        let record = self.registry.get(func_id).await?;
        let adapter = self
            .adapters
            .get(&record.runtime.family())
            .ok_or_else(|| BarqError::RuntimeUnsupported(record.runtime.as_str().to_string()))?
            .clone();
        let workspace_dir = self.workspace.dir_for(func_id);
        let request_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let mut execution_type = ExecutionType::Cold;
        let mut container_id: Option<String> = None;
        let mut coldstart_ms: Option<f64> = None;

        let result = if let Some(borrowed) = self.pool.borrow(func_id, &record.code_hash) {
            match adapter.run_warm(&borrowed, &workspace_dir, &event).await {
                Ok(result) => {
                    self.pool.return_container(&borrowed);
                    execution_type = ExecutionType::Reused;
                    container_id = Some(borrowed);
                    Ok(result)
                }
                Err(e) => {
                    warn!(func_id, container_id = %borrowed, error = %e, "warm dispatch failed, falling back to cold");
                    self.pool.remove(&borrowed);
                    self.run_cold_and_warm_up(adapter.clone(), &record, &workspace_dir, &event, &mut coldstart_ms)
                        .await
                }
            }
        } else {
            self.run_cold_and_warm_up(adapter.clone(), &record, &workspace_dir, &event, &mut coldstart_ms)
                .await
        };

        let total_ms = started.elapsed().as_secs_f64() * 1000.0;
        let result = result?;

        let telemetry = ExecutionTelemetry {
            request_id,
            func_id: func_id.to_string(),
            timestamp: Utc::now(),
            execution_type,
            success: result.success,
            coldstart_ms,
            execution_ms: Some(total_ms),
            total_ms: Some(total_ms),
            container_id,
        };
        self.telemetry.record(telemetry.clone()).await;

        Ok((result, telemetry))
    }

    /// Cold execution path. On success, a warm-up for the next call is
    /// spawned in the background; its outcome is never awaited here, and a
    /// failure there does not affect the response already computed.
    async fn run_cold_and_warm_up(
        &self,
        adapter: Arc<dyn RuntimeAdapter>,
        record: &crate::function::FunctionRecord,
        workspace_dir: &std::path::Path,
        event: &Value,
        coldstart_ms: &mut Option<f64>,
    ) -> Result<ExecutionResult, BarqError> {
        let cold_started = Instant::now();
        let result = adapter.run_cold(record, workspace_dir, event).await;
        *coldstart_ms = Some(cold_started.elapsed().as_secs_f64() * 1000.0);

        if result.is_ok() {
            let adapter = adapter.clone();
            let record = record.clone();
            let workspace_dir = workspace_dir.to_path_buf();
            let pool = self.pool.clone();
            tokio::spawn(async move {
                match adapter.warm_up(&record, &workspace_dir).await {
                    Ok(container_id) => {
                        pool.insert(container_id, record.func_id.clone(), record.runtime, record.code_hash.clone());
                        info!(func_id = %record.func_id, "opportunistic warm-up succeeded");
                    }
                    Err(e) => {
                        warn!(func_id = %record.func_id, error = %e, "opportunistic warm-up failed");
                    }
                }
            });
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{FunctionRecord, Runtime};
    use crate::registry::InMemoryRegistry;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct EchoAdapter {
        cold_calls: AtomicUsize,
        warm_calls: AtomicUsize,
        fail_warm: bool,
    }

    #[async_trait]
    impl RuntimeAdapter for EchoAdapter {
        fn family(&self) -> RuntimeFamily {
            RuntimeFamily::Python
        }

        async fn run_cold(
            &self,
            _record: &FunctionRecord,
            _workspace: &std::path::Path,
            event: &Value,
        ) -> Result<ExecutionResult, BarqError> {
            self.cold_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExecutionResult::success(event.clone()))
        }

        async fn warm_up(
            &self,
            _record: &FunctionRecord,
            _workspace: &std::path::Path,
        ) -> Result<String, BarqError> {
            Ok("container-1".to_string())
        }

        async fn run_warm(
            &self,
            _container_id: &str,
            _workspace: &std::path::Path,
            event: &Value,
        ) -> Result<ExecutionResult, BarqError> {
            self.warm_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_warm {
                Err(BarqError::WarmDispatchFailure("simulated".to_string()))
            } else {
                Ok(ExecutionResult::success(event.clone()))
            }
        }
    }

    fn sample_record() -> FunctionRecord {
        FunctionRecord {
            func_id: "f1".to_string(),
            runtime: Runtime::Python311,
            entrypoint: "handler.main".to_string(),
            code_dir: "/tmp".to_string(),
            code_hash: "hash1".to_string(),
            memory_mb: 128,
            timeout_secs: 10,
            environment: StdHashMap::new(),
            created_at: Utc::now(),
        }
    }

    async fn build_invoker(adapter: Arc<EchoAdapter>) -> (Invoker, Arc<WorkspaceStore>) {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.create(sample_record()).await.unwrap();
        let pool = Arc::new(WarmPool::new(crate::driver::ContainerDriver::new("bridge"), 5, Duration::from_secs(300)));
        let telemetry = Arc::new(FanOutTelemetrySink::new());
        let workspace = Arc::new(WorkspaceStore::new().unwrap());
        let mut adapters: HashMap<RuntimeFamily, Arc<dyn RuntimeAdapter>> = HashMap::new();
        adapters.insert(RuntimeFamily::Python, adapter);
        let invoker = Invoker::new(registry, pool, telemetry, workspace.clone(), adapters);
        (invoker, workspace)
    }

    #[tokio::test]
    async fn first_call_is_cold_without_a_warm_pool_entry() {
        let adapter = Arc::new(EchoAdapter {
            cold_calls: AtomicUsize::new(0),
            warm_calls: AtomicUsize::new(0),
            fail_warm: false,
        });
        let (invoker, _workspace) = build_invoker(adapter.clone()).await;

        let (result, telemetry) = invoker.invoke("f1", serde_json::json!({"x": 1})).await.unwrap();
        assert!(result.success);
        assert_eq!(telemetry.execution_type, ExecutionType::Cold);
        assert_eq!(adapter.cold_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_function_returns_not_found() {
        let adapter = Arc::new(EchoAdapter {
            cold_calls: AtomicUsize::new(0),
            warm_calls: AtomicUsize::new(0),
            fail_warm: false,
        });
        let (invoker, _workspace) = build_invoker(adapter).await;
        let err = invoker.invoke("missing", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, BarqError::FunctionNotFound(_)));
    }

    #[tokio::test]
    async fn warm_dispatch_failure_falls_back_to_cold() {
        let adapter = Arc::new(EchoAdapter {
            cold_calls: AtomicUsize::new(0),
            warm_calls: AtomicUsize::new(0),
            fail_warm: true,
        });
        let (invoker, _workspace) = build_invoker(adapter.clone()).await;
        invoker.pool.insert("stale".to_string(), "f1".to_string(), Runtime::Python311, "hash1".to_string());
        invoker.pool.return_container("stale");

        let (result, telemetry) = invoker.invoke("f1", serde_json::json!({"x": 2})).await.unwrap();
        assert!(result.success);
        assert_eq!(telemetry.execution_type, ExecutionType::Cold);
        assert_eq!(adapter.warm_calls.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.cold_calls.load(Ordering::SeqCst), 1);
    }
}
