//! Function registry and telemetry sink (C4/C5)
//!
//! The registry is a `DashMap`-backed table of [`FunctionRecord`]s, the
//! same shape the original service used for its function table. The
//! telemetry sink is a seam: production wiring logs every invocation
//! through `tracing`, while an in-memory ring buffer backs the stats
//! endpoint and is what tests attach to assert on.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use barq_core::BarqError;
use chrono::Utc;
use dashmap::DashMap;
use tracing::info;

use crate::function::FunctionRecord;
use crate::invocation::{ExecutionTelemetry, FunctionStats};

/// How many telemetry records the in-memory sink retains per function
/// before evicting the oldest. Matches the window the stats endpoint reports.
const TELEMETRY_WINDOW: usize = 500;

#[async_trait]
pub trait FunctionRegistry: Send + Sync {
    async fn create(&self, record: FunctionRecord) -> Result<FunctionRecord, BarqError>;
    async fn get(&self, func_id: &str) -> Result<FunctionRecord, BarqError>;
    async fn list(&self) -> Vec<FunctionRecord>;
    async fn delete(&self, func_id: &str) -> Result<(), BarqError>;
}

/// DashMap-backed registry. No persistence: restarting the process loses
/// every registered function, matching the in-process scope of the engine.
#[derive(Default)]
pub struct InMemoryRegistry {
    functions: DashMap<String, FunctionRecord>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FunctionRegistry for InMemoryRegistry {
    async fn create(&self, mut record: FunctionRecord) -> Result<FunctionRecord, BarqError> {
        if self.functions.contains_key(&record.func_id) {
            return Err(BarqError::FunctionAlreadyExists(record.func_id));
        }
        record.created_at = Utc::now();
        self.functions.insert(record.func_id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, func_id: &str) -> Result<FunctionRecord, BarqError> {
        self.functions
            .get(func_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| BarqError::FunctionNotFound(func_id.to_string()))
    }

    async fn list(&self) -> Vec<FunctionRecord> {
        self.functions.iter().map(|entry| entry.clone()).collect()
    }

    async fn delete(&self, func_id: &str) -> Result<(), BarqError> {
        self.functions
            .remove(func_id)
            .map(|_| ())
            .ok_or_else(|| BarqError::FunctionNotFound(func_id.to_string()))
    }
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record(&self, telemetry: ExecutionTelemetry);
}

/// Emits one structured log line per invocation. The production default —
/// telemetry storage is out of scope, so this is the durable record.
pub struct TracingTelemetrySink;

#[async_trait]
impl TelemetrySink for TracingTelemetrySink {
    async fn record(&self, telemetry: ExecutionTelemetry) {
        info!(
            request_id = %telemetry.request_id,
            func_id = %telemetry.func_id,
            execution_type = telemetry.execution_type.as_str(),
            success = telemetry.success,
            coldstart_ms = telemetry.coldstart_ms,
            execution_ms = telemetry.execution_ms,
            total_ms = telemetry.total_ms,
            container_id = telemetry.container_id.as_deref().unwrap_or("-"),
            "invocation completed"
        );
    }
}

/// Retains the last [`TELEMETRY_WINDOW`] records per function, used to
/// compute the stats the `/functions/:id/stats` endpoint serves.
#[derive(Default)]
pub struct InMemoryTelemetrySink {
    by_function: DashMap<String, Mutex<VecDeque<ExecutionTelemetry>>>,
}

impl InMemoryTelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats_for(&self, func_id: &str) -> FunctionStats {
        match self.by_function.get(func_id) {
            Some(records) => {
                let records = records.lock().expect("telemetry mutex poisoned");
                let snapshot: Vec<ExecutionTelemetry> = records.iter().cloned().collect();
                FunctionStats::from_records(&snapshot)
            }
            None => FunctionStats::default(),
        }
    }
}

#[async_trait]
impl TelemetrySink for InMemoryTelemetrySink {
    async fn record(&self, telemetry: ExecutionTelemetry) {
        let entry = self
            .by_function
            .entry(telemetry.func_id.clone())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut records = entry.lock().expect("telemetry mutex poisoned");
        if records.len() >= TELEMETRY_WINDOW {
            records.pop_front();
        }
        records.push_back(telemetry);
    }
}

/// Fans a telemetry record out to both sinks: the tracing log for durability
/// and the in-memory window for the stats endpoint.
pub struct FanOutTelemetrySink {
    tracing: TracingTelemetrySink,
    in_memory: InMemoryTelemetrySink,
}

impl FanOutTelemetrySink {
    pub fn new() -> Self {
        Self {
            tracing: TracingTelemetrySink,
            in_memory: InMemoryTelemetrySink::new(),
        }
    }

    pub fn stats_for(&self, func_id: &str) -> FunctionStats {
        self.in_memory.stats_for(func_id)
    }
}

impl Default for FanOutTelemetrySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetrySink for FanOutTelemetrySink {
    async fn record(&self, telemetry: ExecutionTelemetry) {
        self.in_memory.record(telemetry.clone()).await;
        self.tracing.record(telemetry).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Runtime;
    use std::collections::HashMap;

    fn sample_record(func_id: &str) -> FunctionRecord {
        FunctionRecord {
            func_id: func_id.to_string(),
            runtime: Runtime::Python311,
            entrypoint: "handler.main".to_string(),
            code_dir: "/tmp/does-not-matter".to_string(),
            code_hash: "hash1".to_string(),
            memory_mb: 128,
            timeout_secs: 10,
            environment: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let registry = InMemoryRegistry::new();
        registry.create(sample_record("f1")).await.unwrap();
        let fetched = registry.get("f1").await.unwrap();
        assert_eq!(fetched.func_id, "f1");
    }

    #[tokio::test]
    async fn create_rejects_duplicate_func_id() {
        let registry = InMemoryRegistry::new();
        registry.create(sample_record("f1")).await.unwrap();
        let err = registry.create(sample_record("f1")).await.unwrap_err();
        assert!(matches!(err, BarqError::FunctionAlreadyExists(_)));
    }

    #[tokio::test]
    async fn get_missing_function_errors() {
        let registry = InMemoryRegistry::new();
        let err = registry.get("missing").await.unwrap_err();
        assert!(matches!(err, BarqError::FunctionNotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_from_list() {
        let registry = InMemoryRegistry::new();
        registry.create(sample_record("f1")).await.unwrap();
        registry.delete("f1").await.unwrap();
        assert!(registry.list().await.is_empty());
    }

    fn telemetry(func_id: &str, execution_ms: f64) -> ExecutionTelemetry {
        use crate::invocation::ExecutionType;
        ExecutionTelemetry {
            request_id: "r1".to_string(),
            func_id: func_id.to_string(),
            timestamp: Utc::now(),
            execution_type: ExecutionType::Reused,
            success: true,
            coldstart_ms: None,
            execution_ms: Some(execution_ms),
            total_ms: Some(execution_ms),
            container_id: Some("c1".to_string()),
        }
    }

    #[tokio::test]
    async fn in_memory_sink_tracks_stats_per_function() {
        let sink = InMemoryTelemetrySink::new();
        sink.record(telemetry("f1", 10.0)).await;
        sink.record(telemetry("f1", 30.0)).await;
        sink.record(telemetry("f2", 5.0)).await;

        let stats = sink.stats_for("f1");
        assert_eq!(stats.total_invocations, 2);
        assert_eq!(sink.stats_for("f2").total_invocations, 1);
        assert_eq!(sink.stats_for("unknown").total_invocations, 0);
    }
}
