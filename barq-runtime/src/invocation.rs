//! Invocation results and execution telemetry
//!
//! `ExecutionType` keeps all three values from the telemetry schema
//! (`cold`, `warm`, `reused`) even though the invocation algorithm below
//! only ever produces `Cold` and `Reused` — see DESIGN.md for why `Warm`
//! stays in the enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a container came to serve a given invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionType {
    /// No warm container existed; one was created and torn down for this call.
    Cold,
    /// A warm container was freshly started for this call (kept for schema
    /// completeness; the engine currently tags a fresh warm-up separately
    /// from the invocation it preceded, via opportunistic warm-up below).
    Warm,
    /// An existing idle warm container was borrowed from the pool.
    Reused,
}

impl ExecutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Warm => "warm",
            Self::Reused => "reused",
        }
    }
}

/// Outcome of running a function once, independent of how it was dispatched.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// One invocation's telemetry record, as handed to a [`crate::registry::TelemetrySink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTelemetry {
    pub request_id: String,
    pub func_id: String,
    pub timestamp: DateTime<Utc>,
    pub execution_type: ExecutionType,
    pub success: bool,
    pub coldstart_ms: Option<f64>,
    pub execution_ms: Option<f64>,
    pub total_ms: Option<f64>,
    pub container_id: Option<String>,
}

/// Aggregate stats for one function, built from its retained telemetry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FunctionStats {
    pub total_invocations: u64,
    pub cold_starts: u64,
    pub warm_starts: u64,
    pub reused_starts: u64,
    pub avg_execution_ms: f64,
    pub min_execution_ms: Option<f64>,
    pub max_execution_ms: Option<f64>,
    pub avg_coldstart_ms: Option<f64>,
}

impl FunctionStats {
    /// Build stats from a slice of telemetry records, newest-or-oldest-first
    /// doesn't matter since every field here is an aggregate.
    pub fn from_records(records: &[ExecutionTelemetry]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let mut stats = Self {
            total_invocations: records.len() as u64,
            ..Self::default()
        };

        let mut exec_times = Vec::new();
        let mut coldstart_times = Vec::new();

        for record in records {
            match record.execution_type {
                ExecutionType::Cold => stats.cold_starts += 1,
                ExecutionType::Warm => stats.warm_starts += 1,
                ExecutionType::Reused => stats.reused_starts += 1,
            }
            if let Some(ms) = record.execution_ms {
                exec_times.push(ms);
            }
            if record.execution_type == ExecutionType::Cold {
                if let Some(ms) = record.coldstart_ms {
                    coldstart_times.push(ms);
                }
            }
        }

        if !exec_times.is_empty() {
            stats.avg_execution_ms = exec_times.iter().sum::<f64>() / exec_times.len() as f64;
            stats.min_execution_ms = exec_times.iter().cloned().fold(None, |acc, v| {
                Some(acc.map_or(v, |a: f64| a.min(v)))
            });
            stats.max_execution_ms = exec_times.iter().cloned().fold(None, |acc, v| {
                Some(acc.map_or(v, |a: f64| a.max(v)))
            });
        }

        if !coldstart_times.is_empty() {
            stats.avg_coldstart_ms =
                Some(coldstart_times.iter().sum::<f64>() / coldstart_times.len() as f64);
        }

        stats
    }
}
