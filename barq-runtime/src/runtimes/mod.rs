//! Runtime adapters (C2)
//!
//! Each adapter drives one language's container protocol: how a cold
//! invocation is run to completion, how a warm container is started and
//! primed, and how a request is handed to an already-running warm
//! container. The warm-container file-drop protocol (write
//! `event_input.json`, wait for `event_output.json`) is identical across
//! runtimes, so it lives here as shared helpers; only the startup command
//! and wrapper script differ per language.

pub mod go;
pub mod node;
pub mod python;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use barq_core::BarqError;
use serde_json::Value;

use crate::driver::ContainerDriver;
use crate::function::{FunctionRecord, RuntimeFamily};
use crate::invocation::ExecutionResult;

/// Mount point for a function's workspace inside its container, for every
/// runtime. The original Go adapter mounted at `/go`; unifying on `/app`
/// drops a runtime-specific special case `docker create` no longer needs.
pub const WORKSPACE_MOUNT: &str = "/app";

pub const EVENT_INPUT_FILE: &str = "event_input.json";
pub const EVENT_OUTPUT_FILE: &str = "event_output.json";
pub const WARM_READY_SENTINEL: &str = "WARM_CONTAINER_READY";

/// How long `warm_up` waits for the sentinel before giving up.
pub const WARMUP_TIMEOUT: Duration = Duration::from_secs(20);
/// How long `run_warm` waits for a dispatched request to produce output.
pub const WARM_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);
/// How long a cold run is allowed before it's killed.
pub const COLD_RUN_TIMEOUT: Duration = Duration::from_secs(60);

/// Drives one runtime family's container lifecycle.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    fn family(&self) -> RuntimeFamily;

    /// Run the function once in a fresh, throwaway container.
    async fn run_cold(
        &self,
        record: &FunctionRecord,
        workspace: &Path,
        event: &Value,
    ) -> Result<ExecutionResult, BarqError>;

    /// Start a detached container and block until it signals readiness.
    /// Returns the container id on success.
    async fn warm_up(&self, record: &FunctionRecord, workspace: &Path) -> Result<String, BarqError>;

    /// Dispatch one request to an already-warm container via the file-drop
    /// protocol and return its result.
    async fn run_warm(
        &self,
        container_id: &str,
        workspace: &Path,
        event: &Value,
    ) -> Result<ExecutionResult, BarqError>;
}

/// Write the request event to `event_input.json` inside the container, then
/// poll for `event_output.json` to appear. Both files live under
/// [`WORKSPACE_MOUNT`] and are written/read through `docker exec` (piping the
/// payload via stdin rather than interpolating it into a shell command
/// string), matching how [`ContainerDriver::exec_in`] talks to every other
/// in-container operation — the bind mount makes a direct host-fs write
/// reach the same place, but going through the container's own shell keeps
/// this runtime-agnostic of whether a given deployment even uses a mount.
pub(crate) async fn dispatch_via_file_drop(
    driver: &ContainerDriver,
    container_id: &str,
    event: &Value,
    timeout: Duration,
) -> Result<ExecutionResult, BarqError> {
    let input_path = format!("{WORKSPACE_MOUNT}/{EVENT_INPUT_FILE}");
    let output_path = format!("{WORKSPACE_MOUNT}/{EVENT_OUTPUT_FILE}");

    let _ = driver
        .exec_in(
            container_id,
            &["rm".to_string(), "-f".to_string(), output_path.clone()],
            None,
            Duration::from_secs(5),
        )
        .await;

    let payload = serde_json::to_vec(event).unwrap_or_default();
    driver
        .exec_in(
            container_id,
            &["sh".to_string(), "-c".to_string(), format!("cat > {input_path}")],
            Some(&payload),
            Duration::from_secs(5),
        )
        .await
        .map_err(|e| BarqError::WarmDispatchFailure(e.to_string()))?;

    let poll_interval = Duration::from_millis(100);
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let check = driver
            .exec_in(
                container_id,
                &["test".to_string(), "-f".to_string(), output_path.clone()],
                None,
                Duration::from_secs(5),
            )
            .await;
        if matches!(check, Ok(ref out) if out.success) {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            let _ = driver
                .exec_in(
                    container_id,
                    &["rm".to_string(), "-f".to_string(), input_path.clone()],
                    None,
                    Duration::from_secs(5),
                )
                .await;
            return Err(BarqError::WarmDispatchFailure(
                "timed out waiting for warm container output".to_string(),
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }

    let read = driver
        .exec_in(
            container_id,
            &["cat".to_string(), output_path.clone()],
            None,
            Duration::from_secs(5),
        )
        .await
        .map_err(|e| BarqError::WarmDispatchFailure(e.to_string()))?;
    let _ = driver
        .exec_in(
            container_id,
            &["rm".to_string(), "-f".to_string(), output_path],
            None,
            Duration::from_secs(5),
        )
        .await;

    let parsed: Value = serde_json::from_str(read.stdout.trim())
        .map_err(|e| BarqError::WarmDispatchFailure(format!("malformed output: {e}")))?;

    let status = parsed.get("status").and_then(Value::as_str).unwrap_or("success");
    let body = parsed.get("result").cloned().unwrap_or(Value::Null);
    if status == "error" {
        let message = body.as_str().map(str::to_string).unwrap_or_else(|| body.to_string());
        return Ok(ExecutionResult::failure(message));
    }
    Ok(ExecutionResult::success(body))
}

/// Poll a container's logs for the ready sentinel.
pub(crate) async fn wait_for_ready(
    driver: &ContainerDriver,
    container_id: &str,
    timeout: Duration,
) -> Result<(), BarqError> {
    let poll_interval = Duration::from_millis(100);
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let logs = driver.logs(container_id, 50).await;
        if logs.contains(WARM_READY_SENTINEL) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(BarqError::WarmupFailure(format!(
                "container {container_id} never signalled ready"
            )));
        }
        tokio::time::sleep(poll_interval).await;
    }
}
