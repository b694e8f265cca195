//! Python runtime adapter
//!
//! Cold runs pipe the event to a one-shot `python3 -c <script>` call over
//! stdin. Warm containers run the same wrapper script in a watch loop: it
//! prints the ready sentinel, then polls for `event_input.json`, invokes
//! the handler, and writes `event_output.json` for each request in turn.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use barq_core::BarqError;
use serde_json::Value;
use uuid::Uuid;

use crate::driver::{ContainerDriver, ContainerLimits};
use crate::function::{Entrypoint, FunctionRecord, RuntimeFamily};
use crate::invocation::ExecutionResult;

use super::{
    dispatch_via_file_drop, wait_for_ready, RuntimeAdapter, COLD_RUN_TIMEOUT, EVENT_INPUT_FILE,
    EVENT_OUTPUT_FILE, WARMUP_TIMEOUT, WARM_DISPATCH_TIMEOUT, WARM_READY_SENTINEL, WORKSPACE_MOUNT,
};

pub struct PythonRuntime {
    driver: Arc<ContainerDriver>,
}

impl PythonRuntime {
    pub fn new(driver: Arc<ContainerDriver>) -> Self {
        Self { driver }
    }

    fn limits(record: &FunctionRecord) -> ContainerLimits {
        ContainerLimits {
            memory_mb: record.memory_mb,
            cpus: 1.0,
        }
    }

    fn cold_script(entrypoint: &Entrypoint) -> String {
        format!(
            r#"
import json, sys, importlib
sys.path.insert(0, '{mount}')
event = json.load(sys.stdin)
module = importlib.import_module('{module}')
handler = getattr(module, '{function}')
try:
    result = handler(event, None)
    print(json.dumps(result if result is not None else {{}}))
except Exception as e:
    print(json.dumps({{'errorMessage': str(e), 'errorType': type(e).__name__}}))
"#,
            mount = WORKSPACE_MOUNT,
            module = entrypoint.module,
            function = entrypoint.function,
        )
    }

    fn warm_script(entrypoint: &Entrypoint) -> String {
        format!(
            r#"
import json, sys, os, time, importlib
sys.path.insert(0, '{mount}')
module = importlib.import_module('{module}')
handler = getattr(module, '{function}')
input_path = '{mount}/{input_file}'
output_path = '{mount}/{output_file}'
print('{sentinel}', flush=True)
while True:
    if os.path.exists(input_path):
        try:
            with open(input_path) as f:
                event = json.load(f)
            os.remove(input_path)
            result = handler(event, None)
            envelope = {{'result': result, 'status': 'success'}}
        except Exception as e:
            envelope = {{'result': str(e), 'status': 'error'}}
        with open(output_path, 'w') as f:
            json.dump(envelope, f)
    time.sleep(0.05)
"#,
            mount = WORKSPACE_MOUNT,
            module = entrypoint.module,
            function = entrypoint.function,
            input_file = EVENT_INPUT_FILE,
            output_file = EVENT_OUTPUT_FILE,
            sentinel = WARM_READY_SENTINEL,
        )
    }
}

#[async_trait]
impl RuntimeAdapter for PythonRuntime {
    fn family(&self) -> RuntimeFamily {
        RuntimeFamily::Python
    }

    async fn run_cold(
        &self,
        record: &FunctionRecord,
        workspace: &Path,
        event: &Value,
    ) -> Result<ExecutionResult, BarqError> {
        let entrypoint = Entrypoint::parse(&record.entrypoint)?;
        let script = Self::cold_script(&entrypoint);
        let env: Vec<(String, String)> = record.environment.clone().into_iter().collect();

        let output = self
            .driver
            .run_oneshot(
                record.runtime.docker_image(),
                workspace,
                WORKSPACE_MOUNT,
                &env,
                &Self::limits(record),
                &["python3".to_string(), "-c".to_string(), script],
                Some(serde_json::to_vec(event).unwrap_or_default().as_slice()),
                COLD_RUN_TIMEOUT,
            )
            .await
            .map_err(|e| BarqError::ColdExecFailure(e.to_string()))?;

        if !output.success {
            return Err(BarqError::ColdExecFailure(output.stderr));
        }
        parse_last_line(&output.stdout)
    }

    async fn warm_up(&self, record: &FunctionRecord, workspace: &Path) -> Result<String, BarqError> {
        let entrypoint = Entrypoint::parse(&record.entrypoint)?;
        let script = Self::warm_script(&entrypoint);
        let env: Vec<(String, String)> = record.environment.clone().into_iter().collect();
        let name = format!("barq-warm-{}-{}", record.func_id, &Uuid::new_v4().simple().to_string()[..8]);

        let container_id = self
            .driver
            .start_detached(
                &name,
                record.runtime.docker_image(),
                workspace,
                WORKSPACE_MOUNT,
                &env,
                &Self::limits(record),
                &["python3".to_string(), "-u".to_string(), "-c".to_string(), script],
            )
            .await
            .map_err(|e| BarqError::WarmupFailure(e.to_string()))?;

        wait_for_ready(&self.driver, &container_id, WARMUP_TIMEOUT).await?;
        Ok(container_id)
    }

    async fn run_warm(
        &self,
        container_id: &str,
        _workspace: &Path,
        event: &Value,
    ) -> Result<ExecutionResult, BarqError> {
        dispatch_via_file_drop(&self.driver, container_id, event, WARM_DISPATCH_TIMEOUT).await
    }
}

fn parse_last_line(stdout: &str) -> Result<ExecutionResult, BarqError> {
    let last_line = stdout.lines().last().unwrap_or("{}");
    let parsed: Value = serde_json::from_str(last_line)
        .map_err(|e| BarqError::ColdExecFailure(format!("malformed output: {e}")))?;
    if let Some(error) = parsed.get("errorMessage").and_then(Value::as_str) {
        return Ok(ExecutionResult::failure(error.to_string()));
    }
    Ok(ExecutionResult::success(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_script_embeds_module_and_function() {
        let entrypoint = Entrypoint::parse("handler.main").unwrap();
        let script = PythonRuntime::cold_script(&entrypoint);
        assert!(script.contains("importlib.import_module('handler')"));
        assert!(script.contains("getattr(module, 'main')"));
    }

    #[test]
    fn parse_last_line_extracts_trailing_json() {
        let result = parse_last_line("some log noise\n{\"ok\": true}").unwrap();
        assert!(result.success);
    }

    #[test]
    fn parse_last_line_surfaces_error_message() {
        let result = parse_last_line(r#"{"errorMessage": "boom", "errorType": "ValueError"}"#).unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }
}
