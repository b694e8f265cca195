//! Node.js runtime adapter
//!
//! Mirrors [`super::python`]'s shape: a cold one-shot `node -e <script>`
//! reading the event from stdin, and a warm container running the same
//! module in a poll loop over the file-drop protocol.

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

pub struct NodeRuntime {
    driver: Arc<ContainerDriver>,
}

impl NodeRuntime {
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
const fs = require('fs');
const mod = require('{mount}/{module}.js');
const event = JSON.parse(fs.readFileSync(0, 'utf8'));
Promise.resolve()
    .then(() => mod['{function}'](event, {{}}))
    .then((result) => console.log(JSON.stringify(result === undefined ? {{}} : result)))
    .catch((e) => console.log(JSON.stringify({{ errorMessage: e.message, errorType: e.name }})));
"#,
            mount = WORKSPACE_MOUNT,
            module = entrypoint.module,
            function = entrypoint.function,
        )
    }

    fn warm_script(entrypoint: &Entrypoint) -> String {
        format!(
            r#"
const fs = require('fs');
const mod = require('{mount}/{module}.js');
const inputPath = '{mount}/{input_file}';
const outputPath = '{mount}/{output_file}';
console.log('{sentinel}');
setInterval(() => {{
    if (!fs.existsSync(inputPath)) return;
    const event = JSON.parse(fs.readFileSync(inputPath, 'utf8'));
    fs.unlinkSync(inputPath);
    Promise.resolve()
        .then(() => mod['{function}'](event, {{}}))
        .then((result) => fs.writeFileSync(outputPath, JSON.stringify({{ result: result === undefined ? null : result, status: 'success' }})))
        .catch((e) => fs.writeFileSync(outputPath, JSON.stringify({{ result: e.message, status: 'error' }})));
}}, 50);
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
impl RuntimeAdapter for NodeRuntime {
    fn family(&self) -> RuntimeFamily {
        RuntimeFamily::Node
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
                &["node".to_string(), "-e".to_string(), script],
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
                &["node".to_string(), "-e".to_string(), script],
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
    fn cold_script_requires_module_path() {
        let entrypoint = Entrypoint::parse("index.handler").unwrap();
        let script = NodeRuntime::cold_script(&entrypoint);
        assert!(script.contains("require('/app/index.js')"));
        assert!(script.contains("mod['handler']"));
    }
}
