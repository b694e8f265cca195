//! Go runtime adapter
//!
//! Go has no `-c`/`-e` one-liner mode, so the cold and warm paths each
//! materialize a small wrapper source file into the function's workspace
//! alongside the user's code, then drive it with the `go` toolchain: `go
//! run` for a one-shot cold call, `go build` + a detached binary for a
//! warm container. The wrapper assumes the user's file declares `package
//! main` and exports a function matching the entrypoint's function name.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

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

const BUILD_TIMEOUT: Duration = Duration::from_secs(90);
const COLD_RUNNER_FILE: &str = "_barq_runner_cold.go";
const WARM_RUNNER_FILE: &str = "_barq_runner_warm.go";
const WARM_BINARY: &str = "_barq_warm_runner";

pub struct GoRuntime {
    driver: Arc<ContainerDriver>,
}

impl GoRuntime {
    pub fn new(driver: Arc<ContainerDriver>) -> Self {
        Self { driver }
    }

    fn limits(record: &FunctionRecord) -> ContainerLimits {
        ContainerLimits {
            memory_mb: record.memory_mb,
            cpus: 1.0,
        }
    }

    fn user_file(entrypoint: &Entrypoint) -> String {
        format!("{}.go", entrypoint.module)
    }

    fn cold_wrapper_source(entrypoint: &Entrypoint) -> String {
        format!(
            r#"package main

import (
	"encoding/json"
	"fmt"
	"os"
)

func main() {{
	var event map[string]interface{{}}
	if err := json.NewDecoder(os.Stdin).Decode(&event); err != nil {{
		fmt.Println(`{{"errorMessage":"invalid event","errorType":"DecodeError"}}`)
		return
	}}
	result, err := {function}(event)
	if err != nil {{
		out, _ := json.Marshal(map[string]string{{"errorMessage": err.Error(), "errorType": "HandlerError"}})
		fmt.Println(string(out))
		return
	}}
	out, _ := json.Marshal(result)
	fmt.Println(string(out))
}}
"#,
            function = entrypoint.function,
        )
    }

    fn warm_wrapper_source(entrypoint: &Entrypoint) -> String {
        format!(
            r#"package main

import (
	"encoding/json"
	"fmt"
	"os"
	"time"
)

func main() {{
	inputPath := "{mount}/{input_file}"
	outputPath := "{mount}/{output_file}"
	fmt.Println("{sentinel}")
	for {{
		if _, err := os.Stat(inputPath); err == nil {{
			raw, readErr := os.ReadFile(inputPath)
			os.Remove(inputPath)
			var body []byte
			if readErr != nil {{
				body, _ = json.Marshal(map[string]interface{{}}{{"result": readErr.Error(), "status": "error"}})
			}} else {{
				var event map[string]interface{{}}
				if err := json.Unmarshal(raw, &event); err != nil {{
					body, _ = json.Marshal(map[string]interface{{}}{{"result": "invalid event", "status": "error"}})
				}} else {{
					result, err := {function}(event)
					if err != nil {{
						body, _ = json.Marshal(map[string]interface{{}}{{"result": err.Error(), "status": "error"}})
					}} else {{
						body, _ = json.Marshal(map[string]interface{{}}{{"result": result, "status": "success"}})
					}}
				}}
			}}
			_ = os.WriteFile(outputPath, body, 0o644)
		}}
		time.Sleep(50 * time.Millisecond)
	}}
}}
"#,
            mount = WORKSPACE_MOUNT,
            input_file = EVENT_INPUT_FILE,
            output_file = EVENT_OUTPUT_FILE,
            sentinel = WARM_READY_SENTINEL,
            function = entrypoint.function,
        )
    }
}

#[async_trait]
impl RuntimeAdapter for GoRuntime {
    fn family(&self) -> RuntimeFamily {
        RuntimeFamily::Go
    }

    async fn run_cold(
        &self,
        record: &FunctionRecord,
        workspace: &Path,
        event: &Value,
    ) -> Result<ExecutionResult, BarqError> {
        let entrypoint = Entrypoint::parse(&record.entrypoint)?;
        tokio::fs::write(workspace.join(COLD_RUNNER_FILE), Self::cold_wrapper_source(&entrypoint))
            .await
            .map_err(|e| BarqError::ColdExecFailure(e.to_string()))?;

        let env: Vec<(String, String)> = record.environment.clone().into_iter().collect();
        let output = self
            .driver
            .run_oneshot(
                record.runtime.docker_image(),
                workspace,
                WORKSPACE_MOUNT,
                &env,
                &Self::limits(record),
                &[
                    "go".to_string(),
                    "run".to_string(),
                    COLD_RUNNER_FILE.to_string(),
                    Self::user_file(&entrypoint),
                ],
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
        tokio::fs::write(workspace.join(WARM_RUNNER_FILE), Self::warm_wrapper_source(&entrypoint))
            .await
            .map_err(|e| BarqError::WarmupFailure(e.to_string()))?;

        let env: Vec<(String, String)> = record.environment.clone().into_iter().collect();
        let build = self
            .driver
            .run_oneshot(
                record.runtime.docker_image(),
                workspace,
                WORKSPACE_MOUNT,
                &env,
                &Self::limits(record),
                &[
                    "go".to_string(),
                    "build".to_string(),
                    "-o".to_string(),
                    WARM_BINARY.to_string(),
                    WARM_RUNNER_FILE.to_string(),
                    Self::user_file(&entrypoint),
                ],
                None,
                BUILD_TIMEOUT,
            )
            .await
            .map_err(|e| BarqError::WarmupFailure(e.to_string()))?;

        if !build.success {
            return Err(BarqError::WarmupFailure(build.stderr));
        }

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
                &[format!("{WORKSPACE_MOUNT}/{WARM_BINARY}")],
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
    fn cold_wrapper_calls_entrypoint_function() {
        let entrypoint = Entrypoint::parse("handler.Handle").unwrap();
        let source = GoRuntime::cold_wrapper_source(&entrypoint);
        assert!(source.contains("Handle(event)"));
        assert!(source.contains("package main"));
    }

    #[test]
    fn user_file_derives_from_module() {
        let entrypoint = Entrypoint::parse("handler.Handle").unwrap();
        assert_eq!(GoRuntime::user_file(&entrypoint), "handler.go");
    }
}
