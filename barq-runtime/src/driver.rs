//! Container driver (C1)
//!
//! Thin wrapper around the `docker` CLI. Every call shells out via
//! `tokio::process::Command` rather than linking a Docker SDK — this
//! mirrors how the container contract is actually expressed (`-v`, `-w`,
//! `-e`, `-d`, `--name`, `--rm` flags), and keeps the driver swappable for
//! a fake in tests without mocking an HTTP client.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Errors the container driver can raise.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("docker daemon not reachable: {0}")]
    NotAvailable(String),

    #[error("failed to start container: {0}")]
    StartFailed(String),

    #[error("container execution failed: {0}")]
    ExecFailed(String),

    #[error("container timed out")]
    Timeout,

    #[error("image pull failed: {0}")]
    ImagePullFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output of a single `docker exec`/`docker run`.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// Resource limits applied to a container at creation time.
#[derive(Debug, Clone)]
pub struct ContainerLimits {
    pub memory_mb: u32,
    pub cpus: f32,
}

/// Shells out to `docker` to create, run and tear down containers.
#[derive(Debug, Clone)]
pub struct ContainerDriver {
    network_mode: String,
}

impl ContainerDriver {
    pub fn new(network_mode: impl Into<String>) -> Self {
        Self {
            network_mode: network_mode.into(),
        }
    }

    /// Returns whether the docker daemon answers `docker info`.
    pub async fn check_available(&self) -> bool {
        match Command::new("docker").arg("info").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    /// Pull `image` if it isn't already present locally.
    pub async fn ensure_image(&self, image: &str) -> Result<(), DriverError> {
        let inspect = Command::new("docker")
            .args(["image", "inspect", image])
            .output()
            .await?;
        if inspect.status.success() {
            return Ok(());
        }

        debug!(image, "pulling image");
        let pull = Command::new("docker").args(["pull", image]).output().await?;
        if !pull.status.success() {
            let stderr = String::from_utf8_lossy(&pull.stderr).to_string();
            return Err(DriverError::ImagePullFailed(stderr));
        }
        Ok(())
    }

    /// Run a one-shot container to completion: `docker run --rm <image> <cmd...>`.
    /// Used for the cold path, where the container never needs to outlive the call.
    pub async fn run_oneshot(
        &self,
        image: &str,
        workspace: &Path,
        mount_point: &str,
        env: &[(String, String)],
        limits: &ContainerLimits,
        command: &[String],
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<ExecOutput, DriverError> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-i".to_string(),
            "--network".to_string(),
            self.network_mode.clone(),
            "-v".to_string(),
            format!("{}:{}", workspace.display(), mount_point),
            "-w".to_string(),
            mount_point.to_string(),
            "--memory".to_string(),
            format!("{}m", limits.memory_mb),
            "--cpus".to_string(),
            limits.cpus.to_string(),
        ];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(image.to_string());
        args.extend(command.iter().cloned());

        self.spawn_with_stdin(args, stdin, timeout).await
    }

    /// Create and start a detached, long-lived container: `docker run -d ...`.
    /// Returns the container id. Used for warm containers.
    pub async fn start_detached(
        &self,
        name: &str,
        image: &str,
        workspace: &Path,
        mount_point: &str,
        env: &[(String, String)],
        limits: &ContainerLimits,
        command: &[String],
    ) -> Result<String, DriverError> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--network".to_string(),
            self.network_mode.clone(),
            "-v".to_string(),
            format!("{}:{}", workspace.display(), mount_point),
            "-w".to_string(),
            mount_point.to_string(),
            "--memory".to_string(),
            format!("{}m", limits.memory_mb),
            "--cpus".to_string(),
            limits.cpus.to_string(),
        ];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(image.to_string());
        args.extend(command.iter().cloned());

        let output = Command::new("docker")
            .args(&args)
            .output()
            .await
            .map_err(|e| DriverError::StartFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(DriverError::StartFailed(stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a command inside an already-running container, piping `stdin` to it.
    ///
    /// Piping stdin (rather than interpolating the payload into a shell
    /// command string) avoids quoting corruption when the payload contains
    /// shell metacharacters.
    pub async fn exec_in(
        &self,
        container_id: &str,
        command: &[String],
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<ExecOutput, DriverError> {
        let mut args = vec!["exec".to_string(), "-i".to_string(), container_id.to_string()];
        args.extend(command.iter().cloned());
        self.spawn_with_stdin(args, stdin, timeout).await
    }

    /// Copy a file or directory from the host into a running container.
    pub async fn copy_in(&self, container_id: &str, src: &Path, dst: &str) -> Result<(), DriverError> {
        let dest = format!("{container_id}:{dst}");
        let output = Command::new("docker")
            .args(["cp", &src.display().to_string(), &dest])
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(DriverError::ExecFailed(stderr));
        }
        Ok(())
    }

    /// Copy a file or directory out of a running container onto the host.
    pub async fn copy_out(&self, container_id: &str, src: &str, dst: &Path) -> Result<(), DriverError> {
        let source = format!("{container_id}:{src}");
        let output = Command::new("docker")
            .args(["cp", &source, &dst.display().to_string()])
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(DriverError::ExecFailed(stderr));
        }
        Ok(())
    }

    /// Tail the container's logs (best-effort, used for diagnostics only).
    pub async fn logs(&self, container_id: &str, tail: u32) -> String {
        let output = Command::new("docker")
            .args(["logs", "--tail", &tail.to_string(), container_id])
            .output()
            .await;
        match output {
            Ok(output) => String::from_utf8_lossy(&output.stdout).to_string(),
            Err(_) => String::new(),
        }
    }

    /// Force-remove a container. Best-effort: failures are logged, not propagated,
    /// since the caller is usually already past the point where it could react.
    pub async fn remove(&self, container_id: &str) {
        let result = Command::new("docker")
            .args(["rm", "-f", container_id])
            .output()
            .await;
        if let Ok(output) = result {
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(container_id, %stderr, "failed to remove container");
            }
        }
    }

    /// Spawn `docker <args>`, optionally piping `stdin` to it, under `timeout`.
    /// Shared by `run_oneshot` and `exec_in` since both need the payload
    /// written to the child's stdin rather than interpolated into argv.
    async fn spawn_with_stdin(
        &self,
        args: Vec<String>,
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<ExecOutput, DriverError> {
        let mut child = Command::new("docker")
            .args(&args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()?;

        if let Some(bytes) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(bytes).await?;
            }
        } else {
            drop(child.stdin.take());
        }

        let wait = tokio::time::timeout(timeout, child.wait_with_output()).await;
        match wait {
            Ok(Ok(output)) => Ok(ExecOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                success: output.status.success(),
            }),
            Ok(Err(e)) => Err(DriverError::ExecFailed(e.to_string())),
            Err(_) => {
                warn!("docker command timed out");
                Err(DriverError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_format_into_docker_flags() {
        let limits = ContainerLimits {
            memory_mb: 256,
            cpus: 0.5,
        };
        assert_eq!(format!("{}m", limits.memory_mb), "256m");
        assert_eq!(limits.cpus.to_string(), "0.5");
    }
}
