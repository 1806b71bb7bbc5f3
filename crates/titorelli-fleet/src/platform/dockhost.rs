// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dockhost platform adapter.
//!
//! Drives the `dockhost` CLI. The API token is passed through the
//! `DOCKHOST_TOKEN` environment variable of the child process; every command
//! that exits unsuccessfully or prints anything to stderr is an error.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use super::traits::*;

/// Dockhost CLI configuration.
#[derive(Clone)]
pub struct DockhostConfig {
    /// Path to (or name of) the `dockhost` executable.
    pub executable: PathBuf,
    /// API token.
    pub token: String,
}

impl std::fmt::Debug for DockhostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockhostConfig")
            .field("executable", &self.executable)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Container platform backed by the Dockhost CLI.
pub struct DockhostCli {
    config: DockhostConfig,
}

impl DockhostCli {
    /// Create a new Dockhost adapter.
    pub fn new(config: DockhostConfig) -> Self {
        Self { config }
    }

    /// Run one CLI command and return its stdout.
    async fn exec(&self, subcommand: &str, args: &[String]) -> Result<Vec<u8>> {
        debug!(command = subcommand, "Running dockhost command");

        let output = Command::new(&self.config.executable)
            .args(subcommand.split_whitespace())
            .args(args)
            .env("DOCKHOST_TOKEN", &self.config.token)
            .kill_on_drop(true)
            .output()
            .await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() || !stderr.trim().is_empty() {
            return Err(PlatformError::CommandFailed {
                command: subcommand.to_string(),
                stderr: if stderr.trim().is_empty() {
                    format!("exit status {}", output.status)
                } else {
                    stderr.trim().to_string()
                },
            });
        }

        Ok(output.stdout)
    }
}

/// Build the argument list for `container create`.
fn create_args(spec: &WorkloadSpec) -> Vec<String> {
    let mut args = vec![
        "--name".to_string(),
        spec.name.clone(),
        "--image".to_string(),
        spec.image.clone(),
        "--replicas".to_string(),
        spec.replicas.to_string(),
    ];

    // Sorted so the command line is deterministic.
    let mut env: Vec<_> = spec.env.iter().collect();
    env.sort();
    for (key, value) in env {
        args.push("--variable".to_string());
        args.push(format!("{}:{}", key, value));
    }

    args.push("--project".to_string());
    args.push(spec.project.clone());
    args
}

#[async_trait]
impl ContainerPlatform for DockhostCli {
    fn platform_type(&self) -> &'static str {
        "dockhost"
    }

    async fn list_workloads(&self, project: &str) -> Result<Vec<WorkloadInfo>> {
        let stdout = self
            .exec(
                "container list",
                &["--project".to_string(), project.to_string(), "--json".to_string()],
            )
            .await?;

        Ok(serde_json::from_slice(&stdout)?)
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<()> {
        self.exec("container create", &create_args(spec)).await?;
        Ok(())
    }

    async fn scale_workload(&self, name: &str, replicas: u32, project: &str) -> Result<()> {
        self.exec(
            "container scale",
            &[
                name.to_string(),
                "--replicas".to_string(),
                replicas.to_string(),
                "--project".to_string(),
                project.to_string(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn destroy_workload(&self, project: &str, name: &str) -> Result<()> {
        self.exec(
            "container delete",
            &[
                "--name".to_string(),
                name.to_string(),
                "--project".to_string(),
                project.to_string(),
            ],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_create_args() {
        let spec = WorkloadSpec {
            project: "proj".to_string(),
            name: "tbot-1-2".to_string(),
            image: "registry/bot:1".to_string(),
            replicas: 0,
            env: HashMap::from([
                ("BOT_TOKEN".to_string(), "123:abc".to_string()),
                ("TITORELLI_HOST".to_string(), "https://api".to_string()),
            ]),
        };

        assert_eq!(
            create_args(&spec),
            vec![
                "--name",
                "tbot-1-2",
                "--image",
                "registry/bot:1",
                "--replicas",
                "0",
                "--variable",
                "BOT_TOKEN:123:abc",
                "--variable",
                "TITORELLI_HOST:https://api",
                "--project",
                "proj",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let cli = DockhostCli::new(DockhostConfig {
            executable: PathBuf::from("/nonexistent/dockhost-cli"),
            token: "t".to_string(),
        });

        let result = cli.list_workloads("proj").await;
        assert!(matches!(result, Err(PlatformError::Spawn(_))));
    }
}
