// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container platform trait definitions.
//!
//! Defines the abstract interface to the container-hosting platform.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from platform operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlatformError {
    /// Platform command could not be spawned.
    #[error("Failed to spawn platform command: {0}")]
    Spawn(#[from] std::io::Error),

    /// Platform command exited unsuccessfully or wrote to stderr.
    #[error("Platform command `{command}` failed: {stderr}")]
    CommandFailed {
        /// Subcommand that failed (e.g. "container list").
        command: String,
        /// Standard error output.
        stderr: String,
    },

    /// Platform output could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Status of a workload or of one of its instances, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Instance is being provisioned.
    Creating,
    /// Instance is being rolled to a new revision.
    Updating,
    /// Instance is up.
    Ready,
    /// Instance is stopped.
    Stopped,
    /// Instance is paused.
    Paused,
    /// Any status this crate does not know about. Treated as converging.
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    /// Every status, in declaration order.
    pub const ALL: [InstanceStatus; 6] = [
        InstanceStatus::Creating,
        InstanceStatus::Updating,
        InstanceStatus::Ready,
        InstanceStatus::Stopped,
        InstanceStatus::Paused,
        InstanceStatus::Unknown,
    ];

    /// Get the status string
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Creating => "creating",
            InstanceStatus::Updating => "updating",
            InstanceStatus::Ready => "ready",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Paused => "paused",
            InstanceStatus::Unknown => "unknown",
        }
    }

    /// Whether the instance is not serving and not converging (paused or stopped).
    pub fn is_idle(&self) -> bool {
        matches!(self, InstanceStatus::Stopped | InstanceStatus::Paused)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One running instance (replica) of a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadInstance {
    /// Platform-assigned instance id.
    #[serde(default)]
    pub id: String,
    /// Instance status.
    pub status: InstanceStatus,
    /// How many times the platform restarted this instance.
    #[serde(default)]
    pub restart_count: u32,
    /// Whether the platform flags this instance as erroneous.
    #[serde(default)]
    pub is_error: bool,
    /// Error message attached by the platform.
    #[serde(default)]
    pub error_msg: Option<String>,
}

/// One workload as returned by a project listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadInfo {
    /// Workload name (unique within the project).
    pub name: String,
    /// Aggregate workload status.
    pub status: InstanceStatus,
    /// Requested replica count.
    #[serde(default)]
    pub replicas: u32,
    /// Image reference.
    #[serde(default)]
    pub image: String,
    /// Running instances.
    #[serde(default)]
    pub instances: Vec<WorkloadInstance>,
}

/// Everything needed to create a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    /// Project (namespace) to create the workload in.
    pub project: String,
    /// Workload name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Initial replica count (workloads are created scaled to zero).
    pub replicas: u32,
    /// Environment variables injected into the container.
    pub env: HashMap<String, String>,
}

/// Trait for container platforms.
///
/// Platforms are PURE remote adapters - they do NOT access the bot store.
/// Existence checks, logging of precondition failures and state bookkeeping
/// are handled by the caller.
#[async_trait]
pub trait ContainerPlatform: Send + Sync {
    /// Platform type identifier (e.g., "dockhost", "mock")
    fn platform_type(&self) -> &'static str;

    /// List every workload in a project.
    async fn list_workloads(&self, project: &str) -> Result<Vec<WorkloadInfo>>;

    /// Create a workload.
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<()>;

    /// Scale a workload to the given number of replicas.
    async fn scale_workload(&self, name: &str, replicas: u32, project: &str) -> Result<()>;

    /// Destroy a workload.
    async fn destroy_workload(&self, project: &str, name: &str) -> Result<()>;
}
