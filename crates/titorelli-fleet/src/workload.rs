// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workload handle - operations on one named container.
//!
//! Every operation checks the existence precondition first and turns a
//! violated precondition into a logged no-op. Platform failures are logged and
//! absorbed here; the next reconciliation tick converges whatever was left
//! undone.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::identity;
use crate::platform::{ContainerPlatform, InstanceStatus, PlatformError, WorkloadInfo, WorkloadSpec};
use crate::reconcile;
use crate::store::BotRecord;

/// Result of a workload operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadOutcome {
    /// The platform accepted the request.
    Applied,
    /// Precondition not met (workload absent, or already present on create).
    Skipped,
    /// The platform call failed.
    Failed,
}

impl WorkloadOutcome {
    /// Whether the platform accepted the request.
    pub fn is_applied(&self) -> bool {
        matches!(self, WorkloadOutcome::Applied)
    }
}

/// Origins and settings injected into every workload's environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadEnv {
    /// Management API origin the workload calls back to.
    pub api_origin: String,
    /// Credential service origin.
    pub cas_origin: Option<String>,
    /// Telemetry ingestion origin.
    pub telemetry_origin: Option<String>,
}

impl WorkloadEnv {
    /// Environment for one bot's workload.
    pub fn for_bot(&self, record: &BotRecord) -> HashMap<String, String> {
        let mut env = HashMap::from([
            (
                "TITORELLI_CLIENT_ID".to_string(),
                identity::encode(record.id, record.account_id),
            ),
            (
                "TITORELLI_ACCESS_TOKEN".to_string(),
                record.access_token.clone(),
            ),
            ("TITORELLI_HOST".to_string(), self.api_origin.clone()),
            ("BOT_TOKEN".to_string(), record.tg_bot_token.clone()),
        ]);

        if let Some(cas_origin) = &self.cas_origin {
            env.insert("CAS_ORIGIN".to_string(), cas_origin.clone());
        }
        if let Some(telemetry_origin) = &self.telemetry_origin {
            env.insert("TELEMETRY_ORIGIN".to_string(), telemetry_origin.clone());
        }

        env
    }
}

/// Handle to one named workload in one project.
#[derive(Clone)]
pub struct WorkloadHandle {
    platform: Arc<dyn ContainerPlatform>,
    project: String,
    name: String,
    image: String,
}

impl WorkloadHandle {
    /// Create a handle. Does not touch the platform.
    pub fn new(
        platform: Arc<dyn ContainerPlatform>,
        project: impl Into<String>,
        name: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            project: project.into(),
            name: name.into(),
            image: image.into(),
        }
    }

    /// Workload name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Project the workload lives in.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Look the workload up in its project listing.
    pub async fn info(&self) -> Result<Option<WorkloadInfo>, PlatformError> {
        let listing = self.platform.list_workloads(&self.project).await?;
        Ok(listing.into_iter().find(|w| w.name == self.name))
    }

    /// Whether the workload exists. `None` if the platform could not be asked.
    pub async fn exists(&self) -> Option<bool> {
        match self.info().await {
            Ok(info) => Some(info.is_some()),
            Err(e) => {
                error!(
                    container = %self.name,
                    project = %self.project,
                    error = %e,
                    "Failed to list workloads"
                );
                None
            }
        }
    }

    /// Observed status of the workload, `None` if it does not exist.
    pub async fn status(&self) -> Option<InstanceStatus> {
        match self.info().await {
            Ok(Some(info)) => Some(reconcile::observed_status(&info)),
            Ok(None) => {
                warn!(container = %self.name, "Cannot query status: workload does not exist");
                None
            }
            Err(e) => {
                error!(container = %self.name, error = %e, "Failed to query workload status");
                None
            }
        }
    }

    /// Create the workload scaled to zero with the given environment.
    pub async fn create(&self, env: HashMap<String, String>) -> WorkloadOutcome {
        match self.exists().await {
            None => return WorkloadOutcome::Failed,
            Some(true) => {
                warn!(container = %self.name, "Cannot create: workload already exists");
                return WorkloadOutcome::Skipped;
            }
            Some(false) => {}
        }

        let spec = WorkloadSpec {
            project: self.project.clone(),
            name: self.name.clone(),
            image: self.image.clone(),
            replicas: 0,
            env,
        };

        let result = self.platform.create_workload(&spec).await;
        self.finish("create", result)
    }

    /// Scale the workload to one replica.
    pub async fn start(&self) -> WorkloadOutcome {
        self.scale("start", 1).await
    }

    /// Scale the workload to zero replicas.
    pub async fn stop(&self) -> WorkloadOutcome {
        self.scale("stop", 0).await
    }

    /// Destroy the workload.
    pub async fn destroy(&self) -> WorkloadOutcome {
        if !self.require_exists("destroy").await {
            return WorkloadOutcome::Skipped;
        }

        let result = self
            .platform
            .destroy_workload(&self.project, &self.name)
            .await;
        self.finish("destroy", result)
    }

    async fn scale(&self, operation: &str, replicas: u32) -> WorkloadOutcome {
        if !self.require_exists(operation).await {
            return WorkloadOutcome::Skipped;
        }

        let result = self
            .platform
            .scale_workload(&self.name, replicas, &self.project)
            .await;
        self.finish(operation, result)
    }

    /// Existence precondition. Listing failures count as unmet.
    async fn require_exists(&self, operation: &str) -> bool {
        match self.exists().await {
            Some(true) => true,
            Some(false) => {
                warn!(
                    container = %self.name,
                    operation,
                    "Cannot {}: workload does not exist",
                    operation
                );
                false
            }
            None => false,
        }
    }

    fn finish(&self, operation: &str, result: Result<(), PlatformError>) -> WorkloadOutcome {
        match result {
            Ok(()) => {
                info!(
                    container = %self.name,
                    project = %self.project,
                    operation,
                    "Workload {} requested",
                    operation
                );
                WorkloadOutcome::Applied
            }
            Err(e) => {
                error!(
                    container = %self.name,
                    project = %self.project,
                    operation,
                    error = %e,
                    "Workload {} failed",
                    operation
                );
                WorkloadOutcome::Failed
            }
        }
    }
}
