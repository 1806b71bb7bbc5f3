// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock platform for testing.
//!
//! A simple platform implementation that keeps workloads in memory and
//! records every call, without talking to a real container host.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::traits::*;

/// A call received by the mock platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    /// `list_workloads(project)`
    List {
        /// Project.
        project: String,
    },
    /// `create_workload(spec)`
    Create {
        /// Project.
        project: String,
        /// Workload name.
        name: String,
        /// Image reference.
        image: String,
        /// Injected environment.
        env: HashMap<String, String>,
    },
    /// `scale_workload(name, replicas, project)`
    Scale {
        /// Project.
        project: String,
        /// Workload name.
        name: String,
        /// Requested replicas.
        replicas: u32,
    },
    /// `destroy_workload(project, name)`
    Destroy {
        /// Project.
        project: String,
        /// Workload name.
        name: String,
    },
}

impl PlatformCall {
    /// Whether this call mutates the platform (everything but listing).
    pub fn is_mutation(&self) -> bool {
        !matches!(self, PlatformCall::List { .. })
    }
}

/// Mock workload state.
#[derive(Debug, Clone)]
struct MockWorkload {
    image: String,
    replicas: u32,
    /// Status reported by every instance; `None` derives it from replicas.
    status_override: Option<InstanceStatus>,
}

impl MockWorkload {
    fn to_info(&self, name: &str) -> WorkloadInfo {
        let status = self.status_override.unwrap_or(if self.replicas > 0 {
            InstanceStatus::Ready
        } else {
            InstanceStatus::Stopped
        });

        let instances = (0..self.replicas.max(u32::from(self.status_override.is_some())))
            .map(|i| WorkloadInstance {
                id: format!("{}-{}", name, i),
                status,
                restart_count: 0,
                is_error: false,
                error_msg: None,
            })
            .collect();

        WorkloadInfo {
            name: name.to_string(),
            status,
            replicas: self.replicas,
            image: self.image.clone(),
            instances,
        }
    }
}

/// Mock platform for testing.
#[derive(Default)]
pub struct MockPlatform {
    /// Workloads keyed by (project, name).
    workloads: Arc<Mutex<BTreeMap<(String, String), MockWorkload>>>,
    calls: Arc<Mutex<Vec<PlatformCall>>>,
    /// If true, listing fails.
    fail_listing: AtomicBool,
    /// If true, every mutating call fails.
    fail_mutations: AtomicBool,
    /// Listings served verbatim, oldest first, before the live state.
    queued_listings: Mutex<VecDeque<Vec<WorkloadInfo>>>,
}

impl MockPlatform {
    /// Create a new mock platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `list_workloads` fail (or succeed again).
    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Make create/scale/destroy fail (or succeed again).
    pub fn set_fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    /// Answer the next `list_workloads` with `listing` instead of the live
    /// workloads, as a listing taken before a concurrent change would.
    pub async fn queue_listing(&self, listing: Vec<WorkloadInfo>) {
        self.queued_listings.lock().await.push_back(listing);
    }

    /// Insert a workload directly, bypassing the call log.
    pub async fn insert_workload(&self, project: &str, name: &str, replicas: u32) {
        self.workloads.lock().await.insert(
            (project.to_string(), name.to_string()),
            MockWorkload {
                image: "mock-image".to_string(),
                replicas,
                status_override: None,
            },
        );
    }

    /// Force the status every instance of a workload reports.
    ///
    /// Simulates out-of-band changes (a manual stop, a pause, a rollout).
    pub async fn set_status(&self, project: &str, name: &str, status: InstanceStatus) {
        let mut workloads = self.workloads.lock().await;
        if let Some(workload) = workloads.get_mut(&(project.to_string(), name.to_string())) {
            workload.status_override = Some(status);
        }
    }

    /// Remove a workload out-of-band, bypassing the call log.
    pub async fn remove_workload(&self, project: &str, name: &str) {
        self.workloads
            .lock()
            .await
            .remove(&(project.to_string(), name.to_string()));
    }

    /// Whether a workload exists.
    pub async fn has_workload(&self, project: &str, name: &str) -> bool {
        self.workloads
            .lock()
            .await
            .contains_key(&(project.to_string(), name.to_string()))
    }

    /// Current replica count of a workload.
    pub async fn replicas(&self, project: &str, name: &str) -> Option<u32> {
        self.workloads
            .lock()
            .await
            .get(&(project.to_string(), name.to_string()))
            .map(|w| w.replicas)
    }

    /// Every call received so far.
    pub async fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().await.clone()
    }

    /// Every mutating call received so far.
    pub async fn mutations(&self) -> Vec<PlatformCall> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    async fn record(&self, call: PlatformCall) {
        self.calls.lock().await.push(call);
    }

    fn check_mutations(&self, command: &str) -> Result<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(PlatformError::CommandFailed {
                command: command.to_string(),
                stderr: "Mock failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerPlatform for MockPlatform {
    fn platform_type(&self) -> &'static str {
        "mock"
    }

    async fn list_workloads(&self, project: &str) -> Result<Vec<WorkloadInfo>> {
        self.record(PlatformCall::List {
            project: project.to_string(),
        })
        .await;

        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(PlatformError::CommandFailed {
                command: "container list".to_string(),
                stderr: "Mock failure".to_string(),
            });
        }

        if let Some(listing) = self.queued_listings.lock().await.pop_front() {
            return Ok(listing);
        }

        let workloads = self.workloads.lock().await;
        Ok(workloads
            .iter()
            .filter(|((p, _), _)| p == project)
            .map(|((_, name), workload)| workload.to_info(name))
            .collect())
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<()> {
        self.record(PlatformCall::Create {
            project: spec.project.clone(),
            name: spec.name.clone(),
            image: spec.image.clone(),
            env: spec.env.clone(),
        })
        .await;
        self.check_mutations("container create")?;

        let mut workloads = self.workloads.lock().await;
        let key = (spec.project.clone(), spec.name.clone());
        if workloads.contains_key(&key) {
            return Err(PlatformError::CommandFailed {
                command: "container create".to_string(),
                stderr: format!("container {} already exists", spec.name),
            });
        }
        workloads.insert(
            key,
            MockWorkload {
                image: spec.image.clone(),
                replicas: spec.replicas,
                status_override: None,
            },
        );
        Ok(())
    }

    async fn scale_workload(&self, name: &str, replicas: u32, project: &str) -> Result<()> {
        self.record(PlatformCall::Scale {
            project: project.to_string(),
            name: name.to_string(),
            replicas,
        })
        .await;
        self.check_mutations("container scale")?;

        let mut workloads = self.workloads.lock().await;
        match workloads.get_mut(&(project.to_string(), name.to_string())) {
            Some(workload) => {
                workload.replicas = replicas;
                workload.status_override = None;
                Ok(())
            }
            None => Err(PlatformError::CommandFailed {
                command: "container scale".to_string(),
                stderr: format!("container {} not found", name),
            }),
        }
    }

    async fn destroy_workload(&self, project: &str, name: &str) -> Result<()> {
        self.record(PlatformCall::Destroy {
            project: project.to_string(),
            name: name.to_string(),
        })
        .await;
        self.check_mutations("container delete")?;

        let mut workloads = self.workloads.lock().await;
        match workloads.remove(&(project.to_string(), name.to_string())) {
            Some(_) => Ok(()),
            None => Err(PlatformError::CommandFailed {
                command: "container delete".to_string(),
                stderr: format!("container {} not found", name),
            }),
        }
    }
}
