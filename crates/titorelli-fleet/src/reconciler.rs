// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that converges bot records with the platform.
//!
//! Every tick lists the workloads of the owning project once, lists every bot
//! record once, and walks the records:
//!
//! - a bot whose workload is gone is marked `deleted` (bots in `starting` get a
//!   grace period while their workload is being created);
//! - a bot whose workload is present goes through [`reconcile::decide`];
//! - a `running`/`stopping` bot whose instances have been idle for several
//!   consecutive ticks is downgraded to `stopped`.
//!
//! Only workloads and records whose names belong to this fleet's name family
//! are considered. A failed listing skips the tick; the next tick converges.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::controller::ControllerRegistry;
use crate::error::Result;
use crate::naming::ContainerNameGenerator;
use crate::platform::{ContainerPlatform, WorkloadInfo};
use crate::reconcile::{self, ReconcileAction};
use crate::store::{BotRecord, BotState, BotStore};

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How often to poll the platform.
    pub poll_interval: Duration,
    /// How long a `starting` bot may go without a workload before it is
    /// considered gone.
    pub startup_grace: Duration,
    /// Consecutive idle observations required before downgrading to `stopped`.
    pub settle_ticks: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1_200),
            startup_grace: Duration::from_secs(120),
            settle_ticks: 3,
        }
    }
}

/// What one tick did about one bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotVerdict {
    /// Not reconciled (`created`, `deleted`, another name family, or a hard
    /// reload in flight).
    Ignored,
    /// Workload absent but the bot is still within its startup grace period.
    InGrace,
    /// Workload absent; the bot was marked `deleted`.
    MarkedDeleted,
    /// Workload idle long enough; the bot was downgraded to `stopped`.
    Settled,
    /// Workload present; the decision table chose this action.
    Decided(ReconcileAction),
}

/// Counters for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Workloads in the listing that belong to this fleet.
    pub workloads: usize,
    /// Bot records examined.
    pub bots: usize,
    /// Start/stop requests issued.
    pub actions: usize,
    /// Bots marked deleted.
    pub deleted: usize,
    /// Bots downgraded to stopped.
    pub settled: usize,
}

impl TickSummary {
    fn record(&mut self, verdict: BotVerdict) {
        match verdict {
            BotVerdict::MarkedDeleted => self.deleted += 1,
            BotVerdict::Settled => self.settled += 1,
            BotVerdict::Decided(ReconcileAction::Start | ReconcileAction::Stop) => {
                self.actions += 1
            }
            _ => {}
        }
    }
}

/// Background worker that reconciles bot records with observed workloads.
pub struct Reconciler {
    project: String,
    naming: ContainerNameGenerator,
    platform: Arc<dyn ContainerPlatform>,
    store: Arc<dyn BotStore>,
    registry: Arc<ControllerRegistry>,
    config: ReconcilerConfig,
    /// Consecutive idle observations per bot.
    idle_ticks: Mutex<HashMap<i64, u32>>,
    shutdown: Arc<Notify>,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        project: impl Into<String>,
        naming: ContainerNameGenerator,
        platform: Arc<dyn ContainerPlatform>,
        store: Arc<dyn BotStore>,
        registry: Arc<ControllerRegistry>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            project: project.into(),
            naming,
            platform,
            store,
            registry,
            config,
            idle_ticks: Mutex::new(HashMap::new()),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Project this reconciler polls.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Run the reconciliation loop until the shutdown signal is received.
    pub async fn run(&self) {
        info!(
            project = %self.project,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            startup_grace_secs = self.config.startup_grace.as_secs(),
            "Reconciler started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Reconciler received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.tick().await {
                        error!(project = %self.project, error = %e, "Reconciliation tick failed");
                    }
                }
            }
        }

        info!("Reconciler stopped");
    }

    fn idle_ticks(&self) -> MutexGuard<'_, HashMap<i64, u32>> {
        self.idle_ticks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one reconciliation pass.
    pub async fn tick(&self) -> Result<TickSummary> {
        let listing = self.platform.list_workloads(&self.project).await?;
        let workloads: HashMap<&str, &WorkloadInfo> = listing
            .iter()
            .filter(|w| self.naming.matches(&w.name))
            .map(|w| (w.name.as_str(), w))
            .collect();

        let bots = self.store.list_all().await?;

        let mut summary = TickSummary {
            workloads: workloads.len(),
            ..Default::default()
        };

        for record in &bots {
            summary.bots += 1;
            let info = workloads.get(record.dockhost_container.as_str()).copied();
            match self.reconcile_bot(record, info).await {
                Ok(verdict) => summary.record(verdict),
                Err(e) => error!(
                    bot_id = record.id,
                    container = %record.dockhost_container,
                    error = %e,
                    "Failed to reconcile bot"
                ),
            }
        }

        // forget counters of bots that no longer exist
        let live: HashSet<i64> = bots.iter().map(|b| b.id).collect();
        self.idle_ticks().retain(|id, _| live.contains(id));

        debug!(
            workloads = summary.workloads,
            bots = summary.bots,
            actions = summary.actions,
            deleted = summary.deleted,
            settled = summary.settled,
            "Reconciliation tick complete"
        );

        Ok(summary)
    }

    /// Reconcile a single bot right away, with one listing call.
    pub async fn converge(&self, record: &BotRecord) -> Result<BotVerdict> {
        let listing = self.platform.list_workloads(&self.project).await?;
        let info = listing
            .iter()
            .find(|w| w.name == record.dockhost_container && self.naming.matches(&w.name));
        self.reconcile_bot(record, info).await
    }

    async fn reconcile_bot(
        &self,
        record: &BotRecord,
        info: Option<&WorkloadInfo>,
    ) -> Result<BotVerdict> {
        if record.dockhost_project != self.project
            || !self.naming.matches(&record.dockhost_container)
            || matches!(record.state, BotState::Created | BotState::Deleted)
        {
            return Ok(BotVerdict::Ignored);
        }

        if self
            .registry
            .get(record.id)
            .is_some_and(|c| c.is_reloading())
        {
            return Ok(BotVerdict::Ignored);
        }

        let Some(info) = info else {
            return self.workload_absent(record).await;
        };

        if reconcile::settles_to_stopped(record.state) && reconcile::all_idle(info) {
            let observed = {
                let mut idle_ticks = self.idle_ticks();
                let count = idle_ticks.entry(record.id).or_insert(0);
                *count += 1;
                *count
            };

            if observed >= self.config.settle_ticks.max(1)
                && self
                    .store
                    .transition(record.id, &[record.state], BotState::Stopped)
                    .await?
            {
                self.idle_ticks().remove(&record.id);
                info!(
                    bot_id = record.id,
                    container = %record.dockhost_container,
                    from = %record.state,
                    idle_ticks = observed,
                    "Workload idle, bot marked stopped"
                );
                return Ok(BotVerdict::Settled);
            }
        } else {
            self.idle_ticks().remove(&record.id);
        }

        let observed = reconcile::observed_status(info);
        let action = reconcile::decide(record.state, observed);
        if action != ReconcileAction::NoOp {
            debug!(
                bot_id = record.id,
                state = %record.state,
                observed = %observed,
                action = ?action,
                "Reconciliation decision"
            );
            self.registry
                .controller_for(record)
                .apply(record.state, action)
                .await;
        }

        Ok(BotVerdict::Decided(action))
    }

    async fn workload_absent(&self, record: &BotRecord) -> Result<BotVerdict> {
        if record.state == BotState::Starting {
            let age = Utc::now().signed_duration_since(record.state_changed_at);
            let within_grace = age
                .to_std()
                .map(|age| age < self.config.startup_grace)
                .unwrap_or(true);
            if within_grace {
                return Ok(BotVerdict::InGrace);
            }
        }

        if !self
            .registry
            .controller_for(record)
            .mark_vanished(record.state)
            .await?
        {
            // absence not confirmed; the next tick looks again
            return Ok(BotVerdict::Ignored);
        }

        warn!(
            bot_id = record.id,
            container = %record.dockhost_container,
            from = %record.state,
            "Workload disappeared, bot marked deleted"
        );
        self.idle_ticks().remove(&record.id);
        self.registry.evict(record.id);

        Ok(BotVerdict::MarkedDeleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = TickSummary::default();
        summary.record(BotVerdict::Decided(ReconcileAction::Start));
        summary.record(BotVerdict::Decided(ReconcileAction::Stop));
        summary.record(BotVerdict::Decided(ReconcileAction::NoOp));
        summary.record(BotVerdict::Decided(ReconcileAction::MarkPossiblyFailed));
        summary.record(BotVerdict::MarkedDeleted);
        summary.record(BotVerdict::Settled);
        summary.record(BotVerdict::InGrace);

        assert_eq!(summary.actions, 2);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.settled, 1);
    }

    #[test]
    fn test_default_config() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(1_200));
        assert_eq!(config.settle_ticks, 3);
    }
}
