// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bot lifecycle controller.
//!
//! One [`BotController`] exists per bot record that has been touched since the
//! process started. It serializes the user-facing commands for that bot, owns
//! the bot's debounce and liveness timers, and is the only thing that talks to
//! the bot's workload.
//!
//! Controllers live in a [`ControllerRegistry`] keyed by internal bot id.
//! Timer tasks only hold weak references to their controller, so evicting a
//! controller from the registry drops it and aborts its timers.
//!
//! A debounced hard reload runs as its own task once the debounce window
//! elapses. While it is in flight, `start`, `stop` and `restart` are
//! suppressed and the reconciliation loop leaves the bot alone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::platform::ContainerPlatform;
use crate::reconcile::ReconcileAction;
use crate::store::{BotFieldUpdate, BotRecord, BotState, BotStore};
use crate::timers::BotTimers;
use crate::workload::{WorkloadEnv, WorkloadHandle, WorkloadOutcome};

/// Every state a bot may leave. `deleted` is terminal.
pub const NOT_DELETED: &[BotState] = &[
    BotState::Created,
    BotState::Starting,
    BotState::Running,
    BotState::Stopping,
    BotState::Stopped,
    BotState::Failed,
];

/// States in which a heartbeat promotes the bot to `running`.
///
/// A bot in `stopping` has an explicit stop request in flight; a late
/// heartbeat from its last instance must not undo it.
const ALIVE_FROM: &[BotState] = &[
    BotState::Created,
    BotState::Starting,
    BotState::Running,
    BotState::Stopped,
    BotState::Failed,
];

/// States from which a liveness timeout fails the bot.
const LIVENESS_WATCHED: &[BotState] = &[BotState::Running, BotState::Starting];

/// Settings shared by every controller.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Environment injected into workloads.
    pub env: WorkloadEnv,
    /// Quiet period after the last configuration update before the hard reload.
    pub reload_debounce: Duration,
    /// How long a bot may stay silent before it is marked failed.
    pub liveness_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            env: WorkloadEnv::default(),
            reload_debounce: Duration::from_millis(3_000),
            liveness_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of a lifecycle command that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command ran.
    Completed,
    /// The command was dropped because a hard reload is in flight.
    Suppressed,
}

/// Stateful controller bound to one bot record.
pub struct BotController {
    bot_id: i64,
    external_id: i64,
    account_id: i64,
    workload: WorkloadHandle,
    store: Arc<dyn BotStore>,
    settings: Arc<ControllerSettings>,
    timers: Mutex<BotTimers>,
    /// Held for the whole duration of a command or hard reload.
    command_lock: tokio::sync::Mutex<()>,
    reloading: AtomicBool,
    deleted: AtomicBool,
}

impl BotController {
    /// Create a controller for a record.
    pub fn new(
        record: &BotRecord,
        platform: Arc<dyn ContainerPlatform>,
        store: Arc<dyn BotStore>,
        settings: Arc<ControllerSettings>,
    ) -> Self {
        Self {
            bot_id: record.id,
            external_id: record.external_id,
            account_id: record.account_id,
            workload: WorkloadHandle::new(
                platform,
                record.dockhost_project.clone(),
                record.dockhost_container.clone(),
                record.dockhost_image.clone(),
            ),
            store,
            settings,
            timers: Mutex::new(BotTimers::default()),
            command_lock: tokio::sync::Mutex::new(()),
            reloading: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
        }
    }

    /// Internal bot id.
    pub fn bot_id(&self) -> i64 {
        self.bot_id
    }

    /// Tenant-facing bot id.
    pub fn external_id(&self) -> i64 {
        self.external_id
    }

    /// Owning account.
    pub fn account_id(&self) -> i64 {
        self.account_id
    }

    /// The bot's workload.
    pub fn workload(&self) -> &WorkloadHandle {
        &self.workload
    }

    /// Whether a hard reload is in flight.
    pub fn is_reloading(&self) -> bool {
        self.reloading.load(Ordering::SeqCst)
    }

    /// Whether a debounced hard reload is waiting for its window to elapse.
    pub fn reload_pending(&self) -> bool {
        self.timers().debounce.is_armed()
    }

    /// Whether the liveness timer is armed.
    pub fn liveness_armed(&self) -> bool {
        self.timers().liveness.is_armed()
    }

    fn timers(&self) -> MutexGuard<'_, BotTimers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn suppressed(&self, command: &str) -> bool {
        if self.is_reloading() {
            info!(
                bot_id = self.bot_id,
                command, "Hard reload in flight, command suppressed"
            );
            return true;
        }
        false
    }

    async fn load(&self) -> Result<BotRecord> {
        self.store
            .get_by_id(self.bot_id)
            .await?
            .ok_or(Error::BotNotFound(self.external_id))
    }

    async fn enter(&self, to: BotState) -> Result<()> {
        if self.store.transition(self.bot_id, NOT_DELETED, to).await? {
            return Ok(());
        }
        match self.store.get_by_id(self.bot_id).await? {
            None => Err(Error::BotNotFound(self.external_id)),
            Some(_) => Err(Error::InvalidRequest(format!(
                "Bot with id = {} is deleted",
                self.external_id
            ))),
        }
    }

    /// Set `starting`, create the workload if absent, scale it to one.
    pub async fn start(self: &Arc<Self>) -> Result<CommandOutcome> {
        if self.suppressed("start") {
            return Ok(CommandOutcome::Suppressed);
        }
        let _guard = self.command_lock.lock().await;
        self.start_locked().await
    }

    /// Set `stopping` and scale the workload to zero.
    pub async fn stop(self: &Arc<Self>) -> Result<CommandOutcome> {
        if self.suppressed("stop") {
            return Ok(CommandOutcome::Suppressed);
        }
        let _guard = self.command_lock.lock().await;
        self.stop_locked().await
    }

    /// Stop then start, holding the command lock across both.
    pub async fn restart(self: &Arc<Self>) -> Result<CommandOutcome> {
        if self.suppressed("restart") {
            return Ok(CommandOutcome::Suppressed);
        }
        let _guard = self.command_lock.lock().await;
        self.stop_locked().await?;
        self.start_locked().await
    }

    async fn start_locked(&self) -> Result<CommandOutcome> {
        let record = self.load().await?;
        self.enter(BotState::Starting).await?;
        info!(bot_id = self.bot_id, container = %self.workload.name(), "Starting bot");

        if self.workload.exists().await == Some(false) {
            self.workload.create(self.settings.env.for_bot(&record)).await;
        }
        self.workload.start().await;

        Ok(CommandOutcome::Completed)
    }

    async fn stop_locked(&self) -> Result<CommandOutcome> {
        self.enter(BotState::Stopping).await?;
        info!(bot_id = self.bot_id, container = %self.workload.name(), "Stopping bot");

        self.workload.stop().await;

        Ok(CommandOutcome::Completed)
    }

    /// Remove the record and destroy the workload.
    ///
    /// Never suppressed. Pending timers are cancelled before anything else and
    /// a hard reload that has not acquired the command lock yet will not run.
    pub async fn delete(self: &Arc<Self>) -> Result<()> {
        self.deleted.store(true, Ordering::SeqCst);
        self.timers().cancel_all();

        let _guard = self.command_lock.lock().await;
        info!(bot_id = self.bot_id, container = %self.workload.name(), "Deleting bot");

        if !self.store.delete(self.bot_id).await? {
            return Err(Error::BotNotFound(self.external_id));
        }
        self.workload.destroy().await;

        Ok(())
    }

    /// Persist configuration fields and schedule a debounced hard reload.
    pub async fn update(self: &Arc<Self>, update: &BotFieldUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let record = self.load().await?;
        if record.state.is_terminal() || self.deleted.load(Ordering::SeqCst) {
            return Err(Error::InvalidRequest(format!(
                "Bot with id = {} is deleted",
                self.external_id
            )));
        }

        if !self.store.update_fields(self.bot_id, update).await? {
            return Err(Error::BotNotFound(self.external_id));
        }
        self.schedule_reload();

        Ok(())
    }

    /// (Re)arm the debounce timer. When it fires the hard reload is spawned as
    /// a separate task, so later rearms never abort a reload in progress.
    pub fn schedule_reload(self: &Arc<Self>) {
        let controller = Arc::downgrade(self);
        debug!(
            bot_id = self.bot_id,
            debounce_ms = self.settings.reload_debounce.as_millis() as u64,
            "Hard reload scheduled"
        );

        self.timers()
            .debounce
            .rearm(self.settings.reload_debounce, async move {
                if let Some(controller) = controller.upgrade() {
                    tokio::spawn(async move { controller.hard_reload().await });
                }
            });
    }

    /// Destroy, recreate and restart the workload from the latest record.
    ///
    /// Only acts when the workload exists. The new workload is scaled up only
    /// if the bot is supposed to be serving.
    pub async fn hard_reload(self: Arc<Self>) {
        self.reloading.store(true, Ordering::SeqCst);
        let result = {
            let _guard = self.command_lock.lock().await;
            self.hard_reload_locked().await
        };
        self.reloading.store(false, Ordering::SeqCst);

        if let Err(e) = result {
            error!(bot_id = self.bot_id, error = %e, "Hard reload failed");
        }
    }

    async fn hard_reload_locked(&self) -> Result<()> {
        if self.deleted.load(Ordering::SeqCst) {
            return Ok(());
        }

        match self.workload.exists().await {
            Some(true) => {}
            Some(false) => {
                info!(
                    bot_id = self.bot_id,
                    container = %self.workload.name(),
                    "Workload does not exist, skipping hard reload"
                );
                return Ok(());
            }
            None => return Ok(()),
        }

        let record = self.load().await?;
        if record.state.is_terminal() {
            return Ok(());
        }

        info!(bot_id = self.bot_id, container = %self.workload.name(), "Hard reloading bot");

        self.workload.destroy().await;
        self.workload
            .create(self.settings.env.for_bot(&record))
            .await;
        if matches!(record.state, BotState::Starting | BotState::Running) {
            self.workload.start().await;
        }

        Ok(())
    }

    /// Record a liveness heartbeat: promote to `running` and rearm the
    /// liveness timer. Returns whether the heartbeat was accepted.
    pub async fn report_alive(self: &Arc<Self>) -> Result<bool> {
        if self.deleted.load(Ordering::SeqCst) {
            return Ok(false);
        }

        if !self
            .store
            .transition(self.bot_id, ALIVE_FROM, BotState::Running)
            .await?
        {
            debug!(bot_id = self.bot_id, "Heartbeat ignored");
            return Ok(false);
        }

        self.arm_liveness();
        Ok(true)
    }

    fn arm_liveness(self: &Arc<Self>) {
        let controller = Arc::downgrade(self);
        let timeout = self.settings.liveness_timeout;

        self.timers().liveness.rearm(timeout, async move {
            let Some(controller) = controller.upgrade() else {
                return;
            };
            controller.liveness_expired().await;
        });
    }

    async fn liveness_expired(&self) {
        match self
            .store
            .transition(self.bot_id, LIVENESS_WATCHED, BotState::Failed)
            .await
        {
            Ok(true) => warn!(
                bot_id = self.bot_id,
                timeout_secs = self.settings.liveness_timeout.as_secs(),
                "No heartbeat before liveness timeout, bot marked failed"
            ),
            Ok(false) => {}
            Err(e) => error!(bot_id = self.bot_id, error = %e, "Failed to mark bot failed"),
        }
    }

    /// Apply a reconciliation action decided for a bot observed in `expected`.
    ///
    /// Skipped (returns `None`) while a hard reload or any command holds the
    /// bot, or when the stored state is no longer `expected`; the next tick
    /// sees the outcome and decides again.
    pub async fn apply(
        &self,
        expected: BotState,
        action: ReconcileAction,
    ) -> Option<WorkloadOutcome> {
        if matches!(action, ReconcileAction::NoOp) || self.is_reloading() {
            return None;
        }
        let Ok(_guard) = self.command_lock.try_lock() else {
            debug!(bot_id = self.bot_id, "Command in flight, skipping reconciliation");
            return None;
        };

        match self.store.get_by_id(self.bot_id).await {
            Ok(Some(current)) if current.state == expected => {}
            Ok(current) => {
                debug!(
                    bot_id = self.bot_id,
                    expected = %expected,
                    current = ?current.map(|r| r.state),
                    "State changed since observation, skipping reconciliation"
                );
                return None;
            }
            Err(e) => {
                error!(bot_id = self.bot_id, error = %e, "Failed to reload bot before reconciling");
                return None;
            }
        }

        match action {
            ReconcileAction::Start => {
                info!(bot_id = self.bot_id, container = %self.workload.name(), "Converging: start");
                Some(self.workload.start().await)
            }
            ReconcileAction::Stop => {
                info!(bot_id = self.bot_id, container = %self.workload.name(), "Converging: stop");
                Some(self.workload.stop().await)
            }
            ReconcileAction::MarkPossiblyFailed => {
                warn!(
                    bot_id = self.bot_id,
                    container = %self.workload.name(),
                    "Workload is updating while the bot should be serving, possibly failed"
                );
                None
            }
            ReconcileAction::NoOp => None,
        }
    }

    /// Mark the bot `deleted` because its workload is gone.
    ///
    /// The absence seen in a listing is confirmed against the platform while
    /// holding the command lock, and the state must still be `observed`.
    /// Returns `false` without writing anything when a command or hard reload
    /// holds the bot, the workload exists again, or the listing fails.
    pub async fn mark_vanished(&self, observed: BotState) -> Result<bool> {
        if self.is_reloading() {
            return Ok(false);
        }
        let Ok(_guard) = self.command_lock.try_lock() else {
            debug!(bot_id = self.bot_id, "Command in flight, not marking deleted");
            return Ok(false);
        };

        if self.workload.exists().await != Some(false) {
            debug!(
                bot_id = self.bot_id,
                container = %self.workload.name(),
                "Workload absence not confirmed"
            );
            return Ok(false);
        }

        Ok(self
            .store
            .transition(self.bot_id, &[observed], BotState::Deleted)
            .await?)
    }

    /// Cancel both timers.
    pub fn cancel_timers(&self) {
        self.timers().cancel_all();
    }
}

/// Arena of live controllers keyed by internal bot id.
pub struct ControllerRegistry {
    controllers: Mutex<HashMap<i64, Arc<BotController>>>,
    platform: Arc<dyn ContainerPlatform>,
    store: Arc<dyn BotStore>,
    settings: Arc<ControllerSettings>,
}

impl ControllerRegistry {
    /// Create an empty registry.
    pub fn new(
        platform: Arc<dyn ContainerPlatform>,
        store: Arc<dyn BotStore>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            controllers: Mutex::new(HashMap::new()),
            platform,
            store,
            settings: Arc::new(settings),
        }
    }

    fn controllers(&self) -> MutexGuard<'_, HashMap<i64, Arc<BotController>>> {
        self.controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Controller for a record, created on first use.
    pub fn controller_for(&self, record: &BotRecord) -> Arc<BotController> {
        self.controllers()
            .entry(record.id)
            .or_insert_with(|| {
                Arc::new(BotController::new(
                    record,
                    self.platform.clone(),
                    self.store.clone(),
                    self.settings.clone(),
                ))
            })
            .clone()
    }

    /// Existing controller, if any.
    pub fn get(&self, bot_id: i64) -> Option<Arc<BotController>> {
        self.controllers().get(&bot_id).cloned()
    }

    /// Drop a controller and cancel its timers.
    pub fn evict(&self, bot_id: i64) -> Option<Arc<BotController>> {
        let controller = self.controllers().remove(&bot_id)?;
        controller.cancel_timers();
        Some(controller)
    }

    /// Number of live controllers.
    pub fn len(&self) -> usize {
        self.controllers().len()
    }

    /// Whether no controller is live.
    pub fn is_empty(&self) -> bool {
        self.controllers().is_empty()
    }

    /// Cancel every timer and drop every controller.
    pub fn shutdown(&self) {
        let controllers: Vec<_> = self.controllers().drain().map(|(_, c)| c).collect();
        for controller in &controllers {
            controller.cancel_timers();
        }
        info!(controllers = controllers.len(), "Controller registry shut down");
    }
}
