// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bot record store interfaces and backends.
//!
//! The store is the single source of truth for every bot's configuration and
//! last-commanded lifecycle state. Both management commands and the
//! reconciliation loop write to it, so every asynchronous transition goes
//! through [`BotStore::transition`], which only applies when the row is still
//! in one of the states the caller observed.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryBotStore;
pub use self::sqlite::SqliteBotStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Running migrations failed.
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A bot with the same external id or container name already exists.
    #[error("Bot already exists: {0}")]
    Conflict(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle state of a bot.
///
/// ```text
/// created ─► starting ─► running ─► stopping ─► stopped
///                │          │
///                └──────────┴─► failed        (liveness timeout)
///
/// any ─► deleted                              (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BotState {
    /// Record inserted, no workload requested yet.
    Created,
    /// Start requested, workload converging.
    Starting,
    /// Workload reported itself alive.
    Running,
    /// Stop requested, workload converging.
    Stopping,
    /// Workload scaled to zero.
    Stopped,
    /// Workload stopped reporting liveness.
    Failed,
    /// Workload vanished from the platform or the bot was deleted.
    Deleted,
}

impl BotState {
    /// Every state, in declaration order.
    pub const ALL: [BotState; 7] = [
        BotState::Created,
        BotState::Starting,
        BotState::Running,
        BotState::Stopping,
        BotState::Stopped,
        BotState::Failed,
        BotState::Deleted,
    ];

    /// Get the state string
    pub fn as_str(&self) -> &'static str {
        match self {
            BotState::Created => "created",
            BotState::Starting => "starting",
            BotState::Running => "running",
            BotState::Stopping => "stopping",
            BotState::Stopped => "stopped",
            BotState::Failed => "failed",
            BotState::Deleted => "deleted",
        }
    }

    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, BotState::Deleted)
    }
}

impl std::fmt::Display for BotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized state string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown bot state: {0}")]
pub struct UnknownState(pub String);

impl std::str::FromStr for BotState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BotState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

impl TryFrom<String> for BotState {
    type Error = UnknownState;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Bot record from the store.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct BotRecord {
    /// Internal id (store-assigned, never exposed to tenants).
    pub id: i64,
    /// Tenant-facing bot id.
    pub external_id: i64,
    /// Owning account.
    pub account_id: i64,
    /// Credential the workload presents when calling back.
    pub access_token: String,
    /// Skip telemetry collection for this bot.
    pub bypass_telemetry: bool,
    /// Classification model assigned to this bot.
    pub model_id: i64,
    /// Messaging-platform bot token.
    pub tg_bot_token: String,
    /// Container image reference.
    pub dockhost_image: String,
    /// Derived workload name.
    pub dockhost_container: String,
    /// Platform project the workload lives in.
    pub dockhost_project: String,
    /// Last-commanded lifecycle state.
    #[sqlx(try_from = "String")]
    pub state: BotState,
    /// Space-separated capability grants.
    pub scopes: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last modified.
    pub updated_at: DateTime<Utc>,
    /// When `state` last changed. Configuration updates leave it alone.
    pub state_changed_at: DateTime<Utc>,
}

impl BotRecord {
    /// Parsed scope set.
    pub fn scope_list(&self) -> Vec<&str> {
        self.scopes.split_whitespace().collect()
    }

    /// Tenant-facing projection of this record.
    pub fn view(&self) -> BotView {
        BotView {
            id: self.external_id,
            state: self.state,
            account_id: self.account_id,
            bypass_telemetry: self.bypass_telemetry,
            model_id: self.model_id,
            dockhost_image: self.dockhost_image.clone(),
            dockhost_container: self.dockhost_container.clone(),
            dockhost_project: self.dockhost_project.clone(),
        }
    }
}

/// Tenant-facing view of a bot. Never carries the internal id or secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotView {
    /// External id.
    pub id: i64,
    /// Lifecycle state.
    pub state: BotState,
    /// Owning account.
    pub account_id: i64,
    /// Telemetry bypass flag.
    pub bypass_telemetry: bool,
    /// Assigned model.
    pub model_id: i64,
    /// Container image.
    pub dockhost_image: String,
    /// Workload name.
    pub dockhost_container: String,
    /// Platform project.
    pub dockhost_project: String,
}

/// Fields for inserting a new bot.
#[derive(Debug, Clone)]
pub struct NewBot {
    /// Tenant-facing bot id.
    pub external_id: i64,
    /// Owning account.
    pub account_id: i64,
    /// Workload callback credential.
    pub access_token: String,
    /// Telemetry bypass flag.
    pub bypass_telemetry: bool,
    /// Assigned model.
    pub model_id: i64,
    /// Messaging-platform bot token.
    pub tg_bot_token: String,
    /// Space-separated scopes.
    pub scopes: String,
    /// Container image.
    pub dockhost_image: String,
    /// Derived workload name.
    pub dockhost_container: String,
    /// Platform project.
    pub dockhost_project: String,
}

/// Partial update of the workload-visible configuration fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotFieldUpdate {
    /// New access token.
    pub access_token: Option<String>,
    /// New telemetry bypass flag.
    pub bypass_telemetry: Option<bool>,
    /// New model id.
    pub model_id: Option<i64>,
    /// New messaging-platform bot token.
    pub tg_bot_token: Option<String>,
}

impl BotFieldUpdate {
    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
            && self.bypass_telemetry.is_none()
            && self.model_id.is_none()
            && self.tg_bot_token.is_none()
    }

    /// Apply to an in-memory record.
    pub fn apply_to(&self, record: &mut BotRecord) {
        if let Some(access_token) = &self.access_token {
            record.access_token = access_token.clone();
        }
        if let Some(bypass_telemetry) = self.bypass_telemetry {
            record.bypass_telemetry = bypass_telemetry;
        }
        if let Some(model_id) = self.model_id {
            record.model_id = model_id;
        }
        if let Some(tg_bot_token) = &self.tg_bot_token {
            record.tg_bot_token = tg_bot_token.clone();
        }
    }
}

/// Persistence for bot records.
///
/// Mutating operations return `false` when the row does not exist (or, for
/// [`transition`](Self::transition), is not in an expected state).
#[async_trait]
pub trait BotStore: Send + Sync {
    /// Insert a new bot in state `created`.
    async fn create(&self, bot: NewBot) -> Result<BotRecord, StoreError>;

    /// Get a bot by internal id.
    async fn get_by_id(&self, id: i64) -> Result<Option<BotRecord>, StoreError>;

    /// Get a bot by external id.
    async fn get_by_external_id(&self, external_id: i64) -> Result<Option<BotRecord>, StoreError>;

    /// List the bots of one account.
    async fn list_by_account(&self, account_id: i64) -> Result<Vec<BotRecord>, StoreError>;

    /// List every bot.
    async fn list_all(&self) -> Result<Vec<BotRecord>, StoreError>;

    /// Update configuration fields.
    async fn update_fields(&self, id: i64, update: &BotFieldUpdate) -> Result<bool, StoreError>;

    /// Set the lifecycle state unconditionally.
    async fn set_state(&self, id: i64, state: BotState) -> Result<bool, StoreError>;

    /// Set the lifecycle state only if the current state is one of `from`.
    async fn transition(&self, id: i64, from: &[BotState], to: BotState)
    -> Result<bool, StoreError>;

    /// Remove a bot.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
}
