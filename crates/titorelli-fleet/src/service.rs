// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bot management service.
//!
//! The surface the management API calls into: tenant CRUD, lifecycle state
//! requests, liveness reports and identity assertions from running workloads.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::controller::{BotController, CommandOutcome, ControllerRegistry};
use crate::error::{Error, Result};
use crate::identity;
use crate::naming::ContainerNameGenerator;
use crate::reconciler::{BotVerdict, Reconciler};
use crate::store::{BotFieldUpdate, BotRecord, BotState, BotStore, BotView, NewBot};

/// Request to create a bot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBotRequest {
    /// Tenant-facing bot id.
    pub external_id: i64,
    /// Owning account.
    pub account_id: i64,
    /// Workload callback credential.
    pub access_token: String,
    /// Skip telemetry collection.
    #[serde(default)]
    pub bypass_telemetry: bool,
    /// Assigned model.
    pub model_id: i64,
    /// Messaging-platform bot token.
    pub tg_bot_token: String,
    /// Space-separated scopes.
    #[serde(default)]
    pub scopes: String,
    /// Container image; the fleet default when absent.
    #[serde(default)]
    pub image: Option<String>,
}

/// Partial update of a bot, optionally with a lifecycle state request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBotRequest {
    /// New access token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// New telemetry bypass flag.
    #[serde(default)]
    pub bypass_telemetry: Option<bool>,
    /// New model id.
    #[serde(default)]
    pub model_id: Option<i64>,
    /// New messaging-platform bot token.
    #[serde(default)]
    pub tg_bot_token: Option<String>,
    /// Requested state: `starting`, `stopping` or `deleted`.
    #[serde(default)]
    pub state: Option<String>,
}

impl UpdateBotRequest {
    fn fields(&self) -> BotFieldUpdate {
        BotFieldUpdate {
            access_token: self.access_token.clone(),
            bypass_telemetry: self.bypass_telemetry,
            model_id: self.model_id,
            tg_bot_token: self.tg_bot_token.clone(),
        }
    }

    fn requested_state(&self) -> Result<Option<BotState>> {
        let Some(state) = &self.state else {
            return Ok(None);
        };
        match state.parse::<BotState>() {
            Ok(state @ (BotState::Starting | BotState::Stopping | BotState::Deleted)) => {
                Ok(Some(state))
            }
            _ => Err(Error::InvalidRequest(format!(
                "Cannot request state '{}'",
                state
            ))),
        }
    }
}

/// Answer to an identity assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityAssertion {
    /// Unknown identity, wrong secret or malformed identifier.
    Denied,
    /// Identity confirmed; the requested scopes the bot actually holds.
    Granted(Vec<String>),
}

impl IdentityAssertion {
    /// Whether the identity was confirmed.
    pub fn is_granted(&self) -> bool {
        matches!(self, IdentityAssertion::Granted(_))
    }

    /// Granted scopes; empty when denied.
    pub fn scopes(&self) -> &[String] {
        match self {
            IdentityAssertion::Granted(scopes) => scopes,
            IdentityAssertion::Denied => &[],
        }
    }
}

/// Bot management service.
pub struct BotsService {
    store: Arc<dyn BotStore>,
    registry: Arc<ControllerRegistry>,
    reconciler: Arc<Reconciler>,
    naming: ContainerNameGenerator,
    project: String,
    default_image: String,
}

impl BotsService {
    /// Create a new service.
    pub fn new(
        store: Arc<dyn BotStore>,
        registry: Arc<ControllerRegistry>,
        reconciler: Arc<Reconciler>,
        naming: ContainerNameGenerator,
        default_image: impl Into<String>,
    ) -> Self {
        let project = reconciler.project().to_string();
        Self {
            store,
            registry,
            reconciler,
            naming,
            project,
            default_image: default_image.into(),
        }
    }

    async fn find(&self, external_id: i64) -> Result<BotRecord> {
        self.store
            .get_by_external_id(external_id)
            .await?
            .ok_or(Error::BotNotFound(external_id))
    }

    async fn controller(&self, external_id: i64) -> Result<Arc<BotController>> {
        let record = self.find(external_id).await?;
        Ok(self.registry.controller_for(&record))
    }

    /// Insert a new bot in state `created`. No workload is created yet.
    pub async fn create(&self, request: CreateBotRequest) -> Result<BotView> {
        let container = self
            .naming
            .generate(request.account_id, request.external_id);

        let record = self
            .store
            .create(NewBot {
                external_id: request.external_id,
                account_id: request.account_id,
                access_token: request.access_token,
                bypass_telemetry: request.bypass_telemetry,
                model_id: request.model_id,
                tg_bot_token: request.tg_bot_token,
                scopes: request.scopes,
                dockhost_image: request.image.unwrap_or_else(|| self.default_image.clone()),
                dockhost_container: container,
                dockhost_project: self.project.clone(),
            })
            .await?;

        info!(
            bot_id = record.id,
            external_id = record.external_id,
            account_id = record.account_id,
            container = %record.dockhost_container,
            "Bot created"
        );

        Ok(record.view())
    }

    /// Get a bot by external id, or `None` if there is no such bot.
    pub async fn get(&self, external_id: i64) -> Result<Option<BotView>> {
        let record = self.store.get_by_external_id(external_id).await?;
        Ok(record.as_ref().map(BotRecord::view))
    }

    /// List an account's bots.
    pub async fn list(&self, account_id: i64) -> Result<Vec<BotView>> {
        let records = self.store.list_by_account(account_id).await?;
        Ok(records.iter().map(BotRecord::view).collect())
    }

    /// Update configuration fields and/or request a lifecycle state.
    ///
    /// Field changes are persisted and trigger a debounced hard reload. A
    /// state request is applied afterwards: `starting` starts, `stopping`
    /// stops, `deleted` deletes (and `None` is returned).
    pub async fn update(
        &self,
        external_id: i64,
        request: UpdateBotRequest,
    ) -> Result<Option<BotView>> {
        let requested = request.requested_state()?;
        let controller = self.controller(external_id).await?;

        controller.update(&request.fields()).await?;

        match requested {
            Some(BotState::Starting) => {
                controller.start().await?;
            }
            Some(BotState::Stopping) => {
                controller.stop().await?;
            }
            Some(BotState::Deleted) => {
                self.delete_with(&controller).await?;
                return Ok(None);
            }
            _ => {}
        }

        Ok(Some(self.find(external_id).await?.view()))
    }

    /// Start a bot.
    pub async fn start(&self, external_id: i64) -> Result<CommandOutcome> {
        self.controller(external_id).await?.start().await
    }

    /// Stop a bot.
    pub async fn stop(&self, external_id: i64) -> Result<CommandOutcome> {
        self.controller(external_id).await?.stop().await
    }

    /// Restart a bot.
    pub async fn restart(&self, external_id: i64) -> Result<CommandOutcome> {
        self.controller(external_id).await?.restart().await
    }

    /// Delete a bot and destroy its workload.
    pub async fn remove(&self, external_id: i64) -> Result<()> {
        let controller = self.controller(external_id).await?;
        self.delete_with(&controller).await
    }

    async fn delete_with(&self, controller: &Arc<BotController>) -> Result<()> {
        let result = controller.delete().await;
        self.registry.evict(controller.bot_id());
        result
    }

    /// Reconcile one bot immediately instead of waiting for the next tick.
    pub async fn converge(&self, external_id: i64) -> Result<BotVerdict> {
        let record = self.find(external_id).await?;
        self.reconciler.converge(&record).await
    }

    /// Liveness heartbeat from a workload. Returns whether it was accepted.
    ///
    /// Malformed identifiers, unknown bots and account mismatches are logged
    /// and ignored.
    pub async fn report_alive(&self, client_id: &str) -> Result<bool> {
        let identity = match identity::decode(client_id) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Ignoring heartbeat with malformed client identifier");
                return Ok(false);
            }
        };

        let Some(record) = self.store.get_by_id(identity.bot_id).await? else {
            warn!(bot_id = identity.bot_id, "Ignoring heartbeat from unknown bot");
            return Ok(false);
        };
        if record.account_id != identity.account_id {
            warn!(
                bot_id = identity.bot_id,
                account_id = identity.account_id,
                "Ignoring heartbeat with mismatched account"
            );
            return Ok(false);
        }

        debug!(bot_id = record.id, "Heartbeat");
        self.registry.controller_for(&record).report_alive().await
    }

    /// Check a workload's credentials and narrow the requested scopes to the
    /// ones the bot holds.
    pub async fn assert_identity(
        &self,
        client_id: &str,
        secret: &str,
        requested_scopes: &[&str],
    ) -> Result<IdentityAssertion> {
        let Ok(identity) = identity::decode(client_id) else {
            return Ok(IdentityAssertion::Denied);
        };

        let Some(record) = self.store.get_by_id(identity.bot_id).await? else {
            return Ok(IdentityAssertion::Denied);
        };
        if record.account_id != identity.account_id
            || record.state.is_terminal()
            || record.access_token != secret
        {
            return Ok(IdentityAssertion::Denied);
        }

        let held = record.scope_list();
        let mut granted: Vec<String> = Vec::new();
        for scope in requested_scopes {
            if held.contains(scope) && !granted.iter().any(|g| g == scope) {
                granted.push(scope.to_string());
            }
        }

        Ok(IdentityAssertion::Granted(granted))
    }
}
