// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for titorelli-fleet integration tests.
//!
//! Provides [`TestFleet`]: an in-memory store, a mock platform and the
//! controller registry, reconciler and service wired on top of them.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use titorelli_fleet::controller::{ControllerRegistry, ControllerSettings};
use titorelli_fleet::identity;
use titorelli_fleet::naming::ContainerNameGenerator;
use titorelli_fleet::platform::MockPlatform;
use titorelli_fleet::reconciler::{Reconciler, ReconcilerConfig};
use titorelli_fleet::service::{BotsService, CreateBotRequest};
use titorelli_fleet::store::{BotRecord, BotState, BotStore, MemoryBotStore};
use titorelli_fleet::workload::WorkloadEnv;

pub const PROJECT: &str = "proj";
pub const PREFIX: &str = "tbot";
pub const IMAGE: &str = "registry/bot:1";
pub const API_ORIGIN: &str = "https://api.example";

pub const DEBOUNCE: Duration = Duration::from_secs(3);
pub const LIVENESS: Duration = Duration::from_secs(30);

/// Fleet wired on in-memory collaborators.
pub struct TestFleet {
    pub store: Arc<MemoryBotStore>,
    pub platform: Arc<MockPlatform>,
    pub registry: Arc<ControllerRegistry>,
    pub reconciler: Arc<Reconciler>,
    pub service: BotsService,
    pub naming: ContainerNameGenerator,
}

impl TestFleet {
    /// Fleet with default reconciler settings.
    pub fn new() -> Self {
        Self::with_reconciler(ReconcilerConfig::default())
    }

    /// Fleet with custom reconciler settings.
    pub fn with_reconciler(config: ReconcilerConfig) -> Self {
        let store = Arc::new(MemoryBotStore::new());
        let platform = Arc::new(MockPlatform::new());
        let naming = ContainerNameGenerator::new(PREFIX, None);

        let registry = Arc::new(ControllerRegistry::new(
            platform.clone(),
            store.clone(),
            ControllerSettings {
                env: WorkloadEnv {
                    api_origin: API_ORIGIN.to_string(),
                    cas_origin: None,
                    telemetry_origin: None,
                },
                reload_debounce: DEBOUNCE,
                liveness_timeout: LIVENESS,
            },
        ));

        let reconciler = Arc::new(Reconciler::new(
            PROJECT,
            naming.clone(),
            platform.clone(),
            store.clone(),
            registry.clone(),
            config,
        ));

        let service = BotsService::new(
            store.clone(),
            registry.clone(),
            reconciler.clone(),
            naming.clone(),
            IMAGE,
        );

        Self {
            store,
            platform,
            registry,
            reconciler,
            service,
            naming,
        }
    }

    /// Create a bot through the service and return its record.
    pub async fn create_bot(&self, account_id: i64, external_id: i64) -> BotRecord {
        self.service
            .create(create_request(account_id, external_id))
            .await
            .expect("Failed to create bot");
        self.record(external_id).await
    }

    /// Current record of a bot.
    pub async fn record(&self, external_id: i64) -> BotRecord {
        self.store
            .get_by_external_id(external_id)
            .await
            .expect("Store failed")
            .expect("Bot not found")
    }

    /// Current state of a bot.
    pub async fn state(&self, external_id: i64) -> BotState {
        self.record(external_id).await.state
    }

    /// Force a bot's state.
    pub async fn set_state(&self, record: &BotRecord, state: BotState) {
        assert!(self.store.set_state(record.id, state).await.unwrap());
    }

    /// Put a workload for the bot on the platform, bypassing the call log.
    pub async fn insert_workload(&self, record: &BotRecord, replicas: u32) {
        self.platform
            .insert_workload(PROJECT, &record.dockhost_container, replicas)
            .await;
    }
}

/// Client identifier a bot's workload presents.
pub fn client_id(record: &BotRecord) -> String {
    identity::encode(record.id, record.account_id)
}

/// A create request with predictable credentials.
pub fn create_request(account_id: i64, external_id: i64) -> CreateBotRequest {
    CreateBotRequest {
        external_id,
        account_id,
        access_token: format!("access-{}", external_id),
        bypass_telemetry: false,
        model_id: 1,
        tg_bot_token: format!("tg-{}", external_id),
        scopes: "predict telemetry".to_string(),
        image: None,
    }
}

/// Let spawned tasks run and the paused clock move a little.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
