// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory bot store.
//!
//! Same semantics as [`SqliteBotStore`](super::SqliteBotStore) without a
//! database thread, so it can be driven by tokio's paused test clock.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{BotFieldUpdate, BotRecord, BotState, BotStore, NewBot, StoreError};

#[derive(Default)]
struct Inner {
    next_id: i64,
    bots: BTreeMap<i64, BotRecord>,
}

/// In-memory bot store.
#[derive(Clone, Default)]
pub struct MemoryBotStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BotStore for MemoryBotStore {
    async fn create(&self, bot: NewBot) -> Result<BotRecord, StoreError> {
        let mut inner = self.inner.lock().await;

        let conflict = inner.bots.values().any(|b| {
            b.external_id == bot.external_id
                || (b.dockhost_project == bot.dockhost_project
                    && b.dockhost_container == bot.dockhost_container)
        });
        if conflict {
            return Err(StoreError::Conflict(format!(
                "external id {} or container {}/{}",
                bot.external_id, bot.dockhost_project, bot.dockhost_container
            )));
        }

        inner.next_id += 1;
        let now = Utc::now();
        let record = BotRecord {
            id: inner.next_id,
            external_id: bot.external_id,
            account_id: bot.account_id,
            access_token: bot.access_token,
            bypass_telemetry: bot.bypass_telemetry,
            model_id: bot.model_id,
            tg_bot_token: bot.tg_bot_token,
            dockhost_image: bot.dockhost_image,
            dockhost_container: bot.dockhost_container,
            dockhost_project: bot.dockhost_project,
            state: BotState::Created,
            scopes: bot.scopes,
            created_at: now,
            updated_at: now,
            state_changed_at: now,
        };
        inner.bots.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<BotRecord>, StoreError> {
        Ok(self.inner.lock().await.bots.get(&id).cloned())
    }

    async fn get_by_external_id(&self, external_id: i64) -> Result<Option<BotRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .bots
            .values()
            .find(|b| b.external_id == external_id)
            .cloned())
    }

    async fn list_by_account(&self, account_id: i64) -> Result<Vec<BotRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .bots
            .values()
            .filter(|b| b.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<BotRecord>, StoreError> {
        Ok(self.inner.lock().await.bots.values().cloned().collect())
    }

    async fn update_fields(&self, id: i64, update: &BotFieldUpdate) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.bots.get_mut(&id) {
            Some(record) => {
                update.apply_to(record);
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_state(&self, id: i64, state: BotState) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.bots.get_mut(&id) {
            Some(record) => {
                let now = Utc::now();
                record.state = state;
                record.updated_at = now;
                record.state_changed_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn transition(
        &self,
        id: i64,
        from: &[BotState],
        to: BotState,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.bots.get_mut(&id) {
            Some(record) if from.contains(&record.state) => {
                let now = Utc::now();
                record.state = to;
                record.updated_at = now;
                record.state_changed_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.bots.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_bot(external_id: i64) -> NewBot {
        NewBot {
            external_id,
            account_id: 1,
            access_token: "access".to_string(),
            bypass_telemetry: false,
            model_id: 1,
            tg_bot_token: "tg".to_string(),
            scopes: String::new(),
            dockhost_image: "img".to_string(),
            dockhost_container: format!("tbot-1-{}", external_id),
            dockhost_project: "proj".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ids_are_assigned_sequentially() {
        let store = MemoryBotStore::new();
        let a = store.create(new_bot(5)).await.unwrap();
        let b = store.create(new_bot(6)).await.unwrap();

        assert_eq!(a.id + 1, b.id);
        assert_eq!(store.list_by_account(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_container_conflict() {
        let store = MemoryBotStore::new();
        store.create(new_bot(5)).await.unwrap();

        let mut clash = new_bot(6);
        clash.dockhost_container = "tbot-1-5".to_string();
        assert!(matches!(
            store.create(clash).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_transition_requires_expected_state() {
        let store = MemoryBotStore::new();
        let bot = store.create(new_bot(5)).await.unwrap();

        assert!(
            !store
                .transition(bot.id, &[BotState::Running], BotState::Failed)
                .await
                .unwrap()
        );
        assert!(
            store
                .transition(bot.id, &[BotState::Created], BotState::Starting)
                .await
                .unwrap()
        );
        assert!(!store.transition(999, &BotState::ALL, BotState::Deleted).await.unwrap());
        assert_eq!(
            store.get_by_id(bot.id).await.unwrap().unwrap().state,
            BotState::Starting
        );
    }

    #[tokio::test]
    async fn test_field_update_keeps_state_timestamp() {
        let store = MemoryBotStore::new();
        let bot = store.create(new_bot(5)).await.unwrap();
        store.set_state(bot.id, BotState::Starting).await.unwrap();
        let started = store.get_by_id(bot.id).await.unwrap().unwrap();

        let update = BotFieldUpdate {
            model_id: Some(2),
            ..Default::default()
        };
        assert!(store.update_fields(bot.id, &update).await.unwrap());

        let updated = store.get_by_id(bot.id).await.unwrap().unwrap();
        assert_eq!(updated.state_changed_at, started.state_changed_at);
        assert!(updated.updated_at >= started.updated_at);
    }
}
