// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed bot store.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::{BotFieldUpdate, BotRecord, BotState, BotStore, NewBot, StoreError};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

const SELECT_BOT: &str = r#"
    SELECT id, external_id, account_id, access_token, bypass_telemetry, model_id,
           tg_bot_token, dockhost_image, dockhost_container, dockhost_project,
           state, scopes, created_at, updated_at, state_changed_at
    FROM bot
"#;

/// SQLite-backed bot store.
#[derive(Clone)]
pub struct SqliteBotStore {
    pool: SqlitePool,
}

impl SqliteBotStore {
    /// Create a store from an existing, already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a database URL and run migrations.
    ///
    /// The database file and its parent directories are created as needed.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        if let Some(parent) = options.get_filename().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// Open (creating if needed) a database file and run migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::connect(&format!("sqlite:{}", path.as_ref().to_string_lossy())).await
    }

    /// Private in-memory database, used by tests and dry runs.
    ///
    /// Holds exactly one connection that is never recycled, since every new
    /// connection to `sqlite::memory:` opens a fresh empty database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_one_where(
        &self,
        column: &str,
        value: i64,
    ) -> Result<Option<BotRecord>, StoreError> {
        let record = sqlx::query_as::<_, BotRecord>(&format!("{SELECT_BOT} WHERE {column} = ?"))
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }
}

fn map_insert_error(err: sqlx::Error, bot: &NewBot) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(format!(
            "external id {} or container {}/{}",
            bot.external_id, bot.dockhost_project, bot.dockhost_container
        )),
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl BotStore for SqliteBotStore {
    async fn create(&self, bot: NewBot) -> Result<BotRecord, StoreError> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO bot (
                external_id, account_id, access_token, bypass_telemetry, model_id,
                tg_bot_token, dockhost_image, dockhost_container, dockhost_project,
                state, scopes, created_at, updated_at, state_changed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(bot.external_id)
        .bind(bot.account_id)
        .bind(&bot.access_token)
        .bind(bot.bypass_telemetry)
        .bind(bot.model_id)
        .bind(&bot.tg_bot_token)
        .bind(&bot.dockhost_image)
        .bind(&bot.dockhost_container)
        .bind(&bot.dockhost_project)
        .bind(BotState::Created.as_str())
        .bind(&bot.scopes)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &bot))?;

        let id = result.last_insert_rowid();
        self.fetch_one_where("id", id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<BotRecord>, StoreError> {
        self.fetch_one_where("id", id).await
    }

    async fn get_by_external_id(&self, external_id: i64) -> Result<Option<BotRecord>, StoreError> {
        self.fetch_one_where("external_id", external_id).await
    }

    async fn list_by_account(&self, account_id: i64) -> Result<Vec<BotRecord>, StoreError> {
        let records =
            sqlx::query_as::<_, BotRecord>(&format!("{SELECT_BOT} WHERE account_id = ? ORDER BY id"))
                .bind(account_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(records)
    }

    async fn list_all(&self) -> Result<Vec<BotRecord>, StoreError> {
        let records = sqlx::query_as::<_, BotRecord>(&format!("{SELECT_BOT} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn update_fields(&self, id: i64, update: &BotFieldUpdate) -> Result<bool, StoreError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE bot SET updated_at = ");
        query.push_bind(Utc::now());

        if let Some(access_token) = &update.access_token {
            query.push(", access_token = ").push_bind(access_token.clone());
        }
        if let Some(bypass_telemetry) = update.bypass_telemetry {
            query.push(", bypass_telemetry = ").push_bind(bypass_telemetry);
        }
        if let Some(model_id) = update.model_id {
            query.push(", model_id = ").push_bind(model_id);
        }
        if let Some(tg_bot_token) = &update.tg_bot_token {
            query.push(", tg_bot_token = ").push_bind(tg_bot_token.clone());
        }

        query.push(" WHERE id = ").push_bind(id);

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_state(&self, id: i64, state: BotState) -> Result<bool, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE bot SET state = ?, updated_at = ?, state_changed_at = ? WHERE id = ?",
        )
        .bind(state.as_str())
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn transition(
        &self,
        id: i64,
        from: &[BotState],
        to: BotState,
    ) -> Result<bool, StoreError> {
        if from.is_empty() {
            return Ok(false);
        }

        let now = Utc::now();
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE bot SET state = ");
        query
            .push_bind(to.as_str())
            .push(", updated_at = ")
            .push_bind(now)
            .push(", state_changed_at = ")
            .push_bind(now)
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND state IN (");

        let mut states = query.separated(", ");
        for state in from {
            states.push_bind(state.as_str());
        }
        states.push_unseparated(")");

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM bot WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_bot(external_id: i64, account_id: i64) -> NewBot {
        NewBot {
            external_id,
            account_id,
            access_token: format!("access-{}", external_id),
            bypass_telemetry: false,
            model_id: 7,
            tg_bot_token: format!("tg-{}", external_id),
            scopes: "predict".to_string(),
            dockhost_image: "registry/bot:1".to_string(),
            dockhost_container: format!("tbot-{}-{}", account_id, external_id),
            dockhost_project: "proj".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = SqliteBotStore::in_memory().await.unwrap();

        let created = store.create(new_bot(100, 1)).await.unwrap();
        assert_eq!(created.state, BotState::Created);
        assert_eq!(created.external_id, 100);
        assert_eq!(created.dockhost_container, "tbot-1-100");

        let by_id = store.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id, created);

        let by_external = store.get_by_external_id(100).await.unwrap().unwrap();
        assert_eq!(by_external.id, created.id);

        assert!(store.get_by_external_id(101).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_external_id_conflicts() {
        let store = SqliteBotStore::in_memory().await.unwrap();
        store.create(new_bot(100, 1)).await.unwrap();

        let err = store.create(new_bot(100, 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_by_account() {
        let store = SqliteBotStore::in_memory().await.unwrap();
        store.create(new_bot(1, 10)).await.unwrap();
        store.create(new_bot(2, 10)).await.unwrap();
        store.create(new_bot(3, 20)).await.unwrap();

        let account_bots = store.list_by_account(10).await.unwrap();
        assert_eq!(
            account_bots.iter().map(|b| b.external_id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(store.list_all().await.unwrap().len(), 3);
        assert!(store.list_by_account(30).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_fields() {
        let store = SqliteBotStore::in_memory().await.unwrap();
        let bot = store.create(new_bot(1, 10)).await.unwrap();

        let update = BotFieldUpdate {
            model_id: Some(42),
            tg_bot_token: Some("new-token".to_string()),
            ..Default::default()
        };
        assert!(store.update_fields(bot.id, &update).await.unwrap());

        let updated = store.get_by_id(bot.id).await.unwrap().unwrap();
        assert_eq!(updated.model_id, 42);
        assert_eq!(updated.tg_bot_token, "new-token");
        assert_eq!(updated.access_token, bot.access_token);
        assert!(updated.updated_at >= bot.updated_at);
        assert_eq!(updated.state_changed_at, bot.state_changed_at);

        assert!(!store.update_fields(9999, &update).await.unwrap());
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let store = SqliteBotStore::in_memory().await.unwrap();
        let bot = store.create(new_bot(1, 10)).await.unwrap();

        assert!(store.set_state(bot.id, BotState::Starting).await.unwrap());

        // wrong expected state
        assert!(
            !store
                .transition(bot.id, &[BotState::Stopping], BotState::Stopped)
                .await
                .unwrap()
        );
        assert!(
            store
                .transition(
                    bot.id,
                    &[BotState::Running, BotState::Starting],
                    BotState::Failed
                )
                .await
                .unwrap()
        );
        assert!(!store.transition(bot.id, &[], BotState::Running).await.unwrap());

        let current = store.get_by_id(bot.id).await.unwrap().unwrap();
        assert_eq!(current.state, BotState::Failed);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SqliteBotStore::in_memory().await.unwrap();
        let bot = store.create(new_bot(1, 10)).await.unwrap();

        assert!(store.delete(bot.id).await.unwrap());
        assert!(!store.delete(bot.id).await.unwrap());
        assert!(store.get_by_id(bot.id).await.unwrap().is_none());
        assert!(!store.set_state(bot.id, BotState::Running).await.unwrap());
    }
}
