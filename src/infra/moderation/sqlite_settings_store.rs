use crate::core::moderation::{ModerationError, ModerationSettings, ModerationSettingsStore};
use crate::infra::sqlite_support::{load_option, migrate_options, save_option};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

const OPTION_NAME: &str = "moderation_settings";

/// Moderation settings kept as one document in the `options` table.
pub struct SqliteSettingsStore {
    pool: Pool<Sqlite>,
}

impl SqliteSettingsStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        migrate_options(&self.pool).await
    }
}

#[async_trait]
impl ModerationSettingsStore for SqliteSettingsStore {
    async fn load(&self) -> Result<Option<ModerationSettings>, ModerationError> {
        load_option(&self.pool, OPTION_NAME)
            .await
            .map_err(|e| ModerationError::StorageError(e.to_string()))
    }

    async fn save(&self, settings: &ModerationSettings) -> Result<(), ModerationError> {
        save_option(&self.pool, OPTION_NAME, settings)
            .await
            .map_err(|e| ModerationError::StorageError(e.to_string()))
    }
}
