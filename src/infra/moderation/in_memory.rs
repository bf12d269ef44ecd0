use crate::core::moderation::{ModerationError, ModerationSettings, ModerationSettingsStore};
use async_trait::async_trait;
use tokio::sync::RwLock;

pub struct InMemorySettingsStore {
    settings: RwLock<Option<ModerationSettings>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(None),
        }
    }
}

impl Default for InMemorySettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModerationSettingsStore for InMemorySettingsStore {
    async fn load(&self) -> Result<Option<ModerationSettings>, ModerationError> {
        Ok(self.settings.read().await.clone())
    }

    async fn save(&self, settings: &ModerationSettings) -> Result<(), ModerationError> {
        *self.settings.write().await = Some(settings.clone());
        Ok(())
    }
}
