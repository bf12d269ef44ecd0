// Moderation settings storage.

pub mod in_memory;
pub mod sqlite_settings_store;

pub use in_memory::InMemorySettingsStore;
pub use sqlite_settings_store::SqliteSettingsStore;
