// Cleanup run history, settings, the advisory lock and mirror removal.

pub mod in_memory;
pub mod mirror;
pub mod sqlite_store;

pub use in_memory::InMemoryCleanupStore;
pub use mirror::NoopMirrorSync;
pub use sqlite_store::SqliteCleanupStore;
