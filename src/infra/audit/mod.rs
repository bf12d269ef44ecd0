// Audit log storage.

pub mod in_memory;
pub mod sqlite_store;

pub use in_memory::InMemoryAuditStore;
pub use sqlite_store::SqliteAuditStore;
