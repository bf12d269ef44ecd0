// Sensitive-word storage.

pub mod in_memory;
pub mod sqlite_store;

pub use in_memory::InMemoryWordStore;
pub use sqlite_store::SqliteWordStore;
