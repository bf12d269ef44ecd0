// Article storage.

pub mod in_memory;
pub mod sqlite_store;

pub use in_memory::InMemoryArticleStore;
pub use sqlite_store::SqliteArticleStore;
