// The core module contains all business logic.
// Each feature gets its own submodule: models, a storage trait and a service.

#[path = "access/mod.rs"]
pub mod access;

#[path = "audit/mod.rs"]
pub mod audit;

#[path = "words/mod.rs"]
pub mod words;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "articles/mod.rs"]
pub mod articles;

#[path = "cleanup/mod.rs"]
pub mod cleanup;
