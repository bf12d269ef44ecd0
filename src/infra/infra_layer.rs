// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "sqlite_support.rs"]
pub mod sqlite_support;

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

#[path = "classifier/mod.rs"]
pub mod classifier;

#[path = "permissions/mod.rs"]
pub mod permissions;
