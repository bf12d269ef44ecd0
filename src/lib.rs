// Article moderation: sensitive-word dictionary, moderation policy engine,
// article lifecycle, stale-article cleanup and the audit trail.
//
// - `core/` = business logic (storage-agnostic)
// - `infra/` = implementations of core traits (SQLite, in-memory, DeepSeek)
// - `config` = environment configuration for the binary

#[path = "core/core_layer.rs"]
pub mod core;
#[path = "infra/infra_layer.rs"]
pub mod infra;

pub mod config;
