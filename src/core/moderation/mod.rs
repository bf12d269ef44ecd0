// Core moderation module - level policies and the two-stage moderation engine.

pub mod moderation_models;
pub mod moderation_service;

pub use moderation_models::*;
pub use moderation_service::*;
