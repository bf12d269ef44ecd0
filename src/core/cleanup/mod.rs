pub mod cleanup_models;
pub mod cleanup_service;

pub use cleanup_models::*;
pub use cleanup_service::{CleanupError, CleanupScheduler, CleanupStore, MirrorSync};
