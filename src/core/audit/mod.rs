pub mod audit_export;
pub mod audit_models;
pub mod audit_service;

pub use audit_models::{
    AuditAction, AuditEvent, AuditFilter, AuditLogEntry, AuditPage, ExportFormat, ExportSummary,
    NewAuditEntry, ResourceType, UserChange, WordChange, MAX_RETENTION_DAYS,
};
pub use audit_service::{AuditError, AuditLogger, AuditStore};
