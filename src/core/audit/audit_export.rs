// Streaming writers for audit exports. Rows are written as they are fetched
// so an export never holds the whole trail in memory.

use super::audit_models::{AuditLogEntry, ExportFormat};
use super::audit_service::AuditError;
use std::io::Write;

/// Rows fetched from the store per round trip during an export.
pub(crate) const EXPORT_PAGE_SIZE: u32 = 500;

const CSV_HEADER: [&str; 10] = [
    "id",
    "user_id",
    "action",
    "resource_type",
    "resource_id",
    "old_values",
    "new_values",
    "ip_address",
    "user_agent",
    "created_at",
];

pub(crate) enum ExportSink<W: Write> {
    Csv(csv::Writer<W>),
    Json { out: W, first: bool },
}

impl<W: Write> ExportSink<W> {
    pub(crate) fn begin(format: ExportFormat, out: W) -> Result<Self, AuditError> {
        match format {
            ExportFormat::Csv => {
                let mut writer = csv::Writer::from_writer(out);
                writer.write_record(CSV_HEADER).map_err(export_err)?;
                Ok(ExportSink::Csv(writer))
            }
            ExportFormat::Json => {
                let mut out = out;
                out.write_all(b"[").map_err(export_err)?;
                Ok(ExportSink::Json { out, first: true })
            }
        }
    }

    pub(crate) fn write_entry(&mut self, entry: &AuditLogEntry) -> Result<(), AuditError> {
        match self {
            ExportSink::Csv(writer) => {
                let record = [
                    entry.id.to_string(),
                    opt(entry.user_id),
                    entry.action.clone(),
                    entry.resource_type.clone().unwrap_or_default(),
                    opt(entry.resource_id),
                    entry
                        .old_values
                        .as_ref()
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                    entry
                        .new_values
                        .as_ref()
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                    entry.ip_address.clone().unwrap_or_default(),
                    entry.user_agent.clone().unwrap_or_default(),
                    entry.created_at.to_rfc3339(),
                ];
                writer.write_record(&record).map_err(export_err)
            }
            ExportSink::Json { out, first } => {
                if !*first {
                    out.write_all(b",").map_err(export_err)?;
                }
                *first = false;
                serde_json::to_writer(&mut *out, entry).map_err(export_err)
            }
        }
    }

    pub(crate) fn finish(self) -> Result<(), AuditError> {
        match self {
            ExportSink::Csv(mut writer) => writer.flush().map_err(export_err),
            ExportSink::Json { mut out, .. } => {
                out.write_all(b"]").map_err(export_err)?;
                out.flush().map_err(export_err)
            }
        }
    }
}

fn opt(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn export_err(e: impl std::fmt::Display) -> AuditError {
    AuditError::ExportError(e.to_string())
}
