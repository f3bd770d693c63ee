//! Consistency reports and where they go

use super::record::{OperationEntry, TransactionRecord, TransactionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Log target every report is emitted under.
pub const REPORT_TARGET: &str = "tenantgraph::report";

/// Terminal status of a coordinator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionOutcome {
    Committed,
    /// Rejected before any backend write.
    Failed,
    /// A write failed and every completed write was undone.
    RolledBack,
    /// A write failed and at least one completed write could not be undone.
    RollbackFailed,
}

impl TransactionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed => "COMMITTED",
            Self::Failed => "FAILED",
            Self::RolledBack => "ROLLED_BACK",
            Self::RollbackFailed => "ROLLBACK_FAILED",
        }
    }

    /// The outcome a terminal state maps to; `None` for non-terminal states.
    pub fn from_state(state: TransactionState) -> Option<Self> {
        match state {
            TransactionState::Committed => Some(Self::Committed),
            TransactionState::Failed => Some(Self::Failed),
            TransactionState::RolledBack => Some(Self::RolledBack),
            TransactionState::RollbackFailed => Some(Self::RollbackFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What operators and CI see for one transaction.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    pub transaction_id: String,
    pub tenant_id: String,
    pub outcome: TransactionOutcome,
    pub operations: Vec<OperationEntry>,
    pub rollback_failed: bool,
    /// Targets written but not undone; need manual reconciliation.
    pub orphans: Vec<String>,
    pub states: Vec<TransactionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ConsistencyReport {
    pub(crate) fn from_record(
        record: &TransactionRecord,
        error: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        // A non-terminal record here is a coordinator bug; never report it as success.
        let outcome = TransactionOutcome::from_state(record.state()).unwrap_or_else(|| {
            error!(
                transaction_id = record.id(),
                state = %record.state(),
                "report built from non-terminal transaction"
            );
            TransactionOutcome::Failed
        });
        let orphans = record.orphans();
        let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        Self {
            transaction_id: record.id().to_string(),
            tenant_id: record.tenant_id().to_string(),
            outcome,
            operations: record.entries().to_vec(),
            rollback_failed: outcome == TransactionOutcome::RollbackFailed,
            orphans,
            states: record.states().to_vec(),
            error,
            started_at,
            duration_ms,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.outcome == TransactionOutcome::Committed
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }
}

/// Receives every finished report.
pub trait ReportSink: Send + Sync {
    fn emit(&self, report: &ConsistencyReport);
}

/// Emits reports as structured `tracing` events under [`REPORT_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReportSink;

impl ReportSink for TracingReportSink {
    fn emit(&self, report: &ConsistencyReport) {
        let json = report.to_json();
        match report.outcome {
            TransactionOutcome::Committed | TransactionOutcome::Failed => info!(
                target: REPORT_TARGET,
                transaction_id = %report.transaction_id,
                tenant_id = %report.tenant_id,
                outcome = %report.outcome,
                report = %json,
                "consistency report"
            ),
            TransactionOutcome::RolledBack => warn!(
                target: REPORT_TARGET,
                transaction_id = %report.transaction_id,
                tenant_id = %report.tenant_id,
                outcome = %report.outcome,
                report = %json,
                "consistency report"
            ),
            TransactionOutcome::RollbackFailed => error!(
                target: REPORT_TARGET,
                transaction_id = %report.transaction_id,
                tenant_id = %report.tenant_id,
                outcome = %report.outcome,
                orphans = ?report.orphans,
                report = %json,
                "consistency report"
            ),
        }
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesReportSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesReportSink {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for JsonLinesReportSink {
    fn emit(&self, report: &ConsistencyReport) {
        let line = report.to_json();
        let result = match self.file.lock() {
            Ok(mut file) => writeln!(file, "{}", line).and_then(|_| file.flush()),
            Err(_) => Err(std::io::Error::new(std::io::ErrorKind::Other, "report file lock poisoned")),
        };
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "failed to append consistency report");
        }
    }
}
