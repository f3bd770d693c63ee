//! Coordinated writes across the graph and vector backends
//!
//! The two backends share no commit protocol, so a transaction is a
//! validated, ordered list of writes with compensating deletes on failure.

mod audit;
mod cancel;
mod coordinator;
mod error;
mod locks;
mod operation;
mod record;
mod report;


pub use audit::{AuditEvent, AuditEventKind, AuditLog, AUDIT_LOG_CAPACITY};
pub use cancel::CancellationToken;
pub use coordinator::{
    CoordinatorSettings, ExecuteOptions, HealthSnapshot, PurgeSummary, TransactionCoordinator,
};
pub use error::{CompensationFailure, TransactionError, TransactionResult};
pub use locks::{TargetGuard, TargetLocks};
pub use operation::{Backend, Operation, OperationAction, Payload};
pub use record::{OperationEntry, OperationStatus, TransactionRecord, TransactionState};
pub use report::{
    ConsistencyReport, JsonLinesReportSink, ReportSink, TracingReportSink, TransactionOutcome,
    REPORT_TARGET,
};
