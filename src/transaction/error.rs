//! Transaction error types

use super::operation::Backend;
use super::report::ConsistencyReport;
use crate::metadata::ValidationError;
use crate::storage::BackendError;
use crate::tenant::TenantError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Why a coordinated write did not commit.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("{backend} write of '{target_id}' failed: {source}")]
    Write {
        backend: Backend,
        target_id: String,
        #[source]
        source: BackendError,
    },

    #[error("transaction timed out after {0:?}")]
    TimedOut(Duration),

    #[error("transaction cancelled")]
    Cancelled,

    #[error("could not lock targets within {0:?}")]
    LockTimeout(Duration),

    /// Failures of non-transactional calls (search, purge).
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl TransactionError {
    /// Validation errors carried by this failure, if any.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}

/// A completed write whose compensating delete failed every attempt.
#[derive(Debug, Clone, Serialize)]
pub struct CompensationFailure {
    /// 1-based operation index.
    pub index: usize,
    pub backend: Backend,
    pub target_id: String,
    pub attempts: u32,
    pub error: String,
}

/// Everything a coordinator call produced.
#[derive(Debug)]
pub struct TransactionResult {
    pub report: ConsistencyReport,
    pub failure: Option<TransactionError>,
    pub compensation_failures: Vec<CompensationFailure>,
}

impl TransactionResult {
    pub fn is_committed(&self) -> bool {
        self.report.is_committed()
    }

    pub fn transaction_id(&self) -> &str {
        &self.report.transaction_id
    }

    /// Turn a non-committed result into its failure.
    pub fn into_result(self) -> Result<ConsistencyReport, TransactionError> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self.report),
        }
    }
}
