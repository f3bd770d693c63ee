//! Per-call transaction record and state machine

use super::operation::{Backend, Operation, OperationAction};
use crate::metadata::NodeKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error};

/// Lifecycle of one logical transaction.
///
/// ```text
/// OPEN → VALIDATING → WRITING → COMMITTED
///            ↓           ↓
///          FAILED     ROLLING_BACK → ROLLED_BACK | ROLLBACK_FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    Open,
    Validating,
    Writing,
    Committed,
    Failed,
    RollingBack,
    RolledBack,
    RollbackFailed,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Validating => "VALIDATING",
            Self::Writing => "WRITING",
            Self::Committed => "COMMITTED",
            Self::Failed => "FAILED",
            Self::RollingBack => "ROLLING_BACK",
            Self::RolledBack => "ROLLED_BACK",
            Self::RollbackFailed => "ROLLBACK_FAILED",
        }
    }

    pub fn can_transition_to(&self, next: TransactionState) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (Open, Validating)
                | (Open, Failed)
                | (Validating, Writing)
                | (Validating, Failed)
                | (Writing, Committed)
                | (Writing, RollingBack)
                | (RollingBack, RolledBack)
                | (RollingBack, RollbackFailed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Committed | Self::Failed | Self::RolledBack | Self::RollbackFailed
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one operation within a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    /// Written successfully.
    Done,
    /// The write was attempted and failed, timed out or was cancelled.
    Failed,
    /// Never attempted.
    Skipped,
    /// Written, then undone by a compensating delete.
    Compensated,
    /// Written, and every compensation attempt failed. An orphan.
    CompensationFailed,
}

/// Bookkeeping for one operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationEntry {
    /// 1-based position in the transaction.
    pub index: usize,
    pub backend: Backend,
    pub action: OperationAction,
    pub kind: NodeKind,
    pub target_id: String,
    pub payload_digest: String,
    pub status: OperationStatus,
    /// Every status the operation has been in, oldest first.
    pub history: Vec<OperationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// In-memory record of one coordinated write. Lives only for that call.
#[derive(Debug)]
pub struct TransactionRecord {
    id: String,
    tenant_id: String,
    state: TransactionState,
    states: Vec<TransactionState>,
    entries: Vec<OperationEntry>,
}

impl TransactionRecord {
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>, operations: &[Operation]) -> Self {
        let entries = operations
            .iter()
            .enumerate()
            .map(|(i, op)| OperationEntry {
                index: i + 1,
                backend: op.backend(),
                action: op.action(),
                kind: op.kind(),
                target_id: op.target_id().to_string(),
                payload_digest: op.payload_digest(),
                status: OperationStatus::Pending,
                history: vec![OperationStatus::Pending],
                error: None,
            })
            .collect();
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            state: TransactionState::Open,
            states: vec![TransactionState::Open],
            entries,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn states(&self) -> &[TransactionState] {
        &self.states
    }

    pub fn entries(&self) -> &[OperationEntry] {
        &self.entries
    }

    /// Move to `next`. Illegal transitions are a coordinator bug; they are
    /// logged and ignored so the record never claims an impossible path.
    pub fn advance(&mut self, next: TransactionState) -> bool {
        if !self.state.can_transition_to(next) {
            error!(
                transaction_id = %self.id,
                from = %self.state,
                to = %next,
                "illegal transaction state transition"
            );
            return false;
        }
        debug!(transaction_id = %self.id, from = %self.state, to = %next, "transaction state");
        self.state = next;
        self.states.push(next);
        true
    }

    /// Set the status of the operation at 0-based `position`.
    pub fn set_status(&mut self, position: usize, status: OperationStatus, error: Option<String>) {
        if let Some(entry) = self.entries.get_mut(position) {
            entry.status = status;
            entry.history.push(status);
            if error.is_some() {
                entry.error = error;
            }
        }
    }

    /// Mark every still-pending operation as skipped.
    pub fn skip_pending(&mut self) {
        for position in 0..self.entries.len() {
            if self.entries[position].status == OperationStatus::Pending {
                self.set_status(position, OperationStatus::Skipped, None);
            }
        }
    }

    /// 0-based positions of operations that were written, in write order.
    pub fn completed(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status == OperationStatus::Done)
            .map(|(i, _)| i)
            .collect()
    }

    /// Targets left behind by failed compensation.
    pub fn orphans(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.status == OperationStatus::CompensationFailed)
            .map(|e| e.target_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionState::*;

    #[test]
    fn success_path_is_legal() {
        let mut path = vec![Open, Validating, Writing, Committed];
        let mut state = path.remove(0);
        for next in path {
            assert!(state.can_transition_to(next), "{} -> {}", state, next);
            state = next;
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn rollback_paths_are_legal() {
        assert!(Writing.can_transition_to(RollingBack));
        assert!(RollingBack.can_transition_to(RolledBack));
        assert!(RollingBack.can_transition_to(RollbackFailed));
        assert!(Validating.can_transition_to(Failed));
    }

    #[test]
    fn shortcuts_are_illegal() {
        assert!(!Validating.can_transition_to(Committed));
        assert!(!Validating.can_transition_to(RollingBack));
        assert!(!Writing.can_transition_to(Failed));
        assert!(!Committed.can_transition_to(RollingBack));
        assert!(!RolledBack.can_transition_to(Writing));
    }

    #[test]
    fn terminal_states() {
        for s in [Committed, Failed, RolledBack, RollbackFailed] {
            assert!(s.is_terminal());
        }
        for s in [Open, Validating, Writing, RollingBack] {
            assert!(!s.is_terminal());
        }
    }

    #[test]
    fn state_names_match_serde() {
        for s in [Open, Validating, Writing, Committed, Failed, RollingBack, RolledBack, RollbackFailed] {
            assert_eq!(serde_json::to_value(s).unwrap(), s.as_str());
        }
    }
}
