//! Bounded in-memory audit log of transaction events

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Entries kept before the oldest are dropped.
pub const AUDIT_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventKind {
    Begin,
    Commit,
    Failed,
    Rollback,
    RollbackFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub kind: AuditEventKind,
    pub transaction_id: String,
    pub tenant_id: String,
    pub operation_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct AuditLog {
    capacity: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::with_capacity(AUDIT_LOG_CAPACITY)
    }
}

impl AuditLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::with_capacity(capacity.min(AUDIT_LOG_CAPACITY))),
        }
    }

    pub fn record(
        &self,
        kind: AuditEventKind,
        transaction_id: &str,
        tenant_id: &str,
        operation_count: usize,
        detail: Option<String>,
    ) {
        let event = AuditEvent {
            kind,
            transaction_id: transaction_id.to_string(),
            tenant_id: tenant_id.to_string(),
            operation_count,
            detail,
            at: Utc::now(),
        };
        // Bookkeeping only: a poisoned log is still usable.
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Most recent `limit` events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_newest_entries() {
        let log = AuditLog::with_capacity(3);
        for i in 0..5 {
            log.record(AuditEventKind::Begin, &format!("txn_{}", i), "acme", 1, None);
        }
        assert_eq!(log.len(), 3);
        let ids: Vec<String> = log.recent(10).into_iter().map(|e| e.transaction_id).collect();
        assert_eq!(ids, vec!["txn_2", "txn_3", "txn_4"]);
    }

    #[test]
    fn recent_limits_from_the_end() {
        let log = AuditLog::default();
        log.record(AuditEventKind::Begin, "txn_a", "acme", 2, None);
        log.record(AuditEventKind::Commit, "txn_a", "acme", 2, None);
        let last = log.recent(1);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].kind, AuditEventKind::Commit);
        assert!(log.recent(0).is_empty());
    }
}
