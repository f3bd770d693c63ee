//! Per-target write locks
//!
//! Two transactions that touch the same `(tenant, target_id)` are serialized
//! for their whole duration, rollback included. Locks are taken in sorted
//! order so overlapping transactions cannot deadlock. Idle lock entries are
//! dropped from the table when the last holder releases them.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockKey = (String, String);
type LockTable = DashMap<LockKey, Arc<Mutex<()>>>;

#[derive(Debug, Default)]
pub struct TargetLocks {
    table: Arc<LockTable>,
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every target for `tenant_id`. Waits for current holders.
    pub async fn acquire<I, S>(&self, tenant_id: &str, targets: I) -> TargetGuard
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: BTreeSet<LockKey> = targets
            .into_iter()
            .map(|t| (tenant_id.to_string(), t.into()))
            .collect();

        // Built up as locks are taken so a dropped acquire still cleans up.
        let mut held = TargetGuard {
            table: self.table.clone(),
            keys: Vec::with_capacity(keys.len()),
            guards: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            let lock = self
                .table
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            let guard = lock.lock_owned().await;
            held.keys.push(key);
            held.guards.push(guard);
        }
        held
    }

    /// Number of targets with a live lock entry.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Held target locks; released on drop.
#[derive(Debug)]
pub struct TargetGuard {
    table: Arc<LockTable>,
    keys: Vec<LockKey>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        self.guards.clear();
        for key in &self.keys {
            // Only the table's own Arc left means nobody holds or waits on it.
            self.table.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}
