use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::commands::OperationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Resolved,
    TimedOut,
}

/// A deploy or stop that has been sent and not yet answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub resource_id: i64,
    pub kind: OperationKind,
    pub issued_at: Instant,
    pub deadline: Instant,
    pub status: OperationStatus,
}

/// Outstanding operations, at most one per `(resource, kind)`.
///
/// The console protocol carries no correlation id, so any inbound frame
/// resolves everything and deadlines are the only other way out.
#[derive(Debug, Default)]
pub struct PendingOperations {
    entries: HashMap<(i64, OperationKind), Operation>,
}

impl PendingOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a freshly sent operation. A still-pending entry for the same
    /// resource and kind is replaced and returned.
    pub fn issue(
        &mut self,
        resource_id: i64,
        kind: OperationKind,
        now: Instant,
        ttl: Duration,
    ) -> Option<Operation> {
        self.entries.insert(
            (resource_id, kind),
            Operation {
                resource_id,
                kind,
                issued_at: now,
                deadline: now + ttl,
                status: OperationStatus::Pending,
            },
        )
    }

    pub fn resolve_all(&mut self) -> Vec<Operation> {
        self.drain_where(OperationStatus::Resolved, |_| true)
    }

    /// Removes every operation whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<Operation> {
        self.drain_where(OperationStatus::TimedOut, |op| op.deadline <= now)
    }

    fn drain_where(
        &mut self,
        status: OperationStatus,
        mut due: impl FnMut(&Operation) -> bool,
    ) -> Vec<Operation> {
        let keys: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, op)| due(op))
            .map(|(key, _)| *key)
            .collect();
        let mut drained: Vec<Operation> = keys
            .into_iter()
            .filter_map(|key| self.entries.remove(&key))
            .map(|mut op| {
                op.status = status;
                op
            })
            .collect();
        drained.sort_by_key(|op| (op.deadline, op.resource_id, op.kind));
        drained
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|op| op.deadline).min()
    }

    pub fn is_busy(&self, resource_id: i64) -> bool {
        self.entries.keys().any(|(id, _)| *id == resource_id)
    }

    pub fn get(&self, resource_id: i64, kind: OperationKind) -> Option<&Operation> {
        self.entries.get(&(resource_id, kind))
    }

    /// Pending operations, earliest deadline first.
    pub fn snapshot(&self) -> Vec<Operation> {
        let mut ops: Vec<Operation> = self.entries.values().cloned().collect();
        ops.sort_by_key(|op| (op.deadline, op.resource_id, op.kind));
        ops
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
