//! The durable operation queue document (§3, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operation::{Operation, OperationStatus};

/// `{ "operations": [...], "version": int, "last_processed": iso8601|null }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationQueue {
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub last_processed: Option<DateTime<Utc>>,
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self {
            operations: Vec::new(),
            version: 0,
            last_processed: None,
        }
    }
}

impl OperationQueue {
    /// Operations eligible for selection this tick: `pending`, with
    /// `not_before` either unset or already elapsed, ordered by priority
    /// descending then submission timestamp ascending (§4.I step 3).
    #[must_use]
    pub fn select_ready(&self, now: DateTime<Utc>) -> Vec<&Operation> {
        let mut ready: Vec<&Operation> = self
            .operations
            .iter()
            .filter(|op| op.status == OperationStatus::Pending)
            .filter(|op| op.not_before.map(|nb| nb <= now).unwrap_or(true))
            .collect();
        ready.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.submitted_at.cmp(&b.submitted_at))
        });
        ready
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Operation> {
        self.operations.iter_mut().find(|op| op.id == id)
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.id == id)
    }

    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Drop terminal (completed/failed/cancelled) operations whose
    /// `submitted_at` is older than `older_than_hours` (§4.K).
    pub fn gc_stale_terminal(&mut self, now: DateTime<Utc>, older_than_hours: i64) -> usize {
        let cutoff = now - chrono::Duration::hours(older_than_hours);
        let before = self.operations.len();
        self.operations.retain(|op| {
            let terminal = matches!(
                op.status,
                OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
            );
            !(terminal && op.submitted_at < cutoff)
        });
        before - self.operations.len()
    }

    /// If the queue has grown past `max_len`, drop the oldest completed
    /// operations until at most `target_len` remain (§4.K).
    pub fn compact_if_oversized(&mut self, max_len: usize, target_len: usize) -> usize {
        if self.operations.len() <= max_len {
            return 0;
        }
        let mut completed_indices: Vec<usize> = self
            .operations
            .iter()
            .enumerate()
            .filter(|(_, op)| op.status == OperationStatus::Completed)
            .map(|(i, _)| i)
            .collect();
        completed_indices.sort_by_key(|&i| self.operations[i].submitted_at);

        let excess = self.operations.len().saturating_sub(target_len);
        let to_drop: std::collections::HashSet<usize> =
            completed_indices.into_iter().take(excess).collect();

        let before = self.operations.len();
        let mut idx = 0;
        self.operations.retain(|_| {
            let keep = !to_drop.contains(&idx);
            idx += 1;
            keep
        });
        before - self.operations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationType;
    use serde_json::json;

    fn op(id: &str, priority: i32, submitted_at: DateTime<Utc>) -> Operation {
        Operation {
            id: id.to_string(),
            operation_type: OperationType::Heartbeat,
            status: OperationStatus::Pending,
            priority,
            submitted_at,
            source: "test".to_string(),
            retry_count: 0,
            max_retries: 3,
            params: json!({}),
            error: None,
            result_ref: None,
            not_before: None,
        }
    }

    #[test]
    fn select_ready_orders_by_priority_then_timestamp() {
        let now = Utc::now();
        let mut queue = OperationQueue::default();
        queue.push(op("low-early", 0, now - chrono::Duration::seconds(10)));
        queue.push(op("high-late", 5, now - chrono::Duration::seconds(5)));
        queue.push(op("high-early", 5, now - chrono::Duration::seconds(20)));

        let selected: Vec<&str> = queue.select_ready(now).iter().map(|o| o.id.as_str()).collect();
        assert_eq!(selected, vec!["high-early", "high-late", "low-early"]);
    }

    #[test]
    fn select_ready_excludes_backoff_scheduled_operations() {
        let now = Utc::now();
        let mut queue = OperationQueue::default();
        let mut future = op("future", 0, now);
        future.not_before = Some(now + chrono::Duration::seconds(30));
        queue.push(future);
        assert!(queue.select_ready(now).is_empty());
    }

    #[test]
    fn gc_stale_terminal_removes_old_completed_operations() {
        let now = Utc::now();
        let mut queue = OperationQueue::default();
        let mut old = op("old", 0, now - chrono::Duration::hours(48));
        old.status = OperationStatus::Completed;
        queue.push(old);
        let removed = queue.gc_stale_terminal(now, 24);
        assert_eq!(removed, 1);
        assert!(queue.operations.is_empty());
    }

    #[test]
    fn compact_if_oversized_drops_oldest_completed_first() {
        let now = Utc::now();
        let mut queue = OperationQueue::default();
        for i in 0..5 {
            let mut o = op(&format!("c{i}"), 0, now - chrono::Duration::seconds(5 - i));
            o.status = OperationStatus::Completed;
            queue.push(o);
        }
        let removed = queue.compact_if_oversized(4, 2);
        assert_eq!(removed, 3);
        assert_eq!(queue.operations.len(), 2);
        assert_eq!(queue.operations[0].id, "c3");
        assert_eq!(queue.operations[1].id, "c4");
    }
}
