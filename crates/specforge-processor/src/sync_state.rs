//! Sync/Heartbeat document (spec §4.J, §6) written to `specforge-sync.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use specforge_queue::{OperationQueue, OperationStatus};
use specforge_store::SpecificationStore;

pub const SYNC_FILE: &str = "specforge-sync.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    pub pending: usize,
    pub in_progress: usize,
    pub failed: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecSummary {
    pub spec_id: String,
    pub last_modified: DateTime<Utc>,
    pub version: u64,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Performance {
    pub average_operation_time_ms: f64,
    pub last_processing_duration_ms: u64,
    pub queue_processing_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub counters: Counters,
    pub specifications: Vec<SpecSummary>,
    pub performance: Performance,
    pub server_online: bool,
    pub last_heartbeat: DateTime<Utc>,
    pub last_sync: DateTime<Utc>,
    pub active_conflicts: usize,
}

impl SyncState {
    #[must_use]
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            counters: Counters::default(),
            specifications: Vec::new(),
            performance: Performance::default(),
            server_online: true,
            last_heartbeat: now,
            last_sync: now,
            active_conflicts: 0,
        }
    }

    /// Recompute every field from the current queue and specification store.
    #[must_use]
    pub fn compute(
        now: DateTime<Utc>,
        queue: &OperationQueue,
        store: &SpecificationStore,
        active_conflicts: usize,
        performance: Performance,
    ) -> Self {
        let mut counters = Counters::default();
        for op in &queue.operations {
            match op.status {
                OperationStatus::Pending => counters.pending += 1,
                OperationStatus::InProgress => counters.in_progress += 1,
                OperationStatus::Failed => counters.failed += 1,
                OperationStatus::Completed => counters.completed += 1,
                OperationStatus::Cancelled => {}
            }
        }

        let specifications = store
            .all()
            .map(|spec| SpecSummary {
                spec_id: spec.slug.clone(),
                last_modified: spec.updated_at,
                version: queue.version,
                status: format!("{:?}", spec.status).to_lowercase(),
            })
            .collect();

        Self {
            counters,
            specifications,
            performance,
            server_online: true,
            last_heartbeat: now,
            last_sync: now,
            active_conflicts,
        }
    }
}

/// Exponential moving average (α=0.2) over observed handler durations (§4.J).
#[derive(Debug, Clone, Copy, Default)]
pub struct PerformanceTracker {
    average_ms: f64,
    last_duration_ms: u64,
    samples: u64,
    window_start: Option<DateTime<Utc>>,
}

const EMA_ALPHA: f64 = 0.2;

impl PerformanceTracker {
    pub fn observe(&mut self, duration_ms: u64, now: DateTime<Utc>) {
        self.last_duration_ms = duration_ms;
        self.samples += 1;
        if self.window_start.is_none() {
            self.window_start = Some(now);
        }
        if self.samples == 1 {
            self.average_ms = duration_ms as f64;
        } else {
            self.average_ms = EMA_ALPHA * duration_ms as f64 + (1.0 - EMA_ALPHA) * self.average_ms;
        }
    }

    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> Performance {
        let elapsed_secs = self
            .window_start
            .map(|start| (now - start).num_milliseconds().max(1) as f64 / 1000.0)
            .unwrap_or(1.0);
        Performance {
            average_operation_time_ms: self.average_ms,
            last_processing_duration_ms: self.last_duration_ms,
            queue_processing_rate: self.samples as f64 / elapsed_secs,
        }
    }
}
