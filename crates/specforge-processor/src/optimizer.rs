//! Background optimizer (spec §4.K): runs on a slower cadence than the main
//! tick, trims the queue and evicts the LRU cache when resident usage grows
//! past its bounds.

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use tracing::info;

use specforge_queue::OperationQueue;
use specforge_util::{write_json, LruCache, Result};

pub const DEFAULT_INTERVAL_SECS: u64 = 300;
const STALE_OPERATION_HOURS: i64 = 24;
const QUEUE_MAX_LEN: usize = 10_000;
const QUEUE_TARGET_LEN: usize = 5_000;
const CACHE_MEMORY_CEILING_BYTES: usize = 150 * 1024 * 1024;
const CACHE_OCCUPANCY_CEILING: f64 = 0.9;
/// Conservative average per-entry footprint used to translate cache
/// occupancy into a resident-memory estimate; not an exact accounting.
const ASSUMED_BYTES_PER_CACHE_ENTRY: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizerReport {
    pub gc_removed: usize,
    pub compacted_removed: usize,
    pub cache_cleared: bool,
}

/// Run a single optimizer pass over `queue`, persisting it if anything
/// changed, and evict `cache` if it has grown past its memory or occupancy
/// bounds.
pub fn run_pass<K, V>(
    queue_path: &Utf8Path,
    queue: &mut OperationQueue,
    now: DateTime<Utc>,
    cache: &LruCache<K, V>,
    cache_capacity: usize,
) -> Result<OptimizerReport>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    let gc_removed = queue.gc_stale_terminal(now, STALE_OPERATION_HOURS);
    let compacted_removed = queue.compact_if_oversized(QUEUE_MAX_LEN, QUEUE_TARGET_LEN);

    if gc_removed > 0 || compacted_removed > 0 {
        queue.version += 1;
        write_json(queue_path, queue)?;
        info!(gc_removed, compacted_removed, "optimizer trimmed queue");
    }

    let len = cache.len();
    let estimated_bytes = len * ASSUMED_BYTES_PER_CACHE_ENTRY;
    let occupancy = if cache_capacity == 0 {
        0.0
    } else {
        len as f64 / cache_capacity as f64
    };
    let cache_cleared = if estimated_bytes > CACHE_MEMORY_CEILING_BYTES || occupancy > CACHE_OCCUPANCY_CEILING {
        cache.clear();
        info!(estimated_bytes, occupancy, "optimizer cleared idempotency cache");
        true
    } else {
        false
    };

    Ok(OptimizerReport {
        gc_removed,
        compacted_removed,
        cache_cleared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use serde_json::json;
    use specforge_queue::{Operation, OperationStatus, OperationType};
    use tempfile::TempDir;

    fn op(id: &str, status: OperationStatus, submitted_at: DateTime<Utc>) -> Operation {
        Operation {
            id: id.to_string(),
            operation_type: OperationType::Heartbeat,
            status,
            priority: 0,
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
    fn pass_gcs_stale_terminal_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("queue.json")).unwrap();
        let now = Utc::now();
        let mut queue = OperationQueue::default();
        queue.push(op("old", OperationStatus::Completed, now - chrono::Duration::hours(48)));
        let cache: LruCache<String, ()> = LruCache::new(10);

        let report = run_pass(&path, &mut queue, now, &cache, 10).unwrap();
        assert_eq!(report.gc_removed, 1);
        assert!(path.is_file());
    }

    #[test]
    fn pass_clears_cache_past_occupancy_ceiling() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("queue.json")).unwrap();
        let now = Utc::now();
        let mut queue = OperationQueue::default();
        let cache: LruCache<String, ()> = LruCache::new(10);
        for i in 0..10 {
            cache.put(format!("k{i}"), ());
        }

        let report = run_pass(&path, &mut queue, now, &cache, 10).unwrap();
        assert!(report.cache_cleared);
        assert_eq!(cache.len(), 0);
    }
}
