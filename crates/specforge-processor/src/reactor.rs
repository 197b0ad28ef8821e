//! The core tick loop (spec §4.I): one pass of load → select → idempotency
//! check → conflict resolution → batch → dispatch → retry → persist.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use specforge_batcher::build_batches;
use specforge_conflict::{check_dependency_violation, check_version_mismatch, detect_conflicts};
use specforge_queue::{Operation, OperationQueue, OperationStatus, OperationType};
use specforge_queue::result::{append_result, OperationResult};
use specforge_store::SpecificationStore;
use specforge_util::{read_json, write_json, LruCache, Result, SpecforgeError};

use crate::backoff::{compute_backoff, jitter_fraction_for};
use crate::handlers::dispatch;
use crate::sync_state::{PerformanceTracker, SyncState, SYNC_FILE};

pub const QUEUE_FILE: &str = "mcp-operations.json";
pub const RESULTS_FILE: &str = "mcp-results.json";
const DEFAULT_HANDLER_TIMEOUT_SECS: u64 = 30;
const SYNC_WRITE_MIN_INTERVAL_SECS: i64 = 30;
/// Grace period granted to in-flight handlers after a stop signal before the
/// reactor gives up waiting on them (§4.I shutdown behavior).
pub const STOP_GRACE_SECS: u64 = 5;

/// One pass's outcome, surfaced to the CLI's `once` subcommand and to tests.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub dispatched: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    pub skipped_duplicate: usize,
    pub skipped_conflict: usize,
}

/// What a completed operation's result looked like, kept long enough that a
/// duplicate submission within the idempotency window can be answered
/// without re-running the handler (§4.I step 4, R3).
#[derive(Debug, Clone)]
struct CachedCompletion {
    operation_id: String,
    finished_at: DateTime<Utc>,
    message: String,
    data: Option<Value>,
}

pub struct Reactor {
    project_root: Utf8PathBuf,
    store: Arc<Mutex<SpecificationStore>>,
    cache: Arc<LruCache<(OperationType, String), CachedCompletion>>,
    concurrency: usize,
    batch_capacity: usize,
    retry_base_ms: u64,
    retry_max_ms: u64,
    handler_timeout: StdDuration,
    tuning: specforge_config::TuningConfig,
    performance: PerformanceTracker,
    last_sync_write: Option<DateTime<Utc>>,
}

impl Reactor {
    pub fn new(config: &specforge_config::Config) -> Result<Self> {
        let mut store = SpecificationStore::new(config.base_dir.clone());
        store.load_all()?;

        let tuning = config.tuning.clone();

        Ok(Self {
            project_root: config.project_root.clone(),
            store: Arc::new(Mutex::new(store)),
            cache: Arc::new(LruCache::new(tuning.cache_capacity)),
            concurrency: tuning.concurrency,
            batch_capacity: tuning.batch_capacity,
            retry_base_ms: tuning.retry_base_ms,
            retry_max_ms: tuning.retry_max_ms,
            handler_timeout: StdDuration::from_secs(DEFAULT_HANDLER_TIMEOUT_SECS),
            tuning,
            performance: PerformanceTracker::default(),
            last_sync_write: None,
        })
    }

    fn queue_path(&self) -> Utf8PathBuf {
        self.project_root.join(QUEUE_FILE)
    }

    fn results_path(&self) -> Utf8PathBuf {
        self.project_root.join(RESULTS_FILE)
    }

    fn sync_path(&self) -> Utf8PathBuf {
        self.project_root.join(SYNC_FILE)
    }

    fn load_queue(&self) -> Result<OperationQueue> {
        let path = self.queue_path();
        if !path.is_file() {
            return Ok(OperationQueue::default());
        }
        if specforge_util::should_stream(&path)? {
            let streamed = specforge_util::load_queue_streaming::<Operation>(&path)?;
            if streamed.skipped > 0 {
                warn!(skipped = streamed.skipped, "streaming loader skipped malformed operations");
            }
            return Ok(OperationQueue {
                operations: streamed.operations,
                version: streamed.version,
                last_processed: streamed
                    .last_processed
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
            });
        }
        Ok(read_json::<OperationQueue>(&path)?.unwrap_or_default())
    }

    fn load_results(&self) -> Result<Vec<OperationResult>> {
        Ok(read_json::<Vec<OperationResult>>(&self.results_path())?.unwrap_or_default())
    }

    fn artifact_mtime(&self, spec_id: &str) -> Option<DateTime<Utc>> {
        let store = self.store.lock().unwrap();
        let spec_json = store.spec_dir(spec_id).join("spec.json");
        std::fs::metadata(spec_json.as_std_path())
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }

    /// Run exactly one tick: load, select, resolve conflicts, batch, dispatch,
    /// persist results, and write a SyncState snapshot if the interval has
    /// elapsed. Used both by the long-lived loop and the CLI's `once` command.
    pub async fn tick(&mut self) -> Result<(TickReport, SyncState)> {
        let now = Utc::now();
        let mut queue = self.load_queue()?;
        let mut report = TickReport::default();

        let mut results_log = self.load_results()?;

        let ready: Vec<Operation> = queue.select_ready(now).into_iter().cloned().collect();
        let mut survivors: Vec<Operation> = Vec::new();
        let mut active_conflicts = 0usize;

        for candidate in ready {
            if let Some(cached) = self.cache.get(&candidate.signature()) {
                let window = self.tuning.idempotency_window_secs(candidate.operation_type.as_str());
                if (now - cached.finished_at).num_seconds() <= window as i64 {
                    if let Some(op) = queue.find_mut(&candidate.id) {
                        let _ = op.transition(OperationStatus::InProgress);
                        let _ = op.transition(OperationStatus::Completed);
                        op.result_ref = Some(cached.operation_id.clone());
                    }
                    append_result(
                        &mut results_log,
                        OperationResult {
                            operation_id: candidate.id.clone(),
                            success: true,
                            message: format!("duplicate of {}: {}", cached.operation_id, cached.message),
                            data: cached.data.clone(),
                            timestamp: now,
                            processing_time_ms: 0,
                            retryable: false,
                        },
                    );
                    report.skipped_duplicate += 1;
                    continue;
                }
            }

            let conflicts = detect_conflicts(&candidate, &queue.operations);
            let mut cancelled = false;
            let mut deferred = false;
            for conflict in &conflicts {
                match conflict.auto_resolve_hint.as_deref() {
                    Some(hint) if hint == format!("cancel:{}", candidate.id) => cancelled = true,
                    Some(hint) if hint == format!("serialize_after:{}", candidate.id) => deferred = true,
                    _ => {}
                }
            }
            if cancelled {
                if let Some(op) = queue.find_mut(&candidate.id) {
                    let _ = op.transition(OperationStatus::Cancelled);
                }
                report.skipped_duplicate += 1;
                continue;
            }
            if deferred {
                report.skipped_conflict += 1;
                active_conflicts += 1;
                continue;
            }

            if let Some(spec_id) = candidate.spec_id() {
                if let Some(mtime) = self.artifact_mtime(spec_id) {
                    if check_version_mismatch(&candidate, Some(mtime)).is_some() {
                        active_conflicts += 1;
                        report.skipped_conflict += 1;
                        continue;
                    }
                }
            }

            {
                let store = self.store.lock().unwrap();
                if let Some(conflict) = check_dependency_violation(&candidate, &store) {
                    if let Some(op) = queue.find_mut(&candidate.id) {
                        let _ = op.transition(OperationStatus::InProgress);
                        let _ = op.transition(OperationStatus::Failed);
                        op.error = Some(conflict.description.clone());
                    }
                    report.failed += 1;
                    continue;
                }
            }

            survivors.push(candidate);
        }

        let refs: Vec<&Operation> = survivors.iter().collect();
        let batches = build_batches(&refs, self.batch_capacity);
        let ids_in_order: Vec<String> = batches.into_iter().flatten().map(|op| op.id.clone()).collect();

        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut handles = Vec::new();
        for id in ids_in_order {
            let Some(operation) = survivors.iter().find(|o| o.id == id).cloned() else {
                continue;
            };
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let store = self.store.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    let mut store = store.lock().unwrap();
                    dispatch(&operation, &mut store)
                }))
            });
            handles.push((id, handle));
        }

        for (id, handle) in handles {
            let started = now;
            let awaited = tokio::time::timeout(self.handler_timeout, handle).await;
            let finished = Utc::now();
            let duration_ms = (finished - started).num_milliseconds().max(0) as u64;
            self.performance.observe(duration_ms, finished);
            report.dispatched += 1;

            let Some(mut operation) = survivors.iter().find(|o| o.id == id).cloned() else {
                continue;
            };

            let handler_result = match awaited {
                Err(_) => Err(SpecforgeError::Timeout {
                    elapsed_ms: self.handler_timeout.as_millis() as u64,
                }),
                Ok(Err(join_err)) => return Err(SpecforgeError::Fatal(join_err.to_string())),
                Ok(Ok(Err(_panic))) => Err(SpecforgeError::Fatal("handler panicked".to_string())),
                Ok(Ok(Ok(dispatch_result))) => dispatch_result,
            };

            if let Some(op) = queue.find_mut(&operation.id) {
                let _ = op.transition(OperationStatus::InProgress);
                match handler_result {
                    Ok(outcome) => {
                        let _ = op.transition(OperationStatus::Completed);
                        op.result_ref = Some(operation.id.clone());
                        self.cache.put(
                            operation.signature(),
                            CachedCompletion {
                                operation_id: operation.id.clone(),
                                finished_at: finished,
                                message: outcome.message.clone(),
                                data: outcome.data.clone(),
                            },
                        );
                        append_result(
                            &mut results_log,
                            OperationResult {
                                operation_id: operation.id.clone(),
                                success: true,
                                message: outcome.message,
                                data: outcome.data,
                                timestamp: finished,
                                processing_time_ms: duration_ms,
                                retryable: false,
                            },
                        );
                        report.completed += 1;
                    }
                    Err(err) => {
                        let retryable = err.retryable();
                        if retryable && operation.retry_count < operation.max_retries {
                            operation.retry_count += 1;
                            let jitter = jitter_fraction_for(&operation.id);
                            let backoff = compute_backoff(operation.retry_count, self.retry_base_ms, self.retry_max_ms, jitter);
                            let _ = op.transition(OperationStatus::Failed);
                            let _ = op.transition(OperationStatus::Pending);
                            op.retry_count = operation.retry_count;
                            op.not_before = Some(finished + backoff);
                            op.error = Some(err.to_string());
                            report.retried += 1;
                        } else {
                            let _ = op.transition(OperationStatus::Failed);
                            op.error = Some(err.to_string());
                            report.failed += 1;
                        }
                        append_result(
                            &mut results_log,
                            OperationResult {
                                operation_id: operation.id.clone(),
                                success: false,
                                message: err.to_string(),
                                data: None,
                                timestamp: finished,
                                processing_time_ms: duration_ms,
                                retryable,
                            },
                        );
                    }
                }
            }
        }

        queue.last_processed = Some(now);
        queue.version += 1;
        write_json(&self.queue_path(), &queue)?;
        write_json(&self.results_path(), &results_log)?;

        let performance_snapshot = self.performance.snapshot(now);
        let sync_state = {
            let store = self.store.lock().unwrap();
            SyncState::compute(now, &queue, &store, active_conflicts, performance_snapshot)
        };

        let should_persist_sync = self
            .last_sync_write
            .map(|last| (now - last).num_seconds() >= SYNC_WRITE_MIN_INTERVAL_SECS)
            .unwrap_or(true);
        if should_persist_sync {
            write_json(&self.sync_path(), &sync_state)?;
            self.last_sync_write = Some(now);
        }

        info!(
            dispatched = report.dispatched,
            completed = report.completed,
            retried = report.retried,
            failed = report.failed,
            "tick complete"
        );

        Ok((report, sync_state))
    }

    /// Current SyncState without running a tick, recomputed from disk. Used
    /// by the CLI's `status` subcommand.
    pub fn current_sync_state(&self) -> Result<SyncState> {
        let now = Utc::now();
        let queue = self.load_queue()?;
        let store = self.store.lock().unwrap();
        Ok(SyncState::compute(now, &queue, &store, 0, self.performance.snapshot(now)))
    }

    /// Single pass, for the CLI's `once` subcommand and deterministic tests.
    pub async fn run_once(&mut self) -> Result<SyncState> {
        let (_, sync_state) = self.tick().await?;
        Ok(sync_state)
    }

    async fn run_optimizer_pass(&mut self) -> Result<crate::optimizer::OptimizerReport> {
        let mut queue = self.load_queue()?;
        let now = Utc::now();
        let report = crate::optimizer::run_pass(&self.queue_path(), &mut queue, now, &self.cache, self.tuning.cache_capacity)?;
        Ok(report)
    }

    /// Long-lived loop: ticks on `tick_interval`, runs the background
    /// optimizer on `optimizer_interval`, until `shutdown` reports `true`.
    /// Grants in-flight work [`STOP_GRACE_SECS`] before the final SyncState
    /// write and return (§4.I shutdown behavior).
    pub async fn run(
        &mut self,
        tick_interval: StdDuration,
        optimizer_interval: StdDuration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<()> {
        let mut tick_timer = tokio::time::interval(tick_interval);
        let mut optimizer_timer = tokio::time::interval(optimizer_interval);

        loop {
            tokio::select! {
                _ = tick_timer.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "tick failed");
                    }
                }
                _ = optimizer_timer.tick() => {
                    if let Err(e) = self.run_optimizer_pass().await {
                        error!(error = %e, "optimizer pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let _ = tokio::time::timeout(StdDuration::from_secs(STOP_GRACE_SECS), self.tick()).await;

        let now = Utc::now();
        let queue = self.load_queue()?;
        let mut final_state = {
            let store = self.store.lock().unwrap();
            SyncState::compute(now, &queue, &store, 0, self.performance.snapshot(now))
        };
        final_state.server_online = true;
        write_json(&self.sync_path(), &final_state)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use specforge_config::Config;
    use tempfile::TempDir;

    fn init_config(dir: &TempDir) -> Config {
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
        Config::resolve(Some(dir.path())).unwrap()
    }

    fn op_json(id: &str, name: &str, submitted_at: DateTime<Utc>) -> serde_json::Value {
        json!({
            "id": id,
            "type": "create_spec",
            "status": "pending",
            "priority": 0,
            "submitted_at": submitted_at.to_rfc3339(),
            "source": "test",
            "retry_count": 0,
            "max_retries": 3,
            "params": { "name": name },
        })
    }

    fn write_queue(config: &Config, operations: Vec<serde_json::Value>) {
        let doc = json!({ "version": 0, "last_processed": null, "operations": operations });
        std::fs::write(config.project_root.join(QUEUE_FILE).as_std_path(), doc.to_string()).unwrap();
    }

    #[tokio::test]
    async fn tick_processes_create_spec_operation_to_completion() {
        let dir = TempDir::new().unwrap();
        let config = init_config(&dir);
        write_queue(&config, vec![op_json("op-1", "Todo App", Utc::now())]);

        let mut reactor = Reactor::new(&config).unwrap();
        let (report, sync_state) = reactor.tick().await.unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(sync_state.counters.completed, 1);
        assert!(config.project_root.join(".specifications/todo-app/spec.json").is_file());
    }

    #[tokio::test]
    async fn tick_suppresses_duplicate_within_idempotency_window() {
        let dir = TempDir::new().unwrap();
        let config = init_config(&dir);
        let now = Utc::now();
        write_queue(&config, vec![op_json("op-1", "Todo App", now)]);

        let mut reactor = Reactor::new(&config).unwrap();
        reactor.tick().await.unwrap();

        let queue_path = config.project_root.join(QUEUE_FILE);
        let mut doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(queue_path.as_std_path()).unwrap()).unwrap();
        doc["operations"]
            .as_array_mut()
            .unwrap()
            .push(op_json("op-2", "Todo App", Utc::now()));
        std::fs::write(queue_path.as_std_path(), doc.to_string()).unwrap();

        let (report, _) = reactor.tick().await.unwrap();
        assert_eq!(report.skipped_duplicate, 1);
        assert_eq!(report.completed, 0);

        let after: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(queue_path.as_std_path()).unwrap()).unwrap();
        let op_two = after["operations"]
            .as_array()
            .unwrap()
            .iter()
            .find(|o| o["id"] == "op-2")
            .unwrap();
        assert_eq!(op_two["status"], "completed");
        assert_eq!(op_two["result_ref"], "op-1");

        let results_path = config.project_root.join(RESULTS_FILE);
        let results: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(results_path.as_std_path()).unwrap()).unwrap();
        let op_two_result = results
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["operation_id"] == "op-2")
            .unwrap();
        assert!(op_two_result["message"].as_str().unwrap().contains("op-1"));
    }

    #[tokio::test]
    async fn tick_refuses_task_check_with_unmet_dependency() {
        let dir = TempDir::new().unwrap();
        let config = init_config(&dir);
        write_queue(&config, vec![op_json("op-1", "Demo", Utc::now())]);

        let mut reactor = Reactor::new(&config).unwrap();
        reactor.tick().await.unwrap();

        {
            let mut store = reactor.store.lock().unwrap();
            store.add_task("demo", "Task 1", "", vec![]).unwrap();
            let blocker_id = store.get("demo").unwrap().tasks[0].id.clone();
            store.add_task("demo", "Task 2", "", vec![blocker_id]).unwrap();
        }
        let second_number = reactor.store.lock().unwrap().get("demo").unwrap().tasks[1].number.clone();

        let check_op = json!({
            "id": "op-check",
            "type": "check_task",
            "status": "pending",
            "priority": 0,
            "submitted_at": Utc::now().to_rfc3339(),
            "source": "test",
            "retry_count": 0,
            "max_retries": 3,
            "params": { "specId": "demo", "task_number": second_number },
        });
        write_queue(&config, vec![check_op]);

        let (report, _) = reactor.tick().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 0);
    }
}
