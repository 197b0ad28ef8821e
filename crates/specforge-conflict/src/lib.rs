//! Conflict detection (spec §4.H): duplicate, concurrent-modification,
//! version-mismatch, and dependency-violation checks over the pending queue.

use chrono::{DateTime, Utc};

use specforge_queue::{Conflict, ConflictType, Operation, OperationStatus, OperationType};
use specforge_store::SpecificationStore;

/// Window within which two operations are considered for duplicate /
/// concurrent-modification comparison (§4.H).
pub const CONFLICT_WINDOW_SECONDS: i64 = 5 * 60;

/// Detect every conflict involving `candidate` against the rest of the
/// pending+in_progress queue.
#[must_use]
pub fn detect_conflicts(candidate: &Operation, queue: &[Operation]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for other in queue {
        if other.id == candidate.id {
            continue;
        }
        if !matches!(other.status, OperationStatus::Pending | OperationStatus::InProgress) {
            continue;
        }

        if let Some(conflict) = check_duplicate(candidate, other) {
            conflicts.push(conflict);
        } else if let Some(conflict) = check_concurrent_modification(candidate, other) {
            conflicts.push(conflict);
        }
    }

    conflicts
}

fn within_window(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    (a - b).num_seconds().abs() <= CONFLICT_WINDOW_SECONDS
}

fn check_duplicate(candidate: &Operation, other: &Operation) -> Option<Conflict> {
    if candidate.signature() != other.signature() {
        return None;
    }
    if !within_window(candidate.submitted_at, other.submitted_at) {
        return None;
    }
    let later = if candidate.submitted_at >= other.submitted_at {
        candidate.id.clone()
    } else {
        other.id.clone()
    };
    Some(Conflict {
        conflict_type: ConflictType::Duplicate,
        operation_ids: vec![candidate.id.clone(), other.id.clone()],
        description: format!(
            "operations {} and {} are duplicate {} submissions within {}s",
            candidate.id, other.id, candidate.operation_type, CONFLICT_WINDOW_SECONDS
        ),
        auto_resolve_hint: Some(format!("cancel:{later}")),
    })
}

/// Whether a pair of operation types both mutate the same specification in a
/// way that requires serialization if submitted close together.
fn both_mutating(a: OperationType, b: OperationType) -> bool {
    !matches!(a, OperationType::Heartbeat | OperationType::SyncStatus)
        && !matches!(b, OperationType::Heartbeat | OperationType::SyncStatus)
}

fn check_concurrent_modification(candidate: &Operation, other: &Operation) -> Option<Conflict> {
    let (Some(a_spec), Some(b_spec)) = (candidate.spec_id(), other.spec_id()) else {
        return None;
    };
    if a_spec != b_spec {
        return None;
    }
    if !both_mutating(candidate.operation_type, other.operation_type) {
        return None;
    }
    if !within_window(candidate.submitted_at, other.submitted_at) {
        return None;
    }

    let blocked = if candidate.submitted_at > other.submitted_at {
        candidate.id.clone()
    } else {
        other.id.clone()
    };
    Some(Conflict {
        conflict_type: ConflictType::ConcurrentModification,
        operation_ids: vec![candidate.id.clone(), other.id.clone()],
        description: format!(
            "operations {} and {} both target specification {} within {}s",
            candidate.id, other.id, a_spec, CONFLICT_WINDOW_SECONDS
        ),
        auto_resolve_hint: Some(format!("serialize_after:{blocked}")),
    })
}

/// Version-mismatch: the target artifact's on-disk mtime is strictly newer
/// than the operation's submission timestamp, indicating an external edit.
/// Not auto-resolvable; surfaced for user decision.
#[must_use]
pub fn check_version_mismatch(
    candidate: &Operation,
    artifact_mtime: Option<DateTime<Utc>>,
) -> Option<Conflict> {
    let mtime = artifact_mtime?;
    if mtime <= candidate.submitted_at {
        return None;
    }
    Some(Conflict {
        conflict_type: ConflictType::VersionMismatch,
        operation_ids: vec![candidate.id.clone()],
        description: format!(
            "target artifact for {} was modified externally at {mtime} after submission at {}",
            candidate.id, candidate.submitted_at
        ),
        auto_resolve_hint: None,
    })
}

/// Dependency-violation: a task-check operation targets a task whose
/// declared dependencies are not all completed. Auto-resolve: refuse.
#[must_use]
pub fn check_dependency_violation(
    candidate: &Operation,
    store: &SpecificationStore,
) -> Option<Conflict> {
    if !matches!(
        candidate.operation_type,
        OperationType::CheckTask | OperationType::ExecuteTask | OperationType::BulkCheckTasks
    ) {
        return None;
    }
    let spec_id = candidate.spec_id()?;
    let spec = store.get(spec_id)?;

    let task = if candidate.operation_type == OperationType::ExecuteTask {
        let task_id = candidate.params.get("task_id").and_then(|v| v.as_str())?;
        spec.find_task_by_id(task_id)?
    } else {
        let task_number = candidate.params.get("task_number").and_then(|v| v.as_str())?;
        spec.find_task_by_number(task_number)?
    };
    if task.dependencies.is_empty() {
        return None;
    }
    if SpecificationStore::dependencies_satisfied(spec, &task.dependencies) {
        return None;
    }

    Some(Conflict {
        conflict_type: ConflictType::DependencyViolation,
        operation_ids: vec![candidate.id.clone()],
        description: format!(
            "task {} in {spec_id} has unmet dependencies: {:?}",
            task.number, task.dependencies
        ),
        auto_resolve_hint: Some("refuse".to_string()),
    })
}
