//! Task numbering, completion rollup, and flattening (spec §4.E).

use crate::model::{Task, TaskStatus};

/// Recompute every task's `number` as its 1-based index among siblings,
/// recursively: `1`, `2`, `2.1`, `3.2.1`.
pub fn renumber(tasks: &mut [Task]) {
    renumber_at(tasks, "");
}

fn renumber_at(tasks: &mut [Task], prefix: &str) {
    for (i, task) in tasks.iter_mut().enumerate() {
        let position = i + 1;
        task.number = if prefix.is_empty() {
            position.to_string()
        } else {
            format!("{prefix}.{position}")
        };
        let child_prefix = task.number.clone();
        renumber_at(&mut task.subtasks, &child_prefix);
    }
}

/// Flatten the task tree into a depth-first list of references.
#[must_use]
pub fn flatten(tasks: &[Task]) -> Vec<&Task> {
    let mut out = Vec::new();
    flatten_into(tasks, &mut out);
    out
}

fn flatten_into<'a>(tasks: &'a [Task], out: &mut Vec<&'a Task>) {
    for task in tasks {
        out.push(task);
        flatten_into(&task.subtasks, out);
    }
}

/// Recompute `status` bottom-up for every task with subtasks: `completed`
/// iff every direct subtask is completed; `in_progress` iff any descendant
/// is in_progress or completed without all being complete; otherwise
/// `pending` (§4.E completion rollup).
pub fn apply_rollup(tasks: &mut [Task]) {
    for task in tasks {
        apply_rollup(&mut task.subtasks);
        if task.subtasks.is_empty() {
            continue;
        }
        task.status = rollup_status(&task.subtasks);
    }
}

fn rollup_status(subtasks: &[Task]) -> TaskStatus {
    let all_completed = subtasks.iter().all(|t| t.status == TaskStatus::Completed);
    if all_completed {
        return TaskStatus::Completed;
    }
    let any_active = subtasks
        .iter()
        .any(|t| matches!(t.status, TaskStatus::InProgress | TaskStatus::Completed));
    if any_active {
        TaskStatus::InProgress
    } else {
        TaskStatus::Pending
    }
}

/// `(total, completed, in_progress, pending, percent_complete)` over every
/// task in the tree.
#[must_use]
pub fn completion_stats(tasks: &[Task]) -> (usize, usize, usize, usize, f64) {
    let flat = flatten(tasks);
    let total = flat.len();
    let completed = flat.iter().filter(|t| t.status == TaskStatus::Completed).count();
    let in_progress = flat.iter().filter(|t| t.status == TaskStatus::InProgress).count();
    let pending = total - completed - in_progress;
    let percent = if total == 0 {
        0.0
    } else {
        (completed as f64 / total as f64) * 100.0
    };
    (total, completed, in_progress, pending, percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str, status: TaskStatus, subtasks: Vec<Task>) -> Task {
        Task {
            id: format!("T-{title}"),
            number: String::new(),
            title: title.to_string(),
            description: String::new(),
            status,
            parent_id: None,
            subtasks,
            dependencies: Vec::new(),
            linked_requirement_ids: Vec::new(),
            estimated_hours: None,
            actual_hours: None,
        }
    }

    #[test]
    fn renumber_assigns_dotted_positions() {
        let mut tasks = vec![
            task("a", TaskStatus::Pending, vec![task("a1", TaskStatus::Pending, vec![])]),
            task("b", TaskStatus::Pending, vec![]),
        ];
        renumber(&mut tasks);
        assert_eq!(tasks[0].number, "1");
        assert_eq!(tasks[0].subtasks[0].number, "1.1");
        assert_eq!(tasks[1].number, "2");
    }

    #[test]
    fn rollup_marks_parent_completed_when_all_children_done() {
        let mut tasks = vec![task(
            "parent",
            TaskStatus::Pending,
            vec![
                task("c1", TaskStatus::Completed, vec![]),
                task("c2", TaskStatus::Completed, vec![]),
            ],
        )];
        apply_rollup(&mut tasks);
        assert_eq!(tasks[0].status, TaskStatus::Completed);
    }

    #[test]
    fn rollup_marks_parent_in_progress_when_partially_done() {
        let mut tasks = vec![task(
            "parent",
            TaskStatus::Pending,
            vec![
                task("c1", TaskStatus::Completed, vec![]),
                task("c2", TaskStatus::Pending, vec![]),
            ],
        )];
        apply_rollup(&mut tasks);
        assert_eq!(tasks[0].status, TaskStatus::InProgress);
    }

    #[test]
    fn rollup_reverts_ancestor_when_uncompleting_subtask() {
        let mut tasks = vec![task(
            "parent",
            TaskStatus::Completed,
            vec![
                task("c1", TaskStatus::Completed, vec![]),
                task("c2", TaskStatus::Completed, vec![]),
            ],
        )];
        apply_rollup(&mut tasks);
        assert_eq!(tasks[0].status, TaskStatus::Completed);

        tasks[0].subtasks[1].status = TaskStatus::Pending;
        apply_rollup(&mut tasks);
        assert_eq!(tasks[0].status, TaskStatus::InProgress);
    }

    #[test]
    fn completion_stats_counts_leaves_and_parents() {
        let tasks = vec![task(
            "parent",
            TaskStatus::InProgress,
            vec![
                task("c1", TaskStatus::Completed, vec![]),
                task("c2", TaskStatus::Pending, vec![]),
            ],
        )];
        let (total, completed, in_progress, pending, _pct) = completion_stats(&tasks);
        assert_eq!(total, 3);
        assert_eq!(completed, 1);
        assert_eq!(in_progress, 1);
        assert_eq!(pending, 1);
    }
}
