//! Deterministic implementation-plan generation (spec §4.E).
//!
//! One task is derived per EARS requirement plus one per design component.
//! Regeneration after edits preserves completion status for tasks whose
//! title survives by exact match; everything else is treated as new.

use crate::model::{Specification, Task, TaskStatus};
use crate::numbering::{flatten, renumber};

/// Regenerate `spec.tasks` from the current requirements and design,
/// carrying over status for titles that still exist.
pub fn generate_implementation_plan(spec: &mut Specification) {
    let previous_status: std::collections::HashMap<String, TaskStatus> = flatten(&spec.tasks)
        .into_iter()
        .map(|t| (t.title.clone(), t.status))
        .collect();

    let mut generated = Vec::new();

    for story in &spec.user_stories {
        for req in &story.requirements {
            let title = format!("Implement {}", req.id);
            generated.push(new_task(title, &previous_status, vec![req.id.clone()]));
        }
    }

    for component in &spec.design.components {
        let title = format!("Build {component}");
        generated.push(new_task(title, &previous_status, Vec::new()));
    }

    renumber(&mut generated);
    spec.tasks = generated;
}

fn new_task(title: String, previous_status: &std::collections::HashMap<String, TaskStatus>, linked_requirement_ids: Vec<String>) -> Task {
    let status = previous_status.get(&title).copied().unwrap_or(TaskStatus::Pending);
    Task {
        id: format!("T{:03}", stable_task_id_suffix(&title)),
        number: String::new(),
        title,
        description: String::new(),
        status,
        parent_id: None,
        subtasks: Vec::new(),
        dependencies: Vec::new(),
        linked_requirement_ids,
        estimated_hours: None,
        actual_hours: None,
    }
}

/// A small stable hash used only to produce a readable, deterministic task
/// id suffix; not a security-sensitive hash.
fn stable_task_id_suffix(title: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in title.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(16777619);
    }
    (hash % 1000) + 1
}
