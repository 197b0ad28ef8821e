//! Markdown rendering for a specification's three companion files (spec §4.E).
//! Always regenerated in full from the model; never hand-edited round-tripped.

use crate::model::{Specification, Task, TaskStatus};
use crate::numbering::completion_stats;

#[must_use]
pub fn render_requirements(spec: &Specification) -> String {
    let mut out = format!("# Requirements: {}\n\n", spec.name);
    if spec.user_stories.is_empty() {
        out.push_str("_No user stories yet._\n");
        return out;
    }
    for story in &spec.user_stories {
        out.push_str(&format!(
            "## {} — As a {}, I want {}, so that {}\n\n",
            story.id, story.actor, story.desire, story.benefit
        ));
        for req in &story.requirements {
            out.push_str(&format!("- **{}**: {}\n", req.id, req.render()));
        }
        out.push('\n');
    }
    out
}

#[must_use]
pub fn render_design(spec: &Specification) -> String {
    let d = &spec.design;
    let mut out = format!("# Design: {}\n\n", spec.name);

    out.push_str("## Architecture\n\n");
    if d.architecture.trim().is_empty() {
        out.push_str("_Not yet documented._\n\n");
    } else {
        out.push_str(d.architecture.trim());
        out.push_str("\n\n");
    }

    out.push_str("## Components\n\n");
    if d.components.is_empty() {
        out.push_str("_None yet._\n\n");
    } else {
        for component in &d.components {
            out.push_str(&format!("- {component}\n"));
        }
        out.push('\n');
    }

    out.push_str("## Data Model\n\n");
    if d.data_model.trim().is_empty() {
        out.push_str("_Not yet documented._\n\n");
    } else {
        out.push_str(d.data_model.trim());
        out.push_str("\n\n");
    }

    out.push_str("## Sequence Diagrams\n\n");
    if d.sequence_diagrams.is_empty() {
        out.push_str("_None yet._\n");
    } else {
        for (i, diagram) in d.sequence_diagrams.iter().enumerate() {
            out.push_str(&format!("### Diagram {}\n\n```\n{}\n```\n\n", i + 1, diagram));
        }
    }

    out
}

#[must_use]
pub fn render_tasks(spec: &Specification) -> String {
    let (total, completed, in_progress, pending, percent) = completion_stats(&spec.tasks);

    let mut out = format!(
        "# Tasks: {}\n\nProgress: {completed}/{total} completed, {in_progress} in progress, {pending} pending ({percent:.1}%)\n\n",
        spec.name
    );

    if spec.tasks.is_empty() {
        out.push_str("_No tasks yet._\n");
        return out;
    }

    for task in &spec.tasks {
        render_task_line(task, &mut out);
    }
    out
}

fn render_task_line(task: &Task, out: &mut String) {
    let depth = task.number.matches('.').count();
    let indent = "  ".repeat(depth);
    let checkbox = match task.status {
        TaskStatus::Pending => "[ ]",
        TaskStatus::InProgress => "[~]",
        TaskStatus::Completed => "[x]",
    };
    out.push_str(&format!("{indent}- {checkbox} {} {}\n", task.number, task.title));
    for subtask in &task.subtasks {
        render_task_line(subtask, out);
    }
}
