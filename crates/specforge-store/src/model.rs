//! The specification domain model (spec §3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecStatus {
    Draft,
    Active,
    Completed,
}

/// Workflow phase; legal transitions are enforced by [`crate::phase::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Requirements,
    Design,
    ImplementationPlanning,
    Execution,
    Review,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarsRequirement {
    pub id: String,
    pub condition: String,
    pub system_response: String,
}

impl EarsRequirement {
    /// Render as a single EARS sentence: `WHEN <condition> THE SYSTEM SHALL <response>`.
    #[must_use]
    pub fn render(&self) -> String {
        let condition = self.condition.trim();
        let response = self.system_response.trim();
        if condition.to_uppercase().starts_with("WHEN")
            || condition.to_uppercase().starts_with("WHILE")
            || condition.to_uppercase().starts_with("WHERE")
            || condition.to_uppercase().starts_with("IF")
        {
            format!("{condition} THE SYSTEM SHALL {response}")
        } else {
            format!("WHEN {condition} THE SYSTEM SHALL {response}")
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStory {
    pub id: String,
    pub actor: String,
    pub desire: String,
    pub benefit: String,
    #[serde(default)]
    pub requirements: Vec<EarsRequirement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Positional number, e.g. `2`, `2.1`, `3.2.1`; recomputed by
    /// [`crate::numbering::renumber`] after every structural change.
    #[serde(default)]
    pub number: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub subtasks: Vec<Task>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub linked_requirement_ids: Vec<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub actual_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesignDocument {
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub data_model: String,
    #[serde(default)]
    pub sequence_diagrams: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specification {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: SpecStatus,
    pub phase: Phase,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default)]
    pub user_stories: Vec<UserStory>,
    #[serde(default)]
    pub design: DesignDocument,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Specification {
    #[must_use]
    pub fn new(slug: String, name: String, description: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            slug,
            name,
            description,
            created_at: now,
            updated_at: now,
            status: SpecStatus::Draft,
            phase: Phase::Requirements,
            metadata: BTreeMap::new(),
            user_stories: Vec::new(),
            design: DesignDocument::default(),
            tasks: Vec::new(),
        }
    }

    #[must_use]
    pub fn next_story_id(&self) -> String {
        format!("US-{:03}", self.user_stories.len() + 1)
    }

    #[must_use]
    pub fn next_requirement_id(story: &UserStory) -> String {
        format!("{}-R{:02}", story.id, story.requirements.len() + 1)
    }

    #[must_use]
    pub fn next_task_id(&self) -> String {
        format!("T{:03}", crate::numbering::flatten(&self.tasks).len() + 1)
    }

    pub fn find_story_mut(&mut self, story_id: &str) -> Option<&mut UserStory> {
        self.user_stories.iter_mut().find(|s| s.id == story_id)
    }

    #[must_use]
    pub fn find_task_by_number(&self, number: &str) -> Option<&Task> {
        crate::numbering::flatten(&self.tasks)
            .into_iter()
            .find(|t| t.number == number)
    }

    #[must_use]
    pub fn find_task_by_id(&self, task_id: &str) -> Option<&Task> {
        crate::numbering::flatten(&self.tasks)
            .into_iter()
            .find(|t| t.id == task_id)
    }

    pub fn find_task_by_number_mut<'a>(tasks: &'a mut [Task], number: &str) -> Option<&'a mut Task> {
        for task in tasks {
            if task.number == number {
                return Some(task);
            }
            if let Some(found) = Self::find_task_by_number_mut(&mut task.subtasks, number) {
                return Some(found);
            }
        }
        None
    }
}
