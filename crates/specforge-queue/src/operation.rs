//! Operation type, status machine, and parameter normalization (spec §4.F, §6).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use specforge_util::{ErrorCategory, Result, SpecforgeError};

/// The closed set of operation types the processor understands (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    CreateSpec,
    SetCurrentSpec,
    UpdateRequirements,
    UpdateDesign,
    UpdateTasks,
    AddUserStory,
    AddRequirement,
    AddTask,
    CheckTask,
    UncheckTask,
    BulkCheckTasks,
    ExecuteTask,
    TransitionPhase,
    GenerateImplementationPlan,
    UpdateImplementationPlan,
    Heartbeat,
    SyncStatus,
}

impl OperationType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateSpec => "create_spec",
            Self::SetCurrentSpec => "set_current_spec",
            Self::UpdateRequirements => "update_requirements",
            Self::UpdateDesign => "update_design",
            Self::UpdateTasks => "update_tasks",
            Self::AddUserStory => "add_user_story",
            Self::AddRequirement => "add_requirement",
            Self::AddTask => "add_task",
            Self::CheckTask => "check_task",
            Self::UncheckTask => "uncheck_task",
            Self::BulkCheckTasks => "bulk_check_tasks",
            Self::ExecuteTask => "execute_task",
            Self::TransitionPhase => "transition_phase",
            Self::GenerateImplementationPlan => "generate_implementation_plan",
            Self::UpdateImplementationPlan => "update_implementation_plan",
            Self::Heartbeat => "heartbeat",
            Self::SyncStatus => "sync_status",
        }
    }

    /// Whether two operations of these types, against the same specification,
    /// touch disjoint artifact sets and may therefore share a batch (§4.G).
    #[must_use]
    pub fn batch_compatible_with(&self, other: &Self) -> bool {
        if self == other {
            return true;
        }
        const DISJOINT_ARTIFACT_GROUP: &[OperationType] = &[
            OperationType::UpdateRequirements,
            OperationType::UpdateDesign,
            OperationType::UpdateTasks,
        ];
        DISJOINT_ARTIFACT_GROUP.contains(self) && DISJOINT_ARTIFACT_GROUP.contains(other)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = SpecforgeError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "create_spec" => Self::CreateSpec,
            "set_current_spec" => Self::SetCurrentSpec,
            "update_requirements" => Self::UpdateRequirements,
            "update_design" => Self::UpdateDesign,
            "update_tasks" => Self::UpdateTasks,
            "add_user_story" => Self::AddUserStory,
            "add_requirement" => Self::AddRequirement,
            "add_task" => Self::AddTask,
            "check_task" => Self::CheckTask,
            "uncheck_task" => Self::UncheckTask,
            "bulk_check_tasks" => Self::BulkCheckTasks,
            "execute_task" => Self::ExecuteTask,
            "transition_phase" => Self::TransitionPhase,
            "generate_implementation_plan" => Self::GenerateImplementationPlan,
            "update_implementation_plan" => Self::UpdateImplementationPlan,
            "heartbeat" => Self::Heartbeat,
            "sync_status" => Self::SyncStatus,
            other => return Err(SpecforgeError::UnknownOperation(other.to_string())),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    /// Legal status-machine edges (§4.F): no other transition is valid.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use OperationStatus::{Cancelled, Completed, Failed, InProgress, Pending};
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
                | (Pending, Cancelled)
                | (Failed, Pending)
        )
    }
}

/// A unit of work submitted by the client, persisted in the queue document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    pub status: OperationStatus,
    pub priority: i32,
    pub submitted_at: DateTime<Utc>,
    pub source: String,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result_ref: Option<String>,
    /// Backoff scheduling: the selector skips a pending operation whose
    /// `not_before` has not yet elapsed.
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
}

fn default_max_retries() -> u32 {
    3
}

impl Operation {
    /// Attempt a status transition, enforcing the §4.F machine.
    pub fn transition(&mut self, next: OperationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SpecforgeError::Validation {
                param: "status".to_string(),
                reason: format!("illegal transition {:?} -> {:?}", self.status, next),
            });
        }
        self.status = next;
        Ok(())
    }

    /// `(type, normalized_params)` — the signature used both for duplicate
    /// detection (§4.H) and idempotency short-circuiting (§4.I).
    #[must_use]
    pub fn signature(&self) -> (OperationType, String) {
        (self.operation_type, normalize_params(&self.params))
    }

    /// Whether this operation targets the same specification as another,
    /// where applicable. Operations without a `specId` param (heartbeat,
    /// sync_status) never collide with anything by specification.
    #[must_use]
    pub fn spec_id(&self) -> Option<&str> {
        self.params.get("specId").and_then(Value::as_str)
    }
}

/// Normalize a parameter map for comparison: trims whitespace on string
/// values, collapses all newline variants to `\n`, and strips non-alphanumeric
/// characters from slug-like fields (`specId`, `slug`, `storyId`, `taskId`).
#[must_use]
pub fn normalize_params(params: &Value) -> String {
    let normalized = normalize_value(params);
    serde_json::to_string(&normalized).unwrap_or_default()
}

const SLUG_LIKE_FIELDS: &[&str] = &["specId", "slug", "storyId", "taskId", "task_number"];

fn normalize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(normalize_text(s)),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            for key in keys {
                let v = &map[&key];
                let normalized = if SLUG_LIKE_FIELDS.contains(&key.as_str()) {
                    if let Value::String(s) = v {
                        Value::String(strip_non_alphanumeric(&normalize_text(s)))
                    } else {
                        normalize_value(v)
                    }
                } else {
                    normalize_value(v)
                };
                out.insert(key, normalized);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_value).collect()),
        other => other.clone(),
    }
}

fn normalize_text(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

fn strip_non_alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Map an error's category onto whether a handler failure should be retried.
#[must_use]
pub fn is_retryable_category(category: ErrorCategory) -> bool {
    matches!(category, ErrorCategory::Transient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_machine_allows_documented_edges() {
        assert!(OperationStatus::Pending.can_transition_to(OperationStatus::InProgress));
        assert!(OperationStatus::InProgress.can_transition_to(OperationStatus::Completed));
        assert!(OperationStatus::Failed.can_transition_to(OperationStatus::Pending));
        assert!(!OperationStatus::Completed.can_transition_to(OperationStatus::Pending));
        assert!(!OperationStatus::Cancelled.can_transition_to(OperationStatus::Pending));
    }

    #[test]
    fn transition_rejects_illegal_edge() {
        let mut op = sample_operation();
        op.status = OperationStatus::Completed;
        assert!(op.transition(OperationStatus::InProgress).is_err());
    }

    #[test]
    fn batch_compatibility_matches_disjoint_artifact_rule() {
        assert!(OperationType::UpdateRequirements.batch_compatible_with(&OperationType::UpdateDesign));
        assert!(!OperationType::AddUserStory.batch_compatible_with(&OperationType::UpdateRequirements));
        assert!(OperationType::CreateSpec.batch_compatible_with(&OperationType::CreateSpec));
    }

    #[test]
    fn normalize_params_trims_and_collapses_newlines() {
        let a = json!({"specId": " Todo-App! ", "content": "line1\r\nline2"});
        let b = json!({"specId": "TodoApp", "content": "line1\nline2"});
        assert_eq!(normalize_params(&a), normalize_params(&b));
    }

    #[test]
    fn normalize_params_is_key_order_independent() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(normalize_params(&a), normalize_params(&b));
    }

    fn sample_operation() -> Operation {
        Operation {
            id: "op-1".to_string(),
            operation_type: OperationType::CreateSpec,
            status: OperationStatus::Pending,
            priority: 0,
            submitted_at: Utc::now(),
            source: "test".to_string(),
            retry_count: 0,
            max_retries: 3,
            params: json!({}),
            error: None,
            result_ref: None,
            not_before: None,
        }
    }
}
