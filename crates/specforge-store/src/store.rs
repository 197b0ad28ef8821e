//! In-memory specification store with on-disk persistence (spec §4.E),
//! grounded on `spec_manager.py`'s `SpecManager`.

use std::collections::HashMap;

use camino::Utf8PathBuf;
use chrono::Utc;
use tracing::{info, warn};

use specforge_util::{read_json, write_file_atomic, write_json, Result, SpecforgeError};

use crate::markdown::{render_design, render_requirements, render_tasks};
use crate::model::{Phase, Specification, Task, TaskStatus};
use crate::numbering::{apply_rollup, renumber};
use crate::phase;
use crate::slug::derive_slug;

const SPEC_FILE: &str = "spec.json";
const REQUIREMENTS_FILE: &str = "requirements.md";
const DESIGN_FILE: &str = "design.md";
const TASKS_FILE: &str = "tasks.md";

/// Holds every specification under the base directory, hydrated at startup
/// and kept in sync with disk on every mutation.
pub struct SpecificationStore {
    base_dir: Utf8PathBuf,
    specs: HashMap<String, Specification>,
}

impl SpecificationStore {
    #[must_use]
    pub fn new(base_dir: Utf8PathBuf) -> Self {
        Self {
            base_dir,
            specs: HashMap::new(),
        }
    }

    /// Scan the base directory; for each subdirectory containing a valid
    /// `spec.json`, hydrate it and ensure the three markdown companions
    /// exist (created from current state if missing, never overwritten).
    pub fn load_all(&mut self) -> Result<()> {
        specforge_util::paths::ensure_dir_all(self.base_dir.as_std_path())?;

        let entries = std::fs::read_dir(self.base_dir.as_std_path())?;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir = match Utf8PathBuf::from_path_buf(entry.path()) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let spec_path = dir.join(SPEC_FILE);
            if !spec_path.is_file() {
                continue;
            }
            match read_json::<Specification>(&spec_path) {
                Ok(Some(spec)) => {
                    self.ensure_markdown_companions(&spec)?;
                    self.specs.insert(spec.slug.clone(), spec);
                }
                Ok(None) => warn!(?spec_path, "quarantined corrupt spec.json during load"),
                Err(e) => warn!(?spec_path, error = %e, "failed to load specification"),
            }
        }
        info!(count = self.specs.len(), "loaded specifications");
        Ok(())
    }

    /// Directory holding a specification's four on-disk files.
    #[must_use]
    pub fn spec_dir(&self, slug: &str) -> Utf8PathBuf {
        self.base_dir.join(slug)
    }

    fn ensure_markdown_companions(&self, spec: &Specification) -> Result<()> {
        let dir = self.spec_dir(&spec.slug);
        let req_path = dir.join(REQUIREMENTS_FILE);
        let design_path = dir.join(DESIGN_FILE);
        let tasks_path = dir.join(TASKS_FILE);

        if !req_path.is_file() {
            write_file_atomic(&req_path, &render_requirements(spec))?;
        }
        if !design_path.is_file() {
            write_file_atomic(&design_path, &render_design(spec))?;
        }
        if !tasks_path.is_file() {
            write_file_atomic(&tasks_path, &render_tasks(spec))?;
        }
        Ok(())
    }

    /// Persist `spec.json` plus a full regeneration of all three markdown
    /// companions. Markdown is never hand-edited round-tripped.
    fn persist(&self, spec: &Specification) -> Result<()> {
        let dir = self.spec_dir(&spec.slug);
        write_json(&dir.join(SPEC_FILE), spec)?;
        write_file_atomic(&dir.join(REQUIREMENTS_FILE), &render_requirements(spec))?;
        write_file_atomic(&dir.join(DESIGN_FILE), &render_design(spec))?;
        write_file_atomic(&dir.join(TASKS_FILE), &render_tasks(spec))?;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, slug: &str) -> Option<&Specification> {
        self.specs.get(slug)
    }

    #[must_use]
    pub fn all(&self) -> impl Iterator<Item = &Specification> {
        self.specs.values()
    }

    fn get_mut_or_not_found(&mut self, slug: &str) -> Result<&mut Specification> {
        self.specs.get_mut(slug).ok_or_else(|| SpecforgeError::SpecNotFound {
            spec_id: slug.to_string(),
        })
    }

    /// Create a new specification directory with its four files and
    /// register it in memory.
    pub fn create(&mut self, name: &str, description: Option<String>) -> Result<&Specification> {
        let slug = derive_slug(name);
        if slug.is_empty() {
            return Err(SpecforgeError::Validation {
                param: "name".to_string(),
                reason: "name does not produce a usable slug".to_string(),
            });
        }
        let now = Utc::now();
        let spec = Specification::new(slug.clone(), name.to_string(), description, now);
        self.persist(&spec)?;
        self.specs.insert(slug.clone(), spec);
        Ok(self.specs.get(&slug).expect("just inserted"))
    }

    pub fn add_user_story(
        &mut self,
        slug: &str,
        actor: &str,
        desire: &str,
        benefit: &str,
    ) -> Result<String> {
        let spec = self.get_mut_or_not_found(slug)?;
        let story_id = spec.next_story_id();
        spec.user_stories.push(crate::model::UserStory {
            id: story_id.clone(),
            actor: sanitize(actor),
            desire: sanitize(desire),
            benefit: sanitize(benefit),
            requirements: Vec::new(),
        });
        spec.updated_at = Utc::now();
        let spec_snapshot = spec.clone();
        self.persist(&spec_snapshot)?;
        Ok(story_id)
    }

    pub fn add_ears_requirement(
        &mut self,
        slug: &str,
        story_id: &str,
        condition: &str,
        system_response: &str,
    ) -> Result<String> {
        let spec = self.get_mut_or_not_found(slug)?;
        let req_id = {
            let story = spec
                .find_story_mut(story_id)
                .ok_or_else(|| SpecforgeError::StoryNotFound {
                    spec_id: slug.to_string(),
                    story_id: story_id.to_string(),
                })?;
            let req_id = Specification::next_requirement_id(story);
            story.requirements.push(crate::model::EarsRequirement {
                id: req_id.clone(),
                condition: sanitize(condition),
                system_response: sanitize(system_response),
            });
            req_id
        };
        spec.updated_at = Utc::now();
        let spec_snapshot = spec.clone();
        self.persist(&spec_snapshot)?;
        Ok(req_id)
    }

    pub fn add_task(
        &mut self,
        slug: &str,
        title: &str,
        description: &str,
        dependencies: Vec<String>,
    ) -> Result<String> {
        let spec = self.get_mut_or_not_found(slug)?;
        let task_id = spec.next_task_id();
        spec.tasks.push(Task {
            id: task_id.clone(),
            number: String::new(),
            title: sanitize(title),
            description: sanitize(description),
            status: TaskStatus::Pending,
            parent_id: None,
            subtasks: Vec::new(),
            dependencies,
            linked_requirement_ids: Vec::new(),
            estimated_hours: None,
            actual_hours: None,
        });
        renumber(&mut spec.tasks);
        spec.updated_at = Utc::now();
        let spec_snapshot = spec.clone();
        self.persist(&spec_snapshot)?;
        Ok(task_id)
    }

    /// Whether all of `task_ids` are currently `completed` within `spec`.
    #[must_use]
    pub fn dependencies_satisfied(spec: &Specification, task_ids: &[String]) -> bool {
        let flat = crate::numbering::flatten(&spec.tasks);
        task_ids.iter().all(|dep_id| {
            flat.iter()
                .any(|t| &t.id == dep_id && t.status == TaskStatus::Completed)
        })
    }

    pub fn set_task_status(&mut self, slug: &str, task_number: &str, status: TaskStatus) -> Result<()> {
        let spec = self.get_mut_or_not_found(slug)?;
        {
            let task = Specification::find_task_by_number_mut(&mut spec.tasks, task_number).ok_or_else(|| {
                SpecforgeError::TaskNotFound {
                    spec_id: slug.to_string(),
                    task_ref: task_number.to_string(),
                }
            })?;
            task.status = status;
        }
        apply_rollup(&mut spec.tasks);
        spec.updated_at = Utc::now();
        let spec_snapshot = spec.clone();
        self.persist(&spec_snapshot)?;
        Ok(())
    }

    /// Merge a partial design update into the existing `DesignDocument`:
    /// every field present in the call overwrites the stored field
    /// (last-writer-wins on overlapping keys); absent fields are untouched.
    pub fn update_design(
        &mut self,
        slug: &str,
        architecture: Option<String>,
        components: Option<Vec<String>>,
        data_model: Option<String>,
        sequence_diagrams: Option<Vec<String>>,
    ) -> Result<()> {
        let spec = self.get_mut_or_not_found(slug)?;
        if let Some(architecture) = architecture {
            spec.design.architecture = sanitize(&architecture);
        }
        if let Some(components) = components {
            spec.design.components = components.iter().map(|c| sanitize(c)).collect();
        }
        if let Some(data_model) = data_model {
            spec.design.data_model = sanitize(&data_model);
        }
        if let Some(sequence_diagrams) = sequence_diagrams {
            spec.design.sequence_diagrams = sequence_diagrams.iter().map(|s| sanitize(s)).collect();
        }
        spec.updated_at = Utc::now();
        let spec_snapshot = spec.clone();
        self.persist(&spec_snapshot)?;
        Ok(())
    }

    pub fn transition_phase(&mut self, slug: &str, target: Phase) -> Result<()> {
        let spec = self.get_mut_or_not_found(slug)?;
        spec.phase = phase::transition(spec.phase, target)?;
        spec.updated_at = Utc::now();
        let spec_snapshot = spec.clone();
        self.persist(&spec_snapshot)?;
        Ok(())
    }

    pub fn generate_plan(&mut self, slug: &str) -> Result<()> {
        let spec = self.get_mut_or_not_found(slug)?;
        crate::plan::generate_implementation_plan(spec);
        spec.updated_at = Utc::now();
        let spec_snapshot = spec.clone();
        self.persist(&spec_snapshot)?;
        Ok(())
    }

    #[must_use]
    pub fn completion_stats(&self, slug: &str) -> Option<(usize, usize, usize, usize, f64)> {
        self.specs.get(slug).map(|s| crate::numbering::completion_stats(&s.tasks))
    }
}

/// Trim and normalize newlines on a free-text field (§4.L handler contract).
fn sanitize(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}
