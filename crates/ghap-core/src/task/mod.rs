//! Task entity operations: `create_task`/`transition_task`, consulting the
//! phase machine (§4.I) before every phase write so an invalid transition
//! never reaches the metadata store.

pub mod phase;

use crate::error::Error;
use crate::metadata::{MetadataStore, Task};

pub struct TaskService {
    metadata: MetadataStore,
}

impl TaskService {
    pub fn new(metadata: MetadataStore) -> Self {
        Self { metadata }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_task(
        &self,
        id: &str,
        title: &str,
        task_type: &str,
        spec_id: Option<&str>,
        specialist: Option<&str>,
        notes: Option<&str>,
        blocked_by: &[String],
        project_path: Option<&str>,
    ) -> Result<Task, Error> {
        crate::enums::validate_task_type(task_type)?;
        let initial = phase::initial_phase(task_type)?;
        self.metadata
            .create_task(id, title, task_type, initial, spec_id, specialist, notes, blocked_by, project_path)
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>, Error> {
        self.metadata.get_task(id)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>, Error> {
        self.metadata.list_tasks()
    }

    /// Validates the transition against the phase machine before writing;
    /// an invalid attempt leaves no observable state change (§8 property 5).
    pub fn transition_task(&self, id: &str, to: &str) -> Result<Task, Error> {
        let task = self
            .metadata
            .get_task(id)?
            .ok_or_else(|| Error::NotFound(format!("task '{id}' not found")))?;
        if !phase::is_valid_transition(&task.task_type, &task.phase, to)? {
            return Err(Error::Validation(format!(
                "invalid phase transition '{}' for task_type '{}'",
                phase::transition_name(&task.phase, to),
                task.task_type
            )));
        }
        self.metadata.update_task_phase(id, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_task_starts_at_the_initial_phase() {
        let svc = TaskService::new(MetadataStore::in_memory().unwrap());
        let task = svc
            .create_task("SPEC-001", "Test", "feature", None, None, None, &[], None)
            .unwrap();
        assert_eq!(task.phase, "SPEC");
    }

    #[test]
    fn valid_transition_updates_phase() {
        let svc = TaskService::new(MetadataStore::in_memory().unwrap());
        svc.create_task("SPEC-001", "Test", "feature", None, None, None, &[], None)
            .unwrap();
        let task = svc.transition_task("SPEC-001", "DESIGN").unwrap();
        assert_eq!(task.phase, "DESIGN");
    }

    #[test]
    fn skipping_a_phase_is_rejected_with_no_state_change() {
        let svc = TaskService::new(MetadataStore::in_memory().unwrap());
        svc.create_task("SPEC-001", "Test", "feature", None, None, None, &[], None)
            .unwrap();
        let err = svc.transition_task("SPEC-001", "IMPLEMENT").unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        let task = svc.get_task("SPEC-001").unwrap().unwrap();
        assert_eq!(task.phase, "SPEC");
    }
}
