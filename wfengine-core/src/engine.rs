//! Workflow engine - coordinates validation, instance lifecycle and
//! transitions over a repository.

use crate::definition::{Action, Definition};
use crate::error::CoreError;
use crate::instance::Instance;
use crate::repository::Repository;
use crate::transition;
use crate::validate::{validate, ValidationMode};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// The workflow engine.
///
/// Holds no state of its own beyond the injected repository, so one engine is
/// shared by every caller.
pub struct WorkflowEngine {
    repository: Arc<dyn Repository>,
    mode: ValidationMode,
}

impl WorkflowEngine {
    /// Creates an engine over the given repository with standard validation.
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self {
            repository,
            mode: ValidationMode::Standard,
        }
    }

    /// Sets the admission validation mode.
    pub fn with_validation_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Returns the admission validation mode.
    pub fn validation_mode(&self) -> ValidationMode {
        self.mode
    }

    /// Returns the underlying repository.
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    // =========================================================================
    // Definitions
    // =========================================================================

    /// Validates and admits a definition.
    pub fn create_definition(&self, definition: Definition) -> Result<Arc<Definition>, CoreError> {
        if let Err(e) = validate(&definition, self.repository.as_ref(), self.mode) {
            tracing::debug!("Rejected definition '{}': {}", definition.id, e);
            return Err(e);
        }

        let definition = self.repository.put_definition(definition)?;
        tracing::info!(
            "Admitted definition '{}' ({} states, {} actions)",
            definition.id,
            definition.states.len(),
            definition.actions.len()
        );
        Ok(definition)
    }

    /// Gets a definition.
    pub fn get_definition(&self, id: &str) -> Result<Arc<Definition>, CoreError> {
        self.repository
            .get_definition(id)
            .ok_or_else(|| CoreError::DefinitionNotFound {
                definition_id: id.to_string(),
            })
    }

    /// Lists all definitions ordered by id.
    pub fn list_definitions(&self) -> Vec<Arc<Definition>> {
        let mut definitions = self.repository.list_definitions();
        definitions.sort_by(|a, b| a.id.cmp(&b.id));
        definitions
    }

    // =========================================================================
    // Instances
    // =========================================================================

    /// Starts a new instance of a definition at its initial state.
    pub fn start_instance(&self, definition_id: &str) -> Result<Instance, CoreError> {
        let definition = self.get_definition(definition_id)?;
        let instance = Instance::start(&definition)?;
        self.repository.put_instance(instance.clone())?;

        tracing::info!(
            "Started instance {} of '{}' in state '{}'",
            instance.id,
            definition_id,
            instance.current_state
        );
        Ok(instance)
    }

    /// Gets an instance.
    pub fn get_instance(&self, instance_id: &Uuid) -> Result<Instance, CoreError> {
        self.repository
            .get_instance(instance_id)
            .ok_or(CoreError::InstanceNotFound {
                instance_id: *instance_id,
            })
    }

    /// Lists instances ordered by id, optionally filtered by definition and
    /// current state.
    pub fn list_instances(&self, definition_id: Option<&str>, state: Option<&str>) -> Vec<Instance> {
        let mut instances: Vec<_> = self
            .repository
            .list_instances()
            .into_iter()
            .filter(|i| definition_id.map_or(true, |d| i.definition_id == d))
            .filter(|i| state.map_or(true, |s| i.current_state == s))
            .collect();
        instances.sort_by_key(|i| i.id);
        instances
    }

    /// Executes an action on an instance.
    ///
    /// The whole check-and-apply runs under the instance's exclusive lock, so
    /// concurrent calls on one instance observe each other's results in order.
    pub fn execute_action(&self, instance_id: &Uuid, action_id: &str) -> Result<Instance, CoreError> {
        let repository = &self.repository;
        let result = repository.update_instance(instance_id, &mut |instance: &mut Instance| {
            let definition = repository.get_definition(&instance.definition_id).ok_or_else(|| {
                CoreError::DefinitionMissing {
                    instance_id: instance.id,
                    definition_id: instance.definition_id.clone(),
                }
            })?;
            transition::apply_action(&definition, instance, action_id, Utc::now())
        });

        match &result {
            Ok(instance) => {
                if let Some(item) = instance.last_transition() {
                    tracing::debug!(
                        "Instance {}: '{}' moved '{}' -> '{}'",
                        instance.id,
                        item.action_id,
                        item.from_state,
                        item.to_state
                    );
                }
            }
            Err(e @ CoreError::DefinitionMissing { .. }) | Err(e @ CoreError::Storage { .. }) => {
                tracing::error!("Instance {}: {}", instance_id, e);
            }
            Err(e) => {
                tracing::debug!("Instance {}: rejected '{}': {}", instance_id, action_id, e);
            }
        }

        result
    }

    /// Returns the actions that may fire on an instance right now.
    pub fn available_actions(&self, instance_id: &Uuid) -> Result<Vec<Action>, CoreError> {
        let instance = self.get_instance(instance_id)?;
        let definition = self
            .repository
            .get_definition(&instance.definition_id)
            .ok_or_else(|| CoreError::DefinitionMissing {
                instance_id: instance.id,
                definition_id: instance.definition_id.clone(),
            })?;

        Ok(transition::available_actions(&definition, &instance)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Returns the number of definitions.
    pub fn definition_count(&self) -> usize {
        self.repository.definition_count()
    }

    /// Returns the number of instances.
    pub fn instance_count(&self) -> usize {
        self.repository.instance_count()
    }
}
