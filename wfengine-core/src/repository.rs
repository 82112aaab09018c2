//! Repository abstraction for definitions and instances.

use crate::definition::Definition;
use crate::error::CoreError;
use crate::instance::Instance;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

/// Closure applied by [`Repository::update_instance`].
pub type InstanceUpdate<'a> = &'a mut dyn FnMut(&mut Instance) -> Result<(), CoreError>;

/// Key-value storage for definitions and instances.
///
/// Implementations must:
/// - make `put_definition` an atomic insert-if-absent
/// - serialize `update_instance` calls for the same instance id while letting
///   calls for different ids proceed independently
/// - never expose a partially applied update to readers
pub trait Repository: Send + Sync {
    /// Gets a definition by id.
    fn get_definition(&self, id: &str) -> Option<Arc<Definition>>;

    /// Returns true if a definition with this id exists.
    fn contains_definition(&self, id: &str) -> bool;

    /// Admits a definition. Fails with `DuplicateDefinitionId` if the id is
    /// already taken.
    fn put_definition(&self, definition: Definition) -> Result<Arc<Definition>, CoreError>;

    /// Returns all definitions, in no particular order.
    fn list_definitions(&self) -> Vec<Arc<Definition>>;

    /// Gets a copy of an instance.
    fn get_instance(&self, id: &Uuid) -> Option<Instance>;

    /// Stores an instance under its id.
    fn put_instance(&self, instance: Instance) -> Result<(), CoreError>;

    /// Read-modify-write of one instance under its exclusive lock.
    ///
    /// `apply` works on a copy; the copy replaces the stored instance only if
    /// `apply` returns `Ok`. Returns the committed instance.
    fn update_instance(&self, id: &Uuid, apply: InstanceUpdate<'_>) -> Result<Instance, CoreError>;

    /// Returns copies of all instances, in no particular order.
    fn list_instances(&self) -> Vec<Instance>;

    /// Number of stored definitions.
    fn definition_count(&self) -> usize;

    /// Number of stored instances.
    fn instance_count(&self) -> usize;
}

/// In-memory repository.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    definitions: DashMap<String, Arc<Definition>>,
    instances: DashMap<Uuid, RwLock<Instance>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for MemoryRepository {
    fn get_definition(&self, id: &str) -> Option<Arc<Definition>> {
        self.definitions.get(id).map(|r| r.clone())
    }

    fn contains_definition(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    fn put_definition(&self, definition: Definition) -> Result<Arc<Definition>, CoreError> {
        match self.definitions.entry(definition.id.clone()) {
            Entry::Occupied(_) => Err(CoreError::DuplicateDefinitionId {
                definition_id: definition.id,
            }),
            Entry::Vacant(slot) => {
                let definition = Arc::new(definition);
                slot.insert(definition.clone());
                Ok(definition)
            }
        }
    }

    fn list_definitions(&self) -> Vec<Arc<Definition>> {
        self.definitions.iter().map(|r| r.value().clone()).collect()
    }

    fn get_instance(&self, id: &Uuid) -> Option<Instance> {
        self.instances.get(id).map(|r| r.read().clone())
    }

    fn put_instance(&self, instance: Instance) -> Result<(), CoreError> {
        match self.instances.entry(instance.id) {
            Entry::Occupied(slot) => *slot.get().write() = instance,
            Entry::Vacant(slot) => {
                slot.insert(RwLock::new(instance));
            }
        }
        Ok(())
    }

    fn update_instance(&self, id: &Uuid, apply: InstanceUpdate<'_>) -> Result<Instance, CoreError> {
        let instance_lock = self
            .instances
            .get(id)
            .ok_or(CoreError::InstanceNotFound { instance_id: *id })?;

        let mut instance = instance_lock.write();
        let mut working = instance.clone();
        apply(&mut working)?;
        *instance = working.clone();

        Ok(working)
    }

    fn list_instances(&self) -> Vec<Instance> {
        self.instances.iter().map(|r| r.value().read().clone()).collect()
    }

    fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    fn instance_count(&self) -> usize {
        self.instances.len()
    }
}
