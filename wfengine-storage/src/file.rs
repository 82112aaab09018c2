//! File-backed repository.
//!
//! Layout under the data directory:
//!
//! ```text
//! definitions/def-<crc32c(id)>-<hex(id), truncated>[-<n>].json
//! instances/<instance uuid>.json
//! ```
//!
//! Definition filenames are only a storage key; the record carries the full
//! id. `-<n>` is appended when two ids map to the same name.
//!
//! Everything is loaded into memory on open. Writes go to disk first and are
//! only made visible in memory once the file is in place.

use crate::error::StorageError;
use crate::record::{read_record, write_record, RECORD_EXT, TEMP_EXT};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;
use wfengine_core::repository::InstanceUpdate;
use wfengine_core::{CoreError, Definition, Instance, MemoryRepository, Repository};

/// Hex characters of the id kept in a definition filename.
const DEFINITION_NAME_HEX: usize = 64;

/// Repository that persists definitions and instances as record files.
pub struct FileRepository {
    dir: PathBuf,
    memory: MemoryRepository,
    /// Serializes definition admission across the file write.
    admission: Mutex<()>,
}

impl FileRepository {
    /// Opens or creates a repository at the given directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join("definitions"))?;
        fs::create_dir_all(dir.join("instances"))?;

        let repo = Self {
            dir,
            memory: MemoryRepository::new(),
            admission: Mutex::new(()),
        };
        repo.load()?;

        Ok(repo)
    }

    /// Returns the data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load(&self) -> Result<(), StorageError> {
        for path in record_files(&self.dir.join("definitions"))? {
            let definition: Definition = read_record(&path)?;
            self.memory.put_definition(definition).map_err(|e| {
                StorageError::Corruption(format!("{}: {}", path.display(), e))
            })?;
        }

        for path in record_files(&self.dir.join("instances"))? {
            let instance: Instance = read_record(&path)?;
            self.memory
                .put_instance(instance)
                .map_err(|e| StorageError::Corruption(e.to_string()))?;
        }

        let definitions = self.memory.definition_count();
        let instances = self.memory.instance_count();
        if definitions > 0 || instances > 0 {
            tracing::info!(
                "Loaded {} definitions and {} instances from {}",
                definitions,
                instances,
                self.dir.display()
            );
        }

        Ok(())
    }

    /// Returns an unused path for a new definition record.
    fn new_definition_path(&self, id: &str) -> PathBuf {
        let dir = self.dir.join("definitions");
        let stem = definition_file_stem(id);

        let mut path = dir.join(format!("{}.{}", stem, RECORD_EXT));
        let mut n = 1;
        while path.exists() {
            path = dir.join(format!("{}-{}.{}", stem, n, RECORD_EXT));
            n += 1;
        }
        path
    }

    fn instance_path(&self, id: &Uuid) -> PathBuf {
        self.dir
            .join("instances")
            .join(format!("{}.{}", id, RECORD_EXT))
    }
}

/// Filename stem for a definition id: bounded in length and never empty.
fn definition_file_stem(id: &str) -> String {
    let mut encoded = hex::encode(id);
    encoded.truncate(DEFINITION_NAME_HEX);
    format!("def-{:08x}-{}", crc32c::crc32c(id.as_bytes()), encoded)
}

/// Lists complete record files in `dir`, removing leftover temp files.
fn record_files(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some(RECORD_EXT) => files.push(path),
            Some(TEMP_EXT) => {
                tracing::warn!("Removing incomplete record {}", path.display());
                fs::remove_file(&path)?;
            }
            _ => {}
        }
    }
    files.sort();
    Ok(files)
}

impl Repository for FileRepository {
    fn get_definition(&self, id: &str) -> Option<Arc<Definition>> {
        self.memory.get_definition(id)
    }

    fn contains_definition(&self, id: &str) -> bool {
        self.memory.contains_definition(id)
    }

    fn put_definition(&self, definition: Definition) -> Result<Arc<Definition>, CoreError> {
        let _guard = self.admission.lock();

        if self.memory.contains_definition(&definition.id) {
            return Err(CoreError::DuplicateDefinitionId {
                definition_id: definition.id,
            });
        }

        write_record(&self.new_definition_path(&definition.id), &definition)?;
        self.memory.put_definition(definition)
    }

    fn list_definitions(&self) -> Vec<Arc<Definition>> {
        self.memory.list_definitions()
    }

    fn get_instance(&self, id: &Uuid) -> Option<Instance> {
        self.memory.get_instance(id)
    }

    fn put_instance(&self, instance: Instance) -> Result<(), CoreError> {
        write_record(&self.instance_path(&instance.id), &instance)?;
        self.memory.put_instance(instance)
    }

    fn update_instance(&self, id: &Uuid, apply: InstanceUpdate<'_>) -> Result<Instance, CoreError> {
        let path = self.instance_path(id);
        // The file is written while the instance lock is held, before the
        // in-memory copy is replaced.
        self.memory.update_instance(id, &mut |instance: &mut Instance| {
            apply(instance)?;
            write_record(&path, &*instance)?;
            Ok(())
        })
    }

    fn list_instances(&self) -> Vec<Instance> {
        self.memory.list_instances()
    }

    fn definition_count(&self) -> usize {
        self.memory.definition_count()
    }

    fn instance_count(&self) -> usize {
        self.memory.instance_count()
    }
}
