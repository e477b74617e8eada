//! In-memory storage backend, primarily for tests and RAM-backed contexts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::{AHashMap, AHashSet};
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, SorbusError};
use crate::storage::{LockHandle, Storage};

/// Storage keeping every file in a process-local map.
///
/// Locks are tracked in a held-name table; obtaining a lock that is already
/// held fails with `LockHeld`, mirroring the single-writer discipline of the
/// file-backed store.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<AHashMap<String, Vec<u8>>>,
    held_locks: Arc<Mutex<AHashSet<String>>>,
}

impl MemoryStorage {
    /// Create a new empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn list_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        Ok(self.files.read().contains_key(name))
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        self.files.read().get(name).cloned().ok_or_else(|| {
            SorbusError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {name}"),
            ))
        })
    }

    fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        self.files.write().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        match self.files.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(SorbusError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {name}"),
            ))),
        }
    }

    fn obtain_lock(&self, name: &str) -> Result<Arc<dyn LockHandle>> {
        let mut held = self.held_locks.lock();
        if held.contains(name) {
            return Err(SorbusError::lock_held(format!(
                "{name} is already held by this store"
            )));
        }
        held.insert(name.to_string());
        Ok(Arc::new(MemoryLock {
            name: name.to_string(),
            held: Arc::clone(&self.held_locks),
            released: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
struct MemoryLock {
    name: String,
    held: Arc<Mutex<AHashSet<String>>>,
    released: AtomicBool,
}

impl LockHandle for MemoryLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&self) -> Result<()> {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.held.lock().remove(&self.name);
        }
        Ok(())
    }
}
