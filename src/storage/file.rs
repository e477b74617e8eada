//! File-backed storage: a flat directory of index files with advisory
//! filesystem locks.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashSet;
use fs2::FileExt;
use parking_lot::Mutex;

use crate::error::{Result, SorbusError};
use crate::storage::{LockHandle, Storage};

/// Storage over a single directory on disk.
///
/// Writes go through a temporary file renamed into place, so a file is never
/// observable half-written. Locks are advisory OS locks (`flock`-style) on a
/// lock file of the given name; a held-name table additionally rejects
/// re-obtaining a lock through the same store instance, since OS lock
/// semantics for that case differ between platforms.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    held_locks: Arc<Mutex<AHashSet<String>>>,
}

impl FileStorage {
    /// Open storage over `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            held_locks: Arc::new(Mutex::new(AHashSet::new())),
        })
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Storage for FileStorage {
    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        Ok(self.file_path(name).is_file())
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.file_path(name))?)
    }

    fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        let tmp = self.file_path(&format!("{name}.tmp"));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, self.file_path(name))?;
        Ok(())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        fs::remove_file(self.file_path(name))?;
        Ok(())
    }

    fn obtain_lock(&self, name: &str) -> Result<Arc<dyn LockHandle>> {
        let mut held = self.held_locks.lock();
        if held.contains(name) {
            return Err(SorbusError::lock_held(format!(
                "{name} is already held by this store"
            )));
        }

        let path = self.file_path(name);
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        if let Err(e) = file.try_lock_exclusive() {
            return Err(SorbusError::lock_held(format!(
                "{} is held by another process: {e}",
                path.display()
            )));
        }

        held.insert(name.to_string());
        Ok(Arc::new(FileLock {
            name: name.to_string(),
            file: Mutex::new(Some(file)),
            held: Arc::clone(&self.held_locks),
            released: AtomicBool::new(false),
        }))
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.dir)
    }
}

#[derive(Debug)]
struct FileLock {
    name: String,
    file: Mutex<Option<File>>,
    held: Arc<Mutex<AHashSet<String>>>,
    released: AtomicBool,
}

impl LockHandle for FileLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&self) -> Result<()> {
        if !self.released.swap(true, Ordering::SeqCst) {
            if let Some(file) = self.file.lock().take() {
                let _ = FileExt::unlock(&file);
            }
            self.held.lock().remove(&self.name);
        }
        Ok(())
    }
}
