//! Pluggable storage backends for index files.
//!
//! A [`Storage`] is a flat namespace of named files plus a named-lock
//! facility. The index engine and the context lifecycle code are written
//! against this trait only; [`FileStorage`] persists to a directory on disk,
//! [`MemoryStorage`] keeps everything in memory for tests and RAM-backed
//! contexts.

pub mod file;
pub mod memory;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// A handle on a named lock obtained from a [`Storage`].
///
/// Release is idempotent; a handle that was already released (for example by
/// forced recovery) ignores further release calls.
pub trait LockHandle: Send + Sync + fmt::Debug {
    /// The lock name this handle was obtained for.
    fn name(&self) -> &str;

    /// Release the lock.
    fn release(&self) -> Result<()>;
}

/// Flat file namespace with named locks.
pub trait Storage: Send + Sync + fmt::Debug {
    /// List all file names, sorted.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Check whether a file exists.
    fn file_exists(&self, name: &str) -> Result<bool>;

    /// Read the full content of a file.
    fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    /// Write a file, atomically replacing any previous content.
    fn write_file(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Delete a file. Fails if the file does not exist.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// Obtain the named lock, failing with `LockHeld` when it is already
    /// taken (by this store or, for file-backed stores, by another process).
    fn obtain_lock(&self, name: &str) -> Result<Arc<dyn LockHandle>>;

    /// The filesystem location of this store, if it is file-backed.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// Copy every file of `src` into `dst`, overwriting same-named files.
pub fn copy_storage(src: &dyn Storage, dst: &dyn Storage) -> Result<()> {
    for name in src.list_files()? {
        let data = src.read_file(&name)?;
        dst.write_file(&name, &data)?;
    }
    Ok(())
}
