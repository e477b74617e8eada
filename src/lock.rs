//! Write-lock tracking for forced release during crash recovery.
//!
//! The engine's own unlock path is unavailable once a writer has leaked its
//! lock (a crashed operation inside this process, for example). The
//! [`TrackingLockFactory`] records every handle it emits per lock name so the
//! recovery path can close them without cooperation from the holder.

use std::sync::{Arc, Weak};

use ahash::AHashMap;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::Result;
use crate::storage::{LockHandle, Storage};

/// Obtains named locks from a [`Storage`] and tracks the emitted handles.
#[derive(Debug, Default)]
pub struct TrackingLockFactory {
    emitted: Mutex<AHashMap<String, Vec<Weak<dyn LockHandle>>>>,
}

impl TrackingLockFactory {
    /// Create a new factory with no emitted locks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain the named lock from `storage`, recording the handle for
    /// possible forced release.
    pub fn obtain(&self, storage: &dyn Storage, name: &str) -> Result<TrackedLock> {
        let handle = storage.obtain_lock(name)?;
        let mut emitted = self.emitted.lock();
        let handles = emitted.entry(name.to_string()).or_default();
        handles.retain(|w| w.strong_count() > 0);
        handles.push(Arc::downgrade(&handle));
        Ok(TrackedLock { handle })
    }

    /// Number of emitted handles still alive for `name`.
    pub fn tracked(&self, name: &str) -> usize {
        self.emitted
            .lock()
            .get(name)
            .map(|handles| handles.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Release every live handle emitted for `name`.
    pub fn force_release(&self, name: &str) -> Result<()> {
        let handles = self.emitted.lock().remove(name).unwrap_or_default();
        for weak in handles {
            if let Some(handle) = weak.upgrade() {
                warn!("forcibly releasing emitted lock '{name}'");
                handle.release()?;
            }
        }
        Ok(())
    }
}

/// A lock obtained through a [`TrackingLockFactory`]. Released on drop.
#[derive(Debug)]
pub struct TrackedLock {
    handle: Arc<dyn LockHandle>,
}

impl TrackedLock {
    /// The lock name.
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Release the lock now. Idempotent; dropping afterwards is a no-op.
    pub fn release(&self) -> Result<()> {
        self.handle.release()
    }
}

impl Drop for TrackedLock {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release() {
            debug!("releasing lock '{}' on drop failed: {e}", self.handle.name());
        }
    }
}
