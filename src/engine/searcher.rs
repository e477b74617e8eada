//! Read path of the reference engine: immutable snapshots and the pooled,
//! reference-counted lease mechanism over them.

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::data::{DataValue, Document};
use crate::engine::read_committed;
use crate::error::{Result, SorbusError};
use crate::storage::Storage;

/// An immutable view over the committed documents of an index.
#[derive(Debug)]
pub struct IndexSnapshot {
    generation: u64,
    docs: Vec<Document>,
}

impl IndexSnapshot {
    /// Open a snapshot of the committed state of `storage`.
    pub fn open(storage: &dyn Storage) -> Result<Self> {
        let (generation, docs) = read_committed(storage)?;
        Ok(Self { generation, docs })
    }

    /// The commit generation this snapshot was taken at.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of documents in this snapshot.
    pub fn live_doc_count(&self) -> usize {
        self.docs.len()
    }

    /// All documents, in insertion order.
    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    /// Fetch a document by its position in the snapshot.
    pub fn doc(&self, n: usize) -> Option<&Document> {
        self.docs.get(n)
    }

    /// Exact-term search: documents whose `field` equals `value`, insertion
    /// ranked, at most `limit` hits.
    pub fn search(&self, field: &str, value: &str, limit: usize) -> Vec<&Document> {
        self.docs
            .iter()
            .filter(|d| d.get(field).and_then(DataValue::as_text) == Some(value))
            .take(limit)
            .collect()
    }

    /// Number of documents whose `field` equals `value`.
    pub fn count(&self, field: &str, value: &str) -> usize {
        self.docs
            .iter()
            .filter(|d| d.get(field).and_then(DataValue::as_text) == Some(value))
            .count()
    }
}

/// Hands out reference-counted leases over the committed state.
///
/// The pool caches one snapshot and reloads it only after a commit marked it
/// stale, so the refresh cost is amortized across acquisitions. Leases on an
/// older snapshot stay valid while newer ones are handed out; a refresh never
/// blocks existing readers.
#[derive(Debug)]
pub struct SearcherPool {
    storage: Arc<dyn Storage>,
    cached: RwLock<Option<Arc<IndexSnapshot>>>,
    stale: AtomicBool,
    closed: AtomicBool,
}

impl SearcherPool {
    /// Create a pool over `storage` with no cached snapshot.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            cached: RwLock::new(None),
            stale: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Lease the current committed snapshot, refreshing first if a commit
    /// invalidated the cached one. The lease is released when dropped.
    pub fn acquire(&self) -> Result<LeasedSearcher> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SorbusError::index("searcher pool is closed"));
        }

        if !self.stale.load(Ordering::SeqCst) {
            if let Some(snapshot) = self.cached.read().as_ref() {
                return Ok(LeasedSearcher {
                    snapshot: Arc::clone(snapshot),
                });
            }
        }

        let mut cached = self.cached.write();
        // another thread may have refreshed while we waited for the lock
        if self.stale.swap(false, Ordering::SeqCst) || cached.is_none() {
            let snapshot = Arc::new(IndexSnapshot::open(self.storage.as_ref())?);
            *cached = Some(snapshot);
        }
        let snapshot = cached.as_ref().map(Arc::clone).ok_or_else(|| {
            SorbusError::index("searcher pool has no snapshot")
        })?;
        Ok(LeasedSearcher { snapshot })
    }

    /// Mark the cached snapshot stale; the next acquire reloads.
    pub fn invalidate(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    /// Drop the cached snapshot and refuse further acquisitions until
    /// [`reset`](SearcherPool::reset).
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        *self.cached.write() = None;
    }

    /// Reopen a closed pool with an empty cache.
    pub fn reset(&self) {
        *self.cached.write() = None;
        self.stale.store(false, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);
    }

    /// Whether the pool is closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A reference-counted lease on an [`IndexSnapshot`].
///
/// Dereferences to the snapshot; dropping the lease releases it, on every
/// exit path.
#[derive(Debug)]
pub struct LeasedSearcher {
    snapshot: Arc<IndexSnapshot>,
}

impl LeasedSearcher {
    /// The underlying shared snapshot.
    pub fn snapshot(&self) -> &Arc<IndexSnapshot> {
        &self.snapshot
    }
}

impl Deref for LeasedSearcher {
    type Target = IndexSnapshot;

    fn deref(&self) -> &IndexSnapshot {
        &self.snapshot
    }
}
