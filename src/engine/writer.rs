//! Write path of the reference engine.

use std::sync::Arc;

use log::debug;

use crate::data::{DataValue, Document};
use crate::engine::{
    SEGMENTS_FILE, SegmentsManifest, WRITE_LOCK_NAME, index_exists, read_committed,
    segment_file_name,
};
use crate::error::{Result, SorbusError};
use crate::lock::{TrackedLock, TrackingLockFactory};
use crate::storage::Storage;

/// Single writer over an index. Holds the write lock for its whole lifetime.
///
/// Mutations accumulate in memory; [`commit`](IndexWriter::commit) persists
/// the full document set as a new generation and prunes the superseded
/// segment, [`rollback`](IndexWriter::rollback) reloads the committed state.
#[derive(Debug)]
pub struct IndexWriter {
    storage: Arc<dyn Storage>,
    lock: TrackedLock,
    generation: u64,
    docs: Vec<Document>,
    dirty: bool,
}

impl IndexWriter {
    /// Open a writer, obtaining the write lock through `locks`.
    pub fn open(storage: Arc<dyn Storage>, locks: &TrackingLockFactory) -> Result<Self> {
        let lock = locks.obtain(storage.as_ref(), WRITE_LOCK_NAME)?;
        let (generation, docs) = read_committed(storage.as_ref())?;
        Ok(Self {
            storage,
            lock,
            generation,
            docs,
            dirty: false,
        })
    }

    /// Add a document.
    pub fn add_document(&mut self, doc: Document) {
        self.docs.push(doc);
        self.dirty = true;
    }

    /// Replace every document whose `field` equals `value` with `doc`
    /// (plain add when no document matches).
    pub fn update_document(&mut self, field: &str, value: &str, doc: Document) {
        self.delete_documents(field, value);
        self.add_document(doc);
    }

    /// Remove every document whose `field` equals `value`. Returns the number
    /// of documents removed.
    pub fn delete_documents(&mut self, field: &str, value: &str) -> usize {
        let before = self.docs.len();
        self.docs
            .retain(|d| d.get(field).and_then(DataValue::as_text) != Some(value));
        let removed = before - self.docs.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Persist the pending state as a new commit generation.
    ///
    /// A clean writer over an existing index is a no-op; a clean writer over
    /// a virgin store still commits once so the manifest exists.
    pub fn commit(&mut self) -> Result<u64> {
        if !self.dirty && index_exists(self.storage.as_ref())? {
            return Ok(self.generation);
        }

        let next = self.generation + 1;
        let segment = segment_file_name(next);

        let mut buf = Vec::new();
        for doc in &self.docs {
            serde_json::to_writer(&mut buf, doc)
                .map_err(|e| SorbusError::index(format!("failed to serialize document: {e}")))?;
            buf.push(b'\n');
        }
        self.storage.write_file(&segment, &buf)?;

        let manifest = SegmentsManifest {
            format: crate::engine::INDEX_FORMAT,
            generation: next,
            segment: Some(segment),
        };
        let manifest_bytes = serde_json::to_vec(&manifest)
            .map_err(|e| SorbusError::index(format!("failed to serialize manifest: {e}")))?;
        self.storage.write_file(SEGMENTS_FILE, &manifest_bytes)?;

        // the previous generation is fully superseded
        if self.generation > 0 {
            let old = segment_file_name(self.generation);
            if self.storage.file_exists(&old)? {
                self.storage.delete_file(&old)?;
            }
        }

        self.generation = next;
        self.dirty = false;
        debug!("committed generation {next} ({} docs)", self.docs.len());
        Ok(next)
    }

    /// Discard pending changes, reloading the committed state.
    pub fn rollback(&mut self) -> Result<()> {
        let (generation, docs) = read_committed(self.storage.as_ref())?;
        self.generation = generation;
        self.docs = docs;
        self.dirty = false;
        Ok(())
    }

    /// Number of documents in the pending (uncommitted) view.
    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    /// The committed generation this writer last wrote or loaded.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Close the writer, releasing the write lock.
    pub fn close(self) -> Result<()> {
        self.lock.release()
    }
}
