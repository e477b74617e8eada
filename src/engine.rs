//! Reference index engine over a [`Storage`].
//!
//! The committed state of an index is one JSON-lines segment file named by a
//! `segments.json` manifest:
//!
//! ```text
//! segments.json          manifest: {format, generation, segment}
//! seg_0000000003.jsonl   one JSON document per line
//! write.lock             advisory write lock
//! ```
//!
//! Every commit writes the full document set as a new generation and swaps
//! the manifest, so a commit is always clean and "optimize" is simply a
//! commit. The lifecycle layer treats this engine as an external collaborator
//! and talks to it only through [`IndexWriter`], [`IndexSnapshot`] and
//! [`SearcherPool`].

pub mod searcher;
pub mod writer;

use serde::{Deserialize, Serialize};

use crate::data::Document;
use crate::error::{Result, SorbusError};
use crate::storage::Storage;

pub use searcher::{IndexSnapshot, LeasedSearcher, SearcherPool};
pub use writer::IndexWriter;

/// Name of the segments manifest file.
pub const SEGMENTS_FILE: &str = "segments.json";

/// Name of the write lock.
pub const WRITE_LOCK_NAME: &str = "write.lock";

/// Current manifest format.
pub const INDEX_FORMAT: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SegmentsManifest {
    pub format: u32,
    pub generation: u64,
    pub segment: Option<String>,
}

pub(crate) fn segment_file_name(generation: u64) -> String {
    format!("seg_{generation:010}.jsonl")
}

/// Whether `storage` holds a persisted index (a segments manifest).
pub fn index_exists(storage: &dyn Storage) -> Result<bool> {
    storage.file_exists(SEGMENTS_FILE)
}

pub(crate) fn read_manifest(storage: &dyn Storage) -> Result<Option<SegmentsManifest>> {
    if !storage.file_exists(SEGMENTS_FILE)? {
        return Ok(None);
    }
    let data = storage.read_file(SEGMENTS_FILE)?;
    let manifest: SegmentsManifest = serde_json::from_slice(&data)
        .map_err(|e| SorbusError::index(format!("failed to deserialize manifest: {e}")))?;
    if manifest.format > INDEX_FORMAT {
        return Err(SorbusError::index(format!(
            "unsupported index format {} (supported up to {INDEX_FORMAT})",
            manifest.format
        )));
    }
    Ok(Some(manifest))
}

/// Read the committed generation and document set, `(0, [])` for a store
/// without an index.
pub(crate) fn read_committed(storage: &dyn Storage) -> Result<(u64, Vec<Document>)> {
    let Some(manifest) = read_manifest(storage)? else {
        return Ok((0, Vec::new()));
    };
    let mut docs = Vec::new();
    if let Some(segment) = &manifest.segment {
        let data = storage.read_file(segment)?;
        for line in data.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            let doc: Document = serde_json::from_slice(line)
                .map_err(|e| SorbusError::index(format!("failed to deserialize document: {e}")))?;
            docs.push(doc);
        }
    }
    Ok((manifest.generation, docs))
}
