//! Index context lifecycle: open/recover/create, descriptor identity,
//! incremental merge, whole-content replace, purge, and group-set
//! maintenance.
//!
//! An [`IndexingContext`] owns one persistent index that mirrors the contents
//! of a component repository. Construction runs the full open/recover/create
//! procedure and either yields an open context or fails; afterwards callers
//! drive merge/replace/purge/commit. Structural mutations are serialized on
//! an internal mutex, while the read path hands out reference-counted
//! snapshot leases that are never blocked by writers beyond the brief
//! refresh.

pub mod config;

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::data::{DataValue, Document};
use crate::engine::{
    IndexSnapshot, IndexWriter, LeasedSearcher, SearcherPool, WRITE_LOCK_NAME, index_exists,
};
use crate::error::{Result, SorbusError};
use crate::lock::TrackingLockFactory;
use crate::schema::{FLD_DELETED, FLD_UINFO, SchemaRegistry};
use crate::storage::{self, FileStorage, MemoryStorage, Storage};
use crate::timestamp;

pub use config::ContextConfig;

/// Field marking the descriptor document.
pub const FLD_DESCRIPTOR: &str = "descriptor";

/// Value of the descriptor field; the descriptor's exact search key.
pub const DESCRIPTOR_CONTENTS: &str = "sorbus.index";

/// Descriptor field holding the index format version.
pub const FLD_FORMAT_VERSION: &str = "format_version";

/// Descriptor field holding the owning repository id.
pub const FLD_REPOSITORY_ID: &str = "repository_id";

/// Format version written into fresh descriptors.
pub const FORMAT_VERSION: &str = "1.0";

/// Packer state file; survives a non-full wipe.
pub const INDEX_PACKER_PROPERTIES_FILE: &str = "sorbus-index-packer.properties";

/// Updater state file; survives a non-full wipe.
pub const INDEX_UPDATER_PROPERTIES_FILE: &str = "sorbus-index-updater.properties";

/// A standard location for indices served up by a webserver.
pub const INDEX_DIRECTORY: &str = ".index";

/// The namespace summary pair derived from the document set.
///
/// Always replaced as a whole, never mutated in place, so concurrent readers
/// cannot observe one side updated without the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSets {
    /// Every namespace id present in the index.
    pub all_groups: HashSet<String>,
    /// Top-level namespace segments.
    pub root_groups: HashSet<String>,
}

/// Predicate over source documents, applied during merge only.
pub trait DocumentFilter: Send + Sync {
    /// Whether `doc` should be merged.
    fn accept(&self, doc: &Document) -> bool;
}

impl<F> DocumentFilter for F
where
    F: Fn(&Document) -> bool + Send + Sync,
{
    fn accept(&self, doc: &Document) -> bool {
        self(doc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextState {
    Open,
    Closed,
}

#[derive(Debug)]
struct ContextCore {
    state: ContextState,
    repository_id: Option<String>,
    writer: Option<IndexWriter>,
    timestamp: Option<DateTime<Utc>>,
}

/// Lifecycle manager for one persistent, lockable repository index.
#[derive(Debug)]
pub struct IndexingContext {
    id: String,
    repository_root: Option<PathBuf>,
    repository_url: Option<String>,
    index_update_url: Option<String>,
    registry: SchemaRegistry,
    storage: Arc<dyn Storage>,
    locks: Arc<TrackingLockFactory>,
    pool: Arc<SearcherPool>,
    searchable: AtomicBool,
    closed: AtomicBool,
    groups: RwLock<Arc<GroupSets>>,
    core: Mutex<ContextCore>,
}

impl IndexingContext {
    /// Open, recover, or create the index described by `config`.
    ///
    /// Fails with [`SorbusError::LockHeld`] when another process holds the
    /// write lock, [`SorbusError::IdentityMismatch`] when the persisted
    /// descriptor disagrees with the configured repository id (unless reclaim
    /// was requested), and [`SorbusError::Configuration`] when a new index
    /// would be created without a repository id.
    pub fn open(config: ContextConfig) -> Result<Self> {
        let storage: Arc<dyn Storage> = match &config.index_path {
            Some(path) => Arc::new(FileStorage::open(path)?),
            None => Arc::new(MemoryStorage::new()),
        };
        Self::with_storage(config, storage)
    }

    /// Legacy factory for callers that already hold a raw store. Prefer
    /// [`open`](IndexingContext::open) with an `index_path`.
    pub fn with_storage(config: ContextConfig, storage: Arc<dyn Storage>) -> Result<Self> {
        if config.id.trim().is_empty() {
            return Err(SorbusError::configuration("context id must not be empty"));
        }

        let registry = config.providers.unwrap_or_default();
        let locks = Arc::new(TrackingLockFactory::new());
        let pool = Arc::new(SearcherPool::new(Arc::clone(&storage)));
        let mut core = ContextCore {
            state: ContextState::Open,
            repository_id: config.repository_id,
            writer: None,
            timestamp: None,
        };

        prepare_index(&mut core, &storage, &locks, &pool, config.reclaim)?;
        core.timestamp = timestamp::read_timestamp(storage.as_ref())?;

        info!(
            "opened indexing context '{}' for repository '{}'",
            config.id,
            core.repository_id.as_deref().unwrap_or("?")
        );

        Ok(Self {
            id: config.id,
            repository_root: config.repository_root,
            repository_url: config.repository_url,
            index_update_url: config.index_update_url,
            registry,
            storage,
            locks,
            pool,
            searchable: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            groups: RwLock::new(Arc::new(GroupSets::default())),
            core: Mutex::new(core),
        })
    }

    // ── identity & flags ────────────────────────────────────────────

    /// The context id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The owning repository id; set at construction or adopted from the
    /// stored descriptor.
    pub fn repository_id(&self) -> Option<String> {
        self.core.lock().repository_id.clone()
    }

    /// Local root of the repository content, if configured.
    pub fn repository_root(&self) -> Option<&Path> {
        self.repository_root.as_deref()
    }

    /// URL the repository is served from, if configured.
    pub fn repository_url(&self) -> Option<&str> {
        self.repository_url.as_deref()
    }

    /// URL remote index updates are fetched from. When a repository URL is
    /// configured and no explicit update URL was given, this is the
    /// conventional `/.index` location under the repository URL.
    pub fn index_update_url(&self) -> Option<String> {
        if let Some(repository_url) = &self.repository_url {
            let explicit = self
                .index_update_url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty());
            if explicit.is_none() {
                let sep = if repository_url.ends_with('/') { "" } else { "/" };
                return Some(format!("{repository_url}{sep}{INDEX_DIRECTORY}"));
            }
        }
        self.index_update_url.clone()
    }

    /// Whether this context should be consulted by searches.
    pub fn is_searchable(&self) -> bool {
        self.searchable.load(Ordering::SeqCst)
    }

    /// Set the searchable flag.
    pub fn set_searchable(&self, searchable: bool) {
        self.searchable.store(searchable, Ordering::SeqCst);
    }

    /// The schema provider registry, in registration order.
    pub fn schema_providers(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The underlying store.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ── timestamp ───────────────────────────────────────────────────

    /// The last successful sync instant; `None` means a full resync is
    /// required.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.core.lock().timestamp
    }

    /// Set the timestamp to now, optionally persisting the marker.
    pub fn update_timestamp(&self, persist: bool) -> Result<()> {
        self.set_timestamp(Some(Utc::now()), persist)
    }

    /// Set (or clear) the timestamp, optionally persisting the marker.
    pub fn set_timestamp(&self, ts: Option<DateTime<Utc>>, persist: bool) -> Result<()> {
        let mut core = self.core.lock();
        self.assert_open(&core);
        self.install_timestamp(&mut core, ts, persist)
    }

    // ── read path ───────────────────────────────────────────────────

    /// Lease a snapshot of the committed state. Dropping the lease releases
    /// it; arbitrarily many leases may be outstanding concurrently.
    ///
    /// # Panics
    ///
    /// Panics if the context has been closed.
    pub fn acquire_searcher(&self) -> Result<LeasedSearcher> {
        assert!(
            !self.is_closed(),
            "indexing context '{}' is closed",
            self.id
        );
        self.pool.acquire()
    }

    /// Number of documents in the committed state (including the descriptor
    /// and tombstones).
    pub fn doc_count(&self) -> Result<usize> {
        Ok(self.acquire_searcher()?.live_doc_count())
    }

    // ── writer surface ──────────────────────────────────────────────

    /// Add a document. Not visible to searchers until `commit`.
    pub fn add_document(&self, doc: Document) -> Result<()> {
        let mut core = self.core.lock();
        self.assert_open(&core);
        writer_mut(&mut core)?.add_document(doc);
        Ok(())
    }

    /// Replace every document whose `field` equals `value` with `doc`.
    pub fn update_document(&self, field: &str, value: &str, doc: Document) -> Result<()> {
        let mut core = self.core.lock();
        self.assert_open(&core);
        writer_mut(&mut core)?.update_document(field, value, doc);
        Ok(())
    }

    /// Remove every document whose `field` equals `value`; returns the count.
    pub fn delete_documents(&self, field: &str, value: &str) -> Result<usize> {
        let mut core = self.core.lock();
        self.assert_open(&core);
        Ok(writer_mut(&mut core)?.delete_documents(field, value))
    }

    /// Commit pending writes, making them visible to new searcher leases.
    pub fn commit(&self) -> Result<()> {
        let mut core = self.core.lock();
        self.assert_open(&core);
        self.checkpoint(&mut core)
    }

    /// Discard pending writes.
    pub fn rollback(&self) -> Result<()> {
        let mut core = self.core.lock();
        self.assert_open(&core);
        writer_mut(&mut core)?.rollback()
    }

    /// Checkpoint the current writer state. The engine keeps a single clean
    /// segment per commit, so this is exactly a commit.
    pub fn optimize(&self) -> Result<()> {
        self.commit()
    }

    // ── groups ──────────────────────────────────────────────────────

    /// The current namespace summary pair.
    pub fn group_sets(&self) -> Arc<GroupSets> {
        Arc::clone(&self.groups.read())
    }

    /// Every namespace id present in the index.
    pub fn all_groups(&self) -> HashSet<String> {
        self.groups.read().all_groups.clone()
    }

    /// Top-level namespace segments.
    pub fn root_groups(&self) -> HashSet<String> {
        self.groups.read().root_groups.clone()
    }

    /// Replace the all-groups side of the pair.
    pub fn set_all_groups(&self, groups: impl IntoIterator<Item = String>) {
        let core = self.core.lock();
        self.assert_open(&core);
        self.install_all_groups(groups.into_iter().collect());
    }

    /// Replace the root-groups side of the pair.
    pub fn set_root_groups(&self, groups: impl IntoIterator<Item = String>) {
        let core = self.core.lock();
        self.assert_open(&core);
        self.install_root_groups(groups.into_iter().collect());
    }

    /// Recompute both group sets from a full scan over the live documents
    /// and publish them as one atomic pair replacement.
    pub fn rebuild_groups(&self) -> Result<()> {
        let mut core = self.core.lock();
        self.assert_open(&core);
        self.rebuild_groups_inner(&mut core)
    }

    // ── structural operations ───────────────────────────────────────

    /// Merge every live document of `source` into this index.
    ///
    /// Additive only: an artifact document is added when its key is absent
    /// from the target, never overwriting an existing live entry. Tombstones
    /// remove the matching live document and are themselves retained so
    /// incremental consumers observe the deletion.
    pub fn merge(&self, source: &dyn Storage) -> Result<()> {
        self.merge_impl(source, None)
    }

    /// Merge with a predicate; source documents the filter rejects are
    /// skipped.
    pub fn merge_filtered(&self, source: &dyn Storage, filter: &dyn DocumentFilter) -> Result<()> {
        self.merge_impl(source, Some(filter))
    }

    fn merge_impl(&self, source: &dyn Storage, filter: Option<&dyn DocumentFilter>) -> Result<()> {
        let mut core = self.core.lock();
        self.assert_open(&core);
        info!("merging source index into '{}'", self.id);

        let searcher = self.pool.acquire()?;
        let source_snapshot = IndexSnapshot::open(source)?;
        let mut added = 0usize;
        let mut deleted = 0usize;
        {
            let writer = writer_mut(&mut core)?;
            for doc in source_snapshot.docs() {
                if let Some(filter) = filter {
                    if !filter.accept(doc) {
                        continue;
                    }
                }

                if let Some(uinfo) = doc.get(FLD_UINFO).and_then(DataValue::as_text) {
                    if searcher.count(FLD_UINFO, uinfo) == 0 {
                        writer.add_document(doc.clone());
                        added += 1;
                    }
                } else if let Some(key) = doc.get(FLD_DELETED).and_then(DataValue::as_text) {
                    // physically deleting alone would lose the deletion for
                    // incremental consumers, so the tombstone goes in as well
                    let key = key.to_string();
                    writer.delete_documents(FLD_UINFO, &key);
                    writer.add_document(doc.clone());
                    deleted += 1;
                }
            }
            writer.commit()?;
        }
        self.pool.invalidate();
        drop(searcher);
        debug!(
            "merge into '{}': {added} added, {deleted} tombstones applied",
            self.id
        );

        self.rebuild_groups_inner(&mut core)?;

        let source_ts = timestamp::read_timestamp(source)?;
        let stamped = match (core.timestamp, source_ts) {
            // we have both, keep the newest
            (Some(current), Some(merged)) if merged > current => merged,
            _ => Utc::now(),
        };
        self.install_timestamp(&mut core, Some(stamped), true)?;

        self.checkpoint(&mut core)
    }

    /// Replace the whole content of this index with `source`, then rebuild
    /// both group sets from scratch.
    pub fn replace(&self, source: &dyn Storage) -> Result<()> {
        self.replace_with_groups(source, None, None)
    }

    /// Replace the whole content of this index with `source`. A supplied
    /// group override is installed directly instead of rescanning.
    pub fn replace_with_groups(
        &self,
        source: &dyn Storage,
        all_groups: Option<HashSet<String>>,
        root_groups: Option<HashSet<String>>,
    ) -> Result<()> {
        let mut core = self.core.lock();
        self.assert_open(&core);
        info!("replacing content of '{}' from a source index", self.id);

        let source_ts = timestamp::read_timestamp(source)?;
        close_readers(&mut core, &self.pool)?;
        delete_index_files(self.storage.as_ref(), false)?;
        storage::copy_storage(source, self.storage.as_ref())?;
        open_and_warmup(&mut core, &self.storage, &self.locks, &self.pool)?;
        // reclaim the copied index as ours
        store_descriptor(&mut core, &self.pool)?;

        if all_groups.is_none() && root_groups.is_none() {
            self.rebuild_groups_inner(&mut core)?;
        } else {
            if let Some(all) = all_groups {
                self.install_all_groups(all);
            }
            if let Some(root) = root_groups {
                self.install_root_groups(root);
            }
        }

        self.install_timestamp(&mut core, source_ts, true)?;
        self.checkpoint(&mut core)
    }

    /// Delete everything and reopen as an empty index owned by this context.
    pub fn purge(&self) -> Result<()> {
        let mut core = self.core.lock();
        self.assert_open(&core);
        info!("purging '{}'", self.id);

        close_readers(&mut core, &self.pool)?;
        delete_index_files(self.storage.as_ref(), true)?;
        match prepare_index(&mut core, &self.storage, &self.locks, &self.pool, true) {
            Ok(()) => {}
            // the index was just deleted; an identity complaint from the
            // now-empty store is expected
            Err(e) if e.is_identity_mismatch() => {}
            Err(e) => return Err(e),
        }
        self.rebuild_groups_inner(&mut core)?;
        self.install_timestamp(&mut core, None, true)
    }

    /// Close the context, persisting the timestamp and releasing all
    /// resources. With `delete_files` the index files are wiped. Idempotent;
    /// every other operation on a closed context is a contract violation and
    /// panics.
    pub fn close(&self, delete_files: bool) -> Result<()> {
        let mut core = self.core.lock();
        if core.state == ContextState::Closed {
            return Ok(());
        }
        info!("closing '{}'", self.id);

        timestamp::write_timestamp(self.storage.as_ref(), core.timestamp)?;
        close_readers(&mut core, &self.pool)?;
        if delete_files {
            delete_index_files(self.storage.as_ref(), true)?;
        }
        core.state = ContextState::Closed;
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    // ── internals ───────────────────────────────────────────────────

    fn assert_open(&self, core: &ContextCore) {
        assert!(
            core.state == ContextState::Open,
            "indexing context '{}' is closed",
            self.id
        );
    }

    fn rebuild_groups_inner(&self, core: &mut ContextCore) -> Result<()> {
        let searcher = self.pool.acquire()?;
        let mut all_groups = HashSet::new();
        let mut root_groups = HashSet::new();

        for doc in searcher.docs() {
            if !doc.has_field(FLD_UINFO) {
                continue;
            }
            if let Some(info) = self.registry.decode(doc) {
                root_groups.insert(info.root_group().to_string());
                all_groups.insert(info.group_id);
            }
        }
        drop(searcher);

        debug!(
            "rebuilt groups for '{}': {} namespaces, {} roots",
            self.id,
            all_groups.len(),
            root_groups.len()
        );
        *self.groups.write() = Arc::new(GroupSets {
            all_groups,
            root_groups,
        });

        self.checkpoint(core)
    }

    fn checkpoint(&self, core: &mut ContextCore) -> Result<()> {
        writer_mut(core)?.commit()?;
        self.pool.invalidate();
        Ok(())
    }

    fn install_timestamp(
        &self,
        core: &mut ContextCore,
        ts: Option<DateTime<Utc>>,
        persist: bool,
    ) -> Result<()> {
        core.timestamp = ts;
        if persist {
            timestamp::write_timestamp(self.storage.as_ref(), ts)?;
        }
        Ok(())
    }

    fn install_all_groups(&self, groups: HashSet<String>) {
        let mut current = self.groups.write();
        let mut next = (**current).clone();
        next.all_groups = groups;
        *current = Arc::new(next);
    }

    fn install_root_groups(&self, groups: HashSet<String>) {
        let mut current = self.groups.write();
        let mut next = (**current).clone();
        next.root_groups = groups;
        *current = Arc::new(next);
    }
}

impl fmt::Display for IndexingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.core.lock().timestamp {
            Some(ts) => write!(f, "{} : {}", self.id, ts.to_rfc3339()),
            None => write!(f, "{} : -", self.id),
        }
    }
}

// ── lifecycle procedure ─────────────────────────────────────────────

fn writer_mut<'a>(core: &'a mut ContextCore) -> Result<&'a mut IndexWriter> {
    core.writer
        .as_mut()
        .ok_or_else(|| SorbusError::index("index writer is not open"))
}

fn prepare_index(
    core: &mut ContextCore,
    storage: &Arc<dyn Storage>,
    locks: &TrackingLockFactory,
    pool: &SearcherPool,
    reclaim: bool,
) -> Result<()> {
    if index_exists(storage.as_ref())? {
        let attempt = (|| {
            probe_write_lock(storage.as_ref(), locks)?;
            open_and_warmup(core, storage, locks, pool)?;
            check_and_update_descriptor(core, pool, reclaim)
        })();

        match attempt {
            Ok(()) => Ok(()),
            Err(e) if reclaim && e.is_reclaimable() => {
                warn!("recreating unusable index: {e}");
                prepare_clean_index(core, storage, locks, pool, true)
            }
            Err(e) => Err(e),
        }
    } else {
        prepare_clean_index(core, storage, locks, pool, false)
    }
}

/// Probe the write lock: obtain and release immediately, falling back to
/// forced-unlock recovery when it cannot be obtained.
fn probe_write_lock(storage: &dyn Storage, locks: &TrackingLockFactory) -> Result<()> {
    match locks.obtain(storage, WRITE_LOCK_NAME) {
        Ok(lock) => lock.release(),
        Err(SorbusError::LockHeld(_)) => unlock_forcibly(locks, storage),
        Err(e) => Err(e),
    }
}

fn prepare_clean_index(
    core: &mut ContextCore,
    storage: &Arc<dyn Storage>,
    locks: &TrackingLockFactory,
    pool: &SearcherPool,
    delete_existing: bool,
) -> Result<()> {
    if delete_existing {
        close_readers(core, pool)?;
        probe_write_lock(storage.as_ref(), locks)?;
        delete_index_files(storage.as_ref(), true)?;
    }

    open_and_warmup(core, storage, locks, pool)?;

    if core.repository_id.as_deref().is_none_or(|id| id.is_empty()) {
        return Err(SorbusError::configuration(
            "a repository id is required when creating a new index",
        ));
    }

    store_descriptor(core, pool)
}

/// Close any prior writer, open a fresh one bound to the store, commit so a
/// virgin store gains its manifest, and reset the searcher pool.
fn open_and_warmup(
    core: &mut ContextCore,
    storage: &Arc<dyn Storage>,
    locks: &TrackingLockFactory,
    pool: &SearcherPool,
) -> Result<()> {
    if let Some(writer) = core.writer.take() {
        writer.close()?;
    }
    pool.close();

    let mut writer = IndexWriter::open(Arc::clone(storage), locks)?;
    writer.commit()?;
    core.writer = Some(writer);
    pool.reset();
    Ok(())
}

fn close_readers(core: &mut ContextCore, pool: &SearcherPool) -> Result<()> {
    pool.close();
    if let Some(writer) = core.writer.take() {
        writer.close()?;
    }
    Ok(())
}

fn check_and_update_descriptor(
    core: &mut ContextCore,
    pool: &SearcherPool,
    reclaim: bool,
) -> Result<()> {
    if reclaim {
        // forcefully take ownership of the index
        return store_descriptor(core, pool);
    }

    let (total, stored_repository_id) = {
        let searcher = pool.acquire()?;
        // a virgin index has nothing to validate
        if searcher.live_doc_count() == 0 {
            return Ok(());
        }
        let total = searcher.count(FLD_DESCRIPTOR, DESCRIPTOR_CONTENTS);
        let stored = searcher
            .search(FLD_DESCRIPTOR, DESCRIPTOR_CONTENTS, 1)
            .first()
            .and_then(|d| d.get_text(FLD_REPOSITORY_ID))
            .map(str::to_string);
        (total, stored)
    };

    match total {
        0 => Err(SorbusError::identity_mismatch(
            "the existing index has no descriptor",
        )),
        1 => {
            let stored = stored_repository_id
                .ok_or_else(|| SorbusError::index("the descriptor lacks a repository id"))?;
            match &core.repository_id {
                None => {
                    core.repository_id = Some(stored);
                    Ok(())
                }
                Some(mine) if *mine != stored => Err(SorbusError::identity_mismatch(format!(
                    "the existing index is for repository '{stored}' and not for repository '{mine}'"
                ))),
                Some(_) => Ok(()),
            }
        }
        n => {
            // corrupted index carrying several descriptors; iron it out
            warn!("found {n} descriptors, rewriting a single one");
            store_descriptor(core, pool)
        }
    }
}

fn store_descriptor(core: &mut ContextCore, pool: &SearcherPool) -> Result<()> {
    let repository_id = core.repository_id.clone().unwrap_or_default();
    let descriptor = Document::new()
        .add_string(FLD_DESCRIPTOR, DESCRIPTOR_CONTENTS)
        .add_string(FLD_FORMAT_VERSION, FORMAT_VERSION)
        .add_string(FLD_REPOSITORY_ID, repository_id);

    let writer = writer_mut(core)?;
    writer.update_document(FLD_DESCRIPTOR, DESCRIPTOR_CONTENTS, descriptor);
    writer.commit()?;
    pool.invalidate();
    Ok(())
}

/// Delete the index files. A non-full wipe keeps the packer and updater
/// properties; a full wipe removes those as well. The timestamp marker never
/// survives either.
fn delete_index_files(storage: &dyn Storage, full: bool) -> Result<()> {
    for name in storage.list_files()? {
        let reserved =
            name == INDEX_PACKER_PROPERTIES_FILE || name == INDEX_UPDATER_PROPERTIES_FILE;
        if reserved && !full {
            continue;
        }
        match storage.delete_file(&name) {
            Ok(()) => {}
            Err(SorbusError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    timestamp::delete_timestamp(storage)
}

/// Best-effort forced release of the write lock.
///
/// Closes every handle this process tracked for the lock name; for
/// file-backed stores, additionally verifies with a non-blocking native lock
/// that no other process holds the lock file, then removes it. Can race a
/// legitimately live holder; this is an explicit operator-invoked repair
/// path, not background behavior.
fn unlock_forcibly(locks: &TrackingLockFactory, storage: &dyn Storage) -> Result<()> {
    warn!("write lock obtain failed, attempting forced release");
    locks.force_release(WRITE_LOCK_NAME)?;

    let Some(dir) = storage.path() else {
        return Ok(());
    };
    let lock_path = dir.join(WRITE_LOCK_NAME);
    let lock_path = match lock_path.canonicalize() {
        Ok(path) => path,
        // no lock file, nothing held
        Err(_) => return Ok(()),
    };

    {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
            }
            Err(_) => {
                return Err(SorbusError::lock_held(format!(
                    "lock held by another process: {}",
                    lock_path.display()
                )));
            }
        }
    }
    fs::remove_file(&lock_path)?;
    info!("removed stale lock file {}", lock_path.display());
    Ok(())
}
