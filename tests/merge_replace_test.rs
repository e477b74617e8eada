use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use sorbus::context::{DESCRIPTOR_CONTENTS, FLD_DESCRIPTOR, FLD_REPOSITORY_ID};
use sorbus::schema::{ComponentInfo, FLD_DELETED, FLD_UINFO};
use sorbus::{ContextConfig, Document, IndexingContext, MemoryStorage, Storage};

fn new_context(id: &str, repository_id: &str) -> (IndexingContext, Arc<dyn Storage>) {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let ctx = IndexingContext::with_storage(
        ContextConfig::new(id).repository_id(repository_id),
        Arc::clone(&storage),
    )
    .unwrap();
    (ctx, storage)
}

fn add_component(ctx: &IndexingContext, uinfo: &str) {
    let info = ComponentInfo::from_uinfo(uinfo).unwrap();
    let doc = ctx.schema_providers().encode(&info);
    ctx.add_document(doc).unwrap();
}

fn live_uinfos(ctx: &IndexingContext) -> HashSet<String> {
    ctx.acquire_searcher()
        .unwrap()
        .docs()
        .iter()
        .filter_map(|d| d.get_text(FLD_UINFO).map(str::to_string))
        .collect()
}

fn descriptor_count(ctx: &IndexingContext) -> usize {
    ctx.acquire_searcher()
        .unwrap()
        .count(FLD_DESCRIPTOR, DESCRIPTOR_CONTENTS)
}

#[test]
fn test_merge_scenario() {
    // target: live g:a:1 and g:b:1
    let (target, _) = new_context("target", "central");
    add_component(&target, "g:a:1");
    add_component(&target, "g:b:1");
    target.commit().unwrap();

    // source: a competing live g:a:1 and a tombstone for g:a:2
    let (source, source_storage) = new_context("source", "mirror");
    let competing = source
        .schema_providers()
        .encode(&ComponentInfo::from_uinfo("g:a:1").unwrap())
        .add_string("origin", "source");
    source.add_document(competing).unwrap();
    source
        .add_document(Document::new().add_string(FLD_DELETED, "g:a:2"))
        .unwrap();
    source.commit().unwrap();
    source.close(false).unwrap();

    target.merge(source_storage.as_ref()).unwrap();

    let searcher = target.acquire_searcher().unwrap();
    // exactly one live g:a:1, and the target's copy won
    let hits = searcher.search(FLD_UINFO, "g:a:1", 10);
    assert_eq!(hits.len(), 1);
    assert!(!hits[0].has_field("origin"));
    // the tombstone was recorded
    assert_eq!(searcher.count(FLD_DELETED, "g:a:2"), 1);
    // g:b:1 is untouched
    assert_eq!(searcher.count(FLD_UINFO, "g:b:1"), 1);
    drop(searcher);
    target.close(false).unwrap();
}

#[test]
fn test_merge_is_idempotent_for_live_documents() {
    let (target, _) = new_context("target", "central");
    add_component(&target, "g:a:1");
    target.commit().unwrap();

    let (source, source_storage) = new_context("source", "mirror");
    add_component(&source, "g:a:2");
    add_component(&source, "g:b:1");
    source.commit().unwrap();
    source.close(false).unwrap();

    target.merge(source_storage.as_ref()).unwrap();
    let after_first = live_uinfos(&target);

    target.merge(source_storage.as_ref()).unwrap();
    let after_second = live_uinfos(&target);

    assert_eq!(after_first, after_second);
    // no duplicate keys either
    let searcher = target.acquire_searcher().unwrap();
    for uinfo in &after_second {
        assert_eq!(searcher.count(FLD_UINFO, uinfo), 1, "duplicated {uinfo}");
    }
    drop(searcher);
    target.close(false).unwrap();
}

#[test]
fn test_merge_never_overwrites_live_target_entries() {
    let (target, _) = new_context("target", "central");
    let mine = target
        .schema_providers()
        .encode(&ComponentInfo::from_uinfo("g:a:1").unwrap())
        .add_string("owner", "target");
    target.add_document(mine).unwrap();
    target.commit().unwrap();

    let (source, source_storage) = new_context("source", "mirror");
    let theirs = source
        .schema_providers()
        .encode(&ComponentInfo::from_uinfo("g:a:1").unwrap())
        .add_string("owner", "source");
    source.add_document(theirs).unwrap();
    source.commit().unwrap();
    source.close(false).unwrap();

    target.merge(source_storage.as_ref()).unwrap();

    let searcher = target.acquire_searcher().unwrap();
    let hits = searcher.search(FLD_UINFO, "g:a:1", 10);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].get_text("owner"), Some("target"));
    drop(searcher);
    target.close(false).unwrap();
}

#[test]
fn test_merge_tombstone_for_absent_key_is_kept() {
    let (target, _) = new_context("target", "central");
    add_component(&target, "g:b:1");
    target.commit().unwrap();

    let (source, source_storage) = new_context("source", "mirror");
    source
        .add_document(Document::new().add_string(FLD_DELETED, "g:q:9"))
        .unwrap();
    source.commit().unwrap();
    source.close(false).unwrap();

    target.merge(source_storage.as_ref()).unwrap();

    // nothing to delete, but the tombstone is re-inserted regardless
    let searcher = target.acquire_searcher().unwrap();
    assert_eq!(searcher.count(FLD_DELETED, "g:q:9"), 1);
    drop(searcher);
    target.close(false).unwrap();
}

#[test]
fn test_merge_with_filter() {
    let (target, _) = new_context("target", "central");
    target.commit().unwrap();

    let (source, source_storage) = new_context("source", "mirror");
    add_component(&source, "g:a:1");
    add_component(&source, "g:b:1");
    source.commit().unwrap();
    source.close(false).unwrap();

    let only_a = |doc: &Document| doc.get_text(FLD_UINFO) != Some("g:b:1");
    target
        .merge_filtered(source_storage.as_ref(), &only_a)
        .unwrap();

    assert_eq!(live_uinfos(&target), HashSet::from(["g:a:1".to_string()]));
    target.close(false).unwrap();
}

#[test]
fn test_merge_keeps_the_later_timestamp() {
    let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let newer = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    let (target, _) = new_context("target", "central");
    target.set_timestamp(Some(older), true).unwrap();

    let (source, source_storage) = new_context("source", "mirror");
    add_component(&source, "g:a:1");
    source.commit().unwrap();
    source.set_timestamp(Some(newer), true).unwrap();
    source.close(false).unwrap();

    target.merge(source_storage.as_ref()).unwrap();
    assert_eq!(target.timestamp(), Some(newer));
    target.close(false).unwrap();
}

#[test]
fn test_merge_with_older_source_stamps_now() {
    let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let newer = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    let (target, _) = new_context("target", "central");
    target.set_timestamp(Some(newer), true).unwrap();

    let (source, source_storage) = new_context("source", "mirror");
    source.set_timestamp(Some(older), true).unwrap();
    source.close(false).unwrap();

    target.merge(source_storage.as_ref()).unwrap();
    let stamped = target.timestamp().unwrap();
    assert!(stamped > newer);
    target.close(false).unwrap();
}

#[test]
fn test_replace_makes_target_equal_source() {
    let ts = Utc.with_ymd_and_hms(2024, 4, 2, 10, 0, 0).unwrap();

    let (source, source_storage) = new_context("source", "mirror");
    add_component(&source, "org.example:a:1");
    add_component(&source, "org.example:b:2");
    add_component(&source, "com.acme:c:3");
    source.commit().unwrap();
    source.set_timestamp(Some(ts), true).unwrap();
    source.close(false).unwrap();

    let (target, _) = new_context("target", "central");
    add_component(&target, "z:z:9");
    target.commit().unwrap();

    target.replace(source_storage.as_ref()).unwrap();

    let expected: HashSet<String> = ["org.example:a:1", "org.example:b:2", "com.acme:c:3"]
        .into_iter()
        .map(str::to_string)
        .collect();
    assert_eq!(live_uinfos(&target), expected);

    // the index is owned by the target's repository now
    let searcher = target.acquire_searcher().unwrap();
    let descriptor = searcher.search(FLD_DESCRIPTOR, DESCRIPTOR_CONTENTS, 1)[0];
    assert_eq!(descriptor.get_text(FLD_REPOSITORY_ID), Some("central"));
    assert_eq!(searcher.count(FLD_DESCRIPTOR, DESCRIPTOR_CONTENTS), 1);
    drop(searcher);

    // groups equal a fresh recompute over the source content
    assert_eq!(
        target.all_groups(),
        HashSet::from(["org.example".to_string(), "com.acme".to_string()])
    );
    assert_eq!(
        target.root_groups(),
        HashSet::from(["org".to_string(), "com".to_string()])
    );

    assert_eq!(target.timestamp(), Some(ts));
    target.close(false).unwrap();
}

#[test]
fn test_replace_with_group_overrides_skips_the_scan() {
    let (source, source_storage) = new_context("source", "mirror");
    add_component(&source, "org.example:a:1");
    source.commit().unwrap();
    source.close(false).unwrap();

    let (target, _) = new_context("target", "central");
    let all = HashSet::from(["override.group".to_string()]);
    let root = HashSet::from(["override".to_string()]);
    target
        .replace_with_groups(source_storage.as_ref(), Some(all.clone()), Some(root.clone()))
        .unwrap();

    assert_eq!(target.all_groups(), all);
    assert_eq!(target.root_groups(), root);
    target.close(false).unwrap();
}

#[test]
fn test_replace_preserves_reserved_metadata_files() {
    let (source, source_storage) = new_context("source", "mirror");
    source.close(false).unwrap();

    let (target, target_storage) = new_context("target", "central");
    target_storage
        .write_file(
            sorbus::context::INDEX_PACKER_PROPERTIES_FILE,
            b"chunk=0042",
        )
        .unwrap();

    target.replace(source_storage.as_ref()).unwrap();

    assert_eq!(
        target_storage
            .read_file(sorbus::context::INDEX_PACKER_PROPERTIES_FILE)
            .unwrap(),
        b"chunk=0042"
    );
    target.close(false).unwrap();
}

#[test]
fn test_purge_empties_and_remains_reopenable() {
    let (ctx, storage) = new_context("ctx", "central");
    add_component(&ctx, "g:a:1");
    add_component(&ctx, "g:b:1");
    ctx.commit().unwrap();
    ctx.rebuild_groups().unwrap();
    ctx.update_timestamp(true).unwrap();

    ctx.purge().unwrap();

    assert!(live_uinfos(&ctx).is_empty());
    assert_eq!(descriptor_count(&ctx), 1);
    assert!(ctx.all_groups().is_empty());
    assert!(ctx.root_groups().is_empty());
    assert_eq!(ctx.timestamp(), None);
    assert!(
        !storage
            .file_exists(sorbus::timestamp::TIMESTAMP_FILE)
            .unwrap()
    );

    // still a perfectly usable index
    add_component(&ctx, "h:x:1");
    ctx.commit().unwrap();
    assert_eq!(live_uinfos(&ctx), HashSet::from(["h:x:1".to_string()]));
    ctx.close(false).unwrap();

    let reopened =
        IndexingContext::with_storage(ContextConfig::new("ctx"), Arc::clone(&storage)).unwrap();
    assert_eq!(reopened.repository_id().as_deref(), Some("central"));
    reopened.close(false).unwrap();
}

#[test]
fn test_purge_removes_reserved_metadata_files() {
    let (ctx, storage) = new_context("ctx", "central");
    storage
        .write_file(sorbus::context::INDEX_UPDATER_PROPERTIES_FILE, b"state")
        .unwrap();

    ctx.purge().unwrap();

    assert!(
        !storage
            .file_exists(sorbus::context::INDEX_UPDATER_PROPERTIES_FILE)
            .unwrap()
    );
    ctx.close(false).unwrap();
}

#[test]
fn test_descriptor_stays_unique_across_operations() {
    let (target, _) = new_context("target", "central");
    add_component(&target, "g:a:1");
    target.commit().unwrap();
    assert_eq!(descriptor_count(&target), 1);

    let (source, source_storage) = new_context("source", "mirror");
    add_component(&source, "g:b:1");
    source.commit().unwrap();
    source.close(false).unwrap();

    target.merge(source_storage.as_ref()).unwrap();
    assert_eq!(descriptor_count(&target), 1);

    target.replace(source_storage.as_ref()).unwrap();
    assert_eq!(descriptor_count(&target), 1);

    target.purge().unwrap();
    assert_eq!(descriptor_count(&target), 1);

    target.rebuild_groups().unwrap();
    assert_eq!(descriptor_count(&target), 1);
    target.close(false).unwrap();
}

#[test]
fn test_rollback_discards_pending_documents() {
    let (ctx, _) = new_context("ctx", "central");
    add_component(&ctx, "g:a:1");
    ctx.commit().unwrap();

    add_component(&ctx, "g:b:1");
    ctx.rollback().unwrap();
    ctx.commit().unwrap();

    assert_eq!(live_uinfos(&ctx), HashSet::from(["g:a:1".to_string()]));
    ctx.close(false).unwrap();
}
