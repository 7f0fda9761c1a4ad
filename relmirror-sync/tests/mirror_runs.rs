mod common;

use std::fs;
use std::time::Duration;

use common::{day, World};
use relmirror_core::{AssetKey, LedgerStore};
use relmirror_sync::{pipeline, CommitOutcome, CommitStatus, ErrorKind, ReleasePhase};

fn ledger(world: &World) -> relmirror_core::SyncLedger {
    LedgerStore::new(&world.config.ledger_path).load()
}

#[test]
fn first_run_mirrors_then_second_run_is_a_no_op() {
    let world = World::new();
    world.add_release(7, "v1.0", day(1, 1));
    world.add_asset(7, "app.bin", 50, day(1, 1));

    let first = pipeline::run(&world.config, world.parts());
    assert!(first.fatal.is_none());
    assert_eq!(first.transferred(), 3);
    assert_eq!(first.releases[0].phase, ReleasePhase::Committed);
    assert_eq!(
        first.releases[0].commit,
        CommitStatus::Done(CommitOutcome::Committed)
    );

    let saved = ledger(&world);
    let entry = &saved.assets["7"][&AssetKey::new("app.bin", 50)];
    assert_eq!(entry.size, 50);
    assert_eq!(entry.updated_at, Some(day(6, 1)));
    assert_eq!(entry.synced_at, day(9, 1));
    assert_eq!(saved.releases["7"].tag_name, "v1.0");

    let uploads_before = world.target.uploads().len();
    let downloads_before = world.downloader.calls.borrow().len();

    let second = pipeline::run(&world.config, world.parts());
    assert_eq!(second.transferred(), 0);
    assert_eq!(second.releases[0].phase, ReleasePhase::SkippedNoChange);
    assert_eq!(second.releases[0].commit, CommitStatus::NotNeeded);
    assert_eq!(world.target.uploads().len(), uploads_before);
    assert_eq!(world.downloader.calls.borrow().len(), downloads_before);
    assert_eq!(world.committer.calls.borrow().len(), 1);
}

#[test]
fn new_release_gets_tag_from_default_branch_and_archives_go_first() {
    let world = World::new();
    world.add_release(7, "v1.0", day(1, 1));
    world.add_asset(7, "app.bin", 50, day(1, 1));

    pipeline::run(&world.config, world.parts());

    let state = world.target.state.borrow();
    assert_eq!(
        state.created_tags,
        vec![("v1.0".to_string(), "c0ffee".to_string())]
    );
    assert_eq!(
        state.uploads,
        vec!["SourceCode_v1.0.zip", "SourceCode_v1.0.tar.gz", "app.bin"]
    );
}

#[test]
fn releases_are_processed_oldest_first() {
    let world = World::new();
    world.add_release(2, "v2", day(3, 1));
    world.add_release(1, "v1", day(1, 1));
    world.add_release(3, "v3", day(5, 1));

    let report = pipeline::run(&world.config, world.parts());

    let tags: Vec<_> = report.releases.iter().map(|r| r.tag.as_str()).collect();
    assert_eq!(tags, ["v1", "v2", "v3"]);
    assert_eq!(world.target.release_tags(), ["v1", "v2", "v3"]);
    let markers: Vec<_> = world
        .committer
        .calls
        .borrow()
        .iter()
        .map(|(_, marker)| marker.clone())
        .collect();
    assert_eq!(markers, ["v1", "v2", "v3"]);
}

#[test]
fn commit_covers_ledger_and_backup() {
    let world = World::new();
    world.add_release(1, "v1", day(1, 1));

    pipeline::run(&world.config, world.parts());

    let calls = world.committer.calls.borrow();
    let store = LedgerStore::new(&world.config.ledger_path);
    assert_eq!(
        calls[0].0,
        vec![store.path().to_path_buf(), store.backup_path()]
    );
}

#[test]
fn size_change_is_uploaded_under_a_new_identity() {
    let world = World::new();
    world.add_release(7, "v1.0", day(1, 1));
    world.add_asset(7, "app.bin", 50, day(1, 1));
    pipeline::run(&world.config, world.parts());

    world.change_asset(7, "app.bin", 60, day(1, 1));
    let report = pipeline::run(&world.config, world.parts());

    assert_eq!(report.releases[0].assets.transferred, 1);
    assert_eq!(world.target.deletes(), ["app.bin"]);
    let saved = ledger(&world);
    let assets = &saved.assets["7"];
    assert!(assets.contains_key(&AssetKey::new("app.bin", 50)));
    assert_eq!(assets[&AssetKey::new("app.bin", 60)].size, 60);
}

#[test]
fn newer_source_timestamp_forces_resync_once() {
    let world = World::new();
    world.add_release(7, "v1.0", day(1, 1));
    world.add_asset(7, "app.bin", 50, day(1, 1));
    pipeline::run(&world.config, world.parts());

    world.change_asset(7, "app.bin", 50, day(7, 1));
    world.target.upload_stamp.set(day(8, 1));
    let second = pipeline::run(&world.config, world.parts());
    assert_eq!(second.releases[0].assets.transferred, 1);

    let third = pipeline::run(&world.config, world.parts());
    assert_eq!(third.transferred(), 0);
}

#[test]
fn older_or_equal_source_timestamp_is_current() {
    let world = World::new();
    world.add_release(7, "v1.0", day(1, 1));
    world.add_asset(7, "app.bin", 50, day(1, 1));
    pipeline::run(&world.config, world.parts());

    world.change_asset(7, "app.bin", 50, day(6, 1));
    let report = pipeline::run(&world.config, world.parts());
    assert_eq!(report.transferred(), 0);
}

#[test]
fn exhausted_upload_is_left_for_the_next_run() {
    let world = World::new();
    world.add_release(1, "v1", day(1, 1));
    world.add_asset(1, "a.bin", 5, day(1, 1));
    world.add_asset(1, "b.bin", 6, day(1, 1));
    world.add_release(2, "v2", day(2, 1));
    world
        .target
        .state
        .borrow_mut()
        .failing_uploads
        .insert("b.bin".into(), 3);

    let first = pipeline::run(&world.config, world.parts());
    let v1 = &first.releases[0];
    assert_eq!(v1.assets.transferred, 1);
    assert_eq!(v1.assets.failed, 1);
    assert_eq!(
        *world.clock.sleeps.borrow(),
        vec![Duration::from_secs(10), Duration::from_secs(10)]
    );
    assert_eq!(first.releases[1].phase, ReleasePhase::Committed);

    let saved = ledger(&world);
    assert!(saved.asset_entry("1", &AssetKey::new("a.bin", 5)).is_some());
    assert!(saved.asset_entry("1", &AssetKey::new("b.bin", 6)).is_none());

    let uploads_before = world.target.uploads().len();
    let second = pipeline::run(&world.config, world.parts());
    assert_eq!(second.transferred(), 1);
    assert_eq!(&world.target.uploads()[uploads_before..], ["b.bin"]);
}

#[test]
fn unprovisionable_release_is_skipped() {
    let world = World::new();
    world.add_release(1, "v1", day(1, 1));
    world.add_release(2, "v2", day(2, 1));
    world
        .target
        .state
        .borrow_mut()
        .refuse_release
        .insert("v1".into());

    let report = pipeline::run(&world.config, world.parts());

    assert_eq!(report.releases[0].phase, ReleasePhase::Abandoned);
    assert!(report.releases[0].skipped_reason.is_some());
    assert_eq!(report.releases[1].phase, ReleasePhase::Committed);
    assert_eq!(report.abandoned(), 1);
    let saved = ledger(&world);
    assert!(!saved.releases.contains_key("1"));
    assert!(saved.releases.contains_key("2"));
}

#[test]
fn creation_race_is_resolved_by_looking_again() {
    let world = World::new();
    world.add_release(1, "v1", day(1, 1));
    world
        .target
        .state
        .borrow_mut()
        .racy_release
        .insert("v1".into());

    let report = pipeline::run(&world.config, world.parts());

    assert_eq!(report.releases[0].phase, ReleasePhase::Committed);
    assert_eq!(report.releases[0].archives.transferred, 2);
}

#[test]
fn failed_release_listing_ends_the_run_without_panicking() {
    let world = World::new();
    world.add_release(1, "v1", day(1, 1));
    world.source.fail_listing.set(true);

    let report = pipeline::run(&world.config, world.parts());

    let (kind, message) = report.fatal.expect("fatal recorded");
    assert_eq!(kind, ErrorKind::FatalUnexpected);
    assert!(message.contains("upstream/tool"));
    assert!(report.releases.is_empty());
    assert!(world.target.uploads().is_empty());
}

#[test]
fn existing_target_archives_are_backfilled_not_uploaded() {
    let world = World::new();
    world.add_release(1, "v1", day(1, 1));
    world
        .target
        .seed_release("v1", &[("SourceCode_v1.zip", 10)]);

    let report = pipeline::run(&world.config, world.parts());

    assert_eq!(report.releases[0].archives.current, 1);
    assert_eq!(report.releases[0].archives.transferred, 1);
    assert_eq!(world.target.uploads(), ["SourceCode_v1.tar.gz"]);
    assert!(world.target.state.borrow().created_tags.is_empty());
    let saved = ledger(&world);
    assert!(saved.has_source_code("v1", "SourceCode_v1.zip"));
    assert!(saved.has_source_code("v1", "SourceCode_v1.tar.gz"));
}

#[test]
fn commit_can_be_switched_off() {
    let mut world = World::new();
    world.config = world.config.clone().with_commit_ledger(false);
    world.add_release(1, "v1", day(1, 1));

    let report = pipeline::run(&world.config, world.parts());

    assert_eq!(report.releases[0].commit, CommitStatus::Disabled);
    assert!(world.committer.calls.borrow().is_empty());
}

#[test]
fn commit_failure_does_not_stop_the_run() {
    let world = World::new();
    world.add_release(1, "v1", day(1, 1));
    world.add_release(2, "v2", day(2, 1));
    world.committer.fail.set(true);

    let report = pipeline::run(&world.config, world.parts());

    assert!(matches!(report.releases[0].commit, CommitStatus::Failed(_)));
    assert_eq!(report.releases.len(), 2);
    assert!(ledger(&world).releases.contains_key("2"));
}

#[test]
fn unwritable_ledger_is_counted_but_transfers_continue() {
    let mut world = World::new();
    let blocker = world.dir.path().join("not-a-dir");
    fs::write(&blocker, "x").expect("write blocker");
    world.config = world
        .config
        .clone()
        .with_ledger_path(blocker.join("synced_data.json"));
    world.add_release(1, "v1", day(1, 1));

    let report = pipeline::run(&world.config, world.parts());

    assert!(report.persistence_failures > 0);
    assert_eq!(report.transferred(), 2);
    assert!(report.fatal.is_none());
}

#[test]
fn staging_directory_is_swept_after_a_run() {
    let world = World::new();
    let staging = world.staging_dir();
    fs::create_dir_all(&staging).expect("mkdir staging");
    fs::write(staging.join("temp_leftover.zip"), "stale").expect("write leftover");
    fs::write(staging.join("keep.txt"), "keep").expect("write keeper");
    world.add_release(1, "v1", day(1, 1));
    world.add_asset(1, "app.bin", 50, day(1, 1));

    pipeline::run(&world.config, world.parts());

    let names: Vec<_> = fs::read_dir(&staging)
        .expect("read staging")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["keep.txt"]);
}

#[test]
fn tags_with_slashes_stage_flat_and_keep_their_upload_names() {
    let world = World::new();
    world.add_release(3, "release/1.0", day(1, 1));

    let report = pipeline::run(&world.config, world.parts());

    assert_eq!(report.transferred(), 2);
    let uploads = world.target.uploads();
    assert!(uploads.contains(&"SourceCode_release/1.0.zip".to_string()));
    assert!(uploads.contains(&"SourceCode_release/1.0.tar.gz".to_string()));
    assert!(ledger(&world).has_source_code("release/1.0", "SourceCode_release/1.0.zip"));

    let leftovers: Vec<_> = fs::read_dir(world.staging_dir())
        .expect("read staging")
        .map(|e| e.expect("entry").path())
        .collect();
    assert!(leftovers.is_empty(), "staging not empty: {leftovers:?}");
}
