mod common;

use common::{at, attendee, seminar};
use seminarfold::snapshot::{self, SNAPSHOT_FILE};
use seminarfold::{BlockDraft, Registry, RegistryState, Snapshot};
use std::fs;
use tempfile::tempdir;

fn populate(registry: &mut Registry) {
    let subevent = registry.create_subevent("subevent").unwrap();
    let role = registry.create_role("role", true).unwrap();
    let user = attendee(registry, &[role], &[subevent]);
    let block = registry
        .create_block(BlockDraft::new("block", subevent))
        .unwrap();
    let program = registry.create_program(block, None, at(8, 0)).unwrap();
    registry.register_program(user, program).unwrap();
}

#[test]
fn test_snapshot_written_on_close() {
    let dir = tempdir().unwrap();
    let state = {
        let mut registry = Registry::open(dir.path()).unwrap();
        registry.create_role("role", true).unwrap();
        registry.state().clone()
    };

    let path = dir.path().join(SNAPSHOT_FILE);
    let snap: Snapshot<RegistryState> = snapshot::load(&path).unwrap().unwrap();
    assert_eq!(snap.state, state);
    assert_eq!(snap.seq, 1);
    assert_eq!(
        snap.offset,
        fs::metadata(dir.path().join("journal.jsonl")).unwrap().len()
    );
}

#[test]
fn test_snapshot_every() {
    let dir = tempdir().unwrap();
    let mut registry = Registry::builder(dir.path())
        .snapshot_every(2)
        .open()
        .unwrap();
    let path = dir.path().join(SNAPSHOT_FILE);

    registry.create_role("role", true).unwrap();
    assert!(!path.exists());

    registry.create_role("other", true).unwrap();
    let snap: Snapshot<RegistryState> = snapshot::load(&path).unwrap().unwrap();
    assert_eq!(snap.seq, 2);
}

#[test]
fn test_corrupt_snapshot_is_rebuilt() {
    let mut s = seminar();
    populate(&mut s.registry);
    s.registry.checkpoint().unwrap();
    let state = s.registry.state().clone();
    let dir = s.dir.path().to_path_buf();
    drop(s.registry);

    fs::write(dir.join(SNAPSHOT_FILE), b"{ not json").unwrap();

    let registry = Registry::open(&dir).unwrap();
    assert_eq!(registry.state(), &state);
}

#[test]
fn test_snapshot_of_other_journal_is_rebuilt() {
    let mut s = seminar();
    populate(&mut s.registry);
    let state = s.registry.state().clone();
    let dir = s.dir.path().to_path_buf();
    drop(s.registry);

    // Same offset, different content: only the hash tells them apart.
    let path = dir.join(SNAPSHOT_FILE);
    let mut snap: Snapshot<RegistryState> = snapshot::load(&path).unwrap().unwrap();
    snap.hash = "0000000000000000".into();
    snap.state = RegistryState::default();
    snapshot::save(&path, &snap).unwrap();

    let registry = Registry::open(&dir).unwrap();
    assert_eq!(registry.state(), &state);
}

#[test]
fn test_snapshot_beyond_journal_is_rebuilt() {
    let mut s = seminar();
    populate(&mut s.registry);
    let state = s.registry.state().clone();
    let dir = s.dir.path().to_path_buf();
    drop(s.registry);

    let path = dir.join(SNAPSHOT_FILE);
    let mut snap: Snapshot<RegistryState> = snapshot::load(&path).unwrap().unwrap();
    snap.offset += 1 << 20;
    snapshot::save(&path, &snap).unwrap();

    let registry = Registry::open(&dir).unwrap();
    assert_eq!(registry.state(), &state);
}

#[test]
fn test_rebuild_matches_incremental_state() {
    let mut s = seminar();
    populate(&mut s.registry);
    let state = s.registry.state().clone();

    s.registry.rebuild().unwrap();

    assert_eq!(s.registry.state(), &state);
}

#[test]
fn test_stale_tmp_file_is_ignored() {
    let mut s = seminar();
    populate(&mut s.registry);
    let state = s.registry.state().clone();
    let dir = s.dir.path().to_path_buf();
    drop(s.registry);

    let path = dir.join(SNAPSHOT_FILE);
    fs::write(path.with_extension("json.tmp"), b"{\"partial\":").unwrap();

    let registry = Registry::open(&dir).unwrap();
    assert_eq!(registry.state(), &state);
}

#[test]
fn test_failed_snapshot_does_not_fail_command() {
    let dir = tempdir().unwrap();
    let tmp = dir.path().join(SNAPSHOT_FILE).with_extension("json.tmp");
    let mut registry = Registry::builder(dir.path())
        .snapshot_every(1)
        .open()
        .unwrap();
    fs::create_dir(&tmp).unwrap();

    let role = registry.create_role("role", true).unwrap();

    assert!(registry.state().roles.contains_key(&role));
    let journal = fs::read_to_string(dir.path().join("journal.jsonl")).unwrap();
    assert_eq!(journal.lines().count(), 1);
    assert!(registry.checkpoint().is_err());

    drop(registry);
    fs::remove_dir(&tmp).unwrap();
    let registry = Registry::open(dir.path()).unwrap();
    assert!(registry.state().roles.contains_key(&role));
}

#[test]
fn test_failed_snapshot_does_not_fail_rotation() {
    let mut s = seminar();
    populate(&mut s.registry);
    s.registry.checkpoint().unwrap();
    let tmp = s.dir.path().join(SNAPSHOT_FILE).with_extension("json.tmp");
    fs::create_dir(&tmp).unwrap();

    s.registry.rotate().unwrap();
    s.registry.create_role("after", true).unwrap();
    let state = s.registry.state().clone();
    let dir = s.dir.path().to_path_buf();
    drop(s.registry);

    // The snapshot still points into the journal as it was before rotating.
    fs::remove_dir(&tmp).unwrap();
    let registry = Registry::open(&dir).unwrap();
    assert_eq!(registry.state(), &state);
}
