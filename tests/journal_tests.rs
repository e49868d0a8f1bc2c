mod common;

use common::{at, attendee, open_with_clock, seminar, Seminar};
use seminarfold::clock::FixedClock;
use seminarfold::{BlockDraft, Error, LockMode, MandatoryType, Registry, RegistryEvent};
use std::fs;
use std::io::Write;
use std::sync::Arc;

fn records(registry: &Registry) -> Vec<seminarfold::Record> {
    registry
        .journal_reader()
        .read_full()
        .unwrap()
        .map(|item| item.unwrap().0)
        .collect()
}

#[test]
fn test_reopen_reproduces_state() {
    let mut s = seminar();
    let registry = &mut s.registry;
    let subevent = registry.create_subevent("subevent").unwrap();
    let role = registry.create_role("role", true).unwrap();
    let user = attendee(registry, &[role], &[subevent]);
    let block = registry
        .create_block(
            BlockDraft::new("opening", subevent).with_mandatory(MandatoryType::AutoRegistered),
        )
        .unwrap();
    let program = registry.create_program(block, None, at(8, 0)).unwrap();
    assert!(registry.state().find_application(user, program).is_some());
    let state = registry.state().clone();

    let Seminar {
        registry,
        clock,
        dir,
    } = s;
    drop(registry);

    let registry = open_with_clock(dir.path(), clock);
    assert_eq!(registry.state(), &state);
}

#[test]
fn test_one_record_per_command() {
    let mut s = seminar();
    let registry = &mut s.registry;
    let subevent = registry.create_subevent("subevent").unwrap();
    let role = registry.create_role("role", true).unwrap();
    let user1 = attendee(registry, &[role], &[subevent]);
    let user2 = attendee(registry, &[role], &[subevent]);
    let block = registry
        .create_block(BlockDraft::new("block", subevent))
        .unwrap();
    let program = registry.create_program(block, None, at(8, 0)).unwrap();
    let before = records(registry).len();

    // The block change and both auto-registrations share one record.
    registry
        .update_block_mandatory(block, MandatoryType::AutoRegistered)
        .unwrap();

    let records = records(registry);
    assert_eq!(records.len(), before + 1);
    let last = records.last().unwrap();
    assert_eq!(last.seq, registry.state().last_seq);
    assert!(matches!(last.events[0], RegistryEvent::BlockSaved(_)));
    let added: Vec<_> = last
        .events
        .iter()
        .filter_map(|event| match event {
            RegistryEvent::ApplicationAdded { user, program: p, .. } if *p == program => {
                Some(*user)
            }
            _ => None,
        })
        .collect();
    assert_eq!(added, vec![user1, user2]);
}

#[test]
fn test_failed_command_writes_nothing() {
    let mut s = seminar();
    let registry = &mut s.registry;
    let subevent = registry.create_subevent("subevent").unwrap();
    let role = registry.create_role("role", true).unwrap();
    let user1 = attendee(registry, &[role], &[subevent]);
    let user2 = attendee(registry, &[role], &[subevent]);
    let block = registry
        .create_block(BlockDraft::new("block", subevent).with_capacity(1))
        .unwrap();
    let program = registry.create_program(block, None, at(8, 0)).unwrap();
    registry.register_program(user1, program).unwrap();
    let size = registry.journal_reader().active_size().unwrap();
    let state = registry.state().clone();

    assert!(registry.register_program(user2, program).is_err());

    assert_eq!(registry.journal_reader().active_size().unwrap(), size);
    assert_eq!(registry.state(), &state);
}

#[test]
fn test_records_carry_actor_and_time() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(FixedClock::new(at(9, 15)));
    let mut registry = Registry::builder(dir.path())
        .clock(clock.clone())
        .actor("admin")
        .open()
        .unwrap();

    registry.create_role("role", true).unwrap();
    registry.set_actor(None);
    clock.set(at(9, 30));
    registry.create_subevent("subevent").unwrap();

    let records = records(&registry);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].actor.as_deref(), Some("admin"));
    assert_eq!(records[0].ts, at(9, 15));
    assert_eq!(records[1].actor, None);
    assert_eq!(records[1].ts, at(9, 30));
    assert_eq!(records[1].seq, 2);
}

#[test]
fn test_partial_record_is_discarded_on_open() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut registry = Registry::open(dir.path()).unwrap();
        registry.create_role("role", true).unwrap();
        registry.create_subevent("subevent").unwrap();
    }

    let journal = dir.path().join("journal.jsonl");
    {
        let mut file = fs::OpenOptions::new().append(true).open(&journal).unwrap();
        write!(file, r#"{{"seq":3,"ts":"2020-01-01T00:00:00Z","events":["#).unwrap();
    }

    let mut registry = Registry::open(dir.path()).unwrap();
    assert_eq!(registry.state().last_seq, 2);
    assert!(fs::read_to_string(&journal).unwrap().ends_with('\n'));

    registry.create_user("First Last").unwrap();
    drop(registry);

    let registry = Registry::open(dir.path()).unwrap();
    assert_eq!(registry.state().last_seq, 3);
    assert_eq!(registry.state().users.len(), 1);
}

#[test]
fn test_torn_write_is_cut_before_next_append() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = Registry::open(dir.path()).unwrap();
    registry.create_role("role", true).unwrap();

    // What an interrupted append leaves behind.
    let journal = dir.path().join("journal.jsonl");
    {
        let mut file = fs::OpenOptions::new().append(true).open(&journal).unwrap();
        write!(file, r#"{{"seq":2,"ts":"2020-01-01T00:00:00Z","ev"#).unwrap();
    }

    registry.create_subevent("subevent").unwrap();

    let seqs: Vec<_> = records(&registry).iter().map(|record| record.seq).collect();
    assert_eq!(seqs, vec![1, 2]);
    let state = registry.state().clone();
    drop(registry);

    let registry = Registry::open(dir.path()).unwrap();
    assert_eq!(registry.state(), &state);
    assert_eq!(registry.state().subevents.len(), 1);
}

#[test]
fn test_second_writer_is_locked_out() {
    let dir = tempfile::tempdir().unwrap();
    let _writer = Registry::open(dir.path()).unwrap();

    let err = Registry::open(dir.path()).unwrap_err();
    assert!(matches!(err, Error::Locked(_)), "{err}");
    assert!(err.to_string().contains("journal.jsonl"), "{err}");
}

#[test]
fn test_lock_released_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    {
        let _writer = Registry::open(dir.path()).unwrap();
    }
    let _writer = Registry::open(dir.path()).unwrap();
}

#[test]
fn test_lock_mode_none_allows_multiple() {
    let dir = tempfile::tempdir().unwrap();
    let _writer1 = Registry::builder(dir.path())
        .lock_mode(LockMode::None)
        .open()
        .unwrap();
    let _writer2 = Registry::builder(dir.path())
        .lock_mode(LockMode::None)
        .open()
        .unwrap();
}

#[test]
fn test_ids_are_never_reused() {
    let mut s = seminar();
    let registry = &mut s.registry;
    let subevent = registry.create_subevent("subevent").unwrap();
    let block = registry
        .create_block(BlockDraft::new("block", subevent))
        .unwrap();
    registry.remove_block(block).unwrap();

    let again = registry
        .create_block(BlockDraft::new("block", subevent))
        .unwrap();
    assert!(again > block);
}
