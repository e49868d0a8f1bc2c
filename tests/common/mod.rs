#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use seminarfold::clock::FixedClock;
use seminarfold::settings::ProgramRegistrationType;
use seminarfold::{PaymentStatus, Registry, RoleId, SubeventId, UserId};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub struct Seminar {
    pub registry: Registry,
    pub clock: Arc<FixedClock>,
    pub dir: TempDir,
}

/// 2020-01-01 at `hour:minute` UTC.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, hour, minute, 0).unwrap()
}

pub fn open_with_clock(path: &Path, clock: Arc<FixedClock>) -> Registry {
    Registry::builder(path).clock(clock).open().unwrap()
}

/// A fresh registry with program registration open.
pub fn seminar() -> Seminar {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(FixedClock::new(at(7, 0)));
    let mut registry = open_with_clock(dir.path(), clock.clone());
    registry
        .update_settings(|s| {
            s.seminar_name = "test".into();
            s.register_programs_type = ProgramRegistrationType::Allowed;
        })
        .unwrap();
    Seminar {
        registry,
        clock,
        dir,
    }
}

/// An approved user holding `roles`, with paid applications for `subevents`.
pub fn attendee(
    registry: &mut Registry,
    roles: &[RoleId],
    subevents: &[SubeventId],
) -> UserId {
    let user = registry.create_user("First Last").unwrap();
    registry.set_user_roles(user, roles.iter().copied()).unwrap();
    registry.set_user_approved(user, true).unwrap();
    for subevent in subevents {
        registry
            .apply_for_subevent(user, *subevent, PaymentStatus::Paid)
            .unwrap();
    }
    user
}
