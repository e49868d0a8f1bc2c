use crate::model::{
    Block, BlockId, Category, CategoryId, Program, ProgramId, Role, Subevent, SubeventId, User,
    UserId,
};
use crate::settings::Settings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single fact recorded in the journal.
///
/// Entity events carry the whole entity after the change, so folding them
/// is an upsert. Application events are the output of registration and
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
#[non_exhaustive]
pub enum RegistryEvent {
    RoleSaved(Role),
    SubeventSaved(Subevent),
    SubeventRemoved {
        id: SubeventId,
    },
    UserSaved(User),
    CategorySaved(Category),
    CategoryRemoved {
        id: CategoryId,
    },
    BlockSaved(Block),
    BlockRemoved {
        id: BlockId,
    },
    ProgramSaved(Program),
    ProgramRemoved {
        id: ProgramId,
    },
    ApplicationAdded {
        user: UserId,
        program: ProgramId,
        alternate: bool,
    },
    ApplicationRemoved {
        user: UserId,
        program: ProgramId,
    },
    AlternatePromoted {
        user: UserId,
        program: ProgramId,
    },
    SettingsChanged(Settings),
}

/// One committed transaction: every event a command produced, including
/// the registrations its reconciliation added or removed.
///
/// Records are serialized as single JSON lines in `journal.jsonl`, so a
/// record is either fully present or (after a crash mid-write) ignored.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use seminarfold::{ProgramId, Record, RegistryEvent, UserId};
///
/// let record = Record::new(
///     7,
///     Utc.with_ymd_and_hms(2020, 1, 1, 8, 0, 0).unwrap(),
///     vec![RegistryEvent::ApplicationRemoved { user: UserId(3), program: ProgramId(5) }],
/// )
/// .with_actor("admin");
/// assert_eq!(record.seq, 7);
/// assert_eq!(record.actor.as_deref(), Some("admin"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Record {
    /// Position of the record in the journal, starting at 1.
    pub seq: u64,

    pub ts: DateTime<Utc>,

    /// Who issued the command (user id, admin login, service name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    pub events: Vec<RegistryEvent>,
}

impl Record {
    pub fn new(seq: u64, ts: DateTime<Utc>, events: Vec<RegistryEvent>) -> Self {
        Record {
            seq,
            ts,
            actor: None,
            events,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}
