use crate::error::{Error, Result};
use crate::event::{Record, RegistryEvent};
use crate::model::{
    Block, BlockId, Category, CategoryId, Program, ProgramApplication, ProgramId, Role, RoleId,
    Subevent, SubeventId, User, UserId,
};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything the registry knows, derived by folding the journal.
///
/// Maps are ordered by id so iteration (and therefore reconciliation) is
/// deterministic across replays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryState {
    pub roles: BTreeMap<RoleId, Role>,
    pub subevents: BTreeMap<SubeventId, Subevent>,
    pub users: BTreeMap<UserId, User>,
    pub categories: BTreeMap<CategoryId, Category>,
    pub blocks: BTreeMap<BlockId, Block>,
    pub programs: BTreeMap<ProgramId, Program>,
    /// Applications grouped by program, then by user.
    pub applications: BTreeMap<ProgramId, BTreeMap<UserId, ProgramApplication>>,
    pub settings: Settings,
    /// Next id handed out to a new entity of any kind.
    pub next_id: u64,
    /// Sequence number of the last folded record.
    pub last_seq: u64,
}

/// Fold a committed record into the state.
///
/// This is the only way state changes; replaying the journal through it
/// reproduces the registry exactly.
pub fn reduce(mut state: RegistryState, record: &Record) -> RegistryState {
    for event in &record.events {
        state = apply(state, event, record.seq);
    }
    state.last_seq = record.seq;
    state
}

pub(crate) fn apply(mut state: RegistryState, event: &RegistryEvent, seq: u64) -> RegistryState {
    match event {
        RegistryEvent::RoleSaved(role) => {
            state.bump_id(role.id.0);
            state.roles.insert(role.id, role.clone());
        }
        RegistryEvent::SubeventSaved(subevent) => {
            state.bump_id(subevent.id.0);
            state.subevents.insert(subevent.id, subevent.clone());
        }
        RegistryEvent::SubeventRemoved { id } => {
            state.subevents.remove(id);
        }
        RegistryEvent::UserSaved(user) => {
            state.bump_id(user.id.0);
            state.users.insert(user.id, user.clone());
        }
        RegistryEvent::CategorySaved(category) => {
            state.bump_id(category.id.0);
            state.categories.insert(category.id, category.clone());
        }
        RegistryEvent::CategoryRemoved { id } => {
            state.categories.remove(id);
        }
        RegistryEvent::BlockSaved(block) => {
            state.bump_id(block.id.0);
            state.blocks.insert(block.id, block.clone());
        }
        RegistryEvent::BlockRemoved { id } => {
            state.blocks.remove(id);
        }
        RegistryEvent::ProgramSaved(program) => {
            state.bump_id(program.id.0);
            state.programs.insert(program.id, program.clone());
        }
        RegistryEvent::ProgramRemoved { id } => {
            state.programs.remove(id);
            state.applications.remove(id);
        }
        RegistryEvent::ApplicationAdded {
            user,
            program,
            alternate,
        } => {
            state.applications.entry(*program).or_default().insert(
                *user,
                ProgramApplication {
                    user: *user,
                    program: *program,
                    alternate: *alternate,
                    created_seq: seq,
                },
            );
        }
        RegistryEvent::ApplicationRemoved { user, program } => {
            if let Some(applications) = state.applications.get_mut(program) {
                applications.remove(user);
                if applications.is_empty() {
                    state.applications.remove(program);
                }
            }
        }
        RegistryEvent::AlternatePromoted { user, program } => {
            if let Some(application) = state
                .applications
                .get_mut(program)
                .and_then(|applications| applications.get_mut(user))
            {
                application.alternate = false;
            }
        }
        RegistryEvent::SettingsChanged(settings) => {
            state.settings = settings.clone();
        }
    }
    state
}

impl RegistryState {
    fn bump_id(&mut self, used: u64) {
        self.next_id = self.next_id.max(used + 1);
    }

    pub fn role(&self, id: RoleId) -> Result<&Role> {
        self.roles.get(&id).ok_or(Error::NotFound {
            kind: "role",
            id: id.0,
        })
    }

    pub fn subevent(&self, id: SubeventId) -> Result<&Subevent> {
        self.subevents.get(&id).ok_or(Error::NotFound {
            kind: "subevent",
            id: id.0,
        })
    }

    pub fn user(&self, id: UserId) -> Result<&User> {
        self.users.get(&id).ok_or(Error::NotFound {
            kind: "user",
            id: id.0,
        })
    }

    pub fn category(&self, id: CategoryId) -> Result<&Category> {
        self.categories.get(&id).ok_or(Error::NotFound {
            kind: "category",
            id: id.0,
        })
    }

    pub fn block(&self, id: BlockId) -> Result<&Block> {
        self.blocks.get(&id).ok_or(Error::NotFound {
            kind: "block",
            id: id.0,
        })
    }

    pub fn program(&self, id: ProgramId) -> Result<&Program> {
        self.programs.get(&id).ok_or(Error::NotFound {
            kind: "program",
            id: id.0,
        })
    }

    /// Programs scheduled from `block`, by id.
    pub fn block_programs(&self, block: BlockId) -> impl Iterator<Item = &Program> + '_ {
        self.programs.values().filter(move |p| p.block == block)
    }

    pub fn find_application(&self, user: UserId, program: ProgramId) -> Option<&ProgramApplication> {
        self.applications.get(&program)?.get(&user)
    }

    /// Every application of `user`, attendee or alternate.
    pub fn user_applications(&self, user: UserId) -> impl Iterator<Item = &ProgramApplication> + '_ {
        self.applications
            .values()
            .filter_map(move |applications| applications.get(&user))
    }

    /// Number of regular (non-alternate) attendees of `program`.
    pub fn program_occupancy(&self, program: ProgramId) -> u32 {
        self.applications.get(&program).map_or(0, |applications| {
            applications.values().filter(|a| !a.alternate).count() as u32
        })
    }

    /// Applications of `program` in the order they were made.
    pub fn program_applications(&self, program: ProgramId) -> Vec<&ProgramApplication> {
        let mut applications: Vec<_> = self
            .applications
            .get(&program)
            .map(|applications| applications.values().collect())
            .unwrap_or_default();
        applications.sort_by_key(|a| (a.created_seq, a.user));
        applications
    }

    /// Waitlisted applications of `program`, next to be promoted first.
    pub fn program_alternates(&self, program: ProgramId) -> Vec<&ProgramApplication> {
        self.program_applications(program)
            .into_iter()
            .filter(|a| a.alternate)
            .collect()
    }
}
