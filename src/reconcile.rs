//! Keeps program applications consistent with eligibility and capacity.
//!
//! Every command stages its changes in a [`Transaction`]. After the primary
//! mutation the command calls [`reconcile`] for the users and programs it may
//! have affected; the resulting application events land in the same journal
//! record as the mutation itself.

use crate::eligibility::is_allowed;
use crate::event::RegistryEvent;
use crate::model::{BlockId, MandatoryType, ProgramId, UserId};
use crate::state::{apply, RegistryState};
use std::collections::BTreeSet;

/// Staged state of a command that has not been committed yet.
#[derive(Debug)]
pub(crate) struct Transaction {
    state: RegistryState,
    events: Vec<RegistryEvent>,
    seq: u64,
}

impl Transaction {
    pub(crate) fn new(state: RegistryState) -> Self {
        let seq = state.last_seq + 1;
        Transaction {
            state,
            events: Vec::new(),
            seq,
        }
    }

    pub(crate) fn state(&self) -> &RegistryState {
        &self.state
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Record an event and fold it into the staged state right away, so the
    /// rest of the command sees its effect.
    pub(crate) fn emit(&mut self, event: RegistryEvent) {
        self.state = apply(std::mem::take(&mut self.state), &event, self.seq);
        self.events.push(event);
    }

    /// Reserve an id for an entity saved in this transaction.
    pub(crate) fn allocate_id(&mut self) -> u64 {
        let id = self.state.next_id.max(1);
        self.state.next_id = id + 1;
        id
    }

    pub(crate) fn into_parts(self) -> (RegistryState, Vec<RegistryEvent>) {
        (self.state, self.events)
    }
}

pub(crate) fn all_users(state: &RegistryState) -> BTreeSet<UserId> {
    state.users.keys().copied().collect()
}

pub(crate) fn all_programs(state: &RegistryState) -> BTreeSet<ProgramId> {
    state.programs.keys().copied().collect()
}

pub(crate) fn block_programs(state: &RegistryState, block: BlockId) -> BTreeSet<ProgramId> {
    state.block_programs(block).map(|p| p.id).collect()
}

/// Drop applications of users no longer allowed, register allowed users to
/// auto-registered programs, then refill freed seats from the waitlist.
pub(crate) fn reconcile(
    tx: &mut Transaction,
    users: &BTreeSet<UserId>,
    programs: &BTreeSet<ProgramId>,
) {
    for &program_id in programs {
        let changes = {
            let state = tx.state();
            let Some(block) = state
                .programs
                .get(&program_id)
                .and_then(|program| state.blocks.get(&program.block))
            else {
                continue;
            };

            let mut changes = Vec::new();
            for user in users.iter().filter_map(|id| state.users.get(id)) {
                let allowed = is_allowed(state, user, block);
                let applied = state.find_application(user.id, program_id).is_some();

                if applied && !allowed {
                    changes.push(RegistryEvent::ApplicationRemoved {
                        user: user.id,
                        program: program_id,
                    });
                } else if !applied && allowed && block.mandatory == MandatoryType::AutoRegistered {
                    changes.push(RegistryEvent::ApplicationAdded {
                        user: user.id,
                        program: program_id,
                        alternate: false,
                    });
                }
            }
            changes
        };

        for event in changes {
            tx.emit(event);
        }
        fill_vacancies(tx, program_id);
    }
}

/// Promote alternates, oldest first, while the program has free seats. If
/// the block no longer takes alternates, whoever is left on the waitlist is
/// dropped.
pub(crate) fn fill_vacancies(tx: &mut Transaction, program_id: ProgramId) {
    let (promote, drop) = {
        let state = tx.state();
        let Some(block) = state
            .programs
            .get(&program_id)
            .and_then(|program| state.blocks.get(&program.block))
        else {
            return;
        };

        let mut waiting: Vec<UserId> = state
            .program_alternates(program_id)
            .iter()
            .map(|application| application.user)
            .collect();
        let free = match block.capacity {
            Some(capacity) => capacity.saturating_sub(state.program_occupancy(program_id)) as usize,
            None => waiting.len(),
        };
        let rest = waiting.split_off(free.min(waiting.len()));
        let drop = if block.alternates_allowed { Vec::new() } else { rest };
        (waiting, drop)
    };

    for user in promote {
        tx.emit(RegistryEvent::AlternatePromoted {
            user,
            program: program_id,
        });
    }
    for user in drop {
        tx.emit(RegistryEvent::ApplicationRemoved {
            user,
            program: program_id,
        });
    }
}

/// Unregister everybody from every program of `block`.
pub(crate) fn clear_block(tx: &mut Transaction, block: BlockId) {
    let removals: Vec<RegistryEvent> = {
        let state = tx.state();
        state
            .block_programs(block)
            .flat_map(|program| state.program_applications(program.id))
            .map(|application| RegistryEvent::ApplicationRemoved {
                user: application.user,
                program: application.program,
            })
            .collect()
    };
    for event in removals {
        tx.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockDraft, PaymentStatus, Program, Role, RoleId, SubeventId, User};
    use chrono::{TimeZone, Utc};

    fn seeded(mandatory: MandatoryType, capacity: Option<u32>, users: u64) -> Transaction {
        let mut tx = Transaction::new(RegistryState::default());
        tx.emit(RegistryEvent::RoleSaved(Role {
            id: RoleId(1),
            name: "attendee".into(),
            choose_programs: true,
        }));
        for n in 0..users {
            let mut user = User::new(UserId(10 + n), format!("user {n}"));
            user.approved = true;
            user.roles.insert(RoleId(1));
            user.subevents.insert(SubeventId(2), PaymentStatus::Paid);
            tx.emit(RegistryEvent::UserSaved(user));
        }
        let mut draft = BlockDraft::new("block", SubeventId(2))
            .with_mandatory(mandatory)
            .with_alternates(true);
        draft.capacity = capacity;
        tx.emit(RegistryEvent::BlockSaved(draft.into_block(BlockId(3))));
        tx.emit(RegistryEvent::ProgramSaved(Program {
            id: ProgramId(4),
            block: BlockId(3),
            room: None,
            start: Utc.with_ymd_and_hms(2020, 1, 1, 8, 0, 0).unwrap(),
        }));
        tx
    }

    #[test]
    fn auto_registered_block_registers_everybody_allowed() {
        let mut tx = seeded(MandatoryType::AutoRegistered, None, 3);
        let users = all_users(tx.state());
        reconcile(&mut tx, &users, &[ProgramId(4)].into());
        assert_eq!(tx.state().program_occupancy(ProgramId(4)), 3);
    }

    #[test]
    fn voluntary_block_registers_nobody() {
        let mut tx = seeded(MandatoryType::Voluntary, None, 3);
        let users = all_users(tx.state());
        reconcile(&mut tx, &users, &[ProgramId(4)].into());
        assert_eq!(tx.state().program_occupancy(ProgramId(4)), 0);
    }

    #[test]
    fn promotes_oldest_alternate_first() {
        let mut tx = seeded(MandatoryType::Voluntary, Some(1), 3);
        for (user, alternate) in [(10, false), (12, true), (11, true)] {
            tx.emit(RegistryEvent::ApplicationAdded {
                user: UserId(user),
                program: ProgramId(4),
                alternate,
            });
            tx.seq += 1;
        }
        tx.emit(RegistryEvent::ApplicationRemoved {
            user: UserId(10),
            program: ProgramId(4),
        });
        fill_vacancies(&mut tx, ProgramId(4));

        let state = tx.state();
        assert!(!state.find_application(UserId(12), ProgramId(4)).unwrap().alternate);
        assert!(state.find_application(UserId(11), ProgramId(4)).unwrap().alternate);
    }

    #[test]
    fn clear_block_removes_all_applications() {
        let mut tx = seeded(MandatoryType::AutoRegistered, None, 2);
        let users = all_users(tx.state());
        reconcile(&mut tx, &users, &[ProgramId(4)].into());
        clear_block(&mut tx, BlockId(3));
        assert!(tx.state().program_applications(ProgramId(4)).is_empty());
    }
}
