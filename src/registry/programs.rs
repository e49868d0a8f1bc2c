use super::{require_name, Registry};
use crate::eligibility::is_allowed;
use crate::error::{Error, Result};
use crate::event::RegistryEvent;
use crate::model::{
    BlockDraft, BlockId, Category, CategoryId, MandatoryType, Program, ProgramId, Registration,
    RoleId, UserId,
};
use crate::reconcile::{
    all_programs, all_users, block_programs, clear_block, fill_vacancies, reconcile,
};
use crate::state::RegistryState;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

fn validate_block(state: &RegistryState, draft: &BlockDraft) -> Result<()> {
    if draft.name.trim().is_empty() {
        return Err(Error::invalid("block", "name must not be empty"));
    }
    if draft.duration == 0 {
        return Err(Error::invalid("block", "duration must be positive"));
    }
    if draft.capacity == Some(0) {
        return Err(Error::invalid("block", "capacity must be positive"));
    }
    if draft.mandatory == MandatoryType::AutoRegistered && draft.capacity.is_some() {
        return Err(Error::invalid(
            "block",
            "auto-registered blocks cannot limit capacity",
        ));
    }
    state.subevent(draft.subevent)?;
    if let Some(category) = draft.category {
        state.category(category)?;
    }
    for lector in &draft.lectors {
        state.user(*lector)?;
    }
    Ok(())
}

impl Registry {
    pub fn create_block(&mut self, draft: BlockDraft) -> Result<BlockId> {
        let mut tx = self.begin();
        validate_block(tx.state(), &draft)?;
        let id = BlockId(tx.allocate_id());
        let mut block = draft.into_block(id);
        block.name = block.name.trim().to_string();
        tx.emit(RegistryEvent::BlockSaved(block));
        self.commit(tx)?;
        Ok(id)
    }

    /// Replace a block's editable fields.
    ///
    /// Leaving [`MandatoryType::AutoRegistered`] unregisters everybody from
    /// the block's programs. A change of mandatory type, category or
    /// subevent reconciles all users over the block's programs; a change of
    /// capacity or of the alternates flag only refills the waitlists.
    pub fn update_block(&mut self, id: BlockId, draft: BlockDraft) -> Result<()> {
        let mut tx = self.begin();
        let old = tx.state().block(id)?.clone();
        validate_block(tx.state(), &draft)?;
        let mut block = draft.into_block(id);
        block.name = block.name.trim().to_string();
        if block == old {
            return Ok(());
        }
        tx.emit(RegistryEvent::BlockSaved(block.clone()));

        if old.mandatory == MandatoryType::AutoRegistered
            && block.mandatory != MandatoryType::AutoRegistered
        {
            clear_block(&mut tx, id);
        }

        let programs = block_programs(tx.state(), id);
        if old.mandatory != block.mandatory
            || old.category != block.category
            || old.subevent != block.subevent
        {
            let users = all_users(tx.state());
            reconcile(&mut tx, &users, &programs);
        } else if old.capacity != block.capacity
            || old.alternates_allowed != block.alternates_allowed
        {
            for program in programs {
                fill_vacancies(&mut tx, program);
            }
        }

        self.commit(tx)
    }

    /// Change only the mandatory type of a block.
    pub fn update_block_mandatory(&mut self, id: BlockId, mandatory: MandatoryType) -> Result<()> {
        let mut draft = BlockDraft::from(self.state().block(id)?);
        draft.mandatory = mandatory;
        if mandatory == MandatoryType::AutoRegistered {
            draft.capacity = None;
        }
        self.update_block(id, draft)
    }

    /// Remove a block with all its programs and their applications.
    pub fn remove_block(&mut self, id: BlockId) -> Result<()> {
        let mut tx = self.begin();
        tx.state().block(id)?;
        clear_block(&mut tx, id);
        for program in block_programs(tx.state(), id) {
            tx.emit(RegistryEvent::ProgramRemoved { id: program });
        }
        tx.emit(RegistryEvent::BlockRemoved { id });
        self.commit(tx)
    }

    pub fn create_category(
        &mut self,
        name: &str,
        registerable_roles: impl IntoIterator<Item = RoleId>,
    ) -> Result<CategoryId> {
        let name = require_name("category", name)?;
        let mut tx = self.begin();
        let registerable_roles = existing_roles(tx.state(), registerable_roles)?;
        let id = CategoryId(tx.allocate_id());
        tx.emit(RegistryEvent::CategorySaved(Category {
            id,
            name,
            registerable_roles,
        }));
        self.commit(tx)?;
        Ok(id)
    }

    /// Rename a category or change who may register to its blocks.
    pub fn update_category(
        &mut self,
        id: CategoryId,
        name: &str,
        registerable_roles: impl IntoIterator<Item = RoleId>,
    ) -> Result<()> {
        let name = require_name("category", name)?;
        let mut tx = self.begin();
        let old = tx.state().category(id)?.clone();
        let registerable_roles = existing_roles(tx.state(), registerable_roles)?;
        let roles_changed = registerable_roles != old.registerable_roles;
        let category = Category {
            id,
            name,
            registerable_roles,
        };
        if category == old {
            return Ok(());
        }
        tx.emit(RegistryEvent::CategorySaved(category));

        if roles_changed {
            let programs = category_programs(tx.state(), id);
            let users = all_users(tx.state());
            reconcile(&mut tx, &users, &programs);
        }
        self.commit(tx)
    }

    /// Remove a category. Its blocks become uncategorized, opening them to
    /// every role.
    pub fn remove_category(&mut self, id: CategoryId) -> Result<()> {
        let mut tx = self.begin();
        tx.state().category(id)?;
        let programs = category_programs(tx.state(), id);

        let blocks: Vec<_> = tx
            .state()
            .blocks
            .values()
            .filter(|block| block.category == Some(id))
            .cloned()
            .collect();
        for mut block in blocks {
            block.category = None;
            tx.emit(RegistryEvent::BlockSaved(block));
        }
        tx.emit(RegistryEvent::CategoryRemoved { id });

        let users = all_users(tx.state());
        reconcile(&mut tx, &users, &programs);
        self.commit(tx)
    }

    /// Schedule a program of `block`. For auto-registered blocks every
    /// allowed user is registered right away.
    pub fn create_program(
        &mut self,
        block: BlockId,
        room: Option<String>,
        start: DateTime<Utc>,
    ) -> Result<ProgramId> {
        let mut tx = self.begin();
        tx.state().block(block)?;
        let id = ProgramId(tx.allocate_id());
        tx.emit(RegistryEvent::ProgramSaved(Program {
            id,
            block,
            room,
            start,
        }));

        let users = all_users(tx.state());
        reconcile(&mut tx, &users, &BTreeSet::from([id]));
        self.commit(tx)?;
        Ok(id)
    }

    /// Move a program to another room or time. Existing applications stay.
    pub fn update_program(
        &mut self,
        id: ProgramId,
        room: Option<String>,
        start: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.begin();
        let old = tx.state().program(id)?.clone();
        let program = Program {
            room,
            start,
            ..old.clone()
        };
        if program == old {
            return Ok(());
        }
        tx.emit(RegistryEvent::ProgramSaved(program));
        self.commit(tx)
    }

    /// Remove a program and every application to it.
    pub fn remove_program(&mut self, id: ProgramId) -> Result<()> {
        let mut tx = self.begin();
        tx.state().program(id)?;
        let removals: Vec<_> = tx
            .state()
            .program_applications(id)
            .into_iter()
            .map(|application| RegistryEvent::ApplicationRemoved {
                user: application.user,
                program: id,
            })
            .collect();
        for event in removals {
            tx.emit(event);
        }
        tx.emit(RegistryEvent::ProgramRemoved { id });
        self.commit(tx)
    }

    /// Register a user to a program on their own behalf.
    ///
    /// A full program takes the user as an alternate if its block allows
    /// alternates.
    ///
    /// # Errors
    ///
    /// [`Error::RegistrationClosed`] outside the registration window,
    /// [`Error::NotAllowed`], [`Error::AlreadyRegistered`],
    /// [`Error::BlockAlreadyAttended`] when the user has another program of
    /// the same block, [`Error::Overlap`] when the program collides with
    /// another of the user's programs, and [`Error::ProgramFull`].
    pub fn register_program(&mut self, user: UserId, program: ProgramId) -> Result<Registration> {
        let mut tx = self.begin();
        let alternate = {
            let state = tx.state();
            if !state.is_allowed_register_programs(self.now()) {
                return Err(Error::RegistrationClosed);
            }

            let user_ref = state.user(user)?;
            let program_ref = state.program(program)?;
            let block = state.block(program_ref.block)?;

            if state.find_application(user, program).is_some() {
                return Err(Error::AlreadyRegistered { user, program });
            }
            if !is_allowed(state, user_ref, block) {
                return Err(Error::NotAllowed { user, program });
            }

            let end = program_ref.end(block);
            for application in state.user_applications(user) {
                let Some(other) = state.programs.get(&application.program) else {
                    continue;
                };
                if other.block == block.id {
                    return Err(Error::BlockAlreadyAttended {
                        user,
                        block: block.id,
                    });
                }
                let Some(other_block) = state.blocks.get(&other.block) else {
                    continue;
                };
                if program_ref.start < other.end(other_block) && other.start < end {
                    return Err(Error::Overlap {
                        user,
                        program,
                        other: other.id,
                    });
                }
            }

            match block.capacity {
                Some(capacity) if state.program_occupancy(program) >= capacity => {
                    if !block.alternates_allowed {
                        return Err(Error::ProgramFull { program });
                    }
                    true
                }
                _ => false,
            }
        };

        tx.emit(RegistryEvent::ApplicationAdded {
            user,
            program,
            alternate,
        });
        self.commit(tx)?;
        Ok(if alternate {
            Registration::Alternate
        } else {
            Registration::Attendee
        })
    }

    /// Withdraw a user from a program. The seat goes to the next alternate.
    ///
    /// # Errors
    ///
    /// [`Error::RegistrationClosed`], [`Error::NotRegistered`], and
    /// [`Error::AutoRegistered`] for programs the registry assigns itself.
    pub fn unregister_program(&mut self, user: UserId, program: ProgramId) -> Result<()> {
        let mut tx = self.begin();
        let was_attendee = {
            let state = tx.state();
            if !state.is_allowed_register_programs(self.now()) {
                return Err(Error::RegistrationClosed);
            }
            let block = state.block(state.program(program)?.block)?;
            let application = state
                .find_application(user, program)
                .ok_or(Error::NotRegistered { user, program })?;
            if block.mandatory == MandatoryType::AutoRegistered {
                return Err(Error::AutoRegistered { block: block.id });
            }
            !application.alternate
        };

        tx.emit(RegistryEvent::ApplicationRemoved { user, program });
        if was_attendee {
            fill_vacancies(&mut tx, program);
        }
        self.commit(tx)
    }

    /// Drop the user's programs they may no longer attend and register them
    /// to auto-registered programs they now qualify for.
    pub fn update_user_programs(&mut self, user: UserId) -> Result<()> {
        self.update_users_programs([user])
    }

    pub fn update_users_programs(&mut self, users: impl IntoIterator<Item = UserId>) -> Result<()> {
        let mut tx = self.begin();
        let users: BTreeSet<UserId> = users.into_iter().collect();
        for user in &users {
            tx.state().user(*user)?;
        }
        let programs = all_programs(tx.state());
        reconcile(&mut tx, &users, &programs);
        self.commit(tx)
    }
}

fn existing_roles(
    state: &RegistryState,
    roles: impl IntoIterator<Item = RoleId>,
) -> Result<BTreeSet<RoleId>> {
    roles
        .into_iter()
        .map(|role| state.role(role).map(|_| role))
        .collect()
}

fn category_programs(state: &RegistryState, category: CategoryId) -> BTreeSet<ProgramId> {
    state
        .programs
        .values()
        .filter(|program| {
            state
                .blocks
                .get(&program.block)
                .is_some_and(|block| block.category == Some(category))
        })
        .map(|program| program.id)
        .collect()
}
