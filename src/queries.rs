//! Read-side questions asked about users, blocks and programs.

use crate::eligibility::{self, accessible_subevents, can_choose_programs, is_allowed};
use crate::error::Result;
use crate::model::{Block, BlockId, MandatoryType, Program, ProgramId, UserId};
use crate::state::RegistryState;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

impl RegistryState {
    /// Is program registration open at `now`?
    pub fn is_allowed_register_programs(&self, now: DateTime<Utc>) -> bool {
        self.settings.is_allowed_register_programs(now)
    }

    /// Blocks the user may attend.
    ///
    /// With `paid_only` set, subevents still waiting for payment do not
    /// count regardless of the settings.
    pub fn user_allowed_blocks(&self, user: UserId, paid_only: bool) -> Result<Vec<&Block>> {
        let user = self.user(user)?;
        if !can_choose_programs(self, user) {
            return Ok(Vec::new());
        }

        let paid_only = paid_only || eligibility::paid_only(self);
        let subevents = accessible_subevents(user, paid_only);
        let categories = eligibility::registerable_categories(self, user);

        Ok(self
            .blocks
            .values()
            .filter(|block| subevents.contains(&block.subevent))
            .filter(|block| block.category.is_none_or(|c| categories.contains(&c)))
            .collect())
    }

    /// Programs the user may register to. Empty for users without the
    /// choose-programs permission.
    pub fn user_allowed_programs(&self, user: UserId) -> Result<Vec<&Program>> {
        let user = self.user(user)?;
        Ok(self
            .programs
            .values()
            .filter(|program| {
                self.blocks
                    .get(&program.block)
                    .is_some_and(|block| is_allowed(self, user, block))
            })
            .collect())
    }

    /// Programs the user attends as a regular attendee.
    pub fn user_attends_programs(&self, user: UserId) -> Vec<&Program> {
        self.user_applications(user)
            .filter(|application| !application.alternate)
            .filter_map(|application| self.programs.get(&application.program))
            .collect()
    }

    /// Programs the user is waitlisted for.
    pub fn user_alternate_programs(&self, user: UserId) -> Vec<&Program> {
        self.user_applications(user)
            .filter(|application| application.alternate)
            .filter_map(|application| self.programs.get(&application.program))
            .collect()
    }

    /// Blocks the user attends at least one program of.
    pub fn user_attends_blocks(&self, user: UserId) -> Vec<&Block> {
        let ids: BTreeSet<BlockId> = self
            .user_attends_programs(user)
            .into_iter()
            .map(|program| program.block)
            .collect();
        ids.iter().filter_map(|id| self.blocks.get(id)).collect()
    }

    /// Mandatory (or auto-registered) blocks the user is allowed for but
    /// does not attend any program of.
    pub fn unregistered_user_mandatory_blocks(&self, user: UserId) -> Result<Vec<&Block>> {
        let attended: BTreeSet<BlockId> = self
            .user_attends_blocks(user)
            .into_iter()
            .map(|block| block.id)
            .collect();
        Ok(self
            .user_allowed_blocks(user, false)?
            .into_iter()
            .filter(|block| block.mandatory != MandatoryType::Voluntary)
            .filter(|block| !attended.contains(&block.id))
            .collect())
    }

    pub fn unregistered_user_mandatory_blocks_names(&self, user: UserId) -> Result<Vec<String>> {
        Ok(self
            .unregistered_user_mandatory_blocks(user)?
            .into_iter()
            .map(|block| block.name.clone())
            .collect())
    }

    /// Names of [`unregistered_user_mandatory_blocks`](Self::unregistered_user_mandatory_blocks)
    /// joined with `", "`.
    pub fn unregistered_user_mandatory_blocks_names_text(&self, user: UserId) -> Result<String> {
        Ok(self.unregistered_user_mandatory_blocks_names(user)?.join(", "))
    }

    /// Users registered to `program` as regular attendees, by registration order.
    pub fn program_attendees(&self, program: ProgramId) -> Vec<UserId> {
        self.program_applications(program)
            .into_iter()
            .filter(|application| !application.alternate)
            .map(|application| application.user)
            .collect()
    }
}
