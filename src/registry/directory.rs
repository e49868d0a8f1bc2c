use super::{require_name, Registry};
use crate::error::{Error, Result};
use crate::event::RegistryEvent;
use crate::model::{PaymentStatus, Role, RoleId, Subevent, SubeventId, User, UserId};
use crate::reconcile::{all_programs, all_users, reconcile};
use crate::settings::Settings;
use std::collections::BTreeSet;

impl Registry {
    pub fn create_role(&mut self, name: &str, choose_programs: bool) -> Result<RoleId> {
        let name = require_name("role", name)?;
        let mut tx = self.begin();
        let id = RoleId(tx.allocate_id());
        tx.emit(RegistryEvent::RoleSaved(Role {
            id,
            name,
            choose_programs,
        }));
        self.commit(tx)?;
        Ok(id)
    }

    /// Rename a role or change its permission. Holders of the role have
    /// their programs reconciled when the permission changes.
    pub fn update_role(&mut self, id: RoleId, name: &str, choose_programs: bool) -> Result<()> {
        let name = require_name("role", name)?;
        let mut tx = self.begin();
        let old = tx.state().role(id)?.clone();
        let role = Role {
            id,
            name,
            choose_programs,
        };
        if role == old {
            return Ok(());
        }
        tx.emit(RegistryEvent::RoleSaved(role));

        if old.choose_programs != choose_programs {
            let holders: BTreeSet<UserId> = tx
                .state()
                .users
                .values()
                .filter(|user| user.roles.contains(&id))
                .map(|user| user.id)
                .collect();
            let programs = all_programs(tx.state());
            reconcile(&mut tx, &holders, &programs);
        }
        self.commit(tx)
    }

    pub fn create_subevent(&mut self, name: &str) -> Result<SubeventId> {
        let name = require_name("subevent", name)?;
        let mut tx = self.begin();
        let id = SubeventId(tx.allocate_id());
        tx.emit(RegistryEvent::SubeventSaved(Subevent { id, name }));
        self.commit(tx)?;
        Ok(id)
    }

    pub fn rename_subevent(&mut self, id: SubeventId, name: &str) -> Result<()> {
        let name = require_name("subevent", name)?;
        let mut tx = self.begin();
        if tx.state().subevent(id)?.name == name {
            return Ok(());
        }
        tx.emit(RegistryEvent::SubeventSaved(Subevent { id, name }));
        self.commit(tx)
    }

    /// Remove a subevent nobody schedules blocks in. Users' applications for
    /// it are dropped.
    pub fn remove_subevent(&mut self, id: SubeventId) -> Result<()> {
        let mut tx = self.begin();
        tx.state().subevent(id)?;
        if let Some(block) = tx.state().blocks.values().find(|b| b.subevent == id) {
            return Err(Error::InUse {
                kind: "subevent",
                id: id.0,
                reason: format!("{} belongs to it", block.id),
            });
        }

        let applicants: Vec<User> = tx
            .state()
            .users
            .values()
            .filter(|user| user.subevents.contains_key(&id))
            .cloned()
            .collect();
        for mut user in applicants {
            user.subevents.remove(&id);
            tx.emit(RegistryEvent::UserSaved(user));
        }
        tx.emit(RegistryEvent::SubeventRemoved { id });
        self.commit(tx)
    }

    /// Create a user. New users are not approved and hold no roles.
    pub fn create_user(&mut self, display_name: &str) -> Result<UserId> {
        let display_name = require_name("user", display_name)?;
        let mut tx = self.begin();
        let id = UserId(tx.allocate_id());
        tx.emit(RegistryEvent::UserSaved(User::new(id, display_name)));
        self.commit(tx)?;
        Ok(id)
    }

    pub fn set_user_roles(
        &mut self,
        user: UserId,
        roles: impl IntoIterator<Item = RoleId>,
    ) -> Result<()> {
        let roles: BTreeSet<RoleId> = roles.into_iter().collect();
        for role in &roles {
            self.state().role(*role)?;
        }
        self.save_user(user, |u| {
            u.roles = roles;
            Ok(())
        })
    }

    pub fn set_user_approved(&mut self, user: UserId, approved: bool) -> Result<()> {
        self.save_user(user, |u| {
            u.approved = approved;
            Ok(())
        })
    }

    /// Record the user's application for a subevent, or change its payment
    /// state if it exists.
    pub fn apply_for_subevent(
        &mut self,
        user: UserId,
        subevent: SubeventId,
        status: PaymentStatus,
    ) -> Result<()> {
        self.state().subevent(subevent)?;
        self.save_user(user, |u| {
            u.subevents.insert(subevent, status);
            Ok(())
        })
    }

    pub fn mark_subevent_paid(&mut self, user: UserId, subevent: SubeventId) -> Result<()> {
        self.save_user(user, |u| match u.subevents.get_mut(&subevent) {
            Some(status) => {
                *status = PaymentStatus::Paid;
                Ok(())
            }
            None => Err(Error::NotFound {
                kind: "subevent application",
                id: subevent.0,
            }),
        })
    }

    pub fn cancel_subevent(&mut self, user: UserId, subevent: SubeventId) -> Result<()> {
        self.save_user(user, |u| match u.subevents.remove(&subevent) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound {
                kind: "subevent application",
                id: subevent.0,
            }),
        })
    }

    /// Change the settings. Toggling payment gating reconciles everybody.
    pub fn update_settings(&mut self, update: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut tx = self.begin();
        let old = tx.state().settings.clone();
        let mut settings = old.clone();
        update(&mut settings);
        if settings == old {
            return Ok(());
        }

        if let (Some(from), Some(to)) = (settings.register_programs_from, settings.register_programs_to) {
            if from > to {
                return Err(Error::invalid(
                    "settings",
                    "program registration must open before it closes",
                ));
            }
        }

        let gating_changed = settings.allowed_register_programs_before_payment
            != old.allowed_register_programs_before_payment;
        tx.emit(RegistryEvent::SettingsChanged(settings));
        if gating_changed {
            let users = all_users(tx.state());
            let programs = all_programs(tx.state());
            reconcile(&mut tx, &users, &programs);
        }
        self.commit(tx)
    }

    /// Apply `change` to a user and reconcile their programs in the same
    /// record.
    fn save_user(
        &mut self,
        id: UserId,
        change: impl FnOnce(&mut User) -> Result<()>,
    ) -> Result<()> {
        let mut tx = self.begin();
        let mut user = tx.state().user(id)?.clone();
        change(&mut user)?;
        if &user == tx.state().user(id)? {
            return Ok(());
        }

        tx.emit(RegistryEvent::UserSaved(user));
        let programs = all_programs(tx.state());
        reconcile(&mut tx, &BTreeSet::from([id]), &programs);
        self.commit(tx)
    }
}
