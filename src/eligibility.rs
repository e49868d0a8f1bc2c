//! Who may attend what.

use crate::model::{Block, CategoryId, PaymentStatus, SubeventId, User};
use crate::state::RegistryState;
use std::collections::BTreeSet;

/// Approved and holding a role with the choose-programs permission.
pub fn can_choose_programs(state: &RegistryState, user: &User) -> bool {
    user.approved
        && user
            .roles
            .iter()
            .filter_map(|id| state.roles.get(id))
            .any(|role| role.choose_programs)
}

/// Categories whose registerable roles intersect the user's roles.
pub fn registerable_categories(state: &RegistryState, user: &User) -> BTreeSet<CategoryId> {
    state
        .categories
        .values()
        .filter(|category| !category.registerable_roles.is_disjoint(&user.roles))
        .map(|category| category.id)
        .collect()
}

/// Subevents the user applied for. With `paid_only`, applications still
/// waiting for payment are left out.
pub fn accessible_subevents(user: &User, paid_only: bool) -> BTreeSet<SubeventId> {
    user.subevents
        .iter()
        .filter(|(_, status)| !paid_only || **status == PaymentStatus::Paid)
        .map(|(id, _)| *id)
        .collect()
}

/// Whether payment gates program access under the current settings.
pub fn paid_only(state: &RegistryState) -> bool {
    !state.settings.allowed_register_programs_before_payment
}

/// May `user` attend programs of `block`?
pub fn is_allowed(state: &RegistryState, user: &User, block: &Block) -> bool {
    if !can_choose_programs(state, user) {
        return false;
    }

    let category_ok = match block.category.and_then(|id| state.categories.get(&id)) {
        Some(category) => !category.registerable_roles.is_disjoint(&user.roles),
        None => true,
    };

    category_ok
        && match user.subevents.get(&block.subevent) {
            Some(PaymentStatus::Paid) => true,
            Some(PaymentStatus::WaitingForPayment) => !paid_only(state),
            None => false,
        }
}
