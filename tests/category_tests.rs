mod common;

use common::{at, attendee, seminar};
use seminarfold::{BlockDraft, Error, MandatoryType};

#[test]
fn test_narrowing_category_roles_unregisters() {
    let mut s = seminar();
    let registry = &mut s.registry;
    let subevent = registry.create_subevent("subevent").unwrap();
    let scouts = registry.create_role("scouts", true).unwrap();
    let guides = registry.create_role("guides", true).unwrap();
    let scout = attendee(registry, &[scouts], &[subevent]);
    let guide = attendee(registry, &[guides], &[subevent]);

    let category = registry
        .create_category("workshops", [scouts, guides])
        .unwrap();
    let block = registry
        .create_block(BlockDraft::new("knots", subevent).with_category(category))
        .unwrap();
    let program = registry.create_program(block, None, at(8, 0)).unwrap();
    registry.register_program(scout, program).unwrap();
    registry.register_program(guide, program).unwrap();

    registry
        .update_category(category, "workshops", [scouts])
        .unwrap();

    assert_eq!(registry.state().program_attendees(program), vec![scout]);
}

#[test]
fn test_widening_category_roles_auto_registers() {
    let mut s = seminar();
    let registry = &mut s.registry;
    let subevent = registry.create_subevent("subevent").unwrap();
    let scouts = registry.create_role("scouts", true).unwrap();
    let guides = registry.create_role("guides", true).unwrap();
    let scout = attendee(registry, &[scouts], &[subevent]);
    let guide = attendee(registry, &[guides], &[subevent]);

    let category = registry.create_category("ceremonies", [scouts]).unwrap();
    let block = registry
        .create_block(
            BlockDraft::new("opening", subevent)
                .with_category(category)
                .with_mandatory(MandatoryType::AutoRegistered),
        )
        .unwrap();
    let program = registry.create_program(block, None, at(8, 0)).unwrap();
    assert_eq!(registry.state().program_attendees(program), vec![scout]);

    registry
        .update_category(category, "ceremonies", [scouts, guides])
        .unwrap();

    assert_eq!(
        registry.state().program_attendees(program),
        vec![scout, guide]
    );
}

#[test]
fn test_renaming_category_keeps_applications() {
    let mut s = seminar();
    let registry = &mut s.registry;
    let subevent = registry.create_subevent("subevent").unwrap();
    let role = registry.create_role("role", true).unwrap();
    let user = attendee(registry, &[role], &[subevent]);
    let category = registry.create_category("old", [role]).unwrap();
    let block = registry
        .create_block(BlockDraft::new("block", subevent).with_category(category))
        .unwrap();
    let program = registry.create_program(block, None, at(8, 0)).unwrap();
    registry.register_program(user, program).unwrap();

    registry.update_category(category, " new ", [role]).unwrap();

    let state = registry.state();
    assert_eq!(state.category(category).unwrap().name, "new");
    assert!(state.find_application(user, program).is_some());
}

#[test]
fn test_remove_category_opens_blocks_to_everyone() {
    let mut s = seminar();
    let registry = &mut s.registry;
    let subevent = registry.create_subevent("subevent").unwrap();
    let scouts = registry.create_role("scouts", true).unwrap();
    let guides = registry.create_role("guides", true).unwrap();
    let scout = attendee(registry, &[scouts], &[subevent]);
    let guide = attendee(registry, &[guides], &[subevent]);

    let category = registry.create_category("ceremonies", [scouts]).unwrap();
    let block = registry
        .create_block(
            BlockDraft::new("opening", subevent)
                .with_category(category)
                .with_mandatory(MandatoryType::AutoRegistered),
        )
        .unwrap();
    let program = registry.create_program(block, None, at(8, 0)).unwrap();

    registry.remove_category(category).unwrap();

    let state = registry.state();
    assert!(state.category(category).is_err());
    assert_eq!(state.block(block).unwrap().category, None);
    assert_eq!(state.program_attendees(program), vec![scout, guide]);
}

#[test]
fn test_category_with_unknown_role() {
    let mut s = seminar();
    let registry = &mut s.registry;
    let role = registry.create_role("role", true).unwrap();

    let err = registry
        .create_category("category", [role, seminarfold::RoleId(999)])
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "role", id: 999 }));
    assert!(registry.state().categories.is_empty());
}
