use crate::expr::*;
use crate::state::*;

fn eax() -> Register {
    Register::new("eax", 32)
}

fn al() -> Register {
    Register::new_slice("al", &eax(), 0, 8)
}

fn ah() -> Register {
    Register::new_slice("ah", &eax(), 8, 8)
}

fn stack(displacement: i64) -> Memory {
    let address = Address::new(
        Some(expr_register("esp", 32)),
        None,
        0,
        displacement,
        Some("ss".to_string()),
        32,
    )
    .unwrap();
    Memory::new(address, 32)
}

#[test]
fn unbound_locations_are_identities() {
    let state = StateMap::new();
    assert_eq!(state.read_register(&eax()), expr_register("eax", 32));
    assert_eq!(state.read_register(&al()).to_string(), "eax[0:8]");
    assert_eq!(
        state.read(&Location::Memory(stack(4))),
        Expression::Memory(stack(4))
    );
    assert!(state.is_empty());
}

#[test]
fn sub_register_projection() {
    let mut state = StateMap::new();
    state
        .write_register(&eax(), expr_const(0x1234_5678, 32))
        .unwrap();
    assert_eq!(state.read_register(&al()), expr_const(0x78, 8));
    assert_eq!(state.read_register(&ah()), expr_const(0x56, 8));
}

#[test]
fn sub_register_merge() {
    let mut state = StateMap::new();
    state
        .write_register(&eax(), expr_const(0x1234_5678, 32))
        .unwrap();
    state.write_register(&ah(), expr_const(0xab, 8)).unwrap();
    assert_eq!(state.read_register(&eax()), expr_const(0x1234_ab78, 32));

    state.write_register(&al(), expr_const(0xcd, 8)).unwrap();
    assert_eq!(state.read_register(&eax()), expr_const(0x1234_abcd, 32));
}

#[test]
fn symbolic_merge_keeps_untouched_bits() {
    let mut state = StateMap::new();
    state.write_register(&ah(), expr_const(1, 8)).unwrap();
    let eax_value = state.read_register(&eax());
    assert_eq!(
        Expression::extract(eax_value.clone(), 0, 8).unwrap().simplify().to_string(),
        "eax[0:8]"
    );
    assert_eq!(
        Expression::extract(eax_value, 16, 16).unwrap().simplify().to_string(),
        "eax[16:32]"
    );
    assert_eq!(state.read_register(&ah()), expr_const(1, 8));
}

#[test]
fn writing_identity_slice_restores_register() {
    let mut state = StateMap::new();
    let value = state.read_register(&al());
    state.write_register(&al(), value).unwrap();
    assert_eq!(state.read_register(&eax()), expr_register("eax", 32));
}

#[test]
fn width_mismatch_is_rejected() {
    let mut state = StateMap::new();
    assert!(state.write_register(&eax(), expr_const(1, 8)).is_err());
    assert!(state.write_memory(&stack(0), expr_const(1, 16)).is_err());
}

#[test]
fn memory_exact_address() {
    let mut state = StateMap::new();
    state
        .write(Location::Memory(stack(-4)), expr_register("eax", 32))
        .unwrap();

    // The same location, computed differently, normalizes to the same key.
    let esp = Expression::add(expr_register("esp", 32), expr_const(0xffff_fffc, 32)).unwrap();
    let address = Address::new(Some(esp), None, 0, 0, Some("ss".to_string()), 32).unwrap();
    assert_eq!(
        state.read_memory(&Memory::new(address, 32)),
        expr_register("eax", 32)
    );

    // Overlapping but not identical addresses are independent.
    assert_eq!(
        state.read_memory(&stack(-2)),
        Expression::Memory(stack(-2))
    );
}

#[test]
fn memory_narrow_and_wide_reads() {
    let mut state = StateMap::new();
    state
        .write_memory(&stack(0), expr_const(0x1122_3344, 32))
        .unwrap();

    let narrow = Memory::new(stack(0).address().clone(), 8);
    assert_eq!(state.read_memory(&narrow), expr_const(0x44, 8));

    let wide = Memory::new(stack(0).address().clone(), 64);
    let value = state.read_memory(&wide);
    assert_eq!(
        Expression::extract(value.clone(), 0, 32).unwrap().simplify(),
        expr_const(0x1122_3344, 32)
    );
    assert_eq!(
        Expression::extract(value, 32, 32).unwrap().simplify(),
        Expression::Memory(stack(4))
    );
}

#[test]
fn eval_substitutes_pre_state() {
    let mut state = StateMap::new();
    state
        .write_register(&Register::new("esp", 32), expr_const(0x1000, 32))
        .unwrap();
    state
        .write_memory(
            &Memory::new(Address::absolute(0x1004, Some("ss".to_string()), 32), 32),
            expr_const(7, 32),
        )
        .unwrap();

    let value = state.eval(&Expression::Memory(stack(4))).unwrap();
    assert_eq!(value, expr_const(7, 32));

    let sum = Expression::add(expr_register("esp", 32), expr_register("ebx", 32)).unwrap();
    assert_eq!(state.eval(&sum).unwrap().to_string(), "(ebx+0x1000)");
}

#[test]
fn snapshot_restore() {
    let mut state = StateMap::new();
    state.write_register(&eax(), expr_const(1, 32)).unwrap();
    let snapshot = state.snapshot();

    state.write_register(&eax(), expr_const(2, 32)).unwrap();
    state.write_memory(&stack(0), expr_const(3, 32)).unwrap();
    assert_eq!(state.len(), 2);

    state.restore(snapshot);
    assert_eq!(state.read_register(&eax()), expr_const(1, 32));
    assert_eq!(state.len(), 1);
}

#[test]
fn clones_do_not_share_writes() {
    let mut state = StateMap::new();
    state.write_register(&eax(), expr_const(1, 32)).unwrap();
    let before = state.clone();
    state.write_register(&eax(), expr_const(2, 32)).unwrap();
    assert_eq!(before.read_register(&eax()), expr_const(1, 32));
    assert_eq!(state.read_register(&eax()), expr_const(2, 32));
}

#[test]
fn display() {
    let mut state = StateMap::new();
    state.write_register(&eax(), expr_const(3, 32)).unwrap();
    state
        .write_memory(&stack(-4), expr_register("ebx", 32))
        .unwrap();
    assert_eq!(state.to_string(), "eax <- 0x3\nM32ss(esp-4) <- ebx\n");
}
