use crate::disassembler::x86::*;
use crate::disassembler::{render, Flow, Syntax, TokenKind};
use crate::expr::*;
use crate::state::StateMap;
use crate::{DecodeError, Error};

fn x86(bytes: &[u8]) -> Instruction {
    decode(Mode::X86, bytes, None).unwrap()
}

fn x86_at(bytes: &[u8], address: u64) -> Instruction {
    decode(Mode::X86, bytes, Some(address)).unwrap()
}

fn amd64(bytes: &[u8]) -> Instruction {
    decode(Mode::Amd64, bytes, None).unwrap()
}

fn intel(instruction: &Instruction) -> String {
    render(&instruction.tokens(Syntax::Intel))
}

fn att(instruction: &Instruction) -> String {
    render(&instruction.tokens(Syntax::Att))
}

fn register(mode: Mode, name: &str) -> Register {
    mode.get_register(name).unwrap()
}

fn set(state: &mut StateMap, mode: Mode, name: &str, value: Expression) {
    state.write_register(&register(mode, name), value).unwrap();
}

fn get(state: &StateMap, mode: Mode, name: &str) -> Expression {
    state.read_register(&register(mode, name))
}

fn flag(state: &StateMap, mode: Mode, flag: Flag) -> Expression {
    state.read_register(&mode.flag(flag))
}

/// A state with eip at `pc`.
fn state_at(pc: u64) -> StateMap {
    let mut state = StateMap::new();
    set(&mut state, Mode::X86, "eip", expr_const(pc, 32));
    state
}

fn absolute(address: u64, bits: usize) -> Memory {
    Memory::new(Address::absolute(address, None, 32), bits)
}

#[test]
fn decode_nop() {
    let instruction = x86(&[0x90]);
    assert_eq!(instruction.mnemonic(), "NOP");
    assert_eq!(instruction.length(), 1);
    assert!(instruction.operands().is_empty());
    assert_eq!(instruction.flow(), Flow::Sequential);
}

#[test]
fn decode_consumes_only_one_instruction() {
    let instruction = x86(&[0x83, 0xfa, 0x00, 0x90, 0x90]);
    assert_eq!(instruction.length(), 3);
    assert_eq!(instruction.bytes(), &[0x83, 0xfa, 0x00]);
}

#[test]
fn decode_truncated() {
    match decode(Mode::X86, &[0x0f], None) {
        Err(DecodeError::TruncatedInput { .. }) => {}
        result => panic!("unexpected {:?}", result),
    }
    match decode(Mode::X86, &[0xb8, 0x01, 0x02], None) {
        Err(DecodeError::TruncatedInput { .. }) => {}
        result => panic!("unexpected {:?}", result),
    }
    assert!(decode(Mode::X86, &[], None).is_err());
}

#[test]
fn decode_last_byte_without_modrm() {
    let instruction = x86(&[0x90]);
    assert_eq!(instruction.mnemonic(), "NOP");

    let instruction = x86(&[0xf3, 0x90]);
    assert_eq!(instruction.mnemonic(), "PAUSE");
    assert_eq!(instruction.length(), 2);
    assert!(!instruction.is_rep());

    let instruction = amd64(&[0x41, 0x90]);
    assert_eq!(instruction.mnemonic(), "XCHG");
    assert_eq!(instruction.length(), 2);
}

#[test]
fn decode_near_branch_ignores_operand_size_in_long_mode() {
    let instruction = amd64(&[0x66, 0xe9, 0x10, 0x00, 0x00, 0x00]);
    assert_eq!(instruction.mnemonic(), "JMP");
    assert_eq!(instruction.length(), 6);
    let immediate = instruction
        .operand(0)
        .and_then(|operand| operand.immediate())
        .unwrap();
    assert_eq!(immediate.bits(), 32);
    assert_eq!(immediate.value_i64(), 0x10);

    // 32-bit mode honours the prefix with a 16-bit displacement.
    let instruction = x86(&[0x66, 0xe9, 0x10, 0x00]);
    assert_eq!(instruction.length(), 4);
    assert_eq!(instruction.operand(0).map(|operand| operand.bits()), Some(16));
}

#[test]
fn decode_invalid_in_long_mode() {
    // push es does not exist in 64-bit mode
    assert_eq!(x86(&[0x06]).mnemonic(), "PUSH");
    match decode(Mode::Amd64, &[0x06], None) {
        Err(DecodeError::InvalidOpcode { opcode: 0x06, .. }) => {}
        result => panic!("unexpected {:?}", result),
    }
}

#[test]
fn decode_is_deterministic() {
    let bytes = [0x8b, 0x44, 0x8d, 0xf8];
    assert_eq!(x86(&bytes), x86(&bytes));
}

#[test]
fn decode_operand_sizes() {
    // mov ax, bx
    let instruction = x86(&[0x66, 0x89, 0xd8]);
    assert_eq!(intel(&instruction), "mov         ax, bx");
    assert!(instruction.prefixes().contains(Prefixes::OPERAND_SIZE));

    // mov rax, rbx
    let instruction = amd64(&[0x48, 0x89, 0xd8]);
    assert_eq!(intel(&instruction), "mov         rax, rbx");
    assert!(instruction.prefixes().contains(Prefixes::REX_W));

    // push in long mode defaults to 64 bits
    let instruction = amd64(&[0x55]);
    assert_eq!(intel(&instruction), "push        rbp");
}

#[test]
fn decode_sib_and_displacement() {
    // mov eax, [ebp+ecx*4-0x8]
    let instruction = x86(&[0x8b, 0x44, 0x8d, 0xf8]);
    let memory = instruction.operand(1).and_then(|operand| operand.memory()).unwrap();
    assert_eq!(memory.base().map(|base| base.name()), Some("ebp"));
    assert_eq!(memory.index().map(|index| index.name()), Some("ecx"));
    assert_eq!(memory.scale(), 4);
    assert_eq!(memory.displacement(), -8);
    assert_eq!(intel(&instruction), "mov         eax, [ebp+ecx*4-0x8]");
    assert_eq!(att(&instruction), "mov -0x8(%ebp,%ecx,4),%eax");
}

#[test]
fn format_intel() {
    assert_eq!(x86(&[0x83, 0xfa, 0x00]).to_string(), "cmp         edx, 0x0");
    assert_eq!(
        intel(&x86(&[0xc7, 0x45, 0xfc, 0x01, 0x00, 0x00, 0x00])),
        "mov         dword ptr [ebp-0x4], 0x1"
    );
    assert_eq!(intel(&x86(&[0x2e, 0x8b, 0x07])), "mov         eax, cs:[edi]");
    assert_eq!(intel(&x86(&[0x8d, 0x45, 0xfc])), "lea         eax, [ebp-0x4]");
    assert_eq!(intel(&x86(&[0xf3, 0xaf])), "repz scasd");
    assert_eq!(intel(&x86(&[0xc3])), "ret");
}

#[test]
fn format_relative_targets() {
    let call = x86_at(&[0xe8, 0x9b, 0xff, 0xff, 0xff], 0x0804_0005);
    assert_eq!(call.to_string(), "call        0x803ffa5");

    let tokens = call.tokens(Syntax::Intel);
    assert_eq!(tokens[0].kind(), TokenKind::Mnemonic);
    assert_eq!(tokens[1].kind(), TokenKind::Spacer);
    assert_eq!(tokens[2].kind(), TokenKind::Address);

    // Without an address, the target is relative to this instruction.
    assert_eq!(x86(&[0xeb, 0xfe]).to_string(), "jmp         $+0x0");
}

#[test]
fn format_att() {
    assert_eq!(att(&x86(&[0x83, 0xfa, 0x00])), "cmp $0x0,%edx");
    assert_eq!(
        att(&x86(&[0xc7, 0x45, 0xfc, 0x01, 0x00, 0x00, 0x00])),
        "movl $0x1,-0x4(%ebp)"
    );
    assert_eq!(att(&x86(&[0xf3, 0xaf])), "repz scasl");
    assert_eq!(att(&x86(&[0x0f, 0xb6, 0x01])), "movzbl (%ecx),%eax");
    assert_eq!(att(&x86(&[0x98])), "cwtl");
    assert_eq!(att(&x86(&[0xff, 0xd0])), "call *%eax");
    assert_eq!(att(&x86(&[0xc8, 0x10, 0x00, 0x00])), "enter $0x10,$0x0");
}

#[test]
fn json_round_trip() {
    let mut instruction = x86_at(&[0x8b, 0x44, 0x8d, 0xf8], 0x1000);
    instruction.annotate("comment", "load");
    let json = instruction.to_json().unwrap();
    let copy = Instruction::from_json(&json).unwrap();
    assert_eq!(copy, instruction);
    assert_eq!(copy.to_string(), instruction.to_string());
    assert_eq!(copy.misc().get("comment").map(|s| s.as_str()), Some("load"));
}

#[test]
fn json_rejects_garbage() {
    match Instruction::from_json("{\"mnemonic\": 3}") {
        Err(Error::Json(_)) => {}
        result => panic!("unexpected {:?}", result),
    }
}

#[test]
fn registry_covers_conditions() {
    let mnemonics = mnemonics();
    assert!(mnemonics.contains(&"MOV"));
    assert!(mnemonics.contains(&"JNE"));
    assert!(mnemonics.contains(&"SETGE"));
    assert!(mnemonics.contains(&"CMOVBE"));
}

#[test]
fn apply_advances_pc() {
    let state = x86(&[0x90]).apply(&state_at(0x1000));
    assert_eq!(get(&state, Mode::X86, "eip"), expr_const(0x1001, 32));
}

#[test]
fn apply_cmp_sets_zero_flag() {
    let state = x86(&[0x83, 0xfa, 0x00]).apply(&state_at(0));
    assert_eq!(flag(&state, Mode::X86, Flag::Zf).to_string(), "(edx==0x0)");
    assert_eq!(flag(&state, Mode::X86, Flag::Cf), expr_const(0, 1));
    // cmp writes no register but eflags and eip
    assert_eq!(get(&state, Mode::X86, "edx"), expr_register("edx", 32));
}

#[test]
fn apply_push_wraps_stack() {
    let mut state = state_at(0);
    set(&mut state, Mode::X86, "esp", expr_const(0, 32));
    let state = x86(&[0x50]).apply(&state);

    assert_eq!(get(&state, Mode::X86, "esp"), expr_const(0xffff_fffc, 32));
    let slot = absolute(0xffff_fffc, 32);
    assert_eq!(slot.to_string(), "M32(0xfffffffc)");
    assert_eq!(state.read_memory(&slot), expr_register("eax", 32));
}

#[test]
fn apply_leave_ret() {
    let state = StateMap::new();
    let state = x86(&[0xc9]).apply(&state);
    let state = x86(&[0xc3]).apply(&state);

    assert_eq!(get(&state, Mode::X86, "esp").to_string(), "(ebp+0x8)");
    assert_eq!(get(&state, Mode::X86, "eip").to_string(), "M32(ebp+4)");
    assert_eq!(get(&state, Mode::X86, "ebp").to_string(), "M32(ebp)");
}

#[test]
fn apply_is_simultaneous() {
    // xchg eax, ebx
    let state = x86(&[0x93]).apply(&state_at(0));
    assert_eq!(get(&state, Mode::X86, "eax"), expr_register("ebx", 32));
    assert_eq!(get(&state, Mode::X86, "ebx"), expr_register("eax", 32));
}

#[test]
fn apply_xor_self() {
    let state = x86(&[0x31, 0xc0]).apply(&state_at(0));
    assert_eq!(get(&state, Mode::X86, "eax"), expr_const(0, 32));
    assert_eq!(flag(&state, Mode::X86, Flag::Zf), expr_const(1, 1));
    assert_eq!(flag(&state, Mode::X86, Flag::Cf), expr_const(0, 1));
}

#[test]
fn apply_sub_register_write() {
    let mut state = state_at(0);
    set(&mut state, Mode::X86, "eax", expr_const(0x1234_5678, 32));
    // mov ah, 0xab
    let state = x86(&[0xb4, 0xab]).apply(&state);
    assert_eq!(get(&state, Mode::X86, "eax"), expr_const(0x1234_ab78, 32));
}

#[test]
fn apply_long_mode_zero_extends() {
    let mut state = StateMap::new();
    set(&mut state, Mode::Amd64, "rax", expr_const(0xffff_ffff_ffff_ffff, 64));
    // mov eax, 1
    let state = amd64(&[0xb8, 0x01, 0x00, 0x00, 0x00]).apply(&state);
    assert_eq!(get(&state, Mode::Amd64, "rax"), expr_const(1, 64));

    // mov ax, 2 keeps the upper bits
    let state = amd64(&[0x66, 0xb8, 0x02, 0x00]).apply(&state);
    assert_eq!(get(&state, Mode::Amd64, "rax"), expr_const(2, 64));
}

#[test]
fn apply_rip_relative() {
    let mut state = StateMap::new();
    set(&mut state, Mode::Amd64, "rip", expr_const(0x1000, 64));
    // lea rax, [rip+0x10]
    let state = amd64(&[0x48, 0x8d, 0x05, 0x10, 0x00, 0x00, 0x00]).apply(&state);
    assert_eq!(get(&state, Mode::Amd64, "rax"), expr_const(0x1017, 64));
}

#[test]
fn apply_add_flags() {
    let mut state = state_at(0);
    set(&mut state, Mode::X86, "eax", expr_const(0xffff_ffff, 32));
    // add eax, 1
    let state = x86(&[0x83, 0xc0, 0x01]).apply(&state);
    assert_eq!(get(&state, Mode::X86, "eax"), expr_const(0, 32));
    assert_eq!(flag(&state, Mode::X86, Flag::Cf), expr_const(1, 1));
    assert_eq!(flag(&state, Mode::X86, Flag::Zf), expr_const(1, 1));
    assert_eq!(flag(&state, Mode::X86, Flag::Of), expr_const(0, 1));
    assert_eq!(flag(&state, Mode::X86, Flag::Sf), expr_const(0, 1));
}

#[test]
fn apply_inc_keeps_carry() {
    let mut state = state_at(0);
    set(&mut state, Mode::X86, "eax", expr_const(0x7fff_ffff, 32));
    state
        .write_register(&Mode::X86.flag(Flag::Cf), expr_const(1, 1))
        .unwrap();
    let state = x86(&[0x40]).apply(&state);
    assert_eq!(get(&state, Mode::X86, "eax"), expr_const(0x8000_0000, 32));
    assert_eq!(flag(&state, Mode::X86, Flag::Cf), expr_const(1, 1));
    assert_eq!(flag(&state, Mode::X86, Flag::Of), expr_const(1, 1));
}

#[test]
fn apply_shl_by_one() {
    let mut state = state_at(0);
    set(&mut state, Mode::X86, "eax", expr_const(0x8000_0001, 32));
    let state = x86(&[0xd1, 0xe0]).apply(&state);
    assert_eq!(get(&state, Mode::X86, "eax"), expr_const(2, 32));
    assert_eq!(flag(&state, Mode::X86, Flag::Cf), expr_const(1, 1));
    assert_eq!(flag(&state, Mode::X86, Flag::Of), expr_const(1, 1));
}

#[test]
fn apply_rotate_through_carry() {
    let mut state = state_at(0);
    set(&mut state, Mode::X86, "eax", expr_const(0x81, 32));
    state
        .write_register(&Mode::X86.flag(Flag::Cf), expr_const(0, 1))
        .unwrap();
    // rcr al, 1
    let state = x86(&[0xd0, 0xd8]).apply(&state);
    assert_eq!(get(&state, Mode::X86, "al"), expr_const(0x40, 8));
    assert_eq!(flag(&state, Mode::X86, Flag::Cf), expr_const(1, 1));
}

#[test]
fn apply_shift_by_zero_changes_nothing() {
    let mut state = state_at(0);
    set(&mut state, Mode::X86, "ecx", expr_const(0x20, 32));
    // shl eax, cl with cl masked to 0
    let state = x86(&[0xd3, 0xe0]).apply(&state);
    assert_eq!(get(&state, Mode::X86, "eax"), expr_register("eax", 32));
    assert_eq!(flag(&state, Mode::X86, Flag::Cf).to_string(), "eflags[0:1]");
}

#[test]
fn apply_mul_and_div() {
    let mut state = state_at(0);
    set(&mut state, Mode::X86, "eax", expr_const(0x8000_0000, 32));
    set(&mut state, Mode::X86, "ecx", expr_const(4, 32));
    // mul ecx
    let product = x86(&[0xf7, 0xe1]).apply(&state);
    assert_eq!(get(&product, Mode::X86, "eax"), expr_const(0, 32));
    assert_eq!(get(&product, Mode::X86, "edx"), expr_const(2, 32));
    assert_eq!(flag(&product, Mode::X86, Flag::Cf), expr_const(1, 1));

    // div ecx
    let quotient = x86(&[0xf7, 0xf1]).apply(&product);
    assert_eq!(get(&quotient, Mode::X86, "eax"), expr_const(0x8000_0000, 32));
    assert_eq!(get(&quotient, Mode::X86, "edx"), expr_const(0, 32));
}

#[test]
fn apply_divide_by_zero_traps() {
    let mut state = state_at(0x1000);
    set(&mut state, Mode::X86, "ecx", expr_const(0, 32));
    let state = x86(&[0xf7, 0xf1]).apply(&state);
    assert!(get(&state, Mode::X86, "eip").is_top());
}

#[test]
fn apply_call() {
    let mut state = state_at(0x0804_0005);
    set(&mut state, Mode::X86, "esp", expr_const(0x1000, 32));
    let state = x86(&[0xe8, 0x9b, 0xff, 0xff, 0xff]).apply(&state);
    assert_eq!(get(&state, Mode::X86, "eip"), expr_const(0x0803_ffa5, 32));
    assert_eq!(get(&state, Mode::X86, "esp"), expr_const(0xffc, 32));
    assert_eq!(
        state.read_memory(&absolute(0xffc, 32)),
        expr_const(0x0804_000a, 32)
    );
}

#[test]
fn apply_conditional_jump() {
    let instruction = x86(&[0x74, 0x05]);
    assert_eq!(instruction.flow(), Flow::ConditionalJump);

    // An unknown zero flag leaves both targets open.
    let state = instruction.apply(&state_at(0x1000));
    let eip = get(&state, Mode::X86, "eip");
    assert!(!eip.is_constant());
    assert!(!eip.is_top());

    let mut taken = state_at(0x1000);
    taken
        .write_register(&Mode::X86.flag(Flag::Zf), expr_const(1, 1))
        .unwrap();
    let taken = instruction.apply(&taken);
    assert_eq!(get(&taken, Mode::X86, "eip"), expr_const(0x1007, 32));

    let mut fallthrough = state_at(0x1000);
    fallthrough
        .write_register(&Mode::X86.flag(Flag::Zf), expr_const(0, 1))
        .unwrap();
    let fallthrough = instruction.apply(&fallthrough);
    assert_eq!(get(&fallthrough, Mode::X86, "eip"), expr_const(0x1002, 32));
}

#[test]
fn apply_setcc_and_cmovcc() {
    let mut state = state_at(0);
    state
        .write_register(&Mode::X86.flag(Flag::Cf), expr_const(1, 1))
        .unwrap();
    // setb al
    let set_state = x86(&[0x0f, 0x92, 0xc0]).apply(&state);
    assert_eq!(get(&set_state, Mode::X86, "al"), expr_const(1, 8));
    // cmovb eax, ebx
    let moved = x86(&[0x0f, 0x42, 0xc3]).apply(&state);
    assert_eq!(get(&moved, Mode::X86, "eax"), expr_register("ebx", 32));
}

#[test]
fn apply_rep_stos_single_step() {
    let mut state = state_at(0x1000);
    set(&mut state, Mode::X86, "ecx", expr_const(2, 32));
    set(&mut state, Mode::X86, "edi", expr_const(0x100, 32));
    set(&mut state, Mode::X86, "eax", expr_const(0x41, 32));
    state
        .write_register(&Mode::X86.flag(Flag::Df), expr_const(0, 1))
        .unwrap();

    // rep stosb
    let instruction = x86(&[0xf3, 0xaa]);
    assert_eq!(instruction.to_string(), "rep stosb");

    let state = instruction.apply(&state);
    assert_eq!(state.read_memory(&absolute(0x100, 8)), expr_const(0x41, 8));
    assert_eq!(get(&state, Mode::X86, "ecx"), expr_const(1, 32));
    assert_eq!(get(&state, Mode::X86, "edi"), expr_const(0x101, 32));
    // one more iteration to go
    assert_eq!(get(&state, Mode::X86, "eip"), expr_const(0x1000, 32));

    let state = instruction.apply(&state);
    assert_eq!(state.read_memory(&absolute(0x101, 8)), expr_const(0x41, 8));
    assert_eq!(get(&state, Mode::X86, "ecx"), expr_const(0, 32));
    assert_eq!(get(&state, Mode::X86, "eip"), expr_const(0x1002, 32));
}

#[test]
fn apply_rep_with_zero_count() {
    let mut state = state_at(0x1000);
    set(&mut state, Mode::X86, "ecx", expr_const(0, 32));
    set(&mut state, Mode::X86, "esi", expr_const(0x200, 32));
    set(&mut state, Mode::X86, "edi", expr_const(0x100, 32));
    // rep movsb
    let state = x86(&[0xf3, 0xa4]).apply(&state);
    assert_eq!(get(&state, Mode::X86, "edi"), expr_const(0x100, 32));
    assert_eq!(get(&state, Mode::X86, "esi"), expr_const(0x200, 32));
    assert_eq!(get(&state, Mode::X86, "eip"), expr_const(0x1002, 32));
    assert_eq!(
        state.read_memory(&absolute(0x100, 8)),
        Expression::Memory(absolute(0x100, 8))
    );
}

#[test]
fn apply_pop_into_stack_memory() {
    let mut state = state_at(0);
    set(&mut state, Mode::X86, "esp", expr_const(0x100, 32));
    state
        .write_memory(&absolute(0x100, 32), expr_const(7, 32))
        .unwrap();
    // pop dword ptr [esp]
    let state = x86(&[0x8f, 0x04, 0x24]).apply(&state);
    assert_eq!(get(&state, Mode::X86, "esp"), expr_const(0x104, 32));
    assert_eq!(state.read_memory(&absolute(0x104, 32)), expr_const(7, 32));
}

#[test]
fn apply_bit_scan() {
    let mut state = state_at(0);
    set(&mut state, Mode::X86, "ebx", expr_const(0x50, 32));
    // bsf eax, ebx
    let forward = x86(&[0x0f, 0xbc, 0xc3]).apply(&state);
    assert_eq!(get(&forward, Mode::X86, "eax"), expr_const(4, 32));
    assert_eq!(flag(&forward, Mode::X86, Flag::Zf), expr_const(0, 1));
    // bsr eax, ebx
    let reverse = x86(&[0x0f, 0xbd, 0xc3]).apply(&state);
    assert_eq!(get(&reverse, Mode::X86, "eax"), expr_const(6, 32));

    // a symbolic source gives an unknown index
    let unknown = x86(&[0x0f, 0xbc, 0xc3]).apply(&state_at(0));
    assert!(get(&unknown, Mode::X86, "eax").is_top());
}

#[test]
fn apply_segment_memory_is_distinct() {
    // mov eax, fs:[0x30]
    let instruction = x86(&[0x64, 0xa1, 0x30, 0x00, 0x00, 0x00]);
    assert_eq!(instruction.to_string(), "mov         eax, fs:[0x30]");
    let state = instruction.apply(&state_at(0));
    assert_eq!(get(&state, Mode::X86, "eax").to_string(), "M32fs(0x30)");
}

#[test]
fn apply_without_semantics_writes_top() {
    // arpl ax, bx
    let instruction = x86(&[0x63, 0xd8]);
    assert_eq!(instruction.mnemonic(), "ARPL");
    let state = instruction.apply(&state_at(0x1000));
    assert!(get(&state, Mode::X86, "ax").is_top());
    assert_eq!(get(&state, Mode::X86, "eip"), expr_const(0x1002, 32));
}

#[test]
fn apply_trap_loses_pc() {
    let state = x86(&[0xcc]).apply(&state_at(0x1000));
    assert!(get(&state, Mode::X86, "eip").is_top());
    assert_eq!(x86(&[0xcc]).flow(), Flow::Trap);
}

#[test]
fn apply_does_not_modify_input() {
    let state = state_at(0x1000);
    let before = state.clone();
    let _ = x86(&[0x50]).apply(&state);
    assert_eq!(state.len(), before.len());
    assert_eq!(
        get(&state, Mode::X86, "eip"),
        get(&before, Mode::X86, "eip")
    );
}
