//! Intel and AT&T rendering of x86 instructions.

use crate::disassembler::x86::{Immediate, Instruction, MemoryOperand, Operand, Prefixes};
use crate::disassembler::{Syntax, Token, TokenKind};

/// Intel mnemonics are padded to this many columns.
const MNEMONIC_COLUMNS: usize = 12;

pub(crate) fn tokens(instruction: &Instruction, syntax: Syntax) -> Vec<Token> {
    let (mnemonic, operands) = match syntax {
        Syntax::Intel => (intel_mnemonic(instruction), intel_operands(instruction)),
        Syntax::Att => (att_mnemonic(instruction), att_operands(instruction)),
    };
    let mnemonic = format!("{}{}", prefix(instruction), mnemonic);

    let mut tokens = Vec::with_capacity(operands.len() * 2 + 2);
    let padding = match syntax {
        Syntax::Intel => MNEMONIC_COLUMNS.saturating_sub(mnemonic.len()).max(1),
        Syntax::Att => 1,
    };
    tokens.push(Token::new(TokenKind::Mnemonic, mnemonic));
    if operands.is_empty() {
        return tokens;
    }
    tokens.push(Token::new(TokenKind::Spacer, " ".repeat(padding)));

    let separator = match syntax {
        Syntax::Intel => ", ",
        Syntax::Att => ",",
    };
    for (i, operand) in operands.into_iter().enumerate() {
        if i > 0 {
            tokens.push(Token::new(TokenKind::Separator, separator));
        }
        tokens.push(operand);
    }
    tokens
}

fn is_string(instruction: &Instruction) -> bool {
    let mnemonic = instruction.mnemonic();
    instruction.operands().is_empty()
        && ["MOVS", "STOS", "LODS", "SCAS", "CMPS", "INS", "OUTS"]
            .iter()
            .any(|family| mnemonic.starts_with(family))
}

/// Lock and repeat prefixes, as words before the mnemonic.
fn prefix(instruction: &Instruction) -> String {
    let prefixes = instruction.prefixes();
    let mut prefix = String::new();
    if prefixes.contains(Prefixes::LOCK) {
        prefix.push_str("lock ");
    }
    if is_string(instruction) {
        let mnemonic = instruction.mnemonic();
        let compare = mnemonic.starts_with("SCAS") || mnemonic.starts_with("CMPS");
        if prefixes.contains(Prefixes::REPNE) {
            prefix.push_str("repnz ");
        } else if prefixes.contains(Prefixes::REP) {
            prefix.push_str(if compare { "repz " } else { "rep " });
        }
    }
    prefix
}

fn is_branch(instruction: &Instruction) -> bool {
    matches!(instruction.mnemonic(), "JMP" | "CALL" | "JMPF" | "CALLF")
}

/// Absolute target of a relative branch, when the instruction address is
/// known.
fn branch_target(instruction: &Instruction, immediate: &Immediate) -> Token {
    let length = instruction.length() as i64;
    match instruction.address() {
        Some(address) => {
            let bits = instruction.mode().bits();
            let mask = if bits >= 64 { !0u64 } else { (1u64 << bits) - 1 };
            let target = address
                .wrapping_add(length as u64)
                .wrapping_add(immediate.value_i64() as u64)
                & mask;
            Token::new(TokenKind::Address, format!("0x{:x}", target))
        }
        None => {
            let offset = length.wrapping_add(immediate.value_i64());
            let text = if offset < 0 {
                format!("$-0x{:x}", offset.unsigned_abs())
            } else {
                format!("$+0x{:x}", offset)
            };
            Token::new(TokenKind::Address, text)
        }
    }
}

/// A far pointer immediate, `selector:offset`.
fn far_pointer(immediate: &Immediate) -> Option<(u64, u64)> {
    let bits = immediate.bits();
    let value = immediate.constant().value_u64()?;
    let offset_bits = bits - 16;
    Some((value >> offset_bits, value & ((1u64 << offset_bits) - 1)))
}

/// A displacement following a base or index.
fn displacement(memory: &MemoryOperand, leading_sign: bool) -> String {
    let displacement = memory.displacement();
    if displacement == 0 {
        return String::new();
    }
    let plus = if leading_sign { "+" } else { "" };
    if displacement < 0 && displacement > -0x10000 {
        format!("-0x{:x}", displacement.unsigned_abs())
    } else {
        let bits = memory.address_bits();
        let mask = if bits >= 64 { !0u64 } else { (1u64 << bits) - 1 };
        format!("{}0x{:x}", plus, (displacement as u64) & mask)
    }
}

fn absolute(memory: &MemoryOperand) -> String {
    let bits = memory.address_bits();
    let mask = if bits >= 64 { !0u64 } else { (1u64 << bits) - 1 };
    format!("0x{:x}", (memory.displacement() as u64) & mask)
}

// Intel

fn intel_mnemonic(instruction: &Instruction) -> String {
    match instruction.mnemonic() {
        "JMPF" => "jmp".to_string(),
        "CALLF" => "call".to_string(),
        mnemonic => mnemonic.to_lowercase(),
    }
}

fn size_keyword(bits: usize) -> Option<&'static str> {
    match bits {
        8 => Some("byte"),
        16 => Some("word"),
        32 => Some("dword"),
        48 => Some("fword"),
        64 => Some("qword"),
        80 => Some("tbyte"),
        128 => Some("xmmword"),
        _ => None,
    }
}

fn intel_memory(instruction: &Instruction, memory: &MemoryOperand) -> String {
    let mut text = String::new();

    let implied = instruction.mnemonic() == "LEA"
        || instruction
            .operands()
            .iter()
            .any(|operand| operand.is_register() && operand.bits() == memory.bits());
    if !implied {
        if let Some(keyword) = size_keyword(memory.bits()) {
            text.push_str(keyword);
            text.push_str(" ptr ");
        }
    }

    if memory.segment_override() {
        if let Some(segment) = memory.segment() {
            text.push_str(segment.name());
            text.push(':');
        }
    }

    text.push('[');
    let mut empty = true;
    if let Some(base) = memory.base() {
        text.push_str(base.name());
        empty = false;
    }
    if let Some(index) = memory.index() {
        if !empty {
            text.push('+');
        }
        text.push_str(index.name());
        if memory.address_bits() != 16 {
            text.push_str(&format!("*{}", memory.scale()));
        }
        empty = false;
    }
    if empty {
        text.push_str(&absolute(memory));
    } else {
        text.push_str(&displacement(memory, true));
    }
    text.push(']');
    text
}

fn intel_operand(instruction: &Instruction, operand: &Operand) -> Token {
    match *operand {
        Operand::Register(ref register) => Token::new(TokenKind::Register, register.name()),
        Operand::Immediate(ref immediate) if immediate.is_relative() => {
            branch_target(instruction, immediate)
        }
        Operand::Immediate(ref immediate) if matches!(instruction.mnemonic(), "JMPF" | "CALLF") => {
            match far_pointer(immediate) {
                Some((selector, offset)) => {
                    Token::new(TokenKind::Address, format!("0x{:x}:0x{:x}", selector, offset))
                }
                None => Token::new(TokenKind::Constant, immediate.constant().to_string()),
            }
        }
        Operand::Immediate(ref immediate) => {
            Token::new(TokenKind::Constant, immediate.constant().to_string())
        }
        Operand::Memory(ref memory) => {
            Token::new(TokenKind::Memory, intel_memory(instruction, memory))
        }
    }
}

fn intel_operands(instruction: &Instruction) -> Vec<Token> {
    instruction
        .operands()
        .iter()
        .map(|operand| intel_operand(instruction, operand))
        .collect()
}

// AT&T

fn suffix(bits: usize) -> Option<char> {
    match bits {
        8 => Some('b'),
        16 => Some('w'),
        32 => Some('l'),
        64 => Some('q'),
        _ => None,
    }
}

fn att_mnemonic(instruction: &Instruction) -> String {
    let mnemonic = instruction.mnemonic();
    let renamed = match mnemonic {
        "CBW" => Some("cbtw"),
        "CWDE" => Some("cwtl"),
        "CDQE" => Some("cltq"),
        "CWD" => Some("cwtd"),
        "CDQ" => Some("cltd"),
        "CQO" => Some("cqto"),
        "JMPF" => Some("ljmp"),
        "CALLF" => Some("lcall"),
        "RETF" => Some("lret"),
        "MOVSXD" => Some("movslq"),
        _ => None,
    };
    if let Some(renamed) = renamed {
        return renamed.to_string();
    }

    if is_string(instruction) {
        // The last letter of the Intel name is the element size.
        let (family, size) = mnemonic.split_at(mnemonic.len() - 1);
        let size = if size == "D" { "l" } else { size };
        return format!("{}{}", family, size).to_lowercase();
    }

    let operands = instruction.operands();
    if mnemonic == "MOVZX" || mnemonic == "MOVSX" {
        let source = operands.get(1).and_then(|operand| suffix(operand.bits()));
        let destination = operands.first().and_then(|operand| suffix(operand.bits()));
        if let (Some(source), Some(destination)) = (source, destination) {
            let family = if mnemonic == "MOVZX" { "movz" } else { "movs" };
            return format!("{}{}{}", family, source, destination);
        }
    }

    let mut text = mnemonic.to_lowercase();
    // Without a register operand, the width comes from a suffix.
    let memory = operands.iter().find_map(|operand| operand.memory());
    let has_register = operands.iter().any(|operand| operand.is_register());
    let sized = !has_register
        && !is_branch(instruction)
        && !mnemonic.starts_with('F')
        && mnemonic != "LEA"
        && !mnemonic.starts_with("CMPXCHG8");
    if let (true, Some(memory)) = (sized, memory) {
        if let Some(suffix) = suffix(memory.bits()) {
            text.push(suffix);
        }
    }
    text
}

fn att_register(name: &str) -> String {
    match name.strip_prefix("st") {
        Some(number) if number.len() == 1 => format!("%st({})", number),
        _ => format!("%{}", name),
    }
}

fn att_memory(memory: &MemoryOperand) -> String {
    let mut text = String::new();
    if memory.segment_override() {
        if let Some(segment) = memory.segment() {
            text.push_str(&att_register(segment.name()));
            text.push(':');
        }
    }
    if memory.base().is_none() && memory.index().is_none() {
        text.push_str(&absolute(memory));
        return text;
    }
    text.push_str(&displacement(memory, false));
    text.push('(');
    if let Some(base) = memory.base() {
        text.push_str(&att_register(base.name()));
    }
    if let Some(index) = memory.index() {
        text.push(',');
        text.push_str(&att_register(index.name()));
        text.push_str(&format!(",{}", memory.scale()));
    }
    text.push(')');
    text
}

fn att_operand(instruction: &Instruction, operand: &Operand) -> Token {
    let indirect = if is_branch(instruction) { "*" } else { "" };
    match *operand {
        Operand::Register(ref register) => Token::new(
            TokenKind::Register,
            format!("{}{}", indirect, att_register(register.name())),
        ),
        Operand::Immediate(ref immediate) if immediate.is_relative() => {
            branch_target(instruction, immediate)
        }
        Operand::Immediate(ref immediate) => {
            Token::new(TokenKind::Constant, format!("${}", immediate.constant()))
        }
        Operand::Memory(ref memory) => Token::new(
            TokenKind::Memory,
            format!("{}{}", indirect, att_memory(memory)),
        ),
    }
}

fn att_operands(instruction: &Instruction) -> Vec<Token> {
    if let (true, Some(Operand::Immediate(immediate))) = (
        matches!(instruction.mnemonic(), "JMPF" | "CALLF"),
        instruction.operand(0),
    ) {
        if let Some((selector, offset)) = far_pointer(immediate) {
            return vec![
                Token::new(TokenKind::Constant, format!("$0x{:x}", selector)),
                Token::new(TokenKind::Address, format!("$0x{:x}", offset)),
            ];
        }
    }

    let mut operands = instruction
        .operands()
        .iter()
        .map(|operand| att_operand(instruction, operand))
        .collect::<Vec<Token>>();
    if instruction.mnemonic() != "ENTER" {
        operands.reverse();
    }
    operands
}
