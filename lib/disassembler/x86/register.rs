use crate::disassembler::x86::Mode;
use crate::expr::Register;
use crate::Error;

#[rustfmt::skip]
const X86REGISTERS: &[X86Register] = &[
    X86Register { name: "al",  full: "eax", offset: 0, bits: 8 },
    X86Register { name: "ah",  full: "eax", offset: 8, bits: 8 },
    X86Register { name: "ax",  full: "eax", offset: 0, bits: 16 },
    X86Register { name: "eax", full: "eax", offset: 0, bits: 32 },
    X86Register { name: "cl",  full: "ecx", offset: 0, bits: 8 },
    X86Register { name: "ch",  full: "ecx", offset: 8, bits: 8 },
    X86Register { name: "cx",  full: "ecx", offset: 0, bits: 16 },
    X86Register { name: "ecx", full: "ecx", offset: 0, bits: 32 },
    X86Register { name: "dl",  full: "edx", offset: 0, bits: 8 },
    X86Register { name: "dh",  full: "edx", offset: 8, bits: 8 },
    X86Register { name: "dx",  full: "edx", offset: 0, bits: 16 },
    X86Register { name: "edx", full: "edx", offset: 0, bits: 32 },
    X86Register { name: "bl",  full: "ebx", offset: 0, bits: 8 },
    X86Register { name: "bh",  full: "ebx", offset: 8, bits: 8 },
    X86Register { name: "bx",  full: "ebx", offset: 0, bits: 16 },
    X86Register { name: "ebx", full: "ebx", offset: 0, bits: 32 },
    X86Register { name: "sp",  full: "esp", offset: 0, bits: 16 },
    X86Register { name: "esp", full: "esp", offset: 0, bits: 32 },
    X86Register { name: "bp",  full: "ebp", offset: 0, bits: 16 },
    X86Register { name: "ebp", full: "ebp", offset: 0, bits: 32 },
    X86Register { name: "si",  full: "esi", offset: 0, bits: 16 },
    X86Register { name: "esi", full: "esi", offset: 0, bits: 32 },
    X86Register { name: "di",  full: "edi", offset: 0, bits: 16 },
    X86Register { name: "edi", full: "edi", offset: 0, bits: 32 },
    X86Register { name: "ip",  full: "eip", offset: 0, bits: 16 },
    X86Register { name: "eip", full: "eip", offset: 0, bits: 32 },
];

#[rustfmt::skip]
const AMD64REGISTERS: &[X86Register] = &[
    X86Register { name: "al",   full: "rax", offset: 0, bits: 8 },
    X86Register { name: "ah",   full: "rax", offset: 8, bits: 8 },
    X86Register { name: "ax",   full: "rax", offset: 0, bits: 16 },
    X86Register { name: "eax",  full: "rax", offset: 0, bits: 32 },
    X86Register { name: "rax",  full: "rax", offset: 0, bits: 64 },
    X86Register { name: "cl",   full: "rcx", offset: 0, bits: 8 },
    X86Register { name: "ch",   full: "rcx", offset: 8, bits: 8 },
    X86Register { name: "cx",   full: "rcx", offset: 0, bits: 16 },
    X86Register { name: "ecx",  full: "rcx", offset: 0, bits: 32 },
    X86Register { name: "rcx",  full: "rcx", offset: 0, bits: 64 },
    X86Register { name: "dl",   full: "rdx", offset: 0, bits: 8 },
    X86Register { name: "dh",   full: "rdx", offset: 8, bits: 8 },
    X86Register { name: "dx",   full: "rdx", offset: 0, bits: 16 },
    X86Register { name: "edx",  full: "rdx", offset: 0, bits: 32 },
    X86Register { name: "rdx",  full: "rdx", offset: 0, bits: 64 },
    X86Register { name: "bl",   full: "rbx", offset: 0, bits: 8 },
    X86Register { name: "bh",   full: "rbx", offset: 8, bits: 8 },
    X86Register { name: "bx",   full: "rbx", offset: 0, bits: 16 },
    X86Register { name: "ebx",  full: "rbx", offset: 0, bits: 32 },
    X86Register { name: "rbx",  full: "rbx", offset: 0, bits: 64 },
    X86Register { name: "spl",  full: "rsp", offset: 0, bits: 8 },
    X86Register { name: "sp",   full: "rsp", offset: 0, bits: 16 },
    X86Register { name: "esp",  full: "rsp", offset: 0, bits: 32 },
    X86Register { name: "rsp",  full: "rsp", offset: 0, bits: 64 },
    X86Register { name: "bpl",  full: "rbp", offset: 0, bits: 8 },
    X86Register { name: "bp",   full: "rbp", offset: 0, bits: 16 },
    X86Register { name: "ebp",  full: "rbp", offset: 0, bits: 32 },
    X86Register { name: "rbp",  full: "rbp", offset: 0, bits: 64 },
    X86Register { name: "sil",  full: "rsi", offset: 0, bits: 8 },
    X86Register { name: "si",   full: "rsi", offset: 0, bits: 16 },
    X86Register { name: "esi",  full: "rsi", offset: 0, bits: 32 },
    X86Register { name: "rsi",  full: "rsi", offset: 0, bits: 64 },
    X86Register { name: "dil",  full: "rdi", offset: 0, bits: 8 },
    X86Register { name: "di",   full: "rdi", offset: 0, bits: 16 },
    X86Register { name: "edi",  full: "rdi", offset: 0, bits: 32 },
    X86Register { name: "rdi",  full: "rdi", offset: 0, bits: 64 },
    X86Register { name: "r8b",  full: "r8",  offset: 0, bits: 8 },
    X86Register { name: "r8w",  full: "r8",  offset: 0, bits: 16 },
    X86Register { name: "r8d",  full: "r8",  offset: 0, bits: 32 },
    X86Register { name: "r8",   full: "r8",  offset: 0, bits: 64 },
    X86Register { name: "r9b",  full: "r9",  offset: 0, bits: 8 },
    X86Register { name: "r9w",  full: "r9",  offset: 0, bits: 16 },
    X86Register { name: "r9d",  full: "r9",  offset: 0, bits: 32 },
    X86Register { name: "r9",   full: "r9",  offset: 0, bits: 64 },
    X86Register { name: "r10b", full: "r10", offset: 0, bits: 8 },
    X86Register { name: "r10w", full: "r10", offset: 0, bits: 16 },
    X86Register { name: "r10d", full: "r10", offset: 0, bits: 32 },
    X86Register { name: "r10",  full: "r10", offset: 0, bits: 64 },
    X86Register { name: "r11b", full: "r11", offset: 0, bits: 8 },
    X86Register { name: "r11w", full: "r11", offset: 0, bits: 16 },
    X86Register { name: "r11d", full: "r11", offset: 0, bits: 32 },
    X86Register { name: "r11",  full: "r11", offset: 0, bits: 64 },
    X86Register { name: "r12b", full: "r12", offset: 0, bits: 8 },
    X86Register { name: "r12w", full: "r12", offset: 0, bits: 16 },
    X86Register { name: "r12d", full: "r12", offset: 0, bits: 32 },
    X86Register { name: "r12",  full: "r12", offset: 0, bits: 64 },
    X86Register { name: "r13b", full: "r13", offset: 0, bits: 8 },
    X86Register { name: "r13w", full: "r13", offset: 0, bits: 16 },
    X86Register { name: "r13d", full: "r13", offset: 0, bits: 32 },
    X86Register { name: "r13",  full: "r13", offset: 0, bits: 64 },
    X86Register { name: "r14b", full: "r14", offset: 0, bits: 8 },
    X86Register { name: "r14w", full: "r14", offset: 0, bits: 16 },
    X86Register { name: "r14d", full: "r14", offset: 0, bits: 32 },
    X86Register { name: "r14",  full: "r14", offset: 0, bits: 64 },
    X86Register { name: "r15b", full: "r15", offset: 0, bits: 8 },
    X86Register { name: "r15w", full: "r15", offset: 0, bits: 16 },
    X86Register { name: "r15d", full: "r15", offset: 0, bits: 32 },
    X86Register { name: "r15",  full: "r15", offset: 0, bits: 64 },
    X86Register { name: "eip",  full: "rip", offset: 0, bits: 32 },
    X86Register { name: "rip",  full: "rip", offset: 0, bits: 64 },
];

/// Registers which look the same in both modes.
#[rustfmt::skip]
const SHAREDREGISTERS: &[X86Register] = &[
    X86Register { name: "es", full: "es", offset: 0, bits: 16 },
    X86Register { name: "cs", full: "cs", offset: 0, bits: 16 },
    X86Register { name: "ss", full: "ss", offset: 0, bits: 16 },
    X86Register { name: "ds", full: "ds", offset: 0, bits: 16 },
    X86Register { name: "fs", full: "fs", offset: 0, bits: 16 },
    X86Register { name: "gs", full: "gs", offset: 0, bits: 16 },
    X86Register { name: "eflags", full: "eflags", offset: 0,  bits: 32 },
    X86Register { name: "cf",     full: "eflags", offset: 0,  bits: 1 },
    X86Register { name: "pf",     full: "eflags", offset: 2,  bits: 1 },
    X86Register { name: "af",     full: "eflags", offset: 4,  bits: 1 },
    X86Register { name: "zf",     full: "eflags", offset: 6,  bits: 1 },
    X86Register { name: "sf",     full: "eflags", offset: 7,  bits: 1 },
    X86Register { name: "tf",     full: "eflags", offset: 8,  bits: 1 },
    X86Register { name: "if",     full: "eflags", offset: 9,  bits: 1 },
    X86Register { name: "df",     full: "eflags", offset: 10, bits: 1 },
    X86Register { name: "of",     full: "eflags", offset: 11, bits: 1 },
    X86Register { name: "st0", full: "st0", offset: 0, bits: 80 },
    X86Register { name: "st1", full: "st1", offset: 0, bits: 80 },
    X86Register { name: "st2", full: "st2", offset: 0, bits: 80 },
    X86Register { name: "st3", full: "st3", offset: 0, bits: 80 },
    X86Register { name: "st4", full: "st4", offset: 0, bits: 80 },
    X86Register { name: "st5", full: "st5", offset: 0, bits: 80 },
    X86Register { name: "st6", full: "st6", offset: 0, bits: 80 },
    X86Register { name: "st7", full: "st7", offset: 0, bits: 80 },
    X86Register { name: "mm0", full: "mm0", offset: 0, bits: 64 },
    X86Register { name: "mm1", full: "mm1", offset: 0, bits: 64 },
    X86Register { name: "mm2", full: "mm2", offset: 0, bits: 64 },
    X86Register { name: "mm3", full: "mm3", offset: 0, bits: 64 },
    X86Register { name: "mm4", full: "mm4", offset: 0, bits: 64 },
    X86Register { name: "mm5", full: "mm5", offset: 0, bits: 64 },
    X86Register { name: "mm6", full: "mm6", offset: 0, bits: 64 },
    X86Register { name: "mm7", full: "mm7", offset: 0, bits: 64 },
    X86Register { name: "xmm0",  full: "xmm0",  offset: 0, bits: 128 },
    X86Register { name: "xmm1",  full: "xmm1",  offset: 0, bits: 128 },
    X86Register { name: "xmm2",  full: "xmm2",  offset: 0, bits: 128 },
    X86Register { name: "xmm3",  full: "xmm3",  offset: 0, bits: 128 },
    X86Register { name: "xmm4",  full: "xmm4",  offset: 0, bits: 128 },
    X86Register { name: "xmm5",  full: "xmm5",  offset: 0, bits: 128 },
    X86Register { name: "xmm6",  full: "xmm6",  offset: 0, bits: 128 },
    X86Register { name: "xmm7",  full: "xmm7",  offset: 0, bits: 128 },
    X86Register { name: "xmm8",  full: "xmm8",  offset: 0, bits: 128 },
    X86Register { name: "xmm9",  full: "xmm9",  offset: 0, bits: 128 },
    X86Register { name: "xmm10", full: "xmm10", offset: 0, bits: 128 },
    X86Register { name: "xmm11", full: "xmm11", offset: 0, bits: 128 },
    X86Register { name: "xmm12", full: "xmm12", offset: 0, bits: 128 },
    X86Register { name: "xmm13", full: "xmm13", offset: 0, bits: 128 },
    X86Register { name: "xmm14", full: "xmm14", offset: 0, bits: 128 },
    X86Register { name: "xmm15", full: "xmm15", offset: 0, bits: 128 },
];

#[rustfmt::skip]
const GPR64: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi",
    "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
];

#[rustfmt::skip]
const GPR32: [&str; 16] = [
    "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi",
    "r8d", "r9d", "r10d", "r11d", "r12d", "r13d", "r14d", "r15d",
];

#[rustfmt::skip]
const GPR16: [&str; 16] = [
    "ax", "cx", "dx", "bx", "sp", "bp", "si", "di",
    "r8w", "r9w", "r10w", "r11w", "r12w", "r13w", "r14w", "r15w",
];

#[rustfmt::skip]
const GPR8: [&str; 16] = [
    "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil",
    "r8b", "r9b", "r10b", "r11b", "r12b", "r13b", "r14b", "r15b",
];

/// Byte registers when no REX prefix is present.
const GPR8LEGACY: [&str; 8] = ["al", "cl", "dl", "bl", "ah", "ch", "dh", "bh"];

const SEGMENTS: [&str; 6] = ["es", "cs", "ss", "ds", "fs", "gs"];

/// Struct for dealing with x86 registers
pub(crate) struct X86Register {
    name: &'static str,
    /// The full register. For example, eax is the full register for al.
    full: &'static str,
    /// The offset of this register. For example, ah is offset 8 bit into eax.
    offset: usize,
    /// The size of this register in bits
    bits: usize,
}

fn find(mode: Mode, name: &str) -> Option<&'static X86Register> {
    let registers: &[X86Register] = match mode {
        Mode::X86 => X86REGISTERS,
        Mode::Amd64 => AMD64REGISTERS,
    };
    registers
        .iter()
        .chain(SHAREDREGISTERS.iter())
        .find(|register| register.name == name)
}

/// Look up a register by name.
pub fn get_register(mode: Mode, name: &str) -> Result<Register, Error> {
    let register = find(mode, name).ok_or_else(|| Error::UnknownRegister(name.to_string()))?;
    let full = find(mode, register.full).ok_or_else(|| Error::UnknownRegister(register.full.to_string()))?;
    let full = Register::new(full.name, full.bits);
    if register.name == register.full {
        Ok(full)
    } else {
        Ok(Register::new_slice(
            register.name,
            &full,
            register.offset,
            register.bits,
        ))
    }
}

/// A general-purpose register by encoding number.
///
/// Without a REX prefix, byte registers 4 through 7 are ah, ch, dh and bh.
pub(crate) fn gpr(mode: Mode, number: u8, bits: usize, rex: bool) -> Result<Register, Error> {
    let number = number as usize;
    let name = match bits {
        8 if !rex && number < 8 => GPR8LEGACY.get(number),
        8 => GPR8.get(number),
        16 => GPR16.get(number),
        32 => GPR32.get(number),
        64 => GPR64.get(number),
        _ => None,
    };
    match name {
        Some(name) => get_register(mode, name),
        None => Err(Error::UnknownRegister(format!("gpr{}:{}", number, bits))),
    }
}

pub(crate) fn segment(number: u8) -> Option<&'static str> {
    SEGMENTS.get(number as usize).copied()
}

pub(crate) fn indexed(mode: Mode, prefix: &str, number: u8) -> Result<Register, Error> {
    get_register(mode, &format!("{}{}", prefix, number))
}

/// True for the 64-bit general-purpose registers, whose 32-bit slices zero
/// the upper half when written.
pub(crate) fn is_gpr64(name: &str) -> bool {
    GPR64.contains(&name)
}
