//! The opcode table.
//!
//! Each `Entry` describes one encoding: the opcode map and byte, an optional
//! mandatory prefix, a constraint on the ModRM byte, the mnemonic, and the
//! shapes of its operands. The decoder picks the most specific entry whose
//! constraints hold for the bytes it sees.

use crate::disassembler::x86::Mode;
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Map {
    /// One-byte opcodes.
    Primary,
    /// Opcodes following 0x0f.
    Secondary,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Mandatory {
    None,
    P66,
    Pf2,
    Pf3,
}

/// Constraint on the ModRM byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ModRm {
    /// Present when the operands call for it.
    Any,
    /// mod != 3.
    Memory,
    /// mod == 3.
    Register,
    /// reg == digit.
    Digit(u8),
    DigitMemory(u8),
    DigitRegister(u8),
    /// The whole byte.
    Exact(u8),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Modes {
    Both,
    X86,
    Amd64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Mnemonic {
    Fixed(&'static str),
    /// Picked by operand size: 16, 32, 64.
    OperandSize([&'static str; 3]),
    /// Picked by address size: 16, 32, 64.
    AddressSize([&'static str; 3]),
    /// A condition code family, such as J, SET or CMOV. The condition is the
    /// low nibble of the opcode.
    Condition(&'static str),
}

/// How an operand is encoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Shape {
    // ModRM r/m, general-purpose register or memory
    Eb,
    Ew,
    Ed,
    Ev,
    /// 32 bits, or 64 with REX.W
    Ey,
    // ModRM reg, general-purpose register
    Gb,
    Gw,
    Gv,
    Gy,
    // ModRM r/m, memory only
    /// No access width, as used by lea
    M,
    Mb,
    Mw,
    Md,
    Mq,
    /// 80-bit x87 value
    Mt,
    /// Far pointer, selector above an operand-sized offset
    Mp,
    /// x87 environment
    Menv,
    // General-purpose register in the low bits of the opcode
    Zb,
    Zv,
    // Immediates
    Ib,
    /// Sign-extended to the operand size
    Ibs,
    Iw,
    /// 16 or 32 bits, sign-extended for 64-bit operands
    Iz,
    /// Full operand size
    Iv,
    // Branch displacements
    Jb,
    Jz,
    // Absolute addresses without ModRM
    Ob,
    Ov,
    /// Far pointer immediate
    Ap,
    /// ModRM reg, segment register
    Sw,
    // Fixed registers
    Al,
    /// ax or eax
    Az,
    /// Accumulator of operand size
    Av,
    Cl,
    Dx,
    Ax,
    /// The constant 1, as used by shifts
    One,
    /// A segment register by number
    Seg(u8),
    // x87
    St0,
    Sti,
    // SSE
    Vx,
    Wx,
    Wq,
    Wd,
    // MMX
    Pq,
    Qq,
}

impl Shape {
    fn needs_modrm(&self) -> bool {
        matches!(
            *self,
            Shape::Eb
                | Shape::Ew
                | Shape::Ed
                | Shape::Ev
                | Shape::Ey
                | Shape::Gb
                | Shape::Gw
                | Shape::Gv
                | Shape::Gy
                | Shape::M
                | Shape::Mb
                | Shape::Mw
                | Shape::Md
                | Shape::Mq
                | Shape::Mt
                | Shape::Mp
                | Shape::Menv
                | Shape::Sw
                | Shape::Sti
                | Shape::Vx
                | Shape::Wx
                | Shape::Wq
                | Shape::Wd
                | Shape::Pq
                | Shape::Qq
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Entry {
    pub map: Map,
    pub opcode: u8,
    /// Number of consecutive opcodes covered, for register-in-opcode and
    /// condition code encodings.
    pub span: u8,
    pub mandatory: Mandatory,
    pub modrm: ModRm,
    pub modes: Modes,
    /// Operand size defaults to 64 bits in long mode.
    pub default64: bool,
    pub mnemonic: Mnemonic,
    pub operands: &'static [Shape],
}

impl Entry {
    const fn new(map: Map, opcode: u8, mnemonic: Mnemonic, operands: &'static [Shape]) -> Entry {
        Entry {
            map,
            opcode,
            span: 1,
            mandatory: Mandatory::None,
            modrm: ModRm::Any,
            modes: Modes::Both,
            default64: false,
            mnemonic,
            operands,
        }
    }

    const fn span(mut self, span: u8) -> Entry {
        self.span = span;
        self
    }

    const fn prefix(mut self, mandatory: Mandatory) -> Entry {
        self.mandatory = mandatory;
        self
    }

    const fn modrm(mut self, modrm: ModRm) -> Entry {
        self.modrm = modrm;
        self
    }

    const fn x86(mut self) -> Entry {
        self.modes = Modes::X86;
        self
    }

    const fn amd64(mut self) -> Entry {
        self.modes = Modes::Amd64;
        self
    }

    const fn stack(mut self) -> Entry {
        self.default64 = true;
        self
    }

    pub fn has_modrm(&self) -> bool {
        self.modrm != ModRm::Any || self.operands.iter().any(|shape| shape.needs_modrm())
    }

    pub fn supports(&self, mode: Mode) -> bool {
        match (self.modes, mode) {
            (Modes::Both, _) | (Modes::X86, Mode::X86) | (Modes::Amd64, Mode::Amd64) => true,
            _ => false,
        }
    }

    /// True when the ModRM byte satisfies this entry's constraint.
    pub fn accepts(&self, modrm: Option<u8>) -> bool {
        let modrm = match modrm {
            Some(modrm) => modrm,
            None => return !self.has_modrm(),
        };
        let memory = modrm >> 6 != 3;
        let reg = (modrm >> 3) & 7;
        match self.modrm {
            ModRm::Any => true,
            ModRm::Memory => memory,
            ModRm::Register => !memory,
            ModRm::Digit(digit) => reg == digit,
            ModRm::DigitMemory(digit) => memory && reg == digit,
            ModRm::DigitRegister(digit) => !memory && reg == digit,
            ModRm::Exact(byte) => modrm == byte,
        }
    }

    /// Ranks entries which accept the same bytes.
    pub fn specificity(&self) -> u32 {
        let mandatory = match self.mandatory {
            Mandatory::None => 0,
            _ => 16,
        };
        let modrm = match self.modrm {
            ModRm::Any => 0,
            ModRm::Memory | ModRm::Register => 2,
            ModRm::Digit(_) => 4,
            ModRm::DigitMemory(_) | ModRm::DigitRegister(_) => 6,
            ModRm::Exact(_) => 8,
        };
        let span = if self.span == 1 { 1 } else { 0 };
        mandatory + modrm + span
    }
}

use self::Map::{Primary, Secondary};
use self::Mandatory::{Pf2, Pf3, P66};
use self::Mnemonic::{AddressSize, Condition, Fixed, OperandSize};
use self::ModRm::{Digit, DigitMemory, DigitRegister, Exact};
use self::Shape::*;

const fn op(opcode: u8, mnemonic: &'static str, operands: &'static [Shape]) -> Entry {
    Entry::new(Primary, opcode, Fixed(mnemonic), operands)
}

const fn op2(opcode: u8, mnemonic: &'static str, operands: &'static [Shape]) -> Entry {
    Entry::new(Secondary, opcode, Fixed(mnemonic), operands)
}

const fn sized(opcode: u8, mnemonics: [&'static str; 3], operands: &'static [Shape]) -> Entry {
    Entry::new(Primary, opcode, OperandSize(mnemonics), operands)
}

/// The eight arithmetic instructions of 0x00 through 0x3f.
macro_rules! arithmetic {
    ($base:expr, $mnemonic:expr) => {
        [
            op($base, $mnemonic, &[Eb, Gb]),
            op($base + 1, $mnemonic, &[Ev, Gv]),
            op($base + 2, $mnemonic, &[Gb, Eb]),
            op($base + 3, $mnemonic, &[Gv, Ev]),
            op($base + 4, $mnemonic, &[Al, Ib]),
            op($base + 5, $mnemonic, &[Av, Iz]),
        ]
    };
}

/// A ModRM group, where reg selects the mnemonic.
macro_rules! group {
    ($opcode:expr, [$($mnemonic:expr),*], $operands:expr) => {{
        let mnemonics: [&'static str; 8] = [$($mnemonic),*];
        let mut entries = [op($opcode, "", $operands); 8];
        let mut digit = 0;
        while digit < 8 {
            entries[digit] = op($opcode, mnemonics[digit], $operands).modrm(Digit(digit as u8));
            digit += 1;
        }
        entries
    }};
}

/// An x87 escape byte, with eight memory forms selected by reg.
macro_rules! x87_memory {
    ($opcode:expr, [$($mnemonic:expr),*], [$($shape:expr),*]) => {{
        let mnemonics: [&'static str; 8] = [$($mnemonic),*];
        let shapes: [&'static [Shape]; 8] = [$($shape),*];
        let mut entries = [op($opcode, "", &[]); 8];
        let mut digit = 0;
        while digit < 8 {
            entries[digit] = op($opcode, mnemonics[digit], shapes[digit])
                .modrm(DigitMemory(digit as u8));
            digit += 1;
        }
        entries
    }};
}

const ALU: [&str; 8] = ["ADD", "OR", "ADC", "SBB", "AND", "SUB", "XOR", "CMP"];
const SHIFT: [&str; 8] = ["ROL", "ROR", "RCL", "RCR", "SHL", "SHR", "SAL", "SAR"];

const fn alu_group(opcode: u8, operands: &'static [Shape]) -> [Entry; 8] {
    let mut entries = [op(opcode, "", operands); 8];
    let mut digit = 0;
    while digit < 8 {
        entries[digit] = op(opcode, ALU[digit], operands).modrm(Digit(digit as u8));
        digit += 1;
    }
    entries
}

const fn shift_group(opcode: u8, operands: &'static [Shape]) -> [Entry; 8] {
    let mut entries = [op(opcode, "", operands); 8];
    let mut digit = 0;
    while digit < 8 {
        entries[digit] = op(opcode, SHIFT[digit], operands).modrm(Digit(digit as u8));
        digit += 1;
    }
    entries
}

const MEMORY32: [&[Shape]; 8] = [&[Md], &[Md], &[Md], &[Md], &[Md], &[Md], &[Md], &[Md]];
const MEMORY64: [&[Shape]; 8] = [&[Mq], &[Mq], &[Mq], &[Mq], &[Mq], &[Mq], &[Mq], &[Mq]];
const MEMORY16: [&[Shape]; 8] = [&[Mw], &[Mw], &[Mw], &[Mw], &[Mw], &[Mw], &[Mw], &[Mw]];

const FLOAT: [&str; 8] = [
    "FADD", "FMUL", "FCOM", "FCOMP", "FSUB", "FSUBR", "FDIV", "FDIVR",
];
const INTEGER: [&str; 8] = [
    "FIADD", "FIMUL", "FICOM", "FICOMP", "FISUB", "FISUBR", "FIDIV", "FIDIVR",
];

const fn x87_arithmetic(opcode: u8, mnemonics: [&'static str; 8], shapes: [&'static [Shape]; 8]) -> [Entry; 8] {
    let mut entries = [op(opcode, "", &[]); 8];
    let mut digit = 0;
    while digit < 8 {
        entries[digit] = op(opcode, mnemonics[digit], shapes[digit]).modrm(DigitMemory(digit as u8));
        digit += 1;
    }
    entries
}

const fn sse(
    opcode: u8,
    mnemonics: [&'static str; 4],
    packed: &'static [Shape],
    single: &'static [Shape],
    double: &'static [Shape],
) -> [Entry; 4] {
    [
        op2(opcode, mnemonics[0], packed),
        op2(opcode, mnemonics[1], packed).prefix(P66),
        op2(opcode, mnemonics[2], single).prefix(Pf3),
        op2(opcode, mnemonics[3], double).prefix(Pf2),
    ]
}

const fn concat<const A: usize, const B: usize, const C: usize>(
    a: [Entry; A],
    b: [Entry; B],
    filler: Entry,
) -> [Entry; C] {
    let mut entries = [filler; C];
    let mut i = 0;
    while i < A {
        entries[i] = a[i];
        i += 1;
    }
    let mut j = 0;
    while j < B {
        entries[A + j] = b[j];
        j += 1;
    }
    entries
}

const NOTHING: Entry = op(0, "", &[]);

const ARITHMETIC: [Entry; 48] = {
    let add = arithmetic!(0x00, "ADD");
    let or = arithmetic!(0x08, "OR");
    let adc = arithmetic!(0x10, "ADC");
    let sbb = arithmetic!(0x18, "SBB");
    let and = arithmetic!(0x20, "AND");
    let sub = arithmetic!(0x28, "SUB");
    let xor = arithmetic!(0x30, "XOR");
    let cmp = arithmetic!(0x38, "CMP");
    let a: [Entry; 12] = concat(add, or, NOTHING);
    let b: [Entry; 12] = concat(adc, sbb, NOTHING);
    let c: [Entry; 12] = concat(and, sub, NOTHING);
    let d: [Entry; 12] = concat(xor, cmp, NOTHING);
    let ab: [Entry; 24] = concat(a, b, NOTHING);
    let cd: [Entry; 24] = concat(c, d, NOTHING);
    concat(ab, cd, NOTHING)
};

const GROUPS: [Entry; 64] = {
    let g80: [Entry; 8] = alu_group(0x80, &[Eb, Ib]);
    let g81: [Entry; 8] = alu_group(0x81, &[Ev, Iz]);
    let g83: [Entry; 8] = alu_group(0x83, &[Ev, Ibs]);
    let gc0: [Entry; 8] = shift_group(0xc0, &[Eb, Ib]);
    let gc1: [Entry; 8] = shift_group(0xc1, &[Ev, Ib]);
    let gd0: [Entry; 8] = shift_group(0xd0, &[Eb, One]);
    let gd1: [Entry; 8] = shift_group(0xd1, &[Ev, One]);
    let gd2: [Entry; 8] = shift_group(0xd2, &[Eb, Cl]);
    let a: [Entry; 16] = concat(g80, g81, NOTHING);
    let b: [Entry; 16] = concat(g83, gc0, NOTHING);
    let c: [Entry; 16] = concat(gc1, gd0, NOTHING);
    let d: [Entry; 16] = concat(gd1, gd2, NOTHING);
    let ab: [Entry; 32] = concat(a, b, NOTHING);
    let cd: [Entry; 32] = concat(c, d, NOTHING);
    concat(ab, cd, NOTHING)
};

const SHIFTS_D3: [Entry; 8] = shift_group(0xd3, &[Ev, Cl]);

const UNARY: [Entry; 16] = {
    let f6 = group!(0xf6, ["TEST", "TEST", "NOT", "NEG", "MUL", "IMUL", "DIV", "IDIV"], &[Eb]);
    let f7 = group!(0xf7, ["TEST", "TEST", "NOT", "NEG", "MUL", "IMUL", "DIV", "IDIV"], &[Ev]);
    concat(f6, f7, NOTHING)
};

const X87_MEMORY: [Entry; 64] = {
    let d8 = x87_arithmetic(0xd8, FLOAT, MEMORY32);
    let da = x87_arithmetic(0xda, INTEGER, MEMORY32);
    let dc = x87_arithmetic(0xdc, FLOAT, MEMORY64);
    let de = x87_arithmetic(0xde, INTEGER, MEMORY16);
    let d9 = x87_memory!(
        0xd9,
        ["FLD", "", "FST", "FSTP", "FLDENV", "FLDCW", "FNSTENV", "FNSTCW"],
        [&[Md], &[], &[Md], &[Md], &[Menv], &[Mw], &[Menv], &[Mw]]
    );
    let db = x87_memory!(
        0xdb,
        ["FILD", "FISTTP", "FIST", "FISTP", "", "FLD", "", "FSTP"],
        [&[Md], &[Md], &[Md], &[Md], &[], &[Mt], &[], &[Mt]]
    );
    let dd = x87_memory!(
        0xdd,
        ["FLD", "FISTTP", "FST", "FSTP", "", "", "", "FNSTSW"],
        [&[Mq], &[Mq], &[Mq], &[Mq], &[], &[], &[], &[Mw]]
    );
    let df = x87_memory!(
        0xdf,
        ["FILD", "FISTTP", "FIST", "FISTP", "FBLD", "FILD", "FBSTP", "FISTP"],
        [&[Mw], &[Mw], &[Mw], &[Mw], &[Mt], &[Mq], &[Mt], &[Mq]]
    );
    let a: [Entry; 16] = concat(d8, da, NOTHING);
    let b: [Entry; 16] = concat(dc, de, NOTHING);
    let c: [Entry; 16] = concat(d9, db, NOTHING);
    let d: [Entry; 16] = concat(dd, df, NOTHING);
    let ab: [Entry; 32] = concat(a, b, NOTHING);
    let cd: [Entry; 32] = concat(c, d, NOTHING);
    concat(ab, cd, NOTHING)
};

const SSE_ARITHMETIC: [Entry; 40] = {
    let sqrt = sse(0x51, ["SQRTPS", "SQRTPD", "SQRTSS", "SQRTSD"], &[Vx, Wx], &[Vx, Wd], &[Vx, Wq]);
    let add = sse(0x58, ["ADDPS", "ADDPD", "ADDSS", "ADDSD"], &[Vx, Wx], &[Vx, Wd], &[Vx, Wq]);
    let mul = sse(0x59, ["MULPS", "MULPD", "MULSS", "MULSD"], &[Vx, Wx], &[Vx, Wd], &[Vx, Wq]);
    let cvt = [
        op2(0x5a, "CVTPS2PD", &[Vx, Wq]),
        op2(0x5a, "CVTPD2PS", &[Vx, Wx]).prefix(P66),
        op2(0x5a, "CVTSS2SD", &[Vx, Wd]).prefix(Pf3),
        op2(0x5a, "CVTSD2SS", &[Vx, Wq]).prefix(Pf2),
    ];
    let sub = sse(0x5c, ["SUBPS", "SUBPD", "SUBSS", "SUBSD"], &[Vx, Wx], &[Vx, Wd], &[Vx, Wq]);
    let min = sse(0x5d, ["MINPS", "MINPD", "MINSS", "MINSD"], &[Vx, Wx], &[Vx, Wd], &[Vx, Wq]);
    let div = sse(0x5e, ["DIVPS", "DIVPD", "DIVSS", "DIVSD"], &[Vx, Wx], &[Vx, Wd], &[Vx, Wq]);
    let max = sse(0x5f, ["MAXPS", "MAXPD", "MAXSS", "MAXSD"], &[Vx, Wx], &[Vx, Wd], &[Vx, Wq]);
    let moves = sse(0x10, ["MOVUPS", "MOVUPD", "MOVSS", "MOVSD"], &[Vx, Wx], &[Vx, Wd], &[Vx, Wq]);
    let stores = sse(0x11, ["MOVUPS", "MOVUPD", "MOVSS", "MOVSD"], &[Wx, Vx], &[Wd, Vx], &[Wq, Vx]);
    let a: [Entry; 8] = concat(sqrt, add, NOTHING);
    let b: [Entry; 8] = concat(mul, cvt, NOTHING);
    let c: [Entry; 8] = concat(sub, min, NOTHING);
    let d: [Entry; 8] = concat(div, max, NOTHING);
    let e: [Entry; 8] = concat(moves, stores, NOTHING);
    let ab: [Entry; 16] = concat(a, b, NOTHING);
    let cd: [Entry; 16] = concat(c, d, NOTHING);
    let abcd: [Entry; 32] = concat(ab, cd, NOTHING);
    concat(abcd, e, NOTHING)
};

#[rustfmt::skip]
const PRIMARY: &[Entry] = &[
    op(0x06, "PUSH", &[Seg(0)]).x86(),
    op(0x07, "POP", &[Seg(0)]).x86(),
    op(0x0e, "PUSH", &[Seg(1)]).x86(),
    op(0x16, "PUSH", &[Seg(2)]).x86(),
    op(0x17, "POP", &[Seg(2)]).x86(),
    op(0x1e, "PUSH", &[Seg(3)]).x86(),
    op(0x1f, "POP", &[Seg(3)]).x86(),
    op(0x27, "DAA", &[]).x86(),
    op(0x2f, "DAS", &[]).x86(),
    op(0x37, "AAA", &[]).x86(),
    op(0x3f, "AAS", &[]).x86(),
    op(0x40, "INC", &[Zv]).span(8).x86(),
    op(0x48, "DEC", &[Zv]).span(8).x86(),
    op(0x50, "PUSH", &[Zv]).span(8).stack(),
    op(0x58, "POP", &[Zv]).span(8).stack(),
    sized(0x60, ["PUSHA", "PUSHAD", "PUSHAD"], &[]).x86(),
    sized(0x61, ["POPA", "POPAD", "POPAD"], &[]).x86(),
    op(0x62, "BOUND", &[Gv, M]).modrm(ModRm::Memory).x86(),
    op(0x63, "ARPL", &[Ew, Gw]).x86(),
    op(0x63, "MOVSXD", &[Gv, Ed]).amd64(),
    op(0x68, "PUSH", &[Iz]).stack(),
    op(0x69, "IMUL", &[Gv, Ev, Iz]),
    op(0x6a, "PUSH", &[Ibs]).stack(),
    op(0x6b, "IMUL", &[Gv, Ev, Ibs]),
    op(0x6c, "INSB", &[]),
    sized(0x6d, ["INSW", "INSD", "INSD"], &[]),
    op(0x6e, "OUTSB", &[]),
    sized(0x6f, ["OUTSW", "OUTSD", "OUTSD"], &[]),
    Entry::new(Primary, 0x70, Condition("J"), &[Jb]).span(16),
    op(0x82, "ADD", &[Eb, Ib]).modrm(Digit(0)).x86(),
    op(0x82, "OR", &[Eb, Ib]).modrm(Digit(1)).x86(),
    op(0x82, "ADC", &[Eb, Ib]).modrm(Digit(2)).x86(),
    op(0x82, "SBB", &[Eb, Ib]).modrm(Digit(3)).x86(),
    op(0x82, "AND", &[Eb, Ib]).modrm(Digit(4)).x86(),
    op(0x82, "SUB", &[Eb, Ib]).modrm(Digit(5)).x86(),
    op(0x82, "XOR", &[Eb, Ib]).modrm(Digit(6)).x86(),
    op(0x82, "CMP", &[Eb, Ib]).modrm(Digit(7)).x86(),
    op(0x84, "TEST", &[Eb, Gb]),
    op(0x85, "TEST", &[Ev, Gv]),
    op(0x86, "XCHG", &[Eb, Gb]),
    op(0x87, "XCHG", &[Ev, Gv]),
    op(0x88, "MOV", &[Eb, Gb]),
    op(0x89, "MOV", &[Ev, Gv]),
    op(0x8a, "MOV", &[Gb, Eb]),
    op(0x8b, "MOV", &[Gv, Ev]),
    op(0x8c, "MOV", &[Ew, Sw]),
    op(0x8d, "LEA", &[Gv, M]),
    op(0x8e, "MOV", &[Sw, Ew]),
    op(0x8f, "POP", &[Ev]).modrm(Digit(0)).stack(),
    op(0x90, "NOP", &[]),
    op(0x90, "PAUSE", &[]).prefix(Pf3),
    op(0x90, "XCHG", &[Zv, Av]).span(8),
    sized(0x98, ["CBW", "CWDE", "CDQE"], &[]),
    sized(0x99, ["CWD", "CDQ", "CQO"], &[]),
    op(0x9a, "CALLF", &[Ap]).x86(),
    op(0x9b, "WAIT", &[]),
    sized(0x9c, ["PUSHF", "PUSHFD", "PUSHFQ"], &[]).stack(),
    sized(0x9d, ["POPF", "POPFD", "POPFQ"], &[]).stack(),
    op(0x9e, "SAHF", &[]),
    op(0x9f, "LAHF", &[]),
    op(0xa0, "MOV", &[Al, Ob]),
    op(0xa1, "MOV", &[Av, Ov]),
    op(0xa2, "MOV", &[Ob, Al]),
    op(0xa3, "MOV", &[Ov, Av]),
    op(0xa4, "MOVSB", &[]),
    sized(0xa5, ["MOVSW", "MOVSD", "MOVSQ"], &[]),
    op(0xa6, "CMPSB", &[]),
    sized(0xa7, ["CMPSW", "CMPSD", "CMPSQ"], &[]),
    op(0xa8, "TEST", &[Al, Ib]),
    op(0xa9, "TEST", &[Av, Iz]),
    op(0xaa, "STOSB", &[]),
    sized(0xab, ["STOSW", "STOSD", "STOSQ"], &[]),
    op(0xac, "LODSB", &[]),
    sized(0xad, ["LODSW", "LODSD", "LODSQ"], &[]),
    op(0xae, "SCASB", &[]),
    sized(0xaf, ["SCASW", "SCASD", "SCASQ"], &[]),
    op(0xb0, "MOV", &[Zb, Ib]).span(8),
    op(0xb8, "MOV", &[Zv, Iv]).span(8),
    op(0xc2, "RET", &[Iw]).stack(),
    op(0xc3, "RET", &[]).stack(),
    op(0xc4, "LES", &[Gv, Mp]).modrm(ModRm::Memory).x86(),
    op(0xc5, "LDS", &[Gv, Mp]).modrm(ModRm::Memory).x86(),
    op(0xc6, "MOV", &[Eb, Ib]).modrm(Digit(0)),
    op(0xc7, "MOV", &[Ev, Iz]).modrm(Digit(0)),
    op(0xc8, "ENTER", &[Iw, Ib]).stack(),
    op(0xc9, "LEAVE", &[]).stack(),
    op(0xca, "RETF", &[Iw]),
    op(0xcb, "RETF", &[]),
    op(0xcc, "INT3", &[]),
    op(0xcd, "INT", &[Ib]),
    op(0xce, "INTO", &[]).x86(),
    sized(0xcf, ["IRET", "IRETD", "IRETQ"], &[]),
    op(0xd4, "AAM", &[Ib]).x86(),
    op(0xd5, "AAD", &[Ib]).x86(),
    op(0xd7, "XLAT", &[]),
    op(0xd8, "FADD", &[St0, Sti]).modrm(DigitRegister(0)),
    op(0xd8, "FMUL", &[St0, Sti]).modrm(DigitRegister(1)),
    op(0xd8, "FCOM", &[St0, Sti]).modrm(DigitRegister(2)),
    op(0xd8, "FCOMP", &[St0, Sti]).modrm(DigitRegister(3)),
    op(0xd8, "FSUB", &[St0, Sti]).modrm(DigitRegister(4)),
    op(0xd8, "FSUBR", &[St0, Sti]).modrm(DigitRegister(5)),
    op(0xd8, "FDIV", &[St0, Sti]).modrm(DigitRegister(6)),
    op(0xd8, "FDIVR", &[St0, Sti]).modrm(DigitRegister(7)),
    op(0xd9, "FLD", &[Sti]).modrm(DigitRegister(0)),
    op(0xd9, "FXCH", &[Sti]).modrm(DigitRegister(1)),
    op(0xd9, "FNOP", &[]).modrm(Exact(0xd0)),
    op(0xd9, "FCHS", &[]).modrm(Exact(0xe0)),
    op(0xd9, "FABS", &[]).modrm(Exact(0xe1)),
    op(0xd9, "FTST", &[]).modrm(Exact(0xe4)),
    op(0xd9, "FXAM", &[]).modrm(Exact(0xe5)),
    op(0xd9, "FLD1", &[]).modrm(Exact(0xe8)),
    op(0xd9, "FLDL2T", &[]).modrm(Exact(0xe9)),
    op(0xd9, "FLDL2E", &[]).modrm(Exact(0xea)),
    op(0xd9, "FLDPI", &[]).modrm(Exact(0xeb)),
    op(0xd9, "FLDLG2", &[]).modrm(Exact(0xec)),
    op(0xd9, "FLDLN2", &[]).modrm(Exact(0xed)),
    op(0xd9, "FLDZ", &[]).modrm(Exact(0xee)),
    op(0xd9, "F2XM1", &[]).modrm(Exact(0xf0)),
    op(0xd9, "FYL2X", &[]).modrm(Exact(0xf1)),
    op(0xd9, "FPTAN", &[]).modrm(Exact(0xf2)),
    op(0xd9, "FPATAN", &[]).modrm(Exact(0xf3)),
    op(0xd9, "FPREM", &[]).modrm(Exact(0xf8)),
    op(0xd9, "FSQRT", &[]).modrm(Exact(0xfa)),
    op(0xd9, "FRNDINT", &[]).modrm(Exact(0xfc)),
    op(0xd9, "FSCALE", &[]).modrm(Exact(0xfd)),
    op(0xd9, "FSIN", &[]).modrm(Exact(0xfe)),
    op(0xd9, "FCOS", &[]).modrm(Exact(0xff)),
    op(0xda, "FCMOVB", &[St0, Sti]).modrm(DigitRegister(0)),
    op(0xda, "FCMOVE", &[St0, Sti]).modrm(DigitRegister(1)),
    op(0xda, "FCMOVBE", &[St0, Sti]).modrm(DigitRegister(2)),
    op(0xda, "FCMOVU", &[St0, Sti]).modrm(DigitRegister(3)),
    op(0xda, "FUCOMPP", &[]).modrm(Exact(0xe9)),
    op(0xdb, "FCMOVNB", &[St0, Sti]).modrm(DigitRegister(0)),
    op(0xdb, "FCMOVNE", &[St0, Sti]).modrm(DigitRegister(1)),
    op(0xdb, "FCMOVNBE", &[St0, Sti]).modrm(DigitRegister(2)),
    op(0xdb, "FCMOVNU", &[St0, Sti]).modrm(DigitRegister(3)),
    op(0xdb, "FNCLEX", &[]).modrm(Exact(0xe2)),
    op(0xdb, "FNINIT", &[]).modrm(Exact(0xe3)),
    op(0xdb, "FUCOMI", &[St0, Sti]).modrm(DigitRegister(5)),
    op(0xdb, "FCOMI", &[St0, Sti]).modrm(DigitRegister(6)),
    op(0xdc, "FADD", &[Sti, St0]).modrm(DigitRegister(0)),
    op(0xdc, "FMUL", &[Sti, St0]).modrm(DigitRegister(1)),
    op(0xdc, "FSUBR", &[Sti, St0]).modrm(DigitRegister(4)),
    op(0xdc, "FSUB", &[Sti, St0]).modrm(DigitRegister(5)),
    op(0xdc, "FDIVR", &[Sti, St0]).modrm(DigitRegister(6)),
    op(0xdc, "FDIV", &[Sti, St0]).modrm(DigitRegister(7)),
    op(0xdd, "FFREE", &[Sti]).modrm(DigitRegister(0)),
    op(0xdd, "FST", &[Sti]).modrm(DigitRegister(2)),
    op(0xdd, "FSTP", &[Sti]).modrm(DigitRegister(3)),
    op(0xdd, "FUCOM", &[Sti]).modrm(DigitRegister(4)),
    op(0xdd, "FUCOMP", &[Sti]).modrm(DigitRegister(5)),
    op(0xde, "FADDP", &[Sti, St0]).modrm(DigitRegister(0)),
    op(0xde, "FMULP", &[Sti, St0]).modrm(DigitRegister(1)),
    op(0xde, "FCOMPP", &[]).modrm(Exact(0xd9)),
    op(0xde, "FSUBRP", &[Sti, St0]).modrm(DigitRegister(4)),
    op(0xde, "FSUBP", &[Sti, St0]).modrm(DigitRegister(5)),
    op(0xde, "FDIVRP", &[Sti, St0]).modrm(DigitRegister(6)),
    op(0xde, "FDIVP", &[Sti, St0]).modrm(DigitRegister(7)),
    op(0xdf, "FNSTSW", &[Ax]).modrm(Exact(0xe0)),
    op(0xdf, "FUCOMIP", &[St0, Sti]).modrm(DigitRegister(5)),
    op(0xdf, "FCOMIP", &[St0, Sti]).modrm(DigitRegister(6)),
    op(0xe0, "LOOPNE", &[Jb]).stack(),
    op(0xe1, "LOOPE", &[Jb]).stack(),
    op(0xe2, "LOOP", &[Jb]).stack(),
    Entry::new(Primary, 0xe3, AddressSize(["JCXZ", "JECXZ", "JRCXZ"]), &[Jb]).stack(),
    op(0xe4, "IN", &[Al, Ib]),
    op(0xe5, "IN", &[Az, Ib]),
    op(0xe6, "OUT", &[Ib, Al]),
    op(0xe7, "OUT", &[Ib, Az]),
    op(0xe8, "CALL", &[Jz]).stack(),
    op(0xe9, "JMP", &[Jz]).stack(),
    op(0xea, "JMPF", &[Ap]).x86(),
    op(0xeb, "JMP", &[Jb]).stack(),
    op(0xec, "IN", &[Al, Dx]),
    op(0xed, "IN", &[Az, Dx]),
    op(0xee, "OUT", &[Dx, Al]),
    op(0xef, "OUT", &[Dx, Az]),
    op(0xf1, "INT1", &[]),
    op(0xf4, "HLT", &[]),
    op(0xf5, "CMC", &[]),
    op(0xf8, "CLC", &[]),
    op(0xf9, "STC", &[]),
    op(0xfa, "CLI", &[]),
    op(0xfb, "STI", &[]),
    op(0xfc, "CLD", &[]),
    op(0xfd, "STD", &[]),
    op(0xfe, "INC", &[Eb]).modrm(Digit(0)),
    op(0xfe, "DEC", &[Eb]).modrm(Digit(1)),
    op(0xff, "INC", &[Ev]).modrm(Digit(0)),
    op(0xff, "DEC", &[Ev]).modrm(Digit(1)),
    op(0xff, "CALL", &[Ev]).modrm(Digit(2)).stack(),
    op(0xff, "CALLF", &[Mp]).modrm(DigitMemory(3)),
    op(0xff, "JMP", &[Ev]).modrm(Digit(4)).stack(),
    op(0xff, "JMPF", &[Mp]).modrm(DigitMemory(5)),
    op(0xff, "PUSH", &[Ev]).modrm(Digit(6)).stack(),
];

#[rustfmt::skip]
const SECONDARY: &[Entry] = &[
    op2(0x05, "SYSCALL", &[]),
    op2(0x0b, "UD2", &[]),
    op2(0x18, "PREFETCHNTA", &[Mb]).modrm(DigitMemory(0)),
    op2(0x18, "PREFETCHT0", &[Mb]).modrm(DigitMemory(1)),
    op2(0x18, "PREFETCHT1", &[Mb]).modrm(DigitMemory(2)),
    op2(0x18, "PREFETCHT2", &[Mb]).modrm(DigitMemory(3)),
    op2(0x1e, "ENDBR64", &[]).prefix(Pf3).modrm(Exact(0xfa)),
    op2(0x1e, "ENDBR32", &[]).prefix(Pf3).modrm(Exact(0xfb)),
    op2(0x1f, "NOP", &[Ev]).modrm(Digit(0)),
    op2(0x28, "MOVAPS", &[Vx, Wx]),
    op2(0x28, "MOVAPD", &[Vx, Wx]).prefix(P66),
    op2(0x29, "MOVAPS", &[Wx, Vx]),
    op2(0x29, "MOVAPD", &[Wx, Vx]).prefix(P66),
    op2(0x2a, "CVTSI2SS", &[Vx, Ey]).prefix(Pf3),
    op2(0x2a, "CVTSI2SD", &[Vx, Ey]).prefix(Pf2),
    op2(0x2c, "CVTTSS2SI", &[Gy, Wd]).prefix(Pf3),
    op2(0x2c, "CVTTSD2SI", &[Gy, Wq]).prefix(Pf2),
    op2(0x2d, "CVTSS2SI", &[Gy, Wd]).prefix(Pf3),
    op2(0x2d, "CVTSD2SI", &[Gy, Wq]).prefix(Pf2),
    op2(0x2e, "UCOMISS", &[Vx, Wd]),
    op2(0x2e, "UCOMISD", &[Vx, Wq]).prefix(P66),
    op2(0x2f, "COMISS", &[Vx, Wd]),
    op2(0x2f, "COMISD", &[Vx, Wq]).prefix(P66),
    op2(0x31, "RDTSC", &[]),
    op2(0x34, "SYSENTER", &[]),
    Entry::new(Secondary, 0x40, Condition("CMOV"), &[Gv, Ev]).span(16),
    op2(0x54, "ANDPS", &[Vx, Wx]),
    op2(0x54, "ANDPD", &[Vx, Wx]).prefix(P66),
    op2(0x55, "ANDNPS", &[Vx, Wx]),
    op2(0x55, "ANDNPD", &[Vx, Wx]).prefix(P66),
    op2(0x56, "ORPS", &[Vx, Wx]),
    op2(0x56, "ORPD", &[Vx, Wx]).prefix(P66),
    op2(0x57, "XORPS", &[Vx, Wx]),
    op2(0x57, "XORPD", &[Vx, Wx]).prefix(P66),
    Entry::new(Secondary, 0x6e, OperandSize(["MOVD", "MOVD", "MOVQ"]), &[Pq, Ey]),
    Entry::new(Secondary, 0x6e, OperandSize(["MOVD", "MOVD", "MOVQ"]), &[Vx, Ey]).prefix(P66),
    op2(0x6f, "MOVQ", &[Pq, Qq]),
    op2(0x6f, "MOVDQA", &[Vx, Wx]).prefix(P66),
    op2(0x6f, "MOVDQU", &[Vx, Wx]).prefix(Pf3),
    Entry::new(Secondary, 0x7e, OperandSize(["MOVD", "MOVD", "MOVQ"]), &[Ey, Pq]),
    Entry::new(Secondary, 0x7e, OperandSize(["MOVD", "MOVD", "MOVQ"]), &[Ey, Vx]).prefix(P66),
    op2(0x7e, "MOVQ", &[Vx, Wq]).prefix(Pf3),
    op2(0x7f, "MOVQ", &[Qq, Pq]),
    op2(0x7f, "MOVDQA", &[Wx, Vx]).prefix(P66),
    op2(0x7f, "MOVDQU", &[Wx, Vx]).prefix(Pf3),
    Entry::new(Secondary, 0x80, Condition("J"), &[Jz]).span(16).stack(),
    Entry::new(Secondary, 0x90, Condition("SET"), &[Eb]).span(16),
    op2(0xa0, "PUSH", &[Seg(4)]).stack(),
    op2(0xa1, "POP", &[Seg(4)]).stack(),
    op2(0xa2, "CPUID", &[]),
    op2(0xa3, "BT", &[Ev, Gv]),
    op2(0xa4, "SHLD", &[Ev, Gv, Ib]),
    op2(0xa5, "SHLD", &[Ev, Gv, Cl]),
    op2(0xa8, "PUSH", &[Seg(5)]).stack(),
    op2(0xa9, "POP", &[Seg(5)]).stack(),
    op2(0xab, "BTS", &[Ev, Gv]),
    op2(0xac, "SHRD", &[Ev, Gv, Ib]),
    op2(0xad, "SHRD", &[Ev, Gv, Cl]),
    op2(0xae, "LFENCE", &[]).modrm(Exact(0xe8)),
    op2(0xae, "MFENCE", &[]).modrm(Exact(0xf0)),
    op2(0xae, "SFENCE", &[]).modrm(Exact(0xf8)),
    op2(0xaf, "IMUL", &[Gv, Ev]),
    op2(0xb0, "CMPXCHG", &[Eb, Gb]),
    op2(0xb1, "CMPXCHG", &[Ev, Gv]),
    op2(0xb2, "LSS", &[Gv, Mp]),
    op2(0xb3, "BTR", &[Ev, Gv]),
    op2(0xb4, "LFS", &[Gv, Mp]),
    op2(0xb5, "LGS", &[Gv, Mp]),
    op2(0xb6, "MOVZX", &[Gv, Eb]),
    op2(0xb7, "MOVZX", &[Gv, Ew]),
    op2(0xb8, "POPCNT", &[Gv, Ev]).prefix(Pf3),
    op2(0xba, "BT", &[Ev, Ib]).modrm(Digit(4)),
    op2(0xba, "BTS", &[Ev, Ib]).modrm(Digit(5)),
    op2(0xba, "BTR", &[Ev, Ib]).modrm(Digit(6)),
    op2(0xba, "BTC", &[Ev, Ib]).modrm(Digit(7)),
    op2(0xbb, "BTC", &[Ev, Gv]),
    op2(0xbc, "BSF", &[Gv, Ev]),
    op2(0xbc, "TZCNT", &[Gv, Ev]).prefix(Pf3),
    op2(0xbd, "BSR", &[Gv, Ev]),
    op2(0xbd, "LZCNT", &[Gv, Ev]).prefix(Pf3),
    op2(0xbe, "MOVSX", &[Gv, Eb]),
    op2(0xbf, "MOVSX", &[Gv, Ew]),
    op2(0xc0, "XADD", &[Eb, Gb]),
    op2(0xc1, "XADD", &[Ev, Gv]),
    op2(0xc7, "CMPXCHG8B", &[Mq]).modrm(DigitMemory(1)),
    op2(0xc8, "BSWAP", &[Zv]).span(8),
    op2(0xd6, "MOVQ", &[Wq, Vx]).prefix(P66),
    op2(0xef, "PXOR", &[Pq, Qq]),
    op2(0xef, "PXOR", &[Vx, Wx]).prefix(P66),
];

fn tables() -> impl Iterator<Item = &'static Entry> {
    static ARITHMETIC_TABLE: [Entry; 48] = ARITHMETIC;
    static GROUP_TABLE: [Entry; 64] = GROUPS;
    static SHIFT_TABLE: [Entry; 8] = SHIFTS_D3;
    static UNARY_TABLE: [Entry; 16] = UNARY;
    static X87_TABLE: [Entry; 64] = X87_MEMORY;
    static SSE_TABLE: [Entry; 40] = SSE_ARITHMETIC;
    ARITHMETIC_TABLE
        .iter()
        .chain(GROUP_TABLE.iter())
        .chain(SHIFT_TABLE.iter())
        .chain(UNARY_TABLE.iter())
        .chain(X87_TABLE.iter())
        .chain(SSE_TABLE.iter())
        .chain(PRIMARY.iter())
        .chain(SECONDARY.iter())
        .filter(|entry| match entry.mnemonic {
            Fixed(mnemonic) => !mnemonic.is_empty(),
            _ => true,
        })
}

type Index = FxHashMap<(Map, u8), Vec<&'static Entry>>;

fn index() -> &'static Index {
    static INDEX: OnceLock<Index> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut index = Index::default();
        for entry in tables() {
            for offset in 0..entry.span {
                index
                    .entry((entry.map, entry.opcode.wrapping_add(offset)))
                    .or_insert_with(Vec::new)
                    .push(entry);
            }
        }
        index
    })
}

/// Every entry which covers `opcode` in `map` and is valid in `mode`.
pub(crate) fn candidates(map: Map, opcode: u8, mode: Mode) -> Vec<&'static Entry> {
    index()
        .get(&(map, opcode))
        .map(|entries| {
            entries
                .iter()
                .copied()
                .filter(|entry| entry.supports(mode))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_duplicate_encodings() {
        let mut seen = Vec::new();
        for entry in tables() {
            let key = (
                entry.map,
                entry.opcode,
                entry.span,
                entry.mandatory,
                entry.modrm,
                entry.modes,
            );
            assert!(!seen.contains(&key), "duplicate entry {:?}", entry);
            seen.push(key);
        }
    }

    #[test]
    fn groups_cover_every_digit() {
        let entries = candidates(Primary, 0x83, Mode::X86);
        assert_eq!(entries.len(), 8);
        assert!(candidates(Primary, 0x82, Mode::Amd64).is_empty());
    }
}
