use crate::expr::{Constant, Register};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An immediate operand.
///
/// The constant keeps the width it was encoded with. Immediates which the
/// processor sign-extends are marked signed.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Immediate {
    constant: Constant,
    relative: bool,
}

impl Immediate {
    pub fn new(constant: Constant) -> Immediate {
        Immediate {
            constant,
            relative: false,
        }
    }

    /// A displacement from the end of the instruction, used by near branches.
    pub fn relative(constant: Constant) -> Immediate {
        Immediate {
            constant,
            relative: true,
        }
    }

    pub fn constant(&self) -> &Constant {
        &self.constant
    }

    pub fn bits(&self) -> usize {
        self.constant.bits()
    }

    pub fn is_signed(&self) -> bool {
        self.constant.is_signed()
    }

    pub fn is_relative(&self) -> bool {
        self.relative
    }

    /// The value, sign-extended when the immediate is signed.
    pub fn value_i64(&self) -> i64 {
        let bits = self.constant.bits();
        let value = self.constant.value_u64().unwrap_or(0);
        if self.is_signed() && bits < 64 && self.constant.msb() {
            (value | (!0u64 << bits)) as i64
        } else {
            value as i64
        }
    }
}

/// A memory operand, as encoded.
///
/// `segment` is the segment the access goes through, either from an override
/// prefix or by default. `segment_override` records whether it was encoded.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct MemoryOperand {
    base: Option<Register>,
    index: Option<Register>,
    scale: u8,
    displacement: i64,
    segment: Option<Register>,
    segment_override: bool,
    bits: usize,
    address_bits: usize,
}

impl MemoryOperand {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base: Option<Register>,
        index: Option<Register>,
        scale: u8,
        displacement: i64,
        segment: Option<Register>,
        segment_override: bool,
        bits: usize,
        address_bits: usize,
    ) -> MemoryOperand {
        MemoryOperand {
            base,
            index,
            scale,
            displacement,
            segment,
            segment_override,
            bits,
            address_bits,
        }
    }

    pub fn base(&self) -> Option<&Register> {
        self.base.as_ref()
    }

    pub fn index(&self) -> Option<&Register> {
        self.index.as_ref()
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn displacement(&self) -> i64 {
        self.displacement
    }

    pub fn segment(&self) -> Option<&Register> {
        self.segment.as_ref()
    }

    pub fn segment_override(&self) -> bool {
        self.segment_override
    }

    /// Width of the accessed value.
    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn address_bits(&self) -> usize {
        self.address_bits
    }

    /// True when the address is relative to the instruction pointer.
    pub fn is_pc_relative(&self) -> bool {
        self.base
            .as_ref()
            .map(|base| base.full_name() == "rip")
            .unwrap_or(false)
    }

    pub(crate) fn with_bits(mut self, bits: usize) -> MemoryOperand {
        self.bits = bits;
        self
    }
}

impl fmt::Display for MemoryOperand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "M{}", self.bits)?;
        if let Some(segment) = self.segment.as_ref() {
            write!(f, "{}", segment)?;
        }
        write!(f, "(")?;
        let mut empty = true;
        if let Some(base) = self.base.as_ref() {
            write!(f, "{}", base)?;
            empty = false;
        }
        if let Some(index) = self.index.as_ref() {
            if !empty {
                write!(f, "+")?;
            }
            write!(f, "{}*{}", index, self.scale)?;
            empty = false;
        }
        if empty {
            let mask = if self.address_bits >= 64 {
                !0u64
            } else {
                (1u64 << self.address_bits) - 1
            };
            write!(f, "0x{:x}", (self.displacement as u64) & mask)?;
        } else if self.displacement > 0 {
            write!(f, "+{}", self.displacement)?;
        } else if self.displacement < 0 {
            write!(f, "{}", self.displacement)?;
        }
        write!(f, ")")
    }
}

/// An instruction operand.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Operand {
    Register(Register),
    Immediate(Immediate),
    Memory(MemoryOperand),
}

impl Operand {
    pub fn bits(&self) -> usize {
        match *self {
            Operand::Register(ref register) => register.bits(),
            Operand::Immediate(ref immediate) => immediate.bits(),
            Operand::Memory(ref memory) => memory.bits(),
        }
    }

    pub fn register(&self) -> Option<&Register> {
        match *self {
            Operand::Register(ref register) => Some(register),
            _ => None,
        }
    }

    pub fn immediate(&self) -> Option<&Immediate> {
        match *self {
            Operand::Immediate(ref immediate) => Some(immediate),
            _ => None,
        }
    }

    pub fn memory(&self) -> Option<&MemoryOperand> {
        match *self {
            Operand::Memory(ref memory) => Some(memory),
            _ => None,
        }
    }

    pub fn is_register(&self) -> bool {
        self.register().is_some()
    }

    pub fn is_immediate(&self) -> bool {
        self.immediate().is_some()
    }

    pub fn is_memory(&self) -> bool {
        self.memory().is_some()
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Operand::Register(ref register) => register.fmt(f),
            Operand::Immediate(ref immediate) => immediate.constant().fmt(f),
            Operand::Memory(ref memory) => memory.fmt(f),
        }
    }
}
