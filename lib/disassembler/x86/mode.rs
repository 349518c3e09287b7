use crate::disassembler::x86::register::get_register;
use crate::expr::Register;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Processor mode, which picks register names and default sizes.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Mode {
    /// 32-bit protected mode.
    X86,
    /// 64-bit long mode.
    Amd64,
}

/// A status flag, held as a bit of eflags.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Flag {
    Cf,
    Pf,
    Af,
    Zf,
    Sf,
    Tf,
    If,
    Df,
    Of,
}

impl Flag {
    pub fn name(&self) -> &'static str {
        match *self {
            Flag::Cf => "cf",
            Flag::Pf => "pf",
            Flag::Af => "af",
            Flag::Zf => "zf",
            Flag::Sf => "sf",
            Flag::Tf => "tf",
            Flag::If => "if",
            Flag::Df => "df",
            Flag::Of => "of",
        }
    }

    /// Bit offset in eflags.
    pub fn offset(&self) -> usize {
        match *self {
            Flag::Cf => 0,
            Flag::Pf => 2,
            Flag::Af => 4,
            Flag::Zf => 6,
            Flag::Sf => 7,
            Flag::Tf => 8,
            Flag::If => 9,
            Flag::Df => 10,
            Flag::Of => 11,
        }
    }
}

impl Mode {
    pub fn get_register(&self, name: &str) -> Result<Register, Error> {
        get_register(*self, name)
    }

    /// Width of the program counter, stack pointer and addresses.
    pub fn bits(&self) -> usize {
        match *self {
            Mode::X86 => 32,
            Mode::Amd64 => 64,
        }
    }

    pub fn pc(&self) -> Register {
        match *self {
            Mode::X86 => Register::new("eip", 32),
            Mode::Amd64 => Register::new("rip", 64),
        }
    }

    pub fn sp(&self) -> Register {
        match *self {
            Mode::X86 => Register::new("esp", 32),
            Mode::Amd64 => Register::new("rsp", 64),
        }
    }

    pub fn bp(&self) -> Register {
        match *self {
            Mode::X86 => Register::new("ebp", 32),
            Mode::Amd64 => Register::new("rbp", 64),
        }
    }

    pub fn eflags(&self) -> Register {
        Register::new("eflags", 32)
    }

    pub fn flag(&self, flag: Flag) -> Register {
        Register::new_slice(flag.name(), &self.eflags(), flag.offset(), 1)
    }

    pub(crate) fn gpr_sized(&self, number: u8, bits: usize) -> Result<Register, Error> {
        crate::disassembler::x86::register::gpr(*self, number, bits, false)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Mode::X86 => write!(f, "x86"),
            Mode::Amd64 => write!(f, "amd64"),
        }
    }
}
