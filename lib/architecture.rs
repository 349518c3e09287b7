//! Information and types for Kestrel's supported architectures.

use crate::disassembler::x86::{self, Mode};
use crate::disassembler::MachineInstruction;
use crate::expr::{expr_const, Register};
use crate::state::StateMap;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// An architecture's endianness.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Endian {
    Big,
    Little,
}

/// Necessary functions for decoding and evaluating over architectures.
pub trait Architecture: Debug + Send + Sync {
    /// The instruction this architecture decodes.
    type Instruction: MachineInstruction;

    /// Get the name of this architecture.
    fn name(&self) -> &'static str;
    /// Get the endianness of this architecture.
    fn endian(&self) -> Endian;
    /// Get the size of a natural word for this architecture in bits.
    fn word_size(&self) -> usize;
    /// Get the register holding the address of the next instruction.
    fn program_counter(&self) -> Register;
    /// Get the register used as the stack pointer.
    fn stack_pointer(&self) -> Register;
    /// Decode one instruction from the start of `bytes`.
    ///
    /// `address` is where `bytes` are located, when known. It is used to
    /// resolve relative branch targets when rendering.
    fn decode(&self, bytes: &[u8], address: Option<u64>) -> Result<Self::Instruction, Error>;

    /// A state where the program counter holds `entry`, and every other
    /// register holds its own initial value.
    fn initial_state(&self, entry: Option<u64>) -> StateMap {
        let mut state = StateMap::new();
        if let Some(entry) = entry {
            let pc = self.program_counter();
            // A constant of the register's own width always fits.
            let _ = state.write_register(&pc, expr_const(entry, pc.bits()));
        }
        state
    }
}

/// The 64-bit X86 Architecture.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Amd64 {}

impl Amd64 {
    pub fn new() -> Amd64 {
        Amd64 {}
    }
}

impl Architecture for Amd64 {
    type Instruction = x86::Instruction;

    fn name(&self) -> &'static str {
        "amd64"
    }
    fn endian(&self) -> Endian {
        Endian::Little
    }
    fn word_size(&self) -> usize {
        64
    }
    fn program_counter(&self) -> Register {
        Mode::Amd64.pc()
    }
    fn stack_pointer(&self) -> Register {
        Mode::Amd64.sp()
    }
    fn decode(&self, bytes: &[u8], address: Option<u64>) -> Result<x86::Instruction, Error> {
        Ok(x86::decode(Mode::Amd64, bytes, address)?)
    }
}

/// The 32-bit X86 Architecture.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct X86 {}

impl X86 {
    pub fn new() -> X86 {
        X86 {}
    }
}

impl Architecture for X86 {
    type Instruction = x86::Instruction;

    fn name(&self) -> &'static str {
        "x86"
    }
    fn endian(&self) -> Endian {
        Endian::Little
    }
    fn word_size(&self) -> usize {
        32
    }
    fn program_counter(&self) -> Register {
        Mode::X86.pc()
    }
    fn stack_pointer(&self) -> Register {
        Mode::X86.sp()
    }
    fn decode(&self, bytes: &[u8], address: Option<u64>) -> Result<x86::Instruction, Error> {
        Ok(x86::decode(Mode::X86, bytes, address)?)
    }
}
