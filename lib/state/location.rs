use crate::expr::{Memory, Register};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A place in machine state which holds a value.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Location {
    Register(Register),
    Memory(Memory),
}

impl Location {
    pub fn bits(&self) -> usize {
        match *self {
            Location::Register(ref register) => register.bits(),
            Location::Memory(ref memory) => memory.bits(),
        }
    }

    pub fn register(&self) -> Option<&Register> {
        match *self {
            Location::Register(ref register) => Some(register),
            Location::Memory(_) => None,
        }
    }

    pub fn memory(&self) -> Option<&Memory> {
        match *self {
            Location::Register(_) => None,
            Location::Memory(ref memory) => Some(memory),
        }
    }
}

impl From<Register> for Location {
    fn from(register: Register) -> Location {
        Location::Register(register)
    }
}

impl From<Memory> for Location {
    fn from(memory: Memory) -> Location {
        Location::Memory(memory)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Location::Register(ref register) => register.fmt(f),
            Location::Memory(ref memory) => memory.fmt(f),
        }
    }
}
