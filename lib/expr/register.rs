use serde::{Deserialize, Serialize};
use std::fmt;

/// A named register, or a named slice of a register.
///
/// Every register belongs to a full register. For example, `al` is the 8-bit
/// slice at offset 0 of `eax`, and `ah` is the 8-bit slice at offset 8. Full
/// registers are their own full register. A `StateMap` binds values to full
/// registers only, and projects slices out of them.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Register {
    name: String,
    full: String,
    full_bits: usize,
    offset: usize,
    bits: usize,
}

impl Register {
    /// Create a new full-width register.
    pub fn new<S: Into<String>>(name: S, bits: usize) -> Register {
        let name = name.into();
        Register {
            full: name.clone(),
            name,
            full_bits: bits,
            offset: 0,
            bits,
        }
    }

    /// Create a named slice of the given full register.
    pub fn new_slice<S: Into<String>>(
        name: S,
        full: &Register,
        offset: usize,
        bits: usize,
    ) -> Register {
        Register {
            name: name.into(),
            full: full.full.clone(),
            full_bits: full.full_bits,
            offset: full.offset + offset,
            bits,
        }
    }

    /// An unnamed slice of this register, named after the bits it covers.
    pub fn slice(&self, offset: usize, bits: usize) -> Register {
        let offset = self.offset + offset;
        Register {
            name: format!("{}[{}:{}]", self.full, offset, offset + bits),
            full: self.full.clone(),
            full_bits: self.full_bits,
            offset,
            bits,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the full register this register belongs to.
    pub fn full_name(&self) -> &str {
        &self.full
    }

    pub fn full_bits(&self) -> usize {
        self.full_bits
    }

    /// The offset, in bits, of this register inside its full register.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Returns true if this is a full-width register (i.e. eax, ebx, etc)
    pub fn is_full(&self) -> bool {
        self.offset == 0 && self.bits == self.full_bits
    }

    /// Returns the full-width register for this register
    pub fn full(&self) -> Register {
        Register::new(self.full.clone(), self.full_bits)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
