use crate::expr::*;
use crate::Error;
use crate::RC;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The address of a memory reference.
///
/// An address is `base + index * scale + displacement`, optionally tagged
/// with a segment. Addresses are normalized when created: constant offsets
/// found in the base or index are folded into the displacement, and the
/// displacement is wrapped to the width of the address. Two addresses refer
/// to the same location, as far as a `StateMap` is concerned, only when they
/// are structurally equal after normalization.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Address {
    base: Option<RC<Expression>>,
    index: Option<RC<Expression>>,
    scale: u8,
    displacement: i64,
    segment: Option<String>,
    bits: usize,
}

// Sign-wrap a displacement to the width of the address.
fn wrap_displacement(displacement: i64, bits: usize) -> i64 {
    if bits >= 64 {
        displacement
    } else {
        let shift = 64 - bits;
        (displacement << shift) >> shift
    }
}

// Split `x + c` into `(x, c)`.
fn split_offset(expression: Expression) -> (Option<Expression>, i64) {
    match expression {
        Expression::Constant(ref constant) => (None, constant.value_i64().unwrap_or(0)),
        Expression::Composite(ref composite) if composite.operator() == Operator::Add => {
            match composite.operands()[1].get_constant() {
                Some(constant) => (
                    Some(composite.operands()[0].as_ref().clone()),
                    constant.value_i64().unwrap_or(0),
                ),
                None => (Some(expression.clone()), 0),
            }
        }
        expression => (Some(expression), 0),
    }
}

impl Address {
    /// Create a new, normalized, `Address`.
    ///
    /// `bits` is the width of the address. Base and index, when present, must
    /// be `bits` wide.
    pub fn new(
        base: Option<Expression>,
        index: Option<Expression>,
        scale: u8,
        displacement: i64,
        segment: Option<String>,
        bits: usize,
    ) -> Result<Address, Error> {
        for expression in base.iter().chain(index.iter()) {
            if expression.bits() != bits {
                return Err(Error::Sort);
            }
        }

        let mut displacement = displacement;

        let base = match base {
            Some(base) => {
                let (base, offset) = split_offset(base.simplify());
                displacement = displacement.wrapping_add(offset);
                base
            }
            None => None,
        };

        let (index, scale) = match index {
            Some(index) => match index.simplify() {
                Expression::Constant(constant) => {
                    let value = constant.value_i64().unwrap_or(0);
                    displacement = displacement.wrapping_add(value.wrapping_mul(scale as i64));
                    (None, 0)
                }
                index => (Some(RC::new(index)), scale),
            },
            None => (None, 0),
        };

        Ok(Address {
            base: base.map(RC::new),
            index,
            scale,
            displacement: wrap_displacement(displacement, bits),
            segment,
            bits,
        })
    }

    /// An absolute address.
    pub fn absolute(address: u64, segment: Option<String>, bits: usize) -> Address {
        Address {
            base: None,
            index: None,
            scale: 0,
            displacement: wrap_displacement(address as i64, bits),
            segment,
            bits,
        }
    }

    pub fn base(&self) -> Option<&Expression> {
        self.base.as_deref()
    }

    pub fn index(&self) -> Option<&Expression> {
        self.index.as_deref()
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn displacement(&self) -> i64 {
        self.displacement
    }

    pub fn segment(&self) -> Option<&str> {
        self.segment.as_deref()
    }

    /// The width of this address in bits.
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// If this address has neither base nor index, its absolute value.
    pub fn constant(&self) -> Option<u64> {
        if self.base.is_none() && self.index.is_none() {
            Some(Constant::from_i64(self.displacement, self.bits).value_u64().unwrap_or(0))
        } else {
            None
        }
    }

    /// This address moved by `bytes` bytes.
    pub fn offset(&self, bytes: i64) -> Address {
        let mut address = self.clone();
        address.displacement = wrap_displacement(self.displacement.wrapping_add(bytes), self.bits);
        address
    }

    /// Rebuild this address from new base and index expressions, keeping
    /// scale, displacement and segment.
    pub fn replace(
        &self,
        base: Option<Expression>,
        index: Option<Expression>,
    ) -> Result<Address, Error> {
        Address::new(
            base,
            index,
            self.scale,
            self.displacement,
            self.segment.clone(),
            self.bits,
        )
    }

    /// The flat value of this address as an expression, without segment.
    pub fn expression(&self) -> Result<Expression, Error> {
        let displacement = expr_const(
            Constant::from_i64(self.displacement, self.bits)
                .value_u64()
                .unwrap_or(0),
            self.bits,
        );
        let mut expression: Option<Expression> = self.base().cloned();
        if let Some(index) = self.index() {
            let index = Expression::mul(index.clone(), expr_const(self.scale as u64, self.bits))?;
            expression = Some(match expression {
                Some(base) => Expression::add(base, index)?,
                None => index,
            });
        }
        Ok(match expression {
            Some(expression) => Expression::add(expression, displacement)?.simplify(),
            None => displacement,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(base) = self.base() {
            write!(f, "{}", base)?;
        }
        if let Some(index) = self.index() {
            if self.base.is_some() {
                write!(f, "+")?;
            }
            write!(f, "{}*{}", index, self.scale)?;
        }
        if self.base.is_none() && self.index.is_none() {
            let value = Constant::from_i64(self.displacement, self.bits);
            write!(f, "0x{:x}", value.value())
        } else if self.displacement > 0 {
            write!(f, "+{}", self.displacement)
        } else if self.displacement < 0 {
            write!(f, "-{}", self.displacement.unsigned_abs())
        } else {
            Ok(())
        }
    }
}

/// A read of `bits` bits of memory at an `Address`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Memory {
    address: Address,
    bits: usize,
}

impl Memory {
    pub fn new(address: Address, bits: usize) -> Memory {
        Memory { address, bits }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn bits(&self) -> usize {
        self.bits
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "M{}{}({})",
            self.bits,
            self.address.segment().unwrap_or(""),
            self.address
        )
    }
}
