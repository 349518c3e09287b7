//! Abstract machine state.
//!
//! A `StateMap` maps locations, registers and memory, to the `Expression`
//! holding their current value. A location without a binding holds its
//! initial value: an unbound register reads as itself, and unbound memory
//! reads as a `Memory` expression.
//!
//! Registers are bound by full register. Reading a slice, such as `al`,
//! projects it out of the full register's value, and writing a slice merges
//! the new bits with the untouched bits of the full register.
//!
//! Memory is bound by normalized `Address`. Only an exactly equal address is
//! consulted on a read. Two different expressions for the same location, or
//! two overlapping locations, are treated as independent. A read narrower than
//! a binding at the same address takes the low bits of the binding, and a
//! read wider than the binding joins it with the initial memory above it.
//!
//! Both maps are reference counted and copied on write, so cloning a
//! `StateMap`, or taking a `Snapshot`, is cheap.

mod location;

pub use self::location::Location;

use crate::expr::*;
use crate::Error;
use crate::RC;
use std::collections::BTreeMap;
use std::fmt;

/// A mapping from locations to their values.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StateMap {
    registers: RC<BTreeMap<String, Expression>>,
    memory: RC<BTreeMap<Address, Expression>>,
}

/// A saved `StateMap`, for scoped rollback.
#[derive(Clone, Debug)]
pub struct Snapshot {
    state: StateMap,
}

impl StateMap {
    /// Create an empty `StateMap`, where every location holds its initial
    /// value.
    pub fn new() -> StateMap {
        StateMap::default()
    }

    /// Get the current value of a location.
    pub fn read(&self, location: &Location) -> Expression {
        match *location {
            Location::Register(ref register) => self.read_register(register),
            Location::Memory(ref memory) => self.read_memory(memory),
        }
    }

    /// Bind a location to a value.
    ///
    /// # Error
    /// The width of `value` differs from the width of `location`.
    pub fn write(&mut self, location: Location, value: Expression) -> Result<(), Error> {
        match location {
            Location::Register(register) => self.write_register(&register, value),
            Location::Memory(memory) => self.write_memory(&memory, value),
        }
    }

    /// Get the current value of a register, or of a slice of a register.
    pub fn read_register(&self, register: &Register) -> Expression {
        let full = match self.registers.get(register.full_name()) {
            Some(value) => value.clone(),
            None => Expression::Register(register.full()),
        };
        if register.is_full() {
            return full;
        }
        match Expression::extract(full, register.offset(), register.bits()) {
            Ok(slice) => slice.simplify(),
            Err(_) => Expression::top(register.bits()),
        }
    }

    /// Bind a register to a value, merging slices into their full register.
    pub fn write_register(&mut self, register: &Register, value: Expression) -> Result<(), Error> {
        if value.bits() != register.bits() {
            return Err(Error::Sort);
        }

        let value = if register.is_full() {
            value.simplify()
        } else {
            let full = self.read_register(&register.full());
            let mut parts = Vec::new();
            if register.offset() > 0 {
                parts.push(Expression::extract(full.clone(), 0, register.offset())?);
            }
            parts.push(value);
            let end = register.offset() + register.bits();
            if end < register.full_bits() {
                parts.push(Expression::extract(full, end, register.full_bits() - end)?);
            }
            Expression::concat(parts)?.simplify()
        };

        RC::make_mut(&mut self.registers).insert(register.full_name().to_string(), value);
        Ok(())
    }

    /// Get the current value of memory.
    pub fn read_memory(&self, memory: &Memory) -> Expression {
        let bits = memory.bits();
        let value = match self.memory.get(memory.address()) {
            Some(value) => value,
            None => return Expression::Memory(memory.clone()),
        };

        if value.bits() == bits {
            return value.clone();
        }

        let read = if value.bits() > bits {
            Expression::extract(value.clone(), 0, bits)
        } else {
            let above = Memory::new(
                memory.address().offset((value.bits() / 8) as i64),
                bits - value.bits(),
            );
            Expression::concat(vec![value.clone(), above.into()])
        };

        match read {
            Ok(read) => read.simplify(),
            Err(_) => Expression::top(bits),
        }
    }

    /// Bind memory at an address to a value.
    pub fn write_memory(&mut self, memory: &Memory, value: Expression) -> Result<(), Error> {
        if value.bits() != memory.bits() {
            return Err(Error::Sort);
        }
        RC::make_mut(&mut self.memory).insert(memory.address().clone(), value.simplify());
        Ok(())
    }

    /// Replace every register and memory reference in `expression` with its
    /// value in this state, and simplify the result.
    pub fn eval(&self, expression: &Expression) -> Result<Expression, Error> {
        Ok(self.substitute(expression)?.simplify())
    }

    /// Evaluate the base and index of an address in this state.
    pub fn eval_address(&self, address: &Address) -> Result<Address, Error> {
        let base = match address.base() {
            Some(base) => Some(self.substitute(base)?),
            None => None,
        };
        let index = match address.index() {
            Some(index) => Some(self.substitute(index)?),
            None => None,
        };
        address.replace(base, index)
    }

    fn substitute(&self, expression: &Expression) -> Result<Expression, Error> {
        Ok(match *expression {
            Expression::Constant(_) | Expression::Top(_) => expression.clone(),
            Expression::Register(ref register) => self.read_register(register),
            Expression::Memory(ref memory) => {
                let address = self.eval_address(memory.address())?;
                self.read_memory(&Memory::new(address, memory.bits()))
            }
            Expression::Composite(ref composite) => {
                let operands = composite
                    .operands()
                    .iter()
                    .map(|operand| self.substitute(operand))
                    .collect::<Result<Vec<Expression>, Error>>()?;
                Expression::composite(composite.operator(), operands, composite.bits())
            }
        })
    }

    /// Save this state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.clone(),
        }
    }

    /// Roll this state back to a `Snapshot`.
    pub fn restore(&mut self, snapshot: Snapshot) {
        *self = snapshot.state;
    }

    /// Remove every binding.
    pub fn clear(&mut self) {
        *self = StateMap::new();
    }

    /// The number of bound locations.
    pub fn len(&self) -> usize {
        self.registers.len() + self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bound full registers and their values.
    pub fn registers(&self) -> impl Iterator<Item = (&str, &Expression)> {
        self.registers
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Bound memory addresses and their values.
    pub fn memory(&self) -> impl Iterator<Item = (&Address, &Expression)> {
        self.memory.iter()
    }

    /// Every bound location with its value, registers first.
    pub fn bindings(&self) -> Vec<(Location, &Expression)> {
        self.registers
            .iter()
            .map(|(name, value)| {
                (
                    Location::Register(Register::new(name.clone(), value.bits())),
                    value,
                )
            })
            .chain(
                self.memory
                    .iter()
                    .map(|(address, value)| {
                    (
                        Location::Memory(Memory::new(address.clone(), value.bits())),
                        value,
                    )
                }),
            )
            .collect()
    }
}

impl fmt::Display for StateMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (location, value) in self.bindings() {
            writeln!(f, "{} <- {}", location, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test;
