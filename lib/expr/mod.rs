//! The symbolic expression algebra.
//!
//! Every value Kestrel reasons about is an `Expression`:
//!
//! * `Constant` - a fixed-width integer.
//! * `Register` - the initial value of a register, or of a slice of one.
//! * `Memory` - the initial content of memory at an `Address`.
//! * `Composite` - an `Operator` applied to sub-expressions.
//! * `Top` - a value about which nothing is known.
//!
//! Expressions are immutable. Sub-expressions are held through `RC` handles,
//! so cloning an expression never copies a tree, and with the `thread_safe`
//! feature expressions can be shared between threads.
//!
//! Every expression has a width. The constructors of composite expressions
//! check the widths of their operands and return `Error::Sort` on a mismatch.
//! Extension is never implicit: use `Expression::zext` and
//! `Expression::sext`.
//!
//! Expressions are built without simplification. Call
//! `Expression::simplify` to fold constants, absorb top and normalize.
//!
//! ```
//! use kestrel::expr::*;
//!
//! let ebp = expr_register("ebp", 32);
//! let expression = Expression::add(
//!     Expression::add(ebp, expr_const(4, 32)).unwrap(),
//!     expr_const(4, 32),
//! ).unwrap();
//! assert_eq!(expression.simplify().to_string(), "(ebp+0x8)");
//! ```

mod constant;
mod expression;
mod memory;
mod register;
mod simplify;

pub use self::constant::Constant;
pub use self::expression::{Composite, Expression, Operator};
pub use self::memory::{Address, Memory};
pub use self::register::Register;

/// A convenience function to create a new constant.
pub fn const_(value: u64, bits: usize) -> Constant {
    Constant::new(value, bits)
}

/// A convenience function to create a new constant expression.
pub fn expr_const(value: u64, bits: usize) -> Expression {
    Expression::constant(Constant::new(value, bits))
}

/// A convenience function to create a new full-width register expression.
pub fn expr_register(name: &str, bits: usize) -> Expression {
    Expression::register(Register::new(name, bits))
}

/// A convenience function to create a top expression.
pub fn top(bits: usize) -> Expression {
    Expression::top(bits)
}

#[cfg(test)]
mod test;
