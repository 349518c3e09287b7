//! Kestrel: symbolic decoding and single-step evaluation of x86 machine code.
//!
//! Kestrel turns raw bytes into structured instructions, and instructions into
//! symbolic state transitions. Two interfaces carry the whole library:
//!
//! * `decode(bytes, address) -> Instruction`, provided by an
//!   [`Architecture`](architecture::Architecture).
//! * `apply(Instruction, StateMap) -> StateMap`, provided by every decoded
//!   instruction through [`MachineInstruction`](disassembler::MachineInstruction).
//!
//! Values flowing through a [`StateMap`](state::StateMap) are
//! [`Expression`](expr::Expression)s. Expressions are immutable, structurally
//! shared, and carry an explicit bit-width. When an instruction's effect can
//! not be determined, the affected locations are bound to `top`, the
//! expression which stands for "no information".
//!
//! ```
//! use kestrel::architecture::{Architecture, X86};
//! use kestrel::disassembler::MachineInstruction;
//! use kestrel::expr::expr_const;
//!
//! let x86 = X86::new();
//! let instruction = x86.decode(&[0x90], Some(0x1000)).unwrap();
//! assert_eq!(instruction.mnemonic(), "NOP");
//!
//! let state = x86.initial_state(Some(0x1000));
//! let state = instruction.apply(&state);
//! assert_eq!(state.read_register(&x86.program_counter()), expr_const(0x1001, 32));
//! ```

pub mod architecture;
pub mod block;
pub mod disassembler;
mod error;
pub mod expr;
pub mod memory;
pub mod state;

pub use crate::error::*;

#[cfg(not(feature = "thread_safe"))]
use std::rc::Rc;
#[cfg(not(feature = "thread_safe"))]
pub type RC<T> = Rc<T>;

#[cfg(feature = "thread_safe")]
use std::sync::Arc;
#[cfg(feature = "thread_safe")]
pub type RC<T> = Arc<T>;
