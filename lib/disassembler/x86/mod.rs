//! x86 and amd64.
//!
//! Instructions are decoded from an opcode table (see `table`), evaluated by
//! per-mnemonic semantic functions (see `semantics`), and rendered in Intel
//! or AT&T syntax.
//!
//! ```
//! use kestrel::disassembler::x86::{decode, Mode};
//!
//! let instruction = decode(Mode::X86, &[0x83, 0xfa, 0x00], None).unwrap();
//! assert_eq!(instruction.mnemonic(), "CMP");
//! assert_eq!(instruction.to_string(), "cmp         edx, 0x0");
//! ```

mod decoder;
mod evaluator;
mod formatter;
mod instruction;
mod mode;
mod operand;
mod register;
mod semantics;
mod table;

pub use self::decoder::decode;
pub use self::instruction::{Condition, Instruction, Prefixes};
pub use self::mode::{Flag, Mode};
pub use self::operand::{Immediate, MemoryOperand, Operand};
pub use self::register::get_register;

/// Every mnemonic with semantics.
pub fn mnemonics() -> Vec<&'static str> {
    evaluator::mnemonics()
}

#[cfg(test)]
mod test;
