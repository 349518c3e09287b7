//! Instruction decoding and presentation.
//!
//! Each architecture provides an instruction type implementing
//! `MachineInstruction`. Instructions are rendered into `Token`s, so a
//! front end can color or link the parts of an instruction without parsing
//! strings.

use crate::state::StateMap;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod x86;

/// Assembly syntax for rendering instructions.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Syntax {
    Intel,
    Att,
}

impl Default for Syntax {
    fn default() -> Syntax {
        Syntax::Intel
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum TokenKind {
    /// The mnemonic, with any prefixes.
    Mnemonic,
    /// Whitespace between the mnemonic and the operands.
    Spacer,
    Register,
    Constant,
    /// A branch target.
    Address,
    Memory,
    /// A separator between operands.
    Separator,
}

/// A typed piece of rendered instruction text.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Token {
    kind: TokenKind,
    text: String,
}

impl Token {
    pub fn new<S: Into<String>>(kind: TokenKind, text: S) -> Token {
        Token {
            kind,
            text: text.into(),
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Join tokens into a single line of text.
pub fn render(tokens: &[Token]) -> String {
    tokens.iter().map(|token| token.text()).collect()
}

/// How an instruction passes control on.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Flow {
    /// Falls through to the next instruction.
    Sequential,
    Jump,
    ConditionalJump,
    Call,
    Return,
    /// Halts, traps or enters the kernel. The next instruction is unknown.
    Trap,
}

impl Flow {
    /// True when this instruction ends a basic block.
    pub fn is_terminator(&self) -> bool {
        *self != Flow::Sequential
    }
}

/// A decoded instruction of some architecture.
pub trait MachineInstruction: Clone + fmt::Debug + fmt::Display {
    fn address(&self) -> Option<u64>;

    /// Length of the encoding in bytes.
    fn length(&self) -> usize;

    fn mnemonic(&self) -> &str;

    fn bytes(&self) -> &[u8];

    fn flow(&self) -> Flow;

    /// Evaluate this instruction over `state`, returning the state after it.
    ///
    /// Evaluation never fails. What cannot be determined is top.
    fn apply(&self, state: &StateMap) -> StateMap;

    fn tokens(&self, syntax: Syntax) -> Vec<Token>;

    fn to_json(&self) -> Result<String, Error>;
}
