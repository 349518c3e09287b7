use crate::disassembler::x86::{evaluator, formatter, Mode, Operand};
use crate::disassembler::{render, Flow, MachineInstruction, Syntax, Token};
use crate::expr::Register;
use crate::state::StateMap;
use crate::Error;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

bitflags! {
    /// Prefixes which changed how an instruction behaves.
    ///
    /// A prefix consumed to select an opcode, such as 0xf3 in `pause`, is not
    /// recorded.
    #[derive(Deserialize, Serialize)]
    pub struct Prefixes: u32 {
        const LOCK         = 0x001;
        /// 0xf3
        const REP          = 0x002;
        /// 0xf2
        const REPNE        = 0x004;
        const OPERAND_SIZE = 0x008;
        const ADDRESS_SIZE = 0x010;
        const REX          = 0x020;
        const REX_W        = 0x040;
        const REX_R        = 0x080;
        const REX_X        = 0x100;
        const REX_B        = 0x200;
    }
}

/// A condition code, as encoded in the low nibble of jcc, setcc and cmovcc.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Condition {
    O,
    No,
    B,
    Ae,
    E,
    Ne,
    Be,
    A,
    S,
    Ns,
    P,
    Np,
    L,
    Ge,
    Le,
    G,
}

impl Condition {
    pub const ALL: [Condition; 16] = [
        Condition::O,
        Condition::No,
        Condition::B,
        Condition::Ae,
        Condition::E,
        Condition::Ne,
        Condition::Be,
        Condition::A,
        Condition::S,
        Condition::Ns,
        Condition::P,
        Condition::Np,
        Condition::L,
        Condition::Ge,
        Condition::Le,
        Condition::G,
    ];

    pub fn from_code(code: u8) -> Condition {
        Condition::ALL[(code & 0xf) as usize]
    }

    /// The mnemonic suffix, such as `NE` in `JNE`.
    pub fn suffix(&self) -> &'static str {
        match *self {
            Condition::O => "O",
            Condition::No => "NO",
            Condition::B => "B",
            Condition::Ae => "AE",
            Condition::E => "E",
            Condition::Ne => "NE",
            Condition::Be => "BE",
            Condition::A => "A",
            Condition::S => "S",
            Condition::Ns => "NS",
            Condition::P => "P",
            Condition::Np => "NP",
            Condition::L => "L",
            Condition::Ge => "GE",
            Condition::Le => "LE",
            Condition::G => "G",
        }
    }
}

/// A decoded x86 instruction.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Instruction {
    mode: Mode,
    mnemonic: String,
    operands: Vec<Operand>,
    bytes: Vec<u8>,
    address: Option<u64>,
    prefixes: Prefixes,
    segment: Option<Register>,
    condition: Option<Condition>,
    operand_bits: usize,
    address_bits: usize,
    misc: BTreeMap<String, String>,
}

impl Instruction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        mode: Mode,
        mnemonic: String,
        operands: Vec<Operand>,
        bytes: Vec<u8>,
        address: Option<u64>,
        prefixes: Prefixes,
        segment: Option<Register>,
        condition: Option<Condition>,
        operand_bits: usize,
        address_bits: usize,
    ) -> Instruction {
        let mut misc = BTreeMap::new();
        for (flag, name) in [
            (Prefixes::LOCK, "lock"),
            (Prefixes::REP, "rep"),
            (Prefixes::REPNE, "repne"),
            (Prefixes::OPERAND_SIZE, "opdsz"),
            (Prefixes::ADDRESS_SIZE, "adrsz"),
            (Prefixes::REX, "rex"),
        ] {
            if prefixes.contains(flag) {
                misc.insert(name.to_string(), "true".to_string());
            }
        }
        if let Some(segment) = segment.as_ref() {
            misc.insert("segment".to_string(), segment.name().to_string());
        }
        if let Some(condition) = condition {
            misc.insert("condition".to_string(), condition.suffix().to_string());
        }
        Instruction {
            mode,
            mnemonic,
            operands,
            bytes,
            address,
            prefixes,
            segment,
            condition,
            operand_bits,
            address_bits,
            misc,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The mnemonic, in upper case.
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    pub fn operand(&self, index: usize) -> Option<&Operand> {
        self.operands.get(index)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn length(&self) -> usize {
        self.bytes.len()
    }

    pub fn address(&self) -> Option<u64> {
        self.address
    }

    pub fn prefixes(&self) -> Prefixes {
        self.prefixes
    }

    /// The segment override prefix, if one was encoded.
    pub fn segment(&self) -> Option<&Register> {
        self.segment.as_ref()
    }

    pub fn condition(&self) -> Option<Condition> {
        self.condition
    }

    pub fn operand_bits(&self) -> usize {
        self.operand_bits
    }

    pub fn address_bits(&self) -> usize {
        self.address_bits
    }

    /// Free-form annotations. The decoder records prefixes, the segment
    /// override and the condition code here.
    pub fn misc(&self) -> &BTreeMap<String, String> {
        &self.misc
    }

    pub fn annotate<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.misc.insert(key.into(), value.into());
    }

    pub fn is_rep(&self) -> bool {
        self.prefixes.intersects(Prefixes::REP | Prefixes::REPNE)
    }

    /// Evaluate this instruction over `state`, returning the state after it.
    pub fn apply(&self, state: &StateMap) -> StateMap {
        evaluator::apply(self, state)
    }

    pub fn tokens(&self, syntax: Syntax) -> Vec<Token> {
        formatter::tokens(self, syntax)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Instruction, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn flow(&self) -> Flow {
        match self.mnemonic.as_str() {
            "JMP" | "JMPF" => Flow::Jump,
            "CALL" | "CALLF" => Flow::Call,
            "RET" | "RETF" | "IRET" | "IRETD" | "IRETQ" => Flow::Return,
            "HLT" | "INT" | "INT1" | "INT3" | "INTO" | "UD2" | "SYSCALL" | "SYSENTER" => {
                Flow::Trap
            }
            "LOOP" | "LOOPE" | "LOOPNE" | "JCXZ" | "JECXZ" | "JRCXZ" => Flow::ConditionalJump,
            _ if self.condition.is_some() && self.mnemonic.starts_with('J') => {
                Flow::ConditionalJump
            }
            _ => Flow::Sequential,
        }
    }
}

impl MachineInstruction for Instruction {
    fn address(&self) -> Option<u64> {
        self.address
    }

    fn length(&self) -> usize {
        self.length()
    }

    fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn flow(&self) -> Flow {
        self.flow()
    }

    fn apply(&self, state: &StateMap) -> StateMap {
        self.apply(state)
    }

    fn tokens(&self, syntax: Syntax) -> Vec<Token> {
        self.tokens(syntax)
    }

    fn to_json(&self) -> Result<String, Error> {
        self.to_json()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", render(&self.tokens(Syntax::Intel)))
    }
}
