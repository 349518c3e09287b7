//! Linear sweeps of instructions into blocks.
//!
//! A block is decoded linearly from an address until an instruction passes
//! control somewhere other than the next instruction, decoding fails, the
//! memory runs out, or a limit is reached. Blocks are not split at branch
//! targets, so they are a linear sweep rather than basic blocks in a control
//! flow graph.

use crate::architecture::Architecture;
use crate::disassembler::MachineInstruction;
use crate::memory::CodeMemory;
use crate::state::StateMap;
use crate::{DecodeError, Error};
use log::debug;
use std::default;

/// Bytes handed to the decoder for each instruction. Long enough for the
/// longest x86 encoding.
const DEFAULT_WINDOW_BYTES: usize = 16;

const DEFAULT_MAX_INSTRUCTIONS: usize = 1024;

/// Options which change how blocks are swept.
#[derive(Clone, Debug)]
pub struct Options {
    max_instructions: usize,
    window_bytes: usize,
}

impl Options {
    /// Create a new set of Options with the default settings.
    pub fn new() -> Options {
        Options::default()
    }

    /// The most instructions a block may hold.
    pub fn max_instructions(&self) -> usize {
        self.max_instructions
    }

    pub fn set_max_instructions(&mut self, max_instructions: usize) {
        self.max_instructions = max_instructions;
    }

    /// How many bytes are read from memory for each instruction.
    pub fn window_bytes(&self) -> usize {
        self.window_bytes
    }

    pub fn set_window_bytes(&mut self, window_bytes: usize) {
        self.window_bytes = window_bytes;
    }
}

impl default::Default for Options {
    fn default() -> Options {
        Options {
            max_instructions: DEFAULT_MAX_INSTRUCTIONS,
            window_bytes: DEFAULT_WINDOW_BYTES,
        }
    }
}

/// Create your options with the builder pattern.
///
/// For more details on the options, see `block::Options`
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Create a new builder for sweep options.
    pub fn new() -> OptionsBuilder {
        OptionsBuilder {
            options: Options::default(),
        }
    }

    pub fn max_instructions(mut self, max_instructions: usize) -> OptionsBuilder {
        self.options.max_instructions = max_instructions;
        self
    }

    pub fn window_bytes(mut self, window_bytes: usize) -> OptionsBuilder {
        self.options.window_bytes = window_bytes;
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}

impl default::Default for OptionsBuilder {
    fn default() -> OptionsBuilder {
        OptionsBuilder::new()
    }
}

/// Why a sweep stopped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Terminator {
    /// The last instruction transfers control.
    ControlFlow,
    /// The bytes after the last instruction do not decode.
    Invalid(DecodeError),
    /// No executable bytes follow the last instruction.
    EndOfMemory,
    /// The block reached `Options::max_instructions`.
    Limit,
}

/// Instructions decoded linearly from one address.
#[derive(Clone, Debug)]
pub struct Block<I: MachineInstruction> {
    address: u64,
    instructions: Vec<I>,
    terminator: Terminator,
}

impl<I: MachineInstruction> Block<I> {
    /// Get the address of the first instruction.
    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn instructions(&self) -> &[I] {
        &self.instructions
    }

    pub fn terminator(&self) -> &Terminator {
        &self.terminator
    }

    /// Get the length of this block in bytes.
    pub fn length(&self) -> usize {
        self.instructions
            .iter()
            .map(|instruction| instruction.length())
            .sum()
    }

    /// The address following the last instruction.
    pub fn end(&self) -> u64 {
        self.address.wrapping_add(self.length() as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Apply every instruction in order.
    pub fn apply(&self, state: &StateMap) -> StateMap {
        self.instructions
            .iter()
            .fold(state.clone(), |state, instruction| instruction.apply(&state))
    }
}

/// Decode a block of instructions starting at `address`.
pub fn sweep<A: Architecture>(
    architecture: &A,
    memory: &dyn CodeMemory,
    address: u64,
    options: &Options,
) -> Block<A::Instruction> {
    let mut instructions = Vec::new();
    let mut next = address;

    let terminator = loop {
        if instructions.len() >= options.max_instructions() {
            break Terminator::Limit;
        }

        let bytes = memory.get_bytes(next, options.window_bytes());
        if bytes.is_empty() {
            break Terminator::EndOfMemory;
        }

        let instruction = match architecture.decode(&bytes, Some(next)) {
            Ok(instruction) => instruction,
            Err(Error::Decode(error)) => break Terminator::Invalid(error),
            Err(error) => break Terminator::Invalid(DecodeError::UnsupportedEncoding(error.to_string())),
        };

        next = next.wrapping_add(instruction.length() as u64);
        let flow = instruction.flow();
        instructions.push(instruction);
        if flow.is_terminator() {
            break Terminator::ControlFlow;
        }
    };

    debug!(
        "{} block at 0x{:x}: {} instructions, {:?}",
        architecture.name(),
        address,
        instructions.len(),
        terminator
    );

    Block {
        address,
        instructions,
        terminator,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::architecture::X86;
    use crate::expr::*;
    use crate::memory::backing::Memory;
    use crate::memory::MemoryPermissions;

    fn memory(address: u64, bytes: &[u8]) -> Memory {
        let mut memory = Memory::new();
        memory
            .map(address, bytes.to_vec(), MemoryPermissions::ALL)
            .unwrap();
        memory
    }

    #[test]
    fn sweep_stops_at_control_flow() {
        // push ebp; mov ebp, esp; leave; ret; nop
        let memory = memory(0x1000, &[0x55, 0x89, 0xe5, 0xc9, 0xc3, 0x90]);
        let block = sweep(&X86::new(), &memory, 0x1000, &Options::default());

        let mnemonics = block
            .instructions()
            .iter()
            .map(|instruction| instruction.mnemonic())
            .collect::<Vec<&str>>();
        assert_eq!(mnemonics, vec!["PUSH", "MOV", "LEAVE", "RET"]);
        assert_eq!(*block.terminator(), Terminator::ControlFlow);
        assert_eq!(block.length(), 5);
        assert_eq!(block.end(), 0x1005);
    }

    #[test]
    fn sweep_stops_at_invalid_bytes() {
        // nop; 0f with nothing after it
        let memory = memory(0x1000, &[0x90, 0x0f]);
        let block = sweep(&X86::new(), &memory, 0x1000, &Options::default());

        assert_eq!(block.instructions().len(), 1);
        match block.terminator() {
            Terminator::Invalid(DecodeError::TruncatedInput { .. }) => {}
            terminator => panic!("unexpected terminator {:?}", terminator),
        }
    }

    #[test]
    fn sweep_stops_at_end_of_memory_and_limit() {
        let memory = memory(0x1000, &[0x90, 0x90, 0x90]);

        let block = sweep(&X86::new(), &memory, 0x1000, &Options::default());
        assert_eq!(block.instructions().len(), 3);
        assert_eq!(*block.terminator(), Terminator::EndOfMemory);

        let options = OptionsBuilder::new().max_instructions(2).build();
        let block = sweep(&X86::new(), &memory, 0x1000, &options);
        assert_eq!(block.instructions().len(), 2);
        assert_eq!(*block.terminator(), Terminator::Limit);

        let block = sweep(&X86::new(), &memory, 0x2000, &options);
        assert!(block.is_empty());
        assert_eq!(*block.terminator(), Terminator::EndOfMemory);
    }

    #[test]
    fn apply_chains_instructions() {
        // push ebp; mov ebp, esp; leave; ret
        let memory = memory(0x1000, &[0x55, 0x89, 0xe5, 0xc9, 0xc3]);
        let x86 = X86::new();
        let block = sweep(&x86, &memory, 0x1000, &Options::default());

        let state = block.apply(&x86.initial_state(Some(0x1000)));

        // The frame is torn down again, and ret reads the return address.
        assert_eq!(state.read_register(&x86.stack_pointer()).to_string(), "(esp+0x4)");
        assert_eq!(state.read_register(&Register::new("ebp", 32)), expr_register("ebp", 32));
        assert_eq!(state.read_register(&x86.program_counter()).to_string(), "M32(esp)");
    }
}
