//! Bytes to `Instruction`.
//!
//! Decoding runs in four steps: legacy and REX prefixes, the opcode (one byte
//! or 0x0f and a second byte), selection of an entry from the opcode table,
//! then ModRM, SIB, displacement and immediates as the entry's operand shapes
//! ask for them.

use crate::disassembler::x86::instruction::{Condition, Instruction, Prefixes};
use crate::disassembler::x86::register::{get_register, gpr, indexed, segment};
use crate::disassembler::x86::table::{self, Entry, Mandatory, Map, Mnemonic, Shape};
use crate::disassembler::x86::{Immediate, MemoryOperand, Mode, Operand};
use crate::expr::{Constant, Register};
use crate::DecodeError;
use log::trace;

/// The longest legal x86 instruction.
const MAX_LENGTH: usize = 15;

/// Reads instruction bytes, little-endian.
struct Cursor<'b> {
    bytes: &'b [u8],
    offset: usize,
}

impl<'b> Cursor<'b> {
    fn new(bytes: &'b [u8]) -> Cursor<'b> {
        Cursor { bytes, offset: 0 }
    }

    fn offset(&self) -> usize {
        self.offset
    }

    fn consumed(&self) -> &'b [u8] {
        &self.bytes[..self.offset]
    }

    fn peek(&self) -> Result<u8, DecodeError> {
        match self.bytes.get(self.offset) {
            Some(&byte) if self.offset >= MAX_LENGTH => Err(DecodeError::InvalidOpcode {
                opcode: byte,
                offset: self.offset,
            }),
            Some(&byte) => Ok(byte),
            None => Err(DecodeError::TruncatedInput {
                needed: self.offset + 1,
                available: self.bytes.len(),
            }),
        }
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        let byte = self.peek()?;
        self.offset += 1;
        Ok(byte)
    }

    /// Read an unsigned little-endian value of `length` bytes.
    fn read(&mut self, length: usize) -> Result<u64, DecodeError> {
        let needed = self.offset + length;
        if needed > self.bytes.len() {
            return Err(DecodeError::TruncatedInput {
                needed,
                available: self.bytes.len(),
            });
        }
        let mut value = 0u64;
        for i in 0..length {
            value |= (self.u8()? as u64) << (i * 8);
        }
        Ok(value)
    }

    /// Read a sign-extended little-endian value of `length` bytes.
    fn signed(&mut self, length: usize) -> Result<i64, DecodeError> {
        let value = self.read(length)?;
        let bits = length * 8;
        if bits < 64 && value & (1 << (bits - 1)) != 0 {
            Ok((value | (!0u64 << bits)) as i64)
        } else {
            Ok(value as i64)
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ModRmFields {
    mod_: u8,
    reg: u8,
    rm: u8,
}

impl ModRmFields {
    fn new(byte: u8) -> ModRmFields {
        ModRmFields {
            mod_: byte >> 6,
            reg: (byte >> 3) & 7,
            rm: byte & 7,
        }
    }

    fn is_register(&self) -> bool {
        self.mod_ == 3
    }
}

/// What the operand shapes draw on once the entry is chosen.
struct Fields {
    entry: &'static Entry,
    /// Offset of the opcode within the entry's span.
    low: u8,
    modrm: Option<ModRmFields>,
    memory: Option<MemoryOperand>,
    operand_bits: usize,
    address_bits: usize,
}

struct Decoder<'b> {
    mode: Mode,
    cursor: Cursor<'b>,
    lock: bool,
    repeat: Option<u8>,
    segment: Option<u8>,
    operand_size: bool,
    address_size: bool,
    rex: u8,
}

/// Decode a single instruction from the start of `bytes`.
///
/// `address`, when given, is where the instruction lives. It is kept for
/// rendering branch targets and block sweeps; evaluation uses the program
/// counter of the state instead.
pub fn decode(mode: Mode, bytes: &[u8], address: Option<u64>) -> Result<Instruction, DecodeError> {
    let mut decoder = Decoder {
        mode,
        cursor: Cursor::new(bytes),
        lock: false,
        repeat: None,
        segment: None,
        operand_size: false,
        address_size: false,
        rex: 0,
    };
    let instruction = decoder.instruction(address)?;
    trace!("{} {:02x?} => {}", mode, instruction.bytes(), instruction);
    Ok(instruction)
}

fn unsupported<S: Into<String>>(message: S) -> DecodeError {
    DecodeError::UnsupportedEncoding(message.into())
}

fn pick(names: [&'static str; 3], bits: usize) -> &'static str {
    match bits {
        16 => names[0],
        64 => names[2],
        _ => names[1],
    }
}

impl<'b> Decoder<'b> {
    fn rex_w(&self) -> bool {
        self.rex & 0x8 != 0
    }

    fn rex_r(&self) -> u8 {
        (self.rex & 0x4) << 1
    }

    fn rex_x(&self) -> u8 {
        (self.rex & 0x2) << 2
    }

    fn rex_b(&self) -> u8 {
        (self.rex & 0x1) << 3
    }

    /// Consume prefixes, returning the first opcode byte.
    fn prefixes(&mut self) -> Result<u8, DecodeError> {
        loop {
            let byte = self.cursor.u8()?;
            match byte {
                0xf0 => self.lock = true,
                0xf2 | 0xf3 => self.repeat = Some(byte),
                0x26 => self.segment = Some(0),
                0x2e => self.segment = Some(1),
                0x36 => self.segment = Some(2),
                0x3e => self.segment = Some(3),
                0x64 => self.segment = Some(4),
                0x65 => self.segment = Some(5),
                0x66 => self.operand_size = true,
                0x67 => self.address_size = true,
                0x40..=0x4f if self.mode == Mode::Amd64 => {
                    self.rex = byte;
                    continue;
                }
                _ => return Ok(byte),
            }
            // REX only counts when it immediately precedes the opcode.
            self.rex = 0;
        }
    }

    fn register(&self, name: &str) -> Result<Register, DecodeError> {
        get_register(self.mode, name).map_err(|error| unsupported(error.to_string()))
    }

    fn gpr(&self, number: u8, bits: usize) -> Result<Register, DecodeError> {
        gpr(self.mode, number, bits, self.rex != 0).map_err(|error| unsupported(error.to_string()))
    }

    fn indexed(&self, prefix: &str, number: u8) -> Result<Register, DecodeError> {
        indexed(self.mode, prefix, number).map_err(|error| unsupported(error.to_string()))
    }

    fn segment_register(&self, number: u8) -> Result<Register, DecodeError> {
        match segment(number) {
            Some(name) => self.register(name),
            None => Err(unsupported(format!("segment register {}", number))),
        }
    }

    /// The segment a memory access goes through, and whether it was encoded.
    ///
    /// Long mode ignores overrides other than fs and gs.
    fn access_segment(&self, base: Option<&Register>) -> Result<(Option<Register>, bool), DecodeError> {
        match (self.mode, self.segment) {
            (Mode::Amd64, Some(number)) if number >= 4 => {
                Ok((Some(self.segment_register(number)?), true))
            }
            (Mode::Amd64, _) => Ok((None, false)),
            (Mode::X86, Some(number)) => Ok((Some(self.segment_register(number)?), true)),
            (Mode::X86, None) => {
                let stack = base
                    .map(|base| matches!(base.name(), "esp" | "ebp" | "sp" | "bp"))
                    .unwrap_or(false);
                let name = if stack { "ss" } else { "ds" };
                Ok((Some(self.register(name)?), false))
            }
        }
    }

    fn instruction(&mut self, address: Option<u64>) -> Result<Instruction, DecodeError> {
        let first = self.prefixes()?;
        let (map, opcode) = match first {
            0x0f => match self.cursor.u8()? {
                escape @ (0x38 | 0x3a) => {
                    return Err(unsupported(format!("three-byte opcode map 0f {:02x}", escape)))
                }
                second => (Map::Secondary, second),
            },
            0xc4 | 0xc5 if self.is_vex()? => return Err(unsupported("VEX prefix")),
            0x62 if self.mode == Mode::Amd64 => return Err(unsupported("EVEX prefix")),
            byte => (Map::Primary, byte),
        };
        let opcode_offset = self.cursor.offset() - 1;

        let mut candidates = table::candidates(map, opcode, self.mode);
        if map == Map::Primary && opcode == 0x90 && self.rex_b() != 0 {
            // 0x90 with REX.B exchanges r8 and rax.
            candidates.retain(|entry| entry.span != 1);
        }
        if candidates.is_empty() {
            return Err(DecodeError::InvalidOpcode {
                opcode,
                offset: opcode_offset,
            });
        }

        candidates.retain(|entry| self.has_mandatory(entry));
        let modrm = if candidates.iter().any(|entry| entry.has_modrm()) {
            match self.cursor.peek() {
                Ok(byte) => Some(byte),
                Err(error) if candidates.iter().all(|entry| entry.has_modrm()) => {
                    return Err(error)
                }
                // Entries without a ModRM byte still match at the end of input.
                Err(_) => None,
            }
        } else {
            None
        };

        let entry = candidates
            .iter()
            .copied()
            .filter(|entry| entry.accepts(modrm))
            .max_by_key(|entry| entry.specificity())
            .ok_or_else(|| match modrm {
                Some(modrm) => unsupported(format!(
                    "opcode {:02x} with modrm {:02x}",
                    opcode, modrm
                )),
                None => unsupported(format!("opcode {:02x}", opcode)),
            })?;

        // A prefix which selected the entry does not also change its sizes.
        let mut operand_size = self.operand_size;
        let mut repeat = self.repeat;
        match entry.mandatory {
            Mandatory::P66 => operand_size = false,
            Mandatory::Pf2 | Mandatory::Pf3 => repeat = None,
            Mandatory::None => {}
        }

        let operand_bits = match self.mode {
            Mode::X86 if operand_size => 16,
            Mode::X86 => 32,
            Mode::Amd64 if self.rex_w() => 64,
            Mode::Amd64 if operand_size => 16,
            Mode::Amd64 if entry.default64 => 64,
            Mode::Amd64 => 32,
        };
        let address_bits = match self.mode {
            Mode::X86 if self.address_size => 16,
            Mode::X86 => 32,
            Mode::Amd64 if self.address_size => 32,
            Mode::Amd64 => 64,
        };

        let modrm = if entry.has_modrm() {
            Some(ModRmFields::new(self.cursor.u8()?))
        } else {
            None
        };
        let memory = match modrm {
            Some(modrm) if !modrm.is_register() => Some(self.memory(modrm, address_bits)?),
            _ => None,
        };

        let fields = Fields {
            entry,
            low: opcode.wrapping_sub(entry.opcode),
            modrm,
            memory,
            operand_bits,
            address_bits,
        };

        let mut operands = Vec::with_capacity(entry.operands.len());
        for shape in entry.operands {
            operands.push(self.operand(*shape, &fields)?);
        }

        let (mnemonic, condition) = match entry.mnemonic {
            Mnemonic::Fixed(mnemonic) => (mnemonic.to_string(), None),
            Mnemonic::OperandSize(names) => (pick(names, operand_bits).to_string(), None),
            Mnemonic::AddressSize(names) => (pick(names, address_bits).to_string(), None),
            Mnemonic::Condition(family) => {
                let condition = Condition::from_code(fields.low);
                (format!("{}{}", family, condition.suffix()), Some(condition))
            }
        };

        let mut prefixes = Prefixes::empty();
        if self.lock {
            prefixes |= Prefixes::LOCK;
        }
        match repeat {
            Some(0xf3) => prefixes |= Prefixes::REP,
            Some(0xf2) => prefixes |= Prefixes::REPNE,
            _ => {}
        }
        if operand_size {
            prefixes |= Prefixes::OPERAND_SIZE;
        }
        if self.address_size {
            prefixes |= Prefixes::ADDRESS_SIZE;
        }
        if self.rex != 0 {
            prefixes |= Prefixes::REX;
            for (bit, flag) in [
                (0x8, Prefixes::REX_W),
                (0x4, Prefixes::REX_R),
                (0x2, Prefixes::REX_X),
                (0x1, Prefixes::REX_B),
            ] {
                if self.rex & bit != 0 {
                    prefixes |= flag;
                }
            }
        }

        let segment = match self.segment {
            Some(number) => Some(self.segment_register(number)?),
            None => None,
        };

        Ok(Instruction::new(
            self.mode,
            mnemonic,
            operands,
            self.cursor.consumed().to_vec(),
            address,
            prefixes,
            segment,
            condition,
            operand_bits,
            address_bits,
        ))
    }

    /// 0xc4 and 0xc5 are LES and LDS in 32-bit mode, unless the next byte
    /// would be a register operand.
    fn is_vex(&self) -> Result<bool, DecodeError> {
        match self.mode {
            Mode::Amd64 => Ok(true),
            Mode::X86 => Ok(self.cursor.peek()? >> 6 == 3),
        }
    }

    fn has_mandatory(&self, entry: &Entry) -> bool {
        match entry.mandatory {
            Mandatory::None => true,
            Mandatory::P66 => self.operand_size,
            Mandatory::Pf2 => self.repeat == Some(0xf2),
            Mandatory::Pf3 => self.repeat == Some(0xf3),
        }
    }

    /// Decode the memory form of a ModRM byte, consuming SIB and
    /// displacement bytes. The width of the access is filled in later.
    fn memory(&mut self, modrm: ModRmFields, address_bits: usize) -> Result<MemoryOperand, DecodeError> {
        if address_bits == 16 {
            return self.memory16(modrm);
        }

        let mut base = None;
        let mut index = None;
        let mut scale = 0;
        let mut displacement32 = modrm.mod_ == 2;

        if modrm.rm == 4 {
            let sib = self.cursor.u8()?;
            let sib_index = ((sib >> 3) & 7) | self.rex_x();
            let sib_base = sib & 7;
            if sib_index != 4 {
                index = Some(self.gpr(sib_index, address_bits)?);
                scale = 1 << (sib >> 6);
            }
            if sib_base == 5 && modrm.mod_ == 0 {
                displacement32 = true;
            } else {
                base = Some(self.gpr(sib_base | self.rex_b(), address_bits)?);
            }
        } else if modrm.rm == 5 && modrm.mod_ == 0 {
            displacement32 = true;
            if self.mode == Mode::Amd64 {
                let pc = if address_bits == 64 { "rip" } else { "eip" };
                base = Some(self.register(pc)?);
            }
        } else {
            base = Some(self.gpr(modrm.rm | self.rex_b(), address_bits)?);
        }

        let displacement = if modrm.mod_ == 1 {
            self.cursor.signed(1)?
        } else if displacement32 {
            self.cursor.signed(4)?
        } else {
            0
        };

        let (segment, segment_override) = self.access_segment(base.as_ref())?;
        Ok(MemoryOperand::new(
            base,
            index,
            scale,
            displacement,
            segment,
            segment_override,
            0,
            address_bits,
        ))
    }

    fn memory16(&mut self, modrm: ModRmFields) -> Result<MemoryOperand, DecodeError> {
        let (base, index) = match modrm.rm {
            0 => ("bx", Some("si")),
            1 => ("bx", Some("di")),
            2 => ("bp", Some("si")),
            3 => ("bp", Some("di")),
            4 => ("si", None),
            5 => ("di", None),
            6 => ("bp", None),
            _ => ("bx", None),
        };
        let absolute = modrm.mod_ == 0 && modrm.rm == 6;
        let base = if absolute {
            None
        } else {
            Some(self.register(base)?)
        };
        let index = match index {
            Some(index) => Some(self.register(index)?),
            None => None,
        };
        let displacement = match modrm.mod_ {
            0 if absolute => self.cursor.read(2)? as i64,
            1 => self.cursor.signed(1)?,
            2 => self.cursor.signed(2)?,
            _ => 0,
        };
        let scale = if index.is_some() { 1 } else { 0 };
        let (segment, segment_override) = self.access_segment(base.as_ref())?;
        Ok(MemoryOperand::new(
            base,
            index,
            scale,
            displacement,
            segment,
            segment_override,
            0,
            16,
        ))
    }

    fn modrm(&self, fields: &Fields) -> Result<ModRmFields, DecodeError> {
        fields
            .modrm
            .ok_or_else(|| unsupported("operand requires a ModRM byte"))
    }

    /// The r/m operand as a register of `bits`, or memory of `bits`.
    fn rm(&self, fields: &Fields, bits: usize) -> Result<Operand, DecodeError> {
        let modrm = self.modrm(fields)?;
        match fields.memory.as_ref() {
            Some(memory) => Ok(Operand::Memory(memory.clone().with_bits(bits))),
            None => Ok(Operand::Register(self.gpr(modrm.rm | self.rex_b(), bits)?)),
        }
    }

    /// The r/m operand as a vector register named `prefix`, or memory.
    fn rm_vector(&self, fields: &Fields, prefix: &str, number_mask: u8, bits: usize) -> Result<Operand, DecodeError> {
        let modrm = self.modrm(fields)?;
        match fields.memory.as_ref() {
            Some(memory) => Ok(Operand::Memory(memory.clone().with_bits(bits))),
            None => {
                let number = (modrm.rm | self.rex_b()) & number_mask;
                Ok(Operand::Register(self.indexed(prefix, number)?))
            }
        }
    }

    fn memory_only(&self, fields: &Fields, bits: usize) -> Result<Operand, DecodeError> {
        match fields.memory.as_ref() {
            Some(memory) => Ok(Operand::Memory(memory.clone().with_bits(bits))),
            None => Err(unsupported(format!(
                "{:?} requires a memory operand",
                fields.entry.mnemonic
            ))),
        }
    }

    fn immediate(&mut self, bytes: usize, signed: bool) -> Result<Operand, DecodeError> {
        let value = self.cursor.read(bytes)?;
        let constant = Constant::new(value, bytes * 8).with_signed(signed);
        Ok(Operand::Immediate(Immediate::new(constant)))
    }

    fn relative(&mut self, bytes: usize) -> Result<Operand, DecodeError> {
        let value = self.cursor.read(bytes)?;
        let constant = Constant::new(value, bytes * 8).with_signed(true);
        Ok(Operand::Immediate(Immediate::relative(constant)))
    }

    fn operand(&mut self, shape: Shape, fields: &Fields) -> Result<Operand, DecodeError> {
        let v = fields.operand_bits;
        let y = if self.rex_w() { 64 } else { 32 };
        Ok(match shape {
            Shape::Eb => self.rm(fields, 8)?,
            Shape::Ew => self.rm(fields, 16)?,
            Shape::Ed => self.rm(fields, 32)?,
            Shape::Ev => self.rm(fields, v)?,
            Shape::Ey => self.rm(fields, y)?,
            Shape::Gb | Shape::Gw | Shape::Gv | Shape::Gy => {
                let bits = match shape {
                    Shape::Gb => 8,
                    Shape::Gw => 16,
                    Shape::Gy => y,
                    _ => v,
                };
                let modrm = self.modrm(fields)?;
                Operand::Register(self.gpr(modrm.reg | self.rex_r(), bits)?)
            }
            Shape::M => self.memory_only(fields, v)?,
            Shape::Mb => self.memory_only(fields, 8)?,
            Shape::Mw => self.memory_only(fields, 16)?,
            Shape::Md => self.memory_only(fields, 32)?,
            Shape::Mq => self.memory_only(fields, 64)?,
            Shape::Mt => self.memory_only(fields, 80)?,
            Shape::Mp => self.memory_only(fields, 16 + v)?,
            Shape::Menv => self.memory_only(fields, 224)?,
            Shape::Zb => Operand::Register(self.gpr(fields.low | self.rex_b(), 8)?),
            Shape::Zv => Operand::Register(self.gpr(fields.low | self.rex_b(), v)?),
            Shape::Ib => self.immediate(1, false)?,
            Shape::Ibs => self.immediate(1, true)?,
            Shape::Iw => self.immediate(2, false)?,
            Shape::Iz if v == 16 => self.immediate(2, false)?,
            Shape::Iz => self.immediate(4, v == 64)?,
            Shape::Iv => self.immediate(v / 8, false)?,
            Shape::Jb => self.relative(1)?,
            // Long mode keeps 32-bit displacements under an operand-size prefix.
            Shape::Jz if v == 16 && self.mode == Mode::X86 => self.relative(2)?,
            Shape::Jz => self.relative(4)?,
            Shape::Ob | Shape::Ov => {
                let bits = if shape == Shape::Ob { 8 } else { v };
                let displacement = self.cursor.read(fields.address_bits / 8)? as i64;
                let (segment, segment_override) = self.access_segment(None)?;
                Operand::Memory(MemoryOperand::new(
                    None,
                    None,
                    0,
                    displacement,
                    segment,
                    segment_override,
                    bits,
                    fields.address_bits,
                ))
            }
            Shape::Ap => {
                let offset_bits = if v == 16 { 16 } else { 32 };
                let offset = self.cursor.read(offset_bits / 8)?;
                let selector = self.cursor.read(2)?;
                let constant = Constant::new((selector << offset_bits) | offset, offset_bits + 16);
                Operand::Immediate(Immediate::new(constant))
            }
            Shape::Sw => {
                let modrm = self.modrm(fields)?;
                Operand::Register(self.segment_register(modrm.reg)?)
            }
            Shape::Al => Operand::Register(self.register("al")?),
            Shape::Cl => Operand::Register(self.register("cl")?),
            Shape::Dx => Operand::Register(self.register("dx")?),
            Shape::Ax => Operand::Register(self.register("ax")?),
            Shape::Az if v == 16 => Operand::Register(self.register("ax")?),
            Shape::Az => Operand::Register(self.register("eax")?),
            Shape::Av => Operand::Register(self.gpr(0, v)?),
            Shape::One => Operand::Immediate(Immediate::new(Constant::new(1, 8))),
            Shape::Seg(number) => Operand::Register(self.segment_register(number)?),
            Shape::St0 => Operand::Register(self.register("st0")?),
            Shape::Sti => {
                let modrm = self.modrm(fields)?;
                Operand::Register(self.indexed("st", modrm.rm)?)
            }
            Shape::Vx => {
                let modrm = self.modrm(fields)?;
                Operand::Register(self.indexed("xmm", modrm.reg | self.rex_r())?)
            }
            Shape::Wx => self.rm_vector(fields, "xmm", 0xf, 128)?,
            Shape::Wq => self.rm_vector(fields, "xmm", 0xf, 64)?,
            Shape::Wd => self.rm_vector(fields, "xmm", 0xf, 32)?,
            Shape::Pq => {
                let modrm = self.modrm(fields)?;
                Operand::Register(self.indexed("mm", modrm.reg)?)
            }
            Shape::Qq => self.rm_vector(fields, "mm", 0x7, 64)?,
        })
    }
}
