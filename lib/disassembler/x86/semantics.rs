//! Semantic functions for x86 mnemonics.
//!
//! Every function reads the state before the instruction through
//! `Semantics`, and writes its effects into `post`, which starts as a copy of
//! that state with the program counter already advanced. Since all reads see
//! the state before the instruction, writes within one instruction behave as
//! a simultaneous update.

use crate::disassembler::x86::register::is_gpr64;
use crate::disassembler::x86::{Condition, Flag, Instruction, MemoryOperand, Mode, Operand, Prefixes};
use crate::expr::*;
use crate::state::StateMap;
use crate::Error;

type Flags = Vec<(Flag, Expression)>;

const ARITHMETIC_FLAGS: [Flag; 6] = [Flag::Cf, Flag::Pf, Flag::Af, Flag::Zf, Flag::Sf, Flag::Of];

pub(crate) struct Semantics<'s> {
    instruction: &'s Instruction,
    state: &'s StateMap,
}

fn msb(expression: Expression) -> Result<Expression, Error> {
    let bits = expression.bits();
    Expression::extract(expression, bits - 1, 1)
}

fn lsb(expression: Expression) -> Result<Expression, Error> {
    Expression::extract(expression, 0, 1)
}

fn constant(value: u64, bits: usize) -> Expression {
    expr_const(value, bits)
}

fn replace_flag(flags: &mut Flags, flag: Flag, value: Expression) {
    flags.retain(|(f, _)| *f != flag);
    flags.push((flag, value));
}

fn remove_flag(flags: &mut Flags, flag: Flag) {
    flags.retain(|(f, _)| *f != flag);
}

fn undefined_flags(flags: &[Flag]) -> Flags {
    flags.iter().map(|flag| (*flag, top(1))).collect()
}

/// Rotate `value` left by a constant `count`.
fn rotate_left(value: Expression, count: usize) -> Result<Expression, Error> {
    let bits = value.bits();
    let count = count % bits;
    if count == 0 {
        return Ok(value);
    }
    Expression::or(
        Expression::shl(value.clone(), constant(count as u64, bits))?,
        Expression::shr(value, constant((bits - count) as u64, bits))?,
    )
}

fn rotate_right(value: Expression, count: usize) -> Result<Expression, Error> {
    let bits = value.bits();
    rotate_left(value, bits - (count % bits))
}

impl<'s> Semantics<'s> {
    pub fn new(instruction: &'s Instruction, state: &'s StateMap) -> Semantics<'s> {
        Semantics { instruction, state }
    }

    pub fn instruction(&self) -> &Instruction {
        self.instruction
    }

    pub fn mode(&self) -> Mode {
        self.instruction.mode()
    }

    /// Width of the program counter and stack pointer.
    fn word(&self) -> usize {
        self.mode().bits()
    }

    fn mnemonic(&self) -> &str {
        self.instruction.mnemonic()
    }

    pub fn operand(&self, index: usize) -> Result<&'s Operand, Error> {
        self.instruction
            .operand(index)
            .ok_or_else(|| Error::MissingOperand {
                mnemonic: self.instruction.mnemonic().to_string(),
                index,
            })
    }

    fn operand_count(&self) -> usize {
        self.instruction.operands().len()
    }

    pub fn read(&self, register: &Register) -> Expression {
        self.state.read_register(register)
    }

    fn gpr(&self, number: u8, bits: usize) -> Result<Register, Error> {
        self.mode().gpr_sized(number, bits)
    }

    /// A general-purpose register sized by the address size, as used for
    /// counters and string pointers.
    fn address_register(&self, number: u8) -> Result<Register, Error> {
        self.gpr(number, self.instruction.address_bits())
    }

    pub fn flag(&self, flag: Flag) -> Expression {
        self.read(&self.mode().flag(flag))
    }

    pub fn pc(&self) -> Expression {
        self.read(&self.mode().pc())
    }

    /// Address of the next instruction: program counter plus length.
    pub fn pc_next(&self) -> Result<Expression, Error> {
        let length = constant(self.instruction.length() as u64, self.word());
        Ok(Expression::add(self.pc(), length)?.simplify())
    }

    pub fn advance(&self, post: &mut StateMap) -> Result<(), Error> {
        post.write_register(&self.mode().pc(), self.pc_next()?)
    }

    fn set_pc(&self, post: &mut StateMap, value: Expression) -> Result<(), Error> {
        let value = self.resize(value, self.word())?;
        post.write_register(&self.mode().pc(), value)
    }

    /// The next instruction is unknown.
    fn set_pc_top(&self, post: &mut StateMap) -> Result<(), Error> {
        post.write_register(&self.mode().pc(), top(self.word()))
    }

    fn resize(&self, value: Expression, bits: usize) -> Result<Expression, Error> {
        if value.bits() < bits {
            Expression::zext(bits, value)
        } else {
            Expression::trun(bits, value)
        }
    }

    /// Evaluate the address of a memory operand in the state before the
    /// instruction.
    ///
    /// Segments in a flat memory model carry no information, so only fs and
    /// gs are kept on the address.
    pub fn address(&self, memory: &MemoryOperand) -> Result<Address, Error> {
        let bits = memory.address_bits();
        let base = match memory.base() {
            Some(_) if memory.is_pc_relative() => Some(Expression::trun(bits, self.pc_next()?)?),
            Some(base) => Some(self.read(base)),
            None => None,
        };
        let index = memory.index().map(|index| self.read(index));
        let segment = memory
            .segment()
            .map(|segment| segment.name())
            .filter(|name| matches!(*name, "fs" | "gs"))
            .map(|name| name.to_string());
        Address::new(
            base,
            index,
            memory.scale(),
            memory.displacement(),
            segment,
            bits,
        )
    }

    fn memory(&self, memory: &MemoryOperand) -> Result<Memory, Error> {
        Ok(Memory::new(self.address(memory)?, memory.bits()))
    }

    pub fn load(&self, operand: &Operand) -> Result<Expression, Error> {
        Ok(match *operand {
            Operand::Register(ref register) => self.read(register),
            Operand::Immediate(ref immediate) => immediate.constant().clone().into(),
            Operand::Memory(ref memory) => self.state.read_memory(&self.memory(memory)?),
        })
    }

    /// Load an operand at `bits`. Immediates are extended the way the
    /// processor extends them.
    pub fn load_sized(&self, operand: &Operand, bits: usize) -> Result<Expression, Error> {
        let value = self.load(operand)?;
        if value.bits() == bits {
            return Ok(value);
        }
        match *operand {
            Operand::Immediate(ref immediate) if immediate.is_signed() && value.bits() < bits => {
                Expression::sext(bits, value)
            }
            _ => self.resize(value, bits),
        }
    }

    pub fn store(&self, post: &mut StateMap, operand: &Operand, value: Expression) -> Result<(), Error> {
        match *operand {
            Operand::Register(ref register) => self.store_register(post, register, value),
            Operand::Memory(ref memory) => post.write_memory(&self.memory(memory)?, value),
            Operand::Immediate(_) => Err(Error::NotWritable(operand.to_string())),
        }
    }

    /// Write a register. In long mode, writing a 32-bit general-purpose
    /// register clears the upper half of the full register.
    pub fn store_register(&self, post: &mut StateMap, register: &Register, value: Expression) -> Result<(), Error> {
        if self.mode() == Mode::Amd64
            && register.bits() == 32
            && register.offset() == 0
            && is_gpr64(register.full_name())
        {
            post.write_register(&register.full(), Expression::zext(64, value)?)
        } else {
            post.write_register(register, value)
        }
    }

    fn stack_memory(&self, sp: Expression, bits: usize) -> Result<Memory, Error> {
        let address = Address::new(Some(sp), None, 0, 0, None, self.word())?;
        Ok(Memory::new(address, bits))
    }

    /// Push `value` below `sp`, returning the new stack pointer.
    fn push_at(&self, post: &mut StateMap, sp: Expression, value: Expression) -> Result<Expression, Error> {
        let size = constant((value.bits() / 8) as u64, self.word());
        let sp = Expression::sub(sp, size)?.simplify();
        post.write_memory(&self.stack_memory(sp.clone(), value.bits())?, value)?;
        Ok(sp)
    }

    /// Read `bits` at `sp` in the state before the instruction, returning the
    /// value and the new stack pointer.
    fn pop_at(&self, sp: Expression, bits: usize) -> Result<(Expression, Expression), Error> {
        let value = self.state.read_memory(&self.stack_memory(sp.clone(), bits)?);
        let size = constant((bits / 8) as u64, self.word());
        let sp = Expression::add(sp, size)?.simplify();
        Ok((value, sp))
    }

    fn push(&self, post: &mut StateMap, value: Expression) -> Result<(), Error> {
        let sp = self.push_at(post, self.read(&self.mode().sp()), value)?;
        post.write_register(&self.mode().sp(), sp)
    }

    fn write_flags(&self, post: &mut StateMap, flags: Flags) -> Result<(), Error> {
        for (flag, value) in flags {
            post.write_register(&self.mode().flag(flag), value)?;
        }
        Ok(())
    }

    /// Make every flag update conditional on `active`.
    fn guard_flags(&self, flags: Flags, active: &Expression) -> Result<Flags, Error> {
        flags
            .into_iter()
            .map(|(flag, value)| {
                let guarded = Expression::ite(active.clone(), value, self.flag(flag))?;
                Ok((flag, guarded))
            })
            .collect()
    }

    /// ZF, SF and PF of a result.
    fn result_flags(&self, result: &Expression) -> Result<Flags, Error> {
        let bits = result.bits();
        Ok(vec![
            (Flag::Zf, Expression::cmpeq(result.clone(), constant(0, bits))?),
            (Flag::Sf, msb(result.clone())?),
            (Flag::Pf, Expression::parity(result.clone())?),
        ])
    }

    fn adjust_flag(&self, lhs: &Expression, rhs: &Expression, result: &Expression) -> Result<Expression, Error> {
        if result.bits() <= 4 {
            return Ok(top(1));
        }
        let carries = Expression::xor(Expression::xor(lhs.clone(), rhs.clone())?, result.clone())?;
        Expression::extract(carries, 4, 1)
    }

    fn add_flags(&self, lhs: &Expression, rhs: &Expression, result: &Expression) -> Result<Flags, Error> {
        let mut flags = self.result_flags(result)?;
        flags.push((Flag::Cf, Expression::cmpltu(result.clone(), lhs.clone())?));
        let overflow = Expression::and(
            Expression::xor(lhs.clone(), result.clone())?,
            Expression::xor(rhs.clone(), result.clone())?,
        )?;
        flags.push((Flag::Of, msb(overflow)?));
        flags.push((Flag::Af, self.adjust_flag(lhs, rhs, result)?));
        Ok(flags)
    }

    fn sub_flags(&self, lhs: &Expression, rhs: &Expression, result: &Expression) -> Result<Flags, Error> {
        let mut flags = self.result_flags(result)?;
        flags.push((Flag::Cf, Expression::cmpltu(lhs.clone(), rhs.clone())?));
        let overflow = Expression::and(
            Expression::xor(lhs.clone(), rhs.clone())?,
            Expression::xor(lhs.clone(), result.clone())?,
        )?;
        flags.push((Flag::Of, msb(overflow)?));
        flags.push((Flag::Af, self.adjust_flag(lhs, rhs, result)?));
        Ok(flags)
    }

    fn logic_flags(&self, result: &Expression) -> Result<Flags, Error> {
        let mut flags = self.result_flags(result)?;
        flags.push((Flag::Cf, constant(0, 1)));
        flags.push((Flag::Of, constant(0, 1)));
        flags.push((Flag::Af, top(1)));
        Ok(flags)
    }

    /// The value of a condition code over the flags before the instruction.
    pub fn condition(&self, condition: Condition) -> Result<Expression, Error> {
        let cf = self.flag(Flag::Cf);
        let zf = self.flag(Flag::Zf);
        let sf = self.flag(Flag::Sf);
        let of = self.flag(Flag::Of);
        let pf = self.flag(Flag::Pf);
        let expression = match condition {
            Condition::O => of,
            Condition::No => Expression::not(of)?,
            Condition::B => cf,
            Condition::Ae => Expression::not(cf)?,
            Condition::E => zf,
            Condition::Ne => Expression::not(zf)?,
            Condition::Be => Expression::or(cf, zf)?,
            Condition::A => Expression::and(Expression::not(cf)?, Expression::not(zf)?)?,
            Condition::S => sf,
            Condition::Ns => Expression::not(sf)?,
            Condition::P => pf,
            Condition::Np => Expression::not(pf)?,
            Condition::L => Expression::xor(sf, of)?,
            Condition::Ge => Expression::cmpeq(sf, of)?,
            Condition::Le => Expression::or(zf, Expression::xor(sf, of)?)?,
            Condition::G => Expression::and(Expression::not(zf)?, Expression::cmpeq(sf, of)?)?,
        };
        Ok(expression.simplify())
    }

    fn instruction_condition(&self) -> Result<Condition, Error> {
        self.instruction
            .condition()
            .ok_or_else(|| Error::Custom(format!("{} has no condition code", self.mnemonic())))
    }

    /// Target of a branch operand: relative to the next instruction, or the
    /// value of a register or memory operand.
    fn branch_target(&self, operand: &Operand) -> Result<Expression, Error> {
        match *operand {
            Operand::Immediate(ref immediate) if immediate.is_relative() => {
                let displacement = Expression::sext(self.word(), immediate.constant().clone().into())?;
                Ok(Expression::add(self.pc_next()?, displacement)?.simplify())
            }
            _ => self.resize(self.load(operand)?, self.word()),
        }
    }
}

// Data movement

pub(crate) fn mov(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let value = semantics.load_sized(semantics.operand(1)?, destination.bits())?;
    semantics.store(post, destination, value)
}

pub(crate) fn movzx(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let value = semantics.load(semantics.operand(1)?)?;
    semantics.store(post, destination, Expression::zext(destination.bits(), value)?)
}

pub(crate) fn movsx(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let value = semantics.load(semantics.operand(1)?)?;
    let bits = destination.bits();
    let value = if value.bits() < bits {
        Expression::sext(bits, value)?
    } else {
        Expression::trun(bits, value)?
    };
    semantics.store(post, destination, value)
}

pub(crate) fn lea(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let memory = semantics
        .operand(1)?
        .memory()
        .ok_or_else(|| Error::Custom("lea without a memory operand".to_string()))?;
    let address = semantics.address(memory)?.expression()?;
    let value = semantics.resize(address, destination.bits())?;
    semantics.store(post, destination, value)
}

pub(crate) fn xchg(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let lhs = semantics.operand(0)?;
    let rhs = semantics.operand(1)?;
    let lhs_value = semantics.load(lhs)?;
    let rhs_value = semantics.load(rhs)?;
    semantics.store(post, lhs, rhs_value)?;
    semantics.store(post, rhs, lhs_value)
}

pub(crate) fn push(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().operand_bits();
    let operand = semantics.operand(0)?;
    let value = match *operand {
        Operand::Immediate(_) => semantics.load_sized(operand, bits)?,
        _ if operand.bits() < bits => Expression::zext(bits, semantics.load(operand)?)?,
        _ => semantics.load(operand)?,
    };
    semantics.push(post, value)
}

pub(crate) fn pop(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let sp_register = semantics.mode().sp();
    let operand = semantics.operand(0)?;
    let bits = match *operand {
        // Segment registers pop a full stack slot.
        Operand::Register(ref register) if register.bits() == 16 && register.full_bits() == 16 => {
            semantics.instruction().operand_bits()
        }
        _ => operand.bits(),
    };
    let (value, sp) = semantics.pop_at(semantics.read(&sp_register), bits)?;
    post.write_register(&sp_register, sp)?;

    let value = semantics.resize(value, operand.bits())?;
    match *operand {
        // A memory destination based on the stack pointer sees it after the
        // increment.
        Operand::Memory(ref memory)
            if memory
                .base()
                .map(|base| base.full_name() == sp_register.full_name())
                .unwrap_or(false) =>
        {
            let address = semantics.address(memory)?.offset((bits / 8) as i64);
            post.write_memory(&Memory::new(address, memory.bits()), value)
        }
        _ => semantics.store(post, operand, value),
    }
}

pub(crate) fn pusha(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().operand_bits();
    let sp_register = semantics.mode().sp();
    let mut sp = semantics.read(&sp_register);
    // eax, ecx, edx, ebx, the original esp, ebp, esi, edi
    for number in 0..8 {
        let value = semantics.read(&semantics.gpr(number, bits)?);
        sp = semantics.push_at(post, sp, value)?;
    }
    post.write_register(&sp_register, sp)
}

pub(crate) fn popa(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().operand_bits();
    let sp_register = semantics.mode().sp();
    let mut sp = semantics.read(&sp_register);
    for number in (0..8).rev() {
        let (value, next) = semantics.pop_at(sp, bits)?;
        sp = next;
        if number != 4 {
            semantics.store_register(post, &semantics.gpr(number, bits)?, value)?;
        }
    }
    post.write_register(&sp_register, sp)
}

pub(crate) fn pushf(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().operand_bits();
    let flags = semantics.read(&semantics.mode().eflags());
    semantics.push(post, semantics.resize(flags, bits)?)
}

pub(crate) fn popf(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().operand_bits();
    let sp_register = semantics.mode().sp();
    let (value, sp) = semantics.pop_at(semantics.read(&sp_register), bits)?;
    post.write_register(&sp_register, sp)?;
    let eflags = semantics.mode().eflags();
    if bits == 16 {
        post.write_register(&eflags.slice(0, 16), value)
    } else {
        post.write_register(&eflags, semantics.resize(value, 32)?)
    }
}

/// The low byte of eflags, with the reserved bits fixed.
fn flags_byte(value: Expression) -> Result<Expression, Error> {
    Expression::or(Expression::and(value, constant(0xd5, 8))?, constant(0x02, 8))
}

pub(crate) fn lahf(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let low = Expression::extract(semantics.read(&semantics.mode().eflags()), 0, 8)?;
    let ah = semantics.mode().get_register("ah")?;
    post.write_register(&ah, flags_byte(low)?)
}

pub(crate) fn sahf(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let ah = semantics.read(&semantics.mode().get_register("ah")?);
    post.write_register(&semantics.mode().eflags().slice(0, 8), flags_byte(ah)?)
}

/// cbw, cwde and cdqe.
pub(crate) fn extend_accumulator(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().operand_bits();
    let source = semantics.read(&semantics.gpr(0, bits / 2)?);
    semantics.store_register(post, &semantics.gpr(0, bits)?, Expression::sext(bits, source)?)
}

/// cwd, cdq and cqo.
pub(crate) fn extend_into_data(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().operand_bits();
    let accumulator = semantics.read(&semantics.gpr(0, bits)?);
    let wide = Expression::sext(bits * 2, accumulator)?;
    let high = Expression::extract(wide, bits, bits)?;
    semantics.store_register(post, &semantics.gpr(2, bits)?, high)
}

pub(crate) fn bswap(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let operand = semantics.operand(0)?;
    let value = semantics.load(operand)?;
    let bits = value.bits();
    if bits == 16 {
        return semantics.store(post, operand, top(16));
    }
    let mut bytes = Vec::new();
    for byte in (0..bits / 8).rev() {
        bytes.push(Expression::extract(value.clone(), byte * 8, 8)?);
    }
    semantics.store(post, operand, Expression::concat(bytes)?)
}

pub(crate) fn xlat(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().address_bits();
    let al = semantics.mode().get_register("al")?;
    let table = semantics.read(&semantics.address_register(3)?);
    let index = Expression::zext(bits, semantics.read(&al))?;
    let segment = semantics
        .instruction()
        .segment()
        .map(|segment| segment.name().to_string())
        .filter(|name| name == "fs" || name == "gs");
    let address = Address::new(Some(table), Some(index), 1, 0, segment, bits)?;
    let value = semantics.state.read_memory(&Memory::new(address, 8));
    post.write_register(&al, value)
}

pub(crate) fn cmovcc(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let condition = semantics.condition(semantics.instruction_condition()?)?;
    let source = semantics.load(semantics.operand(1)?)?;
    let current = semantics.load(destination)?;
    semantics.store(post, destination, Expression::ite(condition, source, current)?)
}

pub(crate) fn setcc(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let condition = semantics.condition(semantics.instruction_condition()?)?;
    semantics.store(post, destination, Expression::zext(8, condition)?)
}

/// lds, les, lfs, lgs and lss.
pub(crate) fn load_far_pointer(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let pointer = semantics.load(semantics.operand(1)?)?;
    let bits = destination.bits();
    let segment = match semantics.mnemonic() {
        "LDS" => "ds",
        "LES" => "es",
        "LFS" => "fs",
        "LGS" => "gs",
        _ => "ss",
    };
    let segment = semantics.mode().get_register(segment)?;
    semantics.store(post, destination, Expression::extract(pointer.clone(), 0, bits)?)?;
    post.write_register(&segment, Expression::extract(pointer, bits, 16)?)
}

// Arithmetic

fn binary(semantics: &Semantics) -> Result<(Expression, Expression), Error> {
    let lhs = semantics.load(semantics.operand(0)?)?;
    let rhs = semantics.load_sized(semantics.operand(1)?, lhs.bits())?;
    Ok((lhs, rhs))
}

pub(crate) fn add(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let (lhs, rhs) = binary(semantics)?;
    let result = Expression::add(lhs.clone(), rhs.clone())?;
    semantics.write_flags(post, semantics.add_flags(&lhs, &rhs, &result)?)?;
    semantics.store(post, semantics.operand(0)?, result)
}

pub(crate) fn adc(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let (lhs, rhs) = binary(semantics)?;
    let carry = semantics.flag(Flag::Cf);
    let result = Expression::add(
        Expression::add(lhs.clone(), rhs.clone())?,
        Expression::zext(lhs.bits(), carry.clone())?,
    )?;
    let mut flags = semantics.add_flags(&lhs, &rhs, &result)?;
    let carry_out = Expression::or(
        Expression::cmpltu(result.clone(), lhs.clone())?,
        Expression::and(carry, Expression::cmpeq(result.clone(), lhs)?)?,
    )?;
    replace_flag(&mut flags, Flag::Cf, carry_out);
    semantics.write_flags(post, flags)?;
    semantics.store(post, semantics.operand(0)?, result)
}

pub(crate) fn sub(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let (lhs, rhs) = binary(semantics)?;
    let result = Expression::sub(lhs.clone(), rhs.clone())?;
    semantics.write_flags(post, semantics.sub_flags(&lhs, &rhs, &result)?)?;
    semantics.store(post, semantics.operand(0)?, result)
}

pub(crate) fn sbb(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let (lhs, rhs) = binary(semantics)?;
    let borrow = semantics.flag(Flag::Cf);
    let result = Expression::sub(
        Expression::sub(lhs.clone(), rhs.clone())?,
        Expression::zext(lhs.bits(), borrow.clone())?,
    )?;
    let mut flags = semantics.sub_flags(&lhs, &rhs, &result)?;
    let borrow_out = Expression::or(
        Expression::cmpltu(lhs.clone(), rhs.clone())?,
        Expression::and(borrow, Expression::cmpeq(lhs, rhs)?)?,
    )?;
    replace_flag(&mut flags, Flag::Cf, borrow_out);
    semantics.write_flags(post, flags)?;
    semantics.store(post, semantics.operand(0)?, result)
}

pub(crate) fn cmp(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let (lhs, rhs) = binary(semantics)?;
    let result = Expression::sub(lhs.clone(), rhs.clone())?;
    semantics.write_flags(post, semantics.sub_flags(&lhs, &rhs, &result)?)
}

pub(crate) fn inc(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let operand = semantics.operand(0)?;
    let value = semantics.load(operand)?;
    let one = constant(1, value.bits());
    let result = Expression::add(value.clone(), one.clone())?;
    let mut flags = semantics.add_flags(&value, &one, &result)?;
    remove_flag(&mut flags, Flag::Cf);
    semantics.write_flags(post, flags)?;
    semantics.store(post, operand, result)
}

pub(crate) fn dec(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let operand = semantics.operand(0)?;
    let value = semantics.load(operand)?;
    let one = constant(1, value.bits());
    let result = Expression::sub(value.clone(), one.clone())?;
    let mut flags = semantics.sub_flags(&value, &one, &result)?;
    remove_flag(&mut flags, Flag::Cf);
    semantics.write_flags(post, flags)?;
    semantics.store(post, operand, result)
}

pub(crate) fn neg(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let operand = semantics.operand(0)?;
    let value = semantics.load(operand)?;
    let zero = constant(0, value.bits());
    let result = Expression::neg(value.clone())?;
    semantics.write_flags(post, semantics.sub_flags(&zero, &value, &result)?)?;
    semantics.store(post, operand, result)
}

pub(crate) fn not(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let operand = semantics.operand(0)?;
    let value = semantics.load(operand)?;
    semantics.store(post, operand, Expression::not(value)?)
}

fn logic(
    semantics: &Semantics,
    post: &mut StateMap,
    operator: fn(Expression, Expression) -> Result<Expression, Error>,
    write: bool,
) -> Result<(), Error> {
    let (lhs, rhs) = binary(semantics)?;
    let result = operator(lhs, rhs)?;
    semantics.write_flags(post, semantics.logic_flags(&result)?)?;
    if write {
        semantics.store(post, semantics.operand(0)?, result)?;
    }
    Ok(())
}

pub(crate) fn and(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    logic(semantics, post, Expression::and, true)
}

pub(crate) fn or(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    logic(semantics, post, Expression::or, true)
}

pub(crate) fn xor(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    logic(semantics, post, Expression::xor, true)
}

pub(crate) fn test(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    logic(semantics, post, Expression::and, false)
}

/// Write a double-width product into the accumulator and data registers,
/// with CF and OF set to `overflow`.
fn write_product(
    semantics: &Semantics,
    post: &mut StateMap,
    bits: usize,
    product: Expression,
    overflow: Expression,
) -> Result<(), Error> {
    if bits == 8 {
        semantics.store_register(post, &semantics.gpr(0, 16)?, product)?;
    } else {
        let low = Expression::extract(product.clone(), 0, bits)?;
        let high = Expression::extract(product, bits, bits)?;
        semantics.store_register(post, &semantics.gpr(0, bits)?, low)?;
        semantics.store_register(post, &semantics.gpr(2, bits)?, high)?;
    }
    let mut flags = undefined_flags(&[Flag::Sf, Flag::Zf, Flag::Af, Flag::Pf]);
    flags.push((Flag::Cf, overflow.clone()));
    flags.push((Flag::Of, overflow));
    semantics.write_flags(post, flags)
}

pub(crate) fn mul(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let source = semantics.load(semantics.operand(0)?)?;
    let bits = source.bits();
    let wide = bits * 2;
    let accumulator = semantics.read(&semantics.gpr(0, bits)?);
    let product = Expression::mul(
        Expression::zext(wide, accumulator)?,
        Expression::zext(wide, source)?,
    )?;
    let high = Expression::extract(product.clone(), bits, bits)?;
    let overflow = Expression::cmpneq(high, constant(0, bits))?;
    write_product(semantics, post, bits, product, overflow)
}

pub(crate) fn imul(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    if semantics.operand_count() == 1 {
        let source = semantics.load(semantics.operand(0)?)?;
        let bits = source.bits();
        let wide = bits * 2;
        let accumulator = semantics.read(&semantics.gpr(0, bits)?);
        let product = Expression::mul(
            Expression::sext(wide, accumulator)?,
            Expression::sext(wide, source)?,
        )?;
        let low = Expression::extract(product.clone(), 0, bits)?;
        let overflow = Expression::cmpneq(product.clone(), Expression::sext(wide, low)?)?;
        return write_product(semantics, post, bits, product, overflow);
    }

    let destination = semantics.operand(0)?;
    let bits = destination.bits();
    let wide = bits * 2;
    let (lhs, rhs) = if semantics.operand_count() == 3 {
        (
            semantics.load(semantics.operand(1)?)?,
            semantics.load_sized(semantics.operand(2)?, bits)?,
        )
    } else {
        (
            semantics.load(destination)?,
            semantics.load_sized(semantics.operand(1)?, bits)?,
        )
    };
    let product = Expression::mul(Expression::sext(wide, lhs)?, Expression::sext(wide, rhs)?)?;
    let low = Expression::extract(product.clone(), 0, bits)?;
    let overflow = Expression::cmpneq(product, Expression::sext(wide, low.clone())?)?;
    let mut flags = undefined_flags(&[Flag::Sf, Flag::Zf, Flag::Af, Flag::Pf]);
    flags.push((Flag::Cf, overflow.clone()));
    flags.push((Flag::Of, overflow));
    semantics.write_flags(post, flags)?;
    semantics.store(post, destination, low)
}

fn divide(semantics: &Semantics, post: &mut StateMap, signed: bool) -> Result<(), Error> {
    let source = semantics.load(semantics.operand(0)?)?;
    let bits = source.bits();
    let wide = bits * 2;

    let (dividend, quotient_register, remainder_register) = if bits == 8 {
        (
            semantics.read(&semantics.gpr(0, 16)?),
            semantics.mode().get_register("al")?,
            semantics.mode().get_register("ah")?,
        )
    } else {
        let low = semantics.gpr(0, bits)?;
        let high = semantics.gpr(2, bits)?;
        let dividend = Expression::concat(vec![semantics.read(&low), semantics.read(&high)])?;
        (dividend, low, high)
    };

    let divisor = if signed {
        Expression::sext(wide, source.clone())?
    } else {
        Expression::zext(wide, source.clone())?
    };
    let (quotient, remainder) = if signed {
        (
            Expression::divs(dividend.clone(), divisor.clone())?,
            Expression::mods(dividend, divisor)?,
        )
    } else {
        (
            Expression::divu(dividend.clone(), divisor.clone())?,
            Expression::modu(dividend, divisor)?,
        )
    };

    semantics.store_register(post, &quotient_register, Expression::extract(quotient, 0, bits)?)?;
    semantics.store_register(post, &remainder_register, Expression::extract(remainder, 0, bits)?)?;
    semantics.write_flags(post, undefined_flags(&ARITHMETIC_FLAGS))?;

    // Division by zero raises #DE.
    let zero = source
        .simplify()
        .get_constant()
        .map(|constant| constant.is_zero())
        .unwrap_or(false);
    if zero {
        semantics.set_pc_top(post)?;
    }
    Ok(())
}

pub(crate) fn div(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    divide(semantics, post, false)
}

pub(crate) fn idiv(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    divide(semantics, post, true)
}

pub(crate) fn xadd(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let source = semantics.operand(1)?;
    let lhs = semantics.load(destination)?;
    let rhs = semantics.load(source)?;
    let result = Expression::add(lhs.clone(), rhs.clone())?;
    semantics.write_flags(post, semantics.add_flags(&lhs, &rhs, &result)?)?;
    semantics.store(post, source, lhs)?;
    semantics.store(post, destination, result)
}

pub(crate) fn cmpxchg(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let current = semantics.load(destination)?;
    let bits = current.bits();
    let source = semantics.load(semantics.operand(1)?)?;
    let accumulator_register = semantics.gpr(0, bits)?;
    let accumulator = semantics.read(&accumulator_register);

    let difference = Expression::sub(accumulator.clone(), current.clone())?;
    let flags = semantics.sub_flags(&accumulator, &current, &difference)?;
    semantics.write_flags(post, flags)?;

    let equal = Expression::cmpeq(accumulator.clone(), current.clone())?;
    let loaded = Expression::ite(equal.clone(), accumulator, current.clone())?;
    semantics.store_register(post, &accumulator_register, loaded)?;
    semantics.store(post, destination, Expression::ite(equal, source, current)?)
}

pub(crate) fn cmpxchg8b(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let current = semantics.load(destination)?;
    let eax = semantics.gpr(0, 32)?;
    let edx = semantics.gpr(2, 32)?;
    let expected = Expression::concat(vec![semantics.read(&eax), semantics.read(&edx)])?;
    let replacement = Expression::concat(vec![
        semantics.read(&semantics.gpr(3, 32)?),
        semantics.read(&semantics.gpr(1, 32)?),
    ])?;
    let equal = Expression::cmpeq(expected.clone(), current.clone())?;

    let loaded = Expression::ite(equal.clone(), expected, current.clone())?;
    semantics.store_register(post, &eax, Expression::extract(loaded.clone(), 0, 32)?)?;
    semantics.store_register(post, &edx, Expression::extract(loaded, 32, 32)?)?;
    semantics.store(post, destination, Expression::ite(equal.clone(), replacement, current)?)?;
    semantics.write_flags(post, vec![(Flag::Zf, equal)])
}

/// ASCII and decimal adjustments, which are not modeled precisely.
pub(crate) fn bcd(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let register = match semantics.mnemonic() {
        "DAA" | "DAS" => semantics.mode().get_register("al")?,
        _ => semantics.mode().get_register("ax")?,
    };
    post.write_register(&register, top(register.bits()))?;
    semantics.write_flags(post, undefined_flags(&ARITHMETIC_FLAGS))
}

// Shifts and rotates

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Shift {
    Shl,
    Shr,
    Sar,
    Rol,
    Ror,
    Rcl,
    Rcr,
}

/// The shift count, masked the way the processor masks it.
fn shift_count(semantics: &Semantics, operand: &Operand, bits: usize) -> Result<Expression, Error> {
    let count = semantics.load(operand)?;
    let count = semantics.resize(count, 8)?;
    let mask = if bits == 64 { 0x3f } else { 0x1f };
    Ok(Expression::and(count, constant(mask, 8))?.simplify())
}

fn shift(semantics: &Semantics, post: &mut StateMap, kind: Shift) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let value = semantics.load(destination)?;
    let bits = value.bits();
    let count = shift_count(semantics, semantics.operand(1)?, bits)?;

    let count = match count.get_constant().and_then(|count| count.value_u64()) {
        // A zero count changes neither the operand nor the flags.
        Some(0) => return Ok(()),
        Some(count) => count as usize,
        None => {
            let amount = Expression::zext(bits, count)?;
            let result = match kind {
                Shift::Shl => Expression::shl(value, amount)?,
                Shift::Shr => Expression::shr(value, amount)?,
                Shift::Sar => Expression::sar(value, amount)?,
                _ => top(bits),
            };
            let flags = match kind {
                Shift::Shl | Shift::Shr | Shift::Sar => undefined_flags(&ARITHMETIC_FLAGS),
                _ => undefined_flags(&[Flag::Cf, Flag::Of]),
            };
            semantics.write_flags(post, flags)?;
            return semantics.store(post, destination, result);
        }
    };

    let amount = constant(count as u64, bits);
    let (result, carry, overflow) = match kind {
        Shift::Shl => {
            let result = Expression::shl(value.clone(), amount)?;
            let carry = if count <= bits {
                Expression::extract(value, bits - count, 1)?
            } else {
                top(1)
            };
            let overflow = Expression::xor(msb(result.clone())?, carry.clone())?;
            (result, carry, overflow)
        }
        Shift::Shr => {
            let result = Expression::shr(value.clone(), amount)?;
            let carry = if count <= bits {
                Expression::extract(value.clone(), count - 1, 1)?
            } else {
                top(1)
            };
            (result, carry, msb(value)?)
        }
        Shift::Sar => {
            let result = Expression::sar(value.clone(), amount)?;
            let carry = if count <= bits {
                Expression::extract(value.clone(), count - 1, 1)?
            } else {
                msb(value)?
            };
            (result, carry, constant(0, 1))
        }
        Shift::Rol => {
            let result = rotate_left(value, count)?;
            let carry = lsb(result.clone())?;
            let overflow = Expression::xor(msb(result.clone())?, carry.clone())?;
            (result, carry, overflow)
        }
        Shift::Ror => {
            let result = rotate_right(value, count)?;
            let carry = msb(result.clone())?;
            let overflow = Expression::xor(carry.clone(), Expression::extract(result.clone(), bits - 2, 1)?)?;
            (result, carry, overflow)
        }
        Shift::Rcl | Shift::Rcr => {
            // Rotate through carry is a rotate of the operand with CF above it.
            let wide = Expression::concat(vec![value, semantics.flag(Flag::Cf)])?;
            let rotated = if kind == Shift::Rcl {
                rotate_left(wide, count)?
            } else {
                rotate_right(wide, count)?
            };
            let result = Expression::extract(rotated.clone(), 0, bits)?;
            let carry = Expression::extract(rotated, bits, 1)?;
            let overflow = if kind == Shift::Rcl {
                Expression::xor(msb(result.clone())?, carry.clone())?
            } else {
                Expression::xor(msb(result.clone())?, Expression::extract(result.clone(), bits - 2, 1)?)?
            };
            (result, carry, overflow)
        }
    };

    let mut flags = match kind {
        Shift::Shl | Shift::Shr | Shift::Sar => {
            let mut flags = semantics.result_flags(&result)?;
            flags.push((Flag::Af, top(1)));
            flags
        }
        _ => Vec::new(),
    };
    flags.push((Flag::Cf, carry));
    flags.push((Flag::Of, if count == 1 { overflow } else { top(1) }));
    semantics.write_flags(post, flags)?;
    semantics.store(post, destination, result)
}

pub(crate) fn shl(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    shift(semantics, post, Shift::Shl)
}

pub(crate) fn shr(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    shift(semantics, post, Shift::Shr)
}

pub(crate) fn sar(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    shift(semantics, post, Shift::Sar)
}

pub(crate) fn rol(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    shift(semantics, post, Shift::Rol)
}

pub(crate) fn ror(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    shift(semantics, post, Shift::Ror)
}

pub(crate) fn rcl(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    shift(semantics, post, Shift::Rcl)
}

pub(crate) fn rcr(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    shift(semantics, post, Shift::Rcr)
}

fn double_shift(semantics: &Semantics, post: &mut StateMap, left: bool) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let value = semantics.load(destination)?;
    let fill = semantics.load(semantics.operand(1)?)?;
    let bits = value.bits();
    let count = shift_count(semantics, semantics.operand(2)?, bits)?;

    let count = match count.get_constant().and_then(|count| count.value_u64()) {
        Some(0) => return Ok(()),
        Some(count) if (count as usize) <= bits => count as usize,
        _ => {
            semantics.write_flags(post, undefined_flags(&ARITHMETIC_FLAGS))?;
            return semantics.store(post, destination, top(bits));
        }
    };

    let (result, carry) = if left {
        let result = Expression::or(
            Expression::shl(value.clone(), constant(count as u64, bits))?,
            Expression::shr(fill, constant((bits - count) as u64, bits))?,
        )?;
        (result, Expression::extract(value.clone(), bits - count, 1)?)
    } else {
        let result = Expression::or(
            Expression::shr(value.clone(), constant(count as u64, bits))?,
            Expression::shl(fill, constant((bits - count) as u64, bits))?,
        )?;
        (result, Expression::extract(value.clone(), count - 1, 1)?)
    };

    let mut flags = semantics.result_flags(&result)?;
    flags.push((Flag::Cf, carry));
    flags.push((Flag::Af, top(1)));
    let overflow = if count == 1 {
        Expression::xor(msb(result.clone())?, msb(value)?)?
    } else {
        top(1)
    };
    flags.push((Flag::Of, overflow));
    semantics.write_flags(post, flags)?;
    semantics.store(post, destination, result)
}

pub(crate) fn shld(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    double_shift(semantics, post, true)
}

pub(crate) fn shrd(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    double_shift(semantics, post, false)
}

// Bit operations

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BitOperation {
    Test,
    Set,
    Reset,
    Complement,
}

/// bt and friends. The bit offset is taken modulo the operand width, also
/// for memory operands.
fn bit_test(semantics: &Semantics, post: &mut StateMap, operation: BitOperation) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let base = semantics.load(destination)?;
    let bits = base.bits();
    let offset = semantics.load_sized(semantics.operand(1)?, bits)?;
    let index = Expression::and(offset, constant((bits - 1) as u64, bits))?;
    let mask = Expression::shl(constant(1, bits), index)?;
    let bit = Expression::cmpneq(
        Expression::and(base.clone(), mask.clone())?,
        constant(0, bits),
    )?;

    let mut flags = undefined_flags(&[Flag::Of, Flag::Sf, Flag::Af, Flag::Pf]);
    flags.push((Flag::Cf, bit));
    semantics.write_flags(post, flags)?;

    let result = match operation {
        BitOperation::Test => return Ok(()),
        BitOperation::Set => Expression::or(base, mask)?,
        BitOperation::Reset => Expression::and(base, Expression::not(mask)?)?,
        BitOperation::Complement => Expression::xor(base, mask)?,
    };
    semantics.store(post, destination, result)
}

pub(crate) fn bt(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    bit_test(semantics, post, BitOperation::Test)
}

pub(crate) fn bts(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    bit_test(semantics, post, BitOperation::Set)
}

pub(crate) fn btr(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    bit_test(semantics, post, BitOperation::Reset)
}

pub(crate) fn btc(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    bit_test(semantics, post, BitOperation::Complement)
}

/// bsf and bsr.
pub(crate) fn bit_scan(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let source = semantics.load(semantics.operand(1)?)?;
    let bits = source.bits();
    let forward = semantics.mnemonic() == "BSF";

    let mut flags = undefined_flags(&[Flag::Cf, Flag::Of, Flag::Sf, Flag::Af, Flag::Pf]);
    flags.push((Flag::Zf, Expression::cmpeq(source.clone(), constant(0, bits))?));
    semantics.write_flags(post, flags)?;

    let index = match source.simplify().get_constant() {
        // The destination is left alone for a zero source.
        Some(value) if value.is_zero() => return Ok(()),
        Some(value) => {
            let mut positions = (0..bits).filter(|bit| value.bit(*bit));
            let position = if forward {
                positions.next()
            } else {
                positions.last()
            };
            match position {
                Some(position) => constant(position as u64, bits),
                None => top(bits),
            }
        }
        None => top(bits),
    };
    semantics.store(post, destination, index)
}

/// popcnt, lzcnt and tzcnt.
pub(crate) fn bit_count(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let source = semantics.load(semantics.operand(1)?)?;
    let bits = source.bits();
    let is_zero = Expression::cmpeq(source.clone(), constant(0, bits))?;

    let count = source.simplify().get_constant().map(|value| {
        let count = match semantics.mnemonic() {
            "POPCNT" => (0..bits).filter(|bit| value.bit(*bit)).count(),
            "TZCNT" => (0..bits).take_while(|bit| !value.bit(*bit)).count(),
            _ => (0..bits).rev().take_while(|bit| !value.bit(*bit)).count(),
        };
        constant(count as u64, bits)
    });
    let result = count.unwrap_or_else(|| top(bits));

    let flags = if semantics.mnemonic() == "POPCNT" {
        vec![
            (Flag::Zf, is_zero),
            (Flag::Cf, constant(0, 1)),
            (Flag::Of, constant(0, 1)),
            (Flag::Sf, constant(0, 1)),
            (Flag::Af, constant(0, 1)),
            (Flag::Pf, constant(0, 1)),
        ]
    } else {
        let mut flags = undefined_flags(&[Flag::Of, Flag::Sf, Flag::Af, Flag::Pf]);
        flags.push((Flag::Cf, is_zero));
        flags.push((Flag::Zf, Expression::cmpeq(result.clone(), constant(0, bits))?));
        flags
    };
    semantics.write_flags(post, flags)?;
    semantics.store(post, destination, result)
}

// Flags

fn set_flag(semantics: &Semantics, post: &mut StateMap, flag: Flag, value: Expression) -> Result<(), Error> {
    semantics.write_flags(post, vec![(flag, value)])
}

pub(crate) fn clc(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    set_flag(semantics, post, Flag::Cf, constant(0, 1))
}

pub(crate) fn stc(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    set_flag(semantics, post, Flag::Cf, constant(1, 1))
}

pub(crate) fn cmc(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let carry = Expression::not(semantics.flag(Flag::Cf))?;
    set_flag(semantics, post, Flag::Cf, carry)
}

pub(crate) fn cld(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    set_flag(semantics, post, Flag::Df, constant(0, 1))
}

pub(crate) fn std(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    set_flag(semantics, post, Flag::Df, constant(1, 1))
}

pub(crate) fn cli(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    set_flag(semantics, post, Flag::If, constant(0, 1))
}

pub(crate) fn sti(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    set_flag(semantics, post, Flag::If, constant(1, 1))
}

pub(crate) fn nop(_: &Semantics, _: &mut StateMap) -> Result<(), Error> {
    Ok(())
}

// Control flow

pub(crate) fn jmp(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let target = semantics.branch_target(semantics.operand(0)?)?;
    semantics.set_pc(post, target)
}

pub(crate) fn jcc(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let condition = semantics.condition(semantics.instruction_condition()?)?;
    let target = semantics.branch_target(semantics.operand(0)?)?;
    let pc = Expression::ite(condition, target, semantics.pc_next()?)?;
    semantics.set_pc(post, pc.simplify())
}

/// jcxz, jecxz and jrcxz.
pub(crate) fn jcxz(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let counter = semantics.read(&semantics.address_register(1)?);
    let bits = counter.bits();
    let condition = Expression::cmpeq(counter, constant(0, bits))?;
    let target = semantics.branch_target(semantics.operand(0)?)?;
    let pc = Expression::ite(condition, target, semantics.pc_next()?)?;
    semantics.set_pc(post, pc.simplify())
}

/// loop, loope and loopne.
pub(crate) fn loop_(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let counter_register = semantics.address_register(1)?;
    let counter = semantics.read(&counter_register);
    let bits = counter.bits();
    let counter = Expression::sub(counter, constant(1, bits))?;
    let mut condition = Expression::cmpneq(counter.clone(), constant(0, bits))?;
    match semantics.mnemonic() {
        "LOOPE" => condition = Expression::and(condition, semantics.flag(Flag::Zf))?,
        "LOOPNE" => condition = Expression::and(condition, Expression::not(semantics.flag(Flag::Zf))?)?,
        _ => {}
    }
    let target = semantics.branch_target(semantics.operand(0)?)?;
    let pc = Expression::ite(condition, target, semantics.pc_next()?)?;
    post.write_register(&counter_register, counter)?;
    semantics.set_pc(post, pc.simplify())
}

pub(crate) fn call(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().operand_bits();
    let target = semantics.branch_target(semantics.operand(0)?)?;
    let return_address = semantics.resize(semantics.pc_next()?, bits)?;
    semantics.push(post, return_address)?;
    semantics.set_pc(post, target)
}

pub(crate) fn ret(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().operand_bits();
    let sp_register = semantics.mode().sp();
    let (target, mut sp) = semantics.pop_at(semantics.read(&sp_register), bits)?;
    if let Ok(operand) = semantics.operand(0) {
        let release = semantics.load_sized(operand, semantics.word())?;
        sp = Expression::add(sp, release)?.simplify();
    }
    post.write_register(&sp_register, sp)?;
    semantics.set_pc(post, target)
}

/// Far pointer operand split into offset and selector.
fn far_pointer(semantics: &Semantics) -> Result<(Expression, Expression), Error> {
    let pointer = semantics.load(semantics.operand(0)?)?;
    let offset_bits = pointer.bits() - 16;
    Ok((
        Expression::extract(pointer.clone(), 0, offset_bits)?,
        Expression::extract(pointer, offset_bits, 16)?,
    ))
}

pub(crate) fn jmpf(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let (offset, selector) = far_pointer(semantics)?;
    post.write_register(&semantics.mode().get_register("cs")?, selector)?;
    semantics.set_pc(post, offset)
}

pub(crate) fn callf(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().operand_bits();
    let (offset, selector) = far_pointer(semantics)?;
    let cs_register = semantics.mode().get_register("cs")?;
    let sp_register = semantics.mode().sp();

    let cs = Expression::zext(bits, semantics.read(&cs_register))?;
    let return_address = semantics.resize(semantics.pc_next()?, bits)?;
    let sp = semantics.push_at(post, semantics.read(&sp_register), cs)?;
    let sp = semantics.push_at(post, sp, return_address)?;
    post.write_register(&sp_register, sp)?;
    post.write_register(&cs_register, selector)?;
    semantics.set_pc(post, offset)
}

pub(crate) fn retf(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().operand_bits();
    let sp_register = semantics.mode().sp();
    let (target, sp) = semantics.pop_at(semantics.read(&sp_register), bits)?;
    let (cs, mut sp) = semantics.pop_at(sp, bits)?;
    if let Ok(operand) = semantics.operand(0) {
        let release = semantics.load_sized(operand, semantics.word())?;
        sp = Expression::add(sp, release)?.simplify();
    }
    post.write_register(&sp_register, sp)?;
    post.write_register(
        &semantics.mode().get_register("cs")?,
        Expression::extract(cs, 0, 16)?,
    )?;
    semantics.set_pc(post, target)
}

/// iret, iretd and iretq. Long mode also restores the stack pointer and ss.
pub(crate) fn iret(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().operand_bits();
    let sp_register = semantics.mode().sp();
    let (target, sp) = semantics.pop_at(semantics.read(&sp_register), bits)?;
    let (cs, sp) = semantics.pop_at(sp, bits)?;
    let (flags, sp) = semantics.pop_at(sp, bits)?;

    post.write_register(
        &semantics.mode().get_register("cs")?,
        Expression::extract(cs, 0, 16)?,
    )?;
    let eflags = semantics.mode().eflags();
    if bits == 16 {
        post.write_register(&eflags.slice(0, 16), flags)?;
    } else {
        post.write_register(&eflags, semantics.resize(flags, 32)?)?;
    }

    match semantics.mode() {
        Mode::Amd64 => {
            let (stack, sp) = semantics.pop_at(sp, bits)?;
            let (ss, _) = semantics.pop_at(sp, bits)?;
            post.write_register(&sp_register, semantics.resize(stack, 64)?)?;
            post.write_register(
                &semantics.mode().get_register("ss")?,
                Expression::extract(ss, 0, 16)?,
            )?;
        }
        Mode::X86 => post.write_register(&sp_register, sp)?,
    }
    semantics.set_pc(post, target)
}

pub(crate) fn leave(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().operand_bits();
    let bp_register = semantics.gpr(5, bits)?;
    let frame = semantics.resize(semantics.read(&semantics.mode().bp()), semantics.word())?;
    let (bp, sp) = semantics.pop_at(frame, bits)?;
    post.write_register(&semantics.mode().sp(), sp)?;
    semantics.store_register(post, &bp_register, bp)
}

pub(crate) fn enter(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let bits = semantics.instruction().operand_bits();
    let size = semantics.load_sized(semantics.operand(0)?, semantics.word())?;
    let level = semantics
        .operand(1)?
        .immediate()
        .and_then(|immediate| immediate.constant().value_u64())
        .unwrap_or(0)
        & 0x1f;
    let sp_register = semantics.mode().sp();
    let bp_register = semantics.gpr(5, bits)?;

    if level != 0 {
        // Nested frames copy a display of frame pointers.
        post.write_register(&sp_register, top(semantics.word()))?;
        return semantics.store_register(post, &bp_register, top(bits));
    }

    let bp = semantics.read(&bp_register);
    let frame = semantics.push_at(post, semantics.read(&sp_register), bp)?;
    let sp = Expression::sub(frame.clone(), size)?.simplify();
    post.write_register(&sp_register, sp)?;
    semantics.store_register(post, &bp_register, semantics.resize(frame, bits)?)
}

/// hlt, int, int1, int3, ud2 and sysenter. Execution continues somewhere
/// this state can not say.
pub(crate) fn trap(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    semantics.set_pc_top(post)
}

pub(crate) fn into(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let pc = Expression::ite(
        semantics.flag(Flag::Of),
        top(semantics.word()),
        semantics.pc_next()?,
    )?;
    semantics.set_pc(post, pc.simplify())
}

pub(crate) fn syscall(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    if semantics.mode() == Mode::Amd64 {
        let rcx = semantics.gpr(1, 64)?;
        let r11 = semantics.gpr(11, 64)?;
        post.write_register(&rcx, semantics.pc_next()?)?;
        let flags = Expression::zext(64, semantics.read(&semantics.mode().eflags()))?;
        post.write_register(&r11, flags)?;
    }
    semantics.set_pc_top(post)
}

// Strings

/// Element width of a string instruction, from the mnemonic suffix.
fn element_bits(semantics: &Semantics) -> usize {
    match semantics.mnemonic().chars().last() {
        Some('B') => 8,
        Some('W') => 16,
        Some('Q') => 64,
        _ => 32,
    }
}

/// The pieces every string instruction works with.
struct StringOperation {
    bits: usize,
    /// Distance to the next element, by the direction flag.
    delta: Expression,
    /// With a repeat prefix, whether this iteration runs.
    active: Option<Expression>,
}

impl StringOperation {
    fn new(semantics: &Semantics) -> Result<StringOperation, Error> {
        let bits = element_bits(semantics);
        let address_bits = semantics.instruction().address_bits();
        let size = (bits / 8) as u64;
        let delta = Expression::ite(
            semantics.flag(Flag::Df),
            Constant::from_i64(-(size as i64), address_bits).into(),
            constant(size, address_bits),
        )?
        .simplify();
        let active = if semantics.instruction().is_rep() {
            let counter = semantics.read(&semantics.address_register(1)?);
            let bits = counter.bits();
            Some(Expression::cmpneq(counter, constant(0, bits))?.simplify())
        } else {
            None
        };
        Ok(StringOperation {
            bits,
            delta,
            active,
        })
    }

    fn guard(&self, value: Expression, current: Expression) -> Result<Expression, Error> {
        match self.active.as_ref() {
            Some(active) => Ok(Expression::ite(active.clone(), value, current)?.simplify()),
            None => Ok(value),
        }
    }

    /// Memory at the source pointer, ds:esi unless overridden.
    fn source(&self, semantics: &Semantics) -> Result<Memory, Error> {
        let address_bits = semantics.instruction().address_bits();
        let pointer = semantics.read(&semantics.address_register(6)?);
        let segment = semantics
            .instruction()
            .segment()
            .map(|segment| segment.name().to_string())
            .filter(|name| name == "fs" || name == "gs");
        let address = Address::new(Some(pointer), None, 0, 0, segment, address_bits)?;
        Ok(Memory::new(address, self.bits))
    }

    /// Memory at the destination pointer, always es:edi.
    fn destination(&self, semantics: &Semantics) -> Result<Memory, Error> {
        let address_bits = semantics.instruction().address_bits();
        let pointer = semantics.read(&semantics.address_register(7)?);
        let address = Address::new(Some(pointer), None, 0, 0, None, address_bits)?;
        Ok(Memory::new(address, self.bits))
    }

    /// Step a pointer register by one element.
    fn step(&self, semantics: &Semantics, post: &mut StateMap, number: u8) -> Result<(), Error> {
        let register = semantics.address_register(number)?;
        let current = semantics.read(&register);
        let next = Expression::add(current.clone(), self.delta.clone())?;
        semantics.store_register(post, &register, self.guard(next, current)?)
    }

    /// With a repeat prefix, count down and branch back to this instruction
    /// while the loop continues. `condition` is the extra termination test
    /// of repz and repnz.
    fn repeat(&self, semantics: &Semantics, post: &mut StateMap, condition: Option<Expression>) -> Result<(), Error> {
        let active = match self.active.as_ref() {
            Some(active) => active.clone(),
            None => return Ok(()),
        };
        let counter_register = semantics.address_register(1)?;
        let counter = semantics.read(&counter_register);
        let bits = counter.bits();
        let next = Expression::sub(counter.clone(), constant(1, bits))?;
        semantics.store_register(post, &counter_register, self.guard(next.clone(), counter)?)?;

        let mut again = Expression::and(active, Expression::cmpneq(next, constant(0, bits))?)?;
        if let Some(condition) = condition {
            again = Expression::and(again, condition)?;
        }
        let pc = Expression::ite(again, semantics.pc(), semantics.pc_next()?)?;
        semantics.set_pc(post, pc.simplify())
    }

    /// The extra termination test of repz and repnz, over the new ZF.
    fn compare_condition(&self, semantics: &Semantics, zf: &Expression) -> Result<Option<Expression>, Error> {
        let prefixes = semantics.instruction().prefixes();
        if prefixes.contains(Prefixes::REPNE) {
            Ok(Some(Expression::not(zf.clone())?))
        } else if prefixes.contains(Prefixes::REP) {
            Ok(Some(zf.clone()))
        } else {
            Ok(None)
        }
    }
}

pub(crate) fn movs(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    // movsd with operands is the SSE scalar move.
    if semantics.operand_count() > 0 {
        return scalar_move(semantics, post);
    }
    let string = StringOperation::new(semantics)?;
    let value = semantics.state.read_memory(&string.source(semantics)?);
    let destination = string.destination(semantics)?;
    let current = semantics.state.read_memory(&destination);
    post.write_memory(&destination, string.guard(value, current)?)?;
    string.step(semantics, post, 6)?;
    string.step(semantics, post, 7)?;
    string.repeat(semantics, post, None)
}

pub(crate) fn stos(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let string = StringOperation::new(semantics)?;
    let value = semantics.read(&semantics.gpr(0, string.bits)?);
    let destination = string.destination(semantics)?;
    let current = semantics.state.read_memory(&destination);
    post.write_memory(&destination, string.guard(value, current)?)?;
    string.step(semantics, post, 7)?;
    string.repeat(semantics, post, None)
}

pub(crate) fn lods(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let string = StringOperation::new(semantics)?;
    let accumulator = semantics.gpr(0, string.bits)?;
    let value = semantics.state.read_memory(&string.source(semantics)?);
    let current = semantics.read(&accumulator);
    semantics.store_register(post, &accumulator, string.guard(value, current)?)?;
    string.step(semantics, post, 6)?;
    string.repeat(semantics, post, None)
}

fn compare_strings(
    semantics: &Semantics,
    post: &mut StateMap,
    string: &StringOperation,
    lhs: Expression,
    rhs: Expression,
) -> Result<(), Error> {
    let result = Expression::sub(lhs.clone(), rhs.clone())?;
    let flags = semantics.sub_flags(&lhs, &rhs, &result)?;
    let zf = Expression::cmpeq(result, constant(0, string.bits))?;
    let flags = match string.active.as_ref() {
        Some(active) => semantics.guard_flags(flags, active)?,
        None => flags,
    };
    semantics.write_flags(post, flags)?;
    let condition = string.compare_condition(semantics, &zf)?;
    string.repeat(semantics, post, condition)
}

pub(crate) fn scas(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let string = StringOperation::new(semantics)?;
    let accumulator = semantics.read(&semantics.gpr(0, string.bits)?);
    let value = semantics.state.read_memory(&string.destination(semantics)?);
    string.step(semantics, post, 7)?;
    compare_strings(semantics, post, &string, accumulator, value)
}

pub(crate) fn cmps(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    // cmpsd with operands is the SSE scalar compare, which this does not
    // model beyond its destination.
    if semantics.operand_count() > 0 {
        return vector_undefined(semantics, post);
    }
    let string = StringOperation::new(semantics)?;
    let source = semantics.state.read_memory(&string.source(semantics)?);
    let destination = semantics.state.read_memory(&string.destination(semantics)?);
    string.step(semantics, post, 6)?;
    string.step(semantics, post, 7)?;
    compare_strings(semantics, post, &string, source, destination)
}

pub(crate) fn ins(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let string = StringOperation::new(semantics)?;
    let destination = string.destination(semantics)?;
    let current = semantics.state.read_memory(&destination);
    post.write_memory(&destination, string.guard(top(string.bits), current)?)?;
    string.step(semantics, post, 7)?;
    string.repeat(semantics, post, None)
}

pub(crate) fn outs(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let string = StringOperation::new(semantics)?;
    string.step(semantics, post, 6)?;
    string.repeat(semantics, post, None)
}

// Input, output and processor identification

pub(crate) fn in_(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    semantics.store(post, destination, top(destination.bits()))
}

pub(crate) fn cpuid(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    for number in 0..4 {
        semantics.store_register(post, &semantics.gpr(number, 32)?, top(32))?;
    }
    Ok(())
}

pub(crate) fn rdtsc(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    semantics.store_register(post, &semantics.gpr(0, 32)?, top(32))?;
    semantics.store_register(post, &semantics.gpr(2, 32)?, top(32))
}

// x87

/// x87 instructions. The register stack is not modeled: stores write top
/// to their destination, everything else writes top to the registers it
/// names and st0.
pub(crate) fn x87(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let mnemonic = semantics.mnemonic();
    let store = ["FST", "FIST", "FNST", "FBSTP", "FISTTP"]
        .iter()
        .any(|prefix| mnemonic.starts_with(prefix));
    if store {
        if let Ok(destination) = semantics.operand(0) {
            semantics.store(post, destination, top(destination.bits()))?;
        }
        return Ok(());
    }

    let st0 = semantics.mode().get_register("st0")?;
    post.write_register(&st0, top(80))?;
    for operand in semantics.instruction().operands() {
        if let Operand::Register(ref register) = *operand {
            post.write_register(register, top(register.bits()))?;
        }
    }
    if mnemonic.starts_with("FCOMI") || mnemonic.starts_with("FUCOMI") {
        semantics.write_flags(post, undefined_flags(&[Flag::Zf, Flag::Pf, Flag::Cf]))?;
    }
    Ok(())
}

// SSE and MMX

/// Moves between vector registers, general-purpose registers and memory.
/// Narrower sources are zero-extended, wider sources truncated.
pub(crate) fn vector_move(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let value = semantics.load(semantics.operand(1)?)?;
    let value = semantics.resize(value, destination.bits())?;
    semantics.store(post, destination, value)
}

/// movss and movsd. Between registers only the low element moves; a load
/// from memory clears the rest of the register.
pub(crate) fn scalar_move(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let source = semantics.operand(1)?;
    let bits = if semantics.mnemonic() == "MOVSS" { 32 } else { 64 };
    let value = Expression::trun(bits, semantics.load(source)?)?;
    match (destination, source) {
        (Operand::Register(ref register), Operand::Register(_)) => {
            post.write_register(&register.slice(0, bits), value)
        }
        (Operand::Register(_), _) => {
            semantics.store(post, destination, Expression::zext(destination.bits(), value)?)
        }
        _ => semantics.store(post, destination, value),
    }
}

/// Bitwise vector logic, which is exact.
pub(crate) fn vector_logic(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let lhs = semantics.load(destination)?;
    let rhs = semantics.load(semantics.operand(1)?)?;
    let result = match semantics.mnemonic() {
        "ANDPS" | "ANDPD" => Expression::and(lhs, rhs)?,
        "ANDNPS" | "ANDNPD" => Expression::and(Expression::not(lhs)?, rhs)?,
        "ORPS" | "ORPD" => Expression::or(lhs, rhs)?,
        _ => Expression::xor(lhs, rhs)?,
    };
    semantics.store(post, destination, result)
}

/// Floating point arithmetic and conversions. Scalar forms write top to the
/// low element only.
pub(crate) fn vector_undefined(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let destination = semantics.operand(0)?;
    let mnemonic = semantics.mnemonic();
    let element = if mnemonic.ends_with("SS") || mnemonic == "CVTSI2SS" || mnemonic == "CVTSD2SS" {
        Some(32)
    } else if mnemonic.ends_with("SD") || mnemonic == "CVTSI2SD" || mnemonic == "CVTSS2SD" {
        Some(64)
    } else {
        None
    };
    match (destination, element) {
        (Operand::Register(ref register), Some(bits)) if register.bits() == 128 => {
            post.write_register(&register.slice(0, bits), top(bits))
        }
        _ => semantics.store(post, destination, top(destination.bits())),
    }
}

/// comiss, comisd, ucomiss and ucomisd.
pub(crate) fn vector_compare(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    let mut flags = undefined_flags(&[Flag::Zf, Flag::Pf, Flag::Cf]);
    flags.push((Flag::Of, constant(0, 1)));
    flags.push((Flag::Sf, constant(0, 1)));
    flags.push((Flag::Af, constant(0, 1)));
    semantics.write_flags(post, flags)
}

/// Fallback for mnemonics without semantics: the first operand, if it is
/// written, becomes top.
pub(crate) fn undefined(semantics: &Semantics, post: &mut StateMap) -> Result<(), Error> {
    match semantics.instruction().operand(0) {
        Some(operand) if !operand.is_immediate() => {
            semantics.store(post, operand, top(operand.bits()))
        }
        _ => Ok(()),
    }
}
