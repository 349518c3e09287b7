use crate::expr::*;
use crate::Error;
use crate::RC;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The operator of a `Composite` expression.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Divu,
    Divs,
    Modu,
    Mods,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,
    Cmpeq,
    Cmpneq,
    Cmpltu,
    Cmplts,
    Cmpleu,
    Cmples,
    Neg,
    Not,
    /// 1 when the low byte of the operand has an even number of set bits.
    Parity,
    /// Take the composite's width of bits, starting at the given offset.
    Extract(usize),
    /// Join operands, least significant operand first.
    Concat,
    /// `operands[0] ? operands[1] : operands[2]`, with a 1-bit condition.
    Ite,
}

impl Operator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Cmpeq
                | Operator::Cmpneq
                | Operator::Cmpltu
                | Operator::Cmplts
                | Operator::Cmpleu
                | Operator::Cmples
        )
    }

    fn symbol(&self) -> &'static str {
        match *self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Divu => "/",
            Operator::Divs => "./",
            Operator::Modu => "%",
            Operator::Mods => ".%",
            Operator::And => "&",
            Operator::Or => "|",
            Operator::Xor => "^",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
            Operator::Sar => ".>>",
            Operator::Cmpeq => "==",
            Operator::Cmpneq => "!=",
            Operator::Cmpltu => "<",
            Operator::Cmplts => ".<",
            Operator::Cmpleu => "<=",
            Operator::Cmples => ".<=",
            Operator::Neg => "-",
            Operator::Not => "~",
            Operator::Parity => "parity",
            Operator::Extract(_) => "extract",
            Operator::Concat => "concat",
            Operator::Ite => "?",
        }
    }
}

/// An operator applied to sub-expressions.
///
/// The width of a composite is computed once, when it is created.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Composite {
    operator: Operator,
    operands: Vec<RC<Expression>>,
    bits: usize,
}

impl Composite {
    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn operands(&self) -> &[RC<Expression>] {
        &self.operands
    }

    pub fn bits(&self) -> usize {
        self.bits
    }
}

/// An expression over machine state.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Expression {
    Constant(Constant),
    Register(Register),
    Memory(Memory),
    Composite(Composite),
    /// Nothing is known about this value, beyond its width.
    Top(usize),
}

impl Expression {
    /// Return the bitness of this expression.
    pub fn bits(&self) -> usize {
        match *self {
            Expression::Constant(ref constant) => constant.bits(),
            Expression::Register(ref register) => register.bits(),
            Expression::Memory(ref memory) => memory.bits(),
            Expression::Composite(ref composite) => composite.bits,
            Expression::Top(bits) => bits,
        }
    }

    /// If this expression is a constant, get the constant.
    pub fn get_constant(&self) -> Option<&Constant> {
        match *self {
            Expression::Constant(ref constant) => Some(constant),
            _ => None,
        }
    }

    pub fn get_composite(&self) -> Option<&Composite> {
        match *self {
            Expression::Composite(ref composite) => Some(composite),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expression::Constant(_))
    }

    pub fn is_top(&self) -> bool {
        matches!(self, Expression::Top(_))
    }

    /// True if top appears anywhere in this expression.
    pub fn contains_top(&self) -> bool {
        match *self {
            Expression::Top(_) => true,
            Expression::Composite(ref composite) => {
                composite.operands.iter().any(|operand| operand.contains_top())
            }
            Expression::Memory(ref memory) => memory
                .address()
                .base()
                .into_iter()
                .chain(memory.address().index())
                .any(|expression| expression.contains_top()),
            Expression::Constant(_) | Expression::Register(_) => false,
        }
    }

    /// All registers read by this expression, including registers used in
    /// memory addresses.
    pub fn registers(&self) -> Vec<&Register> {
        let mut registers = Vec::new();
        self.collect_registers(&mut registers);
        registers
    }

    fn collect_registers<'e>(&'e self, registers: &mut Vec<&'e Register>) {
        match *self {
            Expression::Register(ref register) => registers.push(register),
            Expression::Memory(ref memory) => {
                if let Some(base) = memory.address().base() {
                    base.collect_registers(registers);
                }
                if let Some(index) = memory.address().index() {
                    index.collect_registers(registers);
                }
            }
            Expression::Composite(ref composite) => {
                for operand in composite.operands.iter() {
                    operand.collect_registers(registers);
                }
            }
            Expression::Constant(_) | Expression::Top(_) => {}
        }
    }

    /// Create a new `Expression` from a `Constant`.
    pub fn constant(constant: Constant) -> Expression {
        Expression::Constant(constant)
    }

    /// Create a new `Expression` from a `Register`.
    pub fn register(register: Register) -> Expression {
        Expression::Register(register)
    }

    /// Create a new `Expression` from a `Memory` reference.
    pub fn memory(memory: Memory) -> Expression {
        Expression::Memory(memory)
    }

    /// Create a new top `Expression` of the given width.
    pub fn top(bits: usize) -> Expression {
        Expression::Top(bits)
    }

    // Unchecked. Callers guarantee operand widths agree with `operator`.
    pub(crate) fn composite(
        operator: Operator,
        operands: Vec<Expression>,
        bits: usize,
    ) -> Expression {
        Expression::Composite(Composite {
            operator,
            operands: operands.into_iter().map(RC::new).collect(),
            bits,
        })
    }

    pub(crate) fn composite_rc(
        operator: Operator,
        operands: Vec<RC<Expression>>,
        bits: usize,
    ) -> Expression {
        Expression::Composite(Composite {
            operator,
            operands,
            bits,
        })
    }

    fn ensure_sort(lhs: &Expression, rhs: &Expression) -> Result<(), Error> {
        if lhs.bits() != rhs.bits() {
            Err(Error::Sort)
        } else {
            Ok(())
        }
    }

    fn binary(operator: Operator, lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::ensure_sort(&lhs, &rhs)?;
        let bits = lhs.bits();
        Ok(Expression::composite(operator, vec![lhs, rhs], bits))
    }

    fn compare(operator: Operator, lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::ensure_sort(&lhs, &rhs)?;
        Ok(Expression::composite(operator, vec![lhs, rhs], 1))
    }

    /// Create an addition `Expression`.
    /// # Error
    /// The sort of the lhs and the rhs are not the same.
    pub fn add(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::binary(Operator::Add, lhs, rhs)
    }

    /// Create a subtraction `Expression`.
    /// # Error
    /// The sort of the lhs and the rhs are not the same.
    pub fn sub(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::binary(Operator::Sub, lhs, rhs)
    }

    /// Create a multiplication `Expression`. The result is truncated to the
    /// width of the operands.
    pub fn mul(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::binary(Operator::Mul, lhs, rhs)
    }

    /// Create an unsigned division `Expression`.
    pub fn divu(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::binary(Operator::Divu, lhs, rhs)
    }

    /// Create a signed division `Expression`, rounding toward zero.
    pub fn divs(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::binary(Operator::Divs, lhs, rhs)
    }

    /// Create an unsigned modulus `Expression`.
    pub fn modu(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::binary(Operator::Modu, lhs, rhs)
    }

    /// Create a signed modulus `Expression`.
    pub fn mods(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::binary(Operator::Mods, lhs, rhs)
    }

    pub fn and(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::binary(Operator::And, lhs, rhs)
    }

    pub fn or(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::binary(Operator::Or, lhs, rhs)
    }

    pub fn xor(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::binary(Operator::Xor, lhs, rhs)
    }

    /// Create a logical shift-left `Expression`. Shifting by the width of
    /// `lhs` or more gives zero.
    pub fn shl(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::binary(Operator::Shl, lhs, rhs)
    }

    /// Create a logical shift-right `Expression`.
    pub fn shr(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::binary(Operator::Shr, lhs, rhs)
    }

    /// Create an arithmetic shift-right `Expression`.
    pub fn sar(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::binary(Operator::Sar, lhs, rhs)
    }

    /// Create an equals comparison `Expression`, 1 bit wide.
    pub fn cmpeq(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::compare(Operator::Cmpeq, lhs, rhs)
    }

    pub fn cmpneq(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::compare(Operator::Cmpneq, lhs, rhs)
    }

    /// Create an unsigned less-than comparison `Expression`.
    pub fn cmpltu(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::compare(Operator::Cmpltu, lhs, rhs)
    }

    /// Create a signed less-than comparison `Expression`.
    pub fn cmplts(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::compare(Operator::Cmplts, lhs, rhs)
    }

    pub fn cmpleu(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::compare(Operator::Cmpleu, lhs, rhs)
    }

    pub fn cmples(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::compare(Operator::Cmples, lhs, rhs)
    }

    /// Two's complement negation.
    pub fn neg(src: Expression) -> Result<Expression, Error> {
        let bits = src.bits();
        Ok(Expression::composite(Operator::Neg, vec![src], bits))
    }

    pub fn not(src: Expression) -> Result<Expression, Error> {
        let bits = src.bits();
        Ok(Expression::composite(Operator::Not, vec![src], bits))
    }

    /// Even parity of the low byte of `src`, 1 bit wide.
    pub fn parity(src: Expression) -> Result<Expression, Error> {
        Ok(Expression::composite(Operator::Parity, vec![src], 1))
    }

    /// Take `bits` bits of `src`, starting at bit `offset`.
    /// # Error
    /// The range does not fit inside `src`, or `bits` is 0.
    pub fn extract(src: Expression, offset: usize, bits: usize) -> Result<Expression, Error> {
        if bits == 0 {
            return Err(Error::ZeroWidth);
        }
        if offset + bits > src.bits() {
            return Err(Error::InvalidExtract {
                offset,
                end: offset + bits,
                bits: src.bits(),
            });
        }
        Ok(Expression::composite(
            Operator::Extract(offset),
            vec![src],
            bits,
        ))
    }

    /// Join expressions, least significant part first.
    pub fn concat(parts: Vec<Expression>) -> Result<Expression, Error> {
        if parts.is_empty() {
            return Err(Error::ZeroWidth);
        }
        let bits = parts.iter().map(|part| part.bits()).sum();
        Ok(Expression::composite(Operator::Concat, parts, bits))
    }

    /// Conditional select.
    /// # Error
    /// `condition` is not 1 bit wide, or the sorts of the branches differ.
    pub fn ite(
        condition: Expression,
        then: Expression,
        else_: Expression,
    ) -> Result<Expression, Error> {
        if condition.bits() != 1 {
            return Err(Error::Sort);
        }
        Expression::ensure_sort(&then, &else_)?;
        let bits = then.bits();
        Ok(Expression::composite(
            Operator::Ite,
            vec![condition, then, else_],
            bits,
        ))
    }

    /// Truncate `src` to `bits`.
    pub fn trun(bits: usize, src: Expression) -> Result<Expression, Error> {
        if bits == src.bits() {
            return Ok(src);
        }
        Expression::extract(src, 0, bits)
    }

    /// Zero-extend `src` to `bits`. The high bits are an explicit constant 0.
    pub fn zext(bits: usize, src: Expression) -> Result<Expression, Error> {
        if bits == src.bits() {
            Ok(src)
        } else if bits < src.bits() {
            Err(Error::Sort)
        } else {
            let high = bits - src.bits();
            Expression::concat(vec![src, expr_const(0, high)])
        }
    }

    /// Sign-extend `src` to `bits`. The high bits select between all ones
    /// and zero on the sign bit of `src`.
    pub fn sext(bits: usize, src: Expression) -> Result<Expression, Error> {
        if bits == src.bits() {
            Ok(src)
        } else if bits < src.bits() {
            Err(Error::Sort)
        } else {
            let high = bits - src.bits();
            let sign = Expression::extract(src.clone(), src.bits() - 1, 1)?;
            let fill = Expression::ite(
                sign,
                Constant::ones(high).with_signed(true).into(),
                expr_const(0, high),
            )?;
            Expression::concat(vec![src, fill])
        }
    }
}

impl From<Constant> for Expression {
    fn from(constant: Constant) -> Expression {
        Expression::Constant(constant)
    }
}

impl From<Register> for Expression {
    fn from(register: Register) -> Expression {
        Expression::Register(register)
    }
}

impl From<Memory> for Expression {
    fn from(memory: Memory) -> Expression {
        Expression::Memory(memory)
    }
}

impl fmt::Display for Composite {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let operands = &self.operands;
        match self.operator {
            Operator::Add => match operands[1].get_constant() {
                Some(constant) if constant.bits() > 1 && constant.msb() => {
                    write!(f, "({}-{})", operands[0], constant.neg().with_signed(false))
                }
                _ => write!(f, "({}+{})", operands[0], operands[1]),
            },
            Operator::Neg | Operator::Not => {
                write!(f, "({}{})", self.operator.symbol(), operands[0])
            }
            Operator::Parity => write!(f, "parity({})", operands[0]),
            Operator::Extract(offset) => {
                write!(f, "{}[{}:{}]", operands[0], offset, offset + self.bits)
            }
            Operator::Concat => {
                write!(f, "{{ |")?;
                let mut offset = 0;
                for operand in operands.iter() {
                    write!(f, " [{}:{}]->{} |", offset, offset + operand.bits(), operand)?;
                    offset += operand.bits();
                }
                write!(f, " }}")
            }
            Operator::Ite => write!(
                f,
                "({} ? {} : {})",
                operands[0], operands[1], operands[2]
            ),
            operator => write!(
                f,
                "({}{}{})",
                operands[0],
                operator.symbol(),
                operands[1]
            ),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Expression::Constant(ref constant) => constant.fmt(f),
            Expression::Register(ref register) => register.fmt(f),
            Expression::Memory(ref memory) => memory.fmt(f),
            Expression::Composite(ref composite) => composite.fmt(f),
            Expression::Top(bits) => write!(f, "top{}", bits),
        }
    }
}
