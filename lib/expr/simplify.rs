//! Bottom-up rewriting of expressions into a simpler, canonical form.
//!
//! `simplify` folds constants, absorbs top, removes identities, moves
//! constants to the right of commutative operators and reassociates constant
//! offsets, composes extracts and projects them through concatenations, and
//! merges adjacent pieces of concatenations.

use crate::expr::*;
use crate::RC;
use log::debug;

/// Upper bound on whole-tree passes. Each pass rewrites bottom-up, so nested
/// rewrites settle within a few passes.
const MAX_PASSES: usize = 64;

impl Expression {
    /// Simplify this expression. The result is a fixpoint of the rewrite
    /// rules, so simplifying it again returns it unchanged.
    pub fn simplify(&self) -> Expression {
        let mut expression = simplify_expression(self);
        for _ in 0..MAX_PASSES {
            let next = simplify_expression(&expression);
            if next == expression {
                return expression;
            }
            expression = next;
        }
        debug!(
            "simplify stopped after {} passes without a fixpoint: {}",
            MAX_PASSES, expression
        );
        expression
    }
}

fn simplify_expression(expression: &Expression) -> Expression {
    match *expression {
        Expression::Composite(ref composite) => {
            let operands = composite
                .operands()
                .iter()
                .map(|operand| simplify_expression(operand))
                .collect::<Vec<Expression>>();
            rewrite(composite.operator(), operands, composite.bits())
        }
        Expression::Register(ref register) => {
            if register.is_full() {
                expression.clone()
            } else {
                rewrite(
                    Operator::Extract(register.offset()),
                    vec![Expression::Register(register.full())],
                    register.bits(),
                )
            }
        }
        Expression::Memory(ref memory) => {
            let address = memory.address();
            match address.replace(address.base().cloned(), address.index().cloned()) {
                Ok(address) => Memory::new(address, memory.bits()).into(),
                Err(_) => expression.clone(),
            }
        }
        Expression::Constant(_) | Expression::Top(_) => expression.clone(),
    }
}

/// Operands of `expression` if it is a composite of `operator`.
fn operands_of(expression: &Expression, operator: Operator) -> Option<&[RC<Expression>]> {
    match expression.get_composite() {
        Some(composite) if composite.operator() == operator => Some(composite.operands()),
        _ => None,
    }
}

fn is_zero(expression: &Expression) -> bool {
    expression.get_constant().map(|c| c.is_zero()).unwrap_or(false)
}

fn is_one(expression: &Expression) -> bool {
    expression.get_constant().map(|c| c.is_one()).unwrap_or(false)
}

fn is_ones(expression: &Expression) -> bool {
    expression.get_constant().map(|c| c.is_ones()).unwrap_or(false)
}

fn zero(bits: usize) -> Expression {
    expr_const(0, bits)
}

fn bool_const(value: bool) -> Expression {
    Constant::from_bool(value).into()
}

fn is_commutative(operator: Operator) -> bool {
    matches!(
        operator,
        Operator::Add
            | Operator::Mul
            | Operator::And
            | Operator::Or
            | Operator::Xor
            | Operator::Cmpeq
            | Operator::Cmpneq
    )
}

/// Evaluate an operator over constant operands. `None` when the result is
/// undefined, such as division by zero.
pub(crate) fn fold(operator: Operator, constants: &[&Constant], bits: usize) -> Option<Constant> {
    let c = constants;
    Some(match operator {
        Operator::Add => c[0].add(c[1]),
        Operator::Sub => c[0].sub(c[1]),
        Operator::Mul => c[0].mul(c[1]),
        Operator::Divu => c[0].divu(c[1])?,
        Operator::Divs => c[0].divs(c[1])?,
        Operator::Modu => c[0].modu(c[1])?,
        Operator::Mods => c[0].mods(c[1])?,
        Operator::And => c[0].and(c[1]),
        Operator::Or => c[0].or(c[1]),
        Operator::Xor => c[0].xor(c[1]),
        Operator::Shl => c[0].shl(c[1]),
        Operator::Shr => c[0].shr(c[1]),
        Operator::Sar => c[0].sar(c[1]),
        Operator::Cmpeq => c[0].cmpeq(c[1]),
        Operator::Cmpneq => c[0].cmpneq(c[1]),
        Operator::Cmpltu => c[0].cmpltu(c[1]),
        Operator::Cmplts => c[0].cmplts(c[1]),
        Operator::Cmpleu => c[0].cmpleu(c[1]),
        Operator::Cmples => c[0].cmples(c[1]),
        Operator::Neg => c[0].neg(),
        Operator::Not => c[0].not(),
        Operator::Parity => c[0].parity(),
        Operator::Extract(offset) => c[0].extract(offset, bits),
        Operator::Concat => c
            .iter()
            .skip(1)
            .fold(c[0].clone(), |value, part| value.concat(part)),
        Operator::Ite => {
            if c[0].is_one() {
                c[1].clone()
            } else {
                c[2].clone()
            }
        }
    })
}

/// Rewrite a node whose operands are already simplified.
fn rewrite(operator: Operator, mut operands: Vec<Expression>, bits: usize) -> Expression {
    if operator == Operator::Concat {
        return rewrite_concat(operands, bits);
    }

    if operands.iter().any(|operand| operand.is_top()) {
        return absorb_top(operator, operands, bits);
    }

    if operands.iter().all(|operand| operand.is_constant()) {
        let constants = operands
            .iter()
            .filter_map(|operand| operand.get_constant())
            .collect::<Vec<&Constant>>();
        return match fold(operator, &constants, bits) {
            Some(constant) => constant.into(),
            None => Expression::top(bits),
        };
    }

    if is_commutative(operator) && operands[0].is_constant() {
        operands.swap(0, 1);
    }

    match operator {
        Operator::Add => rewrite_add(operands, bits),
        Operator::Sub => {
            if operands[0] == operands[1] {
                zero(bits)
            } else if let Some(constant) = operands[1].get_constant() {
                let negated = constant.neg().into();
                rewrite(Operator::Add, vec![operands.swap_remove(0), negated], bits)
            } else if is_zero(&operands[0]) {
                rewrite(Operator::Neg, vec![operands.swap_remove(1)], bits)
            } else {
                Expression::composite(operator, operands, bits)
            }
        }
        Operator::Mul => {
            if is_zero(&operands[1]) {
                zero(bits)
            } else if is_one(&operands[1]) {
                operands.swap_remove(0)
            } else {
                reassociate(operator, operands, bits)
            }
        }
        Operator::Divu | Operator::Divs => {
            if is_one(&operands[1]) {
                operands.swap_remove(0)
            } else {
                Expression::composite(operator, operands, bits)
            }
        }
        Operator::Modu | Operator::Mods => {
            if is_one(&operands[1]) {
                zero(bits)
            } else {
                Expression::composite(operator, operands, bits)
            }
        }
        Operator::And => {
            if is_zero(&operands[1]) {
                zero(bits)
            } else if is_ones(&operands[1]) || operands[0] == operands[1] {
                operands.swap_remove(0)
            } else {
                reassociate(operator, operands, bits)
            }
        }
        Operator::Or => {
            if is_ones(&operands[1]) {
                operands.swap_remove(1)
            } else if is_zero(&operands[1]) || operands[0] == operands[1] {
                operands.swap_remove(0)
            } else {
                reassociate(operator, operands, bits)
            }
        }
        Operator::Xor => {
            if operands[0] == operands[1] {
                zero(bits)
            } else if is_zero(&operands[1]) {
                operands.swap_remove(0)
            } else {
                reassociate(operator, operands, bits)
            }
        }
        Operator::Shl | Operator::Shr | Operator::Sar => {
            if is_zero(&operands[1]) {
                return operands.swap_remove(0);
            }
            if is_zero(&operands[0]) {
                return zero(bits);
            }
            let saturated = operands[1]
                .get_constant()
                .map(|count| count.value() >= &num_bigint::BigUint::from(bits))
                .unwrap_or(false);
            if saturated && operator != Operator::Sar {
                zero(bits)
            } else {
                Expression::composite(operator, operands, bits)
            }
        }
        Operator::Cmpeq | Operator::Cmpneq => rewrite_equality(operator, operands),
        Operator::Cmpltu => {
            if operands[0] == operands[1] || is_zero(&operands[1]) {
                bool_const(false)
            } else if is_zero(&operands[0]) {
                let rhs_bits = operands[1].bits();
                rewrite(Operator::Cmpneq, vec![operands.swap_remove(1), zero(rhs_bits)], 1)
            } else {
                Expression::composite(operator, operands, 1)
            }
        }
        Operator::Cmpleu => {
            if operands[0] == operands[1] || is_zero(&operands[0]) {
                bool_const(true)
            } else {
                Expression::composite(operator, operands, 1)
            }
        }
        Operator::Cmplts => {
            if operands[0] == operands[1] {
                bool_const(false)
            } else {
                Expression::composite(operator, operands, 1)
            }
        }
        Operator::Cmples => {
            if operands[0] == operands[1] {
                bool_const(true)
            } else {
                Expression::composite(operator, operands, 1)
            }
        }
        Operator::Neg => match operands_of(&operands[0], Operator::Neg) {
            Some(inner) => inner[0].as_ref().clone(),
            None => Expression::composite(operator, operands, bits),
        },
        Operator::Not => {
            if let Some(inner) = operands_of(&operands[0], Operator::Not) {
                return inner[0].as_ref().clone();
            }
            if let Some(inner) = operands_of(&operands[0], Operator::Cmpeq) {
                return Expression::composite_rc(Operator::Cmpneq, inner.to_vec(), 1);
            }
            if let Some(inner) = operands_of(&operands[0], Operator::Cmpneq) {
                return Expression::composite_rc(Operator::Cmpeq, inner.to_vec(), 1);
            }
            Expression::composite(operator, operands, bits)
        }
        Operator::Parity => Expression::composite(operator, operands, bits),
        Operator::Extract(offset) => rewrite_extract(offset, operands.swap_remove(0), bits),
        Operator::Ite => rewrite_ite(operands, bits),
        Operator::Concat => rewrite_concat(operands, bits),
    }
}

fn absorb_top(operator: Operator, operands: Vec<Expression>, bits: usize) -> Expression {
    match operator {
        Operator::And | Operator::Mul if operands.iter().any(is_zero) => zero(bits),
        Operator::Or if operands.iter().any(is_ones) => Constant::ones(bits).into(),
        Operator::Ite => match operands[0].get_constant() {
            Some(condition) => {
                if condition.is_one() {
                    operands[1].clone()
                } else {
                    operands[2].clone()
                }
            }
            None => Expression::top(bits),
        },
        _ => Expression::top(bits),
    }
}

fn rewrite_add(mut operands: Vec<Expression>, bits: usize) -> Expression {
    if is_zero(&operands[1]) {
        return operands.swap_remove(0);
    }
    if let Some(rhs) = operands[1].get_constant() {
        if let Some(inner) = operands_of(&operands[0], Operator::Add) {
            if let Some(lhs) = inner[1].get_constant() {
                let sum = lhs.add(rhs).into();
                return rewrite(Operator::Add, vec![inner[0].as_ref().clone(), sum], bits);
            }
        }
    }
    Expression::composite(Operator::Add, operands, bits)
}

/// `(x op c1) op c2` into `x op (c1 op c2)` for associative operators.
fn reassociate(operator: Operator, operands: Vec<Expression>, bits: usize) -> Expression {
    if let Some(rhs) = operands[1].get_constant() {
        if let Some(inner) = operands_of(&operands[0], operator) {
            if let Some(lhs) = inner[1].get_constant() {
                if let Some(constant) = fold(operator, &[lhs, rhs], bits) {
                    return rewrite(
                        operator,
                        vec![inner[0].as_ref().clone(), constant.into()],
                        bits,
                    );
                }
            }
        }
    }
    Expression::composite(operator, operands, bits)
}

fn rewrite_equality(operator: Operator, operands: Vec<Expression>) -> Expression {
    let equal = operator == Operator::Cmpeq;

    if operands[0] == operands[1] {
        return bool_const(equal);
    }

    if let Some(rhs) = operands[1].get_constant() {
        // (x + c1) == c2  ->  x == c2 - c1
        if let Some(inner) = operands_of(&operands[0], Operator::Add) {
            if let Some(lhs) = inner[1].get_constant() {
                let rhs = rhs.sub(lhs).into();
                return rewrite(operator, vec![inner[0].as_ref().clone(), rhs], 1);
            }
        }

        // A 1-bit value compared with a constant is the value or its inverse.
        if operands[0].bits() == 1 {
            return if rhs.is_one() == equal {
                operands[0].clone()
            } else {
                rewrite(Operator::Not, vec![operands[0].clone()], 1)
            };
        }

        // Comparisons of a select between constants select between results.
        if let Some(ite) = operands_of(&operands[0], Operator::Ite) {
            if let (Some(then), Some(else_)) = (ite[1].get_constant(), ite[2].get_constant()) {
                let then = (then == rhs) == equal;
                let else_ = (else_ == rhs) == equal;
                return rewrite(
                    Operator::Ite,
                    vec![ite[0].as_ref().clone(), bool_const(then), bool_const(else_)],
                    1,
                );
            }
        }
    }

    Expression::composite(operator, operands, 1)
}

fn rewrite_extract(offset: usize, src: Expression, bits: usize) -> Expression {
    if offset == 0 && bits == src.bits() {
        return src;
    }

    if let Some(composite) = src.get_composite() {
        match composite.operator() {
            Operator::Extract(inner_offset) => {
                return rewrite(
                    Operator::Extract(inner_offset + offset),
                    vec![composite.operands()[0].as_ref().clone()],
                    bits,
                );
            }
            Operator::Concat => {
                let mut pieces = Vec::new();
                let mut part_offset = 0;
                let end = offset + bits;
                for part in composite.operands() {
                    let part_end = part_offset + part.bits();
                    if part_end > offset && part_offset < end {
                        let low = offset.max(part_offset);
                        let high = end.min(part_end);
                        pieces.push(rewrite(
                            Operator::Extract(low - part_offset),
                            vec![part.as_ref().clone()],
                            high - low,
                        ));
                    }
                    part_offset = part_end;
                }
                return if pieces.len() == 1 {
                    pieces.remove(0)
                } else {
                    rewrite_concat(pieces, bits)
                };
            }
            Operator::Ite => {
                let operands = composite.operands();
                if operands[1].is_constant() && operands[2].is_constant() {
                    let then = rewrite_extract(offset, operands[1].as_ref().clone(), bits);
                    let else_ = rewrite_extract(offset, operands[2].as_ref().clone(), bits);
                    return rewrite(
                        Operator::Ite,
                        vec![operands[0].as_ref().clone(), then, else_],
                        bits,
                    );
                }
            }
            _ => {}
        }
    }

    Expression::composite(Operator::Extract(offset), vec![src], bits)
}

fn rewrite_ite(mut operands: Vec<Expression>, bits: usize) -> Expression {
    if let Some(condition) = operands[0].get_constant() {
        return if condition.is_one() {
            operands.swap_remove(1)
        } else {
            operands.swap_remove(2)
        };
    }
    if operands[1] == operands[2] {
        return operands.swap_remove(1);
    }
    if bits == 1 {
        if is_one(&operands[1]) && is_zero(&operands[2]) {
            return operands.swap_remove(0);
        }
        if is_zero(&operands[1]) && is_one(&operands[2]) {
            return rewrite(Operator::Not, vec![operands.swap_remove(0)], 1);
        }
    }
    if let Some(inner) = operands_of(&operands[0], Operator::Not) {
        let condition = inner[0].as_ref().clone();
        let else_ = operands.swap_remove(2);
        let then = operands.swap_remove(1);
        return rewrite(Operator::Ite, vec![condition, else_, then], bits);
    }
    Expression::composite(Operator::Ite, operands, bits)
}

/// If `expression` is a slice of something, the source, offset and width.
fn as_slice(expression: &Expression) -> Option<(&Expression, usize, usize)> {
    match expression.get_composite() {
        Some(composite) => match composite.operator() {
            Operator::Extract(offset) => Some((
                composite.operands()[0].as_ref(),
                offset,
                composite.bits(),
            )),
            _ => None,
        },
        None => None,
    }
}

fn merge_parts(low: &Expression, high: &Expression) -> Option<Expression> {
    if let (Some(low), Some(high)) = (low.get_constant(), high.get_constant()) {
        return Some(low.concat(high).into());
    }
    if let (Expression::Top(low), Expression::Top(high)) = (low, high) {
        return Some(Expression::top(low + high));
    }
    let (low_src, low_offset, low_bits) = as_slice(low)?;
    let (high_src, high_offset, high_bits) = as_slice(high)?;
    if low_src == high_src && low_offset + low_bits == high_offset {
        return Some(rewrite_extract(
            low_offset,
            low_src.clone(),
            low_bits + high_bits,
        ));
    }
    None
}

fn rewrite_concat(operands: Vec<Expression>, bits: usize) -> Expression {
    let mut parts: Vec<Expression> = Vec::new();

    let mut flattened = Vec::new();
    for operand in operands {
        match operands_of(&operand, Operator::Concat) {
            Some(inner) => flattened.extend(inner.iter().map(|part| part.as_ref().clone())),
            None => flattened.push(operand),
        }
    }

    for part in flattened {
        let merged = match parts.last() {
            Some(last) => merge_parts(last, &part),
            None => None,
        };
        match merged {
            Some(merged) => {
                parts.pop();
                parts.push(merged);
            }
            None => parts.push(part),
        }
    }

    if parts.len() == 1 {
        parts.remove(0)
    } else {
        Expression::composite(Operator::Concat, parts, bits)
    }
}
