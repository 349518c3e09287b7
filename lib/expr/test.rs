use crate::expr::*;
use crate::Error;

fn eax() -> Expression {
    expr_register("eax", 32)
}

fn edx() -> Expression {
    expr_register("edx", 32)
}

#[test]
fn constant_masking() {
    let constant = Constant::new(0x1ff, 8);
    assert_eq!(constant.value_u64(), Some(0xff));
    assert_eq!(Constant::from_i64(-1, 8).value_u64(), Some(0xff));
    assert_eq!(Constant::from_i64(-4, 32), Constant::new(0xffff_fffc, 32));
    assert_eq!(Constant::new(0xffff_fffc, 32).value_i64(), Some(-4));
}

#[test]
fn constant_display() {
    assert_eq!(Constant::new(0x10, 32).to_string(), "0x10");
    assert_eq!(Constant::from_i64(-1, 8).to_string(), "-0x1");
    assert_eq!(Constant::from_i64(4, 8).to_string(), "0x4");
}

#[test]
fn constant_wide() {
    let low = Constant::new(u64::MAX, 64);
    let wide = low.concat(&Constant::new(1, 64));
    assert_eq!(wide.bits(), 128);
    assert_eq!(wide.extract(64, 64).value_u64(), Some(1));
    assert_eq!(wide.add(&Constant::new(1, 128)).extract(64, 64).value_u64(), Some(2));
}

#[test]
fn constant_signed_arithmetic() {
    let minus_seven = Constant::from_i64(-7, 32);
    let two = Constant::new(2, 32);
    assert_eq!(minus_seven.divs(&two).unwrap().value_i64(), Some(-3));
    assert_eq!(minus_seven.mods(&two).unwrap().value_i64(), Some(-1));
    assert_eq!(minus_seven.sar(&Constant::new(1, 32)).value_i64(), Some(-4));
    assert!(minus_seven.divu(&Constant::new(0, 32)).is_none());
    assert!(minus_seven.cmplts(&two).is_one());
    assert!(minus_seven.cmpltu(&two).is_zero());
}

#[test]
fn constant_zero_width() {
    assert!(matches!(
        Constant::checked(1u32.into(), 0),
        Err(Error::ZeroWidth)
    ));
    assert_eq!(
        Constant::checked(0x1ffu32.into(), 8).unwrap(),
        Constant::new(0xff, 8)
    );

    let json = serde_json::to_string(&Constant::new(1, 8)).unwrap();
    assert!(serde_json::from_str::<Constant>(&json).is_ok());
    let json = json.replace("\"bits\":8", "\"bits\":0");
    assert!(serde_json::from_str::<Constant>(&json).is_err());
}

#[test]
fn constant_parity() {
    assert!(Constant::new(0b11, 8).parity().is_one());
    assert!(Constant::new(0b111, 8).parity().is_zero());
    assert!(Constant::new(0x100, 32).parity().is_one());
}

#[test]
fn sort_checks() {
    assert!(matches!(
        Expression::add(eax(), expr_const(1, 8)),
        Err(Error::Sort)
    ));
    assert!(matches!(
        Expression::extract(eax(), 24, 16),
        Err(Error::InvalidExtract { .. })
    ));
    assert!(Expression::ite(eax(), eax(), eax()).is_err());
    assert!(Expression::zext(16, eax()).is_err());
}

#[test]
fn composite_widths() {
    assert_eq!(Expression::add(eax(), edx()).unwrap().bits(), 32);
    assert_eq!(Expression::cmpeq(eax(), edx()).unwrap().bits(), 1);
    assert_eq!(Expression::extract(eax(), 8, 8).unwrap().bits(), 8);
    assert_eq!(Expression::concat(vec![eax(), edx()]).unwrap().bits(), 64);
    assert_eq!(Expression::zext(64, eax()).unwrap().bits(), 64);
    assert_eq!(Expression::sext(64, eax()).unwrap().bits(), 64);
    assert_eq!(Expression::parity(eax()).unwrap().bits(), 1);
}

#[test]
fn fold_constants() {
    let expression = Expression::mul(
        Expression::add(expr_const(3, 32), expr_const(4, 32)).unwrap(),
        expr_const(6, 32),
    )
    .unwrap();
    assert_eq!(expression.simplify(), expr_const(42, 32));

    let wrapped = Expression::sub(expr_const(0, 32), expr_const(4, 32)).unwrap();
    assert_eq!(wrapped.simplify(), expr_const(0xffff_fffc, 32));
}

#[test]
fn division_by_zero_is_top() {
    let expression = Expression::divu(expr_const(3, 32), expr_const(0, 32)).unwrap();
    assert_eq!(expression.simplify(), top(32));
}

#[test]
fn top_absorbs() {
    let expression = Expression::add(eax(), top(32)).unwrap();
    assert_eq!(expression.simplify(), top(32));

    let expression = Expression::cmpeq(top(32), edx()).unwrap();
    assert_eq!(expression.simplify(), top(1));

    let nested = Expression::xor(Expression::neg(top(32)).unwrap(), eax()).unwrap();
    assert_eq!(nested.simplify(), top(32));
}

#[test]
fn top_short_circuits() {
    let expression = Expression::and(top(32), expr_const(0, 32)).unwrap();
    assert_eq!(expression.simplify(), expr_const(0, 32));

    let expression = Expression::or(top(8), expr_const(0xff, 8)).unwrap();
    assert_eq!(expression.simplify(), expr_const(0xff, 8));

    let expression = Expression::ite(expr_const(1, 1), eax(), top(32)).unwrap();
    assert_eq!(expression.simplify(), eax());
}

#[test]
fn concat_keeps_known_parts_beside_top() {
    let expression = Expression::concat(vec![
        Expression::extract(eax(), 0, 8).unwrap(),
        top(8),
        top(16),
    ])
    .unwrap();
    let simplified = expression.simplify();
    assert_eq!(
        Expression::extract(simplified.clone(), 0, 8).unwrap().simplify().to_string(),
        "eax[0:8]"
    );
    assert_eq!(
        Expression::extract(simplified, 8, 24).unwrap().simplify(),
        top(24)
    );
}

#[test]
fn identities() {
    let zero = expr_const(0, 32);
    assert_eq!(Expression::add(eax(), zero.clone()).unwrap().simplify(), eax());
    assert_eq!(Expression::sub(eax(), zero.clone()).unwrap().simplify(), eax());
    assert_eq!(Expression::or(eax(), zero.clone()).unwrap().simplify(), eax());
    assert_eq!(Expression::xor(eax(), eax()).unwrap().simplify(), zero);
    assert_eq!(Expression::sub(eax(), eax()).unwrap().simplify(), zero);
    assert_eq!(
        Expression::and(eax(), expr_const(0xffff_ffff, 32)).unwrap().simplify(),
        eax()
    );
    assert_eq!(
        Expression::shl(eax(), expr_const(32, 32)).unwrap().simplify(),
        zero
    );
}

#[test]
fn offsets_reassociate() {
    let ebp = expr_register("ebp", 32);
    let expression = Expression::add(
        Expression::add(ebp.clone(), expr_const(4, 32)).unwrap(),
        expr_const(4, 32),
    )
    .unwrap();
    assert_eq!(expression.simplify().to_string(), "(ebp+0x8)");

    let expression = Expression::add(
        Expression::sub(ebp.clone(), expr_const(4, 32)).unwrap(),
        expr_const(4, 32),
    )
    .unwrap();
    assert_eq!(expression.simplify(), ebp);

    let expression = Expression::sub(expr_register("esp", 32), expr_const(4, 32)).unwrap();
    assert_eq!(expression.simplify().to_string(), "(esp-0x4)");
}

#[test]
fn comparison_display() {
    let expression = Expression::cmpeq(
        Expression::sub(edx(), expr_const(0, 32)).unwrap(),
        expr_const(0, 32),
    )
    .unwrap();
    assert_eq!(expression.simplify().to_string(), "(edx==0x0)");

    let expression = Expression::cmpeq(
        Expression::add(edx(), expr_const(0xffff_fffb, 32)).unwrap(),
        expr_const(0, 32),
    )
    .unwrap();
    assert_eq!(expression.simplify().to_string(), "(edx==0x5)");
}

#[test]
fn one_bit_comparisons_collapse() {
    let zf = Expression::extract(expr_register("eflags", 32), 6, 1).unwrap();
    let expression = Expression::cmpeq(zf.clone(), expr_const(1, 1)).unwrap();
    assert_eq!(expression.simplify(), zf.simplify());

    let expression = Expression::cmpeq(zf.clone(), expr_const(0, 1)).unwrap();
    assert_eq!(
        expression.simplify(),
        Expression::not(zf.clone()).unwrap().simplify()
    );
}

#[test]
fn extract_projections() {
    let extract = Expression::extract(eax(), 0, 32).unwrap();
    assert_eq!(extract.simplify(), eax());

    let nested = Expression::extract(Expression::extract(eax(), 8, 16).unwrap(), 4, 8).unwrap();
    assert_eq!(nested.simplify().to_string(), "eax[12:20]");

    let concat = Expression::concat(vec![edx(), eax()]).unwrap();
    let high = Expression::extract(concat.clone(), 32, 32).unwrap();
    assert_eq!(high.simplify(), eax());
    let straddle = Expression::extract(concat, 16, 32).unwrap();
    assert_eq!(straddle.simplify().to_string(), "{ | [0:16]->edx[16:32] | [16:32]->eax[0:16] | }");
}

#[test]
fn concat_merges_adjacent_slices() {
    let concat = Expression::concat(vec![
        Expression::extract(eax(), 0, 8).unwrap(),
        Expression::extract(eax(), 8, 8).unwrap(),
        Expression::extract(eax(), 16, 16).unwrap(),
    ])
    .unwrap();
    assert_eq!(concat.simplify(), eax());

    let constants = Expression::concat(vec![expr_const(0x34, 8), expr_const(0x12, 8)]).unwrap();
    assert_eq!(constants.simplify(), expr_const(0x1234, 16));
}

#[test]
fn register_slices_normalize() {
    let eax = Register::new("eax", 32);
    let al = Register::new_slice("al", &eax, 0, 8);
    let ah = Register::new_slice("ah", &eax, 8, 8);
    assert_eq!(Expression::register(ah).simplify().to_string(), "eax[8:16]");
    let both = Expression::concat(vec![al.into(), Expression::extract(eax.into(), 8, 24).unwrap()])
        .unwrap();
    assert_eq!(both.simplify(), expr_register("eax", 32));
}

#[test]
fn extensions() {
    let al = Expression::extract(eax(), 0, 8).unwrap();
    let zext = Expression::zext(32, al.clone()).unwrap();
    assert_eq!(
        Expression::extract(zext.simplify(), 8, 24).unwrap().simplify(),
        expr_const(0, 24)
    );

    let sext = Expression::sext(32, expr_const(0x80, 8)).unwrap();
    assert_eq!(sext.simplify(), expr_const(0xffff_ff80, 32));

    let sext = Expression::sext(32, al).unwrap().simplify();
    assert_eq!(
        Expression::extract(sext, 8, 24).unwrap().simplify().to_string(),
        "(eax[7:8] ? -0x1 : 0x0)"
    );
}

#[test]
fn ite_rewrites() {
    let condition = Expression::cmpeq(eax(), edx()).unwrap();
    let select = Expression::ite(condition.clone(), expr_const(1, 1), expr_const(0, 1)).unwrap();
    assert_eq!(select.simplify(), condition);

    let same = Expression::ite(condition.clone(), eax(), eax()).unwrap();
    assert_eq!(same.simplify(), eax());

    let inverted = Expression::ite(Expression::not(condition.clone()).unwrap(), eax(), edx())
        .unwrap()
        .simplify();
    assert_eq!(inverted.to_string(), "((eax!=edx) ? eax : edx)");
}

#[test]
fn simplify_is_idempotent() {
    let expressions = vec![
        Expression::add(
            Expression::sub(eax(), expr_const(4, 32)).unwrap(),
            Expression::mul(edx(), expr_const(1, 32)).unwrap(),
        )
        .unwrap(),
        Expression::concat(vec![
            Expression::extract(eax(), 0, 8).unwrap(),
            top(8),
            Expression::extract(edx(), 16, 16).unwrap(),
        ])
        .unwrap(),
        Expression::cmpneq(
            Expression::add(eax(), expr_const(3, 32)).unwrap(),
            expr_const(3, 32),
        )
        .unwrap(),
        Expression::sext(64, Expression::xor(eax(), edx()).unwrap()).unwrap(),
    ];
    for expression in expressions {
        let once = expression.simplify();
        assert_eq!(once.simplify(), once);
        assert_eq!(once.bits(), expression.bits());
    }
}

#[test]
fn simplify_settles_deep_nesting() {
    let mut expression = eax();
    for _ in 0..100 {
        let sum = Expression::add(expression, expr_const(1, 32)).unwrap();
        expression = Expression::trun(32, Expression::zext(64, sum).unwrap()).unwrap();
    }
    let once = expression.simplify();
    assert_eq!(once.to_string(), "(eax+0x64)");
    assert_eq!(once.simplify(), once);
}

#[test]
fn addresses_normalize() {
    let esp = expr_register("esp", 32);
    let base = Expression::add(esp.clone(), expr_const(0xffff_fffc, 32)).unwrap();
    let address = Address::new(Some(base), None, 0, 8, Some("ss".to_string()), 32).unwrap();
    assert_eq!(address.base(), Some(&esp));
    assert_eq!(address.displacement(), 4);
    assert_eq!(Memory::new(address, 32).to_string(), "M32ss(esp+4)");

    let absolute = Address::new(Some(expr_const(0, 32)), None, 0, -4, None, 32).unwrap();
    assert_eq!(absolute.constant(), Some(0xffff_fffc));
    assert_eq!(absolute, Address::absolute(0xffff_fffc, None, 32));

    let indexed = Address::new(
        Some(expr_register("ebx", 32)),
        Some(expr_register("eax", 32)),
        8,
        -300,
        Some("ds".to_string()),
        32,
    )
    .unwrap();
    assert_eq!(Memory::new(indexed, 32).to_string(), "M32ds(ebx+eax*8-300)");
}

#[test]
fn registers_collects_addresses() {
    let address = Address::new(Some(eax()), None, 0, 16, None, 32).unwrap();
    let expression = Expression::add(Memory::new(address, 32).into(), edx()).unwrap();
    let names = expression
        .registers()
        .into_iter()
        .map(|register| register.name().to_string())
        .collect::<Vec<String>>();
    assert_eq!(names, vec!["eax".to_string(), "edx".to_string()]);
}
