//! Dispatch from mnemonics to semantic functions.

use crate::disassembler::x86::semantics::{self, Semantics};
use crate::disassembler::x86::{Condition, Instruction};
use crate::expr::top;
use crate::state::StateMap;
use crate::Error;
use log::{debug, trace, warn};
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

type SemanticFn = fn(&Semantics, &mut StateMap) -> Result<(), Error>;

type Registry = FxHashMap<String, SemanticFn>;

fn register(registry: &mut Registry, names: &[&str], function: SemanticFn) {
    for name in names {
        registry.insert(name.to_string(), function);
    }
}

fn build() -> Registry {
    let mut registry = Registry::default();

    register(&mut registry, &["MOV"], semantics::mov);
    register(&mut registry, &["MOVZX"], semantics::movzx);
    register(&mut registry, &["MOVSX", "MOVSXD"], semantics::movsx);
    register(&mut registry, &["LEA"], semantics::lea);
    register(&mut registry, &["XCHG"], semantics::xchg);
    register(&mut registry, &["PUSH"], semantics::push);
    register(&mut registry, &["POP"], semantics::pop);
    register(&mut registry, &["PUSHA", "PUSHAD"], semantics::pusha);
    register(&mut registry, &["POPA", "POPAD"], semantics::popa);
    register(&mut registry, &["PUSHF", "PUSHFD", "PUSHFQ"], semantics::pushf);
    register(&mut registry, &["POPF", "POPFD", "POPFQ"], semantics::popf);
    register(&mut registry, &["LAHF"], semantics::lahf);
    register(&mut registry, &["SAHF"], semantics::sahf);
    register(&mut registry, &["CBW", "CWDE", "CDQE"], semantics::extend_accumulator);
    register(&mut registry, &["CWD", "CDQ", "CQO"], semantics::extend_into_data);
    register(&mut registry, &["BSWAP"], semantics::bswap);
    register(&mut registry, &["XLAT"], semantics::xlat);
    register(&mut registry, &["LDS", "LES", "LFS", "LGS", "LSS"], semantics::load_far_pointer);

    register(&mut registry, &["ADD"], semantics::add);
    register(&mut registry, &["ADC"], semantics::adc);
    register(&mut registry, &["SUB"], semantics::sub);
    register(&mut registry, &["SBB"], semantics::sbb);
    register(&mut registry, &["CMP"], semantics::cmp);
    register(&mut registry, &["INC"], semantics::inc);
    register(&mut registry, &["DEC"], semantics::dec);
    register(&mut registry, &["NEG"], semantics::neg);
    register(&mut registry, &["NOT"], semantics::not);
    register(&mut registry, &["AND"], semantics::and);
    register(&mut registry, &["OR"], semantics::or);
    register(&mut registry, &["XOR"], semantics::xor);
    register(&mut registry, &["TEST"], semantics::test);
    register(&mut registry, &["MUL"], semantics::mul);
    register(&mut registry, &["IMUL"], semantics::imul);
    register(&mut registry, &["DIV"], semantics::div);
    register(&mut registry, &["IDIV"], semantics::idiv);
    register(&mut registry, &["XADD"], semantics::xadd);
    register(&mut registry, &["CMPXCHG"], semantics::cmpxchg);
    register(&mut registry, &["CMPXCHG8B"], semantics::cmpxchg8b);
    register(&mut registry, &["AAA", "AAS", "AAM", "AAD", "DAA", "DAS"], semantics::bcd);

    register(&mut registry, &["SHL", "SAL"], semantics::shl);
    register(&mut registry, &["SHR"], semantics::shr);
    register(&mut registry, &["SAR"], semantics::sar);
    register(&mut registry, &["ROL"], semantics::rol);
    register(&mut registry, &["ROR"], semantics::ror);
    register(&mut registry, &["RCL"], semantics::rcl);
    register(&mut registry, &["RCR"], semantics::rcr);
    register(&mut registry, &["SHLD"], semantics::shld);
    register(&mut registry, &["SHRD"], semantics::shrd);

    register(&mut registry, &["BT"], semantics::bt);
    register(&mut registry, &["BTS"], semantics::bts);
    register(&mut registry, &["BTR"], semantics::btr);
    register(&mut registry, &["BTC"], semantics::btc);
    register(&mut registry, &["BSF", "BSR"], semantics::bit_scan);
    register(&mut registry, &["POPCNT", "LZCNT", "TZCNT"], semantics::bit_count);

    register(&mut registry, &["CLC"], semantics::clc);
    register(&mut registry, &["STC"], semantics::stc);
    register(&mut registry, &["CMC"], semantics::cmc);
    register(&mut registry, &["CLD"], semantics::cld);
    register(&mut registry, &["STD"], semantics::std);
    register(&mut registry, &["CLI"], semantics::cli);
    register(&mut registry, &["STI"], semantics::sti);
    register(
        &mut registry,
        &[
            "NOP", "WAIT", "PAUSE", "LFENCE", "MFENCE", "SFENCE", "PREFETCHNTA", "PREFETCHT0",
            "PREFETCHT1", "PREFETCHT2", "ENDBR32", "ENDBR64", "BOUND", "OUT",
        ],
        semantics::nop,
    );

    register(&mut registry, &["JMP"], semantics::jmp);
    register(&mut registry, &["JMPF"], semantics::jmpf);
    register(&mut registry, &["JCXZ", "JECXZ", "JRCXZ"], semantics::jcxz);
    register(&mut registry, &["LOOP", "LOOPE", "LOOPNE"], semantics::loop_);
    register(&mut registry, &["CALL"], semantics::call);
    register(&mut registry, &["CALLF"], semantics::callf);
    register(&mut registry, &["RET"], semantics::ret);
    register(&mut registry, &["RETF"], semantics::retf);
    register(&mut registry, &["IRET", "IRETD", "IRETQ"], semantics::iret);
    register(&mut registry, &["LEAVE"], semantics::leave);
    register(&mut registry, &["ENTER"], semantics::enter);
    register(
        &mut registry,
        &["HLT", "INT", "INT1", "INT3", "UD2", "SYSENTER"],
        semantics::trap,
    );
    register(&mut registry, &["INTO"], semantics::into);
    register(&mut registry, &["SYSCALL"], semantics::syscall);

    for condition in Condition::ALL.iter() {
        let suffix = condition.suffix();
        registry.insert(format!("J{}", suffix), semantics::jcc);
        registry.insert(format!("SET{}", suffix), semantics::setcc);
        registry.insert(format!("CMOV{}", suffix), semantics::cmovcc);
    }

    register(&mut registry, &["MOVSB", "MOVSW", "MOVSD", "MOVSQ"], semantics::movs);
    register(&mut registry, &["STOSB", "STOSW", "STOSD", "STOSQ"], semantics::stos);
    register(&mut registry, &["LODSB", "LODSW", "LODSD", "LODSQ"], semantics::lods);
    register(&mut registry, &["SCASB", "SCASW", "SCASD", "SCASQ"], semantics::scas);
    register(&mut registry, &["CMPSB", "CMPSW", "CMPSD", "CMPSQ"], semantics::cmps);
    register(&mut registry, &["INSB", "INSW", "INSD"], semantics::ins);
    register(&mut registry, &["OUTSB", "OUTSW", "OUTSD"], semantics::outs);

    register(&mut registry, &["IN"], semantics::in_);
    register(&mut registry, &["CPUID"], semantics::cpuid);
    register(&mut registry, &["RDTSC"], semantics::rdtsc);

    register(
        &mut registry,
        &[
            "F2XM1", "FABS", "FADD", "FADDP", "FBLD", "FBSTP", "FCHS", "FCMOVB", "FCMOVBE",
            "FCMOVE", "FCMOVNB", "FCMOVNBE", "FCMOVNE", "FCMOVNU", "FCMOVU", "FCOM", "FCOMI",
            "FCOMIP", "FCOMP", "FCOMPP", "FCOS", "FDIV", "FDIVP", "FDIVR", "FDIVRP", "FFREE",
            "FIADD", "FICOM", "FICOMP", "FIDIV", "FIDIVR", "FILD", "FIMUL", "FIST", "FISTP",
            "FISTTP", "FISUB", "FISUBR", "FLD", "FLD1", "FLDCW", "FLDENV", "FLDL2E", "FLDL2T",
            "FLDLG2", "FLDLN2", "FLDPI", "FLDZ", "FMUL", "FMULP", "FNCLEX", "FNINIT", "FNOP",
            "FNSTCW", "FNSTENV", "FNSTSW", "FPATAN", "FPREM", "FPTAN", "FRNDINT", "FSCALE", "FSIN",
            "FSQRT", "FST", "FSTP", "FSUB", "FSUBP", "FSUBR", "FSUBRP", "FTST", "FUCOM", "FUCOMI",
            "FUCOMIP", "FUCOMP", "FUCOMPP", "FXAM", "FXCH", "FYL2X",
        ],
        semantics::x87,
    );

    register(
        &mut registry,
        &[
            "MOVD", "MOVQ", "MOVAPS", "MOVAPD", "MOVUPS", "MOVUPD", "MOVDQA", "MOVDQU",
        ],
        semantics::vector_move,
    );
    register(&mut registry, &["MOVSS"], semantics::scalar_move);
    register(
        &mut registry,
        &[
            "PXOR", "XORPS", "XORPD", "ANDPS", "ANDPD", "ANDNPS", "ANDNPD", "ORPS", "ORPD",
        ],
        semantics::vector_logic,
    );
    register(
        &mut registry,
        &[
            "ADDPS", "ADDPD", "ADDSS", "ADDSD", "SUBPS", "SUBPD", "SUBSS", "SUBSD", "MULPS",
            "MULPD", "MULSS", "MULSD", "DIVPS", "DIVPD", "DIVSS", "DIVSD", "MINPS", "MINPD",
            "MINSS", "MINSD", "MAXPS", "MAXPD", "MAXSS", "MAXSD", "SQRTPS", "SQRTPD", "SQRTSS",
            "SQRTSD", "CVTPD2PS", "CVTPS2PD", "CVTSD2SI", "CVTSD2SS", "CVTSI2SD", "CVTSI2SS",
            "CVTSS2SD", "CVTSS2SI", "CVTTSD2SI", "CVTTSS2SI",
        ],
        semantics::vector_undefined,
    );
    register(
        &mut registry,
        &["COMISS", "COMISD", "UCOMISS", "UCOMISD"],
        semantics::vector_compare,
    );

    registry
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(build)
}

/// Every mnemonic with semantics, sorted.
pub(crate) fn mnemonics() -> Vec<&'static str> {
    let mut mnemonics = registry()
        .keys()
        .map(|mnemonic| mnemonic.as_str())
        .collect::<Vec<&'static str>>();
    mnemonics.sort_unstable();
    mnemonics
}

/// Evaluate `instruction` over `state`.
///
/// This never fails. An instruction without semantics writes top to its
/// first operand. An instruction whose semantics fail leaves the state as it
/// was, with an unknown program counter.
pub(crate) fn apply(instruction: &Instruction, state: &StateMap) -> StateMap {
    let semantics = Semantics::new(instruction, state);
    let mut post = state.clone();

    let result = semantics.advance(&mut post).and_then(|_| {
        match registry().get(instruction.mnemonic()) {
            Some(function) => {
                trace!("apply {}", instruction);
                function(&semantics, &mut post)
            }
            None => {
                debug!("no semantics for {}, writing top", instruction.mnemonic());
                semantics::undefined(&semantics, &mut post)
            }
        }
    });

    match result {
        Ok(()) => post,
        Err(error) => {
            warn!("evaluating \"{}\" failed: {}", instruction, error);
            let mut post = state.clone();
            let pc = instruction.mode().pc();
            if let Err(error) = post.write_register(&pc, top(pc.bits())) {
                warn!("could not clear {}: {}", pc.name(), error);
            }
            post
        }
    }
}
