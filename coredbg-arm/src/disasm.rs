//! Mnemonic rendering for ARM and Thumb instructions.
//!
//! One instruction, one string, always the same string: the `disas`
//! command relies on rendering being pure.

use crate::instruction::{
    ArmInstr, ArmKind, DpOp, MemOffset, MemOp, Operand2, SetFlags, ShiftBy,
};
use crate::{Cond, REG_NAMES};

fn reg(r: u8) -> &'static str {
    REG_NAMES[(r & 0xf) as usize]
}

fn op2(op2: &Operand2) -> String {
    use crate::shift::SrType;
    match op2 {
        Operand2::Const { value, .. } => format!("#{value}"),
        Operand2::Reg { rm, shift } => match shift {
            ShiftBy::Imm(SrType::Rrx, _) => format!("{},rrx", reg(*rm)),
            ShiftBy::Imm(_, 0) => reg(*rm).to_string(),
            ShiftBy::Imm(ty, amount) => format!("{},{} #{amount}", reg(*rm), ty.name()),
            ShiftBy::Reg(ty, rs) => format!("{},{} {}", reg(*rm), ty.name(), reg(*rs)),
        },
    }
}

fn reglist(mask: u16) -> String {
    let regs: Vec<&str> = (0..16).filter(|i| mask & (1 << i) != 0).map(|i| reg(i as u8)).collect();
    format!("{{{}}}", regs.join(","))
}

/// Render one decoded instruction.
pub fn format(instr: &ArmInstr) -> String {
    let c = instr.cond.suffix();
    use ArmKind as K;
    match &instr.kind {
        K::DataProc { op, set_flags, rn, rd, op2: o2 } => {
            let s = if *set_flags == SetFlags::No { "" } else { "s" };
            let name = match op {
                DpOp::And => "and",
                DpOp::Eor => "eor",
                DpOp::Sub => "sub",
                DpOp::Rsb => "rsb",
                DpOp::Add => "add",
                DpOp::Adc => "adc",
                DpOp::Sbc => "sbc",
                DpOp::Rsc => "rsc",
                DpOp::Tst => "tst",
                DpOp::Teq => "teq",
                DpOp::Cmp => "cmp",
                DpOp::Cmn => "cmn",
                DpOp::Orr => "orr",
                DpOp::Mov => "mov",
                DpOp::Bic => "bic",
                DpOp::Mvn => "mvn",
            };
            match op {
                DpOp::Tst | DpOp::Teq | DpOp::Cmp | DpOp::Cmn => {
                    format!("{name}{c} {},{}", reg(*rn), op2(o2))
                }
                DpOp::Mov | DpOp::Mvn => format!("{name}{c}{s} {},{}", reg(*rd), op2(o2)),
                _ => format!("{name}{c}{s} {},{},{}", reg(*rd), reg(*rn), op2(o2)),
            }
        }
        K::Movw { rd, imm } => format!("movw{c} {},#{imm}", reg(*rd)),
        K::Movt { rd, imm } => format!("movt{c} {},#{imm}", reg(*rd)),
        K::Mul { set_flags, rd, rn, rm, acc } => {
            let s = if *set_flags == SetFlags::No { "" } else { "s" };
            match acc {
                Some(ra) => format!("mla{c}{s} {},{},{},{}", reg(*rd), reg(*rn), reg(*rm), reg(*ra)),
                None => format!("mul{c}{s} {},{},{}", reg(*rd), reg(*rn), reg(*rm)),
            }
        }
        K::MulLong { signed, accumulate, set_flags, rdlo, rdhi, rn, rm } => {
            let s = if *set_flags == SetFlags::No { "" } else { "s" };
            let name = match (*signed, *accumulate) {
                (true, false) => "smull",
                (true, true) => "smlal",
                (false, false) => "umull",
                (false, true) => "umlal",
            };
            format!("{name}{c}{s} {},{},{},{}", reg(*rdlo), reg(*rdhi), reg(*rn), reg(*rm))
        }
        K::Div { signed, rd, rn, rm } => {
            let name = if *signed { "sdiv" } else { "udiv" };
            format!("{name}{c} {},{},{}", reg(*rd), reg(*rn), reg(*rm))
        }
        K::Mem { op, load, rn, rt, offset, p, u, w } => {
            let name = match (op, *load) {
                (MemOp::Word, true) => "ldr",
                (MemOp::Word, false) => "str",
                (MemOp::Byte, true) => "ldrb",
                (MemOp::Byte, false) => "strb",
                (MemOp::Half, true) => "ldrh",
                (MemOp::Half, false) => "strh",
                (MemOp::SignedByte, _) => "ldrsb",
                (MemOp::SignedHalf, _) => "ldrsh",
                (MemOp::Dual, true) => "ldrd",
                (MemOp::Dual, false) => "strd",
            };
            let sign = if *u { "" } else { "-" };
            let off = match offset {
                MemOffset::Imm(0) => String::new(),
                MemOffset::Imm(i) => format!(",#{sign}{i}"),
                MemOffset::Reg { rm, shift: (_, 0) } => format!(",{sign}{}", reg(*rm)),
                MemOffset::Reg { rm, shift: (ty, amt) } => {
                    format!(",{sign}{},{} #{amt}", reg(*rm), ty.name())
                }
            };
            if *p {
                let bang = if *w { "!" } else { "" };
                format!("{name}{c} {},[{}{off}]{bang}", reg(*rt), reg(*rn))
            } else {
                format!("{name}{c} {},[{}]{off}", reg(*rt), reg(*rn))
            }
        }
        K::BlockMem { load, rn, reglist: list, p, u, w, .. } => {
            let mode = match (*p, *u) {
                (false, true) => "ia",
                (true, false) => "db",
                (false, false) => "da",
                (true, true) => "ib",
            };
            let name = if *load { "ldm" } else { "stm" };
            let bang = if *w { "!" } else { "" };
            format!("{name}{mode}{c} {}{bang},{}", reg(*rn), reglist(*list))
        }
        K::Branch { link, offset } => {
            let name = if *link { "bl" } else { "b" };
            format!("{name}{c} {offset:+}")
        }
        K::BranchExchange { link, rm } => {
            let name = if *link { "blx" } else { "bx" };
            format!("{name}{c} {}", reg(*rm))
        }
        K::BlxImm { offset } => format!("blx {offset:+}"),
        K::Mrs { rd, spsr } => {
            format!("mrs{c} {},{}", reg(*rd), if *spsr { "spsr" } else { "cpsr" })
        }
        K::Msr { spsr, mask, op2: o2 } => {
            let psr = if *spsr { "spsr" } else { "cpsr" };
            let fields: String = [(8, 'f'), (4, 's'), (2, 'x'), (1, 'c')]
                .iter()
                .filter(|(bit, _)| mask & bit != 0)
                .map(|(_, ch)| ch)
                .collect();
            format!("msr{c} {psr}_{fields},{}", op2(o2))
        }
        K::Extend { signed, byte, rd, rm, rotation } => {
            let name = match (*signed, *byte) {
                (true, true) => "sxtb",
                (true, false) => "sxth",
                (false, true) => "uxtb",
                (false, false) => "uxth",
            };
            if *rotation == 0 {
                format!("{name}{c} {},{}", reg(*rd), reg(*rm))
            } else {
                format!("{name}{c} {},{},ror #{rotation}", reg(*rd), reg(*rm))
            }
        }
        K::Rev { style, rd, rm } => {
            let name = match style {
                crate::instruction::RevStyle::Word => "rev",
                crate::instruction::RevStyle::Half => "rev16",
                crate::instruction::RevStyle::SignedHalf => "revsh",
            };
            format!("{name}{c} {},{}", reg(*rd), reg(*rm))
        }
        K::Clz { rd, rm } => format!("clz{c} {},{}", reg(*rd), reg(*rm)),
        K::Bfx { signed, rd, rn, lsb, width } => {
            let name = if *signed { "sbfx" } else { "ubfx" };
            format!("{name}{c} {},{},#{lsb},#{width}", reg(*rd), reg(*rn))
        }
        K::Svc { imm } => format!("svc{c} {imm:#x}"),
        K::Bkpt { imm } => format!("bkpt {imm:#06x}"),
        K::It { firstcond, mask } => {
            // Reconstruct the then/else pattern from the mask.
            let mut pat = String::new();
            let mut m = *mask;
            while m & 0xf != 0 && m != 0x8 {
                pat.push(if (m >> 3) & 1 == (firstcond & 1) { 't' } else { 'e' });
                m = (m << 1) & 0xf;
            }
            format!("it{pat} {}", Cond::from_bits(u32::from(*firstcond)).suffix())
        }
        K::Cbz { nonzero, rn, offset } => {
            let name = if *nonzero { "cbnz" } else { "cbz" };
            format!("{name} {},+{offset}", reg(*rn))
        }
        K::TableBranch { rn, rm, halfword } => {
            if *halfword {
                format!("tbh [{},{},lsl #1]", reg(*rn), reg(*rm))
            } else {
                format!("tbb [{},{}]", reg(*rn), reg(*rm))
            }
        }
        K::Adr { rd, offset } => format!("adr{c} {},{offset:+}", reg(*rd)),
        K::Nop => format!("nop{c}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode_arm, decode_thumb, ArmTable};

    fn dis_arm(word: u32) -> String {
        format(&decode_arm(&ArmTable::armv7(), word).unwrap())
    }

    fn dis_thumb(h1: u16, h2: u16) -> String {
        format(&decode_thumb(h1, h2).unwrap().0)
    }

    #[test]
    fn arm_forms() {
        assert_eq!(dis_arm(0xe090_0001), "adds r0,r0,r1");
        assert_eq!(dis_arm(0x03a0_0001), "moveq r0,#1");
        assert_eq!(dis_arm(0xe591_0004), "ldr r0,[r1,#4]");
        assert_eq!(dis_arm(0xe8bd_8003), "ldmia sp!,{r0,r1,pc}");
    }

    #[test]
    fn it_pattern_reconstruction() {
        assert_eq!(dis_thumb(0xbf08, 0), "it eq");
        // ITETE EQ
        assert_eq!(dis_thumb(0xbf0b, 0), "itete eq");
    }

    #[test]
    fn rendering_is_idempotent() {
        assert_eq!(dis_arm(0xe090_0001), dis_arm(0xe090_0001));
    }
}
