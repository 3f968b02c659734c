//! Mnemonic rendering for trace lines and the `disas` command.
//!
//! Follows assembler conventions: ABI register names, common pseudo forms
//! (`li`, `mv`, `nop`, `ret`, `beqz`) where the canonical operands collapse
//! into them. Rendering is pure, so disassembling the same word twice is
//! guaranteed to produce identical strings.

use crate::instruction::{
    AluOp, AmoOp, BranchCond, CsrOp, FpArithOp, FpCmpOp, Instruction, LoadWidth, StoreWidth,
};
use crate::RegId;

/// Render one decoded instruction.
pub fn format(instr: &Instruction) -> String {
    use Instruction as I;
    match *instr {
        I::Lui { rd, imm } => format!("lui {rd},{:#x}", (imm as u64 >> 12) & 0xf_ffff),
        I::Auipc { rd, imm } => format!("auipc {rd},{:#x}", (imm as u64 >> 12) & 0xf_ffff),
        I::Jal { rd, imm } if rd == RegId::ZERO => format!("j {imm}"),
        I::Jal { rd, imm } => format!("jal {rd},{imm}"),
        I::Jalr { rd, rs1, imm } if rd == RegId::ZERO && imm == 0 && rs1 == RegId::RA => {
            "ret".into()
        }
        I::Jalr { rd, rs1, imm } if rd == RegId::ZERO && imm == 0 => format!("jr {rs1}"),
        I::Jalr { rd, rs1, imm } => format!("jalr {rd},{imm}({rs1})"),
        I::Branch { cond, rs1, rs2, imm } => {
            let name = match cond {
                BranchCond::Eq => "beq",
                BranchCond::Ne => "bne",
                BranchCond::Lt => "blt",
                BranchCond::Ge => "bge",
                BranchCond::Ltu => "bltu",
                BranchCond::Geu => "bgeu",
            };
            if rs2 == RegId::ZERO && matches!(cond, BranchCond::Eq | BranchCond::Ne) {
                format!("{name}z {rs1},{imm}")
            } else {
                format!("{name} {rs1},{rs2},{imm}")
            }
        }
        I::Load { width, rd, rs1, imm } => {
            let name = match width {
                LoadWidth::B => "lb",
                LoadWidth::H => "lh",
                LoadWidth::W => "lw",
                LoadWidth::D => "ld",
                LoadWidth::Bu => "lbu",
                LoadWidth::Hu => "lhu",
                LoadWidth::Wu => "lwu",
            };
            format!("{name} {rd},{imm}({rs1})")
        }
        I::Store { width, rs1, rs2, imm } => {
            let name = match width {
                StoreWidth::B => "sb",
                StoreWidth::H => "sh",
                StoreWidth::W => "sw",
                StoreWidth::D => "sd",
            };
            format!("{name} {rs2},{imm}({rs1})")
        }
        I::OpImm { op: AluOp::Add, word: false, rd, rs1, imm }
            if rd == RegId::ZERO && rs1 == RegId::ZERO && imm == 0 =>
        {
            "nop".into()
        }
        I::OpImm { op: AluOp::Add, word: false, rd, rs1, imm } if rs1 == RegId::ZERO => {
            format!("li {rd},{imm}")
        }
        I::OpImm { op, word, rd, rs1, imm } => {
            let name = alu_imm_name(op, word);
            format!("{name} {rd},{rs1},{imm}")
        }
        I::OpReg { op: AluOp::Add, word: false, rd, rs1, rs2 } if rs1 == RegId::ZERO => {
            format!("mv {rd},{rs2}")
        }
        I::OpReg { op, word, rd, rs1, rs2 } => {
            let name = alu_reg_name(op, word);
            format!("{name} {rd},{rs1},{rs2}")
        }
        I::Fence => "fence".into(),
        I::FenceI => "fence.i".into(),
        I::Ecall => "ecall".into(),
        I::Ebreak => "ebreak".into(),
        I::Mret => "mret".into(),
        I::Wfi => "wfi".into(),
        I::Csr { op, rd, src, addr } => {
            let name = match op {
                CsrOp::Rw => "csrrw",
                CsrOp::Rs => "csrrs",
                CsrOp::Rc => "csrrc",
                CsrOp::Rwi => "csrrwi",
                CsrOp::Rsi => "csrrsi",
                CsrOp::Rci => "csrrci",
            };
            let csr = match crate::csr::addr_to_name(addr) {
                Some(n) => n.to_string(),
                None => format!("{addr:#x}"),
            };
            if matches!(op, CsrOp::Rwi | CsrOp::Rsi | CsrOp::Rci) {
                format!("{name} {rd},{csr},{src}")
            } else {
                format!("{name} {rd},{csr},{}", RegId::new(src))
            }
        }
        I::Amo { op, dbl, rd, rs1, rs2 } => {
            let sfx = if dbl { "d" } else { "w" };
            match op {
                AmoOp::Lr => format!("lr.{sfx} {rd},({rs1})"),
                AmoOp::Sc => format!("sc.{sfx} {rd},{rs2},({rs1})"),
                _ => {
                    let name = match op {
                        AmoOp::Swap => "amoswap",
                        AmoOp::Add => "amoadd",
                        AmoOp::Xor => "amoxor",
                        AmoOp::And => "amoand",
                        AmoOp::Or => "amoor",
                        AmoOp::Min => "amomin",
                        AmoOp::Max => "amomax",
                        AmoOp::Minu => "amominu",
                        AmoOp::Maxu => "amomaxu",
                        AmoOp::Lr | AmoOp::Sc => unreachable!(),
                    };
                    format!("{name}.{sfx} {rd},{rs2},({rs1})")
                }
            }
        }
        I::FpLoad { dbl, rd, rs1, imm } => {
            format!("{} {},{imm}({rs1})", if dbl { "fld" } else { "flw" }, rd.fp_name())
        }
        I::FpStore { dbl, rs1, rs2, imm } => {
            format!("{} {},{imm}({rs1})", if dbl { "fsd" } else { "fsw" }, rs2.fp_name())
        }
        I::FpArith { op, dbl, rd, rs1, rs2 } => {
            let base = match op {
                FpArithOp::Add => "fadd",
                FpArithOp::Sub => "fsub",
                FpArithOp::Mul => "fmul",
                FpArithOp::Div => "fdiv",
                FpArithOp::Min => "fmin",
                FpArithOp::Max => "fmax",
                FpArithOp::SgnJ => "fsgnj",
                FpArithOp::SgnJn => "fsgnjn",
                FpArithOp::SgnJx => "fsgnjx",
            };
            format!(
                "{base}.{} {},{},{}",
                prec(dbl),
                rd.fp_name(),
                rs1.fp_name(),
                rs2.fp_name()
            )
        }
        I::FpCmp { op, dbl, rd, rs1, rs2 } => {
            let base = match op {
                FpCmpOp::Eq => "feq",
                FpCmpOp::Lt => "flt",
                FpCmpOp::Le => "fle",
            };
            format!("{base}.{} {rd},{},{}", prec(dbl), rs1.fp_name(), rs2.fp_name())
        }
        I::FpCvtIntFp { dbl, signed, long, rd, rs1 } => {
            format!("fcvt.{}.{} {rd},{}", int_sfx(signed, long), prec(dbl), rs1.fp_name())
        }
        I::FpCvtFpInt { dbl, signed, long, rd, rs1 } => {
            format!("fcvt.{}.{} {},{rs1}", prec(dbl), int_sfx(signed, long), rd.fp_name())
        }
        I::FpCvtFpFp { to_dbl, rd, rs1 } => {
            let (to, from) = if to_dbl { ("d", "s") } else { ("s", "d") };
            format!("fcvt.{to}.{from} {},{}", rd.fp_name(), rs1.fp_name())
        }
        I::FpMvToInt { dbl, rd, rs1 } => {
            format!("fmv.x.{} {rd},{}", if dbl { "d" } else { "w" }, rs1.fp_name())
        }
        I::FpMvFromInt { dbl, rd, rs1 } => {
            format!("fmv.{}.x {},{rs1}", if dbl { "d" } else { "w" }, rd.fp_name())
        }
    }
}

fn prec(dbl: bool) -> &'static str {
    if dbl {
        "d"
    } else {
        "s"
    }
}

fn int_sfx(signed: bool, long: bool) -> &'static str {
    match (signed, long) {
        (true, false) => "w",
        (false, false) => "wu",
        (true, true) => "l",
        (false, true) => "lu",
    }
}

fn alu_imm_name(op: AluOp, word: bool) -> &'static str {
    match (op, word) {
        (AluOp::Add, false) => "addi",
        (AluOp::Add, true) => "addiw",
        (AluOp::Slt, _) => "slti",
        (AluOp::Sltu, _) => "sltiu",
        (AluOp::Xor, _) => "xori",
        (AluOp::Or, _) => "ori",
        (AluOp::And, _) => "andi",
        (AluOp::Sll, false) => "slli",
        (AluOp::Sll, true) => "slliw",
        (AluOp::Srl, false) => "srli",
        (AluOp::Srl, true) => "srliw",
        (AluOp::Sra, false) => "srai",
        (AluOp::Sra, true) => "sraiw",
        _ => "?",
    }
}

fn alu_reg_name(op: AluOp, word: bool) -> &'static str {
    match (op, word) {
        (AluOp::Add, false) => "add",
        (AluOp::Add, true) => "addw",
        (AluOp::Sub, false) => "sub",
        (AluOp::Sub, true) => "subw",
        (AluOp::Sll, false) => "sll",
        (AluOp::Sll, true) => "sllw",
        (AluOp::Slt, _) => "slt",
        (AluOp::Sltu, _) => "sltu",
        (AluOp::Xor, _) => "xor",
        (AluOp::Srl, false) => "srl",
        (AluOp::Srl, true) => "srlw",
        (AluOp::Sra, false) => "sra",
        (AluOp::Sra, true) => "sraw",
        (AluOp::Or, _) => "or",
        (AluOp::And, _) => "and",
        (AluOp::Mul, false) => "mul",
        (AluOp::Mul, true) => "mulw",
        (AluOp::Mulh, _) => "mulh",
        (AluOp::Mulhsu, _) => "mulhsu",
        (AluOp::Mulhu, _) => "mulhu",
        (AluOp::Div, false) => "div",
        (AluOp::Div, true) => "divw",
        (AluOp::Divu, false) => "divu",
        (AluOp::Divu, true) => "divuw",
        (AluOp::Rem, false) => "rem",
        (AluOp::Rem, true) => "remw",
        (AluOp::Remu, false) => "remu",
        (AluOp::Remu, true) => "remuw",
    }
}
