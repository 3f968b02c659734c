//! Expansion of 16-bit compressed parcels into full instruction variants.
//!
//! Each compressed opcode behaves exactly like its 32-bit expansion, so the
//! executor only ever sees the expanded variant; the reported length (2)
//! is what keeps `npc` honest.

use crate::fields::sign_extend;
use crate::instruction::{AluOp, BranchCond, Instruction, LoadWidth, StoreWidth};
use crate::opcode::OpId;
use crate::{DecodeError, RegId};

/// Prime register of the three-bit rd'/rs1'/rs2' fields (x8..x15).
fn creg(bits: u16) -> RegId {
    RegId::new((bits & 0x7) as u8 + 8)
}

fn rd_full(h: u16) -> RegId {
    RegId::new(((h >> 7) & 0x1f) as u8)
}

fn rs2_full(h: u16) -> RegId {
    RegId::new(((h >> 2) & 0x1f) as u8)
}

fn bit(h: u16, n: u16) -> u64 {
    u64::from((h >> n) & 1)
}

fn bits(h: u16, hi: u16, lo: u16) -> u64 {
    u64::from((h >> lo) & ((1 << (hi - lo + 1)) - 1))
}

/// Expand one matched compressed parcel.
///
/// Reserved encodings that share a pattern with a legal one (all-zero
/// ADDI4SPN, C.LUI with zero immediate, C.JR with rs1=0) surface as decode
/// errors here rather than in the table.
pub(crate) fn expand(op: OpId, h: u16) -> Result<Instruction, DecodeError> {
    use Instruction as I;
    let ill = || DecodeError::IllegalCompressed(h);
    Ok(match op {
        OpId::CAddi4spn => {
            let uimm =
                bits(h, 12, 11) << 4 | bits(h, 10, 7) << 6 | bit(h, 6) << 2 | bit(h, 5) << 3;
            if uimm == 0 {
                // Covers the defined-illegal all-zero parcel.
                return Err(ill());
            }
            I::OpImm {
                op: AluOp::Add,
                word: false,
                rd: creg(h >> 2),
                rs1: RegId::SP,
                imm: uimm as i64,
            }
        }
        OpId::CLw | OpId::CSw => {
            let off = (bits(h, 12, 10) << 3 | bit(h, 6) << 2 | bit(h, 5) << 6) as i64;
            if op == OpId::CLw {
                I::Load { width: LoadWidth::W, rd: creg(h >> 2), rs1: creg(h >> 7), imm: off }
            } else {
                I::Store { width: StoreWidth::W, rs1: creg(h >> 7), rs2: creg(h >> 2), imm: off }
            }
        }
        OpId::CLd | OpId::CSd => {
            let off = (bits(h, 12, 10) << 3 | bits(h, 6, 5) << 6) as i64;
            if op == OpId::CLd {
                I::Load { width: LoadWidth::D, rd: creg(h >> 2), rs1: creg(h >> 7), imm: off }
            } else {
                I::Store { width: StoreWidth::D, rs1: creg(h >> 7), rs2: creg(h >> 2), imm: off }
            }
        }

        OpId::CAddi | OpId::CAddiw | OpId::CLi => {
            let imm = sign_extend(bit(h, 12) << 5 | bits(h, 6, 2), 6);
            let rd = rd_full(h);
            match op {
                OpId::CAddi => I::OpImm { op: AluOp::Add, word: false, rd, rs1: rd, imm },
                OpId::CAddiw => {
                    if rd == RegId::ZERO {
                        return Err(ill());
                    }
                    I::OpImm { op: AluOp::Add, word: true, rd, rs1: rd, imm }
                }
                _ => I::OpImm { op: AluOp::Add, word: false, rd, rs1: RegId::ZERO, imm },
            }
        }
        OpId::CAddi16sp => {
            let imm = sign_extend(
                bit(h, 12) << 9
                    | bits(h, 4, 3) << 7
                    | bit(h, 5) << 6
                    | bit(h, 2) << 5
                    | bit(h, 6) << 4,
                10,
            );
            if imm == 0 {
                return Err(ill());
            }
            I::OpImm { op: AluOp::Add, word: false, rd: RegId::SP, rs1: RegId::SP, imm }
        }
        OpId::CLui => {
            let imm = sign_extend(bit(h, 12) << 17 | bits(h, 6, 2) << 12, 18);
            if imm == 0 {
                return Err(ill());
            }
            I::Lui { rd: rd_full(h), imm }
        }

        OpId::CSrli | OpId::CSrai | OpId::CAndi => {
            let rd = creg(h >> 7);
            match op {
                OpId::CSrli => I::OpImm {
                    op: AluOp::Srl,
                    word: false,
                    rd,
                    rs1: rd,
                    imm: (bit(h, 12) << 5 | bits(h, 6, 2)) as i64,
                },
                OpId::CSrai => I::OpImm {
                    op: AluOp::Sra,
                    word: false,
                    rd,
                    rs1: rd,
                    imm: (bit(h, 12) << 5 | bits(h, 6, 2)) as i64,
                },
                _ => I::OpImm {
                    op: AluOp::And,
                    word: false,
                    rd,
                    rs1: rd,
                    imm: sign_extend(bit(h, 12) << 5 | bits(h, 6, 2), 6),
                },
            }
        }
        OpId::CSub | OpId::CXor | OpId::COr | OpId::CAnd | OpId::CSubw | OpId::CAddw => {
            let rd = creg(h >> 7);
            let rs2 = creg(h >> 2);
            let (alu, word) = match op {
                OpId::CSub => (AluOp::Sub, false),
                OpId::CXor => (AluOp::Xor, false),
                OpId::COr => (AluOp::Or, false),
                OpId::CAnd => (AluOp::And, false),
                OpId::CSubw => (AluOp::Sub, true),
                _ => (AluOp::Add, true),
            };
            I::OpReg { op: alu, word, rd, rs1: rd, rs2 }
        }

        OpId::CJ => I::Jal { rd: RegId::ZERO, imm: cj_offset(h) },
        OpId::CBeqz | OpId::CBnez => {
            let imm = sign_extend(
                bit(h, 12) << 8
                    | bits(h, 11, 10) << 3
                    | bits(h, 6, 5) << 6
                    | bits(h, 4, 3) << 1
                    | bit(h, 2) << 5,
                9,
            );
            let cond = if op == OpId::CBeqz { BranchCond::Eq } else { BranchCond::Ne };
            I::Branch { cond, rs1: creg(h >> 7), rs2: RegId::ZERO, imm }
        }

        OpId::CSlli => {
            let rd = rd_full(h);
            I::OpImm {
                op: AluOp::Sll,
                word: false,
                rd,
                rs1: rd,
                imm: (bit(h, 12) << 5 | bits(h, 6, 2)) as i64,
            }
        }
        OpId::CLwsp => {
            if rd_full(h) == RegId::ZERO {
                return Err(ill());
            }
            let off = (bit(h, 12) << 5 | bits(h, 6, 4) << 2 | bits(h, 3, 2) << 6) as i64;
            I::Load { width: LoadWidth::W, rd: rd_full(h), rs1: RegId::SP, imm: off }
        }
        OpId::CLdsp => {
            if rd_full(h) == RegId::ZERO {
                return Err(ill());
            }
            let off = (bit(h, 12) << 5 | bits(h, 6, 5) << 3 | bits(h, 4, 2) << 6) as i64;
            I::Load { width: LoadWidth::D, rd: rd_full(h), rs1: RegId::SP, imm: off }
        }
        OpId::CSwsp => {
            let off = (bits(h, 12, 9) << 2 | bits(h, 8, 7) << 6) as i64;
            I::Store { width: StoreWidth::W, rs1: RegId::SP, rs2: rs2_full(h), imm: off }
        }
        OpId::CSdsp => {
            let off = (bits(h, 12, 10) << 3 | bits(h, 9, 7) << 6) as i64;
            I::Store { width: StoreWidth::D, rs1: RegId::SP, rs2: rs2_full(h), imm: off }
        }

        OpId::CJr => {
            let rs1 = rd_full(h);
            if rs1 == RegId::ZERO {
                return Err(ill());
            }
            I::Jalr { rd: RegId::ZERO, rs1, imm: 0 }
        }
        OpId::CJalr => I::Jalr { rd: RegId::RA, rs1: rd_full(h), imm: 0 },
        OpId::CMv => I::OpReg {
            op: AluOp::Add,
            word: false,
            rd: rd_full(h),
            rs1: RegId::ZERO,
            rs2: rs2_full(h),
        },
        OpId::CAdd => {
            let rd = rd_full(h);
            I::OpReg { op: AluOp::Add, word: false, rd, rs1: rd, rs2: rs2_full(h) }
        }
        OpId::CEbreak => I::Ebreak,

        other => unreachable!("32-bit op {other} routed to compressed expansion"),
    })
}

/// CJ-format offset: imm[11|4|9:8|10|6|7|3:1|5] taken from bits [12:2].
fn cj_offset(h: u16) -> i64 {
    sign_extend(
        bit(h, 12) << 11
            | bit(h, 11) << 4
            | bits(h, 10, 9) << 8
            | bit(h, 8) << 10
            | bit(h, 7) << 6
            | bit(h, 6) << 7
            | bits(h, 5, 3) << 1
            | bit(h, 2) << 5,
        12,
    )
}
