//! Decoded instruction variants and the decode/encode pair.
//!
//! The table resolves a raw word to an [`OpId`]; [`decode`] then extracts
//! the fields into a family-structured [`Instruction`] so the executor can
//! match on behavior instead of on encodings. Compressed parcels expand
//! into the same variants with `len == 2`.

use crate::compressed;
use crate::fields::*;
use crate::opcode::{InstructionTable, OpId};
use crate::{DecodeError, RegId};

/// Comparison of a conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BranchCond {
    Eq, Ne, Lt, Ge, Ltu, Geu,
}

/// Width and extension of a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum LoadWidth {
    B, H, W, D, Bu, Hu, Wu,
}

impl LoadWidth {
    /// Access width in bytes.
    pub const fn bytes(self) -> u8 {
        match self {
            Self::B | Self::Bu => 1,
            Self::H | Self::Hu => 2,
            Self::W | Self::Wu => 4,
            Self::D => 8,
        }
    }

    /// `true` for the sign-extending variants.
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::B | Self::H | Self::W)
    }
}

/// Width of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum StoreWidth {
    B, H, W, D,
}

impl StoreWidth {
    /// Access width in bytes.
    pub const fn bytes(self) -> u8 {
        match self {
            Self::B => 1,
            Self::H => 2,
            Self::W => 4,
            Self::D => 8,
        }
    }
}

/// Integer ALU operation, shared by the register and immediate forms.
/// The multiply/divide group only appears in register form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AluOp {
    Add, Sub, Sll, Slt, Sltu, Xor, Srl, Sra, Or, And,
    Mul, Mulh, Mulhsu, Mulhu, Div, Divu, Rem, Remu,
}

/// CSR access flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CsrOp {
    Rw, Rs, Rc, Rwi, Rsi, Rci,
}

/// Atomic memory operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AmoOp {
    Lr, Sc, Swap, Add, Xor, And, Or, Min, Max, Minu, Maxu,
}

/// Two-operand floating-point arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum FpArithOp {
    Add, Sub, Mul, Div, Min, Max, SgnJ, SgnJn, SgnJx,
}

/// Floating-point compare writing 0/1 to an integer register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum FpCmpOp {
    Eq, Lt, Le,
}

/// One decoded instruction, grouped by execution family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Instruction {
    Lui { rd: RegId, imm: i64 },
    Auipc { rd: RegId, imm: i64 },
    Jal { rd: RegId, imm: i64 },
    Jalr { rd: RegId, rs1: RegId, imm: i64 },
    Branch { cond: BranchCond, rs1: RegId, rs2: RegId, imm: i64 },
    Load { width: LoadWidth, rd: RegId, rs1: RegId, imm: i64 },
    Store { width: StoreWidth, rs1: RegId, rs2: RegId, imm: i64 },
    /// Shift immediates carry the shamt in `imm`.
    OpImm { op: AluOp, word: bool, rd: RegId, rs1: RegId, imm: i64 },
    OpReg { op: AluOp, word: bool, rd: RegId, rs1: RegId, rs2: RegId },
    Fence,
    FenceI,
    Ecall,
    Ebreak,
    Mret,
    Wfi,
    /// `src` is the rs1 index for register forms and the zimm for the
    /// immediate forms.
    Csr { op: CsrOp, rd: RegId, src: u8, addr: u16 },
    Amo { op: AmoOp, dbl: bool, rd: RegId, rs1: RegId, rs2: RegId },
    FpLoad { dbl: bool, rd: RegId, rs1: RegId, imm: i64 },
    FpStore { dbl: bool, rs1: RegId, rs2: RegId, imm: i64 },
    FpArith { op: FpArithOp, dbl: bool, rd: RegId, rs1: RegId, rs2: RegId },
    FpCmp { op: FpCmpOp, dbl: bool, rd: RegId, rs1: RegId, rs2: RegId },
    /// fcvt.{w,wu,l,lu}.{s,d}: float to integer.
    FpCvtIntFp { dbl: bool, signed: bool, long: bool, rd: RegId, rs1: RegId },
    /// fcvt.{s,d}.{w,wu,l,lu}: integer to float.
    FpCvtFpInt { dbl: bool, signed: bool, long: bool, rd: RegId, rs1: RegId },
    /// fcvt.s.d / fcvt.d.s.
    FpCvtFpFp { to_dbl: bool, rd: RegId, rs1: RegId },
    FpMvToInt { dbl: bool, rd: RegId, rs1: RegId },
    FpMvFromInt { dbl: bool, rd: RegId, rs1: RegId },
}

/// Result of a successful decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstr {
    /// Matched table identity.
    pub op: OpId,
    /// Extracted fields.
    pub instr: Instruction,
    /// Bytes consumed: 2 or 4.
    pub len: u8,
}

/// Decode one fetched word against the table.
///
/// The low parcel bits select the path: `11` decodes the full 32-bit word,
/// anything else decodes the low 16 bits as a compressed parcel.
pub fn decode(table: &InstructionTable, word: u32) -> Result<DecodedInstr, DecodeError> {
    let desc = match table.lookup(word) {
        Some(d) => d,
        None if word & 0x3 == 0x3 => return Err(DecodeError::Illegal(word)),
        None => return Err(DecodeError::IllegalCompressed(word as u16)),
    };
    let instr = if desc.len() == 2 {
        compressed::expand(desc.op, word as u16)?
    } else {
        extract(desc.op, word)
    };
    Ok(DecodedInstr {
        op: desc.op,
        instr,
        len: desc.len(),
    })
}

fn extract(op: OpId, w: u32) -> Instruction {
    use Instruction as I;
    use OpId::*;
    match op {
        Lui => I::Lui { rd: rd(w), imm: imm_u(w) },
        Auipc => I::Auipc { rd: rd(w), imm: imm_u(w) },
        Jal => I::Jal { rd: rd(w), imm: imm_j(w) },
        Jalr => I::Jalr { rd: rd(w), rs1: rs1(w), imm: imm_i(w) },

        Beq | Bne | Blt | Bge | Bltu | Bgeu => {
            let cond = match op {
                Beq => BranchCond::Eq,
                Bne => BranchCond::Ne,
                Blt => BranchCond::Lt,
                Bge => BranchCond::Ge,
                Bltu => BranchCond::Ltu,
                _ => BranchCond::Geu,
            };
            I::Branch { cond, rs1: rs1(w), rs2: rs2(w), imm: imm_b(w) }
        }

        Lb | Lh | Lw | Ld | Lbu | Lhu | Lwu => {
            let width = match op {
                Lb => LoadWidth::B,
                Lh => LoadWidth::H,
                Lw => LoadWidth::W,
                Ld => LoadWidth::D,
                Lbu => LoadWidth::Bu,
                Lhu => LoadWidth::Hu,
                _ => LoadWidth::Wu,
            };
            I::Load { width, rd: rd(w), rs1: rs1(w), imm: imm_i(w) }
        }
        Sb | Sh | Sw | Sd => {
            let width = match op {
                Sb => StoreWidth::B,
                Sh => StoreWidth::H,
                Sw => StoreWidth::W,
                _ => StoreWidth::D,
            };
            I::Store { width, rs1: rs1(w), rs2: rs2(w), imm: imm_s(w) }
        }

        Addi | Slti | Sltiu | Xori | Ori | Andi => {
            let alu = match op {
                Addi => AluOp::Add,
                Slti => AluOp::Slt,
                Sltiu => AluOp::Sltu,
                Xori => AluOp::Xor,
                Ori => AluOp::Or,
                _ => AluOp::And,
            };
            I::OpImm { op: alu, word: false, rd: rd(w), rs1: rs1(w), imm: imm_i(w) }
        }
        Slli | Srli | Srai => {
            let alu = match op {
                Slli => AluOp::Sll,
                Srli => AluOp::Srl,
                _ => AluOp::Sra,
            };
            I::OpImm { op: alu, word: false, rd: rd(w), rs1: rs1(w), imm: i64::from(shamt6(w)) }
        }
        Addiw => I::OpImm { op: AluOp::Add, word: true, rd: rd(w), rs1: rs1(w), imm: imm_i(w) },
        Slliw | Srliw | Sraiw => {
            let alu = match op {
                Slliw => AluOp::Sll,
                Srliw => AluOp::Srl,
                _ => AluOp::Sra,
            };
            I::OpImm {
                op: alu,
                word: true,
                rd: rd(w),
                rs1: rs1(w),
                imm: i64::from(shamt6(w) & 0x1f),
            }
        }

        Add | Sub | Sll | Slt | Sltu | Xor | Srl | Sra | Or | And | Mul | Mulh | Mulhsu
        | Mulhu | Div | Divu | Rem | Remu => {
            let alu = match op {
                Add => AluOp::Add,
                Sub => AluOp::Sub,
                Sll => AluOp::Sll,
                Slt => AluOp::Slt,
                Sltu => AluOp::Sltu,
                Xor => AluOp::Xor,
                Srl => AluOp::Srl,
                Sra => AluOp::Sra,
                Or => AluOp::Or,
                And => AluOp::And,
                Mul => AluOp::Mul,
                Mulh => AluOp::Mulh,
                Mulhsu => AluOp::Mulhsu,
                Mulhu => AluOp::Mulhu,
                Div => AluOp::Div,
                Divu => AluOp::Divu,
                Rem => AluOp::Rem,
                _ => AluOp::Remu,
            };
            I::OpReg { op: alu, word: false, rd: rd(w), rs1: rs1(w), rs2: rs2(w) }
        }
        Addw | Subw | Sllw | Srlw | Sraw | Mulw | Divw | Divuw | Remw | Remuw => {
            let alu = match op {
                Addw => AluOp::Add,
                Subw => AluOp::Sub,
                Sllw => AluOp::Sll,
                Srlw => AluOp::Srl,
                Sraw => AluOp::Sra,
                Mulw => AluOp::Mul,
                Divw => AluOp::Div,
                Divuw => AluOp::Divu,
                Remw => AluOp::Rem,
                _ => AluOp::Remu,
            };
            I::OpReg { op: alu, word: true, rd: rd(w), rs1: rs1(w), rs2: rs2(w) }
        }

        Fence => I::Fence,
        FenceI => I::FenceI,
        Ecall => I::Ecall,
        Ebreak => I::Ebreak,
        Mret => I::Mret,
        Wfi => I::Wfi,

        Csrrw | Csrrs | Csrrc | Csrrwi | Csrrsi | Csrrci => {
            let csr = match op {
                Csrrw => CsrOp::Rw,
                Csrrs => CsrOp::Rs,
                Csrrc => CsrOp::Rc,
                Csrrwi => CsrOp::Rwi,
                Csrrsi => CsrOp::Rsi,
                _ => CsrOp::Rci,
            };
            I::Csr { op: csr, rd: rd(w), src: rs1(w).index() as u8, addr: csr_addr(w) }
        }

        LrW | ScW | AmoSwapW | AmoAddW | AmoXorW | AmoAndW | AmoOrW | AmoMinW | AmoMaxW
        | AmoMinuW | AmoMaxuW | LrD | ScD | AmoSwapD | AmoAddD | AmoXorD | AmoAndD | AmoOrD
        | AmoMinD | AmoMaxD | AmoMinuD | AmoMaxuD => {
            let dbl = matches!(
                op,
                LrD | ScD | AmoSwapD | AmoAddD | AmoXorD | AmoAndD | AmoOrD | AmoMinD
                    | AmoMaxD | AmoMinuD | AmoMaxuD
            );
            let amo = match op {
                LrW | LrD => AmoOp::Lr,
                ScW | ScD => AmoOp::Sc,
                AmoSwapW | AmoSwapD => AmoOp::Swap,
                AmoAddW | AmoAddD => AmoOp::Add,
                AmoXorW | AmoXorD => AmoOp::Xor,
                AmoAndW | AmoAndD => AmoOp::And,
                AmoOrW | AmoOrD => AmoOp::Or,
                AmoMinW | AmoMinD => AmoOp::Min,
                AmoMaxW | AmoMaxD => AmoOp::Max,
                AmoMinuW | AmoMinuD => AmoOp::Minu,
                _ => AmoOp::Maxu,
            };
            I::Amo { op: amo, dbl, rd: rd(w), rs1: rs1(w), rs2: rs2(w) }
        }

        Flw => I::FpLoad { dbl: false, rd: rd(w), rs1: rs1(w), imm: imm_i(w) },
        Fld => I::FpLoad { dbl: true, rd: rd(w), rs1: rs1(w), imm: imm_i(w) },
        Fsw => I::FpStore { dbl: false, rs1: rs1(w), rs2: rs2(w), imm: imm_s(w) },
        Fsd => I::FpStore { dbl: true, rs1: rs1(w), rs2: rs2(w), imm: imm_s(w) },

        FaddS | FsubS | FmulS | FdivS | FminS | FmaxS | FsgnjS | FsgnjnS | FsgnjxS | FaddD
        | FsubD | FmulD | FdivD | FminD | FmaxD | FsgnjD | FsgnjnD | FsgnjxD => {
            let dbl = matches!(
                op,
                FaddD | FsubD | FmulD | FdivD | FminD | FmaxD | FsgnjD | FsgnjnD | FsgnjxD
            );
            let fop = match op {
                FaddS | FaddD => FpArithOp::Add,
                FsubS | FsubD => FpArithOp::Sub,
                FmulS | FmulD => FpArithOp::Mul,
                FdivS | FdivD => FpArithOp::Div,
                FminS | FminD => FpArithOp::Min,
                FmaxS | FmaxD => FpArithOp::Max,
                FsgnjS | FsgnjD => FpArithOp::SgnJ,
                FsgnjnS | FsgnjnD => FpArithOp::SgnJn,
                _ => FpArithOp::SgnJx,
            };
            I::FpArith { op: fop, dbl, rd: rd(w), rs1: rs1(w), rs2: rs2(w) }
        }
        FeqS | FltS | FleS | FeqD | FltD | FleD => {
            let dbl = matches!(op, FeqD | FltD | FleD);
            let cmp = match op {
                FeqS | FeqD => FpCmpOp::Eq,
                FltS | FltD => FpCmpOp::Lt,
                _ => FpCmpOp::Le,
            };
            I::FpCmp { op: cmp, dbl, rd: rd(w), rs1: rs1(w), rs2: rs2(w) }
        }
        FcvtWS | FcvtWuS | FcvtLS | FcvtLuS | FcvtWD | FcvtWuD | FcvtLD | FcvtLuD => {
            let dbl = matches!(op, FcvtWD | FcvtWuD | FcvtLD | FcvtLuD);
            let signed = matches!(op, FcvtWS | FcvtLS | FcvtWD | FcvtLD);
            let long = matches!(op, FcvtLS | FcvtLuS | FcvtLD | FcvtLuD);
            I::FpCvtIntFp { dbl, signed, long, rd: rd(w), rs1: rs1(w) }
        }
        FcvtSW | FcvtSWu | FcvtSL | FcvtSLu | FcvtDW | FcvtDWu | FcvtDL | FcvtDLu => {
            let dbl = matches!(op, FcvtDW | FcvtDWu | FcvtDL | FcvtDLu);
            let signed = matches!(op, FcvtSW | FcvtSL | FcvtDW | FcvtDL);
            let long = matches!(op, FcvtSL | FcvtSLu | FcvtDL | FcvtDLu);
            I::FpCvtFpInt { dbl, signed, long, rd: rd(w), rs1: rs1(w) }
        }
        FcvtSD => I::FpCvtFpFp { to_dbl: false, rd: rd(w), rs1: rs1(w) },
        FcvtDS => I::FpCvtFpFp { to_dbl: true, rd: rd(w), rs1: rs1(w) },
        FmvXW => I::FpMvToInt { dbl: false, rd: rd(w), rs1: rs1(w) },
        FmvXD => I::FpMvToInt { dbl: true, rd: rd(w), rs1: rs1(w) },
        FmvWX => I::FpMvFromInt { dbl: false, rd: rd(w), rs1: rs1(w) },
        FmvDX => I::FpMvFromInt { dbl: true, rd: rd(w), rs1: rs1(w) },

        // Compressed identities never reach here: expand() handles them.
        _ => unreachable!("compressed op {op} routed to 32-bit extraction"),
    }
}

impl Instruction {
    /// Canonical 32-bit encoding of the instruction.
    ///
    /// Decoding the returned word yields the same variant back; the
    /// round-trip tests iterate the whole table through this.
    pub fn encode(&self) -> u32 {
        use Instruction as I;
        match *self {
            I::Lui { rd, imm } => enc_u(0x37, rd, imm),
            I::Auipc { rd, imm } => enc_u(0x17, rd, imm),
            I::Jal { rd, imm } => enc_j(0x6f, rd, imm),
            I::Jalr { rd, rs1, imm } => enc_i(0x67, 0, rd, rs1, imm),
            I::Branch { cond, rs1, rs2, imm } => {
                let f3 = match cond {
                    BranchCond::Eq => 0,
                    BranchCond::Ne => 1,
                    BranchCond::Lt => 4,
                    BranchCond::Ge => 5,
                    BranchCond::Ltu => 6,
                    BranchCond::Geu => 7,
                };
                enc_b(0x63, f3, rs1, rs2, imm)
            }
            I::Load { width, rd, rs1, imm } => {
                let f3 = match width {
                    LoadWidth::B => 0,
                    LoadWidth::H => 1,
                    LoadWidth::W => 2,
                    LoadWidth::D => 3,
                    LoadWidth::Bu => 4,
                    LoadWidth::Hu => 5,
                    LoadWidth::Wu => 6,
                };
                enc_i(0x03, f3, rd, rs1, imm)
            }
            I::Store { width, rs1, rs2, imm } => {
                let f3 = match width {
                    StoreWidth::B => 0,
                    StoreWidth::H => 1,
                    StoreWidth::W => 2,
                    StoreWidth::D => 3,
                };
                enc_s(0x23, f3, rs1, rs2, imm)
            }
            I::OpImm { op, word, rd, rs1, imm } => {
                let opcode = if word { 0x1b } else { 0x13 };
                match op {
                    AluOp::Add => enc_i(opcode, 0, rd, rs1, imm),
                    AluOp::Slt => enc_i(opcode, 2, rd, rs1, imm),
                    AluOp::Sltu => enc_i(opcode, 3, rd, rs1, imm),
                    AluOp::Xor => enc_i(opcode, 4, rd, rs1, imm),
                    AluOp::Or => enc_i(opcode, 6, rd, rs1, imm),
                    AluOp::And => enc_i(opcode, 7, rd, rs1, imm),
                    AluOp::Sll => enc_i(opcode, 1, rd, rs1, imm & 0x3f),
                    AluOp::Srl => enc_i(opcode, 5, rd, rs1, imm & 0x3f),
                    AluOp::Sra => enc_i(opcode, 5, rd, rs1, (imm & 0x3f) | 0x400),
                    _ => unreachable!("no immediate form for {op:?}"),
                }
            }
            I::OpReg { op, word, rd, rs1, rs2 } => {
                let opcode = if word { 0x3b } else { 0x33 };
                let (f3, f7) = match op {
                    AluOp::Add => (0, 0x00),
                    AluOp::Sub => (0, 0x20),
                    AluOp::Sll => (1, 0x00),
                    AluOp::Slt => (2, 0x00),
                    AluOp::Sltu => (3, 0x00),
                    AluOp::Xor => (4, 0x00),
                    AluOp::Srl => (5, 0x00),
                    AluOp::Sra => (5, 0x20),
                    AluOp::Or => (6, 0x00),
                    AluOp::And => (7, 0x00),
                    AluOp::Mul => (0, 0x01),
                    AluOp::Mulh => (1, 0x01),
                    AluOp::Mulhsu => (2, 0x01),
                    AluOp::Mulhu => (3, 0x01),
                    AluOp::Div => (4, 0x01),
                    AluOp::Divu => (5, 0x01),
                    AluOp::Rem => (6, 0x01),
                    AluOp::Remu => (7, 0x01),
                };
                enc_r(opcode, f3, f7, rd, rs1, rs2)
            }
            I::Fence => 0x0f,
            I::FenceI => 0x0f | 1 << 12,
            I::Ecall => 0x0000_0073,
            I::Ebreak => 0x0010_0073,
            I::Mret => 0x3020_0073,
            I::Wfi => 0x1050_0073,
            I::Csr { op, rd, src, addr } => {
                let f3 = match op {
                    CsrOp::Rw => 1,
                    CsrOp::Rs => 2,
                    CsrOp::Rc => 3,
                    CsrOp::Rwi => 5,
                    CsrOp::Rsi => 6,
                    CsrOp::Rci => 7,
                };
                0x73 | f3 << 12
                    | reg_bits(RegId::new(src), 15)
                    | reg_bits_rd(rd)
                    | u32::from(addr) << 20
            }
            I::Amo { op, dbl, rd, rs1, rs2 } => {
                let f5 = match op {
                    AmoOp::Lr => 0x02,
                    AmoOp::Sc => 0x03,
                    AmoOp::Swap => 0x01,
                    AmoOp::Add => 0x00,
                    AmoOp::Xor => 0x04,
                    AmoOp::And => 0x0c,
                    AmoOp::Or => 0x08,
                    AmoOp::Min => 0x10,
                    AmoOp::Max => 0x14,
                    AmoOp::Minu => 0x18,
                    AmoOp::Maxu => 0x1c,
                };
                let f3 = if dbl { 3 } else { 2 };
                0x2f | f3 << 12 | f5 << 27 | reg_bits_rd(rd) | reg_bits(rs1, 15) | reg_bits(rs2, 20)
            }
            I::FpLoad { dbl, rd, rs1, imm } => enc_i(0x07, if dbl { 3 } else { 2 }, rd, rs1, imm),
            I::FpStore { dbl, rs1, rs2, imm } => {
                enc_s(0x27, if dbl { 3 } else { 2 }, rs1, rs2, imm)
            }
            I::FpArith { op, dbl, rd, rs1, rs2 } => {
                let d = dbl as u32;
                let (f7, f3) = match op {
                    FpArithOp::Add => (0x00 + d, 0),
                    FpArithOp::Sub => (0x04 + d, 0),
                    FpArithOp::Mul => (0x08 + d, 0),
                    FpArithOp::Div => (0x0c + d, 0),
                    FpArithOp::SgnJ => (0x10 + d, 0),
                    FpArithOp::SgnJn => (0x10 + d, 1),
                    FpArithOp::SgnJx => (0x10 + d, 2),
                    FpArithOp::Min => (0x14 + d, 0),
                    FpArithOp::Max => (0x14 + d, 1),
                };
                enc_r(0x53, f3, f7, rd, rs1, rs2)
            }
            I::FpCmp { op, dbl, rd, rs1, rs2 } => {
                let f3 = match op {
                    FpCmpOp::Eq => 2,
                    FpCmpOp::Lt => 1,
                    FpCmpOp::Le => 0,
                };
                enc_r(0x53, f3, 0x50 + dbl as u32, rd, rs1, rs2)
            }
            I::FpCvtIntFp { dbl, signed, long, rd, rs1 } => {
                let rs2 = (long as u32) << 1 | !signed as u32;
                enc_r(0x53, 0, 0x60 + dbl as u32, rd, rs1, RegId::from(rs2))
            }
            I::FpCvtFpInt { dbl, signed, long, rd, rs1 } => {
                let rs2 = (long as u32) << 1 | !signed as u32;
                enc_r(0x53, 0, 0x68 + dbl as u32, rd, rs1, RegId::from(rs2))
            }
            I::FpCvtFpFp { to_dbl, rd, rs1 } => {
                let (f7, rs2) = if to_dbl { (0x21, 0) } else { (0x20, 1) };
                enc_r(0x53, 0, f7, rd, rs1, RegId::from(rs2))
            }
            I::FpMvToInt { dbl, rd, rs1 } => {
                enc_r(0x53, 0, 0x70 + dbl as u32, rd, rs1, RegId::ZERO)
            }
            I::FpMvFromInt { dbl, rd, rs1 } => {
                enc_r(0x53, 0, 0x78 + dbl as u32, rd, rs1, RegId::ZERO)
            }
        }
    }
}

fn reg_bits(r: RegId, shift: u32) -> u32 {
    (r.index() as u32) << shift
}

fn reg_bits_rd(r: RegId) -> u32 {
    reg_bits(r, 7)
}

fn enc_r(opcode: u32, f3: u32, f7: u32, rd: RegId, rs1: RegId, rs2: RegId) -> u32 {
    opcode | f3 << 12 | f7 << 25 | reg_bits_rd(rd) | reg_bits(rs1, 15) | reg_bits(rs2, 20)
}

fn enc_i(opcode: u32, f3: u32, rd: RegId, rs1: RegId, imm: i64) -> u32 {
    opcode | f3 << 12 | reg_bits_rd(rd) | reg_bits(rs1, 15) | ((imm as u32) & 0xfff) << 20
}

fn enc_s(opcode: u32, f3: u32, rs1: RegId, rs2: RegId, imm: i64) -> u32 {
    let imm = imm as u32;
    opcode
        | f3 << 12
        | reg_bits(rs1, 15)
        | reg_bits(rs2, 20)
        | (imm & 0x1f) << 7
        | ((imm >> 5) & 0x7f) << 25
}

fn enc_b(opcode: u32, f3: u32, rs1: RegId, rs2: RegId, imm: i64) -> u32 {
    let imm = imm as u32;
    opcode
        | f3 << 12
        | reg_bits(rs1, 15)
        | reg_bits(rs2, 20)
        | ((imm >> 11) & 0x1) << 7
        | ((imm >> 1) & 0xf) << 8
        | ((imm >> 5) & 0x3f) << 25
        | ((imm >> 12) & 0x1) << 31
}

fn enc_u(opcode: u32, rd: RegId, imm: i64) -> u32 {
    opcode | reg_bits_rd(rd) | ((imm as u32) & 0xffff_f000)
}

fn enc_j(opcode: u32, rd: RegId, imm: i64) -> u32 {
    let imm = imm as u32;
    opcode
        | reg_bits_rd(rd)
        | ((imm >> 12) & 0xff) << 12
        | ((imm >> 11) & 0x1) << 20
        | ((imm >> 1) & 0x3ff) << 21
        | ((imm >> 20) & 0x1) << 31
}
