//! Floating-point execution: IEEE arithmetic results only, no accrued
//! exception flags beyond what the values themselves carry.

use coredbg_bus::{BusAction, MemoryBus};
use coredbg_riscv::{FpArithOp, FpCmpOp, Instruction};

use crate::state::{ExecuteState, TrapCause};

use super::RiscvCore;

impl<B: MemoryBus> RiscvCore<B> {
    pub(crate) fn execute_fp(&mut self, instr: &Instruction) -> ExecuteState {
        use Instruction as I;
        match *instr {
            I::FpLoad { dbl, rd, rs1, imm } => {
                let addr = self.regs.read(rs1.index()).wrapping_add(imm as u64);
                let size: u8 = if dbl { 8 } else { 4 };
                if addr % u64::from(size) != 0 {
                    return ExecuteState::Trap(TrapCause::LoadMisalign(addr));
                }
                let Ok(raw) = self.memop(BusAction::Read, addr, size, 0) else {
                    return ExecuteState::Trap(TrapCause::LoadFault(addr));
                };
                self.fregs.write(rd.index(), raw);
            }
            I::FpStore { dbl, rs1, rs2, imm } => {
                let addr = self.regs.read(rs1.index()).wrapping_add(imm as u64);
                let size: u8 = if dbl { 8 } else { 4 };
                if addr % u64::from(size) != 0 {
                    return ExecuteState::Trap(TrapCause::StoreMisalign(addr));
                }
                let value = self.fregs.read(rs2.index());
                if self.memop(BusAction::Write, addr, size, value).is_err() {
                    return ExecuteState::Trap(TrapCause::StoreFault(addr));
                }
            }

            I::FpArith { op, dbl, rd, rs1, rs2 } => {
                let a = self.fregs.read(rs1.index());
                let b = self.fregs.read(rs2.index());
                let value = if dbl {
                    fp_arith_f64(op, a, b)
                } else {
                    let r = fp_arith_f32(op, a as u32, b as u32);
                    u64::from(r)
                };
                self.fregs.write(rd.index(), value);
            }
            I::FpCmp { op, dbl, rd, rs1, rs2 } => {
                let a = self.fregs.read(rs1.index());
                let b = self.fregs.read(rs2.index());
                let hit = if dbl {
                    let (x, y) = (f64::from_bits(a), f64::from_bits(b));
                    match op {
                        FpCmpOp::Eq => x == y,
                        FpCmpOp::Lt => x < y,
                        FpCmpOp::Le => x <= y,
                    }
                } else {
                    let (x, y) = (f32::from_bits(a as u32), f32::from_bits(b as u32));
                    match op {
                        FpCmpOp::Eq => x == y,
                        FpCmpOp::Lt => x < y,
                        FpCmpOp::Le => x <= y,
                    }
                };
                self.regs.write(rd.index(), u64::from(hit));
            }

            I::FpCvtIntFp { dbl, signed, long, rd, rs1 } => {
                let raw = self.fregs.read(rs1.index());
                let f = if dbl {
                    f64::from_bits(raw)
                } else {
                    f64::from(f32::from_bits(raw as u32))
                };
                let value = match (signed, long) {
                    (true, false) => sign64(f as i32 as i64),
                    (false, false) => sign64(f as u32 as i32 as i64),
                    (true, true) => f as i64 as u64,
                    (false, true) => f as u64,
                };
                self.regs.write(rd.index(), value);
            }
            I::FpCvtFpInt { dbl, signed, long, rd, rs1 } => {
                let raw = self.regs.read(rs1.index());
                let f = match (signed, long) {
                    (true, false) => raw as u32 as i32 as f64,
                    (false, false) => raw as u32 as f64,
                    (true, true) => raw as i64 as f64,
                    (false, true) => raw as f64,
                };
                let value = if dbl {
                    f.to_bits()
                } else {
                    u64::from((f as f32).to_bits())
                };
                self.fregs.write(rd.index(), value);
            }
            I::FpCvtFpFp { to_dbl, rd, rs1 } => {
                let raw = self.fregs.read(rs1.index());
                let value = if to_dbl {
                    f64::from(f32::from_bits(raw as u32)).to_bits()
                } else {
                    u64::from((f64::from_bits(raw) as f32).to_bits())
                };
                self.fregs.write(rd.index(), value);
            }
            I::FpMvToInt { dbl, rd, rs1 } => {
                let raw = self.fregs.read(rs1.index());
                let value = if dbl { raw } else { sign64(raw as u32 as i32 as i64) };
                self.regs.write(rd.index(), value);
            }
            I::FpMvFromInt { dbl, rd, rs1 } => {
                let raw = self.regs.read(rs1.index());
                let value = if dbl { raw } else { u64::from(raw as u32) };
                self.fregs.write(rd.index(), value);
            }

            _ => unreachable!("non-FP instruction routed to the FP executor"),
        }
        ExecuteState::Proceed
    }
}

fn sign64(v: i64) -> u64 {
    v as u64
}

fn fp_arith_f64(op: FpArithOp, a: u64, b: u64) -> u64 {
    let (x, y) = (f64::from_bits(a), f64::from_bits(b));
    match op {
        FpArithOp::Add => (x + y).to_bits(),
        FpArithOp::Sub => (x - y).to_bits(),
        FpArithOp::Mul => (x * y).to_bits(),
        FpArithOp::Div => (x / y).to_bits(),
        FpArithOp::Min => x.min(y).to_bits(),
        FpArithOp::Max => x.max(y).to_bits(),
        FpArithOp::SgnJ => (a & !SIGN64) | (b & SIGN64),
        FpArithOp::SgnJn => (a & !SIGN64) | (!b & SIGN64),
        FpArithOp::SgnJx => a ^ (b & SIGN64),
    }
}

fn fp_arith_f32(op: FpArithOp, a: u32, b: u32) -> u32 {
    let (x, y) = (f32::from_bits(a), f32::from_bits(b));
    match op {
        FpArithOp::Add => (x + y).to_bits(),
        FpArithOp::Sub => (x - y).to_bits(),
        FpArithOp::Mul => (x * y).to_bits(),
        FpArithOp::Div => (x / y).to_bits(),
        FpArithOp::Min => x.min(y).to_bits(),
        FpArithOp::Max => x.max(y).to_bits(),
        FpArithOp::SgnJ => (a & !SIGN32) | (b & SIGN32),
        FpArithOp::SgnJn => (a & !SIGN32) | (!b & SIGN32),
        FpArithOp::SgnJx => a ^ (b & SIGN32),
    }
}

const SIGN64: u64 = 1 << 63;
const SIGN32: u32 = 1 << 31;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_injection_moves_only_the_sign() {
        let a = 1.5f64.to_bits();
        let b = (-2.0f64).to_bits();
        assert_eq!(f64::from_bits(fp_arith_f64(FpArithOp::SgnJ, a, b)), -1.5);
        assert_eq!(f64::from_bits(fp_arith_f64(FpArithOp::SgnJn, a, b)), 1.5);
        assert_eq!(f64::from_bits(fp_arith_f64(FpArithOp::SgnJx, a, b)), -1.5);
    }

    #[test]
    fn division_produces_ieee_results() {
        let inf = fp_arith_f64(FpArithOp::Div, 1.0f64.to_bits(), 0.0f64.to_bits());
        assert!(f64::from_bits(inf).is_infinite());
    }
}
