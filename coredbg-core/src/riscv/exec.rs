//! Integer, control-flow, atomic and system execution semantics.

use coredbg_bus::{BusAction, MemoryBus};
use coredbg_riscv::csr::{self, MStatus};
use coredbg_riscv::{AluOp, AmoOp, BranchCond, CsrOp, DecodedInstr, Instruction, RegId};

use crate::state::{ExecuteState, TrapCause};

use super::RiscvCore;

impl<B: MemoryBus> RiscvCore<B> {
    /// Execute one decoded instruction. `npc` is already the linear
    /// successor; control-flow instructions overwrite it.
    pub(crate) fn execute(&mut self, d: &DecodedInstr) -> ExecuteState {
        use Instruction as I;
        match d.instr {
            I::Lui { rd, imm } => {
                self.regs.write(rd.index(), imm as u64);
            }
            I::Auipc { rd, imm } => {
                self.regs.write(rd.index(), self.pc.wrapping_add(imm as u64));
            }
            I::Jal { rd, imm } => {
                let target = self.pc.wrapping_add(imm as u64);
                self.regs.write(rd.index(), self.npc);
                if rd == RegId::RA {
                    self.record_call(self.pc, target);
                }
                self.npc = target;
            }
            I::Jalr { rd, rs1, imm } => {
                // The LSB of the computed target is always discarded.
                let target = self.regs.read(rs1.index()).wrapping_add(imm as u64) & !1;
                let ret = self.npc;
                if rd == RegId::ZERO && rs1 == RegId::RA {
                    self.record_return();
                } else if rd == RegId::RA {
                    self.record_call(self.pc, target);
                }
                self.regs.write(rd.index(), ret);
                self.npc = target;
            }
            I::Branch { cond, rs1, rs2, imm } => {
                let a = self.regs.read(rs1.index());
                let b = self.regs.read(rs2.index());
                let taken = match cond {
                    BranchCond::Eq => a == b,
                    BranchCond::Ne => a != b,
                    BranchCond::Lt => (a as i64) < (b as i64),
                    BranchCond::Ge => (a as i64) >= (b as i64),
                    BranchCond::Ltu => a < b,
                    BranchCond::Geu => a >= b,
                };
                if taken {
                    self.npc = self.pc.wrapping_add(imm as u64);
                }
            }

            I::Load { width, rd, rs1, imm } => {
                let addr = self.regs.read(rs1.index()).wrapping_add(imm as u64);
                let size = width.bytes();
                if addr % u64::from(size) != 0 {
                    return ExecuteState::Trap(TrapCause::LoadMisalign(addr));
                }
                let Ok(raw) = self.memop(BusAction::Read, addr, size, 0) else {
                    return ExecuteState::Trap(TrapCause::LoadFault(addr));
                };
                let value = if width.is_signed() {
                    sign_extend(raw, u32::from(size) * 8)
                } else {
                    raw
                };
                self.regs.write(rd.index(), value);
            }
            I::Store { width, rs1, rs2, imm } => {
                let addr = self.regs.read(rs1.index()).wrapping_add(imm as u64);
                let size = width.bytes();
                if addr % u64::from(size) != 0 {
                    return ExecuteState::Trap(TrapCause::StoreMisalign(addr));
                }
                let value = self.regs.read(rs2.index());
                if self.memop(BusAction::Write, addr, size, value).is_err() {
                    return ExecuteState::Trap(TrapCause::StoreFault(addr));
                }
            }

            I::OpImm { op, word, rd, rs1, imm } => {
                let a = self.regs.read(rs1.index());
                let b = imm as u64;
                let value = alu(op, word, a, b);
                self.regs.write(rd.index(), value);
            }
            I::OpReg { op, word, rd, rs1, rs2 } => {
                let a = self.regs.read(rs1.index());
                let b = self.regs.read(rs2.index());
                let value = alu(op, word, a, b);
                self.regs.write(rd.index(), value);
            }

            I::Fence | I::FenceI => {
                // Single-ported functional memory: nothing to order.
            }
            I::Wfi => return ExecuteState::WaitIrq,
            I::Ecall => {
                let prv = MStatus(self.csrs.read(csr::MSTATUS)).prv();
                return ExecuteState::Trap(TrapCause::Ecall(prv));
            }
            I::Ebreak => {
                if self.halt_on_ebreak() {
                    return ExecuteState::Halted;
                }
                return ExecuteState::Trap(TrapCause::Breakpoint);
            }
            I::Mret => {
                let mut mstatus = MStatus(self.csrs.read(csr::MSTATUS));
                let prev = mstatus.prv1();
                self.npc = self.read_csr(csr::epc_for_prv(prev));
                mstatus.pop_trap();
                self.csrs.write_silent(csr::MSTATUS, mstatus.0);
            }

            I::Csr { op, rd, src, addr } => self.exec_csr(op, rd, src, addr),
            I::Amo { op, dbl, rd, rs1, rs2 } => {
                return self.exec_amo(op, dbl, rd, rs1, rs2);
            }

            I::FpLoad { .. }
            | I::FpStore { .. }
            | I::FpArith { .. }
            | I::FpCmp { .. }
            | I::FpCvtIntFp { .. }
            | I::FpCvtFpInt { .. }
            | I::FpCvtFpFp { .. }
            | I::FpMvToInt { .. }
            | I::FpMvFromInt { .. } => return self.execute_fp(&d.instr),
        }
        ExecuteState::Proceed
    }

    fn exec_csr(&mut self, op: CsrOp, rd: RegId, src: u8, addr: u16) {
        match op {
            CsrOp::Rw | CsrOp::Rwi => {
                let wr = if op == CsrOp::Rw {
                    self.regs.read(src as usize)
                } else {
                    u64::from(src)
                };
                // rd = x0 suppresses the read and its side effects.
                if rd != RegId::ZERO {
                    let old = self.read_csr(addr);
                    self.regs.write(rd.index(), old);
                }
                self.write_csr(addr, wr);
            }
            CsrOp::Rs | CsrOp::Rsi => {
                let old = self.read_csr(addr);
                self.regs.write(rd.index(), old);
                let bits = if op == CsrOp::Rs {
                    self.regs.read(src as usize)
                } else {
                    u64::from(src)
                };
                // rs1 = x0 suppresses the write entirely.
                if src != 0 {
                    self.write_csr(addr, old | bits);
                }
            }
            CsrOp::Rc | CsrOp::Rci => {
                let old = self.read_csr(addr);
                self.regs.write(rd.index(), old);
                let bits = if op == CsrOp::Rc {
                    self.regs.read(src as usize)
                } else {
                    u64::from(src)
                };
                if src != 0 {
                    self.write_csr(addr, old & !bits);
                }
            }
        }
    }

    fn exec_amo(
        &mut self,
        op: AmoOp,
        dbl: bool,
        rd: RegId,
        rs1: RegId,
        rs2: RegId,
    ) -> ExecuteState {
        let addr = self.regs.read(rs1.index());
        let size: u8 = if dbl { 8 } else { 4 };
        if addr % u64::from(size) != 0 {
            // AMO misalignment is store-side even for the read half.
            let cause = if op == AmoOp::Lr {
                TrapCause::LoadMisalign(addr)
            } else {
                TrapCause::StoreMisalign(addr)
            };
            return ExecuteState::Trap(cause);
        }
        let hart = self.hartid();
        let wide = |v: u64| if dbl { v } else { sign_extend(v, 32) };

        match op {
            AmoOp::Lr => {
                let Ok(old) = self.memop(BusAction::Read, addr, size, 0) else {
                    return ExecuteState::Trap(TrapCause::LoadFault(addr));
                };
                self.ctx.reservations.load_reserved(addr, size, hart);
                self.regs.write(rd.index(), wide(old));
            }
            AmoOp::Sc => {
                if self.ctx.reservations.store_conditional(addr, hart) {
                    let value = self.regs.read(rs2.index());
                    if self.memop(BusAction::Write, addr, size, value).is_err() {
                        return ExecuteState::Trap(TrapCause::StoreFault(addr));
                    }
                    self.regs.write(rd.index(), 0);
                } else {
                    self.regs.write(rd.index(), 1);
                }
            }
            _ => {
                let Ok(old) = self.memop(BusAction::Read, addr, size, 0) else {
                    return ExecuteState::Trap(TrapCause::StoreFault(addr));
                };
                let old_w = wide(old);
                let b = self.regs.read(rs2.index());
                let b_w = wide(b);
                let new = match op {
                    AmoOp::Swap => b,
                    AmoOp::Add => old_w.wrapping_add(b_w),
                    AmoOp::Xor => old ^ b,
                    AmoOp::And => old & b,
                    AmoOp::Or => old | b,
                    AmoOp::Min => {
                        if (old_w as i64) < (b_w as i64) { old } else { b }
                    }
                    AmoOp::Max => {
                        if (old_w as i64) > (b_w as i64) { old } else { b }
                    }
                    AmoOp::Minu => {
                        let (a, bb) = if dbl { (old, b) } else { (old & 0xffff_ffff, b & 0xffff_ffff) };
                        if a < bb { old } else { b }
                    }
                    AmoOp::Maxu => {
                        let (a, bb) = if dbl { (old, b) } else { (old & 0xffff_ffff, b & 0xffff_ffff) };
                        if a > bb { old } else { b }
                    }
                    AmoOp::Lr | AmoOp::Sc => unreachable!(),
                };
                if self.memop(BusAction::Write, addr, size, new).is_err() {
                    return ExecuteState::Trap(TrapCause::StoreFault(addr));
                }
                self.regs.write(rd.index(), old_w);
            }
        }
        ExecuteState::Proceed
    }
}

fn sign_extend(value: u64, bits: u32) -> u64 {
    let shift = 64 - bits;
    (((value << shift) as i64) >> shift) as u64
}

/// Shared ALU for the register and immediate forms; `word` selects the
/// RV64 32-bit subword behavior with sign-extension of the result.
fn alu(op: AluOp, word: bool, a: u64, b: u64) -> u64 {
    if word {
        let a32 = a as u32;
        let b32 = b as u32;
        let res = match op {
            AluOp::Add => a32.wrapping_add(b32),
            AluOp::Sub => a32.wrapping_sub(b32),
            AluOp::Sll => a32.wrapping_shl(b32 & 0x1f),
            AluOp::Srl => a32.wrapping_shr(b32 & 0x1f),
            AluOp::Sra => ((a32 as i32).wrapping_shr(b32 & 0x1f)) as u32,
            AluOp::Mul => a32.wrapping_mul(b32),
            AluOp::Div => {
                let (x, y) = (a32 as i32, b32 as i32);
                if y == 0 { 0 } else { x.wrapping_div(y) as u32 }
            }
            AluOp::Divu => {
                if b32 == 0 { 0 } else { a32 / b32 }
            }
            AluOp::Rem => {
                let (x, y) = (a32 as i32, b32 as i32);
                if y == 0 { 0 } else { x.wrapping_rem(y) as u32 }
            }
            AluOp::Remu => {
                if b32 == 0 { 0 } else { a32 % b32 }
            }
            // The remaining operations have no word form.
            _ => unreachable!("no 32-bit form for {op:?}"),
        };
        sign_extend(u64::from(res), 32)
    } else {
        match op {
            AluOp::Add => a.wrapping_add(b),
            AluOp::Sub => a.wrapping_sub(b),
            AluOp::Sll => a.wrapping_shl(b as u32 & 0x3f),
            AluOp::Srl => a.wrapping_shr(b as u32 & 0x3f),
            AluOp::Sra => ((a as i64).wrapping_shr(b as u32 & 0x3f)) as u64,
            AluOp::Slt => u64::from((a as i64) < (b as i64)),
            AluOp::Sltu => u64::from(a < b),
            AluOp::Xor => a ^ b,
            AluOp::Or => a | b,
            AluOp::And => a & b,
            AluOp::Mul => a.wrapping_mul(b),
            AluOp::Mulh => (((a as i64 as i128) * (b as i64 as i128)) >> 64) as u64,
            AluOp::Mulhsu => (((a as i64 as i128) * (b as i128)) >> 64) as u64,
            AluOp::Mulhu => (((a as u128) * (b as u128)) >> 64) as u64,
            AluOp::Div => {
                let (x, y) = (a as i64, b as i64);
                if y == 0 { 0 } else { x.wrapping_div(y) as u64 }
            }
            AluOp::Divu => {
                if b == 0 { 0 } else { a / b }
            }
            AluOp::Rem => {
                let (x, y) = (a as i64, b as i64);
                if y == 0 { 0 } else { x.wrapping_rem(y) as u64 }
            }
            AluOp::Remu => {
                if b == 0 { 0 } else { a % b }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn word_ops_sign_extend() {
        assert_eq!(alu(AluOp::Add, true, 0x7fff_ffff, 1), 0xffff_ffff_8000_0000);
        assert_eq!(alu(AluOp::Sub, true, 0, 1), u64::MAX);
    }

    #[test_case(AluOp::Div, false ; "div")]
    #[test_case(AluOp::Divu, false ; "divu")]
    #[test_case(AluOp::Rem, false ; "rem")]
    #[test_case(AluOp::Remu, false ; "remu")]
    #[test_case(AluOp::Div, true ; "divw")]
    #[test_case(AluOp::Divu, true ; "divuw")]
    #[test_case(AluOp::Rem, true ; "remw")]
    #[test_case(AluOp::Remu, true ; "remuw")]
    fn division_by_zero_is_zero(op: AluOp, word: bool) {
        assert_eq!(alu(op, word, 42, 0), 0);
    }

    #[test]
    fn signed_division_overflow_wraps() {
        let min = i64::MIN as u64;
        assert_eq!(alu(AluOp::Div, false, min, u64::MAX), min);
        assert_eq!(alu(AluOp::Rem, false, min, u64::MAX), 0);
    }

    #[test]
    fn mulh_takes_the_high_half() {
        assert_eq!(alu(AluOp::Mulhu, false, u64::MAX, 2), 1);
        assert_eq!(alu(AluOp::Mulh, false, (-1i64) as u64, 2), u64::MAX);
    }

    #[test]
    fn shifts_mask_their_amounts() {
        // 64-bit shifts use six amount bits, word shifts five.
        assert_eq!(alu(AluOp::Sll, false, 1, 64), 1);
        assert_eq!(alu(AluOp::Sll, true, 1, 32), 1);
        assert_eq!(alu(AluOp::Sra, false, u64::MAX, 63), u64::MAX);
    }
}
