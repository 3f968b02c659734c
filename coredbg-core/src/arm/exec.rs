//! ARM/Thumb execution semantics.
//!
//! Flag math uses the bitwise carry/overflow formulas of the two's
//! complement adder: for ADD-class results
//! `C = MSB((A & M) | (M & ~R) | (A & ~R))`,
//! `V = MSB((A & M & ~R) | (~A & ~M & R))`; SUB-class computes `A + ~M + 1`
//! and reports `C = ~MSB((~A & M) | (M & R) | (R & ~A))`,
//! `V = MSB((A & ~M & ~R) | (~A & M & R))`.

use coredbg_arm::shift::shift_c;
use coredbg_arm::{
    ArmInstr, ArmKind, DpOp, ItState, MemOffset, MemOp, Operand2, ProgramStatus, SetFlags,
    ShiftBy,
};
use coredbg_bus::{BusAction, MemoryBus};
use tracing::warn;

use crate::state::{ExecuteState, TrapCause};

use super::{ArmCore, EXC_RETURN, EXC_SVC};

impl<B: MemoryBus> ArmCore<B> {
    /// Execute one decoded instruction of `len` bytes. `npc` already
    /// points at the linear successor.
    pub(crate) fn execute(&mut self, instr: &ArmInstr, len: u8) -> ExecuteState {
        let cond = self.effective_cond(instr);
        let in_it = self.cpsr.t() && self.it.in_block();
        let is_it_directive = matches!(instr.kind, ArmKind::It { .. });
        let passed = cond.passed(self.cpsr);

        if in_it && !self.it.last_in_block() && is_branch_kind(&instr.kind) {
            // Branches may only close an IT block.
            warn!(pc = self.pc, "branch inside an IT block before its last slot");
        }

        let state = if passed {
            self.dispatch(instr, len, in_it)
        } else {
            ExecuteState::Proceed
        };

        // The mask shifts whether the slot executed or was squashed; the
        // IT directive itself is not a slot.
        if self.cpsr.t() && !is_it_directive && in_it {
            self.it.advance();
        }
        state
    }

    fn dispatch(&mut self, instr: &ArmInstr, len: u8, in_it: bool) -> ExecuteState {
        use ArmKind as K;
        match instr.kind {
            K::DataProc { op, set_flags, rn, rd, op2 } => {
                self.exec_dataproc(op, set_flags, rn, rd, &op2, in_it)
            }
            K::Movw { rd, imm } => {
                self.write_reg(rd, u32::from(imm));
                ExecuteState::Proceed
            }
            K::Movt { rd, imm } => {
                let low = self.read_reg(rd) & 0xffff;
                self.write_reg(rd, u32::from(imm) << 16 | low);
                ExecuteState::Proceed
            }
            K::Mul { set_flags, rd, rn, rm, acc } => {
                let mut res = self.read_reg(rn).wrapping_mul(self.read_reg(rm));
                if let Some(ra) = acc {
                    res = res.wrapping_add(self.read_reg(ra));
                }
                self.write_reg(rd, res);
                if self.flags_update(set_flags, in_it) {
                    self.cpsr.set_nz(res);
                }
                ExecuteState::Proceed
            }
            K::MulLong { signed, accumulate, set_flags, rdlo, rdhi, rn, rm } => {
                let a = self.read_reg(rn);
                let b = self.read_reg(rm);
                let mut res: u64 = if signed {
                    (i64::from(a as i32) * i64::from(b as i32)) as u64
                } else {
                    u64::from(a) * u64::from(b)
                };
                if accumulate {
                    let acc = u64::from(self.read_reg(rdhi)) << 32
                        | u64::from(self.read_reg(rdlo));
                    res = res.wrapping_add(acc);
                }
                self.write_reg(rdlo, res as u32);
                self.write_reg(rdhi, (res >> 32) as u32);
                if self.flags_update(set_flags, in_it) {
                    self.cpsr.set_n(res >> 63 != 0);
                    self.cpsr.set_z(res == 0);
                }
                ExecuteState::Proceed
            }
            K::Div { signed, rd, rn, rm } => {
                let num = self.read_reg(rn);
                let den = self.read_reg(rm);
                // Divide by zero yields zero at this layer, no exception.
                let res = if den == 0 {
                    0
                } else if signed {
                    (num as i32).wrapping_div(den as i32) as u32
                } else {
                    num / den
                };
                self.write_reg(rd, res);
                ExecuteState::Proceed
            }
            K::Mem { op, load, rn, rt, offset, p, u, w } => {
                self.exec_mem(op, load, rn, rt, &offset, p, u, w)
            }
            K::BlockMem { load, rn, reglist, p, u, s, w } => {
                self.exec_block(load, rn, reglist, p, u, s, w)
            }
            K::Branch { link, offset } => {
                let base = self.read_reg(15);
                if link {
                    let ret = self.pc.wrapping_add(u32::from(len));
                    let lr = if self.cpsr.t() { ret | 1 } else { ret };
                    self.write_reg(14, lr);
                    self.record_call_edge(base.wrapping_add(offset as u32));
                }
                self.branch(base.wrapping_add(offset as u32));
                ExecuteState::Proceed
            }
            K::BranchExchange { link, rm } => {
                let target = self.read_reg(rm);
                if link {
                    let ret = self.pc.wrapping_add(u32::from(len));
                    let lr = if self.cpsr.t() { ret | 1 } else { ret };
                    self.write_reg(14, lr);
                    self.record_call_edge(target & !1);
                } else if rm == 14 {
                    self.stack_trace.pop_return();
                }
                if target >= EXC_RETURN & !0xf {
                    return self.exit_exception();
                }
                self.branch_exchange(target);
                ExecuteState::Proceed
            }
            K::BlxImm { offset } => {
                let base = self.read_reg(15);
                let ret = self.pc.wrapping_add(4);
                self.write_reg(14, ret);
                // ARM-state BLX always lands in Thumb.
                self.set_thumb(true);
                self.branch(base.wrapping_add(offset as u32));
                self.record_call_edge(self.npc);
                ExecuteState::Proceed
            }
            K::Mrs { rd, spsr } => {
                let value = if spsr { self.spsr() } else { self.cpsr.0 };
                self.write_reg(rd, value);
                ExecuteState::Proceed
            }
            K::Msr { spsr, mask, op2 } => {
                let value = self.operand2_value(&op2).0;
                self.exec_msr(spsr, mask, value);
                ExecuteState::Proceed
            }
            K::Extend { signed, byte, rd, rm, rotation } => {
                let src = self.read_reg(rm).rotate_right(u32::from(rotation));
                let res = match (signed, byte) {
                    (true, true) => src as u8 as i8 as i32 as u32,
                    (true, false) => src as u16 as i16 as i32 as u32,
                    (false, true) => u32::from(src as u8),
                    (false, false) => u32::from(src as u16),
                };
                self.write_reg(rd, res);
                ExecuteState::Proceed
            }
            K::Rev { style, rd, rm } => {
                use coredbg_arm::RevStyle;
                let src = self.read_reg(rm);
                let res = match style {
                    RevStyle::Word => src.swap_bytes(),
                    RevStyle::Half => {
                        let lo = u32::from((src as u16).swap_bytes());
                        let hi = u32::from(((src >> 16) as u16).swap_bytes());
                        hi << 16 | lo
                    }
                    RevStyle::SignedHalf => {
                        (src as u16).swap_bytes() as i16 as i32 as u32
                    }
                };
                self.write_reg(rd, res);
                ExecuteState::Proceed
            }
            K::Clz { rd, rm } => {
                let res = self.read_reg(rm).leading_zeros();
                self.write_reg(rd, res);
                ExecuteState::Proceed
            }
            K::Bfx { signed, rd, rn, lsb, width } => {
                let src = self.read_reg(rn);
                let field = (src >> lsb) & mask_bits(width);
                let res = if signed {
                    let sign = 1u32 << (width - 1);
                    if field & sign != 0 { field | !mask_bits(width) } else { field }
                } else {
                    field
                };
                self.write_reg(rd, res);
                ExecuteState::Proceed
            }
            K::Svc { .. } => {
                let ret = self.pc.wrapping_add(u32::from(len));
                self.enter_exception(EXC_SVC, ret)
            }
            K::Bkpt { .. } => ExecuteState::Halted,
            K::It { firstcond, mask } => {
                if in_it {
                    warn!(pc = self.pc, "IT inside an IT block is UNPREDICTABLE");
                }
                if firstcond == 0xf || (firstcond == 0xe && mask.count_ones() != 1) {
                    warn!(pc = self.pc, firstcond, "UNPREDICTABLE IT condition");
                }
                let mut it = ItState::new();
                it.start(firstcond, mask);
                self.it = it;
                ExecuteState::Proceed
            }
            K::Cbz { nonzero, rn, offset } => {
                let val = self.read_reg(rn);
                if (val == 0) != nonzero {
                    let base = self.read_reg(15);
                    self.branch(base.wrapping_add(offset));
                }
                ExecuteState::Proceed
            }
            K::TableBranch { rn, rm, halfword } => {
                let base = if rn == 15 { self.read_reg(15) } else { self.read_reg(rn) };
                let idx = self.read_reg(rm);
                let (addr, size) = if halfword {
                    (base.wrapping_add(idx << 1), 2)
                } else {
                    (base.wrapping_add(idx), 1)
                };
                let Ok(entry) = self.memop(BusAction::Read, addr, size, 0) else {
                    return ExecuteState::Trap(TrapCause::LoadFault(u64::from(addr)));
                };
                let target = self.read_reg(15).wrapping_add(entry << 1);
                self.branch(target);
                ExecuteState::Proceed
            }
            K::Adr { rd, offset } => {
                let base = self.read_reg(15) & !3;
                self.write_reg(rd, base.wrapping_add(offset as u32));
                ExecuteState::Proceed
            }
            K::Nop => ExecuteState::Proceed,
        }
    }

    fn flags_update(&self, set_flags: SetFlags, in_it: bool) -> bool {
        match set_flags {
            SetFlags::No => false,
            SetFlags::Yes => true,
            SetFlags::NotInIt => !in_it,
        }
    }

    /// Evaluate operand 2, returning the value and the shifter carry-out.
    fn operand2_value(&self, op2: &Operand2) -> (u32, bool) {
        match *op2 {
            Operand2::Const { value, carry } => (value, carry.unwrap_or(self.cpsr.c())),
            Operand2::Reg { rm, shift } => {
                let value = self.read_reg(rm);
                match shift {
                    ShiftBy::Imm(ty, amount) => shift_c(value, ty, amount, self.cpsr.c()),
                    ShiftBy::Reg(ty, rs) => {
                        let amount = self.read_reg(rs) & 0xff;
                        // Register-shift amount 0 keeps value and carry.
                        shift_c(value, ty, amount, self.cpsr.c())
                    }
                }
            }
        }
    }

    fn exec_dataproc(
        &mut self,
        op: DpOp,
        set_flags: SetFlags,
        rn: u8,
        rd: u8,
        op2: &Operand2,
        in_it: bool,
    ) -> ExecuteState {
        let a = self.read_reg(rn);
        let (m, shifter_c) = self.operand2_value(op2);
        let carry_in = u32::from(self.cpsr.c());
        let update = self.flags_update(set_flags, in_it) && rd != 15;

        let mut logical_result = |core: &mut Self, res: u32, writeback: bool| {
            if writeback {
                core.write_reg(rd, res);
            }
            if update {
                core.cpsr.set_nz(res);
                core.cpsr.set_c(shifter_c);
            }
        };

        match op {
            DpOp::And => {
                let res = a & m;
                logical_result(self, res, true);
            }
            DpOp::Eor => {
                let res = a ^ m;
                logical_result(self, res, true);
            }
            DpOp::Tst => logical_result(self, a & m, false),
            DpOp::Teq => logical_result(self, a ^ m, false),
            DpOp::Orr => {
                let res = a | m;
                logical_result(self, res, true);
            }
            DpOp::Mov => logical_result(self, m, true),
            DpOp::Bic => {
                let res = a & !m;
                logical_result(self, res, true);
            }
            DpOp::Mvn => logical_result(self, !m, true),

            DpOp::Add | DpOp::Adc | DpOp::Cmn => {
                let mut res = a.wrapping_add(m);
                if op == DpOp::Adc {
                    res = res.wrapping_add(carry_in);
                }
                if op != DpOp::Cmn {
                    self.write_reg(rd, res);
                }
                if update {
                    self.set_add_flags(a, m, res);
                }
            }
            DpOp::Sub | DpOp::Sbc | DpOp::Cmp | DpOp::Rsb | DpOp::Rsc => {
                let (x, y) = if matches!(op, DpOp::Rsb | DpOp::Rsc) { (m, a) } else { (a, m) };
                let mut res = x.wrapping_sub(y);
                if matches!(op, DpOp::Sbc | DpOp::Rsc) {
                    res = res.wrapping_add(carry_in).wrapping_sub(1);
                }
                if op != DpOp::Cmp {
                    self.write_reg(rd, res);
                }
                if update {
                    self.set_sub_flags(x, y, res);
                }
            }
        }
        ExecuteState::Proceed
    }

    fn set_add_flags(&mut self, a: u32, m: u32, res: u32) {
        let c = ((a & m) | (m & !res) | (a & !res)) >> 31;
        let v = ((a & m & !res) | (!a & !m & res)) >> 31;
        self.cpsr.set_c(c != 0);
        self.cpsr.set_v(v != 0);
        self.cpsr.set_nz(res);
    }

    fn set_sub_flags(&mut self, a: u32, m: u32, res: u32) {
        let c = !(((!a & m) | (m & res) | (res & !a)) >> 31) & 1;
        let v = ((a & !m & !res) | (!a & m & res)) >> 31;
        self.cpsr.set_c(c != 0);
        self.cpsr.set_v(v != 0);
        self.cpsr.set_nz(res);
    }

    #[allow(clippy::too_many_arguments)]
    fn exec_mem(
        &mut self,
        op: MemOp,
        load: bool,
        rn: u8,
        rt: u8,
        offset: &MemOffset,
        p: bool,
        u: bool,
        w: bool,
    ) -> ExecuteState {
        let base = if rn == 15 { self.read_reg(15) & !3 } else { self.read_reg(rn) };
        let off = match *offset {
            MemOffset::Imm(imm) => imm,
            MemOffset::Reg { rm, shift: (ty, amount) } => {
                shift_c(self.read_reg(rm), ty, amount, self.cpsr.c()).0
            }
        };
        let offset_addr = if u { base.wrapping_add(off) } else { base.wrapping_sub(off) };
        let addr = if p { offset_addr } else { base };

        let size = op.bytes();
        if u64::from(addr) % u64::from(size.min(4)) != 0 {
            let cause = if load {
                TrapCause::LoadMisalign(u64::from(addr))
            } else {
                TrapCause::StoreMisalign(u64::from(addr))
            };
            return ExecuteState::Trap(cause);
        }

        if load {
            if op == MemOp::Dual {
                for i in 0..2u32 {
                    let Ok(v) = self.memop(BusAction::Read, addr + 4 * i, 4, 0) else {
                        return ExecuteState::Trap(TrapCause::LoadFault(u64::from(addr)));
                    };
                    self.write_reg(rt + i as u8, v);
                }
            } else {
                let Ok(raw) = self.memop(BusAction::Read, addr, size, 0) else {
                    return ExecuteState::Trap(TrapCause::LoadFault(u64::from(addr)));
                };
                let value = match op {
                    MemOp::SignedByte => raw as u8 as i8 as i32 as u32,
                    MemOp::SignedHalf => raw as u16 as i16 as i32 as u32,
                    _ => raw,
                };
                if rt == 15 {
                    self.branch_exchange(value);
                } else {
                    self.write_reg(rt, value);
                }
            }
        } else if op == MemOp::Dual {
            for i in 0..2u32 {
                let v = self.read_reg(rt + i as u8);
                if self.memop(BusAction::Write, addr + 4 * i, 4, v).is_err() {
                    return ExecuteState::Trap(TrapCause::StoreFault(u64::from(addr)));
                }
            }
        } else {
            let value = self.read_reg(rt);
            if self.memop(BusAction::Write, addr, size, value).is_err() {
                return ExecuteState::Trap(TrapCause::StoreFault(u64::from(addr)));
            }
        }

        if w || !p {
            self.write_reg(rn, offset_addr);
        }
        ExecuteState::Proceed
    }

    #[allow(clippy::too_many_arguments)]
    fn exec_block(
        &mut self,
        load: bool,
        rn: u8,
        reglist: u16,
        p: bool,
        u: bool,
        s: bool,
        w: bool,
    ) -> ExecuteState {
        if s {
            warn!(pc = self.pc, "LDM/STM user-bank transfer treated as current bank");
        }
        if w && !p && !load {
            // Architecturally UNPREDICTABLE; the model keeps the
            // writeback, matching the companion RTL's behavior.
            warn!(pc = self.pc, "STM with post-indexed writeback is UNPREDICTABLE");
        }
        let count = u32::from(reglist.count_ones());
        let base = self.read_reg(rn);
        let lowest = if u {
            if p { base.wrapping_add(4) } else { base }
        } else if p {
            base.wrapping_sub(4 * count)
        } else {
            base.wrapping_sub(4 * count).wrapping_add(4)
        };

        // Registers transfer in ascending order from the lowest address.
        let mut addr = lowest;
        let mut pc_loaded = None;
        for r in 0..16u8 {
            if reglist & (1 << r) == 0 {
                continue;
            }
            if load {
                let Ok(v) = self.memop(BusAction::Read, addr, 4, 0) else {
                    return ExecuteState::Trap(TrapCause::LoadFault(u64::from(addr)));
                };
                if r == 15 {
                    pc_loaded = Some(v);
                } else {
                    self.write_reg(r, v);
                }
            } else {
                let v = self.read_reg(r);
                if self.memop(BusAction::Write, addr, 4, v).is_err() {
                    return ExecuteState::Trap(TrapCause::StoreFault(u64::from(addr)));
                }
            }
            addr = addr.wrapping_add(4);
        }

        if w {
            let wb = if u { base.wrapping_add(4 * count) } else { base.wrapping_sub(4 * count) };
            self.write_reg(rn, wb);
        }
        if let Some(target) = pc_loaded {
            if target >= EXC_RETURN & !0xf {
                return self.exit_exception();
            }
            self.stack_trace.pop_return();
            self.branch_exchange(target);
        }
        ExecuteState::Proceed
    }

    fn exec_msr(&mut self, spsr: bool, mask: u8, value: u32) {
        let mut field_mask = 0u32;
        if mask & 0x8 != 0 {
            field_mask |= 0xff00_0000;
        }
        if mask & 0x4 != 0 {
            field_mask |= 0x00ff_0000;
        }
        if mask & 0x2 != 0 {
            field_mask |= 0x0000_ff00;
        }
        if mask & 0x1 != 0 {
            field_mask |= 0x0000_00ff;
        }
        if spsr {
            let merged = (self.spsr() & !field_mask) | (value & field_mask);
            self.set_spsr(merged);
        } else {
            let merged = (self.cpsr.0 & !field_mask) | (value & field_mask);
            let new_mode = ProgramStatus(merged).mode();
            self.change_mode(new_mode);
            // Mode bits were applied by the switch; merge the rest.
            self.cpsr = ProgramStatus((merged & !0x1f) | (self.cpsr.0 & 0x1f));
        }
    }

    fn record_call_edge(&mut self, target: u32) {
        self.stack_trace.push_call(u64::from(self.pc), u64::from(target));
    }
}

fn mask_bits(width: u8) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

fn is_branch_kind(kind: &ArmKind) -> bool {
    matches!(
        kind,
        ArmKind::Branch { .. }
            | ArmKind::BranchExchange { .. }
            | ArmKind::BlxImm { .. }
            | ArmKind::Cbz { .. }
            | ArmKind::TableBranch { .. }
    )
}
