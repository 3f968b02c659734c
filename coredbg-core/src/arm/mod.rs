//! ARMv7 functional core with mixed ARM/Thumb execution.

mod exec;

use coredbg_arm::{
    decode_arm, decode_thumb, disasm, ArmInstr, ArmTable, Cond, CpuMode, ItState,
    ProgramStatus,
};
use coredbg_bus::{BusAction, BusTransaction, MemoryBus};
use tracing::{debug, trace, warn};

use crate::config::CoreConfig;
use crate::state::{CoreMode, ExecuteState, TrapCause};
use crate::trace::{MemTrace, StackTraceBuffer, TraceBuffer, TraceRecord};
use crate::SimContext;

/// Fetch width selector: the T bit as first-class core state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstructionMode {
    /// 32-bit ARM encodings.
    #[default]
    Arm,
    /// 16/32-bit Thumb-2 encodings.
    Thumb,
}

/// Banked SP/LR/SPSR storage for the exception modes.
#[derive(Debug, Default, Clone)]
struct BankedRegs {
    sp: [u32; 7],
    lr: [u32; 7],
    spsr: [u32; 7],
}

fn bank_slot(mode: CpuMode) -> usize {
    match mode {
        CpuMode::User | CpuMode::System => 0,
        CpuMode::Fiq => 1,
        CpuMode::Irq => 2,
        CpuMode::Supervisor => 3,
        CpuMode::Abort => 4,
        CpuMode::Undefined => 5,
    }
}

/// One ARMv7 core.
pub struct ArmCore<B: MemoryBus> {
    cfg: CoreConfig,
    ctx: SimContext<B>,
    table: ArmTable,
    regs: [u32; 16],
    banked: BankedRegs,
    pub(crate) cpsr: ProgramStatus,
    pub(crate) it: ItState,
    pub(crate) pc: u32,
    pub(crate) npc: u32,
    mode: CoreMode,
    step_cnt: u64,
    irq_line: bool,
    halt_req: bool,
    pub(crate) mem_ops: Vec<MemTrace>,
    reg_writes: Vec<(String, u64, u64)>,
    trace: TraceBuffer,
    stack_trace: StackTraceBuffer,
}

impl<B: MemoryBus> std::fmt::Debug for ArmCore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmCore")
            .field("pc", &self.pc)
            .field("thumb", &self.cpsr.t())
            .field("steps", &self.step_cnt)
            .finish()
    }
}

impl<B: MemoryBus> ArmCore<B> {
    /// Build and reset one core.
    pub fn new(cfg: CoreConfig, ctx: SimContext<B>) -> Self {
        let mut core = Self {
            table: ArmTable::armv7(),
            regs: [0; 16],
            banked: BankedRegs::default(),
            cpsr: ProgramStatus::default(),
            it: ItState::new(),
            pc: 0,
            npc: 0,
            mode: CoreMode::Running,
            step_cnt: 0,
            irq_line: false,
            halt_req: false,
            mem_ops: Vec::new(),
            reg_writes: Vec::new(),
            trace: TraceBuffer::new(cfg.trace_depth),
            stack_trace: StackTraceBuffer::new(),
            cfg,
            ctx,
        };
        core.reset();
        core
    }

    /// Power-on reset.
    pub fn reset(&mut self) {
        self.regs = [0; 16];
        self.banked = BankedRegs::default();
        self.cpsr = ProgramStatus::default();
        self.it = ItState::new();
        self.pc = self.cfg.reset_vector as u32;
        self.npc = self.pc;
        self.stack_trace.clear();
        debug!(pc = self.pc, "arm core reset");
    }

    /// Current fetch mode, derived from the T bit.
    pub fn instruction_mode(&self) -> InstructionMode {
        if self.cpsr.t() {
            InstructionMode::Thumb
        } else {
            InstructionMode::Arm
        }
    }

    /// Retired-instruction counter.
    pub fn steps(&self) -> u64 {
        self.step_cnt
    }

    /// Address of the instruction executed by the last step.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Address the next step will fetch from.
    pub fn next_pc(&self) -> u32 {
        self.npc
    }

    /// Raw register read (no pipeline offset) for tests and tooling.
    pub fn reg(&self, r: u8) -> u32 {
        self.regs[(r & 0xf) as usize]
    }

    /// Raw register write for tests and tooling.
    pub fn set_reg(&mut self, r: u8, value: u32) {
        self.regs[(r & 0xf) as usize] = value;
    }

    /// Jump the core to `addr`, selecting Thumb from the LSB.
    pub fn set_pc(&mut self, addr: u32) {
        self.set_thumb(addr & 1 != 0);
        self.pc = addr & !1;
        self.npc = self.pc;
    }

    /// Current program status.
    pub fn psr(&self) -> ProgramStatus {
        self.cpsr
    }

    /// Overwrite the program status (test setup).
    pub fn set_psr(&mut self, psr: ProgramStatus) {
        self.cpsr = psr;
    }

    /// Run state.
    pub fn mode(&self) -> CoreMode {
        self.mode
    }

    /// Trace buffer.
    pub fn trace(&self) -> &TraceBuffer {
        &self.trace
    }

    /// Call/return edges.
    pub fn stack_trace(&self) -> &StackTraceBuffer {
        &self.stack_trace
    }

    /// Assert or clear the external IRQ line.
    pub fn set_irq(&mut self, level: bool) {
        self.irq_line = level;
    }

    /// Latch an external halt request.
    pub fn post_halt_request(&mut self) {
        self.halt_req = true;
    }

    /// Resume a halted core.
    pub fn resume(&mut self) {
        self.mode = CoreMode::Running;
    }

    /// Register read as instructions see it: R15 is the fetch PC plus the
    /// architectural pipeline offset.
    pub(crate) fn read_reg(&self, r: u8) -> u32 {
        if r == 15 {
            self.pc.wrapping_add(if self.cpsr.t() { 4 } else { 8 })
        } else {
            self.regs[r as usize]
        }
    }

    /// Register write; writing R15 requests a branch with interworking.
    pub(crate) fn write_reg(&mut self, r: u8, value: u32) {
        if r == 15 {
            self.branch_exchange(value);
            return;
        }
        let old = self.regs[r as usize];
        self.regs[r as usize] = value;
        if self.trace.enabled() {
            self.reg_writes.push((
                coredbg_arm::REG_NAMES[r as usize].to_string(),
                u64::from(old),
                u64::from(value),
            ));
        }
    }

    /// Branch to `target`, selecting the instruction mode from its LSB.
    pub(crate) fn branch_exchange(&mut self, target: u32) {
        self.set_thumb(target & 1 != 0);
        self.npc = target & !1;
    }

    /// Branch without interworking.
    pub(crate) fn branch(&mut self, target: u32) {
        self.npc = target & !1;
    }

    /// Flip the T bit; the fetch stage reads it next cycle.
    pub(crate) fn set_thumb(&mut self, thumb: bool) {
        self.cpsr.set_t(thumb);
    }

    /// CPSR mode change with banked SP/LR/SPSR swap.
    pub(crate) fn change_mode(&mut self, new_mode: CpuMode) {
        let old_mode = self.cpsr.mode();
        if old_mode == new_mode {
            return;
        }
        let old_slot = bank_slot(old_mode);
        let new_slot = bank_slot(new_mode);
        self.banked.sp[old_slot] = self.regs[13];
        self.banked.lr[old_slot] = self.regs[14];
        self.regs[13] = self.banked.sp[new_slot];
        self.regs[14] = self.banked.lr[new_slot];
        self.cpsr.set_mode(new_mode);
    }

    /// SPSR of the current mode (meaningless in User/System).
    pub(crate) fn spsr(&self) -> u32 {
        self.banked.spsr[bank_slot(self.cpsr.mode())]
    }

    pub(crate) fn set_spsr(&mut self, value: u32) {
        self.banked.spsr[bank_slot(self.cpsr.mode())] = value;
    }

    /// Issue one data transaction, capturing it for the trace record.
    pub(crate) fn memop(
        &mut self,
        action: BusAction,
        addr: u32,
        xsize: u8,
        value: u32,
    ) -> Result<u32, ()> {
        let mut t = match action {
            BusAction::Read => BusTransaction::read(u64::from(addr), xsize),
            BusAction::Write => BusTransaction::write(u64::from(addr), xsize, u64::from(value)),
        }
        .with_source(self.cfg.hartid as u8);
        self.ctx.bus.dma_memop(&mut t).map_err(|_| ())?;
        self.mem_ops.push(MemTrace {
            write: action == BusAction::Write,
            addr: u64::from(addr),
            size: xsize,
            data: t.payload,
        });
        Ok(t.payload as u32)
    }

    /// Exception entry: stack {xPSR, return-address|T, LR, R12, R3..R0},
    /// load the handler from the vector table and set EXC_RETURN in LR.
    ///
    /// The stacked frame carries all the state an exception swaps, so
    /// entry does not touch the banked-mode registers; M[4:0] changes
    /// only through MSR.
    pub(crate) fn enter_exception(&mut self, index: u32, return_addr: u32) -> ExecuteState {
        let frame = [
            self.regs[0],
            self.regs[1],
            self.regs[2],
            self.regs[3],
            self.regs[12],
            self.regs[14],
            return_addr | u32::from(self.cpsr.t()),
            self.cpsr.0,
        ];
        let mut sp = self.regs[13];
        for word in frame.iter().rev() {
            sp = sp.wrapping_sub(4);
            if self.memop(BusAction::Write, sp, 4, *word).is_err() {
                return ExecuteState::Trap(TrapCause::StoreFault(u64::from(sp)));
            }
        }
        self.write_reg(13, sp);
        self.set_spsr(self.cpsr.0);

        let Ok(vector) = self.memop(BusAction::Read, 4 * index, 4, 0) else {
            return ExecuteState::Trap(TrapCause::LoadFault(u64::from(4 * index)));
        };
        self.write_reg(14, EXC_RETURN);
        self.cpsr.set_i(true);
        self.set_thumb(vector & 1 != 0);
        self.npc = vector & !1;
        self.it = ItState::new();
        debug!(index, handler = self.npc, "exception entry");
        ExecuteState::Proceed
    }

    /// Exception return: unstack the frame pushed by `enter_exception`.
    pub(crate) fn exit_exception(&mut self) -> ExecuteState {
        let mut sp = self.regs[13];
        let mut frame = [0u32; 8];
        for slot in frame.iter_mut() {
            let Ok(v) = self.memop(BusAction::Read, sp, 4, 0) else {
                return ExecuteState::Trap(TrapCause::LoadFault(u64::from(sp)));
            };
            *slot = v;
            sp = sp.wrapping_add(4);
        }
        let [r0, r1, r2, r3, r12, lr, ret, psr] = frame;
        self.write_reg(0, r0);
        self.write_reg(1, r1);
        self.write_reg(2, r2);
        self.write_reg(3, r3);
        self.write_reg(12, r12);
        self.write_reg(14, lr);
        self.write_reg(13, sp);
        // Leaving the handler mode swaps the banked SP/LR back in; the
        // unwound values above stay with the handler's bank.
        let target = ProgramStatus(psr);
        self.change_mode(target.mode());
        self.cpsr = ProgramStatus((psr & !0x1f) | (self.cpsr.0 & 0x1f));
        self.set_thumb(ret & 1 != 0);
        self.npc = ret & !1;
        debug!(ret = self.npc, "exception return");
        ExecuteState::Proceed
    }

    /// Run one instruction.
    pub fn step(&mut self) -> ExecuteState {
        if self.halt_req {
            self.halt_req = false;
            self.mode = CoreMode::Halted;
        }
        if self.mode == CoreMode::Halted {
            return ExecuteState::Halted;
        }

        self.pc = self.npc;

        // Asynchronous interrupts wait for the IT block to drain.
        if self.irq_line && !self.cpsr.i() && !self.it.in_block() {
            let ret = self.pc;
            let state = self.enter_exception(EXC_IRQ_BASE, ret);
            if state != ExecuteState::Proceed {
                return state;
            }
            self.pc = self.npc;
        }

        let state = self.fetch_and_execute();
        self.step_cnt += 1;
        state
    }

    fn fetch_and_execute(&mut self) -> ExecuteState {
        let thumb = self.cpsr.t();
        let align: u32 = if thumb { 2 } else { 4 };
        if self.pc % align != 0 {
            warn!(pc = self.pc, "misaligned fetch");
            return ExecuteState::Trap(TrapCause::InstrMisalign(u64::from(self.pc)));
        }

        let (instr, len, raw) = if thumb {
            let Ok(h1) = self.fetch_half(self.pc) else {
                return ExecuteState::Trap(TrapCause::InstrFault(u64::from(self.pc)));
            };
            let h2 = if coredbg_arm::is_thumb32(h1) {
                match self.fetch_half(self.pc.wrapping_add(2)) {
                    Ok(h) => h,
                    Err(()) => {
                        return ExecuteState::Trap(TrapCause::InstrFault(u64::from(
                            self.pc + 2,
                        )))
                    }
                }
            } else {
                0
            };
            match decode_thumb(h1, h2) {
                Ok((instr, len)) => {
                    let raw = if len == 4 {
                        u32::from(h1) << 16 | u32::from(h2)
                    } else {
                        u32::from(h1)
                    };
                    (instr, len, raw)
                }
                Err(_) => {
                    warn!(pc = self.pc, h1, "undefined thumb instruction");
                    return ExecuteState::Trap(TrapCause::InstrIllegal(u32::from(h1)));
                }
            }
        } else {
            let Ok(word) = self.fetch_word(self.pc) else {
                return ExecuteState::Trap(TrapCause::InstrFault(u64::from(self.pc)));
            };
            match decode_arm(&self.table, word) {
                Ok(instr) => (instr, 4u8, word),
                Err(_) => {
                    warn!(pc = self.pc, word, "undefined arm instruction");
                    return ExecuteState::Trap(TrapCause::InstrIllegal(word));
                }
            }
        };

        self.npc = self.pc.wrapping_add(u32::from(len));
        let state = self.execute(&instr, len);
        self.commit_trace(&instr, raw, len);
        trace!(step = self.step_cnt, pc = self.pc, raw, "executed");
        state
    }

    fn fetch_half(&mut self, addr: u32) -> Result<u16, ()> {
        let mut t = BusTransaction::read(u64::from(addr), 2);
        self.ctx.bus.dma_memop(&mut t).map_err(|_| ())?;
        Ok(t.payload as u16)
    }

    fn fetch_word(&mut self, addr: u32) -> Result<u32, ()> {
        let mut t = BusTransaction::read(u64::from(addr), 4);
        self.ctx.bus.dma_memop(&mut t).map_err(|_| ())?;
        Ok(t.payload as u32)
    }

    fn commit_trace(&mut self, instr: &ArmInstr, raw: u32, len: u8) {
        if !self.trace.enabled() {
            self.reg_writes.clear();
            self.mem_ops.clear();
            return;
        }
        let record = TraceRecord {
            step: self.step_cnt,
            pc: u64::from(self.pc),
            raw,
            len,
            mnemonic: disasm::format(instr),
            reg_writes: std::mem::take(&mut self.reg_writes),
            mem_ops: std::mem::take(&mut self.mem_ops),
        };
        self.trace.push(record);
    }

    /// The condition governing this instruction: inside an IT block the
    /// block state wins over the encoding's own field.
    pub(crate) fn effective_cond(&self, instr: &ArmInstr) -> Cond {
        if self.cpsr.t() && self.it.in_block() {
            self.it.current_cond()
        } else {
            instr.cond
        }
    }

    /// Read a register by user-visible name for the `reg` command.
    pub fn reg_by_name(&self, name: &str) -> Option<u32> {
        if name == "pc" {
            return Some(self.pc);
        }
        if name == "cpsr" {
            return Some(self.cpsr.0);
        }
        if name == "spsr" {
            return Some(self.spsr());
        }
        coredbg_arm::REG_NAMES
            .iter()
            .position(|&n| n == name)
            .filter(|&i| i < 16)
            .map(|i| self.regs[i])
    }

    /// Write a register by user-visible name for the `reg` command.
    pub fn write_reg_by_name(&mut self, name: &str, value: u32) -> bool {
        match name {
            "pc" => {
                self.set_pc(value);
                return true;
            }
            "cpsr" => {
                let target = ProgramStatus(value);
                self.change_mode(target.mode());
                self.cpsr = ProgramStatus((value & !0x1f) | (self.cpsr.0 & 0x1f));
                return true;
            }
            "spsr" => {
                self.set_spsr(value);
                return true;
            }
            _ => {}
        }
        match coredbg_arm::REG_NAMES.iter().position(|&n| n == name) {
            Some(i) if i < 16 => {
                self.regs[i] = value;
                true
            }
            _ => false,
        }
    }
}

/// EXC_RETURN: return to handler/thread on the main stack.
pub(crate) const EXC_RETURN: u32 = 0xffff_fff9;
/// Vector index of SVCall.
pub(crate) const EXC_SVC: u32 = 11;
/// Vector index of the first external interrupt.
pub(crate) const EXC_IRQ_BASE: u32 = 16;
