//! RV64IMAFC functional core.

mod exec;
mod fpu;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use coredbg_bus::{BusAction, BusTransaction, MemoryBus};
use coredbg_riscv::csr::{self, MStatus};
use coredbg_riscv::{decode, disasm, DecodedInstr, InstructionTable};
use tracing::{debug, trace, warn};

use crate::bank::{CsrBank, RegBank};
use crate::config::CoreConfig;
use crate::debug::{DebugPort, DebugPortError, REGNO_FPR_BASE, REGNO_GPR_BASE, REGNO_END};
use crate::state::{CoreMode, ExecuteState, TrapCause};
use crate::trace::{MemTrace, StackTraceBuffer, TraceBuffer, TraceRecord};
use crate::SimContext;

/// `dcsr` bit enabling halt-on-EBREAK in machine mode.
const DCSR_EBREAKM: u64 = 1 << 15;

/// One RV64 hart: the fetch→decode→execute→commit driver plus its
/// architectural state. Shared services (bus, reservations, breakpoints,
/// symbols) come in through the [`SimContext`].
pub struct RiscvCore<B: MemoryBus> {
    cfg: CoreConfig,
    ctx: SimContext<B>,
    table: InstructionTable,
    pub(crate) regs: RegBank,
    pub(crate) fregs: RegBank,
    pub(crate) csrs: CsrBank,
    pub(crate) pc: u64,
    pub(crate) npc: u64,
    mode: CoreMode,
    step_cnt: u64,
    pending_trap: Option<TrapCause>,
    halt_req: bool,
    resume_req: bool,
    reset_req: bool,
    step_req: bool,
    ipi: Arc<AtomicBool>,
    pub(crate) mem_ops: Vec<MemTrace>,
    trace: TraceBuffer,
    stack_trace: StackTraceBuffer,
}

impl<B: MemoryBus> std::fmt::Debug for RiscvCore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiscvCore")
            .field("hartid", &self.cfg.hartid)
            .field("pc", &self.pc)
            .field("mode", &self.mode)
            .field("steps", &self.step_cnt)
            .finish()
    }
}

impl<B: MemoryBus> RiscvCore<B> {
    /// Build and reset one hart.
    pub fn new(cfg: CoreConfig, ctx: SimContext<B>) -> Self {
        let mut core = Self {
            table: InstructionTable::rv64imafc(),
            regs: RegBank::new_wired(),
            fregs: RegBank::new_plain(),
            csrs: CsrBank::new(),
            pc: 0,
            npc: 0,
            mode: CoreMode::Running,
            step_cnt: 0,
            pending_trap: None,
            halt_req: false,
            resume_req: false,
            reset_req: false,
            step_req: false,
            ipi: Arc::new(AtomicBool::new(false)),
            mem_ops: Vec::new(),
            trace: TraceBuffer::new(cfg.trace_depth),
            stack_trace: StackTraceBuffer::new(),
            cfg,
            ctx,
        };
        core.reset();
        core
    }

    /// Power-on / soft reset.
    pub fn reset(&mut self) {
        self.regs.clear();
        self.pc = self.cfg.reset_vector;
        self.npc = self.cfg.reset_vector;
        self.pending_trap = None;
        self.csrs.write_silent(csr::MIMPID, self.cfg.impid);
        self.csrs.write_silent(csr::MHARTID, self.cfg.hartid as u64);
        self.csrs.write_silent(csr::MTVEC, 0x100);
        self.csrs.write_silent(csr::MIP, 0);
        self.csrs.write_silent(csr::MIE, 0);
        self.csrs.write_silent(csr::MRESET, 0);
        let mut mstat = MStatus(0);
        mstat.set_prv(csr::prv::M);
        self.csrs.write_silent(csr::MSTATUS, mstat.0);
        self.stack_trace.clear();
        debug!(hartid = self.cfg.hartid, "core reset");
    }

    /// Hart index.
    pub fn hartid(&self) -> usize {
        self.cfg.hartid
    }

    /// Address of the instruction executed by the last step.
    pub fn pc(&self) -> u64 {
        self.pc
    }

    /// Address the next step will fetch from.
    pub fn next_pc(&self) -> u64 {
        self.npc
    }

    /// Integer register read for tests and host tooling.
    pub fn reg(&self, idx: usize) -> u64 {
        self.regs.read(idx)
    }

    /// Integer register write for tests and host tooling.
    pub fn set_reg(&mut self, idx: usize, value: u64) {
        self.regs.write(idx, value);
        self.regs.take_writes();
    }

    /// Current run state.
    pub fn mode(&self) -> CoreMode {
        self.mode
    }

    /// Retired-instruction counter.
    pub fn steps(&self) -> u64 {
        self.step_cnt
    }

    /// Shared IPI doorbell; the cluster wires these across harts.
    pub fn ipi_handle(&self) -> Arc<AtomicBool> {
        self.ipi.clone()
    }

    /// Trace buffer of committed instructions.
    pub fn trace(&self) -> &TraceBuffer {
        &self.trace
    }

    /// Call/return edges for the `stack` command.
    pub fn stack_trace(&self) -> &StackTraceBuffer {
        &self.stack_trace
    }

    /// Shared services.
    pub fn context(&self) -> &SimContext<B> {
        &self.ctx
    }

    /// Replace the shared-services context. The cluster uses this once
    /// every hart's IPI doorbell is registered.
    pub fn set_context(&mut self, ctx: SimContext<B>) {
        self.ctx = ctx;
    }

    /// Latch an external halt request (observed at the next boundary).
    pub fn post_halt_request(&mut self) {
        self.halt_req = true;
    }

    /// Latch an external resume request.
    pub fn post_resume_request(&mut self) {
        self.resume_req = true;
    }

    /// Latch an external reset request.
    pub fn post_reset_request(&mut self) {
        self.reset_req = true;
    }

    /// Latch a single-step request (resume for exactly one instruction).
    pub fn post_step_request(&mut self) {
        self.step_req = true;
        self.resume_req = true;
    }

    /// Service latched external requests. Steps are the only other place
    /// state changes, so between them the core is always at an
    /// instruction boundary and requests may take effect immediately.
    pub fn service_requests(&mut self) {
        if self.reset_req {
            self.reset_req = false;
            self.reset();
        }
        if self.halt_req && self.mode != CoreMode::Halted {
            self.do_halt();
        }
        if self.resume_req && self.mode == CoreMode::Halted {
            self.do_resume();
        }
        self.halt_req = false;
        self.resume_req = false;
    }

    /// Run one instruction (or service a latched request).
    pub fn step(&mut self) -> ExecuteState {
        self.service_requests();

        match self.mode {
            CoreMode::Halted => return ExecuteState::Halted,
            CoreMode::WaitForIrq => {
                self.poll_ipi();
                if !self.interrupt_pending() {
                    return ExecuteState::WaitIrq;
                }
                self.mode = CoreMode::Running;
            }
            CoreMode::Running | CoreMode::SingleStep => {}
        }

        // Software reset scheduled through the mreset CSR.
        if self.csrs.read(csr::MRESET) != 0 {
            self.reset();
            return ExecuteState::Proceed;
        }

        self.pc = self.npc;
        self.poll_ipi();
        self.handle_trap();

        let state = self.fetch_and_execute();

        self.step_cnt += 1;
        self.csrs.write_silent(csr::INSTRET, self.step_cnt);
        self.csrs.write_silent(csr::CYCLE, self.step_cnt);

        match state {
            ExecuteState::Trap(cause) => {
                self.pending_trap = Some(cause);
            }
            ExecuteState::WaitIrq => {
                self.mode = CoreMode::WaitForIrq;
            }
            ExecuteState::Halted => {
                self.do_halt();
            }
            ExecuteState::Proceed => {}
        }

        if self.mode == CoreMode::SingleStep && !matches!(state, ExecuteState::Halted) {
            self.do_halt();
        }
        state
    }

    fn fetch_and_execute(&mut self) -> ExecuteState {
        if self.pc % 2 != 0 {
            self.npc = self.pc;
            return ExecuteState::Trap(TrapCause::InstrMisalign(self.pc));
        }

        let mut t = BusTransaction::read(self.pc, 4).with_source(self.cfg.hartid as u8);
        if self.ctx.bus.dma_memop(&mut t).is_err() {
            self.npc = self.pc;
            return ExecuteState::Trap(TrapCause::InstrFault(self.pc));
        }
        let mut word = t.payload as u32;

        // Fetch substitution keeps hardware breakpoints invisible to
        // memory while still trapping at the breakpoint address.
        if self.mode == CoreMode::Running {
            let bps = self.ctx.breakpoints.lock().expect("breakpoint lock");
            if let Some(bp) = bps.at(self.pc) {
                word = if bp.oplen == 2 {
                    u32::from(coredbg_riscv::C_EBREAK_HALF)
                } else {
                    coredbg_riscv::EBREAK_WORD
                };
            }
        }

        let decoded = match decode(&self.table, word) {
            Ok(d) => d,
            Err(_) => {
                warn!(pc = self.pc, word, "unimplemented instruction");
                self.npc = self.pc;
                return ExecuteState::Trap(TrapCause::InstrIllegal(word));
            }
        };
        self.npc = self.pc + u64::from(decoded.len);

        let state = self.execute(&decoded);
        if matches!(state, ExecuteState::Trap(_) | ExecuteState::Halted) {
            // The trapping instruction is the one the exception PC (or
            // the debugger's dpc) must name.
            self.npc = self.pc;
        }
        self.commit_trace(&decoded, word);
        if self.regs.read(0) != 0 {
            // x0 must stay hard-wired; any other value is a core bug.
            warn!("register x0 modified");
        }
        trace!(
            hartid = self.cfg.hartid,
            step = self.step_cnt,
            pc = self.pc,
            word,
            "executed"
        );
        state
    }

    fn commit_trace(&mut self, decoded: &DecodedInstr, word: u32) {
        if !self.trace.enabled() {
            // Still drain the capture lists so they never grow stale.
            self.regs.take_writes();
            self.fregs.take_writes();
            self.csrs.take_writes();
            self.mem_ops.clear();
            return;
        }
        let mut reg_writes: Vec<(String, u64, u64)> = Vec::new();
        for w in self.regs.take_writes() {
            reg_writes.push((coredbg_riscv::RegId::new(w.idx as u8).abi_name().into(), w.old, w.new));
        }
        for w in self.fregs.take_writes() {
            reg_writes.push((format!("f{}", w.idx), w.old, w.new));
        }
        for w in self.csrs.take_writes() {
            reg_writes.push((format!("csr_{:03x}", w.idx), w.old, w.new));
        }
        let record = TraceRecord {
            step: self.step_cnt,
            pc: self.pc,
            raw: word,
            len: decoded.len,
            mnemonic: disasm::format(&decoded.instr),
            reg_writes,
            mem_ops: std::mem::take(&mut self.mem_ops),
        };
        self.trace.push(record);
    }

    fn do_halt(&mut self) {
        self.halt_req = false;
        self.mode = CoreMode::Halted;
        self.csrs.write_silent(csr::DPC, self.npc);
        let mut bps = self.ctx.breakpoints.lock().expect("breakpoint lock");
        if bps.restore_all(self.ctx.bus.as_ref()).is_err() {
            warn!("failed to restore breakpoints on halt");
        }
        debug!(hartid = self.cfg.hartid, dpc = self.csrs.read(csr::DPC), "halted");
    }

    fn do_resume(&mut self) {
        self.resume_req = false;
        self.npc = self.csrs.read(csr::DPC);
        self.mode = if self.step_req {
            self.step_req = false;
            CoreMode::SingleStep
        } else {
            CoreMode::Running
        };
        let mut bps = self.ctx.breakpoints.lock().expect("breakpoint lock");
        if self.mode == CoreMode::Running {
            if bps
                .plant_all(self.ctx.bus.as_ref(), |oplen| {
                    if oplen == 2 {
                        u32::from(coredbg_riscv::C_EBREAK_HALF)
                    } else {
                        coredbg_riscv::EBREAK_WORD
                    }
                })
                .is_err()
            {
                warn!("failed to plant breakpoints on resume");
            }
        }
        debug!(hartid = self.cfg.hartid, npc = self.npc, "resumed");
    }

    fn poll_ipi(&mut self) {
        if self.ipi.swap(false, Ordering::AcqRel) {
            let mip = self.csrs.read(csr::MIP) | (1 << 3);
            self.csrs.write_silent(csr::MIP, mip);
        }
    }

    fn interrupt_pending(&self) -> bool {
        self.csrs.read(csr::MIP) & self.csrs.read(csr::MIE) != 0
    }

    /// Deliver a pending trap or enabled interrupt, redirecting the PC to
    /// the per-privilege vector.
    fn handle_trap(&mut self) {
        let mut mstatus = MStatus(self.csrs.read(csr::MSTATUS));
        let pending = self.pending_trap.take();

        if pending.is_none() && (!mstatus.ie() || !self.interrupt_pending()) {
            return;
        }

        let prv = mstatus.prv();
        match pending {
            Some(cause) => {
                self.csrs.write_silent(csr::MCAUSE, cause.code());
                if let Some(addr) = cause.badaddr() {
                    self.csrs.write_silent(csr::MBADADDR, addr);
                }
            }
            None => {
                let pend = self.csrs.read(csr::MIP) & self.csrs.read(csr::MIE);
                let code = if pend & (1 << 3) != 0 {
                    csr::irq::SOFTWARE
                } else {
                    csr::irq::TIMER
                };
                self.csrs.write_silent(csr::MCAUSE, (1 << 63) | code);
            }
        }

        self.csrs.write_silent(csr::epc_for_prv(prv), self.pc);
        self.pc = self.csrs.read(csr::MTVEC) + 0x40 * prv;
        self.npc = self.pc;
        mstatus.push_trap();
        self.csrs.write_silent(csr::MSTATUS, mstatus.0);
        debug!(
            hartid = self.cfg.hartid,
            cause = self.csrs.read(csr::MCAUSE),
            vector = self.pc,
            "trap taken"
        );
    }

    /// CSR read with the architected views.
    pub(crate) fn read_csr(&self, addr: u16) -> u64 {
        match addr {
            csr::TIME | csr::MTIME | csr::CYCLE => self.step_cnt,
            csr::INSTRET => self.step_cnt,
            _ => self.csrs.read(addr),
        }
    }

    /// CSR write with the architected side effects.
    pub(crate) fn write_csr(&mut self, addr: u16, value: u64) {
        match addr {
            csr::MHARTID | csr::MIMPID | csr::MCPUID => {
                // Read-only identification registers.
            }
            csr::SEND_IPI => {
                self.csrs.write(addr, value);
                self.send_ipi(value as usize);
            }
            _ => self.csrs.write(addr, value),
        }
    }

    fn send_ipi(&mut self, target: usize) {
        if target == self.cfg.hartid {
            let mip = self.csrs.read(csr::MIP) | (1 << 3);
            self.csrs.write_silent(csr::MIP, mip);
        } else if let Some(doorbell) = self.ctx.ipi_doorbells.get(target) {
            doorbell.store(true, Ordering::Release);
        } else {
            warn!(target, "send_ipi to unknown hart");
        }
    }

    /// Issue one data-side memory transaction, recording it for trace.
    pub(crate) fn memop(
        &mut self,
        action: BusAction,
        addr: u64,
        xsize: u8,
        value: u64,
    ) -> Result<u64, ()> {
        let mut t = match action {
            BusAction::Read => BusTransaction::read(addr, xsize),
            BusAction::Write => BusTransaction::write(addr, xsize, value),
        }
        .with_source(self.cfg.hartid as u8);
        self.ctx.bus.dma_memop(&mut t).map_err(|_| ())?;
        self.mem_ops.push(MemTrace {
            write: action == BusAction::Write,
            addr,
            size: xsize,
            data: t.payload,
        });
        Ok(t.payload)
    }

    /// Execute the program buffer while halted; used by the debug module.
    ///
    /// Instructions run in buffer order until an EBREAK or the end of the
    /// buffer; control flow out of the buffer is an error, as is any
    /// architectural trap.
    fn run_progbuf(&mut self, progbuf: &[u32]) -> Result<(), DebugPortError> {
        if self.mode != CoreMode::Halted {
            return Err(DebugPortError::WrongState);
        }
        let bytes: Vec<u8> = progbuf.iter().flat_map(|w| w.to_le_bytes()).collect();
        let (saved_pc, saved_npc) = (self.pc, self.npc);
        let mut offset = 0usize;
        let result = loop {
            if offset + 2 > bytes.len() {
                break Ok(());
            }
            let mut wb = [0u8; 4];
            let take = (bytes.len() - offset).min(4);
            wb[..take].copy_from_slice(&bytes[offset..offset + take]);
            let word = u32::from_le_bytes(wb);

            let Ok(decoded) = decode(&self.table, word) else {
                break Err(DebugPortError::Exception);
            };
            if matches!(decoded.instr, coredbg_riscv::Instruction::Ebreak) {
                break Ok(());
            }
            self.pc = saved_pc;
            self.npc = saved_pc + u64::from(decoded.len);
            match self.execute(&decoded) {
                ExecuteState::Proceed if self.npc == saved_pc + u64::from(decoded.len) => {
                    offset += decoded.len as usize;
                }
                _ => break Err(DebugPortError::Exception),
            }
        };
        self.pc = saved_pc;
        self.npc = saved_npc;
        self.regs.take_writes();
        self.fregs.take_writes();
        self.csrs.take_writes();
        self.mem_ops.clear();
        result
    }

    fn debug_read_reg(&self, regno: u16) -> Result<u64, DebugPortError> {
        match regno {
            0..=0x0fff => Ok(self.read_csr(regno)),
            REGNO_GPR_BASE..=0x101f => Ok(self.regs.read((regno - REGNO_GPR_BASE) as usize)),
            REGNO_FPR_BASE..=0x103f => Ok(self.fregs.read((regno - REGNO_FPR_BASE) as usize)),
            _ => Err(DebugPortError::BadRegno(regno)),
        }
    }

    fn debug_write_reg(&mut self, regno: u16, value: u64) -> Result<(), DebugPortError> {
        match regno {
            0..=0x0fff => {
                self.write_csr(regno, value);
                self.csrs.take_writes();
                Ok(())
            }
            REGNO_GPR_BASE..=0x101f => {
                self.regs.write((regno - REGNO_GPR_BASE) as usize, value);
                self.regs.take_writes();
                Ok(())
            }
            REGNO_FPR_BASE..=0x103f => {
                self.fregs.write((regno - REGNO_FPR_BASE) as usize, value);
                self.fregs.take_writes();
                Ok(())
            }
            _ => Err(DebugPortError::BadRegno(regno)),
        }
    }

    /// Read a register by user-visible name for the `reg` command.
    pub fn reg_by_name(&self, name: &str) -> Option<u64> {
        match name {
            "pc" => return Some(self.pc),
            // The live next-PC; the dpc CSR only tracks it across halts.
            "npc" => return Some(self.npc),
            _ => {}
        }
        if let Some(r) = coredbg_riscv::RegId::from_name(name) {
            return Some(self.regs.read(r.index()));
        }
        csr::name_to_addr(name).map(|a| self.read_csr(a))
    }

    /// Write a register by user-visible name for the `reg` command.
    pub fn write_reg_by_name(&mut self, name: &str, value: u64) -> bool {
        if name == "pc" {
            self.pc = value;
            self.npc = value;
            return true;
        }
        if let Some(r) = coredbg_riscv::RegId::from_name(name) {
            self.regs.write(r.index(), value);
            self.regs.take_writes();
            return true;
        }
        match csr::name_to_addr(name) {
            Some(a) => {
                self.write_csr(a, value);
                self.csrs.take_writes();
                true
            }
            None => false,
        }
    }

    pub(crate) fn record_call(&mut self, from_pc: u64, to_pc: u64) {
        self.stack_trace.push_call(from_pc, to_pc);
    }

    pub(crate) fn record_return(&mut self) {
        self.stack_trace.pop_return();
    }

    pub(crate) fn halt_on_ebreak(&self) -> bool {
        self.csrs.read(csr::DCSR) & DCSR_EBREAKM != 0
    }

    /// Enable or disable debugger ownership of EBREAK.
    pub fn set_halt_on_ebreak(&mut self, on: bool) {
        let dcsr = self.csrs.read(csr::DCSR);
        let dcsr = if on { dcsr | DCSR_EBREAKM } else { dcsr & !DCSR_EBREAKM };
        self.csrs.write_silent(csr::DCSR, dcsr);
    }
}

/// Cloneable, lockable handle letting the debug module drive a core that
/// may be stepped from another thread.
pub struct SharedCore<B: MemoryBus>(pub Arc<Mutex<RiscvCore<B>>>);

impl<B: MemoryBus> Clone for SharedCore<B> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<B: MemoryBus> SharedCore<B> {
    /// Wrap a core.
    pub fn new(core: RiscvCore<B>) -> Self {
        Self(Arc::new(Mutex::new(core)))
    }

    /// Lock and step once.
    pub fn step(&self) -> ExecuteState {
        self.0.lock().expect("core lock").step()
    }
}

impl<B: MemoryBus> DebugPort for SharedCore<B> {
    fn halt_request(&self) {
        let mut core = self.0.lock().expect("core lock");
        core.post_halt_request();
        // Holding the lock means no instruction is in flight, so the
        // request may be serviced at this boundary.
        core.service_requests();
    }

    fn resume_request(&self) {
        let mut core = self.0.lock().expect("core lock");
        core.post_resume_request();
        core.service_requests();
    }

    fn reset_request(&self) {
        self.0.lock().expect("core lock").post_reset_request();
    }

    fn step_request(&self) {
        self.0.lock().expect("core lock").post_step_request();
    }

    fn is_halted(&self) -> bool {
        self.0.lock().expect("core lock").mode() == CoreMode::Halted
    }

    fn read_reg(&self, regno: u16) -> Result<u64, DebugPortError> {
        if regno >= REGNO_END {
            return Err(DebugPortError::BadRegno(regno));
        }
        self.0.lock().expect("core lock").debug_read_reg(regno)
    }

    fn write_reg(&self, regno: u16, value: u64) -> Result<(), DebugPortError> {
        self.0.lock().expect("core lock").debug_write_reg(regno, value)
    }

    fn mem_access(
        &self,
        write: bool,
        addr: u64,
        size: u8,
        value: u64,
    ) -> Result<u64, DebugPortError> {
        let mut core = self.0.lock().expect("core lock");
        let action = if write { BusAction::Write } else { BusAction::Read };
        let result = core.memop(action, addr, size, value).map_err(|_| DebugPortError::Bus);
        core.mem_ops.clear();
        result
    }

    fn exec_progbuf(&self, progbuf: &[u32]) -> Result<(), DebugPortError> {
        self.0.lock().expect("core lock").run_progbuf(progbuf)
    }
}
