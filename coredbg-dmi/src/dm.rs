//! The Debug Module: DMI register file, hart selection and the abstract
//! command engine.
//!
//! Register indices follow the external debug register map: data0..3 at
//! 0x04..0x07, dmcontrol 0x10, dmstatus 0x11, hartinfo 0x12, abstractcs
//! 0x16, command 0x17, abstractauto 0x18, progbuf0..15 at 0x20..0x2f,
//! haltsum0 0x40.

use std::sync::Arc;

use coredbg_core::{DebugPort, DebugPortError};
use tracing::{debug, trace, warn};

const REG_DATA0: u8 = 0x04;
const REG_DMCONTROL: u8 = 0x10;
const REG_DMSTATUS: u8 = 0x11;
const REG_HARTINFO: u8 = 0x12;
const REG_ABSTRACTCS: u8 = 0x16;
const REG_COMMAND: u8 = 0x17;
const REG_ABSTRACTAUTO: u8 = 0x18;
const REG_PROGBUF0: u8 = 0x20;
const REG_HALTSUM0: u8 = 0x40;

const DATA_REGS: usize = 4;
const PROGBUF_REGS: usize = 16;

// command[31:24]
const CMD_TYPE_REGACCESS: u32 = 0;
const CMD_TYPE_QUICKACCESS: u32 = 1;
const CMD_TYPE_MEMACCESS: u32 = 2;

const CMD_WRITE_BIT: u32 = 1 << 16;
const CMD_TRANSFER_BIT: u32 = 1 << 17;
const CMD_POSTEXEC_BIT: u32 = 1 << 18;
const CMD_POSTINCREMENT_BIT: u32 = 1 << 19;

/// Sticky abstract-command error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CmdErr {
    /// No error.
    #[default]
    None = 0,
    /// A command arrived while one was executing.
    Busy = 1,
    /// The command is not supported.
    NotSupported = 2,
    /// The hart took an exception while executing the command.
    Exception = 3,
    /// The hart was not in the required state.
    WrongState = 4,
    /// A bus error occurred during a memory access command.
    BusError = 5,
}

/// Abstract command engine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CmdState {
    #[default]
    Idle,
    Init,
    Request,
    Response,
    WaitHalted,
}

/// DMI request access states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DmState {
    #[default]
    Idle,
    Access,
}

/// Result of one DMI register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmiRequestResult {
    /// Read-back value (also returned for writes).
    pub data: u32,
}

/// What the command engine is holding between FSM states.
#[derive(Debug, Default, Clone, Copy)]
struct CmdLatch {
    regaccess: bool,
    memaccess: bool,
    quickaccess: bool,
    progexec: bool,
    write: bool,
    postexec: bool,
    postincrement: bool,
    size: u32,
    addr: u64,
    wdata: u64,
    rdata: u64,
    failed: Option<CmdErr>,
}

/// The Debug Module.
pub struct DebugModule {
    harts: Vec<Arc<dyn DebugPort + Send + Sync>>,
    hartsel: usize,
    dmactive: bool,
    ndmreset: bool,
    hartreset: bool,
    resethaltreq: bool,
    resumeack: bool,
    data: [u32; DATA_REGS],
    progbuf: [u32; PROGBUF_REGS],
    command: u32,
    autoexecdata: u32,
    autoexecprogbuf: u32,
    cmderr: CmdErr,
    cmd_state: CmdState,
    dm_state: DmState,
    latch: CmdLatch,
}

impl std::fmt::Debug for DebugModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugModule")
            .field("harts", &self.harts.len())
            .field("hartsel", &self.hartsel)
            .field("cmderr", &self.cmderr)
            .field("cmd_state", &self.cmd_state)
            .finish()
    }
}

impl DebugModule {
    /// Build over a hart array; hart 0 is selected at reset.
    pub fn new(harts: Vec<Arc<dyn DebugPort + Send + Sync>>) -> Self {
        Self {
            harts,
            hartsel: 0,
            dmactive: false,
            ndmreset: false,
            hartreset: false,
            resethaltreq: false,
            resumeack: false,
            data: [0; DATA_REGS],
            progbuf: [0; PROGBUF_REGS],
            command: 0,
            autoexecdata: 0,
            autoexecprogbuf: 0,
            cmderr: CmdErr::None,
            cmd_state: CmdState::Idle,
            dm_state: DmState::Idle,
            latch: CmdLatch::default(),
        }
    }

    /// Currently selected hart index.
    pub fn hartsel(&self) -> usize {
        self.hartsel
    }

    /// Sticky command error.
    pub fn cmderr(&self) -> CmdErr {
        self.cmderr
    }

    /// `true` while the abstract command engine is running.
    pub fn busy(&self) -> bool {
        self.cmd_state != CmdState::Idle
    }

    /// Ready to accept a DMI request.
    pub fn req_ready(&self) -> bool {
        self.dm_state == DmState::Idle
    }

    /// dmihardreset: return every DM register to its reset value.
    pub fn hard_reset(&mut self) {
        let harts = std::mem::take(&mut self.harts);
        *self = Self::new(harts);
        debug!("debug module hard reset");
    }

    fn selected(&self) -> Option<&Arc<dyn DebugPort + Send + Sync>> {
        self.harts.get(self.hartsel)
    }

    fn halted(&self, idx: usize) -> bool {
        self.harts.get(idx).map(|h| h.is_halted()).unwrap_or(false)
    }

    fn available(&self, idx: usize) -> bool {
        self.harts.get(idx).map(|h| h.is_available()).unwrap_or(false)
    }

    /// Drive one system-clock step of the abstract command engine.
    pub fn sys_tick(&mut self) {
        match self.cmd_state {
            CmdState::Idle => {}
            CmdState::Init => self.cmd_init(),
            CmdState::Request => {
                // The hart accepted the request; move to the response
                // phase on the next tick, like the two-phase debug port.
                self.cmd_state = CmdState::Response;
            }
            CmdState::Response => self.cmd_response(),
            CmdState::WaitHalted => {
                if self.halted(self.hartsel) {
                    self.latch.progexec = true;
                    self.cmd_state = CmdState::Request;
                }
            }
        }
    }

    /// Run the command engine until it parks (bounded; a hart that never
    /// halts leaves the engine busy and the next command write reports
    /// `cmderr = busy`).
    fn pump(&mut self) {
        for _ in 0..64 {
            if self.cmd_state == CmdState::Idle {
                break;
            }
            self.sys_tick();
        }
    }

    /// One DMI register access (the system-side path; the CDC and any
    /// memory-mapped debug bus both land here).
    pub fn dmi_request(&mut self, addr: u8, wdata: u32, write: bool) -> DmiRequestResult {
        self.dm_state = DmState::Access;
        let data = self.access(addr, wdata, write);
        self.dm_state = DmState::Idle;
        self.pump();
        trace!(addr, wdata, write, data, "dmi access");
        DmiRequestResult { data }
    }

    fn access(&mut self, addr: u8, wdata: u32, write: bool) -> u32 {
        match addr {
            a if (REG_DATA0..REG_DATA0 + DATA_REGS as u8).contains(&a) => {
                let idx = usize::from(a - REG_DATA0);
                let value = self.data[idx];
                if write {
                    self.data[idx] = wdata;
                }
                if self.autoexecdata & (1 << idx) != 0 && self.cmderr == CmdErr::None {
                    self.rearm_command();
                }
                value
            }
            a if (REG_PROGBUF0..REG_PROGBUF0 + PROGBUF_REGS as u8).contains(&a) => {
                let idx = usize::from(a - REG_PROGBUF0);
                let value = self.progbuf[idx];
                if write {
                    self.progbuf[idx] = wdata;
                }
                if self.autoexecprogbuf & (1 << idx) != 0 && self.cmderr == CmdErr::None {
                    self.rearm_command();
                }
                value
            }
            REG_DMCONTROL => self.access_dmcontrol(wdata, write),
            REG_DMSTATUS => self.read_dmstatus(),
            REG_HARTINFO => {
                if self.available(self.hartsel) {
                    // Two dscratch registers, CSR-shadowed data registers.
                    0x2 << 20
                } else {
                    0
                }
            }
            REG_ABSTRACTCS => {
                let value = (PROGBUF_REGS as u32) << 24
                    | u32::from(self.busy()) << 12
                    | (self.cmderr as u32) << 8
                    | DATA_REGS as u32;
                if write && wdata & 0x700 != 0 {
                    // cmderr is W1C.
                    self.cmderr = CmdErr::None;
                }
                value
            }
            REG_COMMAND => {
                if write {
                    if self.cmderr == CmdErr::None {
                        if self.busy() {
                            self.cmderr = CmdErr::Busy;
                        } else {
                            self.command = wdata;
                            self.cmd_state = CmdState::Init;
                        }
                    }
                    // Writes while cmderr != 0 are dropped entirely.
                }
                0
            }
            REG_ABSTRACTAUTO => {
                let value = self.autoexecdata | self.autoexecprogbuf << 16;
                if write {
                    self.autoexecdata = wdata & ((1 << DATA_REGS) - 1);
                    self.autoexecprogbuf = (wdata >> 16) & ((1 << PROGBUF_REGS) - 1);
                }
                value
            }
            REG_HALTSUM0 => {
                let mut sum = 0u32;
                for idx in 0..self.harts.len().min(32) {
                    sum |= u32::from(self.halted(idx)) << idx;
                }
                sum
            }
            other => {
                warn!(addr = other, "access to unmapped DMI register");
                0
            }
        }
    }

    fn access_dmcontrol(&mut self, wdata: u32, write: bool) -> u32 {
        let value = u32::from(self.hartreset) << 29
            | (self.hartsel as u32) << 16
            | u32::from(self.ndmreset) << 1
            | u32::from(self.dmactive);
        if !write {
            return value;
        }

        let hartsel_next = ((wdata >> 16) & 0x3ff) as usize;
        if wdata & (1 << 31) != 0 {
            // haltreq of an already-halted hart is a state error, unless
            // the write also toggles ndmreset.
            if wdata & 0x2 == 0 && !self.ndmreset && self.halted(hartsel_next) {
                self.cmderr = CmdErr::WrongState;
            } else if let Some(hart) = self.harts.get(hartsel_next) {
                hart.halt_request();
            }
        } else if wdata & (1 << 30) != 0 {
            if self.halted(hartsel_next) {
                if let Some(hart) = self.harts.get(hartsel_next) {
                    hart.resume_request();
                    self.resumeack = !hart.is_halted();
                }
            } else {
                self.cmderr = CmdErr::WrongState;
            }
        }
        self.hartreset = wdata & (1 << 29) != 0;
        self.hartsel = hartsel_next;
        if wdata & (1 << 3) != 0 {
            self.resethaltreq = true;
        } else if wdata & (1 << 2) != 0 {
            self.resethaltreq = false;
        }
        let ndmreset_next = wdata & 0x2 != 0;
        if ndmreset_next && !self.ndmreset {
            for hart in &self.harts {
                hart.reset_request();
            }
        }
        self.ndmreset = ndmreset_next;
        self.dmactive = wdata & 0x1 != 0;
        if !self.dmactive {
            // dmactive = 0 holds every debug register in reset.
            let harts = std::mem::take(&mut self.harts);
            *self = Self::new(harts);
        }
        value
    }

    fn read_dmstatus(&mut self) -> u32 {
        let hsel = self.hartsel;
        let available = self.available(hsel);
        let halted = self.halted(hsel) && available;
        let running = !self.halted(hsel) && available;
        let nonexistent = !available;
        let mut v = 0u32;
        v |= u32::from(self.resumeack) << 17 | u32::from(self.resumeack) << 16;
        v |= u32::from(nonexistent) << 15 | u32::from(nonexistent) << 14;
        v |= u32::from(nonexistent) << 13 | u32::from(nonexistent) << 12;
        v |= u32::from(running) << 11 | u32::from(running) << 10;
        v |= u32::from(halted) << 9 | u32::from(halted) << 8;
        v |= 1 << 7; // authenticated
        v |= 1 << 5; // hasresethaltreq
        v |= 2; // debug spec version 0.13
        v
    }

    fn rearm_command(&mut self) {
        if self.busy() {
            self.cmderr = CmdErr::Busy;
        } else {
            self.cmd_state = CmdState::Init;
        }
    }

    /// CMD_STATE_INIT: decode `command` and launch the access.
    fn cmd_init(&mut self) {
        self.latch = CmdLatch {
            postincrement: self.command & CMD_POSTINCREMENT_BIT != 0,
            ..CmdLatch::default()
        };
        match self.command >> 24 {
            CMD_TYPE_REGACCESS => {
                if self.command & CMD_TRANSFER_BIT != 0 {
                    self.latch.regaccess = true;
                    self.latch.write = self.command & CMD_WRITE_BIT != 0;
                    self.latch.postexec = self.command & CMD_POSTEXEC_BIT != 0;
                    self.latch.size = (self.command >> 20) & 0x7;
                    self.latch.addr = u64::from(self.command & 0xffff);
                    self.latch.wdata = u64::from(self.data[1]) << 32 | u64::from(self.data[0]);
                    self.cmd_state = CmdState::Request;
                    self.issue_reg_access();
                } else if self.command & CMD_POSTEXEC_BIT != 0 {
                    self.latch.progexec = true;
                    self.cmd_state = CmdState::Request;
                } else {
                    // Empty command.
                    self.cmd_state = CmdState::Idle;
                }
            }
            CMD_TYPE_QUICKACCESS => {
                if self.halted(self.hartsel) {
                    self.cmderr = CmdErr::WrongState;
                    self.cmd_state = CmdState::Idle;
                } else {
                    if let Some(hart) = self.selected() {
                        hart.halt_request();
                    }
                    self.latch.quickaccess = true;
                    self.cmd_state = CmdState::WaitHalted;
                }
            }
            CMD_TYPE_MEMACCESS => {
                self.latch.memaccess = true;
                self.latch.write = self.command & CMD_WRITE_BIT != 0;
                self.latch.size = (self.command >> 20) & 0x7;
                self.latch.addr = u64::from(self.data[3]) << 32 | u64::from(self.data[2]);
                self.latch.wdata = u64::from(self.data[1]) << 32 | u64::from(self.data[0]);
                self.cmd_state = CmdState::Request;
                self.issue_mem_access();
            }
            other => {
                warn!(cmd_type = other, "unsupported abstract command type");
                self.cmderr = CmdErr::NotSupported;
                self.cmd_state = CmdState::Idle;
            }
        }
    }

    fn issue_reg_access(&mut self) {
        let Some(hart) = self.selected().cloned() else {
            self.latch.failed = Some(CmdErr::NotSupported);
            return;
        };
        let regno = self.latch.addr as u16;
        let result = if self.latch.write {
            hart.write_reg(regno, self.latch.wdata).map(|()| 0)
        } else {
            hart.read_reg(regno)
        };
        match result {
            Ok(v) => self.latch.rdata = v,
            Err(e) => self.latch.failed = Some(map_port_error(e)),
        }
    }

    fn issue_mem_access(&mut self) {
        let Some(hart) = self.selected().cloned() else {
            self.latch.failed = Some(CmdErr::NotSupported);
            return;
        };
        let size = 1u8 << self.latch.size.min(3);
        let result = hart.mem_access(
            self.latch.write,
            self.latch.addr,
            size,
            self.latch.wdata,
        );
        match result {
            Ok(v) => self.latch.rdata = v,
            Err(e) => self.latch.failed = Some(map_port_error(e)),
        }
    }

    /// CMD_STATE_RESPONSE: commit results, postincrement, chain progbuf.
    fn cmd_response(&mut self) {
        if self.latch.progexec {
            let result = self
                .selected()
                .cloned()
                .map(|hart| hart.exec_progbuf(&self.progbuf))
                .unwrap_or(Err(DebugPortError::WrongState));
            if result.is_err() {
                self.cmderr = CmdErr::Exception;
            }
            self.latch.progexec = false;
            if self.latch.quickaccess {
                // Quick access resumes even when progbuf execution failed.
                if let Some(hart) = self.selected() {
                    hart.resume_request();
                }
                self.resumeack = true;
            }
            self.cmd_state = CmdState::Idle;
            return;
        }

        if let Some(err) = self.latch.failed.take() {
            self.cmderr = err;
            self.cmd_state = CmdState::Idle;
            return;
        }

        if !self.latch.write {
            let rdata = self.latch.rdata;
            match self.latch.size {
                0 => {
                    self.data[0] = rdata as u32 & 0xff;
                    self.data[1] = 0;
                }
                1 => {
                    self.data[0] = rdata as u32 & 0xffff;
                    self.data[1] = 0;
                }
                2 => {
                    self.data[0] = rdata as u32;
                    self.data[1] = 0;
                }
                _ => {
                    self.data[0] = rdata as u32;
                    self.data[1] = (rdata >> 32) as u32;
                }
            }
        }

        if self.latch.postincrement {
            self.latch.postincrement = false;
            if self.command >> 24 == CMD_TYPE_REGACCESS {
                let regno = (self.command & 0xffff).wrapping_add(1) & 0xffff;
                self.command = (self.command & !0xffff) | regno;
            } else if self.command >> 24 == CMD_TYPE_MEMACCESS {
                // Committed only after an error-free response, so a bus
                // error leaves the address untouched.
                let step = 1u64 << self.latch.size.min(3);
                let next = self.latch.addr.wrapping_add(step);
                self.data[2] = next as u32;
                self.data[3] = (next >> 32) as u32;
            }
        }

        if self.latch.regaccess && self.command & CMD_POSTEXEC_BIT != 0 {
            self.latch.regaccess = false;
            self.latch.progexec = true;
            self.cmd_state = CmdState::Request;
            return;
        }

        self.cmd_state = CmdState::Idle;
    }
}

fn map_port_error(e: DebugPortError) -> CmdErr {
    match e {
        DebugPortError::WrongState => CmdErr::WrongState,
        DebugPortError::Bus => CmdErr::BusError,
        DebugPortError::Exception => CmdErr::Exception,
        DebugPortError::BadRegno(_) => CmdErr::NotSupported,
    }
}
