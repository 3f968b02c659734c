//! RISC-V external debug transport.
//!
//! Three layers mirror the hardware: the IEEE 1149.1 [`JtagTap`] in the
//! TCK domain, the two-flop [`JtagCdc`] that carries one request into the
//! system domain, and the [`DebugModule`] register file with its abstract
//! command engine. [`DmiController`] wires all three together for a
//! pin-level probe; tests and host tooling can also talk to the DM
//! directly through [`DebugModule::dmi_request`], the path a memory-mapped
//! debug bus would take.

#![warn(missing_docs)]

mod cdc;
mod dm;
mod tap;

pub use cdc::{CdcInput, CdcOutput, JtagCdc};
pub use dm::{CmdErr, DebugModule, DmiRequestResult};
pub use tap::{DmiReqFromTap, DmiResponse, JtagTap, TapOutputs, TapState};

use tracing::trace;

/// JTAG IDCODE of this TAP.
pub const IDCODE: u32 = 0x10e3_1913;
/// DMI address width.
pub const ABITS: u32 = 7;

/// Pin-accurate composition of TAP + CDC + DM.
///
/// Each TCK rising edge also pumps a handful of system-clock ticks so an
/// issued request crosses the synchronizer and completes before the probe
/// can scan again; a real probe's TCK is orders of magnitude slower than
/// the system clock, which is exactly the assumption the RTL makes.
pub struct DmiController {
    /// Probe-side state machine.
    pub tap: JtagTap,
    /// Crossing synchronizer.
    pub cdc: JtagCdc,
    /// Debug module.
    pub dm: DebugModule,
    resp: DmiResponse,
}

impl DmiController {
    /// Wrap a debug module behind a TAP.
    pub fn new(dm: DebugModule) -> Self {
        Self {
            tap: JtagTap::new(),
            cdc: JtagCdc::new(),
            dm,
            resp: DmiResponse::default(),
        }
    }

    /// Assert TRST: resets the TAP only.
    pub fn trst(&mut self) {
        self.tap.reset();
    }

    /// One TCK rising edge. Returns TDO as sampled by the probe.
    pub fn tck(&mut self, tms: bool, tdi: bool) -> bool {
        let out = self.tap.posedge(tms, tdi, self.resp);
        if out.hardreset {
            self.dm.hard_reset();
            self.cdc = JtagCdc::new();
        }

        // The TAP's request outputs sit on the CDC input until the system
        // side has sampled them twice.
        let input = CdcInput {
            valid: out.dmi_req.is_some(),
            write: out.dmi_req.map(|r| r.write).unwrap_or(false),
            addr: out.dmi_req.map(|r| r.addr).unwrap_or(0),
            data: out.dmi_req.map(|r| r.data).unwrap_or(0),
            hardreset: false,
        };
        for _ in 0..4 {
            let crossed = self.cdc.sys_posedge(input, self.dm.req_ready());
            if crossed.valid {
                let result = self.dm.dmi_request(crossed.addr, crossed.data, crossed.write);
                self.resp = DmiResponse {
                    data: result.data,
                    busy: false,
                    error: false,
                };
                trace!(addr = crossed.addr, data = result.data, "dmi response latched");
            }
            self.dm.sys_tick();
        }
        self.resp.busy = self.dm.busy();
        out.tdo
    }

    /// Run a full IR scan from Run-Test/Idle, returning to Run-Test/Idle.
    pub fn scan_ir(&mut self, ir: u32) -> u32 {
        self.tck(true, false); // -> Select-DR
        self.tck(true, false); // -> Select-IR
        self.tck(false, false); // -> Capture-IR
        self.tck(false, false); // capture edge, -> Shift-IR
        let mut out = 0u32;
        for i in 0..5 {
            let last = i == 4;
            let tdo = self.tck(last, ir >> i & 1 != 0);
            out |= u32::from(tdo) << i;
        }
        self.tck(true, false); // -> Update-IR
        self.tck(false, false); // update edge, -> Run-Test/Idle
        out
    }

    /// Run a full DR scan of `len` bits from Run-Test/Idle.
    pub fn scan_dr(&mut self, value: u64, len: u32) -> u64 {
        self.tck(true, false); // -> Select-DR
        self.tck(false, false); // -> Capture-DR
        self.tck(false, false); // capture edge, -> Shift-DR
        let mut out = 0u64;
        for i in 0..len {
            let last = i == len - 1;
            let tdo = self.tck(last, value >> i & 1 != 0);
            out |= u64::from(tdo) << i;
        }
        self.tck(true, false); // -> Update-DR
        self.tck(false, false); // update edge, -> Run-Test/Idle
        out
    }

    /// One DBUS access through the full pin path.
    pub fn dbus(&mut self, addr: u8, data: u32, op: u32) -> u64 {
        let word = u64::from(addr & 0x7f) << 34 | u64::from(data) << 2 | u64::from(op & 3);
        self.scan_dr(word, 34 + ABITS)
    }
}
