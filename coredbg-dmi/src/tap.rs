//! IEEE 1149.1 test access port.
//!
//! The sixteen-state FSM advances on every TCK rising edge under TMS.
//! Four data registers hang off the 5-bit IR: IDCODE, DTMCONTROL, DBUS
//! and BYPASS. Shifts are LSB first; TDO presents bit 0 of the shift
//! register as it stood before the edge.

use tracing::trace;

use crate::{ABITS, IDCODE};

const IR_IDCODE: u32 = 0x01;
const IR_DTMCONTROL: u32 = 0x10;
const IR_DBUS: u32 = 0x11;
const IR_BYPASS: u32 = 0x1f;
const IRLEN: u32 = 5;
const DRLEN: u32 = 34 + ABITS;

const DMISTAT_OK: u32 = 0;
const DMISTAT_FAILED: u32 = 2;
const DMISTAT_BUSY: u32 = 3;

const DTMCONTROL_DMIRESET: u32 = 16;
const DTMCONTROL_DMIHARDRESET: u32 = 17;

/// The sixteen TAP controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TapState {
    TestLogicReset,
    RunTestIdle,
    SelectDrScan,
    CaptureDr,
    ShiftDr,
    Exit1Dr,
    PauseDr,
    Exit2Dr,
    UpdateDr,
    SelectIrScan,
    CaptureIr,
    ShiftIr,
    Exit1Ir,
    PauseIr,
    Exit2Ir,
    UpdateIr,
}

impl TapState {
    /// Next state under TMS, per the standard diagram.
    pub const fn next(self, tms: bool) -> Self {
        use TapState::*;
        match (self, tms) {
            (TestLogicReset, true) => TestLogicReset,
            (TestLogicReset, false) => RunTestIdle,
            (RunTestIdle, true) => SelectDrScan,
            (RunTestIdle, false) => RunTestIdle,
            (SelectDrScan, true) => SelectIrScan,
            (SelectDrScan, false) => CaptureDr,
            (CaptureDr, true) => Exit1Dr,
            (CaptureDr, false) => ShiftDr,
            (ShiftDr, true) => Exit1Dr,
            (ShiftDr, false) => ShiftDr,
            (Exit1Dr, true) => UpdateDr,
            (Exit1Dr, false) => PauseDr,
            (PauseDr, true) => Exit2Dr,
            (PauseDr, false) => PauseDr,
            (Exit2Dr, true) => UpdateDr,
            (Exit2Dr, false) => ShiftDr,
            (UpdateDr, true) => SelectDrScan,
            (UpdateDr, false) => RunTestIdle,
            (SelectIrScan, true) => TestLogicReset,
            (SelectIrScan, false) => CaptureIr,
            (CaptureIr, true) => Exit1Ir,
            (CaptureIr, false) => ShiftIr,
            (ShiftIr, true) => Exit1Ir,
            (ShiftIr, false) => ShiftIr,
            (Exit1Ir, true) => UpdateIr,
            (Exit1Ir, false) => PauseIr,
            (PauseIr, true) => Exit2Ir,
            (PauseIr, false) => PauseIr,
            (Exit2Ir, true) => UpdateIr,
            (Exit2Ir, false) => ShiftIr,
            (UpdateIr, true) => SelectDrScan,
            (UpdateIr, false) => RunTestIdle,
        }
    }
}

/// A DMI request raised in Update-DR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmiReqFromTap {
    /// Write (true) or read.
    pub write: bool,
    /// 7-bit DMI register index.
    pub addr: u8,
    /// Write data.
    pub data: u32,
}

/// Downstream status sampled in Capture-DR.
#[derive(Debug, Clone, Copy, Default)]
pub struct DmiResponse {
    /// Read-back data of the last completed request.
    pub data: u32,
    /// A request is still in flight.
    pub busy: bool,
    /// The last request failed.
    pub error: bool,
}

/// Everything one TCK edge produces.
#[derive(Debug, Clone, Copy)]
pub struct TapOutputs {
    /// Serial data out (bit 0 of the shift register before the edge).
    pub tdo: bool,
    /// DMI request issued by this edge, if any.
    pub dmi_req: Option<DmiReqFromTap>,
    /// DTMCONTROL requested a hard reset of the debug module.
    pub hardreset: bool,
}

/// The TAP controller state and shift registers.
#[derive(Debug)]
pub struct JtagTap {
    state: TapState,
    ir: u32,
    dr: u64,
    dr_length: u32,
    bypass: bool,
    dmi_addr: u8,
    err_sticky: u32,
}

impl Default for JtagTap {
    fn default() -> Self {
        Self::new()
    }
}

impl JtagTap {
    /// Power-on state: as if TRST was asserted.
    pub fn new() -> Self {
        Self {
            state: TapState::TestLogicReset,
            ir: IR_IDCODE,
            dr: u64::from(IDCODE),
            dr_length: 32,
            bypass: false,
            dmi_addr: 0,
            err_sticky: DMISTAT_OK,
        }
    }

    /// TRST: reset the controller, select IDCODE.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Current controller state.
    pub fn state(&self) -> TapState {
        self.state
    }

    /// Sticky DMI status as reported in DTMCONTROL.
    pub fn dmistat(&self) -> u32 {
        self.err_sticky
    }

    /// One TCK rising edge.
    pub fn posedge(&mut self, tms: bool, tdi: bool, resp: DmiResponse) -> TapOutputs {
        let mut out = TapOutputs {
            tdo: self.dr & 1 != 0,
            dmi_req: None,
            hardreset: false,
        };

        match self.state {
            TapState::TestLogicReset => {
                self.ir = IR_IDCODE;
            }
            TapState::CaptureDr => {
                match self.ir {
                    IR_IDCODE => {
                        self.dr = u64::from(IDCODE);
                        self.dr_length = 32;
                    }
                    IR_DTMCONTROL => {
                        let mut v = 0u64;
                        v |= 0x1; // version 0.13
                        v |= u64::from(ABITS) << 4;
                        v |= u64::from(self.err_sticky) << 10;
                        self.dr = v;
                        self.dr_length = 32;
                    }
                    IR_DBUS => {
                        let stat = if resp.error {
                            self.err_sticky = DMISTAT_FAILED;
                            DMISTAT_FAILED
                        } else {
                            self.err_sticky
                        };
                        self.dr = u64::from(stat)
                            | u64::from(resp.data) << 2
                            | u64::from(self.dmi_addr) << 34;
                        self.dr_length = DRLEN;
                    }
                    _ => {
                        self.dr = u64::from(self.bypass);
                        self.dr_length = 1;
                    }
                }
            }
            TapState::ShiftDr => {
                if self.dr_length > 1 {
                    self.dr >>= 1;
                    self.dr |= u64::from(tdi) << (self.dr_length - 1);
                } else {
                    self.dr = u64::from(tdi);
                }
            }
            TapState::UpdateDr => match self.ir {
                IR_DTMCONTROL => {
                    out.hardreset = self.dr & (1 << DTMCONTROL_DMIHARDRESET) != 0;
                    if self.dr & (1 << DTMCONTROL_DMIRESET) != 0 {
                        self.err_sticky = DMISTAT_OK;
                    }
                }
                IR_BYPASS => {
                    self.bypass = self.dr & 1 != 0;
                }
                IR_DBUS => {
                    let op = (self.dr & 0x3) as u32;
                    self.dmi_addr = ((self.dr >> 34) & 0x7f) as u8;
                    if self.err_sticky != DMISTAT_OK {
                        // Sticky errors swallow everything until dmireset.
                    } else if resp.busy {
                        self.err_sticky = DMISTAT_BUSY;
                    } else if op != 0 {
                        out.dmi_req = Some(DmiReqFromTap {
                            write: op == 2,
                            addr: self.dmi_addr,
                            data: ((self.dr >> 2) & 0xffff_ffff) as u32,
                        });
                        trace!(addr = self.dmi_addr, op, "dbus update");
                    }
                }
                _ => {}
            },
            TapState::CaptureIr => {
                // Mandatory xxx01 capture pattern.
                self.dr = u64::from(self.ir & !0x3) | 0x1;
                self.dr_length = IRLEN;
            }
            TapState::ShiftIr => {
                self.dr >>= 1;
                self.dr |= u64::from(tdi) << (IRLEN - 1);
                self.dr &= (1 << IRLEN) - 1;
            }
            TapState::UpdateIr => {
                self.ir = (self.dr & 0x1f) as u32;
            }
            _ => {}
        }

        self.state = self.state.next(tms);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle(tap: &mut JtagTap) {
        // Five TMS-high edges reach Test-Logic-Reset from anywhere.
        for _ in 0..5 {
            tap.posedge(true, false, DmiResponse::default());
        }
        tap.posedge(false, false, DmiResponse::default());
        assert_eq!(tap.state(), TapState::RunTestIdle);
    }

    #[test]
    fn five_tms_ones_always_reset() {
        let mut tap = JtagTap::new();
        tap.posedge(false, false, DmiResponse::default());
        tap.posedge(true, false, DmiResponse::default());
        for _ in 0..5 {
            tap.posedge(true, false, DmiResponse::default());
        }
        assert_eq!(tap.state(), TapState::TestLogicReset);
    }

    #[test]
    fn idcode_shifts_out_lsb_first() {
        let mut tap = JtagTap::new();
        idle(&mut tap);
        tap.posedge(true, false, DmiResponse::default()); // -> Select-DR
        tap.posedge(false, false, DmiResponse::default()); // -> Capture-DR
        tap.posedge(false, false, DmiResponse::default()); // capture, -> Shift-DR
        let mut out = 0u32;
        for i in 0..32 {
            let tms = i == 31;
            let o = tap.posedge(tms, false, DmiResponse::default());
            out |= u32::from(o.tdo) << i;
        }
        assert_eq!(out, IDCODE);
    }

    fn load_ir(tap: &mut JtagTap, ir: u32) {
        let d = DmiResponse::default;
        tap.posedge(true, false, d()); // -> Select-DR
        tap.posedge(true, false, d()); // -> Select-IR
        tap.posedge(false, false, d()); // -> Capture-IR
        tap.posedge(false, false, d()); // capture, -> Shift-IR
        for i in 0..5 {
            tap.posedge(i == 4, ir >> i & 1 != 0, d());
        }
        tap.posedge(true, false, d()); // -> Update-IR
        tap.posedge(false, false, d()); // update, -> Run-Test/Idle
        assert_eq!(tap.state(), TapState::RunTestIdle);
    }

    #[test]
    fn busy_update_sets_sticky_busy() {
        let mut tap = JtagTap::new();
        idle(&mut tap);
        load_ir(&mut tap, IR_DBUS);
        // Scan a DBUS nop through Update-DR while the DMI is busy.
        let d = DmiResponse::default;
        tap.posedge(true, false, d()); // -> Select-DR
        tap.posedge(false, false, d()); // -> Capture-DR
        tap.posedge(false, false, d()); // capture, -> Shift-DR
        tap.posedge(true, false, d()); // one shift, -> Exit1-DR
        tap.posedge(true, false, d()); // -> Update-DR
        let busy = DmiResponse { busy: true, ..Default::default() };
        let out = tap.posedge(false, false, busy); // update edge
        assert!(out.dmi_req.is_none());
        assert_eq!(tap.dmistat(), DMISTAT_BUSY);
    }

    #[test]
    fn dmireset_clears_sticky_state() {
        let mut tap = JtagTap::new();
        idle(&mut tap);
        load_ir(&mut tap, IR_DBUS);
        let d = DmiResponse::default;
        tap.posedge(true, false, d());
        tap.posedge(false, false, d());
        tap.posedge(false, false, d());
        tap.posedge(true, false, d());
        tap.posedge(true, false, d());
        tap.posedge(false, false, DmiResponse { busy: true, ..Default::default() });
        assert_eq!(tap.dmistat(), DMISTAT_BUSY);

        // DTMCONTROL write with dmireset set.
        load_ir(&mut tap, IR_DTMCONTROL);
        tap.posedge(true, false, d());
        tap.posedge(false, false, d());
        tap.posedge(false, false, d());
        let word = 1u64 << DTMCONTROL_DMIRESET;
        for i in 0..32 {
            tap.posedge(i == 31, word >> i & 1 != 0, d());
        }
        tap.posedge(true, false, d());
        tap.posedge(false, false, d());
        assert_eq!(tap.dmistat(), DMISTAT_OK);
    }
}
