//! TCK→system clock-domain crossing.
//!
//! The request bundle from the TAP is double-flopped on the system clock;
//! when the second flop shows a valid request and no request is pending
//! or already accepted, the bundle is latched and presented downstream
//! until the consumer signals ready. A four-phase handshake guarantees at
//! most one request in flight and no repetition while the TAP holds its
//! outputs.

/// Request bundle as driven by the TAP (TCK domain).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CdcInput {
    /// A request is being presented.
    pub valid: bool,
    /// Write (true) or read.
    pub write: bool,
    /// DMI register index.
    pub addr: u8,
    /// Write data.
    pub data: u32,
    /// Hard-reset request rides the same bundle.
    pub hardreset: bool,
}

/// Synchronized request (system domain).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CdcOutput {
    /// Request valid this cycle.
    pub valid: bool,
    /// Write (true) or read.
    pub write: bool,
    /// DMI register index.
    pub addr: u8,
    /// Write data.
    pub data: u32,
    /// Synchronized hard reset.
    pub hardreset: bool,
}

/// Two-flop synchronizer state.
#[derive(Debug, Default)]
pub struct JtagCdc {
    l1: CdcInput,
    l2: CdcInput,
    req_valid: bool,
    req_accepted: bool,
    req: CdcInput,
}

impl JtagCdc {
    /// Empty synchronizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// One system-clock edge: sample the TCK-domain bundle and run the
    /// handshake against the downstream `ready`.
    ///
    /// The returned request fires in the cycle where the latched valid
    /// meets `ready`; the register updates below apply to the next cycle,
    /// matching non-blocking hardware assignment.
    pub fn sys_posedge(&mut self, input: CdcInput, ready: bool) -> CdcOutput {
        let l2 = self.l2;
        self.l2 = self.l1;
        self.l1 = input;

        let fire = self.req_valid && ready;
        let was_valid = self.req_valid;

        if l2.valid && !was_valid && !self.req_accepted {
            // Latch once per presented request so it cannot repeat.
            self.req_valid = true;
            self.req = l2;
        } else if ready {
            self.req_valid = false;
        }

        if l2.valid && was_valid && ready {
            self.req_accepted = true;
        } else if !l2.valid {
            self.req_accepted = false;
        }

        CdcOutput {
            valid: fire,
            write: self.req.write,
            addr: self.req.addr,
            data: self.req.data,
            hardreset: self.req.hardreset,
        }
    }
}
