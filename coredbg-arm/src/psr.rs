//! The 32-bit program status word and the CPU mode field.
//!
//! Layout: N Z C V Q at [31:27], J at [24], GE[3:0] at [19:16], E A I F at
//! [9:6], T at [5], M[4:0] at [4:0]. Everything is an accessor over the raw
//! word; no bit-field unions.

use bitflags::bitflags;

bitflags! {
    /// Single-bit PSR flags as a mask set, for bulk save/restore.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PsrFlags: u32 {
        /// Negative.
        const N = 1 << 31;
        /// Zero.
        const Z = 1 << 30;
        /// Carry / not-borrow.
        const C = 1 << 29;
        /// Overflow.
        const V = 1 << 28;
        /// DSP saturation.
        const Q = 1 << 27;
        /// Jazelle state (never set by this model).
        const J = 1 << 24;
        /// Big-endian data accesses.
        const E = 1 << 9;
        /// Imprecise-abort disable.
        const A = 1 << 8;
        /// IRQ disable.
        const I = 1 << 7;
        /// FIQ disable.
        const F = 1 << 6;
        /// Thumb state.
        const T = 1 << 5;
    }
}

/// The seven CPU modes selectable through M[4:0].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum CpuMode {
    User = 0x10,
    Fiq = 0x11,
    Irq = 0x12,
    Supervisor = 0x13,
    Abort = 0x17,
    Undefined = 0x1b,
    System = 0x1f,
}

impl CpuMode {
    /// Decode M[4:0]; unassigned encodings fall back to `User` the way the
    /// functional model treats them.
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0x1f {
            0x11 => Self::Fiq,
            0x12 => Self::Irq,
            0x13 => Self::Supervisor,
            0x17 => Self::Abort,
            0x1b => Self::Undefined,
            0x1f => Self::System,
            _ => Self::User,
        }
    }

    /// `true` for the modes with their own banked SP/LR/SPSR.
    pub const fn is_banked(self) -> bool {
        !matches!(self, Self::User | Self::System)
    }
}

/// Current or saved program status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramStatus(pub u32);

impl Default for ProgramStatus {
    fn default() -> Self {
        // Supervisor mode, IRQ/FIQ masked, ARM state: the reset value.
        Self(0x0000_00d3)
    }
}

impl ProgramStatus {
    /// Negative flag.
    pub const fn n(self) -> bool {
        self.0 & PsrFlags::N.bits() != 0
    }

    /// Zero flag.
    pub const fn z(self) -> bool {
        self.0 & PsrFlags::Z.bits() != 0
    }

    /// Carry flag.
    pub const fn c(self) -> bool {
        self.0 & PsrFlags::C.bits() != 0
    }

    /// Overflow flag.
    pub const fn v(self) -> bool {
        self.0 & PsrFlags::V.bits() != 0
    }

    /// Thumb state bit.
    pub const fn t(self) -> bool {
        self.0 & PsrFlags::T.bits() != 0
    }

    /// IRQ-disable bit.
    pub const fn i(self) -> bool {
        self.0 & PsrFlags::I.bits() != 0
    }

    fn set_bit(&mut self, mask: PsrFlags, on: bool) {
        if on {
            self.0 |= mask.bits();
        } else {
            self.0 &= !mask.bits();
        }
    }

    /// Set the negative flag.
    pub fn set_n(&mut self, on: bool) {
        self.set_bit(PsrFlags::N, on);
    }

    /// Set the zero flag.
    pub fn set_z(&mut self, on: bool) {
        self.set_bit(PsrFlags::Z, on);
    }

    /// Set the carry flag.
    pub fn set_c(&mut self, on: bool) {
        self.set_bit(PsrFlags::C, on);
    }

    /// Set the overflow flag.
    pub fn set_v(&mut self, on: bool) {
        self.set_bit(PsrFlags::V, on);
    }

    /// Set the Thumb state bit.
    pub fn set_t(&mut self, on: bool) {
        self.set_bit(PsrFlags::T, on);
    }

    /// Set the IRQ-disable bit.
    pub fn set_i(&mut self, on: bool) {
        self.set_bit(PsrFlags::I, on);
    }

    /// Update N and Z from a result.
    pub fn set_nz(&mut self, result: u32) {
        self.set_n(result >> 31 != 0);
        self.set_z(result == 0);
    }

    /// GE[3:0] SIMD flags.
    pub const fn ge(self) -> u32 {
        (self.0 >> 16) & 0xf
    }

    /// Set GE[3:0].
    pub fn set_ge(&mut self, ge: u32) {
        self.0 = (self.0 & !0x000f_0000) | ((ge & 0xf) << 16);
    }

    /// Current CPU mode from M[4:0].
    pub const fn mode(self) -> CpuMode {
        CpuMode::from_bits(self.0)
    }

    /// Write M[4:0]; the core swaps banked registers on the transition.
    pub fn set_mode(&mut self, mode: CpuMode) {
        self.0 = (self.0 & !0x1f) | mode as u32;
    }
}
