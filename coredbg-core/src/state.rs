//! Step outcomes and trap causes.
//!
//! Architectural errors are data, not panics: an executor returns an
//! [`ExecuteState`] and the core driver acts on the variant. Nothing here
//! unwinds into the host.

use coredbg_riscv::csr;

/// Why a trap is being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    /// Fetch address not aligned to the instruction width.
    InstrMisalign(u64),
    /// Fetch could not complete on the bus.
    InstrFault(u64),
    /// Decoder rejected the word.
    InstrIllegal(u32),
    /// EBREAK / BKPT hit with no debugger attached.
    Breakpoint,
    /// Misaligned data load.
    LoadMisalign(u64),
    /// Bus error on a data load.
    LoadFault(u64),
    /// Misaligned store or AMO.
    StoreMisalign(u64),
    /// Bus error on a store or AMO.
    StoreFault(u64),
    /// Environment call from the given privilege level.
    Ecall(u64),
}

impl TrapCause {
    /// Exception code for `mcause`.
    pub const fn code(self) -> u64 {
        match self {
            Self::InstrMisalign(_) => csr::cause::INSTR_MISALIGN,
            Self::InstrFault(_) => csr::cause::INSTR_FAULT,
            Self::InstrIllegal(_) => csr::cause::INSTR_ILLEGAL,
            Self::Breakpoint => csr::cause::BREAKPOINT,
            Self::LoadMisalign(_) => csr::cause::LOAD_MISALIGN,
            Self::LoadFault(_) => csr::cause::LOAD_FAULT,
            Self::StoreMisalign(_) => csr::cause::STORE_MISALIGN,
            Self::StoreFault(_) => csr::cause::STORE_FAULT,
            Self::Ecall(prv) => csr::cause::CALL_FROM_UMODE + prv,
        }
    }

    /// Faulting address for `mbadaddr`, when the cause carries one.
    pub const fn badaddr(self) -> Option<u64> {
        match self {
            Self::InstrMisalign(a)
            | Self::InstrFault(a)
            | Self::LoadMisalign(a)
            | Self::LoadFault(a)
            | Self::StoreMisalign(a)
            | Self::StoreFault(a) => Some(a),
            _ => None,
        }
    }
}

/// Outcome of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteState {
    /// Continue with the next instruction.
    Proceed,
    /// Deliver an architectural trap.
    Trap(TrapCause),
    /// WFI: park until an interrupt is pending.
    WaitIrq,
    /// A debug event (EBREAK under debugger control) halted the hart.
    Halted,
}

impl ExecuteState {
    /// `true` if the core keeps running after this instruction.
    pub const fn should_continue(&self) -> bool {
        matches!(self, Self::Proceed)
    }
}

/// Run state of one core, visible to the debug module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoreMode {
    /// Parked under debugger control.
    Halted,
    /// Free-running.
    #[default]
    Running,
    /// Will halt again after one instruction.
    SingleStep,
    /// Parked by WFI until an interrupt fires.
    WaitForIrq,
}
