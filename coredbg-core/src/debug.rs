//! The debug port a Debug Module drives on each hart.
//!
//! Register numbers follow the external-debug convention: CSRs at
//! 0x0000..=0x0fff, integer registers at 0x1000..=0x101f, floating-point
//! registers at 0x1020..=0x103f.

/// First GPR register number.
pub const REGNO_GPR_BASE: u16 = 0x1000;
/// First FPR register number.
pub const REGNO_FPR_BASE: u16 = 0x1020;
/// One past the last valid register number.
pub const REGNO_END: u16 = 0x1040;

/// Errors a debug-port access can produce; they map onto the abstract
/// command error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DebugPortError {
    /// The hart is not in the state the access requires.
    #[error("hart in the wrong state for this access")]
    WrongState,
    /// A bus error occurred during an abstract memory access.
    #[error("bus error during debug access")]
    Bus,
    /// The hart took an exception while executing the program buffer.
    #[error("exception during program buffer execution")]
    Exception,
    /// The register number is outside every mapped range.
    #[error("unsupported debug register number {0:#x}")]
    BadRegno(u16),
}

/// Side-band control surface of one hart.
///
/// Requests are latched and observed at instruction boundaries; the
/// accessors complete synchronously once the hart is halted.
pub trait DebugPort {
    /// Latch a halt request.
    fn halt_request(&self);
    /// Latch a resume request.
    fn resume_request(&self);
    /// Latch a reset request.
    fn reset_request(&self);
    /// Arrange for the hart to halt again after one instruction.
    fn step_request(&self);
    /// `true` once the hart is parked.
    fn is_halted(&self) -> bool;
    /// `false` when the hart does not exist or cannot respond.
    fn is_available(&self) -> bool {
        true
    }
    /// Read a register by debug number.
    fn read_reg(&self, regno: u16) -> Result<u64, DebugPortError>;
    /// Write a register by debug number.
    fn write_reg(&self, regno: u16, value: u64) -> Result<(), DebugPortError>;
    /// Abstract memory access through the hart. Returns the read value;
    /// for writes the return value is the value written.
    fn mem_access(&self, write: bool, addr: u64, size: u8, value: u64)
        -> Result<u64, DebugPortError>;
    /// Execute the program buffer while halted.
    fn exec_progbuf(&self, progbuf: &[u32]) -> Result<(), DebugPortError>;
}
