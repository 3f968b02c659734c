//! ARMv7 / Thumb-2 instruction set support for the coredbg simulator.
//!
//! Companion crate to `coredbg-riscv`: pure instruction-set data with no
//! execution semantics. It owns
//!
//! - the program status word and CPU modes ([`ProgramStatus`],
//!   [`CpuMode`]),
//! - condition codes and their evaluation ([`Cond`]),
//! - the operand-2 barrel shifter including the `#0` special encodings
//!   ([`shift`]),
//! - the IT-block predication state machine ([`ItState`]),
//! - the ARM-mode pattern table ([`ArmTable`]) and both decoders
//!   ([`decode_arm`], [`decode_thumb`]), which land in one shared semantic
//!   space ([`ArmKind`]),
//! - mnemonic rendering ([`disasm`]).

#![warn(missing_docs)]

pub mod disasm;
pub mod shift;
mod cond;
mod decoder_arm;
mod decoder_thumb;
mod instruction;
mod it;
mod opcode;
mod psr;

pub use cond::Cond;
pub use decoder_arm::decode_arm;
pub use decoder_thumb::{decode_thumb, is_thumb32};
pub use instruction::{
    ArmInstr, ArmKind, DpOp, MemOffset, MemOp, Operand2, RevStyle, SetFlags, ShiftBy,
};
pub use it::ItState;
pub use opcode::{ArmDescriptor, ArmOpId, ArmTable};
pub use psr::{CpuMode, ProgramStatus, PsrFlags};

/// ARM register names as used by trace output and the `reg` command.
pub const REG_NAMES: [&str; 18] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "sl", "r11", "fp", "sp", "lr",
    "pc", "cpsr", "spsr",
];

/// Why a word failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// No ARM-mode pattern matches.
    #[error("illegal ARM instruction word {0:#010x}")]
    IllegalArm(u32),
    /// Not a valid Thumb encoding.
    #[error("illegal Thumb instruction word {0:#010x}")]
    IllegalThumb(u32),
}

/// BKPT #0 used when planting an ARM-state software breakpoint.
pub const ARM_BKPT_WORD: u32 = 0xe120_0070;
/// Thumb BKPT #0 for 16-bit replacement.
pub const THUMB_BKPT_HALF: u16 = 0xbe00;
