//! RISC-V instruction set support for the coredbg simulator.
//!
//! The crate owns everything a core or a disassembler needs to know about
//! RV64IMAFC + machine-mode encodings without ever executing one:
//!
//! - [`RegId`] and the ABI register names,
//! - the CSR address map ([`csr`]) and the machine-status accessor
//!   ([`csr::MStatus`]),
//! - the pattern-matched [`InstructionTable`] (value/care-mask descriptors
//!   hashed into 32 buckets the way the functional model looks them up),
//! - the decoded [`Instruction`] variant type, its [`decode`] entry point
//!   and the canonical [`Instruction::encode`] used by the round-trip
//!   tests,
//! - mnemonic rendering for traces and the `disas` command ([`disasm`]).
//!
//! Execution semantics live in `coredbg-core`; this crate is pure data.

#![warn(missing_docs)]

pub mod csr;
pub mod disasm;
mod compressed;
mod fields;
mod instruction;
mod opcode;
mod regid;

pub use instruction::{
    decode, AluOp, AmoOp, BranchCond, CsrOp, DecodedInstr, FpArithOp, FpCmpOp, Instruction,
    LoadWidth, StoreWidth,
};
pub use opcode::{InstrDescriptor, InstructionTable, OpId};
pub use regid::RegId;

/// A raw 32-bit instruction word as fetched from memory.
pub type RawInstruction = u32;

/// Why a word failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// No descriptor in the table matches the word.
    #[error("illegal instruction word {0:#010x}")]
    Illegal(u32),
    /// A 16-bit parcel that is not a valid compressed encoding.
    #[error("illegal compressed instruction word {0:#06x}")]
    IllegalCompressed(u16),
}

/// Architectural EBREAK used when planting a 32-bit software breakpoint.
pub const EBREAK_WORD: u32 = 0x0010_0073;
/// Compressed C.EBREAK used when the replaced opcode is 16 bits long.
pub const C_EBREAK_HALF: u16 = 0x9002;
