//! Disassembly service backing the `disas` command and the trace viewer.

use coredbg_bus::{BusTransaction, MemoryBus};
use coredbg_riscv::{decode, disasm as rv_disasm, Instruction, InstructionTable};

use crate::config::CoreIsa;
use crate::SimContext;

/// One disassembled row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisasLine {
    /// Instruction address.
    pub addr: u64,
    /// Raw instruction word (low half only for 16-bit encodings).
    pub code: u32,
    /// Encoding size in bytes.
    pub codesize: u8,
    /// Rendered mnemonic, or `.word`/`.half` data for undecodable bytes.
    pub mnemonic: String,
    /// Resolved branch/load target, when one is computable.
    pub comment: String,
    /// `true` when a breakpoint is set at this address.
    pub breakpoint: bool,
    /// Symbol name when the address starts one.
    pub label: String,
}

/// Disassemble `len` bytes starting at `addr`.
///
/// Rendering is pure over (memory, symbol table, breakpoint set), so
/// calling it twice yields identical rows.
pub fn disassemble<B: MemoryBus>(
    ctx: &SimContext<B>,
    isa: CoreIsa,
    addr: u64,
    len: u64,
) -> Vec<DisasLine> {
    let table = InstructionTable::rv64imafc();
    let arm_table = coredbg_arm::ArmTable::armv7();
    let symbols = ctx.symbols.read().expect("symbol lock");
    let breakpoints = ctx.breakpoints.lock().expect("breakpoint lock");

    let mut lines = Vec::new();
    let mut pc = addr;
    while pc < addr + len {
        let mut t = BusTransaction::read(pc, 4);
        if ctx.bus.dma_memop(&mut t).is_err() {
            break;
        }
        // A planted software breakpoint must disassemble as the original
        // instruction the user wrote there.
        let word = match breakpoints.at(pc) {
            Some(bp) if bp.kind == crate::BreakpointKind::Software => bp.saved,
            _ => t.payload as u32,
        };

        let (mnemonic, comment, size) = match isa {
            CoreIsa::Rv64 => match decode(&table, word) {
                Ok(d) => {
                    let target = branch_target(&d.instr, pc);
                    let comment = target
                        .and_then(|t| {
                            symbols.by_addr(t).map(|(s, off)| {
                                if off == 0 {
                                    format!("{:x} <{}>", t, s.name)
                                } else {
                                    format!("{:x} <{}+{:#x}>", t, s.name, off)
                                }
                            })
                        })
                        .or_else(|| target.map(|t| format!("{t:x}")))
                        .unwrap_or_default();
                    (rv_disasm::format(&d.instr), comment, d.len)
                }
                Err(_) if word & 3 == 3 => (format!(".word {word:#010x}"), String::new(), 4),
                Err(_) => (format!(".half {:#06x}", word & 0xffff), String::new(), 2),
            },
            CoreIsa::Armv7 => match coredbg_arm::decode_arm(&arm_table, word) {
                Ok(i) => (coredbg_arm::disasm::format(&i), String::new(), 4),
                Err(_) => (format!(".word {word:#010x}"), String::new(), 4),
            },
        };

        lines.push(DisasLine {
            addr: pc,
            code: if size == 2 { word & 0xffff } else { word },
            codesize: size,
            mnemonic,
            comment,
            breakpoint: breakpoints.is_breakpoint(pc),
            label: symbols.label_at(pc).unwrap_or_default().to_string(),
        });
        pc += u64::from(size);
    }
    lines
}

fn branch_target(instr: &Instruction, pc: u64) -> Option<u64> {
    match *instr {
        Instruction::Jal { imm, .. } | Instruction::Branch { imm, .. } => {
            Some(pc.wrapping_add(imm as u64))
        }
        _ => None,
    }
}

/// Disassemble `len` bytes of Thumb code starting at `addr`.
///
/// Thumb needs its own walk: the stream is halfword-granular and a
/// 32-bit encoding consumes the following parcel.
pub fn disassemble_thumb<B: MemoryBus>(
    ctx: &SimContext<B>,
    addr: u64,
    len: u64,
) -> Vec<DisasLine> {
    let symbols = ctx.symbols.read().expect("symbol lock");
    let breakpoints = ctx.breakpoints.lock().expect("breakpoint lock");

    let read_half = |at: u64| -> Option<u16> {
        let mut t = BusTransaction::read(at, 2);
        ctx.bus.dma_memop(&mut t).ok()?;
        Some(t.payload as u16)
    };

    let mut lines = Vec::new();
    let mut pc = addr & !1;
    while pc < addr + len {
        let Some(h1) = read_half(pc) else { break };
        let h1 = match breakpoints.at(pc) {
            Some(bp) if bp.kind == crate::BreakpointKind::Software => bp.saved as u16,
            _ => h1,
        };
        let h2 = if coredbg_arm::is_thumb32(h1) {
            read_half(pc + 2).unwrap_or(0)
        } else {
            0
        };
        let (mnemonic, size, code) = match coredbg_arm::decode_thumb(h1, h2) {
            Ok((i, size)) => {
                let code = if size == 4 {
                    u32::from(h1) << 16 | u32::from(h2)
                } else {
                    u32::from(h1)
                };
                (coredbg_arm::disasm::format(&i), size, code)
            }
            Err(_) => (format!(".half {h1:#06x}"), 2, u32::from(h1)),
        };
        lines.push(DisasLine {
            addr: pc,
            code,
            codesize: size,
            mnemonic,
            comment: String::new(),
            breakpoint: breakpoints.is_breakpoint(pc),
            label: symbols.label_at(pc).unwrap_or_default().to_string(),
        });
        pc += u64::from(size);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use coredbg_bus::SramModel;
    use std::sync::Arc;

    fn ctx() -> SimContext<SramModel> {
        let sram = Arc::new(SramModel::new(0x1000, 0x100));
        SimContext::new(sram)
    }

    #[test]
    fn rows_carry_size_and_label() {
        let ctx = ctx();
        ctx.bus.load(0x1000, &0x00c5_8533u32.to_le_bytes()); // add a0,a1,a2
        ctx.bus.load(0x1004, &0x157du16.to_le_bytes()); // c.addi a0,-1
        ctx.symbols.write().unwrap().add("main", 0x1000, 0x10);

        let rows = disassemble(&ctx, CoreIsa::Rv64, 0x1000, 6);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].mnemonic, "add a0,a1,a2");
        assert_eq!(rows[0].label, "main");
        assert_eq!(rows[1].codesize, 2);
    }

    #[test]
    fn branch_targets_resolve_through_symbols() {
        let ctx = ctx();
        // jal ra, +0x20
        let word = coredbg_riscv::Instruction::Jal {
            rd: coredbg_riscv::RegId::RA,
            imm: 0x20,
        }
        .encode();
        ctx.bus.load(0x1000, &word.to_le_bytes());
        ctx.symbols.write().unwrap().add("helper", 0x1020, 0x10);

        let rows = disassemble(&ctx, CoreIsa::Rv64, 0x1000, 4);
        assert_eq!(rows[0].comment, "1020 <helper>");
    }

    #[test]
    fn disassembly_is_idempotent() {
        let ctx = ctx();
        ctx.bus.load(0x1000, &0x00c5_8533u32.to_le_bytes());
        let a = disassemble(&ctx, CoreIsa::Rv64, 0x1000, 4);
        let b = disassemble(&ctx, CoreIsa::Rv64, 0x1000, 4);
        assert_eq!(a, b);
    }

    #[test]
    fn thumb_stream_spans_wide_encodings() {
        let ctx = ctx();
        // mov r1, r2 ; bl +0x100 (32-bit) ; nop
        ctx.bus.load(0x1000, &0x4611u16.to_le_bytes());
        ctx.bus.load(0x1002, &0xf000u16.to_le_bytes());
        ctx.bus.load(0x1004, &0xf880u16.to_le_bytes());
        ctx.bus.load(0x1006, &0xbf00u16.to_le_bytes());

        let rows = disassemble_thumb(&ctx, 0x1000, 8);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].codesize, 2);
        assert_eq!(rows[1].codesize, 4);
        assert_eq!(rows[1].mnemonic, "bl +256");
        assert_eq!(rows[2].addr, 0x1006);
    }
}
