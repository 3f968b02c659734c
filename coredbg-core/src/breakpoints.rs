//! Breakpoint bookkeeping and software-breakpoint planting.
//!
//! A software breakpoint only lives in memory while the hart runs: resume
//! plants the EBREAK (or its compressed form) over the original word, halt
//! restores it. Hardware breakpoints are address matches checked at fetch
//! and never touch memory.

use coredbg_bus::{BusTransaction, MemoryBus};
use tracing::debug;

/// Breakpoint flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    /// Plants a breakpoint instruction over the original word.
    Software,
    /// Address comparator; memory is never modified.
    Hardware,
}

/// One breakpoint entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    /// Instruction address.
    pub addr: u64,
    /// Software or hardware.
    pub kind: BreakpointKind,
    /// Original instruction word (software only).
    pub saved: u32,
    /// Length of the replaced opcode: 2 or 4.
    pub oplen: u8,
}

/// The breakpoint set of one target.
///
/// Callers wrap it in a `Mutex`: writers are user commands, readers are
/// every fetch while stepping.
#[derive(Debug, Default)]
pub struct BreakpointSet {
    entries: Vec<Breakpoint>,
    planted: bool,
}

impl BreakpointSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint at `addr`. The saved word and opcode length are
    /// read from memory so the planted word can be restored exactly.
    pub fn add(
        &mut self,
        bus: &dyn MemoryBus,
        addr: u64,
        kind: BreakpointKind,
        oplen_of: impl Fn(u32) -> u8,
    ) -> Result<(), coredbg_bus::BusError> {
        if self.entries.iter().any(|b| b.addr == addr) {
            return Ok(());
        }
        let mut t = BusTransaction::read(addr, 4);
        bus.dma_memop(&mut t)?;
        let saved = t.payload as u32;
        let entry = Breakpoint { addr, kind, saved, oplen: oplen_of(saved) };
        debug!(addr, ?kind, "breakpoint added");
        self.entries.push(entry);
        Ok(())
    }

    /// Remove the breakpoint at `addr`; restores the original word first
    /// when it is currently planted.
    pub fn remove(
        &mut self,
        bus: &dyn MemoryBus,
        addr: u64,
    ) -> Result<bool, coredbg_bus::BusError> {
        let Some(pos) = self.entries.iter().position(|b| b.addr == addr) else {
            return Ok(false);
        };
        let bp = self.entries[pos];
        if self.planted && bp.kind == BreakpointKind::Software {
            restore_one(bus, &bp)?;
        }
        self.entries.remove(pos);
        debug!(addr, "breakpoint removed");
        Ok(true)
    }

    /// Entry at `addr`, if any.
    pub fn at(&self, addr: u64) -> Option<&Breakpoint> {
        self.entries.iter().find(|b| b.addr == addr)
    }

    /// `true` when a fetch from `addr` must be intercepted.
    pub fn is_breakpoint(&self, addr: u64) -> bool {
        self.entries.iter().any(|b| b.addr == addr)
    }

    /// All entries, insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.entries.iter()
    }

    /// Plant EBREAK words for all software entries (on resume).
    ///
    /// `ebreak_for` maps an opcode length to the breakpoint word to plant.
    pub fn plant_all(
        &mut self,
        bus: &dyn MemoryBus,
        ebreak_for: impl Fn(u8) -> u32,
    ) -> Result<(), coredbg_bus::BusError> {
        for bp in &self.entries {
            if bp.kind == BreakpointKind::Software {
                let word = ebreak_for(bp.oplen);
                let mut t =
                    BusTransaction::write(bp.addr, bp.oplen.max(2), u64::from(word));
                bus.dma_memop(&mut t)?;
            }
        }
        self.planted = true;
        Ok(())
    }

    /// Restore the original words (on halt).
    pub fn restore_all(&mut self, bus: &dyn MemoryBus) -> Result<(), coredbg_bus::BusError> {
        for bp in &self.entries {
            if bp.kind == BreakpointKind::Software {
                restore_one(bus, bp)?;
            }
        }
        self.planted = false;
        Ok(())
    }
}

fn restore_one(bus: &dyn MemoryBus, bp: &Breakpoint) -> Result<(), coredbg_bus::BusError> {
    let mut t = BusTransaction::write(bp.addr, bp.oplen.max(2), u64::from(bp.saved));
    bus.dma_memop(&mut t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coredbg_bus::SramModel;

    fn oplen(word: u32) -> u8 {
        if word & 3 == 3 {
            4
        } else {
            2
        }
    }

    fn ebreak(oplen: u8) -> u32 {
        if oplen == 2 {
            u32::from(coredbg_riscv::C_EBREAK_HALF)
        } else {
            coredbg_riscv::EBREAK_WORD
        }
    }

    #[test]
    fn plant_and_restore_round_trip() {
        let sram = SramModel::new(0x1000, 0x100);
        sram.load(0x1000, &0x00c5_8533u32.to_le_bytes());

        let mut set = BreakpointSet::new();
        set.add(&sram, 0x1000, BreakpointKind::Software, oplen).unwrap();

        set.plant_all(&sram, ebreak).unwrap();
        let mut out = [0u8; 4];
        sram.dump(0x1000, &mut out);
        assert_eq!(u32::from_le_bytes(out), coredbg_riscv::EBREAK_WORD);

        set.restore_all(&sram).unwrap();
        sram.dump(0x1000, &mut out);
        assert_eq!(u32::from_le_bytes(out), 0x00c5_8533);
    }

    #[test]
    fn compressed_breakpoint_replaces_two_bytes() {
        let sram = SramModel::new(0, 0x10);
        // c.addi a0,-1 followed by a marker halfword
        sram.load(0, &[0x7d, 0x15, 0xaa, 0xbb]);

        let mut set = BreakpointSet::new();
        set.add(&sram, 0, BreakpointKind::Software, oplen).unwrap();
        set.plant_all(&sram, ebreak).unwrap();

        let mut out = [0u8; 4];
        sram.dump(0, &mut out);
        // Only the 16-bit parcel is replaced.
        assert_eq!(out, [0x02, 0x90, 0xaa, 0xbb]);
    }

    #[test]
    fn hardware_breakpoints_do_not_touch_memory() {
        let sram = SramModel::new(0, 0x10);
        sram.load(0, &[1, 2, 3, 4]);
        let mut set = BreakpointSet::new();
        set.add(&sram, 0, BreakpointKind::Hardware, oplen).unwrap();
        set.plant_all(&sram, ebreak).unwrap();
        let mut out = [0u8; 4];
        sram.dump(0, &mut out);
        assert_eq!(out, [1, 2, 3, 4]);
    }
}
