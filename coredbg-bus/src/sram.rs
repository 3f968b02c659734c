use std::sync::Mutex;

use crate::{BusAction, BusError, BusTransaction, MemoryBus};

/// Flat byte-addressable RAM slave.
///
/// Interior mutability keeps the [`MemoryBus`] surface `&self` so a single
/// model can be shared between cores and the debug module.
#[derive(Debug)]
pub struct SramModel {
    base: u64,
    mem: Mutex<Vec<u8>>,
}

impl SramModel {
    /// Create `len` bytes of zeroed RAM mapped at `base`.
    pub fn new(base: u64, len: usize) -> Self {
        Self {
            base,
            mem: Mutex::new(vec![0; len]),
        }
    }

    /// First mapped address.
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Mapped window length in bytes.
    pub fn len(&self) -> usize {
        self.mem.lock().expect("sram lock").len()
    }

    /// `true` when the model maps zero bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` when the whole `[addr, addr + xsize)` range falls inside the
    /// window.
    pub fn covers(&self, addr: u64, xsize: u8) -> bool {
        addr >= self.base && addr + u64::from(xsize) <= self.base + self.len() as u64
    }

    /// Bulk load, used by test fixtures to place code into memory.
    pub fn load(&self, addr: u64, bytes: &[u8]) {
        let mut mem = self.mem.lock().expect("sram lock");
        let off = (addr - self.base) as usize;
        mem[off..off + bytes.len()].copy_from_slice(bytes);
    }

    /// Bulk read back, used by trace and disassembly services.
    pub fn dump(&self, addr: u64, out: &mut [u8]) {
        let mem = self.mem.lock().expect("sram lock");
        let off = (addr - self.base) as usize;
        out.copy_from_slice(&mem[off..off + out.len()]);
    }
}

impl MemoryBus for SramModel {
    fn dma_memop(&self, trans: &mut BusTransaction) -> Result<(), BusError> {
        if !self.covers(trans.addr, trans.xsize) {
            trans.error = true;
            return Err(BusError::Unmapped(trans.addr));
        }
        let mut mem = self.mem.lock().expect("sram lock");
        let off = (trans.addr - self.base) as usize;
        match trans.action {
            BusAction::Read => {
                let mut val = 0u64;
                for i in (0..trans.xsize as usize).rev() {
                    val = (val << 8) | u64::from(mem[off + i]);
                }
                trans.payload = val;
            }
            BusAction::Write => {
                for i in 0..trans.xsize as usize {
                    if trans.wstrb & (1 << i) != 0 {
                        mem[off + i] = (trans.payload >> (8 * i)) as u8;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_little_endian_payload() {
        let sram = SramModel::new(0x1000, 0x100);
        sram.load(0x1000, &[0x33, 0x85, 0xc5, 0x00]);

        let mut t = BusTransaction::read(0x1000, 4);
        sram.dma_memop(&mut t).unwrap();
        assert_eq!(t.payload, 0x00c5_8533);
    }

    #[test]
    fn write_commits_only_strobed_bytes() {
        let sram = SramModel::new(0, 16);
        sram.load(0, &[0xff; 8]);

        let mut t = BusTransaction::write(0, 4, 0x1122_3344);
        t.wstrb = 0b0101;
        sram.dma_memop(&mut t).unwrap();

        let mut out = [0u8; 4];
        sram.dump(0, &mut out);
        assert_eq!(out, [0x44, 0xff, 0x22, 0xff]);
    }

    #[test]
    fn out_of_window_access_errors() {
        let sram = SramModel::new(0x1000, 0x10);
        let mut t = BusTransaction::read(0x100c, 8);
        assert_eq!(sram.dma_memop(&mut t), Err(BusError::Unmapped(0x100c)));
        assert!(t.error);
    }
}
