/// Direction of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusAction {
    /// The payload is filled from the slave.
    Read,
    /// The strobed payload bytes are committed to the slave.
    Write,
}

/// One memory access as it travels through the fabric.
///
/// `xsize` is always a power of two not larger than 8 and the address is
/// expected to be `xsize`-aligned: misaligned requests must be turned into
/// the architectural misalignment exception by the issuing core before the
/// transaction exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusTransaction {
    /// Byte address of the first accessed byte.
    pub addr: u64,
    /// Read or write.
    pub action: BusAction,
    /// Access width in bytes: 1, 2, 4 or 8.
    pub xsize: u8,
    /// Write strobe, one bit per payload byte.
    pub wstrb: u8,
    /// Write data going in, read data coming back. Unused high bytes are
    /// zero.
    pub payload: u64,
    /// Tag of the issuing master, carried through for trace output.
    pub source_idx: u8,
    /// Set by the fabric when the access failed.
    pub error: bool,
}

impl BusTransaction {
    /// Build a read of `xsize` bytes at `addr`.
    pub fn read(addr: u64, xsize: u8) -> Self {
        debug_assert!(xsize.is_power_of_two() && xsize <= 8);
        Self {
            addr,
            action: BusAction::Read,
            xsize,
            wstrb: 0,
            payload: 0,
            source_idx: 0,
            error: false,
        }
    }

    /// Build a write of the low `xsize` bytes of `payload` at `addr`.
    ///
    /// The strobe is the contiguous low-bit mask matching `xsize`, which is
    /// the only legal strobe for an aligned access.
    pub fn write(addr: u64, xsize: u8, payload: u64) -> Self {
        debug_assert!(xsize.is_power_of_two() && xsize <= 8);
        Self {
            addr,
            action: BusAction::Write,
            xsize,
            wstrb: Self::strobe(xsize),
            payload,
            source_idx: 0,
            error: false,
        }
    }

    /// Tag the transaction with the issuing master index.
    pub fn with_source(mut self, source_idx: u8) -> Self {
        self.source_idx = source_idx;
        self
    }

    /// Contiguous low-bit strobe for an aligned access of `xsize` bytes.
    pub const fn strobe(xsize: u8) -> u8 {
        match xsize {
            1 => 0x01,
            2 => 0x03,
            4 => 0x0f,
            _ => 0xff,
        }
    }

    /// `true` when `addr` is aligned to the access width.
    pub const fn is_aligned(&self) -> bool {
        self.addr % (self.xsize as u64) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_strobe_covers_access_width() {
        for xsize in [1u8, 2, 4, 8] {
            let t = BusTransaction::write(0x100, xsize, 0);
            assert_eq!(t.wstrb.count_ones(), xsize as u32);
            assert_eq!(t.wstrb.trailing_ones(), xsize as u32);
        }
    }

    #[test]
    fn alignment_check_uses_width() {
        assert!(BusTransaction::read(0x1002, 2).is_aligned());
        assert!(!BusTransaction::read(0x1002, 4).is_aligned());
        assert!(BusTransaction::read(0x1001, 1).is_aligned());
    }
}
