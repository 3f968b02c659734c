//! ARM-mode pattern table.
//!
//! Descriptors cover bits [27:0]; the condition field is extracted
//! separately. Hashing uses bits [27:24]: a descriptor whose pattern
//! leaves any of those bits wild (P of the single transfers, L of the
//! block transfers) is registered in every bucket it can land in, so
//! lookup stays a single-bucket scan.
//!
//! Registration order is the tie-break contract for deliberately
//! overlapping encodings: the multiply family precedes the halfword
//! transfers (both live in the `000x` space with bits[7]=bits[4]=1), the
//! system/branch-exchange group and MOVW/MOVT precede the data-processing
//! group whose compare rows they occupy with S=0.

use strum::{Display, EnumIter};

/// Identity of one ARM-mode encoding class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[allow(missing_docs)]
pub enum ArmOpId {
    Mrs, MsrReg, MsrImm, Bx, BlxReg, Bkpt,
    Mul, Mla, Umull, Umlal, Smull, Smlal,
    Sdiv, Udiv, Sbfx, Ubfx,
    Sxtb, Sxth, Uxtb, Uxth,
    Rev, Rev16, Revsh, Clz,
    Movw, Movt,
    MemHalfImm, MemHalfReg,
    DpAnd, DpEor, DpSub, DpRsb, DpAdd, DpAdc, DpSbc, DpRsc,
    DpTst, DpTeq, DpCmp, DpCmn, DpOrr, DpMov, DpBic, DpMvn,
    MemImm, MemReg,
    Block,
    B, Bl, Swi,
}

/// One registered ARM pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmDescriptor {
    /// Encoding class.
    pub op: ArmOpId,
    /// Fixed bits within [27:0].
    pub value: u32,
    /// Care mask within [27:0].
    pub mask: u32,
}

impl ArmDescriptor {
    /// `true` when the word (condition stripped) matches.
    pub const fn matches(&self, word: u32) -> bool {
        word & self.mask == self.value
    }
}

const BUCKETS: usize = 16;

/// Hash-bucketed ARM-mode pattern table.
#[derive(Debug, Default, Clone)]
pub struct ArmTable {
    buckets: [Vec<ArmDescriptor>; BUCKETS],
}

impl ArmTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Full ARMv7 table in contract order.
    pub fn armv7() -> Self {
        use ArmOpId::*;
        let mut t = Self::new();

        // System and branch-exchange group.
        t.register(Mrs, 0x010f_0000, 0x0fbf_0fff);
        t.register(MsrReg, 0x0120_f000, 0x0fb0_fff0);
        t.register(MsrImm, 0x0320_f000, 0x0fb0_f000);
        t.register(Bx, 0x012f_ff10, 0x0fff_fff0);
        t.register(BlxReg, 0x012f_ff30, 0x0fff_fff0);
        t.register(Bkpt, 0x0120_0070, 0x0ff0_00f0);

        // Multiplies: must precede the halfword transfers, which share
        // bits[7:4] = 1001 once their SH field is wild.
        t.register(Mul, 0x0000_0090, 0x0fe0_f0f0);
        t.register(Mla, 0x0020_0090, 0x0fe0_00f0);
        t.register(Umull, 0x0080_0090, 0x0fe0_00f0);
        t.register(Umlal, 0x00a0_0090, 0x0fe0_00f0);
        t.register(Smull, 0x00c0_0090, 0x0fe0_00f0);
        t.register(Smlal, 0x00e0_0090, 0x0fe0_00f0);

        t.register(Sdiv, 0x0710_f010, 0x0ff0_f0f0);
        t.register(Udiv, 0x0730_f010, 0x0ff0_f0f0);
        t.register(Sbfx, 0x07a0_0050, 0x0fe0_0070);
        t.register(Ubfx, 0x07e0_0050, 0x0fe0_0070);
        t.register(Sxtb, 0x06af_0070, 0x0fff_03f0);
        t.register(Sxth, 0x06bf_0070, 0x0fff_03f0);
        t.register(Uxtb, 0x06ef_0070, 0x0fff_03f0);
        t.register(Uxth, 0x06ff_0070, 0x0fff_03f0);
        t.register(Rev, 0x06bf_0f30, 0x0fff_0ff0);
        t.register(Rev16, 0x06bf_0fb0, 0x0fff_0ff0);
        t.register(Revsh, 0x06ff_0fb0, 0x0fff_0ff0);
        t.register(Clz, 0x016f_0f10, 0x0fff_0ff0);

        // Wide moves sit in the compare rows of the immediate
        // data-processing space (TST/TEQ with S=0).
        t.register(Movw, 0x0300_0000, 0x0ff0_0000);
        t.register(Movt, 0x0340_0000, 0x0ff0_0000);

        t.register(MemHalfImm, 0x0040_0090, 0x0e40_0090);
        t.register(MemHalfReg, 0x0000_0090, 0x0e40_0f90);

        // Data processing, three encodings per operation.
        for (op, code) in [
            (DpAnd, 0x0u32), (DpEor, 0x1), (DpSub, 0x2), (DpRsb, 0x3),
            (DpAdd, 0x4), (DpAdc, 0x5), (DpSbc, 0x6), (DpRsc, 0x7),
            (DpTst, 0x8), (DpTeq, 0x9), (DpCmp, 0xa), (DpCmn, 0xb),
            (DpOrr, 0xc), (DpMov, 0xd), (DpBic, 0xe), (DpMvn, 0xf),
        ] {
            // The compare row exists only with S=1; its S=0 encodings
            // belong to the system group above.
            let (s_value, s_mask) = if op_is_compare(code) {
                (1 << 20, 1 << 20)
            } else {
                (0, 0)
            };
            let row = code << 21 | s_value;
            t.register(op, row, 0x0fe0_0010 | s_mask); // register, imm shift
            t.register(op, row | 0x10, 0x0fe0_0090 | s_mask); // register, reg shift
            t.register(op, row | 0x0200_0000, 0x0fe0_0000 | s_mask); // immediate
        }

        t.register(MemImm, 0x0400_0000, 0x0e00_0000);
        t.register(MemReg, 0x0600_0000, 0x0e00_0010);
        t.register(Block, 0x0800_0000, 0x0e00_0000);
        t.register(B, 0x0a00_0000, 0x0f00_0000);
        t.register(Bl, 0x0b00_0000, 0x0f00_0000);
        t.register(Swi, 0x0f00_0000, 0x0f00_0000);
        t
    }

    /// Insert into every bucket the pattern's bits [27:24] can hash to.
    pub fn register(&mut self, op: ArmOpId, value: u32, mask: u32) {
        let desc = ArmDescriptor { op, value, mask };
        let nib_mask = (mask >> 24) & 0xf;
        let nib_value = (value >> 24) & 0xf;
        for bucket in 0..BUCKETS as u32 {
            if bucket & nib_mask == nib_value {
                self.buckets[bucket as usize].push(desc);
            }
        }
    }

    /// First registered descriptor matching the condition-stripped word.
    pub fn lookup(&self, word: u32) -> Option<&ArmDescriptor> {
        let word = word & 0x0fff_ffff;
        self.buckets[((word >> 24) & 0xf) as usize]
            .iter()
            .find(|d| d.matches(word))
    }
}

const fn op_is_compare(code: u32) -> bool {
    code >= 0x8 && code <= 0xb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movt_wins_over_compare_row() {
        let t = ArmTable::armv7();
        // movt r0, #0x1234 (cond AL)
        assert_eq!(t.lookup(0xe341_0234).map(|d| d.op), Some(ArmOpId::Movt));
        // tst r1, #4 keeps its S=1 encoding
        assert_eq!(t.lookup(0xe311_0004).map(|d| d.op), Some(ArmOpId::DpTst));
    }

    #[test]
    fn multiplies_win_over_halfword_space() {
        let t = ArmTable::armv7();
        // mul r0, r1, r2
        assert_eq!(t.lookup(0xe000_0291).map(|d| d.op), Some(ArmOpId::Mul));
        // smull r0, r1, r2, r3
        assert_eq!(t.lookup(0xe0c1_0392).map(|d| d.op), Some(ArmOpId::Smull));
        // strh r2, [r3, #2]
        assert_eq!(t.lookup(0xe1c3_20b2).map(|d| d.op), Some(ArmOpId::MemHalfImm));
    }

    #[test]
    fn single_transfers_hash_to_both_p_buckets() {
        let t = ArmTable::armv7();
        // ldr r0, [r1], #4 (post-indexed, P=0)
        assert_eq!(t.lookup(0xe491_0004).map(|d| d.op), Some(ArmOpId::MemImm));
        // ldr r0, [r1, #4] (pre-indexed, P=1)
        assert_eq!(t.lookup(0xe591_0004).map(|d| d.op), Some(ArmOpId::MemImm));
    }

    #[test]
    fn branch_exchange_is_not_teq() {
        let t = ArmTable::armv7();
        assert_eq!(t.lookup(0xe12f_ff1e).map(|d| d.op), Some(ArmOpId::Bx));
        assert_eq!(t.lookup(0xe12f_ff33).map(|d| d.op), Some(ArmOpId::BlxReg));
    }
}
