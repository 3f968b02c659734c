//! The operand-2 barrel shifter.
//!
//! Immediate shift encodings fold special cases into the amount: `LSR #0`
//! and `ASR #0` mean `#32`, `ROR #0` means RRX. Register-controlled shifts
//! take the low byte of Rs and may shift by 32 or more, which drains the
//! value and leaves the last bit shifted out in the carry.

/// Shift or rotate type after immediate-decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SrType {
    Lsl,
    Lsr,
    Asr,
    Ror,
    Rrx,
}

impl SrType {
    /// Raw 2-bit shift-type field.
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => Self::Lsl,
            1 => Self::Lsr,
            2 => Self::Asr,
            _ => Self::Ror,
        }
    }

    /// Assembler name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Lsl => "lsl",
            Self::Lsr => "lsr",
            Self::Asr => "asr",
            Self::Ror => "ror",
            Self::Rrx => "rrx",
        }
    }
}

/// Decode an immediate shift field `(type, imm5)` into the effective
/// `(type, amount)` pair, applying the `#0` special cases.
pub const fn decode_imm_shift(ty_bits: u32, imm5: u32) -> (SrType, u32) {
    let imm5 = imm5 & 0x1f;
    match SrType::from_bits(ty_bits) {
        SrType::Lsl => (SrType::Lsl, imm5),
        SrType::Lsr => (SrType::Lsr, if imm5 == 0 { 32 } else { imm5 }),
        SrType::Asr => (SrType::Asr, if imm5 == 0 { 32 } else { imm5 }),
        SrType::Ror | SrType::Rrx => {
            if imm5 == 0 {
                (SrType::Rrx, 1)
            } else {
                (SrType::Ror, imm5)
            }
        }
    }
}

/// Shift `value` and report the shifter carry-out.
///
/// `amount == 0` is the identity and preserves the carry for every type
/// except RRX, whose amount is always 1.
pub fn shift_c(value: u32, ty: SrType, amount: u32, carry_in: bool) -> (u32, bool) {
    if amount == 0 && ty != SrType::Rrx {
        return (value, carry_in);
    }
    match ty {
        SrType::Lsl => {
            if amount >= 33 {
                (0, false)
            } else if amount == 32 {
                (0, value & 1 != 0)
            } else {
                (value << amount, (value >> (32 - amount)) & 1 != 0)
            }
        }
        SrType::Lsr => {
            if amount >= 33 {
                (0, false)
            } else if amount == 32 {
                (0, value >> 31 != 0)
            } else {
                (value >> amount, (value >> (amount - 1)) & 1 != 0)
            }
        }
        SrType::Asr => {
            if amount >= 32 {
                let fill = (value as i32 >> 31) as u32;
                (fill, fill & 1 != 0)
            } else {
                (
                    (value as i32 >> amount) as u32,
                    (value >> (amount - 1)) & 1 != 0,
                )
            }
        }
        SrType::Ror => {
            let amount = amount & 0x1f;
            if amount == 0 {
                // Multiple of 32: value unchanged, carry from bit 31.
                (value, value >> 31 != 0)
            } else {
                let res = value.rotate_right(amount);
                (res, res >> 31 != 0)
            }
        }
        SrType::Rrx => {
            let res = (value >> 1) | ((carry_in as u32) << 31);
            (res, value & 1 != 0)
        }
    }
}

/// Rotate-immediate construction of an ARM data-processing constant:
/// `imm8` rotated right by `2 * rot`. The carry is `None` when the
/// rotation is zero (the shifter preserves the current carry).
pub fn expand_arm_imm(imm8: u32, rot: u32) -> (u32, Option<bool>) {
    let value = imm8.rotate_right(2 * (rot & 0xf));
    if rot & 0xf == 0 {
        (value, None)
    } else {
        (value, Some(value >> 31 != 0))
    }
}

/// ThumbExpandImm: the modified-immediate constant of 32-bit Thumb
/// data-processing encodings.
pub fn expand_thumb_imm(imm12: u32) -> (u32, Option<bool>) {
    let imm8 = imm12 & 0xff;
    match (imm12 >> 8) & 0xf {
        0b0000 => (imm8, None),
        0b0001 => (imm8 << 16 | imm8, None),
        0b0010 => (imm8 << 24 | imm8 << 8, None),
        0b0011 => (imm8 << 24 | imm8 << 16 | imm8 << 8 | imm8, None),
        _ => {
            let unrotated = 0x80 | (imm12 & 0x7f);
            let amount = (imm12 >> 7) & 0x1f;
            let value = unrotated.rotate_right(amount);
            (value, Some(value >> 31 != 0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsr_zero_encodes_32() {
        assert_eq!(decode_imm_shift(1, 0), (SrType::Lsr, 32));
        let (res, c) = shift_c(0x8000_0001, SrType::Lsr, 32, false);
        assert_eq!(res, 0);
        assert!(c);
    }

    #[test]
    fn asr_fills_with_sign() {
        assert_eq!(decode_imm_shift(2, 0), (SrType::Asr, 32));
        let (res, c) = shift_c(0x8000_0000, SrType::Asr, 32, false);
        assert_eq!(res, 0xffff_ffff);
        assert!(c);
    }

    #[test]
    fn ror_zero_decodes_as_rrx() {
        assert_eq!(decode_imm_shift(3, 0), (SrType::Rrx, 1));
        let (res, c) = shift_c(0x0000_0001, SrType::Rrx, 1, true);
        assert_eq!(res, 0x8000_0000);
        assert!(c);
    }

    #[test]
    fn register_shift_past_width_drains() {
        let (res, c) = shift_c(0xffff_ffff, SrType::Lsl, 40, true);
        assert_eq!(res, 0);
        assert!(!c);
    }

    #[test]
    fn thumb_imm_patterns() {
        assert_eq!(expand_thumb_imm(0x0ab), (0xab, None));
        assert_eq!(expand_thumb_imm(0x1ab), (0x00ab_00ab, None));
        assert_eq!(expand_thumb_imm(0x2ab), (0xab00_ab00, None));
        assert_eq!(expand_thumb_imm(0x3ab), (0xabab_abab, None));
        // Rotation form: unrotated 0xC0, rotated right by 9.
        assert_eq!(expand_thumb_imm(0x4c0), (0x6000_0000, Some(false)));
    }
}
