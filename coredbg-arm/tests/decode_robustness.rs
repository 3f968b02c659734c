//! The decoders are total functions: any byte pattern either decodes or
//! reports an illegal-instruction error, and matching is deterministic.

use coredbg_arm::{decode_arm, decode_thumb, disasm, is_thumb32, ArmTable};
use proptest::prelude::*;

proptest! {
    #[test]
    fn arm_decode_never_panics(word in 0u32..=u32::MAX) {
        let table = ArmTable::armv7();
        if let Ok(i) = decode_arm(&table, word) {
            // Anything decodable must also render.
            let text = disasm::format(&i);
            prop_assert!(!text.is_empty());
        }
    }

    #[test]
    fn thumb_decode_never_panics(h1 in 0u16..=u16::MAX, h2 in 0u16..=u16::MAX) {
        if let Ok((i, len)) = decode_thumb(h1, h2) {
            prop_assert_eq!(len == 4, is_thumb32(h1));
            let text = disasm::format(&i);
            prop_assert!(!text.is_empty());
        }
    }

    #[test]
    fn decoding_is_deterministic(word in 0u32..=u32::MAX) {
        let table = ArmTable::armv7();
        prop_assert_eq!(decode_arm(&table, word), decode_arm(&table, word));
    }
}
