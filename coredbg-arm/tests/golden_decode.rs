//! Golden decode vectors for ARM and Thumb encodings.

use coredbg_arm::{decode_arm, decode_thumb, disasm, ArmTable, Cond};
use rstest::rstest;

fn dis_arm(word: u32) -> String {
    let table = ArmTable::armv7();
    disasm::format(&decode_arm(&table, word).expect("arm decode"))
}

fn dis_thumb(h1: u16, h2: u16) -> (String, u8) {
    let (i, len) = decode_thumb(h1, h2).expect("thumb decode");
    (disasm::format(&i), len)
}

#[rstest]
#[case(0xe090_0001, "adds r0,r0,r1")]
#[case(0xe040_0001, "sub r0,r0,r1")]
#[case(0xe2a0_1005, "adc r1,r0,#5")]
#[case(0xe1a0_1002, "mov r1,r2")]
#[case(0xe1a0_1102, "mov r1,r2,lsl #2")]
#[case(0xe1a0_1262, "mov r1,r2,ror #4")]
#[case(0xe1a0_1062, "mov r1,r2,rrx")]
#[case(0xe3e0_1000, "mvn r1,#0")]
#[case(0xe311_0004, "tst r1,#4")]
#[case(0xe155_0006, "cmp r5,r6")]
#[case(0xe000_0291, "mul r0,r1,r2")]
#[case(0xe021_3492, "mla r1,r2,r4,r3")]
#[case(0xe0c1_0392, "smull r0,r1,r2,r3")]
#[case(0xe591_0004, "ldr r0,[r1,#4]")]
#[case(0xe511_0004, "ldr r0,[r1,#-4]")]
#[case(0xe491_0004, "ldr r0,[r1],#4")]
#[case(0xe5e1_0001, "strb r0,[r1,#1]!")]
#[case(0xe1c3_20b2, "strh r2,[r3,#2]")]
#[case(0xe1d3_20f2, "ldrsh r2,[r3,#2]")]
#[case(0xe791_0002, "ldr r0,[r1,r2]")]
#[case(0xe8bd_8003, "ldmia sp!,{r0,r1,pc}")]
#[case(0xe92d_4003, "stmdb sp!,{r0,r1,lr}")]
#[case(0xe12f_ff1e, "bx lr")]
#[case(0xe12f_ff33, "blx r3")]
#[case(0xef00_002a, "svc 0x2a")]
#[case(0xe341_1234, "movt r1,#4660")]
#[case(0xe30a_1bcd, "movw r1,#43981")]
#[case(0xe6af_1072, "sxtb r1,r2")]
#[case(0xe6ff_1072, "uxth r1,r2")]
#[case(0xe7a1_0250, "sbfx r0,r0,#4,#2")]
#[case(0x0a00_0010, "beq +64")]
#[case(0xeb00_0010, "bl +64")]
fn golden_arm(#[case] word: u32, #[case] text: &str) {
    assert_eq!(dis_arm(word), text, "{word:#010x}");
}

#[rstest]
// The 16-bit forms render through the shared ARM kinds, so the strings
// carry the full operand lists even where assemblers accept shorthand.
#[case(0x4611, 2, "mov r1,r2")]
#[case(0x1840, 2, "adds r0,r0,r1")]
#[case(0x3805, 2, "subs r0,r0,#5")]
#[case(0x2a00, 2, "cmp r2,#0")]
#[case(0x4148, 2, "adcs r0,r0,r1")]
#[case(0x4770, 2, "bx lr")]
#[case(0xb530, 2, "stmdb sp!,{r4,r5,lr}")]
#[case(0xbd30, 2, "ldmia sp!,{r4,r5,pc}")]
#[case(0xbf08, 2, "it eq")]
#[case(0xbf00, 2, "nop")]
#[case(0xdf2a, 2, "svc 0x2a")]
#[case(0xb282, 2, "uxth r2,r0")]
#[case(0xba11, 2, "rev r1,r2")]
#[case(0xba51, 2, "rev16 r1,r2")]
#[case(0xbad1, 2, "revsh r1,r2")]
fn golden_thumb16(#[case] h1: u16, #[case] len: u8, #[case] text: &str) {
    let (s, l) = dis_thumb(h1, 0);
    assert_eq!(l, len, "{h1:#06x}");
    assert_eq!(s, text, "{h1:#06x}");
}

#[rstest]
#[case(0xf04f, 0x0001, "mov r0,#1")]
#[case(0xf100, 0x0101, "add r1,r0,#1")]
#[case(0xf1b0, 0x0f01, "cmp r0,#1")]
#[case(0xf200, 0x3121, "add r1,r0,#801")] // addw: plain 12-bit immediate
#[case(0xf2a0, 0x3121, "sub r1,r0,#801")]
#[case(0xf20f, 0x0008, "adr r0,+8")]
fn golden_thumb32_dp(#[case] h1: u16, #[case] h2: u16, #[case] text: &str) {
    let (s, len) = dis_thumb(h1, h2);
    assert_eq!(len, 4);
    assert_eq!(s, text, "{h1:#06x} {h2:#06x}");
}

#[test]
fn thumb32_dual_transfers() {
    // strd r2, r3, [r0, #8]
    let (s, len) = dis_thumb(0xe9c0, 0x2302);
    assert_eq!(len, 4);
    assert_eq!(s, "strd r2,[r0,#8]");
    // ldrd r4, r5, [r1], #16 (post-indexed)
    let (s, _) = dis_thumb(0xe8f1, 0x4504);
    assert_eq!(s, "ldrd r4,[r1],#16");
}

#[test]
fn thumb32_movw_movt() {
    // movw r1, #0x1234
    let (s, len) = dis_thumb(0xf241, 0x2134);
    assert_eq!(len, 4);
    assert_eq!(s, "movw r1,#4660");
    // movt r1, #0x5678
    let (s, _) = dis_thumb(0xf2c5, 0x6178);
    assert_eq!(s, "movt r1,#22136");
}

#[test]
fn thumb32_wide_memory() {
    // ldr.w r0, [r1, #16]
    let (s, len) = dis_thumb(0xf8d1, 0x0010);
    assert_eq!(len, 4);
    assert_eq!(s, "ldr r0,[r1,#16]");
    // str.w r2, [r3, #0x20]
    let (s, _) = dis_thumb(0xf8c3, 0x2020);
    assert_eq!(s, "str r2,[r3,#32]");
}

#[test]
fn thumb32_table_branch() {
    let (s, _) = dis_thumb(0xe8d1, 0xf002);
    assert_eq!(s, "tbb [r1,r2]");
    let (s, _) = dis_thumb(0xe8d1, 0xf012);
    assert_eq!(s, "tbh [r1,r2,lsl #1]");
}

#[test]
fn conditional_branch_condition_field() {
    let table = ArmTable::armv7();
    let i = decode_arm(&table, 0x1a00_0004).unwrap(); // bne
    assert_eq!(i.cond, Cond::Ne);
}
