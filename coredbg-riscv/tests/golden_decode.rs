//! Golden decode vectors: real-world encodings against expected
//! mnemonics, lengths and table identities.

use coredbg_riscv::{decode, disasm, InstructionTable, OpId};
use rstest::rstest;

fn table() -> InstructionTable {
    InstructionTable::rv64imafc()
}

#[rstest]
// RV64I arithmetic and control flow
#[case(0x00c5_8533, OpId::Add, 4, "add a0,a1,a2")]
#[case(0x40b5_0533, OpId::Sub, 4, "sub a0,a0,a1")]
#[case(0x0015_0513, OpId::Addi, 4, "addi a0,a0,1")]
#[case(0xfff5_0513, OpId::Addi, 4, "addi a0,a0,-1")]
#[case(0x0000_0013, OpId::Addi, 4, "nop")]
#[case(0x0330_0593, OpId::Addi, 4, "li a1,51")]
#[case(0x0125_1513, OpId::Slli, 4, "slli a0,a0,18")]
#[case(0x4025_5513, OpId::Srai, 4, "srai a0,a0,2")]
#[case(0x02b5_0533, OpId::Mul, 4, "mul a0,a0,a1")]
#[case(0x02b5_4533, OpId::Div, 4, "div a0,a0,a1")]
#[case(0x0005_053b, OpId::Addw, 4, "addw a0,a0,zero")]
#[case(0xfe05_4ce3, OpId::Blt, 4, "blt a0,zero,-8")]
#[case(0x0000_0097, OpId::Auipc, 4, "auipc ra,0x0")]
#[case(0x0100_0517, OpId::Auipc, 4, "auipc a0,0x1000")]
#[case(0x0080_006f, OpId::Jal, 4, "j 8")]
#[case(0x0000_8067, OpId::Jalr, 4, "ret")]
// Loads and stores
#[case(0x0005_3503, OpId::Ld, 4, "ld a0,0(a0)")]
#[case(0xff87_3783, OpId::Ld, 4, "ld a5,-8(a4)")]
#[case(0x00a7_b423, OpId::Sd, 4, "sd a0,8(a5)")]
#[case(0x0007_4683, OpId::Lbu, 4, "lbu a3,0(a4)")]
// System
#[case(0x0000_0073, OpId::Ecall, 4, "ecall")]
#[case(0x0010_0073, OpId::Ebreak, 4, "ebreak")]
#[case(0x3020_0073, OpId::Mret, 4, "mret")]
#[case(0x1050_0073, OpId::Wfi, 4, "wfi")]
#[case(0x3412_9073, OpId::Csrrw, 4, "csrrw zero,mepc,t0")]
#[case(0xf100_2573, OpId::Csrrs, 4, "csrrs a0,mhartid,zero")]
// Atomics
#[case(0x1005_252f, OpId::LrW, 4, "lr.w a0,(a0)")]
#[case(0x18b5_252f, OpId::ScW, 4, "sc.w a0,a1,(a0)")]
#[case(0x00b5_352f, OpId::AmoAddD, 4, "amoadd.d a0,a1,(a0)")]
// Compressed
#[case(0x0001, OpId::CAddi, 2, "nop")]
#[case(0x4501, OpId::CLi, 2, "li a0,0")]
#[case(0x852e, OpId::CMv, 2, "mv a0,a1")]
#[case(0x9522, OpId::CAdd, 2, "add a0,a0,s0")]
#[case(0x8082, OpId::CJr, 2, "ret")]
#[case(0x9002, OpId::CEbreak, 2, "ebreak")]
#[case(0xe406, OpId::CSdsp, 2, "sd ra,8(sp)")]
#[case(0x60a2, OpId::CLdsp, 2, "ld ra,8(sp)")]
fn golden(#[case] word: u32, #[case] op: OpId, #[case] len: u8, #[case] text: &str) {
    let d = decode(&table(), word).unwrap_or_else(|e| panic!("{word:#010x}: {e}"));
    assert_eq!(d.op, op, "{word:#010x}");
    assert_eq!(d.len, len, "{word:#010x}");
    assert_eq!(disasm::format(&d.instr), text, "{word:#010x}");
}

#[rstest]
#[case(0xffff_ffff)]
#[case(0x0000_0000)]
#[case(0x0000_001f)]
fn garbage_is_rejected(#[case] word: u32) {
    assert!(decode(&table(), word).is_err(), "{word:#010x} must not decode");
}
