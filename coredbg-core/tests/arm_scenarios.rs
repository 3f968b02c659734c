//! End-to-end ARM/Thumb core scenarios.

use std::sync::Arc;

use coredbg_arm::{CpuMode, ProgramStatus};
use coredbg_bus::{BusFabric, SramModel};
use coredbg_core::{ArmCore, CoreConfig, CoreIsa, ExecuteState, SimContext};

fn setup() -> (SimContext<BusFabric>, Arc<SramModel>) {
    let sram = Arc::new(SramModel::new(0, 0x10000));
    let mut fabric = BusFabric::new();
    fabric.attach(sram.clone());
    let bus = Arc::new(fabric);
    let mut ctx = SimContext::new(bus.clone());
    ctx.reservations = bus.reservations().clone();
    (ctx, sram)
}

fn arm_core(ctx: &SimContext<BusFabric>, pc: u32) -> ArmCore<BusFabric> {
    let cfg = CoreConfig {
        reset_vector: u64::from(pc),
        isa: CoreIsa::Armv7,
        ..CoreConfig::default()
    };
    let mut core = ArmCore::new(cfg, ctx.clone());
    core.set_pc(pc);
    core
}

fn load_words(sram: &SramModel, addr: u32, words: &[u32]) {
    for (i, w) in words.iter().enumerate() {
        sram.load(u64::from(addr) + 4 * i as u64, &w.to_le_bytes());
    }
}

fn load_halves(sram: &SramModel, addr: u32, halves: &[u16]) {
    for (i, h) in halves.iter().enumerate() {
        sram.load(u64::from(addr) + 2 * i as u64, &h.to_le_bytes());
    }
}

#[test]
fn adds_overflow_sets_nv_clears_zc() {
    let (ctx, sram) = setup();
    // adds r0, r0, r1
    load_words(&sram, 0x1000, &[0xe090_0001]);
    let mut core = arm_core(&ctx, 0x1000);
    core.set_reg(0, 0x7fff_ffff);
    core.set_reg(1, 1);

    core.step();
    assert_eq!(core.reg(0), 0x8000_0000);
    let psr = core.psr();
    assert!(psr.n());
    assert!(!psr.z());
    assert!(!psr.c());
    assert!(psr.v());
}

#[test]
fn subs_borrow_clears_carry() {
    let (ctx, sram) = setup();
    // subs r0, r0, r1 with r0 < r1: borrow means C = 0
    load_words(&sram, 0x1000, &[0xe050_0001]);
    let mut core = arm_core(&ctx, 0x1000);
    core.set_reg(0, 1);
    core.set_reg(1, 2);

    core.step();
    assert_eq!(core.reg(0), 0xffff_ffff);
    assert!(!core.psr().c(), "borrow clears C");
    assert!(core.psr().n());
    assert!(!core.psr().v());
}

#[test]
fn conditional_execution_respects_flags() {
    let (ctx, sram) = setup();
    // moveq r2, #1 ; movne r3, #1
    load_words(&sram, 0x1000, &[0x03a0_2001, 0x13a0_3001]);
    let mut core = arm_core(&ctx, 0x1000);
    let mut psr = core.psr();
    psr.set_z(true);
    core.set_psr(psr);

    core.step();
    core.step();
    assert_eq!(core.reg(2), 1, "eq executes under Z");
    assert_eq!(core.reg(3), 0, "ne squashed under Z");
}

#[test]
fn it_block_predicates_exactly_one_slot() {
    let (ctx, sram) = setup();
    // it eq ; mov r1, r2 ; mov r4, r5  (third instruction unconditional)
    load_halves(&sram, 0x1000, &[0xbf08, 0x4611, 0x462c]);

    // Z set: the predicated mov executes.
    let mut core = arm_core(&ctx, 0x1001);
    let mut psr = core.psr();
    psr.set_z(true);
    core.set_psr(psr);
    core.set_reg(2, 0xaa);
    core.set_reg(5, 0xbb);
    core.step(); // it eq
    core.step(); // mov r1, r2 (predicated, passes)
    core.step(); // mov r4, r5 (outside the block)
    assert_eq!(core.reg(1), 0xaa);
    assert_eq!(core.reg(4), 0xbb);

    // Z clear: the predicated mov is squashed, the next one still runs.
    let mut core = arm_core(&ctx, 0x1001);
    core.set_reg(2, 0xaa);
    core.set_reg(5, 0xbb);
    core.step();
    core.step();
    core.step();
    assert_eq!(core.reg(1), 0, "squashed slot leaves r1 alone");
    assert_eq!(core.reg(4), 0xbb, "block is exactly one slot long");
}

#[test]
fn thumb16_flags_suppressed_inside_it_block() {
    let (ctx, sram) = setup();
    // it eq ; adds-form add r0, r0, r1 (16-bit) -- inside IT: no flags
    load_halves(&sram, 0x1000, &[0xbf08, 0x1840]);
    let mut core = arm_core(&ctx, 0x1001);
    let mut psr = core.psr();
    psr.set_z(true);
    core.set_psr(psr);
    core.set_reg(0, 0x7fff_ffff);
    core.set_reg(1, 1);

    core.step();
    core.step();
    assert_eq!(core.reg(0), 0x8000_0000);
    assert!(!core.psr().v(), "IT suppresses the 16-bit flag update");
    assert!(core.psr().z(), "Z keeps its pre-block value");
}

#[test]
fn bx_toggles_instruction_mode() {
    let (ctx, sram) = setup();
    // ARM: bx r0 with r0 = 0x2001 -> Thumb at 0x2000
    load_words(&sram, 0x1000, &[0xe12f_ff10]);
    // Thumb at 0x2000: bx r1 with r1 = 0x3000 -> back to ARM
    load_halves(&sram, 0x2000, &[0x4708]);
    let mut core = arm_core(&ctx, 0x1000);
    core.set_reg(0, 0x2001);
    core.set_reg(1, 0x3000);

    core.step();
    assert!(core.psr().t(), "LSB selects Thumb");
    assert_eq!(core.next_pc(), 0x2000);

    core.step();
    assert!(!core.psr().t(), "clear LSB returns to ARM");
    assert_eq!(core.next_pc(), 0x3000);
}

#[test]
fn block_transfer_ascending_and_writeback() {
    let (ctx, sram) = setup();
    // stmdb sp!, {r0, r1, lr} ; ldmia sp!, {r0, r1, pc}
    load_words(&sram, 0x1000, &[0xe92d_4003, 0xe8bd_8003]);
    let mut core = arm_core(&ctx, 0x1000);
    core.set_reg(0, 0x11);
    core.set_reg(1, 0x22);
    core.set_reg(14, 0x2000);
    core.set_reg(13, 0x8000);

    core.step();
    assert_eq!(core.reg(13), 0x8000 - 12, "stmdb writes back");
    let mut out = [0u8; 4];
    sram.dump(0x8000 - 12, &mut out);
    assert_eq!(u32::from_le_bytes(out), 0x11, "lowest register at lowest address");
    sram.dump(0x8000 - 4, &mut out);
    assert_eq!(u32::from_le_bytes(out), 0x2000, "lr highest");

    core.step();
    assert_eq!(core.reg(13), 0x8000, "ldmia restores sp");
    assert_eq!(core.next_pc(), 0x2000, "pc loaded from the list");
}

#[test]
fn svc_stacks_frame_and_vectors() {
    let (ctx, sram) = setup();
    // Vector 11 (SVCall) points at 0x3000, Thumb bit set.
    load_words(&sram, 4 * 11, &[0x3001]);
    // svc #0 in ARM state at 0x1000
    load_words(&sram, 0x1000, &[0xef00_0000]);
    let mut core = arm_core(&ctx, 0x1000);
    core.set_reg(0, 0xa0);
    core.set_reg(13, 0x8000);

    core.step();
    assert_eq!(core.next_pc(), 0x3000);
    assert!(core.psr().t(), "thumb bit restored from vector LSB");
    assert_eq!(core.psr().mode(), CpuMode::Supervisor);
    assert_eq!(core.reg(14), 0xffff_fff9, "EXC_RETURN in lr");
    assert_eq!(core.reg(13), 0x8000 - 32, "eight words stacked");

    let mut out = [0u8; 4];
    sram.dump(0x8000 - 32, &mut out);
    assert_eq!(u32::from_le_bytes(out), 0xa0, "r0 at the bottom of the frame");
}

#[test]
fn exception_return_unstacks() {
    let (ctx, sram) = setup();
    load_words(&sram, 4 * 11, &[0x3000]); // handler in ARM state
    load_words(&sram, 0x1000, &[0xef00_0000, 0xe1a0_0000]); // svc ; nop
    load_words(&sram, 0x3000, &[0xe12f_ff1e]); // bx lr (EXC_RETURN)
    let mut core = arm_core(&ctx, 0x1000);
    core.set_reg(0, 0x42);
    core.set_reg(13, 0x8000);

    core.step(); // svc
    core.step(); // bx lr -> exception return
    assert_eq!(core.reg(0), 0x42, "r0 restored");
    assert_eq!(core.reg(13), 0x8000, "sp unwound");
    assert_eq!(core.next_pc(), 0x1004, "return lands after the svc");
    assert!(!core.psr().t());
}

#[test]
fn register_shift_updates_carry_from_last_bit_out() {
    let (ctx, sram) = setup();
    // movs r0, r1, lsr r2 with r2 = 32: result 0, carry = bit 31
    load_words(&sram, 0x1000, &[0xe1b0_0231]);
    let mut core = arm_core(&ctx, 0x1000);
    core.set_reg(1, 0x8000_0000);
    core.set_reg(2, 32);

    core.step();
    assert_eq!(core.reg(0), 0);
    assert!(core.psr().c());
    assert!(core.psr().z());
}

#[test]
fn udiv_by_zero_yields_zero() {
    let (ctx, sram) = setup();
    // udiv r0, r1, r2
    load_words(&sram, 0x1000, &[0xe730_f211]);
    let mut core = arm_core(&ctx, 0x1000);
    core.set_reg(1, 42);
    core.set_reg(2, 0);
    assert_eq!(core.step(), ExecuteState::Proceed);
    assert_eq!(core.reg(0), 0);
}

#[test]
fn irq_enters_vector_16_when_unmasked() {
    let (ctx, sram) = setup();
    load_words(&sram, 4 * 16, &[0x5000]); // IRQ vector, ARM handler
    load_words(&sram, 0x1000, &[0xe1a0_0000, 0xe1a0_0000]); // nops
    let mut core = arm_core(&ctx, 0x1000);
    core.set_reg(13, 0x8000);
    let mut psr = core.psr();
    psr.set_i(false);
    core.set_psr(psr);

    core.step(); // first nop
    core.set_irq(true);
    core.step(); // exception taken before the second nop
    assert_eq!(core.pc(), 0x5000, "execution redirected to the handler");
    assert_eq!(core.reg(14), 0xffff_fff9);
    assert!(core.psr().i(), "further IRQs masked on entry");

    let mut out = [0u8; 4];
    // Return address slot holds the interrupted pc.
    sram.dump(0x8000 - 8, &mut out);
    assert_eq!(u32::from_le_bytes(out), 0x1004);
}

#[test]
fn irq_waits_for_open_it_block() {
    let (ctx, sram) = setup();
    load_words(&sram, 4 * 16, &[0x5000]);
    // it eq ; mov r1, r2 ; nop
    load_halves(&sram, 0x1000, &[0xbf08, 0x4611, 0xbf00]);
    let mut core = arm_core(&ctx, 0x1001);
    core.set_reg(13, 0x8000);
    let mut psr = core.psr();
    psr.set_i(false);
    psr.set_z(true);
    core.set_psr(psr);

    core.step(); // it eq opens the block
    core.set_irq(true);
    core.step(); // predicated slot still runs; IRQ deferred
    assert_eq!(core.pc(), 0x1002, "IT slot executed before the interrupt");
    core.step();
    assert_eq!(core.pc(), 0x5000, "interrupt delivered once the block closed");
}

#[test]
fn rev_and_clz_compute() {
    let (ctx, sram) = setup();
    // rev r0, r1 ; clz r2, r3
    load_words(&sram, 0x1000, &[0xe6bf_0f31, 0xe16f_2f13]);
    let mut core = arm_core(&ctx, 0x1000);
    core.set_reg(1, 0x1122_3344);
    core.set_reg(3, 0x0000_8000);

    core.step();
    core.step();
    assert_eq!(core.reg(0), 0x4433_2211);
    assert_eq!(core.reg(2), 16);
}

#[test]
fn stm_post_indexed_writeback_is_preserved() {
    let (ctx, sram) = setup();
    // stmda r0!, {r1, r2}: P=0, U=0, W=1 -- UNPREDICTABLE but kept
    load_words(&sram, 0x1000, &[0xe820_0006]);
    let mut core = arm_core(&ctx, 0x1000);
    core.set_reg(0, 0x4000);
    core.set_reg(1, 1);
    core.set_reg(2, 2);

    core.step();
    assert_eq!(core.reg(0), 0x4000 - 8, "writeback still happens");
}
