//! Inter-processor interrupt plumbing across harts.

use std::sync::Arc;

use coredbg_bus::{BusFabric, SramModel};
use coredbg_core::{CoreConfig, CoreMode, ExecuteState, RiscvCore, SimContext};
use coredbg_riscv::{csr, Instruction, RegId};

#[test]
fn send_ipi_wakes_a_parked_sibling() {
    let sram = Arc::new(SramModel::new(0, 0x4000));
    let mut fabric = BusFabric::new();
    fabric.attach(sram.clone());
    let bus = Arc::new(fabric);
    let mut ctx = SimContext::new(bus.clone());
    ctx.reservations = bus.reservations().clone();

    // Hart 0: csrrwi zero, send_ipi, 1. Hart 1: wfi.
    let ipi = Instruction::Csr {
        op: coredbg_riscv::CsrOp::Rwi,
        rd: RegId::ZERO,
        src: 1,
        addr: csr::SEND_IPI,
    }
    .encode();
    sram.load(0x200, &ipi.to_le_bytes());
    sram.load(0x300, &Instruction::Wfi.encode().to_le_bytes());

    let mut hart0 = RiscvCore::new(
        CoreConfig { hartid: 0, reset_vector: 0x200, ..CoreConfig::default() },
        ctx.clone(),
    );
    let mut hart1 = RiscvCore::new(
        CoreConfig { hartid: 1, reset_vector: 0x300, ..CoreConfig::default() },
        ctx.clone(),
    );
    ctx.ipi_doorbells = vec![hart0.ipi_handle(), hart1.ipi_handle()];
    hart0.set_context(ctx.clone());
    hart1.set_context(ctx.clone());
    hart1.write_reg_by_name("mie", 1 << 3);

    hart1.step();
    assert_eq!(hart1.mode(), CoreMode::WaitForIrq);
    assert_eq!(hart1.step(), ExecuteState::WaitIrq);

    hart0.step(); // fires the doorbell
    let state = hart1.step();
    assert_ne!(state, ExecuteState::WaitIrq, "IPI from hart 0 wakes hart 1");
    assert_eq!(
        hart1.reg_by_name("mip").map(|v| v & (1 << 3)),
        Some(1 << 3),
        "MSIP pending on the target hart"
    );
}

#[test]
fn self_ipi_sets_own_pending_bit() {
    let sram = Arc::new(SramModel::new(0, 0x1000));
    let mut fabric = BusFabric::new();
    fabric.attach(sram.clone());
    let bus = Arc::new(fabric);
    let ctx = SimContext::new(bus);

    let ipi = Instruction::Csr {
        op: coredbg_riscv::CsrOp::Rwi,
        rd: RegId::ZERO,
        src: 0,
        addr: csr::SEND_IPI,
    }
    .encode();
    sram.load(0x200, &ipi.to_le_bytes());
    let mut core = RiscvCore::new(CoreConfig::default(), ctx);

    core.step();
    assert_eq!(core.reg_by_name("mip").map(|v| v & (1 << 3)), Some(1 << 3));
}
