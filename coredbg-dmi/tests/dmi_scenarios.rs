//! Debug transport scenarios: halt/resume over DMI, abstract register and
//! memory access, auto-exec, program buffer execution and the pin-level
//! JTAG path.

use std::sync::Arc;

use coredbg_bus::{BusFabric, SramModel};
use coredbg_core::{CoreConfig, CoreMode, DebugPort, RiscvCore, SharedCore, SimContext};
use coredbg_dmi::{CmdErr, DebugModule, DmiController, IDCODE};
use coredbg_riscv::{AluOp, Instruction, RegId};

const REG_DATA0: u8 = 0x04;
const REG_DATA1: u8 = 0x05;
const REG_DATA2: u8 = 0x06;
const REG_DMCONTROL: u8 = 0x10;
const REG_DMSTATUS: u8 = 0x11;
const REG_ABSTRACTCS: u8 = 0x16;
const REG_COMMAND: u8 = 0x17;
const REG_ABSTRACTAUTO: u8 = 0x18;
const REG_PROGBUF0: u8 = 0x20;
const REG_HALTSUM0: u8 = 0x40;

const DMCONTROL_HALTREQ: u32 = 1 << 31;
const DMCONTROL_RESUMEREQ: u32 = 1 << 30;
const DMCONTROL_DMACTIVE: u32 = 1;

const CMD_TRANSFER: u32 = 1 << 17;
const CMD_WRITE: u32 = 1 << 16;
const CMD_POSTEXEC: u32 = 1 << 18;
const CMD_POSTINCREMENT: u32 = 1 << 19;
const AARSIZE64: u32 = 3 << 20;
const AAMSIZE32: u32 = 2 << 20;
const CMD_MEM: u32 = 2 << 24;

/// GPR x<N> in the abstract regno space.
fn regno_gpr(n: u16) -> u32 {
    u32::from(0x1000 + n)
}

fn setup(harts: usize) -> (DebugModule, Vec<SharedCore<BusFabric>>, Arc<SramModel>) {
    let sram = Arc::new(SramModel::new(0, 0x8000));
    let mut fabric = BusFabric::new();
    fabric.attach(sram.clone());
    let bus = Arc::new(fabric);
    let mut ctx = SimContext::new(bus.clone());
    ctx.reservations = bus.reservations().clone();

    let mut cores = Vec::new();
    for hartid in 0..harts {
        let cfg = CoreConfig { hartid, ..CoreConfig::default() };
        cores.push(SharedCore::new(RiscvCore::new(cfg, ctx.clone())));
    }
    let ports: Vec<Arc<dyn DebugPort + Send + Sync>> = cores
        .iter()
        .map(|c| Arc::new(c.clone()) as Arc<dyn DebugPort + Send + Sync>)
        .collect();
    (DebugModule::new(ports), cores, sram)
}

#[test]
fn haltreq_is_observed_in_dmstatus() {
    let (mut dm, cores, _sram) = setup(1);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_DMACTIVE, true);

    let status = dm.dmi_request(REG_DMSTATUS, 0, false).data;
    assert_eq!(status >> 8 & 3, 0, "not halted yet");

    dm.dmi_request(REG_DMCONTROL, DMCONTROL_HALTREQ | DMCONTROL_DMACTIVE, true);
    let status = dm.dmi_request(REG_DMSTATUS, 0, false).data;
    assert_eq!(status >> 8 & 3, 3, "allhalted | anyhalted");
    assert!(cores[0].is_halted());

    let haltsum = dm.dmi_request(REG_HALTSUM0, 0, false).data;
    assert_eq!(haltsum, 1);
}

#[test]
fn abstract_register_read_lands_in_data01() {
    let (mut dm, cores, _sram) = setup(1);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_HALTREQ | DMCONTROL_DMACTIVE, true);
    cores[0].0.lock().unwrap().set_reg(5, 0xdead_beef_cafe_f00d);

    // Register access, transfer, 64-bit, regno = x5.
    dm.dmi_request(REG_COMMAND, AARSIZE64 | CMD_TRANSFER | regno_gpr(5), true);

    let cs = dm.dmi_request(REG_ABSTRACTCS, 0, false).data;
    assert_eq!(cs >> 8 & 0x7, 0, "cmderr none");
    assert_eq!(cs >> 12 & 1, 0, "not busy");
    assert_eq!(dm.dmi_request(REG_DATA0, 0, false).data, 0xcafe_f00d);
    assert_eq!(dm.dmi_request(REG_DATA1, 0, false).data, 0xdead_beef);
}

#[test]
fn abstract_register_write_with_postincrement() {
    let (mut dm, cores, _sram) = setup(1);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_HALTREQ | DMCONTROL_DMACTIVE, true);

    dm.dmi_request(REG_DATA0, 0x1234, true);
    dm.dmi_request(REG_DATA1, 0, true);
    dm.dmi_request(
        REG_COMMAND,
        AARSIZE64 | CMD_TRANSFER | CMD_WRITE | CMD_POSTINCREMENT | regno_gpr(6),
        true,
    );
    assert_eq!(cores[0].read_reg(0x1006).unwrap(), 0x1234);

    // The regno advanced: an auto-exec-free second command write targets x7.
    dm.dmi_request(REG_DATA0, 0x5678, true);
    dm.dmi_request(
        REG_COMMAND,
        AARSIZE64 | CMD_TRANSFER | CMD_WRITE | regno_gpr(7),
        true,
    );
    assert_eq!(cores[0].read_reg(0x1007).unwrap(), 0x5678);
}

#[test]
fn command_while_busy_sets_cmderr_busy() {
    let (mut dm, _cores, _sram) = setup(1);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_DMACTIVE, true);

    // Quick access against a running hart that never halts on its own
    // leaves the engine in WaitHalted... except our functional harts halt
    // synchronously. Emulate busy instead through a second hart that does
    // not exist: hartsel out of range keeps is_halted() false forever.
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_DMACTIVE | 1 << 16, true);
    dm.dmi_request(REG_COMMAND, 1 << 24, true); // quick access
    assert!(dm.busy(), "engine waits for a hart that cannot halt");

    dm.dmi_request(REG_COMMAND, CMD_TRANSFER | regno_gpr(1), true);
    assert_eq!(dm.cmderr(), CmdErr::Busy);

    // The busy error is sticky until written with ones.
    dm.dmi_request(REG_ABSTRACTCS, 0x700, true);
    assert_eq!(dm.cmderr(), CmdErr::None);
}

#[test]
fn autoexec_refires_command_on_data0_access() {
    let (mut dm, cores, _sram) = setup(1);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_HALTREQ | DMCONTROL_DMACTIVE, true);
    cores[0].0.lock().unwrap().set_reg(5, 7);

    // Load a read-x5 command and arm autoexec on data0.
    dm.dmi_request(REG_COMMAND, AARSIZE64 | CMD_TRANSFER | regno_gpr(5), true);
    dm.dmi_request(REG_ABSTRACTAUTO, 1, true);

    // Each data0 read re-executes the same command.
    assert_eq!(dm.dmi_request(REG_DATA0, 0, false).data, 7);
    cores[0].0.lock().unwrap().set_reg(5, 8);
    // The re-fire triggered by the read above already sampled again; the
    // next access observes the new value.
    let _ = dm.dmi_request(REG_DATA0, 0, false).data;
    assert_eq!(dm.dmi_request(REG_DATA0, 0, false).data, 8);
}

#[test]
fn abstract_memory_access_with_postincrement() {
    let (mut dm, _cores, sram) = setup(1);
    sram.load(0x2000, &0xaabb_ccddu32.to_le_bytes());
    sram.load(0x2004, &0x1122_3344u32.to_le_bytes());
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_HALTREQ | DMCONTROL_DMACTIVE, true);

    dm.dmi_request(REG_DATA2, 0x2000, true);
    dm.dmi_request(0x07, 0, true); // data3: high address half
    dm.dmi_request(REG_COMMAND, CMD_MEM | AAMSIZE32 | CMD_POSTINCREMENT, true);
    assert_eq!(dm.dmi_request(REG_DATA0, 0, false).data, 0xaabb_ccdd);
    assert_eq!(
        dm.dmi_request(REG_DATA2, 0, false).data, 0x2004,
        "address advanced by the access size"
    );

    dm.dmi_request(REG_COMMAND, CMD_MEM | AAMSIZE32 | CMD_POSTINCREMENT, true);
    assert_eq!(dm.dmi_request(REG_DATA0, 0, false).data, 0x1122_3344);
}

#[test]
fn memory_access_bus_error_keeps_address() {
    let (mut dm, _cores, _sram) = setup(1);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_HALTREQ | DMCONTROL_DMACTIVE, true);

    // 0xf000_0000 is unmapped.
    dm.dmi_request(REG_DATA2, 0xf000_0000, true);
    dm.dmi_request(REG_COMMAND, CMD_MEM | AAMSIZE32 | CMD_POSTINCREMENT, true);
    assert_eq!(dm.cmderr(), CmdErr::BusError);
    assert_eq!(
        dm.dmi_request(REG_DATA2, 0, false).data, 0xf000_0000,
        "postincrement rolls back on error"
    );
}

#[test]
fn progbuf_executes_on_the_halted_hart() {
    let (mut dm, cores, _sram) = setup(1);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_HALTREQ | DMCONTROL_DMACTIVE, true);

    // progbuf: addi x8, x8, 5 ; ebreak
    let addi = Instruction::OpImm {
        op: AluOp::Add,
        word: false,
        rd: RegId::new(8),
        rs1: RegId::new(8),
        imm: 5,
    }
    .encode();
    dm.dmi_request(REG_PROGBUF0, addi, true);
    dm.dmi_request(REG_PROGBUF0 + 1, Instruction::Ebreak.encode(), true);

    // Command: no transfer, postexec only.
    dm.dmi_request(REG_COMMAND, CMD_POSTEXEC, true);
    assert_eq!(dm.cmderr(), CmdErr::None);
    assert_eq!(cores[0].read_reg(0x1008).unwrap(), 5);
}

#[test]
fn quick_access_halts_runs_progbuf_and_resumes() {
    let (mut dm, cores, sram) = setup(1);
    sram.load(0x200, &0x0000_0013u32.to_le_bytes());
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_DMACTIVE, true);
    assert!(!cores[0].is_halted());

    let addi = Instruction::OpImm {
        op: AluOp::Add,
        word: false,
        rd: RegId::new(9),
        rs1: RegId::new(9),
        imm: 1,
    }
    .encode();
    dm.dmi_request(REG_PROGBUF0, addi, true);
    dm.dmi_request(REG_PROGBUF0 + 1, Instruction::Ebreak.encode(), true);

    dm.dmi_request(REG_COMMAND, 1 << 24, true); // quick access
    assert_eq!(dm.cmderr(), CmdErr::None);
    assert_eq!(cores[0].read_reg(0x1009).unwrap(), 1, "progbuf ran transiently");
    assert!(!cores[0].is_halted(), "hart resumed after the quick access");
}

#[test]
fn quick_access_on_halted_hart_is_wrongstate() {
    let (mut dm, _cores, _sram) = setup(1);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_HALTREQ | DMCONTROL_DMACTIVE, true);
    dm.dmi_request(REG_COMMAND, 1 << 24, true);
    assert_eq!(dm.cmderr(), CmdErr::WrongState);
}

#[test]
fn resume_clears_halted_and_sets_resumeack() {
    let (mut dm, cores, sram) = setup(1);
    // Park the hart on a live instruction so resume has something to run.
    sram.load(0x200, &0x0000_0013u32.to_le_bytes());
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_HALTREQ | DMCONTROL_DMACTIVE, true);
    assert!(cores[0].is_halted());

    dm.dmi_request(REG_DMCONTROL, DMCONTROL_RESUMEREQ | DMCONTROL_DMACTIVE, true);
    assert!(!cores[0].is_halted());
    let status = dm.dmi_request(REG_DMSTATUS, 0, false).data;
    assert_eq!(status >> 16 & 3, 3, "allresumeack | anyresumeack");
    assert_eq!(cores[0].0.lock().unwrap().mode(), CoreMode::Running);
}

#[test]
fn resumereq_of_running_hart_is_wrongstate() {
    let (mut dm, _cores, _sram) = setup(1);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_DMACTIVE, true);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_RESUMEREQ | DMCONTROL_DMACTIVE, true);
    assert_eq!(dm.cmderr(), CmdErr::WrongState);
}

#[test]
fn hartsel_multiplexes_between_harts() {
    let (mut dm, cores, _sram) = setup(2);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_DMACTIVE, true);

    // Halt hart 1 only.
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_HALTREQ | DMCONTROL_DMACTIVE | 1 << 16, true);
    assert!(!cores[0].is_halted());
    assert!(cores[1].is_halted());

    // dmstatus reflects the selected hart.
    let status = dm.dmi_request(REG_DMSTATUS, 0, false).data;
    assert_eq!(status >> 8 & 3, 3, "hart 1 selected and halted");
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_DMACTIVE, true); // hartsel = 0
    let status = dm.dmi_request(REG_DMSTATUS, 0, false).data;
    assert_eq!(status >> 8 & 3, 0, "hart 0 still running");
    assert_eq!(status >> 10 & 3, 3, "allrunning | anyrunning");

    // haltsum0 shows the per-hart bitmap regardless of hartsel.
    assert_eq!(dm.dmi_request(REG_HALTSUM0, 0, false).data, 0b10);

    // Register access goes to the selected hart.
    cores[0].0.lock().unwrap().set_reg(7, 0x111);
    cores[1].0.lock().unwrap().set_reg(7, 0x222);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_HALTREQ | DMCONTROL_DMACTIVE, true); // halt hart 0
    dm.dmi_request(REG_COMMAND, AARSIZE64 | CMD_TRANSFER | regno_gpr(7), true);
    assert_eq!(dm.dmi_request(REG_DATA0, 0, false).data, 0x111);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_DMACTIVE | 1 << 16, true);
    dm.dmi_request(REG_COMMAND, AARSIZE64 | CMD_TRANSFER | regno_gpr(7), true);
    assert_eq!(dm.dmi_request(REG_DATA0, 0, false).data, 0x222);
}

#[test]
fn dmactive_low_resets_debug_state() {
    let (mut dm, _cores, _sram) = setup(1);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_DMACTIVE, true);
    dm.dmi_request(REG_DATA0, 0x55, true);
    dm.dmi_request(REG_DMCONTROL, 0, true);
    assert_eq!(dm.dmi_request(REG_DATA0, 0, false).data, 0);
}

#[test]
fn dmi_halts_a_hart_running_on_its_own_thread() {
    use coredbg_core::{Cluster, ClusterCommand, ClusterConfig};
    use std::time::{Duration, Instant};

    let sram = Arc::new(SramModel::new(0, 0x1000));
    // addi a0, a0, 1 ; j -4
    let addi = Instruction::OpImm {
        op: AluOp::Add,
        word: false,
        rd: RegId::new(10),
        rs1: RegId::new(10),
        imm: 1,
    }
    .encode();
    let jump = Instruction::Jal { rd: RegId::ZERO, imm: -4 }.encode();
    sram.load(0x200, &addi.to_le_bytes());
    sram.load(0x204, &jump.to_le_bytes());
    let mut fabric = BusFabric::new();
    fabric.attach(sram);
    let cluster =
        Cluster::new(&ClusterConfig { harts: 1, reset_vector: 0x200 }, Arc::new(fabric))
            .unwrap();

    let mut dm = DebugModule::new(vec![Arc::new(cluster.core(0).clone())
        as Arc<dyn DebugPort + Send + Sync>]);
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_DMACTIVE, true);

    cluster.send(0, ClusterCommand::Resume);
    let deadline = Instant::now() + Duration::from_secs(5);
    while cluster.core(0).0.lock().unwrap().steps() < 10 {
        assert!(Instant::now() < deadline, "hart made no progress");
        std::thread::yield_now();
    }

    // Halt from the debug side while the runner thread is stepping.
    dm.dmi_request(REG_DMCONTROL, DMCONTROL_HALTREQ | DMCONTROL_DMACTIVE, true);
    let deadline = Instant::now() + Duration::from_secs(5);
    while dm.dmi_request(REG_DMSTATUS, 0, false).data >> 8 & 3 != 3 {
        assert!(Instant::now() < deadline, "hart did not halt");
        std::thread::yield_now();
    }

    // The counter register is coherent once halted.
    let a0 = dm.dmi_request(REG_COMMAND, AARSIZE64 | CMD_TRANSFER | regno_gpr(10), true);
    let _ = a0;
    // Two instructions per increment, so at least half the steps landed.
    let low = dm.dmi_request(REG_DATA0, 0, false).data;
    assert!(low >= 5, "a0 counted increments before the halt, got {low}");
    cluster.shutdown();
}

#[test]
fn jtag_idcode_scans_out() {
    let (dm, _cores, _sram) = setup(1);
    let mut probe = DmiController::new(dm);
    probe.trst();
    probe.tck(false, false); // -> Run-Test/Idle

    let ir_out = probe.scan_ir(0x01);
    let _ = ir_out;
    let id = probe.scan_dr(0, 32) as u32;
    assert_eq!(id, IDCODE);
}

#[test]
fn jtag_dbus_halts_hart_and_reads_dmstatus() {
    let (dm, cores, _sram) = setup(1);
    let mut probe = DmiController::new(dm);
    probe.trst();
    probe.tck(false, false);

    probe.scan_ir(0x11); // DBUS
    // Write dmcontrol: haltreq | dmactive.
    probe.dbus(REG_DMCONTROL, DMCONTROL_HALTREQ | DMCONTROL_DMACTIVE, 2);
    assert!(cores[0].is_halted());

    // Read dmstatus: issue the read, then fetch the response.
    probe.dbus(REG_DMSTATUS, 0, 1);
    let resp = probe.dbus(0, 0, 0);
    let data = (resp >> 2) as u32;
    assert_eq!(data >> 8 & 3, 3, "allhalted over the pin path");
    assert_eq!(resp & 3, 0, "dmistat ok");
}
