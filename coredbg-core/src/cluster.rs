//! Multi-core scheduling: one OS thread per hart, controlled over
//! channels. No state is shared between harts beyond the bus fabric,
//! the reservation set and the IPI doorbells, each behind its own lock.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use coredbg_bus::BusFabric;
use tracing::debug;

use crate::config::{ClusterConfig, ConfigError, CoreConfig};
use crate::riscv::{RiscvCore, SharedCore};
use crate::state::ExecuteState;
use crate::SimContext;

/// Control messages for a core's runner thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterCommand {
    /// Park the hart at the next instruction boundary.
    Halt,
    /// Resume free-running execution.
    Resume,
    /// Resume for exactly one instruction.
    Step,
    /// Reset the hart.
    Reset,
    /// Terminate the runner thread.
    Shutdown,
}

struct Runner {
    handle: JoinHandle<()>,
    tx: Sender<ClusterCommand>,
}

/// A set of harts running on their own threads over one bus fabric.
pub struct Cluster {
    cores: Vec<SharedCore<BusFabric>>,
    runners: Vec<Runner>,
    ctx: SimContext<BusFabric>,
}

impl Cluster {
    /// Build `cfg.harts` cores over the shared fabric and spawn a runner
    /// thread for each. All harts start halted, waiting for `Resume`.
    pub fn new(cfg: &ClusterConfig, bus: Arc<BusFabric>) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let mut ctx = SimContext::new(bus.clone());
        // The cluster's reservation set is the fabric's own, so stores
        // routed by any master invalidate reservations.
        ctx.reservations = bus.reservations().clone();

        let mut cores = Vec::with_capacity(cfg.harts);
        for hartid in 0..cfg.harts {
            let core_cfg = CoreConfig {
                hartid,
                reset_vector: cfg.reset_vector,
                ..CoreConfig::default()
            };
            let core = RiscvCore::new(core_cfg, ctx.clone());
            ctx.ipi_doorbells.push(core.ipi_handle());
            cores.push(SharedCore::new(core));
        }
        // Re-share the completed doorbell list with every core.
        for core in &cores {
            core.0.lock().expect("core lock").set_context(ctx.clone());
        }

        let runners = cores
            .iter()
            .map(|core| spawn_runner(core.clone()))
            .collect();

        Ok(Self { cores, runners, ctx })
    }

    /// Shared services of this cluster.
    pub fn context(&self) -> &SimContext<BusFabric> {
        &self.ctx
    }

    /// Handle for hart `idx`.
    pub fn core(&self, idx: usize) -> &SharedCore<BusFabric> {
        &self.cores[idx]
    }

    /// Number of harts.
    pub fn harts(&self) -> usize {
        self.cores.len()
    }

    /// Send a command to one hart's runner.
    pub fn send(&self, hart: usize, cmd: ClusterCommand) {
        let _ = self.runners[hart].tx.send(cmd);
    }

    /// Send a command to every hart.
    pub fn broadcast(&self, cmd: ClusterCommand) {
        for runner in &self.runners {
            let _ = runner.tx.send(cmd);
        }
    }

    /// Stop all runner threads and return the cores.
    pub fn shutdown(mut self) -> Vec<SharedCore<BusFabric>> {
        self.broadcast(ClusterCommand::Shutdown);
        for runner in self.runners.drain(..) {
            let _ = runner.handle.join();
        }
        std::mem::take(&mut self.cores)
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.broadcast(ClusterCommand::Shutdown);
        for runner in self.runners.drain(..) {
            let _ = runner.handle.join();
        }
    }
}

fn spawn_runner(core: SharedCore<BusFabric>) -> Runner {
    let (tx, rx) = mpsc::channel::<ClusterCommand>();
    let handle = std::thread::spawn(move || {
        // Start parked: the controller decides when execution begins.
        {
            let mut c = core.0.lock().expect("core lock");
            c.post_halt_request();
            c.service_requests();
        }
        loop {
            let mut running = false;
            {
                let mut c = core.0.lock().expect("core lock");
                match c.step() {
                    ExecuteState::Proceed | ExecuteState::Trap(_) => running = true,
                    ExecuteState::Halted | ExecuteState::WaitIrq => {}
                }
            }
            let cmd = if running {
                match rx.try_recv() {
                    Ok(cmd) => Some(cmd),
                    Err(mpsc::TryRecvError::Empty) => None,
                    Err(mpsc::TryRecvError::Disconnected) => break,
                }
            } else {
                // Parked: block until the controller speaks, waking
                // periodically so debug-port requests are serviced.
                match rx.recv_timeout(Duration::from_millis(1)) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            };
            if let Some(cmd) = cmd {
                let mut c = core.0.lock().expect("core lock");
                match cmd {
                    ClusterCommand::Halt => c.post_halt_request(),
                    ClusterCommand::Resume => c.post_resume_request(),
                    ClusterCommand::Step => c.post_step_request(),
                    ClusterCommand::Reset => c.post_reset_request(),
                    ClusterCommand::Shutdown => break,
                }
                c.service_requests();
                debug!(hartid = c.hartid(), ?cmd, "cluster command");
            }
        }
    });
    Runner { handle, tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coredbg_bus::SramModel;
    use coredbg_riscv::{Instruction, RegId};

    fn fabric_with_loop() -> Arc<BusFabric> {
        let mut fabric = BusFabric::new();
        let sram = Arc::new(SramModel::new(0x0, 0x1000));
        // addi a0, a0, 1 ; j -4
        let addi = Instruction::OpImm {
            op: coredbg_riscv::AluOp::Add,
            word: false,
            rd: RegId::new(10),
            rs1: RegId::new(10),
            imm: 1,
        }
        .encode();
        let jump = Instruction::Jal { rd: RegId::ZERO, imm: -4 }.encode();
        sram.load(0x200, &addi.to_le_bytes());
        sram.load(0x204, &jump.to_le_bytes());
        fabric.attach(sram);
        Arc::new(fabric)
    }

    #[test]
    fn cluster_halts_and_resumes_over_channels() {
        let cluster =
            Cluster::new(&ClusterConfig { harts: 2, reset_vector: 0x200 }, fabric_with_loop())
                .unwrap();

        cluster.send(0, ClusterCommand::Resume);
        // Wait for the hart to make progress.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if cluster.core(0).0.lock().unwrap().steps() > 10 {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "hart 0 made no progress");
            std::thread::yield_now();
        }

        cluster.send(0, ClusterCommand::Halt);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !cluster.core(0).0.lock().unwrap().mode().eq(&crate::CoreMode::Halted) {
            assert!(std::time::Instant::now() < deadline, "hart 0 did not halt");
            std::thread::yield_now();
        }

        // Hart 1 was never resumed and sits at its reset state.
        assert_eq!(cluster.core(1).0.lock().unwrap().steps(), 0);
        cluster.shutdown();
    }
}
