//! CPU core drivers and execution semantics for the coredbg simulators.
//!
//! Two functional cores live here — [`RiscvCore`] (RV64IMAFC + machine
//! mode) and [`ArmCore`] (ARMv7 with Thumb-2) — together with the shared
//! plumbing both need: register banks with trace capture, the breakpoint
//! and symbol services, the debug port the DMI subsystem drives, the
//! command handlers of the outer shell and the multi-core cluster runner.

#![warn(missing_docs)]

pub mod arm;
pub mod cmds;
pub mod riscv;

mod bank;
mod breakpoints;
mod cluster;
mod config;
mod debug;
mod disas_svc;
mod state;
mod symbols;
mod trace;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock};

pub use arm::ArmCore;
pub use bank::{CsrBank, RegBank, RegWrite};
pub use breakpoints::{Breakpoint, BreakpointKind, BreakpointSet};
pub use cluster::{Cluster, ClusterCommand};
pub use config::{ClusterConfig, ConfigError, CoreConfig, CoreIsa};
pub use debug::{DebugPort, DebugPortError, REGNO_FPR_BASE, REGNO_GPR_BASE};
pub use disas_svc::{disassemble, disassemble_thumb, DisasLine};
pub use riscv::{RiscvCore, SharedCore};
pub use state::{CoreMode, ExecuteState, TrapCause};
pub use symbols::{Symbol, SymbolTable};
pub use trace::{MemTrace, StackTraceBuffer, TraceBuffer, TraceRecord};

use coredbg_bus::{MemoryBus, ReservationSet};

/// Shared services threaded through every constructor.
///
/// This object replaces any global registry: whoever builds a core decides
/// exactly which bus, reservation set and debug services it sees.
pub struct SimContext<B> {
    /// Bus fabric all memory transactions route through.
    pub bus: Arc<B>,
    /// LR/SC reservation set shared across harts.
    pub reservations: Arc<ReservationSet>,
    /// Breakpoint list (user commands write, every fetch reads).
    pub breakpoints: Arc<Mutex<BreakpointSet>>,
    /// Symbol table (user commands write, trace and disas read).
    pub symbols: Arc<RwLock<SymbolTable>>,
    /// One IPI doorbell per hart, indexed by hartid.
    pub ipi_doorbells: Vec<Arc<AtomicBool>>,
}

impl<B> Clone for SimContext<B> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            reservations: self.reservations.clone(),
            breakpoints: self.breakpoints.clone(),
            symbols: self.symbols.clone(),
            ipi_doorbells: self.ipi_doorbells.clone(),
        }
    }
}

impl<B: MemoryBus> SimContext<B> {
    /// Fresh context around a bus.
    pub fn new(bus: Arc<B>) -> Self {
        Self {
            bus,
            reservations: Arc::new(ReservationSet::new()),
            breakpoints: Arc::new(Mutex::new(BreakpointSet::new())),
            symbols: Arc::new(RwLock::new(SymbolTable::new())),
            ipi_doorbells: Vec::new(),
        }
    }
}

impl<B> std::fmt::Debug for SimContext<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimContext")
            .field("harts", &self.ipi_doorbells.len())
            .finish()
    }
}
