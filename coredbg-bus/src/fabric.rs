use std::sync::Arc;

use tracing::trace;

use crate::{BusAction, BusError, BusTransaction, MemoryBus, ReservationSet, SramModel};

/// Address-window router over a set of RAM slaves, plus the shared LR/SC
/// reservation set.
///
/// The fabric is the one object every core of a cluster holds an `Arc` to;
/// per-slave locking lives inside the slaves, the reservation set carries
/// its own lock, so concurrent cores only ever contend at those two points.
#[derive(Debug, Default)]
pub struct BusFabric {
    slaves: Vec<Arc<SramModel>>,
    reservations: Arc<ReservationSet>,
}

impl BusFabric {
    /// Empty fabric with no mapped slaves.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a slave. Windows must not overlap; routing picks the first
    /// covering window.
    pub fn attach(&mut self, slave: Arc<SramModel>) {
        self.slaves.push(slave);
    }

    /// Shared reservation set for the LR/SC primitive. Cores hold clones
    /// of this `Arc` so their reservations die with any routed store.
    pub fn reservations(&self) -> &Arc<ReservationSet> {
        &self.reservations
    }

    /// Slave covering `addr`, if any.
    pub fn slave_at(&self, addr: u64, xsize: u8) -> Option<&Arc<SramModel>> {
        self.slaves.iter().find(|s| s.covers(addr, xsize))
    }
}

impl MemoryBus for BusFabric {
    fn dma_memop(&self, trans: &mut BusTransaction) -> Result<(), BusError> {
        let Some(slave) = self.slave_at(trans.addr, trans.xsize) else {
            trans.error = true;
            return Err(BusError::Unmapped(trans.addr));
        };
        slave.dma_memop(trans)?;
        if trans.action == BusAction::Write {
            self.reservations.clear_on_store(trans.addr, trans.xsize);
        }
        trace!(
            addr = trans.addr,
            xsize = trans.xsize,
            write = trans.action == BusAction::Write,
            payload = trans.payload,
            src = trans.source_idx,
            "memop"
        );
        Ok(())
    }
}
