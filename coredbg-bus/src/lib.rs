//! Memory transaction model and bus fabric shared by all simulated cores.
//!
//! A [`BusTransaction`] describes exactly one memory access the way the bus
//! sees it: a 64-bit address, an access width of 1/2/4/8 bytes, a write
//! strobe and a single 64-bit payload lane that carries write data on the
//! way in and read data on the way out. Cores are expected to pre-check
//! alignment; the fabric only reports routing and slave errors.

#![warn(missing_docs)]

mod fabric;
mod reservation;
mod sram;
mod transaction;

pub use fabric::BusFabric;
pub use reservation::ReservationSet;
pub use sram::SramModel;
pub use transaction::{BusAction, BusTransaction};

/// Errors a routed transaction can come back with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// No slave claims the addressed window.
    #[error("no slave mapped at address {0:#x}")]
    Unmapped(u64),
    /// The slave exists but rejected the access.
    #[error("slave error at address {0:#x}")]
    Slave(u64),
}

/// Anything that can complete a [`BusTransaction`].
///
/// The core side is agnostic to which slave handles the access; `dma_memop`
/// routes the transaction, fills `payload` on reads and commits the strobed
/// bytes on writes.
pub trait MemoryBus {
    /// Route one transaction through the fabric.
    fn dma_memop(&self, trans: &mut BusTransaction) -> Result<(), BusError>;
}
