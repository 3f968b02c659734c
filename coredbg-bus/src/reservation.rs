use std::sync::Mutex;

/// Per-address load-reservation bookkeeping for LR/SC.
///
/// A reservation is `(addr, size, hart)`, where `size` is the byte width
/// of the LR that created it. Any committed store overlapping the
/// reserved `[addr, addr + size)` bytes — from any hart — kills the
/// reservation; a store-conditional succeeds only when its own hart still
/// holds the reservation at exactly that address, and consumes it either
/// way.
#[derive(Debug, Default)]
pub struct ReservationSet {
    slots: Mutex<Vec<(u64, u8, usize)>>,
}

impl ReservationSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reservation of `size` bytes for `hart` at `addr`,
    /// replacing any earlier one held by the same hart.
    pub fn load_reserved(&self, addr: u64, size: u8, hart: usize) {
        let mut slots = self.slots.lock().expect("reservation lock");
        slots.retain(|&(_, _, h)| h != hart);
        slots.push((addr, size, hart));
    }

    /// Check-and-consume for a store-conditional. Returns `true` when the
    /// reservation was still live.
    pub fn store_conditional(&self, addr: u64, hart: usize) -> bool {
        let mut slots = self.slots.lock().expect("reservation lock");
        let hit = slots.iter().any(|&(a, _, h)| a == addr && h == hart);
        slots.retain(|&(_, _, h)| h != hart);
        if hit {
            // The successful SC's own store also invalidates everyone else.
            slots.retain(|&(a, _, _)| a != addr);
        }
        hit
    }

    /// Invalidate every reservation whose reserved bytes overlap a store
    /// of `len` bytes at `addr`.
    pub fn clear_on_store(&self, addr: u64, len: u8) {
        let end = addr + u64::from(len);
        let mut slots = self.slots.lock().expect("reservation lock");
        slots.retain(|&(a, size, _)| addr >= a + u64::from(size) || a >= end);
    }
}
