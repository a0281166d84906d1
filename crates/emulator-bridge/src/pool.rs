//! Clone Slot Pool
//!
//! A bounded pool of reusable clone identities. Slot `i` maps to the clone
//! name `Nox_<i>` that the player executable recognizes. Released slots are
//! put back at the front of the free list, so the most recently released
//! identity is reused first.

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{EmulatorError, Result};

/// Clone-name prefix understood by the player command line
pub const CLONE_NAME_PREFIX: &str = "Nox_";

/// An identity slot checked out of the pool.
///
/// Carries the pool-wide creation ordinal assigned at acquisition time: the
/// number of checked-out slots the moment this one left the free list. The
/// device binder uses it as the expected connection count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    index: u32,
    ordinal: usize,
}

impl Slot {
    /// Slot index within the pool
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Creation ordinal (1-based), unique among concurrently live slots
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Clone name the player executable recognizes
    pub fn clone_name(&self) -> String {
        format!("{}{}", CLONE_NAME_PREFIX, self.index)
    }
}

/// Bounded pool of clone identity slots.
///
/// A slot index is either on the free list or owned by exactly one live
/// instance; the free list never holds duplicates. Shared across all
/// concurrently constructing instances behind an `Arc`.
pub struct SlotPool {
    capacity: u32,
    free: Mutex<Vec<u32>>,
}

impl SlotPool {
    /// Create a pool with slots `0..capacity`, free in ascending order
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            free: Mutex::new((0..capacity).collect()),
        }
    }

    /// Fixed pool capacity
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of slots currently free
    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }

    /// Check out the next free slot.
    ///
    /// The creation ordinal is computed under the same lock, so two
    /// concurrent acquisitions can never observe the same ordinal.
    pub fn acquire(&self) -> Result<Slot> {
        let mut free = self.free.lock();
        if free.is_empty() {
            return Err(EmulatorError::PoolExhausted(self.capacity));
        }
        let index = free.remove(0);
        let ordinal = self.capacity as usize - free.len();
        debug!("Acquired slot {} (ordinal {})", index, ordinal);
        Ok(Slot { index, ordinal })
    }

    /// Return a slot to the front of the free list.
    ///
    /// Idempotent: releasing a slot that is already free is a no-op, so the
    /// free list never holds duplicates.
    pub fn release(&self, slot: &Slot) {
        let mut free = self.free.lock();
        if !free.contains(&slot.index) {
            free.insert(0, slot.index);
            debug!("Released slot {}", slot.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_names() {
        let pool = SlotPool::new(4);
        let slot = pool.acquire().unwrap();
        assert_eq!(slot.clone_name(), "Nox_0");
        assert_eq!(slot.ordinal(), 1);
    }

    #[test]
    fn test_exhaustion() {
        let pool = SlotPool::new(2);
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();

        match pool.acquire() {
            Err(EmulatorError::PoolExhausted(2)) => {}
            other => panic!("expected PoolExhausted, got {:?}", other.map(|s| s.index())),
        }
    }

    #[test]
    fn test_lifo_reuse_of_released_slot() {
        let pool = SlotPool::new(2);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);

        // Slot 0 comes back to the front and is reused before slot 1 would be.
        pool.release(&a);
        let c = pool.acquire().unwrap();
        assert_eq!(c.index(), 0);
        assert_eq!(c.ordinal(), 2);
    }

    #[test]
    fn test_release_is_idempotent() {
        let pool = SlotPool::new(2);
        let a = pool.acquire().unwrap();

        pool.release(&a);
        pool.release(&a);
        assert_eq!(pool.free_count(), 2);

        // No duplicate indices after the double release.
        let x = pool.acquire().unwrap();
        let y = pool.acquire().unwrap();
        assert_ne!(x.index(), y.index());
        assert!(pool.acquire().is_err());
    }

    #[test]
    fn test_ordinals_track_checked_out_count() {
        let pool = SlotPool::new(4);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(a.ordinal(), 1);
        assert_eq!(b.ordinal(), 2);

        pool.release(&a);
        let c = pool.acquire().unwrap();
        assert_eq!(c.index(), a.index());
        assert_eq!(c.ordinal(), 2);
    }
}
