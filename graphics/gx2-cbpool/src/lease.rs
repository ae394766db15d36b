//! # Per-Core Lease Registry
//!
//! One active command buffer slot per core, plus the flag recording that the
//! ring pool's single lease is out.
//!
//! Each slot is only touched from its own core. The per-slot spin lock is
//! therefore uncontended; it exists so the registry can be shared between
//! threads without unsafe code.

use core::sync::atomic::{AtomicBool, Ordering};

use gx2_hal::{CoreId, CORE_COUNT};
use spin::{Mutex, MutexGuard};

use crate::buffer::CommandBuffer;
use crate::error::{Error, Result};

// =============================================================================
// LEASE STATE
// =============================================================================

/// What a core currently writes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    /// No active buffer
    Idle,
    /// Pool-backed command buffer
    LeasedPoolBuffer,
    /// Application display list
    LeasedDisplayList,
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Active buffer slots indexed by core
#[derive(Debug)]
pub struct LeaseRegistry {
    slots: [Mutex<Option<CommandBuffer>>; CORE_COUNT],
    pool_leased: AtomicBool,
}

impl LeaseRegistry {
    /// Create a registry with every core idle
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Mutex::new(None)),
            pool_leased: AtomicBool::new(false),
        }
    }

    /// Borrow the slot of `core` from `core` itself
    ///
    /// The owning core is the only writer, so a slot that is already locked
    /// means the core still holds a writer from an earlier borrow.
    pub fn slot(&self, core: CoreId) -> Result<MutexGuard<'_, Option<CommandBuffer>>> {
        self.slots[core.index()]
            .try_lock()
            .ok_or(Error::SlotBorrowed(core))
    }

    /// State of `core`
    ///
    /// Waits for a writer on `core` to finish.
    pub fn state(&self, core: CoreId) -> LeaseState {
        match self.slots[core.index()].lock().as_ref() {
            None => LeaseState::Idle,
            Some(buffer) if buffer.display_list => LeaseState::LeasedDisplayList,
            Some(_) => LeaseState::LeasedPoolBuffer,
        }
    }

    /// Check if the pool lease is out
    pub fn is_pool_leased(&self) -> bool {
        self.pool_leased.load(Ordering::Acquire)
    }

    /// Take the pool lease
    pub fn lease_pool(&self) -> Result<()> {
        if self.pool_leased.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyLeased);
        }
        Ok(())
    }

    /// Give the pool lease back
    pub fn unlease_pool(&self) -> Result<()> {
        if !self.pool_leased.swap(false, Ordering::AcqRel) {
            return Err(Error::NotLeased);
        }
        Ok(())
    }
}

impl Default for LeaseRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use gx2_hal::GuestAddr;

    use super::*;
    use crate::buffer::DescriptorId;

    #[test]
    fn test_pool_lease_is_exclusive() {
        let registry = LeaseRegistry::new();

        registry.lease_pool().unwrap();
        assert_eq!(registry.lease_pool(), Err(Error::AlreadyLeased));

        registry.unlease_pool().unwrap();
        assert_eq!(registry.unlease_pool(), Err(Error::NotLeased));
    }

    #[test]
    fn test_slot_state() {
        let registry = LeaseRegistry::new();
        assert_eq!(registry.state(CoreId::CORE0), LeaseState::Idle);

        let mut buffer = CommandBuffer::new(DescriptorId::pooled(0));
        buffer.bind(GuestAddr::new(0x1000), 0, 64, true);
        *registry.slot(CoreId::CORE0).unwrap() = Some(buffer);

        assert_eq!(registry.state(CoreId::CORE0), LeaseState::LeasedDisplayList);
        assert_eq!(registry.state(CoreId::CORE2), LeaseState::Idle);
    }

    #[test]
    fn test_slot_borrowed_twice() {
        let registry = LeaseRegistry::new();

        let held = registry.slot(CoreId::CORE1).unwrap();
        assert!(matches!(
            registry.slot(CoreId::CORE1),
            Err(Error::SlotBorrowed(CoreId::CORE1))
        ));
        assert!(registry.slot(CoreId::CORE0).is_ok());

        drop(held);
        assert!(registry.slot(CoreId::CORE1).is_ok());
    }
}
