//! # Host Collaborators
//!
//! `std`-backed implementations of the host traits.
//!
//! - [`HostCores`]: each OS thread pretends to be one console core
//! - [`HostTimeline`]: retirement counter with a condition variable wait
//! - [`HostMemory`]: flat word array mapped at a guest base address

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};
use std::boxed::Box;
use std::sync::{Condvar, Mutex, PoisonError};
use std::vec::Vec;

use crate::traits::{CoreTopology, GuestMemory, RetireTimeline};
use crate::types::{CoreId, GuestAddr, WORD_SIZE};

// =============================================================================
// CORES
// =============================================================================

std::thread_local! {
    static CURRENT_CORE: Cell<Option<CoreId>> = const { Cell::new(None) };
}

/// Thread-backed core topology
///
/// A thread runs on the main core until it calls [`HostCores::enter`].
#[derive(Debug, Clone, Copy)]
pub struct HostCores {
    main: CoreId,
}

impl HostCores {
    /// Create a topology with the given main core
    pub const fn new(main: CoreId) -> Self {
        Self { main }
    }

    /// Bind the calling thread to `core`
    pub fn enter(core: CoreId) {
        CURRENT_CORE.with(|c| c.set(Some(core)));
    }
}

impl Default for HostCores {
    fn default() -> Self {
        Self::new(CoreId::CORE1)
    }
}

impl CoreTopology for HostCores {
    fn current_core(&self) -> CoreId {
        CURRENT_CORE.with(|c| c.get()).unwrap_or(self.main)
    }

    fn main_core(&self) -> CoreId {
        self.main
    }
}

// =============================================================================
// TIMELINE
// =============================================================================

/// Retirement counter backed by a mutex and condition variable
#[derive(Debug, Default)]
pub struct HostTimeline {
    retired: Mutex<u64>,
    advanced: Condvar,
}

impl HostTimeline {
    /// Create a timeline at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Retire one more timestamp and wake waiters, returning the new value
    pub fn advance(&self) -> u64 {
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        *retired += 1;
        log::trace!("HostTimeline: retired {}", *retired);
        self.advanced.notify_all();
        *retired
    }
}

impl RetireTimeline for HostTimeline {
    fn retired_timestamp(&self) -> u64 {
        *self.retired.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_until(&self, timestamp: u64) {
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        while *retired < timestamp {
            retired = self
                .advanced
                .wait(retired)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

// =============================================================================
// MEMORY
// =============================================================================

/// Guest memory window backed by host atomics
///
/// Words hold guest values; [`HostMemory::read_bytes`] exposes them in the
/// console's big-endian byte order.
#[derive(Debug)]
pub struct HostMemory {
    base: GuestAddr,
    words: Box<[AtomicU32]>,
}

impl HostMemory {
    /// Map `size_words` zeroed words at `base`
    pub fn new(base: GuestAddr, size_words: u32) -> Self {
        let words: Vec<AtomicU32> = (0..size_words).map(|_| AtomicU32::new(0)).collect();
        Self {
            base,
            words: words.into_boxed_slice(),
        }
    }

    /// Base of the window
    pub fn base(&self) -> GuestAddr {
        self.base
    }

    /// Window size in words
    pub fn size_words(&self) -> u32 {
        self.words.len() as u32
    }

    /// Read a word as guest bytes
    pub fn read_bytes(&self, addr: GuestAddr) -> [u8; 4] {
        self.read_u32(addr).to_be_bytes()
    }

    fn slot(&self, addr: GuestAddr) -> &AtomicU32 {
        assert!(
            addr >= self.base && addr.is_aligned(WORD_SIZE),
            "HostMemory: bad access at {}",
            addr
        );
        let index = addr.words_since(self.base) as usize;
        match self.words.get(index) {
            Some(word) => word,
            None => panic!("HostMemory: access at {} outside window", addr),
        }
    }
}

impl GuestMemory for HostMemory {
    fn read_u32(&self, addr: GuestAddr) -> u32 {
        self.slot(addr).load(Ordering::Acquire)
    }

    fn write_u32(&self, addr: GuestAddr, value: u32) {
        self.slot(addr).store(value, Ordering::Release);
    }
}

// =============================================================================
// TESTS
// =============================================================================
