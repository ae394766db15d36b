//! # Host Traits
//!
//! Collaborators consumed by the command buffer pool.
//!
//! ## Trait Overview
//!
//! ```text
//! CoreTopology        which core am I on, which core drives graphics
//! RetireTimeline      how far has the GPU got, block until it gets further
//! GuestMemory         word reads/writes into emulated memory
//! DisplayListOverrun  ask the application for more display list storage
//! ```

use crate::types::{CoreId, GuestAddr};

// =============================================================================
// CORE TOPOLOGY
// =============================================================================

/// Core identity queries
pub trait CoreTopology: Send + Sync {
    /// Core the caller is currently running on
    fn current_core(&self) -> CoreId;

    /// Core designated to drive the graphics command stream
    fn main_core(&self) -> CoreId;

    /// Convenience check for the main core
    fn on_main_core(&self) -> bool {
        self.current_core() == self.main_core()
    }
}

// =============================================================================
// RETIRE TIMELINE
// =============================================================================

/// GPU retirement counter
///
/// The value increases monotonically as the GPU finishes submitted command
/// buffers. It is the pool's only backpressure signal.
pub trait RetireTimeline: Send + Sync {
    /// Most recently retired timestamp
    fn retired_timestamp(&self) -> u64;

    /// Block until the retired timestamp is at least `timestamp`
    ///
    /// There is no timeout: a consumer that never retires work stalls the
    /// caller forever.
    fn wait_until(&self, timestamp: u64);
}

// =============================================================================
// GUEST MEMORY
// =============================================================================

/// Word access into emulated guest memory
///
/// Values are exchanged as the guest sees them; implementations own the byte
/// order of the backing store (big-endian on the console).
pub trait GuestMemory: Send + Sync {
    /// Read one word
    fn read_u32(&self, addr: GuestAddr) -> u32;

    /// Write one word
    fn write_u32(&self, addr: GuestAddr, value: u32);
}

// =============================================================================
// DISPLAY LIST OVERRUN
// =============================================================================

/// Application callback invoked when a display list runs out of space
pub trait DisplayListOverrun: Send + Sync {
    /// Request replacement storage
    ///
    /// Receives the current list, its padded size and the size needed, all
    /// in bytes. Returns the new list and its size in bytes, or `None` if the
    /// application cannot provide one.
    fn display_list_overrun(
        &self,
        list: GuestAddr,
        size_bytes: u32,
        needed_bytes: u32,
    ) -> Option<(GuestAddr, u32)>;
}
