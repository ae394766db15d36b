//! # Buffer Object Recycler
//!
//! Lock-free free list of command buffer descriptors.
//!
//! Descriptors are identified by a slot in a fixed arena. The free list is a
//! Treiber stack threaded through per-slot `next` links; its head packs a
//! version tag next to the slot so a pop racing with pop+push of the same
//! slot fails its compare-and-swap instead of corrupting the list.
//!
//! ```text
//!  head (tag:32 | slot+1:32)
//!   │
//!   ▼
//!  [slot 7] ──next──▶ [slot 2] ──next──▶ [slot 5] ──next──▶ END
//! ```
//!
//! Once the arena is exhausted `take` keeps handing out descriptors, but they
//! are unpooled and simply dropped by `give`.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::buffer::{CommandBuffer, DescriptorId};

const EMPTY: u32 = 0;

#[inline]
const fn pack(tag: u32, link: u32) -> u64 {
    ((tag as u64) << 32) | link as u64
}

#[inline]
const fn unpack(head: u64) -> (u32, u32) {
    ((head >> 32) as u32, head as u32)
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Recycler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecyclerStats {
    /// Descriptors constructed from fresh arena slots
    pub created: u64,
    /// Descriptors handed out again after a `give`
    pub reused: u64,
    /// Descriptors handed out after the arena ran out
    pub unpooled: u64,
}

// =============================================================================
// RECYCLER
// =============================================================================

/// Lock-free descriptor recycler
#[derive(Debug)]
pub struct BufferRecycler {
    /// `slot + 1` of the next free slot, `EMPTY` at the end of the list
    links: Box<[AtomicU32]>,
    head: AtomicU64,
    /// First never-used slot
    fresh: AtomicU32,
    created: AtomicU64,
    reused: AtomicU64,
    unpooled: AtomicU64,
}

impl BufferRecycler {
    /// Create a recycler with `capacity` arena slots
    pub fn new(capacity: u32) -> Self {
        let links: Vec<AtomicU32> = (0..capacity).map(|_| AtomicU32::new(EMPTY)).collect();
        Self {
            links: links.into_boxed_slice(),
            head: AtomicU64::new(pack(0, EMPTY)),
            fresh: AtomicU32::new(0),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            unpooled: AtomicU64::new(0),
        }
    }

    /// Number of arena slots
    pub fn capacity(&self) -> u32 {
        self.links.len() as u32
    }

    /// Statistics snapshot
    pub fn stats(&self) -> RecyclerStats {
        RecyclerStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            unpooled: self.unpooled.load(Ordering::Relaxed),
        }
    }

    /// Get a descriptor, preferring a recycled one
    pub fn take(&self) -> CommandBuffer {
        if let Some(slot) = self.pop() {
            self.reused.fetch_add(1, Ordering::Relaxed);
            return CommandBuffer::new(DescriptorId::pooled(slot));
        }

        let slot = self
            .fresh
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next < self.capacity()).then_some(next + 1)
            });

        match slot {
            Ok(slot) => {
                self.created.fetch_add(1, Ordering::Relaxed);
                CommandBuffer::new(DescriptorId::pooled(slot))
            }
            Err(_) => {
                self.unpooled.fetch_add(1, Ordering::Relaxed);
                CommandBuffer::new(DescriptorId::UNPOOLED)
            }
        }
    }

    /// Return a descriptor for reuse
    pub fn give(&self, buffer: CommandBuffer) {
        match buffer.id().slot() {
            Some(slot) if slot < self.capacity() => self.push(slot),
            _ => {}
        }
    }

    fn push(&self, slot: u32) {
        let link = &self.links[slot as usize];
        let mut head = self.head.load(Ordering::Acquire);

        loop {
            let (tag, top) = unpack(head);
            link.store(top, Ordering::Relaxed);

            match self.head.compare_exchange_weak(
                head,
                pack(tag.wrapping_add(1), slot + 1),
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(current) => {
                    head = current;
                    core::hint::spin_loop();
                }
            }
        }
    }

    fn pop(&self) -> Option<u32> {
        let mut head = self.head.load(Ordering::Acquire);

        loop {
            let (tag, top) = unpack(head);
            if top == EMPTY {
                return None;
            }

            let slot = top - 1;
            let next = self.links[slot as usize].load(Ordering::Relaxed);

            match self.head.compare_exchange_weak(
                head,
                pack(tag.wrapping_add(1), next),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(slot),
                Err(current) => {
                    head = current;
                    core::hint::spin_loop();
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
