//! # Command Buffer Pool
//!
//! The allocate → fill → flush → retire → free lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//!            init / finalize (main core)
//!   ┌──────┐ ───────────────────────────▶ ┌──────────────────┐
//!   │ Idle │                              │ LeasedPoolBuffer │──┐ get_buffer
//!   └──────┘ ◀─────────────────────────── └──────────────────┘◀─┘ (flush + grow)
//!      │  ▲       begin_display_list              │
//!      │  │       (flushes pool buffer)           │ flush
//!      │  │                                       ▼
//!      │  │ finalize                    ┌──────────────────┐    free_command_buffer
//!      │  └──────────────────────────── │  CommandQueue    │ ─────────────────────▶ ring + recycler
//!      ▼                                └──────────────────┘
//!   ┌───────────────────┐
//!   │ LeasedDisplayList │──┐ get_buffer (overrun callback)
//!   └───────────────────┘◀─┘
//! ```
//!
//! Only the main core ever holds a pool-backed buffer, and it holds at most
//! one at a time. Other cores take part through display lists only.

use gx2_hal::{CoreId, GuestAddr, GuestMemory};
use spin::MutexGuard;

use crate::buffer::CommandBuffer;
use crate::config::PoolConfig;
use crate::error::{fatal, Error, OrFatal, Result};
use crate::lease::{LeaseRegistry, LeaseState};
use crate::queue::Host;
use crate::recycler::{BufferRecycler, RecyclerStats};
use crate::ring::{RingPool, RingStats};

// =============================================================================
// STATISTICS
// =============================================================================

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Ring allocator counters
    pub ring: RingStats,
    /// Descriptor recycler counters
    pub recycler: RecyclerStats,
}

// =============================================================================
// COMMAND BUFFER POOL
// =============================================================================

/// Command buffer allocation service
///
/// One instance serves every core. It owns the ring pool, the descriptor
/// recycler and the per-core lease slots; `H` supplies everything outside.
#[derive(Debug)]
pub struct CommandBufferPool<H: Host> {
    pub(crate) host: H,
    pub(crate) config: PoolConfig,
    pub(crate) ring: RingPool,
    pub(crate) recycler: BufferRecycler,
    pub(crate) leases: LeaseRegistry,
}

impl<H: Host> CommandBufferPool<H> {
    /// Create an uninitialised pool
    pub fn new(host: H, config: PoolConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            ring: RingPool::new(&config),
            recycler: BufferRecycler::new(config.recycler_capacity),
            leases: LeaseRegistry::new(),
            host,
            config,
        })
    }

    /// Host collaborators
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Active configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Check if [`CommandBufferPool::init`] has run
    pub fn is_initialized(&self) -> bool {
        self.ring.is_initialized()
    }

    /// What `core` is writing into
    pub fn lease_state(&self, core: CoreId) -> LeaseState {
        self.leases.state(core)
    }

    /// Statistics snapshot
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            ring: self.ring.stats(),
            recycler: self.recycler.stats(),
        }
    }

    /// Attach the ring region and open the main core's first buffer
    ///
    /// Must run on the main core.
    pub fn init(&self, base: GuestAddr, size_words: u32) {
        let core = self.host.current_core();
        if core != self.host.main_core() {
            fatal(Error::NotMainCore(core));
        }

        self.ring.init(base, size_words).or_fatal();

        let mut slot = self.leases.slot(core).or_fatal();
        if slot.is_some() {
            fatal(Error::SlotOccupied(core));
        }
        *slot = self.allocate_command_buffer(self.config.min_alloc_words);

        log::debug!("CommandBufferPool: initialized on {}", core);
    }

    /// Flush the main core's buffer, wait for the GPU to retire everything
    /// and detach the ring region
    ///
    /// Blocks for as long as the consumer takes; a stalled consumer hangs it.
    pub fn shutdown(&self) {
        let core = self.host.current_core();
        if core != self.host.main_core() {
            fatal(Error::NotMainCore(core));
        }

        {
            let mut slot = self.leases.slot(core).or_fatal();
            if slot.is_some() {
                self.flush_active(&mut slot, core);
            }
        }

        loop {
            let retired = self.host.retired_timestamp();
            if self.ring.outstanding_words() == 0 {
                break;
            }
            self.host.wait_until(retired + 1);
        }

        self.ring.deinit().or_fatal();
        log::debug!("CommandBufferPool: shut down");
    }

    /// Get the current core's buffer with room for `words` more words
    ///
    /// Flushes and replaces a full pool buffer, or asks the application for
    /// more storage when a display list is full. Drop the returned writer
    /// before calling back into the pool from the same core; doing otherwise
    /// is fatal.
    pub fn get_buffer(&self, words: u32) -> ActiveBuffer<'_, H> {
        let core = self.host.current_core();
        let mut slot = self.leases.slot(core).or_fatal();

        self.ensure_capacity(&mut slot, core, words);

        ActiveBuffer {
            slot,
            memory: &self.host,
            core,
        }
    }

    /// Submit the main core's buffer and open a fresh minimum-size one
    pub fn flush_command_buffer(&self) {
        let core = self.host.current_core();
        let mut slot = self.leases.slot(core).or_fatal();

        self.flush_active(&mut slot, core);
        *slot = self.allocate_command_buffer(self.config.min_alloc_words);
    }

    /// Dispose of a buffer the command queue has finished with
    ///
    /// Pool-backed buffers must come back in submission order.
    pub fn free_command_buffer(&self, buffer: CommandBuffer) {
        if buffer.cur_size != buffer.max_size {
            fatal(Error::SizeMismatch {
                cur_size: buffer.cur_size,
                max_size: buffer.max_size,
            });
        }

        // Application display lists never came from the ring
        if !buffer.display_list {
            self.ring.release(buffer.buffer, buffer.max_size).or_fatal();
        }

        self.recycler.give(buffer);
    }

    /// Lease a pool-backed buffer of at least `words` words
    ///
    /// Returns `None` off the main core. Blocks on the retire timeline while
    /// the ring is full.
    pub(crate) fn allocate_command_buffer(&self, words: u32) -> Option<CommandBuffer> {
        let core = self.host.current_core();
        if core != self.host.main_core() {
            log::warn!("Tried to allocate command buffer on non-main graphics core {}", core);
            return None;
        }

        self.leases.lease_pool().or_fatal();

        let grant = loop {
            // Sampled before the attempt so a retirement racing with it still wakes us
            let retired = self.host.retired_timestamp();

            match self.ring.acquire(words) {
                Ok(grant) => break grant,
                Err(Error::Insufficient) => {
                    log::debug!(
                        "CommandBufferPool: ring full, waiting for timestamp {}",
                        retired + 1
                    );
                    self.host.wait_until(retired + 1);
                }
                Err(error) => fatal(error),
            }
        };

        let mut buffer = self.recycler.take();
        buffer.bind(grant.addr, 0, grant.words, false);
        Some(buffer)
    }

    /// Make room for `words` more words in the active buffer of `core`
    fn ensure_capacity(&self, slot: &mut Option<CommandBuffer>, core: CoreId, words: u32) {
        let fits = match slot.as_ref() {
            Some(buffer) => buffer.fits(words),
            None => fatal(Error::NoActiveBuffer(core)),
        };

        if !fits {
            self.flush_and_grow(slot, core, words);
        }
    }

    /// Replace a full active buffer with one that holds `needed` words
    fn flush_and_grow(&self, slot: &mut Option<CommandBuffer>, core: CoreId, needed: u32) {
        let display_list = match slot.as_mut() {
            Some(buffer) if buffer.display_list => {
                self.grow_display_list(buffer, needed);
                true
            }
            Some(_) => false,
            None => fatal(Error::NoActiveBuffer(core)),
        };

        if !display_list {
            self.flush_active(slot, core);
            *slot = match self.allocate_command_buffer(needed) {
                Some(buffer) => Some(buffer),
                None => fatal(Error::NotMainCore(core)),
            };
        }

        if let Some(buffer) = slot.as_ref() {
            if !buffer.fits(needed) {
                fatal(Error::CommandTooLarge {
                    requested: needed,
                    available: buffer.remaining(),
                });
            }
        }
    }

    /// Hand the active pool buffer to the command queue and drop the lease
    pub(crate) fn flush_active(&self, slot: &mut Option<CommandBuffer>, core: CoreId) {
        match slot.as_ref() {
            Some(buffer) if buffer.display_list => fatal(Error::UnexpectedDisplayList),
            Some(_) => {}
            None => fatal(Error::NoActiveBuffer(core)),
        }
        let Some(mut buffer) = slot.take() else {
            fatal(Error::NoActiveBuffer(core));
        };

        self.leases.unlease_pool().or_fatal();

        // Unused words go straight back to the ring for the next buffer
        self.ring
            .shrink(buffer.buffer, buffer.cur_size, buffer.max_size)
            .or_fatal();
        buffer.max_size = buffer.cur_size;

        if buffer.cur_size == 0 {
            self.recycler.give(buffer);
        } else {
            self.host.queue_command_buffer(buffer);
        }
    }
}

// =============================================================================
// ACTIVE BUFFER
// =============================================================================

/// Writer for the current core's active command buffer
///
/// Holds the core's slot until dropped. Calling back into the pool from the
/// same core meanwhile is fatal.
#[derive(Debug)]
#[must_use = "the writer holds the core's slot until dropped"]
pub struct ActiveBuffer<'a, H: Host> {
    slot: MutexGuard<'a, Option<CommandBuffer>>,
    memory: &'a H,
    core: CoreId,
}

impl<H: Host> ActiveBuffer<'_, H> {
    /// Underlying descriptor
    pub fn descriptor(&self) -> &CommandBuffer {
        match self.slot.as_ref() {
            Some(buffer) => buffer,
            None => fatal(Error::NoActiveBuffer(self.core)),
        }
    }

    fn descriptor_mut(&mut self) -> &mut CommandBuffer {
        match self.slot.as_mut() {
            Some(buffer) => buffer,
            None => fatal(Error::NoActiveBuffer(self.core)),
        }
    }

    /// Start of the storage
    pub fn storage(&self) -> GuestAddr {
        self.descriptor().buffer
    }

    /// Words written
    pub fn cur_size(&self) -> u32 {
        self.descriptor().cur_size
    }

    /// Words available in total
    pub fn max_size(&self) -> u32 {
        self.descriptor().max_size
    }

    /// Words still free
    pub fn remaining(&self) -> u32 {
        self.descriptor().remaining()
    }

    /// Check if this is an application display list
    pub fn is_display_list(&self) -> bool {
        self.descriptor().display_list
    }

    /// Append one word
    pub fn write(&mut self, word: u32) {
        let memory: &dyn GuestMemory = self.memory;
        self.descriptor_mut().push(memory, word).or_fatal();
    }

    /// Append a run of words
    pub fn write_all(&mut self, words: &[u32]) {
        let memory: &dyn GuestMemory = self.memory;
        let buffer = self.descriptor_mut();

        if !buffer.fits(words.len() as u32) {
            fatal(Error::BufferOverflow);
        }
        for &word in words {
            buffer.push(memory, word).or_fatal();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
