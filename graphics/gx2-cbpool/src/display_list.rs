//! # Display Lists
//!
//! Application-owned storage recorded through the same per-core slot as
//! pool-backed buffers.
//!
//! On the main core, beginning a display list flushes the pool buffer and
//! finalizing one opens a fresh pool buffer again, so the two kinds never
//! interleave. Other cores only ever record display lists.
//!
//! When a display list fills up the application is asked for replacement
//! storage. The old list is padded first so the size reported to the
//! callback is the one the application will submit.

use gx2_hal::{GuestAddr, WORD_SIZE};

use crate::buffer::CommandBuffer;
use crate::error::{fatal, Error, OrFatal};
use crate::pool::CommandBufferPool;
use crate::queue::Host;

impl<H: Host> CommandBufferPool<H> {
    /// Start recording into `storage` on the current core
    pub fn begin_display_list(&self, storage: GuestAddr, size_words: u32) {
        let core = self.host.current_core();
        let mut slot = self.leases.slot(core).or_fatal();

        if core == self.host.main_core() && slot.as_ref().is_some_and(|b| !b.display_list) {
            self.flush_active(&mut slot, core);
        }

        if slot.is_some() {
            fatal(Error::SlotOccupied(core));
        }

        let mut buffer = self.recycler.take();
        buffer.bind(storage, 0, size_words, true);
        *slot = Some(buffer);

        log::debug!(
            "CommandBufferPool: display list {} ({} words) begun on {}",
            storage,
            size_words,
            core
        );
    }

    /// Stop recording into `storage`, returning its padded size in bytes
    ///
    /// `storage` must be the list currently recorded into, which differs
    /// from the one passed to [`begin_display_list`](Self::begin_display_list)
    /// after an overrun.
    pub fn finalize_display_list(&self, storage: GuestAddr) -> u32 {
        let core = self.host.current_core();
        let mut slot = self.leases.slot(core).or_fatal();

        let buffer = match slot.as_mut() {
            Some(buffer) => buffer,
            None => fatal(Error::NoActiveBuffer(core)),
        };
        if !buffer.display_list {
            fatal(Error::NotDisplayList);
        }
        if buffer.buffer != storage {
            fatal(Error::DisplayListMismatch {
                supplied: storage,
                active: buffer.buffer,
            });
        }

        buffer.pad(&self.host, self.config.pad_align_words).or_fatal();
        let size_bytes = buffer.size_bytes();

        if let Some(buffer) = slot.take() {
            self.recycler.give(buffer);
        }

        if core == self.host.main_core() {
            *slot = self.allocate_command_buffer(self.config.min_alloc_words);
        }

        log::debug!(
            "CommandBufferPool: display list {} finalized at {} bytes",
            storage,
            size_bytes
        );
        size_bytes
    }

    /// Submit a finished display list without touching any core's slot
    pub fn queue_display_list(&self, storage: GuestAddr, size_words: u32) {
        let mut buffer = self.recycler.take();
        buffer.bind(storage, size_words, size_words, true);
        self.host.queue_command_buffer(buffer);
    }

    /// Storage and capacity of the display list being recorded, if any
    ///
    /// `None` while the current core writes into a pool-backed buffer.
    pub fn get_user_command_buffer(&self) -> Option<(GuestAddr, u32)> {
        let core = self.host.current_core();
        let slot = self.leases.slot(core).or_fatal();

        match slot.as_ref() {
            Some(buffer) if buffer.display_list => Some((buffer.buffer, buffer.max_size)),
            Some(_) => None,
            None => fatal(Error::NoActiveBuffer(core)),
        }
    }

    /// Swap a full display list for application-provided storage
    pub(crate) fn grow_display_list(&self, buffer: &mut CommandBuffer, needed: u32) {
        buffer.pad(&self.host, self.config.pad_align_words).or_fatal();

        let replacement = self.host.display_list_overrun(
            buffer.buffer,
            buffer.size_bytes(),
            needed.saturating_mul(WORD_SIZE),
        );

        match replacement {
            Some((list, size_bytes)) if !list.is_null() && size_bytes != 0 => {
                log::debug!(
                    "CommandBufferPool: display list overrun {} -> {} ({} bytes)",
                    buffer.buffer,
                    list,
                    size_bytes
                );
                buffer.bind(list, 0, size_bytes / WORD_SIZE, true);
            }
            _ => fatal(Error::OverrunFailed),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
