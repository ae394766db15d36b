//! # Command Buffer Descriptor
//!
//! Metadata for one command buffer: where its words live, how many are
//! written and how many may be written.
//!
//! A descriptor is either pool-backed (storage owned by the ring pool while
//! leased) or a display list (storage owned by the application).

use core::fmt;

use gx2_hal::{GuestAddr, GuestMemory, WORD_SIZE};

use crate::config::PAD_WORD;
use crate::error::{Error, Result};

// =============================================================================
// DESCRIPTOR ID
// =============================================================================

/// Recycler identity of a descriptor
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorId(u32);

impl DescriptorId {
    /// Descriptor created after the recycler arena ran out
    pub const UNPOOLED: Self = Self(u32::MAX);

    pub(crate) const fn pooled(slot: u32) -> Self {
        Self(slot)
    }

    /// Arena slot, if pooled
    pub const fn slot(self) -> Option<u32> {
        if self.0 == u32::MAX {
            None
        } else {
            Some(self.0)
        }
    }
}

impl fmt::Debug for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot() {
            Some(slot) => write!(f, "Descriptor#{}", slot),
            None => write!(f, "Descriptor#unpooled"),
        }
    }
}

// =============================================================================
// COMMAND BUFFER
// =============================================================================

/// Command buffer descriptor
///
/// Sizes are in 32-bit words.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandBuffer {
    id: DescriptorId,
    /// Storage is owned by the application rather than the ring pool
    pub display_list: bool,
    /// Retire timestamp assigned by the command queue, zero until submitted
    pub submit_time: u64,
    /// Words written
    pub cur_size: u32,
    /// Words available
    pub max_size: u32,
    /// Start of the storage
    pub buffer: GuestAddr,
}

impl CommandBuffer {
    pub(crate) const fn new(id: DescriptorId) -> Self {
        Self {
            id,
            display_list: false,
            submit_time: 0,
            cur_size: 0,
            max_size: 0,
            buffer: GuestAddr::null(),
        }
    }

    /// Rebind this descriptor to new storage
    pub(crate) fn bind(&mut self, buffer: GuestAddr, cur_size: u32, max_size: u32, display_list: bool) {
        self.display_list = display_list;
        self.submit_time = 0;
        self.cur_size = cur_size;
        self.max_size = max_size;
        self.buffer = buffer;
    }

    /// Recycler identity
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    /// Words still free
    pub fn remaining(&self) -> u32 {
        self.max_size - self.cur_size
    }

    /// Check if `words` more words fit
    pub fn fits(&self, words: u32) -> bool {
        u64::from(self.cur_size) + u64::from(words) <= u64::from(self.max_size)
    }

    /// Written size in bytes
    pub fn size_bytes(&self) -> u32 {
        self.cur_size * WORD_SIZE
    }

    /// Address of the next word to write
    pub fn cursor(&self) -> GuestAddr {
        self.buffer.add_words(self.cur_size)
    }

    /// Append one word
    pub fn push(&mut self, memory: &dyn GuestMemory, word: u32) -> Result<()> {
        if self.cur_size >= self.max_size {
            return Err(Error::BufferOverflow);
        }
        memory.write_u32(self.cursor(), word);
        self.cur_size += 1;
        Ok(())
    }

    /// Pad the written size up to `align_words` with [`PAD_WORD`]
    ///
    /// Already aligned buffers are left untouched.
    pub fn pad(&mut self, memory: &dyn GuestMemory, align_words: u32) -> Result<()> {
        let aligned = align_up(self.cur_size, align_words);

        if aligned > self.max_size {
            return Err(Error::PadOverflow {
                aligned,
                capacity: self.max_size,
            });
        }

        while self.cur_size < aligned {
            memory.write_u32(self.cursor(), PAD_WORD);
            self.cur_size += 1;
        }
        Ok(())
    }
}

#[inline]
const fn align_up(value: u32, align: u32) -> u32 {
    (value + align - 1) & !(align - 1)
}

// =============================================================================
// TESTS
// =============================================================================
