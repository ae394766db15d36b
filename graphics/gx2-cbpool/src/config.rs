//! # Pool Configuration

use static_assertions::const_assert;

use crate::error::{Error, Result};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Smallest grant handed out by the ring pool, in words
pub const MIN_ALLOC_WORDS: u32 = 0x100;

/// Largest grant handed out by a single acquire, in words
pub const MAX_ALLOC_WORDS: u32 = 0x20000;

/// Display lists and finished buffers are padded to 32 bytes
pub const PAD_ALIGN_WORDS: u32 = 32 / 4;

/// Filler word written into padding, as the guest reads it
pub const PAD_WORD: u32 = 0xBEEF2929;

/// Default number of recyclable descriptor slots
pub const RECYCLER_CAPACITY: u32 = 4096;

const_assert!(MIN_ALLOC_WORDS <= MAX_ALLOC_WORDS);
const_assert!(PAD_ALIGN_WORDS.is_power_of_two());
const_assert!(MIN_ALLOC_WORDS % PAD_ALIGN_WORDS == 0);

// =============================================================================
// POOL CONFIGURATION
// =============================================================================

/// Command buffer pool configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Minimum words per ring grant
    pub min_alloc_words: u32,
    /// Maximum words per ring grant
    pub max_alloc_words: u32,
    /// Padding alignment in words, must be a power of two
    pub pad_align_words: u32,
    /// Descriptor arena slots before the recycler stops pooling
    pub recycler_capacity: u32,
}

impl PoolConfig {
    /// Console defaults
    pub const fn new() -> Self {
        Self {
            min_alloc_words: MIN_ALLOC_WORDS,
            max_alloc_words: MAX_ALLOC_WORDS,
            pad_align_words: PAD_ALIGN_WORDS,
            recycler_capacity: RECYCLER_CAPACITY,
        }
    }

    /// Override the descriptor arena size
    pub const fn with_recycler_capacity(mut self, slots: u32) -> Self {
        self.recycler_capacity = slots;
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.min_alloc_words == 0 {
            return Err(Error::InvalidConfig("minimum allocation is zero"));
        }
        if self.min_alloc_words > self.max_alloc_words {
            return Err(Error::InvalidConfig("minimum allocation exceeds maximum"));
        }
        if !self.pad_align_words.is_power_of_two() {
            return Err(Error::InvalidConfig("padding alignment is not a power of two"));
        }
        if self.min_alloc_words % self.pad_align_words != 0 {
            return Err(Error::InvalidConfig("minimum allocation is not pad aligned"));
        }
        // Slot ids are stored off by one in the recycler head
        if self.recycler_capacity == u32::MAX {
            return Err(Error::InvalidConfig("recycler capacity too large"));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PoolConfig::default();
        assert_eq!(config.min_alloc_words, 256);
        assert_eq!(config.max_alloc_words, 131072);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_limits() {
        let config = PoolConfig {
            min_alloc_words: 0x1000,
            max_alloc_words: 0x100,
            ..PoolConfig::new()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_odd_alignment() {
        let config = PoolConfig {
            pad_align_words: 6,
            ..PoolConfig::new()
        };
        assert!(config.validate().is_err());
    }
}
