//! # Host Types
//!
//! Strongly typed guest addresses and core identifiers.

use core::fmt;
use core::ops::{Add, Sub};

use static_assertions::const_assert;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Number of CPU cores on the emulated console
pub const CORE_COUNT: usize = 3;

/// Size of a command word in bytes
pub const WORD_SIZE: u32 = 4;

const_assert!(CORE_COUNT > 0);
const_assert!(WORD_SIZE.is_power_of_two());

// =============================================================================
// GUEST ADDRESS
// =============================================================================

/// Address in the emulated 32-bit guest address space
///
/// This is NOT a host pointer. Reads and writes go through
/// [`GuestMemory`](crate::traits::GuestMemory).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct GuestAddr(u32);

impl GuestAddr {
    /// Create a new guest address
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Null guest address
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Get the raw value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check alignment
    #[inline]
    pub const fn is_aligned(self, alignment: u32) -> bool {
        self.0 & (alignment - 1) == 0
    }

    /// Offset by a number of command words
    #[inline]
    pub const fn add_words(self, words: u32) -> Self {
        Self(self.0.wrapping_add(words.wrapping_mul(WORD_SIZE)))
    }

    /// Distance to `self` from an earlier address, in words
    #[inline]
    pub const fn words_since(self, earlier: GuestAddr) -> u32 {
        self.0.wrapping_sub(earlier.0) / WORD_SIZE
    }
}

impl Add<u32> for GuestAddr {
    type Output = Self;

    fn add(self, bytes: u32) -> Self::Output {
        Self(self.0.wrapping_add(bytes))
    }
}

impl Sub<GuestAddr> for GuestAddr {
    type Output = u32;

    fn sub(self, rhs: GuestAddr) -> Self::Output {
        self.0.wrapping_sub(rhs.0)
    }
}

impl fmt::Debug for GuestAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuestAddr(0x{:08x})", self.0)
    }
}

impl fmt::Display for GuestAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

// =============================================================================
// CORE ID
// =============================================================================

/// Identifier of one CPU core
///
/// Only ids below [`CORE_COUNT`] can be constructed, so per-core tables can
/// be indexed without bounds surprises.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CoreId(u8);

impl CoreId {
    /// Core 0
    pub const CORE0: Self = Self(0);
    /// Core 1, the default graphics main core
    pub const CORE1: Self = Self(1);
    /// Core 2
    pub const CORE2: Self = Self(2);

    /// Validate a raw core index
    pub const fn new(index: u32) -> Option<Self> {
        if (index as usize) < CORE_COUNT {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    /// Index into per-core tables
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterate over every core
    pub fn all() -> impl Iterator<Item = CoreId> {
        (0..CORE_COUNT as u8).map(CoreId)
    }
}

impl fmt::Debug for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Core{}", self.0)
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core {}", self.0)
    }
}

// =============================================================================
// TESTS
// =============================================================================
