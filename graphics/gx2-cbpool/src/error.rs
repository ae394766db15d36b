//! # Command Buffer Pool Errors
//!
//! Error handling follows two rules:
//! - component operations return [`Result`] and never panic
//! - the orchestrator treats every error except [`Error::Insufficient`] as a
//!   broken invariant and routes it through [`fatal`]

use core::fmt;

use gx2_hal::{CoreId, GuestAddr};

// =============================================================================
// RESULT TYPE
// =============================================================================

/// Command buffer pool result type
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// Command buffer pool error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Retryable
    // =========================================================================
    /// Ring pool has no contiguous run large enough right now
    Insufficient,

    // =========================================================================
    // Configuration
    // =========================================================================
    /// Pool configuration is inconsistent
    InvalidConfig(&'static str),
    /// Ring pool used before initialisation
    NotInitialized,
    /// Ring pool initialised twice
    AlreadyInitialized,
    /// Ring pool still has outstanding allocations
    Busy {
        /// Words not yet released
        outstanding: u32,
    },
    /// Operation restricted to the main core
    NotMainCore(CoreId),
    /// Request larger than the whole ring pool
    RequestTooLarge {
        /// Words requested (after the minimum is applied)
        requested: u32,
        /// Pool capacity in words
        capacity: u32,
    },

    // =========================================================================
    // Ordering
    // =========================================================================
    /// Release did not target the oldest outstanding allocation
    OutOfOrderRelease {
        /// Region being released
        region: GuestAddr,
        /// Oldest outstanding region
        expected: GuestAddr,
    },
    /// Shrink did not target the most recent allocation
    OutOfOrderShrink {
        /// Region being shrunk
        region: GuestAddr,
    },
    /// Shrink asked to grow an allocation
    ShrinkLargerThanGrant {
        /// Words used
        used: u32,
        /// Words originally granted
        granted: u32,
    },

    // =========================================================================
    // Lifecycle
    // =========================================================================
    /// Main core already holds a pool-backed lease
    AlreadyLeased,
    /// Flush without an outstanding lease
    NotLeased,
    /// Core has no active command buffer
    NoActiveBuffer(CoreId),
    /// Core already has an active command buffer
    SlotOccupied(CoreId),
    /// Core re-entered the pool while still holding its buffer writer
    SlotBorrowed(CoreId),
    /// Operation needs a pool-backed buffer, found a display list
    UnexpectedDisplayList,
    /// Operation needs a display list, found a pool-backed buffer
    NotDisplayList,
    /// Display list storage does not match the active buffer
    DisplayListMismatch {
        /// Storage supplied by the caller
        supplied: GuestAddr,
        /// Storage of the active buffer
        active: GuestAddr,
    },
    /// Application could not supply more display list storage
    OverrunFailed,
    /// Padding would run past the buffer end
    PadOverflow {
        /// Size after alignment, in words
        aligned: u32,
        /// Buffer capacity, in words
        capacity: u32,
    },
    /// Write past the end of the active buffer
    BufferOverflow,
    /// Reallocated buffer still cannot hold the request
    CommandTooLarge {
        /// Words requested
        requested: u32,
        /// Words available
        available: u32,
    },
    /// Completed buffer freed with unaccounted words
    SizeMismatch {
        /// Words written
        cur_size: u32,
        /// Words reserved
        max_size: u32,
    },
}

impl Error {
    /// True for conditions resolved by waiting on the retire timeline
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Insufficient)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insufficient => write!(f, "command buffer pool temporarily exhausted"),

            Self::InvalidConfig(reason) => write!(f, "invalid pool configuration: {}", reason),
            Self::NotInitialized => write!(f, "command buffer pool not initialized"),
            Self::AlreadyInitialized => write!(f, "command buffer pool already initialized"),
            Self::Busy { outstanding } => {
                write!(f, "command buffer pool has {} words outstanding", outstanding)
            }
            Self::NotMainCore(core) => write!(f, "operation requires the main core, called on {}", core),
            Self::RequestTooLarge { requested, capacity } => write!(
                f,
                "command buffer allocation of {} words greater than entire pool size of {} words",
                requested, capacity
            ),

            Self::OutOfOrderRelease { region, expected } => write!(
                f,
                "pool release out of order: released {}, oldest is {}",
                region, expected
            ),
            Self::OutOfOrderShrink { region } => {
                write!(f, "pool shrink of {} is not the most recent allocation", region)
            }
            Self::ShrinkLargerThanGrant { used, granted } => {
                write!(f, "used {} words of a {} word grant", used, granted)
            }

            Self::AlreadyLeased => write!(f, "command buffer pool lease already held"),
            Self::NotLeased => write!(f, "command buffer pool lease not held"),
            Self::NoActiveBuffer(core) => write!(f, "no active command buffer on {}", core),
            Self::SlotOccupied(core) => write!(f, "active command buffer already set on {}", core),
            Self::SlotBorrowed(core) => {
                write!(f, "command buffer slot on {} already borrowed by a writer", core)
            }
            Self::UnexpectedDisplayList => write!(f, "active command buffer is a display list"),
            Self::NotDisplayList => write!(f, "active command buffer is not a display list"),
            Self::DisplayListMismatch { supplied, active } => write!(
                f,
                "display list {} does not match active display list {}",
                supplied, active
            ),
            Self::OverrunFailed => write!(f, "unable to handle display list overrun"),
            Self::PadOverflow { aligned, capacity } => write!(
                f,
                "padding to {} words overflows {} word buffer",
                aligned, capacity
            ),
            Self::BufferOverflow => write!(f, "write past end of command buffer"),
            Self::CommandTooLarge { requested, available } => write!(
                f,
                "command of {} words does not fit a {} word buffer",
                requested, available
            ),
            Self::SizeMismatch { cur_size, max_size } => write!(
                f,
                "completed buffer has {} of {} words accounted",
                cur_size, max_size
            ),
        }
    }
}

// =============================================================================
// FATAL PATH
// =============================================================================

/// Abort on a broken pool invariant
///
/// Logs the error and panics. Release profiles build with `panic = "abort"`,
/// so this terminates the process.
#[cold]
#[track_caller]
pub fn fatal(error: Error) -> ! {
    log::error!("gx2 command buffer pool: {}", error);
    panic!("{}", error)
}

/// Unwrap a pool result, aborting on error
pub(crate) trait OrFatal<T> {
    fn or_fatal(self) -> T;
}

impl<T> OrFatal<T> for Result<T> {
    #[inline]
    #[track_caller]
    fn or_fatal(self) -> T {
        match self {
            Ok(value) => value,
            Err(error) => fatal(error),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
