//! # Ring Pool
//!
//! Circular word region that backs every pool-owned command buffer.
//!
//! ## Layout
//!
//! ```text
//!  base                  tail               head                 end
//!   │                     │░░░░░░░░░░░░░░░░░░░│                    │
//!   └─────────────────────┴───────────────────┴────────────────────┘
//!                          outstanding grants   next grant
//!
//!  after a wraparound:
//!
//!  base        head                 tail                  skipped  end
//!   │░░░░░░░░░░░│                    │░░░░░░░░░░░░░░░░░░░░░│xxxxxxx│
//!   └───────────┴────────────────────┴─────────────────────┴───────┘
//! ```
//!
//! Grants come off `head`, releases come off `tail`. Releases must arrive in
//! the order grants were issued; the skipped fragment at the end is repaid
//! when `tail` reaches it.

use gx2_hal::GuestAddr;
use spin::Mutex;

use crate::config::PoolConfig;
use crate::error::{Error, Result};

// =============================================================================
// GRANT
// =============================================================================

/// Region handed out by [`RingPool::acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    /// Start of the region
    pub addr: GuestAddr,
    /// Words granted
    pub words: u32,
}

/// Cursor snapshot, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCursors {
    /// Next allocation
    pub head: GuestAddr,
    /// Oldest outstanding allocation, `None` when the pool is empty
    pub tail: Option<GuestAddr>,
    /// Words wasted at the end by the last wraparound
    pub skipped_words: u32,
    /// Words granted and not yet released
    pub outstanding_words: u32,
}

/// Ring statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    /// Successful acquires
    pub grants: u64,
    /// Acquires that had to wrap to the base
    pub wraps: u64,
    /// Acquires refused for lack of space
    pub stalls: u64,
    /// Released regions
    pub releases: u64,
    /// High water mark of outstanding words
    pub peak_outstanding_words: u32,
}

// =============================================================================
// RING STATE
// =============================================================================

#[derive(Debug)]
struct RingState {
    base: GuestAddr,
    /// Capacity in words, zero until initialised
    size: u32,
    /// Offsets in words from `base`
    head: u32,
    tail: Option<u32>,
    skipped: u32,
    outstanding: u32,
    stats: RingStats,
}

impl RingState {
    const fn new() -> Self {
        Self {
            base: GuestAddr::null(),
            size: 0,
            head: 0,
            tail: None,
            skipped: 0,
            outstanding: 0,
            stats: RingStats {
                grants: 0,
                wraps: 0,
                stalls: 0,
                releases: 0,
                peak_outstanding_words: 0,
            },
        }
    }

    fn addr(&self, offset: u32) -> GuestAddr {
        self.base.add_words(offset)
    }

    fn offset(&self, addr: GuestAddr) -> u32 {
        addr.words_since(self.base)
    }

    fn reset_empty(&mut self) {
        self.head = 0;
        self.tail = None;
        self.skipped = 0;
    }

    /// Contiguous words available at `head`, wrapping if needed
    fn available(&mut self, wanted: u32) -> Result<u32> {
        let tail = match self.tail {
            None => {
                debug_assert_eq!(self.head, 0);
                self.tail = Some(self.head);
                return Ok(self.size);
            }
            Some(tail) => tail,
        };

        if self.head < tail || (self.head == tail && self.outstanding > 0) {
            // Head has wrapped behind the tail, or caught up with it
            let available = tail - self.head;
            return if available < wanted {
                Err(Error::Insufficient)
            } else {
                Ok(available)
            };
        }

        let available = self.size - self.head;
        if available >= wanted {
            return Ok(available);
        }

        let available = tail;
        if available < wanted {
            return Err(Error::Insufficient);
        }

        // Record the waste so release can tell when the tail crosses it
        self.skipped = self.size - self.head;
        self.head = 0;
        self.stats.wraps += 1;
        log::debug!(
            "RingPool: wrapped, skipped {} words at {}",
            self.skipped,
            self.addr(self.size - self.skipped)
        );
        Ok(available)
    }
}

// =============================================================================
// RING POOL
// =============================================================================

/// Ring allocator for command buffer storage
///
/// All mutations run under one spin lock with O(1) critical sections.
#[derive(Debug)]
pub struct RingPool {
    min_alloc_words: u32,
    max_alloc_words: u32,
    state: Mutex<RingState>,
}

impl RingPool {
    /// Create an uninitialised pool
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            min_alloc_words: config.min_alloc_words,
            max_alloc_words: config.max_alloc_words,
            state: Mutex::new(RingState::new()),
        }
    }

    /// Attach the backing region
    pub fn init(&self, base: GuestAddr, size_words: u32) -> Result<()> {
        let mut state = self.state.lock();

        if state.size != 0 {
            return Err(Error::AlreadyInitialized);
        }
        if size_words == 0 {
            return Err(Error::InvalidConfig("pool region is empty"));
        }

        state.base = base;
        state.size = size_words;
        state.reset_empty();
        state.outstanding = 0;

        log::debug!(
            "RingPool: {} words at {}..{}",
            size_words,
            base,
            base.add_words(size_words)
        );
        Ok(())
    }

    /// Detach the backing region, which must be fully released
    pub fn deinit(&self) -> Result<()> {
        let mut state = self.state.lock();

        if state.size == 0 {
            return Err(Error::NotInitialized);
        }
        if state.outstanding != 0 {
            return Err(Error::Busy {
                outstanding: state.outstanding,
            });
        }

        *state = RingState::new();
        Ok(())
    }

    /// Check if the backing region is attached
    pub fn is_initialized(&self) -> bool {
        self.state.lock().size != 0
    }

    /// Capacity in words
    pub fn capacity(&self) -> u32 {
        self.state.lock().size
    }

    /// Words granted and not yet released
    pub fn outstanding_words(&self) -> u32 {
        self.state.lock().outstanding
    }

    /// Current cursors
    pub fn cursors(&self) -> RingCursors {
        let state = self.state.lock();
        RingCursors {
            head: state.addr(state.head),
            tail: state.tail.map(|tail| state.addr(tail)),
            skipped_words: state.skipped,
            outstanding_words: state.outstanding,
        }
    }

    /// Statistics snapshot
    pub fn stats(&self) -> RingStats {
        self.state.lock().stats
    }

    /// Grant a contiguous region of at least `wanted` words
    ///
    /// The grant is as large as the contiguous run allows, capped at the
    /// configured maximum; unused words go back through [`RingPool::shrink`].
    /// [`Error::Insufficient`] means the caller should wait for retirement
    /// and try again.
    pub fn acquire(&self, wanted: u32) -> Result<Grant> {
        let mut state = self.state.lock();

        if state.size == 0 {
            return Err(Error::NotInitialized);
        }

        let wanted = wanted.max(self.min_alloc_words);
        if wanted > state.size {
            return Err(Error::RequestTooLarge {
                requested: wanted,
                capacity: state.size,
            });
        }

        if state.outstanding == 0 {
            state.reset_empty();
        }

        let available = match state.available(wanted) {
            Ok(available) => available,
            Err(error) => {
                state.stats.stalls += 1;
                return Err(error);
            }
        };

        let words = available.min(self.max_alloc_words);
        let addr = state.addr(state.head);
        state.head += words;
        state.outstanding += words;

        state.stats.grants += 1;
        state.stats.peak_outstanding_words =
            state.stats.peak_outstanding_words.max(state.outstanding);

        Ok(Grant { addr, words })
    }

    /// Return the unused end of the most recent grant
    pub fn shrink(&self, region: GuestAddr, used: u32, granted: u32) -> Result<()> {
        let mut state = self.state.lock();

        if used > granted {
            return Err(Error::ShrinkLargerThanGrant { used, granted });
        }
        if used == granted {
            return Ok(());
        }

        let start = state.offset(region);
        if state.head != start + granted {
            return Err(Error::OutOfOrderShrink { region });
        }

        state.head = start + used;
        state.outstanding -= granted - used;

        if state.outstanding == 0 {
            state.reset_empty();
        }
        Ok(())
    }

    /// Release the oldest outstanding region
    pub fn release(&self, region: GuestAddr, words: u32) -> Result<()> {
        let mut state = self.state.lock();

        let mut tail = match state.tail {
            Some(tail) if state.outstanding >= words => tail,
            _ => {
                return Err(Error::OutOfOrderRelease {
                    region,
                    expected: state.addr(state.head),
                })
            }
        };

        if tail + state.skipped == state.size {
            state.skipped = 0;
            tail = 0;
        }

        if state.addr(tail) != region {
            return Err(Error::OutOfOrderRelease {
                region,
                expected: state.addr(tail),
            });
        }

        tail += words;
        state.outstanding -= words;
        state.stats.releases += 1;

        // Tail may still sit on the skipped fragment when the last grant was
        // shrunk away, so emptiness goes by the outstanding count
        if state.outstanding == 0 {
            state.reset_empty();
        } else {
            state.tail = Some(tail);
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const BASE: GuestAddr = GuestAddr::new(0x2000_0000);
    const MAX_WORDS: u32 = crate::config::MAX_ALLOC_WORDS;

    fn pool(size_words: u32) -> RingPool {
        let pool = RingPool::new(&PoolConfig::default());
        pool.init(BASE, size_words).unwrap();
        pool
    }

    fn at(words: u32) -> GuestAddr {
        BASE.add_words(words)
    }

    #[test]
    fn test_first_grant_takes_whole_pool() {
        let pool = pool(1024);
        let grant = pool.acquire(256).unwrap();

        assert_eq!(grant.addr, BASE);
        assert_eq!(grant.words, 1024);
        assert_eq!(pool.cursors().tail, Some(BASE));
    }

    #[test]
    fn test_shrink_then_second_grant_follows() {
        let pool = pool(1024);
        let grant = pool.acquire(256).unwrap();
        pool.shrink(grant.addr, 256, grant.words).unwrap();

        let second = pool.acquire(256).unwrap();
        assert_eq!(second.addr, at(256));
        assert_eq!(second.words, 768);
    }

    #[test]
    fn test_request_larger_than_pool() {
        let pool = pool(1024);
        pool.acquire(256).unwrap();

        assert_eq!(
            pool.acquire(2048),
            Err(Error::RequestTooLarge {
                requested: 2048,
                capacity: 1024
            })
        );
    }

    #[test]
    fn test_floor_applies_before_capacity_check() {
        let pool = pool(128);
        assert!(matches!(pool.acquire(1), Err(Error::RequestTooLarge { .. })));
    }

    #[test]
    fn test_grant_capped_at_ceiling() {
        let pool = pool(0x30000);
        let grant = pool.acquire(256).unwrap();
        assert_eq!(grant.words, MAX_WORDS);
    }

    #[test]
    fn test_round_trip_returns_to_empty() {
        let pool = pool(1024);
        let grant = pool.acquire(300).unwrap();
        pool.release(grant.addr, grant.words).unwrap();

        let cursors = pool.cursors();
        assert_eq!(cursors.head, BASE);
        assert_eq!(cursors.tail, None);
        assert_eq!(cursors.outstanding_words, 0);
    }

    #[test]
    fn test_shrink_to_nothing_returns_to_empty() {
        let pool = pool(1024);
        let grant = pool.acquire(256).unwrap();
        pool.shrink(grant.addr, 0, grant.words).unwrap();

        let cursors = pool.cursors();
        assert_eq!(cursors.head, BASE);
        assert_eq!(cursors.tail, None);
        assert_eq!(cursors.outstanding_words, 0);
    }

    #[test]
    fn test_wraparound_records_skip() {
        // Low floor so a 200 word request is taken literally
        let pool = RingPool::new(&PoolConfig {
            min_alloc_words: 8,
            ..PoolConfig::default()
        });
        pool.init(BASE, 1024).unwrap();

        let a = pool.acquire(256).unwrap();
        pool.shrink(a.addr, 200, a.words).unwrap();
        let b = pool.acquire(256).unwrap();
        pool.shrink(b.addr, 700, b.words).unwrap();
        pool.release(a.addr, 200).unwrap();

        let cursors = pool.cursors();
        assert_eq!(cursors.head, at(900));
        assert_eq!(cursors.tail, Some(at(200)));

        // 124 words left before the end, 200 free at the base
        let c = pool.acquire(200).unwrap();
        assert_eq!(c.addr, BASE);
        assert_eq!(c.words, 200);
        assert_eq!(pool.cursors().skipped_words, 124);
        assert_eq!(pool.stats().wraps, 1);
    }

    #[test]
    fn test_wrap_refused_when_base_too_small() {
        let pool = pool(1024);

        let a = pool.acquire(256).unwrap();
        pool.shrink(a.addr, 256, a.words).unwrap();
        let b = pool.acquire(256).unwrap();
        pool.shrink(b.addr, 600, b.words).unwrap();
        pool.release(a.addr, 256).unwrap();

        // 168 words before the end, 256 at the base: a 300 word request fails
        assert_eq!(pool.acquire(300), Err(Error::Insufficient));
        assert_eq!(pool.stats().stalls, 1);
        assert_eq!(pool.cursors().skipped_words, 0);
    }

    #[test]
    fn test_skip_repaid_on_release() {
        let pool = pool(1024);

        let a = pool.acquire(256).unwrap();
        pool.shrink(a.addr, 256, a.words).unwrap();
        let b = pool.acquire(256).unwrap();
        pool.shrink(b.addr, 600, b.words).unwrap();
        pool.release(a.addr, 256).unwrap();

        let c = pool.acquire(256).unwrap();
        assert_eq!(c.addr, BASE);
        assert_eq!(pool.cursors().skipped_words, 168);
        pool.shrink(c.addr, 100, c.words).unwrap();

        pool.release(b.addr, 600).unwrap();
        // Tail sits on the skipped fragment until the next release
        pool.release(c.addr, 100).unwrap();

        let cursors = pool.cursors();
        assert_eq!(cursors.tail, None);
        assert_eq!(cursors.skipped_words, 0);
    }

    #[test]
    fn test_out_of_order_release() {
        let pool = pool(1024);

        let a = pool.acquire(256).unwrap();
        pool.shrink(a.addr, 256, a.words).unwrap();
        let b = pool.acquire(256).unwrap();
        pool.shrink(b.addr, 256, b.words).unwrap();

        assert_eq!(
            pool.release(b.addr, 256),
            Err(Error::OutOfOrderRelease {
                region: b.addr,
                expected: a.addr
            })
        );
    }

    #[test]
    fn test_shrink_requires_most_recent_grant() {
        let pool = pool(1024);

        let a = pool.acquire(256).unwrap();
        pool.shrink(a.addr, 256, a.words).unwrap();
        pool.acquire(256).unwrap();

        assert_eq!(
            pool.shrink(a.addr, 100, 256),
            Err(Error::OutOfOrderShrink { region: a.addr })
        );
    }

    #[test]
    fn test_full_ring_is_not_mistaken_for_empty() {
        let pool = pool(1024);

        let a = pool.acquire(256).unwrap();
        pool.shrink(a.addr, 512, a.words).unwrap();
        let b = pool.acquire(256).unwrap();
        pool.release(a.addr, 512).unwrap();

        // Wrap into the released half and use all of it
        let c = pool.acquire(512).unwrap();
        assert_eq!((c.addr, c.words), (BASE, 512));
        assert_eq!(pool.cursors().head, at(512));

        assert_eq!(pool.acquire(256), Err(Error::Insufficient));

        pool.release(b.addr, b.words).unwrap();
        pool.release(c.addr, c.words).unwrap();
        assert_eq!(pool.cursors().tail, None);
    }

    #[test]
    fn test_deinit_requires_drained_pool() {
        let pool = pool(1024);
        let grant = pool.acquire(256).unwrap();

        assert_eq!(pool.deinit(), Err(Error::Busy { outstanding: 1024 }));

        pool.release(grant.addr, grant.words).unwrap();
        pool.deinit().unwrap();
        assert!(!pool.is_initialized());
        assert_eq!(pool.acquire(256), Err(Error::NotInitialized));
    }

    proptest! {
        /// Every FIFO workload that fits eventually gets its grants
        #[test]
        fn prop_fifo_release_never_starves(
            requests in proptest::collection::vec((1u32..1500, 0u32..=100), 1..64)
        ) {
            let pool = pool(2048);
            let mut live = std::collections::VecDeque::<Grant>::new();

            for (wanted, used_pct) in requests {
                let grant = loop {
                    match pool.acquire(wanted) {
                        Ok(grant) => break grant,
                        Err(Error::Insufficient) => {
                            // Retire the oldest; an empty queue here would be starvation
                            let oldest = live.pop_front();
                            prop_assert!(oldest.is_some());
                            let oldest = oldest.unwrap();
                            pool.release(oldest.addr, oldest.words).unwrap();
                        }
                        Err(other) => return Err(TestCaseError::fail(format!("{}", other))),
                    }
                };
                prop_assert!(grant.words >= wanted.max(256));

                let used = (grant.words as u64 * used_pct as u64 / 100) as u32;
                pool.shrink(grant.addr, used, grant.words).unwrap();
                if used > 0 {
                    live.push_back(Grant { addr: grant.addr, words: used });
                }
            }

            while let Some(grant) = live.pop_front() {
                pool.release(grant.addr, grant.words).unwrap();
            }
            prop_assert_eq!(pool.cursors().tail, None);
            prop_assert_eq!(pool.outstanding_words(), 0);
        }
    }
}
