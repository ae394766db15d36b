//! # GX2 Command Buffer Pool
//!
//! Supplies the graphics driver with command buffers carved out of one
//! contiguous guest memory region, and recycles them once the GPU retires
//! them.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                       CommandBufferPool<H>                         │
//! │  init · get_buffer · flush_command_buffer · free_command_buffer    │
//! │  begin/finalize/queue_display_list · get_user_command_buffer       │
//! └──────┬──────────────────┬────────────────────┬─────────────────────┘
//!        │                  │                    │
//! ┌──────▼───────┐  ┌───────▼────────┐  ┌────────▼────────┐
//! │   RingPool   │  │ BufferRecycler │  │  LeaseRegistry  │
//! │ head / tail  │  │ Treiber stack  │  │ slot per core   │
//! │ (spin lock)  │  │ (lock-free)    │  │ + pool lease    │
//! └──────────────┘  └────────────────┘  └─────────────────┘
//!        │
//! ┌──────▼────────────────────────────────────────────────────────────┐
//! │ Host: CoreTopology + RetireTimeline + GuestMemory                 │
//! │       + CommandQueue + DisplayListOverrun                         │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! Pool storage is handed out in address order and must come back in the
//! same order. The command queue guarantees this by retiring buffers FIFO.
//! While the ring is full the main core blocks on the retire timeline.
//!
//! ## Failure
//!
//! Broken invariants (double lease, out-of-order release, a failed display
//! list overrun) are fatal: they are logged and the pool panics.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

pub mod buffer;
pub mod config;
pub mod display_list;
pub mod error;
pub mod lease;
pub mod pool;
pub mod queue;
pub mod recycler;
pub mod ring;

#[cfg(test)]
mod testing;

pub use buffer::{CommandBuffer, DescriptorId};
pub use config::PoolConfig;
pub use error::{fatal, Error, Result};
pub use lease::LeaseState;
pub use pool::{ActiveBuffer, CommandBufferPool, PoolStats};
pub use queue::{CommandQueue, Host};
pub use recycler::RecyclerStats;
pub use ring::{RingCursors, RingStats};
