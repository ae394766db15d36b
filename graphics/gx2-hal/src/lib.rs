//! # GX2 Host Abstraction Layer
//!
//! Everything the command buffer pool needs from the world around it, and
//! nothing more.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        gx2-cbpool                            │
//! └───────┬──────────────┬───────────────┬──────────────┬────────┘
//!         │              │               │              │
//! ┌───────▼──────┐ ┌─────▼───────┐ ┌─────▼──────┐ ┌─────▼────────┐
//! │ CoreTopology │ │RetireTimeline│ │GuestMemory │ │DisplayList   │
//! │ (core ids)   │ │ (timestamps) │ │ (words)    │ │Overrun       │
//! └──────────────┘ └─────────────┘ └────────────┘ └──────────────┘
//! ```
//!
//! The command queue itself is declared by `gx2-cbpool`, since it moves
//! command buffer descriptors around.
//!
//! With the `std` feature the [`host`] module provides thread-backed
//! implementations of every trait, used by tests and by embedders that run
//! the pool on a desktop host.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

pub mod traits;
pub mod types;

#[cfg(feature = "std")]
pub mod host;

pub use traits::{CoreTopology, DisplayListOverrun, GuestMemory, RetireTimeline};
pub use types::{CoreId, GuestAddr, CORE_COUNT, WORD_SIZE};
