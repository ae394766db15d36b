//! # Command Queue Boundary
//!
//! The pool hands finished buffers to a [`CommandQueue`]; the queue's
//! consumer hands them back through
//! [`CommandBufferPool::free_command_buffer`](crate::CommandBufferPool::free_command_buffer)
//! once the GPU has retired them, in submission order.

use gx2_hal::{CoreTopology, DisplayListOverrun, GuestMemory, RetireTimeline};

use crate::buffer::CommandBuffer;

// =============================================================================
// COMMAND QUEUE
// =============================================================================

/// Downstream consumer of filled command buffers
pub trait CommandQueue: Send + Sync {
    /// Take ownership of a filled buffer for asynchronous execution
    fn queue_command_buffer(&self, buffer: CommandBuffer);
}

// =============================================================================
// HOST
// =============================================================================

/// Every collaborator the pool needs, bundled
pub trait Host:
    CoreTopology + RetireTimeline + GuestMemory + CommandQueue + DisplayListOverrun
{
}

impl<T> Host for T where
    T: CoreTopology + RetireTimeline + GuestMemory + CommandQueue + DisplayListOverrun
{
}
