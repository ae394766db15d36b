//! Test host: thread-backed cores, a condvar timeline, a flat memory window,
//! a recording command queue and a scripted overrun callback.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::vec::Vec;

use gx2_hal::host::{HostCores, HostMemory, HostTimeline};
use gx2_hal::{CoreId, CoreTopology, DisplayListOverrun, GuestAddr, GuestMemory, RetireTimeline};
use spin::Mutex;

use crate::buffer::CommandBuffer;
use crate::config::PoolConfig;
use crate::pool::CommandBufferPool;
use crate::queue::CommandQueue;

pub const POOL_BASE: GuestAddr = GuestAddr::new(0x1000_0000);
pub const LIST_A: GuestAddr = GuestAddr::new(0x1001_0000);
pub const LIST_B: GuestAddr = GuestAddr::new(0x1001_1000);

const MEMORY_WORDS: u32 = 0x5000;

#[derive(Debug)]
pub struct TestHost {
    pub cores: HostCores,
    pub timeline: HostTimeline,
    pub memory: HostMemory,
    submitted: Mutex<VecDeque<CommandBuffer>>,
    next_submit: AtomicU64,
    replacements: Mutex<VecDeque<(GuestAddr, u32)>>,
    overruns: Mutex<Vec<(GuestAddr, u32, u32)>>,
}

impl TestHost {
    pub fn new() -> Self {
        Self {
            cores: HostCores::default(),
            timeline: HostTimeline::new(),
            memory: HostMemory::new(POOL_BASE, MEMORY_WORDS),
            submitted: Mutex::new(VecDeque::new()),
            next_submit: AtomicU64::new(0),
            replacements: Mutex::new(VecDeque::new()),
            overruns: Mutex::new(Vec::new()),
        }
    }

    /// Queue storage for the next overrun callback
    pub fn offer_list(&self, list: GuestAddr, size_bytes: u32) {
        self.replacements.lock().push_back((list, size_bytes));
    }

    /// Overrun callbacks seen so far as `(list, size_bytes, needed_bytes)`
    pub fn overruns(&self) -> Vec<(GuestAddr, u32, u32)> {
        self.overruns.lock().clone()
    }

    pub fn take_submitted(&self) -> Vec<CommandBuffer> {
        self.submitted.lock().drain(..).collect()
    }

    fn pop_submitted(&self) -> Option<CommandBuffer> {
        self.submitted.lock().pop_front()
    }
}

impl CoreTopology for TestHost {
    fn current_core(&self) -> CoreId {
        self.cores.current_core()
    }

    fn main_core(&self) -> CoreId {
        self.cores.main_core()
    }
}

impl RetireTimeline for TestHost {
    fn retired_timestamp(&self) -> u64 {
        self.timeline.retired_timestamp()
    }

    fn wait_until(&self, timestamp: u64) {
        self.timeline.wait_until(timestamp)
    }
}

impl GuestMemory for TestHost {
    fn read_u32(&self, addr: GuestAddr) -> u32 {
        self.memory.read_u32(addr)
    }

    fn write_u32(&self, addr: GuestAddr, value: u32) {
        self.memory.write_u32(addr, value)
    }
}

impl CommandQueue for TestHost {
    fn queue_command_buffer(&self, mut buffer: CommandBuffer) {
        buffer.submit_time = self.next_submit.fetch_add(1, Ordering::Relaxed) + 1;
        self.submitted.lock().push_back(buffer);
    }
}

impl DisplayListOverrun for TestHost {
    fn display_list_overrun(
        &self,
        list: GuestAddr,
        size_bytes: u32,
        needed_bytes: u32,
    ) -> Option<(GuestAddr, u32)> {
        self.overruns.lock().push((list, size_bytes, needed_bytes));
        self.replacements.lock().pop_front()
    }
}

/// Initialised pool over a `size_words` ring at [`POOL_BASE`]
pub fn pool(size_words: u32) -> CommandBufferPool<TestHost> {
    let pool = CommandBufferPool::new(TestHost::new(), PoolConfig::default()).unwrap();
    pool.init(POOL_BASE, size_words);
    pool
}

// =============================================================================
// GPU
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retired {
    /// Core the consumer thread ran as
    pub core: CoreId,
    pub buffers: u64,
    pub words: u64,
}

/// Background consumer retiring submitted buffers in order
#[derive(Debug)]
pub struct Gpu {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Retired>,
}

impl Gpu {
    /// Drain what is left and join
    pub fn stop(self) -> Retired {
        self.stop.store(true, Ordering::Release);
        self.handle.join().unwrap()
    }
}

pub fn spawn_gpu(pool: Arc<CommandBufferPool<TestHost>>) -> Gpu {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);

    let handle = thread::spawn(move || {
        // Retirement never runs on the main core
        HostCores::enter(CoreId::CORE0);

        let mut retired = Retired {
            core: pool.host().current_core(),
            buffers: 0,
            words: 0,
        };
        loop {
            match pool.host().pop_submitted() {
                Some(buffer) => {
                    retired.buffers += 1;
                    retired.words += u64::from(buffer.cur_size);
                    // Storage goes back before the timestamp is published
                    pool.free_command_buffer(buffer);
                    pool.host().timeline.advance();
                }
                None if flag.load(Ordering::Acquire) => break,
                None => thread::yield_now(),
            }
        }
        retired
    });

    Gpu { stop, handle }
}
