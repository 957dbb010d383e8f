use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;

/// Host-memory handle owned by one execution context. Buffers come back
/// zero-filled so a slice that is never written stays all zeros. Counters
/// track what one context has handed out, which also lets callers confirm
/// that a rejected batch allocated nothing.
#[derive(Debug, Default)]
pub struct HostAllocator {
    allocations: AtomicUsize,
    allocated_bytes: AtomicUsize,
}

impl HostAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_zeroed(&self, byte_size: usize) -> BytesMut {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.allocated_bytes.fetch_add(byte_size, Ordering::Relaxed);
        BytesMut::zeroed(byte_size)
    }

    pub fn allocation_count(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes.load(Ordering::Relaxed)
    }
}
