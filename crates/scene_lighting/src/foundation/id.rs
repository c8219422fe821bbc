//! Light identifier allocation
//!
//! Light identifiers key the state-set caches, so they must stay unique for
//! the lifetime of the process. A single allocator service owns the counter
//! and is injected wherever light sources are created.

use std::sync::atomic::{AtomicU32, Ordering};

/// Unique identifier of one dynamic light source
///
/// Assigned at construction and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(u32);

impl LightId {
    /// Raw identifier value
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Monotonic allocator for [`LightId`]s
///
/// One instance per process; share it via `Arc` or a reference.
#[derive(Debug, Default)]
pub struct LightIdAllocator {
    next: AtomicU32,
}

impl LightIdAllocator {
    /// Create a new allocator starting at id 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next identifier
    pub fn allocate(&self) -> LightId {
        LightId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
