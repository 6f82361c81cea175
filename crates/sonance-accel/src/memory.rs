//! The module's flat memory region and its allocator
//!
//! One contiguous, 16-byte aligned region is reserved on first use and
//! never returned to the system. `sonance_malloc` hands out first-fit
//! ranges from it; freed ranges are merged with their free neighbours.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Size of the region in bytes
pub const MEMORY_SIZE: usize = 32 * 1024 * 1024;

const ALIGN: usize = 16;

pub struct Region {
    base: usize,
    allocator: Mutex<Allocator>,
}

impl Region {
    fn new() -> Self {
        let words = vec![0u128; MEMORY_SIZE / ALIGN].into_boxed_slice();
        let base = Box::leak(words).as_mut_ptr() as usize;
        Self {
            base,
            allocator: Mutex::new(Allocator::new(MEMORY_SIZE)),
        }
    }

    pub fn base(&self) -> *mut u8 {
        self.base as *mut u8
    }

    fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn malloc(&self, size: usize) -> *mut u8 {
        match self.allocator().allocate(size) {
            Some(offset) => (self.base + offset) as *mut u8,
            None => std::ptr::null_mut(),
        }
    }

    pub fn free(&self, ptr: *mut u8) {
        let addr = ptr as usize;
        if addr < self.base || addr >= self.base + MEMORY_SIZE {
            return;
        }
        self.allocator().release(addr - self.base);
    }
}

pub fn region() -> &'static Region {
    static REGION: OnceLock<Region> = OnceLock::new();
    REGION.get_or_init(Region::new)
}

/// First-fit allocator over offsets into the region
#[derive(Debug)]
pub struct Allocator {
    /// offset -> length of every free range
    free: BTreeMap<usize, usize>,
    /// offset -> length of every live allocation
    live: BTreeMap<usize, usize>,
}

impl Allocator {
    pub fn new(size: usize) -> Self {
        let mut free = BTreeMap::new();
        if size > 0 {
            free.insert(0, size);
        }
        Self {
            free,
            live: BTreeMap::new(),
        }
    }

    pub fn allocate(&mut self, size: usize) -> Option<usize> {
        let size = size.max(1).checked_add(ALIGN - 1)? & !(ALIGN - 1);
        let (&offset, &len) = self.free.iter().find(|&(_, &len)| len >= size)?;
        self.free.remove(&offset);
        if len > size {
            self.free.insert(offset + size, len - size);
        }
        self.live.insert(offset, size);
        Some(offset)
    }

    pub fn release(&mut self, offset: usize) {
        let Some(mut len) = self.live.remove(&offset) else {
            return;
        };
        let mut start = offset;

        if let Some((&next, &next_len)) = self.free.range(offset + len..).next() {
            if next == offset + len {
                self.free.remove(&next);
                len += next_len;
            }
        }
        if let Some((&prev, &prev_len)) = self.free.range(..offset).next_back() {
            if prev + prev_len == offset {
                self.free.remove(&prev);
                start = prev;
                len += prev_len;
            }
        }
        self.free.insert(start, len);
    }

    pub fn live_bytes(&self) -> usize {
        self.live.values().sum()
    }

    pub fn free_ranges(&self) -> usize {
        self.free.len()
    }
}
