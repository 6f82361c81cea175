//! Cached chunks and the views handed to callers

use std::ops::{Deref, Range};
use std::sync::Arc;

/// Default weight of one access in eviction scoring
pub const DEFAULT_FREQUENCY_WEIGHT_MS: u64 = 10_000;

/// Eviction scoring
///
/// `score = last_access_ms + access_count * frequency_weight_ms`; the lowest
/// score is evicted first. With the default weight one extra access outranks
/// ten seconds of recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub frequency_weight_ms: u64,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            frequency_weight_ms: DEFAULT_FREQUENCY_WEIGHT_MS,
        }
    }
}

impl EvictionPolicy {
    #[inline]
    pub fn score(&self, chunk: &CacheChunk) -> u64 {
        chunk
            .last_access_ms
            .saturating_add(chunk.access_count.saturating_mul(self.frequency_weight_ms))
    }
}

/// One resident chunk of a sample
#[derive(Debug, Clone)]
pub struct CacheChunk {
    pub sample_id: String,
    pub start_sample: u64,
    pub end_sample: u64,
    pub data: Arc<[f32]>,
    /// Milliseconds since the cache was created
    pub last_access_ms: u64,
    pub access_count: u64,
}

impl CacheChunk {
    pub fn new(sample_id: &str, start_sample: u64, data: Arc<[f32]>, now_ms: u64) -> Self {
        Self {
            sample_id: sample_id.to_string(),
            start_sample,
            end_sample: start_sample + data.len() as u64,
            data,
            last_access_ms: now_ms,
            access_count: 1,
        }
    }

    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    #[inline]
    pub fn covers(&self, start: u64, end: u64) -> bool {
        self.start_sample <= start && end <= self.end_sample
    }

    #[inline]
    pub fn touch(&mut self, now_ms: u64) {
        self.last_access_ms = now_ms;
        self.access_count += 1;
    }

    /// Zero-copy view of `[start, end)`, which must lie inside the chunk
    pub fn view(&self, start: u64, end: u64) -> Samples {
        let offset = (start - self.start_sample) as usize;
        let len = (end - start) as usize;
        Samples::new(Arc::clone(&self.data), offset, len, start)
    }
}

/// Samples returned from the cache
///
/// Shares the cached allocation; dereferences to the requested range.
#[derive(Debug, Clone)]
pub struct Samples {
    data: Arc<[f32]>,
    offset: usize,
    len: usize,
    start: u64,
}

impl Samples {
    pub(crate) fn new(data: Arc<[f32]>, offset: usize, len: usize, start: u64) -> Self {
        let offset = offset.min(data.len());
        let len = len.min(data.len() - offset);
        Self {
            data,
            offset,
            len,
            start,
        }
    }

    pub(crate) fn empty(start: u64) -> Self {
        Self {
            data: Arc::from(Vec::new()),
            offset: 0,
            len: 0,
            start,
        }
    }

    /// Absolute sample range this view covers
    pub fn range(&self) -> Range<u64> {
        self.start..self.start + self.len as u64
    }

    /// The whole backing allocation
    pub fn shared(&self) -> &Arc<[f32]> {
        &self.data
    }
}

impl From<Vec<f32>> for Samples {
    fn from(data: Vec<f32>) -> Self {
        let len = data.len();
        Self::new(Arc::from(data), 0, len, 0)
    }
}

impl Deref for Samples {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.data[self.offset..self.offset + self.len]
    }
}
