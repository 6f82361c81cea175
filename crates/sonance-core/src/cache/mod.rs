//! Streaming sample cache
//!
//! Bounded-memory, chunk-granular cache in front of a storage loader. The
//! control context requests sample ranges; resident chunks are returned as
//! zero-copy [`Samples`] views and missing chunks are fetched through the
//! caller-supplied loader.
//!
//! # Read coalescing
//!
//! Loads are keyed by `(sample_id, aligned chunk start)`. While a load for a
//! key is in flight every further request for that key awaits the same
//! result through a `tokio::sync::watch` channel, so the loader runs at most
//! once per key at any time. Loads run on spawned tasks: a started load
//! always completes and populates the cache even if the requester goes away.
//! At most `num_workers` loads run concurrently.
//!
//! # Eviction
//!
//! Before each insertion the lowest-scoring chunk across all samples is
//! evicted until the new chunk fits (see [`EvictionPolicy`]). A chunk larger
//! than the whole budget is returned to the caller but never cached.
//!
//! The render context never touches this type; it only receives the
//! immutable buffers it hands out.

mod chunk;
mod error;

pub use chunk::{CacheChunk, EvictionPolicy, Samples, DEFAULT_FREQUENCY_WEIGHT_MS};
pub use error::{CacheError, CacheResult, LoaderError};

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{watch, Semaphore};

type ChunkResult = CacheResult<Arc<[f32]>>;
type LoadFuture = Pin<Box<dyn Future<Output = Result<Vec<f32>, LoaderError>> + Send>>;

/// Storage loader: fetch samples `[start, end)` of one asset
///
/// Returning fewer samples than requested marks the end of the asset.
/// Implemented for any `Fn(u64, u64) -> impl Future<Output = Result<Vec<f32>, E>>`.
pub trait ChunkLoader: Send + Sync + 'static {
    fn load(&self, start: u64, end: u64) -> LoadFuture;
}

impl<F, Fut, E> ChunkLoader for F
where
    F: Fn(u64, u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<f32>, E>> + Send + 'static,
    E: Into<LoaderError> + 'static,
{
    fn load(&self, start: u64, end: u64) -> LoadFuture {
        let fut = (self)(start, end);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

/// Cache sizing and tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_cache_size_bytes: usize,
    pub chunk_size_samples: usize,
    pub num_workers: usize,
    pub eviction: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size_bytes: 256 * 1024 * 1024,
            chunk_size_samples: crate::config::DEFAULT_CHUNK_SIZE_SAMPLES,
            num_workers: 4,
            eviction: EvictionPolicy::default(),
        }
    }
}

impl CacheConfig {
    pub fn from_engine(config: &crate::config::EngineConfig) -> Self {
        Self {
            max_cache_size_bytes: config.stream_cache_bytes(),
            chunk_size_samples: config.chunk_size_samples.max(1),
            num_workers: config.num_workers.max(1),
            eviction: EvictionPolicy::default(),
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub cache_size_bytes: usize,
    pub max_cache_size_bytes: usize,
    /// hits / (hits + misses), 0 before any request
    pub hit_rate: f64,
    pub entry_count: usize,
    pub hits: u64,
    pub misses: u64,
    pub pending_reads: usize,
}

struct PendingRead {
    generation: u64,
    result: watch::Receiver<Option<ChunkResult>>,
}

#[derive(Default)]
struct CacheState {
    chunks: HashMap<String, Vec<CacheChunk>>,
    size_bytes: usize,
    pending: HashMap<(String, u64), PendingRead>,
    next_generation: u64,
    hits: u64,
    misses: u64,
}

struct Inner {
    config: CacheConfig,
    state: Mutex<CacheState>,
    workers: Arc<Semaphore>,
    epoch: Instant,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Publish a finished load into the cache
    ///
    /// Only inserts if the pending entry that started this load is still
    /// registered; a clear in the meantime drops interest in the result.
    fn complete(&self, sample_id: &str, chunk_start: u64, generation: u64, result: &ChunkResult) {
        let now = self.now_ms();
        let mut state = self.state();

        let key = (sample_id.to_string(), chunk_start);
        let still_wanted = matches!(state.pending.get(&key), Some(p) if p.generation == generation);
        if !still_wanted {
            log::debug!(
                "Discarding load of {}@{}: sample was cleared while in flight",
                sample_id,
                chunk_start
            );
            return;
        }
        state.pending.remove(&key);

        if let Ok(data) = result {
            state.insert(sample_id, chunk_start, Arc::clone(data), now, &self.config);
        }
    }
}

impl CacheState {
    fn resident(&mut self, sample_id: &str, chunk_start: u64, now: u64) -> Option<Arc<[f32]>> {
        let chunk = self
            .chunks
            .get_mut(sample_id)?
            .iter_mut()
            .find(|c| c.start_sample == chunk_start)?;
        chunk.touch(now);
        Some(Arc::clone(&chunk.data))
    }

    fn insert(
        &mut self,
        sample_id: &str,
        chunk_start: u64,
        data: Arc<[f32]>,
        now: u64,
        config: &CacheConfig,
    ) {
        let chunk = CacheChunk::new(sample_id, chunk_start, data, now);
        let bytes = chunk.size_bytes();
        if bytes > config.max_cache_size_bytes {
            log::debug!(
                "Chunk {}@{} ({} bytes) exceeds the cache budget; not caching",
                sample_id,
                chunk_start,
                bytes
            );
            return;
        }

        self.remove_chunk(sample_id, chunk_start);
        while self.size_bytes + bytes > config.max_cache_size_bytes {
            if !self.evict_one(&config.eviction) {
                break;
            }
        }

        let list = self.chunks.entry(sample_id.to_string()).or_default();
        let pos = list.partition_point(|c| c.start_sample < chunk_start);
        list.insert(pos, chunk);
        self.size_bytes += bytes;
    }

    fn remove_chunk(&mut self, sample_id: &str, chunk_start: u64) {
        let Some(list) = self.chunks.get_mut(sample_id) else {
            return;
        };
        if let Some(pos) = list.iter().position(|c| c.start_sample == chunk_start) {
            let removed = list.remove(pos);
            self.size_bytes -= removed.size_bytes();
        }
        if list.is_empty() {
            self.chunks.remove(sample_id);
        }
    }

    /// Evict the lowest-scoring chunk; false if nothing is resident
    fn evict_one(&mut self, policy: &EvictionPolicy) -> bool {
        let victim = self
            .chunks
            .values()
            .flat_map(|list| list.iter())
            .min_by_key(|c| policy.score(c))
            .map(|c| (c.sample_id.clone(), c.start_sample));

        match victim {
            Some((sample_id, start)) => {
                log::debug!("Evicting chunk {}@{}", sample_id, start);
                self.remove_chunk(&sample_id, start);
                true
            }
            None => false,
        }
    }
}

/// Streaming sample cache
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SampleCache {
    inner: Arc<Inner>,
}

impl SampleCache {
    pub fn new(config: CacheConfig) -> Self {
        let config = CacheConfig {
            chunk_size_samples: config.chunk_size_samples.max(1),
            num_workers: config.num_workers.max(1),
            ..config
        };
        Self {
            inner: Arc::new(Inner {
                workers: Arc::new(Semaphore::new(config.num_workers)),
                config,
                state: Mutex::new(CacheState::default()),
                epoch: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Fetch samples `[start, end)` of `sample_id`
    ///
    /// Served from memory when one resident chunk covers the range,
    /// otherwise every aligned chunk overlapping the range is fetched
    /// (coalesced with any in-flight load) and the pieces are joined.
    pub async fn request_chunk<L>(
        &self,
        sample_id: &str,
        start: u64,
        end: u64,
        loader: L,
    ) -> CacheResult<Samples>
    where
        L: ChunkLoader + Clone,
    {
        if end <= start {
            return Ok(Samples::empty(start));
        }

        {
            let now = self.inner.now_ms();
            let mut state = self.inner.state();
            let hit = state.chunks.get_mut(sample_id).and_then(|list| {
                list.iter_mut().find(|c| c.covers(start, end)).map(|chunk| {
                    chunk.touch(now);
                    chunk.view(start, end)
                })
            });
            if let Some(samples) = hit {
                state.hits += 1;
                return Ok(samples);
            }
            state.misses += 1;
        }

        let chunk = self.inner.config.chunk_size_samples as u64;
        let first = start / chunk * chunk;

        if end <= first + chunk {
            let data = self.fetch_aligned(sample_id, first, loader).await?;
            let offset = (start - first) as usize;
            return Ok(Samples::new(data, offset, (end - start) as usize, start));
        }

        let mut joined = Vec::with_capacity((end - start) as usize);
        let mut chunk_start = first;
        while chunk_start < end {
            let data = self
                .fetch_aligned(sample_id, chunk_start, loader.clone())
                .await?;
            let from = start.saturating_sub(chunk_start) as usize;
            let to = ((end - chunk_start) as usize).min(data.len());
            if from < to {
                joined.extend_from_slice(&data[from..to]);
            }
            if (data.len() as u64) < chunk {
                // Short chunk: end of asset
                break;
            }
            chunk_start += chunk;
        }

        let len = joined.len();
        Ok(Samples::new(Arc::from(joined), 0, len, start))
    }

    /// Load the first chunk of a sample (attack transient)
    pub async fn preload<L>(&self, sample_id: &str, total_length: u64, loader: L) -> CacheResult<()>
    where
        L: ChunkLoader + Clone,
    {
        let end = total_length.min(self.inner.config.chunk_size_samples as u64);
        if end == 0 {
            return Ok(());
        }
        self.request_chunk(sample_id, 0, end, loader).await.map(|_| ())
    }

    /// Resident check without touching access bookkeeping
    pub fn contains(&self, sample_id: &str, start: u64, end: u64) -> bool {
        let state = self.inner.state();
        state
            .chunks
            .get(sample_id)
            .is_some_and(|list| list.iter().any(|c| c.covers(start, end)))
    }

    /// Drop every chunk of one sample
    pub fn clear_sample(&self, sample_id: &str) {
        let mut state = self.inner.state();
        if let Some(list) = state.chunks.remove(sample_id) {
            let freed: usize = list.iter().map(CacheChunk::size_bytes).sum();
            state.size_bytes -= freed;
            log::debug!("Cleared {} ({} bytes)", sample_id, freed);
        }
        state.pending.retain(|(id, _), _| id != sample_id);
    }

    /// Drop everything
    pub fn clear_all(&self) {
        let mut state = self.inner.state();
        state.chunks.clear();
        state.pending.clear();
        state.size_bytes = 0;
    }

    /// Clear and refuse further loads
    ///
    /// Loads still waiting for a worker fail with [`CacheError::Shutdown`].
    pub fn shutdown(&self) {
        self.inner.workers.close();
        self.clear_all();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state();
        let total = state.hits + state.misses;
        CacheStats {
            cache_size_bytes: state.size_bytes,
            max_cache_size_bytes: self.inner.config.max_cache_size_bytes,
            hit_rate: if total == 0 {
                0.0
            } else {
                state.hits as f64 / total as f64
            },
            entry_count: state.chunks.values().map(Vec::len).sum(),
            hits: state.hits,
            misses: state.misses,
            pending_reads: state.pending.len(),
        }
    }

    /// Fetch one aligned chunk: resident, joined in flight, or loaded
    async fn fetch_aligned<L>(&self, sample_id: &str, chunk_start: u64, loader: L) -> ChunkResult
    where
        L: ChunkLoader,
    {
        let mut result = {
            let now = self.inner.now_ms();
            let mut state = self.inner.state();

            if let Some(data) = state.resident(sample_id, chunk_start, now) {
                return Ok(data);
            }

            let key = (sample_id.to_string(), chunk_start);
            match state.pending.get(&key) {
                Some(pending) => pending.result.clone(),
                None => {
                    let generation = state.next_generation;
                    state.next_generation += 1;

                    let (tx, rx) = watch::channel(None);
                    state.pending.insert(
                        key,
                        PendingRead {
                            generation,
                            result: rx.clone(),
                        },
                    );
                    self.spawn_load(sample_id.to_string(), chunk_start, generation, loader, tx);
                    rx
                }
            }
        };

        let published = result
            .wait_for(Option::is_some)
            .await
            .map_err(|_| CacheError::Aborted)?;
        match &*published {
            Some(outcome) => outcome.clone(),
            None => Err(CacheError::Aborted),
        }
    }

    fn spawn_load<L>(
        &self,
        sample_id: String,
        chunk_start: u64,
        generation: u64,
        loader: L,
        tx: watch::Sender<Option<ChunkResult>>,
    ) where
        L: ChunkLoader,
    {
        let inner = Arc::clone(&self.inner);
        let chunk_end = chunk_start + inner.config.chunk_size_samples as u64;

        tokio::spawn(async move {
            let outcome: ChunkResult = match Arc::clone(&inner.workers).acquire_owned().await {
                Ok(_permit) => match loader.load(chunk_start, chunk_end).await {
                    Ok(samples) => Ok(Arc::from(samples)),
                    Err(e) => {
                        log::warn!("Loading {}@{} failed: {}", sample_id, chunk_start, e);
                        Err(CacheError::storage(e))
                    }
                },
                Err(_) => Err(CacheError::Shutdown),
            };

            inner.complete(&sample_id, chunk_start, generation, &outcome);
            tx.send_replace(Some(outcome));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn small_cache(chunk: usize, budget_chunks: usize) -> SampleCache {
        SampleCache::new(CacheConfig {
            max_cache_size_bytes: chunk * budget_chunks * 4,
            chunk_size_samples: chunk,
            num_workers: 2,
            eviction: EvictionPolicy::default(),
        })
    }

    /// Loader producing `value = position` over an asset of `total` samples
    fn ramp_loader(
        total: u64,
        calls: Arc<AtomicUsize>,
    ) -> impl Fn(u64, u64) -> std::future::Ready<Result<Vec<f32>, std::io::Error>> + Clone {
        move |start, end| {
            calls.fetch_add(1, Ordering::SeqCst);
            let end = end.min(total);
            std::future::ready(Ok((start..end).map(|i| i as f32).collect()))
        }
    }

    #[tokio::test]
    async fn test_second_request_is_a_hit() {
        let cache = small_cache(16, 8);
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = ramp_loader(1000, calls.clone());

        let first = cache.request_chunk("pad", 4, 12, loader.clone()).await.unwrap();
        assert_eq!(&*first, &[4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(cache.stats().hit_rate, 0.0);

        let second = cache.request_chunk("pad", 0, 16, loader).await.unwrap();
        assert_eq!(second.len(), 16);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
        assert!(cache.contains("pad", 0, 16));
        assert!(!cache.contains("pad", 0, 17));
    }

    #[tokio::test]
    async fn test_concurrent_requests_coalesce() {
        let cache = small_cache(64, 8);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let loader = move |start: u64, end: u64| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, std::io::Error>((start..end).map(|i| i as f32).collect::<Vec<_>>())
            }
        };

        let mut tasks = Vec::new();
        for i in 0..8u64 {
            let cache = cache.clone();
            let loader = loader.clone();
            tasks.push(tokio::spawn(async move {
                cache.request_chunk("vox", i, i + 10, loader).await
            }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            let samples = task.await.unwrap().unwrap();
            assert_eq!(samples[0], i as f32);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().pending_reads, 0);
    }

    #[tokio::test]
    async fn test_range_spanning_chunks_is_joined() {
        let cache = small_cache(8, 8);
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = ramp_loader(1000, calls.clone());

        let samples = cache.request_chunk("bass", 6, 19, loader).await.unwrap();
        let expected: Vec<f32> = (6..19).map(|i| i as f32).collect();
        assert_eq!(&*samples, expected.as_slice());
        assert_eq!(samples.range(), 6..19);
        // Chunks at 0, 8 and 16
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.stats().entry_count, 3);
    }

    #[tokio::test]
    async fn test_short_final_chunk_marks_end_of_asset() {
        let cache = small_cache(8, 8);
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = ramp_loader(10, calls.clone());

        let samples = cache.request_chunk("hat", 4, 30, loader.clone()).await.unwrap();
        let expected: Vec<f32> = (4..10).map(|i| i as f32).collect();
        assert_eq!(&*samples, expected.as_slice());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The short chunk is resident and served without another load
        let tail = cache.request_chunk("hat", 8, 12, loader).await.unwrap();
        assert_eq!(&*tail, &[8.0, 9.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_size_never_exceeds_budget() {
        let cache = small_cache(16, 3);
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = ramp_loader(10_000, calls.clone());

        for i in 0..20u64 {
            cache
                .request_chunk("strings", i * 16, i * 16 + 4, loader.clone())
                .await
                .unwrap();
            let stats = cache.stats();
            assert!(stats.cache_size_bytes <= stats.max_cache_size_bytes);
        }
        assert_eq!(cache.stats().entry_count, 3);
    }

    #[tokio::test]
    async fn test_eviction_prefers_rarely_used_chunks() {
        let cache = small_cache(4, 3);
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = ramp_loader(1000, calls.clone());

        for start in [0u64, 4, 8] {
            cache.request_chunk("s", start, start + 4, loader.clone()).await.unwrap();
        }
        // Chunks 0 and 4 become popular
        for _ in 0..3 {
            cache.request_chunk("s", 0, 4, loader.clone()).await.unwrap();
            cache.request_chunk("s", 4, 8, loader.clone()).await.unwrap();
        }

        cache.request_chunk("s", 12, 16, loader).await.unwrap();
        assert!(cache.contains("s", 0, 4));
        assert!(cache.contains("s", 4, 8));
        assert!(!cache.contains("s", 8, 12));
        assert!(cache.contains("s", 12, 16));
    }

    #[tokio::test]
    async fn test_oversized_chunk_returned_but_not_cached() {
        let cache = SampleCache::new(CacheConfig {
            max_cache_size_bytes: 16,
            chunk_size_samples: 8,
            num_workers: 1,
            eviction: EvictionPolicy::default(),
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = ramp_loader(100, calls.clone());

        let samples = cache.request_chunk("big", 0, 8, loader).await.unwrap();
        assert_eq!(samples.len(), 8);
        let stats = cache.stats();
        assert_eq!(stats.cache_size_bytes, 0);
        assert_eq!(stats.entry_count, 0);
    }

    #[tokio::test]
    async fn test_clear_accounting_is_exact() {
        let cache = small_cache(8, 16);
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = ramp_loader(1000, calls.clone());

        cache.request_chunk("a", 0, 16, loader.clone()).await.unwrap();
        cache.request_chunk("b", 0, 8, loader.clone()).await.unwrap();
        assert_eq!(cache.stats().cache_size_bytes, 3 * 8 * 4);

        cache.clear_sample("a");
        assert_eq!(cache.stats().cache_size_bytes, 8 * 4);
        assert!(!cache.contains("a", 0, 8));
        assert!(cache.contains("b", 0, 8));

        cache.clear_all();
        let stats = cache.stats();
        assert_eq!(stats.cache_size_bytes, 0);
        assert_eq!(stats.entry_count, 0);
    }

    #[tokio::test]
    async fn test_error_reaches_every_awaiter_and_retry_succeeds() {
        let cache = small_cache(32, 8);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let loader = move |start: u64, end: u64| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if attempt == 0 {
                    Err("disk on fire".to_string())
                } else {
                    Ok((start..end).map(|i| i as f32).collect::<Vec<_>>())
                }
            }
        };

        let a = {
            let cache = cache.clone();
            let loader = loader.clone();
            tokio::spawn(async move { cache.request_chunk("x", 0, 4, loader).await })
        };
        let b = {
            let cache = cache.clone();
            let loader = loader.clone();
            tokio::spawn(async move { cache.request_chunk("x", 2, 6, loader).await })
        };

        for result in [a.await.unwrap(), b.await.unwrap()] {
            match result {
                Err(CacheError::Storage(e)) => assert!(e.to_string().contains("disk on fire")),
                other => panic!("expected storage error, got {:?}", other.map(|s| s.len())),
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().entry_count, 0);
        assert_eq!(cache.stats().pending_reads, 0);

        let retry = cache.request_chunk("x", 0, 4, loader).await.unwrap();
        assert_eq!(&*retry, &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_during_load_does_not_insert() {
        let cache = small_cache(16, 8);
        let loader = |start: u64, end: u64| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, std::io::Error>((start..end).map(|i| i as f32).collect::<Vec<_>>())
        };

        let request = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.request_chunk("y", 0, 4, loader).await })
        };
        // Let the load start, then clear
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.clear_sample("y");

        let samples = request.await.unwrap().unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(cache.stats().cache_size_bytes, 0);
        assert!(!cache.contains("y", 0, 4));
    }

    #[tokio::test]
    async fn test_preload_fetches_first_chunk_only() {
        let cache = small_cache(8, 8);
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = ramp_loader(100, calls.clone());

        cache.preload("kick", 100, loader.clone()).await.unwrap();
        assert!(cache.contains("kick", 0, 8));
        assert!(!cache.contains("kick", 8, 16));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.preload("empty", 0, loader).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_range() {
        let cache = small_cache(8, 8);
        let calls = Arc::new(AtomicUsize::new(0));
        let samples = cache
            .request_chunk("z", 10, 10, ramp_loader(100, calls.clone()))
            .await
            .unwrap();
        assert!(samples.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_loads() {
        let cache = small_cache(8, 8);
        cache.shutdown();
        let calls = Arc::new(AtomicUsize::new(0));
        let result = cache.request_chunk("k", 0, 4, ramp_loader(100, calls.clone())).await;
        assert!(matches!(result, Err(CacheError::Shutdown)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
