//! Render-side counters and the control-side performance window
//!
//! The render context publishes its frame clock, counters and callback
//! durations through [`RenderAtomics`]. Durations go into a fixed ring of
//! [`METRICS_WINDOW`] slots that always holds the most recent callbacks,
//! however long the control side waits between snapshots.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Number of callback durations kept for statistics
pub const METRICS_WINDOW: usize = 100;

/// Lock-free render state for control-side access
///
/// The render context is the only writer. All operations use
/// `Ordering::Relaxed`; the control side only needs eventual visibility.
pub struct RenderAtomics {
    /// Frames rendered since initialization
    pub clock: AtomicU64,
    /// Completed render callbacks
    pub callbacks: AtomicU64,
    /// Blocks where the transport ran dry after delivering data
    pub underruns: AtomicU64,
    /// Callbacks that took longer than one block period
    pub overruns: AtomicU64,
    /// Voices sounding at the end of the last block
    pub active_voices: AtomicUsize,
    /// Set once the render context has processed its Init message
    pub initialized: AtomicBool,
    /// Callback durations as `f64` bits, written round-robin
    durations: [AtomicU64; METRICS_WINDOW],
    /// Durations recorded since initialization
    recorded: AtomicU64,
}

impl RenderAtomics {
    pub fn new() -> Self {
        Self {
            clock: AtomicU64::new(0),
            callbacks: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            active_voices: AtomicUsize::new(0),
            initialized: AtomicBool::new(false),
            durations: std::array::from_fn(|_| AtomicU64::new(0)),
            recorded: AtomicU64::new(0),
        }
    }

    /// Record one callback duration, overwriting the oldest slot
    ///
    /// Render context only.
    #[inline]
    pub fn record_duration(&self, seconds: f64) {
        let n = self.recorded.load(Ordering::Relaxed);
        self.durations[(n % METRICS_WINDOW as u64) as usize].store(seconds.to_bits(), Ordering::Relaxed);
        self.recorded.store(n + 1, Ordering::Relaxed);
    }

    #[inline]
    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn clock(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn active_voices(&self) -> usize {
        self.active_voices.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Relaxed)
    }
}

impl Default for RenderAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time engine performance
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub avg_callback_ms: f64,
    pub max_callback_ms: f64,
    /// Population standard deviation of callback durations
    pub jitter_ms: f64,
    /// Average callback time relative to the block period
    pub dsp_load: f64,
    /// Block latency plus host output latency
    pub latency_ms: f64,
    pub cache_hit_rate: f64,
    pub acceleration_enabled: bool,
    pub vector_instructions_enabled: bool,
    pub underruns: u64,
    pub overruns: u64,
    pub callbacks: u64,
    pub active_voices: usize,
    /// Number of durations the statistics are computed from
    pub window: usize,
}

/// Rolling window of callback durations, owned by the control side
pub struct MetricsWindow {
    durations: VecDeque<f64>,
}

impl Default for MetricsWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsWindow {
    pub fn new() -> Self {
        Self {
            durations: VecDeque::with_capacity(METRICS_WINDOW),
        }
    }

    /// Add one duration in seconds, evicting the oldest past the window
    pub fn push(&mut self, seconds: f64) {
        if self.durations.len() == METRICS_WINDOW {
            self.durations.pop_front();
        }
        self.durations.push_back(seconds);
    }

    /// Replace the window with the most recent durations, oldest first
    pub fn refresh(&mut self, atomics: &RenderAtomics) {
        let recorded = atomics.recorded();
        let first = recorded.saturating_sub(METRICS_WINDOW as u64);
        self.durations.clear();
        for n in first..recorded {
            let bits = atomics.durations[(n % METRICS_WINDOW as u64) as usize].load(Ordering::Relaxed);
            self.durations.push_back(f64::from_bits(bits));
        }
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    /// Average, max and population standard deviation, in seconds
    pub fn stats(&self) -> (f64, f64, f64) {
        if self.durations.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        let n = self.durations.len() as f64;
        let avg = self.durations.iter().sum::<f64>() / n;
        let max = self.durations.iter().copied().fold(0.0, f64::max);
        let variance = self.durations.iter().map(|d| (d - avg).powi(2)).sum::<f64>() / n;
        (avg, max, variance.sqrt())
    }

    /// Build the timing part of a snapshot
    ///
    /// Counters, cache and capability fields are filled in by the engine.
    pub fn snapshot(&self, block_size: usize, sample_rate: u32, host_latency_ms: f64) -> PerformanceSnapshot {
        let (avg, max, jitter) = self.stats();
        let period = block_size as f64 / sample_rate as f64;
        PerformanceSnapshot {
            avg_callback_ms: avg * 1000.0,
            max_callback_ms: max * 1000.0,
            jitter_ms: jitter * 1000.0,
            dsp_load: if period > 0.0 { avg / period } else { 0.0 },
            latency_ms: period * 1000.0 + host_latency_ms,
            window: self.durations.len(),
            ..PerformanceSnapshot::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_keeps_last_hundred() {
        let mut window = MetricsWindow::new();
        for i in 0..150 {
            window.push(i as f64);
        }
        assert_eq!(window.len(), METRICS_WINDOW);
        let (avg, max, _) = window.stats();
        assert_eq!(max, 149.0);
        assert!((avg - 99.5).abs() < 1e-9);
    }

    #[test]
    fn test_population_jitter() {
        let mut window = MetricsWindow::new();
        for d in [0.001, 0.003, 0.001, 0.003] {
            window.push(d);
        }
        let snapshot = window.snapshot(256, 44_100, 0.0);
        assert!((snapshot.avg_callback_ms - 2.0).abs() < 1e-9);
        assert!((snapshot.jitter_ms - 1.0).abs() < 1e-9);
        assert!((snapshot.max_callback_ms - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window_reports_block_latency() {
        let snapshot = MetricsWindow::new().snapshot(256, 44_100, 0.0);
        assert!((snapshot.latency_ms - 5.805).abs() < 0.001);
        assert_eq!(snapshot.dsp_load, 0.0);
        assert_eq!(snapshot.window, 0);
    }

    #[test]
    fn test_dsp_load_relative_to_period() {
        let mut window = MetricsWindow::new();
        // Half of a 256-frame period at 48 kHz
        window.push(256.0 / 48_000.0 / 2.0);
        let snapshot = window.snapshot(256, 48_000, 1.5);
        assert!((snapshot.dsp_load - 0.5).abs() < 1e-9);
        assert!((snapshot.latency_ms - (256.0 / 48.0 + 1.5)).abs() < 1e-9);
    }

    #[test]
    fn test_refresh_reads_recorded_durations() {
        let atomics = RenderAtomics::new();
        atomics.record_duration(0.002);
        atomics.record_duration(0.004);
        let mut window = MetricsWindow::new();
        window.refresh(&atomics);
        assert_eq!(window.len(), 2);
        assert!((window.stats().0 - 0.003).abs() < 1e-12);
    }

    #[test]
    fn test_refresh_after_long_gap_keeps_newest() {
        let atomics = RenderAtomics::new();
        for i in 0..1100 {
            atomics.record_duration(i as f64);
        }
        let mut window = MetricsWindow::new();
        window.refresh(&atomics);

        assert_eq!(atomics.recorded(), 1100);
        assert_eq!(window.len(), METRICS_WINDOW);
        let (avg, max, _) = window.stats();
        assert_eq!(max, 1099.0);
        assert!((avg - 1049.5).abs() < 1e-9);
    }
}
