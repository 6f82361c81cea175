//! Engine configuration snapshot
//!
//! `EngineConfig` is created once (from code or a YAML file) and handed to
//! the engine by value. The engine never mutates it afterwards.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use crate::dsp::InterpolationQuality;

pub const MIN_SAMPLE_RATE: u32 = 22_050;
pub const MAX_SAMPLE_RATE: u32 = 192_000;
pub const MIN_BLOCK_SIZE: usize = 64;
pub const MAX_BLOCK_SIZE: usize = crate::types::MAX_BLOCK_SIZE;

/// Allowed oversampling factors
pub const OVERSAMPLING_FACTORS: [u32; 4] = [1, 2, 4, 8];

/// Default streaming chunk size in samples (64 Ki)
pub const DEFAULT_CHUNK_SIZE_SAMPLES: usize = 65_536;

/// Validation failure for an [`EngineConfig`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample_rate {0} is outside 22050..=192000")]
    SampleRate(u32),

    #[error("block_size {0} must be a power of two in 64..=4096")]
    BlockSize(usize),

    #[error("max_voices must be at least 1")]
    MaxVoices,

    #[error("num_workers must be at least 1")]
    NumWorkers,

    #[error("oversampling_factor {0} must be one of 1, 2, 4, 8")]
    Oversampling(u32),

    #[error("chunk_size_samples must be at least 1")]
    ChunkSize,
}

/// Engine configuration
///
/// Every field has a default, so partial YAML files are accepted:
///
/// ```yaml
/// sample_rate: 48000
/// block_size: 128
/// interpolation_quality: sinc
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Frames rendered per callback (power of two)
    pub block_size: usize,

    /// Size of the pre-allocated voice pool
    pub max_voices: usize,

    /// Try to load the native accelerator module
    pub enable_acceleration: bool,

    /// Use vector instructions when the CPU probe passes
    pub enable_vector_instructions: bool,

    /// Allocation budget inside the accelerator's memory region
    pub accelerator_memory_budget_mb: usize,

    /// Render on a dedicated thread; otherwise the caller drives blocks
    pub use_dedicated_render_context: bool,

    /// Path to the native accelerator module (shared library)
    pub render_module_path: Option<PathBuf>,

    /// Allow disk streaming through the sample cache
    pub enable_streaming: bool,

    /// Sample cache budget
    pub stream_cache_mb: usize,

    /// Allow preloading the first chunk of samples
    pub preload_samples: bool,

    /// Concurrent chunk loads
    pub num_workers: usize,

    pub interpolation_quality: InterpolationQuality,

    /// One of 1, 2, 4, 8
    pub oversampling_factor: u32,

    /// Streaming chunk granularity in samples
    pub chunk_size_samples: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: 256,
            max_voices: 64,
            enable_acceleration: true,
            enable_vector_instructions: true,
            accelerator_memory_budget_mb: 16,
            use_dedicated_render_context: true,
            render_module_path: None,
            enable_streaming: true,
            stream_cache_mb: 256,
            preload_samples: true,
            num_workers: 4,
            interpolation_quality: InterpolationQuality::default(),
            oversampling_factor: 1,
            chunk_size_samples: DEFAULT_CHUNK_SIZE_SAMPLES,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_max_voices(mut self, max_voices: usize) -> Self {
        self.max_voices = max_voices;
        self
    }

    pub fn with_acceleration(mut self, enabled: bool) -> Self {
        self.enable_acceleration = enabled;
        self
    }

    pub fn with_vector_instructions(mut self, enabled: bool) -> Self {
        self.enable_vector_instructions = enabled;
        self
    }

    pub fn with_accelerator_memory_budget_mb(mut self, mb: usize) -> Self {
        self.accelerator_memory_budget_mb = mb;
        self
    }

    pub fn with_dedicated_render_context(mut self, enabled: bool) -> Self {
        self.use_dedicated_render_context = enabled;
        self
    }

    pub fn with_render_module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.render_module_path = Some(path.into());
        self
    }

    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.enable_streaming = enabled;
        self
    }

    pub fn with_stream_cache_mb(mut self, mb: usize) -> Self {
        self.stream_cache_mb = mb;
        self
    }

    pub fn with_preload_samples(mut self, enabled: bool) -> Self {
        self.preload_samples = enabled;
        self
    }

    pub fn with_num_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers;
        self
    }

    pub fn with_interpolation_quality(mut self, quality: InterpolationQuality) -> Self {
        self.interpolation_quality = quality;
        self
    }

    pub fn with_oversampling_factor(mut self, factor: u32) -> Self {
        self.oversampling_factor = factor;
        self
    }

    pub fn with_chunk_size_samples(mut self, samples: usize) -> Self {
        self.chunk_size_samples = samples;
        self
    }

    /// Check every range constraint
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size)
            || !self.block_size.is_power_of_two()
        {
            return Err(ConfigError::BlockSize(self.block_size));
        }
        if self.max_voices == 0 {
            return Err(ConfigError::MaxVoices);
        }
        if self.num_workers == 0 {
            return Err(ConfigError::NumWorkers);
        }
        if !OVERSAMPLING_FACTORS.contains(&self.oversampling_factor) {
            return Err(ConfigError::Oversampling(self.oversampling_factor));
        }
        if self.chunk_size_samples == 0 {
            return Err(ConfigError::ChunkSize);
        }
        Ok(())
    }

    /// Nominal callback period in seconds
    pub fn block_duration_secs(&self) -> f64 {
        self.block_size as f64 / self.sample_rate as f64
    }

    /// Block latency in milliseconds, excluding any host latency
    pub fn block_latency_ms(&self) -> f64 {
        self.block_duration_secs() * 1000.0
    }

    pub fn stream_cache_bytes(&self) -> usize {
        self.stream_cache_mb * 1024 * 1024
    }

    pub fn accelerator_memory_budget_bytes(&self) -> usize {
        self.accelerator_memory_budget_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_sample_rate_bounds() {
        assert_eq!(
            EngineConfig::new().with_sample_rate(8_000).validate(),
            Err(ConfigError::SampleRate(8_000))
        );
        assert!(EngineConfig::new().with_sample_rate(22_050).validate().is_ok());
        assert!(EngineConfig::new().with_sample_rate(192_000).validate().is_ok());
        assert!(EngineConfig::new().with_sample_rate(192_001).validate().is_err());
    }

    #[test]
    fn test_block_size_must_be_power_of_two_in_range() {
        for bad in [0, 32, 100, 8192] {
            assert_eq!(
                EngineConfig::new().with_block_size(bad).validate(),
                Err(ConfigError::BlockSize(bad))
            );
        }
        for good in [64, 256, 4096] {
            assert!(EngineConfig::new().with_block_size(good).validate().is_ok());
        }
    }

    #[test]
    fn test_counts_and_oversampling() {
        assert_eq!(
            EngineConfig::new().with_max_voices(0).validate(),
            Err(ConfigError::MaxVoices)
        );
        assert_eq!(
            EngineConfig::new().with_num_workers(0).validate(),
            Err(ConfigError::NumWorkers)
        );
        assert_eq!(
            EngineConfig::new().with_oversampling_factor(3).validate(),
            Err(ConfigError::Oversampling(3))
        );
        assert!(EngineConfig::new().with_oversampling_factor(8).validate().is_ok());
    }

    #[test]
    fn test_block_latency() {
        let config = EngineConfig::new().with_block_size(256).with_sample_rate(44_100);
        assert!((config.block_latency_ms() - 5.805).abs() < 0.001);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "sample_rate: 48000\ninterpolation_quality: sinc\n";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.interpolation_quality, InterpolationQuality::Sinc);
        assert_eq!(config.block_size, 256);
        assert_eq!(config.chunk_size_samples, DEFAULT_CHUNK_SIZE_SAMPLES);
    }
}
