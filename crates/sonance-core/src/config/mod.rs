//! Configuration for the engine and its tools
//!
//! - [`EngineConfig`]: validated engine settings with `with_*` builders
//! - Generic YAML loading/saving
//! - Default file locations
//!
//! ```ignore
//! use sonance_core::config::{default_config_path, load_config, EngineConfig};
//!
//! let config: EngineConfig = load_config(&default_config_path("engine.yaml"));
//! config.validate()?;
//! ```

mod engine;
mod io;
mod paths;

pub use engine::{
    ConfigError, EngineConfig, InterpolationQuality, DEFAULT_CHUNK_SIZE_SAMPLES, MAX_SAMPLE_RATE,
    MIN_BLOCK_SIZE, MIN_SAMPLE_RATE, OVERSAMPLING_FACTORS,
};
pub use io::{load_config, save_config, try_load_config};
pub use paths::{default_config_dir, default_config_path, default_module_dir};
