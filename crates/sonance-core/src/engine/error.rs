//! Engine errors

use super::EngineState;
use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::host::HostError;
use thiserror::Error;

/// Errors surfaced by [`Engine`](super::Engine) operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration failed validation in `initialize()`
    #[error("Invalid engine configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// Operation not allowed in the current state
    #[error("Cannot {operation} while engine is {state:?}")]
    Lifecycle {
        operation: &'static str,
        state: EngineState,
    },

    /// The engine has been disposed
    #[error("Engine has been disposed")]
    Disposed,

    /// The render message queue is full
    #[error("Render message queue is full")]
    QueueFull,

    /// Streaming operations are disabled in the configuration
    #[error("Streaming is disabled in the engine configuration")]
    StreamingDisabled,

    /// No parameter slot left for a new custom parameter name
    #[error("Cannot register parameter '{name}': all {max} slots are in use")]
    TooManyParameters { name: String, max: usize },

    /// All sample zone slots are in use
    #[error("Cannot add sample zone: all {max} zones are in use")]
    TooManyZones { max: usize },

    /// The zone is not streamed or the chunk lies past its end
    #[error("Zone {zone} has no streamed chunk {index}")]
    NoSuchChunk { zone: usize, index: usize },

    /// A streaming request failed
    #[error("Sample cache error: {0}")]
    Cache(#[from] CacheError),

    /// The render host failed
    #[error("Render host error: {0}")]
    Host(#[from] HostError),
}

pub type EngineResult<T> = Result<T, EngineError>;
