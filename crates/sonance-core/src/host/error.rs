//! Render host errors

use thiserror::Error;

/// Errors from installing or driving a render routine
#[derive(Debug, Error)]
pub enum HostError {
    /// A routine is already installed
    #[error("A render routine is already installed")]
    AlreadyInstalled,

    /// The operation needs an installed routine
    #[error("No render routine is installed")]
    NotInstalled,

    /// Failed to spawn a render or collector thread
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),

    /// The render thread panicked or went away
    #[error("Render thread terminated unexpectedly")]
    ThreadTerminated,

    /// No usable output device
    #[error("Audio device error: {0}")]
    Device(String),

    /// Failed to build the output stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    /// Failed to start or pause the output stream
    #[error("Audio stream control failed: {0}")]
    StreamControl(String),
}

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;
