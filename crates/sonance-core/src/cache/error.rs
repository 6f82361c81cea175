//! Sample cache errors

use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by storage loaders
pub type LoaderError = Box<dyn Error + Send + Sync>;

/// A failed chunk request
///
/// `Clone` so one loader failure can be handed to every coalesced awaiter.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The storage loader returned an error
    #[error("Storage loader failed: {0}")]
    Storage(Arc<dyn Error + Send + Sync>),

    /// The in-flight load vanished before publishing a result
    #[error("Chunk load was aborted before completing")]
    Aborted,

    /// The cache was shut down while the load was queued
    #[error("Sample cache is shut down")]
    Shutdown,
}

impl CacheError {
    pub(crate) fn storage(err: LoaderError) -> Self {
        Self::Storage(Arc::from(err))
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
