//! Error types for native accelerator modules

use std::path::PathBuf;
use thiserror::Error;

/// Errors while loading or using an accelerator module
///
/// None of these are fatal to the engine: a failed load degrades to the
/// software kernels.
#[derive(Debug, Error)]
pub enum AcceleratorError {
    /// The shared library could not be opened
    #[error("Failed to load accelerator module '{path}': {reason}")]
    Load { path: PathBuf, reason: String },

    /// A required export is missing
    #[error("Accelerator module '{path}' does not export '{symbol}'")]
    MissingSymbol { path: PathBuf, symbol: &'static str },

    /// The module was built against a different ABI revision
    #[error("Accelerator module '{path}' has ABI version {found}, expected {expected}")]
    AbiMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    /// Allocation would exceed the configured memory budget
    #[error("Accelerator allocation of {requested} bytes exceeds budget ({in_use} of {budget} bytes in use)")]
    BudgetExceeded {
        requested: usize,
        in_use: usize,
        budget: usize,
    },

    /// The module's allocator returned null
    #[error("Accelerator module could not allocate {requested} bytes")]
    OutOfMemory { requested: usize },
}

pub type AcceleratorResult<T> = Result<T, AcceleratorError>;
