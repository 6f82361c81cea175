//! Render hosts
//!
//! A host owns the thread (or device callback) that periodically calls
//! [`RenderContext::process`]. The engine installs its render routine into
//! a host once, then only resumes, suspends and finally detaches it.
//!
//! - [`ThreadHost`]: a dedicated render thread paced at the block period
//! - [`ManualHost`]: the caller pulls blocks (offline rendering, tests)
//! - `CpalHost`: a CPAL output stream (`cpal-backend` feature)

mod error;
mod manual;
mod thread;

#[cfg(feature = "cpal-backend")]
mod cpal;

pub use error::{HostError, HostResult};
pub use manual::ManualHost;
pub use thread::ThreadHost;

#[cfg(feature = "cpal-backend")]
pub use self::cpal::CpalHost;

use crate::engine::RenderContext;

/// Something that drives a render routine at the block period
pub trait RenderHost {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Take ownership of the routine; rendering stays suspended until
    /// [`resume`](Self::resume)
    fn install(&mut self, routine: RenderContext, block_size: usize, sample_rate: u32) -> HostResult<()>;

    /// Start (or continue) calling the routine
    fn resume(&mut self) -> HostResult<()>;

    /// Stop calling the routine without releasing it
    fn suspend(&mut self) -> HostResult<()>;

    /// Stop and hand the routine back
    ///
    /// `Ok(None)` when nothing is installed.
    fn detach(&mut self) -> HostResult<Option<RenderContext>>;

    /// Output latency added after the render routine, in milliseconds
    fn output_latency_ms(&self) -> f64 {
        0.0
    }
}
