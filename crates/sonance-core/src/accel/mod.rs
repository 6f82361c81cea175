//! Kernel selection: software default or a native accelerator module
//!
//! The engine renders through a [`DspKernels`] trait object chosen once in
//! `Engine::initialize()`:
//!
//! - [`SoftwareKernels`]: always available, built on [`crate::dsp`], with
//!   explicit vector paths when the CPU probe passes
//! - [`AcceleratorHandle`]: a shared library implementing the C ABI in
//!   [`abi`], loaded best-effort through [`AcceleratorBridge::load`]
//!
//! Loading never fails the engine. Any problem is logged and the software
//! kernels are used instead.

pub mod abi;
mod error;
mod native;
mod simd;

pub use error::{AcceleratorError, AcceleratorResult};
pub use native::{AcceleratorBridge, AcceleratorHandle, ModuleBuffer, SynthesisPrimitives};

use crate::dsp::{self, vector, Blend, Boundary, InterpolationQuality};
use serde::Serialize;

/// What the running platform offers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Native modules can be loaded on this platform
    pub acceleration_available: bool,
    /// The CPU passed the vector feature probe and known-answer test
    pub vector_instructions_available: bool,
}

/// Probe the platform
pub fn probe() -> Capabilities {
    let capabilities = Capabilities {
        acceleration_available: cfg!(any(unix, windows)),
        vector_instructions_available: simd::probe(),
    };
    log::debug!("Platform capabilities: {:?}", capabilities);
    capabilities
}

/// DSP kernels used by the render context
///
/// Implementations must be real-time safe: no allocation, no locks, no I/O.
pub trait DspKernels: Send {
    /// Short name for logs and metrics
    fn name(&self) -> &'static str;

    fn mul_add(&self, a: &[f32], b: &[f32], c: &[f32], out: &mut [f32], length: usize);

    fn mix(&self, a: &[f32], b: &[f32], blend: Blend<'_>, out: &mut [f32], length: usize);

    fn apply_gain(&self, buf: &mut [f32], length: usize, gain: f32);

    fn accumulate(&self, src: &[f32], dst: &mut [f32], length: usize, gain: f32);

    fn soft_clip(&self, buf: &mut [f32], length: usize);

    fn interpolate(
        &self,
        quality: InterpolationQuality,
        buffer: &[f32],
        phase: f64,
        boundary: Boundary,
    ) -> f32;

    /// True when the kernels run on a native module
    fn is_accelerated(&self) -> bool {
        false
    }
}

/// Pure-software kernels
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareKernels {
    vectorized: bool,
}

impl SoftwareKernels {
    /// Portable kernels only
    pub fn scalar() -> Self {
        Self { vectorized: false }
    }

    /// Use explicit vector paths if `vector_instructions_available`
    pub fn for_capabilities(capabilities: &Capabilities) -> Self {
        Self {
            vectorized: capabilities.vector_instructions_available,
        }
    }

    pub fn is_vectorized(&self) -> bool {
        self.vectorized
    }
}

impl DspKernels for SoftwareKernels {
    fn name(&self) -> &'static str {
        if self.vectorized {
            "software-simd"
        } else {
            "software"
        }
    }

    fn mul_add(&self, a: &[f32], b: &[f32], c: &[f32], out: &mut [f32], length: usize) {
        if self.vectorized {
            simd::mul_add(a, b, c, out, length);
        } else {
            vector::mul_add(a, b, c, out, length);
        }
    }

    fn mix(&self, a: &[f32], b: &[f32], blend: Blend<'_>, out: &mut [f32], length: usize) {
        vector::mix(a, b, blend, out, length);
    }

    fn apply_gain(&self, buf: &mut [f32], length: usize, gain: f32) {
        if self.vectorized {
            simd::apply_gain(buf, length, gain);
        } else {
            vector::apply_gain(buf, length, gain);
        }
    }

    fn accumulate(&self, src: &[f32], dst: &mut [f32], length: usize, gain: f32) {
        if self.vectorized {
            simd::accumulate(src, dst, length, gain);
        } else {
            vector::accumulate(src, dst, length, gain);
        }
    }

    fn soft_clip(&self, buf: &mut [f32], length: usize) {
        vector::soft_clip(buf, length);
    }

    fn interpolate(
        &self,
        quality: InterpolationQuality,
        buffer: &[f32],
        phase: f64,
        boundary: Boundary,
    ) -> f32 {
        dsp::interpolate(quality, buffer, phase, boundary)
    }
}
