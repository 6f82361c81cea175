//! Native accelerator modules loaded with libloading

use super::abi::{self, *};
use super::error::{AcceleratorError, AcceleratorResult};
use super::{DspKernels, SoftwareKernels};
use crate::dsp::{resample, Blend, Boundary, InterpolationQuality};
use libloading::Library;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Loader for accelerator modules
pub struct AcceleratorBridge;

impl AcceleratorBridge {
    /// Load a module, or `None` if anything goes wrong
    ///
    /// Failures are logged at warn level; callers fall back to software.
    pub fn load(path: impl AsRef<Path>, memory_budget_bytes: usize) -> Option<AcceleratorHandle> {
        let path = path.as_ref();
        match Self::try_load(path, memory_budget_bytes) {
            Ok(handle) => {
                log::info!(
                    "Loaded accelerator module {:?} ({} bytes of module memory, budget {} bytes)",
                    path,
                    handle.memory_region().1,
                    memory_budget_bytes
                );
                Some(handle)
            }
            Err(e) => {
                log::warn!("{}; using software kernels", e);
                None
            }
        }
    }

    /// Load a module and report why it failed
    pub fn try_load(path: &Path, memory_budget_bytes: usize) -> AcceleratorResult<AcceleratorHandle> {
        // Safety: loading runs the library's initializers; the module is
        // trusted configuration, same as any other plugin path.
        let library = unsafe { Library::new(path) }.map_err(|e| AcceleratorError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let abi_version: AbiVersionFn = required(&library, path, SYM_ABI_VERSION)?;
        // Safety: symbol type matches the ABI definition
        let found = unsafe { abi_version() };
        if found != abi::ABI_VERSION {
            return Err(AcceleratorError::AbiMismatch {
                path: path.to_path_buf(),
                found,
                expected: abi::ABI_VERSION,
            });
        }

        let kernels = ModuleKernels {
            memory_base: required(&library, path, SYM_MEMORY_BASE)?,
            memory_size: required(&library, path, SYM_MEMORY_SIZE)?,
            malloc: required(&library, path, SYM_MALLOC)?,
            free: required(&library, path, SYM_FREE)?,
            mul_add: required(&library, path, SYM_MUL_ADD)?,
            mix: required(&library, path, SYM_MIX)?,
            mix_buffer: required(&library, path, SYM_MIX_BUFFER)?,
            apply_gain: required(&library, path, SYM_APPLY_GAIN)?,
            interp_linear: required(&library, path, SYM_INTERP_LINEAR)?,
            interp_cubic: required(&library, path, SYM_INTERP_CUBIC)?,
            interp_sinc: required(&library, path, SYM_INTERP_SINC)?,
        };

        let synthesis = SynthesisPrimitives {
            probe_simd: optional(&library, SYM_PROBE_SIMD),
            oscillator_process: optional(&library, SYM_OSCILLATOR_PROCESS),
            wavetable_init: optional(&library, SYM_WAVETABLE_INIT),
            wavetable_process: optional(&library, SYM_WAVETABLE_PROCESS),
            filter_init: optional(&library, SYM_FILTER_INIT),
            filter_process: optional(&library, SYM_FILTER_PROCESS),
            filter_set_params: optional(&library, SYM_FILTER_SET_PARAMS),
            envelope_init: optional(&library, SYM_ENVELOPE_INIT),
            envelope_process: optional(&library, SYM_ENVELOPE_PROCESS),
            envelope_trigger: optional(&library, SYM_ENVELOPE_TRIGGER),
            envelope_release: optional(&library, SYM_ENVELOPE_RELEASE),
        };

        Ok(AcceleratorHandle {
            module: Arc::new(NativeModule {
                path: path.to_path_buf(),
                kernels,
                synthesis,
                budget: MemoryBudget::new(memory_budget_bytes),
                _library: library,
            }),
            software: SoftwareKernels::scalar(),
        })
    }
}

fn required<T: Copy + 'static>(
    library: &Library,
    path: &Path,
    symbol: &'static str,
) -> AcceleratorResult<T> {
    // Safety: `T` is the fn pointer type declared for `symbol` in `abi`
    unsafe { library.get::<T>(symbol.as_bytes()) }
        .map(|s| *s)
        .map_err(|_| AcceleratorError::MissingSymbol {
            path: path.to_path_buf(),
            symbol,
        })
}

fn optional<T: Copy + 'static>(library: &Library, symbol: &'static str) -> Option<T> {
    // Safety: as in `required`
    unsafe { library.get::<T>(symbol.as_bytes()) }.ok().map(|s| *s)
}

#[derive(Clone, Copy)]
struct ModuleKernels {
    memory_base: MemoryBaseFn,
    memory_size: MemorySizeFn,
    malloc: MallocFn,
    free: FreeFn,
    mul_add: MulAddFn,
    mix: MixFn,
    mix_buffer: MixBufferFn,
    apply_gain: ApplyGainFn,
    interp_linear: InterpFn,
    interp_cubic: InterpFn,
    interp_sinc: InterpSincFn,
}

/// Optional exports of a module
#[derive(Clone, Copy, Default)]
pub struct SynthesisPrimitives {
    probe_simd: Option<ProbeSimdFn>,
    oscillator_process: Option<OscillatorProcessFn>,
    wavetable_init: Option<WavetableInitFn>,
    wavetable_process: Option<WavetableProcessFn>,
    filter_init: Option<FilterInitFn>,
    filter_process: Option<FilterProcessFn>,
    filter_set_params: Option<FilterSetParamsFn>,
    envelope_init: Option<EnvelopeInitFn>,
    envelope_process: Option<EnvelopeProcessFn>,
    envelope_trigger: Option<EnvelopeGateFn>,
    envelope_release: Option<EnvelopeGateFn>,
}

impl SynthesisPrimitives {
    /// Names of the optional exports present
    pub fn exported(&self) -> Vec<&'static str> {
        let table: [(&'static str, bool); 11] = [
            (SYM_PROBE_SIMD, self.probe_simd.is_some()),
            (SYM_OSCILLATOR_PROCESS, self.oscillator_process.is_some()),
            (SYM_WAVETABLE_INIT, self.wavetable_init.is_some()),
            (SYM_WAVETABLE_PROCESS, self.wavetable_process.is_some()),
            (SYM_FILTER_INIT, self.filter_init.is_some()),
            (SYM_FILTER_PROCESS, self.filter_process.is_some()),
            (SYM_FILTER_SET_PARAMS, self.filter_set_params.is_some()),
            (SYM_ENVELOPE_INIT, self.envelope_init.is_some()),
            (SYM_ENVELOPE_PROCESS, self.envelope_process.is_some()),
            (SYM_ENVELOPE_TRIGGER, self.envelope_trigger.is_some()),
            (SYM_ENVELOPE_RELEASE, self.envelope_release.is_some()),
        ];
        table
            .iter()
            .filter(|(_, present)| *present)
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Byte budget shared by all allocations of one module
#[derive(Debug)]
pub(crate) struct MemoryBudget {
    limit: usize,
    in_use: AtomicUsize,
}

impl MemoryBudget {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            in_use: AtomicUsize::new(0),
        }
    }

    pub(crate) fn reserve(&self, bytes: usize) -> AcceleratorResult<()> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current
                    .checked_add(bytes)
                    .filter(|&total| total <= self.limit)
            })
            .map(|_| ())
            .map_err(|current| AcceleratorError::BudgetExceeded {
                requested: bytes,
                in_use: current,
                budget: self.limit,
            })
    }

    pub(crate) fn release(&self, bytes: usize) {
        self.in_use.fetch_sub(bytes, Ordering::AcqRel);
    }

    pub(crate) fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }
}

struct NativeModule {
    path: PathBuf,
    kernels: ModuleKernels,
    synthesis: SynthesisPrimitives,
    budget: MemoryBudget,
    // Keeps every resolved fn pointer valid; dropped last
    _library: Library,
}

/// A loaded accelerator module
///
/// Cheap to clone; the library stays loaded while any handle or
/// [`ModuleBuffer`] is alive.
#[derive(Clone)]
pub struct AcceleratorHandle {
    module: Arc<NativeModule>,
    software: SoftwareKernels,
}

impl std::fmt::Debug for AcceleratorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceleratorHandle")
            .field("path", &self.module.path)
            .field("budget", &self.module.budget)
            .finish()
    }
}

impl AcceleratorHandle {
    pub fn path(&self) -> &Path {
        &self.module.path
    }

    /// `(base pointer, size in bytes)` of the module's flat memory
    pub fn memory_region(&self) -> (*mut u8, usize) {
        // Safety: ABI functions without arguments
        unsafe {
            (
                (self.module.kernels.memory_base)(),
                (self.module.kernels.memory_size)(),
            )
        }
    }

    pub fn memory_in_use(&self) -> usize {
        self.module.budget.in_use()
    }

    pub fn memory_budget(&self) -> usize {
        self.module.budget.limit()
    }

    /// Allocate `len` samples inside the module's memory
    pub fn alloc(&self, len: usize) -> AcceleratorResult<ModuleBuffer> {
        let bytes = len.max(1) * std::mem::size_of::<f32>();
        self.module.budget.reserve(bytes)?;

        // Safety: ABI allocator; null signals failure
        let raw = unsafe { (self.module.kernels.malloc)(bytes) };
        let Some(ptr) = NonNull::new(raw as *mut f32) else {
            self.module.budget.release(bytes);
            return Err(AcceleratorError::OutOfMemory { requested: bytes });
        };

        // Safety: freshly allocated region of `bytes` bytes
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, len) };

        Ok(ModuleBuffer {
            module: Arc::clone(&self.module),
            ptr,
            len,
            bytes,
        })
    }

    /// Module-side vector probe, if exported
    pub fn probe_simd(&self) -> Option<bool> {
        // Safety: ABI function without arguments
        self.module.synthesis.probe_simd.map(|f| unsafe { f() } != 0)
    }

    pub fn synthesis(&self) -> &SynthesisPrimitives {
        &self.module.synthesis
    }

    /// Render a basic oscillator; `None` if the module lacks one
    pub fn oscillator_process(
        &self,
        out: &mut [f32],
        frequency: f32,
        sample_rate: f32,
        waveform: u32,
        phase: &mut f64,
    ) -> Option<()> {
        let f = self.module.synthesis.oscillator_process?;
        // Safety: pointer/length from a live slice
        unsafe { f(out.as_mut_ptr(), out.len(), frequency, sample_rate, waveform, phase) };
        Some(())
    }

    pub fn wavetable_init(&self, table: &[f32]) -> Option<u32> {
        let f = self.module.synthesis.wavetable_init?;
        // Safety: pointer/length from a live slice; module copies the table
        let handle = unsafe { f(table.as_ptr(), table.len()) };
        (handle != 0).then_some(handle)
    }

    pub fn wavetable_process(
        &self,
        handle: u32,
        out: &mut [f32],
        frequency: f32,
        sample_rate: f32,
        phase: &mut f64,
    ) -> Option<()> {
        let f = self.module.synthesis.wavetable_process?;
        // Safety: pointer/length from a live slice
        unsafe { f(handle, out.as_mut_ptr(), out.len(), frequency, sample_rate, phase) };
        Some(())
    }

    pub fn filter_init(&self, kind: u32, sample_rate: f32) -> Option<u32> {
        let f = self.module.synthesis.filter_init?;
        // Safety: scalar arguments only
        let handle = unsafe { f(kind, sample_rate) };
        (handle != 0).then_some(handle)
    }

    pub fn filter_process(&self, handle: u32, buf: &mut [f32]) -> Option<()> {
        let f = self.module.synthesis.filter_process?;
        // Safety: pointer/length from a live slice
        unsafe { f(handle, buf.as_mut_ptr(), buf.len()) };
        Some(())
    }

    pub fn filter_set_params(&self, handle: u32, cutoff: f32, resonance: f32) -> Option<()> {
        let f = self.module.synthesis.filter_set_params?;
        // Safety: scalar arguments only
        unsafe { f(handle, cutoff, resonance) };
        Some(())
    }

    pub fn envelope_init(
        &self,
        attack: f32,
        decay: f32,
        sustain: f32,
        release: f32,
        sample_rate: f32,
    ) -> Option<u32> {
        let f = self.module.synthesis.envelope_init?;
        // Safety: scalar arguments only
        let handle = unsafe { f(attack, decay, sustain, release, sample_rate) };
        (handle != 0).then_some(handle)
    }

    pub fn envelope_process(&self, handle: u32, out: &mut [f32]) -> Option<()> {
        let f = self.module.synthesis.envelope_process?;
        // Safety: pointer/length from a live slice
        unsafe { f(handle, out.as_mut_ptr(), out.len()) };
        Some(())
    }

    pub fn envelope_trigger(&self, handle: u32) -> Option<()> {
        let f = self.module.synthesis.envelope_trigger?;
        // Safety: scalar argument only
        unsafe { f(handle) };
        Some(())
    }

    pub fn envelope_release(&self, handle: u32) -> Option<()> {
        let f = self.module.synthesis.envelope_release?;
        // Safety: scalar argument only
        unsafe { f(handle) };
        Some(())
    }
}

impl DspKernels for AcceleratorHandle {
    fn name(&self) -> &'static str {
        "native"
    }

    fn mul_add(&self, a: &[f32], b: &[f32], c: &[f32], out: &mut [f32], length: usize) {
        let n = length.min(a.len()).min(b.len()).min(c.len()).min(out.len());
        // Safety: every pointer covers at least `n` elements
        unsafe {
            (self.module.kernels.mul_add)(a.as_ptr(), b.as_ptr(), c.as_ptr(), out.as_mut_ptr(), n)
        };
    }

    fn mix(&self, a: &[f32], b: &[f32], blend: Blend<'_>, out: &mut [f32], length: usize) {
        let n = length.min(a.len()).min(b.len()).min(out.len());
        match blend {
            Blend::Scalar(m) => {
                // Safety: every pointer covers at least `n` elements
                unsafe { (self.module.kernels.mix)(a.as_ptr(), b.as_ptr(), m, out.as_mut_ptr(), n) };
            }
            Blend::PerSample(m) => {
                let n = n.min(m.len());
                // Safety: every pointer covers at least `n` elements
                unsafe {
                    (self.module.kernels.mix_buffer)(
                        a.as_ptr(),
                        b.as_ptr(),
                        m.as_ptr(),
                        out.as_mut_ptr(),
                        n,
                    )
                };
            }
        }
    }

    fn apply_gain(&self, buf: &mut [f32], length: usize, gain: f32) {
        let n = length.min(buf.len());
        // Safety: pointer covers at least `n` elements
        unsafe { (self.module.kernels.apply_gain)(buf.as_mut_ptr(), n, gain) };
    }

    fn accumulate(&self, src: &[f32], dst: &mut [f32], length: usize, gain: f32) {
        self.software.accumulate(src, dst, length, gain);
    }

    fn soft_clip(&self, buf: &mut [f32], length: usize) {
        self.software.soft_clip(buf, length);
    }

    fn interpolate(
        &self,
        quality: InterpolationQuality,
        buffer: &[f32],
        phase: f64,
        boundary: Boundary,
    ) -> f32 {
        // The module only knows modulo indexing
        if boundary != Boundary::Wrap || buffer.is_empty() {
            return self.software.interpolate(quality, buffer, phase, boundary);
        }
        let (ptr, len) = (buffer.as_ptr(), buffer.len());
        // Safety: pointer/length from a live, non-empty slice
        unsafe {
            match quality {
                InterpolationQuality::None => resample::nearest(buffer, phase),
                InterpolationQuality::Linear => (self.module.kernels.interp_linear)(ptr, len, phase),
                InterpolationQuality::Cubic => (self.module.kernels.interp_cubic)(ptr, len, phase),
                InterpolationQuality::Sinc => (self.module.kernels.interp_sinc)(
                    ptr,
                    len,
                    phase,
                    resample::DEFAULT_SINC_WINDOW,
                ),
            }
        }
    }

    fn is_accelerated(&self) -> bool {
        true
    }
}

/// Samples allocated inside a module's memory, freed on drop
pub struct ModuleBuffer {
    module: Arc<NativeModule>,
    ptr: NonNull<f32>,
    len: usize,
    bytes: usize,
}

// Safety: the buffer is uniquely owned; the module allocator is thread-safe
// per the ABI contract.
unsafe impl Send for ModuleBuffer {}

impl ModuleBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[f32] {
        // Safety: `ptr` is valid for `len` initialized samples while we live
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        // Safety: as above, and `&mut self` guarantees uniqueness
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for ModuleBuffer {
    fn drop(&mut self) {
        // Safety: pointer came from this module's `sonance_malloc`
        unsafe { (self.module.kernels.free)(self.ptr.as_ptr() as *mut u8) };
        self.module.budget.release(self.bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_rejects_overflow() {
        let budget = MemoryBudget::new(1024);
        assert!(budget.reserve(512).is_ok());
        assert!(budget.reserve(512).is_ok());
        match budget.reserve(1) {
            Err(AcceleratorError::BudgetExceeded {
                requested,
                in_use,
                budget,
            }) => {
                assert_eq!(requested, 1);
                assert_eq!(in_use, 1024);
                assert_eq!(budget, 1024);
            }
            other => panic!("expected BudgetExceeded, got {:?}", other.err()),
        }
        budget.release(512);
        assert_eq!(budget.in_use(), 512);
        assert!(budget.reserve(256).is_ok());
    }

    #[test]
    fn test_try_load_reports_load_error() {
        match AcceleratorBridge::try_load(Path::new("/nonexistent/module.so"), 1024) {
            Err(AcceleratorError::Load { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/module.so"));
            }
            other => panic!("expected Load error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_no_optional_exports_by_default() {
        assert!(SynthesisPrimitives::default().exported().is_empty());
    }
}
