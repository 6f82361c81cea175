//! C ABI exported by accelerator modules
//!
//! Every function uses the C calling convention and takes raw pointers plus
//! explicit lengths. Buffers are owned by the caller unless they were
//! obtained from `sonance_malloc`, in which case they live inside the
//! module's flat memory region (`sonance_memory_base` ..
//! `sonance_memory_base + sonance_memory_size`).
//!
//! Interpolation entry points index modulo `len` (wavetable semantics).
//!
//! Synthesis entry points identify their objects by a `u32` handle returned
//! from the matching `*_init`; `0` means the module could not create one.

/// Revision of this ABI; modules report theirs via `sonance_abi_version`
pub const ABI_VERSION: u32 = 1;

pub type AbiVersionFn = unsafe extern "C" fn() -> u32;
pub type MemoryBaseFn = unsafe extern "C" fn() -> *mut u8;
pub type MemorySizeFn = unsafe extern "C" fn() -> usize;
pub type MallocFn = unsafe extern "C" fn(size: usize) -> *mut u8;
pub type FreeFn = unsafe extern "C" fn(ptr: *mut u8);

pub type MulAddFn =
    unsafe extern "C" fn(a: *const f32, b: *const f32, c: *const f32, out: *mut f32, len: usize);
pub type MixFn =
    unsafe extern "C" fn(a: *const f32, b: *const f32, mix: f32, out: *mut f32, len: usize);
pub type MixBufferFn = unsafe extern "C" fn(
    a: *const f32,
    b: *const f32,
    mix: *const f32,
    out: *mut f32,
    len: usize,
);
pub type ApplyGainFn = unsafe extern "C" fn(buf: *mut f32, len: usize, gain: f32);
pub type InterpFn = unsafe extern "C" fn(buf: *const f32, len: usize, phase: f64) -> f32;
pub type InterpSincFn =
    unsafe extern "C" fn(buf: *const f32, len: usize, phase: f64, window: usize) -> f32;

pub type ProbeSimdFn = unsafe extern "C" fn() -> i32;

/// `waveform`: 0 sine, 1 saw, 2 square, 3 triangle
pub type OscillatorProcessFn = unsafe extern "C" fn(
    out: *mut f32,
    len: usize,
    frequency: f32,
    sample_rate: f32,
    waveform: u32,
    phase: *mut f64,
);
pub type WavetableInitFn = unsafe extern "C" fn(table: *const f32, len: usize) -> u32;
pub type WavetableProcessFn = unsafe extern "C" fn(
    handle: u32,
    out: *mut f32,
    len: usize,
    frequency: f32,
    sample_rate: f32,
    phase: *mut f64,
);
/// `kind`: 0 lowpass, 1 highpass, 2 bandpass
pub type FilterInitFn = unsafe extern "C" fn(kind: u32, sample_rate: f32) -> u32;
pub type FilterProcessFn = unsafe extern "C" fn(handle: u32, buf: *mut f32, len: usize);
pub type FilterSetParamsFn = unsafe extern "C" fn(handle: u32, cutoff: f32, resonance: f32);
pub type EnvelopeInitFn = unsafe extern "C" fn(
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,
    sample_rate: f32,
) -> u32;
pub type EnvelopeProcessFn = unsafe extern "C" fn(handle: u32, out: *mut f32, len: usize);
pub type EnvelopeGateFn = unsafe extern "C" fn(handle: u32);

pub const SYM_ABI_VERSION: &str = "sonance_abi_version";
pub const SYM_MEMORY_BASE: &str = "sonance_memory_base";
pub const SYM_MEMORY_SIZE: &str = "sonance_memory_size";
pub const SYM_MALLOC: &str = "sonance_malloc";
pub const SYM_FREE: &str = "sonance_free";
pub const SYM_MUL_ADD: &str = "sonance_mul_add";
pub const SYM_MIX: &str = "sonance_mix";
pub const SYM_MIX_BUFFER: &str = "sonance_mix_buffer";
pub const SYM_APPLY_GAIN: &str = "sonance_apply_gain";
pub const SYM_INTERP_LINEAR: &str = "sonance_interp_linear";
pub const SYM_INTERP_CUBIC: &str = "sonance_interp_cubic";
pub const SYM_INTERP_SINC: &str = "sonance_interp_sinc";

pub const SYM_PROBE_SIMD: &str = "sonance_probe_simd";
pub const SYM_OSCILLATOR_PROCESS: &str = "sonance_oscillator_process";
pub const SYM_WAVETABLE_INIT: &str = "sonance_wavetable_init";
pub const SYM_WAVETABLE_PROCESS: &str = "sonance_wavetable_process";
pub const SYM_FILTER_INIT: &str = "sonance_filter_init";
pub const SYM_FILTER_PROCESS: &str = "sonance_filter_process";
pub const SYM_FILTER_SET_PARAMS: &str = "sonance_filter_set_params";
pub const SYM_ENVELOPE_INIT: &str = "sonance_envelope_init";
pub const SYM_ENVELOPE_PROCESS: &str = "sonance_envelope_process";
pub const SYM_ENVELOPE_TRIGGER: &str = "sonance_envelope_trigger";
pub const SYM_ENVELOPE_RELEASE: &str = "sonance_envelope_release";
