//! Sonance Accel - native accelerator module
//!
//! Built as a `cdylib` and loaded by the engine at run time through the C
//! ABI in [`sonance_core::accel::abi`]. Kernels run on the same vector code
//! as the engine's software path; the point of the module boundary is that
//! a platform build can swap in its own implementation without relinking
//! the engine.
//!
//! Handles and the memory region are process-wide: one loaded copy of the
//! library serves every engine that loads it.

mod memory;
mod synth;

use sonance_core::accel::abi::ABI_VERSION;
use sonance_core::dsp::{resample, vector};
use std::slice;
use std::sync::{Mutex, MutexGuard, OnceLock};
use synth::{Envelope, Filter, FilterKind, Slots, Waveform};

pub use memory::MEMORY_SIZE;

#[derive(Default)]
struct Objects {
    wavetables: Slots<Vec<f32>>,
    filters: Slots<Filter>,
    envelopes: Slots<Envelope>,
}

fn objects() -> MutexGuard<'static, Objects> {
    static OBJECTS: OnceLock<Mutex<Objects>> = OnceLock::new();
    OBJECTS
        .get_or_init(Mutex::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Borrow `len` samples, or an empty slice for null
///
/// # Safety
/// A non-null `ptr` must be valid for `len` reads.
unsafe fn input<'a>(ptr: *const f32, len: usize) -> &'a [f32] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(ptr, len)
    }
}

/// # Safety
/// A non-null `ptr` must be valid for `len` writes and not aliased.
unsafe fn output<'a>(ptr: *mut f32, len: usize) -> &'a mut [f32] {
    if ptr.is_null() || len == 0 {
        &mut []
    } else {
        slice::from_raw_parts_mut(ptr, len)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Module identity and memory
// ─────────────────────────────────────────────────────────────────────────

#[no_mangle]
pub extern "C" fn sonance_abi_version() -> u32 {
    ABI_VERSION
}

#[no_mangle]
pub extern "C" fn sonance_memory_base() -> *mut u8 {
    memory::region().base()
}

#[no_mangle]
pub extern "C" fn sonance_memory_size() -> usize {
    MEMORY_SIZE
}

#[no_mangle]
pub extern "C" fn sonance_malloc(size: usize) -> *mut u8 {
    memory::region().malloc(size)
}

/// # Safety
/// `ptr` must come from `sonance_malloc` and not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn sonance_free(ptr: *mut u8) {
    memory::region().free(ptr);
}

// ─────────────────────────────────────────────────────────────────────────
// Kernels
// ─────────────────────────────────────────────────────────────────────────

/// # Safety
/// Every pointer must cover `len` samples; `out` may alias an input.
#[no_mangle]
pub unsafe extern "C" fn sonance_mul_add(a: *const f32, b: *const f32, c: *const f32, out: *mut f32, len: usize) {
    for i in 0..len {
        *out.add(i) = *a.add(i) * *b.add(i) + *c.add(i);
    }
}

/// # Safety
/// Every pointer must cover `len` samples; `out` may alias an input.
#[no_mangle]
pub unsafe extern "C" fn sonance_mix(a: *const f32, b: *const f32, mix: f32, out: *mut f32, len: usize) {
    for i in 0..len {
        let (x, y) = (*a.add(i), *b.add(i));
        *out.add(i) = x * (1.0 - mix) + y * mix;
    }
}

/// # Safety
/// Every pointer must cover `len` samples; `out` may alias an input.
#[no_mangle]
pub unsafe extern "C" fn sonance_mix_buffer(
    a: *const f32,
    b: *const f32,
    mix: *const f32,
    out: *mut f32,
    len: usize,
) {
    for i in 0..len {
        let (x, y) = (*a.add(i), *b.add(i));
        let m = *mix.add(i);
        *out.add(i) = x * (1.0 - m) + y * m;
    }
}

/// # Safety
/// `buf` must cover `len` samples.
#[no_mangle]
pub unsafe extern "C" fn sonance_apply_gain(buf: *mut f32, len: usize, gain: f32) {
    vector::apply_gain(output(buf, len), len, gain);
}

/// # Safety
/// `buf` must cover `len` samples.
#[no_mangle]
pub unsafe extern "C" fn sonance_interp_linear(buf: *const f32, len: usize, phase: f64) -> f32 {
    resample::linear(input(buf, len), phase)
}

/// # Safety
/// `buf` must cover `len` samples.
#[no_mangle]
pub unsafe extern "C" fn sonance_interp_cubic(buf: *const f32, len: usize, phase: f64) -> f32 {
    resample::cubic(input(buf, len), phase)
}

/// # Safety
/// `buf` must cover `len` samples.
#[no_mangle]
pub unsafe extern "C" fn sonance_interp_sinc(buf: *const f32, len: usize, phase: f64, window: usize) -> f32 {
    resample::sinc(input(buf, len), phase, window)
}

#[no_mangle]
pub extern "C" fn sonance_probe_simd() -> i32 {
    sonance_core::accel::probe().vector_instructions_available as i32
}

// ─────────────────────────────────────────────────────────────────────────
// Synthesis
// ─────────────────────────────────────────────────────────────────────────

/// # Safety
/// `out` must cover `len` samples; `phase` must be valid or null.
#[no_mangle]
pub unsafe extern "C" fn sonance_oscillator_process(
    out: *mut f32,
    len: usize,
    frequency: f32,
    sample_rate: f32,
    waveform: u32,
    phase: *mut f64,
) {
    let mut local = 0.0;
    let phase = phase.as_mut().unwrap_or(&mut local);
    synth::oscillator(output(out, len), frequency, sample_rate, Waveform::from_raw(waveform), phase);
}

/// Copy `table` into the module; returns a handle or 0
///
/// # Safety
/// `table` must cover `len` samples.
#[no_mangle]
pub unsafe extern "C" fn sonance_wavetable_init(table: *const f32, len: usize) -> u32 {
    let table = input(table, len);
    if table.is_empty() {
        return 0;
    }
    objects().wavetables.insert(table.to_vec())
}

/// # Safety
/// `out` must cover `len` samples; `phase` must be valid or null.
#[no_mangle]
pub unsafe extern "C" fn sonance_wavetable_process(
    handle: u32,
    out: *mut f32,
    len: usize,
    frequency: f32,
    sample_rate: f32,
    phase: *mut f64,
) {
    let out = output(out, len);
    let mut local = 0.0;
    let phase = phase.as_mut().unwrap_or(&mut local);
    match objects().wavetables.get_mut(handle) {
        Some(table) => synth::wavetable(table, out, frequency, sample_rate, phase),
        None => vector::clear(out, len),
    }
}

#[no_mangle]
pub extern "C" fn sonance_filter_init(kind: u32, sample_rate: f32) -> u32 {
    objects()
        .filters
        .insert(Filter::new(FilterKind::from_raw(kind), sample_rate))
}

/// # Safety
/// `buf` must cover `len` samples.
#[no_mangle]
pub unsafe extern "C" fn sonance_filter_process(handle: u32, buf: *mut f32, len: usize) {
    if let Some(filter) = objects().filters.get_mut(handle) {
        filter.process(output(buf, len));
    }
}

#[no_mangle]
pub extern "C" fn sonance_filter_set_params(handle: u32, cutoff: f32, resonance: f32) {
    if let Some(filter) = objects().filters.get_mut(handle) {
        filter.set_params(cutoff, resonance);
    }
}

#[no_mangle]
pub extern "C" fn sonance_envelope_init(attack: f32, decay: f32, sustain: f32, release: f32, sample_rate: f32) -> u32 {
    objects()
        .envelopes
        .insert(Envelope::new(attack, decay, sustain, release, sample_rate))
}

/// # Safety
/// `out` must cover `len` samples.
#[no_mangle]
pub unsafe extern "C" fn sonance_envelope_process(handle: u32, out: *mut f32, len: usize) {
    let out = output(out, len);
    match objects().envelopes.get_mut(handle) {
        Some(envelope) => envelope.process(out),
        None => vector::clear(out, len),
    }
}

#[no_mangle]
pub extern "C" fn sonance_envelope_trigger(handle: u32) {
    if let Some(envelope) = objects().envelopes.get_mut(handle) {
        envelope.trigger();
    }
}

#[no_mangle]
pub extern "C" fn sonance_envelope_release(handle: u32) {
    if let Some(envelope) = objects().envelopes.get_mut(handle) {
        envelope.release();
    }
}
