//! Fractional-position interpolation
//!
//! Pure functions that read a mono buffer at a fractional phase. The plain
//! functions index modulo the buffer length (wavetable semantics); the
//! `*_bounded` variants take an explicit [`Boundary`] for one-shot sample
//! playback where reading past the edges must not wrap around.
//!
//! All functions return the exact stored sample at integer phases and 0.0
//! for an empty buffer or a non-finite phase.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Default tap count for [`sinc`]
pub const DEFAULT_SINC_WINDOW: usize = 16;

/// Interpolation quality used by voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationQuality {
    /// Nearest sample, no interpolation
    None,
    /// Linear interpolation (2-point)
    Linear,
    /// Cubic Catmull-Rom interpolation (4-point)
    #[default]
    Cubic,
    /// Windowed sinc (16-tap)
    Sinc,
}

impl InterpolationQuality {
    pub fn all() -> &'static [Self] {
        &[Self::None, Self::Linear, Self::Cubic, Self::Sinc]
    }
}

/// How reads outside `[0, len)` are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Boundary {
    /// Index modulo length (looping wavetables)
    #[default]
    Wrap,
    /// Repeat the first/last sample
    Clamp,
    /// Treat everything outside the buffer as silence (one-shot samples)
    Zero,
}

#[inline]
fn fetch(buffer: &[f32], index: i64, offset: i64, boundary: Boundary) -> f32 {
    let index = index.saturating_add(offset);
    let len = buffer.len() as i64;
    match boundary {
        Boundary::Wrap => buffer[index.rem_euclid(len) as usize],
        Boundary::Clamp => buffer[index.clamp(0, len - 1) as usize],
        Boundary::Zero => {
            if index < 0 || index >= len {
                0.0
            } else {
                buffer[index as usize]
            }
        }
    }
}

/// Integer position and fraction; `None` for NaN or infinite phases
#[inline]
fn split_phase(phase: f64) -> Option<(i64, f64)> {
    if !phase.is_finite() {
        return None;
    }
    let floor = phase.floor();
    Some((floor as i64, phase - floor))
}

/// Nearest-sample read
pub fn nearest(buffer: &[f32], phase: f64) -> f32 {
    nearest_bounded(buffer, phase, Boundary::Wrap)
}

pub fn nearest_bounded(buffer: &[f32], phase: f64, boundary: Boundary) -> f32 {
    if buffer.is_empty() || !phase.is_finite() {
        return 0.0;
    }
    fetch(buffer, phase.round() as i64, 0, boundary)
}

/// Linear interpolation between the two neighbouring samples
pub fn linear(buffer: &[f32], phase: f64) -> f32 {
    linear_bounded(buffer, phase, Boundary::Wrap)
}

pub fn linear_bounded(buffer: &[f32], phase: f64, boundary: Boundary) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    let Some((index, frac)) = split_phase(phase) else {
        return 0.0;
    };
    let s0 = fetch(buffer, index, 0, boundary);
    if frac == 0.0 {
        return s0;
    }
    let s1 = fetch(buffer, index, 1, boundary);
    s0 + (s1 - s0) * frac as f32
}

/// Cubic Catmull-Rom interpolation (4-point)
///
/// Uses samples at `phase-1 .. phase+2`. The spline passes through every
/// control point and has a continuous first derivative.
pub fn cubic(buffer: &[f32], phase: f64) -> f32 {
    cubic_bounded(buffer, phase, Boundary::Wrap)
}

pub fn cubic_bounded(buffer: &[f32], phase: f64, boundary: Boundary) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    let Some((index, frac)) = split_phase(phase) else {
        return 0.0;
    };
    let s1 = fetch(buffer, index, 0, boundary);
    if frac == 0.0 {
        return s1;
    }
    let s0 = fetch(buffer, index, -1, boundary);
    let s2 = fetch(buffer, index, 1, boundary);
    let s3 = fetch(buffer, index, 2, boundary);

    let t = frac as f32;
    let t2 = t * t;
    let t3 = t2 * t;

    // Catmull-Rom basis functions (tension = 0.5)
    let c0 = -0.5 * t3 + t2 - 0.5 * t;
    let c1 = 1.5 * t3 - 2.5 * t2 + 1.0;
    let c2 = -1.5 * t3 + 2.0 * t2 + 0.5 * t;
    let c3 = 0.5 * t3 - 0.5 * t2;

    s0 * c0 + s1 * c1 + s2 * c2 + s3 * c3
}

/// 4-term Blackman-Harris window over `[-half, half]`
#[inline]
fn blackman_harris(x: f64, half: f64) -> f64 {
    if x.abs() >= half {
        return 0.0;
    }
    let r = 2.0 * PI * (x + half) / (2.0 * half);
    0.35875 - 0.48829 * r.cos() + 0.14128 * (2.0 * r).cos() - 0.01168 * (3.0 * r).cos()
}

/// Windowed sinc kernel
#[inline]
fn kernel(x: f64, half: f64) -> f64 {
    if x.abs() < 1e-10 {
        return 1.0;
    }
    let px = PI * x;
    px.sin() / px * blackman_harris(x, half)
}

/// Windowed-sinc interpolation
///
/// `window_size` taps centred on the phase (`window_size/2 - 1` before the
/// integer position, `window_size/2` after) under a Blackman-Harris window
/// spanning all taps. A window smaller than 2 is treated as 2.
pub fn sinc(buffer: &[f32], phase: f64, window_size: usize) -> f32 {
    sinc_bounded_with_window(buffer, phase, window_size, Boundary::Wrap)
}

pub fn sinc_bounded(buffer: &[f32], phase: f64, boundary: Boundary) -> f32 {
    sinc_bounded_with_window(buffer, phase, DEFAULT_SINC_WINDOW, boundary)
}

pub fn sinc_bounded_with_window(
    buffer: &[f32],
    phase: f64,
    window_size: usize,
    boundary: Boundary,
) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    let Some((index, frac)) = split_phase(phase) else {
        return 0.0;
    };
    if frac == 0.0 {
        return fetch(buffer, index, 0, boundary);
    }

    let half = (window_size.max(2) / 2) as i64;
    let mut acc = 0.0f64;
    for offset in (1 - half)..=half {
        let weight = kernel(offset as f64 - frac, half as f64);
        acc += fetch(buffer, index, offset, boundary) as f64 * weight;
    }
    acc as f32
}

/// Dispatch on [`InterpolationQuality`]
#[inline]
pub fn interpolate(
    quality: InterpolationQuality,
    buffer: &[f32],
    phase: f64,
    boundary: Boundary,
) -> f32 {
    match quality {
        InterpolationQuality::None => nearest_bounded(buffer, phase, boundary),
        InterpolationQuality::Linear => linear_bounded(buffer, phase, boundary),
        InterpolationQuality::Cubic => cubic_bounded(buffer, phase, boundary),
        InterpolationQuality::Sinc => sinc_bounded(buffer, phase, boundary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sinusoid(len: usize, cycles: f64) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * cycles * i as f64 / len as f64).sin() as f32)
            .collect()
    }

    #[test]
    fn test_exact_at_integer_phase() {
        let buffer = [0.1, -0.4, 0.9, 0.3, -0.7, 0.2];
        for quality in InterpolationQuality::all() {
            for (i, &expected) in buffer.iter().enumerate() {
                for boundary in [Boundary::Wrap, Boundary::Clamp, Boundary::Zero] {
                    let got = interpolate(*quality, &buffer, i as f64, boundary);
                    assert_eq!(got, expected, "{quality:?} {boundary:?} at {i}");
                }
            }
        }
    }

    #[test]
    fn test_empty_buffer_returns_zero() {
        let empty: [f32; 0] = [];
        assert_eq!(linear(&empty, 1.5), 0.0);
        assert_eq!(cubic(&empty, 1.5), 0.0);
        assert_eq!(sinc(&empty, 1.5, 16), 0.0);
        assert_eq!(nearest(&empty, 1.5), 0.0);
    }

    #[test]
    fn test_linear_midpoint() {
        let buffer = [0.0, 1.0];
        assert!((linear(&buffer, 0.5) - 0.5).abs() < 1e-6);
        // Wraps back to buffer[0]
        assert!((linear(&buffer, 1.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_wrap_indexes_modulo_length() {
        let buffer = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(linear(&buffer, 5.0), 2.0);
        assert_eq!(linear(&buffer, -1.0), 4.0);
    }

    #[test]
    fn test_zero_boundary_reads_silence_past_end() {
        let buffer = [1.0, 1.0, 1.0, 1.0];
        assert_eq!(linear_bounded(&buffer, 4.0, Boundary::Zero), 0.0);
        let tail = linear_bounded(&buffer, 3.5, Boundary::Zero);
        assert!((tail - 0.5).abs() < 1e-6);
        // Wrap would have read buffer[0]
        assert!((linear_bounded(&buffer, 3.5, Boundary::Wrap) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_clamp_boundary_holds_edges() {
        let buffer = [2.0, 4.0];
        assert_eq!(cubic_bounded(&buffer, -3.0, Boundary::Clamp), 2.0);
        assert_eq!(cubic_bounded(&buffer, 9.0, Boundary::Clamp), 4.0);
    }

    #[test]
    fn test_error_ordering_on_sinusoid() {
        // 8 cycles over 256 samples: 32 samples per period
        let buffer = sinusoid(256, 8.0);
        let mut err_linear = 0.0;
        let mut err_cubic = 0.0;
        let mut err_sinc = 0.0;
        let mut count = 0;

        for i in 0..256 {
            for frac in [0.125, 0.25, 0.375, 0.5, 0.625, 0.75, 0.875] {
                let phase = i as f64 + frac;
                let expected = (2.0 * PI * 8.0 * phase / 256.0).sin();
                err_linear += (linear(&buffer, phase) as f64 - expected).abs();
                err_cubic += (cubic(&buffer, phase) as f64 - expected).abs();
                err_sinc += (sinc(&buffer, phase, DEFAULT_SINC_WINDOW) as f64 - expected).abs();
                count += 1;
            }
        }

        let n = count as f64;
        let (l, c, s) = (err_linear / n, err_cubic / n, err_sinc / n);
        assert!(l > c, "linear {l} should exceed cubic {c}");
        assert!(c > s, "cubic {c} should exceed sinc {s}");
    }

    #[test]
    fn test_negative_phase_floor() {
        let buffer = [0.0, 1.0, 2.0, 3.0];
        // -0.5 lies between buffer[3] and buffer[0] under wrap
        let v = linear(&buffer, -0.5);
        assert!((v - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_non_finite_and_extreme_phases_are_safe() {
        let buffer = [0.5, -0.5, 0.25, 1.0];
        for phase in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            for quality in InterpolationQuality::all() {
                assert_eq!(interpolate(*quality, &buffer, phase, Boundary::Wrap), 0.0);
            }
        }
        for phase in [1e300, -1e300, i64::MAX as f64, i64::MIN as f64] {
            for quality in InterpolationQuality::all() {
                for boundary in [Boundary::Wrap, Boundary::Clamp, Boundary::Zero] {
                    assert!(interpolate(*quality, &buffer, phase, boundary).is_finite());
                }
            }
        }
    }

    #[test]
    fn test_sinc_passes_dc() {
        let buffer = vec![0.25; 64];
        for frac in [0.1, 0.5, 0.9] {
            let v = sinc_bounded(&buffer, 20.0 + frac, Boundary::Wrap);
            assert!((v - 0.25).abs() < 1e-3, "{v}");
        }
    }

    #[test]
    fn test_quality_serde_lowercase() {
        let yaml = serde_yaml::to_string(&InterpolationQuality::Sinc).unwrap();
        assert_eq!(yaml.trim(), "sinc");
        let parsed: InterpolationQuality = serde_yaml::from_str("none").unwrap();
        assert_eq!(parsed, InterpolationQuality::None);
    }
}
