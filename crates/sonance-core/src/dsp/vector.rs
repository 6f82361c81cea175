//! Elementwise DSP kernels
//!
//! Every kernel takes an explicit `length` and never infers the active region
//! from buffer sizes: real-time buffers are pre-allocated to the maximum block
//! size and only a prefix is live. `length` is clamped to the shortest slice
//! involved so a short buffer can never cause a panic in the render callback.
//!
//! Kernels work in batches of [`BATCH`] elements (a shape the optimizer turns
//! into vector instructions) followed by a scalar tail for the remainder.
//! They never allocate and hold no state.

/// Internal batch width
pub const BATCH: usize = 8;

/// Blend factor for [`mix`]: one factor for the whole region, or one per sample
#[derive(Debug, Clone, Copy)]
pub enum Blend<'a> {
    Scalar(f32),
    PerSample(&'a [f32]),
}

/// out = a * b + c
pub fn mul_add(a: &[f32], b: &[f32], c: &[f32], out: &mut [f32], length: usize) {
    let n = length.min(a.len()).min(b.len()).min(c.len()).min(out.len());
    let (a, b, c, out) = (&a[..n], &b[..n], &c[..n], &mut out[..n]);

    let split = n - n % BATCH;
    for (((o, x), y), z) in out[..split]
        .chunks_exact_mut(BATCH)
        .zip(a[..split].chunks_exact(BATCH))
        .zip(b[..split].chunks_exact(BATCH))
        .zip(c[..split].chunks_exact(BATCH))
    {
        for i in 0..BATCH {
            o[i] = x[i] * y[i] + z[i];
        }
    }
    for i in split..n {
        out[i] = a[i] * b[i] + c[i];
    }
}

/// Linear crossfade: out = a * (1 - m) + b * m
pub fn mix(a: &[f32], b: &[f32], blend: Blend<'_>, out: &mut [f32], length: usize) {
    match blend {
        Blend::Scalar(m) => {
            let n = length.min(a.len()).min(b.len()).min(out.len());
            let dry = 1.0 - m;
            let split = n - n % BATCH;
            for ((o, x), y) in out[..split]
                .chunks_exact_mut(BATCH)
                .zip(a[..split].chunks_exact(BATCH))
                .zip(b[..split].chunks_exact(BATCH))
            {
                for i in 0..BATCH {
                    o[i] = x[i] * dry + y[i] * m;
                }
            }
            for i in split..n {
                out[i] = a[i] * dry + b[i] * m;
            }
        }
        Blend::PerSample(m) => {
            let n = length.min(a.len()).min(b.len()).min(m.len()).min(out.len());
            let split = n - n % BATCH;
            for (((o, x), y), w) in out[..split]
                .chunks_exact_mut(BATCH)
                .zip(a[..split].chunks_exact(BATCH))
                .zip(b[..split].chunks_exact(BATCH))
                .zip(m[..split].chunks_exact(BATCH))
            {
                for i in 0..BATCH {
                    o[i] = x[i] * (1.0 - w[i]) + y[i] * w[i];
                }
            }
            for i in split..n {
                out[i] = a[i] * (1.0 - m[i]) + b[i] * m[i];
            }
        }
    }
}

/// buf *= gain
pub fn apply_gain(buf: &mut [f32], length: usize, gain: f32) {
    let n = length.min(buf.len());
    let split = n - n % BATCH;
    for chunk in buf[..split].chunks_exact_mut(BATCH) {
        for s in chunk.iter_mut() {
            *s *= gain;
        }
    }
    for s in &mut buf[split..n] {
        *s *= gain;
    }
}

/// dst[..length] = src[..length]
pub fn copy(src: &[f32], dst: &mut [f32], length: usize) {
    let n = length.min(src.len()).min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
}

/// buf[..length] = 0
pub fn clear(buf: &mut [f32], length: usize) {
    let n = length.min(buf.len());
    buf[..n].fill(0.0);
}

/// out = a + b
pub fn add(a: &[f32], b: &[f32], out: &mut [f32], length: usize) {
    let n = length.min(a.len()).min(b.len()).min(out.len());
    let split = n - n % BATCH;
    for ((o, x), y) in out[..split]
        .chunks_exact_mut(BATCH)
        .zip(a[..split].chunks_exact(BATCH))
        .zip(b[..split].chunks_exact(BATCH))
    {
        for i in 0..BATCH {
            o[i] = x[i] + y[i];
        }
    }
    for i in split..n {
        out[i] = a[i] + b[i];
    }
}

/// dst += src * gain
pub fn accumulate(src: &[f32], dst: &mut [f32], length: usize, gain: f32) {
    let n = length.min(src.len()).min(dst.len());
    let split = n - n % BATCH;
    for (d, s) in dst[..split]
        .chunks_exact_mut(BATCH)
        .zip(src[..split].chunks_exact(BATCH))
    {
        for i in 0..BATCH {
            d[i] += s[i] * gain;
        }
    }
    for i in split..n {
        dst[i] += src[i] * gain;
    }
}

/// Largest f32 below a positive finite or infinite `x`
#[inline]
fn just_below(x: f32) -> f32 {
    f32::from_bits(x.to_bits() - 1)
}

/// Rational soft clipper
///
/// Identity on [-1, 1]. Past the knee the excess `e = |x| - 1` is folded to
/// `1 - 1/(e + 1)`, so `|y| = 2 - 1/|x|`: continuous in value and slope at
/// the knee, sign-preserving, and bounded by 2. The curve is evaluated in
/// f64 and kept strictly below both `|x|` and 2 after rounding to f32.
#[inline]
pub fn soft_clip_sample(x: f32) -> f32 {
    let magnitude = x.abs();
    if !(magnitude > 1.0) {
        return x;
    }
    let folded = (2.0 - 1.0 / magnitude as f64) as f32;
    folded
        .min(just_below(magnitude))
        .min(just_below(2.0))
        .copysign(x)
}

/// Apply [`soft_clip_sample`] in place
pub fn soft_clip(buf: &mut [f32], length: usize) {
    let n = length.min(buf.len());
    let split = n - n % BATCH;
    for chunk in buf[..split].chunks_exact_mut(BATCH) {
        for s in chunk.iter_mut() {
            *s = soft_clip_sample(*s);
        }
    }
    for s in &mut buf[split..n] {
        *s = soft_clip_sample(*s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    #[test]
    fn test_mul_add_handles_remainder() {
        // 13 is not a multiple of BATCH
        let a = ramp(13);
        let b = vec![2.0; 13];
        let c = vec![1.0; 13];
        let mut out = vec![0.0; 16];

        mul_add(&a, &b, &c, &mut out, 13);

        for i in 0..13 {
            assert_eq!(out[i], i as f32 * 2.0 + 1.0, "index {i}");
        }
        // Beyond length untouched
        assert_eq!(&out[13..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_length_shorter_than_buffers() {
        let mut buf = vec![1.0; 32];
        apply_gain(&mut buf, 5, 0.5);
        assert!(buf[..5].iter().all(|&s| s == 0.5));
        assert!(buf[5..].iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_length_longer_than_buffers_is_clamped() {
        let a = vec![1.0; 4];
        let b = vec![1.0; 4];
        let mut out = vec![0.0; 4];
        add(&a, &b, &mut out, 100);
        assert_eq!(out, vec![2.0; 4]);
    }

    #[test]
    fn test_mix_scalar_and_per_sample() {
        let a = vec![1.0; 11];
        let b = vec![3.0; 11];
        let mut out = vec![0.0; 11];

        mix(&a, &b, Blend::Scalar(0.5), &mut out, 11);
        assert!(out.iter().all(|&s| (s - 2.0).abs() < 1e-6));

        let blend: Vec<f32> = (0..11).map(|i| if i % 2 == 0 { 0.0 } else { 1.0 }).collect();
        mix(&a, &b, Blend::PerSample(&blend), &mut out, 11);
        for (i, s) in out.iter().enumerate() {
            let expected = if i % 2 == 0 { 1.0 } else { 3.0 };
            assert_eq!(*s, expected, "index {i}");
        }
    }

    #[test]
    fn test_accumulate_and_add_remainder() {
        let src = ramp(19);
        let mut dst = vec![1.0; 19];
        accumulate(&src, &mut dst, 19, 2.0);
        for i in 0..19 {
            assert_eq!(dst[i], 1.0 + i as f32 * 2.0);
        }

        let mut out = vec![0.0; 19];
        add(&src, &src, &mut out, 19);
        assert_eq!(out[18], 36.0);
    }

    #[test]
    fn test_copy_and_clear() {
        let src = ramp(10);
        let mut dst = vec![-1.0; 10];
        copy(&src, &mut dst, 7);
        assert_eq!(&dst[..7], &src[..7]);
        assert_eq!(dst[7], -1.0);

        clear(&mut dst, 9);
        assert!(dst[..9].iter().all(|&s| s == 0.0));
        assert_eq!(dst[9], -1.0);
    }

    #[test]
    fn test_soft_clip_identity_inside_unit_range() {
        let mut buf = vec![-1.0, -0.5, 0.0, 0.25, 1.0];
        let before = buf.clone();
        soft_clip(&mut buf, 5);
        assert_eq!(buf, before);
    }

    #[test]
    fn test_soft_clip_compresses_and_preserves_sign() {
        for &x in &[1.0001_f32, 1.5, 2.0, 10.0, 1000.0, 1.0e9] {
            let y = soft_clip_sample(x);
            assert!(y > 1.0 && y < x, "x={x} y={y}");
            assert!(y < 2.0, "x={x} y={y}");

            let yn = soft_clip_sample(-x);
            assert!((yn + y).abs() < 1e-6, "odd symmetry for {x}");
        }
    }

    #[test]
    fn test_soft_clip_strict_just_past_knee_and_at_extremes() {
        for x in [1.000_001_f32, 1.0001, 1.001, 2.0e7, f32::MAX, f32::INFINITY] {
            let y = soft_clip_sample(x);
            assert!(y < x, "x={x} y={y}");
            assert!(y < 2.0, "x={x} y={y}");
            assert_eq!(soft_clip_sample(-x), -y);
        }
        assert!(soft_clip_sample(f32::NAN).is_nan());
    }

    #[test]
    fn test_soft_clip_is_continuous_at_knee() {
        let inside = soft_clip_sample(1.0);
        let outside = soft_clip_sample(1.0 + 1e-4);
        assert!((outside - inside).abs() < 1e-3);
    }

    #[test]
    fn test_soft_clip_monotonic_beyond_knee() {
        let mut prev = soft_clip_sample(1.0);
        for i in 1..200 {
            let y = soft_clip_sample(1.0 + i as f32 * 0.5);
            assert!(y > prev);
            prev = y;
        }
    }
}
