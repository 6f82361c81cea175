//! Explicit vector paths for the hottest kernels
//!
//! Selected at runtime: [`probe`] checks the CPU feature flags and then runs
//! the vector multiply-add against the scalar one before anything trusts it.
//!
//! - x86_64: SSE4.1 (4 × f32)
//! - aarch64: NEON (4 × f32)
//! - elsewhere: always unavailable

use crate::dsp::vector;

const LANES: usize = 4;

/// True when the CPU reports a usable vector unit
pub fn cpu_has_vector_unit() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        is_x86_feature_detected!("sse4.1") || is_x86_feature_detected!("avx")
    }
    #[cfg(target_arch = "aarch64")]
    {
        std::arch::is_aarch64_feature_detected!("neon")
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        false
    }
}

/// Feature flags plus a known-answer run of the vector kernel
pub fn probe() -> bool {
    if !cpu_has_vector_unit() {
        return false;
    }

    // 11 elements: two full vectors and a scalar tail
    let a: [f32; 11] = [0.5, -1.0, 2.0, 3.5, -0.25, 8.0, 1.0, 0.0, -3.0, 4.0, 0.125];
    let b: [f32; 11] = [2.0, 3.0, -0.5, 1.0, 4.0, 0.5, -2.0, 9.0, 1.5, 0.25, 8.0];
    let c: [f32; 11] = [1.0; 11];

    let mut scalar = [0.0f32; 11];
    let mut simd = [0.0f32; 11];
    vector::mul_add(&a, &b, &c, &mut scalar, a.len());
    mul_add(&a, &b, &c, &mut simd, a.len());

    scalar
        .iter()
        .zip(simd.iter())
        .all(|(s, v)| (s - v).abs() <= f32::EPSILON * s.abs().max(1.0))
}

/// out = a * b + c
///
/// Callers must have seen [`probe`] return true.
pub fn mul_add(a: &[f32], b: &[f32], c: &[f32], out: &mut [f32], length: usize) {
    let n = length.min(a.len()).min(b.len()).min(c.len()).min(out.len());
    let split = n - n % LANES;

    #[cfg(target_arch = "x86_64")]
    // Safety: lengths checked above; feature presence checked by `probe`
    unsafe {
        x86::mul_add(a, b, c, out, split)
    };
    #[cfg(target_arch = "aarch64")]
    // Safety: lengths checked above; feature presence checked by `probe`
    unsafe {
        neon::mul_add(a, b, c, out, split)
    };
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    vector::mul_add(a, b, c, out, split);

    for i in split..n {
        out[i] = a[i] * b[i] + c[i];
    }
}

/// buf *= gain
pub fn apply_gain(buf: &mut [f32], length: usize, gain: f32) {
    let n = length.min(buf.len());
    let split = n - n % LANES;

    #[cfg(target_arch = "x86_64")]
    // Safety: see `mul_add`
    unsafe {
        x86::apply_gain(buf, split, gain)
    };
    #[cfg(target_arch = "aarch64")]
    // Safety: see `mul_add`
    unsafe {
        neon::apply_gain(buf, split, gain)
    };
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    vector::apply_gain(buf, split, gain);

    for s in &mut buf[split..n] {
        *s *= gain;
    }
}

/// dst += src * gain
pub fn accumulate(src: &[f32], dst: &mut [f32], length: usize, gain: f32) {
    let n = length.min(src.len()).min(dst.len());
    let split = n - n % LANES;

    #[cfg(target_arch = "x86_64")]
    // Safety: see `mul_add`
    unsafe {
        x86::accumulate(src, dst, split, gain)
    };
    #[cfg(target_arch = "aarch64")]
    // Safety: see `mul_add`
    unsafe {
        neon::accumulate(src, dst, split, gain)
    };
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    vector::accumulate(src, dst, split, gain);

    for i in split..n {
        dst[i] += src[i] * gain;
    }
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use super::LANES;
    use std::arch::x86_64::*;

    /// # Safety
    /// `n` is a multiple of 4 and no larger than any slice.
    #[target_feature(enable = "sse4.1")]
    pub unsafe fn mul_add(a: &[f32], b: &[f32], c: &[f32], out: &mut [f32], n: usize) {
        let mut i = 0;
        while i < n {
            let va = _mm_loadu_ps(a.as_ptr().add(i));
            let vb = _mm_loadu_ps(b.as_ptr().add(i));
            let vc = _mm_loadu_ps(c.as_ptr().add(i));
            _mm_storeu_ps(out.as_mut_ptr().add(i), _mm_add_ps(_mm_mul_ps(va, vb), vc));
            i += LANES;
        }
    }

    /// # Safety
    /// `n` is a multiple of 4 and no larger than `buf`.
    #[target_feature(enable = "sse4.1")]
    pub unsafe fn apply_gain(buf: &mut [f32], n: usize, gain: f32) {
        let vg = _mm_set1_ps(gain);
        let mut i = 0;
        while i < n {
            let p = buf.as_mut_ptr().add(i);
            _mm_storeu_ps(p, _mm_mul_ps(_mm_loadu_ps(p), vg));
            i += LANES;
        }
    }

    /// # Safety
    /// `n` is a multiple of 4 and no larger than either slice.
    #[target_feature(enable = "sse4.1")]
    pub unsafe fn accumulate(src: &[f32], dst: &mut [f32], n: usize, gain: f32) {
        let vg = _mm_set1_ps(gain);
        let mut i = 0;
        while i < n {
            let vs = _mm_loadu_ps(src.as_ptr().add(i));
            let p = dst.as_mut_ptr().add(i);
            _mm_storeu_ps(p, _mm_add_ps(_mm_loadu_ps(p), _mm_mul_ps(vs, vg)));
            i += LANES;
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod neon {
    use super::LANES;
    use std::arch::aarch64::*;

    /// # Safety
    /// `n` is a multiple of 4 and no larger than any slice.
    #[target_feature(enable = "neon")]
    pub unsafe fn mul_add(a: &[f32], b: &[f32], c: &[f32], out: &mut [f32], n: usize) {
        let mut i = 0;
        while i < n {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            let vc = vld1q_f32(c.as_ptr().add(i));
            vst1q_f32(out.as_mut_ptr().add(i), vaddq_f32(vmulq_f32(va, vb), vc));
            i += LANES;
        }
    }

    /// # Safety
    /// `n` is a multiple of 4 and no larger than `buf`.
    #[target_feature(enable = "neon")]
    pub unsafe fn apply_gain(buf: &mut [f32], n: usize, gain: f32) {
        let vg = vdupq_n_f32(gain);
        let mut i = 0;
        while i < n {
            let p = buf.as_mut_ptr().add(i);
            vst1q_f32(p, vmulq_f32(vld1q_f32(p), vg));
            i += LANES;
        }
    }

    /// # Safety
    /// `n` is a multiple of 4 and no larger than either slice.
    #[target_feature(enable = "neon")]
    pub unsafe fn accumulate(src: &[f32], dst: &mut [f32], n: usize, gain: f32) {
        let vg = vdupq_n_f32(gain);
        let mut i = 0;
        while i < n {
            let vs = vld1q_f32(src.as_ptr().add(i));
            let p = dst.as_mut_ptr().add(i);
            vst1q_f32(p, vaddq_f32(vld1q_f32(p), vmulq_f32(vs, vg)));
            i += LANES;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_runs() {
        // Result depends on the host CPU; only the call itself is checked
        let available = probe();
        println!("vector unit available: {}", available);
    }

    #[test]
    fn test_vector_paths_match_scalar() {
        if !probe() {
            return;
        }
        let a: Vec<f32> = (0..37).map(|i| i as f32 * 0.5).collect();
        let b: Vec<f32> = (0..37).map(|i| 1.0 - i as f32 * 0.1).collect();
        let c = vec![0.25f32; 37];

        let mut expected = vec![0.0; 37];
        let mut got = vec![0.0; 37];
        vector::mul_add(&a, &b, &c, &mut expected, 37);
        mul_add(&a, &b, &c, &mut got, 37);
        assert_eq!(expected, got);

        let mut g1 = a.clone();
        let mut g2 = a.clone();
        vector::apply_gain(&mut g1, 37, 0.3);
        apply_gain(&mut g2, 37, 0.3);
        assert_eq!(g1, g2);

        let mut d1 = b.clone();
        let mut d2 = b.clone();
        vector::accumulate(&a, &mut d1, 37, 2.0);
        accumulate(&a, &mut d2, 37, 2.0);
        assert_eq!(d1, d2);
    }
}
