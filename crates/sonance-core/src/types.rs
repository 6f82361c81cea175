//! Common types for Sonance
//!
//! Fundamental audio types shared by the render context, the hosts and the
//! offline renderer: stereo frames, stereo buffers and note identifiers.

use std::ops::{Index, IndexMut};

/// Largest block the render context will produce in one invocation.
/// Hosts asking for more frames are served in several passes.
pub const MAX_BLOCK_SIZE: usize = 4096;

/// Audio sample type used throughout the engine
pub type Sample = f32;

/// A single stereo frame (left and right channels)
///
/// `#[repr(C)]` keeps the layout `[left, right]` so a `&[StereoSample]` can
/// be viewed as interleaved `&[f32]` with bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }
}

/// A buffer of stereo frames
///
/// Hosts hand one of these to the render context. Working length is set from
/// pre-allocated capacity so the render path never allocates.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// `len` frames of silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a silent buffer with room for `capacity` frames but zero length
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Resize within the existing allocation; new frames are silent
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        if new_len > self.samples.len() {
            debug_assert!(
                new_len <= self.samples.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    /// Append frames (offline rendering only; may allocate)
    pub fn extend_from_slice(&mut self, frames: &[StereoSample]) {
        self.samples.extend_from_slice(frames);
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy view as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Largest absolute value on either channel
    pub fn peak(&self) -> Sample {
        self.as_interleaved().iter().fold(0.0, |peak: Sample, s| peak.max(s.abs()))
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

/// Convert a MIDI note number to frequency (A4 = 440 Hz)
#[inline]
pub fn midi_to_frequency(note: f64) -> f64 {
    440.0 * 2.0_f64.powf((note - 69.0) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_view_matches_frames() {
        let mut buffer = StereoBuffer::silence(2);
        buffer[0] = StereoSample::new(1.0, 2.0);
        buffer[1] = StereoSample::new(3.0, 4.0);

        assert_eq!(buffer.as_interleaved(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buffer.peak(), 4.0);
    }

    #[test]
    fn test_set_len_from_capacity_fills_silence() {
        let mut buffer = StereoBuffer::with_capacity(8);
        buffer.set_len_from_capacity(4);
        assert_eq!(buffer.len(), 4);
        assert!(buffer.as_slice().iter().all(|s| *s == StereoSample::silence()));

        buffer.set_len_from_capacity(2);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_midi_to_frequency() {
        assert!((midi_to_frequency(69.0) - 440.0).abs() < 1e-9);
        assert!((midi_to_frequency(81.0) - 880.0).abs() < 1e-9);
    }
}
