//! Minimal sample and wavetable voices
//!
//! A voice reads one buffer at a pitch-dependent rate, scales it by
//! velocity and fades out over a short linear release ramp after note-off.
//! Streamed zones are read through their chunk table; a chunk that is not
//! resident plays as silence while the voice keeps its position.
//! The pool is allocated once; a note-on with no free voice steals the
//! oldest one.

use super::command::{SampleZone, StreamedData, ZoneData};
use crate::accel::DspKernels;
use crate::dsp::{Boundary, InterpolationQuality};
use crate::types::midi_to_frequency;

/// Shared inputs for rendering one segment
pub struct VoiceContext<'a> {
    pub kernels: &'a dyn DspKernels,
    pub zones: &'a [SampleZone],
    pub wavetable: &'a [f32],
    pub quality: InterpolationQuality,
    pub oversampling: u32,
    pub sample_rate: f64,
    /// Semitones
    pub pitch_bend: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// Index into the zone list
    Zone(usize),
    Wavetable,
}

/// Taps gathered around a streamed read position
const STREAM_TAPS: usize = 16;
/// Window position of the integer read index
const STREAM_LEAD: i64 = 7;

/// What a voice reads from
#[derive(Clone, Copy)]
enum Buffer<'a> {
    Slice(&'a [f32]),
    Streamed(&'a StreamedData),
}

impl Buffer<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Slice(data) => data.len(),
            Self::Streamed(data) => data.len(),
        }
    }

    fn read(&self, ctx: &VoiceContext<'_>, phase: f64, boundary: Boundary) -> f32 {
        match self {
            Self::Slice(data) => ctx.kernels.interpolate(ctx.quality, data, phase, boundary),
            Self::Streamed(data) => {
                if !phase.is_finite() {
                    return 0.0;
                }
                // Copy the neighbourhood out of the chunk table, then
                // interpolate inside it
                let base = phase.floor();
                let index = base as i64;
                let len = data.len() as i64;
                let mut window = [0.0f32; STREAM_TAPS];
                for (k, tap) in window.iter_mut().enumerate() {
                    let mut at = index.saturating_add(k as i64 - STREAM_LEAD);
                    if boundary == Boundary::Wrap && len > 0 {
                        at = at.rem_euclid(len);
                    }
                    *tap = data.sample(at);
                }
                ctx.kernels
                    .interpolate(ctx.quality, &window, STREAM_LEAD as f64 + (phase - base), Boundary::Zero)
            }
        }
    }
}

/// One playing note
#[derive(Debug, Clone)]
pub struct Voice {
    active: bool,
    note: u8,
    channel: u8,
    velocity: f32,
    source: Source,
    phase: f64,
    /// 1.0 while held; ramps to 0 after release
    envelope: f32,
    release_step: f32,
    releasing: bool,
    /// Start order for oldest-voice stealing
    order: u64,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            active: false,
            note: 0,
            channel: 0,
            velocity: 0.0,
            source: Source::Wavetable,
            phase: 0.0,
            envelope: 0.0,
            release_step: 0.0,
            releasing: false,
            order: 0,
        }
    }
}

impl Voice {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[inline]
    pub fn note(&self) -> u8 {
        self.note
    }

    fn start(&mut self, note: u8, velocity: f32, channel: u8, source: Source, order: u64) {
        *self = Self {
            active: true,
            note,
            channel,
            velocity: velocity.clamp(0.0, 1.0),
            source,
            phase: 0.0,
            envelope: 1.0,
            release_step: 0.0,
            releasing: false,
            order,
        };
    }

    fn release(&mut self, release_samples: f32) {
        if !self.active || self.releasing {
            return;
        }
        self.releasing = true;
        if release_samples < 1.0 {
            self.active = false;
        } else {
            self.release_step = self.envelope / release_samples;
        }
    }

    /// Phase increment per output frame
    fn increment(&self, ctx: &VoiceContext<'_>) -> f64 {
        let bend = ctx.pitch_bend as f64;
        match self.source {
            Source::Zone(index) => {
                let zone = &ctx.zones[index];
                let semitones = self.note as f64 - zone.root_note as f64 + bend;
                (zone.sample_rate as f64 / ctx.sample_rate) * 2.0_f64.powf(semitones / 12.0)
            }
            Source::Wavetable => {
                let frequency = midi_to_frequency(self.note as f64 + bend);
                frequency * ctx.wavetable.len() as f64 / ctx.sample_rate
            }
        }
    }

    /// Add this voice into `out` (mono)
    pub fn render(&mut self, out: &mut [f32], ctx: &VoiceContext<'_>) {
        if !self.active {
            return;
        }

        let (buffer, boundary, one_shot) = match self.source {
            Source::Zone(index) => match ctx.zones.get(index) {
                Some(zone) => {
                    let buffer = match &zone.data {
                        ZoneData::Resident(data) => Buffer::Slice(data),
                        ZoneData::Streamed(data) => Buffer::Streamed(data),
                    };
                    if zone.looped {
                        (buffer, Boundary::Wrap, false)
                    } else {
                        (buffer, Boundary::Zero, true)
                    }
                }
                None => {
                    self.active = false;
                    return;
                }
            },
            Source::Wavetable => (Buffer::Slice(ctx.wavetable), Boundary::Wrap, false),
        };
        if buffer.len() == 0 {
            self.active = false;
            return;
        }

        let step = self.increment(ctx);
        let factor = ctx.oversampling.max(1);
        let sub_step = step / factor as f64;
        let norm = 1.0 / factor as f32;
        let len = buffer.len() as f64;

        for sample in out.iter_mut() {
            let value = if factor == 1 {
                buffer.read(ctx, self.phase, boundary)
            } else {
                // Box-filter decimation of `factor` sub-steps
                let mut acc = 0.0;
                for k in 0..factor {
                    let p = self.phase + sub_step * k as f64;
                    acc += buffer.read(ctx, p, boundary);
                }
                acc * norm
            };

            *sample += value * self.velocity * self.envelope;

            self.phase += step;
            if one_shot {
                if self.phase >= len {
                    self.active = false;
                    return;
                }
            } else if self.phase >= len {
                self.phase -= len * (self.phase / len).floor();
            }

            if self.releasing {
                self.envelope -= self.release_step;
                if self.envelope <= 0.0 {
                    self.envelope = 0.0;
                    self.active = false;
                    return;
                }
            }
        }
    }
}

/// Fixed-size pool of voices
#[derive(Debug, Clone)]
pub struct VoicePool {
    voices: Vec<Voice>,
    next_order: u64,
}

impl VoicePool {
    pub fn new(max_voices: usize) -> Self {
        Self {
            voices: vec![Voice::default(); max_voices.max(1)],
            next_order: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Start a note, stealing the oldest voice when the pool is full
    pub fn note_on(&mut self, note: u8, velocity: f32, channel: u8, zones: &[SampleZone]) {
        // Most recently loaded zone wins when ranges overlap
        let source = zones
            .iter()
            .rposition(|z| z.contains(note))
            .map_or(Source::Wavetable, Source::Zone);

        let index = match self.voices.iter().position(|v| !v.active) {
            Some(free) => free,
            None => self
                .voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.order)
                .map_or(0, |(i, _)| i),
        };

        let order = self.next_order;
        self.next_order += 1;
        self.voices[index].start(note, velocity, channel, source, order);
    }

    /// Release every held voice playing `note` on `channel`
    pub fn note_off(&mut self, note: u8, channel: u8, release_samples: f32) {
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.active && v.note == note && v.channel == channel)
        {
            voice.release(release_samples);
        }
    }

    /// Silence everything immediately
    pub fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.active = false;
        }
    }

    /// Render all active voices, summing into `mix`
    ///
    /// `scratch` must be at least as long as `mix`.
    pub fn render(&mut self, mix: &mut [f32], scratch: &mut [f32], ctx: &VoiceContext<'_>) {
        let n = mix.len().min(scratch.len());
        for voice in self.voices.iter_mut().filter(|v| v.active) {
            let buf = &mut scratch[..n];
            buf.fill(0.0);
            voice.render(buf, ctx);
            ctx.kernels.accumulate(buf, &mut mix[..n], n, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::SoftwareKernels;
    use crate::cache::Samples;
    use basedrop::{Collector, Shared};

    fn context<'a>(
        kernels: &'a SoftwareKernels,
        zones: &'a [SampleZone],
        wavetable: &'a [f32],
    ) -> VoiceContext<'a> {
        VoiceContext {
            kernels,
            zones,
            wavetable,
            quality: InterpolationQuality::Linear,
            oversampling: 1,
            sample_rate: 44_100.0,
            pitch_bend: 0.0,
        }
    }

    fn zone(collector: &Collector, data: Vec<f32>, looped: bool) -> SampleZone {
        SampleZone {
            data: ZoneData::Resident(Shared::new(&collector.handle(), Samples::from(data))),
            root_note: 60,
            key_low: 0,
            key_high: 127,
            sample_rate: 44_100,
            looped,
        }
    }

    #[test]
    fn test_oldest_voice_is_stolen() {
        let mut pool = VoicePool::new(2);
        pool.note_on(60, 1.0, 0, &[]);
        pool.note_on(62, 1.0, 0, &[]);
        pool.note_on(64, 1.0, 0, &[]);

        let notes: Vec<u8> = pool.voices().iter().map(|v| v.note()).collect();
        assert!(notes.contains(&62));
        assert!(notes.contains(&64));
        assert!(!notes.contains(&60));
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn test_one_shot_at_root_plays_samples_verbatim_then_stops() {
        let collector = Collector::new();
        let zones = vec![zone(&collector, vec![0.1, 0.2, 0.3, 0.4], false)];
        let kernels = SoftwareKernels::scalar();
        let ctx = context(&kernels, &zones, &[]);

        let mut pool = VoicePool::new(4);
        pool.note_on(60, 1.0, 0, &zones);

        let mut mix = vec![0.0; 8];
        let mut scratch = vec![0.0; 8];
        pool.render(&mut mix, &mut scratch, &ctx);

        assert_eq!(&mix[..4], &[0.1, 0.2, 0.3, 0.4]);
        assert!(mix[4..].iter().all(|&s| s == 0.0));
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_streamed_zone_plays_silence_for_missing_chunks() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut streamed = StreamedData::new(&handle, 8, 4);
        streamed.set_chunk(1, Some(Shared::new(&handle, Samples::from(vec![0.5; 4]))));
        let mut zones = vec![zone(&collector, Vec::new(), false)];
        zones[0].data = ZoneData::Streamed(streamed);

        let kernels = SoftwareKernels::scalar();
        let ctx = context(&kernels, &zones, &[]);
        let mut pool = VoicePool::new(1);
        pool.note_on(60, 1.0, 0, &zones);

        let mut mix = vec![0.0; 12];
        let mut scratch = vec![0.0; 12];
        pool.render(&mut mix, &mut scratch, &ctx);

        assert!(mix[..4].iter().all(|&s| s == 0.0));
        assert!(mix[4..8].iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert!(mix[8..].iter().all(|&s| s == 0.0));
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_streamed_zone_matches_resident_between_samples() {
        let collector = Collector::new();
        let handle = collector.handle();
        let data: Vec<f32> = (0..16).map(|i| (i as f32 * 0.4).sin()).collect();
        let mut streamed = StreamedData::new(&handle, 16, 4);
        for (index, chunk) in data.chunks(4).enumerate() {
            streamed.set_chunk(index, Some(Shared::new(&handle, Samples::from(chunk.to_vec()))));
        }
        let resident = vec![zone(&collector, data, true)];
        let mut chunked = vec![zone(&collector, Vec::new(), true)];
        chunked[0].data = ZoneData::Streamed(streamed);

        let kernels = SoftwareKernels::scalar();
        for quality in InterpolationQuality::all() {
            let mut a = context(&kernels, &resident, &[]);
            let mut b = context(&kernels, &chunked, &[]);
            a.quality = *quality;
            b.quality = *quality;
            // Off-root so reads land between samples
            let mut left = VoicePool::new(1);
            let mut right = VoicePool::new(1);
            left.note_on(65, 1.0, 0, &resident);
            right.note_on(65, 1.0, 0, &chunked);

            let (mut x, mut y, mut scratch) = (vec![0.0; 40], vec![0.0; 40], vec![0.0; 40]);
            left.render(&mut x, &mut scratch, &a);
            right.render(&mut y, &mut scratch, &b);
            for (p, q) in x.iter().zip(&y) {
                assert!((p - q).abs() < 1e-5, "{quality:?}: {p} vs {q}");
            }
        }
    }

    #[test]
    fn test_release_ramps_to_silence() {
        let kernels = SoftwareKernels::scalar();
        let table = vec![1.0; 64];
        let ctx = context(&kernels, &[], &table);

        let mut pool = VoicePool::new(1);
        pool.note_on(69, 1.0, 3, &[]);
        pool.note_off(69, 3, 4.0);

        let mut mix = vec![0.0; 8];
        let mut scratch = vec![0.0; 8];
        pool.render(&mut mix, &mut scratch, &ctx);

        assert_eq!(mix[0], 1.0);
        assert!(mix[1] < mix[0] && mix[2] < mix[1]);
        assert!(mix[4..].iter().all(|&s| s == 0.0));
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_note_off_matches_channel() {
        let mut pool = VoicePool::new(2);
        pool.note_on(60, 1.0, 0, &[]);
        pool.note_on(60, 1.0, 1, &[]);
        pool.note_off(60, 1, 0.0);
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn test_zone_selection_by_key_range() {
        let collector = Collector::new();
        let mut low = zone(&collector, vec![0.5; 16], true);
        low.key_high = 59;
        let zones = vec![low];

        let mut pool = VoicePool::new(2);
        pool.note_on(48, 1.0, 0, &zones);
        pool.note_on(72, 1.0, 0, &zones);

        assert_eq!(pool.voices()[0].source, Source::Zone(0));
        assert_eq!(pool.voices()[1].source, Source::Wavetable);
    }

    #[test]
    fn test_oversampling_preserves_dc() {
        let kernels = SoftwareKernels::scalar();
        let table = vec![0.25; 128];
        let mut ctx = context(&kernels, &[], &table);
        ctx.oversampling = 4;

        let mut pool = VoicePool::new(1);
        pool.note_on(60, 1.0, 0, &[]);
        let mut mix = vec![0.0; 32];
        let mut scratch = vec![0.0; 32];
        pool.render(&mut mix, &mut scratch, &ctx);
        assert!(mix.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }
}
