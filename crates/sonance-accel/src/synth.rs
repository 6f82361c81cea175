//! Synthesis primitives behind the optional exports
//!
//! Objects live in a per-kind slot table; the handle given out over the
//! ABI is the slot index plus one, so `0` can mean failure.

use sonance_core::dsp::resample;
use std::f64::consts::TAU;

/// Handle-addressed storage
#[derive(Debug)]
pub struct Slots<T> {
    items: Vec<T>,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Slots<T> {
    pub fn insert(&mut self, item: T) -> u32 {
        self.items.push(item);
        u32::try_from(self.items.len()).unwrap_or(0)
    }

    pub fn get_mut(&mut self, handle: u32) -> Option<&mut T> {
        let index = (handle as usize).checked_sub(1)?;
        self.items.get_mut(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Saw,
    Square,
    Triangle,
}

impl Waveform {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Saw,
            2 => Self::Square,
            3 => Self::Triangle,
            _ => Self::Sine,
        }
    }

    /// Value at `phase` in cycles (0.0..1.0)
    fn at(self, phase: f64) -> f32 {
        let value = match self {
            Self::Sine => (TAU * phase).sin(),
            Self::Saw => 2.0 * phase - 1.0,
            Self::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Self::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        };
        value as f32
    }
}

/// Naive oscillator; `phase` is in cycles and carried between calls
pub fn oscillator(out: &mut [f32], frequency: f32, sample_rate: f32, waveform: Waveform, phase: &mut f64) {
    let step = frequency as f64 / sample_rate.max(1.0) as f64;
    for sample in out.iter_mut() {
        *sample = waveform.at(*phase);
        *phase = (*phase + step).rem_euclid(1.0);
    }
}

/// Looping wavetable read; `phase` is in table samples
pub fn wavetable(table: &[f32], out: &mut [f32], frequency: f32, sample_rate: f32, phase: &mut f64) {
    if table.is_empty() {
        out.fill(0.0);
        return;
    }
    let len = table.len() as f64;
    let step = frequency as f64 * len / sample_rate.max(1.0) as f64;
    for sample in out.iter_mut() {
        *sample = resample::linear(table, *phase);
        *phase = (*phase + step).rem_euclid(len);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
}

impl FilterKind {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Highpass,
            2 => Self::Bandpass,
            _ => Self::Lowpass,
        }
    }
}

/// Trapezoidal state-variable filter
#[derive(Debug, Clone)]
pub struct Filter {
    kind: FilterKind,
    sample_rate: f32,
    a1: f32,
    a2: f32,
    a3: f32,
    k: f32,
    ic1: f32,
    ic2: f32,
}

impl Filter {
    pub fn new(kind: FilterKind, sample_rate: f32) -> Self {
        let mut filter = Self {
            kind,
            sample_rate: sample_rate.max(1.0),
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            k: 0.0,
            ic1: 0.0,
            ic2: 0.0,
        };
        filter.set_params(1000.0, 0.0);
        filter
    }

    /// `resonance` in 0.0..1.0
    pub fn set_params(&mut self, cutoff: f32, resonance: f32) {
        let nyquist = self.sample_rate * 0.49;
        let cutoff = cutoff.clamp(10.0, nyquist);
        let g = (std::f32::consts::PI * cutoff / self.sample_rate).tan();
        self.k = 2.0 * (1.0 - resonance.clamp(0.0, 0.98));
        self.a1 = 1.0 / (1.0 + g * (g + self.k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
    }

    pub fn process(&mut self, buf: &mut [f32]) {
        for sample in buf.iter_mut() {
            let x = *sample;
            let v3 = x - self.ic2;
            let v1 = self.a1 * self.ic1 + self.a2 * v3;
            let v2 = self.ic2 + self.a2 * self.ic1 + self.a3 * v3;
            self.ic1 = 2.0 * v1 - self.ic1;
            self.ic2 = 2.0 * v2 - self.ic2;
            *sample = match self.kind {
                FilterKind::Lowpass => v2,
                FilterKind::Bandpass => v1,
                FilterKind::Highpass => x - self.k * v1 - v2,
            };
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Linear ADSR; times in seconds
#[derive(Debug, Clone)]
pub struct Envelope {
    stage: Stage,
    level: f32,
    attack_step: f32,
    decay_step: f32,
    sustain: f32,
    release_samples: f32,
    release_step: f32,
}

impl Envelope {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32, sample_rate: f32) -> Self {
        let samples = |seconds: f32| (seconds * sample_rate).round().max(1.0);
        let sustain = sustain.clamp(0.0, 1.0);
        Self {
            stage: Stage::Idle,
            level: 0.0,
            attack_step: 1.0 / samples(attack),
            decay_step: (1.0 - sustain) / samples(decay),
            sustain,
            release_samples: samples(release),
            release_step: 0.0,
        }
    }

    pub fn trigger(&mut self) {
        self.stage = Stage::Attack;
    }

    pub fn release(&mut self) {
        if self.stage != Stage::Idle {
            self.release_step = self.level / self.release_samples;
            self.stage = Stage::Release;
        }
    }

    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }

    pub fn process(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            match self.stage {
                Stage::Idle => self.level = 0.0,
                Stage::Attack => {
                    self.level += self.attack_step;
                    if self.level >= 1.0 {
                        self.level = 1.0;
                        self.stage = Stage::Decay;
                    }
                }
                Stage::Decay => {
                    self.level -= self.decay_step;
                    if self.level <= self.sustain {
                        self.level = self.sustain;
                        self.stage = Stage::Sustain;
                    }
                }
                Stage::Sustain => self.level = self.sustain,
                Stage::Release => {
                    self.level -= self.release_step;
                    if self.level <= 0.0 {
                        self.level = 0.0;
                        self.stage = Stage::Idle;
                    }
                }
            }
            *sample = self.level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oscillator_stays_in_range_and_keeps_phase() {
        let mut out = vec![0.0; 512];
        let mut phase = 0.0;
        for waveform in [Waveform::Sine, Waveform::Saw, Waveform::Square, Waveform::Triangle] {
            oscillator(&mut out, 440.0, 48_000.0, waveform, &mut phase);
            assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));
        }
        assert!((0.0..1.0).contains(&phase));
    }

    #[test]
    fn test_lowpass_passes_dc_and_highpass_blocks_it() {
        let mut lp = Filter::new(FilterKind::Lowpass, 48_000.0);
        let mut hp = Filter::new(FilterKind::Highpass, 48_000.0);
        let mut a = vec![1.0; 4800];
        let mut b = vec![1.0; 4800];
        lp.process(&mut a);
        hp.process(&mut b);
        assert!((a[4799] - 1.0).abs() < 1e-3);
        assert!(b[4799].abs() < 1e-3);
    }

    #[test]
    fn test_envelope_stages() {
        let mut env = Envelope::new(0.001, 0.001, 0.5, 0.001, 1000.0);
        let mut out = vec![0.0; 4];
        env.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        env.trigger();
        env.process(&mut out);
        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 0.5);
        assert_eq!(out[3], 0.5);

        env.release();
        env.process(&mut out);
        assert_eq!(out[0], 0.0);
        assert!(env.is_idle());
    }

    #[test]
    fn test_wavetable_reads_table() {
        let table = [0.0, 1.0, 0.0, -1.0];
        let mut out = vec![0.0; 4];
        let mut phase = 0.0;
        // One table sample per output sample
        wavetable(&table, &mut out, 1000.0, 4000.0, &mut phase);
        assert_eq!(out, vec![0.0, 1.0, 0.0, -1.0]);
        assert_eq!(phase, 0.0);
    }

    #[test]
    fn test_slots_start_at_one() {
        let mut slots = Slots::default();
        assert_eq!(slots.insert(5), 1);
        assert_eq!(slots.get_mut(1), Some(&mut 5));
        assert!(slots.get_mut(0).is_none());
    }
}
