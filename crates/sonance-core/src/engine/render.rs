//! The render routine
//!
//! A [`RenderContext`] is everything the host's callback touches. It owns
//! the consumer half of the transport, the receiving end of the message
//! queue, the voice pool and all scratch buffers, each sized once at
//! construction. Nothing in [`RenderContext::process`] allocates, locks or
//! performs I/O.
//!
//! ## Per block
//!
//! 1. Drain queued messages. Untimed ones apply immediately; note and
//!    parameter events are held in timestamp order.
//! 2. Split the block at each due event's frame offset, applying the event
//!    and rendering voices up to the next one.
//! 3. Mix transport frames in at `transport_gain`.
//! 4. Apply `master_gain`, soft-clip, and write interleaved stereo.
//! 5. Publish the clock, counters and callback duration.

use super::command::{MessageKind, RenderMessage, SampleZone, ZoneData, MESSAGE_QUEUE_CAPACITY};
use super::metrics::RenderAtomics;
use super::params::{self, MAX_PARAMETERS};
use super::voice::{VoiceContext, VoicePool};
use crate::accel::DspKernels;
use crate::config::{EngineConfig, InterpolationQuality};
use crate::transport::TransportConsumer;
use crate::types::{StereoBuffer, MAX_BLOCK_SIZE};
use basedrop::{Owned, Shared};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Length of the built-in sine wavetable
pub const DEFAULT_WAVETABLE_SIZE: usize = 2048;

/// Maximum number of resident sample zones
pub const MAX_SAMPLE_ZONES: usize = 128;

/// One cycle of a sine wave
pub fn sine_table(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (std::f64::consts::TAU * i as f64 / len as f64).sin() as f32)
        .collect()
}

/// State owned by the render callback
pub struct RenderContext {
    sample_rate: f64,
    quality: InterpolationQuality,
    oversampling: u32,

    messages: rtrb::Consumer<RenderMessage>,
    /// Timed events not yet due, ordered by timestamp
    pending: VecDeque<RenderMessage>,

    transport: TransportConsumer,
    /// Transport filled the whole previous block
    transport_live: bool,

    kernels: Owned<Box<dyn DspKernels>>,
    zones: Vec<SampleZone>,
    wavetable: Shared<Vec<f32>>,
    voices: VoicePool,
    params: [f32; MAX_PARAMETERS],

    mono: Vec<f32>,
    scratch: Vec<f32>,
    left: Vec<f32>,
    right: Vec<f32>,
    transport_left: Vec<f32>,
    transport_right: Vec<f32>,

    atomics: Arc<RenderAtomics>,
    metrics_enabled: bool,
    clock: u64,
}

impl RenderContext {
    pub fn new(
        config: &EngineConfig,
        kernels: Owned<Box<dyn DspKernels>>,
        wavetable: Shared<Vec<f32>>,
        transport: TransportConsumer,
        messages: rtrb::Consumer<RenderMessage>,
        atomics: Arc<RenderAtomics>,
    ) -> Self {
        log::debug!(
            "Render context: {} voices, {:?} interpolation, {}x oversampling, kernels '{}'",
            config.max_voices,
            config.interpolation_quality,
            config.oversampling_factor,
            kernels.name()
        );
        Self {
            sample_rate: config.sample_rate as f64,
            quality: config.interpolation_quality,
            oversampling: config.oversampling_factor.max(1),
            messages,
            pending: VecDeque::with_capacity(MESSAGE_QUEUE_CAPACITY),
            transport,
            transport_live: false,
            kernels,
            zones: Vec::with_capacity(MAX_SAMPLE_ZONES),
            wavetable,
            voices: VoicePool::new(config.max_voices),
            params: params::default_values(),
            mono: vec![0.0; MAX_BLOCK_SIZE],
            scratch: vec![0.0; MAX_BLOCK_SIZE],
            left: vec![0.0; MAX_BLOCK_SIZE],
            right: vec![0.0; MAX_BLOCK_SIZE],
            transport_left: vec![0.0; MAX_BLOCK_SIZE],
            transport_right: vec![0.0; MAX_BLOCK_SIZE],
            atomics,
            metrics_enabled: true,
            clock: 0,
        }
    }

    /// Frames rendered so far
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Fill `output` with the next `output.len()` frames (real-time safe)
    ///
    /// Requests longer than [`MAX_BLOCK_SIZE`] are rendered in several
    /// passes.
    pub fn process(&mut self, output: &mut StereoBuffer) {
        let started = Instant::now();
        let total = output.len();

        let mut done = 0;
        while done < total {
            let frames = (total - done).min(MAX_BLOCK_SIZE);
            self.render_block(frames);
            let out = &mut output.as_mut_slice()[done..done + frames];
            for ((frame, &l), &r) in out.iter_mut().zip(&self.left[..frames]).zip(&self.right[..frames]) {
                frame.left = l;
                frame.right = r;
            }
            done += frames;
        }

        let elapsed = started.elapsed().as_secs_f64();
        self.atomics.callbacks.fetch_add(1, Ordering::Relaxed);
        if total > 0 && elapsed > total as f64 / self.sample_rate {
            self.atomics.overruns.fetch_add(1, Ordering::Relaxed);
        }
        if self.metrics_enabled {
            self.atomics.record_duration(elapsed);
        }
    }

    fn render_block(&mut self, frames: usize) {
        self.drain_messages();

        let block_start = self.clock;
        self.mono[..frames].fill(0.0);

        let mut cursor = 0;
        loop {
            while let Some(front) = self.pending.front() {
                let due = front.timestamp.saturating_sub(block_start);
                if due > cursor as u64 {
                    break;
                }
                if let Some(message) = self.pending.pop_front() {
                    self.apply(message);
                }
            }

            let next = self.pending.front().map_or(frames, |m| {
                (m.timestamp.saturating_sub(block_start)).min(frames as u64) as usize
            });
            self.render_voices(cursor, next);
            cursor = next;
            if cursor >= frames {
                break;
            }
        }

        self.left[..frames].copy_from_slice(&self.mono[..frames]);
        self.right[..frames].copy_from_slice(&self.mono[..frames]);

        self.mix_transport(frames);

        let master = self.params[params::MASTER_GAIN];
        self.kernels.apply_gain(&mut self.left, frames, master);
        self.kernels.apply_gain(&mut self.right, frames, master);
        self.kernels.soft_clip(&mut self.left, frames);
        self.kernels.soft_clip(&mut self.right, frames);

        self.clock += frames as u64;
        self.atomics.clock.store(self.clock, Ordering::Relaxed);
        self.atomics
            .active_voices
            .store(self.voices.active_count(), Ordering::Relaxed);
    }

    fn drain_messages(&mut self) {
        while self.pending.len() < MESSAGE_QUEUE_CAPACITY {
            let Ok(message) = self.messages.pop() else {
                break;
            };
            if message.is_timed() {
                let at = self.pending.partition_point(|m| m.timestamp <= message.timestamp);
                self.pending.insert(at, message);
            } else {
                self.apply(message);
            }
        }
    }

    fn apply(&mut self, message: RenderMessage) {
        match message.kind {
            MessageKind::Init => {
                self.voices.reset();
                self.atomics.initialized.store(true, Ordering::Relaxed);
            }
            MessageKind::NoteOn { note, velocity, channel } => {
                self.voices.note_on(note, velocity, channel, &self.zones);
            }
            MessageKind::NoteOff { note, channel } => {
                let release = self.params[params::RELEASE_MS].max(0.0) * self.sample_rate as f32 / 1000.0;
                self.voices.note_off(note, channel, release);
            }
            MessageKind::Parameter { slot, value } => {
                if let Some(param) = self.params.get_mut(slot) {
                    *param = value;
                }
            }
            MessageKind::Preset(values) => {
                for &(slot, value) in values.iter() {
                    if let Some(param) = self.params.get_mut(slot) {
                        *param = value;
                    }
                }
            }
            MessageKind::Module(kernels) => {
                // Old kernels are reclaimed off-thread
                self.kernels = kernels;
            }
            MessageKind::Sample(zone) => {
                if self.zones.len() < MAX_SAMPLE_ZONES {
                    self.zones.push(zone);
                }
            }
            MessageKind::ZoneChunk { zone, index, data } => {
                if let Some(SampleZone {
                    data: ZoneData::Streamed(streamed),
                    ..
                }) = self.zones.get_mut(zone)
                {
                    streamed.set_chunk(index, data);
                }
            }
            MessageKind::Wavetable(table) => {
                if !table.is_empty() {
                    self.wavetable = table;
                }
            }
            MessageKind::Metrics { enabled } => {
                self.metrics_enabled = enabled;
            }
        }
    }

    fn render_voices(&mut self, from: usize, to: usize) {
        if from >= to {
            return;
        }
        let ctx = VoiceContext {
            kernels: &**self.kernels,
            zones: &self.zones,
            wavetable: self.wavetable.as_slice(),
            quality: self.quality,
            oversampling: self.oversampling,
            sample_rate: self.sample_rate,
            pitch_bend: self.params[params::PITCH_BEND],
        };
        self.voices
            .render(&mut self.mono[from..to], &mut self.scratch[from..to], &ctx);
    }

    fn mix_transport(&mut self, frames: usize) {
        let got = self.transport.read(
            &mut self.transport_left,
            &mut self.transport_right,
            0,
            frames,
        );

        if got < frames && self.transport_live {
            self.atomics.underruns.fetch_add(1, Ordering::Relaxed);
        }
        self.transport_live = got == frames;
        if got == 0 {
            return;
        }

        // Starved tail plays as silence
        self.transport_left[got..frames].fill(0.0);
        self.transport_right[got..frames].fill(0.0);

        let gain = self.params[params::TRANSPORT_GAIN];
        self.kernels
            .accumulate(&self.transport_left, &mut self.left, frames, gain);
        self.kernels
            .accumulate(&self.transport_right, &mut self.right, frames, gain);
    }
}
