//! CPAL output stream host
//!
//! The stream callback owns nothing itself: the routine lives behind a
//! mutex shared with the host so it can be handed back on detach. The
//! callback only ever `try_lock`s; if the control side happens to hold the
//! lock it writes silence for that period instead of waiting.

use super::{HostError, HostResult, RenderHost};
use crate::engine::RenderContext;
use crate::types::{StereoBuffer, MAX_BLOCK_SIZE};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

struct CallbackState {
    routine: RenderContext,
    buffer: StereoBuffer,
}

/// Host driven by a CPAL output device
pub struct CpalHost {
    device_name: Option<String>,
    stream: Option<Stream>,
    state: Option<Arc<Mutex<CallbackState>>>,
    /// Callback-to-playback delay reported by the device, in microseconds
    latency_us: Arc<AtomicU64>,
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalHost {
    /// Use the system default output device
    pub fn new() -> Self {
        Self {
            device_name: None,
            stream: None,
            state: None,
            latency_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Use the output device with this name
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            ..Self::new()
        }
    }

    fn device(&self) -> HostResult<cpal::Device> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_output_device()
                .ok_or_else(|| HostError::Device("no default output device".to_string())),
            Some(wanted) => host
                .output_devices()
                .map_err(|e| HostError::Device(e.to_string()))?
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false))
                .ok_or_else(|| HostError::Device(format!("output device not found: {wanted}"))),
        }
    }
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    state: Arc<Mutex<CallbackState>>,
    latency_us: Arc<AtomicU64>,
) -> HostResult<Stream> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                let timestamp = info.timestamp();
                if let Some(delay) = timestamp.playback.duration_since(&timestamp.callback) {
                    latency_us.store(delay.as_micros() as u64, Ordering::Relaxed);
                }

                let Ok(mut guard) = state.try_lock() else {
                    data.fill(0.0);
                    return;
                };
                let CallbackState { routine, buffer } = &mut *guard;

                for chunk in data.chunks_mut(MAX_BLOCK_SIZE * channels) {
                    let n_frames = chunk.len() / channels;
                    buffer.set_len_from_capacity(n_frames);
                    routine.process(buffer);

                    for (frame, sample) in chunk.chunks_mut(channels).zip(buffer.as_slice()) {
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| HostError::StreamBuild(e.to_string()))
}

impl RenderHost for CpalHost {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn install(&mut self, routine: RenderContext, block_size: usize, sample_rate: u32) -> HostResult<()> {
        if self.stream.is_some() {
            return Err(HostError::AlreadyInstalled);
        }
        let device = self.device()?;
        let config = StreamConfig {
            channels: 2,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Fixed(block_size as u32),
        };

        let state = Arc::new(Mutex::new(CallbackState {
            routine,
            buffer: StereoBuffer::with_capacity(MAX_BLOCK_SIZE),
        }));
        let stream = build_output_stream(&device, &config, Arc::clone(&state), Arc::clone(&self.latency_us))?;
        // Some backends start immediately on build
        if let Err(e) = stream.pause() {
            log::debug!("Could not pause new stream: {}", e);
        }

        log::info!(
            "Output stream on '{}' ({} frames @ {} Hz)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            block_size,
            sample_rate
        );
        self.stream = Some(stream);
        self.state = Some(state);
        Ok(())
    }

    fn resume(&mut self) -> HostResult<()> {
        let stream = self.stream.as_ref().ok_or(HostError::NotInstalled)?;
        stream.play().map_err(|e| HostError::StreamControl(e.to_string()))
    }

    fn suspend(&mut self) -> HostResult<()> {
        let stream = self.stream.as_ref().ok_or(HostError::NotInstalled)?;
        stream.pause().map_err(|e| HostError::StreamControl(e.to_string()))
    }

    fn detach(&mut self) -> HostResult<Option<RenderContext>> {
        // Dropping the stream drops the callback and its state reference
        drop(self.stream.take());
        let Some(state) = self.state.take() else {
            return Ok(None);
        };
        let mutex = Arc::try_unwrap(state)
            .map_err(|_| HostError::StreamControl("stream callback still alive".to_string()))?;
        let state = mutex.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(Some(state.routine))
    }

    fn output_latency_ms(&self) -> f64 {
        self.latency_us.load(Ordering::Relaxed) as f64 / 1000.0
    }
}
