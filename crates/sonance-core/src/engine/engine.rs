//! Engine facade and lifecycle
//!
//! The [`Engine`] is the control-context owner of everything: the
//! configuration, the render host, the producer ends of the message and
//! transport queues, the sample cache and the deferred-drop collector.
//! None of it is shared with other engine instances.

use super::command::{message_channel, MessageKind, RenderMessage, SampleZone, StreamedData, ZoneData};
use super::error::{EngineError, EngineResult};
use super::gc::Reclaimer;
use super::metrics::{MetricsWindow, PerformanceSnapshot, RenderAtomics};
use super::params::{ParameterRegistry, MAX_PARAMETERS};
use super::render::{sine_table, RenderContext, DEFAULT_WAVETABLE_SIZE, MAX_SAMPLE_ZONES};
use crate::accel::{self, AcceleratorBridge, Capabilities, DspKernels, SoftwareKernels};
use crate::cache::{CacheConfig, ChunkLoader, SampleCache, Samples};
use crate::config::{default_module_dir, EngineConfig};
use crate::host::{HostError, ManualHost, RenderHost, ThreadHost};
use crate::transport::{RingTransport, TransportProducer};
use basedrop::{Owned, Shared};
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::Path;
use std::sync::Arc;

/// Transport capacity in blocks
const TRANSPORT_BLOCKS: usize = 4;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Running,
    Stopped,
    /// Terminal
    Disposed,
}

/// Placement of a resident sample on the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLayout {
    /// Note at which the sample plays at its recorded pitch
    pub root_note: u8,
    pub key_low: u8,
    pub key_high: u8,
    /// Rate the sample was recorded at
    pub sample_rate: u32,
    pub looped: bool,
}

impl Default for SampleLayout {
    fn default() -> Self {
        Self {
            root_note: 60,
            key_low: 0,
            key_high: 127,
            sample_rate: 44_100,
            looped: false,
        }
    }
}

/// Where a streamed zone's chunks come from
struct StreamSource {
    sample_id: String,
    length: u64,
}

/// Control-side state that only exists between initialize and dispose
struct Running {
    messages: rtrb::Producer<RenderMessage>,
    reclaimer: Reclaimer,
    /// One entry per zone sent to the render context, in order
    zones: Vec<Option<StreamSource>>,
}

/// Real-time rendering engine
pub struct Engine {
    config: EngineConfig,
    state: EngineState,
    capabilities: Capabilities,
    acceleration_enabled: bool,
    vector_enabled: bool,

    host: Option<Box<dyn RenderHost>>,
    manual_host: Option<ManualHost>,
    live: Option<Running>,
    transport: Option<TransportProducer>,

    atomics: Arc<RenderAtomics>,
    metrics: MetricsWindow,
    params: ParameterRegistry,
    cache: SampleCache,
}

impl Engine {
    /// Create an engine; the host is chosen at [`initialize`](Self::initialize)
    pub fn new(config: EngineConfig) -> Self {
        let cache = SampleCache::new(CacheConfig::from_engine(&config));
        Self {
            config,
            state: EngineState::Uninitialized,
            capabilities: Capabilities::default(),
            acceleration_enabled: false,
            vector_enabled: false,
            host: None,
            manual_host: None,
            live: None,
            transport: None,
            atomics: Arc::new(RenderAtomics::new()),
            metrics: MetricsWindow::new(),
            params: ParameterRegistry::new(),
            cache,
        }
    }

    /// Create an engine that renders on `host`
    pub fn with_host(config: EngineConfig, host: impl RenderHost + 'static) -> Self {
        let mut engine = Self::new(config);
        engine.host = Some(Box::new(host));
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Platform capabilities found by the last `initialize()`
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Frames rendered so far
    pub fn render_clock(&self) -> u64 {
        self.atomics.clock()
    }

    /// The host created by `initialize()` when no dedicated render context
    /// was configured
    pub fn manual_host(&self) -> Option<ManualHost> {
        self.manual_host.clone()
    }

    pub fn sample_cache(&self) -> &SampleCache {
        &self.cache
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Validate the configuration and bring up the render context
    ///
    /// No-op once past `Initializing`.
    pub fn initialize(&mut self) -> EngineResult<()> {
        match self.state {
            EngineState::Disposed => return Err(EngineError::Disposed),
            EngineState::Uninitialized => {}
            _ => return Ok(()),
        }

        self.state = EngineState::Initializing;
        match self.bring_up() {
            Ok(()) => {
                self.state = EngineState::Ready;
                log::info!(
                    "Engine ready: {} Hz, {} frames, {:.2} ms block latency",
                    self.config.sample_rate,
                    self.config.block_size,
                    self.config.block_latency_ms()
                );
                Ok(())
            }
            Err(e) => {
                self.live = None;
                self.transport = None;
                self.state = EngineState::Uninitialized;
                Err(e)
            }
        }
    }

    fn bring_up(&mut self) -> EngineResult<()> {
        self.config.validate()?;

        let platform = accel::probe();
        self.capabilities = platform;
        self.vector_enabled =
            self.config.enable_vector_instructions && platform.vector_instructions_available;

        let reclaimer = Reclaimer::spawn("sonance-gc").map_err(|e| HostError::ThreadSpawn(e.to_string()))?;
        let handle = reclaimer.handle();

        let kernels = self.select_kernels();
        self.acceleration_enabled = kernels.is_accelerated();
        log::info!("Using '{}' kernels", kernels.name());

        let block_size = self.config.block_size;
        let (producer, consumer) = RingTransport::new(block_size * TRANSPORT_BLOCKS, 2).split();
        let (mut messages, message_rx) = message_channel();

        self.atomics = Arc::new(RenderAtomics::new());
        let routine = RenderContext::new(
            &self.config,
            Owned::new(&handle, kernels),
            Shared::new(&handle, sine_table(DEFAULT_WAVETABLE_SIZE)),
            consumer,
            message_rx,
            Arc::clone(&self.atomics),
        );
        if messages.push(RenderMessage::new(MessageKind::Init, 0)).is_err() {
            return Err(EngineError::QueueFull);
        }

        let dedicated = self.config.use_dedicated_render_context;
        let manual_host = &mut self.manual_host;
        let host = self.host.get_or_insert_with(|| {
            if dedicated {
                Box::new(ThreadHost::new()) as Box<dyn RenderHost>
            } else {
                let manual = ManualHost::new();
                *manual_host = Some(manual.clone());
                Box::new(manual) as Box<dyn RenderHost>
            }
        });
        host.install(routine, block_size, self.config.sample_rate)?;
        log::debug!("Render routine installed on '{}' host", host.name());

        self.transport = Some(producer);
        self.live = Some(Running {
            messages,
            reclaimer,
            zones: Vec::new(),
        });
        Ok(())
    }

    fn select_kernels(&self) -> Box<dyn DspKernels> {
        let software = || -> Box<dyn DspKernels> {
            Box::new(SoftwareKernels::for_capabilities(&Capabilities {
                acceleration_available: false,
                vector_instructions_available: self.vector_enabled,
            }))
        };

        if !self.config.enable_acceleration || !self.capabilities.acceleration_available {
            return software();
        }
        let path = match self.config.render_module_path.clone() {
            Some(path) => path,
            None => {
                let installed = default_module_dir().join(format!("{DLL_PREFIX}sonance_accel{DLL_SUFFIX}"));
                if !installed.is_file() {
                    return software();
                }
                installed
            }
        };
        match AcceleratorBridge::load(&path, self.config.accelerator_memory_budget_bytes()) {
            Some(module) => {
                if module.probe_simd() == Some(false) {
                    log::warn!("Accelerator module reports no vector support");
                }
                Box::new(module)
            }
            None => software(),
        }
    }

    /// Begin rendering
    pub fn start(&mut self) -> EngineResult<()> {
        match self.state {
            EngineState::Disposed => Err(EngineError::Disposed),
            EngineState::Uninitialized | EngineState::Initializing => Err(EngineError::Lifecycle {
                operation: "start",
                state: self.state,
            }),
            EngineState::Running => Ok(()),
            EngineState::Ready | EngineState::Stopped => {
                if let Some(host) = self.host.as_mut() {
                    host.resume()?;
                }
                self.state = EngineState::Running;
                log::info!("Engine started");
                Ok(())
            }
        }
    }

    /// Pause rendering without releasing anything
    pub fn stop(&mut self) -> EngineResult<()> {
        match self.state {
            EngineState::Disposed => Err(EngineError::Disposed),
            EngineState::Uninitialized | EngineState::Initializing => Err(EngineError::Lifecycle {
                operation: "stop",
                state: self.state,
            }),
            EngineState::Ready | EngineState::Stopped => Ok(()),
            EngineState::Running => {
                if let Some(host) = self.host.as_mut() {
                    host.suspend()?;
                }
                self.state = EngineState::Stopped;
                log::info!("Engine stopped");
                Ok(())
            }
        }
    }

    /// Tear everything down; the engine cannot be used afterwards
    pub fn dispose(&mut self) -> EngineResult<()> {
        if self.state == EngineState::Disposed {
            return Ok(());
        }

        let mut result = Ok(());
        if let Some(mut host) = self.host.take() {
            if self.state == EngineState::Running {
                if let Err(e) = host.suspend() {
                    log::warn!("Failed to suspend '{}' host: {}", host.name(), e);
                }
            }
            match host.detach() {
                Ok(routine) => drop(routine),
                Err(e) => result = Err(e.into()),
            }
        }
        self.manual_host = None;
        self.transport = None;
        self.cache.shutdown();

        if let Some(mut live) = self.live.take() {
            live.reclaimer.shutdown();
        }

        self.state = EngineState::Disposed;
        log::info!("Engine disposed");
        result
    }

    // ─────────────────────────────────────────────────────────────────────
    // Control messages
    // ─────────────────────────────────────────────────────────────────────

    fn live(&mut self, operation: &'static str) -> EngineResult<&mut Running> {
        match self.state {
            EngineState::Disposed => Err(EngineError::Disposed),
            EngineState::Uninitialized | EngineState::Initializing => Err(EngineError::Lifecycle {
                operation,
                state: self.state,
            }),
            _ => self.live.as_mut().ok_or(EngineError::Lifecycle {
                operation,
                state: self.state,
            }),
        }
    }

    fn send(&mut self, operation: &'static str, kind: MessageKind, timestamp: u64) -> EngineResult<()> {
        let live = self.live(operation)?;
        live.messages
            .push(RenderMessage::new(kind, timestamp))
            .map_err(|_| EngineError::QueueFull)
    }

    /// Start a note now (velocity 0.0..=1.0)
    pub fn note_on(&mut self, note: u8, velocity: f32, channel: u8) -> EngineResult<()> {
        let now = self.render_clock();
        self.note_on_at(note, velocity, channel, now)
    }

    /// Release a note now
    pub fn note_off(&mut self, note: u8, channel: u8) -> EngineResult<()> {
        let now = self.render_clock();
        self.note_off_at(note, channel, now)
    }

    /// Start a note at an absolute frame on the render clock
    pub fn note_on_at(&mut self, note: u8, velocity: f32, channel: u8, frame: u64) -> EngineResult<()> {
        self.send(
            "note_on",
            MessageKind::NoteOn {
                note,
                velocity,
                channel,
            },
            frame,
        )
    }

    /// Release a note at an absolute frame on the render clock
    pub fn note_off_at(&mut self, note: u8, channel: u8, frame: u64) -> EngineResult<()> {
        self.send("note_off", MessageKind::NoteOff { note, channel }, frame)
    }

    fn resolve_parameter(&mut self, name: &str) -> EngineResult<usize> {
        self.params
            .resolve(name)
            .ok_or_else(|| EngineError::TooManyParameters {
                name: name.to_string(),
                max: MAX_PARAMETERS,
            })
    }

    /// Set a named parameter
    ///
    /// Built-ins: `master_gain`, `transport_gain`, `release_ms`,
    /// `pitch_bend` (semitones). Other names get a slot on first use.
    pub fn set_parameter(&mut self, name: &str, value: f32) -> EngineResult<()> {
        self.live("set_parameter")?;
        let slot = self.resolve_parameter(name)?;
        let now = self.render_clock();
        self.send("set_parameter", MessageKind::Parameter { slot, value }, now)
    }

    /// Apply several parameters in one message
    pub fn apply_preset(&mut self, values: &[(&str, f32)]) -> EngineResult<()> {
        let handle = self.live("apply_preset")?.reclaimer.handle();
        let slots = values
            .iter()
            .map(|&(name, value)| -> EngineResult<(usize, f32)> { Ok((self.resolve_parameter(name)?, value)) })
            .collect::<EngineResult<Vec<_>>>()?;
        let now = self.render_clock();
        self.send("apply_preset", MessageKind::Preset(Owned::new(&handle, slots)), now)
    }

    fn add_zone(
        &mut self,
        operation: &'static str,
        data: impl FnOnce(&basedrop::Handle) -> ZoneData,
        layout: SampleLayout,
        source: Option<StreamSource>,
    ) -> EngineResult<usize> {
        let live = self.live(operation)?;
        if live.zones.len() >= MAX_SAMPLE_ZONES {
            return Err(EngineError::TooManyZones { max: MAX_SAMPLE_ZONES });
        }
        let zone = SampleZone {
            data: data(&live.reclaimer.handle()),
            root_note: layout.root_note,
            key_low: layout.key_low.min(layout.key_high),
            key_high: layout.key_high.max(layout.key_low),
            sample_rate: layout.sample_rate.max(1),
            looped: layout.looped,
        };
        let now = self.render_clock();
        self.send(operation, MessageKind::Sample(zone), now)?;

        let zones = &mut self.live(operation)?.zones;
        zones.push(source);
        Ok(zones.len() - 1)
    }

    /// Register a resident mono sample on a key range
    ///
    /// Returns the zone index.
    pub fn load_sample(&mut self, data: Vec<f32>, layout: SampleLayout) -> EngineResult<usize> {
        self.load_cached_sample(Samples::from(data), layout)
    }

    /// Register samples already held by the cache, without copying
    pub fn load_cached_sample(&mut self, samples: Samples, layout: SampleLayout) -> EngineResult<usize> {
        self.add_zone(
            "load_sample",
            |handle| ZoneData::Resident(Shared::new(handle, samples)),
            layout,
            None,
        )
    }

    /// Register a sample of `length` samples that plays from cache chunks
    ///
    /// Chunks are supplied with [`stream_zone_chunk`](Self::stream_zone_chunk);
    /// until one arrives its range plays as silence.
    pub fn load_streamed_sample(&mut self, sample_id: &str, length: u64, layout: SampleLayout) -> EngineResult<usize> {
        let chunk_size = self.config.chunk_size_samples;
        self.add_zone(
            "load_streamed_sample",
            |handle| ZoneData::Streamed(StreamedData::new(handle, length as usize, chunk_size)),
            layout,
            Some(StreamSource {
                sample_id: sample_id.to_string(),
                length,
            }),
        )
    }

    /// Sample range of chunk `index` of streamed zone `zone`
    fn zone_chunk(&mut self, operation: &'static str, zone: usize, index: usize) -> EngineResult<(String, u64, u64)> {
        let chunk = self.config.chunk_size_samples.max(1) as u64;
        let live = self.live(operation)?;
        match live.zones.get(zone) {
            Some(Some(source)) if (index as u64) * chunk < source.length => {
                let start = index as u64 * chunk;
                Ok((source.sample_id.clone(), start, (start + chunk).min(source.length)))
            }
            _ => Err(EngineError::NoSuchChunk { zone, index }),
        }
    }

    /// Fetch one chunk of a streamed zone through the cache and hand it to
    /// the render context
    pub async fn stream_zone_chunk<L>(&mut self, zone: usize, index: usize, loader: L) -> EngineResult<()>
    where
        L: ChunkLoader + Clone,
    {
        self.ensure_streaming("stream_zone_chunk")?;
        let (sample_id, start, end) = self.zone_chunk("stream_zone_chunk", zone, index)?;
        let samples = self.cache.request_chunk(&sample_id, start, end, loader).await?;

        let handle = self.live("stream_zone_chunk")?.reclaimer.handle();
        let data = Some(Shared::new(&handle, samples));
        let now = self.render_clock();
        self.send("stream_zone_chunk", MessageKind::ZoneChunk { zone, index, data }, now)
    }

    /// Let the render context drop one chunk of a streamed zone
    pub fn release_zone_chunk(&mut self, zone: usize, index: usize) -> EngineResult<()> {
        self.zone_chunk("release_zone_chunk", zone, index)?;
        let now = self.render_clock();
        self.send(
            "release_zone_chunk",
            MessageKind::ZoneChunk {
                zone,
                index,
                data: None,
            },
            now,
        )
    }

    /// Replace the single-cycle wavetable used when no sample zone matches
    ///
    /// An empty table is ignored.
    pub fn load_wavetable(&mut self, table: Vec<f32>) -> EngineResult<()> {
        let handle = self.live("load_wavetable")?.reclaimer.handle();
        if table.is_empty() {
            log::warn!("Ignoring empty wavetable");
            return Ok(());
        }
        let now = self.render_clock();
        self.send("load_wavetable", MessageKind::Wavetable(Shared::new(&handle, table)), now)
    }

    /// Swap in an accelerator module while running
    ///
    /// Returns `Ok(false)` if the module could not be loaded; the current
    /// kernels stay in place.
    pub fn load_module(&mut self, path: impl AsRef<Path>) -> EngineResult<bool> {
        let handle = self.live("load_module")?.reclaimer.handle();
        let Some(module) = AcceleratorBridge::load(path, self.config.accelerator_memory_budget_bytes()) else {
            return Ok(false);
        };
        let kernels: Box<dyn DspKernels> = Box::new(module);
        let now = self.render_clock();
        self.send("load_module", MessageKind::Module(Owned::new(&handle, kernels)), now)?;
        self.acceleration_enabled = true;
        Ok(true)
    }

    /// Turn callback timing collection on or off
    pub fn set_metrics_enabled(&mut self, enabled: bool) -> EngineResult<()> {
        let now = self.render_clock();
        self.send("set_metrics_enabled", MessageKind::Metrics { enabled }, now)
    }

    /// Take the write half of the transport
    ///
    /// `None` before `initialize()` or once taken.
    pub fn transport_producer(&mut self) -> Option<TransportProducer> {
        self.transport.take()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Streaming
    // ─────────────────────────────────────────────────────────────────────

    fn ensure_streaming(&self, operation: &'static str) -> EngineResult<()> {
        match self.state {
            EngineState::Disposed => return Err(EngineError::Disposed),
            EngineState::Uninitialized | EngineState::Initializing => {
                return Err(EngineError::Lifecycle {
                    operation,
                    state: self.state,
                })
            }
            EngineState::Ready | EngineState::Running | EngineState::Stopped => {}
        }
        if !self.config.enable_streaming {
            return Err(EngineError::StreamingDisabled);
        }
        Ok(())
    }

    /// Fetch samples `[start, end)` of `sample_id` through the cache
    pub async fn stream_chunk<L>(&self, sample_id: &str, start: u64, end: u64, loader: L) -> EngineResult<Samples>
    where
        L: ChunkLoader + Clone,
    {
        self.ensure_streaming("stream_chunk")?;
        Ok(self.cache.request_chunk(sample_id, start, end, loader).await?)
    }

    /// Warm the cache with the first chunk of `sample_id`
    ///
    /// Does nothing when `preload_samples` is off.
    pub async fn preload_sample<L>(&self, sample_id: &str, total_length: u64, loader: L) -> EngineResult<()>
    where
        L: ChunkLoader + Clone,
    {
        self.ensure_streaming("preload_sample")?;
        if !self.config.preload_samples {
            log::debug!("Preload disabled; skipping {}", sample_id);
            return Ok(());
        }
        Ok(self.cache.preload(sample_id, total_length, loader).await?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────

    /// Current performance figures
    pub fn get_metrics(&mut self) -> EngineResult<PerformanceSnapshot> {
        if self.state == EngineState::Disposed {
            return Err(EngineError::Disposed);
        }
        self.metrics.refresh(&self.atomics);

        let host_latency = self.host.as_ref().map_or(0.0, |h| h.output_latency_ms());
        let mut snapshot = self
            .metrics
            .snapshot(self.config.block_size, self.config.sample_rate, host_latency);
        snapshot.cache_hit_rate = self.cache.stats().hit_rate;
        snapshot.acceleration_enabled = self.acceleration_enabled;
        snapshot.vector_instructions_enabled = self.vector_enabled;
        snapshot.underruns = self.atomics.underruns();
        snapshot.overruns = self.atomics.overruns();
        snapshot.callbacks = self.atomics.callbacks();
        snapshot.active_voices = self.atomics.active_voices();
        Ok(snapshot)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            log::warn!("Engine dispose on drop failed: {}", e);
        }
    }
}
