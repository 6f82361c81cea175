//! Rendering engine
//!
//! - [`Engine`]: control-side facade and lifecycle
//! - [`RenderContext`]: the routine a host calls once per block
//! - [`command`]: the one-way message protocol between the two
//! - [`metrics`]: render counters and performance snapshots

pub mod command;
#[allow(clippy::module_inception)]
mod engine;
mod error;
mod gc;
pub mod metrics;
pub mod params;
mod render;
mod voice;

pub use command::{MessageKind, RenderMessage, SampleZone, StreamedData, ZoneData, MESSAGE_QUEUE_CAPACITY};
pub use engine::{Engine, EngineState, SampleLayout};
pub use error::{EngineError, EngineResult};
pub use metrics::{PerformanceSnapshot, RenderAtomics, METRICS_WINDOW};
pub use params::{ParameterRegistry, MAX_PARAMETERS};
pub use render::{sine_table, RenderContext, DEFAULT_WAVETABLE_SIZE, MAX_SAMPLE_ZONES};
pub use voice::{Voice, VoiceContext, VoicePool};
