//! Sonance Core - Real-time low-latency rendering engine

pub mod accel;
pub mod cache;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod host;
pub mod transport;
pub mod types;

pub use types::*;
