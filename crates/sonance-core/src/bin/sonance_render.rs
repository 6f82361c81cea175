//! Sonance offline renderer
//!
//! Renders a short phrase through the engine on a caller-driven host and
//! writes it to a WAV file, then prints the engine's performance snapshot.
//!
//! ## Usage
//!
//! ```text
//! sonance-render [--config engine.yaml] [--out phrase.wav] [--seconds 4]
//! ```
//!
//! Without `--config`, `engine.yaml` in the user config directory is used
//! (defaults if it does not exist).

use anyhow::{bail, Context, Result};
use sonance_core::config::{default_config_path, load_config, EngineConfig};
use sonance_core::engine::Engine;
use sonance_core::host::ManualHost;
use std::path::PathBuf;

/// Notes of the phrase and their start times in beats
const PHRASE: [(u8, f64); 8] = [
    (48, 0.0),
    (55, 0.5),
    (60, 1.0),
    (64, 1.5),
    (67, 2.0),
    (64, 2.5),
    (60, 3.0),
    (55, 3.5),
];
const BEATS_PER_SECOND: f64 = 2.0;

struct Args {
    config: PathBuf,
    out: PathBuf,
    seconds: f64,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: default_config_path("engine.yaml"),
        out: PathBuf::from("sonance-render.wav"),
        seconds: 4.0,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(flag) = iter.next() {
        let mut value = || iter.next().with_context(|| format!("{flag} needs a value"));
        match flag.as_str() {
            "--config" => args.config = PathBuf::from(value()?),
            "--out" => args.out = PathBuf::from(value()?),
            "--seconds" => args.seconds = value()?.parse().context("--seconds must be a number")?,
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let config: EngineConfig = load_config(&args.config);
    let sample_rate = config.sample_rate;
    log::info!("sonance-render: {:?} -> {:?}", args.config, args.out);

    let host = ManualHost::new();
    let mut engine = Engine::with_host(config, host.clone());
    engine.initialize()?;
    engine.start()?;
    engine.set_parameter("master_gain", 0.5)?;
    engine.set_parameter("release_ms", 40.0)?;

    let frames_per_beat = (sample_rate as f64 / BEATS_PER_SECOND) as u64;
    for (note, beat) in PHRASE {
        let on = (beat * frames_per_beat as f64) as u64;
        engine.note_on_at(note, 0.8, 0, on)?;
        engine.note_off_at(note, 0, on + frames_per_beat * 3 / 4)?;
    }

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&args.out, spec)
        .with_context(|| format!("creating {:?}", args.out))?;

    let total_frames = (args.seconds * sample_rate as f64) as u64;
    while engine.render_clock() < total_frames {
        let block = host.render_block();
        for &sample in block.as_interleaved() {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    log::info!("Wrote {} frames to {:?}", engine.render_clock(), args.out);

    let metrics = engine.get_metrics()?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);

    engine.dispose()?;
    Ok(())
}
