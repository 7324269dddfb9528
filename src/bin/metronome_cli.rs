//! Deterministic recording harness for the metronome engine.
//!
//! Drives a full `Controller` lifecycle against `DesktopStubBackend` —
//! no audio hardware required — so the render/record path can be exercised
//! from the command line. A `clap` subcommand dispatcher returning
//! `anyhow::Result<ExitCode>`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metronome_engine::backend::DesktopStubBackend;
use metronome_engine::config::EngineConfig;
use metronome_engine::controller::Controller;
use rand::Rng;

#[derive(Parser, Debug)]
#[command(name = "metronome_cli", about = "Deterministic metronome/recording harness")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a click track to a WAV file for a fixed duration
    Record {
        #[arg(long, default_value_t = 120)]
        bpm: u32,
        #[arg(long, default_value_t = 4)]
        time_signature: u32,
        #[arg(long, default_value_t = 2.0)]
        duration_secs: f32,
        #[arg(long)]
        output: PathBuf,
    },
    /// Print the default engine configuration as JSON
    DumpConfig,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Record {
            bpm,
            time_signature,
            duration_secs,
            output,
        } => run_record(bpm, time_signature, duration_secs, output),
        Commands::DumpConfig => run_dump_config(),
    }
}

fn run_record(bpm: u32, time_signature: u32, duration_secs: f32, output: PathBuf) -> Result<ExitCode> {
    let controller = Controller::new(
        Box::new(DesktopStubBackend::new()),
        EngineConfig::default(),
        bpm,
        time_signature,
    );

    let click_path = synthesize_click_wav().context("synthesizing a click fixture")?;
    controller
        .set_audio_file(&click_path, None)
        .context("loading synthetic click")?;

    controller.init().context("starting the desktop stub backend")?;
    controller.play();
    controller
        .start_recording(output.clone())
        .context("arming recording")?;

    thread::sleep(Duration::from_secs_f32(duration_secs));

    let summary = controller.stop_recording().context("finalizing recording")?;
    controller.destroy().context("stopping the backend")?;
    let _ = std::fs::remove_file(&click_path);

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::from(0))
}

fn run_dump_config() -> Result<ExitCode> {
    let config = EngineConfig::default();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(ExitCode::from(0))
}

/// Build a short synthetic click WAV (a decaying noise burst) so the CLI can
/// demo a full recording lifecycle without shipping a bundled click sample.
fn synthesize_click_wav() -> Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("metronome_cli_click_{}.wav", std::process::id()));
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 48_000,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    let mut rng = rand::thread_rng();
    let frames = 480; // 10ms burst
    for i in 0..frames {
        let envelope = 1.0 - (i as f32 / frames as f32);
        let noise: f32 = rng.gen_range(-1.0..1.0);
        writer.write_sample(noise * envelope * 0.8)?;
    }
    writer.finalize()?;
    Ok(path)
}
