//! Boid Orchestra headless runner
//!
//! Drives the simulation at a fixed frame rate against a logging instrument
//! and reports what was played. Useful for tuning settings without an audio
//! or graphics host.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use boid_orchestra::consts::TARGET_TICK_RATE;
use boid_orchestra::sim::{Command, TickInput, VoiceKind, tick};
use boid_orchestra::{FrameSnapshot, LogInstrument, Settings, SimEvent, Simulation};

#[derive(Parser)]
#[command(name = "boid-orchestra")]
#[command(about = "Run the flocking sequencer headless and log its output")]
struct Args {
    /// Settings file (JSON); defaults are used when absent or invalid
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Random seed
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of frames to simulate
    #[arg(short, long, default_value = "1800")]
    ticks: u64,

    /// Simulated frame rate
    #[arg(long, default_value_t = TARGET_TICK_RATE as f32)]
    fps: f32,

    /// Random per-frame timing jitter in milliseconds
    #[arg(long, default_value = "0")]
    jitter_ms: f32,

    /// Leave the beat clock stopped (spatial triggers only)
    #[arg(long)]
    stopped: bool,

    /// Voices to disable (hihat, kick, piano, bass); repeatable
    #[arg(long = "mute")]
    muted: Vec<String>,

    /// Write the final frame snapshot as JSON
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write the effective settings as JSON and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct RunStats {
    steps: u64,
    voices: u64,
    segment_attacks: u64,
    clusters: u64,
}

impl RunStats {
    fn record(&mut self, events: &[SimEvent]) {
        for event in events {
            match event {
                SimEvent::Step { .. } => self.steps += 1,
                SimEvent::Voice { .. } => self.voices += 1,
                SimEvent::SegmentOn { .. } => self.segment_attacks += 1,
                SimEvent::ClusterFormed { .. } => self.clusters += 1,
                _ => {}
            }
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    log::info!("Boid Orchestra (headless) starting...");

    let settings = Settings::load_or_default(args.config.as_deref());
    if let Some(path) = &args.write_config {
        return match settings.sanitized().save(path) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                log::error!("{err}");
                ExitCode::FAILURE
            }
        };
    }

    let mut commands = Vec::new();
    for name in &args.muted {
        match VoiceKind::from_str(name) {
            Some(kind) => commands.push(Command::SetVoiceEnabled(kind, false)),
            None => log::warn!("Unknown voice '{name}', ignoring"),
        }
    }
    if !args.stopped {
        commands.push(Command::TogglePlay);
    }

    let mut sim = Simulation::new(settings, args.seed);
    let mut instrument = LogInstrument::default();
    // Separate stream so jitter never perturbs the simulation's own draws
    let mut jitter_rng = Pcg32::seed_from_u64(args.seed ^ 0x9E37_79B9_7F4A_7C15);
    let frame_ms = 1000.0 / args.fps.max(1.0);
    let jitter = args.jitter_ms.abs();
    let mut stats = RunStats::default();

    let mut input = TickInput { commands };
    for _ in 0..args.ticks {
        let offset = if jitter > 0.0 {
            jitter_rng.random_range(-jitter..=jitter)
        } else {
            0.0
        };
        tick(&mut sim, &input, frame_ms + offset, &mut instrument);
        stats.record(&sim.events);
        input.commands.clear();
    }

    log::info!(
        "{} ticks ({:.1}s): {} steps, {} voices, {} segment attacks, {} cluster blooms",
        sim.time_ticks,
        sim.elapsed_ms / 1000.0,
        stats.steps,
        stats.voices,
        stats.segment_attacks,
        stats.clusters
    );
    log::info!(
        "Instrument saw {} voices, {} starts, {} stops; {} still sounding",
        instrument.voices,
        instrument.starts,
        instrument.stops,
        sim.dispatcher().sounding()
    );

    if let Some(path) = &args.snapshot {
        let snapshot = FrameSnapshot::capture(&sim);
        let written = snapshot
            .to_json()
            .map_err(|err| err.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|err| err.to_string()));
        if let Err(err) = written {
            log::error!("Failed to write snapshot to {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
        log::info!("Snapshot written to {}", path.display());
    }

    ExitCode::SUCCESS
}
