//! Command-line front end
//!
//! Runs a configured simulation headless on the chosen backend, optionally
//! comparing the CPU and GPU backends step for step or dumping the final
//! particle state as JSON.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use kernel::{compare_states, BackendKind};
use orchestrator::{Engine, Error, RunnerState, SimulationConfig, SimulationRunner};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Frames run when neither the command line nor the config sets a limit.
const DEFAULT_FRAMES: u64 = 600;

/// Headless 2-D SPH fluid solver
#[derive(Debug, Parser)]
#[command(name = "wavescape", version)]
struct Cli {
    /// JSON configuration file; the dam break is used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured backend (cpu or gpu)
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Number of macro-steps to run
    #[arg(short, long)]
    frames: Option<u64>,

    /// Run CPU and GPU side by side and report their divergence
    #[arg(long)]
    compare: bool,

    /// Write the final particle state to this file as JSON
    #[arg(long)]
    dump: Option<PathBuf>,
}

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let mut config = match &cli.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(kind) = cli.backend {
        config.backend = kind;
    }
    let frames = cli.frames.or(config.max_frames).unwrap_or(DEFAULT_FRAMES);

    tracing::info!(
        name = %config.name,
        backend = %config.backend,
        frames,
        "starting wavescape"
    );

    let engine = if cli.compare {
        compare(&config, frames)?
    } else {
        run_headless(&config, frames)?
    };

    if let Some(path) = &cli.dump {
        dump_state(&engine, path)?;
    }
    Ok(())
}

/// Drive one engine on the runner thread until the frame limit.
fn run_headless(config: &SimulationConfig, frames: u64) -> Result<Engine, Error> {
    let engine = Engine::from_config(config)?;
    let particles = engine.particle_count();
    let runner = SimulationRunner::new(engine, Some(frames));

    let started = Instant::now();
    runner.start();
    while runner.state() == RunnerState::Running {
        thread::sleep(Duration::from_millis(20));
    }
    if let Some(message) = runner.error_message() {
        tracing::error!("simulation stopped: {message}");
    }
    let engine = runner.join()?;
    let elapsed = started.elapsed().as_secs_f64();

    let state = engine.read_state()?;
    tracing::info!(
        particles,
        frames = engine.frames(),
        sim_time = engine.sim_time(),
        ms_per_frame = 1e3 * elapsed / engine.frames().max(1) as f64,
        finite = state.all_finite(),
        "run complete"
    );
    Ok(engine)
}

/// Step CPU and GPU engines in lockstep, logging the divergence every frame.
fn compare(config: &SimulationConfig, frames: u64) -> Result<Engine, Error> {
    let cpu_config = SimulationConfig {
        backend: BackendKind::Cpu,
        ..config.clone()
    };
    let gpu_config = SimulationConfig {
        backend: BackendKind::Gpu,
        ..config.clone()
    };
    let mut cpu = Engine::from_config(&cpu_config)?;
    let mut gpu = Engine::from_config(&gpu_config)?;

    let mut worst = 0.0_f32;
    for frame in 1..=frames {
        cpu.step(0.0)?;
        gpu.step(0.0)?;
        let divergence = compare_states(&cpu.read_state()?, &gpu.read_state()?);
        worst = worst.max(divergence.max_relative());
        if let Some(field) = divergence.worst() {
            tracing::debug!(
                frame,
                field = field.field.layout().name,
                max_relative = field.max_relative,
                index = ?field.index,
                "backend divergence"
            );
        }
        if divergence.non_finite {
            tracing::warn!(frame, "non-finite values in backend state");
            break;
        }
    }

    tracing::info!(frames, max_relative = worst, "comparison complete");
    Ok(gpu)
}

fn dump_state(engine: &Engine, path: &Path) -> Result<(), Error> {
    let state = engine.read_state()?;
    let file = File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), &state)?;
    tracing::info!(path = %path.display(), particles = state.len(), "state dumped");
    Ok(())
}
