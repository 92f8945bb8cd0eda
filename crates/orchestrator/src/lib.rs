//! Orchestration Layer
//!
//! This crate drives the SPH kernel as an application:
//! - JSON configuration and scene construction
//! - Pointer tracking for interactive forcing
//! - The frame-level engine (run, pause, single step, reset)
//! - A background runner with lifecycle management

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod pointer;
pub mod runner;
pub mod scene;

pub use config::{ConfigError, SimulationConfig};
pub use engine::Engine;
pub use pointer::PointerTracker;
pub use runner::{RunnerState, SimulationRunner};

use std::path::Path;

use kernel::{KernelError, ParamError};
use thiserror::Error;

/// Errors surfaced by the orchestration layer
#[derive(Debug, Error)]
pub enum Error {
    /// Loading or validating the configuration failed
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The backend failed to initialize or step
    #[error(transparent)]
    Kernel(#[from] KernelError),
    /// A parameter change was rejected
    #[error(transparent)]
    Param(#[from] ParamError),
    /// Writing output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serializing output failed
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The runner thread panicked
    #[error("simulation thread panicked")]
    RunnerPanicked,
    /// The runner thread has already exited
    #[error("simulation thread is no longer running")]
    RunnerStopped,
}

/// Create a complete simulation from a configuration file
///
/// This function performs the full simulation setup pipeline:
/// 1. Load and validate the configuration
/// 2. Build the initial scene
/// 3. Create the configured backend inside an [`Engine`]
/// 4. Wrap it in a `SimulationRunner` for lifecycle management
///
/// # Example
/// ```no_run
/// use orchestrator::create_simulation;
///
/// let runner = create_simulation("configs/dam_break.json")?;
/// runner.start();
/// // ... query status, pause, resume, etc.
/// # Ok::<(), orchestrator::Error>(())
/// ```
pub fn create_simulation(config_path: impl AsRef<Path>) -> Result<SimulationRunner, Error> {
    let config_path = config_path.as_ref();
    tracing::info!("Creating simulation from config: {}", config_path.display());

    // 1. Load and validate configuration
    let config = SimulationConfig::load(config_path)?;
    tracing::info!("Configuration loaded: {}", config.name);

    // 2-3. Scene and backend
    let engine = Engine::from_config(&config)?;
    tracing::info!(
        "Engine ready: {} particles on the {} backend",
        engine.particle_count(),
        engine.backend_kind()
    );

    // 4. Wrap in SimulationRunner
    let runner = SimulationRunner::new(engine, config.max_frames);
    tracing::info!("Simulation ready to start");
    Ok(runner)
}
