//! 2-D SPH Fluid Simulation Kernel
//!
//! This crate holds the simulation core: parameters, particle storage, the
//! spatial-hash neighbor index, the six-stage SPH step and two backends that
//! run it, a scalar CPU loop and a wgpu compute pipeline, which agree to within
//! floating-point tolerance from the same initial state.
//!
//! # Modules
//! - [`params`] -- Primary tunables and the constants derived from them.
//! - [`particle`] -- Struct-of-arrays particle storage, `Phase` and `Scene`.
//! - [`neighbor`] -- Uniform-grid spatial hash: sorted `(key, index)` pairs plus a cell table.
//! - [`sph`] -- Cubic-spline kernel and the six per-substep stages.
//! - [`eos`] -- Tait equation of state and its inverse.
//! - [`substep`] -- Splitting a macro-step into stable substeps.
//! - [`input`] -- Per-frame pointer snapshot.
//! - [`sort_network`] -- Batcher odd-even merge schedule used by the device sort.
//! - [`ping_pong`] -- Double-buffered state with a flipping read index.
//! - [`shader`] -- Dependency-tracked WGSL composition and binding resolution.
//! - [`transfer`] -- Host/device copy contract per field.
//! - [`compare`] -- Cross-backend state comparison.
//! - `gpu` -- wgpu compute backend (feature `gpu`).

#![warn(missing_docs)]

pub mod compare;
pub mod eos;
pub mod input;
pub mod neighbor;
pub mod params;
pub mod particle;
pub mod ping_pong;
pub mod shader;
pub mod sort_network;
pub mod sph;
pub mod substep;
pub mod transfer;

#[cfg(feature = "gpu")]
#[allow(missing_docs)]
pub mod gpu;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use compare::{compare_states, StateDivergence};
pub use input::InputSnapshot;
pub use neighbor::NeighborGrid;
pub use params::{ParamError, ParamField, ParamValue, Params, PrimaryParams};
pub use particle::{ParticleArrays, ParticlePlacement, Phase, Scene};
pub use substep::SubstepPlan;

#[cfg(feature = "gpu")]
pub use gpu::{GpuError, GpuKernel};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by a simulation backend.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Rejected parameter.
    #[error(transparent)]
    Param(#[from] ParamError),
    /// Device initialization, pipeline creation or readback failed.
    #[cfg(feature = "gpu")]
    #[error(transparent)]
    Gpu(#[from] GpuError),
    /// Shader composition or binding failed.
    #[error(transparent)]
    Shader(#[from] shader::ShaderError),
    /// Device bytes did not decode.
    #[error(transparent)]
    Transfer(#[from] transfer::TransferError),
    /// The GPU backend was requested from a build without the `gpu` feature.
    #[error("GPU backend requested but the `gpu` feature is disabled")]
    GpuFeatureDisabled,
}

// ---------------------------------------------------------------------------
// SimulationKernel trait
// ---------------------------------------------------------------------------

/// Trait that both simulation back-ends implement.
///
/// A `SimulationKernel` owns particle state. Each call to
/// [`SimulationKernel::step`] is one macro-step:
///
/// 1. Neighbor index rebuild from current positions
/// 2. Substep planning from the current peak speed
/// 3. Per substep: density, velocity guess, pressure, pressure force,
///    velocity update, advection
pub trait SimulationKernel {
    /// Replace all particle state with the scene's placements.
    fn reset(&mut self, scene: &Scene) -> Result<(), KernelError>;

    /// Advance one macro-step of length `dt`.
    fn step(&mut self, params: &Params, dt: f32, input: &InputSnapshot) -> Result<(), KernelError>;

    /// Copy of the current particle state. Blocking on the GPU backend.
    fn read_state(&self) -> Result<ParticleArrays, KernelError>;

    /// Number of particles.
    fn particle_count(&self) -> usize;
}

// ---------------------------------------------------------------------------
// CpuKernel -- reference CPU implementation of SimulationKernel
// ---------------------------------------------------------------------------

/// Reference CPU implementation: single-threaded scalar loops in particle
/// index order.
#[derive(Debug, Clone)]
pub struct CpuKernel {
    particles: ParticleArrays,
    grid: NeighborGrid,
}

impl CpuKernel {
    /// Kernel holding `scene`, with a neighbor grid shaped by `params`.
    pub fn new(scene: &Scene, params: &Params) -> Self {
        Self {
            particles: ParticleArrays::from_scene(scene),
            grid: NeighborGrid::new(params),
        }
    }

    /// Current particle state.
    pub fn particles(&self) -> &ParticleArrays {
        &self.particles
    }

    /// Neighbor index built at the start of the last macro-step.
    pub fn neighbor_index(&self) -> &NeighborGrid {
        &self.grid
    }

    fn substep(&mut self, params: &Params, dt: f32, input: &InputSnapshot) {
        let particles = &mut self.particles;
        let grid = &self.grid;
        sph::compute_density(particles, grid, params);
        sph::compute_velocity_guess(particles, grid, params, dt, input);
        sph::compute_pressure(particles, grid, params);
        sph::compute_pressure_force(particles, grid, params);
        sph::update_velocity(particles, grid, params, dt);
        sph::advect(particles, dt);
    }
}

impl SimulationKernel for CpuKernel {
    fn reset(&mut self, scene: &Scene) -> Result<(), KernelError> {
        self.particles = ParticleArrays::from_scene(scene);
        tracing::info!(
            particles = self.particles.len(),
            fluid = self.particles.fluid_count(),
            "CPU kernel reset"
        );
        Ok(())
    }

    fn step(&mut self, params: &Params, dt: f32, input: &InputSnapshot) -> Result<(), KernelError> {
        if self.particles.is_empty() {
            return Ok(());
        }

        self.grid.rebuild(&self.particles.position, params);
        let peak = sph::max_speed(&self.particles.velocity);
        let mut plan = SubstepPlan::new(params, dt, peak);
        for chunk in plan.by_ref() {
            self.substep(params, chunk, input);
        }

        tracing::debug!(
            substeps = plan.taken(),
            stable_dt = plan.stable_dt(),
            peak_speed = peak,
            "CPU macro-step"
        );
        if plan.remaining() > 0.0 {
            tracing::warn!(
                remaining = plan.remaining(),
                substeps = plan.taken(),
                "substep cap reached, frame under-resolved"
            );
        }
        Ok(())
    }

    fn read_state(&self) -> Result<ParticleArrays, KernelError> {
        Ok(self.particles.clone())
    }

    fn particle_count(&self) -> usize {
        self.particles.len()
    }
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// Which backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Scalar CPU loops.
    #[default]
    Cpu,
    /// wgpu compute passes.
    Gpu,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            BackendKind::Cpu => "cpu",
            BackendKind::Gpu => "gpu",
        })
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(BackendKind::Cpu),
            "gpu" => Ok(BackendKind::Gpu),
            other => Err(format!("unknown backend `{other}`, expected `cpu` or `gpu`")),
        }
    }
}

/// The closed set of backends behind one [`SimulationKernel`] interface.
pub enum SimulationBackend {
    /// Reference CPU backend.
    Cpu(CpuKernel),
    /// wgpu compute backend.
    #[cfg(feature = "gpu")]
    Gpu(GpuKernel),
}

impl SimulationBackend {
    /// Build the requested backend holding `scene`.
    ///
    /// GPU initialization failures are returned as-is; callers that want the
    /// CPU backend instead must ask for it.
    pub fn create(kind: BackendKind, scene: &Scene, params: &Params) -> Result<Self, KernelError> {
        match kind {
            BackendKind::Cpu => Ok(SimulationBackend::Cpu(CpuKernel::new(scene, params))),
            #[cfg(feature = "gpu")]
            BackendKind::Gpu => Ok(SimulationBackend::Gpu(GpuKernel::new(scene, params)?)),
            #[cfg(not(feature = "gpu"))]
            BackendKind::Gpu => Err(KernelError::GpuFeatureDisabled),
        }
    }

    /// Which variant this is.
    pub fn kind(&self) -> BackendKind {
        match self {
            SimulationBackend::Cpu(_) => BackendKind::Cpu,
            #[cfg(feature = "gpu")]
            SimulationBackend::Gpu(_) => BackendKind::Gpu,
        }
    }
}

impl SimulationKernel for SimulationBackend {
    fn reset(&mut self, scene: &Scene) -> Result<(), KernelError> {
        match self {
            SimulationBackend::Cpu(k) => k.reset(scene),
            #[cfg(feature = "gpu")]
            SimulationBackend::Gpu(k) => k.reset(scene),
        }
    }

    fn step(&mut self, params: &Params, dt: f32, input: &InputSnapshot) -> Result<(), KernelError> {
        match self {
            SimulationBackend::Cpu(k) => k.step(params, dt, input),
            #[cfg(feature = "gpu")]
            SimulationBackend::Gpu(k) => k.step(params, dt, input),
        }
    }

    fn read_state(&self) -> Result<ParticleArrays, KernelError> {
        match self {
            SimulationBackend::Cpu(k) => k.read_state(),
            #[cfg(feature = "gpu")]
            SimulationBackend::Gpu(k) => k.read_state(),
        }
    }

    fn particle_count(&self) -> usize {
        match self {
            SimulationBackend::Cpu(k) => k.particle_count(),
            #[cfg(feature = "gpu")]
            SimulationBackend::Gpu(k) => k.particle_count(),
        }
    }
}
