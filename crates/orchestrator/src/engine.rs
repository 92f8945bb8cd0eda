//! Interactive engine
//!
//! The [`Engine`] owns everything one simulation needs between frames: the
//! parameters, the backend holding particle state, and the pointer tracker.
//! Each call to [`Engine::step`] is one frame: the pointer is sampled, and
//! if the engine is running (or a single step was requested) one macro-step
//! of `params.timestep()` is executed.

use kernel::{
    BackendKind, InputSnapshot, KernelError, ParamError, ParamField, ParamValue, ParticleArrays,
    ParticlePlacement, Params, Scene, SimulationBackend, SimulationKernel,
};

use crate::config::SimulationConfig;
use crate::pointer::PointerTracker;
use crate::scene;
use crate::Error;

/// One simulation with its frame-level controls.
pub struct Engine {
    params: Params,
    backend: SimulationBackend,
    scene: Scene,
    pointer: PointerTracker,
    running: bool,
    single_step: bool,
    frames: u64,
    sim_time: f64,
}

impl Engine {
    /// Engine running `scene` on the requested backend. Starts running.
    pub fn new(kind: BackendKind, params: Params, scene: Scene) -> Result<Self, KernelError> {
        let backend = SimulationBackend::create(kind, &scene, &params)?;
        tracing::info!(
            backend = %kind,
            particles = scene.len(),
            timestep = params.timestep(),
            "engine created"
        );
        Ok(Self {
            params,
            backend,
            scene,
            pointer: PointerTracker::new(),
            running: true,
            single_step: false,
            frames: 0,
            sim_time: 0.0,
        })
    }

    /// Default parameters and the dam-break scene.
    pub fn dam_break(kind: BackendKind) -> Result<Self, KernelError> {
        let params = Params::default();
        let scene = scene::dam_break(&params);
        Self::new(kind, params, scene)
    }

    /// Engine described by a validated configuration.
    pub fn from_config(config: &SimulationConfig) -> Result<Self, Error> {
        config.validate()?;
        let params = config.params()?;
        Ok(Self::new(config.backend, params, config.build_scene())?)
    }

    /// One frame. `real_dt` is the wall-clock time since the previous frame
    /// and only feeds the pointer velocity. Returns whether a macro-step ran.
    pub fn step(&mut self, real_dt: f32) -> Result<bool, KernelError> {
        let input = self.pointer.update(real_dt);
        if !(self.running || self.single_step) {
            return Ok(false);
        }
        self.single_step = false;

        let dt = self.params.timestep();
        self.backend.step(&self.params, dt, &input)?;
        self.frames += 1;
        self.sim_time += dt as f64;
        Ok(true)
    }

    /// Flip between running and paused. Returns the new state.
    pub fn toggle_running(&mut self) -> bool {
        self.running = !self.running;
        self.running
    }

    /// Run or pause explicitly.
    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Whether frames advance the simulation.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Advance exactly one macro-step on the next frame, even while paused.
    pub fn single_step(&mut self) {
        self.single_step = true;
    }

    /// Replace all particle state with `scene`. Counters restart at zero.
    pub fn reset_scene(&mut self, scene: Scene) -> Result<(), KernelError> {
        self.backend.reset(&scene)?;
        self.scene = scene;
        self.frames = 0;
        self.sim_time = 0.0;
        Ok(())
    }

    /// Reload the scene the engine was last reset with.
    pub fn restart(&mut self) -> Result<(), KernelError> {
        self.reset_scene(self.scene.clone())
    }

    /// Change one primary parameter. On error nothing changes.
    pub fn set_param(&mut self, field: ParamField, value: ParamValue) -> Result<(), ParamError> {
        self.params.set_primary(field, value)?;
        tracing::debug!(%field, ?value, "parameter updated");
        Ok(())
    }

    /// Move the current particle state onto another backend.
    pub fn switch_backend(&mut self, kind: BackendKind) -> Result<(), KernelError> {
        if kind == self.backend.kind() {
            return Ok(());
        }
        let carried = scene_from_state(&self.backend.read_state()?);
        self.backend = SimulationBackend::create(kind, &carried, &self.params)?;
        tracing::info!(backend = %kind, particles = carried.len(), "backend switched");
        Ok(())
    }

    /// Pointer pressed at `position`.
    pub fn pointer_down(&mut self, position: [f32; 2]) {
        self.pointer.press(position);
    }

    /// Pointer moved to `position`.
    pub fn pointer_move(&mut self, position: [f32; 2]) {
        self.pointer.move_to(position);
    }

    /// Pointer released.
    pub fn pointer_up(&mut self) {
        self.pointer.release();
    }

    /// Pointer state as of the last frame.
    pub fn input(&self) -> InputSnapshot {
        self.pointer.snapshot()
    }

    /// Copy of the particle state. Blocking on the GPU backend.
    pub fn read_state(&self) -> Result<ParticleArrays, KernelError> {
        self.backend.read_state()
    }

    /// Current parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Backend in use.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Number of particles.
    pub fn particle_count(&self) -> usize {
        self.backend.particle_count()
    }

    /// Macro-steps executed since the last reset.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Simulated time since the last reset.
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }
}

/// Placements reproducing the persistent fields of `state`.
fn scene_from_state(state: &ParticleArrays) -> Scene {
    let placements = (0..state.len())
        .map(|i| ParticlePlacement {
            phase: state.phase[i],
            mass: state.mass[i],
            position: state.position[i],
            velocity: state.velocity[i],
        })
        .collect();
    Scene { placements }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::Phase;

    fn small_engine() -> Engine {
        let params = Params::default();
        let scene = scene::fill_rect([0.3, 0.3], [0.5, 0.5], 0.02, 3000.0, Phase::Fluid);
        Engine::new(BackendKind::Cpu, params, scene).unwrap()
    }

    #[test]
    fn running_engine_advances_each_frame() {
        let mut engine = small_engine();
        assert!(engine.is_running());
        assert!(engine.step(0.016).unwrap());
        assert!(engine.step(0.016).unwrap());
        assert_eq!(engine.frames(), 2);
        let dt = engine.params().timestep() as f64;
        assert!((engine.sim_time() - 2.0 * dt).abs() < 1e-9);
    }

    #[test]
    fn paused_engine_holds_state() {
        let mut engine = small_engine();
        assert!(!engine.toggle_running());
        let before = engine.read_state().unwrap();
        assert!(!engine.step(0.016).unwrap());
        assert_eq!(engine.read_state().unwrap(), before);
        assert_eq!(engine.frames(), 0);
    }

    #[test]
    fn single_step_advances_once_while_paused() {
        let mut engine = small_engine();
        engine.set_running(false);
        engine.single_step();
        assert!(engine.step(0.016).unwrap());
        assert!(!engine.step(0.016).unwrap());
        assert_eq!(engine.frames(), 1);
    }

    #[test]
    fn reset_restores_initial_positions() {
        let mut engine = small_engine();
        let initial = engine.read_state().unwrap();
        for _ in 0..5 {
            engine.step(0.016).unwrap();
        }
        assert_ne!(engine.read_state().unwrap().position, initial.position);

        engine.restart().unwrap();
        assert_eq!(engine.read_state().unwrap().position, initial.position);
        assert_eq!(engine.frames(), 0);
    }

    #[test]
    fn set_param_rejects_bad_values_atomically() {
        let mut engine = small_engine();
        let before = engine.params().clone();
        assert!(engine
            .set_param(ParamField::Viscosity, ParamValue::Float(f32::NAN))
            .is_err());
        assert_eq!(engine.params(), &before);

        engine
            .set_param(ParamField::LogTimestep, ParamValue::Float(-3.0))
            .unwrap();
        assert!((engine.params().timestep() - 1e-3).abs() < 1e-7);
    }

    #[test]
    fn pointer_events_reach_the_snapshot() {
        let mut engine = small_engine();
        engine.pointer_down([0.4, 0.4]);
        engine.pointer_move([0.45, 0.4]);
        engine.step(0.05).unwrap();
        let input = engine.input();
        assert!(input.down);
        assert!((input.velocity[0] - 1.0).abs() < 1e-4);
        engine.pointer_up();
        engine.step(0.05).unwrap();
        assert!(!engine.input().down);
    }

    #[test]
    fn switching_to_same_backend_keeps_state() {
        let mut engine = small_engine();
        engine.step(0.016).unwrap();
        let before = engine.read_state().unwrap();
        engine.switch_backend(BackendKind::Cpu).unwrap();
        assert_eq!(engine.read_state().unwrap(), before);
    }

    #[test]
    fn scene_from_state_keeps_persistent_fields() {
        let engine = small_engine();
        let state = engine.read_state().unwrap();
        let scene = scene_from_state(&state);
        assert_eq!(scene.len(), state.len());
        assert_eq!(scene.placements[3].position, state.position[3]);
        assert_eq!(scene.placements[3].mass, state.mass[3]);
    }
}
