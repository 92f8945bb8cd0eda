//! Simulation runner with lifecycle management
//!
//! This module provides the `SimulationRunner` which drives an [`Engine`] on
//! a background thread, including start, pause, resume, and status tracking.
//! Pointer events, parameter changes and scene resets are queued as commands
//! and applied between macro-steps, so a reset never races a step.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use kernel::{ParamField, ParamValue, ParticleArrays, Scene};

use crate::engine::Engine;
use crate::Error;

/// Runner state enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Simulation created but not yet started
    Created,
    /// Simulation actively running
    Running,
    /// Simulation paused
    Paused,
    /// Simulation finished (frame limit reached or stopped)
    Finished,
    /// Simulation encountered an error
    Error,
}

/// Work queued for the runner thread
enum Command {
    PointerDown([f32; 2]),
    PointerMove([f32; 2]),
    PointerUp,
    SetParam(ParamField, ParamValue, Sender<Result<(), Error>>),
    ResetScene(Scene, Sender<Result<(), Error>>),
    Restart,
    SingleStep,
    ReadState(Sender<Result<ParticleArrays, Error>>),
}

/// Shared state between the runner thread and control interface
struct SharedState {
    /// Current runner state
    state: RunnerState,
    /// Simulated time since the last reset (seconds)
    sim_time: f64,
    /// Number of macro-steps executed since start
    timestep_count: u64,
    /// Most recent error message (if state is Error)
    error_message: Option<String>,
}

fn lock(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for controlling and querying a running simulation
pub struct SimulationRunner {
    /// Shared state (protected by mutex)
    shared: Arc<Mutex<SharedState>>,
    /// Command queue into the runner thread
    commands: Sender<Command>,
    /// Handle to the background thread
    thread_handle: Option<thread::JoinHandle<Engine>>,
}

impl SimulationRunner {
    /// Move `engine` onto a background thread. It waits for [`start`](Self::start).
    ///
    /// # Arguments
    /// * `engine` - The engine to drive
    /// * `max_frames` - Optional maximum number of macro-steps
    pub fn new(engine: Engine, max_frames: Option<u64>) -> Self {
        let shared = Arc::new(Mutex::new(SharedState {
            state: RunnerState::Created,
            sim_time: 0.0,
            timestep_count: 0,
            error_message: None,
        }));
        let (commands, queue) = mpsc::channel();

        let shared_clone = Arc::clone(&shared);
        let thread_handle =
            thread::spawn(move || run_simulation_loop(engine, queue, shared_clone, max_frames));

        Self {
            shared,
            commands,
            thread_handle: Some(thread_handle),
        }
    }

    /// Get current runner state
    pub fn state(&self) -> RunnerState {
        lock(&self.shared).state
    }

    /// Get simulated time since the last reset (seconds)
    pub fn sim_time(&self) -> f64 {
        lock(&self.shared).sim_time
    }

    /// Get number of macro-steps executed
    pub fn timestep_count(&self) -> u64 {
        lock(&self.shared).timestep_count
    }

    /// Get error message if state is Error
    pub fn error_message(&self) -> Option<String> {
        lock(&self.shared).error_message.clone()
    }

    /// Start the simulation (transition from Created to Running)
    pub fn start(&self) {
        let mut guard = lock(&self.shared);
        if guard.state == RunnerState::Created {
            guard.state = RunnerState::Running;
        }
    }

    /// Pause the simulation
    pub fn pause(&self) {
        let mut guard = lock(&self.shared);
        if guard.state == RunnerState::Running {
            guard.state = RunnerState::Paused;
        }
    }

    /// Resume the simulation
    pub fn resume(&self) {
        let mut guard = lock(&self.shared);
        if guard.state == RunnerState::Paused {
            guard.state = RunnerState::Running;
        }
    }

    /// Ask the thread to exit after the current macro-step
    pub fn stop(&self) {
        let mut guard = lock(&self.shared);
        if matches!(
            guard.state,
            RunnerState::Created | RunnerState::Running | RunnerState::Paused
        ) {
            guard.state = RunnerState::Finished;
        }
    }

    /// Pointer pressed at `position`
    pub fn pointer_down(&self, position: [f32; 2]) {
        self.send(Command::PointerDown(position));
    }

    /// Pointer moved to `position`
    pub fn pointer_move(&self, position: [f32; 2]) {
        self.send(Command::PointerMove(position));
    }

    /// Pointer released
    pub fn pointer_up(&self) {
        self.send(Command::PointerUp);
    }

    /// Advance one macro-step while paused
    pub fn single_step(&self) {
        self.send(Command::SingleStep);
    }

    /// Reload the scene the engine was last reset with
    pub fn restart(&self) {
        self.send(Command::Restart);
    }

    /// Change one parameter between macro-steps. Blocks until applied.
    pub fn set_param(&self, field: ParamField, value: ParamValue) -> Result<(), Error> {
        self.request(|reply| Command::SetParam(field, value, reply))
    }

    /// Replace the scene between macro-steps. Blocks until applied.
    pub fn reset_scene(&self, scene: Scene) -> Result<(), Error> {
        self.request(|reply| Command::ResetScene(scene, reply))
    }

    /// Copy of the current particle state, taken between macro-steps.
    pub fn read_state(&self) -> Result<ParticleArrays, Error> {
        self.request(Command::ReadState)
    }

    /// Wait for the simulation thread to complete and take the engine back
    pub fn join(mut self) -> Result<Engine, Error> {
        let handle = self.thread_handle.take().ok_or(Error::RunnerStopped)?;
        handle.join().map_err(|_| Error::RunnerPanicked)
    }

    fn send(&self, command: Command) {
        // The thread only drops its receiver on exit; late commands are moot.
        let _ = self.commands.send(command);
    }

    fn request<T>(
        &self,
        make: impl FnOnce(Sender<Result<T, Error>>) -> Command,
    ) -> Result<T, Error> {
        let (reply, response) = mpsc::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| Error::RunnerStopped)?;
        response.recv().map_err(|_| Error::RunnerStopped)?
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        // Set state to Finished to signal thread to exit
        self.stop();
    }
}

/// Apply every queued command. Returns `false` once the handle is gone.
fn drain_commands(engine: &mut Engine, queue: &Receiver<Command>) -> bool {
    loop {
        let command = match queue.try_recv() {
            Ok(command) => command,
            Err(mpsc::TryRecvError::Empty) => return true,
            Err(mpsc::TryRecvError::Disconnected) => return false,
        };
        match command {
            Command::PointerDown(pos) => engine.pointer_down(pos),
            Command::PointerMove(pos) => engine.pointer_move(pos),
            Command::PointerUp => engine.pointer_up(),
            Command::SingleStep => engine.single_step(),
            Command::Restart => {
                if let Err(err) = engine.restart() {
                    tracing::warn!(%err, "restart failed");
                }
            }
            Command::SetParam(field, value, reply) => {
                reply_to(reply, engine.set_param(field, value).map_err(Error::from));
            }
            Command::ResetScene(scene, reply) => {
                reply_to(reply, engine.reset_scene(scene).map_err(Error::from));
            }
            Command::ReadState(reply) => {
                reply_to(reply, engine.read_state().map_err(Error::from));
            }
        }
    }
}

fn reply_to<T>(reply: Sender<Result<T, Error>>, result: Result<T, Error>) {
    if reply.send(result).is_err() {
        tracing::debug!("requester dropped before the reply was sent");
    }
}

/// Main simulation loop executed in background thread
fn run_simulation_loop(
    mut engine: Engine,
    queue: Receiver<Command>,
    shared: Arc<Mutex<SharedState>>,
    max_frames: Option<u64>,
) -> Engine {
    // Wait for start signal
    loop {
        match lock(&shared).state {
            RunnerState::Created => {}
            RunnerState::Running | RunnerState::Paused => break,
            RunnerState::Finished | RunnerState::Error => return engine,
        }
        if !drain_commands(&mut engine, &queue) {
            return engine;
        }
        thread::sleep(Duration::from_millis(10));
    }

    let start_wall_time = Instant::now();
    let mut last_frame = Instant::now();
    let mut timestep_count = 0_u64;

    loop {
        if !drain_commands(&mut engine, &queue) {
            break;
        }

        let current_state = lock(&shared).state;
        match current_state {
            RunnerState::Running | RunnerState::Paused => {
                engine.set_running(current_state == RunnerState::Running);
                let now = Instant::now();
                let real_dt = now.duration_since(last_frame).as_secs_f32();
                last_frame = now;

                let stepped = match engine.step(real_dt) {
                    Ok(stepped) => stepped,
                    Err(err) => {
                        tracing::error!(%err, "simulation step failed");
                        let mut guard = lock(&shared);
                        guard.state = RunnerState::Error;
                        guard.error_message = Some(err.to_string());
                        break;
                    }
                };

                if stepped {
                    timestep_count += 1;
                    let mut guard = lock(&shared);
                    guard.sim_time = engine.sim_time();
                    guard.timestep_count = timestep_count;
                } else {
                    // Wait while paused
                    thread::sleep(Duration::from_millis(10));
                    continue;
                }

                // Check stopping condition
                if let Some(max_steps) = max_frames {
                    if timestep_count >= max_steps {
                        tracing::info!("Simulation finished: reached max_frames = {}", max_steps);
                        lock(&shared).state = RunnerState::Finished;
                        break;
                    }
                }

                // Log progress periodically
                if timestep_count % 100 == 0 {
                    tracing::debug!(
                        "Step {}: sim_time={:.4}s, wall_time={:.2}s",
                        timestep_count,
                        engine.sim_time(),
                        start_wall_time.elapsed().as_secs_f64(),
                    );
                }
            }
            RunnerState::Finished | RunnerState::Error | RunnerState::Created => break,
        }
    }

    tracing::info!(
        "Simulation thread exiting: {} timesteps, {:.4}s simulated",
        timestep_count,
        engine.sim_time()
    );
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::{BackendKind, Params, Phase};

    fn small_engine() -> Engine {
        let params = Params::default();
        let scene = crate::scene::fill_rect([0.3, 0.3], [0.4, 0.4], 0.02, 3000.0, Phase::Fluid);
        Engine::new(BackendKind::Cpu, params, scene).unwrap()
    }

    #[test]
    fn test_runner_lifecycle() {
        let runner = SimulationRunner::new(small_engine(), Some(10));

        // Initially Created
        assert_eq!(runner.state(), RunnerState::Created);

        // Start
        runner.start();
        assert_eq!(runner.state(), RunnerState::Running);

        // Wait for completion
        let engine = runner.join().unwrap();
        assert_eq!(engine.frames(), 10);
    }

    #[test]
    fn test_runner_pause_resume() {
        let runner = SimulationRunner::new(small_engine(), Some(100_000));

        runner.start();
        thread::sleep(Duration::from_millis(50));

        // Pause
        runner.pause();
        assert_eq!(runner.state(), RunnerState::Paused);

        // Wait for pause to take effect
        thread::sleep(Duration::from_millis(50));
        let steps_paused = runner.timestep_count();
        thread::sleep(Duration::from_millis(100));

        // Should not advance while paused (allow for 1 step race condition)
        let steps_after_pause = runner.timestep_count();
        assert!(
            steps_after_pause <= steps_paused + 1,
            "Steps should not advance while paused: before={}, after={}",
            steps_paused,
            steps_after_pause
        );

        // Resume
        runner.resume();
        assert_eq!(runner.state(), RunnerState::Running);

        runner.stop();
        runner.join().unwrap();
    }

    #[test]
    fn test_single_step_while_paused() {
        let runner = SimulationRunner::new(small_engine(), None);
        runner.start();
        runner.pause();
        thread::sleep(Duration::from_millis(30));
        let before = runner.timestep_count();

        runner.single_step();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(runner.timestep_count(), before + 1);

        runner.stop();
        runner.join().unwrap();
    }

    #[test]
    fn test_commands_apply_between_steps() {
        let runner = SimulationRunner::new(small_engine(), None);
        runner.start();

        assert!(runner
            .set_param(ParamField::Viscosity, ParamValue::Float(f32::INFINITY))
            .is_err());
        runner
            .set_param(ParamField::Gravity, ParamValue::Vec2([0.0, 0.0]))
            .unwrap();

        let scene = crate::scene::fill_rect([0.1, 0.1], [0.2, 0.2], 0.02, 3000.0, Phase::Fluid);
        runner.reset_scene(scene.clone()).unwrap();
        let state = runner.read_state().unwrap();
        assert_eq!(state.len(), scene.len());

        runner.stop();
        let engine = runner.join().unwrap();
        assert_eq!(engine.params().primary().gravity, [0.0, 0.0]);
    }

    #[test]
    fn test_stop_before_start_returns_engine() {
        let runner = SimulationRunner::new(small_engine(), None);
        runner.stop();
        let engine = runner.join().unwrap();
        assert_eq!(engine.frames(), 0);
    }

    #[test]
    fn test_reply_to_dropped_requester() {
        let (reply, requester) = mpsc::channel::<Result<(), Error>>();
        drop(requester);
        reply_to(reply, Ok(()));
    }
}
