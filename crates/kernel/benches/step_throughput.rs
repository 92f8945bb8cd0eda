//! Macro-step throughput of both backends on a dam-break sized scene.
//!
//! Run with: cargo bench -p wavescape-kernel --bench step_throughput

use std::time::Instant;

use kernel::{
    BackendKind, InputSnapshot, ParticlePlacement, Params, Phase, Scene, SimulationBackend,
    SimulationKernel,
};

fn block(params: &Params, target: usize) -> Scene {
    let spacing = 2.0 * params.primary().particle_radius;
    let mass = params.primary().rest_density * spacing * spacing;
    let side = (target as f32).sqrt().ceil() as usize;
    let mut scene = Scene::new();
    for iy in 0..side {
        for ix in 0..side {
            scene.push(ParticlePlacement {
                phase: Phase::Fluid,
                mass,
                position: [0.05 + ix as f32 * spacing, 0.05 + iy as f32 * spacing],
                velocity: [0.0, 0.0],
            });
        }
    }
    scene
}

fn main() {
    println!("=== Step Throughput ===\n");
    println!("{:>8} {:>10} {:>8} {:>12}", "Backend", "Particles", "Steps", "ms/step");

    let params = Params::default();
    for &(n, steps) in &[(400_usize, 50_usize), (1_600, 20)] {
        let scene = block(&params, n);
        for kind in [BackendKind::Cpu, BackendKind::Gpu] {
            let mut backend = match SimulationBackend::create(kind, &scene, &params) {
                Ok(backend) => backend,
                Err(e) => {
                    println!("{kind:>8} unavailable: {e}");
                    continue;
                }
            };

            // Warmup
            for _ in 0..2 {
                backend
                    .step(&params, params.timestep(), &InputSnapshot::idle())
                    .unwrap();
            }
            let _ = backend.read_state().unwrap();

            let start = Instant::now();
            for _ in 0..steps {
                backend
                    .step(&params, params.timestep(), &InputSnapshot::idle())
                    .unwrap();
            }
            // Readback forces completion of queued GPU work.
            let _ = backend.read_state().unwrap();
            let elapsed = start.elapsed().as_secs_f64();

            println!(
                "{:>8} {:>10} {:>8} {:>12.3}",
                kind,
                backend.particle_count(),
                steps,
                elapsed * 1000.0 / steps as f64
            );
        }
    }
}
