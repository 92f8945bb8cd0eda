//! Pairwise symmetry: two equal fluid particles exchange momentum but never
//! create it, and a lone particle feels only gravity (or nothing at all).

use kernel::sph::kernel_w;
use kernel::{
    CpuKernel, InputSnapshot, ParamField, ParamValue, ParticlePlacement, Params, Phase, Scene,
    SimulationKernel,
};

fn weightless() -> Params {
    let mut params = Params::default();
    params
        .set_primary(ParamField::Gravity, ParamValue::Vec2([0.0, 0.0]))
        .unwrap();
    params
}

fn fluid(position: [f32; 2], velocity: [f32; 2]) -> ParticlePlacement {
    ParticlePlacement {
        phase: Phase::Fluid,
        mass: 1.2,
        position,
        velocity,
    }
}

#[test]
fn pair_conserves_momentum() {
    let params = weightless();
    let mut scene = Scene::new();
    scene.push(fluid([0.485, 0.5], [0.1, 0.0]));
    scene.push(fluid([0.515, 0.5], [-0.1, 0.0]));
    let mut kernel = CpuKernel::new(&scene, &params);

    for _ in 0..5 {
        kernel
            .step(&params, params.timestep(), &InputSnapshot::idle())
            .unwrap();
    }
    let p = kernel.particles();

    let momentum = [
        p.mass[0] * p.velocity[0][0] + p.mass[1] * p.velocity[1][0],
        p.mass[0] * p.velocity[0][1] + p.mass[1] * p.velocity[1][1],
    ];
    assert!(momentum[0].abs() < 1e-4, "x momentum {}", momentum[0]);
    assert!(momentum[1].abs() < 1e-4, "y momentum {}", momentum[1]);

    // Mirror images about x = 0.5.
    assert!((p.position[0][0] + p.position[1][0] - 1.0).abs() < 1e-4);
    assert!((p.density[0] - p.density[1]).abs() / p.density[0] < 1e-4);
    assert!(p.density[0] > 0.0 && p.all_finite());
}

#[test]
fn lone_particle_falls_freely() {
    let params = Params::default();
    let g = params.primary().gravity;
    let dt = params.timestep();
    let mut scene = Scene::new();
    scene.push(fluid([0.5, 0.5], [0.0, 0.0]));
    let mut kernel = CpuKernel::new(&scene, &params);

    kernel.step(&params, dt, &InputSnapshot::idle()).unwrap();
    let p = kernel.particles();

    assert!((p.velocity[0][1] - g[1] * dt).abs() < 1e-6);
    assert!((p.position[0][1] - (0.5 + g[1] * dt * dt)).abs() < 1e-6);
    assert_eq!(p.velocity[0][0], 0.0);
    assert_eq!(p.f_pressure[0], [0.0, 0.0], "self pair contributes no gradient");
}

#[test]
fn lone_particle_coasts_without_gravity() {
    let params = weightless();
    let dt = params.timestep();
    let derived = *params.derived();
    let mut scene = Scene::new();
    scene.push(fluid([0.4, 0.5], [0.2, 0.1]));
    let mut kernel = CpuKernel::new(&scene, &params);

    for _ in 0..10 {
        kernel.step(&params, dt, &InputSnapshot::idle()).unwrap();
    }
    let p = kernel.particles();

    assert_eq!(p.f_pressure[0], [0.0, 0.0]);
    assert!((p.velocity[0][0] - 0.2).abs() < 1e-6, "vx {}", p.velocity[0][0]);
    assert!((p.velocity[0][1] - 0.1).abs() < 1e-6, "vy {}", p.velocity[0][1]);
    assert!((p.position[0][0] - (0.4 + 0.2 * 10.0 * dt)).abs() < 1e-5);
    assert!((p.position[0][1] - (0.5 + 0.1 * 10.0 * dt)).abs() < 1e-5);

    let self_density = p.mass[0] * kernel_w([0.0, 0.0], derived.h, derived.sigma);
    assert!(
        (p.density[0] - self_density).abs() / self_density < 1e-5,
        "density {} vs self term {self_density}",
        p.density[0]
    );
}

#[test]
fn pointer_pushes_nearby_fluid() {
    let params = weightless();
    let mut scene = Scene::new();
    scene.push(fluid([0.5, 0.5], [0.0, 0.0]));
    let mut kernel = CpuKernel::new(&scene, &params);
    let input = InputSnapshot {
        down: true,
        position: [0.5, 0.52],
        velocity: [1.0, 0.0],
    };

    kernel.step(&params, params.timestep(), &input).unwrap();
    assert!(kernel.particles().velocity[0][0] > 0.0);
}
