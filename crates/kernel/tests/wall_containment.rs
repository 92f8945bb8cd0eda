//! Boundary particles and the domain walls keep fluid in the box.

use kernel::{
    CpuKernel, InputSnapshot, ParticleArrays, ParticlePlacement, Params, Phase, Scene,
    SimulationKernel,
};

fn boxed_block(params: &Params) -> Scene {
    let r = params.primary().particle_radius;
    let spacing = 2.0 * r;
    let mut scene = Scene::new();
    let mut x = 0.3;
    while x < 0.7 {
        let mut y = 0.4;
        while y < 0.8 {
            scene.push(ParticlePlacement {
                phase: Phase::Fluid,
                mass: params.primary().rest_density * spacing * spacing,
                position: [x, y],
                velocity: [0.0, 0.0],
            });
            y += spacing;
        }
        x += spacing;
    }
    let wall = |position| ParticlePlacement {
        phase: Phase::Boundary,
        mass: params.primary().rest_density * spacing * spacing,
        position,
        velocity: [0.0, 0.0],
    };
    let mut t = 0.0;
    while t <= 1.0 {
        scene.push(wall([t, 1.0 - r]));
        scene.push(wall([r, t]));
        scene.push(wall([1.0 - r, t]));
        t += spacing;
    }
    scene
}

fn boundary_positions(p: &ParticleArrays) -> Vec<[f32; 2]> {
    p.phase
        .iter()
        .zip(&p.position)
        .filter(|(phase, _)| **phase == Phase::Boundary)
        .map(|(_, pos)| *pos)
        .collect()
}

#[test]
fn block_settles_without_escaping() {
    let params = Params::default();
    let scene = boxed_block(&params);
    let mut kernel = CpuKernel::new(&scene, &params);
    let walls_before = boundary_positions(kernel.particles());
    let fluid = kernel.particles().fluid_count();

    for _ in 0..100 {
        kernel
            .step(&params, params.timestep(), &InputSnapshot::idle())
            .unwrap();
    }
    let p = kernel.particles();

    assert!(p.all_finite());
    assert_eq!(p.fluid_count(), fluid);
    assert_eq!(boundary_positions(p), walls_before);
    for (pos, phase) in p.position.iter().zip(&p.phase) {
        if phase.is_fluid() {
            assert!(
                (-0.1..=1.1).contains(&pos[0]) && (-0.1..=1.1).contains(&pos[1]),
                "fluid escaped to {pos:?}"
            );
        }
    }
    let limit = params.derived().speed_limit;
    assert!(p
        .velocity
        .iter()
        .all(|v| (v[0] * v[0] + v[1] * v[1]).sqrt() <= limit * 1.0001));
}

#[test]
fn outward_motion_past_a_wall_is_reflected() {
    let params = Params::default();
    let mut scene = Scene::new();
    scene.push(ParticlePlacement {
        phase: Phase::Fluid,
        mass: 1.2,
        position: [-0.01, 0.5],
        velocity: [-1.0, 0.0],
    });
    scene.push(ParticlePlacement {
        phase: Phase::Fluid,
        mass: 1.2,
        position: [0.5, 1.01],
        velocity: [0.0, 1.0],
    });
    let mut kernel = CpuKernel::new(&scene, &params);

    kernel
        .step(&params, params.timestep(), &InputSnapshot::idle())
        .unwrap();
    let p = kernel.particles();

    let e = params.primary().wall_restitution;
    assert!((p.velocity[0][0] - e).abs() < 1e-3, "{:?}", p.velocity[0]);
    assert!(p.position[0][0] > -0.01);
    assert!(p.velocity[1][1] < 0.0);
}
