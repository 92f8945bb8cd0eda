//! Kernel normalization: the cubic spline integrates to one over the plane,
//! and SPH density summation on a rest lattice recovers the rest density.

use kernel::sph::{compute_density, kernel_dw, kernel_w};
use kernel::{NeighborGrid, ParticleArrays, ParticlePlacement, Params, Phase};

#[test]
fn spline_integrates_to_one() {
    let d = *Params::default().derived();
    let steps = 400;
    let cell = 2.0 * d.h / steps as f32;

    let mut total = 0.0_f64;
    for iy in 0..steps {
        for ix in 0..steps {
            let x = -d.h + (ix as f32 + 0.5) * cell;
            let y = -d.h + (iy as f32 + 0.5) * cell;
            total += kernel_w([x, y], d.h, d.sigma) as f64;
        }
    }
    total *= (cell * cell) as f64;
    assert!((total - 1.0).abs() < 1e-2, "integral of W = {total}");
}

#[test]
fn gradient_matches_finite_difference() {
    let d = *Params::default().derived();
    let eps = 1e-5 * d.h;
    for q in [0.2_f32, 0.45, 0.7, 0.95] {
        let x = q * d.h;
        let numeric = (kernel_w([x + eps, 0.0], d.h, d.sigma) - kernel_w([x - eps, 0.0], d.h, d.sigma))
            / (2.0 * eps);
        let analytic = kernel_dw([x, 0.0], d.h, d.sigma, d.eta)[0];
        // eta shrinks the analytic value by eta / (h |dx| + eta).
        assert!(
            (analytic - numeric).abs() <= 0.03 * numeric.abs(),
            "q = {q}: analytic {analytic}, numeric {numeric}"
        );
    }
}

#[test]
fn density_at_rest_lattice_matches_rho0() {
    let params = Params::default();
    let p = *params.primary();
    let spacing = 2.0 * p.particle_radius;
    let mass = p.rest_density * spacing * spacing;

    let mut particles = ParticleArrays::new();
    for iy in -5..=5 {
        for ix in -5..=5 {
            particles.push_particle(&ParticlePlacement {
                phase: Phase::Fluid,
                mass,
                position: [0.5 + ix as f32 * spacing, 0.5 + iy as f32 * spacing],
                velocity: [0.0, 0.0],
            });
        }
    }
    let center = particles
        .position
        .iter()
        .position(|pos| (pos[0] - 0.5).abs() < 1e-6 && (pos[1] - 0.5).abs() < 1e-6)
        .unwrap();

    let mut grid = NeighborGrid::new(&params);
    grid.rebuild(&particles.position, &params);
    compute_density(&mut particles, &grid, &params);

    let rho = particles.density[center];
    let error = (rho - p.rest_density).abs() / p.rest_density;
    assert!(error < 0.03, "density {rho} vs rest {}", p.rest_density);
}
