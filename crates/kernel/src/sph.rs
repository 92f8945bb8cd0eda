//! Cubic-spline kernel and the six per-substep SPH stages.
//!
//! Every stage reads the neighbor index built at the start of the macro-step and
//! writes exactly one field. The arithmetic is written in the same order as the
//! device passes so both backends round the same way where the hardware allows.

use crate::eos::{density_from_pressure, tait_pressure};
use crate::input::InputSnapshot;
use crate::neighbor::NeighborGrid;
use crate::params::Params;
use crate::particle::{ParticleArrays, Phase};

/// `2 (D + 2)` for `D = 2`, the factor of the velocity-Laplacian estimate.
pub const VISCOSITY_SCALE: f32 = 8.0;

/// 2-D cubic spline.
///
/// ```text
/// q = |dx| / h
/// W = sigma (6 (q^3 - q^2) + 1)   0 <= q <= 1/2
/// W = sigma 2 (1 - q)^3           1/2 < q <= 1
/// W = 0                           q > 1
/// ```
#[inline]
pub fn kernel_w(dx: [f32; 2], h: f32, sigma: f32) -> f32 {
    let q = (dx[0] * dx[0] + dx[1] * dx[1]).sqrt() / h;
    if q <= 0.5 {
        sigma * (6.0 * (q * q * q - q * q) + 1.0)
    } else if q <= 1.0 {
        let r = 1.0 - q;
        sigma * (2.0 * r * r * r)
    } else {
        0.0
    }
}

/// Gradient of [`kernel_w`] with respect to `dx`, regularized by `eta` so that
/// `dx = 0` yields zero instead of NaN.
#[inline]
pub fn kernel_dw(dx: [f32; 2], h: f32, sigma: f32, eta: f32) -> [f32; 2] {
    let len = (dx[0] * dx[0] + dx[1] * dx[1]).sqrt();
    let denom = h * len + eta;
    let dq = [dx[0] / denom, dx[1] / denom];
    let q = len / h;
    let slope = if q <= 0.5 {
        sigma * (18.0 * q * q - 12.0 * q)
    } else if q <= 1.0 {
        let r = 1.0 - q;
        sigma * (-6.0 * r * r)
    } else {
        return [0.0; 2];
    };
    [slope * dq[0], slope * dq[1]]
}

#[inline]
fn sub(a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

#[inline]
fn dot(a: [f32; 2], b: [f32; 2]) -> f32 {
    a[0] * b[0] + a[1] * b[1]
}

/// Stage 1: `rho_i = m_i W(0) + sum_{j != i} m_j W(x_j - x_i)`.
pub fn compute_density(particles: &mut ParticleArrays, grid: &NeighborGrid, params: &Params) {
    let d = params.derived();
    let ParticleArrays {
        position,
        mass,
        density,
        ..
    } = particles;

    for i in 0..position.len() {
        let own_pos = position[i];
        let mut rho = mass[i] * kernel_w([0.0; 2], d.h, d.sigma);
        grid.for_each_neighbor(own_pos, |j| {
            if j != i {
                rho += mass[j] * kernel_w(sub(position[j], own_pos), d.h, d.sigma);
            }
        });
        density[i] = rho;
    }
}

/// Stage 2: explicit viscosity plus gravity and pointer force. Boundary
/// particles get a zero guess.
pub fn compute_velocity_guess(
    particles: &mut ParticleArrays,
    grid: &NeighborGrid,
    params: &Params,
    dt: f32,
    input: &InputSnapshot,
) {
    let p = params.primary();
    let d = params.derived();
    let ParticleArrays {
        phase,
        position,
        velocity,
        velocity_guess,
        mass,
        density,
        ..
    } = particles;

    for i in 0..position.len() {
        if phase[i] != Phase::Fluid {
            velocity_guess[i] = [0.0; 2];
            continue;
        }
        let own_pos = position[i];
        let own_vel = velocity[i];
        let own_mass = mass[i];

        let mut laplacian = [0.0_f32; 2];
        grid.for_each_neighbor(own_pos, |j| {
            if phase[j] != Phase::Fluid {
                return;
            }
            let dx = sub(own_pos, position[j]);
            let len_sq = dot(dx, dx);
            if len_sq > 0.0 {
                let dv = sub(own_vel, velocity[j]);
                let volume = mass[j] / (density[j] + d.eta);
                let term = dot(dv, dx) / len_sq;
                let s = VISCOSITY_SCALE * volume * term;
                let dw = kernel_dw(dx, d.h, d.sigma, d.eta);
                laplacian[0] += s * dw[0];
                laplacian[1] += s * dw[1];
            }
        });

        let pointer = input.force_at(own_pos);
        let force = [
            p.viscosity * laplacian[0] + (p.gravity[0] * own_mass + pointer[0]),
            p.viscosity * laplacian[1] + (p.gravity[1] * own_mass + pointer[1]),
        ];
        velocity_guess[i] = if own_mass > 0.0 {
            let k = dt / own_mass;
            [own_vel[0] + k * force[0], own_vel[1] + k * force[1]]
        } else {
            own_vel
        };
    }
}

/// Stage 3: Tait pressure for fluid; kernel-weighted average of fluid
/// neighbours' pressure for boundary particles (zero with no fluid in reach).
pub fn compute_pressure(particles: &mut ParticleArrays, grid: &NeighborGrid, params: &Params) {
    let p = params.primary();
    let d = params.derived();
    let tait = |rho: f32| tait_pressure(rho, p.rest_density, d.rest_pressure, p.gamma);
    let ParticleArrays {
        phase,
        position,
        density,
        pressure,
        ..
    } = particles;

    for i in 0..position.len() {
        if phase[i] == Phase::Fluid {
            pressure[i] = tait(density[i]);
            continue;
        }
        let own_pos = position[i];
        let mut weighted = 0.0_f32;
        let mut total = 0.0_f32;
        grid.for_each_neighbor(own_pos, |j| {
            if phase[j] == Phase::Fluid {
                let w = kernel_w(sub(position[j], own_pos), d.h, d.sigma);
                weighted += tait(density[j]) * w;
                total += w;
            }
        });
        pressure[i] = if total > 0.0 { weighted / total } else { 0.0 };
    }
}

/// Stage 4: symmetric pressure gradient for fluid particles, divided by the
/// particle's mass. Boundary neighbours contribute through the density their
/// pressure implies.
pub fn compute_pressure_force(particles: &mut ParticleArrays, grid: &NeighborGrid, params: &Params) {
    let p = params.primary();
    let d = params.derived();
    let ParticleArrays {
        phase,
        position,
        f_pressure,
        mass,
        density,
        pressure,
        ..
    } = particles;

    for i in 0..position.len() {
        if phase[i] != Phase::Fluid {
            f_pressure[i] = [0.0; 2];
            continue;
        }
        let own_pos = position[i];
        let own_mass = mass[i];
        let own_density = density[i];
        let own_pressure = pressure[i];
        let own_volume = if own_density > 0.0 { own_mass / own_density } else { 0.0 };

        let mut force = [0.0_f32; 2];
        grid.for_each_neighbor(own_pos, |j| {
            let neighbor_pressure = pressure[j];
            let neighbor_density = if phase[j] == Phase::Boundary {
                density_from_pressure(neighbor_pressure, p.rest_density, d.rest_pressure, p.gamma)
            } else {
                density[j]
            };
            let avg = (neighbor_density * own_pressure + own_density * neighbor_pressure)
                / (own_density + neighbor_density + d.eta);
            let neighbor_volume = if neighbor_density > 0.0 {
                mass[j] / neighbor_density
            } else {
                0.0
            };
            let s = (own_volume * own_volume + neighbor_volume * neighbor_volume) * avg;
            let dw = kernel_dw(sub(position[j], own_pos), d.h, d.sigma, d.eta);
            force[0] += s * dw[0];
            force[1] += s * dw[1];
        });

        if own_mass > 0.0 {
            let inv = 1.0 / own_mass;
            force = [force[0] * inv, force[1] * inv];
        }
        f_pressure[i] = force;
    }
}

/// Stage 5: pressure impulse, particle collisions, wall reflection and the
/// optional speed clamp.
pub fn update_velocity(particles: &mut ParticleArrays, grid: &NeighborGrid, params: &Params, dt: f32) {
    let p = params.primary();
    let d = params.derived();
    let ParticleArrays {
        phase,
        position,
        velocity,
        velocity_guess,
        f_pressure,
        mass,
        ..
    } = particles;

    for i in 0..position.len() {
        let mut v = [0.0_f32; 2];

        if phase[i] == Phase::Fluid {
            let guess = velocity_guess[i];
            let own_pos = position[i];
            let own_mass = mass[i];
            v = if own_mass > 0.0 {
                let k = dt / own_mass;
                [guess[0] + k * f_pressure[i][0], guess[1] + k * f_pressure[i][1]]
            } else {
                guess
            };

            let mut collided_mass = 0.0_f32;
            let mut dv_fluid = [0.0_f32; 2];
            let mut dv_wall = [0.0_f32; 2];
            grid.for_each_neighbor(own_pos, |j| {
                let dx = sub(own_pos, position[j]);
                let dv = sub(guess, velocity_guess[j]);
                let dist = dot(dx, dx).sqrt();
                let approach = dot(dx, dv);
                if dist > 0.0 && dist < d.collision_distance && approach < 0.0 {
                    let n = [dx[0] / dist, dx[1] / dist];
                    if phase[j] == Phase::Fluid {
                        collided_mass += mass[j];
                        let s = mass[j] * (1.0 + p.particle_restitution) * (approach / dist);
                        dv_fluid[0] += s * n[0];
                        dv_fluid[1] += s * n[1];
                    } else {
                        let s = (1.0 + p.wall_restitution) * (approach / dist);
                        dv_wall[0] += s * n[0];
                        dv_wall[1] += s * n[1];
                    }
                }
            });

            let total_mass = own_mass + collided_mass;
            if total_mass > 0.0 {
                let inv = 1.0 / total_mass;
                v[0] -= inv * dv_fluid[0];
                v[1] -= inv * dv_fluid[1];
            }
            v[0] -= dv_wall[0];
            v[1] -= dv_wall[1];

            if (v[0] < 0.0 && own_pos[0] < 0.0) || (v[0] > 0.0 && own_pos[0] > p.world_width) {
                v[0] *= -p.wall_restitution;
            }
            if (v[1] < 0.0 && own_pos[1] < 0.0) || (v[1] > 0.0 && own_pos[1] > p.world_height) {
                v[1] *= -p.wall_restitution;
            }
        }

        if p.limit_speed {
            let speed = dot(v, v).sqrt();
            if speed > 0.0 {
                let clamped = speed.min(d.speed_limit);
                v = [v[0] / speed * clamped, v[1] / speed * clamped];
            }
        }
        velocity[i] = v;
    }
}

/// Stage 6: move fluid particles. Boundary particles never move.
pub fn advect(particles: &mut ParticleArrays, dt: f32) {
    for ((pos, vel), phase) in particles
        .position
        .iter_mut()
        .zip(&particles.velocity)
        .zip(&particles.phase)
    {
        if phase.is_fluid() {
            pos[0] += vel[0] * dt;
            pos[1] += vel[1] * dt;
        }
    }
}

/// Largest speed plus a small offset so the stable-step estimate never divides by zero.
pub fn max_speed(velocity: &[[f32; 2]]) -> f32 {
    velocity
        .iter()
        .map(|v| (v[0] * v[0] + v[1] * v[1]).sqrt() + crate::substep::SPEED_EPSILON)
        .fold(0.0_f32, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: f32 = 0.06;

    fn sigma(h: f32) -> f32 {
        40.0 / (7.0 * std::f32::consts::PI * h * h)
    }

    #[test]
    fn kernel_vanishes_outside_support() {
        let s = sigma(H);
        assert_eq!(kernel_w([H * 1.001, 0.0], H, s), 0.0);
        assert_eq!(kernel_w([0.0, H * 2.0], H, s), 0.0);
        assert_eq!(kernel_dw([H * 1.5, 0.0], H, s, 0.01 * H * H), [0.0, 0.0]);
    }

    #[test]
    fn kernel_peak_is_sigma() {
        let s = sigma(H);
        assert!((kernel_w([0.0, 0.0], H, s) - s).abs() < 1e-3);
    }

    #[test]
    fn kernel_continuous_at_half_support() {
        let s = sigma(H);
        let eps = 1e-5 * H;
        let below = kernel_w([0.5 * H - eps, 0.0], H, s);
        let above = kernel_w([0.5 * H + eps, 0.0], H, s);
        assert!((below - above).abs() / s < 1e-3);
    }

    #[test]
    fn gradient_points_toward_centre() {
        let s = sigma(H);
        let eta = 0.01 * H * H;
        let g = kernel_dw([0.3 * H, 0.0], H, s, eta);
        assert!(g[0] < 0.0);
        assert_eq!(g[1], 0.0);
        assert_eq!(kernel_dw([0.0, 0.0], H, s, eta), [0.0, 0.0]);
    }

    #[test]
    fn max_speed_includes_offset() {
        assert!(max_speed(&[]) == 0.0);
        let v = max_speed(&[[3.0, 4.0], [0.0, 1.0]]);
        assert!((v - 5.0).abs() < 1e-5);
    }
}
