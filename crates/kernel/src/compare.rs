//! Field-by-field comparison of two particle states.
//!
//! Used to check that the CPU and GPU backends stay in agreement. Differences
//! are relative to `max(1, |a|, |b|)`, so values near zero are compared
//! absolutely and large values relatively.

use crate::particle::ParticleArrays;
use crate::transfer::StateField;

/// Largest divergence seen in one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDivergence {
    /// Field compared.
    pub field: StateField,
    /// Largest relative difference over all particles and channels.
    pub max_relative: f32,
    /// Particle where it occurred.
    pub index: Option<usize>,
}

/// Result of [`compare_states`].
#[derive(Debug, Clone, PartialEq)]
pub struct StateDivergence {
    /// One entry per [`StateField`].
    pub fields: Vec<FieldDivergence>,
    /// Either state holds a NaN or infinity.
    pub non_finite: bool,
}

impl StateDivergence {
    /// Field with the largest divergence.
    pub fn worst(&self) -> Option<&FieldDivergence> {
        self.fields
            .iter()
            .max_by(|a, b| a.max_relative.total_cmp(&b.max_relative))
    }

    /// Largest divergence over every field.
    pub fn max_relative(&self) -> f32 {
        self.worst().map_or(0.0, |f| f.max_relative)
    }

    /// Both states are finite and agree to within `tolerance`.
    pub fn within(&self, tolerance: f32) -> bool {
        !self.non_finite && self.max_relative() <= tolerance
    }
}

fn relative(a: f32, b: f32) -> f32 {
    if !(a.is_finite() && b.is_finite()) {
        return f32::INFINITY;
    }
    (a - b).abs() / 1.0_f32.max(a.abs()).max(b.abs())
}

fn channels(state: &ParticleArrays, field: StateField, i: usize) -> [f32; 2] {
    match field {
        StateField::Phase => [state.phase[i].code() as f32, 0.0],
        StateField::Position => state.position[i],
        StateField::Velocity => state.velocity[i],
        StateField::VelocityGuess => state.velocity_guess[i],
        StateField::FPressure => state.f_pressure[i],
        StateField::Mass => [state.mass[i], 0.0],
        StateField::Density => [state.density[i], 0.0],
        StateField::Pressure => [state.pressure[i], 0.0],
    }
}

/// Compare every field of `a` and `b`. States of different length diverge
/// infinitely in every field.
pub fn compare_states(a: &ParticleArrays, b: &ParticleArrays) -> StateDivergence {
    let non_finite = !(a.all_finite() && b.all_finite());
    if a.len() != b.len() {
        return StateDivergence {
            fields: StateField::ALL
                .iter()
                .map(|&field| FieldDivergence {
                    field,
                    max_relative: f32::INFINITY,
                    index: None,
                })
                .collect(),
            non_finite,
        };
    }

    let fields = StateField::ALL
        .iter()
        .map(|&field| {
            let mut worst = FieldDivergence {
                field,
                max_relative: 0.0,
                index: None,
            };
            for i in 0..a.len() {
                let (x, y) = (channels(a, field, i), channels(b, field, i));
                let d = relative(x[0], y[0]).max(relative(x[1], y[1]));
                if d > worst.max_relative {
                    worst.max_relative = d;
                    worst.index = Some(i);
                }
            }
            worst
        })
        .collect();

    StateDivergence { fields, non_finite }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{ParticlePlacement, Phase};

    fn state() -> ParticleArrays {
        let mut s = ParticleArrays::new();
        for i in 0..4 {
            s.push_particle(&ParticlePlacement {
                phase: Phase::Fluid,
                mass: 1.0,
                position: [0.1 * i as f32, 0.5],
                velocity: [0.0, 0.0],
            });
        }
        s.density = vec![3000.0; 4];
        s
    }

    #[test]
    fn identical_states_agree() {
        let d = compare_states(&state(), &state());
        assert_eq!(d.max_relative(), 0.0);
        assert!(d.within(0.0));
    }

    #[test]
    fn large_values_compare_relatively() {
        let a = state();
        let mut b = state();
        b.density[2] = 3003.0;
        let d = compare_states(&a, &b);
        let worst = d.worst().unwrap();
        assert_eq!(worst.field, StateField::Density);
        assert_eq!(worst.index, Some(2));
        assert!((worst.max_relative - 1e-3).abs() < 1e-5);
        assert!(d.within(1e-2));
    }

    #[test]
    fn small_values_compare_absolutely() {
        let a = state();
        let mut b = state();
        b.velocity[1] = [0.0, 0.005];
        assert!((compare_states(&a, &b).max_relative() - 0.005).abs() < 1e-7);
    }

    #[test]
    fn non_finite_and_length_mismatch_fail() {
        let a = state();
        let mut b = state();
        b.pressure[0] = f32::NAN;
        let d = compare_states(&a, &b);
        assert!(d.non_finite);
        assert!(!d.within(1.0));

        let mut short = state();
        short.position.pop();
        short.velocity.pop();
        assert!(compare_states(&a, &short).max_relative().is_infinite());
    }

    #[test]
    fn phase_flip_is_detected() {
        let a = state();
        let mut b = state();
        b.phase[3] = Phase::Boundary;
        assert!(!compare_states(&a, &b).within(1e-2));
    }
}
