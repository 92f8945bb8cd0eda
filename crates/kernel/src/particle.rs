//! Particle state in struct-of-arrays layout, plus the scene records it is built from.

use serde::{Deserialize, Serialize};

/// Particle phase tag.
///
/// Stored as a signed byte when transferred to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i8)]
pub enum Phase {
    /// Movable fluid particle.
    #[default]
    Fluid = 0,
    /// Static boundary particle. Never advected.
    Boundary = 1,
}

impl Phase {
    /// Signed-byte code used by the CPU/GPU transfer layout.
    pub fn code(self) -> i8 {
        self as i8
    }

    /// Inverse of [`Phase::code`].
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(Phase::Fluid),
            1 => Some(Phase::Boundary),
            _ => None,
        }
    }

    /// `true` for fluid particles.
    pub fn is_fluid(self) -> bool {
        self == Phase::Fluid
    }
}

/// One particle of an initial layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticlePlacement {
    /// Fluid or boundary.
    pub phase: Phase,
    /// Particle mass.
    pub mass: f32,
    /// Initial position.
    pub position: [f32; 2],
    /// Initial velocity.
    #[serde(default)]
    pub velocity: [f32; 2],
}

/// Ordered list of placements; its length fixes the store's capacity at reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Placements in particle-index order.
    pub placements: Vec<ParticlePlacement>,
}

impl Scene {
    /// Empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a placement.
    pub fn push(&mut self, placement: ParticlePlacement) {
        self.placements.push(placement);
    }

    /// Append every placement of `other`.
    pub fn extend(&mut self, other: Scene) {
        self.placements.extend(other.placements);
    }

    /// Number of placements.
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    /// `true` when the scene has no particles.
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

/// Struct-of-arrays particle storage.
///
/// Every vector has the same length; index `i` across all of them is one particle.
/// The length is fixed when the store is built from a [`Scene`] and only changes on
/// the next reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticleArrays {
    /// Fluid or boundary.
    pub phase: Vec<Phase>,
    /// Position.
    pub position: Vec<[f32; 2]>,
    /// Velocity at the end of the last substep.
    pub velocity: Vec<[f32; 2]>,
    /// Velocity after viscosity and external forces, before pressure and collisions.
    pub velocity_guess: Vec<[f32; 2]>,
    /// Pressure force per unit mass.
    pub f_pressure: Vec<[f32; 2]>,
    /// Mass.
    pub mass: Vec<f32>,
    /// Kernel-summed density.
    pub density: Vec<f32>,
    /// Pressure from the equation of state (fluid) or extrapolation (boundary).
    pub pressure: Vec<f32>,
}

impl ParticleArrays {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with room for `capacity` particles.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            phase: Vec::with_capacity(capacity),
            position: Vec::with_capacity(capacity),
            velocity: Vec::with_capacity(capacity),
            velocity_guess: Vec::with_capacity(capacity),
            f_pressure: Vec::with_capacity(capacity),
            mass: Vec::with_capacity(capacity),
            density: Vec::with_capacity(capacity),
            pressure: Vec::with_capacity(capacity),
        }
    }

    /// `n` massless fluid particles at the origin, for readback targets.
    pub fn zeroed(n: usize) -> Self {
        Self {
            phase: vec![Phase::Fluid; n],
            position: vec![[0.0; 2]; n],
            velocity: vec![[0.0; 2]; n],
            velocity_guess: vec![[0.0; 2]; n],
            f_pressure: vec![[0.0; 2]; n],
            mass: vec![0.0; n],
            density: vec![0.0; n],
            pressure: vec![0.0; n],
        }
    }

    /// Build a store holding exactly the scene's placements.
    pub fn from_scene(scene: &Scene) -> Self {
        let mut particles = Self::with_capacity(scene.len());
        for placement in &scene.placements {
            particles.push_particle(placement);
        }
        particles
    }

    /// Append one particle. Derived fields start at zero.
    pub fn push_particle(&mut self, placement: &ParticlePlacement) {
        self.phase.push(placement.phase);
        self.position.push(placement.position);
        self.velocity.push(placement.velocity);
        self.velocity_guess.push([0.0; 2]);
        self.f_pressure.push([0.0; 2]);
        self.mass.push(placement.mass);
        self.density.push(0.0);
        self.pressure.push(0.0);
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.position.len()
    }

    /// `true` when there are no particles.
    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Number of fluid particles.
    pub fn fluid_count(&self) -> usize {
        self.phase.iter().filter(|p| p.is_fluid()).count()
    }

    /// `true` if every float field is finite.
    pub fn all_finite(&self) -> bool {
        let vectors = [&self.position, &self.velocity, &self.velocity_guess, &self.f_pressure];
        let scalars = [&self.mass, &self.density, &self.pressure];
        vectors
            .iter()
            .all(|field| field.iter().all(|v| v[0].is_finite() && v[1].is_finite()))
            && scalars.iter().all(|field| field.iter().all(|v| v.is_finite()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(phase: Phase, x: f32) -> ParticlePlacement {
        ParticlePlacement {
            phase,
            mass: 1.5,
            position: [x, 0.5],
            velocity: [0.1, 0.0],
        }
    }

    #[test]
    fn from_scene_keeps_order_and_capacity() {
        let mut scene = Scene::new();
        scene.push(placement(Phase::Fluid, 0.1));
        scene.push(placement(Phase::Boundary, 0.2));
        scene.push(placement(Phase::Fluid, 0.3));

        let particles = ParticleArrays::from_scene(&scene);
        assert_eq!(particles.len(), 3);
        assert_eq!(particles.fluid_count(), 2);
        assert_eq!(particles.phase[1], Phase::Boundary);
        assert_eq!(particles.position[2], [0.3, 0.5]);
        assert_eq!(particles.velocity_guess[0], [0.0, 0.0]);
        assert!(particles.all_finite());
    }

    #[test]
    fn phase_codes() {
        assert_eq!(Phase::Fluid.code(), 0);
        assert_eq!(Phase::Boundary.code(), 1);
        assert_eq!(Phase::from_code(1), Some(Phase::Boundary));
        assert_eq!(Phase::from_code(-3), None);
    }

    #[test]
    fn detects_non_finite() {
        let mut particles = ParticleArrays::new();
        particles.push_particle(&placement(Phase::Fluid, 0.1));
        particles.density[0] = f32::NAN;
        assert!(!particles.all_finite());
    }

    #[test]
    fn placement_velocity_defaults_to_zero() {
        let p: ParticlePlacement =
            serde_json::from_str(r#"{"phase": "boundary", "mass": 2.0, "position": [0.5, 0.5]}"#)
                .unwrap();
        assert_eq!(p.velocity, [0.0, 0.0]);
        assert_eq!(p.phase, Phase::Boundary);
    }
}
