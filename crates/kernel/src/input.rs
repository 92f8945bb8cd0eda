//! Per-frame pointer input folded into the external force.

use serde::{Deserialize, Serialize};

/// Force per unit pointer velocity at the pointer's centre.
pub const POINTER_FORCE_SCALE: f32 = 20.0;

/// Distance at which the pointer force falls to zero.
pub const POINTER_RADIUS: f32 = 0.1;

/// Pointer state sampled once per frame. The simulation never mutates it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    /// Whether the pointer is pressed.
    pub down: bool,
    /// Pointer position in world coordinates.
    pub position: [f32; 2],
    /// Pointer velocity in world units per second.
    pub velocity: [f32; 2],
}

impl InputSnapshot {
    /// Pointer released at the origin.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Drag force applied to a particle at `pos`, linear falloff to zero at
    /// [`POINTER_RADIUS`].
    pub fn force_at(&self, pos: [f32; 2]) -> [f32; 2] {
        if !self.down {
            return [0.0; 2];
        }
        let dx = pos[0] - self.position[0];
        let dy = pos[1] - self.position[1];
        let falloff = 1.0 - (dx * dx + dy * dy).sqrt().min(POINTER_RADIUS) / POINTER_RADIUS;
        [
            POINTER_FORCE_SCALE * self.velocity[0] * falloff,
            POINTER_FORCE_SCALE * self.velocity[1] * falloff,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_pointer_exerts_nothing() {
        let input = InputSnapshot {
            down: false,
            position: [0.5, 0.5],
            velocity: [1.0, 0.0],
        };
        assert_eq!(input.force_at([0.5, 0.5]), [0.0, 0.0]);
    }

    #[test]
    fn force_falls_off_linearly() {
        let input = InputSnapshot {
            down: true,
            position: [0.5, 0.5],
            velocity: [1.0, -2.0],
        };
        let centre = input.force_at([0.5, 0.5]);
        assert!((centre[0] - 20.0).abs() < 1e-5);
        assert!((centre[1] + 40.0).abs() < 1e-5);

        let half = input.force_at([0.55, 0.5]);
        assert!((half[0] - 10.0).abs() < 1e-3);

        assert_eq!(input.force_at([0.7, 0.5]), [0.0, 0.0]);
    }
}
