//! Pointer tracking
//!
//! Raw pointer events arrive at arbitrary times; the kernel wants one
//! [`InputSnapshot`] per frame. [`PointerTracker`] keeps the latest sample and
//! the position seen at the previous frame, and turns the difference into a
//! velocity when the frame is sampled.

use kernel::InputSnapshot;

/// Accumulates pointer events between frames.
#[derive(Debug, Clone, Default)]
pub struct PointerTracker {
    down: bool,
    position: [f32; 2],
    last: [f32; 2],
    velocity: [f32; 2],
}

impl PointerTracker {
    /// Released pointer at the origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer pressed at `position`. The press itself carries no velocity.
    pub fn press(&mut self, position: [f32; 2]) {
        self.down = true;
        self.position = position;
        self.last = position;
    }

    /// Pointer moved to `position`, pressed or not.
    pub fn move_to(&mut self, position: [f32; 2]) {
        self.position = position;
    }

    /// Pointer released.
    pub fn release(&mut self) {
        self.down = false;
    }

    /// Whether the pointer is currently pressed.
    pub fn is_down(&self) -> bool {
        self.down
    }

    /// Close the frame: velocity is the displacement since the previous
    /// frame over `real_dt` wall-clock seconds (zero when `real_dt <= 0`).
    pub fn update(&mut self, real_dt: f32) -> InputSnapshot {
        self.velocity = if real_dt > 0.0 {
            [
                (self.position[0] - self.last[0]) / real_dt,
                (self.position[1] - self.last[1]) / real_dt,
            ]
        } else {
            [0.0, 0.0]
        };
        self.last = self.position;
        self.snapshot()
    }

    /// The state as of the last [`update`](Self::update), without advancing.
    pub fn snapshot(&self) -> InputSnapshot {
        InputSnapshot {
            down: self.down,
            position: self.position,
            velocity: self.velocity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_from_displacement() {
        let mut pointer = PointerTracker::new();
        pointer.press([0.5, 0.5]);
        pointer.move_to([0.6, 0.4]);
        let snap = pointer.update(0.1);
        assert!(snap.down);
        assert_eq!(snap.position, [0.6, 0.4]);
        assert!((snap.velocity[0] - 1.0).abs() < 1e-5);
        assert!((snap.velocity[1] + 1.0).abs() < 1e-5);

        // No further movement: next frame is at rest.
        let snap = pointer.update(0.1);
        assert_eq!(snap.velocity, [0.0, 0.0]);
    }

    #[test]
    fn press_resets_reference_position() {
        let mut pointer = PointerTracker::new();
        pointer.move_to([0.1, 0.1]);
        pointer.update(0.016);
        pointer.press([0.9, 0.9]);
        let snap = pointer.update(0.016);
        assert_eq!(snap.velocity, [0.0, 0.0]);
    }

    #[test]
    fn zero_frame_time_gives_zero_velocity() {
        let mut pointer = PointerTracker::new();
        pointer.press([0.0, 0.0]);
        pointer.move_to([1.0, 1.0]);
        assert_eq!(pointer.update(0.0).velocity, [0.0, 0.0]);
    }

    #[test]
    fn release_clears_down() {
        let mut pointer = PointerTracker::new();
        pointer.press([0.2, 0.2]);
        pointer.release();
        let snap = pointer.update(0.016);
        assert!(!snap.down);
        assert!(!pointer.is_down());
    }
}
