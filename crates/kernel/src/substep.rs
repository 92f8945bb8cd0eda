//! Splitting a macro-step into substeps.
//!
//! A macro-step of length `dt` is consumed in chunks of
//! `min(stable_dt, remaining)`, where `stable_dt` comes from the peak particle
//! speed at the start of the macro-step. Planning stops when nothing remains or
//! the substep cap is reached; in the latter case the frame is under-resolved
//! and the leftover time is dropped.

use crate::params::Params;

/// Added to the peak speed so a resting scene still yields a finite estimate.
pub const SPEED_EPSILON: f32 = 1e-6;

/// Numerator of the stable-step estimate, `lambda * 2 * radius`, or zero when
/// auto-substepping is off.
pub fn stable_numerator(params: &Params) -> f32 {
    let p = params.primary();
    if p.auto_substep && p.timestep_lambda > 0.0 {
        p.timestep_lambda * 2.0 * p.particle_radius
    } else {
        0.0
    }
}

/// Maximum number of chunks for the current policy.
pub fn substep_cap(params: &Params) -> u32 {
    let p = params.primary();
    if p.auto_substep {
        p.max_substeps
    } else {
        1
    }
}

/// Iterator over the chunk lengths of one macro-step.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstepPlan {
    stable_dt: f32,
    remaining: f32,
    taken: u32,
    cap: u32,
}

impl SubstepPlan {
    /// Plan a macro-step of length `dt` given the current peak speed.
    pub fn new(params: &Params, dt: f32, max_speed: f32) -> Self {
        let numerator = stable_numerator(params);
        let stable_dt = if numerator > 0.0 { numerator / max_speed } else { dt };
        Self {
            stable_dt,
            remaining: dt,
            taken: 0,
            cap: substep_cap(params),
        }
    }

    /// Chunk length used while time remains.
    pub fn stable_dt(&self) -> f32 {
        self.stable_dt
    }

    /// Time not yet consumed. Positive after the cap was hit.
    pub fn remaining(&self) -> f32 {
        self.remaining.max(0.0)
    }

    /// Chunks produced so far.
    pub fn taken(&self) -> u32 {
        self.taken
    }
}

impl Iterator for SubstepPlan {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.taken >= self.cap || !(self.remaining > 0.0) {
            return None;
        }
        let chunk = self.stable_dt.min(self.remaining);
        self.remaining -= chunk;
        self.taken += 1;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamField, ParamValue};

    fn params(auto: bool, cap: i64) -> Params {
        let mut params = Params::default();
        params
            .set_primary(ParamField::AutoSubstep, ParamValue::Bool(auto))
            .unwrap();
        params
            .set_primary(ParamField::MaxSubsteps, ParamValue::Int(cap))
            .unwrap();
        params
    }

    #[test]
    fn slow_scene_takes_one_chunk() {
        let params = params(true, 10);
        let chunks: Vec<f32> = SubstepPlan::new(&params, 0.01, SPEED_EPSILON).collect();
        assert_eq!(chunks, vec![0.01]);
    }

    #[test]
    fn fast_scene_is_split_and_sums_to_dt() {
        let params = params(true, 10);
        // lambda * 2r = 0.01, speed 2 -> stable 0.005
        let chunks: Vec<f32> = SubstepPlan::new(&params, 0.012, 2.0).collect();
        assert_eq!(chunks.len(), 3);
        assert!((chunks[0] - 0.005).abs() < 1e-7);
        assert!((chunks.iter().sum::<f32>() - 0.012).abs() < 1e-6);
    }

    #[test]
    fn cap_under_resolves() {
        let params = params(true, 2);
        let mut plan = SubstepPlan::new(&params, 0.1, 10.0);
        let chunks: Vec<f32> = plan.by_ref().collect();
        assert_eq!(chunks.len(), 2);
        assert!((plan.remaining() - (0.1 - 0.002)).abs() < 1e-6);
    }

    #[test]
    fn disabled_takes_whole_step() {
        let params = params(false, 10);
        let chunks: Vec<f32> = SubstepPlan::new(&params, 0.02, 100.0).collect();
        assert_eq!(chunks, vec![0.02]);
        assert_eq!(stable_numerator(&params), 0.0);
        assert_eq!(substep_cap(&params), 1);
    }

    #[test]
    fn zero_dt_plans_nothing() {
        let params = params(true, 10);
        assert_eq!(SubstepPlan::new(&params, 0.0, 1.0).count(), 0);
    }
}
