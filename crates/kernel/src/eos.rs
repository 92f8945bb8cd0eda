//! Tait equation of state and its inverse.

/// Weakly-compressible Tait relation.
///
/// ```text
/// p = p0 * ((rho / rho0)^gamma - 1)
/// ```
///
/// Non-positive densities map to `-p0`, the pressure of an empty neighbourhood.
pub fn tait_pressure(density: f32, rest_density: f32, rest_pressure: f32, gamma: f32) -> f32 {
    let ratio = density / rest_density;
    if ratio <= 0.0 {
        return -rest_pressure;
    }
    rest_pressure * (ratio.powf(gamma) - 1.0)
}

/// Density that the Tait relation maps to `pressure`.
///
/// Used for boundary particles, whose own kernel-summed density is not meaningful.
/// The base is clamped at zero so pressures below `-p0` give zero density.
pub fn density_from_pressure(pressure: f32, rest_density: f32, rest_pressure: f32, gamma: f32) -> f32 {
    if rest_pressure <= 0.0 {
        return rest_density;
    }
    let base = pressure / rest_pressure + 1.0;
    if base <= 0.0 {
        return 0.0;
    }
    rest_density * base.powf(1.0 / gamma)
}
