//! Simulation parameters.
//!
//! [`PrimaryParams`] holds the user-facing tunables. [`DerivedParams`] holds the
//! constants computed from them (smoothing radius, kernel normalization, cell
//! size, rest pressure, speed limit). [`Params`] keeps both together and only
//! exposes mutation through [`Params::set_primary`], which re-derives every
//! dependent constant.

use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on `max_substeps`; also the size of the device-side substep schedule.
pub const MAX_SUBSTEPS_LIMIT: u32 = 64;

/// Upper bound on `cell_resolution_x * cell_resolution_y`; keeps every cell key inside `i32`.
pub const MAX_CELL_COUNT: u64 = 1 << 24;

/// Primary simulation tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrimaryParams {
    /// Number of neighbor-grid cells along x.
    #[serde(default = "default_cell_resolution")]
    pub cell_resolution_x: u32,
    /// Number of neighbor-grid cells along y.
    #[serde(default = "default_cell_resolution")]
    pub cell_resolution_y: u32,
    /// World extent along x. Domain walls sit at `0` and `world_width`.
    #[serde(default = "default_world_extent")]
    pub world_width: f32,
    /// World extent along y. Domain walls sit at `0` and `world_height`.
    #[serde(default = "default_world_extent")]
    pub world_height: f32,
    /// Gravitational acceleration.
    #[serde(default = "default_gravity")]
    pub gravity: [f32; 2],
    /// Particle radius; sets the smoothing radius and collision distance.
    #[serde(default = "default_particle_radius")]
    pub particle_radius: f32,
    /// Multiplier on the smoothing radius.
    #[serde(default = "default_smoothing_scale")]
    pub smoothing_scale: f32,
    /// Base-10 logarithm of the macro-step length.
    #[serde(default = "default_log_timestep")]
    pub log_timestep: f32,
    /// CFL-like factor used by the speed limit and the stable substep estimate.
    #[serde(default = "default_timestep_lambda")]
    pub timestep_lambda: f32,
    /// Split each macro-step into substeps sized from the current peak speed.
    #[serde(default = "default_true")]
    pub auto_substep: bool,
    /// Maximum number of substeps per macro-step.
    #[serde(default = "default_max_substeps")]
    pub max_substeps: u32,
    /// Clamp particle speed to the derived speed limit.
    #[serde(default = "default_true")]
    pub limit_speed: bool,
    /// Rest density of the fluid.
    #[serde(default = "default_rest_density")]
    pub rest_density: f32,
    /// Equation-of-state stiffness.
    #[serde(default = "default_stiffness")]
    pub stiffness: f32,
    /// Equation-of-state exponent.
    #[serde(default = "default_gamma")]
    pub gamma: f32,
    /// Viscosity coefficient.
    #[serde(default = "default_viscosity")]
    pub viscosity: f32,
    /// Restitution for fluid-fluid collisions.
    #[serde(default = "default_particle_restitution")]
    pub particle_restitution: f32,
    /// Restitution for collisions against boundary particles and domain walls.
    #[serde(default = "default_wall_restitution")]
    pub wall_restitution: f32,
}

fn default_cell_resolution() -> u32 {
    40
}

fn default_world_extent() -> f32 {
    1.0
}

fn default_gravity() -> [f32; 2] {
    [0.0, 0.5]
}

fn default_particle_radius() -> f32 {
    0.01
}

fn default_smoothing_scale() -> f32 {
    1.0
}

fn default_log_timestep() -> f32 {
    -2.5
}

fn default_timestep_lambda() -> f32 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_max_substeps() -> u32 {
    10
}

fn default_rest_density() -> f32 {
    3000.0
}

fn default_stiffness() -> f32 {
    1.0
}

fn default_gamma() -> f32 {
    7.0
}

fn default_viscosity() -> f32 {
    0.0015
}

fn default_particle_restitution() -> f32 {
    0.9
}

fn default_wall_restitution() -> f32 {
    0.4
}

impl Default for PrimaryParams {
    fn default() -> Self {
        Self {
            cell_resolution_x: default_cell_resolution(),
            cell_resolution_y: default_cell_resolution(),
            world_width: default_world_extent(),
            world_height: default_world_extent(),
            gravity: default_gravity(),
            particle_radius: default_particle_radius(),
            smoothing_scale: default_smoothing_scale(),
            log_timestep: default_log_timestep(),
            timestep_lambda: default_timestep_lambda(),
            auto_substep: true,
            max_substeps: default_max_substeps(),
            limit_speed: true,
            rest_density: default_rest_density(),
            stiffness: default_stiffness(),
            gamma: default_gamma(),
            viscosity: default_viscosity(),
            particle_restitution: default_particle_restitution(),
            wall_restitution: default_wall_restitution(),
        }
    }
}

/// Constants computed from [`PrimaryParams`] by [`derive`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedParams {
    /// Smoothing radius `h`.
    pub h: f32,
    /// Cubic-spline normalization `40 / (7 pi h^2)`.
    pub sigma: f32,
    /// Regularizer added to denominators, `0.01 h^2`.
    pub eta: f32,
    /// Neighbor-grid cell width.
    pub cell_width: f32,
    /// Neighbor-grid cell height.
    pub cell_height: f32,
    /// Reference pressure of the Tait equation.
    pub rest_pressure: f32,
    /// Macro-step length, `10^log_timestep`.
    pub timestep: f32,
    /// Maximum particle speed when speed limiting is on.
    pub speed_limit: f32,
    /// Separation below which approaching particles collide.
    pub collision_distance: f32,
}

/// Compute every derived constant. Pure; calling it twice yields identical values.
pub fn derive(primary: &PrimaryParams) -> DerivedParams {
    let h = 6.0 * primary.particle_radius * primary.smoothing_scale;
    let timestep = 10.0_f32.powf(primary.log_timestep);
    DerivedParams {
        h,
        sigma: 40.0 / (7.0 * PI * h * h),
        eta: 0.01 * h * h,
        cell_width: primary.world_width / primary.cell_resolution_x as f32,
        cell_height: primary.world_height / primary.cell_resolution_y as f32,
        rest_pressure: primary.rest_density * primary.stiffness * primary.stiffness / primary.gamma,
        timestep,
        speed_limit: primary.timestep_lambda * 2.0 * primary.particle_radius / timestep,
        collision_distance: primary.particle_radius,
    }
}

/// Errors raised when constructing or mutating [`Params`].
#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    /// A floating-point field was NaN or infinite.
    #[error("parameter `{field}` must be finite, got {value}")]
    NonFinite {
        /// Offending field.
        field: ParamField,
        /// Rejected value.
        value: f32,
    },
    /// The value variant does not match the field's type.
    #[error("parameter `{field}` expects {expected}, got {got}")]
    TypeMismatch {
        /// Offending field.
        field: ParamField,
        /// Type the field holds.
        expected: &'static str,
        /// Type that was supplied.
        got: &'static str,
    },
    /// A structural integer (grid resolution, substep cap) is outside its usable range.
    #[error("parameter `{field}` must be in {min}..={max}, got {value}")]
    OutOfRange {
        /// Offending field.
        field: ParamField,
        /// Rejected value.
        value: i64,
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
    },
    /// The grid has more cells than a cell key can address.
    #[error("grid of {x} x {y} cells exceeds the {max} cell limit")]
    TooManyCells {
        /// Cells along x.
        x: u32,
        /// Cells along y.
        y: u32,
        /// Largest accepted cell count.
        max: u64,
    },
    /// No field has this name.
    #[error("unknown parameter `{0}`")]
    UnknownField(String),
}

/// Addressable primary fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum ParamField {
    CellResolutionX,
    CellResolutionY,
    WorldWidth,
    WorldHeight,
    Gravity,
    ParticleRadius,
    SmoothingScale,
    LogTimestep,
    TimestepLambda,
    AutoSubstep,
    MaxSubsteps,
    LimitSpeed,
    RestDensity,
    Stiffness,
    Gamma,
    Viscosity,
    ParticleRestitution,
    WallRestitution,
}

impl ParamField {
    /// Every field, in declaration order.
    pub const ALL: [ParamField; 18] = [
        ParamField::CellResolutionX,
        ParamField::CellResolutionY,
        ParamField::WorldWidth,
        ParamField::WorldHeight,
        ParamField::Gravity,
        ParamField::ParticleRadius,
        ParamField::SmoothingScale,
        ParamField::LogTimestep,
        ParamField::TimestepLambda,
        ParamField::AutoSubstep,
        ParamField::MaxSubsteps,
        ParamField::LimitSpeed,
        ParamField::RestDensity,
        ParamField::Stiffness,
        ParamField::Gamma,
        ParamField::Viscosity,
        ParamField::ParticleRestitution,
        ParamField::WallRestitution,
    ];

    /// snake_case name, as used in config files and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            ParamField::CellResolutionX => "cell_resolution_x",
            ParamField::CellResolutionY => "cell_resolution_y",
            ParamField::WorldWidth => "world_width",
            ParamField::WorldHeight => "world_height",
            ParamField::Gravity => "gravity",
            ParamField::ParticleRadius => "particle_radius",
            ParamField::SmoothingScale => "smoothing_scale",
            ParamField::LogTimestep => "log_timestep",
            ParamField::TimestepLambda => "timestep_lambda",
            ParamField::AutoSubstep => "auto_substep",
            ParamField::MaxSubsteps => "max_substeps",
            ParamField::LimitSpeed => "limit_speed",
            ParamField::RestDensity => "rest_density",
            ParamField::Stiffness => "stiffness",
            ParamField::Gamma => "gamma",
            ParamField::Viscosity => "viscosity",
            ParamField::ParticleRestitution => "particle_restitution",
            ParamField::WallRestitution => "wall_restitution",
        }
    }
}

impl fmt::Display for ParamField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParamField {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamField::ALL
            .iter()
            .copied()
            .find(|field| field.name() == s)
            .ok_or_else(|| ParamError::UnknownField(s.to_string()))
    }
}

/// A value for [`Params::set_primary`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean toggle.
    Bool(bool),
    /// Integer count.
    Int(i64),
    /// Scalar.
    Float(f32),
    /// 2-vector.
    Vec2([f32; 2]),
}

impl ParamValue {
    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Vec2(_) => "vec2",
        }
    }
}

/// Primary and derived parameters kept in sync.
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    primary: PrimaryParams,
    derived: DerivedParams,
}

impl Default for Params {
    fn default() -> Self {
        let primary = PrimaryParams::default();
        Self {
            derived: derive(&primary),
            primary,
        }
    }
}

impl Params {
    /// Validate `primary` and compute its derived constants.
    pub fn new(primary: PrimaryParams) -> Result<Self, ParamError> {
        validate(&primary)?;
        Ok(Self {
            derived: derive(&primary),
            primary,
        })
    }

    /// Primary tunables.
    pub fn primary(&self) -> &PrimaryParams {
        &self.primary
    }

    /// Derived constants.
    pub fn derived(&self) -> &DerivedParams {
        &self.derived
    }

    /// Macro-step length.
    pub fn timestep(&self) -> f32 {
        self.derived.timestep
    }

    /// Set one primary field and re-derive. On error nothing changes.
    pub fn set_primary(&mut self, field: ParamField, value: ParamValue) -> Result<(), ParamError> {
        let mut next = self.primary;
        let mismatch = |expected: &'static str| ParamError::TypeMismatch {
            field,
            expected,
            got: value.type_name(),
        };

        match field {
            ParamField::AutoSubstep | ParamField::LimitSpeed => {
                let ParamValue::Bool(flag) = value else {
                    return Err(mismatch("bool"));
                };
                if field == ParamField::AutoSubstep {
                    next.auto_substep = flag;
                } else {
                    next.limit_speed = flag;
                }
            }
            ParamField::CellResolutionX | ParamField::CellResolutionY | ParamField::MaxSubsteps => {
                let ParamValue::Int(raw) = value else {
                    return Err(mismatch("int"));
                };
                let max = if field == ParamField::MaxSubsteps {
                    MAX_SUBSTEPS_LIMIT as i64
                } else {
                    u16::MAX as i64
                };
                if !(1..=max).contains(&raw) {
                    return Err(ParamError::OutOfRange { field, value: raw, min: 1, max });
                }
                let count = raw as u32;
                match field {
                    ParamField::CellResolutionX => next.cell_resolution_x = count,
                    ParamField::CellResolutionY => next.cell_resolution_y = count,
                    _ => next.max_substeps = count,
                }
            }
            ParamField::Gravity => {
                let ParamValue::Vec2(g) = value else {
                    return Err(mismatch("vec2"));
                };
                for component in g {
                    check_finite(field, component)?;
                }
                next.gravity = g;
            }
            _ => {
                let scalar = match value {
                    ParamValue::Float(v) => v,
                    ParamValue::Int(v) => v as f32,
                    _ => return Err(mismatch("float")),
                };
                check_finite(field, scalar)?;
                let slot = scalar_field(&mut next, field).ok_or_else(|| mismatch("float"))?;
                *slot = scalar;
            }
        }

        check_cell_count(&next)?;
        self.derived = derive(&next);
        self.primary = next;
        Ok(())
    }
}

fn scalar_field(primary: &mut PrimaryParams, field: ParamField) -> Option<&mut f32> {
    let slot = match field {
        ParamField::WorldWidth => &mut primary.world_width,
        ParamField::WorldHeight => &mut primary.world_height,
        ParamField::ParticleRadius => &mut primary.particle_radius,
        ParamField::SmoothingScale => &mut primary.smoothing_scale,
        ParamField::LogTimestep => &mut primary.log_timestep,
        ParamField::TimestepLambda => &mut primary.timestep_lambda,
        ParamField::RestDensity => &mut primary.rest_density,
        ParamField::Stiffness => &mut primary.stiffness,
        ParamField::Gamma => &mut primary.gamma,
        ParamField::Viscosity => &mut primary.viscosity,
        ParamField::ParticleRestitution => &mut primary.particle_restitution,
        ParamField::WallRestitution => &mut primary.wall_restitution,
        ParamField::CellResolutionX
        | ParamField::CellResolutionY
        | ParamField::Gravity
        | ParamField::AutoSubstep
        | ParamField::MaxSubsteps
        | ParamField::LimitSpeed => return None,
    };
    Some(slot)
}

fn check_finite(field: ParamField, value: f32) -> Result<(), ParamError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ParamError::NonFinite { field, value })
    }
}

fn check_cell_count(primary: &PrimaryParams) -> Result<(), ParamError> {
    let (x, y) = (primary.cell_resolution_x, primary.cell_resolution_y);
    if x as u64 * y as u64 > MAX_CELL_COUNT {
        return Err(ParamError::TooManyCells { x, y, max: MAX_CELL_COUNT });
    }
    Ok(())
}

fn validate(primary: &PrimaryParams) -> Result<(), ParamError> {
    let scalars = [
        (ParamField::WorldWidth, primary.world_width),
        (ParamField::WorldHeight, primary.world_height),
        (ParamField::Gravity, primary.gravity[0]),
        (ParamField::Gravity, primary.gravity[1]),
        (ParamField::ParticleRadius, primary.particle_radius),
        (ParamField::SmoothingScale, primary.smoothing_scale),
        (ParamField::LogTimestep, primary.log_timestep),
        (ParamField::TimestepLambda, primary.timestep_lambda),
        (ParamField::RestDensity, primary.rest_density),
        (ParamField::Stiffness, primary.stiffness),
        (ParamField::Gamma, primary.gamma),
        (ParamField::Viscosity, primary.viscosity),
        (ParamField::ParticleRestitution, primary.particle_restitution),
        (ParamField::WallRestitution, primary.wall_restitution),
    ];
    for (field, value) in scalars {
        check_finite(field, value)?;
    }

    let counts = [
        (ParamField::CellResolutionX, primary.cell_resolution_x, u16::MAX as u32),
        (ParamField::CellResolutionY, primary.cell_resolution_y, u16::MAX as u32),
        (ParamField::MaxSubsteps, primary.max_substeps, MAX_SUBSTEPS_LIMIT),
    ];
    for (field, value, max) in counts {
        if value == 0 || value > max {
            return Err(ParamError::OutOfRange {
                field,
                value: value as i64,
                min: 1,
                max: max as i64,
            });
        }
    }
    check_cell_count(primary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_matches_formulas() {
        let primary = PrimaryParams::default();
        let d = derive(&primary);

        assert!((d.h - 0.06).abs() < 1e-7);
        assert!((d.eta - 0.01 * 0.06 * 0.06).abs() < 1e-9);
        assert!((d.sigma - 40.0 / (7.0 * PI * 0.0036)).abs() < 1e-2);
        assert!((d.cell_width - 0.025).abs() < 1e-7);
        assert!((d.rest_pressure - 3000.0 / 7.0).abs() < 1e-3);
        assert!((d.collision_distance - 0.01).abs() < 1e-9);
        let dt = 10.0_f32.powf(-2.5);
        assert!((d.timestep - dt).abs() < 1e-9);
        assert!((d.speed_limit - 0.5 * 0.02 / dt).abs() < 1e-4);
    }

    #[test]
    fn derive_is_idempotent() {
        let primary = PrimaryParams {
            particle_radius: 0.004,
            smoothing_scale: 1.7,
            cell_resolution_x: 33,
            ..PrimaryParams::default()
        };
        let a = derive(&primary);
        let b = derive(&primary);
        assert_eq!(a, b);
    }

    #[test]
    fn setter_rederives() {
        let mut params = Params::default();
        params
            .set_primary(ParamField::ParticleRadius, ParamValue::Float(0.005))
            .unwrap();
        assert!((params.derived().h - 0.03).abs() < 1e-7);
        assert_eq!(params.derived(), &derive(params.primary()));

        params
            .set_primary(ParamField::CellResolutionX, ParamValue::Int(20))
            .unwrap();
        assert!((params.derived().cell_width - 0.05).abs() < 1e-7);
    }

    #[test]
    fn setter_rejects_non_finite() {
        let mut params = Params::default();
        let before = params.clone();
        let err = params
            .set_primary(ParamField::Viscosity, ParamValue::Float(f32::NAN))
            .unwrap_err();
        assert!(matches!(err, ParamError::NonFinite { field: ParamField::Viscosity, .. }));
        assert_eq!(params, before);

        let err = params
            .set_primary(ParamField::Gravity, ParamValue::Vec2([0.0, f32::INFINITY]))
            .unwrap_err();
        assert!(matches!(err, ParamError::NonFinite { .. }));
    }

    #[test]
    fn setter_rejects_wrong_type_and_range() {
        let mut params = Params::default();
        let err = params
            .set_primary(ParamField::LimitSpeed, ParamValue::Float(1.0))
            .unwrap_err();
        assert!(matches!(err, ParamError::TypeMismatch { expected: "bool", .. }));

        let err = params
            .set_primary(ParamField::MaxSubsteps, ParamValue::Int(0))
            .unwrap_err();
        assert!(matches!(err, ParamError::OutOfRange { .. }));

        params
            .set_primary(ParamField::MaxSubsteps, ParamValue::Int(20))
            .unwrap();
        assert_eq!(params.primary().max_substeps, 20);
    }

    #[test]
    fn setter_rejects_grids_beyond_the_key_range() {
        let mut params = Params::default();
        params
            .set_primary(ParamField::CellResolutionX, ParamValue::Int(u16::MAX as i64))
            .unwrap();
        let err = params
            .set_primary(ParamField::CellResolutionY, ParamValue::Int(u16::MAX as i64))
            .unwrap_err();
        assert!(matches!(err, ParamError::TooManyCells { .. }));
        assert_eq!(params.primary().cell_resolution_y, 40);

        params
            .set_primary(ParamField::CellResolutionY, ParamValue::Int(256))
            .unwrap();
        let grid = crate::neighbor::CellGrid::from_params(&params);
        let key = grid.cell_key([u16::MAX as i32 - 1, 255]);
        assert_eq!(key as u64 + 1, params.primary().cell_resolution_x as u64 * 256);
    }

    #[test]
    fn field_names_round_trip() {
        for field in ParamField::ALL {
            assert_eq!(field.name().parse::<ParamField>().unwrap(), field);
        }
        assert!("not_a_field".parse::<ParamField>().is_err());
    }

    #[test]
    fn new_rejects_non_finite_primary() {
        let primary = PrimaryParams {
            rest_density: f32::NAN,
            ..PrimaryParams::default()
        };
        assert!(Params::new(primary).is_err());
    }

    #[test]
    fn primary_deserializes_with_defaults() {
        let primary: PrimaryParams = serde_json::from_str(r#"{"viscosity": 0.002}"#).unwrap();
        assert_eq!(primary.cell_resolution_x, 40);
        assert!((primary.viscosity - 0.002).abs() < 1e-9);
    }
}
