//! Configuration parsing and validation for simulation runs

use std::fs;
use std::path::{Path, PathBuf};

use kernel::{BackendKind, ParamError, Params, Phase, PrimaryParams, Scene};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scene;

/// Errors raised while loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was opened
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// The file is not valid configuration JSON
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A structurally valid config with unusable values
    #[error("invalid config: {0}")]
    Invalid(String),
    /// The parameter block failed validation
    #[error(transparent)]
    Param(#[from] ParamError),
}

/// Main simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Human-readable run name
    #[serde(default = "default_name")]
    pub name: String,
    /// Which backend executes the steps
    #[serde(default)]
    pub backend: BackendKind,
    /// Primary simulation parameters
    #[serde(default)]
    pub params: PrimaryParams,
    /// Initial particle layout
    #[serde(default)]
    pub scene: SceneConfig,
    /// Stop after this many macro-steps
    #[serde(default)]
    pub max_frames: Option<u64>,
}

/// Initial particle layout: fluid rectangles plus an optional wall lining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Rectangles filled with fluid particles
    #[serde(default)]
    pub fluid_blocks: Vec<FluidBlock>,
    /// Static particles along the domain walls
    #[serde(default)]
    pub boundary_box: Option<BoundaryBox>,
}

/// One rectangle of fluid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluidBlock {
    /// Minimum corner [x, y]
    pub min: [f32; 2],
    /// Maximum corner [x, y]
    pub max: [f32; 2],
    /// Initial velocity of every particle in the block
    #[serde(default)]
    pub velocity: [f32; 2],
    /// Lattice pitch; defaults to the particle diameter
    #[serde(default)]
    pub spacing: Option<f32>,
}

/// Static boundary particles lining the domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryBox {
    /// Number of particle rows per wall
    #[serde(default = "default_layers")]
    pub layers: u32,
    /// Lattice pitch; defaults to the particle diameter
    #[serde(default)]
    pub spacing: Option<f32>,
}

fn default_name() -> String {
    "dam_break".to_string()
}

fn default_layers() -> u32 {
    2
}

impl Default for SceneConfig {
    /// The dam break: a fluid column against the left wall inside a two-layer box.
    fn default() -> Self {
        Self {
            fluid_blocks: vec![FluidBlock {
                min: [0.02, 0.4],
                max: [0.4, 0.98],
                velocity: [0.0, 0.0],
                spacing: None,
            }],
            boundary_box: Some(BoundaryBox {
                layers: default_layers(),
                spacing: None,
            }),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            backend: BackendKind::default(),
            params: PrimaryParams::default(),
            scene: SceneConfig::default(),
            max_frames: None,
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: SimulationConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Parameter finiteness and structural ranges
        self.params()?;

        let p = &self.params;
        if p.world_width <= 0.0 || p.world_height <= 0.0 {
            return Err(ConfigError::Invalid(
                "world extent must be positive".to_string(),
            ));
        }
        if p.particle_radius <= 0.0 {
            return Err(ConfigError::Invalid(
                "particle_radius must be positive".to_string(),
            ));
        }

        for (i, block) in self.scene.fluid_blocks.iter().enumerate() {
            if block.min[0] >= block.max[0] || block.min[1] >= block.max[1] {
                return Err(ConfigError::Invalid(format!(
                    "fluid block {i}: min must be less than max"
                )));
            }
            let outside = |v: [f32; 2]| {
                v[0] < 0.0 || v[1] < 0.0 || v[0] > p.world_width || v[1] > p.world_height
            };
            if outside(block.min) || outside(block.max) {
                return Err(ConfigError::Invalid(format!(
                    "fluid block {i} extends outside the world"
                )));
            }
            if matches!(block.spacing, Some(s) if !(s > 0.0)) {
                return Err(ConfigError::Invalid(format!(
                    "fluid block {i}: spacing must be positive"
                )));
            }
        }

        if let Some(walls) = &self.scene.boundary_box {
            if walls.layers == 0 {
                return Err(ConfigError::Invalid(
                    "boundary_box.layers must be at least 1".to_string(),
                ));
            }
            if matches!(walls.spacing, Some(s) if !(s > 0.0)) {
                return Err(ConfigError::Invalid(
                    "boundary_box.spacing must be positive".to_string(),
                ));
            }
        }

        if self.max_frames == Some(0) {
            return Err(ConfigError::Invalid(
                "max_frames must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Validated parameters with their derived constants
    pub fn params(&self) -> Result<Params, ConfigError> {
        Ok(Params::new(self.params)?)
    }

    /// Default lattice pitch: one particle diameter
    pub fn default_spacing(&self) -> f32 {
        2.0 * self.params.particle_radius
    }

    /// Build the initial particle layout. Boundary particles come first.
    pub fn build_scene(&self) -> Scene {
        let p = &self.params;
        let mut out = Scene::new();

        if let Some(walls) = &self.scene.boundary_box {
            out.extend(scene::boundary_box(
                [p.world_width, p.world_height],
                walls.spacing.unwrap_or_else(|| self.default_spacing()),
                walls.layers,
                p.rest_density,
            ));
        }

        for block in &self.scene.fluid_blocks {
            let mut fluid = scene::fill_rect(
                block.min,
                block.max,
                block.spacing.unwrap_or_else(|| self.default_spacing()),
                p.rest_density,
                Phase::Fluid,
            );
            for placement in &mut fluid.placements {
                placement.velocity = block.velocity;
            }
            out.extend(fluid);
        }
        out
    }
}
