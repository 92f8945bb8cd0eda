//! Scene construction helpers
//!
//! Builds particle layouts on a regular lattice: rectangular fluid blocks,
//! a static boundary box lining the domain walls, and the default dam break.

use kernel::{ParticlePlacement, Params, Phase, Scene};

/// Fill the rectangle `[min, max)` with particles on a square lattice of
/// pitch `spacing`, offset by half a pitch from `min`.
///
/// Each particle carries the mass of one lattice cell at `rest_density`.
pub fn fill_rect(
    min: [f32; 2],
    max: [f32; 2],
    spacing: f32,
    rest_density: f32,
    phase: Phase,
) -> Scene {
    let mut scene = Scene::new();
    if !(spacing > 0.0) {
        return scene;
    }
    let mass = rest_density * spacing * spacing;
    let count_x = lattice_count(min[0], max[0], spacing);
    let count_y = lattice_count(min[1], max[1], spacing);

    for ix in 0..count_x {
        for iy in 0..count_y {
            scene.push(ParticlePlacement {
                phase,
                mass,
                position: [
                    min[0] + (ix as f32 + 0.5) * spacing,
                    min[1] + (iy as f32 + 0.5) * spacing,
                ],
                velocity: [0.0, 0.0],
            });
        }
    }
    scene
}

/// Number of lattice sites `min + (i + 0.5) spacing` that fall below `max`.
fn lattice_count(min: f32, max: f32, spacing: f32) -> usize {
    if max <= min {
        return 0;
    }
    // Sites sit half a pitch inside the rectangle, so rounding slack is harmless.
    ((max - min) / spacing + 1e-3).floor() as usize
}

/// Static particles lining the four walls of `[0, world[0]] x [0, world[1]]`,
/// `layers` rows deep. Corners are filled by the top and bottom walls.
pub fn boundary_box(world: [f32; 2], spacing: f32, layers: u32, rest_density: f32) -> Scene {
    let depth = layers as f32 * spacing;
    let [w, h] = world;
    let mut scene = Scene::new();

    // Bottom and top walls span the full width.
    scene.extend(fill_rect([0.0, 0.0], [w, depth], spacing, rest_density, Phase::Boundary));
    scene.extend(fill_rect([0.0, h - depth], [w, h], spacing, rest_density, Phase::Boundary));
    // Side walls between them.
    scene.extend(fill_rect([0.0, depth], [depth, h - depth], spacing, rest_density, Phase::Boundary));
    scene.extend(fill_rect([w - depth, depth], [w, h - depth], spacing, rest_density, Phase::Boundary));
    scene
}

/// The default scene: a column of fluid against the left wall, inside a
/// two-layer boundary box. Gravity points along +y, so the column sits on
/// the wall at `y = world_height`.
pub fn dam_break(params: &Params) -> Scene {
    let p = params.primary();
    let spacing = 2.0 * p.particle_radius;
    let world = [p.world_width, p.world_height];

    let mut scene = boundary_box(world, spacing, 2, p.rest_density);
    scene.extend(fill_rect(
        [0.02 * world[0], 0.4 * world[1]],
        [0.4 * world[0], 0.98 * world[1]],
        spacing,
        p.rest_density,
        Phase::Fluid,
    ));
    scene
}
