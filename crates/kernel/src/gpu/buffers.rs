//! GPU buffer management for SPH particle data.
//!
//! Creates and manages wgpu storage buffers for the particle fields, the
//! padded sort array and the cell table. Handles CPU->GPU upload through the
//! [`transfer`](crate::transfer) contract and blocking GPU->CPU readback.

use wgpu::util::DeviceExt;

use crate::input::InputSnapshot;
use crate::params::{Params, MAX_SUBSTEPS_LIMIT};
use crate::particle::ParticleArrays;
use crate::ping_pong::PingPong;
use crate::sort_network::{self, SortPass};
use crate::substep;
use crate::transfer::{self, StateField};

use super::GpuError;

/// Workgroup edge length; every particle-parallel pass runs 8x8 invocations per group.
pub const WORKGROUP_EDGE: u32 = 8;

/// Minimum buffer size (wgpu requires non-zero buffers; 16 keeps vec2 arrays aligned).
const MIN_BUF_SIZE: u64 = 16;

/// Simulation parameters uniform buffer layout.
/// Must match the SimParams struct in the WGSL definitions exactly.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSimParams {
    pub n: u32,
    pub particle_grid_w: u32,
    pub sort_len: u32,
    pub sort_grid_w: u32,
    pub cell_count: u32,
    pub cell_grid_w: u32,
    pub res_x: u32,
    pub res_y: u32,
    pub limit_speed: u32,
    pub pointer_down: u32,
    pub substep_slots: u32,
    pub _pad0: u32,
    pub cell_w: f32,
    pub cell_h: f32,
    pub h: f32,
    pub sigma: f32,
    pub eta: f32,
    pub viscosity: f32,
    pub rest_density: f32,
    pub rest_pressure: f32,
    pub gamma: f32,
    pub particle_restitution: f32,
    pub wall_restitution: f32,
    pub collision_distance: f32,
    pub speed_limit: f32,
    pub gravity_x: f32,
    pub gravity_y: f32,
    pub world_w: f32,
    pub world_h: f32,
    pub pointer_x: f32,
    pub pointer_y: f32,
    pub pointer_vx: f32,
    pub pointer_vy: f32,
    pub frame_dt: f32,
    pub stable_numerator: f32,
    pub _pad1: u32,
}

impl GpuSimParams {
    /// Uniform contents for one macro-step.
    pub fn new(
        params: &Params,
        grids: &Grids,
        frame_dt: f32,
        input: &InputSnapshot,
    ) -> Self {
        let p = params.primary();
        let d = params.derived();
        Self {
            n: grids.particles.len,
            particle_grid_w: grids.particles.width,
            sort_len: grids.sort.len,
            sort_grid_w: grids.sort.width,
            cell_count: grids.cells.len,
            cell_grid_w: grids.cells.width,
            res_x: p.cell_resolution_x,
            res_y: p.cell_resolution_y,
            limit_speed: p.limit_speed as u32,
            pointer_down: input.down as u32,
            substep_slots: substep::substep_cap(params),
            _pad0: 0,
            cell_w: d.cell_width,
            cell_h: d.cell_height,
            h: d.h,
            sigma: d.sigma,
            eta: d.eta,
            viscosity: p.viscosity,
            rest_density: p.rest_density,
            rest_pressure: d.rest_pressure,
            gamma: p.gamma,
            particle_restitution: p.particle_restitution,
            wall_restitution: p.wall_restitution,
            collision_distance: d.collision_distance,
            speed_limit: d.speed_limit,
            gravity_x: p.gravity[0],
            gravity_y: p.gravity[1],
            world_w: p.world_width,
            world_h: p.world_height,
            pointer_x: input.position[0],
            pointer_y: input.position[1],
            pointer_vx: input.velocity[0],
            pointer_vy: input.velocity[1],
            frame_dt,
            stable_numerator: substep::stable_numerator(params),
            _pad1: 0,
        }
    }
}

/// Uniform for one merge pass of the sort network.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SortPassParams {
    pub stage_width: u32,
    pub compare_width: u32,
    pub _pad: [u32; 2],
}

/// Uniform naming the schedule slot a substep dispatch reads its `dt` from.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SubstepParams {
    pub slot: u32,
    pub _pad: [u32; 3],
}

/// Logical 2-D layout of a 1-D buffer: `width = ceil(sqrt(len))` texels per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexelGrid {
    pub len: u32,
    pub width: u32,
    pub height: u32,
}

impl TexelGrid {
    pub fn for_len(len: u32) -> Self {
        let mut width = (len as f64).sqrt().ceil() as u32;
        while (width as u64) * (width as u64) < len as u64 {
            width += 1;
        }
        let width = width.max(1);
        Self {
            len,
            width,
            height: len.div_ceil(width),
        }
    }

    /// Workgroup counts covering every texel.
    pub fn workgroups(&self) -> (u32, u32) {
        (
            self.width.div_ceil(WORKGROUP_EDGE),
            self.height.div_ceil(WORKGROUP_EDGE),
        )
    }
}

/// Texel grids of the particle fields, the padded sort array and the cell table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grids {
    pub particles: TexelGrid,
    pub sort: TexelGrid,
    pub cells: TexelGrid,
}

impl Grids {
    pub fn new(n: usize, cell_count: usize) -> Self {
        Self {
            particles: TexelGrid::for_len(n as u32),
            sort: TexelGrid::for_len(sort_network::padded_len(n) as u32),
            cells: TexelGrid::for_len(cell_count as u32),
        }
    }
}

/// All GPU buffers needed for the SPH simulation.
pub struct GpuBuffers {
    // Uniform buffers
    pub params: wgpu::Buffer,
    pub sort_passes: Vec<wgpu::Buffer>,
    pub substeps: Vec<wgpu::Buffer>,

    // Particle fields
    pub phase: wgpu::Buffer,
    pub position: PingPong<wgpu::Buffer>,
    pub velocity: wgpu::Buffer,
    pub velocity_guess: wgpu::Buffer,
    pub f_pressure: wgpu::Buffer,
    pub mass: wgpu::Buffer,
    pub density: wgpu::Buffer,
    pub pressure: wgpu::Buffer,

    // Neighbor index
    pub pairs: PingPong<wgpu::Buffer>,
    pub cell_slots: wgpu::Buffer,

    // Substep planning
    pub max_speed: wgpu::Buffer,
    pub schedule: wgpu::Buffer,

    pub sort_schedule: Vec<SortPass>,
    pub grids: Grids,
}

fn storage_usage() -> wgpu::BufferUsages {
    wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST
}

/// Create a storage buffer holding `contents`. If empty, creates a minimal buffer.
fn create_storage_init(device: &wgpu::Device, label: &str, contents: &[u8]) -> wgpu::Buffer {
    if contents.is_empty() {
        create_storage(device, label, 0)
    } else {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: storage_usage(),
        })
    }
}

/// Create a zero-filled storage buffer of at least `size` bytes.
fn create_storage(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size.max(MIN_BUF_SIZE),
        usage: storage_usage(),
        mapped_at_creation: false,
    })
}

fn create_uniform<T: bytemuck::Pod>(device: &wgpu::Device, label: &str, value: &T) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(value),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

impl GpuBuffers {
    /// Upload `particles` and allocate every derived buffer.
    pub fn new(device: &wgpu::Device, particles: &ParticleArrays, cell_count: usize) -> Self {
        let n = particles.len();
        let grids = Grids::new(n, cell_count);
        let field = |f: StateField| {
            create_storage_init(device, f.layout().name, &transfer::encode_field(particles, f))
        };
        let position_bytes = transfer::encode_field(particles, StateField::Position);
        let pair_bytes = grids.sort.len as u64 * transfer::KEY_INDEX.device_stride() as u64;

        let sort_schedule = sort_network::schedule(n);
        let sort_passes = sort_schedule
            .iter()
            .enumerate()
            .map(|(i, pass)| {
                create_uniform(
                    device,
                    &format!("sort_pass_{i}"),
                    &SortPassParams {
                        stage_width: pass.stage_width,
                        compare_width: pass.compare_width,
                        _pad: [0; 2],
                    },
                )
            })
            .collect();
        let substeps = (0..MAX_SUBSTEPS_LIMIT)
            .map(|slot| {
                create_uniform(
                    device,
                    &format!("substep_{slot}"),
                    &SubstepParams { slot, _pad: [0; 3] },
                )
            })
            .collect();

        Self {
            params: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("sim_params"),
                size: std::mem::size_of::<GpuSimParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            sort_passes,
            substeps,
            phase: field(StateField::Phase),
            position: PingPong::new(
                create_storage_init(device, "position_a", &position_bytes),
                create_storage_init(device, "position_b", &position_bytes),
            ),
            velocity: field(StateField::Velocity),
            velocity_guess: field(StateField::VelocityGuess),
            f_pressure: field(StateField::FPressure),
            mass: field(StateField::Mass),
            density: field(StateField::Density),
            pressure: field(StateField::Pressure),
            pairs: PingPong::new(
                create_storage(device, "pairs_a", pair_bytes),
                create_storage(device, "pairs_b", pair_bytes),
            ),
            cell_slots: create_storage(
                device,
                "cell_slots",
                cell_count as u64 * transfer::CELL_RANGE.device_stride() as u64,
            ),
            max_speed: create_storage(device, "max_speed", 4),
            schedule: create_storage(device, "schedule", MAX_SUBSTEPS_LIMIT as u64 * 4),
            sort_schedule,
            grids,
        }
    }

    /// Reallocate the cell table when the grid resolution changed.
    pub fn ensure_cells(&mut self, device: &wgpu::Device, cell_count: usize) {
        if self.grids.cells.len as usize == cell_count {
            return;
        }
        tracing::debug!(cell_count, "reallocating GPU cell table");
        self.cell_slots = create_storage(
            device,
            "cell_slots",
            cell_count as u64 * transfer::CELL_RANGE.device_stride() as u64,
        );
        self.grids.cells = TexelGrid::for_len(cell_count as u32);
    }

    /// Update the uniform params buffer.
    pub fn update_params(&self, queue: &wgpu::Queue, params: &GpuSimParams) {
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(params));
    }

    /// Current device buffer of a particle field.
    pub fn field(&self, field: StateField) -> &wgpu::Buffer {
        match field {
            StateField::Phase => &self.phase,
            StateField::Position => self.position.read(),
            StateField::Velocity => &self.velocity,
            StateField::VelocityGuess => &self.velocity_guess,
            StateField::FPressure => &self.f_pressure,
            StateField::Mass => &self.mass,
            StateField::Density => &self.density,
            StateField::Pressure => &self.pressure,
        }
    }

    /// Read back all particle data from GPU to CPU.
    pub fn readback_particles(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<ParticleArrays, GpuError> {
        let n = self.grids.particles.len as usize;
        let mut particles = ParticleArrays::zeroed(n);
        if n == 0 {
            return Ok(particles);
        }
        for field in StateField::ALL {
            let bytes = read_buffer(
                device,
                queue,
                self.field(field),
                (n * field.layout().device_stride()) as u64,
            )?;
            transfer::decode_field(&mut particles, field, &bytes)?;
        }
        Ok(particles)
    }
}

/// Copy the first `byte_len` bytes of `buffer` to a staging buffer and block
/// until they are mapped.
pub fn read_buffer(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
    byte_len: u64,
) -> Result<Vec<u8>, GpuError> {
    if byte_len == 0 {
        return Ok(Vec::new());
    }
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback_staging"),
        size: byte_len,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback"),
    });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, byte_len);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv().map_err(|_| GpuError::ReadbackLost)??;

    let data = slice.get_mapped_range();
    let bytes = data.to_vec();
    drop(data);
    staging.unmap();
    Ok(bytes)
}
