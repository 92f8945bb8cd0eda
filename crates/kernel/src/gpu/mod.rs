//! wgpu compute implementation of the SPH simulation kernel.
//!
//! `GpuKernel` implements `SimulationKernel` with compute passes composed from
//! the fragment graph in [`programs`]. Particle data lives on the device
//! between steps; readback happens only on demand.
//!
//! # Macro-step
//! One command encoder per call to `step`:
//!
//! 1. Key pairs: one `(cell key, index)` per slot of the padded sort array
//! 2. Sort: one dispatch per pass of the odd-even merge schedule, ping-ponging the pairs
//! 3. Bucket: clear the cell table, then scatter-min start and scatter-add count
//! 4. Peak speed and substep planning, written to a 64-slot schedule on the device
//! 5. For every schedule slot: density, velocity guess, pressure, pressure
//!    force, velocity, advection. Slots planned as zero-length leave every
//!    field untouched, so no readback is needed to pick the substep count.
//!
//! # Bindings
//! Each program uses bind group 0 only. Bind groups are built at encode time
//! from a [`BindingContext`] keyed by binding name, so a pass whose program
//! needs a buffer nobody supplied fails before anything is submitted.

pub mod buffers;
pub mod programs;

use thiserror::Error;

use buffers::{read_buffer, GpuBuffers, GpuSimParams};
use crate::input::InputSnapshot;
use crate::neighbor::{CellGrid, CellRange, KeyIndexPair};
use crate::params::Params;
use crate::particle::{ParticleArrays, Scene};
use crate::shader::{self, BindingContext, BindingKind, ComposedProgram, ProgramSource, ShaderError};
use crate::transfer::{self, TransferError};
use crate::{KernelError, SimulationKernel};

/// Errors raised by the GPU backend.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No adapter matched the request.
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    /// The adapter refused the device request.
    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    /// The widest pass binds more storage buffers than the adapter allows.
    #[error("adapter allows {available} storage buffers per shader stage, {required} are needed")]
    StorageLimit {
        /// Storage buffers the widest pass binds.
        required: u32,
        /// Adapter limit.
        available: u32,
    },
    /// WGSL or pipeline validation failed.
    #[error("pipeline `{program}` failed validation: {message}")]
    Pipeline {
        /// Program label.
        program: &'static str,
        /// Validation message from wgpu.
        message: String,
    },
    /// Mapping a readback buffer failed.
    #[error("buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),
    /// The map callback was dropped without reporting.
    #[error("readback channel closed before the buffer was mapped")]
    ReadbackLost,
    /// Read-back bytes did not decode.
    #[error(transparent)]
    Transfer(#[from] TransferError),
    /// Program composition or binding resolution failed.
    #[error(transparent)]
    Composition(#[from] ShaderError),
}

/// Check whether a GPU adapter is available.
pub fn gpu_available() -> bool {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }));
    adapter.is_some()
}

/// A composed program with its layout and compiled pipeline.
pub struct Pipeline {
    composed: ComposedProgram,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl Pipeline {
    /// Compose `source` and compile it, surfacing WGSL validation errors.
    pub fn new(
        device: &wgpu::Device,
        source: &ProgramSource,
        max_storage: u32,
    ) -> Result<Self, GpuError> {
        let composed = shader::compose(source)?;
        let count = composed.storage_count();
        if count > max_storage {
            return Err(ShaderError::TooManyBindings {
                program: composed.label,
                count,
                limit: max_storage,
            }
            .into());
        }

        let entries: Vec<wgpu::BindGroupLayoutEntry> = composed
            .bindings
            .iter()
            .enumerate()
            .map(|(slot, binding)| match binding.kind {
                BindingKind::Uniform { .. } => bgl_uniform(slot as u32),
                BindingKind::Storage {
                    access: shader::Access::Read,
                    ..
                } => bgl_storage_ro(slot as u32),
                BindingKind::Storage {
                    access: shader::Access::ReadWrite,
                    ..
                } => bgl_storage_rw(slot as u32),
            })
            .collect();

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(composed.label),
            source: wgpu::ShaderSource::Wgsl(composed.source.clone().into()),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(composed.label),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(composed.label),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(composed.label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(GpuError::Pipeline {
                program: composed.label,
                message: error.to_string(),
            });
        }

        Ok(Self {
            composed,
            layout,
            pipeline,
        })
    }

    /// Program label.
    pub fn label(&self) -> &'static str {
        self.composed.label
    }
}

struct Pipelines {
    key_pairs: Pipeline,
    sort_merge: Pipeline,
    bucket_clear: Pipeline,
    bucket_scatter: Pipeline,
    peak_speed: Pipeline,
    plan_substeps: Pipeline,
    density: Pipeline,
    velocity_guess: Pipeline,
    pressure: Pipeline,
    pressure_force: Pipeline,
    velocity: Pipeline,
    advect: Pipeline,
}

impl Pipelines {
    fn new(device: &wgpu::Device, max_storage: u32) -> Result<Self, GpuError> {
        let build = |source: &ProgramSource| Pipeline::new(device, source, max_storage);
        Ok(Self {
            key_pairs: build(&programs::KEY_PAIRS)?,
            sort_merge: build(&programs::SORT_MERGE)?,
            bucket_clear: build(&programs::BUCKET_CLEAR)?,
            bucket_scatter: build(&programs::BUCKET_SCATTER)?,
            peak_speed: build(&programs::PEAK_SPEED_PASS)?,
            plan_substeps: build(&programs::PLAN_SUBSTEPS)?,
            density: build(&programs::DENSITY_PASS)?,
            velocity_guess: build(&programs::VELOCITY_GUESS_PASS)?,
            pressure: build(&programs::PRESSURE_PASS)?,
            pressure_force: build(&programs::PRESSURE_FORCE_PASS)?,
            velocity: build(&programs::VELOCITY_PASS)?,
            advect: build(&programs::ADVECT_PASS)?,
        })
    }
}

/// GPU-accelerated SPH simulation kernel using wgpu compute shaders.
pub struct GpuKernel {
    device: wgpu::Device,
    queue: wgpu::Queue,
    max_storage: u32,
    pipelines: Pipelines,
    buffers: GpuBuffers,
    n: usize,
}

impl GpuKernel {
    /// Create a GPU kernel holding `scene`.
    ///
    /// Returns an error when no adapter is found or it cannot bind enough
    /// storage buffers per pass; the caller decides whether to fall back.
    pub fn new(scene: &Scene, params: &Params) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(GpuError::NoAdapter)?;

        tracing::info!("GPU adapter: {:?}", adapter.get_info().name);

        // wgpu defaults to 8 storage buffers per stage; the widest pass needs more.
        let available = adapter.limits().max_storage_buffers_per_shader_stage;
        if available < programs::REQUIRED_STORAGE_BUFFERS {
            return Err(GpuError::StorageLimit {
                required: programs::REQUIRED_STORAGE_BUFFERS,
                available,
            });
        }
        let required_limits = wgpu::Limits {
            max_storage_buffers_per_shader_stage: available,
            ..wgpu::Limits::default()
        };
        tracing::info!(
            "Requesting max_storage_buffers_per_shader_stage = {} (need {})",
            available,
            programs::REQUIRED_STORAGE_BUFFERS,
        );

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("sph_gpu_device"),
                required_features: wgpu::Features::empty(),
                required_limits,
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))?;

        let max_storage = device.limits().max_storage_buffers_per_shader_stage;
        let pipelines = Pipelines::new(&device, max_storage)?;
        let particles = ParticleArrays::from_scene(scene);
        let cell_count = CellGrid::from_params(params).cell_count();
        let buffers = GpuBuffers::new(&device, &particles, cell_count);

        Ok(Self {
            device,
            queue,
            max_storage,
            pipelines,
            n: particles.len(),
            buffers,
        })
    }

    /// Sorted pairs and cell table built during the last macro-step.
    pub fn read_neighbor_index(&self) -> Result<(Vec<KeyIndexPair>, Vec<CellRange>), GpuError> {
        let pair_bytes = read_buffer(
            &self.device,
            &self.queue,
            self.buffers.pairs.read(),
            (self.n * transfer::KEY_INDEX.device_stride()) as u64,
        )?;
        let cells = self.buffers.grids.cells.len as usize;
        let range_bytes = read_buffer(
            &self.device,
            &self.queue,
            &self.buffers.cell_slots,
            (cells * transfer::CELL_RANGE.device_stride()) as u64,
        )?;
        Ok((
            transfer::decode_pairs(&pair_bytes, self.n)?,
            transfer::decode_ranges(&range_bytes, cells)?,
        ))
    }

    /// Buffers every program may draw from, keyed by binding name.
    fn context(&self) -> BindingContext<'_, wgpu::Buffer> {
        let b = &self.buffers;
        let mut ctx = BindingContext::new();
        ctx.set(&programs::PARAMS, &b.params)
            .set(&programs::PHASE, &b.phase)
            .set(&programs::POSITION, b.position.read())
            .set(&programs::POSITION_OUT, b.position.write())
            .set(&programs::VELOCITY, &b.velocity)
            .set(&programs::VELOCITY_GUESS, &b.velocity_guess)
            .set(&programs::F_PRESSURE, &b.f_pressure)
            .set(&programs::MASS, &b.mass)
            .set(&programs::DENSITY, &b.density)
            .set(&programs::PRESSURE, &b.pressure)
            .set(&programs::PAIRS_IN, b.pairs.read())
            .set(&programs::PAIRS_OUT, b.pairs.write())
            .set(&programs::SORTED_PAIRS, b.pairs.read())
            .set(&programs::CELL_TABLE, &b.cell_slots)
            .set(&programs::CELL_SLOTS, &b.cell_slots)
            .set(&programs::MAX_SPEED, &b.max_speed)
            .set(&programs::PEAK_SPEED, &b.max_speed)
            .set(&programs::SCHEDULE, &b.schedule);
        ctx
    }

    fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &Pipeline,
        ctx: &BindingContext<'_, wgpu::Buffer>,
        (x, y): (u32, u32),
    ) -> Result<(), GpuError> {
        let resolved = ctx.resolve(&pipeline.composed, self.max_storage)?;
        let entries: Vec<wgpu::BindGroupEntry> = resolved
            .iter()
            .map(|&(binding, buffer)| wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(pipeline.label()),
            layout: &pipeline.layout,
            entries: &entries,
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(pipeline.label()),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(x, y, 1);
        Ok(())
    }

    /// Key, sort and bucket the particles into the cell table.
    fn encode_neighbor_index(&mut self, encoder: &mut wgpu::CommandEncoder) -> Result<(), GpuError> {
        let grids = self.buffers.grids;

        self.dispatch(encoder, &self.pipelines.key_pairs, &self.context(), grids.sort.workgroups())?;
        self.buffers.pairs.swap();

        for i in 0..self.buffers.sort_passes.len() {
            let mut ctx = self.context();
            ctx.set(&programs::SORT_PASS, &self.buffers.sort_passes[i]);
            self.dispatch(encoder, &self.pipelines.sort_merge, &ctx, grids.sort.workgroups())?;
            drop(ctx);
            self.buffers.pairs.swap();
        }

        let ctx = self.context();
        self.dispatch(encoder, &self.pipelines.bucket_clear, &ctx, grids.cells.workgroups())?;
        self.dispatch(encoder, &self.pipelines.bucket_scatter, &ctx, grids.particles.workgroups())?;
        Ok(())
    }

    /// Reduce the peak speed and fill the substep schedule.
    fn encode_substep_plan(&self, encoder: &mut wgpu::CommandEncoder) -> Result<(), GpuError> {
        encoder.clear_buffer(&self.buffers.max_speed, 0, None);
        let mut ctx = self.context();
        self.dispatch(encoder, &self.pipelines.peak_speed, &ctx, self.buffers.grids.particles.workgroups())?;
        ctx.set(&programs::SCHEDULE_RW, &self.buffers.schedule);
        self.dispatch(encoder, &self.pipelines.plan_substeps, &ctx, (1, 1))?;
        Ok(())
    }

    /// The six stages for schedule slot `slot`.
    fn encode_substep(&mut self, encoder: &mut wgpu::CommandEncoder, slot: usize) -> Result<(), GpuError> {
        let workgroups = self.buffers.grids.particles.workgroups();
        {
            let mut ctx = self.context();
            ctx.set(&programs::SUBSTEP, &self.buffers.substeps[slot]);
            let p = &self.pipelines;
            for pipeline in [
                &p.density,
                &p.velocity_guess,
                &p.pressure,
                &p.pressure_force,
                &p.velocity,
                &p.advect,
            ] {
                self.dispatch(encoder, pipeline, &ctx, workgroups)?;
            }
        }
        self.buffers.position.swap();
        Ok(())
    }
}

impl SimulationKernel for GpuKernel {
    fn reset(&mut self, scene: &Scene) -> Result<(), KernelError> {
        let particles = ParticleArrays::from_scene(scene);
        let cell_count = self.buffers.grids.cells.len as usize;
        self.buffers = GpuBuffers::new(&self.device, &particles, cell_count);
        self.n = particles.len();
        tracing::info!(
            particles = self.n,
            fluid = particles.fluid_count(),
            "GPU kernel reset"
        );
        Ok(())
    }

    fn step(&mut self, params: &Params, dt: f32, input: &InputSnapshot) -> Result<(), KernelError> {
        if self.n == 0 {
            return Ok(());
        }

        self.buffers
            .ensure_cells(&self.device, CellGrid::from_params(params).cell_count());
        let sim = GpuSimParams::new(params, &self.buffers.grids, dt, input);
        self.buffers.update_params(&self.queue, &sim);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("macro_step"),
        });
        self.encode_neighbor_index(&mut encoder)?;
        self.encode_substep_plan(&mut encoder)?;
        for slot in 0..sim.substep_slots as usize {
            self.encode_substep(&mut encoder, slot)?;
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.device.poll(wgpu::Maintain::Poll);

        tracing::debug!(
            slots = sim.substep_slots,
            sort_passes = self.buffers.sort_schedule.len(),
            "GPU macro-step submitted"
        );
        Ok(())
    }

    fn read_state(&self) -> Result<ParticleArrays, KernelError> {
        Ok(self.buffers.readback_particles(&self.device, &self.queue)?)
    }

    fn particle_count(&self) -> usize {
        self.n
    }
}

// ---- Bind group layout entry helpers ----

fn bgl_uniform(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage_ro(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage_rw(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
