//! Fragment graph of the compute programs.
//!
//! Every buffer a pass touches is a [`Binding`], every piece of shared WGSL a
//! [`Definition`]. A read-only and a read-write binding of the same field share
//! a name so one buffer satisfies both in a [`BindingContext`](crate::shader::BindingContext).

use crate::shader::{Access, Binding, BindingKind, Definition, Dependency, ProgramSource};

const fn storage(name: &'static str, ty: &'static str, access: Access) -> Binding {
    Binding {
        name,
        kind: BindingKind::Storage { ty, access },
        deps: &[],
    }
}

// ---- Type definitions ----

pub static SIM_PARAMS_STRUCT: Definition = Definition {
    name: "SimParams",
    source: include_str!("shaders/defs/sim_params.wgsl"),
    deps: &[],
};

pub static SORT_PASS_STRUCT: Definition = Definition {
    name: "SortPassParams",
    source: "struct SortPassParams { stage_width: u32, compare_width: u32, _pad0: u32, _pad1: u32 }",
    deps: &[],
};

pub static SUBSTEP_STRUCT: Definition = Definition {
    name: "SubstepParams",
    source: "struct SubstepParams { slot: u32, _pad0: u32, _pad1: u32, _pad2: u32 }",
    deps: &[],
};

pub static CELL_SLOT_STRUCT: Definition = Definition {
    name: "CellSlot",
    source: "struct CellSlot { start: atomic<u32>, count: atomic<u32> }",
    deps: &[],
};

// ---- Bindings ----

pub static PARAMS: Binding = Binding {
    name: "params",
    kind: BindingKind::Uniform { ty: "SimParams" },
    deps: &[Dependency::Definition(&SIM_PARAMS_STRUCT)],
};

pub static SORT_PASS: Binding = Binding {
    name: "sort_pass",
    kind: BindingKind::Uniform {
        ty: "SortPassParams",
    },
    deps: &[Dependency::Definition(&SORT_PASS_STRUCT)],
};

pub static SUBSTEP: Binding = Binding {
    name: "substep",
    kind: BindingKind::Uniform { ty: "SubstepParams" },
    deps: &[Dependency::Definition(&SUBSTEP_STRUCT)],
};

pub static PHASE: Binding = storage("phase", "array<i32>", Access::Read);
pub static POSITION: Binding = storage("position", "array<vec2<f32>>", Access::Read);
pub static POSITION_OUT: Binding = storage("position_out", "array<vec2<f32>>", Access::ReadWrite);
pub static VELOCITY: Binding = storage("velocity", "array<vec2<f32>>", Access::Read);
pub static VELOCITY_RW: Binding = storage("velocity", "array<vec2<f32>>", Access::ReadWrite);
pub static VELOCITY_GUESS: Binding = storage("velocity_guess", "array<vec2<f32>>", Access::Read);
pub static VELOCITY_GUESS_RW: Binding =
    storage("velocity_guess", "array<vec2<f32>>", Access::ReadWrite);
pub static F_PRESSURE: Binding = storage("f_pressure", "array<vec2<f32>>", Access::Read);
pub static F_PRESSURE_RW: Binding = storage("f_pressure", "array<vec2<f32>>", Access::ReadWrite);
pub static MASS: Binding = storage("mass", "array<f32>", Access::Read);
pub static DENSITY: Binding = storage("density", "array<f32>", Access::Read);
pub static DENSITY_RW: Binding = storage("density", "array<f32>", Access::ReadWrite);
pub static PRESSURE: Binding = storage("pressure", "array<f32>", Access::Read);
pub static PRESSURE_RW: Binding = storage("pressure", "array<f32>", Access::ReadWrite);

pub static PAIRS_IN: Binding = storage("pairs_in", "array<vec2<i32>>", Access::Read);
pub static PAIRS_OUT: Binding = storage("pairs_out", "array<vec2<i32>>", Access::ReadWrite);
pub static SORTED_PAIRS: Binding = storage("sorted_pairs", "array<vec2<i32>>", Access::Read);
pub static CELL_TABLE: Binding = storage("cell_table", "array<vec2<u32>>", Access::Read);
pub static CELL_SLOTS: Binding = Binding {
    name: "cell_slots",
    kind: BindingKind::Storage {
        ty: "array<CellSlot>",
        access: Access::ReadWrite,
    },
    deps: &[Dependency::Definition(&CELL_SLOT_STRUCT)],
};

pub static MAX_SPEED: Binding = storage("max_speed", "atomic<u32>", Access::ReadWrite);
pub static PEAK_SPEED: Binding = storage("peak_speed", "u32", Access::Read);
pub static SCHEDULE: Binding = storage("schedule", "array<f32>", Access::Read);
pub static SCHEDULE_RW: Binding = storage("schedule", "array<f32>", Access::ReadWrite);

// ---- Shared functions ----

pub static TEXEL: Definition = Definition {
    name: "texel_index",
    source: include_str!("shaders/defs/texel.wgsl"),
    deps: &[],
};

pub static PHASES: Definition = Definition {
    name: "phases",
    source: "const PHASE_FLUID: i32 = 0i;\nconst PHASE_BOUNDARY: i32 = 1i;",
    deps: &[],
};

pub static KERNEL: Definition = Definition {
    name: "kernel",
    source: include_str!("shaders/defs/kernel.wgsl"),
    deps: &[Dependency::Binding(&PARAMS)],
};

pub static CELL: Definition = Definition {
    name: "cell",
    source: include_str!("shaders/defs/cell.wgsl"),
    deps: &[Dependency::Binding(&PARAMS)],
};

pub static NEIGHBOR: Definition = Definition {
    name: "neighbor",
    source: include_str!("shaders/defs/neighbor.wgsl"),
    deps: &[
        Dependency::Definition(&CELL),
        Dependency::Binding(&CELL_TABLE),
        Dependency::Binding(&SORTED_PAIRS),
    ],
};

pub static EOS: Definition = Definition {
    name: "eos",
    source: include_str!("shaders/defs/eos.wgsl"),
    deps: &[Dependency::Binding(&PARAMS)],
};

pub static POINTER: Definition = Definition {
    name: "pointer",
    source: include_str!("shaders/defs/pointer.wgsl"),
    deps: &[Dependency::Binding(&PARAMS)],
};

pub static SUBSTEP_DT: Definition = Definition {
    name: "substep_dt",
    source: "fn substep_dt() -> f32 {\n    return schedule[substep.slot];\n}",
    deps: &[Dependency::Binding(&SCHEDULE), Dependency::Binding(&SUBSTEP)],
};

// ---- Programs ----

pub static KEY_PAIRS: ProgramSource = ProgramSource {
    label: "key_pairs",
    source: include_str!("shaders/key_pairs.wgsl"),
    deps: &[
        Dependency::Definition(&TEXEL),
        Dependency::Definition(&CELL),
        Dependency::Binding(&POSITION),
        Dependency::Binding(&PAIRS_OUT),
    ],
};

pub static SORT_MERGE: ProgramSource = ProgramSource {
    label: "sort_merge",
    source: include_str!("shaders/sort_merge.wgsl"),
    deps: &[
        Dependency::Definition(&TEXEL),
        Dependency::Binding(&PARAMS),
        Dependency::Binding(&SORT_PASS),
        Dependency::Binding(&PAIRS_IN),
        Dependency::Binding(&PAIRS_OUT),
    ],
};

pub static BUCKET_CLEAR: ProgramSource = ProgramSource {
    label: "bucket_clear",
    source: include_str!("shaders/bucket_clear.wgsl"),
    deps: &[
        Dependency::Definition(&TEXEL),
        Dependency::Binding(&PARAMS),
        Dependency::Binding(&CELL_SLOTS),
    ],
};

pub static BUCKET_SCATTER: ProgramSource = ProgramSource {
    label: "bucket_scatter",
    source: include_str!("shaders/bucket_scatter.wgsl"),
    deps: &[
        Dependency::Definition(&TEXEL),
        Dependency::Binding(&PARAMS),
        Dependency::Binding(&SORTED_PAIRS),
        Dependency::Binding(&CELL_SLOTS),
    ],
};

pub static PEAK_SPEED_PASS: ProgramSource = ProgramSource {
    label: "peak_speed",
    source: include_str!("shaders/peak_speed.wgsl"),
    deps: &[
        Dependency::Definition(&TEXEL),
        Dependency::Binding(&PARAMS),
        Dependency::Binding(&VELOCITY),
        Dependency::Binding(&MAX_SPEED),
    ],
};

pub static PLAN_SUBSTEPS: ProgramSource = ProgramSource {
    label: "plan_substeps",
    source: include_str!("shaders/plan_substeps.wgsl"),
    deps: &[
        Dependency::Binding(&PARAMS),
        Dependency::Binding(&PEAK_SPEED),
        Dependency::Binding(&SCHEDULE_RW),
    ],
};

pub static DENSITY_PASS: ProgramSource = ProgramSource {
    label: "density",
    source: include_str!("shaders/density.wgsl"),
    deps: &[
        Dependency::Definition(&TEXEL),
        Dependency::Definition(&SUBSTEP_DT),
        Dependency::Definition(&KERNEL),
        Dependency::Definition(&NEIGHBOR),
        Dependency::Binding(&POSITION),
        Dependency::Binding(&MASS),
        Dependency::Binding(&DENSITY_RW),
    ],
};

pub static VELOCITY_GUESS_PASS: ProgramSource = ProgramSource {
    label: "velocity_guess",
    source: include_str!("shaders/velocity_guess.wgsl"),
    deps: &[
        Dependency::Definition(&TEXEL),
        Dependency::Definition(&SUBSTEP_DT),
        Dependency::Definition(&PHASES),
        Dependency::Definition(&KERNEL),
        Dependency::Definition(&NEIGHBOR),
        Dependency::Definition(&POINTER),
        Dependency::Binding(&PHASE),
        Dependency::Binding(&POSITION),
        Dependency::Binding(&VELOCITY),
        Dependency::Binding(&MASS),
        Dependency::Binding(&DENSITY),
        Dependency::Binding(&VELOCITY_GUESS_RW),
    ],
};

pub static PRESSURE_PASS: ProgramSource = ProgramSource {
    label: "pressure",
    source: include_str!("shaders/pressure.wgsl"),
    deps: &[
        Dependency::Definition(&TEXEL),
        Dependency::Definition(&SUBSTEP_DT),
        Dependency::Definition(&PHASES),
        Dependency::Definition(&KERNEL),
        Dependency::Definition(&NEIGHBOR),
        Dependency::Definition(&EOS),
        Dependency::Binding(&PHASE),
        Dependency::Binding(&POSITION),
        Dependency::Binding(&DENSITY),
        Dependency::Binding(&PRESSURE_RW),
    ],
};

pub static PRESSURE_FORCE_PASS: ProgramSource = ProgramSource {
    label: "pressure_force",
    source: include_str!("shaders/pressure_force.wgsl"),
    deps: &[
        Dependency::Definition(&TEXEL),
        Dependency::Definition(&SUBSTEP_DT),
        Dependency::Definition(&PHASES),
        Dependency::Definition(&KERNEL),
        Dependency::Definition(&NEIGHBOR),
        Dependency::Definition(&EOS),
        Dependency::Binding(&PHASE),
        Dependency::Binding(&POSITION),
        Dependency::Binding(&MASS),
        Dependency::Binding(&DENSITY),
        Dependency::Binding(&PRESSURE),
        Dependency::Binding(&F_PRESSURE_RW),
    ],
};

pub static VELOCITY_PASS: ProgramSource = ProgramSource {
    label: "velocity",
    source: include_str!("shaders/velocity.wgsl"),
    deps: &[
        Dependency::Definition(&TEXEL),
        Dependency::Definition(&SUBSTEP_DT),
        Dependency::Definition(&PHASES),
        Dependency::Definition(&NEIGHBOR),
        Dependency::Binding(&PHASE),
        Dependency::Binding(&POSITION),
        Dependency::Binding(&VELOCITY_GUESS),
        Dependency::Binding(&F_PRESSURE),
        Dependency::Binding(&MASS),
        Dependency::Binding(&VELOCITY_RW),
    ],
};

pub static ADVECT_PASS: ProgramSource = ProgramSource {
    label: "advect",
    source: include_str!("shaders/advect.wgsl"),
    deps: &[
        Dependency::Definition(&TEXEL),
        Dependency::Definition(&SUBSTEP_DT),
        Dependency::Definition(&PHASES),
        Dependency::Binding(&PARAMS),
        Dependency::Binding(&PHASE),
        Dependency::Binding(&POSITION),
        Dependency::Binding(&VELOCITY),
        Dependency::Binding(&POSITION_OUT),
    ],
};

/// Every program, in dispatch order within one macro-step.
pub static ALL: [&ProgramSource; 12] = [
    &KEY_PAIRS,
    &SORT_MERGE,
    &BUCKET_CLEAR,
    &BUCKET_SCATTER,
    &PEAK_SPEED_PASS,
    &PLAN_SUBSTEPS,
    &DENSITY_PASS,
    &VELOCITY_GUESS_PASS,
    &PRESSURE_PASS,
    &PRESSURE_FORCE_PASS,
    &VELOCITY_PASS,
    &ADVECT_PASS,
];

/// Storage bindings the widest program needs.
pub const REQUIRED_STORAGE_BUFFERS: u32 = 9;
