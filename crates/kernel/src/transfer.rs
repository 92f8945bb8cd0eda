//! Host <-> device copy contract for particle fields.
//!
//! Each field has a fixed channel layout. The device stores every scalar in a
//! 4-byte word, so the signed-byte phase is widened to `i32` on upload and
//! narrowed back on readback; all other fields are copied bit for bit.

use bytemuck::Pod;
use thiserror::Error;

use crate::neighbor::{CellRange, KeyIndexPair};
use crate::particle::{ParticleArrays, Phase};

/// Scalar type of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// 32-bit float.
    F32,
    /// Signed byte on the host, widened to `i32` on the device.
    I8,
    /// 32-bit signed integer.
    I32,
    /// 32-bit unsigned integer.
    U32,
}

impl ScalarKind {
    /// Scalar type used in device memory.
    pub fn on_device(self) -> ScalarKind {
        match self {
            ScalarKind::I8 => ScalarKind::I32,
            other => other,
        }
    }

    /// WGSL spelling of the device scalar.
    pub fn wgsl(self) -> &'static str {
        match self.on_device() {
            ScalarKind::F32 => "f32",
            ScalarKind::U32 => "u32",
            ScalarKind::I8 | ScalarKind::I32 => "i32",
        }
    }
}

/// Channel layout of one transferable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    /// Field name, also the binding name of its device buffer.
    pub name: &'static str,
    /// Channels per element (1 or 2).
    pub channels: u32,
    /// Scalar type of each channel.
    pub scalar: ScalarKind,
}

impl FieldLayout {
    /// Bytes per element in device memory.
    pub fn device_stride(&self) -> usize {
        self.channels as usize * 4
    }
}

/// Layout of the sorted `(key, index)` array.
pub const KEY_INDEX: FieldLayout = FieldLayout {
    name: "key_index",
    channels: 2,
    scalar: ScalarKind::I32,
};

/// Layout of the per-cell `(start, count)` table.
pub const CELL_RANGE: FieldLayout = FieldLayout {
    name: "cell_range",
    channels: 2,
    scalar: ScalarKind::U32,
};

/// Per-particle fields that cross the host/device boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum StateField {
    Phase,
    Position,
    Velocity,
    VelocityGuess,
    FPressure,
    Mass,
    Density,
    Pressure,
}

impl StateField {
    /// Every field, in upload order.
    pub const ALL: [StateField; 8] = [
        StateField::Phase,
        StateField::Position,
        StateField::Velocity,
        StateField::VelocityGuess,
        StateField::FPressure,
        StateField::Mass,
        StateField::Density,
        StateField::Pressure,
    ];

    /// Channel layout of this field.
    pub fn layout(self) -> FieldLayout {
        let (name, channels, scalar) = match self {
            StateField::Phase => ("phase", 1, ScalarKind::I8),
            StateField::Position => ("position", 2, ScalarKind::F32),
            StateField::Velocity => ("velocity", 2, ScalarKind::F32),
            StateField::VelocityGuess => ("velocity_guess", 2, ScalarKind::F32),
            StateField::FPressure => ("f_pressure", 2, ScalarKind::F32),
            StateField::Mass => ("mass", 1, ScalarKind::F32),
            StateField::Density => ("density", 1, ScalarKind::F32),
            StateField::Pressure => ("pressure", 1, ScalarKind::F32),
        };
        FieldLayout {
            name,
            channels,
            scalar,
        }
    }
}

/// Errors raised while decoding device bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    /// Byte count does not match the expected element count.
    #[error("field `{field}` expects {expected} bytes, got {got}")]
    LengthMismatch {
        /// Field name.
        field: &'static str,
        /// Bytes expected.
        expected: usize,
        /// Bytes supplied.
        got: usize,
    },
    /// A phase word holds no known phase code.
    #[error("particle {index} has unknown phase code {code}")]
    UnknownPhase {
        /// Particle index.
        index: usize,
        /// Raw device value.
        code: i32,
    },
}

/// Device bytes of one field.
pub fn encode_field(particles: &ParticleArrays, field: StateField) -> Vec<u8> {
    match field {
        StateField::Phase => {
            let words: Vec<i32> = particles.phase.iter().map(|p| p.code() as i32).collect();
            bytemuck::cast_slice(&words).to_vec()
        }
        StateField::Position => bytemuck::cast_slice(&particles.position).to_vec(),
        StateField::Velocity => bytemuck::cast_slice(&particles.velocity).to_vec(),
        StateField::VelocityGuess => bytemuck::cast_slice(&particles.velocity_guess).to_vec(),
        StateField::FPressure => bytemuck::cast_slice(&particles.f_pressure).to_vec(),
        StateField::Mass => bytemuck::cast_slice(&particles.mass).to_vec(),
        StateField::Density => bytemuck::cast_slice(&particles.density).to_vec(),
        StateField::Pressure => bytemuck::cast_slice(&particles.pressure).to_vec(),
    }
}

/// Overwrite one field of `particles` from device bytes. The byte count must
/// match `particles.len()` elements exactly.
pub fn decode_field(
    particles: &mut ParticleArrays,
    field: StateField,
    bytes: &[u8],
) -> Result<(), TransferError> {
    let n = particles.len();
    let name = field.layout().name;
    match field {
        StateField::Phase => {
            let words: Vec<i32> = read_pod(bytes, name, n)?;
            particles.phase = words
                .into_iter()
                .enumerate()
                .map(|(index, code)| {
                    i8::try_from(code)
                        .ok()
                        .and_then(Phase::from_code)
                        .ok_or(TransferError::UnknownPhase { index, code })
                })
                .collect::<Result<_, _>>()?;
        }
        StateField::Position => particles.position = read_pod(bytes, name, n)?,
        StateField::Velocity => particles.velocity = read_pod(bytes, name, n)?,
        StateField::VelocityGuess => particles.velocity_guess = read_pod(bytes, name, n)?,
        StateField::FPressure => particles.f_pressure = read_pod(bytes, name, n)?,
        StateField::Mass => particles.mass = read_pod(bytes, name, n)?,
        StateField::Density => particles.density = read_pod(bytes, name, n)?,
        StateField::Pressure => particles.pressure = read_pod(bytes, name, n)?,
    }
    Ok(())
}

/// Decode `count` sorted pairs.
pub fn decode_pairs(bytes: &[u8], count: usize) -> Result<Vec<KeyIndexPair>, TransferError> {
    read_pod(bytes, KEY_INDEX.name, count)
}

/// Decode `count` cell ranges.
pub fn decode_ranges(bytes: &[u8], count: usize) -> Result<Vec<CellRange>, TransferError> {
    read_pod(bytes, CELL_RANGE.name, count)
}

/// Read `count` values of `T` from possibly unaligned bytes.
fn read_pod<T: Pod>(bytes: &[u8], field: &'static str, count: usize) -> Result<Vec<T>, TransferError> {
    let size = std::mem::size_of::<T>();
    let expected = count * size;
    if bytes.len() != expected {
        return Err(TransferError::LengthMismatch {
            field,
            expected,
            got: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(size)
        .map(bytemuck::pod_read_unaligned)
        .collect())
}
