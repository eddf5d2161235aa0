//! Element type tags for kiln.
//!
//! A [`DType`] tags the elements of a device buffer or a tensor descriptor.
//! Solvers switch on it to pick build parameters, buffers use it to encode
//! and decode elements, and kernels use it to size scratch memory.

pub mod ext;


pub use ext::HasDType;

/// Element data types understood by the solver layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::Display)]
pub enum DType {
    #[strum(to_string = "bool")]
    Bool,
    #[strum(to_string = "int8")]
    Int8,
    #[strum(to_string = "int32")]
    Int32,
    #[strum(to_string = "int64")]
    Int64,
    #[strum(to_string = "half")]
    Float16,
    #[strum(to_string = "bfloat16")]
    BFloat16,
    #[strum(to_string = "float")]
    Float32,
    #[strum(to_string = "double")]
    Float64,
}

impl DType {
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Bool | Self::Int8 => 1,
            Self::Float16 | Self::BFloat16 => 2,
            Self::Int32 | Self::Float32 => 4,
            Self::Int64 | Self::Float64 => 8,
        }
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::BFloat16 | Self::Float32 | Self::Float64)
    }

    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int32 | Self::Int64)
    }

    /// Type name used inside kernel sources.
    ///
    /// bfloat16 has no native device type and is carried as raw `ushort` bits.
    pub const fn kernel_type(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "char",
            Self::Int32 => "int",
            Self::Int64 => "long",
            Self::Float16 => "half",
            Self::BFloat16 => "ushort",
            Self::Float32 => "float",
            Self::Float64 => "double",
        }
    }

    /// Decode one element from its little-endian byte representation.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than [`DType::bytes`].
    pub fn decode(&self, bytes: &[u8]) -> f64 {
        let b = &bytes[..self.bytes()];
        match self {
            Self::Bool => (b[0] != 0) as u8 as f64,
            Self::Int8 => b[0] as i8 as f64,
            Self::Int32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            Self::Int64 => i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64,
            Self::Float16 => half::f16::from_le_bytes([b[0], b[1]]).to_f64(),
            Self::BFloat16 => half::bf16::from_le_bytes([b[0], b[1]]).to_f64(),
            Self::Float32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            Self::Float64 => f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
        }
    }

    /// Encode one element into `out`, rounding to the target precision.
    ///
    /// # Panics
    ///
    /// Panics if `out` is shorter than [`DType::bytes`].
    pub fn encode(&self, value: f64, out: &mut [u8]) {
        let out = &mut out[..self.bytes()];
        match self {
            Self::Bool => out[0] = (value != 0.0) as u8,
            Self::Int8 => out[0] = value as i8 as u8,
            Self::Int32 => out.copy_from_slice(&(value as i32).to_le_bytes()),
            Self::Int64 => out.copy_from_slice(&(value as i64).to_le_bytes()),
            Self::Float16 => out.copy_from_slice(&half::f16::from_f64(value).to_le_bytes()),
            Self::BFloat16 => out.copy_from_slice(&half::bf16::from_f64(value).to_le_bytes()),
            Self::Float32 => out.copy_from_slice(&(value as f32).to_le_bytes()),
            Self::Float64 => out.copy_from_slice(&value.to_le_bytes()),
        }
    }
}
