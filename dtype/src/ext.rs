use super::*;

/// Host element types with a fixed device [`DType`].
pub trait HasDType: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_dtype_ext {
    ($($ty:ty => $dtype:expr),* $(,)?) => {
        $(impl HasDType for $ty {
            const DTYPE: DType = $dtype;

            fn to_f64(self) -> f64 { self as f64 }
            fn from_f64(value: f64) -> Self { value as $ty }
        })*
    };
}

impl_dtype_ext! {
    i8 => DType::Int8, i32 => DType::Int32, i64 => DType::Int64,
    f32 => DType::Float32, f64 => DType::Float64,
}

impl HasDType for bool {
    const DTYPE: DType = DType::Bool;

    fn to_f64(self) -> f64 {
        self as u8 as f64
    }

    fn from_f64(value: f64) -> Self {
        value != 0.0
    }
}

impl HasDType for half::f16 {
    const DTYPE: DType = DType::Float16;

    fn to_f64(self) -> f64 {
        half::f16::to_f64(self)
    }

    fn from_f64(value: f64) -> Self {
        half::f16::from_f64(value)
    }
}

impl HasDType for half::bf16 {
    const DTYPE: DType = DType::BFloat16;

    fn to_f64(self) -> f64 {
        half::bf16::to_f64(self)
    }

    fn from_f64(value: f64) -> Self {
        half::bf16::from_f64(value)
    }
}
