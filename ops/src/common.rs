//! Build-parameter conventions shared by the operator solvers and the CPU
//! kernel bodies that read them back.

use kiln_device::error::LaunchSnafu;
use kiln_device::{Buffer, BuildParams, BuildValue, KernelInfo};
use kiln_dtype::DType;
use kiln_solver::TensorDesc;
use snafu::OptionExt;
use strum::IntoEnumIterator;

const TYPE_SWITCHES: [(&str, DType); 4] = [
    ("KILN_USE_FP16", DType::Float16),
    ("KILN_USE_FP32", DType::Float32),
    ("KILN_USE_FP64", DType::Float64),
    ("KILN_USE_BFP16", DType::BFloat16),
];

/// Highest rank the strided kernels index.
pub const VIEW_DIMS: usize = 5;

/// Dtypes of the reduced loss kernels.
pub(crate) fn is_loss_dtype(dtype: DType) -> bool {
    matches!(dtype, DType::Float32 | DType::Float16 | DType::BFloat16)
}

/// One `KILN_USE_*` switch per floating-point element type, exactly one set.
///
/// # Panics
///
/// Panics if `dtype` is not a floating-point type.
pub fn float_type_params(dtype: DType) -> BuildParams {
    assert!(dtype.is_float(), "no float kernel variant for {dtype}");
    TYPE_SWITCHES.iter().fold(BuildParams::new(), |params, (name, switch)| params.with(*name, *switch == dtype))
}

/// Element type selected by the `KILN_USE_*` switches of a build.
pub fn float_type(info: &KernelInfo) -> kiln_device::Result<DType> {
    TYPE_SWITCHES
        .iter()
        .find(|(name, _)| info.build_params.int(name) == Some(1))
        .map(|(_, dtype)| *dtype)
        .context(LaunchSnafu { kernel: &info.kernel_name, reason: "no element type switch is set" })
}

/// Element type named by a string parameter such as `INPUT_TYPE`.
pub fn named_type(info: &KernelInfo, name: &str) -> kiln_device::Result<DType> {
    match info.build_params.get(name) {
        Some(BuildValue::Str(kernel_type)) => DType::iter()
            .find(|dtype| dtype.kernel_type() == kernel_type.as_str())
            .context(LaunchSnafu { kernel: &info.kernel_name, reason: format!("unknown {name} {kernel_type}") }),
        _ => LaunchSnafu { kernel: &info.kernel_name, reason: format!("missing {name}") }.fail(),
    }
}

/// Integer build parameter.
pub fn int_param(info: &KernelInfo, name: &str) -> kiln_device::Result<i64> {
    info.build_params.int(name).context(LaunchSnafu { kernel: &info.kernel_name, reason: format!("missing {name}") })
}

/// A device buffer with the descriptor of the tensor it holds.
#[derive(Debug, Clone)]
pub struct TensorArg {
    pub desc: TensorDesc,
    pub buffer: Buffer,
}

impl TensorArg {
    pub fn new(desc: TensorDesc, buffer: Buffer) -> Self {
        Self { desc, buffer }
    }
}
