use kiln_device::Buffer;
use kiln_solver::{InvokeParams, NetworkConfig, Problem, TensorDesc};

use crate::common::TensorArg;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display)]
pub enum Reduction {
    #[default]
    #[strum(to_string = "none")]
    None,
    #[strum(to_string = "sum")]
    Sum,
    #[strum(to_string = "mean")]
    Mean,
}

impl Reduction {
    /// Value of the `REDUCTION_TYPE` build parameter.
    pub fn code(&self) -> i64 {
        match self {
            Self::None => 0,
            Self::Sum => 1,
            Self::Mean => 2,
        }
    }

    /// Per-element divisor: the element count for mean, 1 otherwise.
    pub fn divisor(&self, numel: usize) -> f32 {
        match self {
            Self::Mean => numel as f32,
            Self::None | Self::Sum => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmoothL1ForwardProblem {
    input: TensorDesc,
    target: TensorDesc,
    output: TensorDesc,
    reduction: Reduction,
}

impl SmoothL1ForwardProblem {
    pub fn new(input: TensorDesc, target: TensorDesc, output: TensorDesc, reduction: Reduction) -> Self {
        Self { input, target, output, reduction }
    }

    pub fn input(&self) -> &TensorDesc {
        &self.input
    }

    pub fn target(&self) -> &TensorDesc {
        &self.target
    }

    pub fn output(&self) -> &TensorDesc {
        &self.output
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    pub fn is_same_type(&self) -> bool {
        let same = self.input.dtype() == self.target.dtype();
        match self.reduction {
            Reduction::None => same && self.input.dtype() == self.output.dtype(),
            Reduction::Sum | Reduction::Mean => same,
        }
    }

    /// Input and target agree; the output matches them, or is a single element
    /// when reduced.
    pub fn is_right_length(&self) -> bool {
        if !self.input.same_lengths(&self.target) {
            return false;
        }
        match self.reduction {
            Reduction::None => self.input.same_lengths(&self.output),
            Reduction::Sum | Reduction::Mean => self.output.numel() == 1,
        }
    }

    pub fn is_all_contiguous(&self) -> bool {
        self.input.is_contiguous() && self.target.is_contiguous() && self.output.is_contiguous()
    }
}

impl Problem for SmoothL1ForwardProblem {
    fn network_config(&self) -> NetworkConfig {
        let (input_dtype, output_dtype, size) = (self.input.dtype(), self.output.dtype(), self.input.numel());
        NetworkConfig::new(match self.reduction {
            Reduction::None => format!(
                "smoothl1loss_unreduced_fwdcontiguous{}input_dtype{input_dtype}output_dtype{output_dtype}size{size}",
                self.is_all_contiguous()
            ),
            reduction => format!(
                "smoothl1loss_reduced_fwdreduction{reduction}input_dtype{input_dtype}output_dtype{output_dtype}size{size}"
            ),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SmoothL1ForwardParams {
    pub input: TensorArg,
    pub target: TensorArg,
    pub output: TensorArg,
    pub beta: f32,
    /// Needed by reduced forms only.
    pub workspace: Option<Buffer>,
}

impl InvokeParams for SmoothL1ForwardParams {
    fn workspace(&self) -> Option<&Buffer> {
        self.workspace.as_ref()
    }
}

/// Gradients of the loss with respect to input and target.
///
/// Either gradient may be omitted. When the forward pass was reduced, the
/// output gradient is a single element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmoothL1BackwardProblem {
    input: TensorDesc,
    target: TensorDesc,
    output_grad: TensorDesc,
    input_grad: Option<TensorDesc>,
    target_grad: Option<TensorDesc>,
    reduction: Reduction,
}

impl SmoothL1BackwardProblem {
    pub fn new(
        input: TensorDesc,
        target: TensorDesc,
        output_grad: TensorDesc,
        input_grad: Option<TensorDesc>,
        target_grad: Option<TensorDesc>,
        reduction: Reduction,
    ) -> Self {
        Self { input, target, output_grad, input_grad, target_grad, reduction }
    }

    pub fn input(&self) -> &TensorDesc {
        &self.input
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    fn grads(&self) -> impl Iterator<Item = &TensorDesc> {
        self.input_grad.iter().chain(&self.target_grad)
    }

    pub fn is_same_type(&self) -> bool {
        self.input.dtype() == self.target.dtype()
            && self.output_grad.dtype() == self.input.dtype()
            && self.grads().all(|grad| grad.dtype() == self.input.dtype())
    }

    pub fn is_right_length(&self) -> bool {
        if !self.input.same_lengths(&self.target) || !self.grads().all(|grad| grad.same_lengths(&self.input)) {
            return false;
        }
        match self.reduction {
            Reduction::None => self.output_grad.same_lengths(&self.input),
            Reduction::Sum | Reduction::Mean => self.output_grad.numel() == 1,
        }
    }

    pub fn max_rank(&self) -> usize {
        [&self.input, &self.target, &self.output_grad].into_iter().chain(self.grads()).map(TensorDesc::rank).max().unwrap_or(0)
    }
}

impl Problem for SmoothL1BackwardProblem {
    fn network_config(&self) -> NetworkConfig {
        NetworkConfig::new(format!(
            "smoothl1loss_bwdreduction{}dtype{}size{}input_grad{}target_grad{}",
            self.reduction,
            self.input.dtype(),
            self.input.numel(),
            self.input_grad.is_some(),
            self.target_grad.is_some()
        ))
    }
}

#[derive(Debug, Clone)]
pub struct SmoothL1BackwardParams {
    pub input: TensorArg,
    pub target: TensorArg,
    pub output_grad: TensorArg,
    pub input_grad: Option<TensorArg>,
    pub target_grad: Option<TensorArg>,
    pub beta: f32,
}

impl InvokeParams for SmoothL1BackwardParams {}
