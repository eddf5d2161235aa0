use kiln_dtype::DType;
use kiln_solver::{InvokeParams, NetworkConfig, Problem, TensorDesc};

use crate::common::TensorArg;

/// Backward of a reduced NLL loss.
///
/// `input_grad` is `[N, C, d1, ..]`, `target` holds int64 class indices of
/// shape `[N, d1, ..]`, `weight` is `[C]` and `output_grad` is the single
/// gradient of the reduced loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NLLLossReduceBackwardProblem {
    input_grad: TensorDesc,
    target: TensorDesc,
    weight: TensorDesc,
    output_grad: TensorDesc,
}

impl NLLLossReduceBackwardProblem {
    pub fn new(input_grad: TensorDesc, target: TensorDesc, weight: TensorDesc, output_grad: TensorDesc) -> Self {
        Self { input_grad, target, weight, output_grad }
    }

    pub fn input_grad(&self) -> &TensorDesc {
        &self.input_grad
    }

    pub fn target(&self) -> &TensorDesc {
        &self.target
    }

    pub fn num_classes(&self) -> usize {
        self.input_grad.lengths().get(1).copied().unwrap_or(0)
    }

    pub fn is_right_type(&self) -> bool {
        let dtype = self.input_grad.dtype();
        self.target.dtype() == DType::Int64 && self.weight.dtype() == dtype && self.output_grad.dtype() == dtype
    }

    /// Target drops the class dimension of the input; weight has one entry
    /// per class.
    pub fn is_right_length(&self) -> bool {
        let (input, target) = (self.input_grad.lengths(), self.target.lengths());
        input.len() >= 2
            && target.len() == input.len() - 1
            && target[0] == input[0]
            && target[1..] == input[2..]
            && self.weight.lengths() == [input[1]]
            && self.output_grad.numel() == 1
    }

    pub fn max_rank(&self) -> usize {
        [&self.input_grad, &self.target, &self.weight, &self.output_grad]
            .into_iter()
            .map(TensorDesc::rank)
            .max()
            .unwrap_or(0)
    }
}

impl Problem for NLLLossReduceBackwardProblem {
    fn network_config(&self) -> NetworkConfig {
        NetworkConfig::new(format!(
            "nllloss_reduce_bwddtype{}num_classes{}size{}",
            self.input_grad.dtype(),
            self.num_classes(),
            self.target.numel()
        ))
    }
}

#[derive(Debug, Clone, bon::Builder)]
pub struct NLLLossBackwardParams {
    /// Overwritten in full.
    pub input_grad: TensorArg,
    pub target: TensorArg,
    pub weight: TensorArg,
    pub output_grad: TensorArg,
    /// Targets equal to this contribute a zero row.
    #[builder(default = -100)]
    pub ignore_index: i64,
    /// The element count, or the summed weights of counted targets, for a
    /// mean loss.
    #[builder(default = 1.0)]
    pub divisor: f32,
}

impl InvokeParams for NLLLossBackwardParams {}
