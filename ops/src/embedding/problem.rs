use kiln_device::Buffer;
use kiln_dtype::DType;
use kiln_solver::{InvokeParams, NetworkConfig, Problem, TensorDesc};

use crate::common::TensorArg;

/// Gradient of an embedding lookup with respect to its weight table.
///
/// `input` holds int64 indices of any shape; `output_grad` has the input's
/// lengths followed by the embedding dimension; `weight_grad` is
/// `[num_embeddings, embedding_dim]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingBackwardProblem {
    input: TensorDesc,
    output_grad: TensorDesc,
    weight_grad: TensorDesc,
    deterministic: bool,
}

impl EmbeddingBackwardProblem {
    pub fn new(input: TensorDesc, output_grad: TensorDesc, weight_grad: TensorDesc, deterministic: bool) -> Self {
        Self { input, output_grad, weight_grad, deterministic }
    }

    pub fn input(&self) -> &TensorDesc {
        &self.input
    }

    pub fn output_grad(&self) -> &TensorDesc {
        &self.output_grad
    }

    pub fn weight_grad(&self) -> &TensorDesc {
        &self.weight_grad
    }

    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    pub fn num_embeddings(&self) -> usize {
        self.weight_grad.lengths().first().copied().unwrap_or(0)
    }

    pub fn embedding_dim(&self) -> usize {
        self.weight_grad.lengths().last().copied().unwrap_or(0)
    }

    pub fn is_right_type(&self) -> bool {
        self.input.dtype() == DType::Int64
            && matches!(self.output_grad.dtype(), DType::Float16 | DType::Float32 | DType::BFloat16)
            && self.weight_grad.dtype() == self.output_grad.dtype()
    }

    pub fn is_right_length(&self) -> bool {
        let (input, output_grad) = (self.input.lengths(), self.output_grad.lengths());
        self.weight_grad.rank() == 2
            && output_grad.len() == input.len() + 1
            && output_grad[..input.len()] == *input
            && output_grad.last() == self.weight_grad.lengths().last()
    }

    pub fn is_all_contiguous(&self) -> bool {
        self.input.is_contiguous() && self.output_grad.is_contiguous() && self.weight_grad.is_contiguous()
    }
}

impl Problem for EmbeddingBackwardProblem {
    fn network_config(&self) -> NetworkConfig {
        NetworkConfig::new(format!(
            "embedding_bwddtype{}input_size{}num_embeddings{}embedding_dim{}deterministic{}",
            self.output_grad.dtype(),
            self.input.numel(),
            self.num_embeddings(),
            self.embedding_dim(),
            self.deterministic
        ))
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingBackwardParams {
    pub input: TensorArg,
    pub output_grad: TensorArg,
    /// Overwritten: zero-filled, then accumulated into.
    pub weight_grad: TensorArg,
    /// Rows whose index equals this receive no gradient.
    pub padding_idx: Option<i64>,
    /// Int32 occurrence count per embedding row. When present, each
    /// contribution is divided by the count of its row.
    pub indices_freq: Option<Buffer>,
    /// Single int32 set to 1 when an index falls outside the table.
    pub error: Option<Buffer>,
}

impl InvokeParams for EmbeddingBackwardParams {}
