use bon::bon;
use kiln_device::Buffer;
use kiln_solver::{InvokeParams, NetworkConfig, Problem, TensorDesc};

use crate::common::TensorArg;

/// One Adam step over a packed parameter tensor and its optimizer state.
///
/// With `amp` set the gradient may have a lower precision than the
/// parameter, is unscaled by a device-side grad scale, and the step is
/// skipped entirely when the device-side found-inf flag is raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdamProblem {
    param: TensorDesc,
    grad: TensorDesc,
    exp_avg: TensorDesc,
    exp_avg_sq: TensorDesc,
    max_exp_avg_sq: Option<TensorDesc>,
    amp: bool,
    step_out: bool,
}

#[bon]
impl AdamProblem {
    #[builder]
    pub fn new(
        param: TensorDesc,
        grad: TensorDesc,
        exp_avg: TensorDesc,
        exp_avg_sq: TensorDesc,
        max_exp_avg_sq: Option<TensorDesc>,
        #[builder(default = false)] amp: bool,
        /// The caller passes a step tensor that the plan advances.
        #[builder(default = false)]
        step_out: bool,
    ) -> Self {
        Self { param, grad, exp_avg, exp_avg_sq, max_exp_avg_sq, amp, step_out }
    }
}

impl AdamProblem {
    pub fn param(&self) -> &TensorDesc {
        &self.param
    }

    pub fn grad(&self) -> &TensorDesc {
        &self.grad
    }

    pub fn is_amp(&self) -> bool {
        self.amp
    }

    pub fn exist_step_out(&self) -> bool {
        self.step_out
    }

    fn state(&self) -> impl Iterator<Item = &TensorDesc> {
        [&self.exp_avg, &self.exp_avg_sq].into_iter().chain(&self.max_exp_avg_sq)
    }

    pub fn is_all_packed(&self) -> bool {
        self.param.is_packed() && self.grad.is_packed() && self.state().all(TensorDesc::is_packed)
    }

    pub fn is_right_length(&self) -> bool {
        self.grad.same_lengths(&self.param) && self.state().all(|desc| desc.same_lengths(&self.param))
    }

    /// Optimizer state shares the parameter type; only AMP lets the gradient differ.
    pub fn is_right_type(&self) -> bool {
        let dtype = self.param.dtype();
        let grad_ok = if self.amp { self.grad.dtype().is_float() } else { self.grad.dtype() == dtype };
        dtype.is_float() && grad_ok && self.state().all(|desc| desc.dtype() == dtype)
    }
}

impl Problem for AdamProblem {
    fn network_config(&self) -> NetworkConfig {
        NetworkConfig::new(format!(
            "adam_packedparam{}grad{}amp{}max_exp_avg_sq{}step_out{}",
            self.param.dtype(),
            self.grad.dtype(),
            self.amp,
            self.max_exp_avg_sq.is_some(),
            self.step_out
        ))
    }
}

/// Runtime buffers and hyper-parameters of one Adam step.
///
/// Output buffers default to their inputs, updating the state in place.
#[derive(Debug, Clone, bon::Builder)]
pub struct AdamParams {
    pub param: TensorArg,
    pub grad: Buffer,
    pub exp_avg: Buffer,
    pub exp_avg_sq: Buffer,
    /// Required when `amsgrad` is set.
    pub max_exp_avg_sq: Option<Buffer>,

    pub param_out: Option<Buffer>,
    pub exp_avg_out: Option<Buffer>,
    pub exp_avg_sq_out: Option<Buffer>,
    pub max_exp_avg_sq_out: Option<Buffer>,

    /// Single f32 the AMP kernel divides the gradient by.
    pub grad_scale: Option<Buffer>,
    /// Single bool; a raised flag skips the AMP step.
    pub found_inf: Option<Buffer>,
    /// Single int32 step counter read by the AMP kernel.
    pub step_in: Option<Buffer>,
    /// Single int32 step counter advanced after an AMP step.
    pub step_out: Option<Buffer>,

    /// Step number of the plain kernel, starting at 1.
    #[builder(default = 1)]
    pub step: i64,
    #[builder(default = 1e-3)]
    pub lr: f64,
    #[builder(default = 0.9)]
    pub beta1: f64,
    #[builder(default = 0.999)]
    pub beta2: f64,
    #[builder(default = 0.0)]
    pub weight_decay: f64,
    #[builder(default = 1e-8)]
    pub eps: f64,
    #[builder(default = false)]
    pub amsgrad: bool,
    #[builder(default = false)]
    pub maximize: bool,
}

impl AdamParams {
    pub fn param_out(&self) -> &Buffer {
        self.param_out.as_ref().unwrap_or(&self.param.buffer)
    }

    pub fn exp_avg_out(&self) -> &Buffer {
        self.exp_avg_out.as_ref().unwrap_or(&self.exp_avg)
    }

    pub fn exp_avg_sq_out(&self) -> &Buffer {
        self.exp_avg_sq_out.as_ref().unwrap_or(&self.exp_avg_sq)
    }

    pub fn max_exp_avg_sq_out(&self) -> Option<&Buffer> {
        self.max_exp_avg_sq_out.as_ref().or(self.max_exp_avg_sq.as_ref())
    }
}

impl InvokeParams for AdamParams {}
