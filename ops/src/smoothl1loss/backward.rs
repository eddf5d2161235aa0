use kiln_device::{KernelArg, KernelInfo};
use kiln_solver::{ExecutionContext, InvokerFactory, Result, Solution, Solver};

use super::kernels::KERNEL_FILE;
use super::problem::{SmoothL1BackwardParams, SmoothL1BackwardProblem};
use crate::common::{TensorArg, VIEW_DIMS, float_type_params, is_loss_dtype};

const LOCAL_SIZE: usize = 256;

/// Input and target gradients over strided tensors of rank up to 5.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmoothL1LossBackward5d;

impl Solver<SmoothL1BackwardProblem> for SmoothL1LossBackward5d {
    fn id(&self) -> &'static str {
        "SmoothL1LossBackward5d"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext, problem: &SmoothL1BackwardProblem) -> bool {
        is_loss_dtype(problem.input().dtype())
            && problem.max_rank() <= VIEW_DIMS
            && problem.is_same_type()
            && problem.is_right_length()
    }

    fn solution(&self, _ctx: &ExecutionContext, problem: &SmoothL1BackwardProblem) -> Result<Solution> {
        let size = problem.input().numel();
        let reduction = problem.reduction();
        let kernel = KernelInfo::builder()
            .kernel_file(KERNEL_FILE)
            .kernel_name("SmoothL1LossBackward")
            .build_params(float_type_params(problem.input().dtype()).with("REDUCTION_TYPE", reduction.code()))
            .local([LOCAL_SIZE, 1, 1])
            .global([size, 1, 1])
            .build();

        Ok(Solution::new(
            vec![kernel],
            InvokerFactory::new(move |handle, kernels, params| {
                let params = params.cast_to::<SmoothL1BackwardParams>();
                let input_view = params.input.desc.view();
                let grad_view = |grad: &Option<TensorArg>| grad.as_ref().map_or(input_view, |g| g.desc.view());

                let args: [KernelArg; 12] = [
                    (&params.input.buffer).into(),
                    (&params.target.buffer).into(),
                    (&params.output_grad.buffer).into(),
                    params.input_grad.as_ref().map(|g| &g.buffer).into(),
                    params.target_grad.as_ref().map(|g| &g.buffer).into(),
                    params.beta.into(),
                    reduction.divisor(size).into(),
                    input_view.into(),
                    params.target.desc.view().into(),
                    params.output_grad.desc.view().into(),
                    grad_view(&params.input_grad).into(),
                    grad_view(&params.target_grad).into(),
                ];
                handle.run(&kernels[0], &args)?;
                Ok(())
            }),
        ))
    }
}
