use kiln_device::KernelInfo;
use kiln_solver::{ExecutionContext, InvokerFactory, Result, Solution, Solver};

use super::kernels::{KERNEL_FILE, LOCAL_SIZE};
use super::problem::{NLLLossBackwardParams, NLLLossReduceBackwardProblem};
use crate::common::{VIEW_DIMS, float_type_params, is_loss_dtype};

/// Strided tensors of rank up to 5, one work item per target element.
#[derive(Debug, Clone, Copy, Default)]
pub struct NLLLossReduceBackward5d;

impl Solver<NLLLossReduceBackwardProblem> for NLLLossReduceBackward5d {
    fn id(&self) -> &'static str {
        "NLLLossReduceBackward5d"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext, problem: &NLLLossReduceBackwardProblem) -> bool {
        problem.max_rank() <= VIEW_DIMS
            && is_loss_dtype(problem.input_grad().dtype())
            && problem.is_right_type()
            && problem.is_right_length()
    }

    fn solution(&self, _ctx: &ExecutionContext, problem: &NLLLossReduceBackwardProblem) -> Result<Solution> {
        let kernel = KernelInfo::builder()
            .kernel_file(KERNEL_FILE)
            .kernel_name("NLLLossBackward5d")
            .build_params(float_type_params(problem.input_grad().dtype()))
            .local([LOCAL_SIZE, 1, 1])
            .global([problem.target().numel().max(1), 1, 1])
            .build();

        Ok(Solution::new(
            vec![kernel],
            InvokerFactory::new(|handle, kernels, params| {
                let params = params.cast_to::<NLLLossBackwardParams>();
                let lengths = params.input_grad.desc.lengths();
                handle.run(
                    &kernels[0],
                    &[
                        (&params.input_grad.buffer).into(),
                        (&params.target.buffer).into(),
                        (&params.weight.buffer).into(),
                        (&params.output_grad.buffer).into(),
                        params.ignore_index.into(),
                        params.divisor.into(),
                        lengths[1].into(),
                        lengths[2..].iter().product::<usize>().into(),
                        params.input_grad.desc.view().into(),
                        params.target.desc.view().into(),
                        params.weight.desc.view().into(),
                        params.output_grad.desc.view().into(),
                    ],
                )?;
                Ok(())
            }),
        ))
    }
}
