use std::sync::Arc;

use kiln_device::{Buffer, KernelArg, KernelInfo};
use kiln_solver::error::WorkspaceTooSmallSnafu;
use kiln_solver::{ExecutionContext, InvokerFactory, KernelTimer, Result, Solution, Solver};
use tracing::debug;

use super::kernels::KERNEL_FILE;
use super::plan::{LOCAL_SIZE, ReducePlan, Region, SumLaunch, plan_passes, required_work_items};
use super::problem::{NanPropagation, SumParams, SumProblem};
use crate::common::float_type_params;

/// Multi-pass sum over packed tensors.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumForward;

impl SumForward {
    fn plan(ctx: &ExecutionContext, problem: &SumProblem) -> ReducePlan {
        let required = required_work_items(ctx.handle().max_compute_units());
        plan_passes(problem.x().lengths(), &problem.sorted_dims(), required)
    }
}

impl Solver<SumProblem> for SumForward {
    fn id(&self) -> &'static str {
        "SumForward"
    }

    fn is_applicable(&self, ctx: &ExecutionContext, problem: &SumProblem) -> bool {
        if !problem.is_same_type() || !problem.x().dtype().is_float() {
            return false;
        }
        if !problem.is_right_dim() || !problem.is_right_length() {
            return false;
        }
        if !problem.is_all_packed() || !problem.is_not_last_dim() {
            return false;
        }
        if ctx.policy().force_reduce_split {
            return true;
        }
        let required = required_work_items(ctx.handle().max_compute_units());
        Self::plan(ctx, problem).beats_baseline(required)
    }

    fn may_need_workspace(&self) -> bool {
        true
    }

    fn workspace_size(&self, ctx: &ExecutionContext, problem: &SumProblem) -> usize {
        Self::plan(ctx, problem).workspace_bytes(problem.x().dtype())
    }

    fn solution(&self, ctx: &ExecutionContext, problem: &SumProblem) -> Result<Solution> {
        let dtype = problem.x().dtype();
        let plan = Arc::new(Self::plan(ctx, problem));
        let workspace = plan.workspace_bytes(dtype);
        let build_params = float_type_params(dtype);

        let kernels = plan
            .launches()
            .map(|(pass, launch)| {
                KernelInfo::builder()
                    .kernel_file(KERNEL_FILE)
                    .kernel_name(launch.kernel_name())
                    .build_params(build_params.clone())
                    .local([LOCAL_SIZE, 1, 1])
                    .global([launch.output_len(pass.output_numel), 1, 1])
                    .build()
            })
            .collect::<Vec<_>>();
        debug!(passes = plan.passes.len(), launches = kernels.len(), workspace, "sum plan");

        let invoker = InvokerFactory::new(move |handle, kernels, params| {
            let params = params.cast_to::<SumParams>();
            let propagate_nan = params.nan_propagation == NanPropagation::Propagate;
            let mut timer = KernelTimer::new(handle);

            for ((pass, launch), kernel) in plan.launches().zip(kernels) {
                let (src, dst) = (launch.src(), launch.dst());
                let (src_buffer, dst_buffer) = (bind(src, params, workspace)?, bind(dst, params, workspace)?);
                let args: [KernelArg; 9] = match *launch {
                    SumLaunch::Partial { parallelism, .. } => [
                        src_buffer.into(),
                        dst_buffer.into(),
                        pass.output_numel.into(),
                        pass.reduce_size.into(),
                        parallelism.into(),
                        pass.inner_size.into(),
                        propagate_nan.into(),
                        src.offset().into(),
                        dst.offset().into(),
                    ],
                    SumLaunch::Finalize { reduce_size, .. } => [
                        src_buffer.into(),
                        dst_buffer.into(),
                        pass.output_numel.into(),
                        reduce_size.into(),
                        pass.inner_size.into(),
                        pass.dim.into(),
                        propagate_nan.into(),
                        src.offset().into(),
                        dst.offset().into(),
                    ],
                };
                handle.run(kernel, &args)?;
                timer.lap();
            }
            Ok(())
        });

        Ok(Solution::new(kernels, invoker).with_workspace(workspace))
    }
}

fn bind(region: Region, params: &SumParams, required: usize) -> Result<&Buffer> {
    match region {
        Region::Input => Ok(&params.x),
        Region::Output => Ok(&params.y),
        Region::Scratch(_) => {
            params.workspace.as_ref().ok_or_else(|| WorkspaceTooSmallSnafu { required, provided: 0usize }.build())
        }
    }
}
