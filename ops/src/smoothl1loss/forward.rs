use kiln_device::{Buffer, BuildParams, KernelArg, KernelInfo};
use kiln_solver::error::WorkspaceTooSmallSnafu;
use kiln_solver::{
    ExecutionContext, InvokerFactory, KernelTimer, MultiBufferWorkspace, Result, Solution, Solver, TensorDesc,
};

use super::kernels::KERNEL_FILE;
use super::problem::{Reduction, SmoothL1ForwardParams, SmoothL1ForwardProblem};
use crate::common::{VIEW_DIMS, float_type_params, is_loss_dtype};

const LOCAL_SIZE_CONTIGUOUS: usize = 1024;
const LOCAL_SIZE_5D: usize = 256;
/// Fan-in of each reduction launch.
const LOCAL_SIZE_REDUCE: usize = 256;

fn typed_params(problem: &SmoothL1ForwardProblem) -> BuildParams {
    float_type_params(problem.input().dtype())
        .with("INPUT_TYPE", problem.input().dtype().kernel_type())
        .with("OUTPUT_TYPE", problem.output().dtype().kernel_type())
}

fn flat_kernel(name: &str, local: usize, size: usize, build_params: BuildParams) -> KernelInfo {
    KernelInfo::builder()
        .kernel_file(KERNEL_FILE)
        .kernel_name(name)
        .build_params(build_params)
        .local([local, 1, 1])
        .global([size, 1, 1])
        .build()
}

fn fits_views(descs: &[&TensorDesc]) -> bool {
    descs.iter().all(|desc| desc.rank() <= VIEW_DIMS)
}

/// Elementwise loss over contiguous tensors.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmoothL1LossUnreducedForwardContiguous;

impl Solver<SmoothL1ForwardProblem> for SmoothL1LossUnreducedForwardContiguous {
    fn id(&self) -> &'static str {
        "SmoothL1LossUnreducedForwardContiguous"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext, problem: &SmoothL1ForwardProblem) -> bool {
        problem.reduction() == Reduction::None
            && problem.input().dtype().is_float()
            && problem.is_same_type()
            && problem.is_right_length()
            && problem.is_all_contiguous()
    }

    fn solution(&self, _ctx: &ExecutionContext, problem: &SmoothL1ForwardProblem) -> Result<Solution> {
        let size = problem.input().numel();
        let kernel = flat_kernel("SmoothL1LossUnreducedForwardContiguous", LOCAL_SIZE_CONTIGUOUS, size, typed_params(problem));

        Ok(Solution::new(
            vec![kernel],
            InvokerFactory::new(|handle, kernels, params| {
                let params = params.cast_to::<SmoothL1ForwardParams>();
                let size = params.input.desc.numel();
                handle.run(
                    &kernels[0],
                    &[
                        (&params.input.buffer).into(),
                        (&params.target.buffer).into(),
                        (&params.output.buffer).into(),
                        params.beta.into(),
                        size.into(),
                    ],
                )?;
                Ok(())
            }),
        ))
    }
}

/// Elementwise loss over strided tensors of rank up to 5.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmoothL1LossUnreducedForward5d;

impl Solver<SmoothL1ForwardProblem> for SmoothL1LossUnreducedForward5d {
    fn id(&self) -> &'static str {
        "SmoothL1LossUnreducedForward5d"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext, problem: &SmoothL1ForwardProblem) -> bool {
        problem.reduction() == Reduction::None
            && problem.input().dtype().is_float()
            && problem.is_same_type()
            && problem.is_right_length()
            && fits_views(&[problem.input(), problem.target(), problem.output()])
    }

    fn solution(&self, _ctx: &ExecutionContext, problem: &SmoothL1ForwardProblem) -> Result<Solution> {
        let size = problem.input().numel();
        let kernel = flat_kernel("SmoothL1LossUnreducedForward5d", LOCAL_SIZE_5D, size, typed_params(problem));

        Ok(Solution::new(
            vec![kernel],
            InvokerFactory::new(|handle, kernels, params| {
                let params = params.cast_to::<SmoothL1ForwardParams>();
                handle.run(
                    &kernels[0],
                    &[
                        (&params.input.buffer).into(),
                        (&params.target.buffer).into(),
                        (&params.output.buffer).into(),
                        params.beta.into(),
                        params.input.desc.view().into(),
                        params.target.desc.view().into(),
                        params.output.desc.view().into(),
                    ],
                )?;
                Ok(())
            }),
        ))
    }
}

/// Sum or mean of the loss into a single element.
///
/// Per-element losses go to an f32 scratch region, then 256-way reductions
/// ping-pong between two scratch regions until one launch can finish into
/// the output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmoothL1LossReducedForward5d;

impl SmoothL1LossReducedForward5d {
    fn workspace(size: usize) -> MultiBufferWorkspace {
        let f32_bytes = kiln_dtype::DType::Float32.bytes();
        MultiBufferWorkspace::new(&[size * f32_bytes, size.div_ceil(LOCAL_SIZE_REDUCE) * f32_bytes])
    }

    /// Input lengths of the intermediate reductions, largest first.
    fn accumulate_sizes(size: usize) -> Vec<usize> {
        let mut sizes = Vec::new();
        let mut remaining = size;
        while remaining > LOCAL_SIZE_REDUCE {
            sizes.push(remaining);
            remaining = remaining.div_ceil(LOCAL_SIZE_REDUCE);
        }
        sizes
    }
}

impl Solver<SmoothL1ForwardProblem> for SmoothL1LossReducedForward5d {
    fn id(&self) -> &'static str {
        "SmoothL1LossReducedForward5d"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext, problem: &SmoothL1ForwardProblem) -> bool {
        problem.reduction() != Reduction::None
            && is_loss_dtype(problem.input().dtype())
            && is_loss_dtype(problem.output().dtype())
            && problem.is_same_type()
            && problem.is_right_length()
            && fits_views(&[problem.input(), problem.target(), problem.output()])
    }

    fn may_need_workspace(&self) -> bool {
        true
    }

    fn workspace_size(&self, _ctx: &ExecutionContext, problem: &SmoothL1ForwardProblem) -> usize {
        Self::workspace(problem.input().numel()).size()
    }

    fn solution(&self, _ctx: &ExecutionContext, problem: &SmoothL1ForwardProblem) -> Result<Solution> {
        let size = problem.input().numel();
        let reduction = problem.reduction();
        let workspace = Self::workspace(size);
        let accumulate = Self::accumulate_sizes(size);

        let mut kernels = vec![flat_kernel(
            "SmoothL1LossForward",
            LOCAL_SIZE_REDUCE,
            size,
            float_type_params(problem.input().dtype()).with("REDUCTION_TYPE", reduction.code()),
        )];
        let reduce_params = float_type_params(problem.output().dtype());
        for &n in &accumulate {
            kernels.push(flat_kernel("ReduceSumFLOATACCUM", LOCAL_SIZE_REDUCE, n, reduce_params.clone()));
        }
        kernels.push(flat_kernel("ReduceSum", LOCAL_SIZE_REDUCE, 1, reduce_params));

        let workspace_size = workspace.size();
        let f32_bytes = kiln_dtype::DType::Float32.bytes();
        let (work_a, work_b) = (workspace.offset(0) / f32_bytes, workspace.offset(1) / f32_bytes);

        let invoker = InvokerFactory::new(move |handle, kernels, params| {
            let params = params.cast_to::<SmoothL1ForwardParams>();
            let scratch: &Buffer = params
                .workspace
                .as_ref()
                .ok_or_else(|| WorkspaceTooSmallSnafu { required: workspace_size, provided: 0usize }.build())?;
            let mut timer = KernelTimer::new(handle);

            handle.run(
                &kernels[0],
                &[
                    (&params.input.buffer).into(),
                    (&params.target.buffer).into(),
                    scratch.into(),
                    params.beta.into(),
                    reduction.divisor(size).into(),
                    params.input.desc.view().into(),
                    params.target.desc.view().into(),
                ],
            )?;
            timer.lap();

            let (mut src, mut dst) = (work_a, work_b);
            let mut remaining = size;
            for kernel in &kernels[1..kernels.len() - 1] {
                let args: [KernelArg; 5] =
                    [scratch.into(), src.into(), scratch.into(), dst.into(), remaining.into()];
                handle.run(kernel, &args)?;
                timer.lap();
                remaining = remaining.div_ceil(LOCAL_SIZE_REDUCE);
                std::mem::swap(&mut src, &mut dst);
            }

            handle.run(
                &kernels[kernels.len() - 1],
                &[
                    scratch.into(),
                    src.into(),
                    (&params.output.buffer).into(),
                    remaining.into(),
                    params.output.desc.view().into(),
                ],
            )?;
            timer.lap();
            Ok(())
        });

        Ok(Solution::new(kernels, invoker).with_workspace(workspace_size))
    }
}
