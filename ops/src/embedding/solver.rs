use kiln_device::KernelInfo;
use kiln_solver::{ExecutionContext, InvokerFactory, KernelTimer, Result, Solution, Solver};
use tracing::debug;

use super::kernels::{ALPHA, KERNEL_FILE, LOCAL_SIZE};
use super::problem::{EmbeddingBackwardParams, EmbeddingBackwardProblem};
use crate::common::float_type_params;

/// Tables this small are traversed per row instead of with atomics.
const SMALL_NUM_EMBEDDINGS: usize = 32;

#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddingBackward;

impl EmbeddingBackward {
    /// Kernel entry and work-item count for `problem`.
    fn kernel(ctx: &ExecutionContext, problem: &EmbeddingBackwardProblem) -> (&'static str, usize) {
        let (num_embeddings, embedding_dim) = (problem.num_embeddings(), problem.embedding_dim());
        if problem.is_deterministic() || ctx.policy().deterministic {
            ("EmbeddingBackwardContiguous", embedding_dim)
        } else if num_embeddings <= SMALL_NUM_EMBEDDINGS {
            ("EmbeddingBackwardSmallNumEmbeddingsTraverseContiguous", ALPHA * num_embeddings * embedding_dim)
        } else {
            ("EmbeddingBackwardContiguousAtomic", problem.input().numel() * embedding_dim)
        }
    }
}

impl Solver<EmbeddingBackwardProblem> for EmbeddingBackward {
    fn id(&self) -> &'static str {
        "EmbeddingBackward"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext, problem: &EmbeddingBackwardProblem) -> bool {
        problem.is_right_type() && problem.is_right_length() && problem.is_all_contiguous()
    }

    fn solution(&self, ctx: &ExecutionContext, problem: &EmbeddingBackwardProblem) -> Result<Solution> {
        let (name, work_items) = Self::kernel(ctx, problem);
        debug!(kernel = name, work_items, "embedding backward");

        let kernel = KernelInfo::builder()
            .kernel_file(KERNEL_FILE)
            .kernel_name(name)
            .build_params(
                float_type_params(problem.output_grad().dtype()).with("LOCAL_SIZE", LOCAL_SIZE).with("ALPHA", ALPHA),
            )
            .local([LOCAL_SIZE, 1, 1])
            .global([work_items.max(1), 1, 1])
            .build();

        Ok(Solution::new(
            vec![kernel],
            InvokerFactory::new(|handle, kernels, params| {
                let params = params.cast_to::<EmbeddingBackwardParams>();
                let weight_grad = &params.weight_grad;
                let num_embeddings = weight_grad.desc.lengths()[0];
                let embedding_dim = params.output_grad.desc.lengths().last().copied().unwrap_or(0);
                let mut timer = KernelTimer::new(handle);

                handle.set_zero(&weight_grad.buffer)?;
                handle.run(
                    &kernels[0],
                    &[
                        (&params.input.buffer).into(),
                        (&params.output_grad.buffer).into(),
                        (&weight_grad.buffer).into(),
                        params.indices_freq.as_ref().into(),
                        params.error.as_ref().into(),
                        embedding_dim.into(),
                        params.input.desc.numel().into(),
                        num_embeddings.into(),
                        params.padding_idx.unwrap_or(-1).into(),
                    ],
                )?;
                timer.lap();
                Ok(())
            }),
        ))
    }
}
