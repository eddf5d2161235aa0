use kiln_solver::{AnyInvokeParams, Dispatcher, ExecutionContext, InvokeParams, Problem};
use snafu::ResultExt;

use crate::adam::{self, AdamParams, AdamProblem};
use crate::batchnorm::{self, BatchNormProblem, BnFwdTrainingParams};
use crate::embedding::{self, EmbeddingBackwardParams, EmbeddingBackwardProblem};
use crate::error::{Result, SolverSnafu};
use crate::nllloss::{self, NLLLossBackwardParams, NLLLossReduceBackwardProblem};
use crate::reduce::{self, SumParams, SumProblem};
use crate::smoothl1loss::{
    self, SmoothL1BackwardParams, SmoothL1BackwardProblem, SmoothL1ForwardParams, SmoothL1ForwardProblem,
};

/// One execution context and a plan-caching dispatcher per operator.
///
/// Every call returns the id of the solver that ran.
#[derive(Debug)]
pub struct Operators {
    ctx: ExecutionContext,
    sum: Dispatcher<SumProblem>,
    smoothl1_forward: Dispatcher<SmoothL1ForwardProblem>,
    smoothl1_backward: Dispatcher<SmoothL1BackwardProblem>,
    adam: Dispatcher<AdamProblem>,
    embedding_backward: Dispatcher<EmbeddingBackwardProblem>,
    batchnorm: Dispatcher<BatchNormProblem>,
    nllloss_backward: Dispatcher<NLLLossReduceBackwardProblem>,
}

fn run<P: Problem, T: InvokeParams>(
    operator: &'static str,
    dispatcher: &Dispatcher<P>,
    ctx: &ExecutionContext,
    problem: &P,
    params: T,
) -> Result<&'static str> {
    dispatcher.run(ctx, problem, &AnyInvokeParams::new(params)).context(SolverSnafu { operator })
}

impl Operators {
    pub fn new(ctx: ExecutionContext) -> Self {
        Self {
            ctx,
            sum: Dispatcher::new(reduce::solvers()),
            smoothl1_forward: Dispatcher::new(smoothl1loss::forward_solvers()),
            smoothl1_backward: Dispatcher::new(smoothl1loss::backward_solvers()),
            adam: Dispatcher::new(adam::solvers()),
            embedding_backward: Dispatcher::new(embedding::solvers()),
            batchnorm: Dispatcher::new(batchnorm::solvers()),
            nllloss_backward: Dispatcher::new(nllloss::solvers()),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn sum_workspace_size(&self, problem: &SumProblem) -> Result<usize> {
        self.sum.workspace_size(&self.ctx, problem).context(SolverSnafu { operator: "sum" })
    }

    pub fn sum(&self, problem: &SumProblem, params: SumParams) -> Result<&'static str> {
        run("sum", &self.sum, &self.ctx, problem, params)
    }

    pub fn smoothl1_forward_workspace_size(&self, problem: &SmoothL1ForwardProblem) -> Result<usize> {
        self.smoothl1_forward.workspace_size(&self.ctx, problem).context(SolverSnafu { operator: "smoothl1loss forward" })
    }

    pub fn smoothl1_forward(&self, problem: &SmoothL1ForwardProblem, params: SmoothL1ForwardParams) -> Result<&'static str> {
        run("smoothl1loss forward", &self.smoothl1_forward, &self.ctx, problem, params)
    }

    pub fn smoothl1_backward(
        &self,
        problem: &SmoothL1BackwardProblem,
        params: SmoothL1BackwardParams,
    ) -> Result<&'static str> {
        run("smoothl1loss backward", &self.smoothl1_backward, &self.ctx, problem, params)
    }

    pub fn adam(&self, problem: &AdamProblem, params: AdamParams) -> Result<&'static str> {
        run("adam", &self.adam, &self.ctx, problem, params)
    }

    pub fn embedding_backward(
        &self,
        problem: &EmbeddingBackwardProblem,
        params: EmbeddingBackwardParams,
    ) -> Result<&'static str> {
        run("embedding backward", &self.embedding_backward, &self.ctx, problem, params)
    }

    pub fn nllloss_backward(
        &self,
        problem: &NLLLossReduceBackwardProblem,
        params: NLLLossBackwardParams,
    ) -> Result<&'static str> {
        run("nllloss backward", &self.nllloss_backward, &self.ctx, problem, params)
    }

    pub fn batchnorm_forward_training(
        &self,
        problem: &BatchNormProblem,
        params: BnFwdTrainingParams,
    ) -> Result<&'static str> {
        run("batchnorm forward training", &self.batchnorm, &self.ctx, problem, params)
    }

    /// Benchmark every candidate instance the first time this shape is seen,
    /// then run the fastest once with `params`.
    ///
    /// Candidates are timed against copies of the running statistics, so
    /// only the final run updates the caller's averages.
    pub fn tune_batchnorm_forward_training(
        &self,
        problem: &BatchNormProblem,
        params: BnFwdTrainingParams,
    ) -> Result<&'static str> {
        let context = SolverSnafu { operator: "batchnorm forward training" };
        let scratch = params
            .with_scratch_statistics(self.ctx.handle())
            .map_err(kiln_solver::Error::from)
            .context(context)?;
        let (solver, plan) =
            self.batchnorm.plan_searched(&self.ctx, problem, &AnyInvokeParams::new(scratch)).context(context)?;
        plan.invoker().invoke(self.ctx.handle(), &AnyInvokeParams::new(params)).context(context)?;
        Ok(solver)
    }
}
