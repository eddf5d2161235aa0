//! Cached problem dispatch.
//!
//! [`Dispatcher`] is the entry point operators expose to callers: it selects a
//! solver once per network config, compiles its plan once, and reuses the plan
//! for every later call with an equivalent problem. Cached plans are keyed by
//! the problem's network config together with
//! [`ExecutionContext::plan_scope`], so one dispatcher may serve contexts
//! with different policies or handles.

use std::sync::Arc;

use snafu::ensure;
use tracing::debug;

use crate::Result;
use crate::context::ExecutionContext;
use crate::error::WorkspaceTooSmallSnafu;
use crate::invoke_params::AnyInvokeParams;
use crate::kernel_cache::{PlanCache, PlanKey};
use crate::problem::{NetworkConfig, Problem};
use crate::registry::SolverRegistry;
use crate::solution::Plan;

fn scoped_config<P: Problem>(ctx: &ExecutionContext, problem: &P) -> NetworkConfig {
    NetworkConfig::new(format!("{}@{}", problem.network_config(), ctx.plan_scope()))
}

#[derive(Debug)]
pub struct Dispatcher<P: Problem> {
    registry: SolverRegistry<P>,
    plans: PlanCache,
}

impl<P: Problem> Dispatcher<P> {
    pub fn new(registry: SolverRegistry<P>) -> Self {
        Self { registry, plans: PlanCache::new() }
    }

    pub fn registry(&self) -> &SolverRegistry<P> {
        &self.registry
    }

    pub fn plans(&self) -> &PlanCache {
        &self.plans
    }

    /// Scratch bytes the first applicable solver needs.
    pub fn workspace_size(&self, ctx: &ExecutionContext, problem: &P) -> Result<usize> {
        self.registry
            .workspace_sizes(ctx, problem)
            .first()
            .map(|(_, size)| *size)
            .ok_or_else(|| crate::error::NoSolverSnafu { config: problem.network_config().to_string() }.build())
    }

    /// Resolve (or reuse) the plan for `problem`.
    pub fn plan(&self, ctx: &ExecutionContext, problem: &P) -> Result<(&'static str, Arc<Plan>)> {
        let config = scoped_config(ctx, problem);
        if let Some(cached) = self.plans.get_selected(&config) {
            return Ok(cached);
        }

        let selected = self.registry.find_solution(ctx, problem)?;
        let plan = Arc::new(ctx.build(&selected.solution)?);
        debug!(solver = selected.solver, %config, "compiled plan");
        self.plans.insert(PlanKey { solver: selected.solver, config }, Arc::clone(&plan));
        Ok((selected.solver, plan))
    }

    /// Like [`Dispatcher::plan`], but benchmarks every applicable solver the
    /// first time a network config is seen.
    pub fn plan_searched(&self, ctx: &ExecutionContext, problem: &P, invoke_ctx: &AnyInvokeParams) -> Result<(&'static str, Arc<Plan>)> {
        let config = scoped_config(ctx, problem);
        if let Some(cached) = self.plans.get_selected(&config) {
            return Ok(cached);
        }

        let selected = self.registry.search_solution(ctx, problem, invoke_ctx)?;
        let plan = Arc::new(ctx.build(&selected.solution)?);
        self.plans.insert(PlanKey { solver: selected.solver, config }, Arc::clone(&plan));
        Ok((selected.solver, plan))
    }

    /// Run `problem` with `params`.
    ///
    /// Fails with [`crate::Error::WorkspaceTooSmall`] before launching anything
    /// if the plan needs more scratch than the params provide.
    pub fn run(&self, ctx: &ExecutionContext, problem: &P, params: &AnyInvokeParams) -> Result<&'static str> {
        let (solver, plan) = self.plan(ctx, problem)?;

        let required = plan.workspace_size();
        if required > 0 {
            let provided = params.workspace().map_or(0, |workspace| workspace.size());
            ensure!(provided >= required, WorkspaceTooSmallSnafu { required, provided });
        }

        plan.invoker().invoke(ctx.handle(), params)?;
        Ok(solver)
    }
}
