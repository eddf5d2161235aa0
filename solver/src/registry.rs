//! Ordered solver registry and selection.

use std::sync::Arc;
use std::time::Duration;

use snafu::OptionExt;
use tracing::{debug, trace, warn};

use crate::Result;
use crate::benchmark::benchmark_plan;
use crate::context::ExecutionContext;
use crate::error::NoSolverSnafu;
use crate::invoke_params::AnyInvokeParams;
use crate::problem::Problem;
use crate::solution::Solution;
use crate::solver::{Solver, TunableSolver, Tuned};

/// The outcome of selection: which solver, and its plan description.
#[derive(Debug, Clone)]
pub struct Selected {
    pub solver: &'static str,
    pub solution: Solution,
}

/// Solvers for one problem type, in priority order.
pub struct SolverRegistry<P: Problem> {
    solvers: Vec<Arc<dyn Solver<P>>>,
}

impl<P: Problem> Default for SolverRegistry<P> {
    fn default() -> Self {
        Self { solvers: Vec::new() }
    }
}

impl<P: Problem> std::fmt::Debug for SolverRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl<P: Problem> SolverRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a solver; earlier solvers take priority.
    pub fn with<S: Solver<P> + 'static>(mut self, solver: S) -> Self {
        self.solvers.push(Arc::new(solver));
        self
    }

    /// Append a tunable solver behind a [`Tuned`] adapter.
    pub fn with_tunable<S: TunableSolver<P> + 'static>(mut self, solver: S) -> Self {
        self.solvers.push(Arc::new(Tuned::<S, <S as TunableSolver<P>>::Config>::new(solver)));
        self
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.solvers.iter().map(|solver| solver.id())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Solver<P>>> {
        self.solvers.iter().find(|solver| solver.id() == id)
    }

    /// Applicable solvers, in priority order.
    pub fn applicable<'a>(&'a self, ctx: &'a ExecutionContext, problem: &'a P) -> impl Iterator<Item = &'a Arc<dyn Solver<P>>> + 'a {
        self.solvers.iter().filter(move |solver| {
            let applicable = solver.is_applicable(ctx, problem);
            trace!(solver = solver.id(), applicable, "applicability");
            applicable
        })
    }

    /// First applicable solver whose solution builds.
    ///
    /// A solver that is applicable but fails to produce a solution is logged
    /// and skipped. Inapplicable solvers are never asked for a solution.
    #[tracing::instrument(skip_all, fields(config = %problem.network_config()))]
    pub fn find_solution(&self, ctx: &ExecutionContext, problem: &P) -> Result<Selected> {
        self.applicable(ctx, problem)
            .find_map(|solver| match solver.solution(ctx, problem) {
                Ok(solution) => {
                    debug!(solver = solver.id(), kernels = solution.kernels.len(), "selected");
                    Some(Selected { solver: solver.id(), solution })
                }
                Err(error) => {
                    warn!(solver = solver.id(), %error, "solver failed to build a solution");
                    None
                }
            })
            .context(NoSolverSnafu { config: problem.network_config().to_string() })
    }

    /// Workspace requirement of every applicable solver, in priority order.
    pub fn workspace_sizes(&self, ctx: &ExecutionContext, problem: &P) -> Vec<(&'static str, usize)> {
        self.applicable(ctx, problem)
            .map(|solver| {
                let size = if solver.may_need_workspace() { solver.workspace_size(ctx, problem) } else { 0 };
                (solver.id(), size)
            })
            .collect()
    }

    /// Tune and benchmark every applicable solver; the fastest wins.
    ///
    /// Each solver gets its tuned solution, which is compiled and timed with
    /// `invoke_ctx`. Solvers that fail are logged and skipped.
    #[tracing::instrument(skip_all, fields(config = %problem.network_config()))]
    pub fn search_solution(&self, ctx: &ExecutionContext, problem: &P, invoke_ctx: &AnyInvokeParams) -> Result<Selected> {
        let mut best: Option<(Selected, Duration)> = None;

        for solver in self.applicable(ctx, problem) {
            let timed = solver.tuned_solution(ctx, problem, invoke_ctx).and_then(|solution| {
                let plan = ctx.build(&solution)?;
                let result = benchmark_plan(ctx.handle(), &plan, invoke_ctx, ctx.benchmark())?;
                Ok((solution, result.timing(ctx.benchmark().take_minimum)))
            });

            match timed {
                Ok((solution, time)) => {
                    debug!(solver = solver.id(), ?time, "benchmarked");
                    if best.as_ref().is_none_or(|(_, best_time)| time < *best_time) {
                        best = Some((Selected { solver: solver.id(), solution }, time));
                    }
                }
                Err(error) => warn!(solver = solver.id(), %error, "solver failed during search"),
            }
        }

        best.map(|(selected, _)| selected).context(NoSolverSnafu { config: problem.network_config().to_string() })
    }
}
