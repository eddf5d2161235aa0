//! Solver traits.
//!
//! [`Solver`] is the object-safe face every implementation shows the
//! registry. Solvers with tunable internals implement [`TunableSolver`]
//! instead and are registered through the [`Tuned`] adapter, which erases the
//! config type and remembers search results per network config.

use papaya::HashMap;
use tracing::debug;

use crate::Result;
use crate::context::ExecutionContext;
use crate::generic_search::generic_search;
use crate::invoke_params::AnyInvokeParams;
use crate::perf_config::PerformanceConfig;
use crate::problem::{NetworkConfig, Problem};
use crate::solution::Solution;

pub trait Solver<P: Problem>: Send + Sync {
    /// Stable identifier, unique within one registry.
    fn id(&self) -> &'static str;

    /// Pure and conservative. Cheap layout, rank and type checks come first.
    fn is_applicable(&self, ctx: &ExecutionContext, problem: &P) -> bool;

    fn may_need_workspace(&self) -> bool {
        false
    }

    /// Scratch bytes required by [`Solver::solution`]'s invoker; 0 when none.
    fn workspace_size(&self, _ctx: &ExecutionContext, _problem: &P) -> usize {
        0
    }

    fn is_tunable(&self) -> bool {
        false
    }

    /// Deterministic plan construction. Launches nothing.
    fn solution(&self, ctx: &ExecutionContext, problem: &P) -> Result<Solution>;

    /// Like [`Solver::solution`], but may benchmark candidates with `invoke_ctx`
    /// first. Non-tunable solvers ignore the params.
    fn tuned_solution(&self, ctx: &ExecutionContext, problem: &P, invoke_ctx: &AnyInvokeParams) -> Result<Solution> {
        let _ = invoke_ctx;
        self.solution(ctx, problem)
    }
}

pub trait TunableSolver<P: Problem>: Send + Sync {
    type Config: PerformanceConfig;

    fn id(&self) -> &'static str;

    fn is_applicable(&self, ctx: &ExecutionContext, problem: &P) -> bool;

    fn may_need_workspace(&self) -> bool {
        false
    }

    fn workspace_size(&self, _ctx: &ExecutionContext, _problem: &P) -> usize {
        0
    }

    /// Heuristic choice. An empty candidate set is an error, never a silent default.
    fn default_performance_config(&self, ctx: &ExecutionContext, problem: &P) -> Result<Self::Config>;

    /// Check the selected candidate against the concrete shape.
    fn is_valid_performance_config(&self, ctx: &ExecutionContext, problem: &P, config: &Self::Config) -> bool;

    fn search(&self, ctx: &ExecutionContext, problem: &P, invoke_ctx: &AnyInvokeParams) -> Result<Self::Config>
    where
        Self: Sized,
    {
        generic_search(self, ctx, problem, invoke_ctx)
    }

    /// # Panics
    ///
    /// May panic if `config` does not point at a valid candidate.
    fn solution(&self, ctx: &ExecutionContext, problem: &P, config: &Self::Config) -> Result<Solution>;
}

/// Registers a [`TunableSolver`] as a [`Solver`].
///
/// Search results are cached per network config; later calls to
/// [`Solver::solution`] reuse the tuned config instead of the heuristic one.
pub struct Tuned<S, C> {
    solver: S,
    tuned: HashMap<NetworkConfig, C>,
}

impl<S, C> Tuned<S, C>
where
    C: Clone + Send + Sync,
{
    pub fn new(solver: S) -> Self {
        Self { solver, tuned: HashMap::new() }
    }

    /// The tuned config remembered for `config`, if a search ran.
    pub fn tuned_config(&self, config: &NetworkConfig) -> Option<C> {
        self.tuned.pin().get(config).cloned()
    }
}

impl<P, S> Solver<P> for Tuned<S, <S as TunableSolver<P>>::Config>
where
    P: Problem,
    S: TunableSolver<P>,
{
    fn id(&self) -> &'static str {
        self.solver.id()
    }

    fn is_applicable(&self, ctx: &ExecutionContext, problem: &P) -> bool {
        self.solver.is_applicable(ctx, problem)
    }

    fn may_need_workspace(&self) -> bool {
        self.solver.may_need_workspace()
    }

    fn workspace_size(&self, ctx: &ExecutionContext, problem: &P) -> usize {
        self.solver.workspace_size(ctx, problem)
    }

    fn is_tunable(&self) -> bool {
        true
    }

    fn solution(&self, ctx: &ExecutionContext, problem: &P) -> Result<Solution> {
        let config = match self.tuned_config(&problem.network_config()) {
            Some(config) => config,
            None => self.solver.default_performance_config(ctx, problem)?,
        };
        self.solver.solution(ctx, problem, &config)
    }

    fn tuned_solution(&self, ctx: &ExecutionContext, problem: &P, invoke_ctx: &AnyInvokeParams) -> Result<Solution> {
        let key = problem.network_config();
        let config = match self.tuned_config(&key) {
            Some(config) => config,
            None => {
                let config = self.solver.search(ctx, problem, invoke_ctx)?;
                debug!(solver = self.solver.id(), config = %key, tuned = ?config, "search finished");
                self.tuned.pin().insert(key, config.clone());
                config
            }
        };
        self.solver.solution(ctx, problem, &config)
    }
}
