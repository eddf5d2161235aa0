//! Exhaustive performance-config search.
//!
//! Starting from the solver's heuristic config, every candidate reachable with
//! [`PerformanceConfig::set_next_value`] is validated, built, compiled and
//! benchmarked against the caller's representative params. The strictly
//! fastest valid candidate wins; ties keep the first seen. Candidates are
//! measured one after another on the context's handle.

use std::time::Duration;

use snafu::OptionExt;
use tracing::{debug, trace, warn};

use crate::Result;
use crate::benchmark::benchmark_plan;
use crate::context::ExecutionContext;
use crate::error::NoValidConfigSnafu;
use crate::invoke_params::AnyInvokeParams;
use crate::perf_config::PerformanceConfig;
use crate::problem::Problem;
use crate::solver::TunableSolver;

#[tracing::instrument(skip_all, fields(solver = solver.id(), config = %problem.network_config()))]
pub fn generic_search<P, S>(
    solver: &S,
    ctx: &ExecutionContext,
    problem: &P,
    invoke_ctx: &AnyInvokeParams,
) -> Result<S::Config>
where
    P: Problem,
    S: TunableSolver<P>,
{
    let mut config = solver.default_performance_config(ctx, problem)?;
    let mut best: Option<(S::Config, Duration)> = None;
    let mut tried = 0usize;

    loop {
        if solver.is_valid_performance_config(ctx, problem, &config) {
            tried += 1;
            match measure(solver, ctx, problem, &config, invoke_ctx) {
                Ok(time) => {
                    trace!(candidate = ?config, ?time, "measured");
                    if best.as_ref().is_none_or(|(_, best_time)| time < *best_time) {
                        best = Some((config.clone(), time));
                    }
                }
                Err(error) => warn!(candidate = ?config, %error, "candidate failed, skipping"),
            }
        } else {
            trace!(candidate = ?config, "invalid for problem, skipping");
        }

        if !config.set_next_value() {
            break;
        }
    }

    let (config, time) =
        best.context(NoValidConfigSnafu { solver: solver.id(), config: problem.network_config().to_string() })?;
    debug!(tried, best = ?config, ?time, "search complete");
    Ok(config)
}

fn measure<P, S>(
    solver: &S,
    ctx: &ExecutionContext,
    problem: &P,
    config: &S::Config,
    invoke_ctx: &AnyInvokeParams,
) -> Result<Duration>
where
    P: Problem,
    S: TunableSolver<P>,
{
    let solution = solver.solution(ctx, problem, config)?;
    let plan = ctx.build(&solution)?;
    let result = benchmark_plan(ctx.handle(), &plan, invoke_ctx, ctx.benchmark())?;
    Ok(result.timing(ctx.benchmark().take_minimum))
}
