//! Negative log-likelihood loss, reduced backward.
//!
//! Given the gradient of a summed or averaged loss, each target element
//! writes one class row of the input gradient: `-weight[t] * grad / divisor`
//! at its target class `t` and zero elsewhere.

pub mod kernels;
mod problem;
mod solver;

use kiln_solver::SolverRegistry;

pub use problem::{NLLLossBackwardParams, NLLLossReduceBackwardProblem};
pub use solver::NLLLossReduceBackward5d;

pub fn solvers() -> SolverRegistry<NLLLossReduceBackwardProblem> {
    SolverRegistry::new().with(NLLLossReduceBackward5d)
}
