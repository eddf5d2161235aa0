//! Sum reduction over an unordered set of dimensions.
//!
//! The reduction is planned as one pass per reduced dimension, innermost
//! first. Each pass either reduces directly or, when the output alone cannot
//! keep the device busy, splits the reduced extent into partial sums in
//! scratch memory and finalizes them in a second launch.

pub mod kernels;
pub mod plan;
mod problem;
mod solver;

use kiln_solver::SolverRegistry;

pub use plan::{ReducePass, ReducePlan, Region, SumLaunch};
pub use problem::{NanPropagation, SumParams, SumProblem};
pub use solver::SumForward;

pub fn solvers() -> SolverRegistry<SumProblem> {
    SolverRegistry::new().with(SumForward)
}
