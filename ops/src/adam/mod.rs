//! Adam optimizer step, plain and mixed precision.

pub mod kernels;
mod problem;
mod solver;

use kiln_solver::SolverRegistry;

pub use problem::{AdamParams, AdamProblem};
pub use solver::AdamPacked;

pub fn solvers() -> SolverRegistry<AdamProblem> {
    SolverRegistry::new().with(AdamPacked)
}
