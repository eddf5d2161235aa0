//! Embedding backward: scatter-add of output gradients into weight rows.

pub mod kernels;
mod problem;
mod solver;

use kiln_solver::SolverRegistry;

pub use problem::{EmbeddingBackwardParams, EmbeddingBackwardProblem};
pub use solver::EmbeddingBackward;

pub fn solvers() -> SolverRegistry<EmbeddingBackwardProblem> {
    SolverRegistry::new().with(EmbeddingBackward)
}
