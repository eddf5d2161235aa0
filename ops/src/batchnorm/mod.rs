//! Batch normalization forward training through a third-party instance catalog.

pub mod catalog;
mod problem;
mod solver;

use kiln_solver::SolverRegistry;

pub use catalog::{BnFwdArgs, CpuBnFwdCatalog};
pub use problem::{BatchNormProblem, BnFwdTrainingParams, Direction};
pub use solver::BnCkFwdTraining;

pub fn solvers() -> SolverRegistry<BatchNormProblem> {
    SolverRegistry::new().with_tunable(BnCkFwdTraining::default())
}
