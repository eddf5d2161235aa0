//! SmoothL1 (Huber-style) loss, forward and backward.
//!
//! Unreduced forward has a flat kernel for contiguous tensors and a strided
//! 5-D fallback. Reduced forward writes per-element losses to scratch and
//! folds them with a chain of 256-way reductions.

mod backward;
mod forward;
pub mod kernels;
mod problem;

use kiln_solver::SolverRegistry;

pub use backward::SmoothL1LossBackward5d;
pub use forward::{SmoothL1LossReducedForward5d, SmoothL1LossUnreducedForward5d, SmoothL1LossUnreducedForwardContiguous};
pub use problem::{
    Reduction, SmoothL1BackwardParams, SmoothL1BackwardProblem, SmoothL1ForwardParams, SmoothL1ForwardProblem,
};

/// Forward solvers in priority order.
pub fn forward_solvers() -> SolverRegistry<SmoothL1ForwardProblem> {
    SolverRegistry::new()
        .with(SmoothL1LossUnreducedForwardContiguous)
        .with(SmoothL1LossUnreducedForward5d)
        .with(SmoothL1LossReducedForward5d)
}

pub fn backward_solvers() -> SolverRegistry<SmoothL1BackwardProblem> {
    SolverRegistry::new().with(SmoothL1LossBackward5d)
}
