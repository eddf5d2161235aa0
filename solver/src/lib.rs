//! Solver framework for kiln operators.
//!
//! Every operator exposes an immutable [`Problem`] and an ordered list of
//! [`Solver`]s. Selection walks the list and takes the first applicable solver
//! that builds a [`Solution`]. A solution names the kernels to compile and an
//! [`InvokerFactory`] that launches them. Compiled [`Plan`]s are cached per
//! [`NetworkConfig`] by the [`Dispatcher`].
//!
//! Solvers with several implementation choices implement [`TunableSolver`];
//! [`generic_search`] benchmarks their candidates and the [`Tuned`] adapter
//! remembers the winner.

pub mod benchmark;
pub mod catalog;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod generic_search;
pub mod invoke_params;
pub mod kernel_cache;
pub mod perf_config;
pub mod problem;
pub mod registry;
pub mod solution;
pub mod solver;
pub mod tensor;
pub mod workspace;

#[cfg(test)]
pub mod test;

pub use benchmark::{BenchmarkConfig, BenchmarkResult, benchmark_plan};
pub use catalog::{Argument, DeviceOpInstance, InstanceCatalog, OpInvoker, StreamConfig};
pub use config::Policy;
pub use context::ExecutionContext;
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use generic_search::generic_search;
pub use invoke_params::{AnyInvokeParams, InvokeParams};
pub use kernel_cache::{KernelCache, PlanCache, PlanKey};
pub use perf_config::{CandidateConfig, PerformanceConfig};
pub use problem::{NetworkConfig, Problem};
pub use registry::{Selected, SolverRegistry};
pub use solution::{Invoker, InvokerFactory, KernelTimer, Plan, Solution};
pub use solver::{Solver, TunableSolver, Tuned};
pub use tensor::{Dims, Layout, TensorDesc};
pub use workspace::MultiBufferWorkspace;
