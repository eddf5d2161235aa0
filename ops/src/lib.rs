//! Tensor operators for kiln.
//!
//! Each operator module provides a problem description, its invoke params,
//! one or more solvers and the CPU bodies of the kernels those solvers
//! build. [`Operators`] bundles a context with one dispatcher per operator.
//!
//! ```text
//! Operators::sum(problem, params)
//!     └─ Dispatcher<SumProblem>::run
//!            ├─ plan cache hit? ─────────────────────┐
//!            └─ SolverRegistry::find_solution        │
//!                   └─ ctx.build(solution) ──────────┤
//!                                                    ▼
//!                                     Plan::invoker().invoke(handle, params)
//! ```

pub mod adam;
pub mod batchnorm;
pub mod common;
pub mod embedding;
pub mod error;
pub mod nllloss;
mod operators;
pub mod reduce;
pub mod smoothl1loss;


use std::sync::Arc;

use kiln_device::{CpuCompiler, CpuHandle, KernelTable};
use kiln_solver::{BenchmarkConfig, ExecutionContext, Policy};
use once_cell::sync::Lazy;

pub use common::TensorArg;
pub use error::{Error, Result};
pub use operators::Operators;

static KERNELS: Lazy<Arc<KernelTable>> = Lazy::new(|| {
    let table = KernelTable::new();
    reduce::kernels::register(&table);
    smoothl1loss::kernels::register(&table);
    adam::kernels::register(&table);
    embedding::kernels::register(&table);
    nllloss::kernels::register(&table);
    Arc::new(table)
});

/// CPU bodies of every kernel the operators build.
pub fn kernel_table() -> Arc<KernelTable> {
    Arc::clone(&KERNELS)
}

/// A context on a fresh CPU handle compiling against [`kernel_table`].
///
/// Policy and search settings are read from the `KILN_*` environment
/// variables once, here.
pub fn cpu_context(compute_units: usize) -> ExecutionContext {
    ExecutionContext::builder()
        .handle(Arc::new(CpuHandle::builder().compute_units(compute_units).build()))
        .compiler(Arc::new(CpuCompiler::new(kernel_table())))
        .policy(Policy::from_env())
        .benchmark(BenchmarkConfig::from_env())
        .build()
}
