//! Execution plans.
//!
//! A solver describes its work as a [`Solution`]: the kernels to build plus one
//! [`InvokerFactory`]. Materializing the factory with the compiled kernels
//! yields a [`Plan`], which can be cached and invoked any number of times:
//!
//! ```text
//! Solver::solution ──> Solution { kernels: [KernelInfo], invoker_factory }
//!                          │ compile each KernelInfo
//!                          ▼
//!                      Plan { kernels: [Kernel] } ──invoker()──> Invoker<'_>
//!                                                                  │ invoke(handle, params)
//!                                                                  ▼
//!                                                              launches
//! ```

use std::fmt;
use std::sync::Arc;

use kiln_device::{Handle, Kernel, KernelInfo};
use tracing::trace;

use crate::Result;
use crate::invoke_params::AnyInvokeParams;

type InvokeFn = dyn Fn(&dyn Handle, &[Kernel], &AnyInvokeParams) -> Result<()> + Send + Sync;

/// Produces the invoke function of a plan once its kernels are compiled.
///
/// The wrapped function receives the compiled kernels positionally, in the
/// order of [`Solution::kernels`]. It may only launch kernels, update the
/// handle's profiling timer and zero-fill outputs.
#[derive(Clone)]
pub struct InvokerFactory {
    invoke: Arc<InvokeFn>,
}

impl fmt::Debug for InvokerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InvokerFactory")
    }
}

impl InvokerFactory {
    pub fn new<F>(invoke: F) -> Self
    where
        F: Fn(&dyn Handle, &[Kernel], &AnyInvokeParams) -> Result<()> + Send + Sync + 'static,
    {
        Self { invoke: Arc::new(invoke) }
    }

    /// Bind compiled kernels. The plan owns them from here on.
    pub fn materialize(&self, kernels: Vec<Kernel>) -> Plan {
        Plan { kernels, invoke: Arc::clone(&self.invoke), workspace_size: 0 }
    }
}

/// What a solver wants built and how to run it.
#[derive(Debug, Clone)]
pub struct Solution {
    pub kernels: Vec<KernelInfo>,
    pub invoker_factory: InvokerFactory,
    /// Scratch bytes the invoker expects in the params' workspace.
    pub workspace_size: Option<usize>,
}

impl Solution {
    pub fn new(kernels: Vec<KernelInfo>, invoker_factory: InvokerFactory) -> Self {
        Self { kernels, invoker_factory, workspace_size: None }
    }

    pub fn with_workspace(mut self, bytes: usize) -> Self {
        self.workspace_size = Some(bytes);
        self
    }

    /// Bind compiled kernels to this solution's descriptors.
    ///
    /// # Panics
    ///
    /// Panics if the kernel count differs from the descriptor count.
    pub fn materialize(&self, kernels: Vec<Kernel>) -> Plan {
        assert_eq!(
            kernels.len(),
            self.kernels.len(),
            "solution declares {} kernels but {} were compiled",
            self.kernels.len(),
            kernels.len()
        );
        let mut plan = self.invoker_factory.materialize(kernels);
        plan.workspace_size = self.workspace_size.unwrap_or(0);
        plan
    }
}

/// A materialized solution: compiled kernels plus the invoke function.
pub struct Plan {
    kernels: Vec<Kernel>,
    invoke: Arc<InvokeFn>,
    workspace_size: usize,
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("kernels", &self.kernels.iter().map(Kernel::name).collect::<Vec<_>>())
            .field("workspace_size", &self.workspace_size)
            .finish()
    }
}

impl Plan {
    pub fn kernels(&self) -> &[Kernel] {
        &self.kernels
    }

    pub fn workspace_size(&self) -> usize {
        self.workspace_size
    }

    pub fn invoker(&self) -> Invoker<'_> {
        Invoker { plan: self }
    }
}

/// Borrowed entry point of a [`Plan`].
#[derive(Debug, Clone, Copy)]
pub struct Invoker<'a> {
    plan: &'a Plan,
}

impl Invoker<'_> {
    pub fn invoke(&self, handle: &dyn Handle, params: &AnyInvokeParams) -> Result<()> {
        trace!(kernels = self.plan.kernels.len(), params = params.type_name(), "invoke");
        (self.plan.invoke)(handle, &self.plan.kernels, params)
    }
}

/// Folds per-launch profiling times into the handle's timer.
///
/// Each profiled launch overwrites the timer. Calling [`KernelTimer::lap`]
/// after every launch leaves the running total in the timer, so the invoker
/// reports the sum of all its launches.
pub struct KernelTimer<'a> {
    handle: &'a dyn Handle,
    elapsed: f32,
}

impl<'a> KernelTimer<'a> {
    pub fn new(handle: &'a dyn Handle) -> Self {
        Self { handle, elapsed: 0.0 }
    }

    pub fn lap(&mut self) {
        if self.handle.is_profiling_enabled() {
            self.elapsed += self.handle.kernel_time();
            self.handle.reset_kernel_time();
            self.handle.accum_kernel_time(self.elapsed);
        }
    }
}
