//! Concurrent caches for compiled kernels and materialized plans.
//!
//! Both caches use papaya's lock-free HashMap, so several threads may resolve
//! problems against one context without extra synchronization.

use std::sync::Arc;

use kiln_device::{Compiler, Kernel, KernelInfo};
use papaya::{Compute, HashMap, Operation};
use tracing::trace;

use crate::Result;
use crate::problem::NetworkConfig;
use crate::solution::{Plan, Solution};

/// Deduplicates kernel builds by descriptor.
///
/// Descriptors that differ only in launch geometry still build separately;
/// the geometry is part of [`KernelInfo`] equality.
#[derive(Default)]
pub struct KernelCache {
    kernels: HashMap<KernelInfo, Kernel>,
}

impl std::fmt::Debug for KernelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelCache").field("len", &self.kernels.len()).finish()
    }
}

impl KernelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or compile a kernel.
    ///
    /// If several threads miss on the same descriptor concurrently, each may
    /// compile, but all of them receive the first kernel inserted.
    pub fn get_or_compile(&self, info: &KernelInfo, compiler: &dyn Compiler) -> Result<Kernel> {
        let guard = self.kernels.guard();

        if let Some(cached) = self.kernels.get(info, &guard) {
            return Ok(cached.clone());
        }

        let compiled = compiler.compile(info)?;
        match self.kernels.compute(
            info.clone(),
            |entry| match entry {
                Some((_, existing)) => Operation::Abort(existing.clone()),
                None => Operation::Insert(compiled.clone()),
            },
            &guard,
        ) {
            Compute::Inserted(_, kernel) => Ok(kernel.clone()),
            Compute::Aborted(kernel) => Ok(kernel),
            _ => Ok(compiled),
        }
    }

    /// Compile a solution through the cache and materialize its plan.
    pub fn build(&self, solution: &Solution, compiler: &dyn Compiler) -> Result<Plan> {
        let kernels = solution.kernels.iter().map(|info| self.get_or_compile(info, compiler)).collect::<Result<Vec<_>>>()?;
        Ok(solution.materialize(kernels))
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn clear(&self) {
        self.kernels.pin().clear();
    }
}

/// Cache key of a materialized plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanKey {
    pub solver: &'static str,
    pub config: NetworkConfig,
}

/// Materialized plans keyed by (solver id, network config), plus the solver
/// last selected for each network config.
#[derive(Default)]
pub struct PlanCache {
    plans: HashMap<PlanKey, Arc<Plan>>,
    selected: HashMap<NetworkConfig, &'static str>,
}

impl std::fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanCache").field("plans", &self.plans.len()).finish()
    }
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PlanKey) -> Option<Arc<Plan>> {
        self.plans.pin().get(key).cloned()
    }

    /// The plan of the solver previously selected for `config`.
    pub fn get_selected(&self, config: &NetworkConfig) -> Option<(&'static str, Arc<Plan>)> {
        let solver = *self.selected.pin().get(config)?;
        let plan = self.get(&PlanKey { solver, config: config.clone() })?;
        Some((solver, plan))
    }

    /// Store a plan and record its solver as the selection for the config.
    pub fn insert(&self, key: PlanKey, plan: Arc<Plan>) {
        trace!(solver = key.solver, config = %key.config, "caching plan");
        self.selected.pin().insert(key.config.clone(), key.solver);
        self.plans.pin().insert(key, plan);
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn clear(&self) {
        self.plans.pin().clear();
        self.selected.pin().clear();
    }
}
