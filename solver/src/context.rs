use std::sync::Arc;

use bon::bon;
use kiln_device::{Compiler, Handle, Kernel, KernelInfo};

use crate::Result;
use crate::benchmark::BenchmarkConfig;
use crate::config::Policy;
use crate::kernel_cache::KernelCache;
use crate::solution::{Plan, Solution};

/// Everything a solver may consult besides the problem itself.
#[derive(Clone)]
pub struct ExecutionContext {
    handle: Arc<dyn Handle>,
    compiler: Arc<dyn Compiler>,
    policy: Policy,
    benchmark: BenchmarkConfig,
    kernels: Arc<KernelCache>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("compute_units", &self.handle.max_compute_units())
            .field("policy", &self.policy)
            .field("benchmark", &self.benchmark)
            .field("kernels", &self.kernels)
            .finish()
    }
}

#[bon]
impl ExecutionContext {
    #[builder]
    pub fn new(
        handle: Arc<dyn Handle>,
        compiler: Arc<dyn Compiler>,
        #[builder(default)] policy: Policy,
        #[builder(default)] benchmark: BenchmarkConfig,
    ) -> Self {
        Self { handle, compiler, policy, benchmark, kernels: Arc::new(KernelCache::new()) }
    }
}

impl ExecutionContext {
    pub fn handle(&self) -> &dyn Handle {
        self.handle.as_ref()
    }

    pub fn compiler(&self) -> &dyn Compiler {
        self.compiler.as_ref()
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn benchmark(&self) -> &BenchmarkConfig {
        &self.benchmark
    }

    pub fn kernel_cache(&self) -> &KernelCache {
        &self.kernels
    }

    /// A copy of this context with a different policy, sharing handle and caches.
    pub fn with_policy(&self, policy: Policy) -> Self {
        Self { policy, ..self.clone() }
    }

    /// The context state solvers consult when choosing and building a plan:
    /// compute units and every policy flag. Plans cached under one scope are
    /// never replayed under another.
    pub fn plan_scope(&self) -> String {
        let policy = &self.policy;
        format!(
            "cu{}det{}split{}ckbn{}",
            self.handle.max_compute_units(),
            u8::from(policy.deterministic),
            u8::from(policy.force_reduce_split),
            u8::from(!policy.disable_ck_bn_fwd_training)
        )
    }

    /// Compile one kernel, reusing earlier builds of the same descriptor.
    pub fn compile(&self, info: &KernelInfo) -> Result<Kernel> {
        self.kernels.get_or_compile(info, self.compiler.as_ref())
    }

    /// Compile all kernels of `solution` and materialize its plan.
    pub fn build(&self, solution: &Solution) -> Result<Plan> {
        self.kernels.build(solution, self.compiler.as_ref())
    }
}
