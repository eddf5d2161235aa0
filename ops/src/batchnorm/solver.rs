use std::sync::Arc;

use kiln_solver::catalog::{find_instance, first_supported, supported_type_strings};
use kiln_solver::error::{NoValidConfigSnafu, UnsupportedArgumentSnafu};
use kiln_solver::{
    CandidateConfig, ExecutionContext, InstanceCatalog, InvokerFactory, PerformanceConfig, Problem, Result, Solution,
    StreamConfig, TunableSolver,
};
use snafu::ensure;
use tracing::debug;

use super::catalog::{BnFwdArgs, CpuBnFwdCatalog};
use super::problem::{BatchNormProblem, BnFwdTrainingParams, Direction};

/// Forward training backed by an instance catalog.
///
/// The performance config walks the catalog instances that accept the
/// problem's shape; the plan has no kernels of its own and runs the selected
/// instance directly.
#[derive(Clone)]
pub struct BnCkFwdTraining {
    catalog: Arc<dyn InstanceCatalog<BnFwdArgs>>,
}

impl std::fmt::Debug for BnCkFwdTraining {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BnCkFwdTraining").finish_non_exhaustive()
    }
}

impl Default for BnCkFwdTraining {
    fn default() -> Self {
        Self::new(Arc::new(CpuBnFwdCatalog))
    }
}

impl BnCkFwdTraining {
    pub fn new(catalog: Arc<dyn InstanceCatalog<BnFwdArgs>>) -> Self {
        Self { catalog }
    }
}

impl TunableSolver<BatchNormProblem> for BnCkFwdTraining {
    type Config = CandidateConfig;

    fn id(&self) -> &'static str {
        "BnCkFwdTraining"
    }

    fn is_applicable(&self, ctx: &ExecutionContext, problem: &BatchNormProblem) -> bool {
        if ctx.policy().disable_ck_bn_fwd_training {
            return false;
        }
        if !problem.is_layout_nhwc() || !problem.is_2d() {
            return false;
        }
        if problem.direction() != Direction::ForwardTraining {
            return false;
        }
        if !problem.x().dtype().is_float() || problem.y().dtype() != problem.x().dtype() {
            return false;
        }
        first_supported(self.catalog.as_ref(), &BnFwdArgs::from_problem(problem)).is_some()
    }

    fn default_performance_config(&self, _ctx: &ExecutionContext, problem: &BatchNormProblem) -> Result<CandidateConfig> {
        let candidates = supported_type_strings(self.catalog.as_ref(), &BnFwdArgs::from_problem(problem));
        ensure!(
            !candidates.is_empty(),
            NoValidConfigSnafu { solver: "BnCkFwdTraining", config: problem.network_config().to_string() }
        );
        debug!(candidates = candidates.len(), first = %candidates[0], "batchnorm instances");
        Ok(CandidateConfig::new(candidates))
    }

    fn is_valid_performance_config(
        &self,
        _ctx: &ExecutionContext,
        problem: &BatchNormProblem,
        config: &CandidateConfig,
    ) -> bool {
        if !config.is_valid_value() {
            return false;
        }
        find_instance(self.catalog.as_ref(), config.current()).is_some_and(|instance| {
            instance.is_supported_argument(&instance.make_argument(&BnFwdArgs::from_problem(problem)))
        })
    }

    fn solution(&self, _ctx: &ExecutionContext, problem: &BatchNormProblem, config: &CandidateConfig) -> Result<Solution> {
        let type_string = config.current();
        let instance = match find_instance(self.catalog.as_ref(), type_string) {
            Some(instance) => instance,
            None => panic!("batchnorm instance {type_string} is not in the catalog"),
        };
        let shape = BnFwdArgs::from_problem(problem);

        Ok(Solution::new(
            Vec::new(),
            InvokerFactory::new(move |handle, _kernels, params| {
                let params = params.cast_to::<BnFwdTrainingParams>();
                let argument = instance.make_argument(&shape.bind(params));
                ensure!(
                    instance.is_supported_argument(&argument),
                    UnsupportedArgumentSnafu { instance: argument.instance() }
                );

                let profiling = handle.is_profiling_enabled();
                let elapsed = instance.make_invoker().run(&argument, StreamConfig { time_kernel: profiling })?;
                if profiling {
                    handle.reset_kernel_time();
                    handle.accum_kernel_time(elapsed);
                }
                Ok(())
            }),
        ))
    }
}
