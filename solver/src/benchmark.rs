//! Plan benchmarking for performance-config search.
//!
//! Timings come from the device handle's profiling timer rather than host
//! clocks, so multi-launch invokers report the sum of their kernels.

use std::time::Duration;

use bon::bon;
use kiln_device::Handle;

use crate::Result;
use crate::invoke_params::AnyInvokeParams;
use crate::solution::Plan;

/// Configuration for plan benchmarking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkConfig {
    /// Number of warmup runs (not timed).
    pub warmup_runs: usize,
    /// Number of timing runs.
    pub timing_runs: usize,
    /// Whether to return minimum time (true) or mean (false).
    pub take_minimum: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self { warmup_runs: 1, timing_runs: 3, take_minimum: true }
    }
}

#[bon]
impl BenchmarkConfig {
    #[builder]
    pub fn new(
        #[builder(default = 1)] warmup_runs: usize,
        #[builder(default = 3)] timing_runs: usize,
        #[builder(default = true)] take_minimum: bool,
    ) -> Self {
        Self { warmup_runs, timing_runs, take_minimum }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `KILN_SEARCH_WARMUP` - Untimed runs per candidate (default: 1)
    /// * `KILN_SEARCH_RUNS` - Timed runs per candidate (default: 3)
    /// * `KILN_SEARCH_MEAN` - Rank candidates by mean instead of minimum if set
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let warmup_runs = var("KILN_SEARCH_WARMUP").and_then(|s| s.parse().ok()).unwrap_or(1);
        let timing_runs = var("KILN_SEARCH_RUNS").and_then(|s| s.parse().ok()).unwrap_or(3);
        let take_minimum = var("KILN_SEARCH_MEAN").is_none();
        Self { warmup_runs, timing_runs: timing_runs.max(1), take_minimum }
    }
}

/// Result of plan benchmarking.
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    /// Minimum execution time.
    pub min: Duration,
    /// Mean execution time.
    pub mean: Duration,
    /// All timing measurements.
    pub runs: Vec<Duration>,
}

impl BenchmarkResult {
    /// Get the timing value based on config preference.
    pub fn timing(&self, take_minimum: bool) -> Duration {
        if take_minimum { self.min } else { self.mean }
    }
}

/// Run `plan` repeatedly with profiling enabled and collect kernel times.
///
/// The handle's profiling switch is restored afterwards, even on failure.
pub fn benchmark_plan(
    handle: &dyn Handle,
    plan: &Plan,
    params: &AnyInvokeParams,
    config: &BenchmarkConfig,
) -> Result<BenchmarkResult> {
    let was_profiling = handle.is_profiling_enabled();
    handle.enable_profiling(true);
    let result = measure(handle, plan, params, config);
    handle.enable_profiling(was_profiling);
    result
}

fn measure(handle: &dyn Handle, plan: &Plan, params: &AnyInvokeParams, config: &BenchmarkConfig) -> Result<BenchmarkResult> {
    let invoker = plan.invoker();

    for _ in 0..config.warmup_runs {
        invoker.invoke(handle, params)?;
    }

    let mut runs = Vec::with_capacity(config.timing_runs);
    for _ in 0..config.timing_runs {
        handle.reset_kernel_time();
        invoker.invoke(handle, params)?;
        runs.push(Duration::from_secs_f64(f64::from(handle.kernel_time().max(0.0)) / 1000.0));
    }

    let min = runs.iter().copied().min().unwrap_or(Duration::ZERO);
    let total: Duration = runs.iter().sum();
    let mean = total / runs.len().max(1) as u32;

    Ok(BenchmarkResult { min, mean, runs })
}
