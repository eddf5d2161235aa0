//! Shared fixtures for solver framework tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kiln_device::{ArgsExt, Buffer, CpuCompiler, CpuHandle, KernelArg, KernelInfo, KernelTable};
use kiln_dtype::DType;

use crate::*;

pub mod registry;

/// Toy problem keyed by its length.
#[derive(Debug, Clone)]
pub struct Fill {
    pub n: usize,
}

impl Problem for Fill {
    fn network_config(&self) -> NetworkConfig {
        NetworkConfig::new(format!("fill{}", self.n))
    }
}

pub struct FillParams {
    pub out: Buffer,
    pub value: f64,
    pub workspace: Option<Buffer>,
}

impl InvokeParams for FillParams {
    fn workspace(&self) -> Option<&Buffer> {
        self.workspace.as_ref()
    }
}

fn fill_kernel(_info: &KernelInfo, args: &[KernelArg]) -> kiln_device::Result<()> {
    let (out, value, n) = (args.buffer(0)?, args.f64(1)?, args.usize(2)?);
    out.store(DType::Float32, 0, &vec![value; n])
}

pub fn context() -> (ExecutionContext, Arc<CpuCompiler>) {
    let table = Arc::new(KernelTable::new());
    table.register("Fill.cpp", "Fill", fill_kernel);
    let compiler = Arc::new(CpuCompiler::new(table));
    let ctx = ExecutionContext::builder()
        .handle(Arc::new(CpuHandle::default()))
        .compiler(compiler.clone())
        .benchmark(BenchmarkConfig::builder().warmup_runs(0).timing_runs(2).build())
        .build();
    (ctx, compiler)
}

pub fn fill_info(n: usize) -> KernelInfo {
    KernelInfo::builder().kernel_file("Fill.cpp").kernel_name("Fill").local([64, 1, 1]).global([n, 1, 1]).build()
}

/// Fills the output; counts how often it was asked for a solution.
pub struct FillSolver {
    pub id: &'static str,
    pub applicable: bool,
    pub fails: bool,
    pub workspace: usize,
    pub solutions: AtomicUsize,
}

impl FillSolver {
    pub fn new(id: &'static str) -> Self {
        Self { id, applicable: true, fails: false, workspace: 0, solutions: AtomicUsize::new(0) }
    }

    pub fn inapplicable(mut self) -> Self {
        self.applicable = false;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fails = true;
        self
    }

    pub fn with_workspace(mut self, bytes: usize) -> Self {
        self.workspace = bytes;
        self
    }
}

impl Solver<Fill> for FillSolver {
    fn id(&self) -> &'static str {
        self.id
    }

    fn is_applicable(&self, _ctx: &ExecutionContext, _problem: &Fill) -> bool {
        self.applicable
    }

    fn may_need_workspace(&self) -> bool {
        self.workspace > 0
    }

    fn workspace_size(&self, _ctx: &ExecutionContext, _problem: &Fill) -> usize {
        self.workspace
    }

    fn solution(&self, _ctx: &ExecutionContext, problem: &Fill) -> Result<Solution> {
        assert!(self.applicable, "solution requested from inapplicable solver {}", self.id);
        self.solutions.fetch_add(1, Ordering::Relaxed);
        if self.fails {
            return error::UnsupportedArgumentSnafu { instance: self.id }.fail();
        }
        let n = problem.n;
        let solution = Solution::new(
            vec![fill_info(n)],
            InvokerFactory::new(move |handle, kernels, params| {
                let params = params.cast_to::<FillParams>();
                handle.run(&kernels[0], &[(&params.out).into(), params.value.into(), n.into()])?;
                Ok(())
            }),
        );
        Ok(if self.workspace > 0 { solution.with_workspace(self.workspace) } else { solution })
    }
}

/// Candidates whose invokers report fixed kernel times.
///
/// Ids are `"<ms>ms"`; `"broken"` fails to build and `"invalid"` is rejected
/// by validation.
pub struct TimedSolver {
    pub candidates: Vec<&'static str>,
}

pub fn candidate_ms(id: &str) -> Option<f32> {
    id.strip_suffix("ms")?.parse().ok()
}

impl TunableSolver<Fill> for TimedSolver {
    type Config = CandidateConfig;

    fn id(&self) -> &'static str {
        "Timed"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext, _problem: &Fill) -> bool {
        true
    }

    fn default_performance_config(&self, _ctx: &ExecutionContext, problem: &Fill) -> Result<CandidateConfig> {
        if self.candidates.is_empty() {
            return error::NoValidConfigSnafu { solver: "Timed", config: problem.network_config().to_string() }.fail();
        }
        Ok(CandidateConfig::new(self.candidates.iter().map(|id| id.to_string()).collect()))
    }

    fn is_valid_performance_config(&self, _ctx: &ExecutionContext, _problem: &Fill, config: &CandidateConfig) -> bool {
        config.is_valid_value() && config.current() != "invalid"
    }

    fn solution(&self, _ctx: &ExecutionContext, _problem: &Fill, config: &CandidateConfig) -> Result<Solution> {
        let ms = candidate_ms(config.current())
            .ok_or_else(|| error::UnsupportedArgumentSnafu { instance: config.current() }.build())?;
        Ok(Solution::new(
            Vec::new(),
            InvokerFactory::new(move |handle, _kernels, _params| {
                handle.reset_kernel_time();
                handle.accum_kernel_time(ms);
                Ok(())
            }),
        ))
    }
}
