use kiln_dtype::DType;
use kiln_solver::{Dispatcher, Policy, Problem, TensorDesc};
use proptest::prelude::*;
use test_case::test_case;

use super::*;
use crate::reduce::plan::{parallelism_size, plan_passes, required_work_items};
use crate::reduce::{self, NanPropagation, Region, SumParams, SumProblem};
use crate::{Error, Operators};

fn collapsed(lengths: &[usize], dims: &[usize]) -> Vec<usize> {
    lengths.iter().enumerate().map(|(d, &len)| if dims.contains(&d) { 1 } else { len }).collect()
}

fn sum_problem(dtype: DType, lengths: &[usize], dims: &[usize]) -> SumProblem {
    SumProblem::new(TensorDesc::new(dtype, lengths), TensorDesc::new(dtype, &collapsed(lengths, dims)), dims)
}

/// Host reference: sum of row-major `x` over `dims`.
fn reference_sum(x: &[f64], lengths: &[usize], dims: &[usize]) -> Vec<f64> {
    let out_lengths = collapsed(lengths, dims);
    let mut out = vec![0.0; out_lengths.iter().product()];
    for (flat, value) in x.iter().enumerate() {
        let (mut rem, mut out_index, mut out_stride) = (flat, 0, 1);
        for d in (0..lengths.len()).rev() {
            let coord = rem % lengths[d];
            rem /= lengths[d];
            if !dims.contains(&d) {
                out_index += coord * out_stride;
            }
            out_stride *= out_lengths[d];
        }
        out[out_index] += value;
    }
    out
}

fn run_sum(
    ops: &Operators,
    problem: &SumProblem,
    x: &[f64],
    nan_propagation: NanPropagation,
) -> (Vec<f64>, Option<kiln_device::Buffer>) {
    let ctx = ops.context();
    let x = upload(ctx, problem.x(), x);
    let y = ctx.handle().alloc(problem.y().bytes());
    let bytes = ops.sum_workspace_size(problem).unwrap();
    let workspace = (bytes > 0).then(|| ctx.handle().alloc(bytes));

    let params = SumParams { x, y: y.clone(), workspace: workspace.clone(), nan_propagation };
    assert_eq!(ops.sum(problem, params).unwrap(), "SumForward");
    (y.load(problem.y().dtype(), 0, problem.y().numel()).unwrap(), workspace)
}

#[test]
fn test_three_dim_sum_over_middle() {
    let ctx = context();
    let problem = sum_problem(DType::Float32, &[2, 3, 4], &[1]);
    let dispatcher = Dispatcher::new(reduce::solvers());

    assert_eq!(dispatcher.workspace_size(&ctx, &problem).unwrap(), 0);
    let (_, plan) = dispatcher.plan(&ctx, &problem).unwrap();
    assert_eq!(plan.kernels().len(), 1);
    assert_eq!(plan.kernels()[0].name(), "SumFwdContiguous");

    let x: Vec<f64> = (0..24).map(f64::from).collect();
    let (y, workspace) = run_sum(&Operators::new(ctx), &problem, &x, NanPropagation::NotPropagate);

    assert!(workspace.is_none());
    assert_eq!(y.len(), 8);
    assert_eq!(y, reference_sum(&x, &[2, 3, 4], &[1]));
    assert_eq!(y[0], 0.0 + 4.0 + 8.0);
}

#[test]
fn test_split_pass_stays_within_workspace() {
    let ops = Operators::new(context());
    let lengths = [4096, 16];
    let problem = sum_problem(DType::Float32, &lengths, &[0]);

    // 32 partial sums per output element.
    assert_eq!(ops.sum_workspace_size(&problem).unwrap(), 32 * 16 * 4);

    let x: Vec<f64> = (0..4096 * 16).map(|i| f64::from(i % 7)).collect();
    let (y, workspace) = run_sum(&ops, &problem, &x, NanPropagation::NotPropagate);

    assert_eq!(y, reference_sum(&x, &lengths, &[0]));
    let workspace = workspace.unwrap();
    assert!(workspace.high_water_mark() > 0);
    assert!(workspace.high_water_mark() <= workspace.size());
}

#[test]
fn test_chained_passes() {
    let ops = Operators::new(context());
    let lengths = [4, 5, 6];
    let problem = sum_problem(DType::Float64, &lengths, &[1, 0]);
    assert_eq!(ops.sum_workspace_size(&problem).unwrap(), 24 * 8);

    let x: Vec<f64> = (0..120).map(|i| f64::from(i) * 0.5).collect();
    let (y, workspace) = run_sum(&ops, &problem, &x, NanPropagation::NotPropagate);

    assert_eq!(y, reference_sum(&x, &lengths, &[0, 1]));
    let workspace = workspace.unwrap();
    assert!(workspace.high_water_mark() <= workspace.size());
}

#[test]
fn test_split_gate_and_policy_override() {
    let ctx = context();
    // A small split pass over a long extent: the library reduction wins.
    let problem = sum_problem(DType::Float32, &[1000, 64], &[0]);

    let gated = Operators::new(ctx.clone());
    let err = gated.sum_workspace_size(&problem).unwrap_err();
    assert!(matches!(err, Error::Solver { source: kiln_solver::Error::NoSolver { .. }, .. }));

    let forced = Operators::new(ctx.with_policy(Policy::builder().force_reduce_split(true).build()));
    let x: Vec<f64> = (0..64_000).map(|i| f64::from(i % 3)).collect();
    let (y, _) = run_sum(&forced, &problem, &x, NanPropagation::NotPropagate);
    assert_eq!(y, reference_sum(&x, &[1000, 64], &[0]));
}

#[test_case(&[2, 3], &[1] ; "last dimension")]
#[test_case(&[2, 3, 4], &[] ; "no dimension")]
#[test_case(&[2, 3, 4], &[0, 0] ; "repeated dimension")]
#[test_case(&[2, 3, 4], &[5] ; "out of range")]
fn test_rejected_dims(lengths: &[usize], dims: &[usize]) {
    let ops = Operators::new(context());
    let x = TensorDesc::new(DType::Float32, lengths);
    let problem = SumProblem::new(x.clone(), x, dims);
    assert!(ops.sum_workspace_size(&problem).is_err());
}

#[test]
fn test_integer_sum_is_rejected() {
    let ops = Operators::new(context());
    assert!(ops.sum_workspace_size(&sum_problem(DType::Int32, &[4, 4], &[0])).is_err());
}

#[test_case(NanPropagation::NotPropagate, 4.0 ; "skip")]
#[test_case(NanPropagation::Propagate, f64::NAN ; "propagate")]
fn test_nan_propagation(mode: NanPropagation, expected: f64) {
    let ops = Operators::new(context());
    let problem = sum_problem(DType::Float32, &[3, 1], &[0]);
    let (y, _) = run_sum(&ops, &problem, &[1.0, f64::NAN, 3.0], mode);
    if expected.is_nan() {
        assert!(y[0].is_nan());
    } else {
        assert_eq!(y[0], expected);
    }
}

#[test]
fn test_missing_workspace_is_rejected_before_launch() {
    let ctx = context();
    let problem = sum_problem(DType::Float32, &[4096, 16], &[0]);
    let ops = Operators::new(ctx.clone());
    let y = ctx.handle().alloc(problem.y().bytes());
    let params = SumParams {
        x: ctx.handle().alloc(problem.x().bytes()),
        y,
        workspace: Some(ctx.handle().alloc(16)),
        nan_propagation: NanPropagation::NotPropagate,
    };

    let err = ops.sum(&problem, params).unwrap_err();
    assert!(matches!(
        err,
        Error::Solver { source: kiln_solver::Error::WorkspaceTooSmall { required: 2048, provided: 16 }, .. }
    ));
}

fn dims_strategy() -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
    prop::collection::vec(1usize..=64, 2..=5).prop_flat_map(|lengths| {
        let candidates: Vec<usize> = (0..lengths.len() - 1).collect();
        let max = candidates.len();
        (Just(lengths), prop::sample::subsequence(candidates, 1..=max).prop_shuffle())
    })
}

proptest! {
    #[test]
    fn test_key_ignores_dim_order((lengths, dims) in dims_strategy()) {
        let mut sorted = dims.clone();
        sorted.sort_unstable();
        let shuffled = sum_problem(DType::Float32, &lengths, &dims);
        let ordered = sum_problem(DType::Float32, &lengths, &sorted);
        prop_assert_eq!(shuffled.network_config(), ordered.network_config());
    }

    #[test]
    fn test_scratch_regions_never_reused((lengths, dims) in dims_strategy(), compute_units in 1usize..=4) {
        let mut sorted = dims;
        sorted.sort_unstable();
        let plan = plan_passes(&lengths, &sorted, required_work_items(compute_units));

        let mut writes: Vec<(usize, usize)> = Vec::new();
        for (pass, launch) in plan.launches() {
            if let Region::Scratch(offset) = launch.dst() {
                let end = offset + launch.output_len(pass.output_numel);
                prop_assert!(end <= plan.scratch_elements);
                for &(start, stop) in &writes {
                    prop_assert!(end <= start || offset >= stop, "[{offset}, {end}) overlaps [{start}, {stop})");
                }
                writes.push((offset, end));
            }
        }
        prop_assert!(writes.windows(2).all(|w| w[0].0 < w[1].0));
        prop_assert_eq!(plan.passes.len(), sorted.len());
    }

    #[test]
    fn test_parallelism_bounds(required in 256usize..=8192, output_numel in 1usize..=512, reduce_size in 1usize..=100_000) {
        let p = parallelism_size(required, output_numel, reduce_size);
        prop_assert!(p.is_power_of_two());
        if p > 1 {
            prop_assert!(p * output_numel < required);
            prop_assert!((p as f64) < (reduce_size as f64).sqrt());
        }
        let next = p * 2;
        prop_assert!(next * output_numel >= required || (next as f64) >= (reduce_size as f64).sqrt());
    }
}
