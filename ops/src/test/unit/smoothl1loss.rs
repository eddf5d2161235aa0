use kiln_device::HandleExt;
use kiln_dtype::DType;
use kiln_solver::{Dispatcher, Problem, TensorDesc};
use test_case::test_case;

use super::*;
use crate::smoothl1loss::{
    self, Reduction, SmoothL1BackwardParams, SmoothL1BackwardProblem, SmoothL1ForwardParams, SmoothL1ForwardProblem,
};
use crate::{Error, Operators, TensorArg};

const INPUT: [f64; 4] = [0.0, 0.5, 2.0, -3.0];
const LOSS: [f64; 4] = [0.0, 0.125, 1.5, 2.5];

fn forward_params(input: TensorArg, target: TensorArg, output: TensorArg) -> SmoothL1ForwardParams {
    SmoothL1ForwardParams { input, target, output, beta: 1.0, workspace: None }
}

#[test]
fn test_unreduced_contiguous() {
    let ops = Operators::new(context());
    let ctx = ops.context();
    let desc = TensorDesc::new(DType::Float32, &[2, 2]);
    let (input, target, output) =
        (tensor(ctx, desc.clone(), &INPUT), tensor(ctx, desc.clone(), &[0.0; 4]), zeros(ctx, desc.clone()));
    let problem = SmoothL1ForwardProblem::new(desc.clone(), desc.clone(), desc, Reduction::None);

    let solver = ops.smoothl1_forward(&problem, forward_params(input, target, output.clone())).unwrap();

    assert_eq!(solver, "SmoothL1LossUnreducedForwardContiguous");
    assert_close(&download(&output), &LOSS, 1e-6);
}

#[test]
fn test_unreduced_strided_input() {
    let ops = Operators::new(context());
    let ctx = ops.context();
    let contiguous = TensorDesc::new(DType::Float32, &[2, 2]);
    let transposed = TensorDesc::with_strides(DType::Float32, &[2, 2], &[1, 2]);
    // Column-major storage of INPUT.
    let input = tensor(ctx, transposed.clone(), &[0.0, 2.0, 0.5, -3.0]);
    let (target, output) = (tensor(ctx, contiguous.clone(), &[0.0; 4]), zeros(ctx, contiguous.clone()));
    let problem = SmoothL1ForwardProblem::new(transposed, contiguous.clone(), contiguous, Reduction::None);

    let solver = ops.smoothl1_forward(&problem, forward_params(input, target, output.clone())).unwrap();

    assert_eq!(solver, "SmoothL1LossUnreducedForward5d");
    assert_close(&download(&output), &LOSS, 1e-6);
}

#[test]
fn test_unreduced_half_precision() {
    let ops = Operators::new(context());
    let ctx = ops.context();
    let desc = TensorDesc::new(DType::Float16, &[4]);
    let values: Vec<half::f16> = INPUT.iter().map(|&v| half::f16::from_f64(v)).collect();
    let input = TensorArg::new(desc.clone(), ctx.handle().write(&values));
    let (target, output) = (zeros(ctx, desc.clone()), zeros(ctx, desc.clone()));
    let problem = SmoothL1ForwardProblem::new(desc.clone(), desc.clone(), desc, Reduction::None);

    ops.smoothl1_forward(&problem, forward_params(input, target, output.clone())).unwrap();

    let loss: Vec<f64> = ctx.handle().read::<half::f16>(&output.buffer, 4).unwrap().into_iter().map(f64::from).collect();
    assert_close(&loss, &LOSS, 1e-3);
}

#[test_case(Reduction::Sum, 900.0 ; "sum")]
#[test_case(Reduction::Mean, 1.5 ; "mean")]
fn test_reduced_forward(reduction: Reduction, expected: f64) {
    let ops = Operators::new(context());
    let ctx = ops.context();
    let desc = TensorDesc::new(DType::Float32, &[2, 300]);
    let scalar = TensorDesc::new(DType::Float32, &[1]);
    let problem = SmoothL1ForwardProblem::new(desc.clone(), desc.clone(), scalar.clone(), reduction);

    // Two regions: 600 losses and 3 partial sums, each rounded up to 256 bytes.
    let bytes = ops.smoothl1_forward_workspace_size(&problem).unwrap();
    assert_eq!(bytes, 2560 + 256);

    let workspace = ctx.handle().alloc(bytes);
    let output = zeros(ctx, scalar);
    let params = SmoothL1ForwardParams {
        input: tensor(ctx, desc.clone(), &[2.0; 600]),
        target: zeros(ctx, desc),
        output: output.clone(),
        beta: 1.0,
        workspace: Some(workspace.clone()),
    };

    assert_eq!(ops.smoothl1_forward(&problem, params).unwrap(), "SmoothL1LossReducedForward5d");
    assert_close(&download(&output), &[expected], 1e-4);
    assert!(workspace.high_water_mark() <= workspace.size());
}

#[test]
fn test_reduced_plan_chains_reductions() {
    let ctx = context();
    let desc = TensorDesc::new(DType::Float32, &[70_000]);
    let problem =
        SmoothL1ForwardProblem::new(desc.clone(), desc, TensorDesc::new(DType::Float32, &[1]), Reduction::Sum);
    let (_, plan) = Dispatcher::new(smoothl1loss::forward_solvers()).plan(&ctx, &problem).unwrap();

    // 70000 -> 274 -> 2, then the final sum.
    let names: Vec<&str> = plan.kernels().iter().map(|kernel| kernel.name()).collect();
    assert_eq!(names, ["SmoothL1LossForward", "ReduceSumFLOATACCUM", "ReduceSumFLOATACCUM", "ReduceSum"]);
}

#[test]
fn test_reduced_output_must_be_scalar() {
    let ops = Operators::new(context());
    let desc = TensorDesc::new(DType::Float32, &[4]);
    let problem = SmoothL1ForwardProblem::new(desc.clone(), desc.clone(), desc, Reduction::Sum);
    let err = ops.smoothl1_forward_workspace_size(&problem).unwrap_err();
    assert!(matches!(err, Error::Solver { source: kiln_solver::Error::NoSolver { .. }, .. }));
}

#[test]
fn test_reduced_f64_is_rejected() {
    let ops = Operators::new(context());
    let desc = TensorDesc::new(DType::Float64, &[4]);
    let problem =
        SmoothL1ForwardProblem::new(desc.clone(), desc, TensorDesc::new(DType::Float64, &[1]), Reduction::Mean);
    assert!(ops.smoothl1_forward_workspace_size(&problem).is_err());
}

#[test]
fn test_keys_distinguish_reduction() {
    let desc = TensorDesc::new(DType::Float32, &[8]);
    let scalar = TensorDesc::new(DType::Float32, &[1]);
    let sum = SmoothL1ForwardProblem::new(desc.clone(), desc.clone(), scalar.clone(), Reduction::Sum);
    let mean = SmoothL1ForwardProblem::new(desc.clone(), desc.clone(), scalar, Reduction::Mean);
    let none = SmoothL1ForwardProblem::new(desc.clone(), desc.clone(), desc, Reduction::None);

    assert_ne!(sum.network_config(), mean.network_config());
    assert!(none.network_config().as_str().starts_with("smoothl1loss_unreduced_fwd"));
}

struct Backward {
    input_grad: Option<TensorArg>,
    target_grad: Option<TensorArg>,
    solver: &'static str,
}

fn run_backward(reduction: Reduction, output_grad: &[f64], with_input: bool, with_target: bool) -> Backward {
    let ops = Operators::new(context());
    let ctx = ops.context();
    let desc = TensorDesc::new(DType::Float32, &[4]);
    let grad_desc = TensorDesc::new(DType::Float32, &[output_grad.len()]);
    let input_grad = with_input.then(|| tensor(ctx, desc.clone(), &[9.0; 4]));
    let target_grad = with_target.then(|| tensor(ctx, desc.clone(), &[9.0; 4]));

    let problem = SmoothL1BackwardProblem::new(
        desc.clone(),
        desc.clone(),
        grad_desc.clone(),
        input_grad.as_ref().map(|g| g.desc.clone()),
        target_grad.as_ref().map(|g| g.desc.clone()),
        reduction,
    );
    let params = SmoothL1BackwardParams {
        input: tensor(ctx, desc.clone(), &INPUT),
        target: zeros(ctx, desc),
        output_grad: tensor(ctx, grad_desc, output_grad),
        input_grad: input_grad.clone(),
        target_grad: target_grad.clone(),
        beta: 1.0,
    };
    let solver = ops.smoothl1_backward(&problem, params).unwrap();
    Backward { input_grad, target_grad, solver }
}

#[test]
fn test_backward_mean() {
    let result = run_backward(Reduction::Mean, &[1.0], true, true);

    assert_eq!(result.solver, "SmoothL1LossBackward5d");
    assert_close(&download(&result.input_grad.unwrap()), &[0.0, 0.125, 0.25, -0.25], 1e-6);
    assert_close(&download(&result.target_grad.unwrap()), &[0.0, -0.125, -0.25, 0.25], 1e-6);
}

#[test]
fn test_backward_target_grad_only() {
    let result = run_backward(Reduction::Sum, &[2.0], false, true);
    assert!(result.input_grad.is_none());
    assert_close(&download(&result.target_grad.unwrap()), &[0.0, -1.0, -2.0, 2.0], 1e-6);
}

#[test]
fn test_backward_unreduced_uses_elementwise_grad() {
    let result = run_backward(Reduction::None, &[1.0, 2.0, 3.0, 4.0], true, false);
    assert_close(&download(&result.input_grad.unwrap()), &[0.0, 1.0, 3.0, -4.0], 1e-6);
}
