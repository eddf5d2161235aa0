use kiln_device::HandleExt;
use kiln_dtype::DType;
use kiln_solver::{Dispatcher, Problem, TensorDesc};

use super::*;
use crate::adam::{self, AdamParams, AdamProblem};
use crate::{Error, Operators};

fn problem(numel: usize, grad: DType, amp: bool, step_out: bool) -> AdamProblem {
    let desc = TensorDesc::new(DType::Float32, &[numel]);
    AdamProblem::builder()
        .param(desc.clone())
        .grad(TensorDesc::new(grad, &[numel]))
        .exp_avg(desc.clone())
        .exp_avg_sq(desc)
        .amp(amp)
        .step_out(step_out)
        .build()
}

struct State {
    param: crate::TensorArg,
    grad: kiln_device::Buffer,
    exp_avg: kiln_device::Buffer,
    exp_avg_sq: kiln_device::Buffer,
}

fn state(ops: &Operators, numel: usize, grad_type: DType, grad: f64) -> State {
    let ctx = ops.context();
    let desc = TensorDesc::new(DType::Float32, &[numel]);
    State {
        param: tensor(ctx, desc.clone(), &vec![1.0; numel]),
        grad: upload(ctx, &TensorDesc::new(grad_type, &[numel]), &vec![grad; numel]),
        exp_avg: ctx.handle().alloc(desc.bytes()),
        exp_avg_sq: ctx.handle().alloc(desc.bytes()),
    }
}

#[test]
fn test_first_step_moves_by_lr() {
    let ops = Operators::new(context());
    let numel = 1000;
    let s = state(&ops, numel, DType::Float32, 0.5);
    let params = AdamParams::builder()
        .param(s.param.clone())
        .grad(s.grad)
        .exp_avg(s.exp_avg.clone())
        .exp_avg_sq(s.exp_avg_sq.clone())
        .lr(0.1)
        .build();

    assert_eq!(ops.adam(&problem(numel, DType::Float32, false, false), params).unwrap(), "AdamPacked");

    // Past the first 512-wide work group too.
    assert_close(&download(&s.param), &vec![0.9; numel], 1e-5);
    assert_close(&s.exp_avg.load(DType::Float32, 0, numel).unwrap(), &vec![0.05; numel], 1e-7);
    assert_close(&s.exp_avg_sq.load(DType::Float32, 0, numel).unwrap(), &vec![0.00025; numel], 1e-8);
}

#[test]
fn test_maximize_and_separate_outputs() {
    let ops = Operators::new(context());
    let ctx = ops.context();
    let s = state(&ops, 4, DType::Float32, 0.5);
    let param_out = ctx.handle().alloc(16);
    let params = AdamParams::builder()
        .param(s.param.clone())
        .grad(s.grad)
        .exp_avg(s.exp_avg)
        .exp_avg_sq(s.exp_avg_sq)
        .param_out(param_out.clone())
        .lr(0.1)
        .maximize(true)
        .build();

    ops.adam(&problem(4, DType::Float32, false, false), params).unwrap();

    assert_close(&param_out.load(DType::Float32, 0, 4).unwrap(), &[1.1; 4], 1e-5);
    assert_eq!(download(&s.param), vec![1.0; 4]);
}

#[test]
fn test_amp_unscales_and_advances_step() {
    let ops = Operators::new(context());
    let ctx = ops.context();
    let s = state(&ops, 8, DType::Float16, 1.0);
    let step = ctx.handle().write(&[0i32]);
    let params = AdamParams::builder()
        .param(s.param.clone())
        .grad(s.grad)
        .exp_avg(s.exp_avg)
        .exp_avg_sq(s.exp_avg_sq)
        .grad_scale(ctx.handle().write(&[2.0f32]))
        .found_inf(ctx.handle().write(&[false]))
        .step_in(step.clone())
        .step_out(step.clone())
        .lr(0.1)
        .build();

    ops.adam(&problem(8, DType::Float16, true, true), params).unwrap();

    assert_close(&download(&s.param), &[0.9; 8], 1e-5);
    assert_eq!(ctx.handle().read::<i32>(&step, 1).unwrap(), vec![1]);
}

#[test]
fn test_amp_found_inf_skips_everything() {
    let ops = Operators::new(context());
    let ctx = ops.context();
    let s = state(&ops, 8, DType::Float16, 1.0);
    let step = ctx.handle().write(&[3i32]);
    let params = AdamParams::builder()
        .param(s.param.clone())
        .grad(s.grad)
        .exp_avg(s.exp_avg)
        .exp_avg_sq(s.exp_avg_sq)
        .found_inf(ctx.handle().write(&[true]))
        .step_in(step.clone())
        .step_out(step.clone())
        .build();

    ops.adam(&problem(8, DType::Float16, true, true), params).unwrap();

    assert_eq!(download(&s.param), vec![1.0; 8]);
    assert_eq!(ctx.handle().read::<i32>(&step, 1).unwrap(), vec![3]);
}

#[test]
fn test_declared_step_out_must_be_bound() {
    let ops = Operators::new(context());
    let ctx = ops.context();
    let s = state(&ops, 8, DType::Float16, 1.0);
    let params = AdamParams::builder()
        .param(s.param)
        .grad(s.grad)
        .exp_avg(s.exp_avg)
        .exp_avg_sq(s.exp_avg_sq)
        .found_inf(ctx.handle().write(&[false]))
        .step_in(ctx.handle().write(&[0i32]))
        .build();
    let param = params.param.clone();

    let err = ops.adam(&problem(8, DType::Float16, true, true), params).unwrap_err();
    assert!(matches!(
        err,
        Error::Solver { source: kiln_solver::Error::Device { source: kiln_device::Error::Launch { .. } }, .. }
    ));
    assert_eq!(download(&param), vec![1.0; 8]);
}

#[test]
fn test_step_kernel_only_with_step_out() {
    let ctx = context();
    let dispatcher = Dispatcher::new(adam::solvers());

    let (_, with_step) = dispatcher.plan(&ctx, &problem(8, DType::Float16, true, true)).unwrap();
    let (_, without_step) = dispatcher.plan(&ctx, &problem(8, DType::Float16, true, false)).unwrap();
    let (_, plain) = dispatcher.plan(&ctx, &problem(8, DType::Float32, false, false)).unwrap();

    assert_eq!(with_step.kernels().iter().map(|k| k.name()).collect::<Vec<_>>(), ["AmpAdamPacked", "AdamUpdateStep"]);
    assert_eq!(without_step.kernels().len(), 1);
    assert_eq!(plain.kernels()[0].name(), "AdamPacked");
}

#[test]
fn test_key_ignores_numel() {
    assert_eq!(
        problem(8, DType::Float32, false, false).network_config(),
        problem(4096, DType::Float32, false, false).network_config()
    );
    assert_ne!(
        problem(8, DType::Float32, false, false).network_config(),
        problem(8, DType::Float32, true, false).network_config()
    );
}

#[test]
fn test_amsgrad_needs_max_state() {
    let ops = Operators::new(context());
    let s = state(&ops, 4, DType::Float32, 0.5);
    let params = AdamParams::builder()
        .param(s.param)
        .grad(s.grad)
        .exp_avg(s.exp_avg)
        .exp_avg_sq(s.exp_avg_sq)
        .amsgrad(true)
        .build();

    let err = ops.adam(&problem(4, DType::Float32, false, false), params).unwrap_err();
    assert!(matches!(err, Error::Solver { source: kiln_solver::Error::Device { .. }, .. }));
}

#[test]
fn test_plain_step_requires_matching_grad_type() {
    let ops = Operators::new(context());
    let s = state(&ops, 4, DType::Float16, 0.5);
    let params = AdamParams::builder().param(s.param).grad(s.grad).exp_avg(s.exp_avg).exp_avg_sq(s.exp_avg_sq).build();

    let err = ops.adam(&problem(4, DType::Float16, false, false), params).unwrap_err();
    assert!(matches!(err, Error::Solver { source: kiln_solver::Error::NoSolver { .. }, .. }));
}

#[test]
fn test_strided_param_is_rejected() {
    let ctx = context();
    let strided = TensorDesc::with_strides(DType::Float32, &[4], &[2]);
    let problem = AdamProblem::builder()
        .param(strided.clone())
        .grad(strided.clone())
        .exp_avg(strided.clone())
        .exp_avg_sq(strided)
        .build();
    assert!(Dispatcher::new(adam::solvers()).plan(&ctx, &problem).is_err());
}
