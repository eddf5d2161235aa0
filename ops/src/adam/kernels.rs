use kiln_device::error::LaunchSnafu;
use kiln_device::{ArgsExt, Buffer, KernelArg, KernelInfo, KernelTable, Result};
use kiln_dtype::DType;
use snafu::OptionExt;

use crate::common::named_type;

pub const KERNEL_FILE: &str = "Adam.cpp";

pub fn register(table: &KernelTable) {
    table.register(KERNEL_FILE, "AdamPacked", adam_packed);
    table.register(KERNEL_FILE, "AmpAdamPacked", amp_adam_packed);
    table.register(KERNEL_FILE, "AdamUpdateStep", adam_update_step);
}

#[derive(Debug, Clone, Copy)]
struct Hyper {
    lr: f64,
    beta1: f64,
    beta2: f64,
    weight_decay: f64,
    eps: f64,
    amsgrad: bool,
    maximize: bool,
}

impl Hyper {
    fn from_args(args: &[KernelArg], first: usize) -> Result<Self> {
        Ok(Self {
            lr: args.f64(first)?,
            beta1: args.f64(first + 1)?,
            beta2: args.f64(first + 2)?,
            weight_decay: args.f64(first + 3)?,
            eps: args.f64(first + 4)?,
            amsgrad: args.bool(first + 5)?,
            maximize: args.bool(first + 6)?,
        })
    }
}

struct State<'a> {
    param: &'a Buffer,
    exp_avg: &'a Buffer,
    exp_avg_sq: &'a Buffer,
    max_exp_avg_sq: Option<&'a Buffer>,
}

/// Updates element `gid` of `out` from `input` with an already unscaled gradient.
fn adam_element(
    info: &KernelInfo,
    dtype: DType,
    gid: usize,
    mut grad: f64,
    step: i64,
    hyper: Hyper,
    input: &State<'_>,
    out: &State<'_>,
) -> Result<()> {
    let param = input.param.load_at(dtype, gid)?;
    let mut exp_avg = input.exp_avg.load_at(dtype, gid)?;
    let mut exp_avg_sq = input.exp_avg_sq.load_at(dtype, gid)?;

    let bias_correction1 = 1.0 - hyper.beta1.powi(step as i32);
    let bias_correction2 = 1.0 - hyper.beta2.powi(step as i32);

    if hyper.maximize {
        grad = -grad;
    }
    if hyper.weight_decay != 0.0 {
        grad += param * hyper.weight_decay;
    }

    exp_avg = exp_avg * hyper.beta1 + grad * (1.0 - hyper.beta1);
    exp_avg_sq = exp_avg_sq * hyper.beta2 + grad * grad * (1.0 - hyper.beta2);

    let second_moment = if hyper.amsgrad {
        let (max_in, max_out) = input
            .max_exp_avg_sq
            .zip(out.max_exp_avg_sq)
            .context(LaunchSnafu { kernel: &info.kernel_name, reason: "amsgrad needs max_exp_avg_sq" })?;
        let max = max_in.load_at(dtype, gid)?.max(exp_avg_sq);
        max_out.store_at(dtype, gid, max)?;
        max
    } else {
        exp_avg_sq
    };
    let denom = second_moment.sqrt() / bias_correction2.sqrt() + hyper.eps;
    let step_size = hyper.lr / bias_correction1;

    out.param.store_at(dtype, gid, param - step_size * exp_avg / denom)?;
    out.exp_avg.store_at(dtype, gid, exp_avg)?;
    out.exp_avg_sq.store_at(dtype, gid, exp_avg_sq)
}

/// `(param, grad, exp_avg, exp_avg_sq, max_exp_avg_sq?, step, lr, beta1, beta2,
/// weight_decay, eps, amsgrad, maximize, param_out, exp_avg_out,
/// exp_avg_sq_out, max_exp_avg_sq_out?, numel)`
fn adam_packed(info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    let dtype = named_type(info, "PARAM_TYPE")?;
    let input = State {
        param: args.buffer(0)?,
        exp_avg: args.buffer(2)?,
        exp_avg_sq: args.buffer(3)?,
        max_exp_avg_sq: args.opt_buffer(4)?,
    };
    let grad = args.buffer(1)?;
    let step = args.i64(5)?;
    let hyper = Hyper::from_args(args, 6)?;
    let out = State {
        param: args.buffer(13)?,
        exp_avg: args.buffer(14)?,
        exp_avg_sq: args.buffer(15)?,
        max_exp_avg_sq: args.opt_buffer(16)?,
    };
    let numel = args.usize(17)?;

    for gid in 0..numel {
        let g = grad.load_at(dtype, gid)?;
        adam_element(info, dtype, gid, g, step, hyper, &input, &out)?;
    }
    Ok(())
}

/// `(param, grad, exp_avg, exp_avg_sq, max_exp_avg_sq?, grad_scale?,
/// found_inf?, step_in, lr, beta1, beta2, weight_decay, eps, amsgrad,
/// maximize, param_out, exp_avg_out, exp_avg_sq_out, max_exp_avg_sq_out?, numel)`
fn amp_adam_packed(info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    let (param_type, grad_type) = (named_type(info, "PARAM_TYPE")?, named_type(info, "GRAD_TYPE")?);

    if let Some(found_inf) = args.opt_buffer(6)?
        && found_inf.load_at(DType::Bool, 0)? != 0.0
    {
        return Ok(());
    }
    let scale = match args.opt_buffer(5)? {
        Some(grad_scale) => grad_scale.load_at(DType::Float32, 0)?,
        None => 1.0,
    };
    let step_in = args
        .opt_buffer(7)?
        .context(LaunchSnafu { kernel: &info.kernel_name, reason: "mixed precision step needs a step tensor" })?;
    let step = step_in.load_at(DType::Int32, 0)? as i64 + 1;

    let input = State {
        param: args.buffer(0)?,
        exp_avg: args.buffer(2)?,
        exp_avg_sq: args.buffer(3)?,
        max_exp_avg_sq: args.opt_buffer(4)?,
    };
    let grad = args.buffer(1)?;
    let hyper = Hyper::from_args(args, 8)?;
    let out = State {
        param: args.buffer(15)?,
        exp_avg: args.buffer(16)?,
        exp_avg_sq: args.buffer(17)?,
        max_exp_avg_sq: args.opt_buffer(18)?,
    };
    let numel = args.usize(19)?;

    for gid in 0..numel {
        let g = grad.load_at(grad_type, gid)? / scale;
        adam_element(info, param_type, gid, g, step, hyper, &input, &out)?;
    }
    Ok(())
}

/// `(found_inf?, step)`: advance the step counter unless an overflow was found.
fn adam_update_step(_info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    if let Some(found_inf) = args.opt_buffer(0)?
        && found_inf.load_at(DType::Bool, 0)? != 0.0
    {
        return Ok(());
    }
    let step = args.buffer(1)?;
    step.store_at(DType::Int32, 0, step.load_at(DType::Int32, 0)? + 1.0)
}
