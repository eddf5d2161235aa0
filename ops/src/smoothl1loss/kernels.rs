//! CPU bodies of the SmoothL1 kernels.
//!
//! Losses are accumulated in f32 whatever the tensor type, as on device.

use kiln_device::{ArgsExt, KernelArg, KernelInfo, KernelTable, Result};
use kiln_dtype::DType;

use crate::common::{float_type, int_param, named_type};

pub const KERNEL_FILE: &str = "SmoothL1Loss.cpp";

const REDUCE_FAN_IN: usize = 256;

pub fn register(table: &KernelTable) {
    table.register(KERNEL_FILE, "SmoothL1LossUnreducedForwardContiguous", unreduced_forward_contiguous);
    table.register(KERNEL_FILE, "SmoothL1LossUnreducedForward5d", unreduced_forward_5d);
    table.register(KERNEL_FILE, "SmoothL1LossForward", reduced_forward);
    table.register(KERNEL_FILE, "ReduceSumFLOATACCUM", reduce_sum_accum);
    table.register(KERNEL_FILE, "ReduceSum", reduce_sum);
    table.register(KERNEL_FILE, "SmoothL1LossBackward", backward);
}

fn loss(input: f64, target: f64, beta: f64) -> f64 {
    let diff = (input - target).abs();
    if diff < beta { 0.5 * diff * diff / beta } else { diff - 0.5 * beta }
}

fn loss_grad(input: f64, target: f64, beta: f64, output_grad: f64) -> f64 {
    let sub = input - target;
    if sub.abs() < beta { sub / beta * output_grad } else { sub.signum() * output_grad }
}

/// `(input, target, output, beta, size)`
fn unreduced_forward_contiguous(info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    let (input_type, output_type) = (named_type(info, "INPUT_TYPE")?, named_type(info, "OUTPUT_TYPE")?);
    let (input, target, output) = (args.buffer(0)?, args.buffer(1)?, args.buffer(2)?);
    let (beta, size) = (f64::from(args.f32(3)?), args.usize(4)?);

    let (i, t) = (input.load(input_type, 0, size)?, target.load(input_type, 0, size)?);
    let losses: Vec<f64> = i.iter().zip(&t).map(|(&i, &t)| loss(i, t, beta)).collect();
    output.store(output_type, 0, &losses)
}

/// `(input, target, output, beta, input_view, target_view, output_view)`
fn unreduced_forward_5d(info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    let (input_type, output_type) = (named_type(info, "INPUT_TYPE")?, named_type(info, "OUTPUT_TYPE")?);
    let (input, target, output) = (args.buffer(0)?, args.buffer(1)?, args.buffer(2)?);
    let beta = f64::from(args.f32(3)?);
    let (i_view, t_view, o_view) = (args.view(4)?, args.view(5)?, args.view(6)?);

    for gid in 0..i_view.numel() {
        let i = input.load_at(input_type, i_view.offset_of(gid))?;
        let t = target.load_at(input_type, t_view.offset_of(gid))?;
        output.store_at(output_type, o_view.offset_of(gid), loss(i, t, beta))?;
    }
    Ok(())
}

/// `(input, target, workspace, beta, divisor, input_view, target_view)`
///
/// Writes `loss / divisor` per element to the start of the workspace as f32.
fn reduced_forward(info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    let dtype = float_type(info)?;
    int_param(info, "REDUCTION_TYPE")?;
    let (input, target, workspace) = (args.buffer(0)?, args.buffer(1)?, args.buffer(2)?);
    let (beta, divisor) = (f64::from(args.f32(3)?), f64::from(args.f32(4)?));
    let (i_view, t_view) = (args.view(5)?, args.view(6)?);

    let losses = (0..i_view.numel())
        .map(|gid| {
            let i = input.load_at(dtype, i_view.offset_of(gid))?;
            let t = target.load_at(dtype, t_view.offset_of(gid))?;
            Ok(loss(i, t, beta) / divisor)
        })
        .collect::<Result<Vec<_>>>()?;
    workspace.store(DType::Float32, 0, &losses)
}

/// `(src, src_offset, dst, dst_offset, size)`: one f32 sum per 256 inputs.
fn reduce_sum_accum(_info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    let (src, src_offset, dst, dst_offset, size) =
        (args.buffer(0)?, args.usize(1)?, args.buffer(2)?, args.usize(3)?, args.usize(4)?);

    let values = src.load(DType::Float32, src_offset, size)?;
    let sums: Vec<f64> = values.chunks(REDUCE_FAN_IN).map(|chunk| chunk.iter().map(|&v| v as f32).sum::<f32>() as f64).collect();
    dst.store(DType::Float32, dst_offset, &sums)
}

/// `(src, src_offset, output, size, output_view)`: final sum into the output type.
fn reduce_sum(info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    let dtype = float_type(info)?;
    let (src, src_offset, output, size, o_view) =
        (args.buffer(0)?, args.usize(1)?, args.buffer(2)?, args.usize(3)?, args.view(4)?);

    let total: f32 = src.load(DType::Float32, src_offset, size)?.iter().map(|&v| v as f32).sum();
    output.store_at(dtype, o_view.offset_of(0), f64::from(total))
}

/// `(input, target, output_grad, input_grad?, target_grad?, beta, divisor,
/// input_view, target_view, output_grad_view, input_grad_view, target_grad_view)`
///
/// A reduced forward pass has a single output gradient shared by all elements.
fn backward(info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    let dtype = float_type(info)?;
    let reduced = int_param(info, "REDUCTION_TYPE")? != 0;
    let (input, target, output_grad) = (args.buffer(0)?, args.buffer(1)?, args.buffer(2)?);
    let (input_grad, target_grad) = (args.opt_buffer(3)?, args.opt_buffer(4)?);
    let (beta, divisor) = (f64::from(args.f32(5)?), f64::from(args.f32(6)?));
    let (i_view, t_view, do_view, di_view, dt_view) =
        (args.view(7)?, args.view(8)?, args.view(9)?, args.view(10)?, args.view(11)?);

    let shared_grad = if reduced { Some(output_grad.load_at(dtype, do_view.offset_of(0))?) } else { None };

    for gid in 0..i_view.numel() {
        let i = input.load_at(dtype, i_view.offset_of(gid))?;
        let t = target.load_at(dtype, t_view.offset_of(gid))?;
        let d_o = match shared_grad {
            Some(grad) => grad,
            None => output_grad.load_at(dtype, do_view.offset_of(gid))?,
        };
        let grad = loss_grad(i, t, beta, d_o) / divisor;

        if let Some(input_grad) = input_grad {
            input_grad.store_at(dtype, di_view.offset_of(gid), grad)?;
        }
        if let Some(target_grad) = target_grad {
            target_grad.store_at(dtype, dt_view.offset_of(gid), -grad)?;
        }
    }
    Ok(())
}
