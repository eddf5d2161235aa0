//! CPU bodies of the sum kernels.

use kiln_device::{ArgsExt, KernelArg, KernelInfo, KernelTable, Result};

use crate::common::float_type;

pub const KERNEL_FILE: &str = "Sum.cpp";

pub fn register(table: &KernelTable) {
    table.register(KERNEL_FILE, "SumFwdContiguous", sum_fwd_contiguous);
    table.register(KERNEL_FILE, "SumParallelFwdContiguous", sum_parallel_fwd_contiguous);
}

fn sum(values: impl Iterator<Item = f64>, propagate_nan: bool) -> f64 {
    values.filter(|value| propagate_nan || !value.is_nan()).sum()
}

/// `(src, dst, output_numel, reduce_size, inner_size, dim, propagate_nan, src_offset, dst_offset)`
fn sum_fwd_contiguous(info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    let dtype = float_type(info)?;
    let (src, dst) = (args.buffer(0)?, args.buffer(1)?);
    let (output_numel, reduce_size, inner_size) = (args.usize(2)?, args.usize(3)?, args.usize(4)?);
    let propagate_nan = args.bool(6)?;
    let (src_offset, dst_offset) = (args.usize(7)?, args.usize(8)?);

    let input = src.load(dtype, src_offset, output_numel * reduce_size)?;
    let sums: Vec<f64> = (0..output_numel)
        .map(|gid| {
            let base = (gid / inner_size) * inner_size * reduce_size + gid % inner_size;
            sum((0..reduce_size).map(|k| input[base + k * inner_size]), propagate_nan)
        })
        .collect();
    dst.store(dtype, dst_offset, &sums)
}

/// `(src, dst, output_numel, reduce_size, parallelism, inner_size, propagate_nan, src_offset, dst_offset)`
///
/// Partial sums are laid out as `[outer, parallelism, inner]`, so the
/// finalizing launch reduces them like any other dimension.
fn sum_parallel_fwd_contiguous(info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    let dtype = float_type(info)?;
    let (src, dst) = (args.buffer(0)?, args.buffer(1)?);
    let (output_numel, reduce_size, parallelism, inner_size) =
        (args.usize(2)?, args.usize(3)?, args.usize(4)?, args.usize(5)?);
    let propagate_nan = args.bool(6)?;
    let (src_offset, dst_offset) = (args.usize(7)?, args.usize(8)?);

    let input = src.load(dtype, src_offset, output_numel * reduce_size)?;
    let chunk = reduce_size.div_ceil(parallelism);
    let partials: Vec<f64> = (0..parallelism * output_numel)
        .map(|gid| {
            let outer = gid / (parallelism * inner_size);
            let slice = gid % (parallelism * inner_size) / inner_size;
            let inner = gid % inner_size;
            let start = (slice * chunk).min(reduce_size);
            let end = (start + chunk).min(reduce_size);
            let base = outer * reduce_size * inner_size + inner;
            sum((start..end).map(|k| input[base + k * inner_size]), propagate_nan)
        })
        .collect();
    dst.store(dtype, dst_offset, &partials)
}
