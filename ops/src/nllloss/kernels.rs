use kiln_device::error::LaunchSnafu;
use kiln_device::{ArgsExt, KernelArg, KernelInfo, KernelTable, Result};
use kiln_dtype::DType;

use crate::common::float_type;

pub const KERNEL_FILE: &str = "NLLLoss.cpp";
pub const LOCAL_SIZE: usize = 1024;

pub fn register(table: &KernelTable) {
    table.register(KERNEL_FILE, "NLLLossBackward5d", backward_5d);
}

/// `(input_grad, target, weight, output_grad, ignore_index, divisor,
/// num_classes, inner_size, input_grad_view, target_view, weight_view,
/// output_grad_view)`
///
/// Target element `gid` is `(n, r)` with `r` over the trailing dimensions;
/// its class row in the input gradient is `(n, c, r)` for every class `c`.
fn backward_5d(info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
    let dtype = float_type(info)?;
    let (input_grad, target) = (args.buffer(0)?, args.buffer(1)?);
    let (weight, output_grad) = (args.buffer(2)?, args.buffer(3)?);
    let (ignore_index, divisor) = (args.i64(4)?, f64::from(args.f32(5)?));
    let (num_classes, inner_size) = (args.usize(6)?, args.usize(7)?);
    let (ig_view, t_view, w_view, og_view) = (args.view(8)?, args.view(9)?, args.view(10)?, args.view(11)?);

    let grad = output_grad.load_at(dtype, og_view.offset_of(0))? / divisor;

    for gid in 0..t_view.numel() {
        let class = target.load_at(DType::Int64, t_view.offset_of(gid))? as i64;
        let hit = if class == ignore_index {
            None
        } else if (0..num_classes as i64).contains(&class) {
            Some(class as usize)
        } else {
            return LaunchSnafu {
                kernel: &info.kernel_name,
                reason: format!("target {class} is outside 0..{num_classes}"),
            }
            .fail();
        };
        let value = match hit {
            Some(class) => -weight.load_at(dtype, w_view.offset_of(class))? * grad,
            None => 0.0,
        };

        let (n, r) = (gid / inner_size, gid % inner_size);
        for c in 0..num_classes {
            let index = (n * num_classes + c) * inner_size + r;
            input_grad.store_at(dtype, ig_view.offset_of(index), if hit == Some(c) { value } else { 0.0 })?;
        }
    }
    Ok(())
}
