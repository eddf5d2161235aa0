use kiln_device::error::LaunchSnafu;
use kiln_device::{BuildParams, KernelArg, KernelInfo};
use kiln_solver::{ExecutionContext, InvokerFactory, KernelTimer, Result, Solution, Solver};
use snafu::OptionExt;

use super::kernels::KERNEL_FILE;
use super::problem::{AdamParams, AdamProblem};

const LOCAL_SIZE: usize = 512;

/// Elementwise Adam over packed tensors.
///
/// Launch geometry depends on the parameter count and is set by the invoker,
/// so one plan serves every tensor size.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdamPacked;

impl Solver<AdamProblem> for AdamPacked {
    fn id(&self) -> &'static str {
        "AdamPacked"
    }

    fn is_applicable(&self, _ctx: &ExecutionContext, problem: &AdamProblem) -> bool {
        problem.is_all_packed() && problem.is_right_length() && problem.is_right_type()
    }

    fn solution(&self, _ctx: &ExecutionContext, problem: &AdamProblem) -> Result<Solution> {
        let build_params = BuildParams::new()
            .with("PARAM_TYPE", problem.param().dtype().kernel_type())
            .with("GRAD_TYPE", problem.grad().dtype().kernel_type());
        let kernel = |name: &str| {
            KernelInfo::builder()
                .kernel_file(KERNEL_FILE)
                .kernel_name(name)
                .build_params(build_params.clone())
                .local([1, 1, 1])
                .global([1, 1, 1])
                .build()
        };

        if !problem.is_amp() {
            return Ok(Solution::new(
                vec![kernel("AdamPacked")],
                InvokerFactory::new(|handle, kernels, params| {
                    let params = params.cast_to::<AdamParams>();
                    let numel = params.param.desc.numel();
                    let adam = kernels[0].with_grid([LOCAL_SIZE, 1, 1], [numel, 1, 1]);
                    handle.run(
                        &adam,
                        &[
                            (&params.param.buffer).into(),
                            (&params.grad).into(),
                            (&params.exp_avg).into(),
                            (&params.exp_avg_sq).into(),
                            params.max_exp_avg_sq.as_ref().into(),
                            params.step.into(),
                            params.lr.into(),
                            params.beta1.into(),
                            params.beta2.into(),
                            params.weight_decay.into(),
                            params.eps.into(),
                            params.amsgrad.into(),
                            params.maximize.into(),
                            params.param_out().into(),
                            params.exp_avg_out().into(),
                            params.exp_avg_sq_out().into(),
                            params.max_exp_avg_sq_out().into(),
                            numel.into(),
                        ],
                    )?;
                    Ok(())
                }),
            ));
        }

        let mut kernels = vec![kernel("AmpAdamPacked")];
        if problem.exist_step_out() {
            kernels.push(kernel("AdamUpdateStep"));
        }

        Ok(Solution::new(
            kernels,
            InvokerFactory::new(|handle, kernels, params| {
                let params = params.cast_to::<AdamParams>();
                let numel = params.param.desc.numel();
                let adam = kernels[0].with_grid([LOCAL_SIZE, 1, 1], [numel, 1, 1]);
                let update_step = match kernels.get(1) {
                    Some(kernel) => Some((
                        kernel,
                        params
                            .step_out
                            .as_ref()
                            .context(LaunchSnafu { kernel: kernel.name(), reason: "plan expects a step_out tensor" })?,
                    )),
                    None => None,
                };
                let mut timer = KernelTimer::new(handle);

                let args: [KernelArg; 20] = [
                    (&params.param.buffer).into(),
                    (&params.grad).into(),
                    (&params.exp_avg).into(),
                    (&params.exp_avg_sq).into(),
                    params.max_exp_avg_sq.as_ref().into(),
                    params.grad_scale.as_ref().into(),
                    params.found_inf.as_ref().into(),
                    params.step_in.as_ref().into(),
                    params.lr.into(),
                    params.beta1.into(),
                    params.beta2.into(),
                    params.weight_decay.into(),
                    params.eps.into(),
                    params.amsgrad.into(),
                    params.maximize.into(),
                    params.param_out().into(),
                    params.exp_avg_out().into(),
                    params.exp_avg_sq_out().into(),
                    params.max_exp_avg_sq_out().into(),
                    numel.into(),
                ];
                handle.run(&adam, &args)?;
                timer.lap();

                if let Some((update_step, step_out)) = update_step {
                    handle.run(update_step, &[params.found_inf.as_ref().into(), step_out.into()])?;
                    timer.lap();
                }
                Ok(())
            }),
        ))
    }
}
