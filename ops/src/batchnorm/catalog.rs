//! In-process instance catalog for batchnorm forward training.
//!
//! Instances differ only in how many channels they process per vector. Each
//! one supports NHWC tensors whose channel count is a multiple of its width.

use std::sync::Arc;
use std::time::Instant;

use kiln_device::Buffer;
use kiln_dtype::DType;
use kiln_solver::error::UnsupportedArgumentSnafu;
use kiln_solver::{Argument, DeviceOpInstance, InstanceCatalog, OpInvoker, Result, StreamConfig};
use once_cell::sync::Lazy;
use snafu::OptionExt;
use tracing::trace;

use super::problem::{BatchNormProblem, BnFwdTrainingParams};

/// Shape and buffers of one call, reordered to `[n, h, w, c]`.
///
/// Probing for support uses the shape alone; buffers are bound per call.
#[derive(Debug, Clone)]
pub struct BnFwdArgs {
    pub dtype: DType,
    pub lengths: [usize; 4],
    pub strides: [usize; 4],
    pub params: Option<BnFwdTrainingParams>,
}

impl BnFwdArgs {
    /// # Panics
    ///
    /// Panics if `x` is not 4-D.
    pub fn from_problem(problem: &BatchNormProblem) -> Self {
        let (lengths, strides) = (problem.x().lengths(), problem.x().strides());
        assert_eq!(lengths.len(), 4, "batchnorm expects a 4-D tensor");
        Self {
            dtype: problem.x().dtype(),
            lengths: [lengths[0], lengths[2], lengths[3], lengths[1]],
            strides: [strides[0], strides[2], strides[3], strides[1]],
            params: None,
        }
    }

    pub fn bind(&self, params: &BnFwdTrainingParams) -> Self {
        Self { params: Some(params.clone()), ..self.clone() }
    }

    fn channels(&self) -> usize {
        self.lengths[3]
    }

    /// Statistics type: f64 tensors keep f64, everything else accumulates in f32.
    fn acc_type(&self) -> DType {
        if self.dtype == DType::Float64 { DType::Float64 } else { DType::Float32 }
    }

    fn is_packed_nhwc(&self) -> bool {
        let [_, h, w, c] = self.lengths;
        self.strides == [h * w * c, w * c, c, 1]
    }
}

#[derive(Debug, Clone, Copy)]
struct CpuBnFwdInstance {
    vector: usize,
    allow_f64: bool,
}

impl DeviceOpInstance<BnFwdArgs> for CpuBnFwdInstance {
    fn type_string(&self) -> String {
        format!("CpuBatchNormFwdNhwc<vector{}>", self.vector)
    }

    fn is_supported_argument(&self, argument: &Argument<BnFwdArgs>) -> bool {
        let args = argument.args();
        args.dtype.is_float()
            && (self.allow_f64 || args.dtype != DType::Float64)
            && args.is_packed_nhwc()
            && args.channels() % self.vector == 0
    }

    fn make_invoker(&self) -> Box<dyn OpInvoker<BnFwdArgs>> {
        Box::new(CpuBnFwdInvoker { vector: self.vector })
    }
}

struct CpuBnFwdInvoker {
    vector: usize,
}

impl OpInvoker<BnFwdArgs> for CpuBnFwdInvoker {
    fn run(&self, argument: &Argument<BnFwdArgs>, stream: StreamConfig) -> Result<f32> {
        let args = argument.args();
        let params = args.params.as_ref().context(UnsupportedArgumentSnafu { instance: argument.instance() })?;
        let start = Instant::now();

        let [n, h, w, c] = args.lengths;
        let count = n * h * w;
        let (dtype, acc) = (args.dtype, args.acc_type());
        let x = params.x.load(dtype, 0, count * c)?;
        let mut y = vec![0.0; count * c];

        for first in (0..c).step_by(self.vector) {
            for channel in first..first + self.vector {
                let column = x.iter().skip(channel).step_by(c);
                let mean = column.clone().sum::<f64>() / count as f64;
                let var = column.map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;
                let inv_std = 1.0 / (var + params.epsilon).sqrt();

                let (scale, bias) = (params.scale.load_at(dtype, channel)?, params.bias.load_at(dtype, channel)?);
                for (i, out) in y.iter_mut().enumerate().skip(channel).step_by(c) {
                    *out = (x[i] - mean) * inv_std * scale + bias;
                }

                update_statistics(params, acc, channel, mean, var, inv_std, count)?;
            }
        }
        params.y.store(dtype, 0, &y)?;

        let elapsed = if stream.time_kernel { start.elapsed().as_secs_f32() * 1000.0 } else { 0.0 };
        trace!(instance = argument.instance(), elapsed, "batchnorm forward training");
        Ok(elapsed)
    }
}

fn update_statistics(
    params: &BnFwdTrainingParams,
    acc: DType,
    channel: usize,
    mean: f64,
    var: f64,
    inv_std: f64,
    count: usize,
) -> kiln_device::Result<()> {
    let factor = params.exp_avg_factor;
    let blend = |buffer: &Buffer, value: f64| -> kiln_device::Result<()> {
        let running = buffer.load_at(acc, channel)?;
        buffer.store_at(acc, channel, (1.0 - factor) * running + factor * value)
    };

    if let Some(save_mean) = &params.save_mean {
        save_mean.store_at(acc, channel, mean)?;
    }
    if let Some(save_inv_variance) = &params.save_inv_variance {
        save_inv_variance.store_at(acc, channel, inv_std)?;
    }
    if let Some(running_mean) = &params.running_mean {
        blend(running_mean, mean)?;
    }
    if let Some(running_variance) = &params.running_variance {
        let unbiased = if count > 1 { var * count as f64 / (count - 1) as f64 } else { var };
        blend(running_variance, unbiased)?;
    }
    Ok(())
}

static CPU_BN_FWD_INSTANCES: Lazy<Vec<Arc<dyn DeviceOpInstance<BnFwdArgs>>>> = Lazy::new(|| {
    [(8, true), (4, false), (1, true)]
        .into_iter()
        .map(|(vector, allow_f64)| {
            Arc::new(CpuBnFwdInstance { vector, allow_f64 }) as Arc<dyn DeviceOpInstance<BnFwdArgs>>
        })
        .collect()
});

/// The built-in CPU instances, widest vector first.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBnFwdCatalog;

impl InstanceCatalog<BnFwdArgs> for CpuBnFwdCatalog {
    fn instances(&self) -> Vec<Arc<dyn DeviceOpInstance<BnFwdArgs>>> {
        CPU_BN_FWD_INSTANCES.clone()
    }
}
