use bon::bon;
use kiln_device::{Buffer, Handle};
use kiln_solver::{InvokeParams, Layout, NetworkConfig, Problem, TensorDesc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Direction {
    #[strum(to_string = "fwd_training")]
    ForwardTraining,
    #[strum(to_string = "fwd_inference")]
    ForwardInference,
    #[strum(to_string = "bwd")]
    Backward,
}

/// Spatial batch normalization over a 4-D image tensor.
///
/// Lengths are always given in `[n, c, h, w]` order; `layout` says how the
/// strides arrange them in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchNormProblem {
    x: TensorDesc,
    y: TensorDesc,
    layout: Layout,
    direction: Direction,
}

#[bon]
impl BatchNormProblem {
    #[builder]
    pub fn new(
        x: TensorDesc,
        y: TensorDesc,
        #[builder(default = Layout::Nhwc)] layout: Layout,
        #[builder(default = Direction::ForwardTraining)] direction: Direction,
    ) -> Self {
        Self { x, y, layout, direction }
    }
}

impl BatchNormProblem {
    pub fn x(&self) -> &TensorDesc {
        &self.x
    }

    pub fn y(&self) -> &TensorDesc {
        &self.y
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_layout_nhwc(&self) -> bool {
        self.layout == Layout::Nhwc
    }

    /// Two spatial dimensions.
    pub fn is_2d(&self) -> bool {
        self.x.rank() == 4 && self.y.same_lengths(&self.x)
    }

    pub fn channels(&self) -> usize {
        self.x.lengths().get(1).copied().unwrap_or(0)
    }
}

impl Problem for BatchNormProblem {
    fn network_config(&self) -> NetworkConfig {
        let lengths = self.x.lengths().iter().map(usize::to_string).collect::<Vec<_>>().join("x");
        NetworkConfig::new(format!(
            "bn{}layout{}dtype{}lengths{lengths}",
            self.direction,
            self.layout,
            self.x.dtype()
        ))
    }
}

/// Buffers and scalars of one forward-training call.
///
/// Scale and bias have one element per channel in the type of `x`; the
/// saved and running statistics are f32 for half types and f64 for f64.
#[derive(Debug, Clone, bon::Builder)]
pub struct BnFwdTrainingParams {
    pub x: Buffer,
    pub y: Buffer,
    pub scale: Buffer,
    pub bias: Buffer,
    #[builder(default = 1e-5)]
    pub epsilon: f64,
    /// Weight of the current batch in the running averages.
    #[builder(default = 0.1)]
    pub exp_avg_factor: f64,
    pub running_mean: Option<Buffer>,
    pub running_variance: Option<Buffer>,
    pub save_mean: Option<Buffer>,
    pub save_inv_variance: Option<Buffer>,
}

impl InvokeParams for BnFwdTrainingParams {}

impl BnFwdTrainingParams {
    /// The same call with the running statistics moved to fresh copies.
    ///
    /// Every run blends the batch statistics into `running_mean` and
    /// `running_variance`, so benchmarking has to run on copies or the
    /// caller's averages would absorb each timed run.
    pub fn with_scratch_statistics(&self, handle: &dyn Handle) -> kiln_device::Result<Self> {
        let copy = |buffer: &Option<Buffer>| -> kiln_device::Result<Option<Buffer>> {
            buffer.as_ref().map(|buffer| Ok(handle.write_bytes(handle.read_bytes(buffer, buffer.size())?))).transpose()
        };
        Ok(Self {
            running_mean: copy(&self.running_mean)?,
            running_variance: copy(&self.running_variance)?,
            ..self.clone()
        })
    }
}
