use std::fmt::Write;

use kiln_device::Buffer;
use kiln_solver::{Dims, InvokeParams, NetworkConfig, Problem, TensorDesc};
use smallvec::SmallVec;

/// How NaN inputs affect a sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display)]
pub enum NanPropagation {
    /// NaN inputs are skipped.
    #[default]
    NotPropagate,
    /// Any NaN input makes the sum NaN.
    Propagate,
}

/// Sum of `x` over `dims`, written to `y` with the reduced extents kept as 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumProblem {
    x: TensorDesc,
    y: TensorDesc,
    dims: Dims,
}

impl SumProblem {
    pub fn new(x: TensorDesc, y: TensorDesc, dims: &[usize]) -> Self {
        Self { x, y, dims: SmallVec::from_slice(dims) }
    }

    pub fn x(&self) -> &TensorDesc {
        &self.x
    }

    pub fn y(&self) -> &TensorDesc {
        &self.y
    }

    /// Reduced dimensions as given by the caller.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Reduced dimensions in ascending order.
    pub fn sorted_dims(&self) -> Dims {
        let mut dims = self.dims.clone();
        dims.sort_unstable();
        dims
    }

    pub fn is_same_type(&self) -> bool {
        self.x.dtype() == self.y.dtype()
    }

    /// At least one dimension, all in range and none repeated.
    pub fn is_right_dim(&self) -> bool {
        let sorted = self.sorted_dims();
        !sorted.is_empty() && sorted.iter().all(|&d| d < self.x.rank()) && sorted.windows(2).all(|w| w[0] != w[1])
    }

    /// `y` has `x`'s rank, with every reduced extent collapsed to 1.
    pub fn is_right_length(&self) -> bool {
        self.x.rank() == self.y.rank()
            && self.x.lengths().iter().zip(self.y.lengths()).enumerate().all(|(d, (&x, &y))| {
                if self.dims.contains(&d) { y == 1 } else { x == y }
            })
    }

    pub fn is_all_packed(&self) -> bool {
        self.x.is_packed() && self.y.is_packed()
    }

    /// The kernels index the innermost dimension directly, so it cannot be reduced.
    pub fn is_not_last_dim(&self) -> bool {
        !self.dims.contains(&(self.x.rank().saturating_sub(1)))
    }
}

impl Problem for SumProblem {
    fn network_config(&self) -> NetworkConfig {
        let mut key = format!("dtype{}", self.x.dtype());
        let output_numel = self.y.numel();
        for dim in self.sorted_dims() {
            let reduce_size = self.x.lengths().get(dim).copied().unwrap_or(0);
            let _ = write!(key, "dim{dim}reduce_size{reduce_size}output_numel{output_numel}");
        }
        key.push_str("xlengths");
        for length in self.x.lengths() {
            let _ = write!(key, "{length}x");
        }
        NetworkConfig::new(key)
    }
}

/// Runtime buffers of a sum.
#[derive(Debug, Clone)]
pub struct SumParams {
    pub x: Buffer,
    pub y: Buffer,
    /// Required when the plan splits or chains passes.
    pub workspace: Option<Buffer>,
    pub nan_propagation: NanPropagation,
}

impl InvokeParams for SumParams {
    fn workspace(&self) -> Option<&Buffer> {
        self.workspace.as_ref()
    }
}
