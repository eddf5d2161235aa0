//! Pass planning for multi-dimension sums.
//!
//! [`plan_passes`] is the single source of truth for a reduction: the solver
//! derives its kernel descriptors and workspace size from the plan, and the
//! invoker replays the same plan to bind buffers and offsets.

use smallvec::SmallVec;
use tracing::trace;

use kiln_dtype::DType;

/// Work-group size of both sum kernels.
pub const LOCAL_SIZE: usize = 256;

/// Work items needed for four work groups per compute unit.
pub fn required_work_items(compute_units: usize) -> usize {
    LOCAL_SIZE * compute_units * 4
}

/// A pass splits when its output alone fits the device but the full
/// reduction does not.
pub fn is_parallelism(required: usize, output_numel: usize, reduce_size: usize) -> bool {
    output_numel <= required && output_numel * reduce_size > required
}

/// Largest power of two `p` with `p * output_numel < required` and
/// `p < sqrt(reduce_size)`, and never less than 1.
pub fn parallelism_size(required: usize, output_numel: usize, reduce_size: usize) -> usize {
    let limit = (reduce_size as f64).sqrt();
    let mut size = 1;
    while size * 2 * output_numel < required && ((size * 2) as f64) < limit {
        size *= 2;
    }
    size
}

/// Where a launch reads or writes. Scratch offsets are in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Input,
    Output,
    Scratch(usize),
}

impl Region {
    pub fn offset(&self) -> usize {
        match self {
            Self::Scratch(offset) => *offset,
            Self::Input | Self::Output => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SumLaunch {
    /// Writes `parallelism` partial sums per output element.
    Partial { src: Region, dst: Region, parallelism: usize },
    /// Sums `reduce_size` elements per output element.
    Finalize { src: Region, dst: Region, reduce_size: usize },
}

impl SumLaunch {
    pub fn src(&self) -> Region {
        match self {
            Self::Partial { src, .. } | Self::Finalize { src, .. } => *src,
        }
    }

    pub fn dst(&self) -> Region {
        match self {
            Self::Partial { dst, .. } | Self::Finalize { dst, .. } => *dst,
        }
    }

    pub fn kernel_name(&self) -> &'static str {
        match self {
            Self::Partial { .. } => "SumParallelFwdContiguous",
            Self::Finalize { .. } => "SumFwdContiguous",
        }
    }

    /// Elements written by this launch.
    pub fn output_len(&self, output_numel: usize) -> usize {
        match self {
            Self::Partial { parallelism, .. } => parallelism * output_numel,
            Self::Finalize { .. } => output_numel,
        }
    }
}

/// Reduction of one dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducePass {
    pub dim: usize,
    pub reduce_size: usize,
    /// Elements left after this dimension is collapsed.
    pub output_numel: usize,
    /// Product of the extents after `dim`, with later dimensions already collapsed.
    pub inner_size: usize,
    pub launches: SmallVec<[SumLaunch; 2]>,
}

impl ReducePass {
    /// Partial sums per output element, when the pass is split.
    pub fn parallelism(&self) -> Option<usize> {
        self.launches.iter().find_map(|launch| match launch {
            SumLaunch::Partial { parallelism, .. } => Some(*parallelism),
            SumLaunch::Finalize { .. } => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducePlan {
    pub passes: Vec<ReducePass>,
    /// Scratch elements needed by all passes together.
    pub scratch_elements: usize,
}

impl ReducePlan {
    pub fn launches(&self) -> impl Iterator<Item = (&ReducePass, &SumLaunch)> {
        self.passes.iter().flat_map(|pass| pass.launches.iter().map(move |launch| (pass, launch)))
    }

    pub fn launch_count(&self) -> usize {
        self.passes.iter().map(|pass| pass.launches.len()).sum()
    }

    pub fn workspace_bytes(&self, dtype: DType) -> usize {
        self.scratch_elements * dtype.bytes()
    }

    /// False when some split pass is small enough that a single-launch
    /// library reduction is known to be faster.
    pub fn beats_baseline(&self, required: usize) -> bool {
        self.passes.iter().filter(|pass| pass.parallelism().is_some()).all(|pass| {
            let small = pass.output_numel * pass.reduce_size < required * 64;
            let large_reduce = pass.reduce_size > 64;
            !(small && large_reduce)
        })
    }
}

/// Plan the passes reducing `x_lengths` over `sorted_dims`.
///
/// Dimensions are processed last to first. Pass 0 reads the input and the
/// last pass writes the output; every other pass reads the region written by
/// its predecessor and writes a fresh scratch region, so scratch offsets only
/// grow.
pub fn plan_passes(x_lengths: &[usize], sorted_dims: &[usize], required: usize) -> ReducePlan {
    let mut output_lengths: SmallVec<[usize; 5]> = SmallVec::from_slice(x_lengths);
    let mut passes = Vec::with_capacity(sorted_dims.len());
    let (mut read, mut write) = (0usize, 0usize);
    let mut scratch_elements = 0;

    for (idx, &dim) in sorted_dims.iter().rev().enumerate() {
        let last = idx + 1 == sorted_dims.len();
        let inner_size: usize = output_lengths[dim + 1..].iter().product();
        output_lengths[dim] = 1;
        let reduce_size = x_lengths[dim];
        let output_numel: usize = output_lengths.iter().product();

        let mut src = if idx == 0 { Region::Input } else { Region::Scratch(read) };
        let mut launches = SmallVec::new();

        if is_parallelism(required, output_numel, reduce_size) {
            let parallelism = parallelism_size(required, output_numel, reduce_size);
            launches.push(SumLaunch::Partial { src, dst: Region::Scratch(write), parallelism });
            scratch_elements += parallelism * output_numel;
            read = write;
            write += parallelism * output_numel;
            src = Region::Scratch(read);
            launches.push(SumLaunch::Finalize {
                src,
                dst: if last { Region::Output } else { Region::Scratch(write) },
                reduce_size: parallelism,
            });
        } else {
            launches.push(SumLaunch::Finalize {
                src,
                dst: if last { Region::Output } else { Region::Scratch(write) },
                reduce_size,
            });
        }

        if !last {
            scratch_elements += output_numel;
        }
        read = write;
        write += output_numel;

        trace!(dim, reduce_size, output_numel, inner_size, launches = launches.len(), "planned pass");
        passes.push(ReducePass { dim, reduce_size, output_numel, inner_size, launches });
    }

    ReducePlan { passes, scratch_elements }
}
