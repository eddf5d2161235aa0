//! Tensor descriptors.

use kiln_device::TensorView;
use kiln_dtype::DType;
use smallvec::SmallVec;

pub type Dims = SmallVec<[usize; 5]>;

/// Memory layout tag for 4-D image tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Layout {
    #[strum(to_string = "NCHW")]
    Nchw,
    #[strum(to_string = "NHWC")]
    Nhwc,
}

/// Element type, lengths and strides (in elements) of one operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorDesc {
    dtype: DType,
    lengths: Dims,
    strides: Dims,
}

fn row_major_strides(lengths: &[usize]) -> Dims {
    let mut strides: Dims = SmallVec::from_elem(1, lengths.len());
    for i in (0..lengths.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * lengths[i + 1];
    }
    strides
}

impl TensorDesc {
    /// A contiguous row-major tensor.
    pub fn new(dtype: DType, lengths: &[usize]) -> Self {
        Self { dtype, strides: row_major_strides(lengths), lengths: SmallVec::from_slice(lengths) }
    }

    /// # Panics
    ///
    /// Panics if `lengths` and `strides` differ in rank.
    pub fn with_strides(dtype: DType, lengths: &[usize], strides: &[usize]) -> Self {
        assert_eq!(lengths.len(), strides.len(), "lengths and strides must have the same rank");
        Self { dtype, lengths: SmallVec::from_slice(lengths), strides: SmallVec::from_slice(strides) }
    }

    /// A packed NHWC tensor described with NCHW-ordered lengths `[n, c, h, w]`.
    pub fn nhwc(dtype: DType, [n, c, h, w]: [usize; 4]) -> Self {
        Self::with_strides(dtype, &[n, c, h, w], &[h * w * c, 1, w * c, c])
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.lengths.len()
    }

    pub fn numel(&self) -> usize {
        self.lengths.iter().product()
    }

    /// Number of elements spanned in memory, from the first to the last element.
    pub fn element_space(&self) -> usize {
        if self.lengths.contains(&0) {
            return 0;
        }
        1 + self.lengths.iter().zip(&self.strides).map(|(len, stride)| (len - 1) * stride).sum::<usize>()
    }

    /// Bytes needed to hold the element space.
    pub fn bytes(&self) -> usize {
        self.element_space() * self.dtype.bytes()
    }

    /// No gaps between elements, in any dimension order.
    pub fn is_packed(&self) -> bool {
        self.element_space() == self.numel()
    }

    /// Row-major with no gaps.
    pub fn is_contiguous(&self) -> bool {
        self.strides == row_major_strides(&self.lengths)
    }

    /// Up to 5-D view padded with leading unit extents.
    ///
    /// # Panics
    ///
    /// Panics if the rank exceeds 5.
    pub fn view(&self) -> TensorView {
        TensorView::new(&self.lengths, &self.strides)
    }

    pub fn same_lengths(&self, other: &TensorDesc) -> bool {
        self.lengths == other.lengths
    }
}
