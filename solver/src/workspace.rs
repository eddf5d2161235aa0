//! Sub-allocation of one scratch buffer into several aligned regions.

/// Byte alignment of every region start.
pub const WORKSPACE_ALIGNMENT: usize = 256;

const fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

/// Layout of several buffers packed into one workspace.
///
/// Region `i` starts at the sum of the aligned sizes of regions `0..i`; the
/// total size is the sum of all aligned sizes, so regions never overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiBufferWorkspace {
    offsets: Vec<usize>,
    size: usize,
}

impl MultiBufferWorkspace {
    pub fn new(sizes: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(sizes.len());
        let mut size = 0;
        for &bytes in sizes {
            offsets.push(size);
            size += align_up(bytes, WORKSPACE_ALIGNMENT);
        }
        Self { offsets, size }
    }

    /// Byte offset of region `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a region of this workspace.
    pub fn offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    /// Total bytes to allocate.
    pub fn size(&self) -> usize {
        self.size
    }
}
