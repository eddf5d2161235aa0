use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use kiln_dtype::{DType, HasDType};
use parking_lot::RwLock;
use snafu::ensure;

use crate::error::{OutOfBoundsSnafu, Result, SizeMismatchSnafu};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(0);

struct BufferData {
    id: u64,
    bytes: RwLock<Vec<u8>>,
    /// Furthest byte offset read or written through this allocation.
    high_water: AtomicUsize,
}

/// A device allocation addressed in bytes.
///
/// Buffers carry no element type; kernels decide how to interpret the bytes
/// by passing a [`DType`] to the typed accessors. Cloning a buffer shares the
/// allocation, so several kernel arguments may alias one another.
#[derive(Clone)]
pub struct Buffer {
    data: Arc<BufferData>,
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("id", &self.data.id).field("size", &self.size()).finish()
    }
}

impl Buffer {
    /// Allocate `size` zeroed bytes.
    pub fn zeroed(size: usize) -> Self {
        Self::from_bytes(vec![0; size])
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let id = NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed);
        Self { data: Arc::new(BufferData { id, bytes: RwLock::new(bytes), high_water: AtomicUsize::new(0) }) }
    }

    /// Upload host elements, encoded with `T`'s device type.
    pub fn from_slice<T: HasDType>(values: &[T]) -> Self {
        let elem = T::DTYPE.bytes();
        let mut bytes = vec![0; values.len() * elem];
        for (chunk, value) in bytes.chunks_exact_mut(elem).zip(values) {
            T::DTYPE.encode(value.to_f64(), chunk);
        }
        Self::from_bytes(bytes)
    }

    pub fn id(&self) -> u64 {
        self.data.id
    }

    /// Size of the allocation in bytes.
    pub fn size(&self) -> usize {
        self.data.bytes.read().len()
    }

    /// Whether both handles refer to the same allocation.
    pub fn ptr_eq(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Furthest byte touched by element loads and stores since creation or
    /// the last [`Buffer::reset_high_water_mark`].
    pub fn high_water_mark(&self) -> usize {
        self.data.high_water.load(Ordering::Acquire)
    }

    pub fn reset_high_water_mark(&self) {
        self.data.high_water.store(0, Ordering::Release);
    }

    fn touch(&self, end: usize) {
        self.data.high_water.fetch_max(end, Ordering::AcqRel);
    }

    fn check_range(&self, len: usize, offset: usize, size: usize) -> Result<()> {
        ensure!(
            offset.checked_add(size).is_some_and(|end| end <= len),
            OutOfBoundsSnafu { offset, size, buffer_size: len }
        );
        Ok(())
    }

    /// Load `count` elements starting at element `offset`.
    pub fn load(&self, dtype: DType, offset: usize, count: usize) -> Result<Vec<f64>> {
        let elem = dtype.bytes();
        let (start, size) = (offset * elem, count * elem);
        let bytes = self.data.bytes.read();
        self.check_range(bytes.len(), start, size)?;
        self.touch(start + size);
        Ok(bytes[start..start + size].chunks_exact(elem).map(|chunk| dtype.decode(chunk)).collect())
    }

    /// Load one element.
    pub fn load_at(&self, dtype: DType, index: usize) -> Result<f64> {
        let elem = dtype.bytes();
        let bytes = self.data.bytes.read();
        self.check_range(bytes.len(), index * elem, elem)?;
        self.touch((index + 1) * elem);
        Ok(dtype.decode(&bytes[index * elem..]))
    }

    /// Store `values` starting at element `offset`, rounding to `dtype`.
    pub fn store(&self, dtype: DType, offset: usize, values: &[f64]) -> Result<()> {
        let elem = dtype.bytes();
        let (start, size) = (offset * elem, values.len() * elem);
        let mut bytes = self.data.bytes.write();
        self.check_range(bytes.len(), start, size)?;
        self.touch(start + size);
        for (chunk, value) in bytes[start..start + size].chunks_exact_mut(elem).zip(values) {
            dtype.encode(*value, chunk);
        }
        Ok(())
    }

    /// Store one element.
    pub fn store_at(&self, dtype: DType, index: usize, value: f64) -> Result<()> {
        let elem = dtype.bytes();
        let mut bytes = self.data.bytes.write();
        self.check_range(bytes.len(), index * elem, elem)?;
        self.touch((index + 1) * elem);
        dtype.encode(value, &mut bytes[index * elem..]);
        Ok(())
    }

    /// Add `value` to one element under the write lock, returning the previous
    /// value. This is the CPU stand-in for a device atomic add.
    pub fn fetch_add(&self, dtype: DType, index: usize, value: f64) -> Result<f64> {
        let elem = dtype.bytes();
        let mut bytes = self.data.bytes.write();
        self.check_range(bytes.len(), index * elem, elem)?;
        self.touch((index + 1) * elem);
        let slot = &mut bytes[index * elem..(index + 1) * elem];
        let previous = dtype.decode(slot);
        dtype.encode(previous + value, slot);
        Ok(previous)
    }

    pub fn fill_zero(&self) {
        let mut bytes = self.data.bytes.write();
        bytes.fill(0);
        self.touch(bytes.len());
    }

    /// Copy the first `size` bytes to the host.
    pub fn read_bytes(&self, size: usize) -> Result<Vec<u8>> {
        let bytes = self.data.bytes.read();
        ensure!(size <= bytes.len(), SizeMismatchSnafu { expected: size, actual: bytes.len() });
        Ok(bytes[..size].to_vec())
    }

    /// Download `count` elements decoded as `T`.
    pub fn to_vec<T: HasDType>(&self, count: usize) -> Result<Vec<T>> {
        let elem = T::DTYPE.bytes();
        let bytes = self.read_bytes(count * elem)?;
        Ok(bytes.chunks_exact(elem).map(|chunk| T::from_f64(T::DTYPE.decode(chunk))).collect())
    }
}
