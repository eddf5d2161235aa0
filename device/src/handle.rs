//! Device handle: kernel launches, profiling timer and host transfers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use bon::bon;
use kiln_dtype::HasDType;
use parking_lot::Mutex;
use tracing::trace;

use crate::buffer::Buffer;
use crate::error::Result;
use crate::kernel::{Kernel, KernelArg};

/// An in-order launch queue bound to one device.
///
/// Launches execute in submission order, so chained kernels need no extra
/// synchronization. The profiling timer is a single value: each profiled
/// launch overwrites it, and invokers that launch several kernels fold the
/// individual times together through [`Handle::reset_kernel_time`] and
/// [`Handle::accum_kernel_time`].
pub trait Handle: Send + Sync {
    fn run(&self, kernel: &Kernel, args: &[KernelArg]) -> Result<()>;

    fn is_profiling_enabled(&self) -> bool;
    fn enable_profiling(&self, enable: bool);

    /// Elapsed time in milliseconds recorded by the profiling timer.
    fn kernel_time(&self) -> f32;
    fn reset_kernel_time(&self);
    fn accum_kernel_time(&self, ms: f32);

    fn max_compute_units(&self) -> usize;

    /// Allocate `size` zeroed bytes on the device.
    fn alloc(&self, size: usize) -> Buffer;
    fn write_bytes(&self, bytes: Vec<u8>) -> Buffer;
    fn read_bytes(&self, buffer: &Buffer, size: usize) -> Result<Vec<u8>>;
    fn set_zero(&self, buffer: &Buffer) -> Result<()>;
}

/// Typed host transfers on top of [`Handle`].
pub trait HandleExt: Handle {
    fn write<T: HasDType>(&self, values: &[T]) -> Buffer {
        let elem = T::DTYPE.bytes();
        let mut bytes = vec![0; values.len() * elem];
        for (chunk, value) in bytes.chunks_exact_mut(elem).zip(values) {
            T::DTYPE.encode(value.to_f64(), chunk);
        }
        self.write_bytes(bytes)
    }

    fn read<T: HasDType>(&self, buffer: &Buffer, count: usize) -> Result<Vec<T>> {
        let elem = T::DTYPE.bytes();
        let bytes = self.read_bytes(buffer, count * elem)?;
        Ok(bytes.chunks_exact(elem).map(|chunk| T::from_f64(T::DTYPE.decode(chunk))).collect())
    }
}

impl<H: Handle + ?Sized> HandleExt for H {}

/// Synchronous host handle. Every launch runs to completion inside [`Handle::run`].
#[derive(Debug)]
pub struct CpuHandle {
    compute_units: usize,
    profiling: AtomicBool,
    kernel_time: Mutex<f32>,
    launches: AtomicUsize,
}

#[bon]
impl CpuHandle {
    /// `compute_units` defaults to the host's available parallelism.
    #[builder]
    pub fn new(
        compute_units: Option<usize>,
        #[builder(default = false)] profiling: bool,
    ) -> Self {
        let compute_units =
            compute_units.unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()));
        Self {
            compute_units,
            profiling: AtomicBool::new(profiling),
            kernel_time: Mutex::new(0.0),
            launches: AtomicUsize::new(0),
        }
    }
}

impl Default for CpuHandle {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CpuHandle {
    /// Number of kernel launches issued through this handle.
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::Relaxed)
    }
}

impl Handle for CpuHandle {
    fn run(&self, kernel: &Kernel, args: &[KernelArg]) -> Result<()> {
        trace!(kernel = kernel.name(), global = ?kernel.info().global, local = ?kernel.info().local, "launch");
        self.launches.fetch_add(1, Ordering::Relaxed);

        if !self.is_profiling_enabled() {
            return kernel.program().launch(kernel.info(), args);
        }

        let start = Instant::now();
        kernel.program().launch(kernel.info(), args)?;
        *self.kernel_time.lock() = start.elapsed().as_secs_f32() * 1000.0;
        Ok(())
    }

    fn is_profiling_enabled(&self) -> bool {
        self.profiling.load(Ordering::Acquire)
    }

    fn enable_profiling(&self, enable: bool) {
        self.profiling.store(enable, Ordering::Release);
    }

    fn kernel_time(&self) -> f32 {
        *self.kernel_time.lock()
    }

    fn reset_kernel_time(&self) {
        *self.kernel_time.lock() = 0.0;
    }

    fn accum_kernel_time(&self, ms: f32) {
        *self.kernel_time.lock() += ms;
    }

    fn max_compute_units(&self) -> usize {
        self.compute_units
    }

    fn alloc(&self, size: usize) -> Buffer {
        Buffer::zeroed(size)
    }

    fn write_bytes(&self, bytes: Vec<u8>) -> Buffer {
        Buffer::from_bytes(bytes)
    }

    fn read_bytes(&self, buffer: &Buffer, size: usize) -> Result<Vec<u8>> {
        buffer.read_bytes(size)
    }

    fn set_zero(&self, buffer: &Buffer) -> Result<()> {
        buffer.fill_zero();
        Ok(())
    }
}
