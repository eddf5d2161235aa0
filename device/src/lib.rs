//! Device layer for kiln.
//!
//! This crate defines what the solver layer needs from a device and nothing
//! more:
//! - [`Handle`]: launches kernels in program order, owns the profiling timer
//!   and moves data between host and device.
//! - [`Compiler`]: turns a [`KernelInfo`] build descriptor into a launchable
//!   [`Kernel`].
//! - [`Buffer`]: a shared byte-addressed allocation.
//!
//! The CPU implementations ([`CpuHandle`], [`CpuCompiler`]) execute Rust kernel
//! bodies registered in a [`KernelTable`]. They are in-order and synchronous,
//! which makes them suitable for tests and for checking solver plans.

pub mod buffer;
pub mod compiler;
pub mod error;
pub mod handle;
pub mod kernel;


pub use buffer::Buffer;
pub use compiler::{Compiler, CpuCompiler, KernelFn, KernelTable};
pub use error::{Error, Result};
pub use handle::{CpuHandle, Handle, HandleExt};
pub use kernel::{ArgsExt, BuildParams, BuildValue, Kernel, KernelArg, KernelInfo, Program, TensorView};
