//! Kernel build step.
//!
//! A [`Compiler`] turns a [`KernelInfo`] into a launchable [`Kernel`]. The CPU
//! implementation resolves `(kernel_file, kernel_name)` against a
//! [`KernelTable`] of Rust kernel bodies instead of compiling source.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use snafu::OptionExt;
use tracing::debug;

use crate::error::{KernelNotFoundSnafu, Result};
use crate::kernel::{Kernel, KernelArg, KernelInfo, Program};

/// Body of a CPU kernel. Receives the launch descriptor and positional args.
pub type KernelFn = fn(&KernelInfo, &[KernelArg]) -> Result<()>;

pub trait Compiler: Send + Sync {
    fn compile(&self, info: &KernelInfo) -> Result<Kernel>;
}

/// Registry of CPU kernel bodies keyed by source file and entry name.
#[derive(Default)]
pub struct KernelTable {
    entries: RwLock<HashMap<(String, String), KernelFn>>,
}

impl fmt::Debug for KernelTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelTable").field("len", &self.len()).finish()
    }
}

impl KernelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kernel body. Registering the same entry twice keeps the last body.
    pub fn register(&self, file: &str, name: &str, body: KernelFn) {
        self.entries.write().insert((file.to_string(), name.to_string()), body);
    }

    pub fn get(&self, file: &str, name: &str) -> Option<KernelFn> {
        self.entries.read().get(&(file.to_string(), name.to_string())).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct CpuProgram {
    name: String,
    body: KernelFn,
}

impl fmt::Debug for CpuProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuProgram").field("name", &self.name).finish()
    }
}

impl Program for CpuProgram {
    fn name(&self) -> &str {
        &self.name
    }

    fn launch(&self, info: &KernelInfo, args: &[KernelArg]) -> Result<()> {
        (self.body)(info, args)
    }
}

/// Compiler that binds descriptors to bodies from a [`KernelTable`].
#[derive(Debug)]
pub struct CpuCompiler {
    table: Arc<KernelTable>,
    compiled: AtomicUsize,
}

impl CpuCompiler {
    pub fn new(table: Arc<KernelTable>) -> Self {
        Self { table, compiled: AtomicUsize::new(0) }
    }

    /// Number of successful builds performed so far.
    pub fn compiled_count(&self) -> usize {
        self.compiled.load(Ordering::Relaxed)
    }
}

impl Compiler for CpuCompiler {
    fn compile(&self, info: &KernelInfo) -> Result<Kernel> {
        let body = self
            .table
            .get(&info.kernel_file, &info.kernel_name)
            .context(KernelNotFoundSnafu { file: &info.kernel_file, name: &info.kernel_name })?;

        debug!(
            file = %info.kernel_file,
            kernel = %info.kernel_name,
            options = %info.build_params.generate_options(),
            "building kernel"
        );
        self.compiled.fetch_add(1, Ordering::Relaxed);

        Ok(Kernel::new(info.clone(), Arc::new(CpuProgram { name: info.kernel_name.clone(), body })))
    }
}
