//! Kernel build descriptors, compiled kernels and launch arguments.

use std::fmt;
use std::sync::Arc;

use bon::bon;
use smallvec::SmallVec;

use crate::buffer::Buffer;
use crate::error::{ArgumentMismatchSnafu, MissingArgumentSnafu, Result};

/// Value of a single build parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BuildValue {
    Int(i64),
    Str(String),
}

impl fmt::Display for BuildValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
        }
    }
}

impl From<i64> for BuildValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for BuildValue {
    fn from(value: usize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<i32> for BuildValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<bool> for BuildValue {
    fn from(value: bool) -> Self {
        Self::Int(value as i64)
    }
}

impl From<&str> for BuildValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for BuildValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Named compile-time definitions, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BuildParams {
    entries: Vec<(String, BuildValue)>,
}

impl BuildParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a definition. A repeated name replaces the earlier value in place.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<BuildValue>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<BuildValue>) {
        let (name, value) = (name.into(), value.into());
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&BuildValue> {
        self.entries.iter().find(|(existing, _)| existing == name).map(|(_, value)| value)
    }

    /// Integer definition, if present and integral.
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            BuildValue::Int(value) => Some(*value),
            BuildValue::Str(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BuildValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as compiler options: `-DNAME=VALUE`, space separated.
    pub fn generate_options(&self) -> String {
        self.entries.iter().map(|(name, value)| format!("-D{name}={value}")).collect::<Vec<_>>().join(" ")
    }
}

/// Everything needed to build one kernel and launch it.
///
/// The global size is rounded up to a multiple of the local size in every
/// dimension, so kernels must guard against work items past the logical end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelInfo {
    pub kernel_file: String,
    pub kernel_name: String,
    pub build_params: BuildParams,
    pub local: [usize; 3],
    pub global: [usize; 3],
}

fn grid(dims: &[usize]) -> [usize; 3] {
    assert!(dims.len() <= 3, "launch grid has at most 3 dimensions, got {}", dims.len());
    let mut out = [1; 3];
    out[..dims.len()].copy_from_slice(dims);
    out
}

#[bon]
impl KernelInfo {
    /// # Panics
    ///
    /// Panics if a local size is zero or a grid has more than 3 dimensions.
    #[builder]
    pub fn new(
        #[builder(into)] kernel_file: String,
        #[builder(into)] kernel_name: String,
        #[builder(default)] build_params: BuildParams,
        #[builder(into)] local: SmallVec<[usize; 3]>,
        #[builder(into)] global: SmallVec<[usize; 3]>,
    ) -> Self {
        let local = grid(&local);
        let mut global = grid(&global);
        for (g, l) in global.iter_mut().zip(local) {
            assert!(l > 0, "local size must be positive");
            *g = g.div_ceil(l) * l;
        }
        Self { kernel_file, kernel_name, build_params, local, global }
    }
}

impl KernelInfo {
    /// Number of work groups along each dimension.
    pub fn groups(&self) -> [usize; 3] {
        [self.global[0] / self.local[0], self.global[1] / self.local[1], self.global[2] / self.local[2]]
    }

    pub fn work_items(&self) -> usize {
        self.global.iter().product()
    }
}

/// Executable kernel code produced by a [`Compiler`](crate::Compiler).
pub trait Program: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Execute one launch described by `info` with positional `args`.
    fn launch(&self, info: &KernelInfo, args: &[KernelArg]) -> Result<()>;
}

/// A compiled kernel bound to the descriptor it was built from.
#[derive(Debug, Clone)]
pub struct Kernel {
    info: Arc<KernelInfo>,
    program: Arc<dyn Program>,
}

impl Kernel {
    pub fn new(info: KernelInfo, program: Arc<dyn Program>) -> Self {
        Self { info: Arc::new(info), program }
    }

    pub fn info(&self) -> &KernelInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.kernel_name
    }

    pub fn program(&self) -> &Arc<dyn Program> {
        &self.program
    }

    /// The same program launched over another grid, for kernels whose
    /// geometry depends on runtime sizes. The global size is aligned as in
    /// [`KernelInfo::new`].
    ///
    /// # Panics
    ///
    /// Panics if a local size is zero.
    pub fn with_grid(&self, local: [usize; 3], global: [usize; 3]) -> Self {
        let mut info = KernelInfo::clone(&self.info);
        for d in 0..3 {
            assert!(local[d] > 0, "local size must be positive");
            info.local[d] = local[d];
            info.global[d] = global[d].div_ceil(local[d]) * local[d];
        }
        Self { info: Arc::new(info), program: Arc::clone(&self.program) }
    }
}

/// Up to 5-D strided view over a buffer, in elements.
///
/// Lower-rank tensors are padded on the left with unit extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorView {
    pub lengths: [usize; 5],
    pub strides: [usize; 5],
}

impl TensorView {
    /// # Panics
    ///
    /// Panics if the rank exceeds 5 or the slices differ in length.
    pub fn new(lengths: &[usize], strides: &[usize]) -> Self {
        assert!(lengths.len() <= 5, "tensor views have at most 5 dimensions, got {}", lengths.len());
        assert_eq!(lengths.len(), strides.len(), "lengths and strides must have the same rank");
        let pad = 5 - lengths.len();
        let mut view = Self { lengths: [1; 5], strides: [0; 5] };
        view.lengths[pad..].copy_from_slice(lengths);
        view.strides[pad..].copy_from_slice(strides);
        view
    }

    pub fn numel(&self) -> usize {
        self.lengths.iter().product()
    }

    /// Element offset of the `index`-th element in row-major logical order.
    pub fn offset_of(&self, mut index: usize) -> usize {
        let mut offset = 0;
        for d in (0..5).rev() {
            offset += (index % self.lengths[d]) * self.strides[d];
            index /= self.lengths[d];
        }
        offset
    }
}

/// A positional launch argument.
#[derive(Debug, Clone, strum::IntoStaticStr)]
pub enum KernelArg {
    Buffer(Buffer),
    /// An absent optional buffer.
    Null,
    Usize(usize),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    View(TensorView),
}

impl From<&Buffer> for KernelArg {
    fn from(buffer: &Buffer) -> Self {
        Self::Buffer(buffer.clone())
    }
}

impl From<Option<&Buffer>> for KernelArg {
    fn from(buffer: Option<&Buffer>) -> Self {
        buffer.map_or(Self::Null, |b| Self::Buffer(b.clone()))
    }
}

impl From<usize> for KernelArg {
    fn from(value: usize) -> Self {
        Self::Usize(value)
    }
}

impl From<i64> for KernelArg {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<f32> for KernelArg {
    fn from(value: f32) -> Self {
        Self::F32(value)
    }
}

impl From<f64> for KernelArg {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

impl From<bool> for KernelArg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<TensorView> for KernelArg {
    fn from(view: TensorView) -> Self {
        Self::View(view)
    }
}

/// Typed positional access to launch arguments.
pub trait ArgsExt {
    fn arg(&self, index: usize) -> Result<&KernelArg>;

    fn buffer(&self, index: usize) -> Result<&Buffer> {
        match self.arg(index)? {
            KernelArg::Buffer(buffer) => Ok(buffer),
            other => mismatch(index, "Buffer", other),
        }
    }

    /// A buffer argument that may be [`KernelArg::Null`].
    fn opt_buffer(&self, index: usize) -> Result<Option<&Buffer>> {
        match self.arg(index)? {
            KernelArg::Buffer(buffer) => Ok(Some(buffer)),
            KernelArg::Null => Ok(None),
            other => mismatch(index, "Buffer", other),
        }
    }

    fn usize(&self, index: usize) -> Result<usize> {
        match self.arg(index)? {
            KernelArg::Usize(value) => Ok(*value),
            other => mismatch(index, "Usize", other),
        }
    }

    fn i64(&self, index: usize) -> Result<i64> {
        match self.arg(index)? {
            KernelArg::I64(value) => Ok(*value),
            other => mismatch(index, "I64", other),
        }
    }

    fn f32(&self, index: usize) -> Result<f32> {
        match self.arg(index)? {
            KernelArg::F32(value) => Ok(*value),
            other => mismatch(index, "F32", other),
        }
    }

    fn f64(&self, index: usize) -> Result<f64> {
        match self.arg(index)? {
            KernelArg::F64(value) => Ok(*value),
            other => mismatch(index, "F64", other),
        }
    }

    fn bool(&self, index: usize) -> Result<bool> {
        match self.arg(index)? {
            KernelArg::Bool(value) => Ok(*value),
            other => mismatch(index, "Bool", other),
        }
    }

    fn view(&self, index: usize) -> Result<TensorView> {
        match self.arg(index)? {
            KernelArg::View(view) => Ok(*view),
            other => mismatch(index, "View", other),
        }
    }
}

fn mismatch<T>(index: usize, expected: &'static str, found: &KernelArg) -> Result<T> {
    ArgumentMismatchSnafu { index, expected, found: <&'static str>::from(found) }.fail()
}

impl ArgsExt for [KernelArg] {
    fn arg(&self, index: usize) -> Result<&KernelArg> {
        self.get(index).ok_or_else(|| MissingArgumentSnafu { index }.build())
    }
}
