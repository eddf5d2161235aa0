//! Type-erased runtime parameters handed to invokers.

use std::any::{Any, type_name};
use std::fmt;

use kiln_device::Buffer;

/// Runtime buffers and scalars for one operator call.
pub trait InvokeParams: Any + Send + Sync {
    /// Scratch buffer supplied by the caller, if the operator takes one.
    fn workspace(&self) -> Option<&Buffer> {
        None
    }
}

impl InvokeParams for () {}

/// Owned, type-erased [`InvokeParams`].
///
/// Each invoker knows the concrete parameter type of its operator and narrows
/// with [`AnyInvokeParams::cast_to`].
pub struct AnyInvokeParams {
    inner: Box<dyn InvokeParams>,
    type_name: &'static str,
}

impl fmt::Debug for AnyInvokeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyInvokeParams").field("type", &self.type_name).finish()
    }
}

impl AnyInvokeParams {
    pub fn new<T: InvokeParams>(params: T) -> Self {
        Self { inner: Box::new(params), type_name: type_name::<T>() }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn try_cast_to<T: InvokeParams>(&self) -> Option<&T> {
        let any: &dyn Any = &*self.inner;
        any.downcast_ref::<T>()
    }

    /// # Panics
    ///
    /// Panics if the params were not created from a `T`.
    pub fn cast_to<T: InvokeParams>(&self) -> &T {
        match self.try_cast_to::<T>() {
            Some(params) => params,
            None => panic!("invoke params type mismatch: expected {}, got {}", type_name::<T>(), self.type_name),
        }
    }

    pub fn workspace(&self) -> Option<&Buffer> {
        self.inner.workspace()
    }
}
