//! Contract for third-party device-operation instance catalogs.
//!
//! A catalog offers several precompiled implementations ("instances") of one
//! device operation. Each instance decides for itself whether it supports a
//! concrete argument; solvers enumerate the supported ones as tuning
//! candidates and identify them by type string.

use std::fmt;
use std::sync::Arc;

use crate::Result;

/// Launch options passed to an instance invoker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamConfig {
    /// Measure and return the elapsed time.
    pub time_kernel: bool,
}

/// Operation arguments bound to one instance.
#[derive(Debug, Clone)]
pub struct Argument<A> {
    instance: Arc<str>,
    args: A,
}

impl<A> Argument<A> {
    pub fn new(instance: &str, args: A) -> Self {
        Self { instance: Arc::from(instance), args }
    }

    /// Type string of the instance that built this argument.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn args(&self) -> &A {
        &self.args
    }
}

pub trait OpInvoker<A>: Send + Sync {
    /// Run the operation. Returns the elapsed milliseconds, or 0 when
    /// `stream.time_kernel` is false.
    fn run(&self, argument: &Argument<A>, stream: StreamConfig) -> Result<f32>;
}

pub trait DeviceOpInstance<A>: Send + Sync + fmt::Debug {
    /// Unique, human-readable identity within the catalog.
    fn type_string(&self) -> String;

    fn make_argument(&self, args: &A) -> Argument<A>
    where
        A: Clone,
    {
        Argument::new(&self.type_string(), args.clone())
    }

    fn is_supported_argument(&self, argument: &Argument<A>) -> bool;

    fn make_invoker(&self) -> Box<dyn OpInvoker<A>>;
}

pub trait InstanceCatalog<A>: Send + Sync {
    fn instances(&self) -> Vec<Arc<dyn DeviceOpInstance<A>>>;
}

/// Type strings of all instances supporting `args`, in catalog order.
pub fn supported_type_strings<A: Clone>(catalog: &dyn InstanceCatalog<A>, args: &A) -> Vec<String> {
    catalog
        .instances()
        .iter()
        .filter(|instance| instance.is_supported_argument(&instance.make_argument(args)))
        .map(|instance| instance.type_string())
        .collect()
}

/// Position of the first instance supporting `args`.
pub fn first_supported<A: Clone>(catalog: &dyn InstanceCatalog<A>, args: &A) -> Option<usize> {
    catalog.instances().iter().position(|instance| instance.is_supported_argument(&instance.make_argument(args)))
}

/// The instance with the given type string.
pub fn find_instance<A>(catalog: &dyn InstanceCatalog<A>, type_string: &str) -> Option<Arc<dyn DeviceOpInstance<A>>> {
    catalog.instances().into_iter().find(|instance| instance.type_string() == type_string)
}
