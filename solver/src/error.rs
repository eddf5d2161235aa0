//! Error types for solver resolution and execution.

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// No registered solver is applicable to the problem, or none could build a solution.
    #[snafu(display("no applicable solver for problem {config}"))]
    NoSolver { config: String },

    /// A tunable solver has no candidate that is valid for the problem.
    #[snafu(display("solver {solver} has no valid performance config for {config}"))]
    NoValidConfig { solver: &'static str, config: String },

    /// The caller supplied a workspace smaller than the plan requires.
    #[snafu(display("workspace too small: {required} bytes required, {provided} provided"))]
    WorkspaceTooSmall { required: usize, provided: usize },

    /// A catalog instance rejected its argument at run time.
    #[snafu(display("instance {instance} does not support the argument"))]
    UnsupportedArgument { instance: String },

    #[snafu(display("device error: {source}"))]
    Device { source: kiln_device::Error },
}

impl From<kiln_device::Error> for Error {
    fn from(source: kiln_device::Error) -> Self {
        Self::Device { source }
    }
}
