use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// An element access fell outside the allocation.
    #[snafu(display("out of bounds access: offset {offset} + size {size} exceeds buffer size {buffer_size}"))]
    OutOfBounds { offset: usize, size: usize, buffer_size: usize },

    #[snafu(display("size mismatch: expected {expected}, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    /// No kernel body is registered for the requested entry point.
    #[snafu(display("kernel {name} not found in {file}"))]
    KernelNotFound { file: String, name: String },

    /// A kernel body received an argument of the wrong kind.
    #[snafu(display("argument {index}: expected {expected}, found {found}"))]
    ArgumentMismatch { index: usize, expected: &'static str, found: &'static str },

    #[snafu(display("argument {index} is missing"))]
    MissingArgument { index: usize },

    /// A kernel body rejected its launch.
    #[snafu(display("launch of {kernel} failed: {reason}"))]
    Launch { kernel: String, reason: String },
}
