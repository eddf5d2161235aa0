use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Selection, planning or execution of an operator failed.
    #[snafu(display("{operator}: {source}"))]
    Solver { operator: &'static str, source: kiln_solver::Error },
}
