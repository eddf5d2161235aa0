use std::fmt;

/// Canonical dispatch key of a problem.
///
/// Two problems with equal keys are interchangeable for solver selection and
/// may share compiled plans.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkConfig(String);

impl NetworkConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable description of one operator invocation shape.
pub trait Problem: Send + Sync + 'static {
    fn network_config(&self) -> NetworkConfig;
}
