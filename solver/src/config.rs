//! Policy flags consulted by solvers at decision time.

use bon::bon;

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Immutable feature switches carried by the execution context.
///
/// Solvers read these instead of the process environment, so a context built
/// once behaves the same for its whole lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    /// Disable the catalog-backed batchnorm forward-training solver.
    pub disable_ck_bn_fwd_training: bool,
    /// Prefer bitwise-reproducible kernels over atomics.
    pub deterministic: bool,
    /// Keep the split-reduction solver applicable even for shapes a vendor
    /// library handles faster.
    pub force_reduce_split: bool,
}

#[bon]
impl Policy {
    #[builder]
    pub fn new(
        #[builder(default = false)] disable_ck_bn_fwd_training: bool,
        #[builder(default = false)] deterministic: bool,
        #[builder(default = false)] force_reduce_split: bool,
    ) -> Self {
        Self { disable_ck_bn_fwd_training, deterministic, force_reduce_split }
    }

    /// Create a policy from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `KILN_DISABLE_CK_BN_FWD_TRAINING` - Disable the catalog batchnorm solver
    /// * `KILN_DETERMINISTIC` - Prefer deterministic kernels
    /// * `KILN_FORCE_REDUCE_SPLIT_GATE_OFF` - Bypass the split-reduction gate
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| var(name).is_some_and(|value| is_truthy(&value));
        Self {
            disable_ck_bn_fwd_training: flag("KILN_DISABLE_CK_BN_FWD_TRAINING"),
            deterministic: flag("KILN_DETERMINISTIC"),
            force_reduce_split: flag("KILN_FORCE_REDUCE_SPLIT_GATE_OFF"),
        }
    }
}
