//! Performance configs: the tunable knobs of a solver.

use std::fmt;

/// A cursor over the candidate space of a tunable solver.
pub trait PerformanceConfig: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Advance to the next candidate. Returns false, leaving the config
    /// unchanged, when the current candidate is the last.
    fn set_next_value(&mut self) -> bool;

    /// Whether the cursor points at an existing candidate.
    fn is_valid_value(&self) -> bool;
}

/// Ordered list of candidate identifiers with a selected index.
///
/// Used by catalog-backed solvers, where each candidate is the type string of
/// a catalog instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CandidateConfig {
    candidates: Vec<String>,
    index: usize,
}

impl CandidateConfig {
    /// Select the first candidate.
    pub fn new(candidates: Vec<String>) -> Self {
        Self { candidates, index: 0 }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Identifier of the selected candidate.
    ///
    /// # Panics
    ///
    /// Panics if the config holds no candidates.
    pub fn current(&self) -> &str {
        match self.candidates.get(self.index) {
            Some(id) => id,
            None => panic!("performance config index {} out of range for {} candidates", self.index, self.candidates.len()),
        }
    }

    /// Select a candidate by identifier. Returns false if it is unknown.
    pub fn select(&mut self, id: &str) -> bool {
        match self.candidates.iter().position(|candidate| candidate == id) {
            Some(index) => {
                self.index = index;
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for CandidateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.candidates.get(self.index) {
            Some(id) => write!(f, "{id} ({}/{})", self.index + 1, self.candidates.len()),
            None => f.write_str("<empty>"),
        }
    }
}

impl PerformanceConfig for CandidateConfig {
    fn set_next_value(&mut self) -> bool {
        if self.index + 1 < self.candidates.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn is_valid_value(&self) -> bool {
        self.index < self.candidates.len()
    }
}
