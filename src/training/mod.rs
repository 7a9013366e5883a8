//! Training module
//!
//! Epoch/phase loop over a [`Model`](crate::model::Model) and the
//! per-phase results it records.

pub mod classifier;
pub mod history;

use serde::{Deserialize, Serialize};

pub use classifier::Classifier;
pub use history::{PhaseSummary, RunHistory};

/// One pass over a split within an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Shuffled pass over the train split with parameter updates
    Train,
    /// Pass over the dev split
    Eval,
    /// Pass over the test split
    Test,
}

impl Phase {
    /// Word used in the phase banner
    pub fn verb(&self) -> &'static str {
        match self {
            Phase::Train => "Training",
            Phase::Eval => "Evaluating",
            Phase::Test => "Testing",
        }
    }

    pub fn is_train(&self) -> bool {
        matches!(self, Phase::Train)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Train => write!(f, "train"),
            Phase::Eval => write!(f, "eval"),
            Phase::Test => write!(f, "test"),
        }
    }
}
