//! Per-phase results of a run.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Phase;
use crate::utils::error::Result;

/// Outcome of one phase of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub epoch: usize,
    pub phase: Phase,
    pub accuracy: f64,
    /// Mean batch loss, train phases only
    pub loss: Option<f64>,
    pub num_examples: usize,
}

/// Phase summaries in the order they ran
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunHistory {
    pub phases: Vec<PhaseSummary>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, summary: PhaseSummary) {
        self.phases.push(summary);
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Summaries of one phase, in epoch order
    pub fn of_phase(&self, phase: Phase) -> impl Iterator<Item = &PhaseSummary> {
        self.phases.iter().filter(move |s| s.phase == phase)
    }

    /// Eval summary with the highest accuracy; the earliest epoch wins ties
    pub fn best_dev(&self) -> Option<&PhaseSummary> {
        self.of_phase(Phase::Eval).fold(None, |best, s| match best {
            Some(b) if b.accuracy >= s.accuracy => Some(b),
            _ => Some(s),
        })
    }

    /// Write the history as pretty JSON
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
