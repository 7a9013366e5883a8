//! Model module
//!
//! The training loop only talks to a [`Model`]: score a batch, turn scores
//! into predicted labels, and update parameters from a labeled batch.
//! [`BurnModel`] implements it on top of the [`ConvNet`] network.

pub mod burn_model;
pub mod cnn;

use std::path::Path;

pub use burn_model::BurnModel;
pub use cnn::{ConvNet, ConvNetConfig};

use crate::dataset::Example;
use crate::training::Phase;
use crate::utils::error::Result;

/// A classifier the loop can train, evaluate and persist
pub trait Model {
    /// Per-example class scores for one batch, in batch order
    type Scores;

    /// Score a batch
    ///
    /// `phase` tells the model whether this is a training pass (dropout on,
    /// gradients tracked) or an evaluation pass.
    fn forward(&self, batch: &[Example], phase: Phase) -> Result<Self::Scores>;

    /// Arg-max label per example, one entry per scored example
    fn predict(&self, scores: &Self::Scores) -> Result<Vec<usize>>;

    /// Compute the loss of `scores` against `labels`, back-propagate and
    /// apply one optimizer step. Returns the batch loss.
    fn backward_and_step(
        &mut self,
        scores: Self::Scores,
        labels: &[usize],
        learning_rate: f64,
    ) -> Result<f64>;

    /// Write the current parameters to `path`
    fn save(&self, path: &Path) -> Result<()>;
}
