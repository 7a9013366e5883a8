//! Metrics Module for Model Evaluation
//!
//! Provides the per-phase metrics accumulator used by the training loop:
//! - Confusion matrix over a fixed label set
//! - Accuracy on demand
//! - Per-class precision, recall and F1-score

use serde::{Deserialize, Serialize};

use crate::dataset::LabelSet;
use crate::utils::error::{ClassifierError, Result};

/// Confusion-matrix accumulator for one epoch-phase
///
/// Counts only ever grow, and their sum equals the number of pairs folded in
/// since construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// Label names, indexed by label position
    class_names: Vec<String>,

    /// Confusion matrix
    confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Create an empty accumulator for the given label set
    pub fn new(labels: &LabelSet) -> Self {
        Self {
            class_names: labels.names().to_vec(),
            confusion_matrix: ConfusionMatrix::new(labels.len()),
        }
    }

    /// Fold a batch of (actual, predicted) label pairs into the matrix
    ///
    /// The whole batch is validated before any count changes, so a rejected
    /// batch leaves the accumulator untouched.
    pub fn update(&mut self, actual: &[usize], predicted: &[usize]) -> Result<()> {
        if actual.len() != predicted.len() {
            return Err(ClassifierError::InvalidInput(format!(
                "actual and predicted labels differ in length ({} vs {})",
                actual.len(),
                predicted.len()
            )));
        }

        let num_classes = self.confusion_matrix.num_classes;
        if let Some(bad) = actual
            .iter()
            .chain(predicted.iter())
            .find(|&&label| label >= num_classes)
        {
            return Err(ClassifierError::InvalidInput(format!(
                "label {} is outside the label set of size {}",
                bad, num_classes
            )));
        }

        for (&a, &p) in actual.iter().zip(predicted.iter()) {
            self.confusion_matrix.add(a, p);
        }

        Ok(())
    }

    /// Overall accuracy (diagonal / total), 0.0 when nothing was seen
    pub fn accuracy(&self) -> f64 {
        self.confusion_matrix.accuracy()
    }

    /// Number of examples folded in so far
    pub fn total(&self) -> usize {
        self.confusion_matrix.total()
    }

    /// Number of correct predictions
    pub fn correct(&self) -> usize {
        self.confusion_matrix.correct()
    }

    pub fn confusion_matrix(&self) -> &ConfusionMatrix {
        &self.confusion_matrix
    }

    /// Per-class metrics, one entry per label in label-set order
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        let cm = &self.confusion_matrix;
        let support = cm.row_sums();
        let predicted = cm.col_sums();

        self.class_names
            .iter()
            .enumerate()
            .map(|(i, name)| ClassMetrics::new(name, cm.get(i, i), predicted[i], support[i]))
            .collect()
    }

    /// Macro-averaged F1 over classes that have support
    pub fn macro_f1(&self) -> f64 {
        let per_class = self.class_metrics();
        let valid: Vec<&ClassMetrics> = per_class.iter().filter(|m| m.support > 0).collect();

        if valid.is_empty() {
            0.0
        } else {
            valid.iter().map(|m| m.f1).sum::<f64>() / valid.len() as f64
        }
    }

    /// Multi-line per-class report
    pub fn display(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "{:<16} {:>9} {:>9} {:>9} {:>8}\n",
            "class", "precision", "recall", "f1", "support"
        ));
        for m in self.class_metrics() {
            output.push_str(&format!(
                "{:<16.16} {:>9.4} {:>9.4} {:>9.4} {:>8}\n",
                m.class_name,
                m.precision,
                m.recall,
                m.f1,
                m.support
            ));
        }
        output.push_str(&format!(
            "accuracy {:.4} ({}/{}), macro f1 {:.4}\n",
            self.accuracy(),
            self.correct(),
            self.total(),
            self.macro_f1()
        ));

        output
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Precision, recall and F1 of one label
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_name: String,
    /// Examples of this label predicted as this label
    pub correct: usize,
    /// Examples predicted as this label
    pub predicted: usize,
    /// Examples actually of this label
    pub support: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl ClassMetrics {
    pub fn new(class_name: &str, correct: usize, predicted: usize, support: usize) -> Self {
        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        let precision = ratio(correct, predicted);
        let recall = ratio(correct, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_name: class_name.to_string(),
            correct,
            predicted,
            support,
            precision,
            recall,
            f1,
        }
    }
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Matrix data (row = actual, column = predicted), row-major
    matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Add a single prediction; callers guarantee both indices are in range
    fn add(&mut self, actual: usize, predicted: usize) {
        self.matrix[actual * self.num_classes + predicted] += 1;
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Count per actual label
    pub fn row_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|row| (0..self.num_classes).map(|col| self.get(row, col)).sum())
            .collect()
    }

    /// Count per predicted label
    pub fn col_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|col| (0..self.num_classes).map(|row| self.get(row, col)).sum())
            .collect()
    }
}
