//! Dataset module
//!
//! This module provides:
//! - The in-memory example and label-set types shared by the loop and metrics
//! - Loading of train/dev/test splits from an image-folder tree or MNIST IDX files
//! - Contiguous batch partitioning
//!
//! ## Layouts
//!
//! Folder layout, one directory per label in every split:
//! ```text
//! root/
//! ├── train/<label>/*.png
//! ├── dev/<label>/*.png
//! └── test/<label>/*.png
//! ```
//!
//! IDX layout (MNIST): `train-images-idx3-ubyte`, `train-labels-idx1-ubyte`,
//! `t10k-images-idx3-ubyte`, `t10k-labels-idx1-ubyte` in the root directory.

pub mod idx;
pub mod loader;

use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{DatasetFormat, RunConfig};
use crate::utils::error::Result;

/// One labeled image
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    /// Pixel data, CHW, scaled to [0, 1]
    pub image: Vec<f32>,
    /// Position of the label in the run's `LabelSet`
    pub label: usize,
}

impl Example {
    pub fn new(image: Vec<f32>, label: usize) -> Self {
        Self { image, label }
    }
}

/// Ordered, distinct label identifiers fixed for the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of a label name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// The three splits plus their shared label set
#[derive(Debug, Clone)]
pub struct DataSplits {
    pub train: Vec<Example>,
    pub dev: Vec<Example>,
    pub test: Vec<Example>,
    pub labels: LabelSet,
    /// Image shape as (channels, height, width)
    pub shape: [usize; 3],
}

impl DataSplits {
    /// Log split sizes
    pub fn log_stats(&self) {
        info!(
            "Dataset: {} train / {} dev / {} test examples, {} labels, images {:?}",
            self.train.len(),
            self.dev.len(),
            self.test.len(),
            self.labels.len(),
            self.shape
        );
    }
}

/// Load the splits described by the run configuration
pub fn load_splits(config: &RunConfig) -> Result<DataSplits> {
    let root = config.dataset_path.as_path();
    let format = match config.format {
        DatasetFormat::Auto => detect_format(root),
        other => other,
    };

    info!("Reading {:?} dataset from {}", format, root.display());

    let splits = match format {
        DatasetFormat::Idx => idx::load_idx_splits(root, config.dev_size)?,
        DatasetFormat::Folder | DatasetFormat::Auto => {
            loader::load_folder_splits(root, config.image_size, config.channels)?
        }
    };

    splits.log_stats();
    Ok(splits)
}

/// IDX when the MNIST training image file is present, folder otherwise
pub fn detect_format(root: &Path) -> DatasetFormat {
    if idx::find_idx_file(root, "train-images", "idx3").is_some() {
        DatasetFormat::Idx
    } else {
        DatasetFormat::Folder
    }
}

/// Contiguous index ranges of at most `batch_size` covering `0..len`
///
/// Only the last range may be shorter. `batch_size` must be non-zero.
pub fn batch_ranges(len: usize, batch_size: usize) -> impl Iterator<Item = Range<usize>> {
    assert!(batch_size > 0, "batch size must be non-zero");
    (0..len)
        .step_by(batch_size)
        .map(move |start| start..(start + batch_size).min(len))
}

/// Number of batches `batch_ranges` yields
pub fn num_batches(len: usize, batch_size: usize) -> usize {
    (len + batch_size - 1) / batch_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_ranges_last_batch_shorter() {
        let sizes: Vec<usize> = batch_ranges(10, 4).map(|r| r.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(num_batches(10, 4), 3);
    }

    #[test]
    fn test_batch_ranges_are_contiguous() {
        let ranges: Vec<Range<usize>> = batch_ranges(7, 3).collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..7]);
    }

    #[test]
    fn test_batch_ranges_exact_and_empty() {
        assert_eq!(batch_ranges(8, 4).count(), 2);
        assert_eq!(batch_ranges(0, 4).count(), 0);
        assert_eq!(num_batches(0, 4), 0);
    }

    #[test]
    fn test_label_set_lookup() {
        let labels = LabelSet::new(vec!["cat".into(), "dog".into()]);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.index_of("dog"), Some(1));
        assert_eq!(labels.index_of("bird"), None);
        assert_eq!(labels.names()[0], "cat");
    }

    #[test]
    fn test_detect_format_defaults_to_folder() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(detect_format(dir.path()), DatasetFormat::Folder);

        std::fs::write(dir.path().join("train-images-idx3-ubyte"), b"").unwrap();
        assert_eq!(detect_format(dir.path()), DatasetFormat::Idx);
    }
}
