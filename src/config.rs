//! Run configuration.
//!
//! A `RunConfig` is assembled once at startup (defaults, then an optional
//! TOML file, then command-line flags) and is read-only afterwards.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::cnn::MIN_INPUT_SIZE;
use crate::utils::error::{ClassifierError, Result};

/// On-disk dataset layout
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    /// IDX when MNIST files are present, folder otherwise
    Auto,
    /// MNIST IDX files
    Idx,
    /// `train/`, `dev/`, `test/` trees of per-label image directories
    Folder,
}

impl std::fmt::Display for DatasetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetFormat::Auto => write!(f, "auto"),
            DatasetFormat::Idx => write!(f, "idx"),
            DatasetFormat::Folder => write!(f, "folder"),
        }
    }
}

/// Everything a run needs to know, fixed for the process lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Dataset root directory
    pub dataset_path: PathBuf,
    /// Directory receiving `epoch_<N>.pd` files and run artifacts
    pub output_path: PathBuf,

    /// Skip the training phase
    pub not_train: bool,
    /// Persist the model after each trained epoch
    pub save: bool,
    pub train_batch_size: usize,
    pub epochs: usize,
    /// SGD learning rate
    pub lr: f64,

    /// Skip the dev-set evaluation phase
    pub not_eval: bool,
    pub dev_batch_size: usize,

    /// Skip the test phase
    pub not_test: bool,
    pub test_batch_size: usize,

    /// Seed for shuffling and parameter initialization
    pub seed: u64,
    pub format: DatasetFormat,
    /// Square side images are resized to (folder layout)
    pub image_size: usize,
    /// 1 for grayscale, 3 for RGB (folder layout)
    pub channels: usize,
    /// Dev examples carved from the training file (IDX layout)
    pub dev_size: usize,
    /// Dropout rate of the classifier head
    pub dropout: f64,
    /// Saved model to start from instead of fresh weights
    pub model_path: Option<PathBuf>,
    /// Draw per-batch progress bars
    pub progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("./data"),
            output_path: PathBuf::from("./output/1000_0.01_dropout0.7"),
            not_train: false,
            save: false,
            train_batch_size: 1000,
            epochs: 20,
            lr: 0.01,
            not_eval: false,
            dev_batch_size: 2000,
            not_test: false,
            test_batch_size: 2000,
            seed: 42,
            format: DatasetFormat::Auto,
            image_size: 28,
            channels: 1,
            dev_size: 5000,
            dropout: 0.3,
            model_path: None,
            progress: true,
        }
    }
}

impl RunConfig {
    /// Check the invariants the loop and the model rely on
    pub fn validate(&self) -> Result<()> {
        let batch_sizes = [
            ("train_batch_size", self.train_batch_size),
            ("dev_batch_size", self.dev_batch_size),
            ("test_batch_size", self.test_batch_size),
        ];
        for (name, size) in batch_sizes {
            if size == 0 {
                return Err(ClassifierError::Config(format!("{name} must be greater than 0")));
            }
        }

        if !(self.lr > 0.0) {
            return Err(ClassifierError::Config(format!(
                "lr must be positive, got {}",
                self.lr
            )));
        }
        if self.image_size < MIN_INPUT_SIZE {
            return Err(ClassifierError::Config(format!(
                "image_size must be at least {MIN_INPUT_SIZE}, got {}",
                self.image_size
            )));
        }
        if self.channels != 1 && self.channels != 3 {
            return Err(ClassifierError::Config(format!(
                "channels must be 1 or 3, got {}",
                self.channels
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ClassifierError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }

        Ok(())
    }

    /// Path of the model file written after training epoch `epoch`
    pub fn epoch_model_path(&self, epoch: usize) -> PathBuf {
        self.output_path.join(format!("epoch_{epoch}.pd"))
    }

    /// Whether any phase runs at all
    pub fn any_phase_enabled(&self) -> bool {
        !(self.not_train && self.not_eval && self.not_test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.dataset_path, PathBuf::from("./data"));
        assert_eq!(config.train_batch_size, 1000);
        assert_eq!(config.dev_batch_size, 2000);
        assert_eq!(config.test_batch_size, 2000);
        assert_eq!(config.epochs, 20);
        assert_eq!(config.lr, 0.01);
        assert!(!config.save);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad = [
            RunConfig { train_batch_size: 0, ..Default::default() },
            RunConfig { test_batch_size: 0, ..Default::default() },
            RunConfig { lr: 0.0, ..Default::default() },
            RunConfig { lr: f64::NAN, ..Default::default() },
            RunConfig { channels: 2, ..Default::default() },
            RunConfig { image_size: 0, ..Default::default() },
            RunConfig { image_size: 2, ..Default::default() },
            RunConfig { image_size: 3, ..Default::default() },
            RunConfig { dropout: 1.0, ..Default::default() },
        ];

        for config in bad {
            assert!(
                matches!(config.validate(), Err(ClassifierError::Config(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_smallest_image_size_accepted() {
        let config = RunConfig { image_size: MIN_INPUT_SIZE, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_epoch_model_path() {
        let config = RunConfig {
            output_path: PathBuf::from("/tmp/run"),
            ..Default::default()
        };
        assert_eq!(config.epoch_model_path(0), PathBuf::from("/tmp/run/epoch_0.pd"));
        assert_eq!(config.epoch_model_path(12), PathBuf::from("/tmp/run/epoch_12.pd"));
    }

    #[test]
    fn test_toml_roundtrip_uses_defaults_for_missing_keys() {
        let config: RunConfig = toml::from_str("epochs = 3\nformat = \"idx\"\n").unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.format, DatasetFormat::Idx);
        assert_eq!(config.lr, 0.01);

        let text = toml::to_string_pretty(&config).unwrap();
        let back: RunConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_any_phase_enabled() {
        let config = RunConfig {
            not_train: true,
            not_eval: true,
            not_test: true,
            ..Default::default()
        };
        assert!(!config.any_phase_enabled());
        assert!(RunConfig::default().any_phase_enabled());
    }
}
