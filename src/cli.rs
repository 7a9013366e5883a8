//! Command-line flags and config-file loading.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::de::DeserializeOwned;

use crate::config::{DatasetFormat, RunConfig};
use crate::utils::error::{ClassifierError, Result};

/// Train and evaluate a small CNN image classifier
#[derive(Parser, Debug, Default)]
#[command(name = "cnn_classifier", version, about = "Run a CNN image classifier.")]
pub struct CliArgs {
    /// TOML file providing any of the options below
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Dataset path
    #[arg(long = "dataset_path", value_name = "DIR")]
    pub dataset_path: Option<PathBuf>,

    /// Output path
    #[arg(long = "output_path", value_name = "DIR")]
    pub output_path: Option<PathBuf>,

    /// Whether not to train the model
    #[arg(long = "not_train")]
    pub not_train: bool,

    /// Whether to save the model after training
    #[arg(long)]
    pub save: bool,

    /// Batch size of train set
    #[arg(long = "train_batch_size", value_name = "N")]
    pub train_batch_size: Option<usize>,

    /// Number of epochs
    #[arg(long, value_name = "N")]
    pub epochs: Option<usize>,

    /// Learning rate
    #[arg(long, value_name = "LR")]
    pub lr: Option<f64>,

    /// Whether not to evaluate the model
    #[arg(long = "not_eval")]
    pub not_eval: bool,

    /// Batch size of dev set
    #[arg(long = "dev_batch_size", value_name = "N")]
    pub dev_batch_size: Option<usize>,

    /// Whether not to test the model
    #[arg(long = "not_test")]
    pub not_test: bool,

    /// Batch size of test set
    #[arg(long = "test_batch_size", value_name = "N")]
    pub test_batch_size: Option<usize>,

    /// Random seed for shuffling and weight initialization
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Dataset layout
    #[arg(long, value_enum)]
    pub format: Option<DatasetFormat>,

    /// Side length images are resized to (folder layout)
    #[arg(long = "image_size", value_name = "N")]
    pub image_size: Option<usize>,

    /// Image channels, 1 or 3 (folder layout)
    #[arg(long, value_name = "N")]
    pub channels: Option<usize>,

    /// Dev examples taken from the end of the training file (IDX layout)
    #[arg(long = "dev_size", value_name = "N")]
    pub dev_size: Option<usize>,

    /// Dropout rate of the classifier head
    #[arg(long, value_name = "P")]
    pub dropout: Option<f64>,

    /// Start from a saved epoch_<N>.pd instead of fresh weights
    #[arg(long = "model_path", value_name = "FILE")]
    pub model_path: Option<PathBuf>,

    /// Hide per-batch progress bars
    #[arg(long = "no_progress")]
    pub no_progress: bool,

    /// Verbose (debug) logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Build the run configuration: defaults, then `--config`, then flags
    pub fn resolve(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => load_toml_config(path)?,
            None => RunConfig::default(),
        };
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut RunConfig) {
        if let Some(ref path) = self.dataset_path {
            config.dataset_path = path.clone();
        }
        if let Some(ref path) = self.output_path {
            config.output_path = path.clone();
        }
        if let Some(size) = self.train_batch_size {
            config.train_batch_size = size;
        }
        if let Some(size) = self.dev_batch_size {
            config.dev_batch_size = size;
        }
        if let Some(size) = self.test_batch_size {
            config.test_batch_size = size;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(lr) = self.lr {
            config.lr = lr;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(size) = self.image_size {
            config.image_size = size;
        }
        if let Some(channels) = self.channels {
            config.channels = channels;
        }
        if let Some(size) = self.dev_size {
            config.dev_size = size;
        }
        if let Some(dropout) = self.dropout {
            config.dropout = dropout;
        }
        if let Some(ref path) = self.model_path {
            config.model_path = Some(path.clone());
        }

        // Flags can only switch behavior on
        config.not_train |= self.not_train;
        config.not_eval |= self.not_eval;
        config.not_test |= self.not_test;
        config.save |= self.save;
        if self.no_progress {
            config.progress = false;
        }
    }
}

pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| ClassifierError::Config(format!("Failed to read config {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| ClassifierError::Config(format!("Failed to parse config {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_no_flags_gives_defaults() {
        let args = CliArgs::parse_from(["cnn_classifier"]);
        assert_eq!(args.resolve().unwrap(), RunConfig::default());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = CliArgs::parse_from([
            "cnn_classifier",
            "--dataset_path",
            "/data/mnist",
            "--not_train",
            "--not_test",
            "--save",
            "--epochs",
            "3",
            "--lr",
            "0.5",
            "--dev_batch_size",
            "64",
            "--format",
            "folder",
        ]);
        let config = args.resolve().unwrap();

        assert_eq!(config.dataset_path, PathBuf::from("/data/mnist"));
        assert!(config.not_train);
        assert!(!config.not_eval);
        assert!(config.not_test);
        assert!(config.save);
        assert_eq!(config.epochs, 3);
        assert_eq!(config.lr, 0.5);
        assert_eq!(config.dev_batch_size, 64);
        assert_eq!(config.format, DatasetFormat::Folder);
    }

    #[test]
    fn test_file_then_flags_precedence() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run.toml");
        fs::write(&path, "epochs = 7\nlr = 0.1\nsave = true\nprogress = false\n").unwrap();

        let args = CliArgs::parse_from([
            "cnn_classifier",
            "--config",
            path.to_str().unwrap(),
            "--lr",
            "0.2",
        ]);
        let config = args.resolve().unwrap();

        assert_eq!(config.epochs, 7);
        assert_eq!(config.lr, 0.2);
        assert!(config.save);
        assert!(!config.progress);
        assert_eq!(config.train_batch_size, 1000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let args = CliArgs::parse_from(["cnn_classifier", "--train_batch_size", "0"]);
        assert!(matches!(args.resolve(), Err(ClassifierError::Config(_))));
    }

    #[test]
    fn test_unreadable_config_file() {
        let args = CliArgs {
            config: Some(PathBuf::from("/definitely/not/here.toml")),
            ..Default::default()
        };
        assert!(matches!(args.resolve(), Err(ClassifierError::Config(_))));
    }
}
