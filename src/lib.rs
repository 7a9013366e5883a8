//! # cnn_classifier
//!
//! A small image-classification training harness built on the Burn framework.
//!
//! ## Modules
//!
//! - `dataset`: train/dev/test splits from an image-folder tree or MNIST IDX files
//! - `model`: the `Model` capability trait and its Burn CNN implementation
//! - `training`: the epoch/phase loop and the per-phase history it records
//! - `config` / `cli`: run configuration from defaults, a TOML file and flags
//! - `backend`: compile-time backend selection (NdArray or CUDA)
//! - `utils`: errors, logging and the confusion-matrix accumulator
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cnn_classifier::{dataset, training::Classifier, RunConfig};
//!
//! let config = RunConfig::default();
//! let splits = dataset::load_splits(&config)?;
//! let mut classifier = Classifier::new(&config, splits);
//! let history = classifier.run(&mut model, &mut rng, &mut std::io::stdout())?;
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

pub use config::{DatasetFormat, RunConfig};
pub use dataset::{DataSplits, Example, LabelSet};
pub use model::{BurnModel, ConvNet, ConvNetConfig, Model};
pub use training::{Classifier, Phase, PhaseSummary, RunHistory};
pub use utils::error::{ClassifierError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};
