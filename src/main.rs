//! cnn_classifier CLI
//!
//! Loads the dataset, builds the CNN and runs the train/eval/test loop.
//! Stdout carries the configuration echo, phase banners and accuracies;
//! logs and progress bars go to stderr.

use std::fs;
use std::io::{self, Write};
use std::time::Instant;

use anyhow::{Context, Result};
use burn::config::Config;
use burn::optim::SgdConfig;
use burn::tensor::backend::Backend;
use clap::Parser;
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use cnn_classifier::backend::{self, TrainingBackend};
use cnn_classifier::cli::CliArgs;
use cnn_classifier::dataset;
use cnn_classifier::utils::{format_duration, init_logging, LogConfig};
use cnn_classifier::{BurnModel, Classifier, ConvNet, ConvNetConfig, RunConfig};

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let log_config = if args.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    init_logging(&log_config)?;

    let config = args.resolve().context("Invalid configuration")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    print_config(&mut out, &config)?;

    fs::create_dir_all(&config.output_path).with_context(|| {
        format!("Failed to create output directory {}", config.output_path.display())
    })?;
    fs::write(
        config.output_path.join("config.toml"),
        toml::to_string_pretty(&config)?,
    )?;

    if !config.any_phase_enabled() {
        warn!("Train, eval and test are all disabled; epochs will only print blank lines");
    }

    let start = Instant::now();

    let splits = dataset::load_splits(&config).context("Failed to load dataset")?;
    if splits.train.is_empty() && !config.not_train {
        warn!("Training split is empty; training phases will not update the model");
    }

    let device = backend::init_device();
    TrainingBackend::seed(config.seed);

    let [channels, _, _] = splits.shape;
    let model_config = ConvNetConfig::new(splits.labels.len())
        .with_in_channels(channels)
        .with_dropout_rate(config.dropout);
    model_config
        .save(config.output_path.join("model.json"))
        .context("Failed to write model.json")?;

    let net = ConvNet::<TrainingBackend>::new(&model_config, &device);
    let mut model = BurnModel::new(net, SgdConfig::new().init(), splits.shape, device);
    if let Some(path) = &config.model_path {
        model = model
            .load(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;
    }
    info!("Model: {} parameters, {} classes", model.num_params(), splits.labels.len());

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut classifier = Classifier::new(&config, splits);
    let history = classifier.run(&mut model, &mut rng, &mut out)?;

    let metrics_path = config.output_path.join("metrics.json");
    history.save_json(&metrics_path)?;
    info!("Wrote {}", metrics_path.display());

    if let Some(best) = history.best_dev() {
        info!(
            "Best dev accuracy {:.4} at epoch {}",
            best.accuracy, best.epoch
        );
    }
    info!("Finished in {}", format_duration(start.elapsed().as_secs_f64()));

    Ok(())
}

fn print_config<W: Write>(out: &mut W, config: &RunConfig) -> Result<()> {
    writeln!(out, "{}", "Configuration:".cyan().bold())?;
    write!(out, "{}", toml::to_string_pretty(config)?)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
