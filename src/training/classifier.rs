//! Epoch/phase training loop
//!
//! Each epoch runs Train, Eval and Test in that order, skipping the phases
//! the configuration turns off. Banners and accuracies go to the caller's
//! output sink, progress bars and logs to stderr.

use std::fs;
use std::io::Write;

use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use super::{Phase, PhaseSummary, RunHistory};
use crate::config::RunConfig;
use crate::dataset::{batch_ranges, num_batches, DataSplits, Example};
use crate::model::Model;
use crate::utils::error::Result;
use crate::utils::metrics::Metrics;

const BANNER_DASHES: &str = "--------------------";

/// Drives a model through the configured epochs over the loaded splits
pub struct Classifier<'a> {
    config: &'a RunConfig,
    splits: DataSplits,
}

impl<'a> Classifier<'a> {
    pub fn new(config: &'a RunConfig, splits: DataSplits) -> Self {
        Self { config, splits }
    }

    /// Run every epoch
    ///
    /// The train split is reshuffled in place with `rng` at the start of
    /// each training phase. After the phases of an epoch the model is saved
    /// to `epoch_<N>.pd` when it was trained that epoch and saving is on.
    pub fn run<M, R, W>(&mut self, model: &mut M, rng: &mut R, out: &mut W) -> Result<RunHistory>
    where
        M: Model,
        R: Rng + ?Sized,
        W: Write,
    {
        fs::create_dir_all(&self.config.output_path)?;

        let mut history = RunHistory::new();

        for epoch in 0..self.config.epochs {
            if !self.config.not_train {
                self.splits.train.shuffle(rng);
                history.push(self.run_phase(epoch, Phase::Train, model, out)?);
            }
            if !self.config.not_eval {
                history.push(self.run_phase(epoch, Phase::Eval, model, out)?);
            }
            if !self.config.not_test {
                history.push(self.run_phase(epoch, Phase::Test, model, out)?);
            }

            if !self.config.not_train && self.config.save {
                let path = self.config.epoch_model_path(epoch);
                model.save(&path)?;
                info!("Saved epoch {} model to {}", epoch, path.display());
            }

            writeln!(out)?;
        }

        Ok(history)
    }

    fn split(&self, phase: Phase) -> (&[Example], usize) {
        match phase {
            Phase::Train => (&self.splits.train, self.config.train_batch_size),
            Phase::Eval => (&self.splits.dev, self.config.dev_batch_size),
            Phase::Test => (&self.splits.test, self.config.test_batch_size),
        }
    }

    fn run_phase<M, W>(
        &self,
        epoch: usize,
        phase: Phase,
        model: &mut M,
        out: &mut W,
    ) -> Result<PhaseSummary>
    where
        M: Model,
        W: Write,
    {
        writeln!(out, "{BANNER_DASHES}{} epoch {}{BANNER_DASHES}", phase.verb(), epoch)?;
        out.flush()?;

        let (examples, batch_size) = self.split(phase);
        let mut metrics = Metrics::new(&self.splits.labels);
        let progress = self.progress_bar(num_batches(examples.len(), batch_size), phase, epoch);

        let mut loss_sum = 0.0;
        let mut steps = 0usize;

        for range in batch_ranges(examples.len(), batch_size) {
            let batch = &examples[range];
            let actual: Vec<usize> = batch.iter().map(|e| e.label).collect();

            let scores = model.forward(batch, phase)?;
            let predicted = model.predict(&scores)?;

            if phase.is_train() {
                let loss = model.backward_and_step(scores, &actual, self.config.lr)?;
                debug!("Epoch {} batch {}: loss {:.4}", epoch, steps, loss);
                progress.set_message(format!("loss {loss:.4}"));
                loss_sum += loss;
                steps += 1;
            }

            metrics.update(&actual, &predicted)?;
            progress.inc(1);
        }
        progress.finish_and_clear();

        let accuracy = metrics.accuracy();
        writeln!(out, "{accuracy}")?;

        let loss = (steps > 0).then(|| loss_sum / steps as f64);
        match loss {
            Some(loss) => info!(
                "Epoch {} {}: accuracy {:.4}, loss {:.4} over {} examples",
                epoch,
                phase,
                accuracy,
                loss,
                metrics.total()
            ),
            None => info!(
                "Epoch {} {}: accuracy {:.4} over {} examples",
                epoch,
                phase,
                accuracy,
                metrics.total()
            ),
        }
        if !phase.is_train() && metrics.total() > 0 {
            debug!("Epoch {} {} report:\n{}", epoch, phase, metrics);
        }

        Ok(PhaseSummary {
            epoch,
            phase,
            accuracy,
            loss,
            num_examples: metrics.total(),
        })
    }

    fn progress_bar(&self, len: usize, phase: Phase, epoch: usize) -> ProgressBar {
        if !self.config.progress {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches {prefix} {msg}")
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress.set_style(style);
        progress.set_prefix(format!("({phase} epoch {epoch})"));
        progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::LabelSet;
    use crate::utils::error::ClassifierError;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Predicts the label stored in the first pixel and records every call
    #[derive(Default)]
    struct StubModel {
        forwards: RefCell<Vec<(Phase, Vec<usize>)>>,
        steps: usize,
        fail_forward: bool,
    }

    impl Model for StubModel {
        type Scores = Vec<usize>;

        fn forward(&self, batch: &[Example], phase: Phase) -> Result<Vec<usize>> {
            if self.fail_forward {
                return Err(ClassifierError::Model("forward failed".to_string()));
            }
            let ids: Vec<usize> = batch.iter().map(|e| e.image[0] as usize).collect();
            self.forwards.borrow_mut().push((phase, ids.clone()));
            Ok(ids)
        }

        fn predict(&self, scores: &Vec<usize>) -> Result<Vec<usize>> {
            Ok(scores.iter().map(|id| id % 3).collect())
        }

        fn backward_and_step(
            &mut self,
            _scores: Vec<usize>,
            _labels: &[usize],
            _learning_rate: f64,
        ) -> Result<f64> {
            self.steps += 1;
            Ok(0.5)
        }

        fn save(&self, path: &Path) -> Result<()> {
            fs::write(path, b"stub")?;
            Ok(())
        }
    }

    impl StubModel {
        fn calls(&self, phase: Phase) -> Vec<Vec<usize>> {
            self.forwards
                .borrow()
                .iter()
                .filter(|(p, _)| *p == phase)
                .map(|(_, ids)| ids.clone())
                .collect()
        }
    }

    /// Example `id` has label `id % 3`, so the stub is always right
    fn examples(ids: std::ops::Range<usize>) -> Vec<Example> {
        ids.map(|id| Example::new(vec![id as f32], id % 3)).collect()
    }

    fn splits(train: usize, dev: usize, test: usize) -> DataSplits {
        DataSplits {
            train: examples(0..train),
            dev: examples(100..100 + dev),
            test: examples(200..200 + test),
            labels: LabelSet::new(vec!["0".into(), "1".into(), "2".into()]),
            shape: [1, 1, 1],
        }
    }

    fn config(output: PathBuf) -> RunConfig {
        RunConfig {
            output_path: output,
            epochs: 1,
            train_batch_size: 4,
            dev_batch_size: 3,
            test_batch_size: 5,
            progress: false,
            ..Default::default()
        }
    }

    fn run(config: &RunConfig, splits: DataSplits, model: &mut StubModel) -> (Result<RunHistory>, String) {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut out = Vec::new();
        let result = Classifier::new(config, splits).run(model, &mut rng, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_all_phases_off_prints_blank_line_only() {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig {
            not_train: true,
            not_eval: true,
            not_test: true,
            save: true,
            ..config(tmp.path().join("out"))
        };
        let mut model = StubModel::default();

        let (history, output) = run(&config, splits(10, 3, 3), &mut model);

        assert!(history.unwrap().is_empty());
        assert_eq!(output, "\n");
        assert!(!config.epoch_model_path(0).exists());
        assert!(model.forwards.borrow().is_empty());
    }

    #[test]
    fn test_output_format() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path().to_path_buf());
        let mut model = StubModel::default();

        let (history, output) = run(&config, splits(10, 3, 5), &mut model);
        history.unwrap();

        let expected = "\
--------------------Training epoch 0--------------------
1
--------------------Evaluating epoch 0--------------------
1
--------------------Testing epoch 0--------------------
1

";
        assert_eq!(output, expected);
    }

    #[test]
    fn test_save_writes_epoch_file() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("run");
        let config = RunConfig {
            save: true,
            epochs: 2,
            ..config(output.clone())
        };
        let mut model = StubModel::default();

        run(&config, splits(10, 3, 3), &mut model).0.unwrap();

        assert!(output.join("epoch_0.pd").exists());
        assert!(output.join("epoch_1.pd").exists());
    }

    #[test]
    fn test_no_save_without_training() {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig {
            save: true,
            not_train: true,
            ..config(tmp.path().to_path_buf())
        };
        let mut model = StubModel::default();

        run(&config, splits(10, 3, 3), &mut model).0.unwrap();

        assert!(!config.epoch_model_path(0).exists());
        assert_eq!(model.steps, 0);
    }

    #[test]
    fn test_one_step_per_train_batch() {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig {
            epochs: 2,
            ..config(tmp.path().to_path_buf())
        };
        let mut model = StubModel::default();

        let history = run(&config, splits(10, 7, 11), &mut model).0.unwrap();

        // 10 / 4 -> 3 batches per epoch; eval and test never step
        assert_eq!(model.steps, 6);
        let train_sizes: Vec<usize> = model.calls(Phase::Train).iter().map(Vec::len).collect();
        assert_eq!(train_sizes, vec![4, 4, 2, 4, 4, 2]);
        assert_eq!(model.calls(Phase::Eval).len(), 2 * 3);
        assert_eq!(model.calls(Phase::Test).len(), 2 * 3);

        let train: Vec<&PhaseSummary> = history.of_phase(Phase::Train).collect();
        assert_eq!(train.len(), 2);
        assert_eq!(train[0].loss, Some(0.5));
        assert_eq!(train[0].num_examples, 10);
        assert!(history.of_phase(Phase::Test).all(|s| s.loss.is_none()));
    }

    #[test]
    fn test_eval_and_test_keep_order() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path().to_path_buf());
        let mut model = StubModel::default();

        run(&config, splits(4, 4, 2), &mut model).0.unwrap();

        assert_eq!(model.calls(Phase::Eval), vec![vec![100, 101, 102], vec![103]]);
        assert_eq!(model.calls(Phase::Test), vec![vec![200, 201]]);
    }

    #[test]
    fn test_same_seed_same_shuffle() {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig {
            epochs: 3,
            not_eval: true,
            not_test: true,
            ..config(tmp.path().to_path_buf())
        };

        let mut first = StubModel::default();
        let mut second = StubModel::default();
        run(&config, splits(20, 0, 0), &mut first).0.unwrap();
        run(&config, splits(20, 0, 0), &mut second).0.unwrap();

        let order = first.calls(Phase::Train);
        assert_eq!(order, second.calls(Phase::Train));

        let first_epoch: Vec<usize> = order[..5].concat();
        let identity: Vec<usize> = (0..20).collect();
        assert_ne!(first_epoch, identity);

        let mut seen = first_epoch.clone();
        seen.sort();
        assert_eq!(seen, identity);

        // Reshuffled each epoch
        assert_ne!(order[5..10].concat(), first_epoch);
    }

    #[test]
    fn test_different_seed_different_shuffle() {
        let tmp = TempDir::new().unwrap();
        let base = RunConfig {
            not_eval: true,
            not_test: true,
            ..config(tmp.path().to_path_buf())
        };
        let other = RunConfig { seed: base.seed + 1, ..base.clone() };

        let mut first = StubModel::default();
        let mut second = StubModel::default();
        run(&base, splits(20, 0, 0), &mut first).0.unwrap();
        run(&other, splits(20, 0, 0), &mut second).0.unwrap();

        assert_ne!(first.calls(Phase::Train), second.calls(Phase::Train));
    }

    #[test]
    fn test_empty_split_reports_zero() {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig {
            not_train: true,
            not_test: true,
            ..config(tmp.path().to_path_buf())
        };
        let mut model = StubModel::default();

        let (history, output) = run(&config, splits(4, 0, 0), &mut model);
        let history = history.unwrap();

        assert_eq!(output, "--------------------Evaluating epoch 0--------------------\n0\n\n");
        assert_eq!(history.phases[0].accuracy, 0.0);
        assert_eq!(history.phases[0].num_examples, 0);
    }

    #[test]
    fn test_forward_error_aborts_run() {
        let tmp = TempDir::new().unwrap();
        let config = RunConfig {
            save: true,
            ..config(tmp.path().to_path_buf())
        };
        let mut model = StubModel {
            fail_forward: true,
            ..Default::default()
        };

        let (result, _) = run(&config, splits(4, 2, 2), &mut model);

        assert!(matches!(result, Err(ClassifierError::Model(_))));
        assert!(!config.epoch_model_path(0).exists());
    }

    #[test]
    fn test_creates_output_dir() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("a").join("b");
        let config = RunConfig {
            not_train: true,
            ..config(output.clone())
        };
        let mut model = StubModel::default();

        run(&config, splits(0, 1, 1), &mut model).0.unwrap();
        assert!(output.is_dir());
    }
}
