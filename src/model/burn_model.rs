//! Burn-backed implementation of [`Model`]
//!
//! Wraps a [`ConvNet`] on an autodiff backend together with its optimizer.
//! Training batches run through the autodiff network; evaluation batches
//! run through `valid()` so dropout is off and no graph is recorded.

use std::fs;
use std::path::Path;

use burn::{
    module::{AutodiffModule, Module},
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    optim::{GradientsParams, Optimizer},
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{
        activation::softmax,
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor, TensorData,
    },
};
use tracing::{debug, info};

use super::{ConvNet, Model};
use crate::dataset::Example;
use crate::training::Phase;
use crate::utils::error::{ClassifierError, Result, ResultExt};

/// A [`ConvNet`] plus the optimizer that trains it
pub struct BurnModel<B, O>
where
    B: AutodiffBackend,
{
    net: ConvNet<B>,
    optimizer: O,
    loss: CrossEntropyLoss<B>,
    /// Image shape as (channels, height, width)
    shape: [usize; 3],
    device: B::Device,
}

impl<B, O> BurnModel<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ConvNet<B>, B>,
{
    pub fn new(net: ConvNet<B>, optimizer: O, shape: [usize; 3], device: B::Device) -> Self {
        let loss = CrossEntropyLossConfig::new().init(&device);
        Self {
            net,
            optimizer,
            loss,
            shape,
            device,
        }
    }

    /// Replace the parameters with the ones stored in a saved model file
    pub fn load(mut self, path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ClassifierError::PathNotFound(path.to_path_buf()));
        }

        let bytes = fs::read(path)?;
        let record = BinBytesRecorder::<FullPrecisionSettings>::default()
            .load(bytes, &self.device)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;
        self.net = self.net.load_record(record);

        info!("Loaded model parameters from {}", path.display());
        Ok(self)
    }

    pub fn num_params(&self) -> usize {
        self.net.num_params()
    }
}

/// Stack a batch into a `[batch, channels, height, width]` tensor
fn images_tensor<BK: Backend>(
    batch: &[Example],
    shape: [usize; 3],
    device: &BK::Device,
) -> Result<Tensor<BK, 4>> {
    if batch.is_empty() {
        return Err(ClassifierError::InvalidInput("cannot score an empty batch".to_string()));
    }

    let [channels, height, width] = shape;
    let image_len = channels * height * width;

    let mut data = Vec::with_capacity(batch.len() * image_len);
    for (i, example) in batch.iter().enumerate() {
        if example.image.len() != image_len {
            return Err(ClassifierError::InvalidInput(format!(
                "example {} has {} values, expected {} for shape {:?}",
                i,
                example.image.len(),
                image_len,
                shape
            )));
        }
        data.extend_from_slice(&example.image);
    }

    Ok(Tensor::from_data(
        TensorData::new(data, [batch.len(), channels, height, width]),
        device,
    ))
}

impl<B, O> Model for BurnModel<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ConvNet<B>, B>,
{
    type Scores = Tensor<B, 2>;

    fn forward(&self, batch: &[Example], phase: Phase) -> Result<Tensor<B, 2>> {
        match phase {
            Phase::Train => {
                let images = images_tensor::<B>(batch, self.shape, &self.device)?;
                Ok(self.net.forward(images))
            }
            Phase::Eval | Phase::Test => {
                let images = images_tensor::<B::InnerBackend>(batch, self.shape, &self.device)?;
                Ok(Tensor::from_inner(self.net.valid().forward(images)))
            }
        }
    }

    fn predict(&self, scores: &Tensor<B, 2>) -> Result<Vec<usize>> {
        let probabilities = softmax(scores.clone().inner(), 1);
        let predicted = probabilities
            .argmax(1)
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .context("Failed to read predictions")?;

        Ok(predicted.into_iter().map(|p| p as usize).collect())
    }

    fn backward_and_step(
        &mut self,
        scores: Tensor<B, 2>,
        labels: &[usize],
        learning_rate: f64,
    ) -> Result<f64> {
        let [batch_size, _] = scores.dims();
        if labels.len() != batch_size {
            return Err(ClassifierError::InvalidInput(format!(
                "{} labels for a batch of {} scores",
                labels.len(),
                batch_size
            )));
        }

        let targets: Vec<i64> = labels.iter().map(|&label| label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [batch_size]), &self.device);

        let loss = self.loss.forward(scores, targets);
        let loss_value = loss.clone().into_scalar().elem::<f64>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.net);
        self.net = self.optimizer.step(learning_rate, self.net.clone(), grads);

        debug!("Batch of {} examples, loss {:.4}", batch_size, loss_value);
        Ok(loss_value)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let bytes = BinBytesRecorder::<FullPrecisionSettings>::default()
            .record(self.net.clone().into_record(), ())
            .context("Failed to serialize model")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;

        debug!("Saved model to {}", path.display());
        Ok(())
    }
}
