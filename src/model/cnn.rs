//! CNN architecture
//!
//! Two convolutional blocks followed by global average pooling and a small
//! fully connected head. Global pooling keeps the head independent of the
//! input resolution, so the same network serves 28x28 MNIST digits and
//! larger folder images.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Smallest height or width the two 2x2 pools accept
pub const MIN_INPUT_SIZE: usize = 4;

/// Configuration for the ConvNet model
#[derive(Config, Debug)]
pub struct ConvNetConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Number of input channels (1 for grayscale, 3 for RGB)
    #[config(default = "1")]
    pub in_channels: usize,

    /// Filters of the first convolution, doubled by the second
    #[config(default = "16")]
    pub base_filters: usize,

    /// Width of the hidden fully connected layer
    #[config(default = "128")]
    pub hidden_size: usize,

    /// Dropout rate before the output layer
    #[config(default = "0.3")]
    pub dropout_rate: f64,
}

/// Conv2d, ReLU and a 2x2 max pool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    relu: Relu,
    pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            conv,
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Small image classifier
///
/// Input `[batch, channels, height, width]` with height and width of at
/// least [`MIN_INPUT_SIZE`]; output `[batch, num_classes]` logits.
#[derive(Module, Debug)]
pub struct ConvNet<B: Backend> {
    conv1: ConvBlock<B>,
    conv2: ConvBlock<B>,
    global_pool: AdaptiveAvgPool2d,
    fc1: Linear<B>,
    relu: Relu,
    dropout: Dropout,
    fc2: Linear<B>,
}

impl<B: Backend> ConvNet<B> {
    pub fn new(config: &ConvNetConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        Self {
            conv1: ConvBlock::new(config.in_channels, base, device),
            conv2: ConvBlock::new(base, base * 2, device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(base * 2, config.hidden_size).init(device),
            relu: Relu::new(),
            dropout: DropoutConfig::new(config.dropout_rate).init(),
            fc2: LinearConfig::new(config.hidden_size, config.num_classes).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = self.relu.forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }
}
