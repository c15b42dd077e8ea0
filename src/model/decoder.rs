//! Decoder Upsampling Stages
//!
//! Each stage doubles the spatial resolution of its input through a learned
//! transposed convolution, then applies batch normalization, optional
//! dropout, and a ReLU nonlinearity.

use burn::{
    module::Module,
    nn::{
        conv::{ConvTranspose2d, ConvTranspose2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Padding pair (padding, padding_out) that makes a stride-2 transposed
/// convolution produce exactly 2x the input size for the given kernel
pub fn upsample_padding(kernel_size: usize) -> ([usize; 2], [usize; 2]) {
    if kernel_size % 2 == 0 {
        let p = (kernel_size - 2) / 2;
        ([p, p], [0, 0])
    } else {
        let p = (kernel_size - 1) / 2;
        ([p, p], [1, 1])
    }
}

/// Build a 2x-upsampling transposed convolution
pub fn upsample_conv<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    device: &B::Device,
) -> ConvTranspose2d<B> {
    let (padding, padding_out) = upsample_padding(kernel_size);
    ConvTranspose2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_stride([2, 2])
        .with_padding(padding)
        .with_padding_out(padding_out)
        .init(device)
}

/// One learned upsampling stage
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    deconv: ConvTranspose2d<B>,
    bn: BatchNorm<B, 2>,
    dropout: Option<Dropout>,
    relu: Relu,
}

impl<B: Backend> UpBlock<B> {
    /// Create a stage mapping `in_channels` to `out_channels` at 2x the
    /// spatial resolution
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        dropout: Option<f64>,
        device: &B::Device,
    ) -> Self {
        Self {
            deconv: upsample_conv(in_channels, out_channels, kernel_size, device),
            bn: BatchNormConfig::new(out_channels).init(device),
            dropout: dropout.map(|rate| DropoutConfig::new(rate).init()),
            relu: Relu::new(),
        }
    }

    /// Forward pass: upsample, normalize, optional dropout, activate
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.deconv.forward(x);
        let x = self.bn.forward(x);
        let x = match &self.dropout {
            Some(dropout) => dropout.forward(x),
            None => x,
        };
        self.relu.forward(x)
    }
}
