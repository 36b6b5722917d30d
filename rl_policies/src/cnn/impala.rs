//! Residual convolutional feature extractor from the IMPALA paper
//! ("IMPALA: Scalable Distributed Deep-RL with Importance Weighted
//! Actor-Learner Architectures", Espeholt et al., 2018).
//!
//! ```text
//! image ─► [conv sequence depth d0] ─► ... ─► [conv sequence depth dn]
//!       ─► flatten ─► relu ─► dense 256 ─► relu
//!
//! conv sequence:  conv3x3 ─► maxpool3x3/2 ─► residual ─► residual
//! residual block: x + conv(relu(conv(relu(x))))
//! conv layer:     conv3x3 same ─► seeded dropout ─► [batch-stat norm]
//! ```
//!
//! Dropout layers are numbered in construction order, one per conv layer,
//! so a stack of `n` depths has `5 * n` of them.

use burn::module::{Module, Param};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Initializer, Linear, LinearConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::relu;

use super::shape::{same_padding, Padding, Spatial};
use crate::error::PolicyError;
use crate::nn::{BatchStatNorm, BatchStatNormConfig, SeededDropout, SeededDropoutConfig};

/// Configuration for [`ImpalaCnn`].
#[derive(Debug, Clone)]
pub struct ImpalaCnnConfig {
    /// Channels of the input image.
    pub in_channels: usize,
    /// Input height and width.
    pub input: Spatial,
    /// Channel depth of each conv sequence.
    pub depths: Vec<usize>,
    /// Dropout rate; 0 disables the masks.
    pub dropout: f32,
    pub use_batch_norm: bool,
    /// Width of the final dense layer.
    pub hidden_size: usize,
}

impl ImpalaCnnConfig {
    pub fn new(in_channels: usize, input: Spatial, depths: Vec<usize>) -> Self {
        Self {
            in_channels,
            input,
            depths,
            dropout: 0.0,
            use_batch_norm: false,
            hidden_size: 256,
        }
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_batch_norm(mut self, use_batch_norm: bool) -> Self {
        self.use_batch_norm = use_batch_norm;
        self
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    /// Spatial size after all pooling stages.
    pub fn output_spatial(&self) -> Spatial {
        self.depths
            .iter()
            .fold(self.input, |s, _| s.pool(3, 2, Padding::Same))
    }

    /// Number of features fed into the dense layer.
    pub fn flat_size(&self) -> usize {
        let last_depth = self.depths.last().copied().unwrap_or(self.in_channels);
        self.output_spatial().area() * last_depth
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<ImpalaCnn<B>, PolicyError> {
        if self.input.is_empty() {
            return Err(PolicyError::ObservationTooSmall {
                stage: "impala input",
                height: self.input.height,
                width: self.input.width,
            });
        }

        let mut sequences = Vec::with_capacity(self.depths.len());
        let mut channels = self.in_channels;
        let mut spatial = self.input;
        for &depth in &self.depths {
            sequences.push(self.conv_sequence(channels, depth, spatial, device));
            spatial = spatial.pool(3, 2, Padding::Same);
            channels = depth;
        }

        let flat_size = self.flat_size();
        log::debug!(
            "impala cnn: depths {:?}, final map {}x{}x{}, {} flat features",
            self.depths,
            channels,
            spatial.height,
            spatial.width,
            flat_size
        );

        let mut dense = LinearConfig::new(flat_size, self.hidden_size)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);
        dense.bias = Some(Param::from_tensor(Tensor::zeros([self.hidden_size], device)));

        Ok(ImpalaCnn {
            sequences,
            dense,
            flat_size,
            output_size: self.hidden_size,
        })
    }

    fn conv_layer<B: Backend>(
        &self,
        in_channels: usize,
        depth: usize,
        spatial: Spatial,
        device: &B::Device,
    ) -> ConvLayer<B> {
        let mut conv = Conv2dConfig::new([in_channels, depth], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);
        conv.bias = Some(Param::from_tensor(Tensor::zeros([depth], device)));

        ConvLayer {
            conv,
            dropout: SeededDropoutConfig::new(self.dropout, [depth, spatial.height, spatial.width])
                .init(device),
            norm: self
                .use_batch_norm
                .then(|| BatchStatNormConfig::new(depth).init(device)),
        }
    }

    fn conv_sequence<B: Backend>(
        &self,
        in_channels: usize,
        depth: usize,
        spatial: Spatial,
        device: &B::Device,
    ) -> ConvSequence<B> {
        let pooled = spatial.pool(3, 2, Padding::Same);
        let residual = |device: &B::Device| ResidualBlock {
            conv0: self.conv_layer(depth, depth, pooled, device),
            conv1: self.conv_layer(depth, depth, pooled, device),
        };

        ConvSequence {
            conv: self.conv_layer(in_channels, depth, spatial, device),
            pool: MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init(),
            res0: residual(device),
            res1: residual(device),
        }
    }
}

/// 3x3 same-padded convolution followed by seeded dropout and optional norm.
#[derive(Module, Debug)]
pub struct ConvLayer<B: Backend> {
    conv: Conv2d<B>,
    dropout: SeededDropout<B>,
    norm: Option<BatchStatNorm<B>>,
}

impl<B: Backend> ConvLayer<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.dropout.forward(self.conv.forward(input));
        match &self.norm {
            Some(norm) => norm.forward(out),
            None => out,
        }
    }

    fn dropout_mut(&mut self) -> &mut SeededDropout<B> {
        &mut self.dropout
    }
}

/// Pre-activation residual block that preserves channel depth.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv0: ConvLayer<B>,
    conv1: ConvLayer<B>,
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv0.forward(relu(input.clone()));
        let out = self.conv1.forward(relu(out));
        out + input
    }
}

/// 3x3 stride-2 max-pool with `Same` padding.
///
/// `pool` must be a valid-padded 3x3 stride-2 pool. The input is padded
/// with `-inf` as [`same_padding`] prescribes, so even sizes only grow at
/// the bottom and right.
pub fn same_max_pool<B: Backend>(pool: &MaxPool2d, input: Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, _, height, width] = input.dims();
    let padded = pad_neg_inf(input, 2, same_padding(height, 3, 2));
    let padded = pad_neg_inf(padded, 3, same_padding(width, 3, 2));
    pool.forward(padded)
}

fn pad_neg_inf<B: Backend>(
    input: Tensor<B, 4>,
    dim: usize,
    (before, after): (usize, usize),
) -> Tensor<B, 4> {
    if before == 0 && after == 0 {
        return input;
    }
    let device = input.device();
    let dims = input.dims();
    let fill = |size: usize| {
        let mut shape = dims;
        shape[dim] = size;
        Tensor::<B, 4>::full(shape, f32::NEG_INFINITY, &device)
    };

    let mut parts = Vec::with_capacity(3);
    if before > 0 {
        parts.push(fill(before));
    }
    parts.push(input);
    if after > 0 {
        parts.push(fill(after));
    }
    Tensor::cat(parts, dim)
}

/// Conv, downsampling max-pool, then two residual blocks.
#[derive(Module, Debug)]
pub struct ConvSequence<B: Backend> {
    conv: ConvLayer<B>,
    /// Valid 3x3/2; padding is applied by [`same_max_pool`].
    pool: MaxPool2d,
    res0: ResidualBlock<B>,
    res1: ResidualBlock<B>,
}

impl<B: Backend> ConvSequence<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = same_max_pool(&self.pool, self.conv.forward(input));
        let out = self.res0.forward(out);
        self.res1.forward(out)
    }

    fn conv_layers_mut(&mut self) -> [&mut ConvLayer<B>; 5] {
        [
            &mut self.conv,
            &mut self.res0.conv0,
            &mut self.res0.conv1,
            &mut self.res1.conv0,
            &mut self.res1.conv1,
        ]
    }
}

/// IMPALA residual feature extractor over scaled NCHW images.
#[derive(Module, Debug)]
pub struct ImpalaCnn<B: Backend> {
    sequences: Vec<ConvSequence<B>>,
    dense: Linear<B>,
    flat_size: usize,
    output_size: usize,
}

impl<B: Backend> ImpalaCnn<B> {
    /// `[batch, C, H, W]` scaled images to `[batch, hidden_size]` features.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let out = self
            .sequences
            .iter()
            .fold(images, |out, sequence| sequence.forward(out));
        let flat: Tensor<B, 2> = relu(out.flatten(1, 3));
        relu(self.dense.forward(flat))
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn flat_size(&self) -> usize {
        self.flat_size
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    /// One per conv layer, whether or not the rate is zero.
    pub fn dropout_layers(&self) -> usize {
        self.sequences.len() * 5
    }

    /// Number of layers holding a live seed.
    pub fn active_dropout_layers(&self) -> usize {
        self.sequences
            .iter()
            .flat_map(|s| {
                [
                    &s.conv,
                    &s.res0.conv0,
                    &s.res0.conv1,
                    &s.res1.conv0,
                    &s.res1.conv1,
                ]
            })
            .filter(|layer| layer.dropout.is_active())
            .count()
    }

    /// Draw fresh dropout seeds for every conv layer.
    pub fn resample_dropout_masks(&mut self) {
        for sequence in self.sequences.iter_mut() {
            for layer in sequence.conv_layers_mut() {
                layer.dropout_mut().resample();
            }
        }
    }
}
