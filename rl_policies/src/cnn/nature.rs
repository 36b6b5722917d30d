//! Flat DQN-style feature extractor ("Human-level control through deep
//! reinforcement learning", Mnih et al., 2015), with a second pooled tower.
//!
//! ```text
//!         ┌─ conv 16@8x8/4 ─ conv 32@4x4/2 ─ conv 32@3x3/1 ─ flatten ─┐
//! image ──┤                                                            ├─ concat ─ dense 512 ─ relu
//!         └─ 3 x (conv 3x3/1 ─ relu ─ maxpool 3x3/2) [12, 12, 24] ─ flatten ─┘
//! ```
//!
//! Every conv and the dense layer is orthogonal with gain `sqrt(2)`.
//! All convolutions and pools are valid-padded. The pooled tower can be
//! switched off, which leaves the plain three-conv stack.

use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

use super::shape::{Padding, Spatial};
use crate::error::PolicyError;
use crate::nn::{OrthogonalConv2dConfig, OrthogonalLinear, OrthogonalLinearConfig};

/// (filters, kernel, stride) of the main tower.
const MAIN_TOWER: [(usize, usize, usize); 3] = [(16, 8, 4), (32, 4, 2), (32, 3, 1)];
/// Filters of the pooled tower; kernel 3, stride 1.
const POOLED_TOWER: [usize; 3] = [12, 12, 24];

/// Configuration for [`NatureCnn`].
#[derive(Debug, Clone)]
pub struct NatureCnnConfig {
    pub in_channels: usize,
    pub input: Spatial,
    pub pooled_tower: bool,
    pub hidden_size: usize,
    pub gain: f64,
}

impl NatureCnnConfig {
    pub fn new(in_channels: usize, input: Spatial) -> Self {
        Self {
            in_channels,
            input,
            pooled_tower: true,
            hidden_size: 512,
            gain: 2f64.sqrt(),
        }
    }

    pub fn with_pooled_tower(mut self, pooled_tower: bool) -> Self {
        self.pooled_tower = pooled_tower;
        self
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    /// Final spatial size of the main tower.
    pub fn main_spatial(&self) -> Spatial {
        MAIN_TOWER
            .iter()
            .fold(self.input, |s, &(_, k, stride)| s.conv(k, stride, Padding::Valid))
    }

    /// Final spatial size of the pooled tower.
    pub fn pooled_spatial(&self) -> Spatial {
        POOLED_TOWER.iter().fold(self.input, |s, _| {
            s.conv(3, 1, Padding::Valid).pool(3, 2, Padding::Valid)
        })
    }

    /// Concatenated flat features of both towers.
    pub fn flat_size(&self) -> usize {
        let main = self.main_spatial().area() * MAIN_TOWER[2].0;
        let pooled = if self.pooled_tower {
            self.pooled_spatial().area() * POOLED_TOWER[2]
        } else {
            0
        };
        main + pooled
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<NatureCnn<B>, PolicyError> {
        let main = self.main_spatial();
        if main.is_empty() {
            return Err(PolicyError::ObservationTooSmall {
                stage: "nature main tower",
                height: self.input.height,
                width: self.input.width,
            });
        }
        if self.pooled_tower && self.pooled_spatial().is_empty() {
            return Err(PolicyError::ObservationTooSmall {
                stage: "nature pooled tower",
                height: self.input.height,
                width: self.input.width,
            });
        }

        let mut channels = self.in_channels;
        let mut main_tower = Vec::with_capacity(MAIN_TOWER.len());
        for &(filters, kernel, stride) in &MAIN_TOWER {
            main_tower.push(
                OrthogonalConv2dConfig::new(channels, filters, kernel)
                    .with_stride(stride)
                    .with_gain(self.gain)
                    .init(device),
            );
            channels = filters;
        }

        let mut pooled_tower = Vec::new();
        if self.pooled_tower {
            let mut channels = self.in_channels;
            for &filters in &POOLED_TOWER {
                pooled_tower.push(
                    OrthogonalConv2dConfig::new(channels, filters, 3)
                        .with_gain(self.gain)
                        .init(device),
                );
                channels = filters;
            }
        }

        let flat_size = self.flat_size();
        log::debug!(
            "nature cnn: main map {}x{}, pooled tower {}, {} flat features",
            main.height,
            main.width,
            self.pooled_tower,
            flat_size
        );

        Ok(NatureCnn {
            main_tower,
            pooled_tower,
            pool: MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init(),
            fc: OrthogonalLinearConfig::new(flat_size, self.hidden_size)
                .with_gain(self.gain)
                .init(device),
            output_size: self.hidden_size,
        })
    }
}

/// Two-tower Nature feature extractor over scaled NCHW images.
#[derive(Module, Debug)]
pub struct NatureCnn<B: Backend> {
    main_tower: Vec<Conv2d<B>>,
    /// Empty when the pooled tower is disabled.
    pooled_tower: Vec<Conv2d<B>>,
    pool: MaxPool2d,
    fc: OrthogonalLinear<B>,
    output_size: usize,
}

impl<B: Backend> NatureCnn<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let main = self
            .main_tower
            .iter()
            .fold(images.clone(), |out, conv| relu(conv.forward(out)));
        let mut towers: Vec<Tensor<B, 2>> = vec![main.flatten(1, 3)];

        if !self.pooled_tower.is_empty() {
            let pooled = self
                .pooled_tower
                .iter()
                .fold(images, |out, conv| self.pool.forward(relu(conv.forward(out))));
            towers.push(pooled.flatten(1, 3));
        }

        relu(self.fc.forward(Tensor::cat(towers, 1)))
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn has_pooled_tower(&self) -> bool {
        !self.pooled_tower.is_empty()
    }
}
