//! Convolutional feature extractors.
//!
//! [`choose_cnn`] picks the stack named by [`Architecture`] and returns a
//! [`FeatureExtractor`] that takes raw NHWC pixels in `[0, 255]` and yields
//! flat features for the policy heads.

pub mod shape;
pub mod impala;
pub mod nature;

pub use impala::{ImpalaCnn, ImpalaCnnConfig};
pub use nature::{NatureCnn, NatureCnnConfig};
pub use shape::{conv_output_size, pool_output_size, same_padding, Padding, Spatial};

use burn::module::Module;
use burn::prelude::*;

use crate::config::{Architecture, PolicyConfig};
use crate::error::PolicyError;
use crate::observation::{scale_images, ObservationSpace};

/// Feature extractor selected by architecture.
#[derive(Module, Debug)]
pub enum FeatureExtractor<B: Backend> {
    Nature(NatureCnn<B>),
    Impala(ImpalaCnn<B>),
}

impl<B: Backend> FeatureExtractor<B> {
    /// Raw NHWC pixels to `[batch, output_size]` features.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let scaled = scale_images(images);
        match self {
            FeatureExtractor::Nature(nature) => nature.forward(scaled),
            FeatureExtractor::Impala(impala) => impala.forward(scaled),
        }
    }

    pub fn output_size(&self) -> usize {
        match self {
            FeatureExtractor::Nature(nature) => nature.output_size(),
            FeatureExtractor::Impala(impala) => impala.output_size(),
        }
    }

    pub fn architecture(&self) -> Architecture {
        match self {
            FeatureExtractor::Nature(_) => Architecture::Nature,
            FeatureExtractor::Impala(impala) => {
                let large = Architecture::ImpalaLarge.impala_depths().map(|d| d.len());
                if Some(impala.sequence_count()) == large {
                    Architecture::ImpalaLarge
                } else {
                    Architecture::Impala
                }
            }
        }
    }

    /// Dropout layers in the stack (zero for Nature).
    pub fn dropout_layers(&self) -> usize {
        match self {
            FeatureExtractor::Nature(_) => 0,
            FeatureExtractor::Impala(impala) => impala.dropout_layers(),
        }
    }

    /// Draw fresh dropout masks. No-op for stacks without dropout.
    pub fn resample_dropout_masks(&mut self) {
        if let FeatureExtractor::Impala(impala) = self {
            impala.resample_dropout_masks();
        }
    }
}

/// Build the feature extractor named by `config.architecture`.
pub fn choose_cnn<B: Backend>(
    config: &PolicyConfig,
    ob_space: &ObservationSpace,
    device: &B::Device,
) -> Result<FeatureExtractor<B>, PolicyError> {
    config.validate()?;
    let input = Spatial::new(ob_space.height, ob_space.width);

    match config.architecture.impala_depths() {
        Some(depths) => {
            let impala = ImpalaCnnConfig::new(ob_space.channels, input, depths)
                .with_dropout(config.dropout)
                .with_batch_norm(config.use_batch_norm)
                .init(device)?;
            Ok(FeatureExtractor::Impala(impala))
        }
        None => {
            if config.dropout > 0.0 || config.use_batch_norm {
                log::warn!(
                    "dropout ({}) and batch norm ({}) only apply to the impala stacks; ignored for nature",
                    config.dropout,
                    config.use_batch_norm
                );
            }
            let nature = NatureCnnConfig::new(ob_space.channels, input)
                .with_pooled_tower(config.nature_pooled_tower)
                .init(device)?;
            Ok(FeatureExtractor::Nature(nature))
        }
    }
}
