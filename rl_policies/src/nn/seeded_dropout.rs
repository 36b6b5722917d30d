//! Dropout with a persistent, explicitly resampled mask.
//!
//! Ordinary dropout draws a new mask on every forward pass. Here the mask is
//! derived from a stored seed tensor shaped like a single sample of the layer
//! output (`[C, H, W]`), so every sample in the batch and every forward call
//! sees the same dropped units until [`SeededDropout::resample`] is called.
//! The training loop decides when masks change (typically once per rollout),
//! which keeps the behaviour policy and the policy being optimized identical.
//!
//! mask = 1{seed > rate} / (1 - rate)

use burn::module::{Module, Param};
use burn::prelude::*;
use burn::tensor::Distribution;

/// Configuration for [`SeededDropout`].
#[derive(Debug, Clone)]
pub struct SeededDropoutConfig {
    /// Drop probability in `[0, 1)`. Zero disables the layer.
    pub rate: f32,
    /// Per-sample shape of the input, `[channels, height, width]`.
    pub sample_shape: [usize; 3],
}

impl SeededDropoutConfig {
    pub fn new(rate: f32, sample_shape: [usize; 3]) -> Self {
        Self { rate, sample_shape }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> SeededDropout<B> {
        let seed = if self.rate > 0.0 {
            Some(Param::from_tensor(uniform_seed(self.sample_shape, device)).set_require_grad(false))
        } else {
            None
        };
        SeededDropout {
            seed,
            rate: self.rate,
        }
    }
}

/// Dropout layer whose mask only changes on [`SeededDropout::resample`].
#[derive(Module, Debug)]
pub struct SeededDropout<B: Backend> {
    /// Non-trainable seed in `[0, 1)`, absent when the rate is zero.
    pub seed: Option<Param<Tensor<B, 3>>>,
    rate: f32,
}

impl<B: Backend> SeededDropout<B> {
    /// Apply the current mask to a `[batch, C, H, W]` input.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self.mask() {
            Some(mask) => input * mask.unsqueeze_dim(0),
            None => input,
        }
    }

    /// Current scaled mask, `None` when disabled.
    pub fn mask(&self) -> Option<Tensor<B, 3>> {
        self.seed.as_ref().map(|seed| {
            seed.val()
                .greater_elem(self.rate)
                .float()
                .mul_scalar(1.0 / (1.0 - self.rate))
        })
    }

    /// Draw a fresh seed.
    pub fn resample(&mut self) {
        if let Some(seed) = self.seed.take() {
            let current = seed.val();
            let device = current.device();
            let fresh = uniform_seed(current.dims(), &device);
            self.seed = Some(Param::initialized(seed.id, fresh).set_require_grad(false));
        }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn is_active(&self) -> bool {
        self.seed.is_some()
    }
}

fn uniform_seed<B: Backend>(shape: [usize; 3], device: &B::Device) -> Tensor<B, 3> {
    Tensor::random(shape, Distribution::Uniform(0.0, 1.0), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_zero_rate_is_identity() {
        let device = Default::default();
        let dropout = SeededDropoutConfig::new(0.0, [2, 3, 3]).init::<B>(&device);
        assert!(!dropout.is_active());

        let input = Tensor::<B, 4>::ones([4, 2, 3, 3], &device);
        let output = dropout.forward(input);
        let sum: f32 = output.sum().into_scalar();
        assert_eq!(sum, 72.0);
    }

    #[test]
    fn test_mask_values_are_zero_or_scaled() {
        let device = Default::default();
        let dropout = SeededDropoutConfig::new(0.25, [4, 5, 5]).init::<B>(&device);

        let mask: Vec<f32> = dropout.mask().unwrap().into_data().to_vec().unwrap();
        let keep = 1.0 / 0.75;
        assert!(mask
            .iter()
            .all(|&m| m == 0.0 || (m - keep).abs() < 1e-6));
    }

    #[test]
    fn test_mask_shared_across_batch_and_calls() {
        let device = Default::default();
        let dropout = SeededDropoutConfig::new(0.5, [2, 4, 4]).init::<B>(&device);

        let input = Tensor::<B, 4>::ones([3, 2, 4, 4], &device);
        let first = dropout.forward(input.clone());
        let second = dropout.forward(input);

        let a: Vec<f32> = first.clone().into_data().to_vec().unwrap();
        let b: Vec<f32> = second.into_data().to_vec().unwrap();
        assert_eq!(a, b);

        // Every batch element gets the same mask.
        let per_sample = 2 * 4 * 4;
        assert_eq!(a[..per_sample], a[per_sample..2 * per_sample]);
        assert_eq!(a[..per_sample], a[2 * per_sample..]);
    }

    #[test]
    fn test_resample_changes_seed() {
        let device = Default::default();
        let mut dropout = SeededDropoutConfig::new(0.5, [8, 8, 8]).init::<B>(&device);

        let before: Vec<f32> = dropout.seed.as_ref().unwrap().val().into_data().to_vec().unwrap();
        let id_before = dropout.seed.as_ref().unwrap().id;
        dropout.resample();
        let after: Vec<f32> = dropout.seed.as_ref().unwrap().val().into_data().to_vec().unwrap();

        assert_ne!(before, after);
        assert_eq!(dropout.seed.as_ref().unwrap().id, id_before);
        assert!(after.iter().all(|&s| (0.0..1.0).contains(&s)));
    }
}
