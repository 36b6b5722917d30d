//! Batch normalization that always uses the statistics of the current batch.
//!
//! Burn's `BatchNorm` switches to running averages when the backend has no
//! autodiff. The residual stack normalizes with batch moments in every mode,
//! so rollout inference and training see the same function.

use burn::module::{Module, Param};
use burn::prelude::*;

/// Configuration for [`BatchStatNorm`].
#[derive(Debug, Clone)]
pub struct BatchStatNormConfig {
    pub num_features: usize,
    pub epsilon: f64,
}

impl BatchStatNormConfig {
    pub fn new(num_features: usize) -> Self {
        Self {
            num_features,
            epsilon: 1e-3,
        }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> BatchStatNorm<B> {
        BatchStatNorm {
            gamma: Param::from_tensor(Tensor::ones([self.num_features], device)),
            beta: Param::from_tensor(Tensor::zeros([self.num_features], device)),
            epsilon: self.epsilon,
        }
    }
}

/// Per-channel normalization over batch and spatial dims of `[N, C, H, W]`.
#[derive(Module, Debug)]
pub struct BatchStatNorm<B: Backend> {
    /// Scale, initialized to one.
    pub gamma: Param<Tensor<B, 1>>,
    /// Centre, initialized to zero.
    pub beta: Param<Tensor<B, 1>>,
    epsilon: f64,
}

impl<B: Backend> BatchStatNorm<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let channels = input.dims()[1];

        let mean = input.clone().mean_dim(0).mean_dim(2).mean_dim(3);
        let centered = input - mean;
        let var = centered
            .clone()
            .powf_scalar(2.0)
            .mean_dim(0)
            .mean_dim(2)
            .mean_dim(3);
        let normalized = centered / var.add_scalar(self.epsilon).sqrt();

        let gamma = self.gamma.val().reshape([1, channels, 1, 1]);
        let beta = self.beta.val().reshape([1, channels, 1, 1]);
        normalized * gamma + beta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_output_is_normalized_per_channel() {
        let device = Default::default();
        let norm = BatchStatNormConfig::new(3).init::<B>(&device);

        let input = Tensor::<B, 4>::random([8, 3, 5, 5], Distribution::Normal(4.0, 3.0), &device);
        let output = norm.forward(input);
        assert_eq!(output.dims(), [8, 3, 5, 5]);

        let mean: Vec<f32> = output
            .clone()
            .mean_dim(0)
            .mean_dim(2)
            .mean_dim(3)
            .into_data()
            .to_vec()
            .unwrap();
        let var: Vec<f32> = output
            .powf_scalar(2.0)
            .mean_dim(0)
            .mean_dim(2)
            .mean_dim(3)
            .into_data()
            .to_vec()
            .unwrap();

        for c in 0..3 {
            assert!(mean[c].abs() < 1e-3, "channel {} mean {}", c, mean[c]);
            assert!((var[c] - 1.0).abs() < 1e-2, "channel {} var {}", c, var[c]);
        }
    }

    #[test]
    fn test_constant_channel_maps_to_beta() {
        let device = Default::default();
        let norm = BatchStatNormConfig::new(2).init::<B>(&device);
        let input = Tensor::<B, 4>::ones([2, 2, 3, 3], &device).mul_scalar(7.0);
        let output: Vec<f32> = norm.forward(input).into_data().to_vec().unwrap();
        assert!(output.iter().all(|v| v.abs() < 1e-6));
    }
}
