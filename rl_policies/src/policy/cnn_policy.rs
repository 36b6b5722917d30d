//! Stateless actor-critic: CNN features straight into value and policy heads.

use burn::module::Module;
use burn::prelude::*;

use super::{ActorCritic, ForwardOutput};
use crate::cnn::{choose_cnn, FeatureExtractor};
use crate::config::{ConfigError, PolicyConfig};
use crate::distribution::CategoricalPd;
use crate::error::PolicyError;
use crate::nn::{OrthogonalLinear, OrthogonalLinearConfig};
use crate::observation::ObservationSpace;

/// Gain of the policy head, small so the initial policy is near uniform.
pub const CNN_POLICY_HEAD_GAIN: f64 = 0.01;

/// Configuration for [`CnnPolicy`].
#[derive(Debug, Clone)]
pub struct CnnPolicyConfig {
    pub policy: PolicyConfig,
    pub ob_space: ObservationSpace,
    pub n_actions: usize,
}

impl CnnPolicyConfig {
    pub fn new(policy: PolicyConfig, ob_space: ObservationSpace, n_actions: usize) -> Self {
        Self {
            policy,
            ob_space,
            n_actions,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<CnnPolicy<B>, PolicyError> {
        if self.n_actions == 0 {
            return Err(ConfigError::InvalidCount {
                field: "n_actions",
                value: self.n_actions,
            }
            .into());
        }
        let extractor = choose_cnn(&self.policy, &self.ob_space, device)?;
        let features = extractor.output_size();

        Ok(CnnPolicy {
            value_head: OrthogonalLinearConfig::new(features, 1).init(device),
            policy_head: OrthogonalLinearConfig::new(features, self.n_actions)
                .with_gain(CNN_POLICY_HEAD_GAIN)
                .init(device),
            extractor,
            height: self.ob_space.height,
            width: self.ob_space.width,
            channels: self.ob_space.channels,
            n_actions: self.n_actions,
        })
    }
}

/// Feed-forward convolutional actor-critic.
#[derive(Module, Debug)]
pub struct CnnPolicy<B: Backend> {
    extractor: FeatureExtractor<B>,
    value_head: OrthogonalLinear<B>,
    policy_head: OrthogonalLinear<B>,
    height: usize,
    width: usize,
    channels: usize,
    n_actions: usize,
}

impl<B: Backend> CnnPolicy<B> {
    pub fn ob_space(&self) -> ObservationSpace {
        ObservationSpace::new(self.height, self.width, self.channels)
    }

    pub fn extractor(&self) -> &FeatureExtractor<B> {
        &self.extractor
    }
}

impl<B: Backend> ActorCritic<B> for CnnPolicy<B> {
    /// `state` and `mask` are accepted for interface parity and ignored.
    fn forward(
        &self,
        obs: Tensor<B, 4>,
        _state: Option<Tensor<B, 2>>,
        _mask: Option<Tensor<B, 1>>,
    ) -> Result<ForwardOutput<B>, PolicyError> {
        self.ob_space().check(&obs)?;

        let latent = self.extractor.forward(obs);
        let values = self.value_head.forward(latent.clone()).flatten(0, 1);
        let logits = self.policy_head.forward(latent);

        Ok(ForwardOutput {
            pd: CategoricalPd::new(logits),
            values,
            state: None,
        })
    }

    fn initial_state(&self, _device: &B::Device) -> Option<Tensor<B, 2>> {
        None
    }

    fn n_actions(&self) -> usize {
        self.n_actions
    }

    fn is_recurrent(&self) -> bool {
        false
    }

    fn resample_dropout_masks(&mut self) {
        self.extractor.resample_dropout_masks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Architecture;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    fn policy(architecture: Architecture, space: ObservationSpace) -> CnnPolicy<B> {
        let config = PolicyConfig::new().with_architecture(architecture);
        CnnPolicyConfig::new(config, space, 5)
            .init(&Default::default())
            .unwrap()
    }

    #[test]
    fn test_step_shapes() {
        let device = Default::default();
        let space = ObservationSpace::new(16, 16, 3);
        let policy = policy(Architecture::Impala, space);

        let obs = Tensor::<B, 4>::random(space.batch_dims(4), Distribution::Uniform(0.0, 255.0), &device);
        let out = policy.step(obs, None, None).unwrap();

        assert_eq!(out.actions.len(), 4);
        assert_eq!(out.values.len(), 4);
        assert_eq!(out.neglogp.len(), 4);
        assert!(out.state.is_none());
        assert!(out.actions.iter().all(|a| a.0 < 5));
    }

    #[test]
    fn test_value_matches_step_values() {
        let device = Default::default();
        let space = ObservationSpace::new(40, 40, 3);
        let policy = policy(Architecture::Nature, space);

        let obs = Tensor::<B, 4>::random(space.batch_dims(2), Distribution::Uniform(0.0, 255.0), &device);
        let stepped = policy.step(obs.clone(), None, None).unwrap();
        let values = policy.value(obs, None, None).unwrap();

        for (a, b) in stepped.values.iter().zip(values.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_initial_policy_near_uniform() {
        let device = Default::default();
        let space = ObservationSpace::new(16, 16, 3);
        let policy = policy(Architecture::Impala, space);

        let obs = Tensor::<B, 4>::random(space.batch_dims(3), Distribution::Uniform(0.0, 255.0), &device);
        let out = policy.forward(obs, None, None).unwrap();
        let entropy: Vec<f32> = out.pd.entropy().into_data().to_vec().unwrap();

        let max_entropy = 5f32.ln();
        assert!(entropy.iter().all(|&h| h > 0.95 * max_entropy));
    }

    #[test]
    fn test_extra_arguments_ignored() {
        let device = Default::default();
        let space = ObservationSpace::new(16, 16, 3);
        let policy = policy(Architecture::Impala, space);

        let obs = Tensor::<B, 4>::zeros(space.batch_dims(2), &device);
        let state = Tensor::<B, 2>::ones([2, 8], &device);
        let mask = Tensor::<B, 1>::ones([2], &device);

        assert!(!policy.is_recurrent());
        assert!(policy.initial_state(&device).is_none());
        let out = policy.step(obs, Some(state), Some(mask)).unwrap();
        assert!(out.state.is_none());
    }

    #[test]
    fn test_wrong_observation_shape() {
        let device = Default::default();
        let policy = policy(Architecture::Impala, ObservationSpace::new(16, 16, 3));
        let obs = Tensor::<B, 4>::zeros([2, 16, 16, 1], &device);
        assert!(matches!(
            policy.value(obs, None, None),
            Err(PolicyError::ShapeMismatch { what: "observation", .. })
        ));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let device = Default::default();
        let space = ObservationSpace::new(16, 16, 3);
        let policy = policy(Architecture::Impala, space);
        let obs = Tensor::<B, 4>::zeros(space.batch_dims(0), &device);
        assert!(matches!(
            policy.step(obs, None, None),
            Err(PolicyError::ShapeMismatch { what: "observation", .. })
        ));
    }

    #[test]
    fn test_zero_actions_rejected() {
        let config = PolicyConfig::new();
        let result = CnnPolicyConfig::new(config, ObservationSpace::new(16, 16, 3), 0)
            .init::<B>(&Default::default());
        assert!(matches!(
            result,
            Err(PolicyError::Config(ConfigError::InvalidCount { field: "n_actions", value: 0 }))
        ));
    }
}
