//! Recurrent actor-critic: CNN features through a masked LSTM core.
//!
//! The policy is built for rollouts of `nbatch = nenv * nsteps` samples, but
//! the same weights evaluate any geometry: the step count of a call is
//! inferred from the observation batch and the number of state rows. Acting
//! (one step per env) and training (full rollouts) share one module.

use burn::module::Module;
use burn::prelude::*;

use super::{ActorCritic, ForwardOutput};
use crate::cnn::{choose_cnn, FeatureExtractor};
use crate::config::{envs_per_batch, ConfigError, PolicyConfig};
use crate::distribution::CategoricalPd;
use crate::error::PolicyError;
use crate::nn::{MaskedLstm, MaskedLstmConfig, OrthogonalLinear, OrthogonalLinearConfig};
use crate::observation::ObservationSpace;

/// Configuration for [`LstmPolicy`].
#[derive(Debug, Clone)]
pub struct LstmPolicyConfig {
    pub policy: PolicyConfig,
    pub ob_space: ObservationSpace,
    pub n_actions: usize,
    /// Samples per rollout batch.
    pub nbatch: usize,
    /// Steps per environment in a rollout.
    pub nsteps: usize,
}

impl LstmPolicyConfig {
    pub fn new(
        policy: PolicyConfig,
        ob_space: ObservationSpace,
        n_actions: usize,
        nbatch: usize,
        nsteps: usize,
    ) -> Self {
        Self {
            policy,
            ob_space,
            n_actions,
            nbatch,
            nsteps,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<LstmPolicy<B>, PolicyError> {
        if self.n_actions == 0 {
            return Err(ConfigError::InvalidCount {
                field: "n_actions",
                value: self.n_actions,
            }
            .into());
        }
        let nenv = envs_per_batch(self.nbatch, self.nsteps)?;
        let extractor = choose_cnn(&self.policy, &self.ob_space, device)?;
        let nlstm = self.policy.nlstm;

        log::debug!(
            "lstm policy: {} envs x {} steps, {} features -> {} lstm units",
            nenv,
            self.nsteps,
            extractor.output_size(),
            nlstm
        );

        Ok(LstmPolicy {
            lstm: MaskedLstmConfig::new(extractor.output_size(), nlstm).init(device),
            value_head: OrthogonalLinearConfig::new(nlstm, 1).init(device),
            policy_head: OrthogonalLinearConfig::new(nlstm, self.n_actions).init(device),
            extractor,
            height: self.ob_space.height,
            width: self.ob_space.width,
            channels: self.ob_space.channels,
            n_actions: self.n_actions,
            nenv,
            nsteps: self.nsteps,
        })
    }
}

/// Convolutional actor-critic with an LSTM between features and heads.
#[derive(Module, Debug)]
pub struct LstmPolicy<B: Backend> {
    extractor: FeatureExtractor<B>,
    lstm: MaskedLstm<B>,
    value_head: OrthogonalLinear<B>,
    policy_head: OrthogonalLinear<B>,
    height: usize,
    width: usize,
    channels: usize,
    n_actions: usize,
    nenv: usize,
    nsteps: usize,
}

impl<B: Backend> LstmPolicy<B> {
    pub fn ob_space(&self) -> ObservationSpace {
        ObservationSpace::new(self.height, self.width, self.channels)
    }

    pub fn nenv(&self) -> usize {
        self.nenv
    }

    pub fn nsteps(&self) -> usize {
        self.nsteps
    }

    pub fn nlstm(&self) -> usize {
        self.lstm.d_hidden()
    }

    /// Width of the packed `[cell | hidden]` state.
    pub fn state_size(&self) -> usize {
        self.lstm.state_size()
    }

    /// Zeroed state for an arbitrary number of environments.
    pub fn zero_state(&self, nenv: usize, device: &B::Device) -> Tensor<B, 2> {
        self.lstm.zero_state(nenv, device)
    }

    /// Infer `(nenv, nsteps)` for a call and validate every input shape.
    fn geometry(
        &self,
        batch: usize,
        state: &Tensor<B, 2>,
        mask: &Tensor<B, 1>,
    ) -> Result<(usize, usize), PolicyError> {
        let [nenv, width] = state.dims();
        if width != self.state_size() || nenv == 0 || batch % nenv != 0 {
            return Err(PolicyError::ShapeMismatch {
                what: "lstm state",
                expected: vec![nenv.max(1), self.state_size()],
                actual: vec![nenv, width],
            });
        }
        let [mask_len] = mask.dims();
        if mask_len != batch {
            return Err(PolicyError::ShapeMismatch {
                what: "mask",
                expected: vec![batch],
                actual: vec![mask_len],
            });
        }
        Ok((nenv, batch / nenv))
    }
}

impl<B: Backend> ActorCritic<B> for LstmPolicy<B> {
    fn forward(
        &self,
        obs: Tensor<B, 4>,
        state: Option<Tensor<B, 2>>,
        mask: Option<Tensor<B, 1>>,
    ) -> Result<ForwardOutput<B>, PolicyError> {
        let state = state.ok_or(PolicyError::MissingState)?;
        let mask = mask.ok_or(PolicyError::MissingMask)?;
        let batch = self.ob_space().check(&obs)?;
        let (nenv, nsteps) = self.geometry(batch, &state, &mask)?;

        let features = self.extractor.forward(obs);
        let (latent, new_state) = self.lstm.forward(features, mask, state, nenv, nsteps);

        let values = self.value_head.forward(latent.clone()).flatten(0, 1);
        let logits = self.policy_head.forward(latent);

        Ok(ForwardOutput {
            pd: CategoricalPd::new(logits),
            values,
            state: Some(new_state),
        })
    }

    /// Zeros `[nenv, 2 * nlstm]` for the configured number of environments.
    fn initial_state(&self, device: &B::Device) -> Option<Tensor<B, 2>> {
        Some(self.zero_state(self.nenv, device))
    }

    fn n_actions(&self) -> usize {
        self.n_actions
    }

    fn is_recurrent(&self) -> bool {
        true
    }

    fn resample_dropout_masks(&mut self) {
        self.extractor.resample_dropout_masks();
    }
}
