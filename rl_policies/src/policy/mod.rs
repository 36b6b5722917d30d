//! Actor-critic policies over pixel observations.
//!
//! Two heads share one interface:
//!
//! - [`CnnPolicy`]: feed-forward, state and mask are ignored
//! - [`LstmPolicy`]: masked LSTM core, state `[nenv, 2 * nlstm]` packed as
//!   `[cell | hidden]`
//!
//! [`build_policy`] selects between them from [`PolicyConfig::use_lstm`] and
//! returns a [`Policy`] that dispatches to the concrete head.
//!
//! ```rust,ignore
//! let policy = build_policy::<B>(&config, &ObservationSpace::rgb64(), 7, 256, 32, &device)?;
//! let mut state = policy.initial_state(&device);
//! let out = policy.step(obs, state, Some(dones))?;
//! state = out.state;
//! ```

pub mod cnn_policy;
pub mod lstm_policy;

pub use cnn_policy::{CnnPolicy, CnnPolicyConfig, CNN_POLICY_HEAD_GAIN};
pub use lstm_policy::{LstmPolicy, LstmPolicyConfig};

use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Tensor, TensorData};

use crate::config::{envs_per_batch, ConfigError, PolicyConfig, PolicyKind};
use crate::distribution::{CategoricalPd, DiscreteAction};
use crate::error::{floats_of, PolicyError};
use crate::observation::ObservationSpace;

// ============================================================================
// Outputs
// ============================================================================

/// Output of a policy forward pass, kept on the device.
#[derive(Clone, Debug)]
pub struct ForwardOutput<B: Backend> {
    /// Action distribution over the policy-head logits.
    pub pd: CategoricalPd<B>,
    /// Value estimates [batch].
    pub values: Tensor<B, 1>,
    /// Updated recurrent state, `None` for stateless policies.
    pub state: Option<Tensor<B, 2>>,
}

/// Host-side result of one acting step.
#[derive(Clone, Debug)]
pub struct StepOutput<B: Backend> {
    pub actions: Vec<DiscreteAction>,
    pub values: Vec<f32>,
    pub state: Option<Tensor<B, 2>>,
    pub neglogp: Vec<f32>,
}

// ============================================================================
// ActorCritic Trait
// ============================================================================

/// Shared interface of the CNN and LSTM policies.
///
/// Observations are raw NHWC pixels in `[0, 255]`. `mask` holds 1.0 where an
/// episode ended before the corresponding sample, which resets the
/// recurrent state for that environment.
pub trait ActorCritic<B: Backend> {
    /// Distribution, values and next state for a batch of observations.
    fn forward(
        &self,
        obs: Tensor<B, 4>,
        state: Option<Tensor<B, 2>>,
        mask: Option<Tensor<B, 1>>,
    ) -> Result<ForwardOutput<B>, PolicyError>;

    /// State to start a rollout from, `None` for stateless policies.
    fn initial_state(&self, device: &B::Device) -> Option<Tensor<B, 2>>;

    fn n_actions(&self) -> usize;

    fn is_recurrent(&self) -> bool;

    /// Draw fresh dropout masks for every dropout layer.
    fn resample_dropout_masks(&mut self);

    /// Sample actions and report values, state and negative log-probabilities.
    fn step(
        &self,
        obs: Tensor<B, 4>,
        state: Option<Tensor<B, 2>>,
        mask: Option<Tensor<B, 1>>,
    ) -> Result<StepOutput<B>, PolicyError> {
        let out = self.forward(obs, state, mask)?;
        let (actions, neglogp) = out.pd.sample()?;
        Ok(StepOutput {
            actions,
            values: floats_of(out.values)?,
            state: out.state,
            neglogp,
        })
    }

    /// Value estimates only.
    fn value(
        &self,
        obs: Tensor<B, 4>,
        state: Option<Tensor<B, 2>>,
        mask: Option<Tensor<B, 1>>,
    ) -> Result<Vec<f32>, PolicyError> {
        floats_of(self.forward(obs, state, mask)?.values)
    }
}

/// Done flags to a float mask tensor.
pub fn masks_from_dones<B: Backend>(dones: &[bool], device: &B::Device) -> Tensor<B, 1> {
    let values: Vec<f32> = dones.iter().map(|&d| if d { 1.0 } else { 0.0 }).collect();
    Tensor::from_data(TensorData::new(values, [dones.len()]), device)
}

// ============================================================================
// Policy
// ============================================================================

/// Policy selected at construction time.
#[derive(Debug, Clone)]
pub enum Policy<B: Backend> {
    Cnn(CnnPolicy<B>),
    Lstm(LstmPolicy<B>),
}

impl<B: Backend> Policy<B> {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Policy::Cnn(_) => PolicyKind::Cnn,
            Policy::Lstm(_) => PolicyKind::Lstm,
        }
    }

    pub fn ob_space(&self) -> ObservationSpace {
        match self {
            Policy::Cnn(p) => p.ob_space(),
            Policy::Lstm(p) => p.ob_space(),
        }
    }
}

impl<B: AutodiffBackend> Policy<B> {
    /// Same weights on the inner backend, without gradient tracking.
    pub fn valid(&self) -> Policy<B::InnerBackend> {
        match self {
            Policy::Cnn(p) => Policy::Cnn(p.valid()),
            Policy::Lstm(p) => Policy::Lstm(p.valid()),
        }
    }
}

impl<B: Backend> ActorCritic<B> for Policy<B> {
    fn forward(
        &self,
        obs: Tensor<B, 4>,
        state: Option<Tensor<B, 2>>,
        mask: Option<Tensor<B, 1>>,
    ) -> Result<ForwardOutput<B>, PolicyError> {
        match self {
            Policy::Cnn(p) => p.forward(obs, state, mask),
            Policy::Lstm(p) => p.forward(obs, state, mask),
        }
    }

    fn initial_state(&self, device: &B::Device) -> Option<Tensor<B, 2>> {
        match self {
            Policy::Cnn(p) => p.initial_state(device),
            Policy::Lstm(p) => p.initial_state(device),
        }
    }

    fn n_actions(&self) -> usize {
        match self {
            Policy::Cnn(p) => p.n_actions(),
            Policy::Lstm(p) => p.n_actions(),
        }
    }

    fn is_recurrent(&self) -> bool {
        matches!(self, Policy::Lstm(_))
    }

    fn resample_dropout_masks(&mut self) {
        match self {
            Policy::Cnn(p) => p.resample_dropout_masks(),
            Policy::Lstm(p) => p.resample_dropout_masks(),
        }
    }
}

// ============================================================================
// Construction
// ============================================================================

/// Which policy head `config` selects.
pub fn get_policy(config: &PolicyConfig) -> PolicyKind {
    config.policy_kind()
}

/// Build the policy selected by `config`.
///
/// `nbatch` and `nsteps` describe the rollout geometry; they must divide
/// evenly for every policy kind, and set the initial state size of the
/// LSTM policy.
pub fn build_policy<B: Backend>(
    config: &PolicyConfig,
    ob_space: &ObservationSpace,
    n_actions: usize,
    nbatch: usize,
    nsteps: usize,
    device: &B::Device,
) -> Result<Policy<B>, PolicyError> {
    config.validate()?;
    if n_actions == 0 {
        return Err(ConfigError::InvalidCount {
            field: "n_actions",
            value: n_actions,
        }
        .into());
    }
    let nenv = envs_per_batch(nbatch, nsteps)?;

    let policy = match get_policy(config) {
        PolicyKind::Cnn => {
            Policy::Cnn(CnnPolicyConfig::new(config.clone(), *ob_space, n_actions).init(device)?)
        }
        PolicyKind::Lstm => Policy::Lstm(
            LstmPolicyConfig::new(config.clone(), *ob_space, n_actions, nbatch, nsteps)
                .init(device)?,
        ),
    };

    log::info!(
        "built {:?} policy: {} architecture, {}x{}x{} observations, {} actions, {} envs x {} steps",
        policy.kind(),
        config.architecture,
        ob_space.height,
        ob_space.width,
        ob_space.channels,
        n_actions,
        nenv,
        nsteps
    );

    Ok(policy)
}
