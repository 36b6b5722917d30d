//! # rl_policies: Convolutional Actor-Critic Policies
//!
//! Policy networks for pixel-based reinforcement learning on Burn: IMPALA
//! and Nature feature extractors, feed-forward and masked-LSTM heads, and a
//! categorical action distribution, all behind one [`ActorCritic`] trait.
//!
//! ## Architecture Overview
//!
//! ```text
//! NHWC u8 frames ─► scale /255 ─► FeatureExtractor ──┬─► value head ─► V(s)
//!                                 (nature | impala)  │
//!                                                    └─► policy head ─► CategoricalPd
//!
//! LSTM policy:  FeatureExtractor ─► MaskedLstm(state [nenv, 2*nlstm], done mask) ─► heads
//! ```
//!
//! Impala stacks optionally apply seeded dropout, whose masks only change
//! when [`ActorCritic::resample_dropout_masks`] is called, and batch-stat
//! normalization after every convolution.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rl_policies::{build_policy, ActorCritic, Architecture, ObservationSpace, PolicyConfig};
//!
//! let config = PolicyConfig::new()
//!     .with_architecture(Architecture::Impala)
//!     .with_lstm(true)
//!     .with_dropout(0.1);
//!
//! let policy = build_policy::<B>(&config, &ObservationSpace::rgb64(), 15, 512, 32, &device)?;
//! let mut state = policy.initial_state(&device);
//! let out = policy.step(obs, state, Some(dones))?;
//! ```

pub mod config;
pub mod error;
pub mod observation;
pub mod nn;
pub mod cnn;
pub mod distribution;
pub mod policy;
pub mod checkpoint;

#[cfg(test)]
mod tests;

pub use config::{envs_per_batch, Architecture, ConfigError, PolicyConfig, PolicyKind};
pub use error::PolicyError;
pub use observation::{frames_to_tensor, scale_images, ObservationSpace};
pub use cnn::{choose_cnn, FeatureExtractor, ImpalaCnn, ImpalaCnnConfig, NatureCnn, NatureCnnConfig};
pub use distribution::{CategoricalPd, DiscreteAction};
pub use policy::{
    build_policy, get_policy, masks_from_dones, ActorCritic, CnnPolicy, CnnPolicyConfig,
    ForwardOutput, LstmPolicy, LstmPolicyConfig, Policy, StepOutput,
};
pub use checkpoint::{CheckpointError, CheckpointerConfig, PolicyCheckpointer, PolicyMetadata};
