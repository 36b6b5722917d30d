//! Neural network building blocks for the policy networks.
//!
//! # Modules
//!
//! - [`orthogonal`]: Orthogonally initialized dense and conv layers
//! - [`seeded_dropout`]: Dropout with a persistent, explicitly resampled mask
//! - [`batch_norm`]: Batch normalization over current-batch statistics
//! - [`masked_lstm`]: LSTM core with done-masking and packed state

pub mod orthogonal;
pub mod seeded_dropout;
pub mod batch_norm;
pub mod masked_lstm;

pub use orthogonal::{
    generate_orthogonal_weights, orthogonal_tensor, OrthogonalConv2dConfig, OrthogonalLinear,
    OrthogonalLinearConfig,
};
pub use seeded_dropout::{SeededDropout, SeededDropoutConfig};
pub use batch_norm::{BatchStatNorm, BatchStatNormConfig};
pub use masked_lstm::{batch_to_seq, mask_to_seq, seq_to_batch, MaskedLstm, MaskedLstmConfig};
