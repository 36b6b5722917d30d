//! Cross-module tests for the policies.
//!
//! # Test Organization
//!
//! - `rollout_tests`: acting and training geometries on one set of weights
//! - `gradient_tests`: gradient flow through the heads, the LSTM and dropout
