//! Categorical action distribution over policy-head logits.
//!
//! The heads produce unnormalized logits `[batch, n_actions]`; this wraps
//! them with the operations rollout collection and the loss need:
//! - [`CategoricalPd::sample`]: actions and their negative log-probabilities
//! - [`CategoricalPd::neglogp`]: negative log-probability of given actions
//! - [`CategoricalPd::entropy`]: per-sample entropy
//! - [`CategoricalPd::mode`]: greedy actions

use burn::tensor::activation::{log_softmax, softmax};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};

use crate::config::ConfigError;
use crate::error::{floats_of, PolicyError};

/// Discrete action index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiscreteAction(pub u32);

impl From<u32> for DiscreteAction {
    fn from(val: u32) -> Self {
        Self(val)
    }
}

impl From<DiscreteAction> for u32 {
    fn from(val: DiscreteAction) -> Self {
        val.0
    }
}

/// Categorical distribution parameterized by logits.
#[derive(Clone, Debug)]
pub struct CategoricalPd<B: Backend> {
    /// Unnormalized log probabilities: [batch, n_actions]
    pub logits: Tensor<B, 2>,
}

impl<B: Backend> CategoricalPd<B> {
    pub fn new(logits: Tensor<B, 2>) -> Self {
        Self { logits }
    }

    pub fn probs(&self) -> Tensor<B, 2> {
        softmax(self.logits.clone(), 1)
    }

    pub fn n_actions(&self) -> usize {
        self.logits.dims()[1]
    }

    pub fn batch_size(&self) -> usize {
        self.logits.dims()[0]
    }

    fn ensure_actions(&self) -> Result<usize, PolicyError> {
        match self.n_actions() {
            0 => Err(ConfigError::InvalidCount {
                field: "n_actions",
                value: 0,
            }
            .into()),
            n => Ok(n),
        }
    }

    /// Sample one action per row via inverse CDF.
    ///
    /// Returns `(actions, neglogp)`.
    pub fn sample(&self) -> Result<(Vec<DiscreteAction>, Vec<f32>), PolicyError> {
        let n_actions = self.ensure_actions()?;
        let log_probs = floats_of(log_softmax(self.logits.clone(), 1))?;
        let batch_size = self.batch_size();

        let mut actions = Vec::with_capacity(batch_size);
        let mut neglogp = Vec::with_capacity(batch_size);

        for row in log_probs.chunks(n_actions).take(batch_size) {
            let rand_val = fastrand::f32();
            let mut cumsum = 0.0;
            // Falls through to the last action when rounding leaves the
            // cumulative sum just under 1.
            let mut selected = n_actions - 1;
            for (a, lp) in row.iter().enumerate() {
                cumsum += lp.exp();
                if rand_val < cumsum {
                    selected = a;
                    break;
                }
            }
            actions.push(DiscreteAction(selected as u32));
            neglogp.push(-row[selected]);
        }

        Ok((actions, neglogp))
    }

    /// Negative log-probability of `actions`, with gradient flow.
    pub fn neglogp(&self, actions: &[DiscreteAction]) -> Result<Tensor<B, 1>, PolicyError> {
        let batch_size = self.batch_size();
        if actions.len() != batch_size {
            return Err(PolicyError::ShapeMismatch {
                what: "actions",
                expected: vec![batch_size],
                actual: vec![actions.len()],
            });
        }

        let device = self.logits.device();
        let indices: Vec<i64> = actions.iter().map(|a| a.0 as i64).collect();
        let index: Tensor<B, 2, Int> =
            Tensor::from_data(TensorData::new(indices, [batch_size, 1]), &device);

        let selected = log_softmax(self.logits.clone(), 1).gather(1, index);
        Ok(selected.flatten::<1>(0, 1).neg())
    }

    /// H = -sum(p * log p), per sample.
    pub fn entropy(&self) -> Tensor<B, 1> {
        let log_probs = log_softmax(self.logits.clone(), 1);
        let plogp: Tensor<B, 2> = (self.probs() * log_probs).sum_dim(1);
        plogp.flatten::<1>(0, 1).neg()
    }

    /// Greedy actions.
    pub fn mode(&self) -> Result<Vec<DiscreteAction>, PolicyError> {
        self.ensure_actions()?;
        let best: Tensor<B, 2, Int> = self.logits.clone().argmax(1);
        let data = best.into_data().convert::<i64>();
        let indices = data
            .to_vec::<i64>()
            .map_err(|e| PolicyError::TensorData(format!("{:?}", e)))?;
        Ok(indices.into_iter().map(|i| DiscreteAction(i as u32)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_sample_valid_actions() {
        let device = Default::default();
        let logits: Tensor<B, 2> = Tensor::from_floats([[1.0, 2.0, 3.0], [3.0, 2.0, 1.0]], &device);
        let pd = CategoricalPd::new(logits);

        let (actions, neglogp) = pd.sample().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(neglogp.len(), 2);
        assert!(actions.iter().all(|a| a.0 < 3));
        assert!(neglogp.iter().all(|&n| n > 0.0));
    }

    #[test]
    fn test_sample_neglogp_matches_neglogp() {
        let device = Default::default();
        let logits: Tensor<B, 2> = Tensor::from_floats([[0.5, -1.0, 2.0, 0.0]], &device);
        let pd = CategoricalPd::new(logits);

        let (actions, sampled) = pd.sample().unwrap();
        let recomputed: Vec<f32> = pd.neglogp(&actions).unwrap().into_data().to_vec().unwrap();
        assert!((sampled[0] - recomputed[0]).abs() < 1e-5);
    }

    #[test]
    fn test_peaked_logits_sample_argmax() {
        let device = Default::default();
        let logits: Tensor<B, 2> = Tensor::from_floats([[0.0, 50.0, 0.0], [50.0, 0.0, 0.0]], &device);
        let pd = CategoricalPd::new(logits);

        let (actions, _) = pd.sample().unwrap();
        assert_eq!(actions, vec![DiscreteAction(1), DiscreteAction(0)]);
        assert_eq!(pd.mode().unwrap(), vec![DiscreteAction(1), DiscreteAction(0)]);
    }

    #[test]
    fn test_uniform_neglogp_and_entropy() {
        let device = Default::default();
        let logits: Tensor<B, 2> = Tensor::zeros([2, 4], &device);
        let pd = CategoricalPd::new(logits);

        let expected = 4f32.ln();
        let nlp: Vec<f32> = pd
            .neglogp(&[DiscreteAction(0), DiscreteAction(3)])
            .unwrap()
            .into_data()
            .to_vec()
            .unwrap();
        let ent: Vec<f32> = pd.entropy().into_data().to_vec().unwrap();

        for v in nlp.iter().chain(ent.iter()) {
            assert!((v - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn test_entropy_ordering() {
        let device = Default::default();
        let uniform = CategoricalPd::<B>::new(Tensor::from_floats([[1.0, 1.0, 1.0]], &device));
        let peaked = CategoricalPd::<B>::new(Tensor::from_floats([[10.0, 0.0, 0.0]], &device));

        let hu: f32 = uniform.entropy().into_scalar();
        let hp: f32 = peaked.entropy().into_scalar();
        assert!(hu > hp);
    }

    #[test]
    fn test_neglogp_length_mismatch() {
        let device = Default::default();
        let pd = CategoricalPd::<B>::new(Tensor::zeros([3, 2], &device));
        assert!(matches!(
            pd.neglogp(&[DiscreteAction(0)]),
            Err(PolicyError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_action_set_rejected() {
        let pd = CategoricalPd::<B>::new(Tensor::zeros([2, 0], &Default::default()));
        let expected = PolicyError::Config(ConfigError::InvalidCount {
            field: "n_actions",
            value: 0,
        });
        assert_eq!(pd.sample().err(), Some(expected.clone()));
        assert_eq!(pd.mode().err(), Some(expected));
    }
}
