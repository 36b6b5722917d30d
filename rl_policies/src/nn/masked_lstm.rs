//! LSTM core with episode-boundary masking and packed state.
//!
//! The recurrent policy unrolls over rollouts of `nsteps` steps for `nenv`
//! environments. Inputs arrive env-major (`[nenv * nsteps, F]`, all steps of
//! env 0 first), the state is one tensor `[nenv, 2 * nlstm]` holding
//! `[cell | hidden]`, and a mask value of 1 at step `t` means the episode
//! ended at `t - 1`: both cell and hidden are zeroed before the update.

use burn::module::Module;
use burn::prelude::*;
use burn::tensor::activation::{sigmoid, tanh};

use super::orthogonal::{OrthogonalLinear, OrthogonalLinearConfig};

/// Split an env-major batch into `nsteps` tensors of shape `[nenv, F]`.
pub fn batch_to_seq<B: Backend>(batch: Tensor<B, 2>, nenv: usize, nsteps: usize) -> Vec<Tensor<B, 2>> {
    let features = batch.dims()[1];
    let grouped: Tensor<B, 3> = batch.reshape([nenv, nsteps, features]);
    (0..nsteps)
        .map(|t| {
            grouped
                .clone()
                .slice([0..nenv, t..t + 1, 0..features])
                .reshape([nenv, features])
        })
        .collect()
}

/// Inverse of [`batch_to_seq`].
///
/// # Panics
///
/// If `seq` is empty; [`MaskedLstm::forward`] needs `nsteps >= 1`.
pub fn seq_to_batch<B: Backend>(seq: Vec<Tensor<B, 2>>) -> Tensor<B, 2> {
    let nsteps = seq.len();
    let [nenv, features] = seq[0].dims();
    let stacked: Vec<Tensor<B, 3>> = seq
        .into_iter()
        .map(|x| x.reshape([nenv, 1, features]))
        .collect();
    Tensor::cat(stacked, 1).reshape([nenv * nsteps, features])
}

/// Split a mask vector `[nenv * nsteps]` into per-step `[nenv, 1]` columns.
pub fn mask_to_seq<B: Backend>(mask: Tensor<B, 1>, nenv: usize, nsteps: usize) -> Vec<Tensor<B, 2>> {
    batch_to_seq(mask.reshape([nenv * nsteps, 1]), nenv, nsteps)
}

/// Configuration for [`MaskedLstm`].
#[derive(Debug, Clone)]
pub struct MaskedLstmConfig {
    pub d_input: usize,
    pub d_hidden: usize,
    /// Orthogonal gain of input and recurrent weights.
    pub gain: f64,
}

impl MaskedLstmConfig {
    pub fn new(d_input: usize, d_hidden: usize) -> Self {
        Self {
            d_input,
            d_hidden,
            gain: 1.0,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> MaskedLstm<B> {
        MaskedLstm {
            input_gates: OrthogonalLinearConfig::new(self.d_input, 4 * self.d_hidden)
                .with_gain(self.gain)
                .init(device),
            hidden_gates: OrthogonalLinearConfig::new(self.d_hidden, 4 * self.d_hidden)
                .with_gain(self.gain)
                .with_bias(false)
                .init(device),
            d_input: self.d_input,
            d_hidden: self.d_hidden,
        }
    }
}

/// Single-layer LSTM with gate order `[i, f, o, u]`.
#[derive(Module, Debug)]
pub struct MaskedLstm<B: Backend> {
    /// x -> gates, with the shared bias.
    input_gates: OrthogonalLinear<B>,
    /// h -> gates.
    hidden_gates: OrthogonalLinear<B>,
    d_input: usize,
    d_hidden: usize,
}

impl<B: Backend> MaskedLstm<B> {
    /// Width of the packed state.
    pub fn state_size(&self) -> usize {
        2 * self.d_hidden
    }

    pub fn d_input(&self) -> usize {
        self.d_input
    }

    pub fn d_hidden(&self) -> usize {
        self.d_hidden
    }

    /// Zeroed packed state for `nenv` environments.
    pub fn zero_state(&self, nenv: usize, device: &B::Device) -> Tensor<B, 2> {
        Tensor::zeros([nenv, self.state_size()], device)
    }

    /// Split a packed state into `(cell, hidden)`.
    pub fn unpack(&self, state: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let nenv = state.dims()[0];
        let h = self.d_hidden;
        let cell = state.clone().slice([0..nenv, 0..h]);
        let hidden = state.slice([0..nenv, h..2 * h]);
        (cell, hidden)
    }

    /// One masked step. `mask` is `[nenv, 1]`.
    pub fn step(
        &self,
        input: Tensor<B, 2>,
        mask: Tensor<B, 2>,
        cell: Tensor<B, 2>,
        hidden: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let keep = mask.neg().add_scalar(1.0);
        let cell = cell * keep.clone();
        let hidden = hidden * keep;

        let z = self.input_gates.forward(input) + self.hidden_gates.forward(hidden);
        let nenv = z.dims()[0];
        let h = self.d_hidden;
        let gate = |k: usize| z.clone().slice([0..nenv, k * h..(k + 1) * h]);

        let i = sigmoid(gate(0));
        let f = sigmoid(gate(1));
        let o = sigmoid(gate(2));
        let u = tanh(gate(3));

        let cell = f * cell + i * u;
        let hidden = o * tanh(cell.clone());
        (cell, hidden)
    }

    /// Unroll over an env-major batch.
    ///
    /// Returns the per-step outputs as an env-major batch `[nenv * nsteps,
    /// d_hidden]` and the final packed state.
    pub fn forward(
        &self,
        inputs: Tensor<B, 2>,
        masks: Tensor<B, 1>,
        state: Tensor<B, 2>,
        nenv: usize,
        nsteps: usize,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let xs = batch_to_seq(inputs, nenv, nsteps);
        let ms = mask_to_seq(masks, nenv, nsteps);
        let (mut cell, mut hidden) = self.unpack(state);

        let mut outputs = Vec::with_capacity(nsteps);
        for (x, m) in xs.into_iter().zip(ms) {
            let (c, h) = self.step(x, m, cell, hidden);
            outputs.push(h.clone());
            cell = c;
            hidden = h;
        }

        (seq_to_batch(outputs), Tensor::cat(vec![cell, hidden], 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    fn to_vec<const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    #[test]
    fn test_batch_to_seq_is_env_major() {
        let device = Default::default();
        // nenv = 2, nsteps = 3, one feature holding the row index
        let batch = Tensor::<B, 1>::from_floats([0.0, 1.0, 2.0, 3.0, 4.0, 5.0], &device).reshape([6, 1]);
        let seq = batch_to_seq(batch.clone(), 2, 3);

        assert_eq!(seq.len(), 3);
        assert_eq!(to_vec(seq[0].clone()), vec![0.0, 3.0]);
        assert_eq!(to_vec(seq[2].clone()), vec![2.0, 5.0]);
        assert_eq!(to_vec(seq_to_batch(seq)), to_vec(batch));
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let lstm = MaskedLstmConfig::new(5, 4).init::<B>(&device);

        let inputs = Tensor::<B, 2>::random([6, 5], Distribution::Normal(0.0, 1.0), &device);
        let masks = Tensor::<B, 1>::zeros([6], &device);
        let state = lstm.zero_state(2, &device);

        let (outputs, new_state) = lstm.forward(inputs, masks, state, 2, 3);
        assert_eq!(outputs.dims(), [6, 4]);
        assert_eq!(new_state.dims(), [2, 8]);
    }

    #[test]
    fn test_last_output_matches_packed_hidden() {
        let device = Default::default();
        let lstm = MaskedLstmConfig::new(3, 2).init::<B>(&device);

        let inputs = Tensor::<B, 2>::random([4, 3], Distribution::Normal(0.0, 1.0), &device);
        let (outputs, state) = lstm.forward(
            inputs,
            Tensor::zeros([4], &device),
            lstm.zero_state(1, &device),
            1,
            4,
        );
        let last = outputs.slice([3..4, 0..2]);
        let (_, hidden) = lstm.unpack(state);
        assert_eq!(to_vec(last), to_vec(hidden));
    }

    #[test]
    fn test_mask_resets_state() {
        let device = Default::default();
        let lstm = MaskedLstmConfig::new(3, 4).init::<B>(&device);
        let x = Tensor::<B, 2>::random([1, 3], Distribution::Normal(0.0, 1.0), &device);

        let carried = Tensor::<B, 2>::ones([1, 8], &device);
        let zero = lstm.zero_state(1, &device);

        // A done mask makes the carried state irrelevant.
        let done = Tensor::<B, 1>::ones([1], &device);
        let (out_carried, _) = lstm.forward(x.clone(), done.clone(), carried.clone(), 1, 1);
        let (out_zero, _) = lstm.forward(x.clone(), done, zero, 1, 1);
        assert_eq!(to_vec(out_carried), to_vec(out_zero));

        // Without the mask the carried state changes the output.
        let not_done = Tensor::<B, 1>::zeros([1], &device);
        let (out_kept, _) = lstm.forward(x.clone(), not_done.clone(), carried, 1, 1);
        let (out_fresh, _) = lstm.forward(x, not_done, lstm.zero_state(1, &device), 1, 1);
        assert_ne!(to_vec(out_kept), to_vec(out_fresh));
    }

    #[test]
    fn test_unroll_equals_stepping() {
        let device = Default::default();
        let lstm = MaskedLstmConfig::new(3, 4).init::<B>(&device);

        // 2 envs x 2 steps, env-major
        let inputs = Tensor::<B, 2>::random([4, 3], Distribution::Normal(0.0, 1.0), &device);
        let masks = Tensor::<B, 1>::from_floats([0.0, 0.0, 0.0, 1.0], &device);
        let (_, unrolled) = lstm.forward(inputs.clone(), masks.clone(), lstm.zero_state(2, &device), 2, 2);

        let seq = batch_to_seq(inputs, 2, 2);
        let mseq = mask_to_seq(masks, 2, 2);
        let mut state = lstm.zero_state(2, &device);
        for t in 0..2 {
            let mask_t = mseq[t].clone().reshape([2]);
            let (_, next) = lstm.forward(seq[t].clone(), mask_t, state, 2, 1);
            state = next;
        }

        let a = to_vec(unrolled);
        let b = to_vec(state);
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }
}
