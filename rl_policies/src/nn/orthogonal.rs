//! Orthogonal initialization for dense and convolution layers.
//!
//! Every layer the Nature stack and the actor-critic heads use starts from
//! an orthogonal matrix scaled by a per-layer gain (`init_scale`):
//!
//! - `sqrt(2)` for ReLU feature layers
//! - `1.0` for the value head and the LSTM weights
//! - `0.01` for the stateless policy head, so initial action logits are
//!   nearly uniform
//!
//! Convolution kernels are orthogonalized over their flattened
//! `[out_channels, in_channels * k * k]` matrix.
//!
//! # Usage
//!
//! ```ignore
//! use rl_policies::nn::{OrthogonalConv2dConfig, OrthogonalLinearConfig};
//!
//! let conv = OrthogonalConv2dConfig::new(3, 16, 8)
//!     .with_stride(4)
//!     .with_gain(2f64.sqrt())
//!     .init::<B>(&device);
//! let head = OrthogonalLinearConfig::new(512, 15).with_gain(0.01).init::<B>(&device);
//! ```

use burn::module::{Module, Param};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use burn::tensor::{Distribution, TensorData};

/// Configuration for OrthogonalLinear layer.
#[derive(Debug, Clone)]
pub struct OrthogonalLinearConfig {
    /// Number of input features.
    pub d_input: usize,
    /// Number of output features.
    pub d_output: usize,
    /// Gain factor for scaling the orthogonal weights.
    pub gain: f64,
    /// Whether to include a (zero-initialized) bias term.
    pub bias: bool,
}

impl OrthogonalLinearConfig {
    pub fn new(d_input: usize, d_output: usize) -> Self {
        Self {
            d_input,
            d_output,
            gain: 1.0,
            bias: true,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Initialize the layer.
    pub fn init<B: Backend>(&self, device: &B::Device) -> OrthogonalLinear<B> {
        let weight =
            orthogonal_tensor::<B, 2>([self.d_output, self.d_input], self.gain, device);

        let bias = if self.bias {
            Some(Param::from_tensor(Tensor::zeros([self.d_output], device)))
        } else {
            None
        };

        OrthogonalLinear {
            weight: Param::from_tensor(weight),
            bias,
            d_input: self.d_input,
            d_output: self.d_output,
        }
    }
}

/// Dense layer with orthogonal initialization.
#[derive(Module, Debug)]
pub struct OrthogonalLinear<B: Backend> {
    /// Weight matrix of shape [d_output, d_input]
    pub weight: Param<Tensor<B, 2>>,
    /// Optional bias of shape [d_output]
    pub bias: Option<Param<Tensor<B, 1>>>,
    d_input: usize,
    d_output: usize,
}

impl<B: Backend> OrthogonalLinear<B> {
    /// y = xW^T + b for input of shape [batch, d_input].
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let output = input.matmul(self.weight.val().transpose());

        match &self.bias {
            Some(bias) => output + bias.val().unsqueeze_dim(0),
            None => output,
        }
    }

    pub fn d_input(&self) -> usize {
        self.d_input
    }

    pub fn d_output(&self) -> usize {
        self.d_output
    }
}

/// Configuration for an orthogonally initialized square-kernel convolution.
#[derive(Debug, Clone)]
pub struct OrthogonalConv2dConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub gain: f64,
}

impl OrthogonalConv2dConfig {
    /// Valid-padded, stride 1, gain 1.
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            gain: 1.0,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    /// Initialize a Burn `Conv2d` whose kernel is orthogonal and bias zero.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Conv2d<B> {
        let k = self.kernel_size;
        let mut conv = Conv2dConfig::new([self.in_channels, self.out_channels], [k, k])
            .with_stride([self.stride, self.stride])
            .with_padding(PaddingConfig2d::Valid)
            .init(device);

        conv.weight = Param::from_tensor(orthogonal_tensor::<B, 4>(
            [self.out_channels, self.in_channels, k, k],
            self.gain,
            device,
        ));
        conv.bias = Some(Param::from_tensor(Tensor::zeros([self.out_channels], device)));
        conv
    }
}

/// Orthogonal tensor whose first dim is treated as rows and the rest flattened
/// into columns, scaled by `gain`.
pub fn orthogonal_tensor<B: Backend, const D: usize>(
    shape: [usize; D],
    gain: f64,
    device: &B::Device,
) -> Tensor<B, D> {
    let rows = shape[0];
    let cols: usize = shape[1..].iter().product();
    let values = generate_orthogonal_weights::<B>(rows, cols, gain, device);
    Tensor::from_data(TensorData::new(values, shape), device)
}

/// Row-major `[rows, cols]` matrix with orthonormal rows (wide) or columns
/// (tall), scaled by `gain`.
///
/// Starts from a Gaussian draw on `device` and runs modified Gram-Schmidt in
/// f64 on the host; vectors that come out degenerate are redrawn.
pub fn generate_orthogonal_weights<B: Backend>(
    rows: usize,
    cols: usize,
    gain: f64,
    device: &B::Device,
) -> Vec<f32> {
    // Orthogonalize along the longer axis: `n` vectors of length `len`.
    let tall = rows >= cols;
    let (n, len) = if tall { (cols, rows) } else { (rows, cols) };

    let draw = gaussian::<B>(n * len, device);
    let mut candidates = draw.chunks(len.max(1)).map(|c| c.to_vec());

    let mut vectors: Vec<Vec<f64>> = Vec::with_capacity(n);
    while vectors.len() < n {
        let mut v = candidates
            .next()
            .unwrap_or_else(|| gaussian::<B>(len, device));
        for u in &vectors {
            let dot: f64 = v.iter().zip(u.iter()).map(|(a, b)| a * b).sum();
            for (vi, ui) in v.iter_mut().zip(u.iter()) {
                *vi -= dot * ui;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 1e-10 {
            v.iter_mut().for_each(|x| *x /= norm);
            vectors.push(v);
        }
    }

    let mut out = vec![0.0f32; rows * cols];
    for (i, v) in vectors.iter().enumerate() {
        for (j, &x) in v.iter().enumerate() {
            let (r, c) = if tall { (j, i) } else { (i, j) };
            out[r * cols + c] = (x * gain) as f32;
        }
    }
    out
}

/// `len` samples from N(0, 1), drawn by the backend and read back as f64.
fn gaussian<B: Backend>(len: usize, device: &B::Device) -> Vec<f64> {
    if len == 0 {
        return Vec::new();
    }
    Tensor::<B, 1>::random([len], Distribution::Normal(0.0, 1.0), device)
        .into_data()
        .iter::<f64>()
        .collect()
}
