//! Error type for policy construction and evaluation.

use std::fmt;

use crate::config::ConfigError;

/// Error returned by policy construction and `step`/`value` evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// Invalid configuration.
    Config(ConfigError),
    /// The observation is too small for the convolution stack.
    ObservationTooSmall {
        stage: &'static str,
        height: usize,
        width: usize,
    },
    /// A tensor did not have the expected shape.
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// Recurrent policies need a state tensor.
    MissingState,
    /// Recurrent policies need a done-mask tensor.
    MissingMask,
    /// Reading tensor data back to the host failed.
    TensorData(String),
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::Config(e) => write!(f, "config error: {}", e),
            PolicyError::ObservationTooSmall { stage, height, width } => write!(
                f,
                "observation collapses to {}x{} at {}",
                height, width, stage
            ),
            PolicyError::ShapeMismatch { what, expected, actual } => write!(
                f,
                "{} shape mismatch: expected {:?}, got {:?}",
                what, expected, actual
            ),
            PolicyError::MissingState => write!(f, "recurrent policy requires a state tensor"),
            PolicyError::MissingMask => write!(f, "recurrent policy requires a mask tensor"),
            PolicyError::TensorData(e) => write!(f, "tensor data error: {}", e),
        }
    }
}

impl std::error::Error for PolicyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PolicyError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for PolicyError {
    fn from(e: ConfigError) -> Self {
        PolicyError::Config(e)
    }
}

/// Pull a float tensor back to the host.
pub(crate) fn floats_of<B: burn::tensor::backend::Backend, const D: usize>(
    tensor: burn::tensor::Tensor<B, D>,
) -> Result<Vec<f32>, PolicyError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| PolicyError::TensorData(format!("{:?}", e)))
}
