//! Configuration for policy construction.
//!
//! Plain builder-style structs. Loading them from files or flags is left to
//! the caller; everything here only describes and validates a policy layout.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Architecture name not recognised.
    UnknownArchitecture(String),
    /// Legacy LSTM switch must be 0 or 1.
    InvalidLstmFlag(i64),
    /// A count parameter must be positive.
    InvalidCount {
        field: &'static str,
        value: usize,
    },
    /// A parameter is outside its valid range.
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    /// Batch size is not a multiple of the rollout length.
    UnevenBatch {
        nbatch: usize,
        nsteps: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownArchitecture(name) => {
                write!(f, "unknown architecture '{}' (expected nature, impala or impalalarge)", name)
            }
            ConfigError::InvalidLstmFlag(flag) => {
                write!(f, "use_lstm must be 0 or 1, got {}", flag)
            }
            ConfigError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigError::OutOfRange { field, value, min, max } => {
                write!(f, "{} must be in [{}, {}), got {}", field, min, max, value)
            }
            ConfigError::UnevenBatch { nbatch, nsteps } => {
                write!(f, "nbatch ({}) must be a multiple of nsteps ({})", nbatch, nsteps)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Convolutional feature extractor family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// Two-tower DQN-style stack.
    Nature,
    /// Residual stack with depths [16, 32, 32].
    #[default]
    Impala,
    /// Residual stack with depths [32, 64, 64, 64, 64].
    ImpalaLarge,
}

impl Architecture {
    /// Channel depth of each conv sequence, `None` for non-residual stacks.
    pub fn impala_depths(&self) -> Option<Vec<usize>> {
        match self {
            Architecture::Nature => None,
            Architecture::Impala => Some(vec![16, 32, 32]),
            Architecture::ImpalaLarge => Some(vec![32, 64, 64, 64, 64]),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Architecture::Nature => "nature",
            Architecture::Impala => "impala",
            Architecture::ImpalaLarge => "impalalarge",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nature" => Ok(Architecture::Nature),
            "impala" => Ok(Architecture::Impala),
            "impalalarge" => Ok(Architecture::ImpalaLarge),
            _ => Err(ConfigError::UnknownArchitecture(s.to_string())),
        }
    }
}

/// Which policy head to wire onto the features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyKind {
    /// Stateless actor-critic.
    Cnn,
    /// Recurrent actor-critic with an LSTM core.
    Lstm,
}

impl PolicyKind {
    /// Interpret the legacy integer `use_lstm` switch.
    pub fn from_flag(flag: i64) -> Result<Self, ConfigError> {
        match flag {
            0 => Ok(PolicyKind::Cnn),
            1 => Ok(PolicyKind::Lstm),
            other => Err(ConfigError::InvalidLstmFlag(other)),
        }
    }
}

/// Policy layout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Feature extractor family.
    pub architecture: Architecture,
    /// Wire an LSTM between features and heads.
    pub use_lstm: bool,
    /// LSTM hidden units.
    pub nlstm: usize,
    /// Dropout rate for the residual stack (0 disables the masks).
    pub dropout: f32,
    /// Batch normalisation after each residual-stack conv.
    pub use_batch_norm: bool,
    /// Include the pooled side tower in the Nature stack.
    pub nature_pooled_tower: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            architecture: Architecture::Impala,
            use_lstm: false,
            nlstm: 256,
            dropout: 0.0,
            use_batch_norm: false,
            nature_pooled_tower: true,
        }
    }
}

impl PolicyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }

    pub fn with_lstm(mut self, use_lstm: bool) -> Self {
        self.use_lstm = use_lstm;
        self
    }

    pub fn with_nlstm(mut self, nlstm: usize) -> Self {
        self.nlstm = nlstm;
        self
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_batch_norm(mut self, use_batch_norm: bool) -> Self {
        self.use_batch_norm = use_batch_norm;
        self
    }

    pub fn with_nature_pooled_tower(mut self, enabled: bool) -> Self {
        self.nature_pooled_tower = enabled;
        self
    }

    /// Policy head implied by `use_lstm`.
    pub fn policy_kind(&self) -> PolicyKind {
        if self.use_lstm {
            PolicyKind::Lstm
        } else {
            PolicyKind::Cnn
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.dropout) || self.dropout.is_nan() {
            return Err(ConfigError::OutOfRange {
                field: "dropout",
                value: self.dropout,
                min: 0.0,
                max: 1.0,
            });
        }
        if self.use_lstm && self.nlstm == 0 {
            return Err(ConfigError::InvalidCount {
                field: "nlstm",
                value: self.nlstm,
            });
        }
        Ok(())
    }
}

/// Check rollout geometry and return the number of parallel environments.
pub fn envs_per_batch(nbatch: usize, nsteps: usize) -> Result<usize, ConfigError> {
    if nsteps == 0 {
        return Err(ConfigError::InvalidCount {
            field: "nsteps",
            value: nsteps,
        });
    }
    if nbatch == 0 {
        return Err(ConfigError::InvalidCount {
            field: "nbatch",
            value: nbatch,
        });
    }
    if nbatch % nsteps != 0 {
        return Err(ConfigError::UnevenBatch { nbatch, nsteps });
    }
    Ok(nbatch / nsteps)
}
