//! Saving and restoring policies with their construction metadata.

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::PolicyConfig;
use crate::error::PolicyError;
use crate::observation::ObservationSpace;
use crate::policy::{build_policy, Policy};

const PREFIX: &str = "policy_";

/// Configuration for the checkpointer.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    /// Directory to store checkpoints.
    pub checkpoint_dir: PathBuf,
    /// Updates between checkpoint saves.
    pub save_interval: usize,
    /// Number of recent checkpoints to keep (0 = keep all).
    pub keep_last_n: usize,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("./checkpoints"),
            save_interval: 100,
            keep_last_n: 5,
        }
    }
}

impl CheckpointerConfig {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_save_interval(mut self, interval: usize) -> Self {
        self.save_interval = interval;
        self
    }

    pub fn with_keep_last_n(mut self, n: usize) -> Self {
        self.keep_last_n = n;
        self
    }
}

/// Error type for checkpointing operations.
#[derive(Debug)]
pub enum CheckpointError {
    /// IO error during save/load.
    Io(io::Error),
    /// Burn recorder error.
    Recorder(String),
    /// Sidecar (de)serialization error.
    Json(serde_json::Error),
    /// The stored metadata does not describe a buildable policy.
    Policy(PolicyError),
    /// No checkpoints found.
    NoCheckpoints,
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "IO error: {}", e),
            CheckpointError::Recorder(e) => write!(f, "Recorder error: {}", e),
            CheckpointError::Json(e) => write!(f, "Metadata error: {}", e),
            CheckpointError::Policy(e) => write!(f, "Policy error: {}", e),
            CheckpointError::NoCheckpoints => write!(f, "No checkpoints found"),
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CheckpointError::Io(e) => Some(e),
            CheckpointError::Json(e) => Some(e),
            CheckpointError::Policy(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

impl From<serde_json::Error> for CheckpointError {
    fn from(e: serde_json::Error) -> Self {
        CheckpointError::Json(e)
    }
}

impl From<PolicyError> for CheckpointError {
    fn from(e: PolicyError) -> Self {
        CheckpointError::Policy(e)
    }
}

/// Everything [`build_policy`] needs, stored beside the parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    pub config: PolicyConfig,
    pub ob_space: ObservationSpace,
    pub n_actions: usize,
    pub nbatch: usize,
    pub nsteps: usize,
    /// Update at which the checkpoint was written.
    #[serde(default)]
    pub update: usize,
}

impl PolicyMetadata {
    pub fn new(
        config: PolicyConfig,
        ob_space: ObservationSpace,
        n_actions: usize,
        nbatch: usize,
        nsteps: usize,
    ) -> Self {
        Self {
            config,
            ob_space,
            n_actions,
            nbatch,
            nsteps,
            update: 0,
        }
    }

    /// Freshly initialised policy with this layout.
    pub fn build<B: Backend>(&self, device: &B::Device) -> Result<Policy<B>, PolicyError> {
        build_policy(
            &self.config,
            &self.ob_space,
            self.n_actions,
            self.nbatch,
            self.nsteps,
            device,
        )
    }
}

/// A checkpoint on disk.
#[derive(Debug, Clone)]
pub struct CheckpointInfo {
    /// Path to the parameter file.
    pub path: PathBuf,
    /// Update at which the checkpoint was saved.
    pub update: usize,
}

impl CheckpointInfo {
    /// Path of the JSON sidecar.
    pub fn metadata_path(&self) -> PathBuf {
        self.path.with_extension("json")
    }
}

/// Policy checkpointer.
///
/// Writes `policy_<update>.bin` plus `policy_<update>.json` and keeps the
/// most recent `keep_last_n` pairs.
pub struct PolicyCheckpointer {
    config: CheckpointerConfig,
    metadata: PolicyMetadata,
}

impl PolicyCheckpointer {
    /// Create a new checkpointer.
    ///
    /// Creates the checkpoint directory if it doesn't exist.
    pub fn new(config: CheckpointerConfig, metadata: PolicyMetadata) -> Result<Self, CheckpointError> {
        fs::create_dir_all(&config.checkpoint_dir)?;
        Ok(Self { config, metadata })
    }

    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    pub fn metadata(&self) -> &PolicyMetadata {
        &self.metadata
    }

    /// Check if it's time to save a checkpoint.
    pub fn should_save(&self, update: usize) -> bool {
        self.config.save_interval > 0 && update > 0 && update % self.config.save_interval == 0
    }

    /// Save `policy` parameters and metadata for `update`.
    pub fn save<B: Backend>(&self, policy: &Policy<B>, update: usize) -> Result<PathBuf, CheckpointError> {
        let path = self.config.checkpoint_dir.join(format!("{}{:08}.bin", PREFIX, update));
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();

        let recorded = match policy {
            Policy::Cnn(p) => p.clone().save_file(&path, &recorder),
            Policy::Lstm(p) => p.clone().save_file(&path, &recorder),
        };
        recorded.map_err(|e| CheckpointError::Recorder(e.to_string()))?;

        let metadata = PolicyMetadata {
            update,
            ..self.metadata.clone()
        };
        fs::write(path.with_extension("json"), serde_json::to_string_pretty(&metadata)?)?;

        log::info!("saved checkpoint for update {} to {}", update, path.display());
        self.cleanup_old_checkpoints()?;
        Ok(path)
    }

    /// Rebuild a policy from its sidecar and load the parameters at `path`.
    pub fn load<B: Backend>(&self, path: &Path, device: &B::Device) -> Result<Policy<B>, CheckpointError> {
        let metadata: PolicyMetadata = serde_json::from_str(&fs::read_to_string(path.with_extension("json"))?)?;
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();

        let loaded = match metadata.build::<B>(device)? {
            Policy::Cnn(p) => p.load_file(path, &recorder, device).map(Policy::Cnn),
            Policy::Lstm(p) => p.load_file(path, &recorder, device).map(Policy::Lstm),
        };
        loaded.map_err(|e| CheckpointError::Recorder(e.to_string()))
    }

    /// Load the latest checkpoint.
    ///
    /// Returns the policy and the update it was saved at.
    pub fn load_latest<B: Backend>(&self, device: &B::Device) -> Result<(Policy<B>, usize), CheckpointError> {
        let latest = self.list()?.pop().ok_or(CheckpointError::NoCheckpoints)?;
        let policy = self.load(&latest.path, device)?;
        Ok((policy, latest.update))
    }

    /// All checkpoints in the directory, oldest first.
    pub fn list(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let mut checkpoints: Vec<CheckpointInfo> = fs::read_dir(&self.config.checkpoint_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                let update = path
                    .file_name()?
                    .to_str()?
                    .strip_prefix(PREFIX)?
                    .strip_suffix(".bin")?
                    .parse()
                    .ok()?;
                Some(CheckpointInfo { path, update })
            })
            .collect();

        checkpoints.sort_by_key(|c| c.update);
        Ok(checkpoints)
    }

    /// Cleanup old checkpoints, keeping only the last N.
    fn cleanup_old_checkpoints(&self) -> Result<(), CheckpointError> {
        if self.config.keep_last_n == 0 {
            return Ok(()); // Keep all
        }

        let checkpoints = self.list()?;
        let excess = checkpoints.len().saturating_sub(self.config.keep_last_n);
        for old in &checkpoints[..excess] {
            log::debug!("removing checkpoint {}", old.path.display());
            fs::remove_file(&old.path)?;
            let sidecar = old.metadata_path();
            if sidecar.exists() {
                fs::remove_file(sidecar)?;
            }
        }

        Ok(())
    }
}
