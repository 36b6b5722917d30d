//! Policy checkpointing.
//!
//! Parameters go through Burn's `BinFileRecorder`; next to each `.bin` file
//! sits a JSON sidecar with everything needed to rebuild the policy, so
//! loading only needs a path and a device.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rl_policies::checkpoint::{CheckpointerConfig, PolicyCheckpointer, PolicyMetadata};
//!
//! let metadata = PolicyMetadata::new(policy_config, ob_space, n_actions, nbatch, nsteps);
//! let config = CheckpointerConfig::new("./checkpoints").with_keep_last_n(5);
//! let mut checkpointer = PolicyCheckpointer::new(config, metadata)?;
//!
//! // In the update loop:
//! if checkpointer.should_save(update) {
//!     checkpointer.save(&policy, update)?;
//! }
//!
//! // Resume:
//! let (policy, update) = checkpointer.load_latest::<B>(&device)?;
//! ```

pub mod checkpointer;

pub use checkpointer::{
    CheckpointError,
    CheckpointInfo,
    CheckpointerConfig,
    PolicyCheckpointer,
    PolicyMetadata,
};
