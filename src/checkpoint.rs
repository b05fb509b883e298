//! Checkpoint artifacts.
//!
//! Policy records are written to a fresh `ppo_{env}_{steps}` file per
//! cumulative-step milestone; the normalization statistics live in a single
//! `vecnorm_{env}` snapshot that is overwritten (via temp + rename) at each
//! checkpoint.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, StrikerError};
use crate::ppo::Algorithm;
use crate::vec_env::VecNormalize;

/// Manages the checkpoint directory and artifact naming.
pub struct Checkpointer {
    checkpoint_dir: PathBuf,
}

impl Checkpointer {
    /// Create a checkpointer, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(checkpoint_dir: P) -> Result<Self> {
        let checkpoint_dir = checkpoint_dir.as_ref().to_path_buf();
        if !checkpoint_dir.exists() {
            fs::create_dir_all(&checkpoint_dir)?;
        }
        Ok(Self { checkpoint_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Stem for the policy record at a cumulative-step milestone.
    pub fn policy_stem(&self, env_id: &str, steps: u64) -> PathBuf {
        self.checkpoint_dir.join(format!("ppo_{env_id}_{steps}"))
    }

    /// Path of the single (overwritten) statistics snapshot.
    pub fn stats_path(&self, env_id: &str) -> PathBuf {
        self.checkpoint_dir.join(format!("vecnorm_{env_id}.json"))
    }

    /// Persist one full checkpoint: the policy at this milestone plus the
    /// latest normalization statistics.
    pub fn save(&self, algo: &dyn Algorithm, venv: &VecNormalize, env_id: &str) -> Result<()> {
        let steps = algo.num_timesteps();
        let stem = self.policy_stem(env_id, steps);
        algo.save(&stem)?;
        venv.save(&self.stats_path(env_id))?;
        info!(steps, stem = %stem.display(), "saved checkpoint");
        Ok(())
    }

    /// Milestone step counts with a saved policy record for `env_id`,
    /// ascending.
    pub fn policy_milestones(&self, env_id: &str) -> Result<Vec<u64>> {
        let prefix = format!("ppo_{env_id}_");
        let mut milestones = Vec::new();
        for entry in fs::read_dir(&self.checkpoint_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            if let Some(steps) = rest.strip_suffix(".mpk") {
                if let Ok(steps) = steps.parse::<u64>() {
                    milestones.push(steps);
                }
            }
        }
        milestones.sort_unstable();
        Ok(milestones)
    }

    /// Stem of the newest policy record for `env_id`, if any.
    pub fn latest_policy_stem(&self, env_id: &str) -> Result<PathBuf> {
        let milestones = self.policy_milestones(env_id)?;
        match milestones.last() {
            Some(&steps) => Ok(self.policy_stem(env_id, steps)),
            None => Err(StrikerError::Load {
                path: self.checkpoint_dir.clone(),
                reason: format!("no policy checkpoints found for {env_id}"),
            }),
        }
    }
}
