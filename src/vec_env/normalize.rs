//! Observation and reward normalization around the environment pool.
//!
//! Running statistics use Welford's online algorithm (numerically stable
//! incremental mean/variance, never batch recomputation). The statistics
//! are part of every checkpoint: a policy trained on normalized inputs is
//! only meaningful together with the statistics that produced them.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::pool::{BatchStep, EnvPool};
use crate::error::{Result, StrikerError};

const EPSILON: f64 = 1e-8;

/// Per-dimension running mean/variance (Welford).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningMeanStd {
    mean: Vec<f64>,
    /// Sum of squared deviations from the running mean (M2 accumulator).
    m2: Vec<f64>,
    count: f64,
}

impl RunningMeanStd {
    pub fn new(dim: usize) -> Self {
        Self {
            mean: vec![0.0; dim],
            m2: vec![0.0; dim],
            count: 0.0,
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    /// Fold one sample into the running statistics.
    pub fn update(&mut self, sample: &[f32]) {
        debug_assert_eq!(sample.len(), self.mean.len());
        self.count += 1.0;
        for (j, &x) in sample.iter().enumerate() {
            let x = f64::from(x);
            let delta = x - self.mean[j];
            self.mean[j] += delta / self.count;
            let delta2 = x - self.mean[j];
            self.m2[j] += delta * delta2;
        }
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Current variance estimate per dimension.
    pub fn variance(&self, j: usize) -> f64 {
        if self.count < 2.0 {
            1.0
        } else {
            self.m2[j] / self.count
        }
    }

    /// Normalize a vector to zero mean / unit variance, clamped to `clip`.
    pub fn normalize(&self, values: &[f32], clip: f32) -> Vec<f32> {
        if self.count < 2.0 {
            return values.to_vec();
        }
        values
            .iter()
            .enumerate()
            .map(|(j, &x)| {
                let std = (self.variance(j) + EPSILON).sqrt();
                let normalized = ((f64::from(x) - self.mean[j]) / std) as f32;
                normalized.clamp(-clip, clip)
            })
            .collect()
    }
}

/// Normalization parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Normalize observations.
    pub norm_obs: bool,
    /// Normalize rewards by the running std of the discounted return.
    pub norm_reward: bool,
    /// Symmetric clip applied to normalized observations.
    pub clip_obs: f32,
    /// Symmetric clip applied to normalized rewards.
    pub clip_reward: f32,
    /// Discount used for the return estimate behind reward scaling.
    pub gamma: f32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            norm_obs: true,
            norm_reward: true,
            clip_obs: 10.0,
            clip_reward: 10.0,
            gamma: 0.99,
        }
    }
}

/// The persisted statistics snapshot (`vecnorm_{env}` artifact).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub config: NormalizeConfig,
    pub obs_rms: RunningMeanStd,
    pub ret_rms: RunningMeanStd,
}

/// Wraps an [`EnvPool`] and transparently rescales observations and rewards.
///
/// Statistics update only while in training mode; evaluation never drifts
/// the normalization baseline. The trainer owns this value mutably, so a
/// checkpoint save always observes a consistent snapshot.
pub struct VecNormalize {
    pool: EnvPool,
    config: NormalizeConfig,
    obs_rms: RunningMeanStd,
    ret_rms: RunningMeanStd,
    /// Per-slot discounted return accumulator feeding `ret_rms`.
    returns: Vec<f64>,
    training: bool,
}

impl VecNormalize {
    pub fn new(pool: EnvPool, config: NormalizeConfig) -> Self {
        let obs_dim = pool.observation_space().shape();
        let returns = vec![0.0; pool.num_envs()];
        Self {
            pool,
            config,
            obs_rms: RunningMeanStd::new(obs_dim),
            ret_rms: RunningMeanStd::new(1),
            returns,
            training: true,
        }
    }

    pub fn num_envs(&self) -> usize {
        self.pool.num_envs()
    }

    pub fn pool(&self) -> &EnvPool {
        &self.pool
    }

    /// Enable or disable statistics updates.
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    fn normalize_obs(&mut self, observation: &[f32]) -> Vec<f32> {
        if !self.config.norm_obs {
            return observation.to_vec();
        }
        if self.training {
            self.obs_rms.update(observation);
        }
        self.obs_rms.normalize(observation, self.config.clip_obs)
    }

    fn normalize_reward(&mut self, slot: usize, reward: f32, done: bool) -> f32 {
        if !self.config.norm_reward {
            return reward;
        }
        if self.training {
            self.returns[slot] =
                self.returns[slot] * f64::from(self.config.gamma) + f64::from(reward);
            self.ret_rms.update(&[self.returns[slot] as f32]);
            if done {
                self.returns[slot] = 0.0;
            }
        }
        let std = (self.ret_rms.variance(0) + EPSILON).sqrt();
        let scaled = if self.ret_rms.count() < 2.0 {
            reward
        } else {
            (f64::from(reward) / std) as f32
        };
        scaled.clamp(-self.config.clip_reward, self.config.clip_reward)
    }

    /// Reset all environments, returning normalized observations.
    pub fn reset(&mut self) -> Result<Vec<Vec<f32>>> {
        for r in self.returns.iter_mut() {
            *r = 0.0;
        }
        let observations = self.pool.reset()?;
        Ok(observations
            .iter()
            .map(|obs| self.normalize_obs(obs))
            .collect())
    }

    /// Step all environments, returning a normalized batch.
    pub fn step(&mut self, actions: &[Vec<f32>]) -> Result<BatchStep> {
        let mut batch = self.pool.step(actions)?;
        let dones = batch.dones();
        for slot in 0..batch.observations.len() {
            let normalized = self.normalize_obs(&batch.observations[slot]);
            batch.observations[slot] = normalized;
            batch.rewards[slot] =
                self.normalize_reward(slot, batch.rewards[slot], dones[slot]);
            if let Some(final_obs) = batch.final_observations[slot].take() {
                // Final observations are normalized but never update stats:
                // the post-reset observation for the slot already did.
                batch.final_observations[slot] =
                    Some(self.obs_rms.normalize(&final_obs, self.config.clip_obs));
            }
        }
        Ok(batch)
    }

    /// Release the underlying pool. Idempotent.
    pub fn close(&mut self) {
        self.pool.close();
    }

    /// Snapshot of the current statistics.
    pub fn stats(&self) -> NormalizeStats {
        NormalizeStats {
            config: self.config.clone(),
            obs_rms: self.obs_rms.clone(),
            ret_rms: self.ret_rms.clone(),
        }
    }

    /// Restore previously saved statistics (they are NOT reset; training
    /// resumed with them continues the running estimates).
    pub fn set_stats(&mut self, stats: NormalizeStats) -> Result<()> {
        if stats.obs_rms.dim() != self.obs_rms.dim() {
            return Err(StrikerError::Env(format!(
                "normalization statistics have {} observation dims, pool has {}",
                stats.obs_rms.dim(),
                self.obs_rms.dim()
            )));
        }
        self.config = stats.config;
        self.obs_rms = stats.obs_rms;
        self.ret_rms = stats.ret_rms;
        Ok(())
    }

    /// Persist the statistics as JSON, via temp file + rename so the single
    /// latest snapshot is never replaced by a torn write.
    pub fn save(&self, path: &Path) -> Result<()> {
        save_stats(&self.stats(), path)
    }

    /// Load statistics from disk and install them.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.set_stats(load_stats(path)?)
    }
}

/// Write a statistics snapshot (temp file + rename).
pub fn save_stats(stats: &NormalizeStats, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(stats)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &json)?;
    fs::rename(&tmp, path)?;
    info!(path = %path.display(), "saved normalization statistics");
    Ok(())
}

/// Read a statistics snapshot.
pub fn load_stats(path: &Path) -> Result<NormalizeStats> {
    let data = fs::read(path).map_err(|e| StrikerError::Load {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_slice(&data).map_err(|e| StrikerError::Load {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
