//! Policy sources for evaluation.
//!
//! A policy is selected once at startup (random or loaded from a
//! checkpoint) and then queried per step; there is no per-step dispatch on
//! runtime type.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::warn;

use crate::env::{BoxSpace, Environment};
use crate::error::Result;
use crate::ppo::Ppo;

/// A function from observation to action.
pub trait Policy {
    fn act(&mut self, observation: &[f32]) -> Result<Vec<f32>>;
}

/// Uniform samples from the environment's action space.
pub struct RandomPolicy {
    action_space: BoxSpace,
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(action_space: BoxSpace) -> Self {
        Self {
            action_space,
            rng: StdRng::from_entropy(),
        }
    }
}

impl Policy for RandomPolicy {
    fn act(&mut self, _observation: &[f32]) -> Result<Vec<f32>> {
        Ok(self.action_space.sample(&mut self.rng))
    }
}

/// A trained PPO policy restored from a checkpoint artifact.
pub struct LoadedPolicy {
    ppo: Ppo,
    deterministic: bool,
}

impl std::fmt::Debug for LoadedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPolicy")
            .field("deterministic", &self.deterministic)
            .finish_non_exhaustive()
    }
}

impl LoadedPolicy {
    /// Load from a checkpoint path (with or without the `.mpk` extension).
    ///
    /// Fails with a LoadError if the record or its metadata sidecar is
    /// missing or corrupt.
    pub fn load(path: &Path) -> Result<Self> {
        let stem = checkpoint_stem(path);
        let ppo = Ppo::load(&stem, crate::config::PpoConfig::default())?;
        Ok(Self {
            ppo,
            deterministic: true,
        })
    }

    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    pub fn env_id(&self) -> &str {
        self.ppo.env_id()
    }

    /// Compare the policy's expected shapes against a live environment,
    /// warning on any mismatch. Returns whether a mismatch was found.
    ///
    /// A mismatch is not fatal: the policy was trained against a different
    /// environment, so subsequent behavior is garbage, but it is the
    /// operator's call. The warning must fire before any stepping.
    pub fn warn_on_shape_mismatch(&self, env: &dyn Environment) -> bool {
        let mut mismatch = false;
        let env_act = env.action_space().shape();
        if self.ppo.act_dim() != env_act {
            mismatch = true;
            warn!(
                policy_action_dim = self.ppo.act_dim(),
                env_action_dim = env_act,
                "action shape mismatch: policy was trained against a different \
                 environment; expect garbage actions"
            );
        }
        let env_obs = env.observation_space().shape();
        if self.ppo.obs_dim() != env_obs {
            mismatch = true;
            warn!(
                policy_obs_dim = self.ppo.obs_dim(),
                env_obs_dim = env_obs,
                "observation shape mismatch: policy was trained against a \
                 different environment; expect garbage actions"
            );
        }
        mismatch
    }
}

impl Policy for LoadedPolicy {
    fn act(&mut self, observation: &[f32]) -> Result<Vec<f32>> {
        self.ppo.predict(observation, self.deterministic)
    }
}

/// Strip the artifact extensions so both `ppo_x_100` and `ppo_x_100.mpk`
/// resolve to the same checkpoint stem.
fn checkpoint_stem(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mpk") | Some("json") => path.with_extension(""),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{make_env, RenderMode};
    use crate::error::StrikerError;

    #[test]
    fn random_policy_samples_valid_actions() {
        let env = make_env("VSS-v0", RenderMode::None).unwrap();
        let space = env.action_space().clone();
        let mut policy = RandomPolicy::new(space.clone());

        for _ in 0..20 {
            let action = policy.act(&[0.0; 4]).unwrap();
            assert!(space.contains(&action));
        }
    }

    #[test]
    fn loading_a_missing_model_is_a_load_error() {
        let err = LoadedPolicy::load(Path::new("/nonexistent/ppo_model")).unwrap_err();
        assert!(matches!(err, StrikerError::Load { .. }));
    }

    #[test]
    fn shape_mismatch_is_detected_but_not_fatal() {
        use crate::config::PpoConfig;
        use crate::ppo::Ppo;

        let stem = std::env::temp_dir()
            .join(format!("striker_policy_shapes_{}", std::process::id()));
        let small = PpoConfig {
            hidden_dim: 8,
            ..PpoConfig::default()
        };
        crate::ppo::Algorithm::save(&Ppo::new(small, "Debug-v0", 4, 2), &stem).unwrap();
        let mut policy = LoadedPolicy::load(&stem).unwrap();

        // Debug-v0 matches the trained dims (obs 4, act 2).
        let matching = make_env("Debug-v0", RenderMode::None).unwrap();
        assert!(!policy.warn_on_shape_mismatch(matching.as_ref()));

        // VSS-v0 has a 10-dim observation; mismatch is reported and the
        // policy still acts.
        let other = make_env("VSS-v0", RenderMode::None).unwrap();
        assert!(policy.warn_on_shape_mismatch(other.as_ref()));
        assert!(policy.act(&[0.0; 4]).is_ok());

        std::fs::remove_file(stem.with_extension("mpk")).ok();
        std::fs::remove_file(stem.with_extension("json")).ok();
    }

    #[test]
    fn stem_strips_record_extensions() {
        assert_eq!(
            checkpoint_stem(Path::new("ckpt/ppo_VSS-v0_1000.mpk")),
            PathBuf::from("ckpt/ppo_VSS-v0_1000")
        );
        assert_eq!(
            checkpoint_stem(Path::new("ckpt/ppo_VSS-v0_1000")),
            PathBuf::from("ckpt/ppo_VSS-v0_1000")
        );
    }
}
