//! PPO learner.
//!
//! Clipped-surrogate PPO with GAE over rollouts collected from the
//! normalized environment pool. `learn` continues from the internal
//! timestep counter, so training resumes seamlessly across checkpoint
//! boundaries.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::grad_clipping::GradientClippingConfig;
use burn::module::{AutodiffModule, Module};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::{Distribution, Tensor, TensorData};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use super::model::{ActorCritic, ActorCriticConfig, PolicyMeta};
use crate::config::{Device, PpoConfig};
use crate::error::{Result, StrikerError};
use crate::vec_env::VecNormalize;

pub type InferenceBackend = NdArray;
pub type TrainBackend = Autodiff<NdArray>;

type AdamOptim = OptimizerAdaptor<Adam<InferenceBackend>, ActorCritic<TrainBackend>, TrainBackend>;

/// ln(sqrt(2 * pi)), the Gaussian log-density constant.
const LN_SQRT_2PI: f32 = 0.918_938_5;
/// 0.5 * ln(2 * pi * e), per-dimension Gaussian entropy offset.
const HALF_LN_2PI_E: f32 = 1.418_938_5;

/// The seam between the trainer and the learning algorithm.
pub trait Algorithm {
    /// Run the algorithm for `additional_steps` more environment steps,
    /// continuing from the internal step counter.
    fn learn(&mut self, venv: &mut VecNormalize, additional_steps: u64) -> Result<()>;

    /// Persist the policy under `stem` (extensions are appended).
    fn save(&self, stem: &Path) -> Result<()>;

    /// Cumulative environment steps consumed so far.
    fn num_timesteps(&self) -> u64;
}

/// PPO with a Gaussian MLP policy ("MlpPolicy").
pub struct Ppo {
    config: PpoConfig,
    env_id: String,
    obs_dim: usize,
    act_dim: usize,
    model: ActorCritic<TrainBackend>,
    optim: AdamOptim,
    device: NdArrayDevice,
    num_timesteps: u64,
    /// Most recent batch of (normalized) observations, carried across
    /// `learn` invocations so rollouts continue where they left off.
    last_obs: Option<Vec<Vec<f32>>>,
    /// Recent completed-episode returns, for progress logging.
    episode_returns: VecDeque<f64>,
    rng: StdRng,
}

/// One rollout worth of experience, time-major over `n_steps`.
#[derive(Default)]
struct Rollout {
    observations: Vec<Vec<Vec<f32>>>,
    actions: Vec<Vec<Vec<f32>>>,
    log_probs: Vec<Vec<f32>>,
    values: Vec<Vec<f32>>,
    rewards: Vec<Vec<f32>>,
    dones: Vec<Vec<bool>>,
}

impl Ppo {
    pub fn new(config: PpoConfig, env_id: &str, obs_dim: usize, act_dim: usize) -> Self {
        if config.device == Device::Gpu {
            warn!("gpu device requested; falling back to the CPU ndarray backend");
        }
        let device = NdArrayDevice::default();
        let model = ActorCriticConfig::new(obs_dim, act_dim)
            .with_hidden_dim(config.hidden_dim)
            .init(&device);
        let optim = AdamConfig::new()
            .with_grad_clipping(Some(GradientClippingConfig::Norm(config.max_grad_norm)))
            .init();
        Self {
            config,
            env_id: env_id.to_string(),
            obs_dim,
            act_dim,
            model,
            optim,
            device,
            num_timesteps: 0,
            last_obs: None,
            episode_returns: VecDeque::with_capacity(100),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn config(&self) -> &PpoConfig {
        &self.config
    }

    pub fn env_id(&self) -> &str {
        &self.env_id
    }

    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    pub fn act_dim(&self) -> usize {
        self.act_dim
    }

    /// Predict an action for one observation. `deterministic` returns the
    /// Gaussian mean; otherwise the policy distribution is sampled. The
    /// action is clamped to the canonical `[-1, 1]` command range.
    pub fn predict(&self, observation: &[f32], deterministic: bool) -> Result<Vec<f32>> {
        let model = self.model.valid();
        let rows = vec![observation.to_vec()];
        let x = self.obs_tensor::<InferenceBackend>(&rows)?;
        let (mean, log_std) = model.policy(x);
        let action = if deterministic {
            mean
        } else {
            let noise = Tensor::<InferenceBackend, 2>::random(
                [1, self.act_dim],
                Distribution::Normal(0.0, 1.0),
                &self.device,
            );
            mean + noise * log_std.exp()
        };
        Ok(tensor_to_vec(action.clamp(-1.0, 1.0)))
    }

    fn obs_tensor<B: burn::tensor::backend::Backend<Device = NdArrayDevice>>(
        &self,
        observations: &[Vec<f32>],
    ) -> Result<Tensor<B, 2>> {
        let rows = observations.len();
        let mut flat = Vec::with_capacity(rows * self.obs_dim);
        for obs in observations {
            if obs.len() != self.obs_dim {
                return Err(StrikerError::Env(format!(
                    "observation has {} dims, policy expects {}",
                    obs.len(),
                    self.obs_dim
                )));
            }
            flat.extend_from_slice(obs);
        }
        Ok(Tensor::from_data(
            TensorData::new(flat, [rows, self.obs_dim]),
            &self.device,
        ))
    }

    /// Sample actions, log-probs and values for a batch of observations.
    fn sample_actions(
        &self,
        observations: &[Vec<f32>],
    ) -> Result<(Vec<Vec<f32>>, Vec<f32>, Vec<f32>)> {
        let n = observations.len();
        let model = self.model.valid();
        let x = self.obs_tensor::<InferenceBackend>(observations)?;

        let (mean, log_std) = model.policy(x.clone());
        let std = log_std.clone().exp();
        let noise = Tensor::<InferenceBackend, 2>::random(
            [n, self.act_dim],
            Distribution::Normal(0.0, 1.0),
            &self.device,
        );
        let actions = mean + noise.clone() * std;

        // log N(a; mean, std) = sum_j -0.5 eps_j^2 - log_std_j - ln sqrt(2 pi)
        let log_probs: Tensor<InferenceBackend, 1> =
            (noise.powf_scalar(2.0) * (-0.5) - log_std - LN_SQRT_2PI)
                .sum_dim(1)
                .squeeze(1);
        let values: Tensor<InferenceBackend, 1> = model.value(x).squeeze(1);

        let actions_flat = tensor_to_vec(actions);
        let actions_out = actions_flat
            .chunks(self.act_dim)
            .map(<[f32]>::to_vec)
            .collect();
        Ok((
            actions_out,
            tensor_to_vec1(log_probs),
            tensor_to_vec1(values),
        ))
    }

    /// Collect `n_steps` environment steps per slot.
    fn collect_rollout(&mut self, venv: &mut VecNormalize) -> Result<Rollout> {
        let n_envs = venv.num_envs();
        let mut rollout = Rollout::default();

        let mut obs = match self.last_obs.take() {
            Some(obs) => obs,
            None => venv.reset()?,
        };

        for _ in 0..self.config.n_steps {
            let (actions, log_probs, values) = self.sample_actions(&obs)?;
            let commands: Vec<Vec<f32>> = actions
                .iter()
                .map(|a| venv.pool().action_space().clamp(a))
                .collect();
            let batch = venv.step(&commands)?;

            for step_info in &batch.infos {
                if let Some(ep_return) = step_info.get("episode_return") {
                    if self.episode_returns.len() == 100 {
                        self.episode_returns.pop_front();
                    }
                    self.episode_returns.push_back(*ep_return);
                }
            }

            rollout.observations.push(obs);
            rollout.actions.push(actions);
            rollout.log_probs.push(log_probs);
            rollout.values.push(values);
            rollout.rewards.push(batch.rewards.clone());
            rollout.dones.push(batch.dones());

            obs = batch.observations;
            self.num_timesteps += n_envs as u64;
        }

        self.last_obs = Some(obs);
        Ok(rollout)
    }

    /// Generalized Advantage Estimation over one slot's trajectory.
    fn compute_gae(
        &self,
        rewards: &[f32],
        values: &[f32],
        dones: &[bool],
        last_value: f32,
    ) -> (Vec<f32>, Vec<f32>) {
        let n = rewards.len();
        let mut advantages = vec![0.0f32; n];
        let mut returns = vec![0.0f32; n];

        let mut gae = 0.0f32;
        let mut next_value = last_value;
        for t in (0..n).rev() {
            let mask = if dones[t] { 0.0 } else { 1.0 };
            let delta =
                rewards[t] + self.config.gamma * next_value * mask - values[t];
            gae = delta + self.config.gamma * self.config.gae_lambda * mask * gae;
            advantages[t] = gae;
            returns[t] = gae + values[t];
            next_value = values[t];
        }
        (advantages, returns)
    }

    /// One full PPO update over a collected rollout.
    fn update(&mut self, venv: &VecNormalize, rollout: &Rollout) -> Result<()> {
        let n_envs = venv.num_envs();
        let t_max = rollout.observations.len();
        let last_obs = self
            .last_obs
            .as_ref()
            .ok_or_else(|| StrikerError::Env("rollout ended without observations".to_string()))?
            .clone();

        // Bootstrap values for the observation after the last step.
        let model = self.model.valid();
        let x = self.obs_tensor::<InferenceBackend>(&last_obs)?;
        let last_values = tensor_to_vec1(model.value(x).squeeze(1));

        // Per-slot GAE, flattened sample-major afterwards.
        let mut advantages = vec![0.0f32; t_max * n_envs];
        let mut returns = vec![0.0f32; t_max * n_envs];
        for slot in 0..n_envs {
            let rewards: Vec<f32> = (0..t_max).map(|t| rollout.rewards[t][slot]).collect();
            let values: Vec<f32> = (0..t_max).map(|t| rollout.values[t][slot]).collect();
            let dones: Vec<bool> = (0..t_max).map(|t| rollout.dones[t][slot]).collect();
            let (adv, ret) = self.compute_gae(&rewards, &values, &dones, last_values[slot]);
            for t in 0..t_max {
                advantages[t * n_envs + slot] = adv[t];
                returns[t * n_envs + slot] = ret[t];
            }
        }

        // Normalize advantages across the whole rollout.
        let count = advantages.len() as f32;
        let mean: f32 = advantages.iter().sum::<f32>() / count;
        let var: f32 =
            advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / count;
        let std = var.sqrt().max(1e-8);
        for a in &mut advantages {
            *a = (*a - mean) / std;
        }

        let mut flat_obs = Vec::with_capacity(t_max * n_envs);
        let mut flat_actions = Vec::with_capacity(t_max * n_envs);
        let mut flat_log_probs = Vec::with_capacity(t_max * n_envs);
        for t in 0..t_max {
            for slot in 0..n_envs {
                flat_obs.push(rollout.observations[t][slot].clone());
                flat_actions.push(rollout.actions[t][slot].clone());
                flat_log_probs.push(rollout.log_probs[t][slot]);
            }
        }

        let mut indices: Vec<usize> = (0..flat_obs.len()).collect();
        let mut last_policy_loss = 0.0f32;
        let mut last_value_loss = 0.0f32;
        for _ in 0..self.config.n_epochs {
            indices.shuffle(&mut self.rng);
            for chunk in indices.chunks(self.config.batch_size.max(1)) {
                if chunk.len() < 2 {
                    continue;
                }
                let (policy_loss, value_loss) = self.update_minibatch(
                    chunk,
                    &flat_obs,
                    &flat_actions,
                    &flat_log_probs,
                    &advantages,
                    &returns,
                )?;
                last_policy_loss = policy_loss;
                last_value_loss = value_loss;
            }
        }

        if self.config.verbose >= 1 {
            let mean_return = if self.episode_returns.is_empty() {
                f64::NAN
            } else {
                self.episode_returns.iter().sum::<f64>() / self.episode_returns.len() as f64
            };
            info!(
                timesteps = self.num_timesteps,
                policy_loss = last_policy_loss,
                value_loss = last_value_loss,
                mean_episode_return = mean_return,
                "ppo update"
            );
        }
        Ok(())
    }

    fn update_minibatch(
        &mut self,
        chunk: &[usize],
        flat_obs: &[Vec<f32>],
        flat_actions: &[Vec<f32>],
        flat_log_probs: &[f32],
        advantages: &[f32],
        returns: &[f32],
    ) -> Result<(f32, f32)> {
        let m = chunk.len();
        let obs_batch: Vec<Vec<f32>> = chunk.iter().map(|&i| flat_obs[i].clone()).collect();
        let mut act_flat = Vec::with_capacity(m * self.act_dim);
        for &i in chunk {
            act_flat.extend_from_slice(&flat_actions[i]);
        }
        let old_lp: Vec<f32> = chunk.iter().map(|&i| flat_log_probs[i]).collect();
        let adv: Vec<f32> = chunk.iter().map(|&i| advantages[i]).collect();
        let ret: Vec<f32> = chunk.iter().map(|&i| returns[i]).collect();

        let obs_t = self.obs_tensor::<TrainBackend>(&obs_batch)?;
        let act_t = Tensor::<TrainBackend, 2>::from_data(
            TensorData::new(act_flat, [m, self.act_dim]),
            &self.device,
        );
        let old_lp_t =
            Tensor::<TrainBackend, 1>::from_data(TensorData::new(old_lp, [m]), &self.device);
        let adv_t =
            Tensor::<TrainBackend, 1>::from_data(TensorData::new(adv, [m]), &self.device);
        let ret_t =
            Tensor::<TrainBackend, 1>::from_data(TensorData::new(ret, [m]), &self.device);

        let (mean, log_std) = self.model.policy(obs_t.clone());
        let std = log_std.clone().exp();
        let z = (act_t - mean) / std;
        let log_probs: Tensor<TrainBackend, 1> =
            (z.powf_scalar(2.0) * (-0.5) - log_std.clone() - LN_SQRT_2PI)
                .sum_dim(1)
                .squeeze(1);

        // Clipped surrogate objective.
        let ratio = (log_probs - old_lp_t).exp();
        let unclipped = ratio.clone() * adv_t.clone();
        let clipped = ratio.clamp(
            1.0 - self.config.clip_range,
            1.0 + self.config.clip_range,
        ) * adv_t;
        let policy_loss = unclipped.min_pair(clipped).mean().neg();

        let values: Tensor<TrainBackend, 1> = self.model.value(obs_t).squeeze(1);
        let value_loss = (values - ret_t).powf_scalar(2.0).mean();

        // Gaussian entropy: sum_j log_std_j + 0.5 ln(2 pi e).
        let entropy = (log_std + HALF_LN_2PI_E).sum_dim(1).mean();

        let policy_loss_value = policy_loss.clone().into_scalar();
        let value_loss_value = value_loss.clone().into_scalar();

        let loss = policy_loss + value_loss * self.config.vf_coef
            - entropy * self.config.ent_coef;
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self
            .optim
            .step(self.config.lr, self.model.clone(), grads);

        Ok((policy_loss_value, value_loss_value))
    }

    /// Rebuild a learner from a saved checkpoint stem.
    pub fn load(stem: &Path, config: PpoConfig) -> Result<Self> {
        let meta = load_meta(stem)?;
        let mut config = config;
        config.hidden_dim = meta.hidden_dim;

        let mut ppo = Self::new(config, &meta.env_id, meta.obs_dim, meta.act_dim);
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        ppo.model = ppo
            .model
            .clone()
            .load_file(stem.to_path_buf(), &recorder, &ppo.device)
            .map_err(|e| StrikerError::Load {
                path: stem.to_path_buf(),
                reason: e.to_string(),
            })?;
        ppo.num_timesteps = meta.num_timesteps;
        Ok(ppo)
    }

    fn meta(&self) -> PolicyMeta {
        PolicyMeta {
            algorithm: "ppo".to_string(),
            env_id: self.env_id.clone(),
            obs_dim: self.obs_dim,
            act_dim: self.act_dim,
            hidden_dim: self.config.hidden_dim,
            num_timesteps: self.num_timesteps,
            saved_at: Utc::now(),
        }
    }
}

impl Algorithm for Ppo {
    fn learn(&mut self, venv: &mut VecNormalize, additional_steps: u64) -> Result<()> {
        let target = self.num_timesteps + additional_steps;
        while self.num_timesteps < target {
            let rollout = self.collect_rollout(venv)?;
            self.update(venv, &rollout)?;
        }
        Ok(())
    }

    fn save(&self, stem: &Path) -> Result<()> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.model
            .clone()
            .save_file(stem.to_path_buf(), &recorder)
            .map_err(|e| StrikerError::Checkpoint(format!(
                "failed to save policy record {stem:?}: {e}"
            )))?;

        let meta_path = stem.with_extension("json");
        let json = serde_json::to_vec_pretty(&self.meta())?;
        fs::write(&meta_path, json)?;
        Ok(())
    }

    fn num_timesteps(&self) -> u64 {
        self.num_timesteps
    }
}

/// Read the sidecar metadata for a checkpoint stem.
pub fn load_meta(stem: &Path) -> Result<PolicyMeta> {
    let meta_path = stem.with_extension("json");
    let data = fs::read(&meta_path).map_err(|e| StrikerError::Load {
        path: meta_path.clone(),
        reason: e.to_string(),
    })?;
    serde_json::from_slice(&data).map_err(|e| StrikerError::Load {
        path: meta_path,
        reason: e.to_string(),
    })
}

fn tensor_to_vec<B: burn::tensor::backend::Backend>(tensor: Tensor<B, 2>) -> Vec<f32> {
    tensor
        .into_data()
        .to_vec()
        .expect("tensor elements are f32")
}

fn tensor_to_vec1(tensor: Tensor<InferenceBackend, 1>) -> Vec<f32> {
    tensor
        .into_data()
        .to_vec()
        .expect("tensor elements are f32")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    fn small_config() -> PpoConfig {
        PpoConfig {
            n_steps: 4,
            batch_size: 4,
            n_epochs: 2,
            hidden_dim: 8,
            verbose: 0,
            ..PpoConfig::default()
        }
    }

    #[test]
    fn gae_discounts_toward_earlier_steps() {
        let ppo = Ppo::new(small_config(), "Debug-v0", 4, 2);
        let rewards = vec![1.0, 1.0, 1.0, 1.0];
        let values = vec![0.5, 0.6, 0.7, 0.8];
        let dones = vec![false, false, false, true];

        let (advantages, returns) = ppo.compute_gae(&rewards, &values, &dones, 0.0);
        assert_eq!(advantages.len(), 4);
        assert_eq!(returns.len(), 4);
        // Terminal step: advantage is exactly r - V(s).
        assert!((advantages[3] - (1.0 - 0.8)).abs() < 1e-6);
        for t in 0..4 {
            assert!((returns[t] - (advantages[t] + values[t])).abs() < 1e-6);
        }
    }

    #[test]
    fn done_mask_stops_credit_assignment() {
        let ppo = Ppo::new(small_config(), "Debug-v0", 4, 2);
        let rewards = vec![0.0, 100.0];
        let values = vec![0.0, 0.0];
        // Episode boundary after step 0: the later reward must not leak back.
        let (advantages, _) = ppo.compute_gae(&rewards, &values, &[true, true], 0.0);
        assert!((advantages[0] - 0.0).abs() < 1e-6);
        assert!((advantages[1] - 100.0).abs() < 1e-6);
    }

    #[test]
    fn predict_is_deterministic_and_in_range() {
        let ppo = Ppo::new(small_config(), "Debug-v0", 4, 2);
        let obs = vec![0.1, -0.2, 0.3, 0.0];
        let a = ppo.predict(&obs, true).unwrap();
        let b = ppo.predict(&obs, true).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert!(a.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn save_then_load_reproduces_deterministic_actions() {
        let ppo = Ppo::new(small_config(), "Debug-v0", 4, 2);
        let stem = temp_dir().join(format!("striker_ppo_roundtrip_{}", std::process::id()));
        ppo.save(&stem).unwrap();

        let restored = Ppo::load(&stem, small_config()).unwrap();
        let obs = vec![0.4, 0.1, -0.9, 0.2];
        assert_eq!(
            ppo.predict(&obs, true).unwrap(),
            restored.predict(&obs, true).unwrap()
        );
        assert_eq!(restored.num_timesteps(), 0);
        assert_eq!(restored.env_id(), "Debug-v0");

        std::fs::remove_file(stem.with_extension("mpk")).ok();
        std::fs::remove_file(stem.with_extension("json")).ok();
    }

    #[test]
    fn load_missing_artifact_fails() {
        let stem = temp_dir().join("striker_ppo_missing");
        assert!(matches!(
            Ppo::load(&stem, small_config()),
            Err(StrikerError::Load { .. })
        ));
    }
}
