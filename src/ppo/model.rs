//! Actor-critic network.
//!
//! MLP with a Gaussian policy head (mean + state-dependent log-std) and a
//! scalar value head, on the CPU ndarray backend.

use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Network dimensions and initialization settings.
#[derive(Config, Debug)]
pub struct ActorCriticConfig {
    /// Observation dimension
    pub obs_dim: usize,
    /// Action dimension
    pub act_dim: usize,
    /// Hidden layer width
    #[config(default = 64)]
    pub hidden_dim: usize,
}

/// Gaussian-policy actor-critic MLP.
#[derive(Module, Debug)]
pub struct ActorCritic<B: Backend> {
    actor_fc1: Linear<B>,
    actor_fc2: Linear<B>,
    mean_head: Linear<B>,
    log_std_head: Linear<B>,
    critic_fc1: Linear<B>,
    critic_fc2: Linear<B>,
    value_head: Linear<B>,
    activation: Relu,
}

impl ActorCriticConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ActorCritic<B> {
        ActorCritic {
            actor_fc1: LinearConfig::new(self.obs_dim, self.hidden_dim).init(device),
            actor_fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            mean_head: LinearConfig::new(self.hidden_dim, self.act_dim).init(device),
            log_std_head: LinearConfig::new(self.hidden_dim, self.act_dim).init(device),
            critic_fc1: LinearConfig::new(self.obs_dim, self.hidden_dim).init(device),
            critic_fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            value_head: LinearConfig::new(self.hidden_dim, 1).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> ActorCritic<B> {
    /// Policy forward pass returning `(mean, log_std)`, each
    /// `[batch, act_dim]`.
    pub fn policy(&self, observations: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let hidden = self.activation.forward(self.actor_fc1.forward(observations));
        let hidden = self.activation.forward(self.actor_fc2.forward(hidden));

        let mean = self.mean_head.forward(hidden.clone());
        let log_std = self.log_std_head.forward(hidden);

        // Clamp log_std for numerical stability
        let log_std = log_std.clamp(-20.0, 2.0);
        (mean, log_std)
    }

    /// Value forward pass returning `[batch, 1]`.
    pub fn value(&self, observations: Tensor<B, 2>) -> Tensor<B, 2> {
        let hidden = self.activation.forward(self.critic_fc1.forward(observations));
        let hidden = self.activation.forward(self.critic_fc2.forward(hidden));
        self.value_head.forward(hidden)
    }
}

/// Sidecar metadata persisted next to every policy record.
///
/// Needed to rebuild the module with matching dimensions before loading the
/// weight record, and to continue the timestep counter on resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyMeta {
    /// Algorithm tag (part of the checkpoint naming scheme)
    pub algorithm: String,
    /// Environment id the policy was trained on
    pub env_id: String,
    pub obs_dim: usize,
    pub act_dim: usize,
    pub hidden_dim: usize,
    /// Cumulative environment steps at save time
    pub num_timesteps: u64,
    pub saved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    #[test]
    fn forward_shapes_match_batch_and_action_dims() {
        let device = NdArrayDevice::default();
        let model: ActorCritic<NdArray> = ActorCriticConfig::new(6, 3).init(&device);

        let obs = Tensor::<NdArray, 2>::zeros([5, 6], &device);
        let (mean, log_std) = model.policy(obs.clone());
        assert_eq!(mean.dims(), [5, 3]);
        assert_eq!(log_std.dims(), [5, 3]);

        let value = model.value(obs);
        assert_eq!(value.dims(), [5, 1]);
    }

    #[test]
    fn log_std_is_clamped() {
        let device = NdArrayDevice::default();
        let model: ActorCritic<NdArray> = ActorCriticConfig::new(4, 2).init(&device);

        let obs = Tensor::<NdArray, 2>::ones([1, 4], &device) * 1e6;
        let (_, log_std) = model.policy(obs);
        let values: Vec<f32> = log_std.into_data().to_vec().unwrap();
        for v in values {
            assert!((-20.0..=2.0).contains(&v));
        }
    }
}
