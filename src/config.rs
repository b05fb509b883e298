//! Configuration
//!
//! Hyperparameters and harness settings, loadable from an optional TOML
//! file with `STRIKER_`-prefixed environment-variable overrides.

use clap::ValueEnum;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::vec_env::NormalizeConfig;

/// Compute device for the learner.
///
/// The learner runs on the CPU ndarray backend; selecting `gpu` falls back
/// to it with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

/// PPO algorithm hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PpoConfig {
    /// Learning rate
    pub lr: f64,
    /// Discount factor (gamma)
    pub gamma: f32,
    /// GAE lambda
    pub gae_lambda: f32,
    /// PPO clip range
    pub clip_range: f32,
    /// Value function coefficient
    pub vf_coef: f32,
    /// Entropy bonus coefficient
    pub ent_coef: f32,
    /// Number of PPO epochs per update
    pub n_epochs: usize,
    /// Mini-batch size
    pub batch_size: usize,
    /// Environment steps collected per env between updates
    pub n_steps: usize,
    /// Maximum gradient norm for clipping
    pub max_grad_norm: f32,
    /// Hidden layer width of the actor-critic MLP
    pub hidden_dim: usize,
    /// Compute device
    pub device: Device,
    /// Verbosity (0 quiet, 1 update summaries)
    pub verbose: u8,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            lr: 3e-4,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            vf_coef: 0.5,
            ent_coef: 0.01,
            n_epochs: 10,
            batch_size: 32,
            n_steps: 256,
            max_grad_norm: 0.5,
            hidden_dim: 64,
            device: Device::Cpu,
            verbose: 1,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ppo: PpoConfig,
    pub normalize: NormalizeConfig,
}

impl AppConfig {
    /// Load configuration, layering defaults, an optional TOML file, and
    /// `STRIKER_`-prefixed environment variables (e.g.
    /// `STRIKER_PPO__BATCH_SIZE=64`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        let settings = builder
            .add_source(Environment::with_prefix("STRIKER").separator("__"))
            .build()?;
        // Fields absent from every source fall back to serde defaults.
        Ok(settings.try_deserialize()?)
    }
}
