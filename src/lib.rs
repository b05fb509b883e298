//! RL training and evaluation harness for simulated robot soccer.
//!
//! The crate drives PPO training against a pool of parallel environment
//! workers with running observation/reward normalization and time-boxed
//! checkpointing, and evaluates trained or random policies over bounded
//! episodes.

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod policy;
pub mod ppo;
pub mod runner;
pub mod trainer;
pub mod vec_env;

pub use checkpoint::Checkpointer;
pub use config::{AppConfig, Device, PpoConfig};
pub use env::{make_env, BoxSpace, Environment, Monitor, RenderMode, Transition};
pub use error::{Result, StrikerError};
pub use policy::{LoadedPolicy, Policy, RandomPolicy};
pub use ppo::{Algorithm, Ppo};
pub use runner::{run_episode, run_episodes, EpisodeOutcome, DEFAULT_MAX_STEPS};
pub use trainer::{run_session, TrainReport, TrainSession};
pub use vec_env::{EnvPool, NormalizeConfig, VecNormalize};
