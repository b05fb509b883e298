//! Proximal Policy Optimization on the CPU ndarray backend.

mod learner;
mod model;

pub use learner::{load_meta, Algorithm, InferenceBackend, Ppo, TrainBackend};
pub use model::{ActorCritic, ActorCriticConfig, PolicyMeta};
