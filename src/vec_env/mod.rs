//! Vectorized environment orchestration.
//!
//! [`EnvPool`] drives N environments from isolated worker threads behind a
//! batched step/reset interface; [`VecNormalize`] wraps the pool with
//! running observation/reward normalization.

mod normalize;
mod pool;

pub use normalize::{
    load_stats, save_stats, NormalizeConfig, NormalizeStats, RunningMeanStd, VecNormalize,
};
pub use pool::{BatchStep, EnvFactory, EnvPool, SlotStep};
