//! Simulated Soccer Environments
//!
//! Gym-like episodic environments with step/reset/close for RL training
//! and evaluation. Environments are identified by string ids and built
//! through [`make_env`].

mod monitor;
mod soccer;
mod spaces;

pub use monitor::Monitor;
pub use soccer::{DebugEnv, SoccerEnv, SoccerEnvConfig};
pub use spaces::BoxSpace;

use std::collections::HashMap;

use crate::error::{Result, StrikerError};

/// Rendering mode requested at environment construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// No rendering; `render()` fails and callers are expected to tolerate it.
    #[default]
    None,
    /// Human-readable rendering on stdout.
    Human,
}

/// Auxiliary per-step diagnostics.
///
/// Keys are environment-defined; the [`Monitor`] wrapper injects
/// `episode_return` and `episode_length` on the final step of an episode.
pub type StepInfo = HashMap<String, f64>;

/// Result of a single environment step.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Observation after the step.
    pub observation: Vec<f32>,
    /// Scalar reward for the step.
    pub reward: f32,
    /// Episode ended naturally (goal scored, failure condition).
    pub terminated: bool,
    /// Episode ended due to an external limit (time).
    pub truncated: bool,
    /// Diagnostics.
    pub info: StepInfo,
}

impl Transition {
    /// Whether the episode is over for either reason.
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// An episodic control task.
///
/// `Send` so instances can be moved into pool worker threads. One instance
/// is never shared across components; the pool gives each worker exclusive
/// ownership of its environment.
pub trait Environment: Send {
    /// Start a new episode, returning the initial observation.
    fn reset(&mut self) -> Result<(Vec<f32>, StepInfo)>;

    /// Apply one action. The action length must match `action_space().shape()`.
    fn step(&mut self, action: &[f32]) -> Result<Transition>;

    /// Render the current state. May fail (e.g. no display); callers must
    /// tolerate the failure and continue.
    fn render(&mut self) -> Result<()>;

    /// Release simulator resources. Must be idempotent.
    fn close(&mut self);

    fn observation_space(&self) -> &BoxSpace;

    fn action_space(&self) -> &BoxSpace;
}

impl std::fmt::Debug for dyn Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Environment")
    }
}

/// Environment ids registered with [`make_env`].
pub const ENV_IDS: &[&str] = &[
    "VSS-v0",
    "SSLDribbling-v0",
    "SSLStaticDefenders-v0",
    "Debug-v0",
];

/// Build one environment instance by id.
///
/// Unknown ids fail with [`StrikerError::UnknownEnv`].
pub fn make_env(id: &str, render_mode: RenderMode) -> Result<Box<dyn Environment>> {
    match id {
        "VSS-v0" => Ok(Box::new(SoccerEnv::new(SoccerEnvConfig::vss(), render_mode))),
        "SSLDribbling-v0" => Ok(Box::new(SoccerEnv::new(
            SoccerEnvConfig::ssl_dribbling(),
            render_mode,
        ))),
        "SSLStaticDefenders-v0" => Ok(Box::new(SoccerEnv::new(
            SoccerEnvConfig::ssl_static_defenders(),
            render_mode,
        ))),
        "Debug-v0" => Ok(Box::new(DebugEnv::new())),
        other => Err(StrikerError::UnknownEnv(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_env_rejects_unknown_id() {
        let err = make_env("NoSuchEnv-v0", RenderMode::None).unwrap_err();
        assert!(matches!(err, StrikerError::UnknownEnv(_)));
    }

    #[test]
    fn all_registered_ids_construct() {
        for id in ENV_IDS {
            let env = make_env(id, RenderMode::None).unwrap();
            assert!(env.observation_space().shape() > 0);
            assert!(env.action_space().shape() > 0);
        }
    }
}
