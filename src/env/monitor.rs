//! Episode statistics wrapper.

use tracing::debug;

use super::{BoxSpace, Environment, StepInfo, Transition};
use crate::error::Result;

/// Wraps an environment and tracks per-episode return and length.
///
/// On the final step of an episode the accumulated `episode_return` and
/// `episode_length` are injected into the step info, where the vectorized
/// pool and training diagnostics can pick them up.
pub struct Monitor {
    inner: Box<dyn Environment>,
    episode_return: f64,
    episode_length: u64,
}

impl Monitor {
    pub fn new(inner: Box<dyn Environment>) -> Self {
        Self {
            inner,
            episode_return: 0.0,
            episode_length: 0,
        }
    }
}

impl Environment for Monitor {
    fn reset(&mut self) -> Result<(Vec<f32>, StepInfo)> {
        self.episode_return = 0.0;
        self.episode_length = 0;
        self.inner.reset()
    }

    fn step(&mut self, action: &[f32]) -> Result<Transition> {
        let mut transition = self.inner.step(action)?;
        self.episode_return += f64::from(transition.reward);
        self.episode_length += 1;

        if transition.done() {
            transition
                .info
                .insert("episode_return".to_string(), self.episode_return);
            transition
                .info
                .insert("episode_length".to_string(), self.episode_length as f64);
            debug!(
                episode_return = self.episode_return,
                episode_length = self.episode_length,
                "episode finished"
            );
        }
        Ok(transition)
    }

    fn render(&mut self) -> Result<()> {
        self.inner.render()
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn observation_space(&self) -> &BoxSpace {
        self.inner.observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        self.inner.action_space()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::DebugEnv;

    #[test]
    fn injects_stats_on_final_step() {
        let mut env = Monitor::new(Box::new(DebugEnv::new()));
        env.reset().unwrap();

        for i in 1..=DebugEnv::HORIZON {
            let t = env.step(&[0.0, 0.0]).unwrap();
            if i < DebugEnv::HORIZON {
                assert!(t.info.is_empty());
            } else {
                assert_eq!(t.info.get("episode_length"), Some(&10.0));
                assert_eq!(t.info.get("episode_return"), Some(&0.0));
            }
        }
    }

    #[test]
    fn stats_reset_between_episodes() {
        let mut env = Monitor::new(Box::new(DebugEnv::new()));
        for _ in 0..2 {
            env.reset().unwrap();
            let mut last = None;
            for _ in 0..DebugEnv::HORIZON {
                last = Some(env.step(&[0.0, 0.0]).unwrap());
            }
            assert_eq!(last.unwrap().info.get("episode_length"), Some(&10.0));
        }
    }
}
