//! Bounded-episode evaluation.

use crate::env::Environment;
use crate::error::Result;
use crate::policy::Policy;

/// Safety cap on episode length when the caller does not supply one.
pub const DEFAULT_MAX_STEPS: u64 = 10_000;

/// Outcome of one completed episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeOutcome {
    pub total_reward: f64,
    pub steps: u64,
}

/// Run a single episode to termination, truncation, or the step cap.
///
/// The cap guarantees the loop ends even if the environment/policy pair
/// never naturally finishes. Rendering is attempted after every step when
/// requested; a render failure never aborts the episode.
pub fn run_episode(
    env: &mut dyn Environment,
    policy: &mut dyn Policy,
    max_steps: u64,
    render: bool,
) -> Result<EpisodeOutcome> {
    let (mut observation, _info) = env.reset()?;
    let mut total_reward = 0.0f64;
    let mut steps = 0u64;

    loop {
        let action = policy.act(&observation)?;
        let transition = env.step(&action)?;
        total_reward += f64::from(transition.reward);
        steps += 1;

        if render {
            // Render failures (no display, headless env) are swallowed.
            let _ = env.render();
        }

        if transition.done() || steps >= max_steps {
            break;
        }
        observation = transition.observation;
    }

    Ok(EpisodeOutcome {
        total_reward,
        steps,
    })
}

/// Run `episodes` episodes strictly one after another, printing a summary
/// line per episode. The environment is reused across episodes and closed
/// exactly once, on every exit path.
pub fn run_episodes(
    env: &mut dyn Environment,
    policy: &mut dyn Policy,
    episodes: u64,
    max_steps: u64,
    render: bool,
) -> Result<Vec<EpisodeOutcome>> {
    let mut outcomes = Vec::with_capacity(episodes as usize);
    let mut failure = None;

    for episode in 1..=episodes {
        match run_episode(env, policy, max_steps, render) {
            Ok(outcome) => {
                println!(
                    "Episode {episode}: steps={}, total_reward={}",
                    outcome.steps, outcome.total_reward
                );
                outcomes.push(outcome);
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    env.close();
    match failure {
        Some(e) => Err(e),
        None => Ok(outcomes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{BoxSpace, DebugEnv, Environment, StepInfo, Transition};
    use crate::error::StrikerError;
    use crate::policy::RandomPolicy;

    /// Never terminates; counts renders and close calls.
    struct EndlessEnv {
        observation_space: BoxSpace,
        action_space: BoxSpace,
        renders: usize,
        closes: usize,
    }

    impl EndlessEnv {
        fn new() -> Self {
            Self {
                observation_space: BoxSpace::symmetric(2, 1.0),
                action_space: BoxSpace::symmetric(1, 1.0),
                renders: 0,
                closes: 0,
            }
        }
    }

    impl Environment for EndlessEnv {
        fn reset(&mut self) -> Result<(Vec<f32>, StepInfo)> {
            Ok((vec![0.0, 0.0], StepInfo::new()))
        }

        fn step(&mut self, _action: &[f32]) -> Result<Transition> {
            Ok(Transition {
                observation: vec![0.0, 0.0],
                reward: 1.0,
                terminated: false,
                truncated: false,
                info: StepInfo::new(),
            })
        }

        fn render(&mut self) -> Result<()> {
            self.renders += 1;
            Err(StrikerError::Render("no display".to_string()))
        }

        fn close(&mut self) {
            self.closes += 1;
        }

        fn observation_space(&self) -> &BoxSpace {
            &self.observation_space
        }

        fn action_space(&self) -> &BoxSpace {
            &self.action_space
        }
    }

    #[test]
    fn step_cap_bounds_every_episode() {
        for cap in [1u64, 7, 50] {
            let mut env = EndlessEnv::new();
            let mut policy = RandomPolicy::new(env.action_space.clone());
            let outcome = run_episode(&mut env, &mut policy, cap, false).unwrap();
            assert_eq!(outcome.steps, cap);
            assert_eq!(outcome.total_reward, cap as f64);
        }
    }

    #[test]
    fn render_failures_do_not_abort_the_episode() {
        let mut env = EndlessEnv::new();
        let mut policy = RandomPolicy::new(env.action_space.clone());
        let outcome = run_episode(&mut env, &mut policy, 5, true).unwrap();
        assert_eq!(outcome.steps, 5);
        assert_eq!(env.renders, 5);
    }

    #[test]
    fn truncating_env_ends_at_its_horizon() {
        let mut env = DebugEnv::new();
        let mut policy = RandomPolicy::new(env.action_space().clone());
        let outcome = run_episode(&mut env, &mut policy, 50, false).unwrap();
        assert_eq!(outcome.steps, DebugEnv::HORIZON as u64);
    }

    #[test]
    fn episodes_run_sequentially_and_close_once() {
        let mut env = EndlessEnv::new();
        let mut policy = RandomPolicy::new(env.action_space.clone());
        let outcomes = run_episodes(&mut env, &mut policy, 3, 4, false).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.steps == 4));
        assert_eq!(env.closes, 1);
    }
}
