//! Wall-clock-bounded training sessions.
//!
//! The session repeatedly asks the learner for `save_every` more
//! environment steps, checkpoints, then re-checks the clock. An in-flight
//! increment always completes; no new increment starts once the budget has
//! elapsed. The pool is released exactly once on every exit path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::checkpoint::Checkpointer;
use crate::config::AppConfig;
use crate::env::{make_env, Environment, Monitor, RenderMode};
use crate::error::{Result, StrikerError};
use crate::ppo::{Algorithm, Ppo};
use crate::vec_env::{EnvFactory, EnvPool, VecNormalize};

/// Parameters of one training session.
pub struct TrainSession {
    pub env_id: String,
    pub n_envs: usize,
    pub budget: Duration,
    pub save_every: u64,
    pub checkpoint_dir: PathBuf,
    pub resume_from: Option<PathBuf>,
    pub config: AppConfig,
}

/// What a finished session did.
#[derive(Debug, Clone, Copy)]
pub struct TrainReport {
    pub total_steps: u64,
    pub checkpoints: usize,
    pub elapsed: Duration,
}

impl TrainSession {
    pub fn run(self) -> Result<TrainReport> {
        if self.budget.is_zero() {
            return Err(StrikerError::Usage(
                "training budget must be positive".to_string(),
            ));
        }
        if self.save_every == 0 {
            return Err(StrikerError::Usage(
                "checkpoint interval must be positive".to_string(),
            ));
        }

        let factory: Arc<EnvFactory> = {
            let env_id = self.env_id.clone();
            Arc::new(move |_slot| {
                let env = make_env(&env_id, RenderMode::None)?;
                Ok(Box::new(Monitor::new(env)) as Box<dyn Environment>)
            })
        };
        let pool = EnvPool::new(self.n_envs, factory)?;
        let obs_dim = pool.observation_space().shape();
        let act_dim = pool.action_space().shape();
        let mut venv = VecNormalize::new(pool, self.config.normalize.clone());

        let checkpointer = Checkpointer::new(&self.checkpoint_dir)?;
        let mut algo = match &self.resume_from {
            Some(stem) => {
                let ppo = Ppo::load(stem, self.config.ppo.clone())?;
                if ppo.env_id() != self.env_id {
                    warn!(
                        checkpoint_env = ppo.env_id(),
                        session_env = %self.env_id,
                        "resuming a policy trained on a different environment"
                    );
                }
                venv.load(&checkpointer.stats_path(&self.env_id))?;
                info!(
                    timesteps = ppo.num_timesteps(),
                    "resumed policy and normalization statistics"
                );
                ppo
            }
            None => Ppo::new(self.config.ppo.clone(), &self.env_id, obs_dim, act_dim),
        };

        info!(
            env_id = %self.env_id,
            n_envs = self.n_envs,
            budget_secs = self.budget.as_secs(),
            save_every = self.save_every,
            "starting training session"
        );

        // An error inside the loop still reaches the explicit close below;
        // the pool's Drop guard covers panics.
        let result = run_session(
            &mut algo,
            &mut venv,
            &checkpointer,
            &self.env_id,
            self.budget,
            self.save_every,
        );
        venv.close();
        result
    }
}

/// The checkpoint loop, separated from session setup so tests can drive it
/// with a stub algorithm.
pub fn run_session(
    algo: &mut dyn Algorithm,
    venv: &mut VecNormalize,
    checkpointer: &Checkpointer,
    env_id: &str,
    budget: Duration,
    save_every: u64,
) -> Result<TrainReport> {
    let start = Instant::now();
    let mut checkpoints = 0usize;

    while start.elapsed() < budget {
        algo.learn(venv, save_every)?;
        checkpointer.save(algo, venv, env_id)?;
        checkpoints += 1;
    }

    let report = TrainReport {
        total_steps: algo.num_timesteps(),
        checkpoints,
        elapsed: start.elapsed(),
    };
    info!(
        total_steps = report.total_steps,
        checkpoints = report.checkpoints,
        elapsed_secs = report.elapsed.as_secs_f64(),
        "training session finished"
    );
    Ok(report)
}
