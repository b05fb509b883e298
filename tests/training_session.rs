//! Training-session behavior: wall-clock bounding, checkpoint cadence,
//! and guaranteed pool release, driven through the library API.

use std::env::temp_dir;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use striker::checkpoint::Checkpointer;
use striker::config::AppConfig;
use striker::env::{make_env, Environment, RenderMode};
use striker::error::{Result, StrikerError};
use striker::ppo::Algorithm;
use striker::trainer::{run_session, TrainSession};
use striker::vec_env::{EnvFactory, EnvPool, NormalizeConfig, VecNormalize};

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = temp_dir().join(format!("striker_session_{tag}_{}", std::process::id()));
    fs::remove_dir_all(&dir).ok();
    dir
}

fn debug_factory() -> Arc<EnvFactory> {
    Arc::new(|_slot| make_env("Debug-v0", RenderMode::None))
}

fn debug_venv(n: usize) -> VecNormalize {
    let pool = EnvPool::new(n, debug_factory()).unwrap();
    VecNormalize::new(pool, NormalizeConfig::default())
}

/// Fixed-duration increments; writes a marker record per save.
struct StubAlgorithm {
    increment: Duration,
    timesteps: u64,
    fail_after: Option<u64>,
}

impl StubAlgorithm {
    fn new(increment: Duration) -> Self {
        Self {
            increment,
            timesteps: 0,
            fail_after: None,
        }
    }
}

impl Algorithm for StubAlgorithm {
    fn learn(&mut self, _venv: &mut VecNormalize, additional_steps: u64) -> Result<()> {
        if let Some(limit) = self.fail_after {
            if self.timesteps >= limit {
                return Err(StrikerError::Env("stub learner failure".to_string()));
            }
        }
        std::thread::sleep(self.increment);
        self.timesteps += additional_steps;
        Ok(())
    }

    fn save(&self, stem: &Path) -> Result<()> {
        fs::write(stem.with_extension("mpk"), b"stub")?;
        Ok(())
    }

    fn num_timesteps(&self) -> u64 {
        self.timesteps
    }
}

#[test]
fn session_stops_only_after_the_budget_elapses() {
    let dir = scratch_dir("budget");
    let checkpointer = Checkpointer::new(&dir).unwrap();
    let mut venv = debug_venv(1);
    let mut algo = StubAlgorithm::new(Duration::from_millis(20));

    let budget = Duration::from_millis(70);
    let start = Instant::now();
    let report = run_session(&mut algo, &mut venv, &checkpointer, "Debug-v0", budget, 100).unwrap();
    let elapsed = start.elapsed();
    venv.close();

    // The in-flight increment always completes, so the session overshoots
    // the budget but never stops short of it.
    assert!(elapsed >= budget);
    assert!(report.checkpoints >= 1);
    // Training continuity: the counter accumulated across increments.
    assert_eq!(report.total_steps, report.checkpoints as u64 * 100);

    // One policy milestone per increment, plus the single stats snapshot.
    let milestones = checkpointer.policy_milestones("Debug-v0").unwrap();
    assert_eq!(milestones.len(), report.checkpoints);
    assert!(checkpointer.stats_path("Debug-v0").exists());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn checkpoint_names_encode_cumulative_steps() {
    let dir = scratch_dir("naming");
    let checkpointer = Checkpointer::new(&dir).unwrap();
    let mut venv = debug_venv(1);
    let mut algo = StubAlgorithm::new(Duration::from_millis(30));

    run_session(
        &mut algo,
        &mut venv,
        &checkpointer,
        "Debug-v0",
        Duration::from_millis(1),
        250,
    )
    .unwrap();
    venv.close();

    // A 1ms budget still admits exactly one (in-flight) increment.
    assert_eq!(
        checkpointer.policy_milestones("Debug-v0").unwrap(),
        vec![250]
    );
    assert!(dir.join("ppo_Debug-v0_250.mpk").exists());
    assert!(dir.join("vecnorm_Debug-v0.json").exists());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn learner_failure_propagates_and_leaves_prior_checkpoints_intact() {
    let dir = scratch_dir("failure");
    let checkpointer = Checkpointer::new(&dir).unwrap();
    let mut venv = debug_venv(1);
    let mut algo = StubAlgorithm::new(Duration::from_millis(5));
    algo.fail_after = Some(100);

    let err = run_session(
        &mut algo,
        &mut venv,
        &checkpointer,
        "Debug-v0",
        Duration::from_secs(60),
        100,
    )
    .unwrap_err();
    assert!(matches!(err, StrikerError::Env(_)));

    // The first increment checkpointed before the second one failed.
    assert_eq!(
        checkpointer.policy_milestones("Debug-v0").unwrap(),
        vec![100]
    );

    // Cleanup still runs; closing again is a no-op.
    venv.close();
    venv.close();

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn full_ppo_session_checkpoints_and_reloads() {
    let dir = scratch_dir("ppo_e2e");
    let mut config = AppConfig::default();
    config.ppo.n_steps = 4;
    config.ppo.batch_size = 8;
    config.ppo.n_epochs = 1;
    config.ppo.hidden_dim = 8;
    config.ppo.verbose = 0;

    let session = TrainSession {
        env_id: "Debug-v0".to_string(),
        n_envs: 2,
        budget: Duration::from_millis(1),
        save_every: 8,
        checkpoint_dir: dir.clone(),
        resume_from: None,
        config,
    };
    let report = session.run().unwrap();
    assert!(report.total_steps >= 8);
    assert!(report.checkpoints >= 1);

    let checkpointer = Checkpointer::new(&dir).unwrap();
    let stem = checkpointer.latest_policy_stem("Debug-v0").unwrap();
    let mut policy = striker::policy::LoadedPolicy::load(&stem).unwrap();

    let mut env = make_env("Debug-v0", RenderMode::None).unwrap();
    let outcome = striker::runner::run_episode(env.as_mut(), &mut policy, 50, false).unwrap();
    assert_eq!(outcome.steps, 10);
    env.close();

    let stats = striker::vec_env::load_stats(&checkpointer.stats_path("Debug-v0")).unwrap();
    assert!(stats.obs_rms.count() > 0.0);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn zero_budget_is_a_usage_error() {
    let session = TrainSession {
        env_id: "Debug-v0".to_string(),
        n_envs: 1,
        budget: Duration::ZERO,
        save_every: 100,
        checkpoint_dir: scratch_dir("zero"),
        resume_from: None,
        config: AppConfig::default(),
    };
    assert!(matches!(session.run(), Err(StrikerError::Usage(_))));
}
