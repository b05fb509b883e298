use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use striker::cli::{Cli, Commands, PolicyKind};
use striker::config::AppConfig;
use striker::env::{make_env, RenderMode};
use striker::error::{Result, StrikerError};
use striker::policy::{LoadedPolicy, Policy, RandomPolicy};
use striker::runner::run_episodes;
use striker::trainer::TrainSession;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Commands::Run {
            env,
            render,
            episodes,
            max_steps,
            policy,
            model_path,
        } => run_mode(&env, render, episodes, max_steps, policy, model_path),
        Commands::Train {
            env,
            n_envs,
            seconds,
            save_every,
            checkpoint_dir,
            config,
            resume_from,
        } => train_mode(
            &env,
            n_envs,
            seconds,
            save_every,
            checkpoint_dir,
            config.as_deref(),
            resume_from,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[allow(clippy::too_many_arguments)]
fn run_mode(
    env_id: &str,
    render: bool,
    episodes: u64,
    max_steps: u64,
    policy_kind: PolicyKind,
    model_path: Option<PathBuf>,
) -> Result<()> {
    // Argument validation happens before any environment is constructed.
    let model_path = match policy_kind {
        PolicyKind::Ppo => Some(model_path.ok_or_else(|| {
            StrikerError::Usage("--model-path is required for --policy ppo".to_string())
        })?),
        PolicyKind::Random => None,
    };

    let render_mode = if render {
        RenderMode::Human
    } else {
        RenderMode::None
    };
    let mut env = make_env(env_id, render_mode)?;

    println!("Env: {env_id}");
    println!("Obs space: Box({})", env.observation_space().shape());
    println!("Act space: Box({})", env.action_space().shape());

    let mut policy: Box<dyn Policy> = match model_path {
        Some(path) => {
            let loaded = LoadedPolicy::load(&path)?;
            // Surface configuration errors before the first step.
            loaded.warn_on_shape_mismatch(env.as_ref());
            Box::new(loaded)
        }
        None => Box::new(RandomPolicy::new(env.action_space().clone())),
    };

    run_episodes(env.as_mut(), policy.as_mut(), episodes, max_steps, render)?;
    Ok(())
}

fn train_mode(
    env_id: &str,
    n_envs: usize,
    seconds: u64,
    save_every: u64,
    checkpoint_dir: PathBuf,
    config_path: Option<&str>,
    resume_from: Option<PathBuf>,
) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let session = TrainSession {
        env_id: env_id.to_string(),
        n_envs,
        budget: Duration::from_secs(seconds),
        save_every,
        checkpoint_dir,
        resume_from,
        config,
    };
    let report = session.run()?;
    println!(
        "Done. {} steps, {} checkpoints in {:.0}s.",
        report.total_steps,
        report.checkpoints,
        report.elapsed.as_secs_f64()
    );
    Ok(())
}
