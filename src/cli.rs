use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "striker")]
#[command(version = "0.1.0")]
#[command(about = "RL training and evaluation for simulated robot soccer", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyKind {
    Random,
    Ppo,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a policy for a number of episodes and report rewards
    Run {
        /// Environment id (e.g. VSS-v0, SSLDribbling-v0)
        #[arg(long, default_value = "SSLDribbling-v0")]
        env: String,
        /// Enable rendering (human)
        #[arg(long)]
        render: bool,
        /// Number of episodes to run
        #[arg(long, default_value = "1")]
        episodes: u64,
        /// Safety cap on steps per episode
        #[arg(long, default_value = "10000")]
        max_steps: u64,
        /// Policy to run
        #[arg(long, value_enum, default_value = "random")]
        policy: PolicyKind,
        /// Path to a saved policy checkpoint (required for --policy ppo)
        #[arg(long)]
        model_path: Option<PathBuf>,
    },
    /// Train a PPO policy with periodic checkpoints
    Train {
        /// Environment id
        #[arg(long, default_value = "SSLStaticDefenders-v0")]
        env: String,
        /// Number of parallel environment workers
        #[arg(long, default_value = "64")]
        n_envs: usize,
        /// Wall-clock training budget in seconds
        #[arg(long, default_value = "18000")]
        seconds: u64,
        /// Environment steps between checkpoints
        #[arg(long, default_value = "250000")]
        save_every: u64,
        /// Directory for checkpoint artifacts
        #[arg(long, default_value = "checkpoints")]
        checkpoint_dir: PathBuf,
        /// Optional TOML file with hyperparameter overrides
        #[arg(long)]
        config: Option<String>,
        /// Resume from a saved policy checkpoint stem
        #[arg(long)]
        resume_from: Option<PathBuf>,
    },
}
