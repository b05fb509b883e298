//! End-to-end CLI scenarios through the compiled binary.

use std::path::Path;
use std::process::{Command, Output};

fn striker(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_striker"))
        .args(args)
        .output()
        .expect("binary should spawn")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn random_policy_reports_each_episode() {
    let output = striker(&[
        "run",
        "--env",
        "Debug-v0",
        "--policy",
        "random",
        "--episodes",
        "3",
        "--max-steps",
        "50",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("Env: Debug-v0"));
    assert!(out.contains("Obs space: Box(4)"));
    assert!(out.contains("Act space: Box(2)"));
    // The debug task always truncates at its fixed horizon with zero reward.
    for episode in 1..=3 {
        assert!(
            out.contains(&format!("Episode {episode}: steps=10, total_reward=0")),
            "missing episode {episode} line in: {out}"
        );
    }
}

#[test]
fn max_steps_caps_the_episode() {
    let output = striker(&[
        "run",
        "--env",
        "Debug-v0",
        "--max-steps",
        "4",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Episode 1: steps=4"));
}

#[test]
fn ppo_without_model_path_exits_with_usage_error() {
    let output = striker(&["run", "--env", "Debug-v0", "--policy", "ppo"]);
    assert_eq!(output.status.code(), Some(1));

    let err = stderr(&output);
    assert!(err.contains("--model-path"), "stderr: {err}");
    // Validation fires before any environment output.
    assert!(!stdout(&output).contains("Env:"));
}

#[test]
fn missing_model_file_exits_with_runtime_error() {
    assert!(!Path::new("/nonexistent/ppo_missing.mpk").exists());
    let output = striker(&[
        "run",
        "--env",
        "Debug-v0",
        "--policy",
        "ppo",
        "--model-path",
        "/nonexistent/ppo_missing.mpk",
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Error:"));
}

#[test]
fn unknown_environment_is_rejected() {
    let output = striker(&["run", "--env", "NoSuchTask-v9"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("NoSuchTask-v9"));
}
