//! Lightweight kinematic robot-soccer environments.
//!
//! These are simplified 2D stand-ins for the full rsoccer simulator: one
//! controlled robot, a ball, and (for the defenders task) static opponents.
//! They carry enough dynamics for the harness to be exercised end to end —
//! full physics fidelity is out of scope.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{BoxSpace, Environment, RenderMode, StepInfo, Transition};
use crate::error::{Result, StrikerError};

/// Simulation timestep in seconds.
const DT: f32 = 0.025;

/// Distance under which the robot controls the ball.
const POSSESSION_RADIUS: f32 = 0.12;

/// Task-specific environment parameters.
#[derive(Debug, Clone)]
pub struct SoccerEnvConfig {
    /// Environment id this config realizes.
    pub id: &'static str,
    /// Half field length (goal line at +/- this x).
    pub half_length: f32,
    /// Half field width.
    pub half_width: f32,
    /// Goal half width.
    pub goal_half_width: f32,
    /// Maximum robot speed (m/s).
    pub max_speed: f32,
    /// Action dimension (velocity command, optionally spin/kick channels).
    pub action_dim: usize,
    /// Number of static defenders.
    pub n_defenders: usize,
    /// Steps before the episode truncates.
    pub max_steps: usize,
}

impl SoccerEnvConfig {
    pub fn vss() -> Self {
        Self {
            id: "VSS-v0",
            half_length: 0.75,
            half_width: 0.65,
            goal_half_width: 0.2,
            max_speed: 1.5,
            action_dim: 2,
            n_defenders: 0,
            max_steps: 1200,
        }
    }

    pub fn ssl_dribbling() -> Self {
        Self {
            id: "SSLDribbling-v0",
            half_length: 2.1,
            half_width: 1.5,
            goal_half_width: 0.5,
            max_speed: 2.5,
            action_dim: 3,
            n_defenders: 0,
            max_steps: 2400,
        }
    }

    pub fn ssl_static_defenders() -> Self {
        Self {
            id: "SSLStaticDefenders-v0",
            half_length: 2.1,
            half_width: 1.5,
            goal_half_width: 0.5,
            max_speed: 2.5,
            action_dim: 4,
            n_defenders: 3,
            max_steps: 2400,
        }
    }

    /// Observation layout: robot pose (x, y, sin, cos) + robot velocity (2)
    /// + ball position (2) + ball velocity (2) + defenders (2 each).
    fn obs_dim(&self) -> usize {
        10 + 2 * self.n_defenders
    }
}

/// Kinematic single-robot soccer task.
pub struct SoccerEnv {
    config: SoccerEnvConfig,
    render_mode: RenderMode,
    observation_space: BoxSpace,
    action_space: BoxSpace,
    rng: StdRng,

    robot_pos: [f32; 2],
    robot_vel: [f32; 2],
    robot_angle: f32,
    ball_pos: [f32; 2],
    ball_vel: [f32; 2],
    defenders: Vec<[f32; 2]>,
    steps: usize,
    closed: bool,
}

impl SoccerEnv {
    pub fn new(config: SoccerEnvConfig, render_mode: RenderMode) -> Self {
        Self::with_seed(config, render_mode, rand::thread_rng().gen())
    }

    /// Deterministic construction for tests.
    pub fn with_seed(config: SoccerEnvConfig, render_mode: RenderMode, seed: u64) -> Self {
        let obs_dim = config.obs_dim();
        let bound = config.half_length.max(config.half_width) * 2.0;
        Self {
            observation_space: BoxSpace::symmetric(obs_dim, bound.max(10.0)),
            action_space: BoxSpace::symmetric(config.action_dim, 1.0),
            render_mode,
            rng: StdRng::seed_from_u64(seed),
            robot_pos: [0.0; 2],
            robot_vel: [0.0; 2],
            robot_angle: 0.0,
            ball_pos: [0.0; 2],
            ball_vel: [0.0; 2],
            defenders: vec![[0.0; 2]; config.n_defenders],
            steps: 0,
            closed: false,
            config,
        }
    }

    fn observation(&self) -> Vec<f32> {
        let mut obs = Vec::with_capacity(self.config.obs_dim());
        obs.extend_from_slice(&self.robot_pos);
        obs.push(self.robot_angle.sin());
        obs.push(self.robot_angle.cos());
        obs.extend_from_slice(&self.robot_vel);
        obs.extend_from_slice(&self.ball_pos);
        obs.extend_from_slice(&self.ball_vel);
        for d in &self.defenders {
            obs.extend_from_slice(d);
        }
        obs
    }

    fn dist_robot_ball(&self) -> f32 {
        let dx = self.robot_pos[0] - self.ball_pos[0];
        let dy = self.robot_pos[1] - self.ball_pos[1];
        (dx * dx + dy * dy).sqrt()
    }

    fn ball_in_goal(&self) -> bool {
        self.ball_pos[0] >= self.config.half_length
            && self.ball_pos[1].abs() <= self.config.goal_half_width
    }

    fn ball_out_of_bounds(&self) -> bool {
        self.ball_pos[0].abs() > self.config.half_length
            || self.ball_pos[1].abs() > self.config.half_width
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed {
            Err(StrikerError::Env(format!(
                "{} used after close()",
                self.config.id
            )))
        } else {
            Ok(())
        }
    }
}

impl Environment for SoccerEnv {
    fn reset(&mut self) -> Result<(Vec<f32>, StepInfo)> {
        self.check_closed()?;
        let hl = self.config.half_length;
        let hw = self.config.half_width;

        self.robot_pos = [
            self.rng.gen_range(-hl * 0.8..-hl * 0.2),
            self.rng.gen_range(-hw * 0.6..hw * 0.6),
        ];
        self.robot_vel = [0.0; 2];
        self.robot_angle = 0.0;
        self.ball_pos = [
            self.rng.gen_range(-hl * 0.2..hl * 0.2),
            self.rng.gen_range(-hw * 0.4..hw * 0.4),
        ];
        self.ball_vel = [0.0; 2];
        for d in self.defenders.iter_mut() {
            *d = [
                self.rng.gen_range(hl * 0.3..hl * 0.8),
                self.rng.gen_range(-hw * 0.6..hw * 0.6),
            ];
        }
        self.steps = 0;
        Ok((self.observation(), StepInfo::new()))
    }

    fn step(&mut self, action: &[f32]) -> Result<Transition> {
        self.check_closed()?;
        if action.len() != self.config.action_dim {
            return Err(StrikerError::Env(format!(
                "{}: action has {} dims, expected {}",
                self.config.id,
                action.len(),
                self.config.action_dim
            )));
        }
        let action = self.action_space.clamp(action);
        let prev_dist = self.dist_robot_ball();
        let prev_ball_x = self.ball_pos[0];

        // Velocity command, scaled to the robot's top speed.
        self.robot_vel = [
            action[0] * self.config.max_speed,
            action[1] * self.config.max_speed,
        ];
        if self.config.action_dim > 2 {
            self.robot_angle += action[2] * DT * 4.0;
        }
        self.robot_pos[0] = (self.robot_pos[0] + self.robot_vel[0] * DT)
            .clamp(-self.config.half_length, self.config.half_length);
        self.robot_pos[1] = (self.robot_pos[1] + self.robot_vel[1] * DT)
            .clamp(-self.config.half_width, self.config.half_width);

        // Ball: dribbled while in possession, otherwise decaying free roll.
        if self.dist_robot_ball() < POSSESSION_RADIUS {
            self.ball_vel = self.robot_vel;
            // Kick channel shoots the ball toward the goal.
            if self.config.action_dim > 3 && action[3] > 0.5 {
                let to_goal_x = self.config.half_length - self.ball_pos[0];
                let to_goal_y = -self.ball_pos[1];
                let norm = (to_goal_x * to_goal_x + to_goal_y * to_goal_y)
                    .sqrt()
                    .max(1e-6);
                let kick_speed = self.config.max_speed * 2.0;
                self.ball_vel = [to_goal_x / norm * kick_speed, to_goal_y / norm * kick_speed];
            }
        } else {
            self.ball_vel = [self.ball_vel[0] * 0.98, self.ball_vel[1] * 0.98];
        }
        self.ball_pos[0] += self.ball_vel[0] * DT;
        self.ball_pos[1] += self.ball_vel[1] * DT;

        self.steps += 1;

        // Dense shaping: approach the ball, push it toward the goal line.
        let mut reward = (prev_dist - self.dist_robot_ball()) * 1.0
            + (self.ball_pos[0] - prev_ball_x) * 0.5
            - 0.001;
        let terminated = if self.ball_in_goal() {
            reward += 10.0;
            true
        } else if self.ball_out_of_bounds() {
            reward -= 1.0;
            true
        } else {
            false
        };
        let truncated = !terminated && self.steps >= self.config.max_steps;

        Ok(Transition {
            observation: self.observation(),
            reward,
            terminated,
            truncated,
            info: StepInfo::new(),
        })
    }

    fn render(&mut self) -> Result<()> {
        match self.render_mode {
            RenderMode::None => Err(StrikerError::Render(format!(
                "{} was constructed without a render mode",
                self.config.id
            ))),
            RenderMode::Human => {
                println!(
                    "[{}] step {:4} robot ({:+.2}, {:+.2}) ball ({:+.2}, {:+.2})",
                    self.config.id,
                    self.steps,
                    self.robot_pos[0],
                    self.robot_pos[1],
                    self.ball_pos[0],
                    self.ball_pos[1]
                );
                Ok(())
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }
}

/// Fixed-horizon smoke-test environment.
///
/// Zero reward, never terminates, always truncates after [`DebugEnv::HORIZON`]
/// steps. Used by integration tests and quick CLI sanity checks.
pub struct DebugEnv {
    observation_space: BoxSpace,
    action_space: BoxSpace,
    steps: usize,
}

impl DebugEnv {
    pub const HORIZON: usize = 10;

    pub fn new() -> Self {
        Self {
            observation_space: BoxSpace::symmetric(4, 1.0),
            action_space: BoxSpace::symmetric(2, 1.0),
            steps: 0,
        }
    }
}

impl Default for DebugEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for DebugEnv {
    fn reset(&mut self) -> Result<(Vec<f32>, StepInfo)> {
        self.steps = 0;
        Ok((vec![0.0; 4], StepInfo::new()))
    }

    fn step(&mut self, _action: &[f32]) -> Result<Transition> {
        self.steps += 1;
        Ok(Transition {
            observation: vec![0.0; 4],
            reward: 0.0,
            terminated: false,
            truncated: self.steps >= Self::HORIZON,
            info: StepInfo::new(),
        })
    }

    fn render(&mut self) -> Result<()> {
        Err(StrikerError::Render("Debug-v0 has no renderer".to_string()))
    }

    fn close(&mut self) {}

    fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }
}
