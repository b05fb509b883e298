//! Parallel environment pool.
//!
//! One worker thread per slot, each exclusively owning one environment
//! instance. The pool communicates with workers purely over request/reply
//! channels; `reset` and `step` are synchronous barriers that dispatch to
//! every worker and then collect every reply in slot order.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::env::{BoxSpace, Environment, StepInfo};
use crate::error::{Result, StrikerError};

/// How long `close()` waits for a worker to acknowledge before abandoning it.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Factory building the environment for a given slot index.
pub type EnvFactory = dyn Fn(usize) -> Result<Box<dyn Environment>> + Send + Sync;

enum Request {
    Reset,
    Step(Vec<f32>),
    Close,
}

enum Reply {
    Ready {
        observation_space: BoxSpace,
        action_space: BoxSpace,
    },
    StartFailed(String),
    Reset {
        observation: Vec<f32>,
        info: StepInfo,
    },
    Step(SlotStep),
    Failed(String),
    Closed,
}

/// One slot's contribution to a batched step.
#[derive(Debug, Clone)]
pub struct SlotStep {
    /// Observation after the step. If the episode ended this is the first
    /// observation of the next episode (the worker auto-resets) and the
    /// pre-reset observation is preserved in `final_observation`.
    pub observation: Vec<f32>,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
    pub final_observation: Option<Vec<f32>>,
}

/// Result of a batched `step` across all slots, in slot order.
#[derive(Debug, Clone, Default)]
pub struct BatchStep {
    pub observations: Vec<Vec<f32>>,
    pub rewards: Vec<f32>,
    pub terminated: Vec<bool>,
    pub truncated: Vec<bool>,
    pub infos: Vec<StepInfo>,
    pub final_observations: Vec<Option<Vec<f32>>>,
}

impl BatchStep {
    fn with_capacity(n: usize) -> Self {
        Self {
            observations: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            terminated: Vec::with_capacity(n),
            truncated: Vec::with_capacity(n),
            infos: Vec::with_capacity(n),
            final_observations: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, step: SlotStep) {
        self.observations.push(step.observation);
        self.rewards.push(step.reward);
        self.terminated.push(step.terminated);
        self.truncated.push(step.truncated);
        self.infos.push(step.info);
        self.final_observations.push(step.final_observation);
    }

    /// Episode-over flag per slot (terminated or truncated).
    pub fn dones(&self) -> Vec<bool> {
        self.terminated
            .iter()
            .zip(&self.truncated)
            .map(|(&t, &tr)| t || tr)
            .collect()
    }
}

#[derive(Debug)]
struct Worker {
    request_tx: Sender<Request>,
    reply_rx: Receiver<Reply>,
    handle: Option<JoinHandle<()>>,
}

/// N environments driven in lockstep from worker threads.
#[derive(Debug)]
pub struct EnvPool {
    workers: Vec<Worker>,
    observation_space: BoxSpace,
    action_space: BoxSpace,
    closed: bool,
}

impl EnvPool {
    /// Spawn `n` workers, each building its environment through `factory`.
    ///
    /// If any worker fails to start, the workers that did start are torn
    /// down before the error (naming the failing slot) is returned.
    pub fn new(n: usize, factory: Arc<EnvFactory>) -> Result<Self> {
        if n == 0 {
            return Err(StrikerError::Usage(
                "environment pool needs at least one worker".to_string(),
            ));
        }

        let mut workers = Vec::with_capacity(n);
        for slot in 0..n {
            let (request_tx, request_rx) = mpsc::channel();
            let (reply_tx, reply_rx) = mpsc::channel();
            let factory = Arc::clone(&factory);
            let handle = thread::Builder::new()
                .name(format!("env-worker-{slot}"))
                .spawn(move || worker_loop(slot, factory, &request_rx, &reply_tx))
                .map_err(|e| StrikerError::WorkerStart {
                    slot,
                    reason: e.to_string(),
                })?;
            workers.push(Worker {
                request_tx,
                reply_rx,
                handle: Some(handle),
            });
        }

        // Collect startup acknowledgements in slot order.
        let mut spaces = None;
        let mut failure: Option<StrikerError> = None;
        for (slot, worker) in workers.iter().enumerate() {
            match worker.reply_rx.recv() {
                Ok(Reply::Ready {
                    observation_space,
                    action_space,
                }) => {
                    if spaces.is_none() {
                        spaces = Some((observation_space, action_space));
                    }
                }
                Ok(Reply::StartFailed(reason)) => {
                    failure.get_or_insert(StrikerError::WorkerStart { slot, reason });
                }
                Ok(_) | Err(_) => {
                    failure.get_or_insert(StrikerError::WorkerStart {
                        slot,
                        reason: "worker exited before acknowledging startup".to_string(),
                    });
                }
            }
        }

        if let Some(err) = failure {
            let mut pool = Self {
                workers,
                observation_space: BoxSpace::symmetric(1, 1.0),
                action_space: BoxSpace::symmetric(1, 1.0),
                closed: false,
            };
            pool.close();
            return Err(err);
        }

        let (observation_space, action_space) =
            spaces.expect("at least one worker acknowledged startup");
        debug!(n, "environment pool started");
        Ok(Self {
            workers,
            observation_space,
            action_space,
            closed: false,
        })
    }

    pub fn num_envs(&self) -> usize {
        self.workers.len()
    }

    pub fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    pub fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(StrikerError::Env("pool used after close()".to_string()))
        } else {
            Ok(())
        }
    }

    fn send(&self, slot: usize, request: Request) -> Result<()> {
        self.workers[slot]
            .request_tx
            .send(request)
            .map_err(|_| StrikerError::WorkerDead {
                slot,
                reason: "request channel disconnected".to_string(),
            })
    }

    fn recv(&self, slot: usize) -> Result<Reply> {
        match self.workers[slot].reply_rx.recv() {
            Ok(Reply::Failed(reason)) => Err(StrikerError::WorkerDead { slot, reason }),
            Ok(reply) => Ok(reply),
            Err(_) => Err(StrikerError::WorkerDead {
                slot,
                reason: "reply channel disconnected".to_string(),
            }),
        }
    }

    /// Reset every environment, returning N observations in slot order.
    pub fn reset(&mut self) -> Result<Vec<Vec<f32>>> {
        self.check_open()?;
        for slot in 0..self.workers.len() {
            self.send(slot, Request::Reset)?;
        }
        let mut observations = Vec::with_capacity(self.workers.len());
        for slot in 0..self.workers.len() {
            match self.recv(slot)? {
                Reply::Reset { observation, .. } => observations.push(observation),
                _ => {
                    return Err(StrikerError::WorkerDead {
                        slot,
                        reason: "unexpected reply to reset".to_string(),
                    })
                }
            }
        }
        Ok(observations)
    }

    /// Step every environment; the i-th action applies to the i-th slot.
    ///
    /// Blocks until all workers have replied (a synchronous barrier). There
    /// is no per-step timeout: a hung environment blocks this call.
    pub fn step(&mut self, actions: &[Vec<f32>]) -> Result<BatchStep> {
        self.check_open()?;
        if actions.len() != self.workers.len() {
            return Err(StrikerError::Env(format!(
                "batch has {} actions for {} slots",
                actions.len(),
                self.workers.len()
            )));
        }
        for (slot, action) in actions.iter().enumerate() {
            self.send(slot, Request::Step(action.clone()))?;
        }
        let mut batch = BatchStep::with_capacity(self.workers.len());
        for slot in 0..self.workers.len() {
            match self.recv(slot)? {
                Reply::Step(step) => batch.push(step),
                _ => {
                    return Err(StrikerError::WorkerDead {
                        slot,
                        reason: "unexpected reply to step".to_string(),
                    })
                }
            }
        }
        Ok(batch)
    }

    /// Tear down every worker. Idempotent; also invoked from `Drop` so the
    /// pool is released exactly once on every exit path.
    ///
    /// A worker that does not acknowledge within the grace period is
    /// abandoned (its thread is detached) rather than blocking teardown.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for worker in &self.workers {
            // A dead worker has already disconnected; nothing to signal.
            let _ = worker.request_tx.send(Request::Close);
        }
        for (slot, worker) in self.workers.iter_mut().enumerate() {
            let acknowledged = loop {
                match worker.reply_rx.recv_timeout(CLOSE_GRACE) {
                    Ok(Reply::Closed) => break true,
                    // Replies queued before the close request; drain them.
                    Ok(_) => continue,
                    Err(RecvTimeoutError::Timeout) => break false,
                    Err(RecvTimeoutError::Disconnected) => break true,
                }
            };
            match worker.handle.take() {
                Some(handle) if acknowledged => {
                    if handle.join().is_err() {
                        warn!(slot, "environment worker panicked during teardown");
                    }
                }
                Some(_handle) => {
                    // Dropping the handle detaches the thread.
                    warn!(slot, "environment worker unresponsive, abandoning it");
                }
                None => {}
            }
        }
        debug!("environment pool closed");
    }
}

impl Drop for EnvPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(
    slot: usize,
    factory: Arc<EnvFactory>,
    request_rx: &Receiver<Request>,
    reply_tx: &Sender<Reply>,
) {
    let mut env = match factory(slot) {
        Ok(env) => {
            let ready = Reply::Ready {
                observation_space: env.observation_space().clone(),
                action_space: env.action_space().clone(),
            };
            if reply_tx.send(ready).is_err() {
                return;
            }
            env
        }
        Err(e) => {
            let _ = reply_tx.send(Reply::StartFailed(e.to_string()));
            return;
        }
    };

    loop {
        let request = match request_rx.recv() {
            Ok(request) => request,
            // Pool dropped without close; release the env and stop.
            Err(_) => {
                env.close();
                return;
            }
        };
        let reply = match request {
            Request::Reset => match env.reset() {
                Ok((observation, info)) => Reply::Reset { observation, info },
                Err(e) => Reply::Failed(e.to_string()),
            },
            Request::Step(action) => match step_slot(env.as_mut(), &action) {
                Ok(step) => Reply::Step(step),
                Err(e) => Reply::Failed(e.to_string()),
            },
            Request::Close => {
                env.close();
                let _ = reply_tx.send(Reply::Closed);
                return;
            }
        };
        let failed = matches!(reply, Reply::Failed(_));
        if reply_tx.send(reply).is_err() || failed {
            env.close();
            return;
        }
    }
}

/// Step one slot, auto-resetting on episode end.
fn step_slot(env: &mut dyn Environment, action: &[f32]) -> Result<SlotStep> {
    let transition = env.step(action)?;
    if transition.terminated || transition.truncated {
        let (observation, _reset_info) = env.reset()?;
        Ok(SlotStep {
            observation,
            reward: transition.reward,
            terminated: transition.terminated,
            truncated: transition.truncated,
            info: transition.info,
            final_observation: Some(transition.observation),
        })
    } else {
        Ok(SlotStep {
            observation: transition.observation,
            reward: transition.reward,
            terminated: transition.terminated,
            truncated: transition.truncated,
            info: transition.info,
            final_observation: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Transition;

    /// Env whose observation encodes its slot id; truncates after 3 steps.
    struct SlotEnv {
        slot: f32,
        steps: usize,
        observation_space: BoxSpace,
        action_space: BoxSpace,
    }

    impl SlotEnv {
        fn new(slot: usize) -> Self {
            Self {
                slot: slot as f32,
                steps: 0,
                observation_space: BoxSpace::symmetric(2, 100.0),
                action_space: BoxSpace::symmetric(1, 1.0),
            }
        }
    }

    impl Environment for SlotEnv {
        fn reset(&mut self) -> Result<(Vec<f32>, StepInfo)> {
            self.steps = 0;
            Ok((vec![self.slot, 0.0], StepInfo::new()))
        }

        fn step(&mut self, action: &[f32]) -> Result<Transition> {
            self.steps += 1;
            Ok(Transition {
                observation: vec![self.slot, action[0]],
                reward: self.slot,
                terminated: false,
                truncated: self.steps >= 3,
                info: StepInfo::new(),
            })
        }

        fn render(&mut self) -> Result<()> {
            Err(StrikerError::Render("no renderer".to_string()))
        }

        fn close(&mut self) {}

        fn observation_space(&self) -> &BoxSpace {
            &self.observation_space
        }

        fn action_space(&self) -> &BoxSpace {
            &self.action_space
        }
    }

    fn slot_factory() -> Arc<EnvFactory> {
        Arc::new(|slot| Ok(Box::new(SlotEnv::new(slot)) as Box<dyn Environment>))
    }

    #[test]
    fn reset_returns_one_observation_per_slot_in_order() {
        for n in [1usize, 2, 5] {
            let mut pool = EnvPool::new(n, slot_factory()).unwrap();
            let observations = pool.reset().unwrap();
            assert_eq!(observations.len(), n);
            for (slot, obs) in observations.iter().enumerate() {
                assert_eq!(obs[0], slot as f32);
            }
            pool.close();
        }
    }

    #[test]
    fn step_applies_ith_action_to_ith_slot() {
        let mut pool = EnvPool::new(3, slot_factory()).unwrap();
        pool.reset().unwrap();

        let actions = vec![vec![0.1], vec![0.2], vec![0.3]];
        let batch = pool.step(&actions).unwrap();
        for slot in 0..3 {
            assert_eq!(batch.observations[slot][0], slot as f32);
            assert_eq!(batch.observations[slot][1], actions[slot][0]);
            assert_eq!(batch.rewards[slot], slot as f32);
        }
        pool.close();
    }

    #[test]
    fn finished_slots_auto_reset_and_keep_final_observation() {
        let mut pool = EnvPool::new(2, slot_factory()).unwrap();
        pool.reset().unwrap();

        let actions = vec![vec![0.5], vec![0.5]];
        pool.step(&actions).unwrap();
        pool.step(&actions).unwrap();
        let batch = pool.step(&actions).unwrap();

        assert_eq!(batch.dones(), vec![true, true]);
        for slot in 0..2 {
            // Fresh post-reset observation, final one preserved separately.
            assert_eq!(batch.observations[slot], vec![slot as f32, 0.0]);
            let final_obs = batch.final_observations[slot].as_ref().unwrap();
            assert_eq!(final_obs, &vec![slot as f32, 0.5]);
        }
        pool.close();
    }

    #[test]
    fn start_failure_names_the_slot() {
        let factory: Arc<EnvFactory> = Arc::new(|slot| {
            if slot == 2 {
                Err(StrikerError::Env("boom".to_string()))
            } else {
                Ok(Box::new(SlotEnv::new(slot)) as Box<dyn Environment>)
            }
        });
        let err = EnvPool::new(4, factory).unwrap_err();
        match err {
            StrikerError::WorkerStart { slot, .. } => assert_eq!(slot, 2),
            other => panic!("expected WorkerStart, got {other:?}"),
        }
    }

    #[test]
    fn close_is_idempotent() {
        let mut pool = EnvPool::new(2, slot_factory()).unwrap();
        pool.reset().unwrap();
        pool.close();
        pool.close();
        assert!(pool.step(&[vec![0.0], vec![0.0]]).is_err());
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(matches!(
            EnvPool::new(0, slot_factory()),
            Err(StrikerError::Usage(_))
        ));
    }
}
