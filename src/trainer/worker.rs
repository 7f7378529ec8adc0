use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::algorithms::{Algorithm, TrainingAlgorithm};
use crate::curiosity::IntrinsicCuriosity;
use crate::environment::Environment;
use crate::error::Result;
use crate::metrics::{TrainingCounters, WorkerStats};
use crate::policy::Policy;
use crate::replay_buffer::{Experience, ExperienceBuffer};
use crate::sync::StopToken;

/// Episodes between progress log lines
const PROGRESS_INTERVAL: u64 = 10;

/// Settings the controller may change while workers run
#[derive(Debug)]
pub(crate) struct LiveSettings {
    pub sync_frequency: AtomicUsize,
    pub experience_sharing: AtomicBool,
}

impl LiveSettings {
    pub fn new(sync_frequency: usize, experience_sharing: bool) -> Self {
        LiveSettings {
            sync_frequency: AtomicUsize::new(sync_frequency.max(1)),
            experience_sharing: AtomicBool::new(experience_sharing),
        }
    }

    pub fn sync_frequency(&self) -> usize {
        self.sync_frequency.load(Ordering::Relaxed).max(1)
    }

    pub fn experience_sharing(&self) -> bool {
        self.experience_sharing.load(Ordering::Relaxed)
    }
}

/// Settings fixed for the lifetime of one worker thread
#[derive(Debug, Clone)]
pub(crate) struct WorkerSettings {
    pub episodes: usize,
    pub max_steps_per_episode: usize,
    pub error_backoff: Duration,
    pub step_delay: Option<Duration>,
    pub shared_replay_interval: usize,
    pub shared_replay_batch: usize,
}

enum EpisodeOutcome {
    Completed { reward: f32, steps: usize },
    Cancelled,
}

/// Everything a worker thread owns
pub(crate) struct Worker {
    pub id: usize,
    pub algorithm: Algorithm,
    pub env: Box<dyn Environment>,
    pub curiosity: Option<IntrinsicCuriosity>,
    pub stats: Arc<WorkerStats>,
    pub counters: Arc<TrainingCounters>,
    pub shared_buffer: Arc<Mutex<ExperienceBuffer>>,
    pub live: Arc<LiveSettings>,
    pub stop: StopToken,
    pub settings: WorkerSettings,
}

impl Worker {
    /// Run episodes until the target is reached or the stop token fires, then
    /// hand back the local policy
    pub fn run(mut self) -> Box<dyn Policy> {
        info!(
            "worker {} started: {} episodes with {}",
            self.id,
            self.settings.episodes,
            self.algorithm.kind()
        );

        while !self.stop.is_cancelled()
            && self.stats.episodes_completed() < self.settings.episodes as u64
        {
            match self.run_episode() {
                Ok(EpisodeOutcome::Completed { reward, steps }) => {
                    self.stats.record_episode(reward);
                    self.counters.record_episode(reward);

                    let episodes = self.stats.episodes_completed();
                    debug!("worker {} episode {}: {} steps, reward {:.3}", self.id, episodes, steps, reward);
                    if episodes % PROGRESS_INTERVAL == 0 {
                        info!(
                            "worker {}: {} episodes, avg reward {:.3}",
                            self.id,
                            episodes,
                            self.stats.average_reward()
                        );
                    }
                }
                Ok(EpisodeOutcome::Cancelled) => break,
                Err(e) => {
                    warn!("worker {} episode failed: {}", self.id, e);
                    self.algorithm.discard_pending();
                    self.stats.record_failure();
                    thread::sleep(self.settings.error_backoff);
                }
            }
        }

        info!(
            "worker {} finished: {} episodes, {} steps, avg reward {:.3}",
            self.id,
            self.stats.episodes_completed(),
            self.stats.steps_completed(),
            self.stats.average_reward()
        );
        self.stats.set_running(false);
        self.algorithm.into_policy()
    }

    fn run_episode(&mut self) -> Result<EpisodeOutcome> {
        let mut state = self.env.reset()?;
        let mut episode_reward = 0.0;
        let mut trajectory: Vec<Experience> = Vec::new();
        let mut steps = 0;
        let mut steps_since_sync = 0;
        let mut done = false;

        while !done && steps < self.settings.max_steps_per_episode {
            if self.stop.is_cancelled() {
                return Ok(EpisodeOutcome::Cancelled);
            }

            let action = self.algorithm.policy_mut().predict(&state, true)?;
            let transition = self.env.step(&action)?;

            let mut reward = transition.reward;
            if let Some(curiosity) = &self.curiosity {
                reward += curiosity.intrinsic_reward(&state, &action, &transition.next_state)?;
            }

            let report = self
                .algorithm
                .process_step(&state, &action, reward, &transition.next_state, transition.done)?;

            if self.live.experience_sharing() {
                self.shared_buffer.lock().add(report.experience.clone());
            }
            if self.curiosity.is_some() {
                trajectory.push(report.experience);
            }

            episode_reward += transition.reward;
            steps += 1;
            self.stats.record_step();
            self.counters.record_step();

            steps_since_sync = if report.synced { 0 } else { steps_since_sync + 1 };
            // The last step is exchanged by finish_episode and synchronize below
            let checkpoint = !transition.done
                && (steps_since_sync >= self.live.sync_frequency() || self.stats.take_resync_request());
            if checkpoint {
                self.algorithm.sync_with_global()?;
                steps_since_sync = 0;
                debug!("worker {} synchronized at step {}", self.id, steps);
                if self.stop.is_cancelled() {
                    return Ok(EpisodeOutcome::Cancelled);
                }
            }

            state = transition.next_state;
            done = transition.done;

            if let Some(delay) = self.settings.step_delay {
                thread::sleep(delay);
            }
        }

        if self.shared_replay_due() {
            self.replay_shared()?;
        }
        self.algorithm.finish_episode()?;

        if let Some(curiosity) = self.curiosity.as_mut() {
            curiosity.update(&trajectory)?;
        }

        self.algorithm.synchronize()?;
        Ok(EpisodeOutcome::Completed {
            reward: episode_reward,
            steps,
        })
    }

    /// PPO workers replay shared experience every `shared_replay_interval` episodes
    fn shared_replay_due(&self) -> bool {
        let interval = self.settings.shared_replay_interval;
        matches!(self.algorithm, Algorithm::Clipped(_))
            && self.live.experience_sharing()
            && interval > 0
            && (self.stats.episodes_completed() + 1) % interval as u64 == 0
    }

    fn replay_shared(&mut self) -> Result<()> {
        let mut samples = self.shared_buffer.lock().sample(self.settings.shared_replay_batch);
        if let Algorithm::Clipped(alg) = &mut self.algorithm {
            if !samples.is_empty() {
                let loss = alg.replay(&mut samples, 0.5)?;
                debug!("worker {} replayed {} shared samples, loss {:.4}", self.id, samples.len(), loss);
            }
        }
        Ok(())
    }
}
