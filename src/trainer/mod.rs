//! # Distributed Training
//!
//! [`DistributedTrainer`] runs one OS thread per worker. Every worker owns a clone
//! of the policy, an environment and a [`TrainingAlgorithm`], and exchanges weights
//! with the global policy through a [`SharedPolicy`] handle.
//!
//! ```rust,no_run
//! use arcade_rl::environment::{ArcadeConfig, SimulatedArcade};
//! use arcade_rl::policy::LinearPolicy;
//! use arcade_rl::trainer::DistributedTrainer;
//!
//! let config = ArcadeConfig::default();
//! let policy = LinearPolicy::new(config.width * config.height, 4 + config.num_buttons);
//! let mut trainer = DistributedTrainer::new(Box::new(policy), SimulatedArcade::factory(config), 4);
//!
//! trainer.start(100).unwrap();
//! trainer.wait().unwrap();
//! println!("{}", trainer.get_status());
//! ```

pub mod config;
mod worker;

pub use config::TrainerConfig;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::algorithms::{
    default_hyperparameters, Algorithm, AlgorithmKind, Hyperparameters, TrainingAlgorithm, ALGORITHM_KEYS,
};
use crate::curiosity::{CuriosityConfig, IntrinsicCuriosity};
use crate::environment::EnvFactory;
use crate::error::{Result, TrainerError};
use crate::metrics::{TrainerStatus, TrainingCounters, WorkerStats, WorkerStatus};
use crate::params::{sidecar_path, ParamFile};
use crate::policy::{Policy, SharedPolicy};
use crate::replay_buffer::{Experience, ExperienceBuffer};
use crate::sync::StopToken;

use worker::{LiveSettings, Worker, WorkerSettings};

/// Extension of the trainer's parameter sidecar
const SIDECAR_EXTENSION: &str = "dist_params";

/// A worker's policy is parked here while its thread is not running
struct WorkerSlot {
    stats: Arc<WorkerStats>,
    policy: Option<Box<dyn Policy>>,
    handle: Option<JoinHandle<Box<dyn Policy>>>,
}

impl WorkerSlot {
    fn is_active(&self) -> bool {
        self.handle.as_ref().map_or(false, |handle| !handle.is_finished())
    }
}

pub struct DistributedTrainer {
    config: TrainerConfig,
    global: SharedPolicy,
    env_factory: EnvFactory,
    slots: Vec<WorkerSlot>,
    shared_buffer: Arc<Mutex<ExperienceBuffer>>,
    live: Arc<LiveSettings>,
    counters: Arc<TrainingCounters>,
    stop: StopToken,
}

impl DistributedTrainer {
    /// Trainer with default settings. `num_workers` is raised to at least 1.
    pub fn new(policy: Box<dyn Policy>, env_factory: EnvFactory, num_workers: usize) -> Self {
        let config = TrainerConfig {
            num_workers: num_workers.max(1),
            ..TrainerConfig::default()
        };
        Self::from_parts(policy, env_factory, config)
    }

    pub fn with_config(policy: Box<dyn Policy>, env_factory: EnvFactory, config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(policy, env_factory, config))
    }

    fn from_parts(policy: Box<dyn Policy>, env_factory: EnvFactory, config: TrainerConfig) -> Self {
        let slots = (0..config.num_workers)
            .map(|id| WorkerSlot {
                stats: Arc::new(WorkerStats::new(id)),
                policy: Some(policy.boxed_clone()),
                handle: None,
            })
            .collect();

        DistributedTrainer {
            shared_buffer: Arc::new(Mutex::new(ExperienceBuffer::new(config.shared_buffer_size))),
            live: Arc::new(LiveSettings::new(config.sync_frequency, config.experience_sharing)),
            counters: Arc::new(TrainingCounters::new()),
            stop: StopToken::new(),
            global: SharedPolicy::new(policy),
            env_factory,
            slots,
            config,
        }
    }

    /// Spawn a thread for every worker that is not already running.
    ///
    /// Aggregate counters and the stop flag are reset only when no worker is running,
    /// so calling `start` again while training only fills the idle slots. A refilled
    /// slot's previous counts leave the totals along with its stats.
    pub fn start(&mut self, episodes_per_worker: usize) -> Result<()> {
        self.reap_finished();

        let fresh_run = !self.is_running();
        if fresh_run {
            self.counters.reset();
            self.stop.reset();
        }

        let kind = self.config.algorithm;
        let params = self.worker_hyperparameters();
        let settings = WorkerSettings {
            episodes: episodes_per_worker,
            max_steps_per_episode: self.config.max_steps_per_episode,
            error_backoff: self.config.error_backoff(),
            step_delay: self.config.step_delay(),
            shared_replay_interval: self.config.shared_replay_interval,
            shared_replay_batch: self.config.shared_replay_batch,
        };

        let mut spawned = 0;
        for id in 0..self.slots.len() {
            let slot = &mut self.slots[id];
            if slot.handle.is_some() {
                continue;
            }

            let env = (self.env_factory)(id)?;
            let curiosity = match &self.config.curiosity {
                Some(config) => Some(IntrinsicCuriosity::new(config.clone(), env.action_size())?),
                None => None,
            };

            if let Some(policy) = slot.policy.as_mut() {
                self.global.pull_into(policy.as_mut())?;
            }
            let policy = match slot.policy.take() {
                Some(policy) => policy,
                None => self.global.snapshot(),
            };

            let mut algorithm = Algorithm::new(kind, policy, &params);
            algorithm.attach_global(self.global.clone());

            if !fresh_run {
                self.counters.discount(&slot.stats);
            }
            slot.stats.reset();
            slot.stats.set_running(true);

            let worker = Worker {
                id,
                algorithm,
                env,
                curiosity,
                stats: Arc::clone(&slot.stats),
                counters: Arc::clone(&self.counters),
                shared_buffer: Arc::clone(&self.shared_buffer),
                live: Arc::clone(&self.live),
                stop: self.stop.clone(),
                settings: settings.clone(),
            };

            let spawn = thread::Builder::new()
                .name(format!("rl-worker-{}", id))
                .spawn(move || worker.run());
            match spawn {
                Ok(handle) => {
                    slot.handle = Some(handle);
                    spawned += 1;
                }
                Err(e) => {
                    error!("failed to spawn worker {}: {}", id, e);
                    slot.stats.set_running(false);
                    return Err(TrainerError::ThreadSpawn(e.to_string()));
                }
            }
        }

        info!(
            "started {} of {} workers ({}, {} episodes each)",
            spawned,
            self.slots.len(),
            kind,
            episodes_per_worker
        );
        Ok(())
    }

    /// Cancel every worker and join its thread. No-op when nothing was started.
    pub fn stop(&mut self) {
        if self.slots.iter().all(|slot| slot.handle.is_none()) {
            return;
        }

        self.stop.cancel();
        let panicked = self.join_workers(false);
        if !panicked.is_empty() {
            warn!("workers {:?} panicked and were reset to the global policy", panicked);
        }

        info!(
            "training stopped: {} episodes, {} steps, avg reward {:.3}",
            self.counters.episodes(),
            self.counters.steps(),
            self.counters.average_reward()
        );
    }

    /// Block until every worker reaches its episode target
    pub fn wait(&mut self) -> Result<()> {
        let panicked = self.join_workers(false);
        match panicked.first() {
            Some(&id) => Err(TrainerError::WorkerPanicked(id)),
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.slots.iter().any(WorkerSlot::is_active)
    }

    fn reap_finished(&mut self) {
        self.join_workers(true);
    }

    /// Join worker threads and park their policies, returning the ids of panicked workers
    fn join_workers(&mut self, finished_only: bool) -> Vec<usize> {
        let mut panicked = Vec::new();

        for (id, slot) in self.slots.iter_mut().enumerate() {
            let ready = slot
                .handle
                .as_ref()
                .map_or(false, |handle| !finished_only || handle.is_finished());
            if !ready {
                continue;
            }

            if let Some(handle) = slot.handle.take() {
                match handle.join() {
                    Ok(policy) => slot.policy = Some(policy),
                    Err(_) => {
                        error!("worker {} panicked", id);
                        slot.stats.set_running(false);
                        slot.policy = Some(self.global.snapshot());
                        panicked.push(id);
                    }
                }
            }
        }

        panicked
    }

    /// Hyperparameters handed to each algorithm at spawn
    fn worker_hyperparameters(&self) -> Hyperparameters {
        let kind = self.config.algorithm;
        let mut params = default_hyperparameters(kind);
        params.insert("learning_rate".to_string(), self.config.learning_rate);
        params.insert("gamma".to_string(), self.config.gamma);
        match kind {
            AlgorithmKind::A3c => {
                params.insert("update_frequency".to_string(), self.live.sync_frequency() as f32);
            }
            AlgorithmKind::Ppo => {
                params.insert("publish_rate".to_string(), 1.0 / self.slots.len() as f32);
            }
        }
        params.extend(self.config.algorithm_params.iter().map(|(k, v)| (k.clone(), *v)));
        params
    }

    /// Save the global weights at `path` and the trainer settings at `<path>.dist_params`
    pub fn save_model(&self, path: &Path) -> Result<()> {
        let weights = self.global.save(path);
        if let Err(e) = &weights {
            error!("failed to save global policy to {}: {}", path.display(), e);
        }

        let sidecar = sidecar_path(path, SIDECAR_EXTENSION);
        let params = self.sidecar_params().write(&sidecar);
        if let Err(e) = &params {
            error!("failed to save trainer parameters to {}: {}", sidecar.display(), e);
        }

        if weights.is_ok() && params.is_ok() {
            info!("saved model to {}", path.display());
        }
        weights.and(params)
    }

    fn sidecar_params(&self) -> ParamFile {
        let mut params = ParamFile::new();
        params.set("learning_rate", self.config.learning_rate);
        params.set("gamma", self.config.gamma);
        params.set("sync_frequency", self.config.sync_frequency);
        params.set("experience_sharing", self.config.experience_sharing);
        params.set("shared_buffer_size", self.config.shared_buffer_size);
        params.set("algorithm", self.config.algorithm);
        params.set("num_workers", self.slots.len());
        for (key, value) in &self.config.algorithm_params {
            params.set(key, value);
        }
        params
    }

    /// Load the global weights and settings written by `save_model`, then resynchronize
    /// every worker. Idle workers copy the weights now, running workers at their next
    /// checkpoint.
    pub fn load_model(&mut self, path: &Path) -> Result<()> {
        if let Err(e) = self.global.load(path) {
            error!("failed to load global policy from {}: {}", path.display(), e);
            return Err(e);
        }

        let sidecar = sidecar_path(path, SIDECAR_EXTENSION);
        if sidecar.exists() {
            match ParamFile::read(&sidecar) {
                Ok(params) => self.apply_sidecar(&params),
                Err(e) => warn!("failed to read trainer parameters from {}: {}", sidecar.display(), e),
            }
        } else {
            warn!("no trainer parameters at {}, keeping current settings", sidecar.display());
        }

        for slot in &mut self.slots {
            match slot.policy.as_mut() {
                Some(policy) => self.global.pull_into(policy.as_mut())?,
                None => slot.stats.request_resync(),
            }
        }

        info!("loaded model from {}", path.display());
        Ok(())
    }

    fn apply_sidecar(&mut self, params: &ParamFile) {
        params.apply("learning_rate", &mut self.config.learning_rate);
        params.apply("gamma", &mut self.config.gamma);

        let mut sync_frequency = self.config.sync_frequency;
        if params.apply("sync_frequency", &mut sync_frequency) {
            self.set_sync_frequency(sync_frequency);
        }

        let mut sharing = self.config.experience_sharing;
        let mut buffer_size = self.config.shared_buffer_size;
        let sharing_set = params.apply("experience_sharing", &mut sharing);
        let size_set = params.apply("shared_buffer_size", &mut buffer_size);
        if sharing_set || size_set {
            self.set_experience_sharing(sharing, buffer_size);
        }

        if let Some(name) = params.get("algorithm") {
            match name.parse() {
                Ok(kind) => self.config.algorithm = kind,
                Err(_) => warn!("unknown algorithm '{}' in trainer parameters, keeping {}", name, self.config.algorithm),
            }
        }

        if let Some(num_workers) = params.get_parsed::<usize>("num_workers") {
            if num_workers != self.slots.len() {
                warn!(
                    "model was saved with {} workers, keeping {}",
                    num_workers,
                    self.slots.len()
                );
            }
        }

        for key in ALGORITHM_KEYS {
            if let Some(value) = params.get_parsed::<f32>(key) {
                self.config.algorithm_params.insert(key.to_string(), value);
            }
        }
    }

    /// Apply trainer keys (`learning_rate`, `gamma`, `sync_frequency`) now and store
    /// algorithm keys for the next spawned workers. Unknown keys are ignored.
    pub fn set_hyperparameters(&mut self, params: &Hyperparameters) {
        for (key, &value) in params {
            match key.as_str() {
                "learning_rate" => {
                    if value > 0.0 && value.is_finite() {
                        self.config.learning_rate = value;
                    } else {
                        warn!("ignoring learning_rate {}", value);
                    }
                }
                "gamma" => {
                    if (0.0..=1.0).contains(&value) {
                        self.config.gamma = value;
                    } else {
                        warn!("ignoring gamma {}", value);
                    }
                }
                "sync_frequency" => self.set_sync_frequency(value.round() as usize),
                other if ALGORITHM_KEYS.contains(&other) => {
                    self.config.algorithm_params.insert(other.to_string(), value);
                }
                other => debug!("ignoring unknown hyperparameter '{}'", other),
            }
        }
    }

    /// Select the algorithm for the next spawned workers
    pub fn set_algorithm(&mut self, name: &str) -> bool {
        match name.parse::<AlgorithmKind>() {
            Ok(kind) => {
                if self.is_running() && kind != self.config.algorithm {
                    info!("running workers keep {}; {} applies from the next start", self.config.algorithm, kind);
                }
                self.config.algorithm = kind;
                true
            }
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// Toggle experience sharing. A non-zero `buffer_size` different from the current
    /// capacity replaces the shared buffer.
    pub fn set_experience_sharing(&mut self, enabled: bool, buffer_size: usize) {
        self.config.experience_sharing = enabled;
        self.live.experience_sharing.store(enabled, Ordering::Relaxed);

        if buffer_size > 0 && buffer_size != self.config.shared_buffer_size {
            self.config.shared_buffer_size = buffer_size;
            *self.shared_buffer.lock() = ExperienceBuffer::new(buffer_size);
            debug!("shared buffer resized to {}", buffer_size);
        }
    }

    /// Steps between synchronizations; values below 1 are raised to 1
    pub fn set_sync_frequency(&mut self, steps: usize) {
        let steps = steps.max(1);
        self.config.sync_frequency = steps;
        self.live.sync_frequency.store(steps, Ordering::Relaxed);
    }

    /// Enable or disable curiosity for the next spawned workers
    pub fn set_curiosity(&mut self, config: Option<CuriosityConfig>) -> bool {
        if let Some(config) = &config {
            if let Err(e) = config.validate() {
                warn!("rejecting curiosity settings: {}", e);
                return false;
            }
        }
        self.config.curiosity = config;
        true
    }

    /// Pull the global weights into worker `id`: immediately when idle, at the next
    /// checkpoint when running
    pub fn synchronize_worker(&mut self, id: usize) -> Result<()> {
        let slot = self.slots.get_mut(id).ok_or_else(|| {
            TrainerError::invalid_parameter("worker".to_string(), format!("no worker with id {}", id))
        })?;

        match slot.policy.as_mut() {
            Some(policy) => self.global.pull_into(policy.as_mut()),
            None => {
                slot.stats.request_resync();
                Ok(())
            }
        }
    }

    pub fn global_weights(&self) -> Vec<f32> {
        self.global.weights()
    }

    /// Weights of an idle worker; `None` while it runs or for an unknown id
    pub fn worker_weights(&self, id: usize) -> Option<Vec<f32>> {
        self.slots
            .get(id)
            .and_then(|slot| slot.policy.as_ref())
            .map(|policy| policy.get_weights())
    }

    pub fn worker_stats(&self) -> Vec<WorkerStatus> {
        self.slots
            .iter()
            .map(|slot| {
                let mut status = slot.stats.snapshot();
                status.running = slot.is_active();
                status
            })
            .collect()
    }

    pub fn status(&self) -> TrainerStatus {
        let workers = self.worker_stats();
        let (shared_buffer_len, shared_buffer_capacity) = {
            let buffer = self.shared_buffer.lock();
            (buffer.len(), buffer.capacity())
        };

        TrainerStatus {
            algorithm: self.config.algorithm,
            running: workers.iter().any(|w| w.running),
            num_workers: self.slots.len(),
            active_workers: workers.iter().filter(|w| w.running).count(),
            experience_sharing: self.live.experience_sharing(),
            shared_buffer_len,
            shared_buffer_capacity,
            sync_frequency: self.live.sync_frequency(),
            learning_rate: self.config.learning_rate,
            gamma: self.config.gamma,
            total_episodes: self.counters.episodes(),
            total_steps: self.counters.steps(),
            total_reward: self.counters.reward(),
            average_reward: self.counters.average_reward(),
            global_version: self.global.version(),
            workers,
        }
    }

    /// Human-readable status report
    pub fn get_status(&self) -> String {
        self.status().to_string()
    }

    pub fn shared_buffer_len(&self) -> usize {
        self.shared_buffer.lock().len()
    }

    pub fn sample_shared(&self, batch_size: usize) -> Vec<Experience> {
        self.shared_buffer.lock().sample(batch_size)
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn global(&self) -> &SharedPolicy {
        &self.global
    }

    pub fn num_workers(&self) -> usize {
        self.slots.len()
    }
}

impl Drop for DistributedTrainer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{ArcadeConfig, SimulatedArcade};
    use crate::policy::LinearPolicy;
    use tempfile::tempdir;

    fn arcade() -> ArcadeConfig {
        ArcadeConfig {
            width: 4,
            height: 3,
            num_buttons: 2,
            episode_length: 15,
            termination_probability: 0.0,
            seed: Some(11),
            ..ArcadeConfig::default()
        }
    }

    fn trainer(num_workers: usize) -> DistributedTrainer {
        let config = arcade();
        let policy = LinearPolicy::with_seed(config.width * config.height, 4 + config.num_buttons, 5);
        DistributedTrainer::new(Box::new(policy), SimulatedArcade::factory(config), num_workers)
    }

    #[test]
    fn test_new_clamps_workers() {
        let trainer = trainer(0);
        assert_eq!(trainer.num_workers(), 1);
        assert!(!trainer.is_running());
        assert_eq!(trainer.worker_weights(0), Some(trainer.global_weights()));
        assert!(trainer.worker_weights(1).is_none());
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut trainer = trainer(2);
        trainer.stop();
        assert!(!trainer.is_running());
        assert_eq!(trainer.status().total_episodes, 0);
    }

    #[test]
    fn test_setters() {
        let mut trainer = trainer(2);

        assert!(trainer.set_algorithm("ppo"));
        assert!(!trainer.set_algorithm("PPO"));
        assert_eq!(trainer.config().algorithm, AlgorithmKind::Ppo);

        trainer.set_sync_frequency(0);
        assert_eq!(trainer.status().sync_frequency, 1);

        let mut params = Hyperparameters::new();
        params.insert("learning_rate".to_string(), 0.01);
        params.insert("gamma".to_string(), 2.0);
        params.insert("clip_epsilon".to_string(), 0.1);
        params.insert("momentum".to_string(), 0.9);
        trainer.set_hyperparameters(&params);
        assert_eq!(trainer.config().learning_rate, 0.01);
        assert_eq!(trainer.config().gamma, 0.99);
        assert_eq!(trainer.config().algorithm_params.get("clip_epsilon"), Some(&0.1));
        assert!(!trainer.config().algorithm_params.contains_key("momentum"));

        trainer.set_experience_sharing(false, 0);
        assert!(!trainer.status().experience_sharing);
        assert_eq!(trainer.status().shared_buffer_capacity, 10_000);
        trainer.set_experience_sharing(true, 32);
        assert_eq!(trainer.status().shared_buffer_capacity, 32);

        let bad = CuriosityConfig {
            feature_dim: 0,
            ..CuriosityConfig::default()
        };
        assert!(!trainer.set_curiosity(Some(bad)));
        assert!(trainer.set_curiosity(Some(CuriosityConfig::default())));
    }

    #[test]
    fn test_worker_hyperparameters() {
        let mut trainer = trainer(4);
        trainer.set_sync_frequency(7);
        let params = trainer.worker_hyperparameters();
        assert_eq!(params.get("update_frequency"), Some(&7.0));
        assert_eq!(params.get("learning_rate"), Some(&3e-4));

        trainer.set_algorithm("ppo");
        let params = trainer.worker_hyperparameters();
        assert_eq!(params.get("publish_rate"), Some(&0.25));
        assert_eq!(params.get("clip_epsilon"), Some(&0.2));
    }

    #[test]
    fn test_synchronize_idle_worker() {
        let mut trainer = trainer(2);
        let zeros = vec![0.0; trainer.global_weights().len()];
        trainer.global().set_weights(&zeros).unwrap();

        trainer.synchronize_worker(1).unwrap();
        assert_eq!(trainer.worker_weights(1), Some(zeros));
        assert_ne!(trainer.worker_weights(0), trainer.worker_weights(1));
        assert!(trainer.synchronize_worker(5).is_err());
    }

    #[test]
    fn test_runs_to_target() {
        let mut trainer = trainer(2);
        trainer.start(2).unwrap();
        trainer.wait().unwrap();

        let status = trainer.status();
        assert!(!status.running);
        assert_eq!(status.total_episodes, 4);
        assert!(status.total_steps >= 60);
        assert_eq!(status.total_steps, status.workers.iter().map(|w| w.steps_completed).sum::<u64>());
        assert!(status.global_version > 0);
        assert!(status.workers.iter().all(|w| w.episodes_completed == 2));
    }

    #[test]
    fn test_save_load_resyncs_idle_workers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model");

        let mut trainer = trainer(2);
        trainer.set_sync_frequency(9);
        trainer.set_algorithm("ppo");
        let saved = trainer.global_weights();
        trainer.save_model(&path).unwrap();
        assert!(sidecar_path(&path, SIDECAR_EXTENSION).exists());

        let mut other = self::trainer(2);
        let zeros = vec![0.0; saved.len()];
        other.global().set_weights(&zeros).unwrap();
        other.load_model(&path).unwrap();

        assert_eq!(other.global_weights(), saved);
        assert_eq!(other.worker_weights(0), Some(saved.clone()));
        assert_eq!(other.worker_weights(1), Some(saved));
        assert_eq!(other.config().sync_frequency, 9);
        assert_eq!(other.config().algorithm, AlgorithmKind::Ppo);
    }

    #[test]
    fn test_failed_weight_load_keeps_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model");

        let mut saved = trainer(2);
        saved.set_sync_frequency(13);
        saved.set_algorithm("ppo");
        saved.save_model(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let mut other = trainer(2);
        let before = other.config().clone();
        assert!(other.load_model(&path).is_err());
        assert_eq!(other.config(), &before);
        assert_ne!(other.config().sync_frequency, 13);
    }

    #[test]
    fn test_load_missing_model_fails() {
        let dir = tempdir().unwrap();
        let mut trainer = trainer(1);
        assert!(trainer.load_model(&dir.path().join("absent")).is_err());
    }
}
