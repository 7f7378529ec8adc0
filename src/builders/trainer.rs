use crate::algorithms::{AlgorithmKind, Hyperparameters};
use crate::curiosity::CuriosityConfig;
use crate::environment::EnvFactory;
use crate::error::Result;
use crate::policy::Policy;
use crate::trainer::{DistributedTrainer, TrainerConfig};

/// Builder for DistributedTrainer
pub struct DistributedTrainerBuilder {
    policy: Box<dyn Policy>,
    env_factory: EnvFactory,
    config: TrainerConfig,
}

impl DistributedTrainerBuilder {
    /// Start from the default configuration
    pub fn new(policy: Box<dyn Policy>, env_factory: EnvFactory) -> Self {
        DistributedTrainerBuilder {
            policy,
            env_factory,
            config: TrainerConfig::default(),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: TrainerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.config.num_workers = num_workers;
        self
    }

    pub fn algorithm(mut self, algorithm: AlgorithmKind) -> Self {
        self.config.algorithm = algorithm;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.config.learning_rate = learning_rate;
        self
    }

    pub fn gamma(mut self, gamma: f32) -> Self {
        self.config.gamma = gamma;
        self
    }

    pub fn sync_frequency(mut self, steps: usize) -> Self {
        self.config.sync_frequency = steps;
        self
    }

    /// Share experiences through a buffer of `buffer_size` entries
    pub fn experience_sharing(mut self, enabled: bool, buffer_size: usize) -> Self {
        self.config.experience_sharing = enabled;
        self.config.shared_buffer_size = buffer_size;
        self
    }

    pub fn max_steps_per_episode(mut self, steps: usize) -> Self {
        self.config.max_steps_per_episode = steps;
        self
    }

    /// Algorithm-specific hyperparameters, merged over earlier calls
    pub fn algorithm_params(mut self, params: &Hyperparameters) -> Self {
        self.config.algorithm_params.extend(params.iter().map(|(k, v)| (k.clone(), *v)));
        self
    }

    pub fn error_backoff_ms(mut self, millis: u64) -> Self {
        self.config.error_backoff_ms = millis;
        self
    }

    pub fn step_delay_ms(mut self, millis: u64) -> Self {
        self.config.step_delay_ms = millis;
        self
    }

    pub fn curiosity(mut self, config: CuriosityConfig) -> Self {
        self.config.curiosity = Some(config);
        self
    }

    /// PPO workers replay `batch` shared samples every `interval` episodes
    pub fn shared_replay(mut self, interval: usize, batch: usize) -> Self {
        self.config.shared_replay_interval = interval;
        self.config.shared_replay_batch = batch;
        self
    }

    /// Build the trainer, validating the configuration
    pub fn build(self) -> Result<DistributedTrainer> {
        DistributedTrainer::with_config(self.policy, self.env_factory, self.config)
    }
}
