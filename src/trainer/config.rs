use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::algorithms::AlgorithmKind;
use crate::curiosity::CuriosityConfig;
use crate::error::{Result, TrainerError};

/// Settings of a distributed training run.
///
/// Missing fields in a JSON file take their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub num_workers: usize,
    pub algorithm: AlgorithmKind,
    pub learning_rate: f32,
    pub gamma: f32,
    /// Steps between exchanges with the global policy
    pub sync_frequency: usize,
    pub experience_sharing: bool,
    pub shared_buffer_size: usize,
    /// Episodes are cut after this many steps
    pub max_steps_per_episode: usize,
    /// Algorithm-specific hyperparameters forwarded to every worker
    pub algorithm_params: BTreeMap<String, f32>,
    /// Pause after a failed episode
    pub error_backoff_ms: u64,
    /// Pause between environment steps
    pub step_delay_ms: u64,
    pub curiosity: Option<CuriosityConfig>,
    /// PPO workers replay shared experience every this many episodes
    pub shared_replay_interval: usize,
    pub shared_replay_batch: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            num_workers: 4,
            algorithm: AlgorithmKind::A3c,
            learning_rate: 3e-4,
            gamma: 0.99,
            sync_frequency: 5,
            experience_sharing: true,
            shared_buffer_size: 10_000,
            max_steps_per_episode: 10_000,
            algorithm_params: BTreeMap::new(),
            error_backoff_ms: 50,
            step_delay_ms: 0,
            curiosity: None,
            shared_replay_interval: 5,
            shared_replay_batch: 64,
        }
    }
}

impl TrainerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: TrainerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(TrainerError::invalid_parameter("num_workers", "must be at least 1"));
        }
        if self.sync_frequency == 0 {
            return Err(TrainerError::invalid_parameter("sync_frequency", "must be at least 1"));
        }
        if self.max_steps_per_episode == 0 {
            return Err(TrainerError::invalid_parameter("max_steps_per_episode", "must be at least 1"));
        }
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(TrainerError::invalid_parameter(
                "learning_rate".to_string(),
                format!("{} is not a positive finite number", self.learning_rate),
            ));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(TrainerError::invalid_parameter(
                "gamma".to_string(),
                format!("{} is outside [0, 1]", self.gamma),
            ));
        }
        if self.experience_sharing && self.shared_buffer_size == 0 {
            return Err(TrainerError::invalid_parameter(
                "shared_buffer_size",
                "must be positive when experience sharing is enabled",
            ));
        }
        if let Some(curiosity) = &self.curiosity {
            curiosity.validate()?;
        }
        Ok(())
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn step_delay(&self) -> Option<Duration> {
        if self.step_delay_ms > 0 {
            Some(Duration::from_millis(self.step_delay_ms))
        } else {
            None
        }
    }
}
