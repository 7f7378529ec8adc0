use serde::{Deserialize, Serialize};
use std::fmt;

use crate::algorithms::AlgorithmKind;
use crate::error::Result;

/// Point-in-time view of one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub id: usize,
    pub running: bool,
    pub episodes_completed: u64,
    pub steps_completed: u64,
    pub total_reward: f32,
    pub average_reward: f32,
    pub failed_episodes: u64,
}

/// Point-in-time view of the trainer, read from atomics without stopping workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerStatus {
    pub algorithm: AlgorithmKind,
    pub running: bool,
    pub num_workers: usize,
    pub active_workers: usize,
    pub experience_sharing: bool,
    pub shared_buffer_len: usize,
    pub shared_buffer_capacity: usize,
    pub sync_frequency: usize,
    pub learning_rate: f32,
    pub gamma: f32,
    pub total_episodes: u64,
    pub total_steps: u64,
    pub total_reward: f32,
    pub average_reward: f32,
    /// Mutations applied to the global policy
    pub global_version: u64,
    pub workers: Vec<WorkerStatus>,
}

impl TrainerStatus {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for TrainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Distributed Training Status:")?;
        writeln!(f, "Algorithm: {}", self.algorithm)?;
        writeln!(f, "Workers: {}", self.num_workers)?;
        writeln!(f, "Active Workers: {}", self.active_workers)?;
        if self.experience_sharing {
            writeln!(
                f,
                "Experience Sharing: Enabled ({}/{})",
                self.shared_buffer_len, self.shared_buffer_capacity
            )?;
        } else {
            writeln!(f, "Experience Sharing: Disabled")?;
        }
        writeln!(f, "Sync Frequency: Every {} steps", self.sync_frequency)?;
        writeln!(f, "Episodes Completed: {}", self.total_episodes)?;
        writeln!(f, "Total Steps: {}", self.total_steps)?;
        writeln!(f, "Average Reward: {:.3}", self.average_reward)?;
        writeln!(f, "Worker Status:")?;
        for worker in &self.workers {
            writeln!(
                f,
                "  Worker {}: Episodes={}, Steps={}, Avg.Reward={:.3}{}",
                worker.id,
                worker.episodes_completed,
                worker.steps_completed,
                worker.average_reward,
                if worker.running { " (running)" } else { "" }
            )?;
        }
        Ok(())
    }
}
