use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::metrics::WorkerStatus;
use crate::sync::AtomicF32;

/// Counters of one worker, written by its thread and read by the controller
#[derive(Debug, Default)]
pub struct WorkerStats {
    id: usize,
    episodes_completed: AtomicU64,
    steps_completed: AtomicU64,
    total_reward: AtomicF32,
    failed_episodes: AtomicU64,
    running: AtomicBool,
    resync_requested: AtomicBool,
}

impl WorkerStats {
    pub fn new(id: usize) -> Self {
        WorkerStats {
            id,
            ..Default::default()
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Zero the episode, step, reward and failure counters
    pub fn reset(&self) {
        self.episodes_completed.store(0, Ordering::Relaxed);
        self.steps_completed.store(0, Ordering::Relaxed);
        self.total_reward.store(0.0, Ordering::Relaxed);
        self.failed_episodes.store(0, Ordering::Relaxed);
    }

    pub fn record_step(&self) {
        self.steps_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_episode(&self, reward: f32) {
        self.total_reward.fetch_add(reward, Ordering::Relaxed);
        self.episodes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_episodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the worker to pull the global weights at its next checkpoint
    pub fn request_resync(&self) {
        self.resync_requested.store(true, Ordering::Release);
    }

    /// Consume a pending resync request
    pub fn take_resync_request(&self) -> bool {
        self.resync_requested.swap(false, Ordering::AcqRel)
    }

    pub fn episodes_completed(&self) -> u64 {
        self.episodes_completed.load(Ordering::Relaxed)
    }

    pub fn steps_completed(&self) -> u64 {
        self.steps_completed.load(Ordering::Relaxed)
    }

    pub fn total_reward(&self) -> f32 {
        self.total_reward.load(Ordering::Relaxed)
    }

    pub fn failed_episodes(&self) -> u64 {
        self.failed_episodes.load(Ordering::Relaxed)
    }

    pub fn average_reward(&self) -> f32 {
        average(self.total_reward(), self.episodes_completed())
    }

    pub fn snapshot(&self) -> WorkerStatus {
        WorkerStatus {
            id: self.id,
            running: self.is_running(),
            episodes_completed: self.episodes_completed(),
            steps_completed: self.steps_completed(),
            total_reward: self.total_reward(),
            average_reward: self.average_reward(),
            failed_episodes: self.failed_episodes(),
        }
    }
}

/// Totals across all workers since the last `start`
#[derive(Debug, Default)]
pub struct TrainingCounters {
    episodes: AtomicU64,
    steps: AtomicU64,
    reward: AtomicF32,
}

impl TrainingCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.episodes.store(0, Ordering::Relaxed);
        self.steps.store(0, Ordering::Relaxed);
        self.reward.store(0.0, Ordering::Relaxed);
    }

    pub fn record_step(&self) {
        self.steps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_episode(&self, reward: f32) {
        self.reward.fetch_add(reward, Ordering::Relaxed);
        self.episodes.fetch_add(1, Ordering::Relaxed);
    }

    /// Take one worker's counters back out of the totals before its stats are reset
    pub fn discount(&self, stats: &WorkerStats) {
        self.episodes.fetch_sub(stats.episodes_completed(), Ordering::Relaxed);
        self.steps.fetch_sub(stats.steps_completed(), Ordering::Relaxed);
        self.reward.fetch_add(-stats.total_reward(), Ordering::Relaxed);
    }

    pub fn episodes(&self) -> u64 {
        self.episodes.load(Ordering::Relaxed)
    }

    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    pub fn reward(&self) -> f32 {
        self.reward.load(Ordering::Relaxed)
    }

    pub fn average_reward(&self) -> f32 {
        average(self.reward(), self.episodes())
    }
}

fn average(total: f32, count: u64) -> f32 {
    if count > 0 {
        total / count as f32
    } else {
        0.0
    }
}
