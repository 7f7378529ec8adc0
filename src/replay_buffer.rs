use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Added to every explicitly set priority so no entry reaches zero probability
pub const PRIORITY_EPSILON: f32 = 1e-5;

/// One environment transition.
///
/// `value` starts as the critic's estimate for `state` and is overwritten with the
/// target return once advantages are computed; `advantage` is only meaningful after
/// that pass.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Experience {
    pub state: Vec<f32>,
    pub action: Vec<f32>,
    pub reward: f32,
    pub next_state: Vec<f32>,
    pub done: bool,
    pub value: f32,
    pub advantage: f32,
    pub log_prob: f32,
}

impl Experience {
    pub fn new(
        state: Vec<f32>,
        action: Vec<f32>,
        reward: f32,
        next_state: Vec<f32>,
        done: bool,
    ) -> Self {
        Experience {
            state,
            action,
            reward,
            next_state,
            done,
            value: 0.0,
            advantage: 0.0,
            log_prob: 0.0,
        }
    }

    /// Attach the policy's value estimate and action log-probability
    pub fn with_estimates(mut self, value: f32, log_prob: f32) -> Self {
        self.value = value;
        self.log_prob = log_prob;
        self
    }
}

/// Capacity-bounded experience store with optional prioritized sampling.
///
/// Eviction is strict FIFO: once `capacity` items are held, adding a new one drops
/// the oldest item together with its priority. In prioritized mode `priorities` is
/// index-aligned with `items` at all times.
#[derive(Clone, Debug)]
pub struct ExperienceBuffer {
    items: VecDeque<Experience>,
    priorities: VecDeque<f32>,
    capacity: usize,
    prioritized: bool,
    alpha: f32,
    beta: f32,
    /// Cached maximum of `priorities`; `None` when it has to be recomputed
    max_priority: Option<f32>,
}

impl ExperienceBuffer {
    /// Create a buffer that samples uniformly
    pub fn new(capacity: usize) -> Self {
        ExperienceBuffer {
            items: VecDeque::with_capacity(capacity),
            priorities: VecDeque::new(),
            capacity,
            prioritized: false,
            alpha: 0.6,
            beta: 0.4,
            max_priority: None,
        }
    }

    /// Create a buffer that samples proportionally to `priority^alpha`
    pub fn with_prioritization(capacity: usize, alpha: f32, beta: f32) -> Self {
        let mut buffer = ExperienceBuffer::new(capacity);
        buffer.set_prioritized_replay(true, alpha, beta);
        buffer
    }

    /// Switch prioritized replay on or off.
    ///
    /// Enabling on a non-empty buffer gives every stored item priority 1.0.
    pub fn set_prioritized_replay(&mut self, enabled: bool, alpha: f32, beta: f32) {
        self.prioritized = enabled;
        self.alpha = alpha;
        self.beta = beta;

        if enabled {
            if self.priorities.len() != self.items.len() {
                self.priorities = std::iter::repeat(1.0).take(self.items.len()).collect();
                self.max_priority = None;
            }
        } else {
            self.priorities.clear();
            self.max_priority = None;
        }
    }

    pub fn add(&mut self, experience: Experience) {
        if self.capacity == 0 {
            return;
        }

        if self.items.len() == self.capacity {
            self.items.pop_front();
            if let Some(evicted) = self.priorities.pop_front() {
                if Some(evicted) == self.max_priority {
                    self.max_priority = None;
                }
            }
        }

        if self.prioritized {
            // New entries get the current maximum so they are sampled at least once
            let priority = self.current_max_priority();
            self.priorities.push_back(priority);
            self.max_priority = Some(priority);
        }

        self.items.push_back(experience);
    }

    fn current_max_priority(&self) -> f32 {
        if let Some(max) = self.max_priority {
            return max;
        }
        self.priorities
            .iter()
            .copied()
            .fold(None, |acc: Option<f32>, p| Some(acc.map_or(p, |m| m.max(p))))
            .unwrap_or(1.0)
    }

    /// Draw the indices `sample` would return.
    ///
    /// Uniform mode draws without replacement; prioritized mode draws with
    /// replacement from the categorical distribution over `priority^alpha`.
    pub fn sample_indices(&self, batch_size: usize) -> Vec<usize> {
        let len = self.items.len();
        if len == 0 {
            return Vec::new();
        }

        let batch_size = batch_size.min(len);
        let mut rng = thread_rng();

        if self.prioritized {
            let weights: Vec<f32> = self.priorities.iter().map(|&p| p.powf(self.alpha)).collect();
            if let Ok(dist) = WeightedIndex::new(&weights) {
                return (0..batch_size).map(|_| dist.sample(&mut rng)).collect();
            }
            // All weights zero or non-finite: fall through to uniform sampling
        }

        let mut indices: Vec<usize> = (0..len).collect();
        indices.shuffle(&mut rng);
        indices.truncate(batch_size);
        indices
    }

    /// Sample up to `batch_size` experiences. Returns an empty vector when the buffer is empty.
    pub fn sample(&self, batch_size: usize) -> Vec<Experience> {
        self.sample_indices(batch_size)
            .into_iter()
            .map(|i| self.items[i].clone())
            .collect()
    }

    /// Importance-sampling weights `(N * P(i))^-beta`, normalized by their maximum.
    ///
    /// The buffer never applies these itself; callers that correct for prioritized
    /// sampling multiply their per-sample losses by them.
    pub fn importance_weights(&self, indices: &[usize]) -> Vec<f32> {
        if !self.prioritized || self.items.is_empty() {
            return vec![1.0; indices.len()];
        }

        let scaled: Vec<f32> = self.priorities.iter().map(|&p| p.powf(self.alpha)).collect();
        let total: f32 = scaled.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return vec![1.0; indices.len()];
        }

        let n = self.items.len() as f32;
        let mut weights: Vec<f32> = indices
            .iter()
            .map(|&i| {
                let prob = scaled.get(i).copied().unwrap_or(0.0) / total;
                if prob > 0.0 {
                    (n * prob).powf(-self.beta)
                } else {
                    0.0
                }
            })
            .collect();

        let max_weight = weights.iter().fold(0.0_f32, |max, &w| max.max(w));
        if max_weight > 0.0 {
            for w in weights.iter_mut() {
                *w /= max_weight;
            }
        }
        weights
    }

    /// Set the priority of one stored item. No-op in uniform mode or for an out-of-range index.
    pub fn set_priority(&mut self, index: usize, priority: f32) {
        if !self.prioritized || index >= self.priorities.len() {
            return;
        }

        let stored = priority.max(0.0) + PRIORITY_EPSILON;
        let previous = self.priorities[index];
        self.priorities[index] = stored;

        match self.max_priority {
            Some(max) if stored >= max => self.max_priority = Some(stored),
            Some(max) if previous == max => self.max_priority = None,
            _ => {}
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.priorities.clear();
        self.max_priority = None;
    }

    /// Remove every item in insertion order
    pub fn drain_all(&mut self) -> Vec<Experience> {
        self.priorities.clear();
        self.max_priority = None;
        self.items.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Experience> {
        self.items.get(index)
    }

    pub fn priority(&self, index: usize) -> Option<f32> {
        self.priorities.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_prioritized(&self) -> bool {
        self.prioritized
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn beta(&self) -> f32 {
        self.beta
    }
}
