//! # Policy capability
//!
//! The training engine never looks inside a model. Everything it needs from one is
//! expressed by the [`Policy`] trait: acting, value estimation, a gradient step on a
//! batch, and weight transfer between copies. Workers own plain `Box<dyn Policy>`
//! clones; the single global model is only reachable through [`SharedPolicy`].
//!
//! [`LinearPolicy`] is a small ndarray-backed implementation with analytic
//! gradients, used by the demos and tests.

pub mod linear;
pub mod shared;

pub use linear::LinearPolicy;
pub use shared::SharedPolicy;

use std::path::Path;

use crate::error::Result;
use crate::replay_buffer::Experience;

/// Columns of a training batch, borrowed from a slice of experiences.
///
/// `returns` is read from `Experience::value`, which holds the target return once
/// advantages have been computed.
#[derive(Debug, Clone, Default)]
pub struct PolicyBatch<'a> {
    pub states: Vec<&'a [f32]>,
    pub actions: Vec<&'a [f32]>,
    pub old_log_probs: Vec<f32>,
    pub advantages: Vec<f32>,
    pub returns: Vec<f32>,
}

impl<'a> PolicyBatch<'a> {
    pub fn from_experiences(experiences: &'a [Experience]) -> Self {
        Self::from_iter(experiences.iter())
    }

    pub fn from_refs(experiences: &[&'a Experience]) -> Self {
        Self::from_iter(experiences.iter().copied())
    }

    fn from_iter<I: Iterator<Item = &'a Experience>>(experiences: I) -> Self {
        let mut batch = PolicyBatch::default();
        for exp in experiences {
            batch.states.push(exp.state.as_slice());
            batch.actions.push(exp.action.as_slice());
            batch.old_log_probs.push(exp.log_prob);
            batch.advantages.push(exp.advantage);
            batch.returns.push(exp.value);
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Coefficients of one gradient step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateParams {
    /// Clip range of the surrogate objective; `None` for the unclipped policy gradient
    pub clip_epsilon: Option<f32>,
    pub value_coeff: f32,
    pub entropy_coeff: f32,
    pub learning_rate: f32,
}

impl UpdateParams {
    pub fn clipped(clip_epsilon: f32, value_coeff: f32, entropy_coeff: f32, learning_rate: f32) -> Self {
        UpdateParams {
            clip_epsilon: Some(clip_epsilon),
            value_coeff,
            entropy_coeff,
            learning_rate,
        }
    }

    pub fn unclipped(value_coeff: f32, entropy_coeff: f32, learning_rate: f32) -> Self {
        UpdateParams {
            clip_epsilon: None,
            value_coeff,
            entropy_coeff,
            learning_rate,
        }
    }

    /// Same coefficients with the learning rate scaled by `factor`
    pub fn scaled_learning_rate(mut self, factor: f32) -> Self {
        self.learning_rate *= factor;
        self
    }
}

/// A trainable actor-critic model.
///
/// Implementations must be `Send` so a clone can move onto a worker thread; they do
/// not need to be `Sync` because every shared use goes through [`SharedPolicy`].
pub trait Policy: Send {
    /// Choose an action for `state`; `explore` samples instead of taking the greedy action
    fn predict(&mut self, state: &[f32], explore: bool) -> Result<Vec<f32>>;

    /// Critic estimate of the state value
    fn value(&mut self, state: &[f32]) -> Result<f32>;

    /// Log-probability of `action` in `state` under the current weights
    fn log_prob(&mut self, state: &[f32], action: &[f32]) -> Result<f32>;

    /// One gradient step on `batch`; returns the mean loss
    fn update(&mut self, batch: &PolicyBatch<'_>, params: &UpdateParams) -> Result<f32>;

    /// Deep copy with independent weights
    fn boxed_clone(&self) -> Box<dyn Policy>;

    /// Flattened parameters
    fn get_weights(&self) -> Vec<f32>;

    fn set_weights(&mut self, weights: &[f32]) -> Result<()>;

    /// Overwrite this policy's weights with `other`'s
    fn copy_from(&mut self, other: &dyn Policy) -> Result<()> {
        self.set_weights(&other.get_weights())
    }

    fn save(&self, path: &Path) -> Result<()>;

    fn load(&mut self, path: &Path) -> Result<()>;
}
