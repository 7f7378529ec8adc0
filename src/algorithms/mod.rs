//! # Training Algorithms
//!
//! A worker drives its environment and hands every transition to a
//! [`TrainingAlgorithm`], which decides when to learn from what it has collected
//! and how to exchange weights with the global policy.
//!
//! ## Available Algorithms
//!
//! - **ClippedActorCritic** (`"ppo"`)
//!   - On-policy; trains at episode end once enough steps are collected
//!   - Generalized advantage estimation, several epochs of shuffled minibatches
//!   - Clipped surrogate objective keeps each update close to the behaviour policy
//!   - Publishes into the global policy by parameter averaging
//!
//! - **AsyncActorCritic** (`"a3c"`)
//!   - Cuts the episode into short segments with discounted n-step returns
//!   - Applies each segment as an unclipped gradient step on the global policy,
//!     then pulls the global weights back
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use arcade_rl::algorithms::{default_hyperparameters, Algorithm, AlgorithmKind, TrainingAlgorithm};
//! use arcade_rl::policy::LinearPolicy;
//!
//! let kind: AlgorithmKind = "ppo".parse().unwrap();
//! let policy = Box::new(LinearPolicy::new(192, 10));
//! let mut algorithm = Algorithm::new(kind, policy, &default_hyperparameters(kind));
//!
//! let report = algorithm
//!     .process_step(&[0.0; 192], &[0.0; 10], 1.0, &[0.0; 192], false)
//!     .unwrap();
//! assert!(!report.synced);
//! ```

pub mod a3c;
pub mod advantage;
pub mod ppo;

pub use a3c::AsyncActorCritic;
pub use advantage::{compute_discounted_returns, compute_gae, normalize_advantages};
pub use ppo::{ClippedActorCritic, Phase};

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, TrainerError};
use crate::params::{sidecar_path, ParamFile};
use crate::policy::{Policy, SharedPolicy};
use crate::replay_buffer::Experience;

/// Named numeric hyperparameters
pub type Hyperparameters = BTreeMap<String, f32>;

/// Keys every algorithm understands
pub const COMMON_KEYS: &[&str] = &["learning_rate", "gamma"];

/// Algorithm-specific keys accepted by at least one algorithm
pub const ALGORITHM_KEYS: &[&str] = &[
    "clip_epsilon",
    "vf_coeff",
    "entropy_coeff",
    "lambda",
    "epochs",
    "update_frequency",
    "min_batch_size",
    "minibatch_size",
    "publish_rate",
];

/// Selects one of the concrete algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    Ppo,
    A3c,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 2] = [AlgorithmKind::Ppo, AlgorithmKind::A3c];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::Ppo => "ppo",
            AlgorithmKind::A3c => "a3c",
        }
    }
}

impl Default for AlgorithmKind {
    fn default() -> Self {
        AlgorithmKind::A3c
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmKind {
    type Err = TrainerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ppo" => Ok(AlgorithmKind::Ppo),
            "a3c" => Ok(AlgorithmKind::A3c),
            other => Err(TrainerError::invalid_parameter(
                "algorithm".to_string(),
                format!("unknown algorithm '{}', expected one of {:?}", other, available_algorithms()),
            )),
        }
    }
}

/// Names accepted by `AlgorithmKind::from_str`
pub fn available_algorithms() -> Vec<&'static str> {
    AlgorithmKind::ALL.iter().map(|kind| kind.as_str()).collect()
}

/// Default hyperparameters of `kind`
pub fn default_hyperparameters(kind: AlgorithmKind) -> Hyperparameters {
    let entries: &[(&str, f32)] = match kind {
        AlgorithmKind::Ppo => &[
            ("learning_rate", 3e-4),
            ("gamma", 0.99),
            ("clip_epsilon", 0.2),
            ("vf_coeff", 0.5),
            ("entropy_coeff", 0.01),
            ("lambda", 0.95),
            ("epochs", 4.0),
            ("update_frequency", 4.0),
        ],
        AlgorithmKind::A3c => &[
            ("learning_rate", 1e-4),
            ("gamma", 0.99),
            ("vf_coeff", 0.5),
            ("entropy_coeff", 0.01),
            ("update_frequency", 20.0),
        ],
    };
    entries.iter().map(|&(k, v)| (k.to_string(), v)).collect()
}

/// Result of feeding one transition to an algorithm
#[derive(Debug, Clone)]
pub struct StepReport {
    /// The stored transition, including the policy's value and log-probability
    pub experience: Experience,
    /// The local policy was synchronized with the global policy during this step
    pub synced: bool,
    /// Loss of the training pass this step triggered, if any
    pub loss: Option<f32>,
}

/// Common contract of the training algorithms.
///
/// An algorithm owns the local policy it trains. When a global policy is attached
/// it also owns the protocol for exchanging weights with it.
pub trait TrainingAlgorithm: Send {
    fn kind(&self) -> AlgorithmKind;

    /// Record one transition, possibly triggering a training pass
    fn process_step(
        &mut self,
        state: &[f32],
        action: &[f32],
        reward: f32,
        next_state: &[f32],
        done: bool,
    ) -> Result<StepReport>;

    /// Compute advantages and returns for `batch` in place and learn from it.
    /// An empty batch is a no-op returning 0.
    fn train(&mut self, batch: &mut [Experience]) -> Result<f32>;

    /// Pull the global weights into the local policy. No-op without a global policy.
    fn synchronize(&mut self) -> Result<()>;

    /// Periodic exchange with the global policy in the middle of an episode
    fn sync_with_global(&mut self) -> Result<()>;

    /// Learn from whatever the current episode left behind
    fn finish_episode(&mut self) -> Result<Option<f32>>;

    /// Drop the steps of an abandoned episode without learning from them
    fn discard_pending(&mut self);

    fn attach_global(&mut self, global: SharedPolicy);

    fn global(&self) -> Option<&SharedPolicy>;

    /// Apply the recognized keys of `params`; unknown keys are ignored
    fn set_hyperparameters(&mut self, params: &Hyperparameters);

    fn hyperparameters(&self) -> Hyperparameters;

    fn learning_rate(&self) -> f32;

    fn policy(&self) -> &dyn Policy;

    fn policy_mut(&mut self) -> &mut dyn Policy;

    /// Hyperparameters to `<path>.params`, weights to `<path>.policy`
    fn save(&self, path: &Path) -> Result<()> {
        save_params(self.kind(), &self.hyperparameters(), path)?;
        self.policy().save(&sidecar_path(path, "policy"))
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let params = load_params(self.kind(), path)?;
        self.set_hyperparameters(&params);
        self.policy_mut().load(&sidecar_path(path, "policy"))
    }
}

pub(crate) fn save_params(kind: AlgorithmKind, params: &Hyperparameters, path: &Path) -> Result<()> {
    let mut file = ParamFile::new();
    file.set("algorithm", kind);
    for (key, value) in params {
        file.set(key, value);
    }
    file.write(&sidecar_path(path, "params"))
}

pub(crate) fn load_params(kind: AlgorithmKind, path: &Path) -> Result<Hyperparameters> {
    let file = ParamFile::read(&sidecar_path(path, "params"))?;

    if let Some(saved) = file.get("algorithm") {
        if saved != kind.as_str() {
            return Err(TrainerError::invalid_parameter(
                "algorithm".to_string(),
                format!("file was saved by '{}', loading into '{}'", saved, kind),
            ));
        }
    }

    let mut params = Hyperparameters::new();
    for key in file.keys().filter(|&k| k != "algorithm") {
        match file.get_parsed::<f32>(key) {
            Some(value) => {
                params.insert(key.to_string(), value);
            }
            None => warn!("ignoring non-numeric hyperparameter '{}'", key),
        }
    }
    Ok(params)
}

/// Read a positive integer-valued hyperparameter
pub(crate) fn positive_count(params: &Hyperparameters, key: &str) -> Option<usize> {
    params
        .get(key)
        .filter(|v| v.is_finite())
        .map(|&v| v.round().max(1.0) as usize)
}

/// Read a finite hyperparameter
pub(crate) fn finite(params: &Hyperparameters, key: &str) -> Option<f32> {
    params.get(key).copied().filter(|v| v.is_finite())
}

/// One concrete algorithm, chosen once per worker
pub enum Algorithm {
    Clipped(ClippedActorCritic),
    Async(AsyncActorCritic),
}

macro_rules! dispatch {
    ($self:expr, $alg:ident => $body:expr) => {
        match $self {
            Algorithm::Clipped($alg) => $body,
            Algorithm::Async($alg) => $body,
        }
    };
}

impl Algorithm {
    pub fn new(kind: AlgorithmKind, policy: Box<dyn Policy>, params: &Hyperparameters) -> Self {
        match kind {
            AlgorithmKind::Ppo => {
                let mut alg = ClippedActorCritic::new(policy);
                alg.set_hyperparameters(params);
                Algorithm::Clipped(alg)
            }
            AlgorithmKind::A3c => {
                let mut alg = AsyncActorCritic::new(policy);
                alg.set_hyperparameters(params);
                Algorithm::Async(alg)
            }
        }
    }

    /// Hand back the local policy
    pub fn into_policy(self) -> Box<dyn Policy> {
        dispatch!(self, alg => alg.into_policy())
    }
}

impl TrainingAlgorithm for Algorithm {
    fn kind(&self) -> AlgorithmKind {
        dispatch!(self, alg => alg.kind())
    }

    fn process_step(
        &mut self,
        state: &[f32],
        action: &[f32],
        reward: f32,
        next_state: &[f32],
        done: bool,
    ) -> Result<StepReport> {
        dispatch!(self, alg => alg.process_step(state, action, reward, next_state, done))
    }

    fn train(&mut self, batch: &mut [Experience]) -> Result<f32> {
        dispatch!(self, alg => alg.train(batch))
    }

    fn synchronize(&mut self) -> Result<()> {
        dispatch!(self, alg => alg.synchronize())
    }

    fn sync_with_global(&mut self) -> Result<()> {
        dispatch!(self, alg => alg.sync_with_global())
    }

    fn finish_episode(&mut self) -> Result<Option<f32>> {
        dispatch!(self, alg => alg.finish_episode())
    }

    fn discard_pending(&mut self) {
        dispatch!(self, alg => alg.discard_pending())
    }

    fn attach_global(&mut self, global: SharedPolicy) {
        dispatch!(self, alg => alg.attach_global(global))
    }

    fn global(&self) -> Option<&SharedPolicy> {
        dispatch!(self, alg => alg.global())
    }

    fn set_hyperparameters(&mut self, params: &Hyperparameters) {
        dispatch!(self, alg => alg.set_hyperparameters(params))
    }

    fn hyperparameters(&self) -> Hyperparameters {
        dispatch!(self, alg => alg.hyperparameters())
    }

    fn learning_rate(&self) -> f32 {
        dispatch!(self, alg => alg.learning_rate())
    }

    fn policy(&self) -> &dyn Policy {
        dispatch!(self, alg => alg.policy())
    }

    fn policy_mut(&mut self) -> &mut dyn Policy {
        dispatch!(self, alg => alg.policy_mut())
    }

    fn save(&self, path: &Path) -> Result<()> {
        dispatch!(self, alg => alg.save(path))
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        dispatch!(self, alg => alg.load(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::LinearPolicy;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("ppo".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::Ppo);
        assert_eq!("a3c".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::A3c);
        assert!("PPO".parse::<AlgorithmKind>().is_err());
        assert!("dqn".parse::<AlgorithmKind>().is_err());
        assert_eq!(AlgorithmKind::A3c.to_string(), "a3c");
        assert_eq!(available_algorithms(), vec!["ppo", "a3c"]);
    }

    #[test]
    fn test_default_tables() {
        let ppo = default_hyperparameters(AlgorithmKind::Ppo);
        assert_eq!(ppo["learning_rate"], 3e-4);
        assert_eq!(ppo["epochs"], 4.0);
        assert_eq!(ppo["lambda"], 0.95);

        let a3c = default_hyperparameters(AlgorithmKind::A3c);
        assert_eq!(a3c["learning_rate"], 1e-4);
        assert_eq!(a3c["update_frequency"], 20.0);
        assert!(!a3c.contains_key("clip_epsilon"));
    }

    #[test]
    fn test_factory_applies_parameters() {
        let mut params = default_hyperparameters(AlgorithmKind::Ppo);
        params.insert("gamma".to_string(), 0.5);
        let alg = Algorithm::new(AlgorithmKind::Ppo, Box::new(LinearPolicy::new(3, 2)), &params);
        assert_eq!(alg.kind(), AlgorithmKind::Ppo);
        assert_eq!(alg.hyperparameters()["gamma"], 0.5);

        let policy = alg.into_policy();
        assert_eq!(policy.get_weights().len(), 3 * 2 + 2 + 3 + 1);
    }
}
