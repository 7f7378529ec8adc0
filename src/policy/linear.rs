use bincode::{deserialize, serialize};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Result, TrainerError};
use crate::loss::{
    bernoulli_entropy, bernoulli_log_prob, clipped_surrogate, probability_ratio, sigmoid,
    ActorCriticLoss,
};
use crate::policy::{Policy, PolicyBatch, UpdateParams};

fn fresh_rng() -> StdRng {
    StdRng::from_entropy()
}

/// Linear actor-critic over a multi-binary action space.
///
/// The actor maps the observation to one logit per button and presses each button
/// independently with probability `sigmoid(logit)`. The critic is a linear value
/// head on the same observation. Gradients are computed analytically and applied
/// with plain SGD.
#[derive(Serialize, Deserialize, Clone)]
pub struct LinearPolicy {
    actor_weights: Array2<f32>,
    actor_biases: Array1<f32>,
    critic_weights: Array1<f32>,
    critic_bias: f32,
    #[serde(skip, default = "fresh_rng")]
    rng: StdRng,
}

impl LinearPolicy {
    /// Create a policy with weights drawn from U(-0.1, 0.1) and zero biases
    pub fn new(obs_dim: usize, action_dim: usize) -> Self {
        LinearPolicy {
            actor_weights: Array2::random((obs_dim, action_dim), Uniform::new(-0.1, 0.1)),
            actor_biases: Array1::zeros(action_dim),
            critic_weights: Array1::random(obs_dim, Uniform::new(-0.1, 0.1)),
            critic_bias: 0.0,
            rng: fresh_rng(),
        }
    }

    /// Deterministic initialization and action sampling
    pub fn with_seed(obs_dim: usize, action_dim: usize, seed: u64) -> Self {
        Self::with_init_range(obs_dim, action_dim, 0.1, Some(seed))
    }

    pub(crate) fn with_init_range(obs_dim: usize, action_dim: usize, range: f32, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => fresh_rng(),
        };
        let dist = Uniform::new_inclusive(-range, range);
        LinearPolicy {
            actor_weights: Array2::random_using((obs_dim, action_dim), dist, &mut rng),
            actor_biases: Array1::zeros(action_dim),
            critic_weights: Array1::random_using(obs_dim, dist, &mut rng),
            critic_bias: 0.0,
            rng,
        }
    }

    pub fn obs_dim(&self) -> usize {
        self.actor_weights.nrows()
    }

    pub fn action_dim(&self) -> usize {
        self.actor_weights.ncols()
    }

    pub fn num_parameters(&self) -> usize {
        self.actor_weights.len() + self.actor_biases.len() + self.critic_weights.len() + 1
    }

    fn check_state(&self, state: &[f32]) -> Result<()> {
        if state.len() != self.obs_dim() {
            return Err(TrainerError::dimension_mismatch(
                format!("state of length {}", self.obs_dim()),
                format!("length {}", state.len()),
            ));
        }
        Ok(())
    }

    fn check_action(&self, action: &[f32]) -> Result<()> {
        if action.len() != self.action_dim() {
            return Err(TrainerError::dimension_mismatch(
                format!("action of length {}", self.action_dim()),
                format!("length {}", action.len()),
            ));
        }
        Ok(())
    }

    fn logits(&self, state: ArrayView1<f32>) -> Array1<f32> {
        state.dot(&self.actor_weights) + &self.actor_biases
    }

    fn critic(&self, state: ArrayView1<f32>) -> f32 {
        state.dot(&self.critic_weights) + self.critic_bias
    }

    /// Per-button press probabilities
    pub fn action_probs(&self, state: &[f32]) -> Result<Array1<f32>> {
        self.check_state(state)?;
        Ok(self.logits(ArrayView1::from(state)).mapv(sigmoid))
    }
}

impl Policy for LinearPolicy {
    fn predict(&mut self, state: &[f32], explore: bool) -> Result<Vec<f32>> {
        let probs = self.action_probs(state)?;
        let action = if explore {
            probs
                .iter()
                .map(|&p| if self.rng.gen::<f32>() < p { 1.0 } else { 0.0 })
                .collect()
        } else {
            probs.iter().map(|&p| if p >= 0.5 { 1.0 } else { 0.0 }).collect()
        };
        Ok(action)
    }

    fn value(&mut self, state: &[f32]) -> Result<f32> {
        self.check_state(state)?;
        Ok(self.critic(ArrayView1::from(state)))
    }

    fn log_prob(&mut self, state: &[f32], action: &[f32]) -> Result<f32> {
        self.check_action(action)?;
        let probs = self.action_probs(state)?;
        Ok(bernoulli_log_prob(probs.view(), action))
    }

    fn update(&mut self, batch: &PolicyBatch<'_>, params: &UpdateParams) -> Result<f32> {
        if batch.is_empty() {
            return Ok(0.0);
        }

        let loss_fn = ActorCriticLoss {
            clip_epsilon: params.clip_epsilon,
            value_coeff: params.value_coeff,
            entropy_coeff: params.entropy_coeff,
        };

        let mut grad_actor_w = Array2::<f32>::zeros(self.actor_weights.raw_dim());
        let mut grad_actor_b = Array1::<f32>::zeros(self.actor_biases.raw_dim());
        let mut grad_critic_w = Array1::<f32>::zeros(self.critic_weights.raw_dim());
        let mut grad_critic_b = 0.0;
        let mut total_loss = 0.0;

        for i in 0..batch.len() {
            let state = batch.states[i];
            let action = batch.actions[i];
            self.check_state(state)?;
            self.check_action(action)?;

            let state = ArrayView1::from(state);
            let logits = self.logits(state);
            let probs = logits.mapv(sigmoid);
            let advantage = batch.advantages[i];
            let target_return = batch.returns[i];

            let ratio = probability_ratio(bernoulli_log_prob(probs.view(), action), batch.old_log_probs[i]);
            let value = self.critic(state);
            let entropy = bernoulli_entropy(probs.view());
            total_loss += loss_fn.compute(ratio, advantage, value, target_return, entropy).total;

            // Surrogate gradient vanishes where the clipped term is active
            let surrogate_active = match params.clip_epsilon {
                Some(eps) => !clipped_surrogate(ratio, advantage, eps).clipped,
                None => true,
            };

            let mut grad_logits = Array1::<f32>::zeros(probs.len());
            for j in 0..probs.len() {
                let p = probs[j];
                if surrogate_active {
                    grad_logits[j] -= advantage * ratio * (action[j] - p);
                }
                // d(-H)/dz = z * p * (1 - p)
                grad_logits[j] += params.entropy_coeff * logits[j] * p * (1.0 - p);
            }

            grad_actor_w += &state
                .insert_axis(Axis(1))
                .dot(&grad_logits.view().insert_axis(Axis(0)));
            grad_actor_b += &grad_logits;

            let grad_value = params.value_coeff * (value - target_return);
            grad_critic_w.scaled_add(grad_value, &state);
            grad_critic_b += grad_value;
        }

        let n = batch.len() as f32;
        let mean_loss = total_loss / n;
        if !mean_loss.is_finite() {
            return Err(TrainerError::Policy(format!("non-finite loss {}", mean_loss)));
        }

        let step = params.learning_rate / n;
        self.actor_weights.scaled_add(-step, &grad_actor_w);
        self.actor_biases.scaled_add(-step, &grad_actor_b);
        self.critic_weights.scaled_add(-step, &grad_critic_w);
        self.critic_bias -= step * grad_critic_b;

        Ok(mean_loss)
    }

    fn boxed_clone(&self) -> Box<dyn Policy> {
        let mut copy = self.clone();
        copy.rng = fresh_rng();
        Box::new(copy)
    }

    fn get_weights(&self) -> Vec<f32> {
        let mut weights = Vec::with_capacity(self.num_parameters());
        weights.extend(self.actor_weights.iter());
        weights.extend(self.actor_biases.iter());
        weights.extend(self.critic_weights.iter());
        weights.push(self.critic_bias);
        weights
    }

    fn set_weights(&mut self, weights: &[f32]) -> Result<()> {
        if weights.len() != self.num_parameters() {
            return Err(TrainerError::dimension_mismatch(
                format!("{} weights", self.num_parameters()),
                format!("{} weights", weights.len()),
            ));
        }

        let (obs_dim, action_dim) = self.actor_weights.dim();
        let (actor_w, rest) = weights.split_at(obs_dim * action_dim);
        let (actor_b, rest) = rest.split_at(action_dim);
        let (critic_w, critic_b) = rest.split_at(obs_dim);

        self.actor_weights = Array2::from_shape_vec((obs_dim, action_dim), actor_w.to_vec())
            .map_err(|e| TrainerError::Policy(e.to_string()))?;
        self.actor_biases = Array1::from(actor_b.to_vec());
        self.critic_weights = Array1::from(critic_w.to_vec());
        self.critic_bias = critic_b[0];
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        let serialized = serialize(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(&serialized)?;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let mut file = fs::File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        let loaded: LinearPolicy = deserialize(&buffer)?;

        if loaded.actor_weights.dim() != self.actor_weights.dim() {
            return Err(TrainerError::dimension_mismatch(
                format!("{:?} actor weights", self.actor_weights.dim()),
                format!("{:?} actor weights", loaded.actor_weights.dim()),
            ));
        }

        self.actor_weights = loaded.actor_weights;
        self.actor_biases = loaded.actor_biases;
        self.critic_weights = loaded.critic_weights;
        self.critic_bias = loaded.critic_bias;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay_buffer::Experience;
    use tempfile::tempdir;

    fn single_sample(advantage: f32, target_return: f32, log_prob: f32) -> Vec<Experience> {
        let mut exp = Experience::new(vec![1.0, 0.5, -0.5], vec![1.0, 0.0], 0.0, vec![0.0; 3], false);
        exp.advantage = advantage;
        exp.value = target_return;
        exp.log_prob = log_prob;
        vec![exp]
    }

    #[test]
    fn test_predict_shapes() {
        let mut policy = LinearPolicy::with_seed(3, 2, 11);
        let action = policy.predict(&[0.1, 0.2, 0.3], true).unwrap();
        assert_eq!(action.len(), 2);
        assert!(action.iter().all(|&a| a == 0.0 || a == 1.0));

        assert!(policy.predict(&[0.1, 0.2], false).is_err());
        assert!(policy.log_prob(&[0.1, 0.2, 0.3], &[1.0]).is_err());
    }

    #[test]
    fn test_weights_roundtrip() {
        let mut a = LinearPolicy::with_seed(3, 2, 1);
        let b = LinearPolicy::with_seed(3, 2, 2);
        assert_eq!(a.get_weights().len(), a.num_parameters());

        a.copy_from(&b).unwrap();
        assert_eq!(a.get_weights(), b.get_weights());
        assert!(a.set_weights(&[0.0; 3]).is_err());
    }

    #[test]
    fn test_positive_advantage_raises_action_probability() {
        let mut policy = LinearPolicy::with_seed(3, 2, 5);
        let state = [1.0, 0.5, -0.5];
        let action = [1.0, 0.0];
        let before = policy.log_prob(&state, &action).unwrap();

        let samples = single_sample(1.0, 0.0, before);
        let batch = PolicyBatch::from_experiences(&samples);
        policy.update(&batch, &UpdateParams::unclipped(0.0, 0.0, 0.1)).unwrap();

        let after = policy.log_prob(&state, &action).unwrap();
        assert!(after > before);
    }

    #[test]
    fn test_clipped_sample_leaves_actor_unchanged() {
        let mut policy = LinearPolicy::with_seed(3, 2, 5);
        let state = [1.0, 0.5, -0.5];
        let current = policy.log_prob(&state, &[1.0, 0.0]).unwrap();
        let actor_before = policy.actor_weights.clone();

        // Old probability far below the current one puts the ratio above 1 + eps
        let samples = single_sample(1.0, 0.0, current - 2.0);
        let batch = PolicyBatch::from_experiences(&samples);
        policy.update(&batch, &UpdateParams::clipped(0.2, 0.0, 0.0, 0.1)).unwrap();

        assert_eq!(policy.actor_weights, actor_before);
    }

    #[test]
    fn test_value_moves_toward_return() {
        let mut policy = LinearPolicy::with_seed(3, 2, 9);
        let state = [1.0, 0.5, -0.5];
        let before = policy.value(&state).unwrap();

        let samples = single_sample(0.0, 5.0, 0.0);
        let batch = PolicyBatch::from_experiences(&samples);
        for _ in 0..10 {
            policy.update(&batch, &UpdateParams::unclipped(0.5, 0.0, 0.1)).unwrap();
        }

        let after = policy.value(&state).unwrap();
        assert!((5.0 - after).abs() < (5.0 - before).abs());
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.policy");

        let policy = LinearPolicy::with_seed(4, 3, 21);
        policy.save(&path).unwrap();

        let mut restored = LinearPolicy::with_seed(4, 3, 22);
        restored.load(&path).unwrap();
        assert_eq!(restored.get_weights(), policy.get_weights());

        let mut wrong_shape = LinearPolicy::new(5, 3);
        assert!(wrong_shape.load(&path).is_err());
    }
}
