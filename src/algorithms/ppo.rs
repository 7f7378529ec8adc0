use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::path::Path;

use crate::algorithms::advantage::{compute_gae, normalize_advantages};
use crate::algorithms::{
    finite, load_params, positive_count, save_params, AlgorithmKind, Hyperparameters, StepReport,
    TrainingAlgorithm,
};
use crate::error::Result;
use crate::params::sidecar_path;
use crate::policy::{Policy, PolicyBatch, SharedPolicy, UpdateParams};
use crate::replay_buffer::{Experience, ExperienceBuffer};

/// Steps that must be collected before an episode end triggers training
pub const DEFAULT_MIN_BATCH_SIZE: usize = 20;
pub const DEFAULT_MINIBATCH_SIZE: usize = 64;
/// Upper bound on the steps held between training passes
pub const TRAJECTORY_CAPACITY: usize = 16_384;

/// Where the algorithm is in its collect/train cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Collecting,
    ComputingAdvantages,
    Training,
    SyncingTarget,
}

/// Clipped-objective actor-critic (PPO).
///
/// Collects on-policy steps into a private buffer. When an episode ends with at
/// least `min_batch_size` steps collected, it computes GAE over the trajectory in
/// order, runs `epochs` passes of shuffled minibatch updates, refreshes the target
/// network and clears the buffer.
pub struct ClippedActorCritic {
    policy: Box<dyn Policy>,
    /// Held-out copy used to bootstrap values of cut trajectories
    target: Box<dyn Policy>,
    global: Option<SharedPolicy>,
    buffer: ExperienceBuffer,
    phase: Phase,

    pub learning_rate: f32,
    pub gamma: f32,
    pub clip_epsilon: f32,
    pub vf_coeff: f32,
    pub entropy_coeff: f32,
    pub lambda: f32,
    pub epochs: usize,
    pub update_frequency: usize,
    pub min_batch_size: usize,
    pub minibatch_size: usize,
    /// Weight of the local policy when publishing into the global one
    pub publish_rate: f32,

    /// Local weights changed since the last publish
    unpublished: bool,
    training_passes: u64,
}

impl ClippedActorCritic {
    pub fn new(policy: Box<dyn Policy>) -> Self {
        let target = policy.boxed_clone();
        ClippedActorCritic {
            policy,
            target,
            global: None,
            buffer: ExperienceBuffer::new(TRAJECTORY_CAPACITY),
            phase: Phase::Collecting,
            learning_rate: 3e-4,
            gamma: 0.99,
            clip_epsilon: 0.2,
            vf_coeff: 0.5,
            entropy_coeff: 0.01,
            lambda: 0.95,
            epochs: 4,
            update_frequency: 4,
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            minibatch_size: DEFAULT_MINIBATCH_SIZE,
            publish_rate: 1.0,
            unpublished: false,
            training_passes: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Steps waiting for the next training pass
    pub fn pending_steps(&self) -> usize {
        self.buffer.len()
    }

    pub fn training_passes(&self) -> u64 {
        self.training_passes
    }

    pub fn target(&self) -> &dyn Policy {
        self.target.as_ref()
    }

    pub fn into_policy(self) -> Box<dyn Policy> {
        self.policy
    }

    fn update_params(&self) -> UpdateParams {
        UpdateParams::clipped(self.clip_epsilon, self.vf_coeff, self.entropy_coeff, self.learning_rate)
    }

    /// Train on the buffered trajectory and empty the buffer
    fn train_on_buffer(&mut self) -> Result<f32> {
        let mut trajectory = self.buffer.drain_all();
        self.train(&mut trajectory)
    }

    fn run_training_pass(&mut self, batch: &mut [Experience]) -> Result<f32> {
        self.phase = Phase::ComputingAdvantages;
        let bootstrap = match batch.last() {
            Some(last) if !last.done => self.target.value(&last.next_state)?,
            _ => 0.0,
        };
        compute_gae(batch, bootstrap, self.gamma, self.lambda);

        self.phase = Phase::Training;
        let params = self.update_params();
        let mut indices: Vec<usize> = (0..batch.len()).collect();
        let mut rng = thread_rng();
        let mut total_loss = 0.0;
        let mut updates = 0;

        for epoch in 0..self.epochs {
            indices.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            for chunk in indices.chunks(self.minibatch_size.max(1)) {
                let minibatch: Vec<&Experience> = chunk.iter().map(|&i| &batch[i]).collect();
                epoch_loss += self.policy.update(&PolicyBatch::from_refs(&minibatch), &params)?;
                updates += 1;
            }
            debug!("epoch {}/{}: loss {:.4}", epoch + 1, self.epochs, epoch_loss);
            total_loss += epoch_loss;
        }

        self.phase = Phase::SyncingTarget;
        self.target.copy_from(self.policy.as_ref())?;

        self.training_passes += 1;
        self.unpublished = true;
        Ok(if updates > 0 { total_loss / updates as f32 } else { 0.0 })
    }

    /// One extra clipped update on experience gathered elsewhere, such as the shared
    /// buffer, with the learning rate scaled by `lr_scale`.
    ///
    /// Samples are not contiguous, so each is scored as a one-step transition
    /// against the current critic.
    pub fn replay(&mut self, samples: &mut [Experience], lr_scale: f32) -> Result<f32> {
        if samples.is_empty() {
            return Ok(0.0);
        }

        for exp in samples.iter_mut() {
            let value = self.policy.value(&exp.state)?;
            let next_value = if exp.done { 0.0 } else { self.policy.value(&exp.next_state)? };
            let target = exp.reward + self.gamma * next_value;
            exp.advantage = target - value;
            exp.value = target;
        }
        if samples.len() > 1 {
            normalize_advantages(samples);
        }

        let params = self.update_params().scaled_learning_rate(lr_scale);
        let loss = self.policy.update(&PolicyBatch::from_experiences(samples), &params)?;
        self.unpublished = true;
        Ok(loss)
    }

    /// Blend the local weights into the global policy
    fn publish(&mut self) -> Result<()> {
        if let Some(global) = &self.global {
            if self.unpublished {
                global.blend_from(self.policy.as_ref(), self.publish_rate)?;
                self.unpublished = false;
            }
        }
        Ok(())
    }
}

impl TrainingAlgorithm for ClippedActorCritic {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Ppo
    }

    fn process_step(
        &mut self,
        state: &[f32],
        action: &[f32],
        reward: f32,
        next_state: &[f32],
        done: bool,
    ) -> Result<StepReport> {
        let log_prob = self.policy.log_prob(state, action)?;
        let value = self.policy.value(state)?;
        let experience = Experience::new(state.to_vec(), action.to_vec(), reward, next_state.to_vec(), done)
            .with_estimates(value, log_prob);

        self.buffer.add(experience.clone());

        let loss = if done && self.buffer.len() >= self.min_batch_size {
            Some(self.train_on_buffer()?)
        } else {
            None
        };

        Ok(StepReport {
            experience,
            synced: false,
            loss,
        })
    }

    fn train(&mut self, batch: &mut [Experience]) -> Result<f32> {
        if batch.is_empty() {
            return Ok(0.0);
        }
        let result = self.run_training_pass(batch);
        self.phase = Phase::Collecting;
        result
    }

    fn synchronize(&mut self) -> Result<()> {
        match &self.global {
            Some(global) => global.pull_into(self.policy.as_mut()),
            None => Ok(()),
        }
    }

    /// Publish weights trained since the last exchange, then pull
    fn sync_with_global(&mut self) -> Result<()> {
        self.publish()?;
        self.synchronize()
    }

    fn discard_pending(&mut self) {
        self.buffer.clear();
        self.phase = Phase::Collecting;
    }

    /// Train on a cut trajectory if it is long enough, then publish
    fn finish_episode(&mut self) -> Result<Option<f32>> {
        let loss = if self.buffer.len() >= self.min_batch_size {
            Some(self.train_on_buffer()?)
        } else {
            None
        };
        self.publish()?;
        Ok(loss)
    }

    fn attach_global(&mut self, global: SharedPolicy) {
        self.global = Some(global);
    }

    fn global(&self) -> Option<&SharedPolicy> {
        self.global.as_ref()
    }

    fn set_hyperparameters(&mut self, params: &Hyperparameters) {
        if let Some(v) = finite(params, "learning_rate") {
            self.learning_rate = v;
        }
        if let Some(v) = finite(params, "gamma") {
            self.gamma = v;
        }
        if let Some(v) = finite(params, "clip_epsilon") {
            self.clip_epsilon = v.max(0.0);
        }
        if let Some(v) = finite(params, "vf_coeff") {
            self.vf_coeff = v;
        }
        if let Some(v) = finite(params, "entropy_coeff") {
            self.entropy_coeff = v;
        }
        if let Some(v) = finite(params, "lambda") {
            self.lambda = v;
        }
        if let Some(v) = positive_count(params, "epochs") {
            self.epochs = v;
        }
        if let Some(v) = positive_count(params, "update_frequency") {
            self.update_frequency = v;
        }
        if let Some(v) = positive_count(params, "min_batch_size") {
            self.min_batch_size = v;
        }
        if let Some(v) = positive_count(params, "minibatch_size") {
            self.minibatch_size = v;
        }
        if let Some(v) = finite(params, "publish_rate") {
            self.publish_rate = v.clamp(0.0, 1.0);
        }
    }

    fn hyperparameters(&self) -> Hyperparameters {
        [
            ("learning_rate", self.learning_rate),
            ("gamma", self.gamma),
            ("clip_epsilon", self.clip_epsilon),
            ("vf_coeff", self.vf_coeff),
            ("entropy_coeff", self.entropy_coeff),
            ("lambda", self.lambda),
            ("epochs", self.epochs as f32),
            ("update_frequency", self.update_frequency as f32),
            ("min_batch_size", self.min_batch_size as f32),
            ("minibatch_size", self.minibatch_size as f32),
            ("publish_rate", self.publish_rate),
        ]
        .iter()
        .map(|&(k, v)| (k.to_string(), v))
        .collect()
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn policy(&self) -> &dyn Policy {
        self.policy.as_ref()
    }

    fn policy_mut(&mut self) -> &mut dyn Policy {
        self.policy.as_mut()
    }

    /// Also writes the target network to `<path>.target`
    fn save(&self, path: &Path) -> Result<()> {
        save_params(self.kind(), &self.hyperparameters(), path)?;
        self.policy.save(&sidecar_path(path, "policy"))?;
        self.target.save(&sidecar_path(path, "target"))
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let params = load_params(self.kind(), path)?;
        self.set_hyperparameters(&params);
        self.policy.load(&sidecar_path(path, "policy"))?;

        let target_path = sidecar_path(path, "target");
        if target_path.exists() {
            self.target.load(&target_path)
        } else {
            warn!("{} not found, target network copied from policy", target_path.display());
            self.target.copy_from(self.policy.as_ref())
        }
    }
}
