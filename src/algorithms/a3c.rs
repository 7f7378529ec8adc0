use log::debug;

use crate::algorithms::advantage::compute_discounted_returns;
use crate::algorithms::{
    finite, positive_count, AlgorithmKind, Hyperparameters, StepReport, TrainingAlgorithm,
};
use crate::error::Result;
use crate::policy::{Policy, PolicyBatch, SharedPolicy, UpdateParams};
use crate::replay_buffer::Experience;

/// Asynchronous advantage actor-critic (A3C).
///
/// Every `update_frequency` steps, or when the episode ends, the collected segment
/// is turned into discounted returns and applied as one unclipped gradient step.
/// With a global policy attached the step goes to the global policy under its
/// lock and the local policy then pulls the result; standalone it updates the local
/// policy.
pub struct AsyncActorCritic {
    policy: Box<dyn Policy>,
    global: Option<SharedPolicy>,
    segment: Vec<Experience>,

    pub learning_rate: f32,
    pub gamma: f32,
    pub vf_coeff: f32,
    pub entropy_coeff: f32,
    pub update_frequency: usize,

    pushes: u64,
}

impl AsyncActorCritic {
    pub fn new(policy: Box<dyn Policy>) -> Self {
        AsyncActorCritic {
            policy,
            global: None,
            segment: Vec::new(),
            learning_rate: 1e-4,
            gamma: 0.99,
            vf_coeff: 0.5,
            entropy_coeff: 0.01,
            update_frequency: 20,
            pushes: 0,
        }
    }

    /// Steps collected since the last push
    pub fn segment_len(&self) -> usize {
        self.segment.len()
    }

    /// Number of segments applied so far
    pub fn pushes(&self) -> u64 {
        self.pushes
    }

    pub fn into_policy(self) -> Box<dyn Policy> {
        self.policy
    }

    fn update_params(&self) -> UpdateParams {
        UpdateParams::unclipped(self.vf_coeff, self.entropy_coeff, self.learning_rate)
    }

    /// Train on the pending segment; returns `None` when it is empty
    fn flush_segment(&mut self) -> Result<Option<f32>> {
        if self.segment.is_empty() {
            return Ok(None);
        }
        let mut segment = std::mem::take(&mut self.segment);
        self.train(&mut segment).map(Some)
    }
}

impl TrainingAlgorithm for AsyncActorCritic {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::A3c
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

        self.segment.push(experience.clone());

        let loss = if done || self.segment.len() >= self.update_frequency {
            self.flush_segment()?
        } else {
            None
        };

        Ok(StepReport {
            experience,
            synced: loss.is_some() && self.global.is_some(),
            loss,
        })
    }

    fn train(&mut self, batch: &mut [Experience]) -> Result<f32> {
        if batch.is_empty() {
            return Ok(0.0);
        }

        // A segment cut before the episode ends is bootstrapped from the local critic
        let bootstrap = match batch.last() {
            Some(last) if !last.done => self.policy.value(&last.next_state)?,
            _ => 0.0,
        };
        compute_discounted_returns(batch, bootstrap, self.gamma);

        let params = self.update_params();
        let update = PolicyBatch::from_experiences(batch);
        let loss = match &self.global {
            Some(global) => {
                let loss = global.apply_update(&update, &params)?;
                global.pull_into(self.policy.as_mut())?;
                loss
            }
            None => self.policy.update(&update, &params)?,
        };

        self.pushes += 1;
        debug!("segment of {} steps applied, loss {:.4}", batch.len(), loss);
        Ok(loss)
    }

    fn synchronize(&mut self) -> Result<()> {
        match &self.global {
            Some(global) => global.pull_into(self.policy.as_mut()),
            None => Ok(()),
        }
    }

    /// Push the pending segment, or just pull when nothing is pending
    fn sync_with_global(&mut self) -> Result<()> {
        match self.flush_segment()? {
            Some(_) if self.global.is_some() => Ok(()),
            _ => self.synchronize(),
        }
    }

    fn finish_episode(&mut self) -> Result<Option<f32>> {
        self.flush_segment()
    }

    fn discard_pending(&mut self) {
        self.segment.clear();
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
        if let Some(v) = finite(params, "vf_coeff") {
            self.vf_coeff = v;
        }
        if let Some(v) = finite(params, "entropy_coeff") {
            self.entropy_coeff = v;
        }
        if let Some(v) = positive_count(params, "update_frequency") {
            self.update_frequency = v;
        }
    }

    fn hyperparameters(&self) -> Hyperparameters {
        [
            ("learning_rate", self.learning_rate),
            ("gamma", self.gamma),
            ("vf_coeff", self.vf_coeff),
            ("entropy_coeff", self.entropy_coeff),
            ("update_frequency", self.update_frequency as f32),
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
}
