//! Intrinsic Curiosity Module: rewards transitions the agent cannot yet predict.

use bincode::{deserialize, serialize};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Result, TrainerError};
use crate::loss::sigmoid;
use crate::params::{sidecar_path, ParamFile};
use crate::replay_buffer::Experience;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuriosityConfig {
    /// Multiplier from forward-model error to reward
    pub reward_scale: f32,
    pub forward_loss_weight: f32,
    pub inverse_loss_weight: f32,
    pub learning_rate: f32,
    /// Number of pooled cells an observation is reduced to
    pub feature_dim: usize,
}

impl Default for CuriosityConfig {
    fn default() -> Self {
        CuriosityConfig {
            reward_scale: 0.01,
            forward_loss_weight: 0.2,
            inverse_loss_weight: 0.8,
            learning_rate: 1e-3,
            feature_dim: 16,
        }
    }
}

impl CuriosityConfig {
    pub fn validate(&self) -> Result<()> {
        if self.feature_dim == 0 {
            return Err(TrainerError::invalid_parameter("feature_dim", "must be at least 1"));
        }
        if !(self.reward_scale >= 0.0) {
            return Err(TrainerError::invalid_parameter("reward_scale", "must be non-negative"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(TrainerError::invalid_parameter("learning_rate", "must be positive"));
        }
        Ok(())
    }
}

fn join(a: ArrayView1<f32>, b: ArrayView1<f32>) -> Array1<f32> {
    a.iter().chain(b.iter()).copied().collect()
}

/// Weights of the forward and inverse models
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CuriosityModels {
    /// `[features, action] -> next features`
    forward_weights: Array2<f32>,
    forward_bias: Array1<f32>,
    /// `[features, next features] -> action logits`
    inverse_weights: Array2<f32>,
    inverse_bias: Array1<f32>,
}

/// Per-worker curiosity signal.
///
/// Observations are average-pooled into `feature_dim` cells. A linear forward
/// model predicts the next cells from the current cells and the action; its RMS
/// error, scaled by `reward_scale`, is the intrinsic reward. A linear inverse model
/// predicts the pressed buttons from consecutive cells; both models are trained
/// together with weighted losses.
pub struct IntrinsicCuriosity {
    config: CuriosityConfig,
    action_dim: usize,
    models: CuriosityModels,
}

impl IntrinsicCuriosity {
    pub fn new(config: CuriosityConfig, action_dim: usize) -> Result<Self> {
        config.validate()?;
        let f = config.feature_dim;
        let models = CuriosityModels {
            forward_weights: Array2::random((f + action_dim, f), Uniform::new(-0.1, 0.1)),
            forward_bias: Array1::zeros(f),
            inverse_weights: Array2::random((2 * f, action_dim), Uniform::new(-0.1, 0.1)),
            inverse_bias: Array1::zeros(action_dim),
        };
        Ok(IntrinsicCuriosity {
            config,
            action_dim,
            models,
        })
    }

    pub fn config(&self) -> &CuriosityConfig {
        &self.config
    }

    pub fn set_reward_scale(&mut self, scale: f32) {
        self.config.reward_scale = scale.max(0.0);
    }

    /// Average-pool an observation into `feature_dim` cells
    pub fn features(&self, observation: &[f32]) -> Array1<f32> {
        let cells = self.config.feature_dim;
        let len = observation.len();
        if len == 0 {
            return Array1::zeros(cells);
        }

        Array1::from_shape_fn(cells, |i| {
            let start = (i * len / cells).min(len - 1);
            let end = ((i + 1) * len / cells).clamp(start + 1, len);
            let window = &observation[start..end];
            window.iter().sum::<f32>() / window.len() as f32
        })
    }

    fn check_action(&self, action: &[f32]) -> Result<()> {
        if action.len() != self.action_dim {
            return Err(TrainerError::dimension_mismatch(
                format!("action of length {}", self.action_dim),
                format!("length {}", action.len()),
            ));
        }
        Ok(())
    }

    fn predict_next(&self, features: ArrayView1<f32>, action: ArrayView1<f32>) -> Array1<f32> {
        let input = join(features, action);
        input.dot(&self.models.forward_weights) + &self.models.forward_bias
    }

    fn predict_action(&self, features: ArrayView1<f32>, next_features: ArrayView1<f32>) -> Array1<f32> {
        let input = join(features, next_features);
        (input.dot(&self.models.inverse_weights) + &self.models.inverse_bias).mapv(sigmoid)
    }

    /// `reward_scale * RMS(forward prediction error)`
    pub fn intrinsic_reward(&self, state: &[f32], action: &[f32], next_state: &[f32]) -> Result<f32> {
        self.check_action(action)?;
        let phi = self.features(state);
        let phi_next = self.features(next_state);
        let predicted = self.predict_next(phi.view(), ArrayView1::from(action));

        let mse = (&predicted - &phi_next).mapv(|d| d * d).mean().unwrap_or(0.0);
        Ok(mse.sqrt() * self.config.reward_scale)
    }

    /// One SGD step of both models over `batch`; returns the weighted loss
    pub fn update(&mut self, batch: &[Experience]) -> Result<f32> {
        if batch.is_empty() {
            return Ok(0.0);
        }

        let mut grad_fw = Array2::<f32>::zeros(self.models.forward_weights.raw_dim());
        let mut grad_fb = Array1::<f32>::zeros(self.models.forward_bias.raw_dim());
        let mut grad_iw = Array2::<f32>::zeros(self.models.inverse_weights.raw_dim());
        let mut grad_ib = Array1::<f32>::zeros(self.models.inverse_bias.raw_dim());
        let mut forward_loss = 0.0;
        let mut inverse_loss = 0.0;

        for exp in batch {
            self.check_action(&exp.action)?;
            let phi = self.features(&exp.state);
            let phi_next = self.features(&exp.next_state);
            let action = ArrayView1::from(exp.action.as_slice());

            // Forward model: 0.5 * mean squared error
            let predicted = self.predict_next(phi.view(), action);
            let error = &predicted - &phi_next;
            forward_loss += 0.5 * error.mapv(|d| d * d).mean().unwrap_or(0.0);
            let grad_out = &error * (self.config.forward_loss_weight / error.len() as f32);
            let input = join(phi.view(), action);
            grad_fw += &input
                .view()
                .insert_axis(Axis(1))
                .dot(&grad_out.view().insert_axis(Axis(0)));
            grad_fb += &grad_out;

            // Inverse model: binary cross-entropy per button
            let probs = self.predict_action(phi.view(), phi_next.view());
            inverse_loss += probs
                .iter()
                .zip(action.iter())
                .map(|(&p, &a)| {
                    let p = p.clamp(1e-6, 1.0 - 1e-6);
                    -(a * p.ln() + (1.0 - a) * (1.0 - p).ln())
                })
                .sum::<f32>();
            let grad_logits = (&probs - &action) * self.config.inverse_loss_weight;
            let input = join(phi.view(), phi_next.view());
            grad_iw += &input
                .view()
                .insert_axis(Axis(1))
                .dot(&grad_logits.view().insert_axis(Axis(0)));
            grad_ib += &grad_logits;
        }

        let n = batch.len() as f32;
        let step = self.config.learning_rate / n;
        self.models.forward_weights.scaled_add(-step, &grad_fw);
        self.models.forward_bias.scaled_add(-step, &grad_fb);
        self.models.inverse_weights.scaled_add(-step, &grad_iw);
        self.models.inverse_bias.scaled_add(-step, &grad_ib);

        Ok((self.config.forward_loss_weight * forward_loss + self.config.inverse_loss_weight * inverse_loss) / n)
    }

    /// Parameters to `<path>.icm_params`, model weights to `<path>.icm_models`
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut params = ParamFile::new();
        params.set("reward_scale", self.config.reward_scale);
        params.set("forward_loss_weight", self.config.forward_loss_weight);
        params.set("inverse_loss_weight", self.config.inverse_loss_weight);
        params.set("learning_rate", self.config.learning_rate);
        params.set("feature_dim", self.config.feature_dim);
        params.write(&sidecar_path(path, "icm_params"))?;

        fs::write(sidecar_path(path, "icm_models"), serialize(&self.models)?)?;
        Ok(())
    }

    pub fn load(&mut self, path: &Path) -> Result<()> {
        let params = ParamFile::read(&sidecar_path(path, "icm_params"))?;
        let mut config = self.config.clone();
        params.apply("reward_scale", &mut config.reward_scale);
        params.apply("forward_loss_weight", &mut config.forward_loss_weight);
        params.apply("inverse_loss_weight", &mut config.inverse_loss_weight);
        params.apply("learning_rate", &mut config.learning_rate);
        params.apply("feature_dim", &mut config.feature_dim);
        config.validate()?;

        let models: CuriosityModels = deserialize(&fs::read(sidecar_path(path, "icm_models"))?)?;
        let expected = (config.feature_dim + self.action_dim, config.feature_dim);
        if models.forward_weights.dim() != expected {
            return Err(TrainerError::dimension_mismatch(
                format!("{:?} forward weights", expected),
                format!("{:?} forward weights", models.forward_weights.dim()),
            ));
        }

        self.config = config;
        self.models = models;
        Ok(())
    }
}
