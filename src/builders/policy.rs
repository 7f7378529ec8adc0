use crate::error::{Result, TrainerError};
use crate::policy::LinearPolicy;

/// Builder for LinearPolicy
pub struct LinearPolicyBuilder {
    obs_dim: Option<usize>,
    action_dim: Option<usize>,
    init_range: f32,
    seed: Option<u64>,
}

impl LinearPolicyBuilder {
    pub fn new() -> Self {
        LinearPolicyBuilder {
            obs_dim: None,
            action_dim: None,
            init_range: 0.1,
            seed: None,
        }
    }

    /// Length of the observation vector
    pub fn obs_dim(mut self, obs_dim: usize) -> Self {
        self.obs_dim = Some(obs_dim);
        self
    }

    /// Number of independent buttons
    pub fn action_dim(mut self, action_dim: usize) -> Self {
        self.action_dim = Some(action_dim);
        self
    }

    /// Weights are drawn from U(-range, range)
    pub fn init_range(mut self, range: f32) -> Self {
        self.init_range = range;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<LinearPolicy> {
        let obs_dim = self.obs_dim.ok_or_else(|| TrainerError::InvalidParameter {
            name: "obs_dim".to_string(),
            reason: "Observation size not specified".to_string(),
        })?;
        let action_dim = self.action_dim.ok_or_else(|| TrainerError::InvalidParameter {
            name: "action_dim".to_string(),
            reason: "Action size not specified".to_string(),
        })?;

        if obs_dim == 0 || action_dim == 0 {
            return Err(TrainerError::invalid_parameter(
                "dimensions".to_string(),
                format!("obs_dim {} and action_dim {} must be positive", obs_dim, action_dim),
            ));
        }

        if !(self.init_range > 0.0) || !self.init_range.is_finite() {
            return Err(TrainerError::invalid_parameter(
                "init_range".to_string(),
                format!("{} is not a positive finite number", self.init_range),
            ));
        }

        Ok(LinearPolicy::with_init_range(obs_dim, action_dim, self.init_range, self.seed))
    }
}

impl Default for LinearPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
