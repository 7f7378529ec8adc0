use crate::error::{Result, TrainerError};
use crate::replay_buffer::ExperienceBuffer;

/// Builder for ExperienceBuffer
pub struct ExperienceBufferBuilder {
    capacity: Option<usize>,
    prioritized: bool,
    alpha: f32,
    beta: f32,
}

impl ExperienceBufferBuilder {
    /// Create a new experience buffer builder
    pub fn new() -> Self {
        ExperienceBufferBuilder {
            capacity: None,
            prioritized: false,
            alpha: 0.6,
            beta: 0.4,
        }
    }

    /// Set the capacity
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Use uniform sampling (no prioritization)
    pub fn uniform(mut self) -> Self {
        self.prioritized = false;
        self
    }

    /// Use proportional prioritization with the given exponents
    pub fn prioritized(mut self, alpha: f32, beta: f32) -> Self {
        self.prioritized = true;
        self.alpha = alpha;
        self.beta = beta;
        self
    }

    /// Build the experience buffer
    pub fn build(self) -> Result<ExperienceBuffer> {
        let capacity = self.capacity.ok_or_else(|| TrainerError::InvalidParameter {
            name: "capacity".to_string(),
            reason: "Capacity not specified".to_string(),
        })?;

        if capacity == 0 {
            return Err(TrainerError::InvalidParameter {
                name: "capacity".to_string(),
                reason: "Capacity must be greater than 0".to_string(),
            });
        }

        if !self.prioritized {
            return Ok(ExperienceBuffer::new(capacity));
        }

        if !(self.alpha >= 0.0) {
            return Err(TrainerError::invalid_parameter("alpha", "Alpha must be non-negative"));
        }

        if !(0.0..=1.0).contains(&self.beta) {
            return Err(TrainerError::invalid_parameter("beta", "Beta must be within [0, 1]"));
        }

        Ok(ExperienceBuffer::with_prioritization(capacity, self.alpha, self.beta))
    }
}

impl Default for ExperienceBufferBuilder {
    fn default() -> Self {
        Self::new()
    }
}
