use ndarray::ArrayView1;

/// Floor applied to the old action probability before dividing by it
pub const MIN_PROBABILITY: f32 = 1e-6;

/// Probabilities are clamped into `[PROB_CLAMP, 1 - PROB_CLAMP]` before taking logs
const PROB_CLAMP: f32 = 1e-6;

/// Logistic function
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `new_prob / max(old_prob, 1e-6)` computed from log-probabilities
pub fn probability_ratio(new_log_prob: f32, old_log_prob: f32) -> f32 {
    new_log_prob.exp() / old_log_prob.exp().max(MIN_PROBABILITY)
}

/// The two surrogate terms of the clipped objective for one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurrogateTerms {
    /// `ratio * advantage`
    pub surr1: f32,
    /// `clamp(ratio, 1 - eps, 1 + eps) * advantage`
    pub surr2: f32,
    /// `min(surr1, surr2)`
    pub objective: f32,
    /// The clipped term is active, so the objective is flat in `ratio`
    pub clipped: bool,
}

/// Clipped surrogate objective of a single sample
pub fn clipped_surrogate(ratio: f32, advantage: f32, clip_epsilon: f32) -> SurrogateTerms {
    let surr1 = ratio * advantage;
    let surr2 = ratio.clamp(1.0 - clip_epsilon, 1.0 + clip_epsilon) * advantage;
    let clipped = (advantage > 0.0 && ratio > 1.0 + clip_epsilon)
        || (advantage < 0.0 && ratio < 1.0 - clip_epsilon);

    SurrogateTerms {
        surr1,
        surr2,
        objective: surr1.min(surr2),
        clipped,
    }
}

/// Policy loss of one sample. Without a clip range this is the plain surrogate `-ratio * advantage`.
pub fn policy_loss(ratio: f32, advantage: f32, clip_epsilon: Option<f32>) -> f32 {
    match clip_epsilon {
        Some(eps) => -clipped_surrogate(ratio, advantage, eps).objective,
        None => -ratio * advantage,
    }
}

/// `0.5 * (value - return)^2`
pub fn value_loss(value: f32, target_return: f32) -> f32 {
    0.5 * (value - target_return).powi(2)
}

/// Joint log-probability of a multi-binary action under independent Bernoulli heads
pub fn bernoulli_log_prob(probs: ArrayView1<f32>, action: &[f32]) -> f32 {
    probs
        .iter()
        .zip(action.iter())
        .map(|(&p, &a)| {
            let p = p.clamp(PROB_CLAMP, 1.0 - PROB_CLAMP);
            if a > 0.5 {
                p.ln()
            } else {
                (1.0 - p).ln()
            }
        })
        .sum()
}

/// Summed entropy of independent Bernoulli heads
pub fn bernoulli_entropy(probs: ArrayView1<f32>) -> f32 {
    probs
        .iter()
        .map(|&p| {
            let p = p.clamp(PROB_CLAMP, 1.0 - PROB_CLAMP);
            -(p * p.ln() + (1.0 - p) * (1.0 - p).ln())
        })
        .sum()
}

/// Per-sample decomposition of the actor-critic loss
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossBreakdown {
    pub policy: f32,
    pub value: f32,
    pub entropy: f32,
    pub total: f32,
}

/// Actor-critic loss with fixed coefficients
#[derive(Debug, Clone, Copy)]
pub struct ActorCriticLoss {
    pub clip_epsilon: Option<f32>,
    pub value_coeff: f32,
    pub entropy_coeff: f32,
}

impl ActorCriticLoss {
    /// `policy + value_coeff * value - entropy_coeff * entropy`
    pub fn compute(&self, ratio: f32, advantage: f32, value: f32, target_return: f32, entropy: f32) -> LossBreakdown {
        let policy = policy_loss(ratio, advantage, self.clip_epsilon);
        let value = value_loss(value, target_return);
        LossBreakdown {
            policy,
            value,
            entropy,
            total: policy + self.value_coeff * value - self.entropy_coeff * entropy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_clip_boundary_matches_unclipped() {
        let eps = 0.2;
        let terms = clipped_surrogate(1.0 + eps, 2.0, eps);
        assert_eq!(terms.surr1, terms.surr2);
        assert_eq!(terms.objective, terms.surr1);
        assert!(!terms.clipped);
    }

    #[test]
    fn test_clip_caps_positive_advantage() {
        let eps = 0.2;
        let at_edge = clipped_surrogate(1.2, 1.0, eps).objective;
        let beyond = clipped_surrogate(1.5, 1.0, eps);
        let far_beyond = clipped_surrogate(3.0, 1.0, eps);

        assert!(beyond.clipped);
        assert!((beyond.objective - at_edge).abs() < 1e-6);
        assert!((far_beyond.objective - at_edge).abs() < 1e-6);
    }

    #[test]
    fn test_clip_keeps_pessimistic_term_for_negative_advantage() {
        // Ratio above the range with a negative advantage is not clipped
        let terms = clipped_surrogate(1.5, -1.0, 0.2);
        assert!(!terms.clipped);
        assert!((terms.objective - (-1.5)).abs() < 1e-6);
    }

    #[test]
    fn test_probability_ratio_floors_old_probability() {
        let ratio = probability_ratio(0.0, f32::NEG_INFINITY);
        assert!((ratio - 1.0 / MIN_PROBABILITY).abs() / ratio < 1e-4);
        assert!((probability_ratio(-0.5, -0.5) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_value_loss() {
        assert_eq!(value_loss(1.0, 3.0), 2.0);
        assert_eq!(value_loss(0.5, 0.5), 0.0);
    }

    #[test]
    fn test_bernoulli_helpers() {
        let probs = array![0.5, 0.5];
        let lp = bernoulli_log_prob(probs.view(), &[1.0, 0.0]);
        assert!((lp - 2.0 * 0.5_f32.ln()).abs() < 1e-6);

        let h = bernoulli_entropy(probs.view());
        assert!((h - 2.0 * std::f32::consts::LN_2).abs() < 1e-5);

        assert!((sigmoid(0.0) - 0.5).abs() < 1e-7);
        assert!(sigmoid(-100.0) >= 0.0 && sigmoid(100.0) <= 1.0);
    }
}
