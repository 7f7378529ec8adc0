//! Loss terms shared by the policy implementations and the algorithms

pub mod functions;

pub use functions::{
    bernoulli_entropy, bernoulli_log_prob, clipped_surrogate, policy_loss, probability_ratio,
    sigmoid, value_loss, ActorCriticLoss, LossBreakdown, SurrogateTerms, MIN_PROBABILITY,
};
