//! Advantage and return estimation over a trajectory.
//!
//! Both passes walk the trajectory backwards and overwrite `Experience::value` with
//! the target return and `Experience::advantage` with the advantage estimate.

use crate::replay_buffer::Experience;

/// Added to the standard deviation when normalizing advantages
pub const ADVANTAGE_EPSILON: f32 = 1e-8;

/// Generalized advantage estimation.
///
/// `bootstrap_value` is used as the value after the last step unless that step is
/// terminal. Advantages are normalized to zero mean and unit variance when the
/// trajectory holds more than one step. An empty trajectory is left untouched.
pub fn compute_gae(trajectory: &mut [Experience], bootstrap_value: f32, gamma: f32, lambda: f32) {
    let n = trajectory.len();
    if n == 0 {
        return;
    }

    let mut next_value = if trajectory[n - 1].done { 0.0 } else { bootstrap_value };
    let mut next_advantage = 0.0;

    for exp in trajectory.iter_mut().rev() {
        let not_done = if exp.done { 0.0 } else { 1.0 };
        let value = exp.value;

        let delta = exp.reward + gamma * next_value * not_done - value;
        let advantage = delta + gamma * lambda * next_advantage * not_done;

        exp.advantage = advantage;
        exp.value = advantage + value;

        // The estimate before it was overwritten feeds the previous step
        next_value = value;
        next_advantage = advantage;
    }

    if n > 1 {
        normalize_advantages(trajectory);
    }
}

/// Discounted n-step returns, `advantage = return - value`, without normalization
pub fn compute_discounted_returns(trajectory: &mut [Experience], bootstrap_value: f32, gamma: f32) {
    let n = trajectory.len();
    if n == 0 {
        return;
    }

    let mut running_return = if trajectory[n - 1].done { 0.0 } else { bootstrap_value };

    for exp in trajectory.iter_mut().rev() {
        let not_done = if exp.done { 0.0 } else { 1.0 };
        running_return = exp.reward + gamma * running_return * not_done;

        exp.advantage = running_return - exp.value;
        exp.value = running_return;
    }
}

/// Shift and scale advantages to zero mean and unit (population) variance
pub fn normalize_advantages(trajectory: &mut [Experience]) {
    let n = trajectory.len();
    if n == 0 {
        return;
    }

    let mean = trajectory.iter().map(|e| e.advantage).sum::<f32>() / n as f32;
    let variance = trajectory
        .iter()
        .map(|e| (e.advantage - mean).powi(2))
        .sum::<f32>()
        / n as f32;
    let std = variance.sqrt() + ADVANTAGE_EPSILON;

    for exp in trajectory.iter_mut() {
        exp.advantage = (exp.advantage - mean) / std;
    }
}
