//! Environment capability and a simulated arcade cabinet.

use ndarray::{s, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Bernoulli, Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Result, TrainerError};

/// Outcome of one environment step
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next_state: Vec<f32>,
    pub reward: f32,
    pub done: bool,
}

impl Transition {
    pub fn new(next_state: Vec<f32>, reward: f32, done: bool) -> Self {
        Transition { next_state, reward, done }
    }
}

/// A single-agent episodic environment driven by one worker thread
pub trait Environment: Send {
    /// Start a new episode and return the first observation
    fn reset(&mut self) -> Result<Vec<f32>>;

    fn step(&mut self, action: &[f32]) -> Result<Transition>;

    fn observation_size(&self) -> usize;

    fn action_size(&self) -> usize;
}

/// Builds the environment for the worker with the given id
pub type EnvFactory = Arc<dyn Fn(usize) -> Result<Box<dyn Environment>> + Send + Sync>;

/// Number of directional inputs at the front of an arcade action vector (up, down, left, right)
pub const DIRECTIONS: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcadeConfig {
    pub width: usize,
    pub height: usize,
    pub num_buttons: usize,
    /// Surviving this many steps ends the episode with the completion bonus
    pub episode_length: usize,
    /// Chance that any step ends the episode early
    pub termination_probability: f64,
    pub step_penalty: f32,
    pub button_reward: f32,
    pub completion_bonus: f32,
    pub seed: Option<u64>,
}

impl Default for ArcadeConfig {
    fn default() -> Self {
        ArcadeConfig {
            width: 16,
            height: 12,
            num_buttons: 6,
            episode_length: 1000,
            termination_probability: 0.01,
            step_penalty: -0.01,
            button_reward: 0.1,
            completion_bonus: 10.0,
            seed: None,
        }
    }
}

/// Stand-in for an emulated game: a grayscale frame that scrolls with the
/// directional input and rewards button presses.
///
/// Action layout is `[up, down, left, right, button_0, .., button_n]`; an entry
/// above 0.5 counts as pressed. Only the first pressed direction moves the frame.
pub struct SimulatedArcade {
    config: ArcadeConfig,
    frame: Array2<f32>,
    timestep: usize,
    rng: StdRng,
    termination: Bernoulli,
    pixel: Uniform<f32>,
}

impl SimulatedArcade {
    pub fn new(config: ArcadeConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(TrainerError::invalid_parameter(
                "frame size".to_string(),
                format!("{}x{} has no pixels", config.width, config.height),
            ));
        }
        if config.episode_length == 0 {
            return Err(TrainerError::invalid_parameter("episode_length", "must be at least 1"));
        }

        let termination = Bernoulli::new(config.termination_probability).map_err(|e| {
            TrainerError::invalid_parameter("termination_probability".to_string(), e.to_string())
        })?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(SimulatedArcade {
            frame: Array2::zeros((config.height, config.width)),
            config,
            timestep: 0,
            rng,
            termination,
            pixel: Uniform::new(0.0, 1.0),
        })
    }

    /// Factory giving every worker its own cabinet; seeded configs are offset by the worker id
    pub fn factory(config: ArcadeConfig) -> EnvFactory {
        Arc::new(move |worker_id: usize| {
            let mut config = config.clone();
            config.seed = config.seed.map(|seed| seed.wrapping_add(worker_id as u64));
            Ok(Box::new(SimulatedArcade::new(config)?) as Box<dyn Environment>)
        })
    }

    pub fn config(&self) -> &ArcadeConfig {
        &self.config
    }

    pub fn timestep(&self) -> usize {
        self.timestep
    }

    fn observation(&self) -> Vec<f32> {
        self.frame.iter().copied().collect()
    }

    fn scroll(&mut self, action: &[f32]) {
        let (h, w) = self.frame.dim();
        let pressed = |i: usize| action.get(i).map_or(false, |&a| a > 0.5);

        if pressed(0) && h > 1 {
            let moved = self.frame.slice(s![1.., ..]).to_owned();
            self.frame.slice_mut(s![..h - 1, ..]).assign(&moved);
        } else if pressed(1) && h > 1 {
            let moved = self.frame.slice(s![..h - 1, ..]).to_owned();
            self.frame.slice_mut(s![1.., ..]).assign(&moved);
        } else if pressed(2) && w > 1 {
            let moved = self.frame.slice(s![.., 1..]).to_owned();
            self.frame.slice_mut(s![.., ..w - 1]).assign(&moved);
        } else if pressed(3) && w > 1 {
            let moved = self.frame.slice(s![.., ..w - 1]).to_owned();
            self.frame.slice_mut(s![.., 1..]).assign(&moved);
        }
    }
}

impl Environment for SimulatedArcade {
    fn reset(&mut self) -> Result<Vec<f32>> {
        let (h, w) = self.frame.dim();
        let pixel = self.pixel;
        let rng = &mut self.rng;
        self.frame = Array2::from_shape_fn((h, w), |_| pixel.sample(rng));
        self.timestep = 0;
        Ok(self.observation())
    }

    fn step(&mut self, action: &[f32]) -> Result<Transition> {
        if action.len() != self.action_size() {
            return Err(TrainerError::dimension_mismatch(
                format!("action of length {}", self.action_size()),
                format!("length {}", action.len()),
            ));
        }

        self.scroll(action);
        self.timestep += 1;

        let presses = action[DIRECTIONS..].iter().filter(|&&a| a > 0.5).count();
        let mut reward = self.config.step_penalty + self.config.button_reward * presses as f32;

        let completed = self.timestep >= self.config.episode_length;
        let done = completed || self.termination.sample(&mut self.rng);
        if completed {
            reward += self.config.completion_bonus;
        }

        Ok(Transition::new(self.observation(), reward, done))
    }

    fn observation_size(&self) -> usize {
        self.config.width * self.config.height
    }

    fn action_size(&self) -> usize {
        DIRECTIONS + self.config.num_buttons
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> ArcadeConfig {
        ArcadeConfig {
            width: 4,
            height: 3,
            num_buttons: 2,
            episode_length: 5,
            termination_probability: 0.0,
            seed: Some(42),
            ..ArcadeConfig::default()
        }
    }

    #[test]
    fn test_rewards_and_completion() {
        let mut env = SimulatedArcade::new(quiet_config()).unwrap();
        let obs = env.reset().unwrap();
        assert_eq!(obs.len(), env.observation_size());
        assert!(obs.iter().all(|&p| (0.0..1.0).contains(&p)));

        // Both buttons pressed: -0.01 + 2 * 0.1
        let t = env.step(&[0.0, 0.0, 0.0, 0.0, 1.0, 1.0]).unwrap();
        assert!((t.reward - 0.19).abs() < 1e-6);
        assert!(!t.done);

        for _ in 0..3 {
            assert!(!env.step(&[0.0; 6]).unwrap().done);
        }
        let last = env.step(&[0.0; 6]).unwrap();
        assert!(last.done);
        assert!((last.reward - (10.0 - 0.01)).abs() < 1e-5);
    }

    #[test]
    fn test_scroll_up_shifts_rows() {
        let mut env = SimulatedArcade::new(quiet_config()).unwrap();
        let before = env.reset().unwrap();
        let after = env.step(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap().next_state;
        // Row 0 now holds what was row 1
        assert_eq!(&after[0..4], &before[4..8]);
        // Bottom row is unchanged
        assert_eq!(&after[8..12], &before[8..12]);
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = quiet_config();
        config.termination_probability = 1.5;
        assert!(SimulatedArcade::new(config).is_err());

        let mut config = quiet_config();
        config.width = 0;
        assert!(SimulatedArcade::new(config).is_err());

        let mut env = SimulatedArcade::new(quiet_config()).unwrap();
        env.reset().unwrap();
        assert!(env.step(&[1.0]).is_err());
    }

    #[test]
    fn test_factory_offsets_seeds() {
        let factory = SimulatedArcade::factory(quiet_config());
        let mut a = factory(0).unwrap();
        let mut b = factory(1).unwrap();
        let mut a_again = factory(0).unwrap();
        let first = a.reset().unwrap();
        assert_ne!(first, b.reset().unwrap());
        assert_eq!(first, a_again.reset().unwrap());
    }
}
