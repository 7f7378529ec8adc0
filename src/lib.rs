//! # Arcade RL - Concurrent Actor-Critic Training
//!
//! Trains a policy for an arcade emulator with several worker threads. Each worker
//! plays its own episodes and exchanges weights with one global policy guarded by a
//! mutex, either by pushing gradient steps (A3C) or by publishing averaged weights
//! after on-policy training (PPO).
//!
//! ## Key Features
//!
//! - **Experience Buffer**: Bounded FIFO store with uniform or prioritized sampling
//! - **Algorithms**: Clipped actor-critic (PPO) and asynchronous actor-critic (A3C)
//! - **Distributed Trainer**: Worker pool with cooperative cancellation and live status
//! - **Curiosity**: Optional intrinsic reward from a forward prediction model
//! - **Persistence**: bincode weights with plain `key=value` parameter sidecars
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arcade_rl::builders::DistributedTrainerBuilder;
//! use arcade_rl::environment::{ArcadeConfig, SimulatedArcade, DIRECTIONS};
//! use arcade_rl::policy::LinearPolicy;
//! use arcade_rl::algorithms::AlgorithmKind;
//!
//! let arcade = ArcadeConfig::default();
//! let policy = LinearPolicy::new(arcade.width * arcade.height, DIRECTIONS + arcade.num_buttons);
//!
//! let mut trainer = DistributedTrainerBuilder::new(Box::new(policy), SimulatedArcade::factory(arcade))
//!     .num_workers(4)
//!     .algorithm(AlgorithmKind::A3c)
//!     .sync_frequency(10)
//!     .build()
//!     .unwrap();
//!
//! trainer.start(50).unwrap();
//! trainer.wait().unwrap();
//! println!("{}", trainer.get_status());
//! ```
//!
//! ## Module Organization
//!
//! - [`algorithms`] - Training algorithms and advantage estimation
//! - [`builders`] - Builder patterns for convenient object construction
//! - [`curiosity`] - Intrinsic curiosity reward shaping
//! - [`environment`] - Environment capability and a simulated arcade
//! - [`error`] - Error types and result handling
//! - [`loss`] - Clipped surrogate and value losses
//! - [`metrics`] - Worker counters and status snapshots
//! - [`params`] - `key=value` parameter files
//! - [`policy`] - Policy capability, linear actor-critic and the shared global policy
//! - [`replay_buffer`] - Experience storage
//! - [`sync`] - Stop token and atomic float
//! - [`trainer`] - The distributed trainer

pub mod algorithms;
pub mod builders;
pub mod curiosity;
pub mod environment;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod params;
pub mod policy;
pub mod replay_buffer;
pub mod sync;
pub mod trainer;

pub use algorithms::{Algorithm, AlgorithmKind, AsyncActorCritic, ClippedActorCritic, TrainingAlgorithm};
pub use error::{Result, TrainerError};
pub use policy::{LinearPolicy, Policy, SharedPolicy};
pub use replay_buffer::{Experience, ExperienceBuffer};
pub use trainer::{DistributedTrainer, TrainerConfig};

#[cfg(test)]
mod tests;
