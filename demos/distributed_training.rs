//! Distributed training example
//!
//! Trains a linear actor-critic on the simulated arcade with one worker per CPU core,
//! first with A3C and then, continuing from the same weights, with PPO.
//! Run with `RUST_LOG=info` to see worker progress.

use arcade_rl::algorithms::AlgorithmKind;
use arcade_rl::builders::{DistributedTrainerBuilder, LinearPolicyBuilder};
use arcade_rl::curiosity::CuriosityConfig;
use arcade_rl::environment::{ArcadeConfig, SimulatedArcade, DIRECTIONS};
use arcade_rl::Result;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    env_logger::init();

    println!("Distributed Training Example");
    println!("============================\n");

    let num_workers = num_cpus::get().clamp(2, 8);
    println!("Using {} worker threads\n", num_workers);

    let arcade = ArcadeConfig {
        width: 16,
        height: 12,
        num_buttons: 6,
        episode_length: 200,
        ..ArcadeConfig::default()
    };

    let policy = LinearPolicyBuilder::new()
        .obs_dim(arcade.width * arcade.height)
        .action_dim(DIRECTIONS + arcade.num_buttons)
        .seed(7)
        .build()?;

    let mut trainer = DistributedTrainerBuilder::new(Box::new(policy), SimulatedArcade::factory(arcade))
        .num_workers(num_workers)
        .algorithm(AlgorithmKind::A3c)
        .learning_rate(1e-3)
        .sync_frequency(20)
        .experience_sharing(true, 5_000)
        .curiosity(CuriosityConfig::default())
        .build()?;

    // Phase 1: A3C, polling status while the workers run
    let start = Instant::now();
    trainer.start(20)?;
    while trainer.is_running() {
        std::thread::sleep(Duration::from_millis(500));
        let status = trainer.status();
        println!(
            "  {} episodes, {} steps, avg reward {:.3}",
            status.total_episodes, status.total_steps, status.average_reward
        );
    }
    trainer.wait()?;
    println!("\nA3C finished in {:.2?}", start.elapsed());
    println!("{}", trainer.get_status());

    let model_dir = std::env::temp_dir().join("arcade_rl_demo");
    std::fs::create_dir_all(&model_dir)?;
    let model_path = model_dir.join("a3c_model");
    trainer.save_model(&model_path)?;
    println!("Saved model to {}\n", model_path.display());

    // Phase 2: PPO from the same global weights
    trainer.set_algorithm("ppo");
    trainer.start(10)?;
    trainer.wait()?;
    println!("PPO finished");
    println!("{}", trainer.get_status());
    println!("Shared buffer holds {} experiences", trainer.shared_buffer_len());

    Ok(())
}
