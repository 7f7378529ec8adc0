use arcade_rl::{
    algorithms::AlgorithmKind,
    builders::DistributedTrainerBuilder,
    environment::{ArcadeConfig, SimulatedArcade, DIRECTIONS},
    metrics::TrainerStatus,
    policy::{LinearPolicy, Policy},
    trainer::{DistributedTrainer, TrainerConfig},
};
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn arcade() -> ArcadeConfig {
    ArcadeConfig {
        width: 8,
        height: 6,
        num_buttons: 4,
        episode_length: 40,
        seed: Some(3),
        ..ArcadeConfig::default()
    }
}

fn policy(config: &ArcadeConfig) -> Box<LinearPolicy> {
    Box::new(LinearPolicy::with_seed(
        config.width * config.height,
        DIRECTIONS + config.num_buttons,
        17,
    ))
}

#[test]
fn test_two_worker_a3c_end_to_end() {
    init_logging();

    let config = arcade();
    let mut trainer = DistributedTrainer::new(policy(&config), SimulatedArcade::factory(config), 2);
    assert!(trainer.set_algorithm("a3c"));
    trainer.set_sync_frequency(10);

    trainer.start(1).unwrap();
    let deadline = Instant::now() + Duration::from_secs(30);
    while trainer.is_running() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    trainer.stop();

    let status = trainer.get_status();
    assert!(status.contains("Workers: 2"));
    assert!(status.contains("Algorithm: a3c"));
    assert!(status.contains("Sync Frequency: Every 10 steps"));

    let snapshot = trainer.status();
    assert!(snapshot.total_episodes <= 2);
    assert_eq!(
        snapshot.total_episodes,
        snapshot.workers.iter().map(|w| w.episodes_completed).sum::<u64>()
    );
    assert_eq!(
        snapshot.total_steps,
        snapshot.workers.iter().map(|w| w.steps_completed).sum::<u64>()
    );
    assert!(!trainer.is_running());
    assert_eq!(snapshot.active_workers, 0);
}

#[test]
fn test_status_json_roundtrip() {
    init_logging();

    let config = arcade();
    let mut trainer = DistributedTrainer::new(policy(&config), SimulatedArcade::factory(config), 2);
    trainer.start(2).unwrap();
    trainer.wait().unwrap();

    let json = trainer.status().to_json().unwrap();
    let parsed: TrainerStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.num_workers, 2);
    assert_eq!(parsed.total_episodes, 4);
    assert_eq!(parsed.workers.len(), 2);
}

#[test]
fn test_save_and_load_model() {
    init_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("arcade_model");

    let config = arcade();
    let mut trainer = DistributedTrainerBuilder::new(policy(&config), SimulatedArcade::factory(config.clone()))
        .num_workers(2)
        .algorithm(AlgorithmKind::Ppo)
        .sync_frequency(12)
        .learning_rate(1e-3)
        .build()
        .unwrap();
    trainer.start(2).unwrap();
    trainer.wait().unwrap();
    trainer.save_model(&path).unwrap();
    let trained = trainer.global_weights();

    let fresh = LinearPolicy::with_seed(config.width * config.height, DIRECTIONS + config.num_buttons, 99);
    let mut restored = DistributedTrainer::new(Box::new(fresh), SimulatedArcade::factory(config), 3);
    restored.load_model(&path).unwrap();

    assert_eq!(restored.global_weights(), trained);
    for id in 0..3 {
        assert_eq!(restored.worker_weights(id), Some(trained.clone()));
    }
    assert_eq!(restored.config().algorithm, AlgorithmKind::Ppo);
    assert_eq!(restored.config().sync_frequency, 12);
    assert_eq!(restored.config().learning_rate, 1e-3);
    // Worker count comes from the constructor, not the file
    assert_eq!(restored.num_workers(), 3);
}

#[test]
fn test_load_into_mismatched_policy_fails() {
    init_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("model");

    let config = arcade();
    let trainer = DistributedTrainer::new(policy(&config), SimulatedArcade::factory(config.clone()), 1);
    trainer.save_model(&path).unwrap();

    let mut other = DistributedTrainer::new(
        Box::new(LinearPolicy::with_seed(5, 5, 1)),
        SimulatedArcade::factory(config),
        1,
    );
    let before = other.global_weights();
    assert!(other.load_model(&path).is_err());
    assert_eq!(other.global_weights(), before);
}

#[test]
fn test_config_file_drives_trainer() {
    init_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("trainer.json");
    std::fs::write(
        &path,
        r#"{ "num_workers": 2, "algorithm": "ppo", "sync_frequency": 7, "experience_sharing": false }"#,
    )
    .unwrap();

    let config = TrainerConfig::from_json_file(&path).unwrap();
    let arcade = arcade();
    let policy: Box<dyn Policy> = policy(&arcade);
    let trainer = DistributedTrainer::with_config(policy, SimulatedArcade::factory(arcade), config).unwrap();

    let status = trainer.status();
    assert_eq!(status.algorithm, AlgorithmKind::Ppo);
    assert_eq!(status.num_workers, 2);
    assert_eq!(status.sync_frequency, 7);
    assert!(!status.experience_sharing);
}
