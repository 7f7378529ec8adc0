use crate::algorithms::{
    compute_discounted_returns, compute_gae, default_hyperparameters, Algorithm, AlgorithmKind,
    AsyncActorCritic, ClippedActorCritic, TrainingAlgorithm,
};
use crate::loss::{clipped_surrogate, policy_loss};
use crate::policy::{LinearPolicy, SharedPolicy};
use crate::replay_buffer::Experience;

fn step(reward: f32, value: f32, done: bool) -> Experience {
    Experience::new(vec![0.0], vec![0.0], reward, vec![0.0], done).with_estimates(value, 0.0)
}

fn assert_close(actual: f32, expected: f32) {
    assert!((actual - expected).abs() < 1e-4, "expected {}, got {}", expected, actual);
}

#[test]
fn test_gae_episode_boundary() {
    let mut trajectory = vec![step(1.0, 0.5, false), step(1.0, 0.5, true)];
    compute_gae(&mut trajectory, 100.0, 0.9, 0.9);

    // The terminal step ignores the bootstrap value
    assert_close(trajectory[0].value, 1.855);
    assert_close(trajectory[1].value, 1.0);

    // Raw advantages 1.355 and 0.5 normalize to +1 and -1
    assert_close(trajectory[0].advantage, 1.0);
    assert_close(trajectory[1].advantage, -1.0);
}

#[test]
fn test_gae_lambda_zero_is_td_error() {
    let mut trajectory = vec![step(1.0, 0.5, false)];
    compute_gae(&mut trajectory, 2.0, 0.9, 0.0);

    // Single step: no normalization, advantage = r + gamma * V(s') - V(s)
    assert_close(trajectory[0].advantage, 1.0 + 0.9 * 2.0 - 0.5);
    assert_close(trajectory[0].value, 1.0 + 0.9 * 2.0);
}

#[test]
fn test_gae_empty_trajectory() {
    let mut trajectory: Vec<Experience> = Vec::new();
    compute_gae(&mut trajectory, 1.0, 0.99, 0.95);
    assert!(trajectory.is_empty());
}

#[test]
fn test_discounted_returns_bootstrap() {
    let mut segment = vec![step(1.0, 0.0, false), step(0.0, 0.5, false)];
    compute_discounted_returns(&mut segment, 10.0, 0.5);

    assert_close(segment[1].value, 5.0);
    assert_close(segment[0].value, 3.5);
    assert_close(segment[1].advantage, 4.5);
    assert_close(segment[0].advantage, 3.5);
}

#[test]
fn test_clip_boundary() {
    let eps = 0.2;

    // Positive advantage: gains beyond 1 + eps are cut off
    let terms = clipped_surrogate(1.5, 2.0, eps);
    assert!(terms.clipped);
    assert_close(terms.objective, 1.2 * 2.0);

    // Negative advantage: the pessimistic surr1 wins above the clip range
    let terms = clipped_surrogate(1.5, -2.0, eps);
    assert!(!terms.clipped);
    assert_close(terms.objective, 1.5 * -2.0);

    // Negative advantage below the range is clipped at 1 - eps
    let terms = clipped_surrogate(0.5, -2.0, eps);
    assert!(terms.clipped);
    assert_close(terms.objective, 0.8 * -2.0);

    // Inside the range nothing is clipped
    let terms = clipped_surrogate(1.1, 1.0, eps);
    assert!(!terms.clipped);
    assert_close(policy_loss(1.1, 1.0, Some(eps)), -1.1);
    assert_close(policy_loss(1.5, 1.0, None), -1.5);
}

#[test]
fn test_empty_batch_is_noop() {
    let mut ppo = ClippedActorCritic::new(Box::new(LinearPolicy::with_seed(3, 2, 1)));
    let mut a3c = AsyncActorCritic::new(Box::new(LinearPolicy::with_seed(3, 2, 1)));
    let before = ppo.policy().get_weights();

    assert_eq!(ppo.train(&mut []).unwrap(), 0.0);
    assert_eq!(a3c.train(&mut []).unwrap(), 0.0);
    assert_eq!(ppo.policy().get_weights(), before);
    assert_eq!(a3c.pushes(), 0);
}

#[test]
fn test_a3c_push_then_pull() {
    let global = SharedPolicy::new(Box::new(LinearPolicy::with_seed(3, 2, 7)));
    let mut worker = AsyncActorCritic::new(Box::new(LinearPolicy::with_seed(3, 2, 8)));
    worker.update_frequency = 3;
    worker.learning_rate = 0.1;
    worker.attach_global(global.clone());

    let before = global.weights();
    let mut reports = Vec::new();
    for i in 0..3 {
        let state = vec![i as f32, 1.0, -1.0];
        reports.push(worker.process_step(&state, &[1.0, 0.0], 1.0, &state, false).unwrap());
    }

    assert!(!reports[0].synced);
    assert!(reports[2].synced);
    assert_eq!(global.version(), 1);
    assert_ne!(global.weights(), before);

    // After the push the worker holds exactly the global weights
    assert_eq!(worker.policy().get_weights(), global.weights());
    assert_eq!(worker.segment_len(), 0);
}

#[test]
fn test_a3c_standalone_updates_local() {
    let mut alg = AsyncActorCritic::new(Box::new(LinearPolicy::with_seed(3, 2, 8)));
    alg.learning_rate = 0.1;
    let before = alg.policy().get_weights();

    let report = alg.process_step(&[1.0, 0.0, 0.0], &[1.0, 1.0], 5.0, &[0.0, 1.0, 0.0], true).unwrap();
    assert!(report.loss.is_some());
    assert!(!report.synced);
    assert_ne!(alg.policy().get_weights(), before);
}

#[test]
fn test_algorithm_dispatch() {
    for kind in AlgorithmKind::ALL {
        let policy = Box::new(LinearPolicy::with_seed(4, 2, 3));
        let mut algorithm = Algorithm::new(kind, policy, &default_hyperparameters(kind));
        assert_eq!(algorithm.kind(), kind);
        assert_eq!(algorithm.hyperparameters().get("gamma"), Some(&0.99));

        let report = algorithm
            .process_step(&[0.1, 0.2, 0.3, 0.4], &[1.0, 0.0], 0.5, &[0.2, 0.3, 0.4, 0.5], false)
            .unwrap();
        assert_eq!(report.experience.reward, 0.5);
        assert!(report.experience.log_prob < 0.0);

        let policy = algorithm.into_policy();
        assert_eq!(policy.get_weights().len(), 4 * 2 + 2 + 4 + 1);
    }
}

#[test]
fn test_a3c_abandoned_steps_do_not_leak_into_next_episode() {
    let fresh = || {
        let mut alg = AsyncActorCritic::new(Box::new(LinearPolicy::with_seed(3, 2, 4)));
        alg.update_frequency = 100;
        alg.learning_rate = 0.1;
        alg
    };
    let mut abandoned = fresh();
    let mut clean = fresh();

    for i in 0..4 {
        let state = vec![i as f32, 0.5, -0.5];
        abandoned.process_step(&state, &[1.0, 0.0], 10.0, &state, false).unwrap();
    }
    assert_eq!(abandoned.segment_len(), 4);
    abandoned.discard_pending();
    assert_eq!(abandoned.segment_len(), 0);

    // Only the new episode is learned from
    for alg in [&mut abandoned, &mut clean] {
        alg.process_step(&[0.2, 0.1, 0.0], &[0.0, 1.0], 1.0, &[0.0, 0.0, 0.0], false).unwrap();
        alg.process_step(&[0.0, 0.0, 0.0], &[1.0, 1.0], 2.0, &[0.0, 0.0, 0.0], true).unwrap();
    }
    assert_eq!(abandoned.pushes(), 1);
    assert_eq!(abandoned.policy().get_weights(), clean.policy().get_weights());
}

#[test]
fn test_ppo_discard_pending_clears_trajectory() {
    let mut alg = ClippedActorCritic::new(Box::new(LinearPolicy::with_seed(3, 2, 4)));
    for _ in 0..15 {
        alg.process_step(&[0.1, 0.2, 0.3], &[1.0, 0.0], 1.0, &[0.1, 0.2, 0.3], false).unwrap();
    }
    alg.discard_pending();
    assert_eq!(alg.pending_steps(), 0);

    // 15 discarded plus 10 new would reach the minimum batch; 10 alone do not
    for t in 0..10 {
        let report = alg.process_step(&[0.1, 0.2, 0.3], &[1.0, 0.0], 1.0, &[0.1, 0.2, 0.3], t == 9).unwrap();
        assert!(report.loss.is_none());
    }
    assert_eq!(alg.pending_steps(), 10);
    assert_eq!(alg.training_passes(), 0);
}

#[test]
fn test_ppo_sync_publishes_trained_weights_before_pulling() {
    let global = SharedPolicy::new(Box::new(LinearPolicy::with_seed(3, 2, 7)));
    let mut alg = ClippedActorCritic::new(global.snapshot());
    alg.attach_global(global.clone());
    let before = global.weights();

    for t in 0..20 {
        alg.process_step(&[0.3, -0.1, 0.2], &[1.0, 0.0], 1.0, &[0.2, 0.0, 0.1], t == 19).unwrap();
    }
    assert_eq!(alg.training_passes(), 1);
    let trained = alg.policy().get_weights();

    alg.sync_with_global().unwrap();
    assert_ne!(global.weights(), before);
    assert_eq!(alg.policy().get_weights(), global.weights());
    for (g, t) in global.weights().iter().zip(&trained) {
        assert!((g - t).abs() < 1e-6);
    }
}
