use log::debug;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Result, TrainerError};
use crate::policy::{Policy, PolicyBatch, UpdateParams};

/// The global policy, shared by the controller and every worker.
///
/// This handle is the only way to reach the global model. Each method is a single
/// critical section of the global mutex, so pushes and pulls from different workers
/// never interleave; workers may still observe different versions depending on
/// scheduling.
#[derive(Clone)]
pub struct SharedPolicy {
    inner: Arc<Mutex<Box<dyn Policy>>>,
    /// Number of mutations applied to the global policy
    version: Arc<AtomicU64>,
}

impl SharedPolicy {
    pub fn new(policy: Box<dyn Policy>) -> Self {
        SharedPolicy {
            inner: Arc::new(Mutex::new(policy)),
            version: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `f` with exclusive access to the global policy
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut dyn Policy) -> R) -> R {
        let mut guard = self.inner.lock();
        f(guard.as_mut())
    }

    /// Apply a worker's batch as a gradient step on the global policy
    pub fn apply_update(&self, batch: &PolicyBatch<'_>, params: &UpdateParams) -> Result<f32> {
        let mut guard = self.inner.lock();
        let loss = guard.update(batch, params)?;
        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("global policy updated on {} samples (version {})", batch.len(), version);
        Ok(loss)
    }

    /// Copy the global weights into `local`
    pub fn pull_into(&self, local: &mut dyn Policy) -> Result<()> {
        let guard = self.inner.lock();
        local.copy_from(guard.as_ref())
    }

    /// Blend `local` into the global weights: `global = (1 - rate) * global + rate * local`
    pub fn blend_from(&self, local: &dyn Policy, rate: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(TrainerError::invalid_parameter(
                "publish_rate".to_string(),
                format!("{} is outside [0, 1]", rate),
            ));
        }

        let local_weights = local.get_weights();
        let mut guard = self.inner.lock();
        let mut global_weights = guard.get_weights();
        if global_weights.len() != local_weights.len() {
            return Err(TrainerError::dimension_mismatch(
                format!("{} weights", global_weights.len()),
                format!("{} weights", local_weights.len()),
            ));
        }

        for (g, l) in global_weights.iter_mut().zip(local_weights.iter()) {
            *g = (1.0 - rate) * *g + rate * l;
        }
        guard.set_weights(&global_weights)?;
        self.version.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Independent deep copy of the global policy
    pub fn snapshot(&self) -> Box<dyn Policy> {
        self.inner.lock().boxed_clone()
    }

    pub fn weights(&self) -> Vec<f32> {
        self.inner.lock().get_weights()
    }

    pub fn set_weights(&self, weights: &[f32]) -> Result<()> {
        self.inner.lock().set_weights(weights)?;
        self.version.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.inner.lock().save(path)
    }

    pub fn load(&self, path: &Path) -> Result<()> {
        self.inner.lock().load(path)?;
        self.version.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::LinearPolicy;
    use crate::replay_buffer::Experience;
    use std::thread;

    #[test]
    fn test_pull_makes_weights_equal() {
        let shared = SharedPolicy::new(Box::new(LinearPolicy::with_seed(4, 2, 1)));
        let mut local = LinearPolicy::with_seed(4, 2, 2);
        assert_ne!(local.get_weights(), shared.weights());

        shared.pull_into(&mut local).unwrap();
        assert_eq!(local.get_weights(), shared.weights());
    }

    #[test]
    fn test_blend_from_averages() {
        let global = LinearPolicy::with_seed(3, 1, 7);
        let local = LinearPolicy::with_seed(3, 1, 8);
        let expected: Vec<f32> = global
            .get_weights()
            .iter()
            .zip(local.get_weights())
            .map(|(g, l)| 0.5 * g + 0.5 * l)
            .collect();

        let shared = SharedPolicy::new(Box::new(global));
        shared.blend_from(&local, 0.5).unwrap();

        for (a, b) in shared.weights().iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        assert_eq!(shared.version(), 1);
        assert!(shared.blend_from(&local, 1.5).is_err());
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let shared = SharedPolicy::new(Box::new(LinearPolicy::with_seed(2, 1, 3)));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || {
                    let mut exp = Experience::new(vec![0.5, -0.5], vec![1.0], 1.0, vec![0.0, 0.0], true);
                    exp.advantage = 1.0;
                    exp.value = 1.0;
                    let batch_items = vec![exp];
                    let batch = PolicyBatch::from_experiences(&batch_items);
                    let params = UpdateParams::unclipped(0.5, 0.0, 0.01);
                    for _ in 0..25 {
                        shared.apply_update(&batch, &params).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.version(), 100);
    }
}
