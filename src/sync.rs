//! Lock-free primitives shared between the controller and worker threads.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag.
///
/// Clones observe the same flag. Workers poll it at episode start, at every step
/// and after each synchronization.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// `f32` stored as its bit pattern in an `AtomicU32`
#[derive(Debug, Default)]
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        AtomicF32 {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.bits.load(order))
    }

    pub fn store(&self, value: f32, order: Ordering) {
        self.bits.store(value.to_bits(), order);
    }

    /// Add `delta` and return the previous value
    pub fn fetch_add(&self, delta: f32, order: Ordering) -> f32 {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let new = (f32::from_bits(current) + delta).to_bits();
            match self.bits.compare_exchange_weak(current, new, order, Ordering::Relaxed) {
                Ok(previous) => return f32::from_bits(previous),
                Err(actual) => current = actual,
            }
        }
    }
}
