//! Simulation context implementing ReplayContext for deterministic playback.

use async_trait::async_trait;
use replaytk_env::ReplayContext;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Wall clock that only moves when told to.
///
/// Used for headless runs and tests: the controller measures elapsed time
/// against this clock, and `sleep` advances it instead of blocking.
pub struct SimContext {
    /// Current virtual time (nanoseconds since context creation)
    virtual_time_ns: Arc<Mutex<u64>>,
}

impl SimContext {
    pub fn new() -> Self {
        Self {
            virtual_time_ns: Arc::new(Mutex::new(0)),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn clock(&self) -> MutexGuard<'_, u64> {
        self.virtual_time_ns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.clock();
        *time = time.saturating_add(duration.as_nanos() as u64);
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        *self.clock() = time_ns;
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.clock()
    }
}

impl Default for SimContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
        }
    }
}

#[async_trait]
impl ReplayContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance_time(duration);
    }
}
