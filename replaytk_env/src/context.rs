//! Core environment context trait for replaytk playback.

use async_trait::async_trait;
use std::time::Duration;

/// The wall-clock interface consumed by the playback controller.
///
/// The controller never reads the system clock directly. It samples
/// [`ReplayContext::now`] once per tick and scales the elapsed wall time by
/// the playback speed, so swapping the context swaps the notion of "real
/// time" for the whole simulation.
///
/// # Implementations
///
/// - **Realtime**: `TokioContext` - wraps `std::time::Instant` and `tokio::time`
/// - **Virtual**: `SimContext` (in `replaytk_sim`) - manually advanced clock
#[async_trait]
pub trait ReplayContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Playback deltas are measured on this clock.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// Realtime: wraps `tokio::time::sleep`
    /// Virtual: advances the virtual clock
    async fn sleep(&self, duration: Duration);
}
