//! Core environment context trait for Convoy agents.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that the platoon controller can
/// run in both production (tokio) and simulation (virtual clock)
/// environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and the OS clock
/// - **Simulation**: `SimContext` - a manually advanced virtual clock
///
/// # Determinism
///
/// Neighbor ages, dead reckoning and the jamming timer are all measured
/// against `now()`, so a simulated clock makes every tick reproducible.
#[async_trait]
pub trait ConvoyContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for neighbor receipt stamps, staleness and tick durations.
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time for outgoing message timestamps.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;

    /// Returns `now()` as fractional seconds.
    fn now_secs(&self) -> f64 {
        self.now().as_secs_f64()
    }

    /// Returns the wall clock as whole seconds since the Unix epoch.
    ///
    /// This is the resolution carried on the wire.
    fn unix_secs(&self) -> i64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}
