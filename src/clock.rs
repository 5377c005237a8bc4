//! Time source abstraction.
//!
//! The engine never reads the system clock directly; every item is stamped
//! through a [`Clock`] so that store-backed clocks (whose `now` requires a
//! round-trip) and test clocks fit behind the same seam.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::{FloodgateError, Result};

/// Trait for time sources.
///
/// `now` must be monotonically non-decreasing across calls on one instance;
/// whether the origin is the Unix epoch or process start does not matter to
/// the engine, only internal consistency does.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current timestamp in milliseconds.
    async fn now(&self) -> Result<u64>;
}

/// A clock anchored at its own construction, immune to wall-clock jumps.
pub struct MonotonicClock {
    anchor: Instant,
}

impl MonotonicClock {
    /// Create a clock whose origin is the moment of construction.
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MonotonicClock {
    async fn now(&self) -> Result<u64> {
        Ok(self.anchor.elapsed().as_millis() as u64)
    }
}

/// A wall clock reporting milliseconds since the Unix epoch.
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    async fn now(&self) -> Result<u64> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| FloodgateError::Backend(format!("system clock error: {}", e)))?;
        Ok(since_epoch.as_millis() as u64)
    }
}

/// A manually-advanced clock for tests.
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a manual clock starting at `now` milliseconds.
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Advance the clock by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn now(&self) -> Result<u64> {
        Ok(self.now.load(Ordering::SeqCst))
    }
}
