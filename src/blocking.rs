//! Blocking entry point for synchronous callers.
//!
//! The orchestration algorithm lives once, in [`crate::limiter::Limiter`];
//! this module only changes how suspension happens. A [`Limiter`] here owns
//! a current-thread tokio runtime with the time driver enabled and drives
//! the async core to completion with `block_on`, so waits become real
//! thread-blocking sleeps while the decision sequence, computed delays, and
//! retry count stay identical to the async path.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::registry::BucketRegistry;

/// A blocking admission-control limiter.
///
/// The registry's maintenance tasks run on the owned runtime; like any
/// current-thread runtime they make progress only while a call is being
/// driven.
pub struct Limiter {
    runtime: tokio::runtime::Runtime,
    inner: crate::limiter::Limiter,
}

impl Limiter {
    /// Create a blocking limiter over `registry`.
    pub fn new(registry: Arc<BucketRegistry>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let inner = {
            // Maintenance tasks must be spawned onto the owned runtime.
            let _guard = runtime.enter();
            crate::limiter::Limiter::new(registry)
        };
        Ok(Self { runtime, inner })
    }

    /// See [`crate::limiter::Limiter::no_raise_on_limit`].
    pub fn no_raise_on_limit(mut self) -> Self {
        self.inner = self.inner.no_raise_on_limit();
        self
    }

    /// See [`crate::limiter::Limiter::with_max_delay`].
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.inner = self.inner.with_max_delay(delay);
        self
    }

    /// See [`crate::limiter::Limiter::with_retry_margin`].
    pub fn with_retry_margin(mut self, margin: Duration) -> Self {
        self.inner = self.inner.with_retry_margin(margin);
        self
    }

    /// Try to acquire one weight unit for `name`, blocking the calling
    /// thread for any computed wait.
    pub fn try_acquire(&self, name: &str) -> Result<bool> {
        self.runtime.block_on(self.inner.try_acquire(name))
    }

    /// Try to acquire `weight` units for `name`, blocking the calling
    /// thread for any computed wait.
    pub fn try_acquire_weighted(&self, name: &str, weight: u64) -> Result<bool> {
        self.runtime
            .block_on(self.inner.try_acquire_weighted(name, weight))
    }

    /// The registry this limiter routes through.
    pub fn registry(&self) -> &Arc<BucketRegistry> {
        self.inner.registry()
    }

    /// Stop the registry's maintenance duties.
    pub fn shutdown(&self) {
        self.inner.registry().shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::error::FloodgateError;
    use crate::rate::Rate;

    fn blocking_limiter(rates: Vec<Rate>) -> Limiter {
        let registry = BucketRegistry::new(Arc::new(ManualClock::new(0)) as Arc<dyn Clock>);
        registry.register("api", rates).unwrap();
        Limiter::new(registry).unwrap()
    }

    #[test]
    fn test_blocking_admits_up_to_capacity() {
        let limiter = blocking_limiter(vec![Rate::per_second(2)]);

        assert!(limiter.try_acquire("api").unwrap());
        assert!(limiter.try_acquire("api").unwrap());

        let err = limiter.try_acquire("api").unwrap_err();
        assert!(matches!(err, FloodgateError::CapacityExceeded { .. }));
        limiter.shutdown();
    }

    #[test]
    fn test_blocking_wait_and_retry() {
        let limiter = blocking_limiter(vec![Rate::new(1, Duration::from_millis(100))])
            .with_max_delay(Duration::from_millis(500))
            .with_retry_margin(Duration::from_millis(10));

        assert!(limiter.try_acquire("api").unwrap());

        let start = std::time::Instant::now();
        assert!(limiter.try_acquire("api").unwrap());
        // A real thread-blocking sleep of availability (100ms) + margin.
        assert!(start.elapsed() >= Duration::from_millis(100));
        limiter.shutdown();
    }

    #[test]
    fn test_blocking_weight_zero_bypass() {
        let registry = BucketRegistry::new(Arc::new(ManualClock::new(0)) as Arc<dyn Clock>);
        let limiter = Limiter::new(registry).unwrap();
        assert!(limiter.try_acquire_weighted("unregistered", 0).unwrap());
    }
}
