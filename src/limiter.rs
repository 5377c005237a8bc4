//! Acquire orchestration: the public entry point of the engine.
//!
//! A [`Limiter`] turns a bucket's accept/reject result into the final
//! caller-visible outcome. On rejection it applies the delay-or-raise
//! policy: fail fast when no delay budget is configured, otherwise compute
//! the bucket's availability, wait once, and retry exactly once. The policy
//! is fixed per limiter instance; there is no per-call override.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::bucket::{Admission, Bucket};
use crate::error::{FloodgateError, Result};
use crate::rate::{Rate, RateItem};
use crate::registry::BucketRegistry;

/// Fixed margin added to a computed wait to cover the gap between the
/// predicted availability and the actual retry.
const DEFAULT_RETRY_MARGIN: Duration = Duration::from_millis(50);

/// The admission-control orchestrator.
///
/// Holds a shared registry and the failure policy; carries no per-request
/// state and can be called from any number of concurrent tasks.
pub struct Limiter {
    registry: Arc<BucketRegistry>,
    raise_when_fail: bool,
    max_delay: Option<Duration>,
    retry_margin: Duration,
}

impl Limiter {
    /// Create a limiter over `registry` and start the registry's leak and
    /// flush duties. Defaults: rejections raise
    /// [`FloodgateError::CapacityExceeded`], no delay budget, 50ms retry
    /// margin.
    ///
    /// Must be called from within a tokio runtime (the maintenance tasks
    /// are spawned here). For synchronous callers see
    /// [`blocking::Limiter`](crate::blocking::Limiter).
    pub fn new(registry: Arc<BucketRegistry>) -> Self {
        registry.schedule_leak();
        registry.schedule_flush();
        Self {
            registry,
            raise_when_fail: true,
            max_delay: None,
            retry_margin: DEFAULT_RETRY_MARGIN,
        }
    }

    /// Report rejections as `Ok(false)` instead of raising
    /// [`FloodgateError::CapacityExceeded`].
    pub fn no_raise_on_limit(mut self) -> Self {
        self.raise_when_fail = false;
        self
    }

    /// Allow waiting up to `delay` in total before a rejection becomes
    /// final. Without a budget, rejected items fail immediately.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Override the scheduling margin added to every computed wait.
    pub fn with_retry_margin(mut self, margin: Duration) -> Self {
        self.retry_margin = margin;
        self
    }

    /// The registry this limiter routes through.
    pub fn registry(&self) -> &Arc<BucketRegistry> {
        &self.registry
    }

    /// Try to acquire one weight unit for `name`.
    pub async fn try_acquire(&self, name: &str) -> Result<bool> {
        self.try_acquire_weighted(name, 1).await
    }

    /// Try to acquire `weight` units for `name`.
    ///
    /// Returns `Ok(true)` when admitted. On rejection, either waits and
    /// retries once within the configured delay budget, raises
    /// [`FloodgateError::CapacityExceeded`], or returns `Ok(false)`,
    /// depending on the limiter's policy. Weight 0 is exempt from limiting
    /// and admitted without touching any bucket.
    pub async fn try_acquire_weighted(&self, name: &str, weight: u64) -> Result<bool> {
        if weight == 0 {
            return Ok(true);
        }

        let mut item = self.registry.wrap_item(name, weight).await?;
        let bucket = self.registry.get(&item)?;

        trace!(name = %item.name, weight, timestamp = item.timestamp, "acquiring");
        match bucket.put(&item).await? {
            Admission::Allowed => Ok(true),
            Admission::Rejected(rate) => self.delay_or_raise(&*bucket, &mut item, rate).await,
        }
    }

    /// Resolve a rejection: fail fast without a delay budget, otherwise
    /// wait for the bucket's availability plus the retry margin and retry
    /// the put exactly once. The budget is a hard ceiling, checked before
    /// committing to any wait. The retry routes through the registry
    /// again: the flush duty may have reclaimed the bucket during the
    /// wait, and the retry must land in whatever bucket now serves the
    /// name.
    async fn delay_or_raise(
        &self,
        bucket: &dyn Bucket,
        item: &mut RateItem,
        rate: Rate,
    ) -> Result<bool> {
        let Some(budget) = self.max_delay else {
            return self.fail(item, rate);
        };

        let wait_ms = match bucket.waiting(item).await? {
            Some(availability) => availability + self.retry_margin.as_millis() as u64,
            // The item can never fit, no budget is enough.
            None => return self.fail(item, rate),
        };
        if wait_ms > budget.as_millis() as u64 {
            debug!(
                name = %item.name,
                wait_ms,
                budget_ms = budget.as_millis() as u64,
                "projected wait exceeds delay budget"
            );
            return self.fail(item, rate);
        }

        trace!(name = %item.name, wait_ms, "waiting before retry");
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        item.timestamp += wait_ms;

        let bucket = self.registry.get(item)?;
        match bucket.put(item).await? {
            Admission::Allowed => Ok(true),
            // One wait-and-retry cycle only.
            Admission::Rejected(rate) => self.fail(item, rate),
        }
    }

    fn fail(&self, item: &RateItem, rate: Rate) -> Result<bool> {
        debug!(name = %item.name, rate = %rate, "acquire failed");
        if self.raise_when_fail {
            Err(FloodgateError::CapacityExceeded {
                name: item.name.clone(),
                rate,
            })
        } else {
            Ok(false)
        }
    }

    /// Gate an async operation on admission: acquire `weight` units for
    /// `name` and run `op` only if admitted.
    ///
    /// Returns `Ok(Some(result))` when admitted, `Ok(None)` when the
    /// limiter's policy reports rejection as a boolean, and the underlying
    /// error otherwise. The operation is never started for a rejected item.
    pub async fn gate<F, Fut, T>(&self, name: &str, weight: u64, op: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.try_acquire_weighted(name, weight).await? {
            Ok(Some(op().await))
        } else {
            Ok(None)
        }
    }
}
