//! Rate and rate item value types.

use std::fmt;
use std::time::Duration;

use crate::error::{FloodgateError, Result};

/// A single rate limit: at most `limit` weight units within any sliding
/// `interval`.
///
/// A bucket may enforce several rates at once; the strictest applicable one
/// determines the failing rate reported on rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    /// Maximum weight units admitted within the interval.
    pub limit: u64,
    /// The sliding window this limit applies to.
    pub interval: Duration,
}

impl Rate {
    /// Create a new rate limit.
    pub fn new(limit: u64, interval: Duration) -> Self {
        Self { limit, interval }
    }

    /// A rate of `limit` per second.
    pub fn per_second(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(1))
    }

    /// A rate of `limit` per minute.
    pub fn per_minute(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// A rate of `limit` per hour.
    pub fn per_hour(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(3600))
    }

    /// The interval in integer milliseconds, the unit all bucket arithmetic
    /// uses.
    pub fn interval_ms(&self) -> u64 {
        self.interval.as_millis() as u64
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}ms", self.limit, self.interval_ms())
    }
}

/// Validate a rate list for registration.
///
/// The list must be non-empty, every rate must have a positive limit and
/// interval, and successive rates must grow in both limit and interval so
/// that the per-rate checks stay consistent with each other.
pub fn validate_rates(rates: &[Rate]) -> Result<()> {
    if rates.is_empty() {
        return Err(FloodgateError::InvalidItem(
            "at least one rate is required".to_string(),
        ));
    }

    for rate in rates {
        if rate.limit == 0 || rate.interval.is_zero() {
            return Err(FloodgateError::InvalidItem(format!(
                "rate must have positive limit and interval, got {}",
                rate
            )));
        }
    }

    for pair in rates.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.limit <= prev.limit || next.interval <= prev.interval {
            return Err(FloodgateError::InvalidItem(format!(
                "rates must be ordered by increasing limit and interval: {} then {}",
                prev, next
            )));
        }
    }

    Ok(())
}

/// An immutable admission request: name, weight, and the timestamp it is
/// evaluated at (milliseconds from the clock's origin).
///
/// The only mutation permitted after construction is the orchestrator
/// advancing `timestamp` forward by the computed delay before its single
/// retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateItem {
    /// The rate-limit name this item is routed by.
    pub name: String,
    /// Weight units this item consumes. Weight 0 is exempt from limiting.
    pub weight: u64,
    /// Evaluation timestamp in milliseconds.
    pub timestamp: u64,
}

impl RateItem {
    /// Create a new rate item.
    pub fn new(name: impl Into<String>, weight: u64, timestamp: u64) -> Self {
        Self {
            name: name.into(),
            weight,
            timestamp,
        }
    }
}
