//! In-memory bucket implementation.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::rate::{validate_rates, Rate, RateItem};

use super::{Admission, Bucket};

/// A bucket backed by an in-process sliding log of admitted timestamps.
///
/// The log is kept sorted by timestamp; an item of weight W occupies W log
/// slots. All mutation happens under one mutex held across the rate checks
/// and the append, which is what makes `put` atomic for this backend.
pub struct InMemoryBucket {
    rates: Vec<Rate>,
    items: Mutex<Vec<RateItem>>,
}

impl InMemoryBucket {
    /// Create a bucket enforcing the given rates.
    ///
    /// Rates must be non-empty and strictly ordered by increasing limit and
    /// interval.
    pub fn new(rates: Vec<Rate>) -> Result<Self> {
        validate_rates(&rates)?;
        Ok(Self {
            rates,
            items: Mutex::new(Vec::new()),
        })
    }

    /// The `from_newest`-th most recent admitted entry, if any. Index 0 is
    /// the latest.
    pub fn peek(&self, from_newest: usize) -> Option<RateItem> {
        let items = self.items.lock();
        if from_newest >= items.len() {
            return None;
        }
        Some(items[items.len() - 1 - from_newest].clone())
    }

    /// Weight units admitted within `rate`'s interval, as of `now_ms`.
    ///
    /// The log is sorted, so the in-window entries are the suffix starting
    /// at the first timestamp not below the window start (the window is
    /// closed on both ends).
    fn count_in_window(items: &[RateItem], rate: &Rate, now_ms: u64) -> usize {
        let window_start = now_ms.saturating_sub(rate.interval_ms());
        let first_inside = items.partition_point(|i| i.timestamp < window_start);
        items.len() - first_inside
    }

    /// The rate `item` would violate, if any. Checks rates in registration
    /// order, so the strictest applicable one is reported.
    fn failing_rate(&self, items: &[RateItem], item: &RateItem) -> Option<Rate> {
        self.rates
            .iter()
            .find(|rate| {
                let count = Self::count_in_window(items, rate, item.timestamp) as u64;
                count + item.weight > rate.limit
            })
            .copied()
    }
}

#[async_trait]
impl Bucket for InMemoryBucket {
    async fn put(&self, item: &RateItem) -> Result<Admission> {
        let mut items = self.items.lock();

        if let Some(rate) = self.failing_rate(&items, item) {
            debug!(name = %item.name, weight = item.weight, rate = %rate, "item rejected");
            return Ok(Admission::Rejected(rate));
        }

        // A retried item carries an advanced timestamp and can land behind
        // one stamped concurrently; insert at the sorted position so the
        // partition_point searches stay valid.
        let at = items.partition_point(|i| i.timestamp <= item.timestamp);
        for _ in 0..item.weight {
            items.insert(at, item.clone());
        }
        Ok(Admission::Allowed)
    }

    async fn leak(&self, now_ms: u64) -> Result<usize> {
        // An entry is stale once it is outside the longest interval; the
        // shorter windows are subsets of it. The window is closed, so an
        // entry at exactly `cutoff` is still counted and must be kept.
        let longest = self
            .rates
            .last()
            .map(|r| r.interval_ms())
            .unwrap_or_default();
        let cutoff = now_ms.saturating_sub(longest);

        let mut items = self.items.lock();
        let stale = items.partition_point(|i| i.timestamp < cutoff);
        items.drain(..stale);
        Ok(stale)
    }

    async fn flush(&self) -> Result<()> {
        self.items.lock().clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.items.lock().len())
    }

    async fn waiting(&self, item: &RateItem) -> Result<Option<u64>> {
        let items = self.items.lock();
        let mut wait = 0u64;

        for rate in &self.rates {
            let count = Self::count_in_window(&items, rate, item.timestamp) as u64;
            if count + item.weight <= rate.limit {
                continue;
            }
            if item.weight > rate.limit {
                // Can never fit, no matter how long we wait.
                return Ok(None);
            }

            // Room appears once the (limit - weight)-th newest entry ages
            // out of this rate's window. The failing check above guarantees
            // the log holds at least that many entries. The window is
            // closed, so the entry is still counted at exactly
            // timestamp + interval; room opens one tick later.
            let from_newest = (rate.limit - item.weight) as usize;
            let bound = &items[items.len() - 1 - from_newest];
            let available_at = bound.timestamp + rate.interval_ms() + 1;
            wait = wait.max(available_at.saturating_sub(item.timestamp));
        }

        Ok(Some(wait))
    }

    fn rates(&self) -> &[Rate] {
        &self.rates
    }
}
