//! Bucket capability contract and built-in implementations.

mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::rate::{Rate, RateItem};

pub use memory::InMemoryBucket;

/// Outcome of a [`Bucket::put`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The item was admitted and its weight recorded.
    Allowed,
    /// The item was rejected; carries the strictest configured rate that
    /// would have been violated.
    Rejected(Rate),
}

impl Admission {
    /// `true` if the item was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Trait for bucket implementations.
///
/// A bucket holds admission state for one rate-limit name and is the sole
/// serialization point for that name: concurrent `put` calls against the
/// same bucket must never jointly admit more weight than any configured
/// rate allows within its sliding interval, regardless of how the callers
/// are scheduled. Store-backed implementations satisfy this through their
/// store's atomic primitives; the in-memory one holds a lock across the
/// check and the append.
///
/// `leak` and `flush` are maintenance operations driven by the registry and
/// must interleave safely with `put` under the same discipline.
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Try to admit `item`. All-or-nothing: a rejected call leaves the
    /// bucket state untouched.
    async fn put(&self, item: &RateItem) -> Result<Admission>;

    /// Expire entries that have fallen outside every configured interval as
    /// of `now_ms`. Returns the number of entries dropped. Never admits or
    /// rejects anything.
    async fn leak(&self, now_ms: u64) -> Result<usize>;

    /// Clear all state.
    async fn flush(&self) -> Result<()>;

    /// Number of admitted weight units currently recorded.
    async fn count(&self) -> Result<usize>;

    /// Minimum milliseconds until the bucket would accept `item`: `Some(0)`
    /// if it fits now, `None` if its weight exceeds a configured limit
    /// outright and it can never fit.
    async fn waiting(&self, item: &RateItem) -> Result<Option<u64>>;

    /// The rates this bucket enforces.
    fn rates(&self) -> &[Rate];
}

impl std::fmt::Debug for dyn Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket").field("rates", &self.rates()).finish()
    }
}
