//! Floodgate - Admission-Control Rate Limiting
//!
//! This crate decides whether a named, weighted request may proceed now,
//! must wait, or must be rejected, enforcing configurable rate limits
//! against state held in a pluggable backing store. The storage seam is the
//! [`Bucket`] trait; an in-memory implementation ships in-tree, and
//! store-backed implementations plug in through
//! [`BucketRegistry::register_with`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use floodgate::{BucketRegistry, Limiter, MonotonicClock, Rate};
//!
//! # async fn demo() -> floodgate::Result<()> {
//! let registry = BucketRegistry::new(Arc::new(MonotonicClock::new()));
//! registry.register("api", vec![Rate::per_second(100)])?;
//!
//! let limiter = Limiter::new(registry);
//! if limiter.try_acquire("api").await? {
//!     // proceed
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Synchronous callers get the same semantics through
//! [`blocking::Limiter`], which drives the one orchestration core on an
//! owned runtime.

pub mod blocking;
pub mod bucket;
pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod rate;
pub mod registry;

pub use bucket::{Admission, Bucket, InMemoryBucket};
pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use config::FloodgateConfig;
pub use error::{FloodgateError, Result};
pub use limiter::Limiter;
pub use rate::{Rate, RateItem};
pub use registry::{BucketRegistry, MaintenanceConfig};
