//! Bucket routing and lifecycle management.
//!
//! The [`BucketRegistry`] owns the mapping from rate-limit names to bucket
//! instances. It stamps incoming items through the configured [`Clock`],
//! creates buckets lazily on first reference, and runs two recurring
//! background duties that keep bucket state bounded over time: a periodic
//! *leak* (expire stale entries inside each live bucket) and a periodic
//! *flush* (reclaim buckets that are empty and idle).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::bucket::{Bucket, InMemoryBucket};
use crate::clock::Clock;
use crate::error::{FloodgateError, Result};
use crate::rate::{validate_rates, Rate, RateItem};

/// Cadence and thresholds for the registry's background duties.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// How often to run a leak pass over every live bucket.
    pub leak_interval: Duration,
    /// How often to look for reclaimable buckets.
    pub flush_interval: Duration,
    /// How long a bucket must go unreferenced before it may be reclaimed.
    pub idle_threshold: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            leak_interval: Duration::from_secs(10),
            flush_interval: Duration::from_secs(60),
            idle_threshold: Duration::from_secs(60),
        }
    }
}

type BucketBuilder = Box<dyn Fn() -> Result<Arc<dyn Bucket>> + Send + Sync>;

/// A registered rate-limit name: its rates plus the constructor used to
/// (re)create its bucket on demand.
struct Registration {
    rates: Vec<Rate>,
    builder: BucketBuilder,
}

/// A live bucket and the last time a caller routed to it.
struct BucketEntry {
    bucket: Arc<dyn Bucket>,
    last_used: Mutex<Instant>,
}

/// Routes named items to bucket instances and keeps bucket state bounded.
///
/// The registry exclusively owns its buckets: it is the only component that
/// creates or destroys them. Callers and the [`Limiter`](crate::limiter::Limiter)
/// only ever read through [`get`](Self::get).
pub struct BucketRegistry {
    registrations: DashMap<String, Registration>,
    buckets: DashMap<String, BucketEntry>,
    clock: Arc<dyn Clock>,
    maintenance: MaintenanceConfig,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    leak_started: AtomicBool,
    flush_started: AtomicBool,
}

impl BucketRegistry {
    /// Create a registry with default maintenance settings.
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Self::with_maintenance(clock, MaintenanceConfig::default())
    }

    /// Create a registry with explicit maintenance settings.
    pub fn with_maintenance(clock: Arc<dyn Clock>, maintenance: MaintenanceConfig) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            registrations: DashMap::new(),
            buckets: DashMap::new(),
            clock,
            maintenance,
            tasks: Mutex::new(Vec::new()),
            shutdown_tx,
            leak_started: AtomicBool::new(false),
            flush_started: AtomicBool::new(false),
        })
    }

    /// Register a name with in-memory buckets enforcing `rates`.
    ///
    /// Re-registering a name replaces its rates; the live bucket, if any, is
    /// destroyed and recreated on next reference.
    pub fn register(&self, name: impl Into<String>, rates: Vec<Rate>) -> Result<()> {
        let builder_rates = rates.clone();
        self.register_with(name, rates, move || {
            Ok(Arc::new(InMemoryBucket::new(builder_rates.clone())?) as Arc<dyn Bucket>)
        })
    }

    /// Register a name with a custom bucket constructor, e.g. for a
    /// store-backed [`Bucket`] implementation. The constructor is invoked
    /// lazily on first reference and again whenever the registry recreates a
    /// reclaimed bucket.
    pub fn register_with<F>(&self, name: impl Into<String>, rates: Vec<Rate>, builder: F) -> Result<()>
    where
        F: Fn() -> Result<Arc<dyn Bucket>> + Send + Sync + 'static,
    {
        let name = name.into();
        validate_rates(&rates)?;

        self.registrations.insert(
            name.clone(),
            Registration {
                rates,
                builder: Box::new(builder),
            },
        );
        self.buckets.remove(&name);
        Ok(())
    }

    /// The rates registered for `name`, if any.
    pub fn rates(&self, name: &str) -> Option<Vec<Rate>> {
        self.registrations.get(name).map(|r| r.rates.clone())
    }

    /// Validate and stamp an incoming request into a [`RateItem`].
    pub async fn wrap_item(&self, name: &str, weight: u64) -> Result<RateItem> {
        if name.is_empty() {
            return Err(FloodgateError::InvalidItem(
                "item name must be non-empty".to_string(),
            ));
        }
        let timestamp = self.clock.now().await?;
        Ok(RateItem::new(name, weight, timestamp))
    }

    /// Route an item to the bucket for its name, creating the bucket on
    /// first reference. Fails with [`FloodgateError::UnknownLimit`] if the
    /// name was never registered.
    pub fn get(&self, item: &RateItem) -> Result<Arc<dyn Bucket>> {
        if let Some(entry) = self.buckets.get(&item.name) {
            *entry.last_used.lock() = Instant::now();
            return Ok(entry.bucket.clone());
        }

        let bucket = {
            let registration = self
                .registrations
                .get(&item.name)
                .ok_or_else(|| FloodgateError::UnknownLimit(item.name.clone()))?;
            (registration.builder)()?
        };
        debug!(name = %item.name, "creating bucket");

        // Two callers may race here; or_insert_with keeps exactly one
        // bucket, before any put has touched the loser.
        let entry = self.buckets.entry(item.name.clone()).or_insert_with(|| BucketEntry {
            bucket,
            last_used: Mutex::new(Instant::now()),
        });
        Ok(entry.bucket.clone())
    }

    /// Number of live bucket instances.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Start the recurring leak duty. Idempotent; runs until
    /// [`shutdown`](Self::shutdown).
    pub fn schedule_leak(self: &Arc<Self>) {
        if self.leak_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let period = self.maintenance.leak_interval;
        self.spawn_maintenance("leak", period, |registry| async move {
            registry.leak_pass().await;
        });
    }

    /// Start the recurring flush duty. Idempotent; runs until
    /// [`shutdown`](Self::shutdown).
    pub fn schedule_flush(self: &Arc<Self>) {
        if self.flush_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let period = self.maintenance.flush_interval;
        self.spawn_maintenance("flush", period, |registry| async move {
            registry.flush_pass().await;
        });
    }

    fn spawn_maintenance<F, Fut>(self: &Arc<Self>, duty: &'static str, period: Duration, pass: F)
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        // The task holds only a weak reference, so an abandoned registry is
        // collected and its duties wind down on their own.
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(registry) = weak.upgrade() else { break };
                        pass(registry).await;
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            trace!(duty, "maintenance task stopped");
        });
        self.tasks.lock().push(handle);
    }

    /// One leak pass over every live bucket.
    async fn leak_pass(&self) {
        let now = match self.clock.now().await {
            Ok(now) => now,
            Err(e) => {
                warn!(error = %e, "skipping leak pass: clock unavailable");
                return;
            }
        };

        // Snapshot the live buckets so no map lock is held across awaits.
        let buckets: Vec<(String, Arc<dyn Bucket>)> = self
            .buckets
            .iter()
            .map(|e| (e.key().clone(), e.value().bucket.clone()))
            .collect();

        let mut dropped = 0;
        for (name, bucket) in buckets {
            match bucket.leak(now).await {
                Ok(n) => dropped += n,
                Err(e) => warn!(name = %name, error = %e, "leak failed"),
            }
        }
        if dropped > 0 {
            debug!(dropped, "leak pass expired stale entries");
        }
    }

    /// One flush pass: reclaim buckets that are empty and have not been
    /// routed to for longer than the idle threshold. The registered rates
    /// survive; the bucket is recreated on next reference.
    async fn flush_pass(&self) {
        let idle = self.maintenance.idle_threshold;
        let candidates: Vec<(String, Arc<dyn Bucket>)> = self
            .buckets
            .iter()
            .filter(|e| e.value().last_used.lock().elapsed() >= idle)
            .map(|e| (e.key().clone(), e.value().bucket.clone()))
            .collect();

        for (name, bucket) in candidates {
            match bucket.count().await {
                Ok(0) => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!(name = %name, error = %e, "flush check failed");
                    continue;
                }
            }
            if let Err(e) = bucket.flush().await {
                warn!(name = %name, error = %e, "flush failed");
                continue;
            }
            // Re-check idleness at removal time: a caller that routed to
            // this bucket since the snapshot bumped last_used and keeps it.
            let removed = self
                .buckets
                .remove_if(&name, |_, entry| entry.last_used.lock().elapsed() >= idle)
                .is_some();
            if removed {
                debug!(name = %name, "reclaimed idle bucket");
            }
        }
    }

    /// Stop both maintenance duties. Idempotent; also invoked on drop.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let mut tasks = self.tasks.lock();
        if tasks.is_empty() {
            return;
        }
        for handle in tasks.drain(..) {
            handle.abort();
        }
        info!("bucket registry maintenance stopped");
    }
}

impl Drop for BucketRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
