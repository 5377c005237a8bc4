//! Cross-module admission properties.

use std::sync::Arc;
use std::time::Duration;

use floodgate::{
    blocking, BucketRegistry, Clock, Limiter, ManualClock, Rate, SystemClock,
};

fn registry_at(clock: Arc<ManualClock>) -> Arc<BucketRegistry> {
    BucketRegistry::new(clock as Arc<dyn Clock>)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquires_never_exceed_capacity() {
    init_tracing();
    let registry = registry_at(Arc::new(ManualClock::new(0)));
    registry.register("api", vec![Rate::per_second(5)]).unwrap();
    let limiter = Arc::new(Limiter::new(registry).no_raise_on_limit());

    let mut handles = Vec::new();
    for _ in 0..20 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            limiter.try_acquire("api").await.unwrap()
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_weighted_acquires_respect_capacity() {
    init_tracing();
    let registry = registry_at(Arc::new(ManualClock::new(0)));
    registry.register("api", vec![Rate::per_second(10)]).unwrap();
    let limiter = Arc::new(Limiter::new(registry).no_raise_on_limit());

    let mut handles = Vec::new();
    for _ in 0..12 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            limiter.try_acquire_weighted("api", 3).await.unwrap()
        }));
    }

    let mut admitted_weight = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted_weight += 3;
        }
    }
    // At most three weight-3 items fit into a capacity of 10.
    assert!(admitted_weight <= 9);
    assert!(admitted_weight > 0);
}

/// A scripted acquire sequence: (weight, clock advance after the call).
const SCRIPT: &[(u64, u64)] = &[
    (1, 0),
    (1, 0),
    (1, 200),
    (2, 0),
    (0, 500),
    (1, 400),
    (1, 0),
    (3, 100),
    (1, 0),
];

fn rates() -> Vec<Rate> {
    vec![Rate::new(3, Duration::from_millis(1000))]
}

#[tokio::test]
async fn blocking_and_async_disciplines_decide_identically() {
    // Async discipline.
    let clock = Arc::new(ManualClock::new(0));
    let registry = registry_at(clock.clone());
    registry.register("api", rates()).unwrap();
    let limiter = Limiter::new(registry).no_raise_on_limit();

    let mut async_decisions = Vec::new();
    for &(weight, advance) in SCRIPT {
        async_decisions.push(limiter.try_acquire_weighted("api", weight).await.unwrap());
        clock.advance(advance);
    }
    limiter.registry().shutdown();

    // Blocking discipline, identical collaborator behavior.
    let clock = Arc::new(ManualClock::new(0));
    let registry = registry_at(clock.clone());
    registry.register("api", rates()).unwrap();
    let handle = tokio::task::spawn_blocking(move || {
        let limiter = blocking::Limiter::new(registry).unwrap().no_raise_on_limit();
        let mut decisions = Vec::new();
        for &(weight, advance) in SCRIPT {
            decisions.push(limiter.try_acquire_weighted("api", weight).unwrap());
            clock.advance(advance);
        }
        limiter.shutdown();
        decisions
    });
    let blocking_decisions = handle.await.unwrap();

    assert_eq!(async_decisions, blocking_decisions);
}

#[tokio::test]
async fn three_immediate_acquires_admit_exactly_two() {
    let registry = BucketRegistry::new(Arc::new(SystemClock) as Arc<dyn Clock>);
    registry.register("api", vec![Rate::per_second(2)]).unwrap();
    let limiter = Limiter::new(registry).no_raise_on_limit();

    let decisions = [
        limiter.try_acquire("api").await.unwrap(),
        limiter.try_acquire("api").await.unwrap(),
        limiter.try_acquire("api").await.unwrap(),
    ];
    assert_eq!(decisions, [true, true, false]);
}
