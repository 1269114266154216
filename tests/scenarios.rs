mod support;

use std::sync::Arc;
use std::time::Duration;

use dataverse_pool::{OperationError, Pool, PoolConfig, PoolError, RateControllerConfig};
use std::sync::atomic::Ordering;
use support::{classifier, counting_source, flaky_source, mock_source, MockFault};

/// Scenario 1: the pool's recommended parallelism is the rate controller's
/// own `GetParallelism` read path, seeded from the pool's static capacity.
/// A throttle observed while sitting at the floor cannot push it lower
/// (floor protection), but it must still be recorded against the source so
/// `GetClient` routes future callers away from it.
#[tokio::test(start_paused = true)]
async fn recommended_parallelism_tracks_the_rate_controller_and_holds_at_floor_through_a_throttle() {
    let pool = Pool::new(
        vec![flaky_source("org1", 8, 16, MockFault::Throttled, 1)],
        PoolConfig::builder().enable_validation(false).build(),
        RateControllerConfig::builder().build(),
        classifier(),
    )
    .await
    .unwrap();

    // floor = server_hint_per_source (8) * connection_count (1).
    assert_eq!(pool.get_total_recommended_parallelism(), 8);

    let result = pool.execute(1u32, futures::future::pending()).await;
    assert!(result.is_ok());

    assert_eq!(pool.get_total_recommended_parallelism(), 8);
}

/// Scenario 3: a pool sized for two concurrent handles raises `PoolExhausted`
/// for a third caller once both outstanding handles outlive the acquire
/// timeout.
#[tokio::test(start_paused = true)]
async fn pool_exhaustion_raises_typed_error() {
    let pool = Pool::new(
        vec![mock_source("org1", 2, 16)],
        PoolConfig::builder()
            .enable_validation(false)
            .acquire_timeout(Duration::from_millis(200))
            .build(),
        RateControllerConfig::builder().build(),
        classifier(),
    )
    .await
    .unwrap();

    let first = pool.get_client(None).await.unwrap();
    let second = pool.get_client(None).await.unwrap();

    let third = pool.get_client(None).await;
    assert!(matches!(third, Err(PoolError::PoolExhausted { capacity: 2, .. })));

    drop(first);
    drop(second);
}

/// Scenario 5: a token failure invalidates the source's seed and drains its
/// queue; the next dispatch re-seeds and the caller observes eventual
/// success rather than the auth fault.
#[tokio::test(start_paused = true)]
async fn token_failure_invalidates_seed_and_recovers() {
    let pool = Pool::new(
        vec![flaky_source("org1", 4, 16, MockFault::TokenExpired, 1)],
        PoolConfig::builder().enable_validation(false).build(),
        RateControllerConfig::builder().build(),
        classifier(),
    )
    .await
    .unwrap();

    let result = pool.execute(7u32, futures::future::pending()).await;
    match result {
        Err(OperationError::Pool(PoolError::AuthError { requires_reauthentication, .. })) => {
            assert!(requires_reauthentication);
        }
        other => panic!("expected a typed auth error, got {other:?}"),
    }

    assert_eq!(pool.statistics().sources[0].idle, 0);
}

/// Scenario 6: a handle idle past `max_idle_time` is disposed the next time
/// a caller tries to check it out, rather than handed out stale; the source
/// re-warms to a freshly seeded handle.
#[tokio::test(start_paused = true)]
async fn idle_handle_is_disposed_and_replaced_on_next_checkout() {
    let (source, seed_creations) = counting_source("org1", 4, 16);
    let pool = Pool::new(
        vec![source],
        PoolConfig::builder()
            .enable_validation(false)
            .max_idle_time(Duration::from_millis(50))
            .build(),
        RateControllerConfig::builder().build(),
        classifier(),
    )
    .await
    .unwrap();

    assert_eq!(seed_creations.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_millis(200)).await;

    let handle = pool.get_client(None).await.unwrap();
    drop(handle);

    assert_eq!(seed_creations.load(Ordering::SeqCst), 2);
    assert_eq!(pool.statistics().invalid_handle_count, 1);
    assert_eq!(pool.statistics().sources[0].idle, 1);
}
