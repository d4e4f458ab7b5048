mod common;

use std::time::Duration;

use common::{eventually, queued, scripted_pool};
use sql_bridge::{PoolOptions, SqlBridgeError};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_opens_more_than_max_size() -> Result<(), SqlBridgeError> {
    let (pool, probe) = scripted_pool(PoolOptions::new(3));
    probe.set_execute_delay(Duration::from_millis(20));

    let mut tasks = Vec::new();
    for i in 0..12 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            pool.query(format!("select {i}")).execute().await
        }));
    }
    for task in tasks {
        let rows = task.await.expect("task panicked")?;
        assert_eq!(rows.size(), 1);
    }

    assert!(probe.max_open() <= 3, "opened {} connections", probe.max_open());
    assert!(probe.connects() <= 3);
    assert_eq!(probe.executions().len(), 12);
    let status = pool.status();
    assert_eq!(status.waiting, 0);
    assert!(status.size <= 3);
    Ok(())
}

#[tokio::test]
async fn waiters_are_served_in_arrival_order() -> Result<(), SqlBridgeError> {
    let (pool, probe) = scripted_pool(PoolOptions::new(1));
    let held = pool.get_connection().await?;

    let mut tasks = Vec::new();
    for i in 0..10 {
        let task_pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            task_pool.query(format!("select {i}")).execute().await
        }));
        queued(&pool, i + 1).await;
    }

    drop(held);
    for task in tasks {
        task.await.expect("task panicked")?;
    }

    let expected: Vec<String> = (0..10).map(|i| format!("select {i}")).collect();
    assert_eq!(probe.executions(), expected);
    assert_eq!(probe.connects(), 1);
    Ok(())
}

#[tokio::test]
async fn closed_pool_fails_fast_without_connecting() {
    let (pool, probe) = scripted_pool(PoolOptions::new(2));
    pool.close().await;

    let err = pool.query("select 1").execute().await.unwrap_err();
    assert!(matches!(err, SqlBridgeError::PoolClosed));
    let err = pool.get_connection().await.unwrap_err();
    assert!(matches!(err, SqlBridgeError::PoolClosed));
    assert_eq!(probe.connects(), 0);
    assert!(probe.executions().is_empty());

    // Closing twice is harmless.
    pool.close().await;
    assert!(pool.status().closed);
}

#[tokio::test]
async fn close_fails_queued_requests() -> Result<(), SqlBridgeError> {
    let (pool, probe) = scripted_pool(PoolOptions::new(1));
    let held = pool.get_connection().await?;

    let pending = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.query("select 1").execute().await })
    };
    queued(&pool, 1).await;
    pool.close().await;

    let err = pending.await.expect("task panicked").unwrap_err();
    assert!(matches!(err, SqlBridgeError::PoolClosed));
    assert_eq!(pool.status().waiting, 0);

    // The leased connection is closed once it comes back.
    drop(held);
    eventually("leased connection closed", || probe.closes() == 1).await;
    assert_eq!(probe.open(), 0);
    Ok(())
}

#[tokio::test]
async fn close_waits_for_idle_connections() -> Result<(), SqlBridgeError> {
    let (pool, probe) = scripted_pool(PoolOptions::new(2));
    let first = pool.get_connection().await?;
    let second = pool.get_connection().await?;
    drop(second);
    assert_eq!(pool.status().idle, 1);

    pool.close().await;
    assert_eq!(probe.closes(), 1);
    assert_eq!(pool.status().idle, 0);

    drop(first);
    eventually("all connections closed", || probe.open() == 0).await;
    assert_eq!(probe.closes(), 2);
    Ok(())
}

#[tokio::test]
async fn acquire_times_out_and_leaves_the_queue() -> Result<(), SqlBridgeError> {
    let (pool, _probe) = scripted_pool(
        PoolOptions::builder()
            .max_size(1)
            .connection_timeout(Duration::from_millis(30))
            .finish(),
    );
    let held = pool.get_connection().await?;

    let err = pool.query("select 1").execute().await.unwrap_err();
    assert!(matches!(err, SqlBridgeError::PoolTimeout(d) if d == Duration::from_millis(30)));
    assert_eq!(pool.status().waiting, 0);

    drop(held);
    pool.query("select 1").execute().await?;
    Ok(())
}

#[tokio::test]
async fn full_wait_queue_rejects_new_requests() -> Result<(), SqlBridgeError> {
    let (pool, _probe) = scripted_pool(
        PoolOptions::builder()
            .max_size(1)
            .max_wait_queue_size(1)
            .finish(),
    );
    let held = pool.get_connection().await?;

    let first_waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.query("select 1").execute().await })
    };
    queued(&pool, 1).await;

    let err = pool.query("select 2").execute().await.unwrap_err();
    assert!(matches!(err, SqlBridgeError::PoolExhausted(1)));

    drop(held);
    first_waiter.await.expect("task panicked")?;
    Ok(())
}

#[tokio::test]
async fn failed_replacement_fails_only_the_head_waiter() -> Result<(), SqlBridgeError> {
    let (pool, probe) = scripted_pool(PoolOptions::new(1));
    let mut lease = pool.connection_pool().acquire().await?;

    let head = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.query("select head").execute().await })
    };
    queued(&pool, 1).await;
    let second = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.query("select second").execute().await })
    };
    queued(&pool, 2).await;

    probe.fail_next_connects(1);
    lease.mark_broken();
    drop(lease);

    let err = head.await.expect("task panicked").unwrap_err();
    assert!(matches!(err, SqlBridgeError::ConnectionError(_)));
    assert!(err.is_connection_error());

    let rows = second.await.expect("task panicked")?;
    assert_eq!(rows.first().and_then(|r| r.get_text("sql")), Some("select second"));
    assert_eq!(probe.connects(), 2);
    assert!(probe.max_open() <= 1);
    Ok(())
}
