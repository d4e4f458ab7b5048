#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sql_bridge::test_utils::{Probe, ScriptedDriver};
use sql_bridge::{ConnectOptions, Pool, PoolOptions};

/// Pool over the scripted `mock:` driver, observed through the returned probe.
pub fn scripted_pool(options: PoolOptions) -> (Pool, Probe) {
    let probe = Probe::default();
    let pool = Pool::with_driver(
        Arc::new(ScriptedDriver::with_probe(probe.clone())),
        ConnectOptions::new("mock:integration"),
        options,
    )
    .expect("valid pool options");
    (pool, probe)
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until exactly `count` requests are queued on `pool`.
pub async fn queued(pool: &Pool, count: usize) {
    eventually("queued requests", || pool.status().waiting == count).await;
}
