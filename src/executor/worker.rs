use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::SqlBridgeError;

/// Bounded pool of blocking worker slots.
///
/// Jobs run on tokio's blocking threads, but at most `size` at a time; further submissions wait
/// for a slot. After [`WorkerPool::shutdown`] new submissions are rejected, while jobs already
/// holding a slot run to completion.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Run `job` on a blocking thread once a slot is free.
    ///
    /// The job owns whatever it captured (typically a lease). If the pool rejects it, the job is
    /// dropped before the error is returned, so those captures are released first.
    ///
    /// # Errors
    /// [`SqlBridgeError::WorkerRejected`] after shutdown; [`SqlBridgeError::ExecutionError`] if
    /// the job panicked.
    pub async fn run<F, R>(&self, job: F) -> Result<R, SqlBridgeError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            drop(job);
            return Err(SqlBridgeError::WorkerRejected(
                "worker pool is shut down".to_string(),
            ));
        };

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| SqlBridgeError::ExecutionError(format!("blocking worker failed: {e}")))
    }

    /// Stop accepting jobs.
    pub fn shutdown(&self) {
        self.permits.close();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.permits.is_closed()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently running a job.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn saturation_waits_for_a_slot() {
        let workers = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let workers = workers.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                workers
                    .run(move || {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(20));
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(workers.available(), 2);
    }

    #[tokio::test]
    async fn shutdown_rejects_and_drops_the_job() {
        struct Flag(Arc<AtomicUsize>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let workers = WorkerPool::new(1);
        workers.shutdown();
        let dropped = Arc::new(AtomicUsize::new(0));
        let flag = Flag(Arc::clone(&dropped));
        let err = workers
            .run(move || {
                let _keep = &flag;
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SqlBridgeError::WorkerRejected(_)));
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_job_is_an_execution_error() {
        let workers = WorkerPool::new(1);
        let err = workers
            .run(|| -> u8 { panic!("boom") })
            .await
            .unwrap_err();
        assert!(matches!(err, SqlBridgeError::ExecutionError(_)));
        assert_eq!(workers.available(), 1);
    }
}
