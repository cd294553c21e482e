//! FIFO-fair bounded concurrency for resolution fan-out and installs.

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use tokio::sync::Semaphore;

/// At most `limit` gated jobs run at once; waiters are admitted in arrival order.
#[derive(Debug)]
pub struct Gate {
    permits: Semaphore,
}

impl Gate {
    pub fn new(limit: usize) -> Self {
        Self { permits: Semaphore::new(limit.max(1)) }
    }

    /// Run one job once a slot frees up.
    pub async fn run<F: Future>(&self, job: F) -> F::Output {
        // The semaphore is never closed, so acquisition only waits.
        let _permit = self.permits.acquire().await;
        job.await
    }

    /// Run a batch of fallible jobs through the gate, yielding to the scheduler
    /// after each one and reporting `(finished, total)` as they settle.
    ///
    /// Stops at the first error; jobs still queued are dropped unstarted.
    pub async fn run_all<I, F, T, E>(&self, jobs: I, mut on_settled: impl FnMut(usize, usize)) -> Result<Vec<T>, E>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>>,
    {
        let mut pending: FuturesUnordered<_> = jobs
            .into_iter()
            .map(|job| async move {
                let out = self.run(job).await;
                tokio::task::yield_now().await;
                out
            })
            .collect();
        let total = pending.len();
        let mut done = Vec::with_capacity(total);
        while let Some(result) = pending.next().await {
            done.push(result?);
            on_settled(done.len(), total);
        }
        Ok(done)
    }
}
