use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Fixed-size counting limiter for outstanding network requests. A permit is
/// held only for the duration of the wrapped future.
#[derive(Clone)]
pub struct Gate {
    permits: Arc<Semaphore>,
    size: usize,
}

impl Gate {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Gate { permits: Arc::new(Semaphore::new(size)), size }
    }

    pub fn size(&self) -> usize { self.size }

    pub async fn run<F: Future>(&self, fut: F) -> F::Output {
        // the semaphore is never closed
        let _permit = self.permits.acquire().await.ok();
        fut.await
    }

    /// Depth of the task queue feeding this gate: enough queued units to keep
    /// every permit busy while others write their results.
    pub fn queue_depth(&self) -> usize { self.size * 2 }
}
