//! Cancellable timer handles
//!
//! Every lifecycle timer (peer idle, lobby reap, queue probe) is owned by
//! its subject and aborted when the subject is destroyed. Timer bodies must
//! still re-check their subject under the state lock before acting; a fire
//! racing a teardown is a no-op.

use std::future::Future;

use tokio::task::JoinHandle;

/// Owned handle to a spawned timer task. Dropping or cancelling aborts it.
#[derive(Debug)]
pub struct TimerHandle {
    handle: JoinHandle<()>,
}

impl TimerHandle {
    /// Spawn a timer body onto the runtime
    pub fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(fut),
        }
    }

    /// Abort the timer; a no-op if it already ran to completion
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
