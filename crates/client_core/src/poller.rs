//! Cancellable fixed-delay loops.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{sync::Notify, task::JoinHandle};
use tracing::debug;

/// Liveness flag shared between a [`PollTask`] and its loop body.
///
/// The body checks it after every await before committing anything.
#[derive(Clone)]
pub struct Liveness {
    alive: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl Liveness {
    fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.alive.store(false, Ordering::Release);
        self.wake.notify_one();
    }

    /// Sleeps for `delay` or until cancelled; returns whether still alive.
    async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.wake.notified() => {}
        }
        self.is_alive()
    }
}

/// A loop that runs `tick`, then waits `interval`, until stopped.
///
/// Errors are the body's business: the next tick is scheduled regardless of
/// how the previous one went. Stopping does not abort an in-flight tick; it
/// only flips the liveness flag so the tick discards its result.
pub struct PollTask {
    name: &'static str,
    liveness: Liveness,
    handle: JoinHandle<()>,
}

impl PollTask {
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut(Liveness) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let liveness = Liveness::new();
        let task_liveness = liveness.clone();
        let handle = tokio::spawn(async move {
            debug!(poller = name, "poll loop started");
            while task_liveness.is_alive() {
                tick(task_liveness.clone()).await;
                if !task_liveness.sleep(interval).await {
                    break;
                }
            }
            debug!(poller = name, "poll loop stopped");
        });
        Self {
            name,
            liveness,
            handle,
        }
    }

    pub fn stop(&self) {
        debug!(poller = self.name, "stopping poll loop");
        self.liveness.cancel();
    }

    pub fn is_live(&self) -> bool {
        self.liveness.is_alive()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.liveness.cancel();
    }
}
