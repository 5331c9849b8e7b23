//! Cancellable background timers owned by interfaces.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A spawned timer that stops when cancelled or dropped.
///
/// A tick that is already running when the timer is cancelled is interrupted
/// at its next await point.
#[derive(Debug)]
pub struct TimerTask {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TimerTask {
    /// Run `f` once after `delay`.
    pub fn once<F, Fut>(delay: Duration, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {
                    trace!("one-shot timer cancelled before firing");
                }
                _ = tokio::time::sleep(delay) => {
                    tokio::select! {
                        _ = child.cancelled() => {}
                        _ = f() => {}
                    }
                }
            }
        });
        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Run `f` every `period`, first run one period from now.
    pub fn periodic<F, Fut>(period: Duration, mut f: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = interval.tick() => {
                        tokio::select! {
                            _ = child.cancelled() => break,
                            _ = f() => {}
                        }
                    }
                }
            }
            trace!("periodic timer stopped");
        });
        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Stop the timer. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the task has completed (fired, or observed cancellation).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Cancel and wait until the task has exited.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TimerTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_once_fires_after_delay() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let timer = TimerTask::once(Duration::from_millis(100), move || async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        timer.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_once_never_fires() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let timer = TimerTask::once(Duration::from_millis(100), move || async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        timer.cancel();
        assert!(timer.is_cancelled());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_stops_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let timer = TimerTask::periodic(Duration::from_millis(10), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(35)).await;
        let fired = count.load(Ordering::SeqCst);
        assert!((2..=4).contains(&fired), "fired {} times", fired);

        drop(timer);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), fired);
    }
}
