//! Periodic execution pool shared by all monitors.
//!
//! The scheduler owns a dedicated multi-thread tokio runtime so that polling
//! keeps running regardless of what the caller's own runtime (if any) is doing,
//! and so that blocking waits can be driven from plain OS threads.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::SchedulerError;

/// Time given to in-flight actions when the scheduler is closed from a
/// synchronous context.
const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Handle to a scheduled action. Dropping it does not cancel the action.
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    abort: AbortHandle,
}

impl ScheduleHandle {
    /// Stop future executions of the action.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    /// Whether the action ended, by itself or through cancellation.
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Periodic execution pool.
pub struct Scheduler {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    worker_threads: usize,
    /// Flips to `true` once, when the scheduler is closed
    closed: watch::Sender<bool>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("worker_threads", &self.worker_threads)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Scheduler {
    /// Start a scheduler with at most `max_threads` worker threads.
    ///
    /// `0` selects a single worker, so scheduled actions never run
    /// concurrently with each other.
    pub fn start(max_threads: usize) -> Result<Self, SchedulerError> {
        let worker_threads = max_threads.max(1);

        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("abiquo-scheduler")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        info!(worker_threads, "Scheduler started");

        let (closed, _) = watch::channel(false);

        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
            worker_threads,
            closed,
        })
    }

    /// Number of worker threads driving scheduled actions.
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// Runtime handle, usable to block a non-async thread on a future.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn is_closed(&self) -> bool {
        self.runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Resolves once the scheduler is closed, immediately if it already is.
    ///
    /// The returned future does not depend on the scheduler's runtime, so it
    /// can be awaited from any runtime.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.closed.subscribe();
        async move {
            // An error means the scheduler itself is gone, which is closed too.
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }

    fn ensure_open(&self) -> Result<(), SchedulerError> {
        if self.is_closed() {
            return Err(SchedulerError::Closed);
        }
        Ok(())
    }

    /// Run `action` after `initial_delay`, then again `delay` after each run
    /// completes, until it returns [`ControlFlow::Break`] or the handle is
    /// cancelled.
    pub fn schedule_with_fixed_delay<F, Fut>(
        &self,
        initial_delay: Duration,
        delay: Duration,
        mut action: F,
    ) -> Result<ScheduleHandle, SchedulerError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        self.ensure_open()?;

        let task = self.handle.spawn(async move {
            if !initial_delay.is_zero() {
                sleep(initial_delay).await;
            }
            loop {
                if action().await.is_break() {
                    debug!("Periodic action finished");
                    break;
                }
                sleep(delay).await;
            }
        });

        Ok(ScheduleHandle {
            abort: task.abort_handle(),
        })
    }

    /// Run `action` once after `delay`, unless cancelled first.
    pub fn schedule_once<Fut>(&self, delay: Duration, action: Fut) -> Result<ScheduleHandle, SchedulerError>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.ensure_open()?;

        let task = self.handle.spawn(async move {
            sleep(delay).await;
            action.await;
        });

        Ok(ScheduleHandle {
            abort: task.abort_handle(),
        })
    }

    /// Shut the scheduler down, interrupting outstanding actions.
    ///
    /// Idempotent. Waiters on [`Scheduler::closed`] are released before the
    /// runtime goes down. From inside an async context the runtime is released
    /// in the background; otherwise in-flight actions get a short grace period.
    pub fn close(&self) {
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(runtime) = runtime {
            self.closed.send_replace(true);
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(CLOSE_GRACE_PERIOD);
            }
            info!("Scheduler closed");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fixed_delay_until_break() {
        let scheduler = Scheduler::start(2).unwrap();
        let runs = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&runs);
        let handle = scheduler
            .schedule_with_fixed_delay(Duration::ZERO, Duration::from_millis(20), move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) + 1 >= 3 {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                }
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_cancel_stops_ticks() {
        let scheduler = Scheduler::start(1).unwrap();
        let runs = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&runs);
        let handle = scheduler
            .schedule_with_fixed_delay(Duration::ZERO, Duration::from_millis(10), move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ControlFlow::Continue(())
                }
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_cancel = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(after_cancel > 0);
        assert_eq!(runs.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn test_schedule_once_can_be_cancelled() {
        let scheduler = Scheduler::start(1).unwrap();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&fired);
        let handle = scheduler
            .schedule_once(Duration::from_millis(50), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        handle.cancel();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_closed_signal_released_by_close() {
        let scheduler = Scheduler::start(1).unwrap();
        let closed = scheduler.closed();

        let waiter = tokio::spawn(closed);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        scheduler.close();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // Already closed: resolves right away
        tokio::time::timeout(Duration::from_millis(100), scheduler.closed())
            .await
            .unwrap();
    }

    #[test]
    fn test_zero_threads_selects_single_worker() {
        let scheduler = Scheduler::start(0).unwrap();
        assert_eq!(scheduler.worker_threads(), 1);
    }

    #[test]
    fn test_closed_scheduler_rejects_work() {
        let scheduler = Scheduler::start(1).unwrap();
        scheduler.close();
        scheduler.close();

        assert!(scheduler.is_closed());
        assert!(matches!(
            scheduler.schedule_with_fixed_delay(Duration::ZERO, Duration::from_millis(10), || async {
                ControlFlow::Break(())
            }),
            Err(SchedulerError::Closed)
        ));
        assert!(matches!(
            scheduler.schedule_once(Duration::ZERO, async {}),
            Err(SchedulerError::Closed)
        ));
    }
}
