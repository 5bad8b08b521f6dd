//! Generic polling engine behind the task and virtual machine monitors.
//!
//! One monitor call tracks a set of objects:
//!
//! ```text
//!   monitor(targets) ──► MonitorCall { active: key → object }
//!        │                    ▲              │
//!        │  poll every delay  │ remove       │ notify once
//!        ├──────────────► StatusFunction     ▼
//!        │                               callback + EventBus
//!        └─ optional deadline ──► remaining objects time out
//! ```
//!
//! An object leaves the active set exactly once, under the set's lock, and
//! only the caller that removed it sends its notification.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::{Builder, Handle};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result, SchedulerError};
use crate::events::{dispatch, EventBus, LatchCallback, MonitorCallback, MonitorNotice, MonitorOutcome};
use crate::latch::CountDownLatch;
use crate::scheduler::{ScheduleHandle, Scheduler};
use crate::status::{MonitorStatus, Monitorable, StatusFunction};

/// Polls objects until a [`StatusFunction`] reports them finished.
#[derive(Debug)]
pub struct MonitoringService {
    scheduler: Arc<Scheduler>,
    events: EventBus,
    poll_delay: Duration,
}

impl MonitoringService {
    /// Create a service on an existing scheduler.
    pub fn new(scheduler: Arc<Scheduler>, config: &MonitorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            scheduler,
            events: EventBus::new(),
            poll_delay: config.poll_delay(),
        })
    }

    /// Start a service with its own scheduler.
    pub fn start(config: &MonitorConfig) -> Result<Self> {
        config.validate()?;
        let scheduler = Scheduler::start(config.max_scheduler_threads)?;
        Self::new(Arc::new(scheduler), config)
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn poll_delay(&self) -> Duration {
        self.poll_delay
    }

    /// Receive every terminal notification published by this service.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorNotice> {
        self.events.subscribe()
    }

    /// Shut down the underlying scheduler.
    pub fn close(&self) {
        self.scheduler.close();
    }

    /// Start polling `targets` without waiting.
    ///
    /// `callback` receives one notification per distinct object. With
    /// `max_wait`, objects still unresolved when it elapses are notified as
    /// timed out and polling stops.
    pub fn monitor<T: Monitorable>(
        &self,
        targets: Vec<T>,
        function: Arc<dyn StatusFunction<T>>,
        callback: Arc<dyn MonitorCallback<T>>,
        max_wait: Option<Duration>,
    ) -> Result<MonitorHandle<T>> {
        let active = collect_targets(targets, max_wait)?;
        self.start_call(active, function, callback, max_wait)
    }

    /// Poll `targets` until all of them are finished, or until `max_wait`
    /// elapses.
    ///
    /// Closing the service while waiting interrupts the call and returns
    /// [`SchedulerError::Closed`].
    pub async fn await_completion<T: Monitorable>(
        &self,
        targets: Vec<T>,
        function: Arc<dyn StatusFunction<T>>,
        max_wait: Option<Duration>,
    ) -> Result<()> {
        let active = collect_targets(targets, max_wait)?;
        let latch = Arc::new(CountDownLatch::new(active.len()));
        let callback = Arc::new(LatchCallback::new(Arc::clone(&latch)));
        let closed = self.scheduler.closed();

        let handle = self.start_call(active, function, callback, max_wait)?;

        let finished = async {
            match max_wait {
                Some(max_wait) => {
                    if !latch.wait_timeout(max_wait).await {
                        debug!(
                            monitor_id = %handle.id(),
                            remaining = latch.count(),
                            "Stopped waiting after max wait"
                        );
                    }
                }
                None => latch.wait().await,
            }
        };

        tokio::select! {
            biased;
            _ = closed => {
                warn!(
                    monitor_id = %handle.id(),
                    remaining = handle.remaining(),
                    "Scheduler closed while waiting for completion"
                );
                Err(SchedulerError::Closed.into())
            }
            _ = finished => Ok(()),
        }
    }

    /// Blocking form of [`MonitoringService::await_completion`], for callers
    /// outside any async runtime.
    ///
    /// The wait runs on a private single-thread runtime so that closing the
    /// scheduler cannot pull timers out from under it.
    pub fn await_completion_blocking<T: Monitorable>(
        &self,
        targets: Vec<T>,
        function: Arc<dyn StatusFunction<T>>,
        max_wait: Option<Duration>,
    ) -> Result<()> {
        if Handle::try_current().is_ok() {
            return Err(MonitorError::BlockingInAsyncContext);
        }
        if self.scheduler.is_closed() {
            return Err(SchedulerError::Closed.into());
        }

        let waiter = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(SchedulerError::Runtime)?;
        waiter.block_on(self.await_completion(targets, function, max_wait))
    }

    #[instrument(skip_all, fields(targets = active.len()))]
    fn start_call<T: Monitorable>(
        &self,
        active: HashMap<String, T>,
        function: Arc<dyn StatusFunction<T>>,
        callback: Arc<dyn MonitorCallback<T>>,
        max_wait: Option<Duration>,
    ) -> Result<MonitorHandle<T>> {
        let call = Arc::new(MonitorCall {
            id: Uuid::new_v4(),
            active: Mutex::new(active),
            callback,
            events: self.events.clone(),
            runtime: self.scheduler.handle().clone(),
            poll: Mutex::new(None),
            deadline: Mutex::new(None),
        });

        info!(
            monitor_id = %call.id,
            targets = call.remaining(),
            poll_delay_ms = self.poll_delay.as_millis() as u64,
            max_wait_ms = max_wait.map(|d| d.as_millis() as u64),
            "Starting monitor"
        );

        // The deadline goes first: it cannot fire before the poll is
        // registered unless max_wait is shorter than the registration itself,
        // and an emptied set stops the poll on its own anyway.
        if let Some(max_wait) = max_wait {
            let expiring = Arc::clone(&call);
            let handle = self
                .scheduler
                .schedule_once(max_wait, async move { expiring.expire() })?;
            *lock(&call.deadline) = Some(handle);
        }

        let polling = Arc::clone(&call);
        let poll = self.scheduler.schedule_with_fixed_delay(
            Duration::ZERO,
            self.poll_delay,
            move || {
                let call = Arc::clone(&polling);
                let function = Arc::clone(&function);
                async move { call.poll_once(function.as_ref()).await }
            },
        );

        match poll {
            Ok(handle) => *lock(&call.poll) = Some(handle),
            Err(e) => {
                call.cancel_deadline();
                return Err(e.into());
            }
        }

        Ok(MonitorHandle { call })
    }
}

/// Deduplicate and validate the objects of a call.
fn collect_targets<T: Monitorable>(targets: Vec<T>, max_wait: Option<Duration>) -> Result<HashMap<String, T>> {
    if targets.is_empty() {
        return Err(MonitorError::EmptyTargets);
    }
    if max_wait.is_some_and(|d| d.is_zero()) {
        return Err(MonitorError::InvalidArgument(
            "max wait must be greater than zero".to_string(),
        ));
    }

    Ok(targets.into_iter().map(|t| (t.monitor_key(), t)).collect())
}

fn lock<V>(mutex: &Mutex<V>) -> std::sync::MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State of one monitor call.
struct MonitorCall<T> {
    id: Uuid,
    /// Objects not yet notified, holding their last observed form
    active: Mutex<HashMap<String, T>>,
    callback: Arc<dyn MonitorCallback<T>>,
    events: EventBus,
    runtime: Handle,
    poll: Mutex<Option<ScheduleHandle>>,
    deadline: Mutex<Option<ScheduleHandle>>,
}

impl<T: Monitorable> MonitorCall<T> {
    fn remaining(&self) -> usize {
        lock(&self.active).len()
    }

    /// One polling tick. Objects are read sequentially; a failed read leaves
    /// the object active for the next tick.
    async fn poll_once(&self, function: &dyn StatusFunction<T>) -> ControlFlow<()> {
        let snapshot: Vec<(String, T)> = lock(&self.active)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (key, target) in snapshot {
            match function.check(&target).await {
                Ok((refreshed, MonitorStatus::Done)) => {
                    self.resolve(&key, refreshed, MonitorOutcome::Completed);
                }
                Ok((refreshed, MonitorStatus::Failed)) => {
                    self.resolve(&key, refreshed, MonitorOutcome::Failed);
                }
                Ok((refreshed, MonitorStatus::Continue)) => {
                    debug!(monitor_id = %self.id, key = %key, "Not finished yet");
                    if let Some(slot) = lock(&self.active).get_mut(&key) {
                        *slot = refreshed;
                    }
                }
                Err(e) => {
                    warn!(
                        monitor_id = %self.id,
                        key = %key,
                        error = %e,
                        transient = e.is_transient(),
                        "Failed to read status, retrying on next tick"
                    );
                }
            }
        }

        if self.remaining() == 0 {
            info!(monitor_id = %self.id, "All monitored objects finished");
            self.cancel_deadline();
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Deadline reached: every remaining object times out.
    fn expire(&self) {
        let expired: Vec<(String, T)> = lock(&self.active).drain().collect();
        if !expired.is_empty() {
            warn!(monitor_id = %self.id, expired = expired.len(), "Monitor timed out");
        }

        if let Some(poll) = lock(&self.poll).as_ref() {
            poll.cancel();
        }

        for (key, target) in expired {
            self.notify(key, target, MonitorOutcome::Timeout);
        }
    }

    fn resolve(&self, key: &str, target: T, outcome: MonitorOutcome) {
        // Absent when the deadline got there first.
        if lock(&self.active).remove(key).is_some() {
            self.notify(key.to_string(), target, outcome);
        }
    }

    fn cancel_deadline(&self) {
        if let Some(deadline) = lock(&self.deadline).as_ref() {
            deadline.cancel();
        }
    }

    fn notify(&self, key: String, target: T, outcome: MonitorOutcome) {
        info!(monitor_id = %self.id, key = %key, outcome = %outcome, "Monitored object finished");

        self.events.publish(MonitorNotice {
            monitor_id: self.id,
            key,
            outcome,
            at: Utc::now(),
        });

        let callback = Arc::clone(&self.callback);
        self.runtime.spawn(async move {
            dispatch(callback.as_ref(), outcome, &target).await;
        });
    }
}

/// Handle to a running monitor call.
pub struct MonitorHandle<T> {
    call: Arc<MonitorCall<T>>,
}

impl<T: Monitorable> MonitorHandle<T> {
    pub fn id(&self) -> Uuid {
        self.call.id
    }

    /// Objects not notified yet.
    pub fn remaining(&self) -> usize {
        self.call.remaining()
    }

    /// Whether every object received its notification.
    pub fn is_finished(&self) -> bool {
        self.remaining() == 0
    }
}

impl<T> std::fmt::Debug for MonitorHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorHandle").field("id", &self.call.id).finish()
    }
}
