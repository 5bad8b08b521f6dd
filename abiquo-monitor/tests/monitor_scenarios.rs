//! End-to-end monitor scenarios against the scripted mock API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use abiquo_api::{AsyncTask, MockApi, TaskState, TaskType};
use abiquo_common::LogFormat;
use abiquo_monitor::{
    AsyncTaskMonitor, MonitorCallback, MonitorConfig, MonitorError, MonitorOutcome, MonitoringService,
    SchedulerError,
};

/// Records every notification with the time it arrived.
struct Recorder {
    started: Instant,
    events: Mutex<Vec<(String, MonitorOutcome, Duration)>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            events: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, task: &AsyncTask, outcome: MonitorOutcome) {
        self.events
            .lock()
            .unwrap()
            .push((task.task_id.clone(), outcome, self.started.elapsed()));
    }

    fn events(&self) -> Vec<(String, MonitorOutcome, Duration)> {
        self.events.lock().unwrap().clone()
    }

    fn event_for(&self, task_id: &str) -> (MonitorOutcome, Duration) {
        let events = self.events();
        let (_, outcome, at) = events
            .iter()
            .find(|(id, _, _)| id == task_id)
            .unwrap_or_else(|| panic!("no event for {}", task_id));
        (*outcome, *at)
    }

    async fn wait_for(&self, count: usize, limit: Duration) {
        let deadline = Instant::now() + limit;
        while self.events.lock().unwrap().len() < count {
            assert!(Instant::now() < deadline, "timed out waiting for {} events", count);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl MonitorCallback<AsyncTask> for Recorder {
    async fn on_completed(&self, task: &AsyncTask) {
        self.record(task, MonitorOutcome::Completed);
    }

    async fn on_failed(&self, task: &AsyncTask) {
        self.record(task, MonitorOutcome::Failed);
    }

    async fn on_timeout(&self, task: &AsyncTask) {
        self.record(task, MonitorOutcome::Timeout);
    }
}

/// Tracks how many callbacks run at the same time.
#[derive(Default)]
struct OverlapTracker {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    done: AtomicUsize,
}

impl OverlapTracker {
    fn run(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        // Holds the worker thread, unlike an async sleep
        std::thread::sleep(Duration::from_millis(30));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.done.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MonitorCallback<AsyncTask> for OverlapTracker {
    async fn on_completed(&self, _task: &AsyncTask) {
        self.run();
    }

    async fn on_failed(&self, _task: &AsyncTask) {
        self.run();
    }

    async fn on_timeout(&self, _task: &AsyncTask) {
        self.run();
    }
}

fn setup(poll_delay_ms: u64) -> (Arc<MockApi>, Arc<MonitoringService>, AsyncTaskMonitor) {
    setup_with_threads(poll_delay_ms, 4)
}

fn setup_with_threads(
    poll_delay_ms: u64,
    max_scheduler_threads: usize,
) -> (Arc<MockApi>, Arc<MonitoringService>, AsyncTaskMonitor) {
    let _ = abiquo_common::init_logging("debug", LogFormat::Pretty);

    let config = MonitorConfig {
        poll_delay_ms,
        max_scheduler_threads,
    };
    let api = Arc::new(MockApi::new());
    let service = Arc::new(MonitoringService::start(&config).unwrap());
    let monitor = AsyncTaskMonitor::new(Arc::clone(&service), api.clone());
    (api, service, monitor)
}

fn scripted(api: &MockApi, id: &str, states: &[TaskState]) -> AsyncTask {
    let task = AsyncTask::new(id, TaskType::Deploy).with_state(TaskState::Pending);
    api.script_task(&task, states.iter().copied()).unwrap();
    task
}

#[tokio::test]
async fn test_completes_after_third_tick() {
    let (api, _service, monitor) = setup(1000);
    let task = scripted(
        &api,
        "deploy-1",
        &[TaskState::Started, TaskState::Started, TaskState::FinishedSuccessfully],
    );
    let recorder = Recorder::new();

    monitor.monitor(recorder.clone(), &[task]).unwrap();
    recorder.wait_for(1, Duration::from_secs(5)).await;

    let (outcome, at) = recorder.event_for("deploy-1");
    assert_eq!(outcome, MonitorOutcome::Completed);
    assert!(at >= Duration::from_millis(1900), "completed too early: {:?}", at);
    assert!(at < Duration::from_millis(3500), "completed too late: {:?}", at);
    assert_eq!(api.task_reads("deploy-1"), 3);
}

#[tokio::test]
async fn test_await_unblocks_after_third_tick() {
    let (api, _service, monitor) = setup(1000);
    let task = scripted(
        &api,
        "deploy-2",
        &[TaskState::Started, TaskState::Started, TaskState::FinishedSuccessfully],
    );

    let started = Instant::now();
    monitor.await_completion(&[task]).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(1900), "returned too early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(3500), "returned too late: {:?}", elapsed);
}

#[tokio::test]
async fn test_fails_after_second_tick() {
    let (api, _service, monitor) = setup(300);
    let task = scripted(&api, "deploy-3", &[TaskState::Started, TaskState::FinishedUnsuccessfully]);
    let recorder = Recorder::new();

    let handle = monitor.monitor(recorder.clone(), &[task]).unwrap();
    recorder.wait_for(1, Duration::from_secs(3)).await;

    let (outcome, at) = recorder.event_for("deploy-3");
    assert_eq!(outcome, MonitorOutcome::Failed);
    assert!(at >= Duration::from_millis(250));
    assert_eq!(api.task_reads("deploy-3"), 2);
    assert!(handle.is_finished());
}

#[tokio::test]
async fn test_timeout_fires_before_next_poll() {
    let (api, _service, monitor) = setup(1000);
    let task = scripted(&api, "stuck", &[TaskState::Started]);
    let recorder = Recorder::new();

    monitor
        .monitor_within(Duration::from_millis(500), recorder.clone(), &[task])
        .unwrap();
    recorder.wait_for(1, Duration::from_secs(2)).await;

    let (outcome, at) = recorder.event_for("stuck");
    assert_eq!(outcome, MonitorOutcome::Timeout);
    assert!(at >= Duration::from_millis(450), "timed out too early: {:?}", at);
    assert!(at < Duration::from_millis(1000), "timed out too late: {:?}", at);

    // Polling stopped with the timeout
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(api.task_reads("stuck"), 1);
    assert_eq!(recorder.events().len(), 1);
}

#[tokio::test]
async fn test_await_within_returns_by_max_wait() {
    let (api, _service, monitor) = setup(1000);
    let task = scripted(&api, "stuck-await", &[TaskState::Started]);

    let started = Instant::now();
    monitor
        .await_completion_within(Duration::from_millis(500), &[task])
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(900));
}

#[tokio::test]
async fn test_two_tasks_resolve_independently() {
    let (api, _service, monitor) = setup(300);
    let fast = scripted(&api, "fast", &[TaskState::FinishedSuccessfully]);
    let slow = scripted(
        &api,
        "slow",
        &[TaskState::Started, TaskState::Started, TaskState::FinishedSuccessfully],
    );
    let recorder = Recorder::new();

    monitor.monitor(recorder.clone(), &[fast, slow]).unwrap();
    recorder.wait_for(2, Duration::from_secs(3)).await;

    let (fast_outcome, fast_at) = recorder.event_for("fast");
    let (slow_outcome, slow_at) = recorder.event_for("slow");
    assert_eq!(fast_outcome, MonitorOutcome::Completed);
    assert_eq!(slow_outcome, MonitorOutcome::Completed);
    assert!(slow_at >= fast_at + Duration::from_millis(450));

    // The finished task is not polled again
    assert_eq!(api.task_reads("fast"), 1);
    assert_eq!(api.task_reads("slow"), 3);
}

#[tokio::test]
async fn test_await_blocks_until_last_task() {
    let (api, _service, monitor) = setup(300);
    let fast = scripted(&api, "fast-await", &[TaskState::FinishedSuccessfully]);
    let slow = scripted(
        &api,
        "slow-await",
        &[TaskState::Started, TaskState::Started, TaskState::FinishedUnsuccessfully],
    );

    let started = Instant::now();
    monitor.await_completion(&[fast, slow]).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(550));
    assert_eq!(api.task_reads("slow-await"), 3);
}

#[tokio::test]
async fn test_empty_task_set_is_rejected() {
    let (_api, service, monitor) = setup(100);
    let mut notices = service.subscribe();

    assert!(matches!(
        monitor.await_completion(&[]).await,
        Err(MonitorError::EmptyTargets)
    ));
    assert!(matches!(
        monitor.monitor(Recorder::new(), &[]),
        Err(MonitorError::EmptyTargets)
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn test_transient_read_errors_are_retried() {
    let (api, _service, monitor) = setup(100);
    let task = scripted(&api, "flaky", &[TaskState::FinishedSuccessfully]);
    api.fail_task_reads("flaky", 2).unwrap();
    let recorder = Recorder::new();

    monitor.monitor(recorder.clone(), &[task]).unwrap();
    recorder.wait_for(1, Duration::from_secs(3)).await;

    assert_eq!(recorder.event_for("flaky").0, MonitorOutcome::Completed);
    assert_eq!(api.task_reads("flaky"), 3);
}

#[tokio::test]
async fn test_every_task_notified_exactly_once() {
    let (api, service, monitor) = setup(50);
    let mut notices = service.subscribe();
    let tasks = vec![
        scripted(&api, "ok-1", &[TaskState::Started, TaskState::FinishedSuccessfully]),
        scripted(&api, "ok-2", &[TaskState::FinishedSuccessfully]),
        scripted(&api, "ko-1", &[TaskState::Pending, TaskState::FinishedUnsuccessfully]),
        scripted(&api, "stuck-1", &[TaskState::Started]),
        scripted(&api, "stuck-2", &[TaskState::Pending]),
    ];
    let recorder = Recorder::new();

    monitor
        .monitor_within(Duration::from_millis(400), recorder.clone(), &tasks)
        .unwrap();
    recorder.wait_for(5, Duration::from_secs(3)).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut outcomes: HashMap<String, Vec<MonitorOutcome>> = HashMap::new();
    for (id, outcome, _) in recorder.events() {
        outcomes.entry(id).or_default().push(outcome);
    }
    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.values().all(|o| o.len() == 1));
    assert_eq!(outcomes["ok-1"], vec![MonitorOutcome::Completed]);
    assert_eq!(outcomes["ok-2"], vec![MonitorOutcome::Completed]);
    assert_eq!(outcomes["ko-1"], vec![MonitorOutcome::Failed]);
    assert_eq!(outcomes["stuck-1"], vec![MonitorOutcome::Timeout]);
    assert_eq!(outcomes["stuck-2"], vec![MonitorOutcome::Timeout]);

    let mut published = 0;
    while notices.try_recv().is_ok() {
        published += 1;
    }
    assert_eq!(published, 5);
}

#[test]
fn test_blocking_await_from_plain_thread() {
    let (api, service, monitor) = setup(100);
    let first = scripted(&api, "blocking-1", &[TaskState::Started, TaskState::FinishedSuccessfully]);
    let second = scripted(&api, "blocking-2", &[TaskState::FinishedUnsuccessfully]);

    monitor.await_completion_blocking(&[first, second]).unwrap();
    assert_eq!(api.task_reads("blocking-1"), 2);

    let stuck = scripted(&api, "blocking-stuck", &[TaskState::Started]);
    let started = Instant::now();
    monitor
        .await_completion_within_blocking(Duration::from_millis(300), &[stuck])
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(800));

    service.close();
    assert!(matches!(
        monitor.await_completion_blocking(&[AsyncTask::new("late", TaskType::Deploy)]),
        Err(MonitorError::Scheduler(_))
    ));
}

#[tokio::test]
async fn test_close_releases_async_waiter() {
    let (api, service, monitor) = setup(100);
    let task = scripted(&api, "stuck-close", &[TaskState::Started]);
    let monitor = Arc::new(monitor);

    let waiting = Arc::clone(&monitor);
    let waiter = tokio::spawn(async move { waiting.await_completion(&[task]).await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!waiter.is_finished());

    let closed_at = Instant::now();
    service.close();

    let result = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter still blocked after close")
        .unwrap();
    assert!(matches!(
        result,
        Err(MonitorError::Scheduler(SchedulerError::Closed))
    ));
    assert!(closed_at.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_close_releases_blocking_waiter() {
    let (api, service, monitor) = setup(100);
    let task = scripted(&api, "stuck-close-blocking", &[TaskState::Started]);
    let monitor = Arc::new(monitor);

    let waiting = Arc::clone(&monitor);
    let waiter = std::thread::spawn(move || {
        waiting.await_completion_within_blocking(Duration::from_secs(5), &[task])
    });

    std::thread::sleep(Duration::from_millis(300));
    let closed_at = Instant::now();
    service.close();

    let result = waiter.join().expect("blocking waiter panicked");
    assert!(matches!(
        result,
        Err(MonitorError::Scheduler(SchedulerError::Closed))
    ));
    assert!(closed_at.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_zero_threads_never_overlap_callbacks() {
    let (api, _service, monitor) = setup_with_threads(50, 0);
    let tasks: Vec<AsyncTask> = (0..5)
        .map(|i| scripted(&api, &format!("serial-{}", i), &[TaskState::FinishedSuccessfully]))
        .collect();
    let tracker = Arc::new(OverlapTracker::default());

    monitor.monitor(tracker.clone(), &tasks).unwrap();

    let deadline = Instant::now() + Duration::from_secs(3);
    while tracker.done.load(Ordering::SeqCst) < tasks.len() {
        assert!(Instant::now() < deadline, "callbacks did not all run");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);
}
