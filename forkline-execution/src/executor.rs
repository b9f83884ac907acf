//! In-process task executor with bounded concurrency

use forkline_core::{
    humanize_millis, DoneEvent, EndEvent, ErrorEvent, EventKind, ExecutorEvent, ExecutorSettings,
    Task, TaskError,
};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::listeners::{EventListener, ListenerId, ListenerTable};

/// Runs queued tasks, at most `settings.concurrency` at a time.
///
/// Tasks are dequeued in submission order. Every settled task emits a `done`
/// or `error` event; whenever the queue is empty and nothing is in flight
/// after a task settles, an `end` event follows. Calling [`start`] on an idle
/// executor emits `end` immediately.
///
/// Task bodies are spawned onto the current tokio runtime, so `push`/`start`
/// must be called from within one. Cloning yields another handle to the same
/// executor.
///
/// [`start`]: TaskExecutor::start
#[derive(Clone)]
pub struct TaskExecutor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    settings: ExecutorSettings,
    state: Mutex<QueueState>,
    listeners: Mutex<ListenerTable>,
    /// Serializes settle/emit sequences; reentrant so listeners may call back in
    emission: ReentrantMutex<()>,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Task>,
    running: usize,
}

impl TaskExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                settings,
                state: Mutex::new(QueueState::default()),
                listeners: Mutex::new(ListenerTable::default()),
                emission: ReentrantMutex::new(()),
            }),
        }
    }

    pub fn settings(&self) -> ExecutorSettings {
        self.inner.settings
    }

    /// Number of tasks currently in flight
    pub fn running_count(&self) -> usize {
        self.inner.state.lock().running
    }

    /// Number of tasks waiting to be dequeued
    pub fn queued_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Append tasks to the queue, in order. Does not start them.
    pub fn push<I>(&self, tasks: I) -> &Self
    where
        I: IntoIterator<Item = Task>,
    {
        self.inner.state.lock().queue.extend(tasks);
        self
    }

    /// Begin (or continue) draining the queue
    pub fn start(&self) -> &Self {
        {
            let _emission = self.inner.emission.lock();
            if self.inner.is_idle() {
                self.inner.emit(&ExecutorEvent::End(EndEvent {}));
                return self;
            }
        }
        self.inner.advance();
        self
    }

    /// Subscribe to an event kind
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ExecutorEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().add(kind, Arc::new(listener))
    }

    /// Unsubscribe; returns whether the listener was still registered
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.listeners.lock().remove(id)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.listeners.lock().count(kind)
    }
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new(ExecutorSettings::default())
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TaskExecutor")
            .field("settings", &self.inner.settings)
            .field("queued", &state.queue.len())
            .field("running", &state.running)
            .finish()
    }
}

impl ExecutorInner {
    fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.queue.is_empty() && state.running == 0
    }

    /// Launch tasks until the queue is empty or the concurrency limit is hit
    fn advance(self: &Arc<Self>) {
        loop {
            let task = {
                let mut state = self.state.lock();
                if !self.settings.concurrency.allows(state.running) {
                    break;
                }
                match state.queue.pop_front() {
                    Some(task) => {
                        state.running += 1;
                        task
                    }
                    None => break,
                }
            };
            self.launch(task);
        }
    }

    fn launch(self: &Arc<Self>, task: Task) {
        if !self.settings.silent {
            info!("Start \"{}\"", task.display_name());
        }

        let inner = Arc::clone(self);
        let started = Instant::now();
        let future = task.run();
        tokio::spawn(async move {
            let result = future.await;
            inner.settle(&task, started.elapsed(), result);
        });
    }

    fn settle(self: &Arc<Self>, task: &Task, elapsed: Duration, result: Result<(), TaskError>) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        {
            let _emission = self.emission.lock();
            self.state.lock().running -= 1;

            let event = match result {
                Ok(()) => {
                    if !self.settings.silent {
                        info!(
                            "Done  \"{}\" (in {})",
                            task.display_name(),
                            humanize_millis(elapsed_ms)
                        );
                    }
                    ExecutorEvent::Done(DoneEvent { elapsed_ms })
                }
                Err(error) => {
                    if !self.settings.silent {
                        warn!(
                            "Error \"{}\" (in {}): {}",
                            task.display_name(),
                            humanize_millis(elapsed_ms),
                            error
                        );
                    }
                    ExecutorEvent::Error(ErrorEvent { elapsed_ms, error })
                }
            };
            self.emit(&event);

            if self.is_idle() {
                self.emit(&ExecutorEvent::End(EndEvent {}));
            }
        }
        self.advance();
    }

    fn emit(&self, event: &ExecutorEvent) {
        let listeners: Vec<EventListener> = self.listeners.lock().matching(event.kind());
        for listener in listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forkline_core::Concurrency;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{mpsc, Barrier};
    use tokio::time::{sleep, timeout};

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Forward every event kind into a channel
    fn record(executor: &TaskExecutor) -> mpsc::UnboundedReceiver<ExecutorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for kind in EventKind::ALL {
            let tx = tx.clone();
            executor.on(kind, move |event| {
                let _ = tx.send(event.clone());
            });
        }
        rx
    }

    async fn collect_until_end(
        rx: &mut mpsc::UnboundedReceiver<ExecutorEvent>,
    ) -> Vec<ExecutorEvent> {
        let mut events = Vec::new();
        loop {
            let event = timeout(TIMEOUT, rx.recv())
                .await
                .expect("executor did not end in time")
                .expect("listener channel closed");
            let is_end = event.kind() == EventKind::End;
            events.push(event);
            if is_end {
                return events;
            }
        }
    }

    /// Task that tracks how many tasks overlap
    fn tracked(
        label: &'static str,
        delay_ms: u64,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        log: Arc<Mutex<Vec<&'static str>>>,
    ) -> Task {
        Task::named(label, move || {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let log = Arc::clone(&log);
            async move {
                log.lock().push(label);
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(delay_ms)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_start_on_idle_emits_end_once() {
        let executor = TaskExecutor::default();
        let mut rx = record(&executor);

        executor.start();

        let events = collect_until_end(&mut rx).await;
        assert_eq!(events, vec![ExecutorEvent::End(EndEvent {})]);

        sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_serial_runs_in_submission_order() {
        let executor = TaskExecutor::new(ExecutorSettings::serial().silent(true));
        let mut rx = record(&executor);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));

        executor.push(vec![
            tracked("a", 30, in_flight.clone(), peak.clone(), log.clone()),
            tracked("b", 5, in_flight.clone(), peak.clone(), log.clone()),
            tracked("c", 15, in_flight.clone(), peak.clone(), log.clone()),
        ]);
        assert_eq!(executor.queued_count(), 3);
        executor.start();

        let events = collect_until_end(&mut rx).await;
        assert_eq!(events.len(), 4);
        assert!(events[..3].iter().all(|e| e.kind() == EventKind::Done));
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(executor.running_count(), 0);
        assert_eq!(executor.queued_count(), 0);
    }

    #[tokio::test]
    async fn test_limited_concurrency_caps_in_flight() {
        let executor = TaskExecutor::new(
            ExecutorSettings::default()
                .with_concurrency(Concurrency::limited(2).unwrap())
                .silent(true),
        );
        let mut rx = record(&executor);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));

        executor.push(
            ["a", "b", "c", "d", "e"]
                .into_iter()
                .map(|label| tracked(label, 10, in_flight.clone(), peak.clone(), log.clone())),
        );
        executor.start();
        assert_eq!(executor.running_count(), 2);
        assert_eq!(executor.queued_count(), 3);

        let events = collect_until_end(&mut rx).await;
        assert_eq!(events.len(), 6);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unbounded_starts_everything_at_once() {
        let executor = TaskExecutor::new(ExecutorSettings::unbounded().silent(true));
        let mut rx = record(&executor);
        let barrier = Arc::new(Barrier::new(4));

        // Each task waits until all four are running
        executor.push((0..4).map(|_| {
            let barrier = Arc::clone(&barrier);
            Task::new(move || {
                let barrier = Arc::clone(&barrier);
                async move {
                    barrier.wait().await;
                    Ok(())
                }
            })
        }));
        executor.start();

        let events = collect_until_end(&mut rx).await;
        let ends = events.iter().filter(|e| e.kind() == EventKind::End).count();
        assert_eq!(events.len(), 5);
        assert_eq!(ends, 1);
    }

    #[tokio::test]
    async fn test_done_events_follow_completion_order() {
        let executor = TaskExecutor::new(ExecutorSettings::unbounded().silent(true));
        let mut rx = record(&executor);

        executor.push(vec![
            Task::named("slow", || async {
                sleep(Duration::from_millis(50)).await;
                Ok(())
            }),
            Task::named("fast", || async {
                sleep(Duration::from_millis(10)).await;
                Ok(())
            }),
        ]);
        executor.start();

        let events = collect_until_end(&mut rx).await;
        let elapsed: Vec<u64> = events
            .iter()
            .filter_map(|event| match event {
                ExecutorEvent::Done(done) => Some(done.elapsed_ms),
                _ => None,
            })
            .collect();
        assert_eq!(elapsed.len(), 2);
        assert!(elapsed[0] < elapsed[1], "fast task should settle first: {:?}", elapsed);
        assert!(elapsed[1] >= 50);
    }

    #[tokio::test]
    async fn test_failure_does_not_halt_siblings() {
        let executor = TaskExecutor::new(ExecutorSettings::serial().silent(true));
        let mut rx = record(&executor);
        let completed = Arc::new(AtomicUsize::new(0));

        let ok = |completed: Arc<AtomicUsize>| {
            Task::new(move || {
                let completed = Arc::clone(&completed);
                async move {
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        executor.push(vec![
            ok(completed.clone()),
            Task::from_fn(|| anyhow::bail!("lint failed")),
            ok(completed.clone()),
        ]);
        executor.start();

        let events = collect_until_end(&mut rx).await;
        assert_eq!(completed.load(Ordering::SeqCst), 2);
        assert_eq!(events[0].kind(), EventKind::Done);
        match &events[1] {
            ExecutorEvent::Error(error) => assert_eq!(error.error.message, "lint failed"),
            other => panic!("expected error event, got {:?}", other),
        }
        assert_eq!(events[2].kind(), EventKind::Done);
        assert_eq!(events[3].kind(), EventKind::End);
    }

    #[tokio::test]
    async fn test_panicking_task_emits_error() {
        let executor = TaskExecutor::new(ExecutorSettings::default().silent(true));
        let mut rx = record(&executor);

        executor.push(vec![Task::from_fn(|| panic!("boom"))]);
        executor.start();

        let events = collect_until_end(&mut rx).await;
        match &events[0] {
            ExecutorEvent::Error(error) => assert!(error.error.message.contains("boom")),
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_listeners_may_push_more_work() {
        let executor = TaskExecutor::new(ExecutorSettings::default().silent(true));
        let mut rx = record(&executor);
        let follow_ups = Arc::new(AtomicUsize::new(0));

        // The first done event queues one more task from inside the listener
        let handle = executor.clone();
        let queued = Arc::clone(&follow_ups);
        executor.on(EventKind::Done, move |_| {
            if queued.fetch_add(1, Ordering::SeqCst) == 0 {
                handle.push(vec![Task::from_fn(|| Ok(()))]).start();
            }
        });

        executor.push(vec![Task::from_fn(|| Ok(()))]);
        executor.start();

        let mut done = 0;
        loop {
            let event = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
            match event.kind() {
                EventKind::Done => done += 1,
                EventKind::End if done == 2 => break,
                _ => {}
            }
        }
        assert_eq!(follow_ups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_off_removes_listener() {
        let executor = TaskExecutor::new(ExecutorSettings::default().silent(true));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = executor.on(EventKind::End, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(executor.listener_count(EventKind::End), 1);

        executor.start();
        assert!(executor.off(id));
        assert!(!executor.off(id));
        executor.start();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(executor.listener_count(EventKind::End), 0);
    }

    #[tokio::test]
    async fn test_many_synchronous_tasks() {
        let executor = TaskExecutor::new(ExecutorSettings::serial().silent(true));
        let mut rx = record(&executor);
        let completed = Arc::new(AtomicUsize::new(0));

        executor.push((0..5_000).map(|_| {
            let completed = Arc::clone(&completed);
            Task::from_fn(move || {
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }));
        executor.start();

        let events = collect_until_end(&mut rx).await;
        assert_eq!(events.len(), 5_001);
        assert_eq!(completed.load(Ordering::SeqCst), 5_000);
    }
}
