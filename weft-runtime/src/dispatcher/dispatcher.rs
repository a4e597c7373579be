use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Local};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use super::handle::DispatcherHandle;
use super::task::{panic_message, Task, TaskHandle};
use crate::error::DispatcherError;

/// Single-threaded event loop executing tasks in due-time order.
///
/// Every module owns exactly one dispatcher. The loop runs on a dedicated thread, pops all
/// tasks that are due, runs them outside the queue lock, re-arms repeating tasks and then
/// sleeps until the next due time or until a task is added.
pub struct Dispatcher {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

pub(crate) struct Shared {
    pub(crate) name: String,
    queue: Mutex<Queue>,
    changed: Condvar,
    running: AtomicBool,
    halted: AtomicBool,
}

#[derive(Default)]
struct Queue {
    // Insertion sequence breaks ties between equal due times.
    tasks: BTreeMap<(DateTime<Local>, u64), Task>,
    next_seq: u64,
    stop_requested: bool,
}

impl Queue {
    fn insert(&mut self, task: Task) {
        let key = (task.schedule().execution_time(), self.next_seq);
        self.next_seq += 1;
        self.tasks.insert(key, task);
    }

    fn take_due(&mut self, now: DateTime<Local>) -> Vec<Task> {
        let mut due = Vec::new();
        while let Some(entry) = self.tasks.first_entry() {
            if entry.key().0 > now {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    fn next_due(&self) -> Option<DateTime<Local>> {
        self.tasks.keys().next().map(|(due, _)| *due)
    }
}

impl Shared {
    pub(crate) fn add_task(&self, task: Task) -> TaskHandle {
        let handle = task.handle();
        let mut queue = self.queue.lock();
        queue.insert(task);
        self.changed.notify_all();
        handle
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Make the loop exit without running anything else, including the rest of the
    /// current batch. Pending tasks are discarded.
    pub(crate) fn halt(&self) {
        self.halted.store(true, Ordering::Release);
        let _queue = self.queue.lock();
        self.changed.notify_all();
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    fn run_loop(&self) {
        let mut queue = self.queue.lock();
        loop {
            if self.is_halted() {
                let discarded = queue.tasks.len();
                queue.tasks.clear();
                queue.stop_requested = true;
                debug!(dispatcher = %self.name, discarded, "Dispatcher halted");
            }
            if queue.stop_requested {
                break;
            }

            let due = queue.take_due(Local::now());
            if !due.is_empty() {
                let outcome = MutexGuard::unlocked(&mut queue, || self.process(due));
                match outcome {
                    Outcome::Continue(rearmed) => {
                        for task in rearmed {
                            queue.insert(task);
                        }
                    }
                    // Checked again at the top of the loop.
                    Outcome::Halt => {}
                    Outcome::Stop => {
                        let discarded = queue.tasks.len();
                        queue.tasks.clear();
                        queue.stop_requested = true;
                        debug!(dispatcher = %self.name, discarded, "Stopping after final task");
                    }
                }
                continue;
            }

            match queue.next_due() {
                Some(next) => {
                    let wait = (next - Local::now()).to_std().unwrap_or_default();
                    self.changed.wait_for(&mut queue, wait);
                }
                None => self.changed.wait(&mut queue),
            }
        }
    }

    fn process(&self, due: Vec<Task>) -> Outcome {
        let mut rearmed = Vec::with_capacity(due.len());
        for mut task in due {
            if self.is_halted() {
                return Outcome::Halt;
            }
            if !task.is_valid() {
                continue;
            }

            if let Some(message) = task.run() {
                warn!(dispatcher = %self.name, error = %message, "Task panicked, error recorded");
            }

            if task.stops_dispatcher() {
                return Outcome::Stop;
            }
            if task.rearm() {
                rearmed.push(task);
            }
        }
        Outcome::Continue(rearmed)
    }
}

enum Outcome {
    Continue(Vec<Task>),
    Stop,
    Halt,
}

/// Clears the running flag when the loop exits, including by unwinding.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Dispatcher {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                queue: Mutex::new(Queue::default()),
                changed: Condvar::new(),
                running: AtomicBool::new(false),
                halted: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Start the loop on its own thread. Tasks queued while stopped are kept.
    pub fn start(&self) -> Result<(), DispatcherError> {
        let mut thread = self.thread.lock();
        if self.shared.is_running() {
            return Err(DispatcherError::AlreadyRunning {
                name: self.shared.name.clone(),
            });
        }
        // Reap a loop that ended on its own.
        if let Some(previous) = thread.take() {
            if let Err(payload) = previous.join() {
                warn!(
                    dispatcher = %self.shared.name,
                    error = %panic_message(payload.as_ref()),
                    "Previous dispatcher loop had panicked"
                );
            }
        }

        self.shared.queue.lock().stop_requested = false;
        self.shared.halted.store(false, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || {
                let _guard = RunningGuard(&shared.running);
                shared.run_loop();
            });

        match spawned {
            Ok(handle) => {
                *thread = Some(handle);
                info!(dispatcher = %self.shared.name, pending = self.pending(), "Dispatcher started");
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                Err(DispatcherError::Spawn {
                    name: self.shared.name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Ask the loop to exit and block until its thread is gone.
    ///
    /// Tasks that have not run yet stay queued. If the loop already ended because a task
    /// panicked, the panic is reported here.
    pub fn stop(&self) -> Result<(), DispatcherError> {
        match self.request_stop()? {
            Some(thread) => self.joined(thread.join()),
            None => Ok(()),
        }
    }

    /// Like [`Dispatcher::stop`], but waits for the thread on tokio's blocking pool so the
    /// calling executor thread is never parked.
    pub async fn stop_async(&self) -> Result<(), DispatcherError> {
        let Some(thread) = self.request_stop()? else {
            return Ok(());
        };
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(outcome) => self.joined(outcome),
            Err(e) => Err(DispatcherError::LoopPanicked {
                name: self.shared.name.clone(),
                message: e.to_string(),
            }),
        }
    }

    /// Flag the loop to exit. Returns the thread to join, or `None` when called from a task
    /// on this dispatcher; that loop exits after the current batch.
    fn request_stop(&self) -> Result<Option<JoinHandle<()>>, DispatcherError> {
        let Some(thread) = self.thread.lock().take() else {
            return Err(DispatcherError::NotRunning {
                name: self.shared.name.clone(),
            });
        };

        {
            let mut queue = self.shared.queue.lock();
            queue.stop_requested = true;
            self.shared.changed.notify_all();
        }

        if thread.thread().id() == std::thread::current().id() {
            return Ok(None);
        }
        Ok(Some(thread))
    }

    fn joined(&self, outcome: std::thread::Result<()>) -> Result<(), DispatcherError> {
        match outcome {
            Ok(()) => {
                info!(dispatcher = %self.shared.name, pending = self.pending(), "Dispatcher stopped");
                Ok(())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(dispatcher = %self.shared.name, error = %message, "Dispatcher loop panicked");
                Err(DispatcherError::LoopPanicked {
                    name: self.shared.name.clone(),
                    message,
                })
            }
        }
    }

    pub fn add_task(&self, task: Task) -> TaskHandle {
        self.shared.add_task(task)
    }

    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Number of queued tasks, including invalidated ones not yet skipped.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().tasks.len()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if self.thread.get_mut().is_some() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Schedule;
    use chrono::TimeDelta;
    use std::sync::mpsc;
    use std::time::Duration;

    fn record(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> impl FnMut() + Send {
        let log = Arc::clone(log);
        move || log.lock().push(label)
    }

    #[test]
    fn runs_tasks_in_due_time_then_insertion_order() {
        let dispatcher = Dispatcher::new("ordering");
        let log = Arc::new(Mutex::new(Vec::new()));
        let base = Local::now() + TimeDelta::milliseconds(50);

        dispatcher.add_task(Task::new(Schedule::once(base + TimeDelta::milliseconds(20)), record(&log, "late")));
        dispatcher.add_task(Task::new(Schedule::once(base), record(&log, "first-tie")));
        dispatcher.add_task(Task::new(Schedule::once(base), record(&log, "second-tie")));
        dispatcher.add_task(Task::new(Schedule::once(base - TimeDelta::milliseconds(20)), record(&log, "early")));

        let (done_tx, done_rx) = mpsc::channel();
        dispatcher.add_task(Task::new(Schedule::once(base + TimeDelta::milliseconds(40)), move || {
            let _ = done_tx.send(());
        }));

        dispatcher.start().unwrap();
        done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        dispatcher.stop().unwrap();

        assert_eq!(*log.lock(), vec!["early", "first-tie", "second-tie", "late"]);
    }

    #[test]
    fn start_twice_fails() {
        let dispatcher = Dispatcher::new("twice");
        dispatcher.start().unwrap();
        assert_eq!(
            dispatcher.start().unwrap_err(),
            DispatcherError::AlreadyRunning { name: "twice".into() }
        );
        dispatcher.stop().unwrap();
        assert!(!dispatcher.is_running());
        assert!(matches!(dispatcher.stop(), Err(DispatcherError::NotRunning { .. })));
    }

    #[test]
    fn invalidated_task_never_runs_even_when_due() {
        let dispatcher = Dispatcher::new("cancel");
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = dispatcher.add_task(Task::new(
            Schedule::repeated(Local::now(), Duration::from_millis(5)).unwrap(),
            record(&log, "tick"),
        ));
        handle.invalidate();

        let (done_tx, done_rx) = mpsc::channel();
        dispatcher.add_task(Task::new(Schedule::once(Local::now() + TimeDelta::milliseconds(30)), move || {
            let _ = done_tx.send(());
        }));
        dispatcher.start().unwrap();
        done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        dispatcher.stop().unwrap();

        assert!(log.lock().is_empty());
        assert!(!handle.was_executed());
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn new_task_wakes_a_sleeping_loop() {
        let dispatcher = Dispatcher::new("wake");
        dispatcher.add_task(Task::new(Schedule::once(Local::now() + TimeDelta::hours(1)), || {}));
        dispatcher.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let (tx, rx) = mpsc::channel();
        dispatcher.handle().add_task(Task::new(Schedule::now(), move || {
            let _ = tx.send(());
        }));
        rx.recv_timeout(Duration::from_millis(500)).unwrap();
        dispatcher.stop().unwrap();
        assert_eq!(dispatcher.pending(), 1);
    }

    #[test]
    fn stop_after_task_discards_remaining_work() {
        let dispatcher = Dispatcher::new("stop-after");
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.add_task(Task::new(Schedule::now(), record(&log, "last")).stop_dispatcher_after());
        dispatcher.add_task(Task::new(Schedule::once(Local::now() + TimeDelta::hours(1)), record(&log, "never")));
        dispatcher.start().unwrap();

        for _ in 0..200 {
            if !dispatcher.is_running() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!dispatcher.is_running());
        dispatcher.stop().unwrap();
        assert_eq!(*log.lock(), vec!["last"]);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn caught_panic_keeps_loop_alive() {
        let dispatcher = Dispatcher::new("caught");
        let failing = dispatcher.add_task(Task::new(Schedule::now(), || panic!("boom")).catch_panics());
        let (tx, rx) = mpsc::channel();
        dispatcher.add_task(Task::new(Schedule::once(Local::now() + TimeDelta::milliseconds(10)), move || {
            let _ = tx.send(());
        }));
        dispatcher.start().unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(dispatcher.is_running());
        dispatcher.stop().unwrap();
        assert_eq!(failing.last_error().as_deref(), Some("boom"));
    }

    #[test]
    fn uncaught_panic_terminates_loop() {
        let dispatcher = Dispatcher::new("uncaught");
        dispatcher.add_task(Task::new(Schedule::now(), || panic!("unhandled")));
        dispatcher.start().unwrap();

        for _ in 0..200 {
            if !dispatcher.is_running() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            dispatcher.stop().unwrap_err(),
            DispatcherError::LoopPanicked {
                name: "uncaught".into(),
                message: "unhandled".into()
            }
        );
    }

    #[test]
    fn repeating_task_keeps_firing() {
        let dispatcher = Dispatcher::new("repeat");
        let count = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&count);
        dispatcher.add_task(Task::new(
            Schedule::repeated(Local::now(), Duration::from_millis(10)).unwrap(),
            move || *counter.lock() += 1,
        ));
        dispatcher.start().unwrap();
        std::thread::sleep(Duration::from_millis(105));
        dispatcher.stop().unwrap();

        let runs = *count.lock();
        assert!((8..=12).contains(&runs), "unexpected run count {runs}");
        assert_eq!(dispatcher.pending(), 1);
    }

    #[test]
    fn late_repeating_task_catches_up_one_interval_per_run() {
        let dispatcher = Dispatcher::new("catch-up");
        let runs = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&runs);
        let start = Local::now() - TimeDelta::milliseconds(100);
        dispatcher.add_task(Task::new(
            Schedule::repeated(start, Duration::from_millis(10)).unwrap(),
            move || recorder.lock().push(Local::now()),
        ));

        let started = Local::now();
        dispatcher.start().unwrap();
        std::thread::sleep(Duration::from_millis(45));
        dispatcher.stop().unwrap();

        let runs = runs.lock().clone();
        // Ticks at -100ms..=0ms were all overdue and fire back to back.
        assert!(runs.len() >= 11, "only {} runs", runs.len());
        assert!(runs[10] - started < TimeDelta::milliseconds(25));
        assert!(runs.windows(2).all(|pair| pair[0] <= pair[1]));

        // Every run advanced the due time by exactly one interval.
        let next_due = dispatcher.shared.queue.lock().next_due().unwrap();
        assert_eq!(next_due, start + TimeDelta::milliseconds(10 * runs.len() as i64));
    }

    #[test]
    fn halt_drops_the_rest_of_the_batch() {
        let dispatcher = Dispatcher::new("halt");
        let log = Arc::new(Mutex::new(Vec::new()));
        let due = Local::now() - TimeDelta::milliseconds(5);

        let handle = dispatcher.handle();
        let halter = Arc::clone(&log);
        dispatcher.add_task(Task::new(Schedule::once(due), move || {
            halter.lock().push("halt");
            handle.halt();
        }));
        dispatcher.add_task(Task::new(Schedule::once(due), record(&log, "same batch")));
        dispatcher.add_task(Task::new(
            Schedule::once(Local::now() + TimeDelta::milliseconds(10)),
            record(&log, "later"),
        ));
        dispatcher.start().unwrap();

        for _ in 0..200 {
            if !dispatcher.is_running() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        dispatcher.stop().unwrap();
        assert_eq!(*log.lock(), vec!["halt"]);
        assert_eq!(dispatcher.pending(), 0);

        // A restarted dispatcher runs again.
        let (tx, rx) = mpsc::channel();
        dispatcher.add_task(Task::new(Schedule::now(), move || {
            let _ = tx.send(());
        }));
        dispatcher.start().unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        dispatcher.stop().unwrap();
    }
}
