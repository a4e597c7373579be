use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::schedule::Schedule;

type Action = Box<dyn FnMut() + Send + 'static>;

/// A unit of work paired with the schedule that decides when it runs.
///
/// A task is owned by the dispatcher it was added to. Callers keep a [`TaskHandle`] to
/// cancel it or to inspect its outcome.
pub struct Task {
    action: Action,
    schedule: Schedule,
    state: Arc<TaskState>,
    catch_panics: bool,
    stop_dispatcher_after: bool,
}

#[derive(Debug)]
pub(crate) struct TaskState {
    valid: AtomicBool,
    executed: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl Task {
    pub fn new<F>(schedule: Schedule, action: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self {
            action: Box::new(action),
            schedule,
            state: Arc::new(TaskState {
                valid: AtomicBool::new(true),
                executed: AtomicBool::new(false),
                last_error: Mutex::new(None),
            }),
            catch_panics: false,
            stop_dispatcher_after: false,
        }
    }

    /// Record a panic in [`TaskHandle::last_error`] instead of tearing down the dispatcher.
    pub fn catch_panics(mut self) -> Self {
        self.catch_panics = true;
        self
    }

    /// Stop the dispatcher once this task has run, discarding everything still pending.
    pub fn stop_dispatcher_after(mut self) -> Self {
        self.stop_dispatcher_after = true;
        self
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.state.valid.load(Ordering::Acquire)
    }

    pub(crate) fn stops_dispatcher(&self) -> bool {
        self.stop_dispatcher_after
    }

    /// Run the action once. Returns the panic message if the action panicked and the task
    /// opted into catching it; uncaught panics unwind into the dispatcher loop.
    pub(crate) fn run(&mut self) -> Option<String> {
        let failure = if self.catch_panics {
            let action = &mut self.action;
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| action()))
                .err()
                .map(|payload| panic_message(payload.as_ref()))
        } else {
            (self.action)();
            None
        };

        self.state.executed.store(true, Ordering::Release);
        if let Some(message) = &failure {
            *self.state.last_error.lock() = Some(message.clone());
        }
        failure
    }

    /// Move a repeating task to its next due time. Returns false for one-shot tasks.
    pub(crate) fn rearm(&mut self) -> bool {
        if !self.schedule.repeats() {
            return false;
        }
        self.schedule.update_execution_time();
        true
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("schedule", &self.schedule)
            .field("valid", &self.is_valid())
            .field("catch_panics", &self.catch_panics)
            .field("stop_dispatcher_after", &self.stop_dispatcher_after)
            .finish_non_exhaustive()
    }
}

/// Shared view on a task that has been handed to a dispatcher.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    state: Arc<TaskState>,
}

impl TaskHandle {
    /// Cancel the task. Takes effect the next time the dispatcher looks at it.
    pub fn invalidate(&self) {
        self.state.valid.store(false, Ordering::Release);
    }

    pub fn is_valid(&self) -> bool {
        self.state.valid.load(Ordering::Acquire)
    }

    pub fn was_executed(&self) -> bool {
        self.state.executed.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.last_error.lock().clone()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caught_panic_is_recorded() {
        let mut task = Task::new(Schedule::now(), || panic!("sensor offline")).catch_panics();
        let handle = task.handle();

        assert_eq!(task.run().as_deref(), Some("sensor offline"));
        assert!(handle.was_executed());
        assert_eq!(handle.last_error().as_deref(), Some("sensor offline"));
    }

    #[test]
    fn invalidation_is_visible_through_every_handle() {
        let task = Task::new(Schedule::now(), || {});
        let first = task.handle();
        let second = first.clone();

        second.invalidate();
        assert!(!first.is_valid());
        assert!(!task.is_valid());
        assert!(!first.was_executed());
    }
}
