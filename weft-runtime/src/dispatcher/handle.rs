use std::sync::Arc;

use super::dispatcher::Shared;
use super::task::{Task, TaskHandle};

/// Cloneable sink for enqueueing tasks onto a dispatcher from any thread.
///
/// Tasks added while the dispatcher is stopped stay queued until it starts again.
#[derive(Clone)]
pub struct DispatcherHandle {
    pub(crate) shared: Arc<Shared>,
}

impl DispatcherHandle {
    pub fn add_task(&self, task: Task) -> TaskHandle {
        self.shared.add_task(task)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub(crate) fn halt(&self) {
        self.shared.halt();
    }
}

impl std::fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("name", &self.shared.name)
            .finish()
    }
}
