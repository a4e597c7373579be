mod dispatcher;
mod handle;
mod task;

pub use dispatcher::Dispatcher;
pub use handle::DispatcherHandle;
pub use task::{Task, TaskHandle};
