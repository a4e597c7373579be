use std::any::type_name;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use super::context::{with_cell, ModuleCell, ModuleContext, SharedCell};
use super::reporter::ModuleRef;
use super::state::ModuleState;
use super::tracker::EventTracker;
use super::Module;
use crate::channel::ChannelRegistry;
use crate::config::Properties;
use crate::dispatcher::{Dispatcher, Task};
use crate::error::{DispatcherError, ModuleError};
use crate::runtime::Runtime;
use crate::schedule::Schedule;

/// Owns a module, its dispatcher and drives its lifecycle.
///
/// `start` returns only after the module's `initialize` has run to completion on the
/// dispatcher; `shutdown` returns only after `terminate` has.
pub struct ModuleHost<M: Module> {
    module: ModuleRef,
    dispatcher: Dispatcher,
    cell: SharedCell<M>,
    channels: Arc<ChannelRegistry>,
    properties: Properties,
    tracker: Option<Arc<dyn EventTracker>>,
}

impl<M: Module> ModuleHost<M> {
    pub fn new(id: impl Into<String>, module: M, runtime: &Runtime) -> Self {
        let module_ref = ModuleRef::new(id);
        let dispatcher = Dispatcher::new(module_ref.id());
        let channels = Arc::clone(runtime.channels());

        let cell = Arc::new_cyclic(|weak| {
            Mutex::new(ModuleCell {
                module,
                ctx: ModuleContext::new(
                    module_ref.clone(),
                    Arc::clone(&channels),
                    dispatcher.handle(),
                    weak.clone(),
                ),
            })
        });

        Self {
            properties: runtime.properties_for(module_ref.id()),
            module: module_ref,
            dispatcher,
            cell,
            channels,
            tracker: None,
        }
    }

    pub fn with_event_tracker(mut self, tracker: Arc<dyn EventTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn id(&self) -> &str {
        self.module.id()
    }

    pub fn state(&self) -> ModuleState {
        self.module.state()
    }

    pub fn module_ref(&self) -> &ModuleRef {
        &self.module
    }

    /// Start the dispatcher and wait until `initialize` has completed.
    pub async fn start(&mut self) -> Result<(), ModuleError> {
        let done = self.begin_start()?;
        let result = done.await;
        self.finish_start(result)
    }

    /// Blocking variant of [`ModuleHost::start`]. Must not be called from within an async
    /// runtime.
    pub fn start_blocking(&mut self) -> Result<(), ModuleError> {
        let done = self.begin_start()?;
        let result = done.blocking_recv();
        self.finish_start(result)
    }

    fn begin_start(&mut self) -> Result<oneshot::Receiver<Result<(), ModuleError>>, ModuleError> {
        self.expect_state(&[ModuleState::Created], "start")?;
        self.module.set_state(ModuleState::Starting);
        if let Err(e) = self.dispatcher.start() {
            self.module.set_state(ModuleState::Stopped);
            return Err(e.into());
        }

        self.module.set_state(ModuleState::Initializing);
        let properties = self.properties.clone();
        Ok(self.run_on_dispatcher(false, move |module, ctx| module.initialize(ctx, &properties)))
    }

    fn finish_start(
        &mut self,
        result: Result<Result<(), ModuleError>, oneshot::error::RecvError>,
    ) -> Result<(), ModuleError> {
        let result = result.map(|init| match self.module.failure_error() {
            Some(fatal) if init.is_ok() => Err(fatal),
            _ => init,
        });
        let error = match result {
            // A timer may already have aborted the module after `initialize` returned.
            Ok(Ok(())) if !self.module.transition(ModuleState::Initializing, ModuleState::Running) => {
                self.module.failure_error().unwrap_or_else(|| ModuleError::Aborted {
                    module: self.id().to_string(),
                    phase: "initialization",
                })
            }
            Ok(Ok(())) => {
                info!(module = %self.id(), "Module started");
                if let Some(tracker) = &self.tracker {
                    tracker.on_module_started(self.module.id(), type_name::<M>());
                }
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(_) => ModuleError::Aborted {
                module: self.id().to_string(),
                phase: "initialization",
            },
        };

        error!(module = %self.id(), error = %error, "Module failed to initialize");
        self.abort();
        Err(error)
    }

    /// Run `terminate`, stop the dispatcher and detach the module from all channels.
    ///
    /// A module that was aborted by a fatal error has nothing left to terminate; its
    /// dispatcher thread is reaped and the fatal error returned.
    pub async fn shutdown(&mut self) -> Result<(), ModuleError> {
        if let Some(fatal) = self.fatal_failure() {
            let stopped = self.dispatcher.stop_async().await;
            return self.finish_failed(fatal, stopped);
        }
        let done = self.begin_shutdown()?;
        let result = done.await;
        let stopped = self.dispatcher.stop_async().await;
        self.finish_shutdown(result, stopped)
    }

    /// Blocking variant of [`ModuleHost::shutdown`]. Must not be called from within an
    /// async runtime.
    pub fn shutdown_blocking(&mut self) -> Result<(), ModuleError> {
        if let Some(fatal) = self.fatal_failure() {
            let stopped = self.dispatcher.stop();
            return self.finish_failed(fatal, stopped);
        }
        let done = self.begin_shutdown()?;
        let result = done.blocking_recv();
        let stopped = self.dispatcher.stop();
        self.finish_shutdown(result, stopped)
    }

    fn fatal_failure(&self) -> Option<ModuleError> {
        if self.module.state() != ModuleState::Stopped {
            return None;
        }
        self.module.failure_error()
    }

    fn begin_shutdown(&mut self) -> Result<oneshot::Receiver<()>, ModuleError> {
        let previous = self.expect_state(&[ModuleState::Running, ModuleState::Paused], "shut down")?;
        // A paused dispatcher, or one whose loop died from a panic, must run terminate.
        if previous == ModuleState::Paused || !self.dispatcher.is_running() {
            self.dispatcher.start()?;
        }

        self.module.set_state(ModuleState::Terminating);
        Ok(self.run_on_dispatcher(true, |module, ctx| {
            ctx.unregister_all_periodic_functions();
            module.terminate(ctx);
        }))
    }

    fn finish_shutdown(
        &mut self,
        result: Result<(), oneshot::error::RecvError>,
        stopped: Result<(), DispatcherError>,
    ) -> Result<(), ModuleError> {
        self.module.set_state(ModuleState::Stopped);
        self.channels.remove_module(self.module.id());
        if let Some(tracker) = &self.tracker {
            tracker.on_module_stopped(self.module.id(), type_name::<M>());
        }

        if result.is_err() {
            return Err(match stopped {
                Err(e) => e.into(),
                Ok(()) => ModuleError::Aborted {
                    module: self.id().to_string(),
                    phase: "termination",
                },
            });
        }
        stopped?;
        info!(module = %self.id(), "Module stopped");
        Ok(())
    }

    fn finish_failed(&mut self, fatal: ModuleError, stopped: Result<(), DispatcherError>) -> Result<(), ModuleError> {
        match stopped {
            Ok(()) => {
                info!(module = %self.id(), "Reaped dispatcher of failed module");
                if let Some(tracker) = &self.tracker {
                    tracker.on_module_stopped(self.module.id(), type_name::<M>());
                }
            }
            // Reaped before, by a failed start or an earlier shutdown.
            Err(DispatcherError::NotRunning { .. }) => {}
            Err(e) => warn!(module = %self.id(), error = %e, "Dispatcher of failed module did not stop cleanly"),
        }
        Err(fatal)
    }

    /// Run `on_pause`, then halt the dispatcher. Timers and deliveries stay queued.
    pub async fn pause(&mut self) -> Result<(), ModuleError> {
        self.expect_state(&[ModuleState::Running], "pause")?;
        let done = self.run_on_dispatcher(false, |module, ctx| module.on_pause(ctx));
        if done.await.is_err() {
            self.abort();
            return Err(ModuleError::Aborted {
                module: self.id().to_string(),
                phase: "pause",
            });
        }

        self.dispatcher.stop_async().await?;
        self.module.set_state(ModuleState::Paused);
        info!(module = %self.id(), pending = self.dispatcher.pending(), "Module paused");
        if let Some(tracker) = &self.tracker {
            tracker.on_module_paused(self.module.id(), type_name::<M>());
        }
        Ok(())
    }

    /// Restart the dispatcher and run `on_resume`.
    pub async fn resume(&mut self) -> Result<(), ModuleError> {
        self.expect_state(&[ModuleState::Paused], "resume")?;
        self.dispatcher.start()?;
        self.module.set_state(ModuleState::Running);

        let done = self.run_on_dispatcher(false, |module, ctx| module.on_resume(ctx));
        if done.await.is_err() {
            self.abort();
            return Err(ModuleError::Aborted {
                module: self.id().to_string(),
                phase: "resume",
            });
        }

        info!(module = %self.id(), "Module resumed");
        if let Some(tracker) = &self.tracker {
            tracker.on_module_resumed(self.module.id(), type_name::<M>());
        }
        Ok(())
    }

    /// Look at the module from outside. Waits for a running callback to finish.
    pub fn inspect<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        f(&self.cell.lock().module)
    }

    /// Queued tasks on this module's dispatcher.
    pub fn pending_tasks(&self) -> usize {
        self.dispatcher.pending()
    }

    fn run_on_dispatcher<R, F>(&self, stop_after: bool, f: F) -> oneshot::Receiver<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut M, &mut ModuleContext<M>) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let cell = Arc::downgrade(&self.cell);
        let mut job = Some((f, tx));
        let mut task = Task::new(Schedule::now(), move || {
            if let Some((f, tx)) = job.take() {
                if let Some(result) = with_cell(&cell, f) {
                    let _ = tx.send(result);
                }
            }
        });
        if stop_after {
            task = task.stop_dispatcher_after();
        }
        self.dispatcher.add_task(task);
        rx
    }

    fn expect_state(&self, allowed: &[ModuleState], operation: &'static str) -> Result<ModuleState, ModuleError> {
        let state = self.module.state();
        if allowed.contains(&state) {
            return Ok(state);
        }
        Err(ModuleError::InvalidState {
            module: self.id().to_string(),
            operation,
            state: state.to_string(),
        })
    }

    // Blocks until the loop finishes its current batch.
    fn abort(&mut self) {
        if let Err(e) = self.dispatcher.stop() {
            warn!(module = %self.id(), error = %e, "Dispatcher did not stop cleanly");
        }
        self.module.set_state(ModuleState::Stopped);
        self.channels.remove_module(self.module.id());
    }
}

impl<M: Module> Drop for ModuleHost<M> {
    fn drop(&mut self) {
        if !matches!(self.module.state(), ModuleState::Created | ModuleState::Stopped) {
            self.module.set_state(ModuleState::Stopped);
            self.channels.remove_module(self.module.id());
        }
    }
}

impl<M: Module> std::fmt::Debug for ModuleHost<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHost")
            .field("module", &self.module)
            .field("pending", &self.dispatcher.pending())
            .finish()
    }
}
