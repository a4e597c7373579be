use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::{debug, error};

use super::reporter::ModuleRef;
use super::state::ModuleState;
use super::Module;
use crate::channel::{Channel, ChannelData, ChannelRegistry, Subscriber};
use crate::codec::Payload;
use crate::dispatcher::{DispatcherHandle, Task, TaskHandle};
use crate::error::{ChannelError, ModuleError};
use crate::schedule::{Periodic, Schedule};

/// A module together with its context, guarded by one lock.
///
/// Every callback of a module locks this cell, so the module only ever sees one callback
/// at a time even if it is inspected from outside its dispatcher.
pub(crate) struct ModuleCell<M> {
    pub(crate) module: M,
    pub(crate) ctx: ModuleContext<M>,
}

pub(crate) type SharedCell<M> = Arc<Mutex<ModuleCell<M>>>;

struct Registered {
    id: u64,
    handle: TaskHandle,
}

/// What a module can do besides its own logic: declare channels, manage timers and
/// report problems.
///
/// Passed as `&mut` into every module callback.
pub struct ModuleContext<M> {
    module: ModuleRef,
    channels: Arc<ChannelRegistry>,
    dispatcher: DispatcherHandle,
    cell: Weak<Mutex<ModuleCell<M>>>,
    functions: HashMap<String, Registered>,
    next_function_id: u64,
}

impl<M: Module> ModuleContext<M> {
    pub(crate) fn new(
        module: ModuleRef,
        channels: Arc<ChannelRegistry>,
        dispatcher: DispatcherHandle,
        cell: Weak<Mutex<ModuleCell<M>>>,
    ) -> Self {
        Self {
            module,
            channels,
            dispatcher,
            cell,
            functions: HashMap::new(),
            next_function_id: 0,
        }
    }

    pub fn module(&self) -> &ModuleRef {
        &self.module
    }

    pub fn id(&self) -> &str {
        self.module.id()
    }

    pub fn state(&self) -> ModuleState {
        self.module.state()
    }

    /// Declare this module as a publisher of `channel`.
    ///
    /// Only allowed during initialization. Otherwise, or if the channel was declared
    /// before with another type, the error is reported and an invalid handle returned.
    pub fn publish<T: Payload>(&mut self, channel: &str) -> Channel<T> {
        if let Err(e) = self.check_initializing(channel, "publish") {
            return self.reject(channel, e);
        }
        match self.channels.publish::<T>(&self.module, channel) {
            Ok(handle) => handle,
            Err(e) => self.reject(channel, e),
        }
    }

    /// Subscribe to `channel`. `callback` runs on this module's dispatcher for every
    /// value delivered.
    pub fn subscribe<T, F>(&mut self, channel: &str, callback: F) -> Channel<T>
    where
        T: Payload,
        F: FnMut(&mut M, &mut ModuleContext<M>, ChannelData<T>) + Send + 'static,
    {
        if let Err(e) = self.check_initializing(channel, "subscribe") {
            return self.reject(channel, e);
        }

        let cell = self.cell.clone();
        let callback = Mutex::new(callback);
        let subscriber = Subscriber::new(
            self.module.id(),
            channel,
            Arc::clone(self.channels.codecs()),
            self.dispatcher.clone(),
            move |data: ChannelData<T>| {
                with_cell(&cell, |module, ctx| {
                    (callback.lock())(module, ctx, data);
                    ctx.abort_on_failure();
                });
            },
        );

        match self.channels.subscribe(&self.module, channel, subscriber) {
            Ok(handle) => handle,
            Err(e) => self.reject(channel, e),
        }
    }

    fn check_initializing(&self, channel: &str, operation: &'static str) -> Result<(), ChannelError> {
        if self.module.state() == ModuleState::Initializing {
            return Ok(());
        }
        Err(ChannelError::NotInitializing {
            channel: channel.to_string(),
            operation,
        })
    }

    fn reject<T>(&self, channel: &str, error: ChannelError) -> Channel<T> {
        self.module.error(&error);
        Channel::invalid_for(channel, self.module.clone())
    }

    /// Run `callback` repeatedly as described by `periodic`.
    ///
    /// Fails if a function with this name is already registered or the interval is zero.
    pub fn register_periodic_function<F>(
        &mut self,
        name: &str,
        periodic: Periodic,
        callback: F,
    ) -> Result<TaskHandle, ModuleError>
    where
        F: FnMut(&mut M, &mut ModuleContext<M>) + Send + 'static,
    {
        self.check_timers("register periodic function")?;
        if self.functions.contains_key(name) {
            return Err(self.report(ModuleError::DuplicateFunction {
                name: name.to_string(),
            }));
        }

        let interval = periodic.interval();
        let schedule = periodic
            .into_schedule(Local::now())
            .map_err(|e| self.report(e.into()))?;
        let first_run = schedule.execution_time();

        let handle = self.schedule_function(name, schedule, callback);
        debug!(
            module = %self.module.id(),
            function = name,
            interval_ms = interval.as_millis() as u64,
            first_run = %first_run,
            "Registered periodic function"
        );
        Ok(handle)
    }

    /// Run `callback` once at `at`.
    ///
    /// A time in the past is reported as a warning and runs as soon as possible. A function
    /// already registered under `name` is cancelled and replaced.
    pub fn register_scheduled_function<F>(
        &mut self,
        name: &str,
        at: DateTime<Local>,
        callback: F,
    ) -> Result<TaskHandle, ModuleError>
    where
        F: FnOnce(&mut M, &mut ModuleContext<M>) + Send + 'static,
    {
        self.check_timers("register scheduled function")?;
        if at < Local::now() {
            self.module.warning(format_args!(
                "scheduled function '{name}' was registered for {at}, which is in the past; running it now"
            ));
        }
        if let Some(previous) = self.functions.remove(name) {
            previous.handle.invalidate();
        }

        let mut callback = Some(callback);
        Ok(self.schedule_function(name, Schedule::once(at), move |module, ctx| {
            if let Some(callback) = callback.take() {
                callback(module, ctx);
            }
        }))
    }

    /// Cancel a function registered by name. Pending runs no longer happen.
    pub fn unregister_periodic_function(&mut self, name: &str) -> Result<(), ModuleError> {
        self.check_timers("unregister periodic function")?;
        match self.functions.remove(name) {
            Some(registered) => {
                registered.handle.invalidate();
                debug!(module = %self.module.id(), function = name, "Unregistered function");
                Ok(())
            }
            None => Err(self.report(ModuleError::UnknownFunction {
                name: name.to_string(),
            })),
        }
    }

    pub fn unregister_all_periodic_functions(&mut self) {
        for (_, registered) in self.functions.drain() {
            registered.handle.invalidate();
        }
    }

    pub fn is_function_registered(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    fn schedule_function<F>(&mut self, name: &str, schedule: Schedule, mut callback: F) -> TaskHandle
    where
        F: FnMut(&mut M, &mut ModuleContext<M>) + Send + 'static,
    {
        let id = self.next_function_id;
        self.next_function_id += 1;
        let repeats = schedule.repeats();

        let cell = self.cell.clone();
        let key = name.to_string();
        let handle = self.dispatcher.add_task(Task::new(schedule, move || {
            with_cell(&cell, |module, ctx| {
                callback(module, ctx);
                // One-shot functions are done; free the name unless it was re-registered.
                if !repeats && ctx.functions.get(&key).is_some_and(|r| r.id == id) {
                    ctx.functions.remove(&key);
                }
                ctx.abort_on_failure();
            });
        }));

        self.functions.insert(
            name.to_string(),
            Registered {
                id,
                handle: handle.clone(),
            },
        );
        handle
    }

    fn check_timers(&self, operation: &'static str) -> Result<(), ModuleError> {
        let state = self.module.state();
        if state.timers_usable() {
            return Ok(());
        }
        Err(self.report(ModuleError::InvalidState {
            module: self.module.id().to_string(),
            operation,
            state: state.to_string(),
        }))
    }

    /// Tear the module down if a callback reported a fatal error while it was running.
    fn abort_on_failure(&mut self) {
        if !matches!(self.module.state(), ModuleState::Initializing | ModuleState::Running) {
            return;
        }
        let Some(message) = self.module.failure() else {
            return;
        };

        error!(module = %self.module.id(), error = %message, "Aborting module after fatal error");
        self.unregister_all_periodic_functions();
        self.dispatcher.halt();
        self.channels.remove_module(self.module.id());
        self.module.set_state(ModuleState::Stopped);
    }

    fn report(&self, error: ModuleError) -> ModuleError {
        self.module.error(&error);
        error
    }
}

/// Lock the module cell, if the module still exists, and hand its parts to `f`.
pub(crate) fn with_cell<M, R>(
    cell: &Weak<Mutex<ModuleCell<M>>>,
    f: impl FnOnce(&mut M, &mut ModuleContext<M>) -> R,
) -> Option<R> {
    let cell = cell.upgrade()?;
    let mut guard = cell.lock();
    let ModuleCell { module, ctx } = &mut *guard;
    Some(f(module, ctx))
}
