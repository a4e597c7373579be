use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::state::ModuleState;
use crate::error::ModuleError;

/// Non-owning reference to a module: its id, its current state and its reporting channel.
///
/// Channels hold one of these to check whether their module is still active.
#[derive(Clone)]
pub struct ModuleRef {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    state: RwLock<ModuleState>,
    // First fatal error; sticky until the module is dropped.
    failure: Mutex<Option<String>>,
}

impl ModuleRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: id.into(),
                state: RwLock::new(ModuleState::Created),
                failure: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn state(&self) -> ModuleState {
        *self.inner.state.read()
    }

    pub(crate) fn set_state(&self, state: ModuleState) {
        let previous = std::mem::replace(&mut *self.inner.state.write(), state);
        debug!(module = %self.inner.id, from = %previous, to = %state, "Module state changed");
    }

    /// Move from `from` to `to`. Fails, leaving the state alone, if the module is no longer
    /// in `from`.
    pub(crate) fn transition(&self, from: ModuleState, to: ModuleState) -> bool {
        let mut state = self.inner.state.write();
        if *state != from {
            return false;
        }
        *state = to;
        debug!(module = %self.inner.id, from = %from, to = %to, "Module state changed");
        true
    }

    pub fn debug(&self, message: impl fmt::Display) {
        debug!(module = %self.inner.id, "{message}");
    }

    pub fn info(&self, message: impl fmt::Display) {
        info!(module = %self.inner.id, "{message}");
    }

    pub fn warning(&self, message: impl fmt::Display) {
        warn!(module = %self.inner.id, "{message}");
    }

    pub fn error(&self, message: impl fmt::Display) {
        error!(module = %self.inner.id, "{message}");
    }

    /// Report an unrecoverable failure and mark the module as failed.
    ///
    /// Inside `initialize`, return the error to fail `start`. Inside a timer or channel
    /// callback the module is aborted once the callback returns: its timers are cancelled,
    /// its dispatcher halts and it is detached from all channels.
    ///
    /// ```ignore
    /// if !device.connected() {
    ///     return Err(ctx.module().fatal("sensor not connected"));
    /// }
    /// ```
    pub fn fatal(&self, message: impl fmt::Display) -> ModuleError {
        let message = message.to_string();
        error!(module = %self.inner.id, fatal = true, "{message}");
        self.inner.failure.lock().get_or_insert_with(|| message.clone());
        ModuleError::Fatal {
            module: self.inner.id.clone(),
            message,
        }
    }

    /// Message of the first fatal error reported, if any.
    pub fn failure(&self) -> Option<String> {
        self.inner.failure.lock().clone()
    }

    pub(crate) fn failure_error(&self) -> Option<ModuleError> {
        self.failure().map(|message| ModuleError::Fatal {
            module: self.inner.id.clone(),
            message,
        })
    }
}

impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRef")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}
