use std::fmt;

/// Lifecycle of a module.
///
/// `Created -> Starting -> Initializing -> Running -> Terminating -> Stopped`, with
/// `Running <-> Paused` in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    Created,
    Starting,
    Initializing,
    Running,
    Paused,
    Terminating,
    Stopped,
}

impl ModuleState {
    /// Channel handles may be used in these states.
    pub fn channels_usable(self) -> bool {
        matches!(
            self,
            ModuleState::Initializing | ModuleState::Running | ModuleState::Terminating
        )
    }

    /// Timers may be registered or cancelled in these states.
    pub fn timers_usable(self) -> bool {
        matches!(self, ModuleState::Initializing | ModuleState::Running)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleState::Created => "created",
            ModuleState::Starting => "starting",
            ModuleState::Initializing => "initializing",
            ModuleState::Running => "running",
            ModuleState::Paused => "paused",
            ModuleState::Terminating => "terminating",
            ModuleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
